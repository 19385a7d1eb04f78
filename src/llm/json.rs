//! Pulling JSON out of model replies
//!
//! Models wrap answers in markdown fences or surround them with prose; the
//! helpers here recover the first JSON object before parsing.

use serde::de::DeserializeOwned;
use serde_json::Value;

/// Best-effort extraction of a JSON object from free text.
///
/// Candidates are tried in order: the whole reply, each fenced block, then
/// every balanced `{...}` span. The first that parses as an object wins.
pub fn extract_json(text: &str) -> Option<String> {
    candidates(text).find(|candidate| {
        matches!(serde_json::from_str::<Value>(candidate), Ok(Value::Object(_)))
    })
}

/// Parse a reply as `T`, trying each extracted candidate in turn
pub fn parse_json_response<T: DeserializeOwned>(text: &str) -> Result<T, String> {
    let mut last_error = None;
    for candidate in candidates(text) {
        match serde_json::from_str::<T>(&candidate) {
            Ok(value) => return Ok(value),
            Err(e) => last_error = Some(e.to_string()),
        }
    }
    Err(last_error.unwrap_or_else(|| "no JSON object in response".to_string()))
}

fn candidates(text: &str) -> impl Iterator<Item = String> + '_ {
    let trimmed = text.trim();
    let whole = trimmed.starts_with('{').then(|| trimmed.to_string());

    whole
        .into_iter()
        .chain(fence_bodies(text).into_iter().filter_map(|body| {
            let body = body.trim();
            body.starts_with('{').then(|| body.to_string())
        }))
        .chain(
            text.char_indices()
                .filter(|(_, c)| *c == '{')
                .filter_map(move |(start, _)| balanced_object(&text[start..]))
                .map(str::to_string),
        )
}

/// Bodies of every ``` fence, with or without a language tag
fn fence_bodies(text: &str) -> Vec<&str> {
    let mut bodies = Vec::new();
    let mut rest = text;

    while let Some(open) = rest.find("```") {
        let after = &rest[open + 3..];
        let Some(newline) = after.find('\n') else {
            break;
        };
        let body = &after[newline + 1..];
        let Some(close) = body.find("```") else {
            break;
        };
        bodies.push(&body[..close]);
        rest = &body[close + 3..];
    }
    bodies
}

/// Balanced `{...}` span at the start of `text`, ignoring braces inside strings
fn balanced_object(text: &str) -> Option<&str> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in text.char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }

        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(&text[..i + 1]);
                }
            }
            _ => {}
        }
    }
    None
}
