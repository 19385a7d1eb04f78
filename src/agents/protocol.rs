//! Agent stdio protocol
//!
//! One request per input line, one JSON response per output line. Requests
//! are JSON objects carrying a correlation id; bare `command arg...` lines
//! are still accepted from humans and older callers.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Request sent to an agent process
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentRequest {
    /// Correlation id echoed back in the response
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Command name, e.g. "list" or "filesystem.read_file"
    pub command: String,
    /// Positional arguments
    #[serde(default)]
    pub args: Vec<String>,
}

impl AgentRequest {
    /// Create a new request with a fresh correlation id
    pub fn new(command: &str, args: &[String]) -> Self {
        Self {
            id: Some(uuid::Uuid::new_v4().to_string()),
            command: command.to_string(),
            args: args.to_vec(),
        }
    }

    /// Parse one input line.
    ///
    /// Lines starting with `{` must be a JSON request. Anything else is
    /// split on whitespace into command and arguments.
    pub fn parse_line(line: &str) -> Result<Self, String> {
        let line = line.trim();
        if line.is_empty() {
            return Err("Empty command".to_string());
        }

        if line.starts_with('{') {
            return serde_json::from_str(line).map_err(|e| format!("Malformed request: {}", e));
        }

        let mut tokens = line.split_whitespace().map(str::to_string);
        let command = tokens.next().unwrap_or_default();
        Ok(Self {
            id: None,
            command,
            args: tokens.collect(),
        })
    }

    /// Serialize as a single newline-terminated line
    pub fn to_line(&self) -> Result<String, serde_json::Error> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }

    /// Get a positional argument
    pub fn arg(&self, index: usize) -> Option<&str> {
        self.args.get(index).map(String::as_str)
    }
}

/// Response status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ResponseStatus {
    Success,
    Error,
}

/// Response written by an agent process
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentResponse {
    /// Request ID this responds to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub status: ResponseStatus,
    /// Result data (if success)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Error message (if failure)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Extra error context (if failure)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    /// Machine-readable error code (if failure)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl AgentResponse {
    /// Create a success response
    pub fn success(id: Option<String>, result: Value) -> Self {
        Self {
            id,
            status: ResponseStatus::Success,
            result: Some(result),
            message: None,
            details: None,
            code: None,
        }
    }

    /// Create an error response
    pub fn error(id: Option<String>, code: &str, message: &str, details: Option<String>) -> Self {
        Self {
            id,
            status: ResponseStatus::Error,
            result: None,
            message: Some(message.to_string()),
            details,
            code: Some(code.to_string()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ResponseStatus::Success
    }

    /// Parse one output line from an agent.
    ///
    /// Lines that are valid JSON but not an envelope (agents that print
    /// their raw result) are wrapped: objects with an `error` key become
    /// error responses, everything else a success carrying the value.
    pub fn from_line(line: &str) -> Result<Self, serde_json::Error> {
        let value: Value = serde_json::from_str(line.trim())?;

        let is_envelope = value
            .get("status")
            .and_then(Value::as_str)
            .map(|s| s == "success" || s == "error")
            .unwrap_or(false);

        if is_envelope {
            return serde_json::from_value(value);
        }

        if let Some(message) = value.get("error").and_then(Value::as_str) {
            let details = value
                .get("details")
                .and_then(Value::as_str)
                .map(str::to_string);
            return Ok(Self::error(None, "agent_error", message, details));
        }

        Ok(Self::success(None, value))
    }

    /// Serialize as a single newline-terminated line
    pub fn to_line(&self) -> String {
        let mut line = serde_json::to_string(self).unwrap_or_else(|e| {
            format!(
                r#"{{"status":"error","message":"Failed to serialize response: {}"}}"#,
                e
            )
        });
        line.push('\n');
        line
    }
}
