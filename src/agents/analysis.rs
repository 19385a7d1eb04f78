//! Output adapters for external analysis tools
//!
//! Each adapter turns a tool's raw text output into a structured report.
//! Output that cannot be understood degrades to an empty report instead of
//! failing the command.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use serde_json::Value;

static COMPLEXITY_LINE: Lazy<Result<Regex, regex::Error>> =
    Lazy::new(|| Regex::new(r"^(.+?):\s*(\d+)\s*$"));
static DUPLICATES_LINE: Lazy<Result<Regex, regex::Error>> =
    Lazy::new(|| Regex::new(r"(\d+)\s*duplicates? found"));

/// Raw text in, structured report out
pub trait AnalysisAdapter: Send + Sync {
    type Report: Serialize;

    fn parse(&self, raw: &str) -> Self::Report;
}

/// Complexity of a single file
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct FileComplexity {
    pub file: String,
    pub complexity: u32,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ComplexityReport {
    pub complexity: u32,
    pub details: Vec<FileComplexity>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// `file: N` lines as printed by cyclomatic-complexity style tools
pub struct ComplexityAdapter;

impl AnalysisAdapter for ComplexityAdapter {
    type Report = ComplexityReport;

    fn parse(&self, raw: &str) -> ComplexityReport {
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.contains("No issues found") {
            return ComplexityReport {
                complexity: 0,
                details: Vec::new(),
                message: Some("No complexity issues detected".to_string()),
            };
        }

        let Ok(re) = COMPLEXITY_LINE.as_ref() else {
            return ComplexityReport {
                complexity: 0,
                details: Vec::new(),
                message: Some("Unable to parse complexity output".to_string()),
            };
        };

        let details: Vec<FileComplexity> = trimmed
            .lines()
            .filter_map(|line| {
                let caps = re.captures(line.trim())?;
                Some(FileComplexity {
                    file: caps[1].trim().to_string(),
                    complexity: caps[2].parse().ok()?,
                })
            })
            .collect();

        let message = details
            .is_empty()
            .then(|| "Unable to parse complexity output".to_string());

        ComplexityReport {
            complexity: details.iter().map(|d| d.complexity).sum(),
            details,
            message,
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DuplicatesReport {
    pub duplicates_found: u32,
}

/// jsinspect style "N duplicates found" summaries
pub struct DuplicatesAdapter;

impl AnalysisAdapter for DuplicatesAdapter {
    type Report = DuplicatesReport;

    fn parse(&self, raw: &str) -> DuplicatesReport {
        let duplicates_found = DUPLICATES_LINE
            .as_ref()
            .ok()
            .and_then(|re| re.captures(raw))
            .and_then(|caps| caps[1].parse().ok())
            .unwrap_or(0);

        DuplicatesReport { duplicates_found }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LintReport {
    pub error_count: u64,
    pub warning_count: u64,
    pub details: Vec<Value>,
}

/// ESLint `--format json` output
pub struct LintAdapter;

impl AnalysisAdapter for LintAdapter {
    type Report = LintReport;

    fn parse(&self, raw: &str) -> LintReport {
        let files: Vec<Value> = serde_json::from_str(raw.trim()).unwrap_or_default();

        let count = |key: &str| -> u64 {
            files
                .iter()
                .filter_map(|f| f.get(key).and_then(Value::as_u64))
                .sum()
        };

        LintReport {
            error_count: count("errorCount"),
            warning_count: count("warningCount"),
            details: files,
        }
    }
}
