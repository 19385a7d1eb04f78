//! Error types for agentforge

#![allow(dead_code)]

use thiserror::Error;

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Read(String),

    #[error("Failed to parse config: {0}")]
    Parse(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Missing required field: {0}")]
    MissingField(String),
}

/// Parent-side agent executor errors
#[derive(Error, Debug)]
pub enum ExecutorError {
    #[error("Failed to load agent configuration: {0}")]
    ConfigLoad(#[from] ConfigError),

    #[error("Agent not found: {0}")]
    AgentNotFound(String),

    #[error("Agent not running: {0}")]
    AgentNotRunning(String),

    #[error("Failed to spawn agent '{agent}': {reason}")]
    Spawn { agent: String, reason: String },

    #[error("Failed to write to agent '{agent}': {reason}")]
    Write { agent: String, reason: String },

    #[error("Failed to parse agent response: {raw}")]
    ResponseParse { raw: String },

    #[error("Agent '{agent}' did not respond within {timeout_secs}s")]
    Timeout { agent: String, timeout_secs: u64 },

    #[error("Agent '{agent}' has {pending} commands in flight; queue is full")]
    QueueFull { agent: String, pending: usize },

    #[error("Agent '{0}' exited before responding")]
    AgentExited(String),
}

/// Errors raised inside an agent process while handling a command.
///
/// These never escape the read loop; they are converted into error
/// envelopes at the dispatch boundary.
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Access denied to path: {path}")]
    AccessDenied { path: String },

    #[error("Unknown command: {0}")]
    UnknownCommand(String),

    #[error("Missing required argument: {0}")]
    MissingArgument(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("External tool failed: {0}")]
    Tool(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("SQLite error: {0}")]
    Sqlite(String),

    #[error("Not configured: {0}")]
    NotConfigured(String),
}

impl AgentError {
    /// Stable machine-readable code placed in error envelopes
    pub fn code(&self) -> &'static str {
        match self {
            AgentError::AccessDenied { .. } => "access_denied",
            AgentError::UnknownCommand(_) => "unknown_command",
            AgentError::MissingArgument(_) => "missing_argument",
            AgentError::Io(_) => "io",
            AgentError::Tool(_) => "tool",
            AgentError::Http(_) => "http",
            AgentError::Sqlite(_) => "sqlite",
            AgentError::NotConfigured(_) => "not_configured",
        }
    }
}

impl From<rusqlite::Error> for AgentError {
    fn from(e: rusqlite::Error) -> Self {
        AgentError::Sqlite(e.to_string())
    }
}

impl From<reqwest::Error> for AgentError {
    fn from(e: reqwest::Error) -> Self {
        AgentError::Http(e.to_string())
    }
}

/// Plugin loading and hook errors
#[derive(Error, Debug)]
pub enum PluginError {
    #[error("Invalid plugin structure: {0}")]
    Invalid(String),

    #[error("Plugin '{plugin}' is missing environment variables: {}", .missing.join(", "))]
    MissingEnv { plugin: String, missing: Vec<String> },

    #[error("Plugin configuration error: {0}")]
    Config(String),

    #[error("Hook '{hook}' failed: {message}")]
    Hook { hook: String, message: String },

    #[error("Plugin protocol error: {0}")]
    Protocol(String),

    #[error("Plugin request failed: {0}")]
    Request(String),

    #[error("Plugin timed out after {0}s")]
    Timeout(u64),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<reqwest::Error> for PluginError {
    fn from(e: reqwest::Error) -> Self {
        PluginError::Request(e.to_string())
    }
}

/// Coarse classification used by the retry policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    RateLimit,
    Overloaded,
    Timeout,
    ConnectionReset,
    ResourceExhausted,
    Fatal,
}

impl ErrorKind {
    /// Whether an operation failing with this kind may be retried transparently
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            ErrorKind::Overloaded
                | ErrorKind::Timeout
                | ErrorKind::ConnectionReset
                | ErrorKind::ResourceExhausted
        )
    }
}

/// AI/LLM-related errors
#[derive(Error, Debug)]
pub enum LlmError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Connection reset: {0}")]
    ConnectionReset(String),

    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("Failed to parse LLM response: {0}")]
    Parse(String),

    #[error("LLM request timeout")]
    Timeout,

    #[error("Rate limit exceeded for {model}. Try again in {} seconds.", .retry_after_ms.div_ceil(1000))]
    RateLimited { model: String, retry_after_ms: u64 },

    #[error("LLM unavailable: {0}")]
    Unavailable(String),
}

impl LlmError {
    /// Classify this error for retry dispatch
    pub fn kind(&self) -> ErrorKind {
        match self {
            LlmError::RateLimited { .. } => ErrorKind::RateLimit,
            LlmError::Timeout => ErrorKind::Timeout,
            LlmError::ConnectionReset(_) => ErrorKind::ConnectionReset,
            LlmError::Api { status: 429, .. } => ErrorKind::RateLimit,
            LlmError::Api { status: 503 | 529, .. } => ErrorKind::Overloaded,
            LlmError::Api { status: 408 | 504, .. } => ErrorKind::Timeout,
            LlmError::Api { message, .. } if message.contains("resource_exhausted") => {
                ErrorKind::ResourceExhausted
            }
            _ => ErrorKind::Fatal,
        }
    }
}

impl From<reqwest::Error> for LlmError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            LlmError::Timeout
        } else if e.is_connect() {
            LlmError::ConnectionReset(e.to_string())
        } else if e.is_decode() {
            LlmError::Parse(e.to_string())
        } else {
            LlmError::Network(e.to_string())
        }
    }
}

/// GitHub API errors
#[derive(Error, Debug)]
pub enum GitHubError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("GitHub API error: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("Failed to parse GitHub response: {0}")]
    Parse(String),
}

impl From<reqwest::Error> for GitHubError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            GitHubError::Parse(e.to_string())
        } else {
            GitHubError::Network(e.to_string())
        }
    }
}

/// Specification generator errors
#[derive(Error, Debug)]
pub enum GeneratorError {
    #[error("Failed to parse prompt analysis: {reason}")]
    AnalysisParse { reason: String, raw: String },

    #[error("Invalid specification: {reason}")]
    InvalidSpecification { reason: String, raw: String },

    #[error(transparent)]
    Llm(#[from] LlmError),

    #[error("Code search failed: {0}")]
    Search(#[from] GitHubError),
}

impl GeneratorError {
    /// Raw model output attached for diagnosis, if any
    pub fn raw_output(&self) -> Option<&str> {
        match self {
            GeneratorError::AnalysisParse { raw, .. }
            | GeneratorError::InvalidSpecification { raw, .. } => Some(raw),
            _ => None,
        }
    }
}

/// Workshop persistence and workflow execution errors
#[derive(Error, Debug)]
pub enum WorkshopError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse workflow: {0}")]
    Parse(String),

    #[error("Template not found for tool type '{0}'")]
    TemplateNotFound(String),

    #[error("Workflow not found: {0}")]
    WorkflowNotFound(String),

    #[error("Invalid name '{0}': use letters, digits, '-' or '_'")]
    InvalidName(String),

    #[error("Step failed: {step} (exit code {code}): {stderr}")]
    StepExecution {
        step: String,
        code: i32,
        stderr: String,
    },

    #[error("Step {step} timed out after {timeout_secs}s")]
    StepTimeout { step: String, timeout_secs: u64 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limit_is_not_retryable() {
        let err = LlmError::RateLimited {
            model: "llama3:70b".to_string(),
            retry_after_ms: 1500,
        };
        assert_eq!(err.kind(), ErrorKind::RateLimit);
        assert!(!err.kind().is_retryable());
        assert!(err.to_string().contains("2 seconds"));
    }

    #[test]
    fn test_api_status_classification() {
        let overloaded = LlmError::Api {
            status: 529,
            message: "overloaded_error".to_string(),
        };
        assert_eq!(overloaded.kind(), ErrorKind::Overloaded);

        let too_many = LlmError::Api {
            status: 429,
            message: String::new(),
        };
        assert_eq!(too_many.kind(), ErrorKind::RateLimit);

        let bad_request = LlmError::Api {
            status: 400,
            message: "bad".to_string(),
        };
        assert_eq!(bad_request.kind(), ErrorKind::Fatal);
    }

    #[test]
    fn test_agent_error_codes() {
        let denied = AgentError::AccessDenied {
            path: "/etc".to_string(),
        };
        assert_eq!(denied.code(), "access_denied");
        assert_eq!(denied.to_string(), "Access denied to path: /etc");
        assert_eq!(AgentError::UnknownCommand("x".into()).code(), "unknown_command");
    }

    #[test]
    fn test_generator_error_keeps_raw_output() {
        let err = GeneratorError::InvalidSpecification {
            reason: "missing required fields: name".to_string(),
            raw: "{\"description\": \"x\"}".to_string(),
        };
        assert_eq!(err.raw_output(), Some("{\"description\": \"x\"}"));
    }

    #[test]
    fn test_step_error_names_step() {
        let err = WorkshopError::StepExecution {
            step: "step1".to_string(),
            code: 1,
            stderr: "boom".to_string(),
        };
        assert!(err.to_string().contains("step1"));
    }
}
