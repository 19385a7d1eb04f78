//! Code analysis agent
//!
//! Wraps external complexity, duplicate and lint tools. The tools are
//! configurable commands; their output goes through the adapters in
//! [`super::analysis`].

use super::analysis::{AnalysisAdapter, ComplexityAdapter, DuplicatesAdapter, LintAdapter};
use super::registry::{bind, required_arg, CapabilityRegistry, HandlerResult};
use crate::config::AgentsConfig;
use crate::error::AgentError;
use serde_json::{json, Value};
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

pub struct CodeAnalysisAgent {
    complexity_command: Vec<String>,
    duplicates_command: Vec<String>,
    lint_command: Vec<String>,
    timeout: Duration,
}

impl CodeAnalysisAgent {
    pub fn new(config: &AgentsConfig) -> Self {
        Self {
            complexity_command: config.complexity_command.clone(),
            duplicates_command: config.duplicates_command.clone(),
            lint_command: config.lint_command.clone(),
            timeout: Duration::from_secs(config.analysis_timeout),
        }
    }

    pub fn registry(self) -> CapabilityRegistry {
        let agent = Arc::new(self);
        let mut registry = CapabilityRegistry::new("code-analysis");

        registry.register(
            "complexity",
            bind(Arc::clone(&agent), |a, args| async move {
                a.complexity(required_arg(&args, "filePath")?).await
            }),
        );
        registry.register(
            "duplicates",
            bind(Arc::clone(&agent), |a, args| async move {
                a.duplicates(required_arg(&args, "dirPath")?).await
            }),
        );
        registry.register(
            "lint",
            bind(agent, |a, args| async move {
                a.lint(required_arg(&args, "filePath")?).await
            }),
        );

        registry
    }

    pub async fn complexity(&self, file: &str) -> HandlerResult {
        ensure_exists(file).await?;
        let report = self
            .run_tool(&self.complexity_command, file, &ComplexityAdapter)
            .await?;
        Ok(with_target("filePath", file, report))
    }

    pub async fn duplicates(&self, dir: &str) -> HandlerResult {
        ensure_exists(dir).await?;
        let report = self
            .run_tool(&self.duplicates_command, dir, &DuplicatesAdapter)
            .await?;
        Ok(with_target("dirPath", dir, report))
    }

    pub async fn lint(&self, file: &str) -> HandlerResult {
        ensure_exists(file).await?;
        let report = self.run_tool(&self.lint_command, file, &LintAdapter).await?;
        Ok(with_target("filePath", file, report))
    }

    /// Run `command... target` and parse stdout.
    ///
    /// A non-zero exit is only an error when the tool printed nothing;
    /// linters exit non-zero whenever they find problems.
    async fn run_tool<A: AnalysisAdapter>(
        &self,
        command: &[String],
        target: &str,
        adapter: &A,
    ) -> Result<Value, AgentError> {
        let (program, base_args) = command
            .split_first()
            .ok_or_else(|| AgentError::NotConfigured("analysis command is empty".to_string()))?;

        debug!("Running {} {:?} {}", program, base_args, target);

        let child = Command::new(program)
            .args(base_args)
            .arg(target)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| AgentError::Tool(format!("failed to start {}: {}", program, e)))?;

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| {
                AgentError::Tool(format!(
                    "{} timed out after {}s",
                    program,
                    self.timeout.as_secs()
                ))
            })??;

        let stdout = String::from_utf8_lossy(&output.stdout);
        if !output.status.success() && stdout.trim().is_empty() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!("{} exited with {}: {}", program, output.status, stderr.trim());
            return Err(AgentError::Tool(format!(
                "{} exited with {}: {}",
                program,
                output.status,
                stderr.trim()
            )));
        }

        serde_json::to_value(adapter.parse(&stdout))
            .map_err(|e| AgentError::Tool(format!("failed to encode report: {}", e)))
    }
}

async fn ensure_exists(path: &str) -> Result<(), AgentError> {
    if tokio::fs::try_exists(Path::new(path)).await? {
        Ok(())
    } else {
        Err(AgentError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("no such file or directory: {}", path),
        )))
    }
}

/// Put the analysed path first in the report object
fn with_target(key: &str, target: &str, report: Value) -> Value {
    let mut out = serde_json::Map::new();
    out.insert(key.to_string(), json!(target));
    if let Value::Object(fields) = report {
        out.extend(fields);
    }
    Value::Object(out)
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn agent_with(command: &str, timeout: u64) -> CodeAnalysisAgent {
        let sh = vec!["sh".to_string(), "-c".to_string(), command.to_string(), "sh".to_string()];
        let config = AgentsConfig {
            complexity_command: sh.clone(),
            duplicates_command: sh.clone(),
            lint_command: sh,
            analysis_timeout: timeout,
            ..AgentsConfig::default()
        };
        CodeAnalysisAgent::new(&config)
    }

    #[tokio::test]
    async fn test_complexity_parses_tool_output() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("a.js");
        std::fs::write(&file, "function f() {}").unwrap();

        let agent = agent_with(r#"echo "$1: 3"; echo "other.js: 2""#, 5);
        let result = agent.complexity(file.to_str().unwrap()).await.unwrap();

        assert_eq!(result["filePath"], file.to_str().unwrap());
        assert_eq!(result["complexity"], 5);
        assert_eq!(result["details"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_lint_tolerates_nonzero_exit_with_output() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("a.js");
        std::fs::write(&file, "var x").unwrap();

        let agent = agent_with(
            r#"echo '[{"errorCount": 1, "warningCount": 2}]'; exit 1"#,
            5,
        );
        let result = agent.lint(file.to_str().unwrap()).await.unwrap();
        assert_eq!(result["errorCount"], 1);
        assert_eq!(result["warningCount"], 2);
    }

    #[tokio::test]
    async fn test_garbage_output_degrades_to_zero() {
        let dir = TempDir::new().unwrap();
        let agent = agent_with("echo 'something unexpected'", 5);

        let result = agent.duplicates(dir.path().to_str().unwrap()).await.unwrap();
        assert_eq!(result["duplicatesFound"], 0);
    }

    #[tokio::test]
    async fn test_missing_file() {
        let agent = agent_with("true", 5);
        let err = agent.complexity("/definitely/not/here.js").await.unwrap_err();
        assert_eq!(err.code(), "io");
    }

    #[tokio::test]
    async fn test_silent_failure_is_error() {
        let dir = TempDir::new().unwrap();
        let agent = agent_with("echo broken >&2; exit 2", 5);
        let err = agent.duplicates(dir.path().to_str().unwrap()).await.unwrap_err();
        assert!(err.to_string().contains("broken"));
    }

    #[tokio::test]
    async fn test_tool_timeout() {
        let dir = TempDir::new().unwrap();
        let agent = agent_with("sleep 5", 1);
        let err = agent.duplicates(dir.path().to_str().unwrap()).await.unwrap_err();
        assert!(err.to_string().contains("timed out"));
    }
}
