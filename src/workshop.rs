//! Workshop: persisted tools and workflows
//!
//! Layout under `tools_dir`:
//!
//! ```text
//! templates/<type>.template   tool templates
//! custom/<name>[.ext]         tools created from specifications
//! workflows/<name>.json       saved workflows
//! tools/<tool>[.ext]          scripts run by workflow steps
//! ```
//!
//! Workflow steps run one after another; the first failing step stops
//! the run. Steps that already ran are not undone.

#![allow(dead_code)]

use crate::config::WorkshopConfig;
use crate::error::WorkshopError;
use crate::generator::{ToolSpecification, WorkflowSpecification, TOOL_TYPES};
use crate::logging::{ActivityLog, LogEvent};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use serde_json::{json, Value};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tracing::{debug, info, warn};

static DOC_BLOCK: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"(?s)/\*\*.*?\*/").ok());
static VALID_NAME: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_-]*$").ok());

/// Template written for each tool type when none exists
const DEFAULT_TEMPLATE: &str = r#"/**
 * {{name}}
 *
 * @description {{description}}
 * @type {{type}}
 * @author agentforge
 * @created {{date}}
 */

const parameters = {{parameters}};

{{sourceCode}}
"#;

/// Metadata read from a tool's doc header
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct ToolInfo {
    pub name: String,
    pub description: String,
    #[serde(rename = "type")]
    pub tool_type: String,
    pub author: String,
    pub created: String,
}

/// Output of one workflow step
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct StepResult {
    pub step: String,
    pub output: String,
}

pub struct WorkshopService {
    tools_dir: PathBuf,
    interpreter: Option<String>,
    script_extension: Option<String>,
    step_timeout: Duration,
    activity: Arc<ActivityLog>,
}

fn validate_name(name: &str) -> Result<(), WorkshopError> {
    let valid = VALID_NAME.as_ref().map_or(false, |re| re.is_match(name));
    if valid {
        Ok(())
    } else {
        Err(WorkshopError::InvalidName(name.to_string()))
    }
}

fn header_tag(block: &str, tag: &str) -> String {
    Regex::new(&format!(r"@{}[ \t]+(.+)", tag))
        .ok()
        .and_then(|re| re.captures(block))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
        .unwrap_or_default()
}

/// Pull `@description`, `@type`, `@author` and `@created` from the first
/// `/** ... */` block
pub fn extract_metadata(name: &str, content: &str) -> ToolInfo {
    let block = DOC_BLOCK
        .as_ref()
        .and_then(|re| re.find(content))
        .map(|m| m.as_str());

    match block {
        Some(block) => ToolInfo {
            name: name.to_string(),
            description: header_tag(block, "description"),
            tool_type: header_tag(block, "type"),
            author: header_tag(block, "author"),
            created: header_tag(block, "created"),
        },
        None => ToolInfo {
            name: name.to_string(),
            ..ToolInfo::default()
        },
    }
}

impl WorkshopService {
    pub fn new(config: &WorkshopConfig, activity: Arc<ActivityLog>) -> Self {
        Self {
            tools_dir: config.tools_dir.clone(),
            interpreter: config.interpreter.clone().filter(|i| !i.is_empty()),
            script_extension: config
                .script_extension
                .as_deref()
                .map(|e| e.trim_start_matches('.').to_string())
                .filter(|e| !e.is_empty()),
            step_timeout: Duration::from_secs(config.step_timeout),
            activity,
        }
    }

    fn templates_dir(&self) -> PathBuf {
        self.tools_dir.join("templates")
    }

    fn custom_dir(&self) -> PathBuf {
        self.tools_dir.join("custom")
    }

    fn workflows_dir(&self) -> PathBuf {
        self.tools_dir.join("workflows")
    }

    fn with_extension(&self, name: &str) -> String {
        match &self.script_extension {
            Some(ext) => format!("{}.{}", name, ext),
            None => name.to_string(),
        }
    }

    /// Create the directory layout and any missing default templates
    pub fn ensure_layout(&self) -> Result<(), WorkshopError> {
        for dir in [
            self.templates_dir(),
            self.custom_dir(),
            self.workflows_dir(),
            self.tools_dir.join("tools"),
        ] {
            fs::create_dir_all(dir)?;
        }

        for tool_type in TOOL_TYPES {
            let path = self.templates_dir().join(format!("{}.template", tool_type));
            if !path.exists() {
                debug!("Writing default template {:?}", path);
                fs::write(path, DEFAULT_TEMPLATE)?;
            }
        }
        Ok(())
    }

    /// Render the template for the tool's type into `custom/`
    pub fn create_tool(&self, spec: &ToolSpecification) -> Result<PathBuf, WorkshopError> {
        validate_name(&spec.name)?;
        validate_name(&spec.tool_type)?;

        let template_path = self.templates_dir().join(format!("{}.template", spec.tool_type));
        let template = fs::read_to_string(&template_path)
            .map_err(|_| WorkshopError::TemplateNotFound(spec.tool_type.clone()))?;

        let parameters = serde_json::to_string_pretty(&spec.parameters)
            .map_err(|e| WorkshopError::Parse(e.to_string()))?;
        let rendered = template
            .replace("{{name}}", &spec.name)
            .replace("{{description}}", &spec.description)
            .replace("{{type}}", &spec.tool_type)
            .replace("{{date}}", &chrono::Utc::now().to_rfc3339())
            .replace("{{parameters}}", &parameters)
            .replace("{{sourceCode}}", &spec.source_code);

        fs::create_dir_all(self.custom_dir())?;
        let path = self.custom_dir().join(self.with_extension(&spec.name));
        fs::write(&path, rendered)?;
        info!("Created tool '{}' at {:?}", spec.name, path);
        Ok(path)
    }

    /// Tools in `custom/`, sorted by name
    pub fn list_tools(&self) -> Result<Vec<ToolInfo>, WorkshopError> {
        let dir = self.custom_dir();
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut tools = Vec::new();
        for entry in fs::read_dir(&dir)?.flatten() {
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            match fs::read_to_string(&path) {
                Ok(content) => tools.push(extract_metadata(name, &content)),
                Err(e) => warn!("Skipping unreadable tool {:?}: {}", path, e),
            }
        }

        tools.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(tools)
    }

    /// Save a workflow, stamping its creation time
    pub fn create_workflow(&self, spec: &WorkflowSpecification) -> Result<PathBuf, WorkshopError> {
        validate_name(&spec.name)?;

        let mut workflow = spec.clone();
        workflow.created = Some(chrono::Utc::now().to_rfc3339());

        fs::create_dir_all(self.workflows_dir())?;
        let path = self.workflows_dir().join(format!("{}.json", spec.name));
        let json = serde_json::to_string_pretty(&workflow)
            .map_err(|e| WorkshopError::Parse(e.to_string()))?;
        fs::write(&path, json)?;
        info!("Saved workflow '{}' to {:?}", spec.name, path);
        Ok(path)
    }

    /// Saved workflows, sorted by name. Unparseable files are skipped.
    pub fn list_workflows(&self) -> Result<Vec<WorkflowSpecification>, WorkshopError> {
        let dir = self.workflows_dir();
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut workflows = Vec::new();
        for entry in fs::read_dir(&dir)?.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match read_workflow(&path) {
                Ok(workflow) => workflows.push(workflow),
                Err(e) => warn!("Skipping workflow {:?}: {}", path, e),
            }
        }

        workflows.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(workflows)
    }

    pub fn load_workflow(&self, name: &str) -> Result<WorkflowSpecification, WorkshopError> {
        validate_name(name)?;
        let path = self.workflows_dir().join(format!("{}.json", name));
        if !path.exists() {
            return Err(WorkshopError::WorkflowNotFound(name.to_string()));
        }
        read_workflow(&path)
    }

    /// Run a saved workflow's steps in order with `params` as the single
    /// argument of every step.
    pub async fn execute_workflow(
        &self,
        name: &str,
        params: &Value,
    ) -> Result<Vec<StepResult>, WorkshopError> {
        let workflow = self.load_workflow(name)?;
        let params_json = params.to_string();
        info!(
            "Running workflow '{}' ({} steps)",
            workflow.name,
            workflow.steps.len()
        );

        let mut results = Vec::with_capacity(workflow.steps.len());
        for step in &workflow.steps {
            let start = Instant::now();
            let outcome = self.run_step(&step.tool, &params_json).await;
            let elapsed = start.elapsed().as_millis() as u64;

            match outcome {
                Ok(output) => {
                    self.activity.record_timed(
                        LogEvent::WorkflowStep,
                        &workflow.name,
                        &format!("step {} succeeded", step.tool),
                        Some(json!({ "step": step.tool, "output": output })),
                        Some(elapsed),
                    );
                    results.push(StepResult {
                        step: step.tool.clone(),
                        output,
                    });
                }
                Err(e) => {
                    self.activity.record_timed(
                        LogEvent::Error,
                        &workflow.name,
                        &e.to_string(),
                        Some(json!({ "step": step.tool })),
                        Some(elapsed),
                    );
                    return Err(e);
                }
            }
        }

        Ok(results)
    }

    async fn run_step(&self, tool: &str, params_json: &str) -> Result<String, WorkshopError> {
        validate_name(tool)?;
        let script = self.tools_dir.join("tools").join(self.with_extension(tool));

        let mut command = match &self.interpreter {
            Some(interpreter) => {
                let mut c = Command::new(interpreter);
                c.arg(&script);
                c
            }
            None => Command::new(&script),
        };
        command
            .arg(params_json)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!("Running step {} via {:?}", tool, script);
        let child = command.spawn().map_err(|e| WorkshopError::StepExecution {
            step: tool.to_string(),
            code: -1,
            stderr: format!("failed to start {}: {}", script.display(), e),
        })?;

        let output = tokio::time::timeout(self.step_timeout, child.wait_with_output())
            .await
            .map_err(|_| WorkshopError::StepTimeout {
                step: tool.to_string(),
                timeout_secs: self.step_timeout.as_secs(),
            })??;

        if !output.status.success() {
            return Err(WorkshopError::StepExecution {
                step: tool.to_string(),
                code: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

fn read_workflow(path: &Path) -> Result<WorkflowSpecification, WorkshopError> {
    let content = fs::read_to_string(path)?;
    serde_json::from_str(&content).map_err(|e| WorkshopError::Parse(format!("{}: {}", path.display(), e)))
}
