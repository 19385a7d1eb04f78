//! Specification generator
//!
//! Turns a natural-language prompt into a validated tool or workflow
//! specification in four stages: analyze the prompt, search GitHub,
//! sample files from the hits, and synthesize the specification. Every
//! stage is recorded in a [`GenerationState`] that is returned with the
//! result and written to the activity log.
//!
//! Fetched files are only ever pasted into the prompt as examples.

#![allow(dead_code)]

mod prompts;
mod spec;

pub use spec::{
    validate_tool_spec, validate_workflow_spec, ToolParameter, ToolSpecification,
    WorkflowSpecification, WorkflowStep,
};

use crate::config::GitHubConfig;
use crate::error::GeneratorError;
use crate::github::{CodeSearch, Repository};
use crate::llm::{extract_json, parse_json_response, LlmClient, Message};
use crate::logging::{ActivityLog, LogEvent};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tracing::{debug, error, info, warn};

pub const TOOL_TYPES: [&str; 4] = ["web-scraper", "data-processor", "api-tool", "browser-automation"];

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Analysis,
    GithubSearch,
    FetchSamples,
    GenerateSpec,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CompletedStep {
    pub step: Stage,
    pub result: Value,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct StageError {
    pub stage: Stage,
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_response: Option<String>,
}

/// Trace of one generation run
#[derive(Debug, Clone, Serialize)]
pub struct GenerationState {
    pub kind: String,
    pub prompt: String,
    pub current_step: Option<Stage>,
    pub completed_steps: Vec<CompletedStep>,
    pub error: Option<StageError>,
    pub started_at: DateTime<Utc>,
    pub duration_ms: Option<u64>,
    #[serde(skip)]
    started: Option<Instant>,
    #[serde(skip)]
    step_started: Option<Instant>,
}

impl GenerationState {
    fn new(kind: &str, prompt: &str) -> Self {
        Self {
            kind: kind.to_string(),
            prompt: prompt.to_string(),
            current_step: None,
            completed_steps: Vec::new(),
            error: None,
            started_at: Utc::now(),
            duration_ms: None,
            started: Some(Instant::now()),
            step_started: None,
        }
    }

    fn begin(&mut self, stage: Stage) {
        self.current_step = Some(stage);
        self.step_started = Some(Instant::now());
    }

    fn complete(&mut self, stage: Stage, result: Value) {
        let duration_ms = self
            .step_started
            .take()
            .map(|t| t.elapsed().as_millis() as u64)
            .unwrap_or(0);
        self.completed_steps.push(CompletedStep {
            step: stage,
            result,
            duration_ms,
        });
    }

    pub fn completed(&self, stage: Stage) -> Option<&CompletedStep> {
        self.completed_steps.iter().find(|s| s.step == stage)
    }
}

/// File pulled from a repository as an example
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CodeSample {
    pub repo: String,
    pub file: String,
    pub content: String,
}

/// A repository or file that could not be fetched
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SampleError {
    pub repo: String,
    pub path: String,
    pub error: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolAnalysis {
    #[serde(rename = "toolType")]
    pub tool_type: String,
    #[serde(default)]
    pub requirements: Vec<String>,
    #[serde(rename = "searchQuery")]
    pub search_query: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkflowAnalysis {
    #[serde(default)]
    pub steps: Vec<Value>,
    #[serde(default)]
    pub innovations: Value,
    #[serde(rename = "searchQuery")]
    pub search_query: String,
}

/// Specification plus the trace that produced it
#[derive(Debug, Clone, Serialize)]
pub struct GenerationReport<S> {
    pub specification: S,
    pub state: GenerationState,
}

fn tool_sample_filter(tool_type: &str) -> impl Fn(&str) -> bool {
    let needle = tool_type.to_lowercase();
    move |name: &str| {
        name.to_lowercase().contains(&needle) || name.ends_with(".js") || name.ends_with(".py")
    }
}

fn workflow_sample_filter(name: &str) -> bool {
    let lower = name.to_lowercase();
    lower.contains("workflow")
        || lower.contains("pipeline")
        || name.ends_with(".yaml")
        || name.ends_with(".yml")
}

pub struct GeneratorService {
    llm: Arc<dyn LlmClient>,
    search: Arc<dyn CodeSearch>,
    max_repositories: usize,
    max_files_per_repository: usize,
    activity: Arc<ActivityLog>,
    last_state: Mutex<Option<GenerationState>>,
}

impl GeneratorService {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        search: Arc<dyn CodeSearch>,
        config: &GitHubConfig,
        activity: Arc<ActivityLog>,
    ) -> Self {
        Self {
            llm,
            search,
            max_repositories: config.max_repositories,
            max_files_per_repository: config.max_files_per_repository,
            activity,
            last_state: Mutex::new(None),
        }
    }

    /// Trace of the most recent run, successful or not
    pub fn last_state(&self) -> Option<GenerationState> {
        self.last_state
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }

    pub async fn generate_tool(
        &self,
        prompt: &str,
    ) -> Result<GenerationReport<ToolSpecification>, GeneratorError> {
        info!("Starting tool generation");
        let mut state = GenerationState::new("tool", prompt);
        let result = self.tool_pipeline(prompt, &mut state).await;
        self.finish(&mut state, result.as_ref().err());
        result.map(|specification| GenerationReport {
            specification,
            state,
        })
    }

    pub async fn generate_workflow(
        &self,
        prompt: &str,
    ) -> Result<GenerationReport<WorkflowSpecification>, GeneratorError> {
        info!("Starting workflow generation");
        let mut state = GenerationState::new("workflow", prompt);
        let result = self.workflow_pipeline(prompt, &mut state).await;
        self.finish(&mut state, result.as_ref().err());
        result.map(|specification| GenerationReport {
            specification,
            state,
        })
    }

    async fn tool_pipeline(
        &self,
        prompt: &str,
        state: &mut GenerationState,
    ) -> Result<ToolSpecification, GeneratorError> {
        state.begin(Stage::Analysis);
        let analysis: ToolAnalysis = self.analyze(prompts::tool_analysis(prompt)).await?;
        state.complete(Stage::Analysis, json!(analysis));
        self.trace(state);

        let repos = self.search_stage(&analysis.search_query, state).await?;

        state.begin(Stage::FetchSamples);
        let samples = self
            .collect_samples(&repos, tool_sample_filter(&analysis.tool_type), state)
            .await;

        state.begin(Stage::GenerateSpec);
        let (value, raw) = self
            .synthesize(prompts::tool_spec(prompt, &analysis, &samples))
            .await?;
        let spec = validate_tool_spec(&value)
            .map_err(|reason| GeneratorError::InvalidSpecification { reason, raw })?;
        state.complete(Stage::GenerateSpec, json!({ "specification": value }));
        Ok(spec)
    }

    async fn workflow_pipeline(
        &self,
        prompt: &str,
        state: &mut GenerationState,
    ) -> Result<WorkflowSpecification, GeneratorError> {
        state.begin(Stage::Analysis);
        let analysis: WorkflowAnalysis = self.analyze(prompts::workflow_analysis(prompt)).await?;
        state.complete(Stage::Analysis, json!(analysis));
        self.trace(state);

        let repos = self.search_stage(&analysis.search_query, state).await?;

        state.begin(Stage::FetchSamples);
        let samples = self
            .collect_samples(&repos, workflow_sample_filter, state)
            .await;

        state.begin(Stage::GenerateSpec);
        let (value, raw) = self
            .synthesize(prompts::workflow_spec(prompt, &analysis, &samples))
            .await?;
        let spec = validate_workflow_spec(&value)
            .map_err(|reason| GeneratorError::InvalidSpecification { reason, raw })?;
        state.complete(Stage::GenerateSpec, json!({ "specification": value }));
        Ok(spec)
    }

    async fn analyze<T: DeserializeOwned>(&self, messages: Vec<Message>) -> Result<T, GeneratorError> {
        let raw = self.llm.chat(&messages).await?;
        debug!("Analysis response: {}", raw);
        parse_json_response::<T>(&raw).map_err(|reason| GeneratorError::AnalysisParse { reason, raw })
    }

    async fn search_stage(
        &self,
        query: &str,
        state: &mut GenerationState,
    ) -> Result<Vec<Repository>, GeneratorError> {
        state.begin(Stage::GithubSearch);
        info!("Searching GitHub: {}", query);
        let mut repos = self.search.search_repositories(query).await?;
        repos.truncate(self.max_repositories);

        state.complete(
            Stage::GithubSearch,
            json!({
                "repoCount": repos.len(),
                "repos": repos.iter().map(|r| r.full_name.as_str()).collect::<Vec<_>>(),
            }),
        );
        self.trace(state);
        Ok(repos)
    }

    /// Up to `max_files_per_repository` matching files from each repository.
    /// Listing or fetch failures are recorded and skipped.
    async fn collect_samples<F>(
        &self,
        repos: &[Repository],
        relevant: F,
        state: &mut GenerationState,
    ) -> Vec<CodeSample>
    where
        F: Fn(&str) -> bool,
    {
        let mut samples = Vec::new();
        let mut errors = Vec::new();

        for repo in repos {
            let entries = match self.search.list_files(repo).await {
                Ok(entries) => entries,
                Err(e) => {
                    warn!("Failed to list {}: {}", repo.full_name, e);
                    errors.push(SampleError {
                        repo: repo.full_name.clone(),
                        path: String::new(),
                        error: e.to_string(),
                    });
                    continue;
                }
            };

            let mut taken = 0;
            for entry in entries.iter().filter(|e| e.is_file() && relevant(&e.name)) {
                if taken >= self.max_files_per_repository {
                    break;
                }
                match self.search.fetch_file(repo, &entry.path).await {
                    Ok(content) => {
                        samples.push(CodeSample {
                            repo: repo.full_name.clone(),
                            file: entry.name.clone(),
                            content,
                        });
                        taken += 1;
                    }
                    Err(e) => {
                        warn!("Failed to fetch {}/{}: {}", repo.full_name, entry.path, e);
                        errors.push(SampleError {
                            repo: repo.full_name.clone(),
                            path: entry.path.clone(),
                            error: e.to_string(),
                        });
                    }
                }
            }
        }

        state.complete(
            Stage::FetchSamples,
            json!({ "sampleCount": samples.len(), "errors": errors }),
        );
        self.trace(state);
        samples
    }

    async fn synthesize(&self, messages: Vec<Message>) -> Result<(Value, String), GeneratorError> {
        let raw = self.llm.chat(&messages).await?;
        debug!("Specification response: {}", raw);

        let parsed = extract_json(&raw).and_then(|candidate| serde_json::from_str::<Value>(&candidate).ok());
        match parsed {
            Some(value) => Ok((value, raw)),
            None => Err(GeneratorError::InvalidSpecification {
                reason: "response does not contain a JSON object".to_string(),
                raw,
            }),
        }
    }

    fn trace(&self, state: &GenerationState) {
        self.activity.record(
            LogEvent::Generation,
            &state.kind,
            &format!("{} completed steps", state.completed_steps.len()),
            serde_json::to_value(state).ok(),
        );
    }

    fn finish(&self, state: &mut GenerationState, failure: Option<&GeneratorError>) {
        let duration_ms = state
            .started
            .map(|t| t.elapsed().as_millis() as u64)
            .unwrap_or(0);
        state.duration_ms = Some(duration_ms);

        match failure {
            Some(e) => {
                let stage = state.current_step.unwrap_or(Stage::Analysis);
                state.error = Some(StageError {
                    stage,
                    error: e.to_string(),
                    raw_response: e.raw_output().map(str::to_string),
                });
                error!("{} generation failed at {:?}: {}", state.kind, stage, e);
                self.activity.record_timed(
                    LogEvent::Error,
                    &state.kind,
                    &e.to_string(),
                    serde_json::to_value(&*state).ok(),
                    Some(duration_ms),
                );
            }
            None => {
                info!("{} generation completed in {}ms", state.kind, duration_ms);
                self.activity.record_timed(
                    LogEvent::Generation,
                    &state.kind,
                    "generation completed",
                    serde_json::to_value(&*state).ok(),
                    Some(duration_ms),
                );
            }
        }

        *self.last_state.lock().unwrap_or_else(|p| p.into_inner()) = Some(state.clone());
    }
}
