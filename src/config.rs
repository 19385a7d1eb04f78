//! Configuration management for agentforge
//!
//! Handles loading and merging configuration from multiple sources:
//! 1. Compiled defaults
//! 2. User config (~/.agentforge/config.toml)
//! 3. CLI-specified config file
//! 4. Environment variables

#![allow(dead_code)]

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub executor: ExecutorConfig,
    pub agents: AgentsConfig,
    pub plugins: PluginsConfig,
    pub llm: LlmConfig,
    pub github: GitHubConfig,
    pub rate_limits: RateLimitConfig,
    pub retry: RetryConfig,
    pub workshop: WorkshopConfig,
    pub logging: LoggingConfig,
}

/// Agent executor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Directory holding one AgentConfig file per agent
    pub agents_dir: PathBuf,
    /// Seconds to wait for an agent response
    pub command_timeout: u64,
    /// Maximum in-flight commands per agent
    pub max_pending: usize,
}

/// Settings shared by the agent processes
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentsConfig {
    /// Filesystem allow-list roots
    pub allowed_roots: Vec<PathBuf>,
    /// Seconds an external analysis tool may run
    pub analysis_timeout: u64,
    /// Command used for cyclomatic complexity
    pub complexity_command: Vec<String>,
    /// Command used for duplicate detection
    pub duplicates_command: Vec<String>,
    /// Command used for linting; must emit ESLint-style JSON
    pub lint_command: Vec<String>,
    /// Brave Search endpoint
    pub brave_endpoint: String,
}

/// Plugin configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PluginsConfig {
    /// Directory scanned for external plugin executables
    pub directory: PathBuf,
    /// Persisted enable/disable state
    pub config_path: PathBuf,
    /// Seconds an external hook may run
    pub timeout: u64,
}

/// LLM provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// LLM provider: ollama, openai
    pub provider: String,
    /// API base URL
    pub api_base: String,
    /// Model identifier
    pub default_model: String,
    /// Environment variable containing API key (openai only)
    pub api_key_env: String,
    /// Request timeout in seconds
    pub timeout: u64,
    /// Temperature for generation
    pub temperature: f32,
    /// Maximum tokens for response
    pub max_tokens: u32,
}

/// GitHub code search configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GitHubConfig {
    pub api_base: String,
    /// Environment variable containing the access token
    pub token_env: String,
    pub per_page: u32,
    /// Repositories sampled per generation
    pub max_repositories: usize,
    /// Files sampled per repository
    pub max_files_per_repository: usize,
}

/// Per-model request limits
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ModelLimit {
    pub requests_per_window: u32,
    pub window_ms: u64,
    pub retry_delay_ms: u64,
}

/// Rate limiter configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Limit applied to models without an explicit entry
    pub default: ModelLimit,
    /// Model id -> limit
    pub models: HashMap<String, ModelLimit>,
}

/// Retry/backoff configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub initial_delay_ms: u64,
    /// Minimum gap between consecutive calls
    pub min_interval_ms: u64,
}

/// Workshop persistence and workflow execution
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkshopConfig {
    /// Root holding templates/, custom/, workflows/ and tools/
    pub tools_dir: PathBuf,
    /// Program used to run step scripts; scripts run directly when unset
    pub interpreter: Option<String>,
    /// Extension appended to step tool names
    pub script_extension: Option<String>,
    /// Seconds a single step may run
    pub step_timeout: u64,
}

/// Activity log configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Record agent traffic, hooks and generation traces
    pub activity_log: bool,
    /// Log file path
    pub path: PathBuf,
    /// Maximum log file size before rotation
    pub max_size: u64,
    /// Number of rotated logs to keep
    pub retention: u32,
    /// Redact secrets from logs
    pub redact_secrets: bool,
}

fn base_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".agentforge")
}

// Default implementations

impl Default for Config {
    fn default() -> Self {
        Self {
            executor: ExecutorConfig::default(),
            agents: AgentsConfig::default(),
            plugins: PluginsConfig::default(),
            llm: LlmConfig::default(),
            github: GitHubConfig::default(),
            rate_limits: RateLimitConfig::default(),
            retry: RetryConfig::default(),
            workshop: WorkshopConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            agents_dir: base_dir().join("agents"),
            command_timeout: 30,
            max_pending: 16,
        }
    }
}

impl Default for AgentsConfig {
    fn default() -> Self {
        let mut allowed_roots = Vec::new();
        if let Some(home) = dirs::home_dir() {
            allowed_roots.push(home.join("Documents"));
            allowed_roots.push(home.join("Desktop"));
        }
        if let Ok(cwd) = std::env::current_dir() {
            allowed_roots.push(cwd);
        }
        Self {
            allowed_roots,
            analysis_timeout: 60,
            complexity_command: vec!["npx".to_string(), "cyclomatic-complexity".to_string()],
            duplicates_command: vec!["npx".to_string(), "jsinspect".to_string()],
            lint_command: vec![
                "npx".to_string(),
                "eslint".to_string(),
                "--format".to_string(),
                "json".to_string(),
            ],
            brave_endpoint: "https://api.search.brave.com/res/v1/web/search".to_string(),
        }
    }
}

impl Default for PluginsConfig {
    fn default() -> Self {
        let base = base_dir();
        Self {
            directory: base.join("plugins"),
            config_path: base.join("plugin-config.json"),
            timeout: 30,
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "ollama".to_string(),
            api_base: "http://localhost:11434".to_string(),
            default_model: "qwen2.5-coder".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            timeout: 120,
            temperature: 0.7,
            max_tokens: 2000,
        }
    }
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.github.com".to_string(),
            token_env: "GITHUB_TOKEN".to_string(),
            per_page: 10,
            max_repositories: 3,
            max_files_per_repository: 2,
        }
    }
}

impl Default for ModelLimit {
    fn default() -> Self {
        Self {
            requests_per_window: 100,
            window_ms: 60_000,
            retry_delay_ms: 5_000,
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        let mut models = HashMap::new();
        models.insert(
            "llama3:70b".to_string(),
            ModelLimit {
                requests_per_window: 200,
                window_ms: 30_000,
                retry_delay_ms: 5_000,
            },
        );
        models.insert(
            "llama2:13b".to_string(),
            ModelLimit {
                requests_per_window: 300,
                window_ms: 15_000,
                retry_delay_ms: 3_000,
            },
        );
        models.insert(
            "qwen2.5-coder:latest".to_string(),
            ModelLimit {
                requests_per_window: 400,
                window_ms: 10_000,
                retry_delay_ms: 2_000,
            },
        );
        Self {
            default: ModelLimit::default(),
            models,
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay_ms: 5_000,
            min_interval_ms: 1_000,
        }
    }
}

impl Default for WorkshopConfig {
    fn default() -> Self {
        Self {
            tools_dir: base_dir().join("mcp-tools"),
            interpreter: None,
            script_extension: None,
            step_timeout: 300,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            activity_log: true,
            path: base_dir().join("logs/activity.log"),
            max_size: 10 * 1024 * 1024, // 10MB
            retention: 5,
            redact_secrets: true,
        }
    }
}

/// Env prefix -> model id for rate limit overrides
const RATE_LIMIT_ENV_MODELS: [(&str, &str); 3] = [
    ("LLAMA3", "llama3:70b"),
    ("LLAMA2", "llama2:13b"),
    ("QWEN", "qwen2.5-coder:latest"),
];

impl Config {
    /// Load configuration from all sources
    pub fn load(cli_config: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = Config::default();

        // Load user config
        let user_config = base_dir().join("config.toml");
        if user_config.exists() {
            debug!("Loading user config from {:?}", user_config);
            config.merge_from_file(&user_config)?;
        }

        // Load CLI-specified config
        if let Some(path) = cli_config {
            debug!("Loading CLI config from {:?}", path);
            config.merge_from_file(path)?;
        }

        // Apply environment overrides
        config.apply_env_overrides();

        Ok(config)
    }

    /// Merge configuration from a file
    fn merge_from_file(&mut self, path: &Path) -> Result<(), ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Read(format!("{}: {}", path.display(), e)))?;

        let file_config: Config = toml::from_str(&contents)
            .map_err(|e| ConfigError::Parse(format!("{}: {}", path.display(), e)))?;

        self.merge(file_config);
        Ok(())
    }

    /// Merge another config into this one (other takes precedence)
    fn merge(&mut self, other: Config) {
        let defaults = Config::default();

        // Executor
        if other.executor.agents_dir != defaults.executor.agents_dir {
            self.executor.agents_dir = other.executor.agents_dir;
        }
        self.executor.command_timeout = other.executor.command_timeout;
        self.executor.max_pending = other.executor.max_pending;

        // Agents
        if other.agents.allowed_roots != defaults.agents.allowed_roots {
            self.agents.allowed_roots = other.agents.allowed_roots;
        }
        self.agents.analysis_timeout = other.agents.analysis_timeout;
        if other.agents.complexity_command != defaults.agents.complexity_command {
            self.agents.complexity_command = other.agents.complexity_command;
        }
        if other.agents.duplicates_command != defaults.agents.duplicates_command {
            self.agents.duplicates_command = other.agents.duplicates_command;
        }
        if other.agents.lint_command != defaults.agents.lint_command {
            self.agents.lint_command = other.agents.lint_command;
        }
        if other.agents.brave_endpoint != defaults.agents.brave_endpoint {
            self.agents.brave_endpoint = other.agents.brave_endpoint;
        }

        // Plugins
        if other.plugins.directory != defaults.plugins.directory {
            self.plugins.directory = other.plugins.directory;
        }
        if other.plugins.config_path != defaults.plugins.config_path {
            self.plugins.config_path = other.plugins.config_path;
        }
        self.plugins.timeout = other.plugins.timeout;

        // LLM - scalar tuning values always take the explicit value
        if other.llm.provider != defaults.llm.provider {
            self.llm.provider = other.llm.provider;
        }
        if other.llm.api_base != defaults.llm.api_base {
            self.llm.api_base = other.llm.api_base;
        }
        if other.llm.default_model != defaults.llm.default_model {
            self.llm.default_model = other.llm.default_model;
        }
        if other.llm.api_key_env != defaults.llm.api_key_env {
            self.llm.api_key_env = other.llm.api_key_env;
        }
        self.llm.timeout = other.llm.timeout;
        self.llm.temperature = other.llm.temperature;
        self.llm.max_tokens = other.llm.max_tokens;

        // GitHub
        if other.github.api_base != defaults.github.api_base {
            self.github.api_base = other.github.api_base;
        }
        if other.github.token_env != defaults.github.token_env {
            self.github.token_env = other.github.token_env;
        }
        self.github.per_page = other.github.per_page;
        self.github.max_repositories = other.github.max_repositories;
        self.github.max_files_per_repository = other.github.max_files_per_repository;

        // Rate limits - per-model entries are merged, not replaced
        self.rate_limits.default = other.rate_limits.default;
        for (model, limit) in other.rate_limits.models {
            self.rate_limits.models.insert(model, limit);
        }

        self.retry = other.retry;

        // Workshop
        if other.workshop.tools_dir != defaults.workshop.tools_dir {
            self.workshop.tools_dir = other.workshop.tools_dir;
        }
        if other.workshop.interpreter.is_some() {
            self.workshop.interpreter = other.workshop.interpreter;
        }
        if other.workshop.script_extension.is_some() {
            self.workshop.script_extension = other.workshop.script_extension;
        }
        self.workshop.step_timeout = other.workshop.step_timeout;

        // Logging - always take explicit values
        self.logging.activity_log = other.logging.activity_log;
        if other.logging.path != defaults.logging.path {
            self.logging.path = other.logging.path;
        }
        self.logging.max_size = other.logging.max_size;
        self.logging.retention = other.logging.retention;
        self.logging.redact_secrets = other.logging.redact_secrets;
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary key lookup
    fn apply_overrides_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = lookup("AGENTFORGE_AGENTS_DIR") {
            self.executor.agents_dir = PathBuf::from(dir);
        }
        if let Some(dir) = lookup("AGENTFORGE_PLUGIN_DIR") {
            self.plugins.directory = PathBuf::from(dir);
        }
        if let Some(roots) = lookup("AGENTFORGE_ALLOWED_ROOTS") {
            let roots: Vec<PathBuf> = std::env::split_paths(&roots).collect();
            if !roots.is_empty() {
                self.agents.allowed_roots = roots;
            }
        }
        if let Some(base) = lookup("OLLAMA_API_BASE") {
            self.llm.api_base = base;
        }
        if let Some(model) = lookup("OLLAMA_DEFAULT_MODEL") {
            self.llm.default_model = model;
        }

        for (prefix, model) in RATE_LIMIT_ENV_MODELS {
            let entry = self
                .rate_limits
                .models
                .entry(model.to_string())
                .or_insert_with(ModelLimit::default);

            if let Some(v) = lookup(&format!("RATE_LIMIT_{}_REQUESTS", prefix))
                .and_then(|v| v.parse().ok())
            {
                entry.requests_per_window = v;
            }
            if let Some(v) =
                lookup(&format!("RATE_LIMIT_{}_WINDOW", prefix)).and_then(|v| v.parse().ok())
            {
                entry.window_ms = v;
            }
            if let Some(v) =
                lookup(&format!("RATE_LIMIT_{}_RETRY", prefix)).and_then(|v| v.parse().ok())
            {
                entry.retry_delay_ms = v;
            }
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.llm.default_model.is_empty() {
            return Err(ConfigError::MissingField("llm.default_model".to_string()));
        }

        let valid_providers = ["ollama", "openai"];
        if !valid_providers.contains(&self.llm.provider.as_str()) {
            return Err(ConfigError::Invalid(format!(
                "llm.provider must be one of: {:?}",
                valid_providers
            )));
        }

        if self.executor.command_timeout == 0 || self.llm.timeout == 0 {
            return Err(ConfigError::Invalid(
                "timeouts must be greater than zero".to_string(),
            ));
        }

        if self.executor.max_pending == 0 {
            return Err(ConfigError::Invalid(
                "executor.max_pending must be greater than zero".to_string(),
            ));
        }

        if self.agents.allowed_roots.is_empty() {
            return Err(ConfigError::MissingField("agents.allowed_roots".to_string()));
        }

        Ok(())
    }

    /// Get the LLM API key from environment
    pub fn llm_api_key(&self) -> Option<String> {
        std::env::var(&self.llm.api_key_env).ok()
    }

    /// Get the GitHub token from environment
    pub fn github_token(&self) -> Option<String> {
        std::env::var(&self.github.token_env).ok()
    }
}
