//! Tool-integration agent
//!
//! Exposes namespaced tools (`server.tool`) for filesystem access, Brave web
//! search, URL fetching and SQLite table listing.

use super::allowlist::PathPolicy;
use super::filesystem::list_entries;
use super::registry::{bind, required_arg, CapabilityRegistry, HandlerResult};
use crate::config::AgentsConfig;
use crate::error::AgentError;
use rusqlite::{Connection, OpenFlags};
use serde::Deserialize;
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

const PREVIEW_CHARS: usize = 500;
const DEFAULT_DATABASE: &str = "agentforge.db";

pub struct ToolIntegrationAgent {
    policy: PathPolicy,
    http: reqwest::Client,
    brave_endpoint: String,
    brave_api_key: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BraveResponse {
    #[serde(default)]
    web: Option<BraveWeb>,
}

#[derive(Debug, Deserialize)]
struct BraveWeb {
    #[serde(default)]
    results: Vec<BraveResult>,
}

#[derive(Debug, Deserialize)]
struct BraveResult {
    title: String,
    url: String,
    #[serde(default)]
    description: String,
}

impl ToolIntegrationAgent {
    pub fn new(policy: PathPolicy, config: &AgentsConfig) -> Result<Self, AgentError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(concat!("agentforge/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            policy,
            http,
            brave_endpoint: config.brave_endpoint.clone(),
            brave_api_key: std::env::var("BRAVE_API_KEY").ok().filter(|k| !k.is_empty()),
        })
    }

    /// Override the Brave key and endpoint
    pub fn with_brave(mut self, endpoint: &str, api_key: Option<String>) -> Self {
        self.brave_endpoint = endpoint.to_string();
        self.brave_api_key = api_key;
        self
    }

    pub fn registry(self) -> CapabilityRegistry {
        let agent = Arc::new(self);
        let mut registry = CapabilityRegistry::new("tool-integration");

        registry.register(
            "filesystem.list_allowed_directories",
            bind(Arc::clone(&agent), |a, _args| async move {
                Ok::<_, AgentError>(a.list_allowed_directories())
            }),
        );
        registry.register(
            "filesystem.list_directory",
            bind(Arc::clone(&agent), |a, args| async move {
                a.list_directory(required_arg(&args, "path")?).await
            }),
        );
        registry.register(
            "filesystem.read_file",
            bind(Arc::clone(&agent), |a, args| async move {
                a.read_file(required_arg(&args, "path")?).await
            }),
        );
        registry.register(
            "brave-search.brave_web_search",
            bind(Arc::clone(&agent), |a, args| async move {
                required_arg(&args, "query")?;
                a.brave_web_search(&args.join(" ")).await
            }),
        );
        registry.register(
            "fetch.fetch",
            bind(Arc::clone(&agent), |a, args| async move {
                a.fetch(required_arg(&args, "url")?).await
            }),
        );
        registry.register(
            "sqlite.list-tables",
            bind(agent, |a, args| async move {
                a.list_tables(args.first().map(String::as_str)).await
            }),
        );

        registry
    }

    pub fn list_allowed_directories(&self) -> serde_json::Value {
        json!(self
            .policy
            .roots()
            .iter()
            .map(|r| r.display().to_string())
            .collect::<Vec<_>>())
    }

    pub async fn list_directory(&self, dir: &str) -> HandlerResult {
        let path = self.policy.resolve(dir)?;
        Ok(json!(list_entries(&path).await?))
    }

    pub async fn read_file(&self, file: &str) -> HandlerResult {
        let path = self.policy.resolve(file)?;
        Ok(json!(tokio::fs::read_to_string(&path).await?))
    }

    pub async fn brave_web_search(&self, query: &str) -> HandlerResult {
        let key = self
            .brave_api_key
            .as_deref()
            .ok_or_else(|| AgentError::NotConfigured("BRAVE_API_KEY is not set".to_string()))?;

        info!("Brave search: {}", query);
        let response = self
            .http
            .get(&self.brave_endpoint)
            .query(&[("q", query)])
            .header("Accept", "application/json")
            .header("X-Subscription-Token", key)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AgentError::Http(format!("{} - {}", status, body)));
        }

        let parsed: BraveResponse = response.json().await?;
        let results: Vec<_> = parsed
            .web
            .map(|w| w.results)
            .unwrap_or_default()
            .into_iter()
            .map(|r| json!({ "title": r.title, "url": r.url, "snippet": r.description }))
            .collect();

        Ok(json!({ "query": query, "results": results }))
    }

    pub async fn fetch(&self, url: &str) -> HandlerResult {
        debug!("Fetching {}", url);
        let content = self
            .http
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;

        let preview: String = content.chars().take(PREVIEW_CHARS).collect();
        let preview = if preview.len() < content.len() {
            format!("{}...", preview)
        } else {
            preview
        };

        Ok(json!({
            "url": url,
            "contentLength": content.chars().count(),
            "contentPreview": preview,
        }))
    }

    /// List tables of a SQLite database inside the allow-list
    pub async fn list_tables(&self, database: Option<&str>) -> HandlerResult {
        let requested = match database {
            Some(db) => db.to_string(),
            None => self
                .policy
                .roots()
                .first()
                .map(|root| root.join(DEFAULT_DATABASE))
                .ok_or_else(|| AgentError::NotConfigured("no allowed roots".to_string()))?
                .display()
                .to_string(),
        };
        let path = self.policy.resolve(&requested)?;

        let db_path = path.clone();
        let tables = tokio::task::spawn_blocking(move || read_table_names(db_path))
            .await
            .map_err(|e| AgentError::Sqlite(e.to_string()))??;

        Ok(json!({
            "database": path.display().to_string(),
            "tables": tables,
        }))
    }
}

fn read_table_names(path: PathBuf) -> Result<Vec<String>, AgentError> {
    // Read-only open never creates the file
    let conn = Connection::open_with_flags(&path, OpenFlags::SQLITE_OPEN_READ_ONLY)?;
    let mut stmt = conn.prepare(
        "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
    )?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(names)
}
