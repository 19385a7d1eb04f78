//! Compiled-in plugins
//!
//! The catalog below is what the manager can load without touching the
//! plugin directory. Whether each entry is actually loaded is decided by
//! the persisted plugin configuration.

use super::hooks::HookHandler;
use super::Plugin;
use crate::error::PluginError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info};

pub const WEB_SEARCH_PLUGIN: &str = "web-search-plugin";

const GOOGLE_CSE_URL: &str = "https://www.googleapis.com/customsearch/v1";
const POSTPROCESS_LIMIT: usize = 5;

/// Every compiled-in plugin
pub fn catalog() -> Vec<Arc<dyn Plugin>> {
    vec![Arc::new(WebSearchPlugin::from_env())]
}

/// One search hit
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchResult {
    pub title: String,
    pub link: String,
    #[serde(default)]
    pub snippet: String,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    items: Vec<SearchResult>,
}

/// Web search through the Google Custom Search API
pub struct WebSearchPlugin {
    http: reqwest::Client,
    api_key: Option<String>,
    engine_id: Option<String>,
    base_url: String,
}

impl WebSearchPlugin {
    /// Credentials from `SEARCH_API_KEY` and `SEARCH_ENGINE_ID`
    pub fn from_env() -> Self {
        Self::new(
            std::env::var("SEARCH_API_KEY").ok(),
            std::env::var("SEARCH_ENGINE_ID").ok(),
            GOOGLE_CSE_URL,
        )
    }

    pub fn new(api_key: Option<String>, engine_id: Option<String>, base_url: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key: api_key.filter(|k| !k.is_empty()),
            engine_id: engine_id.filter(|id| !id.is_empty()),
            base_url: base_url.to_string(),
        }
    }

    /// Run a search. Extra `options` are passed through as query parameters.
    pub async fn search(
        &self,
        query: &str,
        options: &[(String, String)],
    ) -> Result<Vec<SearchResult>, PluginError> {
        let (Some(key), Some(cx)) = (&self.api_key, &self.engine_id) else {
            return Err(PluginError::Config(
                "Search API credentials not configured".to_string(),
            ));
        };

        info!("Web search: {}", query);
        let response = self
            .http
            .get(&self.base_url)
            .query(&[("key", key.as_str()), ("cx", cx.as_str()), ("q", query)])
            .query(options)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PluginError::Request(format!("{} - {}", status, body)));
        }

        let parsed: SearchResponse = response.json().await?;
        debug!("Web search returned {} results", parsed.items.len());
        Ok(parsed.items)
    }
}

fn preprocess_query(args: &[Value]) -> Result<Value, PluginError> {
    let query = args
        .first()
        .and_then(Value::as_str)
        .ok_or_else(|| PluginError::Hook {
            hook: "search:preprocess".to_string(),
            message: "expected a query string".to_string(),
        })?;
    Ok(json!(query.trim().to_lowercase()))
}

fn postprocess_results(args: &[Value]) -> Result<Value, PluginError> {
    let results = args
        .first()
        .and_then(Value::as_array)
        .ok_or_else(|| PluginError::Hook {
            hook: "search:postprocess".to_string(),
            message: "expected a result array".to_string(),
        })?;
    Ok(Value::Array(
        results.iter().take(POSTPROCESS_LIMIT).cloned().collect(),
    ))
}

#[async_trait]
impl Plugin for WebSearchPlugin {
    fn name(&self) -> &str {
        WEB_SEARCH_PLUGIN
    }

    fn description(&self) -> &str {
        "Google Custom Search with query normalisation hooks"
    }

    fn validate(&self) -> bool {
        self.api_key.is_some() && self.engine_id.is_some()
    }

    fn hooks(&self) -> Vec<(String, Arc<dyn HookHandler>)> {
        let preprocess: Arc<dyn HookHandler> =
            Arc::new(|args: Vec<Value>| async move { preprocess_query(&args) });
        let postprocess: Arc<dyn HookHandler> =
            Arc::new(|args: Vec<Value>| async move { postprocess_results(&args) });
        vec![
            ("search:preprocess".to_string(), preprocess),
            ("search:postprocess".to_string(), postprocess),
        ]
    }

    /// Input is either a query string or `{"query": ..., "options": {...}}`
    async fn invoke(&self, input: Value) -> Result<Value, PluginError> {
        let (query, options) = match &input {
            Value::String(q) => (q.clone(), Vec::new()),
            Value::Object(map) => {
                let query = map
                    .get("query")
                    .and_then(Value::as_str)
                    .ok_or_else(|| PluginError::Invalid("missing 'query'".to_string()))?
                    .to_string();
                let options = map
                    .get("options")
                    .and_then(Value::as_object)
                    .map(|o| {
                        o.iter()
                            .map(|(k, v)| {
                                let v = v.as_str().map(str::to_string).unwrap_or_else(|| v.to_string());
                                (k.clone(), v)
                            })
                            .collect()
                    })
                    .unwrap_or_default();
                (query, options)
            }
            _ => return Err(PluginError::Invalid("expected a query".to_string())),
        };

        let results = self.search(&query, &options).await?;
        serde_json::to_value(results).map_err(|e| PluginError::Protocol(e.to_string()))
    }
}
