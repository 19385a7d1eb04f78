//! LLM access
//!
//! Provider clients sit behind [`LlmClient`]; the [`LlmGateway`] adds
//! per-model rate limiting and retry on top of whichever one is configured.

#![allow(dead_code)]

mod gateway;
mod json;
mod ollama;
mod openai;
mod rate_limiter;
mod retry;

pub use gateway::LlmGateway;
pub use json::{extract_json, parse_json_response};
pub use ollama::OllamaClient;
pub use openai::OpenAiClient;
pub use rate_limiter::{CooldownStatus, RateLimiter};
pub use retry::RetryPolicy;

use crate::config::Config;
use crate::error::LlmError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Message in a conversation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub role: String,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

/// A chat-capable model endpoint
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Model identifier used for requests and rate limiting
    fn model(&self) -> &str;

    /// Send a conversation and return the assistant's reply text
    async fn chat(&self, messages: &[Message]) -> Result<String, LlmError>;

    /// Check that the endpoint is reachable and serves the model
    async fn health_check(&self) -> Result<(), LlmError>;
}

/// Build the configured provider client
pub fn build_client(config: &Config) -> Result<Arc<dyn LlmClient>, LlmError> {
    match config.llm.provider.as_str() {
        "ollama" => Ok(Arc::new(OllamaClient::new(&config.llm)?)),
        "openai" => {
            let api_key = config.llm_api_key().ok_or_else(|| {
                LlmError::Unavailable(format!("API key not found in {}", config.llm.api_key_env))
            })?;
            Ok(Arc::new(OpenAiClient::new(&config.llm, api_key)?))
        }
        other => Err(LlmError::Unavailable(format!("unknown provider '{}'", other))),
    }
}
