//! Ollama client

use super::{LlmClient, Message};
use crate::config::LlmConfig;
use crate::error::LlmError;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, warn};

pub struct OllamaClient {
    http: reqwest::Client,
    api_base: String,
    model: String,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<TagEntry>,
}

#[derive(Debug, Deserialize)]
struct TagEntry {
    name: String,
}

impl OllamaClient {
    pub fn new(config: &LlmConfig) -> Result<Self, LlmError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout))
            .build()?;

        Ok(Self {
            http,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            model: config.default_model.clone(),
            temperature: config.temperature,
        })
    }

    /// Names of the models the server has pulled
    pub async fn list_models(&self) -> Result<Vec<String>, LlmError> {
        let response = self
            .http
            .get(format!("{}/api/tags", self.api_base))
            .send()
            .await?;
        let tags: TagsResponse = check_status(response).await?.json().await?;
        Ok(tags.models.into_iter().map(|m| m.name).collect())
    }

    /// Whether `model` (or `model:latest`) is available.
    ///
    /// An unreachable server counts as unavailable.
    pub async fn check_model_availability(&self, model: &str) -> bool {
        match self.list_models().await {
            Ok(models) => {
                let latest = format!("{}:latest", model);
                models.iter().any(|m| m == model || *m == latest)
            }
            Err(e) => {
                warn!("Failed to check model availability: {}", e);
                false
            }
        }
    }

    /// Single-prompt completion through `/api/generate`
    pub async fn generate(&self, prompt: &str) -> Result<String, LlmError> {
        let body = json!({
            "model": self.model,
            "prompt": prompt,
            "stream": false,
            "options": { "temperature": self.temperature },
        });

        let response = self
            .http
            .post(format!("{}/api/generate", self.api_base))
            .json(&body)
            .send()
            .await?;
        let data: Value = check_status(response).await?.json().await?;

        data["response"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| LlmError::Parse("No response field in generate reply".to_string()))
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, LlmError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = response.text().await.unwrap_or_default();
    Err(LlmError::Api {
        status: status.as_u16(),
        message,
    })
}

#[async_trait]
impl LlmClient for OllamaClient {
    fn model(&self) -> &str {
        &self.model
    }

    async fn chat(&self, messages: &[Message]) -> Result<String, LlmError> {
        debug!("Ollama chat with {} messages", messages.len());
        let body = json!({
            "model": self.model,
            "messages": messages,
            "stream": false,
            "options": { "temperature": self.temperature },
        });

        let response = self
            .http
            .post(format!("{}/api/chat", self.api_base))
            .json(&body)
            .send()
            .await?;
        let data: Value = check_status(response).await?.json().await?;

        data["message"]["content"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| LlmError::Parse("No content in chat reply".to_string()))
    }

    async fn health_check(&self) -> Result<(), LlmError> {
        if self.check_model_availability(&self.model).await {
            Ok(())
        } else {
            Err(LlmError::Unavailable(format!(
                "Model {} not available at {}",
                self.model, self.api_base
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    fn client(base: &str) -> OllamaClient {
        let config = LlmConfig {
            api_base: base.to_string(),
            default_model: "qwen2.5-coder".to_string(),
            ..LlmConfig::default()
        };
        OllamaClient::new(&config).unwrap()
    }

    #[tokio::test]
    async fn test_chat() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/chat")
            .match_body(Matcher::PartialJson(json!({
                "model": "qwen2.5-coder",
                "stream": false,
                "messages": [{"role": "user", "content": "hi"}]
            })))
            .with_status(200)
            .with_body(r#"{"message": {"role": "assistant", "content": "hello"}}"#)
            .create_async()
            .await;

        let reply = client(&server.url())
            .chat(&[Message::user("hi")])
            .await
            .unwrap();
        mock.assert_async().await;
        assert_eq!(reply, "hello");
    }

    #[tokio::test]
    async fn test_generate() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/generate")
            .with_status(200)
            .with_body(r#"{"response": "42"}"#)
            .create_async()
            .await;

        assert_eq!(client(&server.url()).generate("?").await.unwrap(), "42");
    }

    #[tokio::test]
    async fn test_availability_accepts_latest_tag() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/tags")
            .with_status(200)
            .with_body(r#"{"models": [{"name": "qwen2.5-coder:latest"}, {"name": "llama3:70b"}]}"#)
            .expect_at_least(1)
            .create_async()
            .await;

        let client = client(&server.url());
        assert!(client.check_model_availability("qwen2.5-coder").await);
        assert!(client.check_model_availability("llama3:70b").await);
        assert!(!client.check_model_availability("llama2:13b").await);
        assert!(client.health_check().await.is_ok());
    }

    #[tokio::test]
    async fn test_server_error_maps_status() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/chat")
            .with_status(503)
            .with_body("loading model")
            .create_async()
            .await;

        let err = client(&server.url())
            .chat(&[Message::user("hi")])
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::Api { status: 503, .. }));
        assert!(err.kind().is_retryable());
    }
}
