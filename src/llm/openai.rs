//! OpenAI-compatible chat completions client

use super::{LlmClient, Message};
use crate::config::LlmConfig;
use crate::error::LlmError;
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

pub struct OpenAiClient {
    http: reqwest::Client,
    api_base: String,
    api_key: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
}

impl OpenAiClient {
    pub fn new(config: &LlmConfig, api_key: String) -> Result<Self, LlmError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout))
            .build()?;

        Ok(Self {
            http,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            api_key,
            model: config.default_model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        })
    }

    async fn send_request(&self, messages: &[Message]) -> Result<Value, LlmError> {
        let request_body = serde_json::json!({
            "model": self.model,
            "messages": messages,
            "max_tokens": self.max_tokens,
            "temperature": self.temperature,
        });

        let response = self
            .http
            .post(format!("{}/chat/completions", self.api_base))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request_body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(LlmError::Api {
                status: status.as_u16(),
                message: error_text,
            });
        }

        Ok(response.json().await?)
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    fn model(&self) -> &str {
        &self.model
    }

    async fn chat(&self, messages: &[Message]) -> Result<String, LlmError> {
        debug!("Sending {} messages to {}", messages.len(), self.api_base);
        let response_json = self.send_request(messages).await?;

        response_json["choices"][0]["message"]["content"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| LlmError::Parse("No content in response".to_string()))
    }

    async fn health_check(&self) -> Result<(), LlmError> {
        let response = self
            .http
            .get(format!("{}/models", self.api_base))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .send()
            .await?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(LlmError::Unavailable(format!(
                "{} answered {}",
                self.api_base,
                response.status()
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    fn client(base: &str) -> OpenAiClient {
        let config = LlmConfig {
            provider: "openai".to_string(),
            api_base: base.to_string(),
            default_model: "gpt-4o-mini".to_string(),
            ..LlmConfig::default()
        };
        OpenAiClient::new(&config, "sk-test".to_string()).unwrap()
    }

    #[tokio::test]
    async fn test_chat_completion() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/chat/completions")
            .match_header("authorization", "Bearer sk-test")
            .match_body(Matcher::PartialJson(serde_json::json!({"model": "gpt-4o-mini"})))
            .with_status(200)
            .with_body(r#"{"choices": [{"message": {"role": "assistant", "content": "{}"}}]}"#)
            .create_async()
            .await;

        let reply = client(&format!("{}/v1", server.url()))
            .chat(&[Message::system("s"), Message::user("u")])
            .await
            .unwrap();
        mock.assert_async().await;
        assert_eq!(reply, "{}");
    }

    #[tokio::test]
    async fn test_rate_limited_response() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/chat/completions")
            .with_status(429)
            .with_body("slow down")
            .create_async()
            .await;

        let err = client(&server.url())
            .chat(&[Message::user("u")])
            .await
            .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::RateLimit);
    }

    #[tokio::test]
    async fn test_missing_content() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/chat/completions")
            .with_status(200)
            .with_body(r#"{"choices": []}"#)
            .create_async()
            .await;

        let err = client(&server.url())
            .chat(&[Message::user("u")])
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::Parse(_)));
    }
}
