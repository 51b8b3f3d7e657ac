//! Chat-completions client for the answer generator.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum UpstreamError {
    #[error("request to language model failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("language model returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("language model returned no completion text")]
    EmptyCompletion,
    #[error("language model did not answer within {0:?}")]
    Timeout(Duration),
}

/// Sampling parameters sent with each prompt.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Generation {
    pub max_tokens: u32,
    pub temperature: f32,
}

#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn complete(&self, prompt: &str, params: Generation) -> Result<String, UpstreamError>;
}

#[derive(Clone)]
pub struct OpenAIClient {
    client: Client,
    api_key: String,
    api_base: String,
    model: String,
}

impl OpenAIClient {
    pub fn new(api_key: String, api_base: String, model: String) -> Self {
        Self {
            client: Client::new(),
            api_key,
            api_base,
            model,
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.api_base.trim_end_matches('/'))
    }
}

#[async_trait]
impl LanguageModel for OpenAIClient {
    async fn complete(&self, prompt: &str, params: Generation) -> Result<String, UpstreamError> {
        let payload = json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": prompt }],
            "temperature": params.temperature,
            "max_tokens": params.max_tokens,
        });

        debug!(model = %self.model, max_tokens = params.max_tokens, "sending completion request");
        let response = self
            .client
            .post(self.endpoint())
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&payload)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(UpstreamError::Status { status, body });
        }

        let body: Value = response.json().await?;
        extract_completion(&body)
    }
}

fn extract_completion(body: &Value) -> Result<String, UpstreamError> {
    body["choices"][0]["message"]["content"]
        .as_str()
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(str::to_string)
        .ok_or(UpstreamError::EmptyCompletion)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_trimmed_content() {
        let body = json!({
            "choices": [{ "message": { "role": "assistant", "content": "  ### Hello\n" } }]
        });
        assert_eq!(extract_completion(&body).unwrap(), "### Hello");
    }

    #[test]
    fn missing_or_blank_content_is_an_error() {
        assert!(matches!(
            extract_completion(&json!({ "choices": [] })),
            Err(UpstreamError::EmptyCompletion)
        ));
        assert!(matches!(
            extract_completion(&json!({ "choices": [{ "message": { "content": "   " } }] })),
            Err(UpstreamError::EmptyCompletion)
        ));
    }

    #[test]
    fn endpoint_joins_base_url() {
        let client = OpenAIClient::new(
            "key".to_string(),
            "https://api.example.com/v1/".to_string(),
            "gpt-4o-mini".to_string(),
        );
        assert_eq!(client.endpoint(), "https://api.example.com/v1/chat/completions");
        assert_eq!(client.model(), "gpt-4o-mini");
    }
}
