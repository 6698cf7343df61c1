//! OpenAI-compatible HTTP client
//!
//! Implements both provider traits against `/embeddings` and
//! `/chat/completions`, with bearer auth and retry with exponential backoff
//! on the configured status codes.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, instrument, warn};

use super::{
    check_dimension, truncate_for_embedding, CompletionProvider, EmbeddingProvider, ProviderError,
    EMBEDDING_DIMENSION,
};
use crate::workflow::ProviderConfig;

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingDatum {
    embedding: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug)]
pub struct OpenAiClient {
    config: ProviderConfig,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAiClient {
    /// Build a client; fails when no API key is configured
    pub fn new(config: ProviderConfig) -> Result<Self, ProviderError> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| ProviderError::MissingCredentials("provider api_key".to_string()))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout))
            .build()
            .map_err(|e| ProviderError::Request(e.to_string()))?;

        Ok(Self {
            config,
            api_key,
            client,
        })
    }

    pub fn from_config(config: &ProviderConfig) -> Result<Self, ProviderError> {
        Self::new(config.clone())
    }

    fn build_url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.config.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    fn should_retry(&self, status: u16, attempt: u32) -> bool {
        match &self.config.retry {
            Some(retry) => {
                attempt + 1 < retry.max_attempts && retry.retry_on_status.contains(&status)
            }
            None => false,
        }
    }

    fn get_retry_delay(&self, attempt: u32) -> Duration {
        match &self.config.retry {
            Some(retry) => {
                let factor = 2u64
                    .checked_pow(attempt.saturating_sub(1))
                    .unwrap_or(u64::MAX);
                let delay = retry.initial_delay.saturating_mul(factor);
                Duration::from_millis(delay.min(retry.max_delay))
            }
            None => Duration::from_millis(1000),
        }
    }

    async fn post_with_retry(&self, path: &str, body: &Value) -> Result<Value, ProviderError> {
        let url = self.build_url(path);
        let max_attempts = self
            .config
            .retry
            .as_ref()
            .map(|r| r.max_attempts.max(1))
            .unwrap_or(1);

        let mut last_error = None;

        for attempt in 0..max_attempts {
            if attempt > 0 {
                let delay = self.get_retry_delay(attempt);
                warn!(
                    "Retrying provider request (attempt {}/{}) after {:?}",
                    attempt + 1,
                    max_attempts,
                    delay
                );
                tokio::time::sleep(delay).await;
            }

            let start = std::time::Instant::now();
            let request = self
                .client
                .post(&url)
                .header("Authorization", format!("Bearer {}", self.api_key))
                .json(body);

            match request.send().await {
                Ok(response) => {
                    let status = response.status().as_u16();
                    debug!("POST {} -> {} ({}ms)", url, status, start.elapsed().as_millis());

                    if response.status().is_success() {
                        return response
                            .json::<Value>()
                            .await
                            .map_err(|e| ProviderError::InvalidResponse(e.to_string()));
                    }

                    let message = response.text().await.unwrap_or_default();
                    let error = ProviderError::Http { status, message };
                    if self.should_retry(status, attempt) {
                        last_error = Some(error);
                        continue;
                    }
                    return Err(error);
                }
                Err(e) => {
                    warn!("Provider request failed: {}", e);
                    let retryable = e.is_connect() || e.is_timeout();
                    last_error = Some(ProviderError::Request(e.to_string()));
                    if !retryable {
                        break;
                    }
                }
            }
        }

        Err(last_error.unwrap_or_else(|| ProviderError::Request("Request failed".to_string())))
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiClient {
    #[instrument(skip(self, text), fields(chars = text.len()))]
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        let body = json!({
            "model": self.config.embedding_model,
            "input": truncate_for_embedding(text),
            "dimensions": EMBEDDING_DIMENSION,
        });

        let value = self.post_with_retry("embeddings", &body).await?;
        let response: EmbeddingResponse = serde_json::from_value(value)
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;

        let vector = response
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| ProviderError::InvalidResponse("empty embedding data".to_string()))?;

        check_dimension(&vector)?;
        Ok(vector)
    }
}

#[async_trait]
impl CompletionProvider for OpenAiClient {
    #[instrument(skip(self, prompt, system), fields(chars = prompt.len()))]
    async fn complete(
        &self,
        prompt: &str,
        system: Option<&str>,
    ) -> Result<String, ProviderError> {
        let mut messages = Vec::new();
        if let Some(system) = system {
            messages.push(json!({ "role": "system", "content": system }));
        }
        messages.push(json!({ "role": "user", "content": prompt }));

        let body = json!({
            "model": self.config.completion_model,
            "messages": messages,
            "temperature": 0.3,
        });

        let value = self.post_with_retry("chat/completions", &body).await?;
        let response: ChatResponse = serde_json::from_value(value)
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;

        response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| ProviderError::InvalidResponse("empty completion".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::RetryConfig;

    fn config_with_key() -> ProviderConfig {
        ProviderConfig {
            api_key: Some("sk-test".to_string()),
            base_url: "http://localhost:9999/v1/".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_missing_key_is_rejected() {
        let err = OpenAiClient::new(ProviderConfig::default()).unwrap_err();
        assert!(matches!(err, ProviderError::MissingCredentials(_)));
    }

    #[test]
    fn test_build_url() {
        let client = OpenAiClient::new(config_with_key()).unwrap();
        assert_eq!(
            client.build_url("/embeddings"),
            "http://localhost:9999/v1/embeddings"
        );
    }

    #[test]
    fn test_retry_delay_is_capped() {
        let mut config = config_with_key();
        config.retry = Some(RetryConfig {
            initial_delay: 1000,
            max_delay: 3000,
            ..Default::default()
        });
        let client = OpenAiClient::new(config).unwrap();
        assert_eq!(client.get_retry_delay(1), Duration::from_millis(1000));
        assert_eq!(client.get_retry_delay(2), Duration::from_millis(2000));
        assert_eq!(client.get_retry_delay(5), Duration::from_millis(3000));
    }

    #[test]
    fn test_retry_delay_saturates_on_late_attempts() {
        let mut config = config_with_key();
        config.retry = Some(RetryConfig {
            max_attempts: 200,
            initial_delay: 1000,
            max_delay: 30000,
            ..Default::default()
        });
        let client = OpenAiClient::new(config).unwrap();
        assert_eq!(client.get_retry_delay(60), Duration::from_millis(30000));
        assert_eq!(client.get_retry_delay(200), Duration::from_millis(30000));
    }

    #[test]
    fn test_should_retry_only_configured_statuses() {
        let mut config = config_with_key();
        config.retry = Some(RetryConfig::default());
        let client = OpenAiClient::new(config).unwrap();
        assert!(client.should_retry(503, 0));
        assert!(!client.should_retry(400, 0));
        assert!(!client.should_retry(503, 2));
    }
}
