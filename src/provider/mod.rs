//! External AI providers consumed by the workflow core
//!
//! This module provides:
//! - `EmbeddingProvider`: free text to a fixed-length vector
//! - `CompletionProvider`: prompt plus optional system instruction to analysis text
//! - `openai`: HTTP client for OpenAI-compatible endpoints
//! - `fallback`: deterministic placeholders and the guarded wrappers that
//!   apply the configured error policy

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub mod fallback;
pub mod openai;

pub use fallback::{FallbackCompleter, FallbackEmbedder, GuardedCompleter, GuardedEmbedder};
pub use openai::OpenAiClient;

/// Dimensionality of every embedding in the system
pub const EMBEDDING_DIMENSION: usize = 1536;

/// Maximum number of characters sent to the embedding endpoint
pub const MAX_EMBEDDING_INPUT_CHARS: usize = 8000;

/// Common error type for provider calls
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("Missing credentials: {0}")]
    MissingCredentials(String),

    #[error("HTTP error: {status} - {message}")]
    Http { status: u16, message: String },

    #[error("Request failed: {0}")]
    Request(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Embedding has {actual} dimensions, expected {expected}")]
    DimensionMismatch { expected: usize, actual: usize },
}

/// What to do when a configured provider call fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProviderErrorPolicy {
    /// Propagate the error so the current step fails
    Fail,
    /// Substitute a well-formed placeholder and continue
    #[default]
    Fallback,
}

/// Turns text into a vector of `EMBEDDING_DIMENSION` floats
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError>;
}

/// Turns a prompt into free-form text
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    async fn complete(&self, prompt: &str, system: Option<&str>)
        -> Result<String, ProviderError>;
}

/// Truncate text to the embedding input limit on a char boundary
pub fn truncate_for_embedding(text: &str) -> &str {
    match text.char_indices().nth(MAX_EMBEDDING_INPUT_CHARS) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Reject vectors that do not have the system-wide dimensionality
pub fn check_dimension(vector: &[f32]) -> Result<(), ProviderError> {
    if vector.len() != EMBEDDING_DIMENSION {
        return Err(ProviderError::DimensionMismatch {
            expected: EMBEDDING_DIMENSION,
            actual: vector.len(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_short_text_untouched() {
        assert_eq!(truncate_for_embedding("brake wear 42%"), "brake wear 42%");
    }

    #[test]
    fn test_truncate_long_text() {
        let text = "x".repeat(MAX_EMBEDDING_INPUT_CHARS + 500);
        assert_eq!(truncate_for_embedding(&text).len(), MAX_EMBEDDING_INPUT_CHARS);
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        let text = "°".repeat(MAX_EMBEDDING_INPUT_CHARS + 1);
        let truncated = truncate_for_embedding(&text);
        assert_eq!(truncated.chars().count(), MAX_EMBEDDING_INPUT_CHARS);
    }

    #[test]
    fn test_check_dimension() {
        assert!(check_dimension(&vec![0.0; EMBEDDING_DIMENSION]).is_ok());
        assert!(matches!(
            check_dimension(&[1.0, 2.0]),
            Err(ProviderError::DimensionMismatch { actual: 2, .. })
        ));
    }

    #[test]
    fn test_policy_parse() {
        let policy: ProviderErrorPolicy = serde_yaml::from_str("fail").unwrap();
        assert_eq!(policy, ProviderErrorPolicy::Fail);
        assert_eq!(ProviderErrorPolicy::default(), ProviderErrorPolicy::Fallback);
    }
}
