//! Placeholder providers and policy-applying wrappers
//!
//! `GuardedEmbedder` and `GuardedCompleter` are the only providers the
//! workflow steps talk to. With no primary configured they always answer from
//! the fallback; with a primary, a failure either propagates or is replaced
//! depending on `ProviderErrorPolicy`.

use async_trait::async_trait;
use rand::{Rng, SeedableRng};
use sha2::{Digest, Sha256};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

use super::{
    check_dimension, truncate_for_embedding, CompletionProvider, EmbeddingProvider, ProviderError,
    ProviderErrorPolicy, EMBEDDING_DIMENSION,
};

const PLACEHOLDER_ANALYSES: [&str; 4] = [
    "Analysis service unavailable. Based on the supplied figures, proceed with standard operating procedures and re-run the analysis once the service is reachable.",
    "Automated analysis could not be generated. Review the listed metrics manually and prioritise any values outside their normal operating range.",
    "No AI analysis available at this time. Historical patterns suggest following the default maintenance and dispatch playbooks.",
    "The analysis model did not respond. Treat this result as provisional and confirm critical decisions with an operator.",
];

fn digest(text: &str) -> [u8; 32] {
    Sha256::digest(text.as_bytes()).into()
}

/// Deterministic pseudo-random embeddings of the correct dimensionality
#[derive(Debug, Clone, Default)]
pub struct FallbackEmbedder;

impl FallbackEmbedder {
    pub fn new() -> Self {
        Self
    }

    /// Same text always yields the same unit-length vector
    pub fn vector_for(&self, text: &str) -> Vec<f32> {
        let hash = digest(text);
        let mut seed = [0u8; 32];
        seed.copy_from_slice(&hash);
        let mut rng = rand::rngs::StdRng::from_seed(seed);

        let mut vector: Vec<f32> = (0..EMBEDDING_DIMENSION)
            .map(|_| rng.gen_range(-1.0f32..1.0))
            .collect();

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|v| *v /= norm);
        }

        debug!(digest = %hex::encode(&hash[..6]), "generated fallback embedding");
        vector
    }
}

#[async_trait]
impl EmbeddingProvider for FallbackEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        Ok(self.vector_for(truncate_for_embedding(text)))
    }
}

/// Templated placeholder analysis text, never empty
#[derive(Debug, Clone, Default)]
pub struct FallbackCompleter;

impl FallbackCompleter {
    pub fn new() -> Self {
        Self
    }

    pub fn placeholder_for(&self, prompt: &str) -> String {
        let index = digest(prompt)[0] as usize % PLACEHOLDER_ANALYSES.len();
        PLACEHOLDER_ANALYSES[index].to_string()
    }
}

#[async_trait]
impl CompletionProvider for FallbackCompleter {
    async fn complete(
        &self,
        prompt: &str,
        _system: Option<&str>,
    ) -> Result<String, ProviderError> {
        Ok(self.placeholder_for(prompt))
    }
}

/// Embedding provider with the configured error policy applied
pub struct GuardedEmbedder {
    primary: Option<Arc<dyn EmbeddingProvider>>,
    fallback: FallbackEmbedder,
    policy: ProviderErrorPolicy,
    warned_missing: AtomicBool,
}

impl GuardedEmbedder {
    pub fn new(primary: Option<Arc<dyn EmbeddingProvider>>, policy: ProviderErrorPolicy) -> Self {
        Self {
            primary,
            fallback: FallbackEmbedder::new(),
            policy,
            warned_missing: AtomicBool::new(false),
        }
    }

    /// Fallback-only embedder, used when no credentials are configured
    pub fn offline() -> Self {
        Self::new(None, ProviderErrorPolicy::Fallback)
    }

    pub fn policy(&self) -> ProviderErrorPolicy {
        self.policy
    }

    pub fn is_offline(&self) -> bool {
        self.primary.is_none()
    }
}

#[async_trait]
impl EmbeddingProvider for GuardedEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        let text = truncate_for_embedding(text);

        let Some(primary) = &self.primary else {
            if !self.warned_missing.swap(true, Ordering::Relaxed) {
                warn!("No embedding credentials configured, using fallback embeddings");
            }
            return self.fallback.embed(text).await;
        };

        let outcome = match primary.embed(text).await {
            Ok(vector) => check_dimension(&vector).map(|_| vector),
            Err(e) => Err(e),
        };

        match (outcome, self.policy) {
            (Ok(vector), _) => Ok(vector),
            (Err(e), ProviderErrorPolicy::Fail) => Err(e),
            (Err(e), ProviderErrorPolicy::Fallback) => {
                warn!("Embedding provider failed, substituting fallback vector: {}", e);
                self.fallback.embed(text).await
            }
        }
    }
}

/// Completion provider with the configured error policy applied
pub struct GuardedCompleter {
    primary: Option<Arc<dyn CompletionProvider>>,
    fallback: FallbackCompleter,
    policy: ProviderErrorPolicy,
    warned_missing: AtomicBool,
}

impl GuardedCompleter {
    pub fn new(primary: Option<Arc<dyn CompletionProvider>>, policy: ProviderErrorPolicy) -> Self {
        Self {
            primary,
            fallback: FallbackCompleter::new(),
            policy,
            warned_missing: AtomicBool::new(false),
        }
    }

    pub fn offline() -> Self {
        Self::new(None, ProviderErrorPolicy::Fallback)
    }

    pub fn policy(&self) -> ProviderErrorPolicy {
        self.policy
    }

    pub fn is_offline(&self) -> bool {
        self.primary.is_none()
    }
}

#[async_trait]
impl CompletionProvider for GuardedCompleter {
    async fn complete(
        &self,
        prompt: &str,
        system: Option<&str>,
    ) -> Result<String, ProviderError> {
        let Some(primary) = &self.primary else {
            if !self.warned_missing.swap(true, Ordering::Relaxed) {
                warn!("No completion credentials configured, using placeholder analyses");
            }
            return self.fallback.complete(prompt, system).await;
        };

        match (primary.complete(prompt, system).await, self.policy) {
            (Ok(text), _) if !text.trim().is_empty() => Ok(text),
            (Ok(_), ProviderErrorPolicy::Fail) => Err(ProviderError::InvalidResponse(
                "empty completion".to_string(),
            )),
            (Err(e), ProviderErrorPolicy::Fail) => Err(e),
            (outcome, ProviderErrorPolicy::Fallback) => {
                if let Err(e) = outcome {
                    warn!("Completion provider failed, substituting placeholder: {}", e);
                }
                self.fallback.complete(prompt, system).await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Broken;

    #[async_trait]
    impl EmbeddingProvider for Broken {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>, ProviderError> {
            Err(ProviderError::Http {
                status: 503,
                message: "unavailable".to_string(),
            })
        }
    }

    #[async_trait]
    impl CompletionProvider for Broken {
        async fn complete(&self, _p: &str, _s: Option<&str>) -> Result<String, ProviderError> {
            Err(ProviderError::Request("connection refused".to_string()))
        }
    }

    struct Short;

    #[async_trait]
    impl EmbeddingProvider for Short {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>, ProviderError> {
            Ok(vec![0.5; 8])
        }
    }

    #[test]
    fn test_fallback_vector_is_deterministic_and_unit_length() {
        let embedder = FallbackEmbedder::new();
        let a = embedder.vector_for("engine temp 101");
        let b = embedder.vector_for("engine temp 101");
        let c = embedder.vector_for("engine temp 88");

        assert_eq!(a.len(), EMBEDDING_DIMENSION);
        assert_eq!(a, b);
        assert_ne!(a, c);
        let norm: f32 = a.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_placeholder_is_never_empty() {
        let completer = FallbackCompleter::new();
        for prompt in ["", "a", "route", "emergency"] {
            assert!(!completer.placeholder_for(prompt).is_empty());
        }
    }

    #[tokio::test]
    async fn test_offline_embedder_uses_fallback() {
        let embedder = GuardedEmbedder::offline();
        let vector = embedder.embed("hello").await.unwrap();
        assert_eq!(vector.len(), EMBEDDING_DIMENSION);
        assert!(embedder.is_offline());
    }

    #[tokio::test]
    async fn test_fail_policy_propagates() {
        let embedder = GuardedEmbedder::new(Some(Arc::new(Broken)), ProviderErrorPolicy::Fail);
        assert!(embedder.embed("x").await.is_err());

        let completer = GuardedCompleter::new(Some(Arc::new(Broken)), ProviderErrorPolicy::Fail);
        assert!(completer.complete("x", None).await.is_err());
    }

    #[tokio::test]
    async fn test_fallback_policy_substitutes() {
        let embedder =
            GuardedEmbedder::new(Some(Arc::new(Broken)), ProviderErrorPolicy::Fallback);
        assert_eq!(embedder.embed("x").await.unwrap().len(), EMBEDDING_DIMENSION);

        let completer =
            GuardedCompleter::new(Some(Arc::new(Broken)), ProviderErrorPolicy::Fallback);
        assert!(!completer.complete("x", None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_malformed_primary_vector_never_escapes() {
        let strict = GuardedEmbedder::new(Some(Arc::new(Short)), ProviderErrorPolicy::Fail);
        assert!(matches!(
            strict.embed("x").await,
            Err(ProviderError::DimensionMismatch { actual: 8, .. })
        ));

        let lenient = GuardedEmbedder::new(Some(Arc::new(Short)), ProviderErrorPolicy::Fallback);
        assert_eq!(lenient.embed("x").await.unwrap().len(), EMBEDDING_DIMENSION);
    }
}
