// Embedding and summary providers

pub mod hashing;
pub mod http;
pub mod summary;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::OnceCell;
use tracing::info;

use crate::config::EmbeddingConfig;

pub use hashing::HashingEmbedder;
pub use http::HttpEmbedder;
pub use summary::{HttpSummarizer, SummaryProvider};

/// Errors that can occur during embedding or summary generation.
#[derive(Error, Debug)]
pub enum EmbeddingError {
    #[error("API request failed: {0}")]
    ApiError(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Rate limited after {0} retries")]
    RateLimited(u32),

    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("Invalid provider configuration: {0}")]
    Config(String),
}

/// Turns text into fixed-length, L2-normalized vectors.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed multiple texts; the output is parallel to `texts`.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError>;

    fn dimensions(&self) -> usize;

    fn model_name(&self) -> &str;

    fn max_batch_size(&self) -> usize {
        32
    }

    /// Embed in chunks of `max_batch_size`, rejecting vectors whose length
    /// is not `dimensions`.
    async fn embed_all(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let dims = self.dimensions();
        let mut vectors = Vec::with_capacity(texts.len());
        for chunk in texts.chunks(self.max_batch_size().max(1)) {
            let batch = self.embed_batch(chunk).await?;
            if batch.len() != chunk.len() {
                return Err(EmbeddingError::InvalidResponse(format!(
                    "expected {} embeddings, got {}",
                    chunk.len(),
                    batch.len()
                )));
            }
            if let Some(bad) = batch.iter().find(|v| v.len() != dims) {
                return Err(EmbeddingError::InvalidResponse(format!(
                    "{} returned a {}-dimensional vector, expected {}",
                    self.model_name(),
                    bad.len(),
                    dims
                )));
            }
            vectors.extend(batch);
        }
        Ok(vectors)
    }
}

/// Build the provider described by `config`.
pub fn build_provider(config: &EmbeddingConfig) -> Result<Arc<dyn EmbeddingProvider>, EmbeddingError> {
    match config.provider.as_str() {
        "hashing" => Ok(Arc::new(HashingEmbedder::new(config.model.clone(), config.dimensions))),
        "http" => Ok(Arc::new(HttpEmbedder::from_config(config)?)),
        other => Err(EmbeddingError::Config(format!("unknown embedding provider: {}", other))),
    }
}

/// Owned, lazily-initialized embedding model handle.
///
/// The orchestrator only reaches its embedding model through this handle. The provider is built on first use and dropped whenever the handle is
/// reconfigured with a different model configuration.
pub struct EmbedderHandle {
    config: EmbeddingConfig,
    provider: OnceCell<Arc<dyn EmbeddingProvider>>,
}

impl EmbedderHandle {
    pub fn new(config: EmbeddingConfig) -> Self {
        Self {
            config,
            provider: OnceCell::new(),
        }
    }

    /// Handle around an already-built provider.
    #[cfg(test)]
    pub fn with_provider(config: EmbeddingConfig, provider: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            config,
            provider: OnceCell::new_with(Some(provider)),
        }
    }

    /// Identity of the model behind this handle; vectors from different
    /// fingerprints must never share an index.
    pub fn fingerprint(&self) -> String {
        format!(
            "{}:{}:{}",
            self.config.provider, self.config.model, self.config.dimensions
        )
    }

    #[cfg(test)]
    pub fn is_initialized(&self) -> bool {
        self.provider.initialized()
    }

    pub async fn get(&self) -> Result<Arc<dyn EmbeddingProvider>, EmbeddingError> {
        self.provider
            .get_or_try_init(|| async {
                let provider = build_provider(&self.config)?;
                info!(
                    "Initialized embedding model {} ({} dims)",
                    provider.model_name(),
                    provider.dimensions()
                );
                Ok::<_, EmbeddingError>(provider)
            })
            .await
            .cloned()
    }

    /// Swap the configuration; returns true when the model changed and the
    /// cached provider was dropped.
    pub fn reconfigure(&mut self, config: EmbeddingConfig) -> bool {
        if config == self.config {
            return false;
        }
        self.config = config;
        self.provider = OnceCell::new();
        true
    }
}
