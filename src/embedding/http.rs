// OpenAI-compatible embedding endpoint

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{EmbeddingError, EmbeddingProvider};
use crate::config::EmbeddingConfig;
use crate::index::search::normalize;

const MAX_RETRIES: u32 = 3;

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}

/// Embedder backed by any `/v1/embeddings`-style HTTP endpoint.
pub struct HttpEmbedder {
    client: Client,
    url: String,
    model: String,
    dimensions: usize,
    api_key: Option<String>,
}

impl HttpEmbedder {
    pub fn from_config(config: &EmbeddingConfig) -> Result<Self, EmbeddingError> {
        let url = config
            .url
            .clone()
            .ok_or_else(|| EmbeddingError::Config("http provider needs a url".to_string()))?;

        let api_key = match &config.api_key_env {
            Some(var) => Some(std::env::var(var).map_err(|_| {
                EmbeddingError::Config(format!("environment variable {} is not set", var))
            })?),
            None => None,
        };

        let client = Client::builder().timeout(Duration::from_secs(60)).build()?;

        Ok(Self {
            client,
            url,
            model: config.model.clone(),
            dimensions: config.dimensions,
            api_key,
        })
    }

    async fn send_request(&self, texts: &[String]) -> Result<EmbeddingResponse, EmbeddingError> {
        let body = EmbeddingRequest {
            model: &self.model,
            input: texts,
        };

        let mut backoff = Duration::from_secs(1);
        for attempt in 0..=MAX_RETRIES {
            debug!("Embedding {} texts via {} (attempt {})", texts.len(), self.url, attempt + 1);

            let mut request = self.client.post(&self.url).json(&body);
            if let Some(key) = &self.api_key {
                request = request.bearer_auth(key);
            }
            let response = request.send().await?;

            match response.status() {
                StatusCode::TOO_MANY_REQUESTS if attempt < MAX_RETRIES => {
                    warn!("Embedding endpoint rate limited, retrying in {:?}", backoff);
                    tokio::time::sleep(backoff).await;
                    backoff *= 2;
                }
                status if status.is_success() => {
                    return response
                        .json::<EmbeddingResponse>()
                        .await
                        .map_err(|e| EmbeddingError::InvalidResponse(e.to_string()));
                }
                StatusCode::TOO_MANY_REQUESTS => break,
                status => {
                    let text = response.text().await.unwrap_or_default();
                    return Err(EmbeddingError::ApiError(format!("{}: {}", status, text)));
                }
            }
        }

        Err(EmbeddingError::RateLimited(MAX_RETRIES))
    }
}

#[async_trait]
impl EmbeddingProvider for HttpEmbedder {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let mut response = self.send_request(texts).await?;
        if response.data.len() != texts.len() {
            return Err(EmbeddingError::InvalidResponse(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                response.data.len()
            )));
        }

        response.data.sort_by_key(|d| d.index);
        response
            .data
            .into_iter()
            .map(|d| {
                if d.embedding.len() != self.dimensions {
                    return Err(EmbeddingError::InvalidResponse(format!(
                        "model returned {} dimensions, configured {}",
                        d.embedding.len(),
                        self.dimensions
                    )));
                }
                let mut v = d.embedding;
                normalize(&mut v);
                Ok(v)
            })
            .collect()
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_requires_url() {
        let config = EmbeddingConfig {
            provider: "http".to_string(),
            ..EmbeddingConfig::default()
        };
        assert!(matches!(HttpEmbedder::from_config(&config), Err(EmbeddingError::Config(_))));
    }

    #[test]
    fn test_missing_api_key_env_is_config_error() {
        let config = EmbeddingConfig {
            provider: "http".to_string(),
            url: Some("http://localhost:9/v1/embeddings".to_string()),
            api_key_env: Some("AUDITGRAPH_TEST_KEY_THAT_IS_NOT_SET".to_string()),
            ..EmbeddingConfig::default()
        };
        assert!(matches!(HttpEmbedder::from_config(&config), Err(EmbeddingError::Config(_))));
    }

    #[test]
    fn test_response_parsing() {
        let json = r#"{"data":[{"embedding":[0.0,1.0],"index":1},{"embedding":[1.0,0.0],"index":0}]}"#;
        let mut parsed: EmbeddingResponse = serde_json::from_str(json).unwrap();
        parsed.data.sort_by_key(|d| d.index);
        assert_eq!(parsed.data[0].embedding, vec![1.0, 0.0]);
    }
}
