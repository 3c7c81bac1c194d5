// Local feature-hashing embedder

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;

use super::{EmbeddingError, EmbeddingProvider};
use crate::index::search::normalize;

static WORD_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[A-Za-z_$][A-Za-z0-9_$]*|[0-9]+").expect("valid word regex"));

/// Deterministic, offline embedder.
///
/// Identifiers are split into lower-cased sub-words (camelCase and
/// snake_case aware); each sub-word and each adjacent pair is hashed into a
/// signed bucket. Good enough to surface near-identical functions without a
/// model server.
pub struct HashingEmbedder {
    model: String,
    dimensions: usize,
}

impl HashingEmbedder {
    pub fn new(model: String, dimensions: usize) -> Self {
        Self {
            model,
            dimensions: dimensions.max(1),
        }
    }

    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimensions];
        let tokens = tokenize(text);

        for token in &tokens {
            self.add_feature(&mut vector, token, 1.0);
        }
        for pair in tokens.windows(2) {
            self.add_feature(&mut vector, &format!("{} {}", pair[0], pair[1]), 0.5);
        }

        normalize(&mut vector);
        vector
    }

    fn add_feature(&self, vector: &mut [f32], feature: &str, weight: f32) {
        let digest = blake3::hash(feature.as_bytes());
        let bytes = digest.as_bytes();
        let mut word = [0u8; 8];
        word.copy_from_slice(&bytes[..8]);
        let bucket = (u64::from_le_bytes(word) % self.dimensions as u64) as usize;
        let sign = if bytes[8] & 1 == 0 { 1.0 } else { -1.0 };
        vector[bucket] += sign * weight;
    }
}

/// Lower-cased sub-words of every identifier-like run in `text`.
fn tokenize(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    for m in WORD_RE.find_iter(text) {
        for part in m.as_str().split(|c| c == '_' || c == '$').filter(|p| !p.is_empty()) {
            split_camel(part, &mut tokens);
        }
    }
    tokens
}

fn split_camel(word: &str, out: &mut Vec<String>) {
    let chars: Vec<char> = word.chars().collect();
    let mut current = String::new();
    for (i, &c) in chars.iter().enumerate() {
        let boundary = c.is_uppercase()
            && !current.is_empty()
            && (chars[i - 1].is_lowercase()
                || chars[i - 1].is_ascii_digit()
                || chars.get(i + 1).map(|n| n.is_lowercase()).unwrap_or(false));
        if boundary {
            out.push(std::mem::take(&mut current).to_lowercase());
        }
        current.push(c);
    }
    if !current.is_empty() {
        out.push(current.to_lowercase());
    }
}

#[async_trait]
impl EmbeddingProvider for HashingEmbedder {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        Ok(texts.iter().map(|t| self.embed_text(t)).collect())
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn max_batch_size(&self) -> usize {
        256
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::search::cosine_similarity;

    #[test]
    fn test_tokenize_splits_identifiers() {
        assert_eq!(
            tokenize("parseHTTPResponse(user_id)"),
            vec!["parse", "http", "response", "user", "id"]
        );
    }

    #[test]
    fn test_vectors_are_normalized_and_deterministic() {
        let embedder = HashingEmbedder::new("t".to_string(), 64);
        let a = embedder.embed_text("function sumValues(items) { return items.reduce(add, 0); }");
        let b = embedder.embed_text("function sumValues(items) { return items.reduce(add, 0); }");
        assert_eq!(a, b);

        let norm: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_similar_code_scores_higher() {
        let embedder = HashingEmbedder::new("t".to_string(), 256);
        let a = embedder.embed_text("function totalPrice(items) { return items.reduce((s, i) => s + i.price, 0); }");
        let b = embedder.embed_text("function sumPrice(items) { return items.reduce((s, i) => s + i.price, 0); }");
        let c = embedder.embed_text("async function fetchUser(id) { const res = await http.get(url); return res.json(); }");

        assert!(cosine_similarity(&a, &b) > cosine_similarity(&a, &c));
    }

    #[test]
    fn test_empty_text_is_zero_vector() {
        let embedder = HashingEmbedder::new("t".to_string(), 16);
        assert!(embedder.embed_text("  {} ").iter().all(|v| *v == 0.0));
    }
}
