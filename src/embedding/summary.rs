// Natural-language function summaries for the NLP vector space

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, warn};

use super::EmbeddingError;
use crate::config::SummaryConfig;
use crate::index::FunctionCard;

const MAX_RETRIES: u32 = 3;
const MAX_BODY_CHARS: usize = 4000;

/// What a summarizer says about one function.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionSummary {
    pub summary: String,
    #[serde(default)]
    pub key_concepts: Vec<String>,
    #[serde(default)]
    pub behavioral_profile: String,
}

impl FunctionSummary {
    /// Text embedded into the NLP space.
    pub fn embedding_text(&self) -> String {
        let mut text = self.summary.clone();
        if !self.key_concepts.is_empty() {
            text.push_str("\nConcepts: ");
            text.push_str(&self.key_concepts.join(", "));
        }
        if !self.behavioral_profile.is_empty() {
            text.push_str("\nBehavior: ");
            text.push_str(&self.behavioral_profile);
        }
        text
    }
}

#[async_trait]
pub trait SummaryProvider: Send + Sync {
    /// Summarize at most `batch_size` functions in one request.
    async fn summarize_batch(
        &self,
        cards: &[FunctionCard],
        bodies: &[String],
    ) -> Result<Vec<FunctionSummary>, EmbeddingError>;

    fn batch_size(&self) -> usize {
        8
    }

    /// One summary per card; `bodies` is parallel to `cards`.
    async fn summarize(
        &self,
        cards: &[FunctionCard],
        bodies: &[String],
    ) -> Result<Vec<FunctionSummary>, EmbeddingError> {
        let size = self.batch_size().max(1);
        let mut out = Vec::with_capacity(cards.len());
        for (card_chunk, body_chunk) in cards.chunks(size).zip(bodies.chunks(size)) {
            debug!("Summarizing {} functions", card_chunk.len());
            let batch = self.summarize_batch(card_chunk, body_chunk).await?;
            if batch.len() != card_chunk.len() {
                return Err(EmbeddingError::InvalidResponse(format!(
                    "expected {} summaries, got {}",
                    card_chunk.len(),
                    batch.len()
                )));
            }
            out.extend(batch);
        }
        Ok(out)
    }
}

/// Summarizer backed by an OpenAI-compatible chat completions endpoint.
pub struct HttpSummarizer {
    client: Client,
    url: String,
    model: String,
    api_key: Option<String>,
    batch_size: usize,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: String,
}

impl HttpSummarizer {
    pub fn from_config(config: &SummaryConfig) -> Result<Self, EmbeddingError> {
        let api_key = match &config.api_key_env {
            Some(var) => Some(std::env::var(var).map_err(|_| {
                EmbeddingError::Config(format!("environment variable {} is not set", var))
            })?),
            None => None,
        };

        let client = Client::builder().timeout(Duration::from_secs(120)).build()?;

        Ok(Self {
            client,
            url: config.url.clone(),
            model: config.model.clone(),
            api_key,
            batch_size: config.batch_size.max(1),
        })
    }

    async fn complete(&self, prompt: String) -> Result<String, EmbeddingError> {
        let body = json!({
            "model": self.model,
            "temperature": 0,
            "messages": [
                {"role": "system", "content": SYSTEM_PROMPT},
                {"role": "user", "content": prompt},
            ],
        });

        let mut backoff = Duration::from_secs(1);
        for attempt in 0..=MAX_RETRIES {
            let mut request = self.client.post(&self.url).json(&body);
            if let Some(key) = &self.api_key {
                request = request.bearer_auth(key);
            }
            let response = request.send().await?;

            match response.status() {
                StatusCode::TOO_MANY_REQUESTS if attempt < MAX_RETRIES => {
                    warn!("Summary endpoint rate limited, retrying in {:?}", backoff);
                    tokio::time::sleep(backoff).await;
                    backoff *= 2;
                }
                status if status.is_success() => {
                    let parsed: ChatResponse = response
                        .json()
                        .await
                        .map_err(|e| EmbeddingError::InvalidResponse(e.to_string()))?;
                    return parsed
                        .choices
                        .into_iter()
                        .next()
                        .map(|c| c.message.content)
                        .ok_or_else(|| EmbeddingError::InvalidResponse("no choices returned".to_string()));
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

const SYSTEM_PROMPT: &str = "You describe source code functions. Reply with a JSON array only, \
one object per function in the order given, each with the fields \
\"summary\" (one sentence), \"keyConcepts\" (array of short strings) and \
\"behavioralProfile\" (short phrase describing side effects and purity).";

fn build_prompt(cards: &[FunctionCard], bodies: &[String]) -> String {
    let mut prompt = format!("Summarize these {} functions.\n", cards.len());
    for (i, (card, body)) in cards.iter().zip(bodies).enumerate() {
        let body: String = body.chars().take(MAX_BODY_CHARS).collect();
        prompt.push_str(&format!(
            "\n### {} `{}` ({})\n```\n{}\n```\n",
            i + 1,
            card.name,
            card.file_path,
            body
        ));
    }
    prompt
}

/// Pull the JSON array out of a model reply, tolerating code fences and prose.
fn parse_summaries(reply: &str, expected: usize) -> Result<Vec<FunctionSummary>, EmbeddingError> {
    let start = reply.find('[');
    let end = reply.rfind(']');
    let json = match (start, end) {
        (Some(s), Some(e)) if s < e => &reply[s..=e],
        _ => return Err(EmbeddingError::InvalidResponse("no JSON array in summary reply".to_string())),
    };

    let summaries: Vec<FunctionSummary> =
        serde_json::from_str(json).map_err(|e| EmbeddingError::InvalidResponse(e.to_string()))?;
    if summaries.len() != expected {
        return Err(EmbeddingError::InvalidResponse(format!(
            "expected {} summaries, got {}",
            expected,
            summaries.len()
        )));
    }
    Ok(summaries)
}

#[async_trait]
impl SummaryProvider for HttpSummarizer {
    async fn summarize_batch(
        &self,
        cards: &[FunctionCard],
        bodies: &[String],
    ) -> Result<Vec<FunctionSummary>, EmbeddingError> {
        let reply = self.complete(build_prompt(cards, bodies)).await?;
        parse_summaries(&reply, cards.len())
    }

    fn batch_size(&self) -> usize {
        self.batch_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::store::tests::card;
    use std::sync::Mutex;

    /// Records the size of every batch it is asked for.
    struct RecordingSummarizer {
        batches: Mutex<Vec<usize>>,
        drop_last: bool,
    }

    #[async_trait]
    impl SummaryProvider for RecordingSummarizer {
        async fn summarize_batch(
            &self,
            cards: &[FunctionCard],
            _bodies: &[String],
        ) -> Result<Vec<FunctionSummary>, EmbeddingError> {
            self.batches.lock().unwrap().push(cards.len());
            let keep = if self.drop_last { cards.len() - 1 } else { cards.len() };
            Ok(cards[..keep]
                .iter()
                .map(|c| FunctionSummary {
                    summary: c.name.clone(),
                    key_concepts: Vec::new(),
                    behavioral_profile: String::new(),
                })
                .collect())
        }

        fn batch_size(&self) -> usize {
            3
        }
    }

    #[tokio::test]
    async fn test_summarize_splits_by_batch_size() {
        let summarizer = RecordingSummarizer {
            batches: Mutex::new(Vec::new()),
            drop_last: false,
        };
        let cards: Vec<FunctionCard> = (0..7).map(|i| card(&format!("{:016x}", i), "src/a.ts")).collect();
        let bodies = vec![String::new(); cards.len()];

        let summaries = summarizer.summarize(&cards, &bodies).await.unwrap();
        assert_eq!(summaries.len(), 7);
        assert_eq!(*summarizer.batches.lock().unwrap(), vec![3, 3, 1]);
    }

    #[tokio::test]
    async fn test_summarize_rejects_short_batch() {
        let summarizer = RecordingSummarizer {
            batches: Mutex::new(Vec::new()),
            drop_last: true,
        };
        let cards = vec![card("0000000000000001", "src/a.ts"), card("0000000000000002", "src/a.ts")];
        let bodies = vec![String::new(); 2];
        assert!(matches!(
            summarizer.summarize(&cards, &bodies).await,
            Err(EmbeddingError::InvalidResponse(_))
        ));
    }

    #[test]
    fn test_parse_fenced_reply() {
        let reply = "Here you go:\n```json\n[{\"summary\":\"Adds two numbers\",\"keyConcepts\":[\"math\"],\"behavioralProfile\":\"pure\"}]\n```";
        let parsed = parse_summaries(reply, 1).unwrap();
        assert_eq!(parsed[0].summary, "Adds two numbers");
        assert_eq!(parsed[0].key_concepts, vec!["math"]);
        assert_eq!(parsed[0].behavioral_profile, "pure");
    }

    #[test]
    fn test_parse_rejects_wrong_count() {
        let reply = r#"[{"summary":"a"},{"summary":"b"}]"#;
        assert!(matches!(parse_summaries(reply, 3), Err(EmbeddingError::InvalidResponse(_))));
        assert!(parse_summaries("no json here", 1).is_err());
    }

    #[test]
    fn test_embedding_text_includes_concepts() {
        let summary = FunctionSummary {
            summary: "Formats a date".to_string(),
            key_concepts: vec!["date".to_string(), "locale".to_string()],
            behavioral_profile: "pure".to_string(),
        };
        let text = summary.embedding_text();
        assert!(text.starts_with("Formats a date"));
        assert!(text.contains("date, locale"));
        assert!(text.contains("Behavior: pure"));
    }
}
