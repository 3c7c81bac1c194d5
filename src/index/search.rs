// Similarity scoring shared by all vector stores

use std::cmp::Ordering;

use super::{ScoredCard, StoredFunction};

pub const DEFAULT_TOP_K: usize = 8;
pub const DEFAULT_MIN_SCORE: f32 = 0.78;
pub const DEFAULT_CODE_WEIGHT: f32 = 0.6;

/// Limits applied to a ranked result list.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchParams {
    pub top_k: usize,
    pub min_score: f32,
}

impl Default for SearchParams {
    fn default() -> Self {
        Self {
            top_k: DEFAULT_TOP_K,
            min_score: DEFAULT_MIN_SCORE,
        }
    }
}

/// How candidates are scored against the query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SearchMode {
    CodeOnly,
    Hybrid { code_weight: f32 },
}

/// Cosine similarity clamped to `[-1, 1]`; 0 for mismatched or zero vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    (dot / (norm_a * norm_b)).clamp(-1.0, 1.0)
}

/// L2-normalize in place. Zero vectors are left untouched.
pub fn normalize(vector: &mut [f32]) {
    let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for v in vector.iter_mut() {
            *v /= norm;
        }
    }
}

/// Weighted blend of code-space and NLP-space similarity.
///
/// Falls back to the code score when either side has no NLP vector.
pub fn hybrid_score(query: &StoredFunction, candidate: &StoredFunction, code_weight: f32) -> f32 {
    let code = cosine_similarity(&query.code_vector, &candidate.code_vector);
    match (&query.nlp_vector, &candidate.nlp_vector) {
        (Some(q), Some(c)) => {
            let w = code_weight.clamp(0.0, 1.0);
            w * code + (1.0 - w) * cosine_similarity(q, c)
        }
        _ => code,
    }
}

/// Score every candidate against `query`, drop the query itself and
/// anything under `min_score`, and keep the best `top_k`.
pub fn rank<'a, I>(query: &StoredFunction, candidates: I, mode: SearchMode, params: SearchParams) -> Vec<ScoredCard>
where
    I: IntoIterator<Item = &'a StoredFunction>,
{
    let mut hits: Vec<ScoredCard> = candidates
        .into_iter()
        .filter(|c| c.card.id != query.card.id)
        .filter_map(|c| {
            let score = match mode {
                SearchMode::CodeOnly => cosine_similarity(&query.code_vector, &c.code_vector),
                SearchMode::Hybrid { code_weight } => hybrid_score(query, c, code_weight),
            };
            (score >= params.min_score).then(|| ScoredCard {
                card: c.card.clone(),
                score,
            })
        })
        .collect();

    hits.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.card.id.cmp(&b.card.id))
    });
    hits.truncate(params.top_k);
    hits
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::FunctionCard;
    use proptest::prelude::*;
    use std::collections::BTreeSet;

    fn stored(id: &str, code: Vec<f32>, nlp: Option<Vec<f32>>) -> StoredFunction {
        StoredFunction {
            card: FunctionCard {
                id: id.to_string(),
                file_path: "src/a.ts".to_string(),
                name: id.to_string(),
                line_start: 1,
                line_end: 2,
                signature: format!("function {}()", id),
                complexity_score: 1,
                called_internals: BTreeSet::new(),
                summary: None,
                key_concepts: None,
                behavioral_profile: None,
                last_indexed: 0,
            },
            code_vector: code,
            nlp_vector: nlp,
        }
    }

    #[test]
    fn test_cosine_basics() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert!((cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]) + 1.0).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[1.0, 0.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }

    #[test]
    fn test_hybrid_falls_back_without_candidate_nlp() {
        let q = stored("q", vec![1.0, 0.0], Some(vec![0.0, 1.0]));
        let c = stored("c", vec![1.0, 0.0], None);
        assert!((hybrid_score(&q, &c, 0.6) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_hybrid_blends_both_spaces() {
        let q = stored("q", vec![1.0, 0.0], Some(vec![1.0, 0.0]));
        let c = stored("c", vec![1.0, 0.0], Some(vec![0.0, 1.0]));
        // code cosine 1.0, nlp cosine 0.0
        assert!((hybrid_score(&q, &c, 0.6) - 0.6).abs() < 1e-6);
    }

    #[test]
    fn test_rank_excludes_self_filters_and_truncates() {
        let q = stored("q", vec![1.0, 0.0], None);
        let same = stored("q", vec![1.0, 0.0], None);
        let close = stored("b", vec![0.9, 0.1], None);
        let closer = stored("a", vec![1.0, 0.01], None);
        let far = stored("c", vec![0.0, 1.0], None);
        let pool = vec![same, close, closer, far];

        let hits = rank(&q, &pool, SearchMode::CodeOnly, SearchParams::default());
        let ids: Vec<&str> = hits.iter().map(|h| h.card.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);

        let hits = rank(
            &q,
            &pool,
            SearchMode::CodeOnly,
            SearchParams { top_k: 1, min_score: 0.78 },
        );
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].card.id, "a");
    }

    fn unit_vector(dim: usize) -> impl Strategy<Value = Vec<f32>> {
        prop::collection::vec(-1.0f32..1.0, dim).prop_filter_map("non-zero", |mut v| {
            let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
            if norm < 1e-3 {
                return None;
            }
            normalize(&mut v);
            Some(v)
        })
    }

    proptest! {
        #[test]
        fn prop_hybrid_score_is_bounded(
            qc in unit_vector(8), qn in unit_vector(4),
            cc in unit_vector(8), cn in unit_vector(4),
            w in 0.0f32..=1.0,
        ) {
            let q = stored("q", qc, Some(qn));
            let c = stored("c", cc, Some(cn));
            let score = hybrid_score(&q, &c, w);
            prop_assert!((-1.0..=1.0).contains(&score));
        }

        #[test]
        fn prop_full_code_weight_equals_code_only(
            qc in unit_vector(8), qn in unit_vector(4),
            cc in unit_vector(8), cn in unit_vector(4),
        ) {
            let q = stored("q", qc, Some(qn));
            let c = stored("c", cc, Some(cn));
            prop_assert_eq!(
                hybrid_score(&q, &c, 1.0),
                cosine_similarity(&q.code_vector, &c.code_vector)
            );
        }
    }
}
