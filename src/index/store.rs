// Vector store abstraction

use std::collections::BTreeSet;

use dashmap::DashMap;
use thiserror::Error;
use tracing::debug;

use super::search::{rank, SearchMode, SearchParams};
use super::{FunctionCard, IndexStats, SearchOutcome, StoredFunction};

/// Errors raised by a vector store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("{space} vector has {got} dimensions, index holds {expected} (rebuild the index after changing models)")]
    DimensionMismatch {
        space: &'static str,
        expected: usize,
        got: usize,
    },

    #[error("{cards} cards but {vectors} {space} vectors")]
    LengthMismatch {
        space: &'static str,
        cards: usize,
        vectors: usize,
    },

    #[error("corrupt entry {id}: {reason}")]
    Corrupt { id: String, reason: String },
}

/// Operations the semantic index needs from a vector engine.
///
/// The function id is the primary key: upserting an existing id replaces it.
pub trait VectorStore: Send + Sync {
    /// Insert or replace one entry per card. `nlp_vectors`, when given, is
    /// parallel to `cards`; an empty inner vector means "no NLP vector".
    fn upsert(
        &self,
        cards: &[FunctionCard],
        code_vectors: &[Vec<f32>],
        nlp_vectors: Option<&[Vec<f32>]>,
    ) -> Result<usize, StoreError>;

    /// Remove every entry of `path`, returning the removed ids.
    fn delete_by_file(&self, path: &str) -> Result<Vec<String>, StoreError>;

    fn delete_ids(&self, ids: &[String]) -> Result<usize, StoreError>;

    fn list_indexed_files(&self) -> Result<BTreeSet<String>, StoreError>;

    fn ids_for_file(&self, path: &str) -> Result<BTreeSet<String>, StoreError>;

    fn get(&self, id: &str) -> Result<Option<StoredFunction>, StoreError>;

    /// Every stored entry; the candidate set for brute-force search.
    fn all(&self) -> Result<Vec<StoredFunction>, StoreError>;

    fn clear(&self) -> Result<(), StoreError>;

    fn stats(&self) -> Result<IndexStats, StoreError>;

    /// Nearest neighbours of an indexed function in code space.
    fn search_by_id(&self, id: &str, params: SearchParams) -> Result<SearchOutcome, StoreError> {
        let Some(query) = self.get(id)? else {
            return Ok(SearchOutcome::NotIndexed);
        };
        let candidates = self.all()?;
        Ok(SearchOutcome::Ranked(rank(&query, &candidates, SearchMode::CodeOnly, params)))
    }

    /// Nearest neighbours blending code and NLP space with `code_weight`.
    fn search_by_id_hybrid(
        &self,
        id: &str,
        code_weight: f32,
        params: SearchParams,
    ) -> Result<SearchOutcome, StoreError> {
        let Some(query) = self.get(id)? else {
            return Ok(SearchOutcome::NotIndexed);
        };
        let candidates = self.all()?;
        Ok(SearchOutcome::Ranked(rank(
            &query,
            &candidates,
            SearchMode::Hybrid { code_weight },
            params,
        )))
    }
}

/// Check the parallel inputs of an upsert and that each space has one dimension.
///
/// `known` holds the dimensions already present in the store, if any.
pub fn validate_batch(
    cards: &[FunctionCard],
    code_vectors: &[Vec<f32>],
    nlp_vectors: Option<&[Vec<f32>]>,
    known: (Option<usize>, Option<usize>),
) -> Result<(), StoreError> {
    if cards.len() != code_vectors.len() {
        return Err(StoreError::LengthMismatch {
            space: "code",
            cards: cards.len(),
            vectors: code_vectors.len(),
        });
    }
    if let Some(nlp) = nlp_vectors {
        if cards.len() != nlp.len() {
            return Err(StoreError::LengthMismatch {
                space: "nlp",
                cards: cards.len(),
                vectors: nlp.len(),
            });
        }
    }

    let (mut code_dim, mut nlp_dim) = known;
    for v in code_vectors {
        check_dimension("code", &mut code_dim, v.len())?;
    }
    for v in nlp_vectors.unwrap_or(&[]).iter().filter(|v| !v.is_empty()) {
        check_dimension("nlp", &mut nlp_dim, v.len())?;
    }
    Ok(())
}

fn check_dimension(space: &'static str, expected: &mut Option<usize>, got: usize) -> Result<(), StoreError> {
    match *expected {
        Some(dim) if dim != got => Err(StoreError::DimensionMismatch {
            space,
            expected: dim,
            got,
        }),
        Some(_) => Ok(()),
        None => {
            *expected = Some(got);
            Ok(())
        }
    }
}

/// Process-local store used for tests and throwaway runs.
#[derive(Default)]
pub struct MemoryVectorStore {
    entries: DashMap<String, StoredFunction>,
}

impl MemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn known_dimensions(&self) -> (Option<usize>, Option<usize>) {
        let code = self.entries.iter().next().map(|e| e.code_vector.len());
        let nlp = self
            .entries
            .iter()
            .find_map(|e| e.nlp_vector.as_ref().map(|v| v.len()));
        (code, nlp)
    }
}

impl VectorStore for MemoryVectorStore {
    fn upsert(
        &self,
        cards: &[FunctionCard],
        code_vectors: &[Vec<f32>],
        nlp_vectors: Option<&[Vec<f32>]>,
    ) -> Result<usize, StoreError> {
        validate_batch(cards, code_vectors, nlp_vectors, self.known_dimensions())?;

        for (i, card) in cards.iter().enumerate() {
            let nlp_vector = nlp_vectors
                .and_then(|nlp| nlp.get(i))
                .filter(|v| !v.is_empty())
                .cloned();
            self.entries.insert(
                card.id.clone(),
                StoredFunction {
                    card: card.clone(),
                    code_vector: code_vectors[i].clone(),
                    nlp_vector,
                },
            );
        }

        debug!("Upserted {} functions into memory store", cards.len());
        Ok(cards.len())
    }

    fn delete_by_file(&self, path: &str) -> Result<Vec<String>, StoreError> {
        let ids: Vec<String> = self.ids_for_file(path)?.into_iter().collect();
        for id in &ids {
            self.entries.remove(id);
        }
        Ok(ids)
    }

    fn delete_ids(&self, ids: &[String]) -> Result<usize, StoreError> {
        Ok(ids.iter().filter(|id| self.entries.remove(*id).is_some()).count())
    }

    fn list_indexed_files(&self) -> Result<BTreeSet<String>, StoreError> {
        Ok(self.entries.iter().map(|e| e.card.file_path.clone()).collect())
    }

    fn ids_for_file(&self, path: &str) -> Result<BTreeSet<String>, StoreError> {
        Ok(self
            .entries
            .iter()
            .filter(|e| e.card.file_path == path)
            .map(|e| e.key().clone())
            .collect())
    }

    fn get(&self, id: &str) -> Result<Option<StoredFunction>, StoreError> {
        Ok(self.entries.get(id).map(|e| e.value().clone()))
    }

    fn all(&self) -> Result<Vec<StoredFunction>, StoreError> {
        Ok(self.entries.iter().map(|e| e.value().clone()).collect())
    }

    fn clear(&self) -> Result<(), StoreError> {
        self.entries.clear();
        Ok(())
    }

    fn stats(&self) -> Result<IndexStats, StoreError> {
        Ok(IndexStats {
            total_files: self.list_indexed_files()?.len(),
            total_functions: self.entries.len(),
            functions_with_nlp: self.entries.iter().filter(|e| e.nlp_vector.is_some()).count(),
        })
    }
}
