// Incremental semantic indexing and file watching

pub mod cache;
pub mod cards;
pub mod pool;
pub mod scanner;
pub mod watcher;

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::{Config, SearchConfig};
use crate::embedding::{EmbedderHandle, HttpSummarizer, SummaryProvider};
use crate::hashing::{content_hash, function_id};
use crate::index::search::SearchParams;
use crate::index::store::{StoreError, VectorStore};
use crate::index::{FunctionCard, ScannedFile, SearchOutcome};
use cache::IndexCache;

/// Second vector space built from generated summaries.
struct DualEmbedding {
    embedder: EmbedderHandle,
    summarizer: Arc<dyn SummaryProvider>,
}

/// A file with at least one function whose cache entry is out of date.
struct Candidate<'a> {
    file: &'a ScannedFile,
    stale: BTreeSet<String>,
}

/// Everything a worker produced for one file; committed by the orchestrator.
struct FileOutcome {
    path: String,
    content_hash: String,
    cards: Vec<FunctionCard>,
    code_vectors: Vec<Vec<f32>>,
    nlp_vectors: Option<Vec<Vec<f32>>>,
    /// Ids of every function currently in the file
    live_ids: BTreeSet<String>,
}

/// Counters for one indexing run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct IndexRunReport {
    pub files_total: usize,
    /// Every function already cached at the current content hash
    pub files_fresh: usize,
    pub files_indexed: usize,
    pub files_errored: usize,
    /// Left unclaimed because the run was interrupted
    pub files_interrupted: usize,
    /// Removed because they disappeared from the project
    pub files_collected: usize,
    pub functions_indexed: usize,
    pub functions_removed: usize,
    /// The embedding model changed and the index was rebuilt from scratch
    pub model_reset: bool,
}

/// Duplicate lookup result for one function of a file.
#[derive(Debug, Clone)]
pub struct FunctionDuplicates {
    pub function_id: String,
    pub name: String,
    pub line_start: usize,
    pub line_end: usize,
    pub outcome: SearchOutcome,
}

/// Keeps the semantic function index in step with the project.
///
/// The orchestrator is the only writer of the vector store and of the cache
/// file. Workers build cards and vectors and hand them back; commits happen
/// file by file in completion order and the cache is written once at the end.
pub struct IndexOrchestrator {
    store: Arc<dyn VectorStore>,
    embedder: EmbedderHandle,
    dual: Option<DualEmbedding>,
    project_root: PathBuf,
    cache_path: PathBuf,
    concurrency: usize,
    search: SearchConfig,
}

impl IndexOrchestrator {
    pub fn new(
        store: Arc<dyn VectorStore>,
        embedder: EmbedderHandle,
        project_root: impl Into<PathBuf>,
        cache_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            store,
            embedder,
            dual: None,
            project_root: project_root.into(),
            cache_path: cache_path.into(),
            concurrency: 4,
            search: SearchConfig::default(),
        }
    }

    /// Wire an orchestrator from project configuration.
    pub fn from_config(config: &Config, project_root: &Path, store: Arc<dyn VectorStore>) -> Result<Self> {
        let mut orchestrator = Self::new(
            store,
            EmbedderHandle::new(config.embedding.clone()),
            project_root,
            config.cache_path(project_root),
        )
        .with_concurrency(config.index.concurrency)
        .with_search(config.search.clone());

        if config.index.dual_embedding {
            let summary = config
                .summary
                .as_ref()
                .context("dual_embedding requires a [summary] section")?;
            let summarizer = HttpSummarizer::from_config(summary).context("Failed to set up summarizer")?;
            orchestrator = orchestrator.with_dual_embedding(
                EmbedderHandle::new(config.nlp_embedding().clone()),
                Arc::new(summarizer),
            );
        }
        Ok(orchestrator)
    }

    pub fn with_dual_embedding(mut self, embedder: EmbedderHandle, summarizer: Arc<dyn SummaryProvider>) -> Self {
        self.dual = Some(DualEmbedding { embedder, summarizer });
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_search(mut self, search: SearchConfig) -> Self {
        self.search = search;
        self
    }

    pub fn store(&self) -> &Arc<dyn VectorStore> {
        &self.store
    }

    pub fn is_dual(&self) -> bool {
        self.dual.is_some()
    }

    /// Apply a new configuration to the embedding handles. Returns true when a
    /// model changed; the next run then rebuilds the index.
    pub fn reconfigure(&mut self, config: &Config) -> bool {
        let mut changed = self.embedder.reconfigure(config.embedding.clone());
        if let Some(dual) = self.dual.as_mut() {
            changed |= dual.embedder.reconfigure(config.nlp_embedding().clone());
        }
        self.concurrency = config.index.concurrency.max(1);
        self.search = config.search.clone();
        changed
    }

    /// Identity of the model(s) that produced the stored vectors.
    pub fn fingerprint(&self) -> String {
        match &self.dual {
            Some(dual) => format!("{}|nlp={}", self.embedder.fingerprint(), dual.embedder.fingerprint()),
            None => self.embedder.fingerprint(),
        }
    }

    /// Drop the store and cache, then index everything.
    pub async fn rebuild(
        &self,
        files: &[ScannedFile],
        is_interrupted: Option<&(dyn Fn() -> bool + Sync)>,
    ) -> Result<IndexRunReport> {
        info!("Rebuilding semantic index from scratch");
        self.store.clear().context("Failed to clear vector store")?;
        match std::fs::remove_file(&self.cache_path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e).with_context(|| format!("Failed to remove {}", self.cache_path.display())),
        }
        self.run(files, is_interrupted).await
    }

    /// Bring the index up to date with `files`, the complete current file set.
    pub async fn run(
        &self,
        files: &[ScannedFile],
        is_interrupted: Option<&(dyn Fn() -> bool + Sync)>,
    ) -> Result<IndexRunReport> {
        let mut report = IndexRunReport {
            files_total: files.len(),
            ..Default::default()
        };

        // Init
        let fingerprint = self.fingerprint();
        let mut cache = IndexCache::load(&self.cache_path);
        if cache.model.is_empty() {
            cache.model = fingerprint.clone();
        } else if cache.model != fingerprint {
            warn!(
                "Embedding model changed ({} -> {}); rebuilding the index",
                cache.model, fingerprint
            );
            self.store.clear().context("Failed to clear vector store")?;
            cache = IndexCache::new(fingerprint.clone());
            report.model_reset = true;
        }

        // GC
        let current: BTreeSet<&str> = files.iter().map(|f| f.path.as_str()).collect();
        let indexed = self.store.list_indexed_files().context("Failed to list indexed files")?;
        for gone in indexed.iter().filter(|f| !current.contains(f.as_str())) {
            let removed = self
                .store
                .delete_by_file(gone)
                .with_context(|| format!("Failed to remove {} from the index", gone))?;
            for id in &removed {
                cache.remove(id);
            }
            debug!("Collected {} ({} functions)", gone, removed.len());
            report.files_collected += 1;
            report.functions_removed += removed.len();
        }

        // Filter
        let mut candidates = Vec::new();
        for file in files {
            let ids: Vec<String> = file
                .function_symbols()
                .map(|s| function_id(&file.path, s.line_start, s.line_end))
                .collect();

            if ids.is_empty() {
                if indexed.contains(&file.path) {
                    let removed = self
                        .store
                        .delete_by_file(&file.path)
                        .with_context(|| format!("Failed to purge {}", file.path))?;
                    for id in &removed {
                        cache.remove(id);
                    }
                    report.functions_removed += removed.len();
                }
                report.files_fresh += 1;
                continue;
            }

            // A cache hit only counts when the store still holds the vector;
            // a failed earlier run can leave the cache ahead of the store.
            let stored = if indexed.contains(&file.path) {
                self.store
                    .ids_for_file(&file.path)
                    .with_context(|| format!("Failed to list indexed functions of {}", file.path))?
            } else {
                BTreeSet::new()
            };
            let stale: BTreeSet<String> = ids
                .into_iter()
                .filter(|id| !stored.contains(id) || !cache.is_fresh(id, &file.content_hash))
                .collect();
            if stale.is_empty() {
                report.files_fresh += 1;
            } else {
                candidates.push(Candidate { file, stale });
            }
        }
        info!(
            "Indexing {} of {} files ({} up to date)",
            candidates.len(),
            files.len(),
            report.files_fresh
        );

        // Dispatch + accumulate
        let indexed_at = chrono::Utc::now().timestamp();
        let pool_report = pool::run(
            &candidates,
            self.concurrency,
            |candidate| self.process(candidate, indexed_at),
            is_interrupted,
        )
        .await;
        debug_assert_eq!(pool_report.total(), candidates.len());
        report.files_indexed = pool_report.completed;
        report.files_errored = pool_report.errored;
        report.files_interrupted = pool_report.skipped;

        // Commit
        for outcome in pool_report.outputs {
            let (indexed_count, removed_count) = self
                .commit(&outcome, &mut cache)
                .with_context(|| format!("Failed to commit {} to the index", outcome.path))?;
            report.functions_indexed += indexed_count;
            report.functions_removed += removed_count;
        }

        // Persist
        cache
            .save(&self.cache_path)
            .with_context(|| format!("Failed to write {}", self.cache_path.display()))?;

        info!(
            "Index run: {} indexed, {} errored, {} interrupted, {} functions embedded, {} removed",
            report.files_indexed,
            report.files_errored,
            report.files_interrupted,
            report.functions_indexed,
            report.functions_removed
        );
        Ok(report)
    }

    /// Worker body: read the file, build cards for its stale functions, embed them.
    async fn process(&self, candidate: &Candidate<'_>, indexed_at: i64) -> Result<FileOutcome> {
        let file = candidate.file;
        let source = tokio::fs::read_to_string(self.project_root.join(&file.path))
            .await
            .with_context(|| format!("Failed to read {}", file.path))?;
        if content_hash(&source) != file.content_hash {
            anyhow::bail!("{} changed since it was scanned", file.path);
        }

        let all_cards = cards::build_cards(&file.path, &source, &file.symbols, indexed_at);
        let live_ids: BTreeSet<String> = all_cards.iter().map(|c| c.id.clone()).collect();
        let mut file_cards: Vec<FunctionCard> = all_cards
            .into_iter()
            .filter(|c| candidate.stale.contains(&c.id))
            .collect();

        let bodies: Vec<String> = file_cards
            .iter()
            .map(|c| cards::function_body(&source, c.line_start, c.line_end))
            .collect();
        let texts: Vec<String> = bodies.iter().map(|b| cards::code_embedding_text(b)).collect();

        let provider = self.embedder.get().await?;
        let code_vectors = provider
            .embed_all(&texts)
            .await
            .with_context(|| format!("Failed to embed {}", file.path))?;

        let nlp_vectors = match &self.dual {
            Some(dual) => Some(Self::summarize_and_embed(dual, &mut file_cards, &bodies).await?),
            None => None,
        };

        debug!("Built {} cards for {}", file_cards.len(), file.path);
        Ok(FileOutcome {
            path: file.path.clone(),
            content_hash: file.content_hash.clone(),
            cards: file_cards,
            code_vectors,
            nlp_vectors,
            live_ids,
        })
    }

    async fn summarize_and_embed(
        dual: &DualEmbedding,
        cards: &mut [FunctionCard],
        bodies: &[String],
    ) -> Result<Vec<Vec<f32>>> {
        let summaries = dual.summarizer.summarize(cards, bodies).await?;
        if summaries.len() != cards.len() {
            anyhow::bail!("expected {} summaries, got {}", cards.len(), summaries.len());
        }

        let texts: Vec<String> = summaries.iter().map(|s| s.embedding_text()).collect();
        for (card, summary) in cards.iter_mut().zip(summaries) {
            card.summary = Some(summary.summary);
            card.key_concepts = Some(summary.key_concepts);
            card.behavioral_profile = Some(summary.behavioral_profile);
        }

        let provider = dual.embedder.get().await?;
        Ok(provider.embed_all(&texts).await?)
    }

    /// Write one file's results; returns (functions upserted, stale functions removed).
    fn commit(&self, outcome: &FileOutcome, cache: &mut IndexCache) -> Result<(usize, usize), StoreError> {
        let obsolete: Vec<String> = self
            .store
            .ids_for_file(&outcome.path)?
            .into_iter()
            .filter(|id| !outcome.live_ids.contains(id))
            .collect();
        let removed = if obsolete.is_empty() {
            0
        } else {
            self.store.delete_ids(&obsolete)?
        };
        for id in &obsolete {
            cache.remove(id);
        }

        let upserted = self.store.upsert(
            &outcome.cards,
            &outcome.code_vectors,
            outcome.nlp_vectors.as_deref(),
        )?;
        for card in &outcome.cards {
            cache.insert(card.id.clone(), outcome.content_hash.clone());
        }
        Ok((upserted, removed))
    }

    fn search_params(&self) -> SearchParams {
        SearchParams {
            top_k: self.search.top_k,
            min_score: self.search.min_score,
        }
    }

    /// Near-duplicates of an indexed function. Hybrid scoring is used when the
    /// index is dual and the function has an NLP vector.
    pub fn find_duplicates(&self, function_id: &str) -> Result<SearchOutcome, StoreError> {
        let params = self.search_params();
        if self.is_dual() {
            match self.store.get(function_id)? {
                None => return Ok(SearchOutcome::NotIndexed),
                Some(stored) if stored.nlp_vector.is_some() => {
                    return self
                        .store
                        .search_by_id_hybrid(function_id, self.search.code_weight, params);
                }
                Some(_) => {}
            }
        }
        self.store.search_by_id(function_id, params)
    }

    /// Duplicate lookup for every function currently in `path`, ordered by line.
    ///
    /// The file is rescanned, so functions edited since the last run come back
    /// as `NotIndexed` instead of being matched through stale entries.
    pub fn duplicates_in_file(&self, path: &str) -> Result<Vec<FunctionDuplicates>> {
        let scanned = scanner::scan_file(&self.project_root, path)?;
        let mut results = Vec::new();
        for symbol in scanned.function_symbols() {
            let id = function_id(&scanned.path, symbol.line_start, symbol.line_end);
            let outcome = self
                .find_duplicates(&id)
                .with_context(|| format!("Failed to search duplicates of {}", symbol.name))?;
            results.push(FunctionDuplicates {
                function_id: id,
                name: symbol.name.clone(),
                line_start: symbol.line_start,
                line_end: symbol.line_end,
                outcome,
            });
        }
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EmbeddingConfig;
    use crate::embedding::summary::FunctionSummary;
    use crate::embedding::{EmbeddingError, EmbeddingProvider, HashingEmbedder};
    use crate::index::store::MemoryVectorStore;
    use crate::index::{IndexStats, StoredFunction};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use tempfile::TempDir;

    const DIMS: usize = 64;

    /// Hashing embedder that counts calls and can be told to fail.
    struct CountingEmbedder {
        inner: HashingEmbedder,
        calls: Arc<AtomicUsize>,
        fail_on: Option<&'static str>,
    }

    #[async_trait]
    impl EmbeddingProvider for CountingEmbedder {
        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(marker) = self.fail_on {
                if texts.iter().any(|t| t.contains(marker)) {
                    return Err(EmbeddingError::ApiError("model crashed".to_string()));
                }
            }
            self.inner.embed_batch(texts).await
        }

        fn dimensions(&self) -> usize {
            DIMS
        }

        fn model_name(&self) -> &str {
            "counting"
        }
    }

    struct StaticSummarizer;

    #[async_trait]
    impl SummaryProvider for StaticSummarizer {
        async fn summarize_batch(
            &self,
            cards: &[FunctionCard],
            _bodies: &[String],
        ) -> Result<Vec<FunctionSummary>, EmbeddingError> {
            Ok(cards
                .iter()
                .map(|c| FunctionSummary {
                    summary: format!("Computes {}", c.name),
                    key_concepts: vec!["math".to_string()],
                    behavioral_profile: "pure".to_string(),
                })
                .collect())
        }
    }

    /// Memory store whose upserts fail while `fail_upserts` is set.
    #[derive(Default)]
    struct FlakyStore {
        inner: MemoryVectorStore,
        fail_upserts: AtomicBool,
    }

    impl FlakyStore {
        fn failing() -> Self {
            let store = Self::default();
            store.fail_upserts.store(true, Ordering::SeqCst);
            store
        }
    }

    impl VectorStore for FlakyStore {
        fn upsert(
            &self,
            cards: &[FunctionCard],
            code: &[Vec<f32>],
            nlp: Option<&[Vec<f32>]>,
        ) -> Result<usize, StoreError> {
            if self.fail_upserts.load(Ordering::SeqCst) {
                return Err(StoreError::Corrupt {
                    id: "*".to_string(),
                    reason: "disk full".to_string(),
                });
            }
            self.inner.upsert(cards, code, nlp)
        }
        fn delete_by_file(&self, path: &str) -> Result<Vec<String>, StoreError> {
            self.inner.delete_by_file(path)
        }
        fn delete_ids(&self, ids: &[String]) -> Result<usize, StoreError> {
            self.inner.delete_ids(ids)
        }
        fn list_indexed_files(&self) -> Result<BTreeSet<String>, StoreError> {
            self.inner.list_indexed_files()
        }
        fn ids_for_file(&self, path: &str) -> Result<BTreeSet<String>, StoreError> {
            self.inner.ids_for_file(path)
        }
        fn get(&self, id: &str) -> Result<Option<StoredFunction>, StoreError> {
            self.inner.get(id)
        }
        fn all(&self) -> Result<Vec<StoredFunction>, StoreError> {
            self.inner.all()
        }
        fn clear(&self) -> Result<(), StoreError> {
            self.inner.clear()
        }
        fn stats(&self) -> Result<IndexStats, StoreError> {
            self.inner.stats()
        }
    }

    struct Fixture {
        dir: TempDir,
        calls: Arc<AtomicUsize>,
    }

    impl Fixture {
        fn new(files: &[(&str, &str)]) -> Self {
            let dir = tempfile::tempdir().unwrap();
            for (path, source) in files {
                let full = dir.path().join(path);
                std::fs::create_dir_all(full.parent().unwrap()).unwrap();
                std::fs::write(full, source).unwrap();
            }
            Self {
                dir,
                calls: Arc::new(AtomicUsize::new(0)),
            }
        }

        fn root(&self) -> &Path {
            self.dir.path()
        }

        fn cache_path(&self) -> PathBuf {
            self.root().join(".auditgraph/index-cache.json")
        }

        fn scan(&self, paths: &[&str]) -> Vec<ScannedFile> {
            let paths: Vec<String> = paths.iter().map(|p| p.to_string()).collect();
            scanner::scan_files(self.root(), &paths)
        }

        fn embedder(&self, dims: usize, fail_on: Option<&'static str>) -> EmbedderHandle {
            let config = EmbeddingConfig {
                dimensions: dims,
                ..EmbeddingConfig::default()
            };
            let provider = CountingEmbedder {
                inner: HashingEmbedder::new("counting".to_string(), dims),
                calls: self.calls.clone(),
                fail_on,
            };
            EmbedderHandle::with_provider(config, Arc::new(provider))
        }

        fn orchestrator(&self, store: Arc<dyn VectorStore>) -> IndexOrchestrator {
            IndexOrchestrator::new(store, self.embedder(DIMS, None), self.root(), self.cache_path())
                .with_concurrency(2)
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    const A: &str = "export function add(a, b) {\n  return a + b;\n}\n\nexport function sub(a, b) {\n  return a - b;\n}\n";
    const B: &str = "import { add } from './a';\n\nexport function total(items) {\n  return items.reduce(add, 0);\n}\n";

    #[tokio::test]
    async fn test_first_run_indexes_every_function() {
        let fx = Fixture::new(&[("src/a.ts", A), ("src/b.ts", B)]);
        let store = Arc::new(MemoryVectorStore::new());
        let orchestrator = fx.orchestrator(store.clone());

        let report = orchestrator.run(&fx.scan(&["src/a.ts", "src/b.ts"]), None).await.unwrap();

        assert_eq!(report.files_indexed, 2);
        assert_eq!(report.functions_indexed, 3);
        assert_eq!(store.len(), 3);

        let cache = IndexCache::load(&fx.cache_path());
        assert_eq!(cache.len(), 3);
        assert_eq!(cache.model, orchestrator.fingerprint());
    }

    #[tokio::test]
    async fn test_second_run_makes_no_embedding_calls() {
        let fx = Fixture::new(&[("src/a.ts", A), ("src/b.ts", B)]);
        let store = Arc::new(MemoryVectorStore::new());
        let orchestrator = fx.orchestrator(store.clone());
        let files = fx.scan(&["src/a.ts", "src/b.ts"]);

        orchestrator.run(&files, None).await.unwrap();
        let calls_after_first = fx.calls();
        assert!(calls_after_first > 0);

        let report = orchestrator.run(&files, None).await.unwrap();
        assert_eq!(fx.calls(), calls_after_first);
        assert_eq!(report.files_fresh, 2);
        assert_eq!(report.files_indexed, 0);
        assert_eq!(store.len(), 3);
    }

    #[tokio::test]
    async fn test_changed_file_is_reindexed_and_old_ranges_dropped() {
        let fx = Fixture::new(&[("src/a.ts", A), ("src/b.ts", B)]);
        let store = Arc::new(MemoryVectorStore::new());
        let orchestrator = fx.orchestrator(store.clone());

        orchestrator.run(&fx.scan(&["src/a.ts", "src/b.ts"]), None).await.unwrap();
        let old_ids = store.ids_for_file("src/b.ts").unwrap();

        let changed = format!("// header\n{}", B);
        std::fs::write(fx.root().join("src/b.ts"), changed).unwrap();
        let report = orchestrator.run(&fx.scan(&["src/a.ts", "src/b.ts"]), None).await.unwrap();

        assert_eq!(report.files_fresh, 1);
        assert_eq!(report.files_indexed, 1);
        assert_eq!(report.functions_removed, 1);

        let new_ids = store.ids_for_file("src/b.ts").unwrap();
        assert_eq!(new_ids.len(), 1);
        assert!(new_ids.is_disjoint(&old_ids));

        let cache = IndexCache::load(&fx.cache_path());
        assert!(old_ids.iter().all(|id| cache.get(id).is_none()));
    }

    #[tokio::test]
    async fn test_deleted_files_are_collected() {
        let fx = Fixture::new(&[("src/a.ts", A), ("src/b.ts", B)]);
        let store = Arc::new(MemoryVectorStore::new());
        let orchestrator = fx.orchestrator(store.clone());

        orchestrator.run(&fx.scan(&["src/a.ts", "src/b.ts"]), None).await.unwrap();
        let a_ids = store.ids_for_file("src/a.ts").unwrap();

        let report = orchestrator.run(&fx.scan(&["src/b.ts"]), None).await.unwrap();
        assert_eq!(report.files_collected, 1);
        assert_eq!(report.functions_removed, 2);
        assert!(store.ids_for_file("src/a.ts").unwrap().is_empty());
        assert_eq!(store.list_indexed_files().unwrap().len(), 1);

        let cache = IndexCache::load(&fx.cache_path());
        assert!(a_ids.iter().all(|id| cache.get(id).is_none()));
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_failing_file_is_isolated_and_retried() {
        let fx = Fixture::new(&[("src/a.ts", A), ("src/bad.ts", "export function explode() {\n  return 1;\n}\n")]);
        let store = Arc::new(MemoryVectorStore::new());
        let orchestrator = IndexOrchestrator::new(
            store.clone(),
            fx.embedder(DIMS, Some("explode")),
            fx.root(),
            fx.cache_path(),
        );
        let files = fx.scan(&["src/a.ts", "src/bad.ts"]);

        let report = orchestrator.run(&files, None).await.unwrap();
        assert_eq!(report.files_indexed, 1);
        assert_eq!(report.files_errored, 1);
        assert_eq!(report.files_indexed + report.files_errored + report.files_interrupted, 2);
        assert!(store.ids_for_file("src/bad.ts").unwrap().is_empty());
        assert_eq!(store.len(), 2);

        // not cached, so the next run tries again
        let report = orchestrator.run(&files, None).await.unwrap();
        assert_eq!(report.files_fresh, 1);
        assert_eq!(report.files_errored, 1);
    }

    #[tokio::test]
    async fn test_store_failure_aborts_before_cache_write() {
        let fx = Fixture::new(&[("src/a.ts", A)]);
        let store = Arc::new(FlakyStore::failing());
        let orchestrator = fx.orchestrator(store);

        let result = orchestrator.run(&fx.scan(&["src/a.ts"]), None).await;
        assert!(result.is_err());
        assert!(!fx.cache_path().exists());
    }

    #[tokio::test]
    async fn test_collected_file_is_reindexed_after_failed_run() {
        let fx = Fixture::new(&[("src/a.ts", A), ("src/b.ts", B)]);
        let store = Arc::new(FlakyStore::default());
        let orchestrator = fx.orchestrator(store.clone());
        orchestrator.run(&fx.scan(&["src/a.ts", "src/b.ts"]), None).await.unwrap();

        // a.ts disappears and b.ts changes, but the commit fails after GC
        std::fs::write(fx.root().join("src/b.ts"), format!("// v2\n{}", B)).unwrap();
        store.fail_upserts.store(true, Ordering::SeqCst);
        assert!(orchestrator.run(&fx.scan(&["src/b.ts"]), None).await.is_err());
        assert!(store.ids_for_file("src/a.ts").unwrap().is_empty());

        // a.ts comes back unchanged; its cache entries are still on disk
        store.fail_upserts.store(false, Ordering::SeqCst);
        let report = orchestrator.run(&fx.scan(&["src/a.ts", "src/b.ts"]), None).await.unwrap();
        assert_eq!(report.files_indexed, 2);
        assert_eq!(store.ids_for_file("src/a.ts").unwrap().len(), 2);

        let report = orchestrator.run(&fx.scan(&["src/a.ts", "src/b.ts"]), None).await.unwrap();
        assert_eq!(report.files_fresh, 2);
        assert_eq!(store.ids_for_file("src/a.ts").unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_interrupted_run_indexes_nothing() {
        let fx = Fixture::new(&[("src/a.ts", A), ("src/b.ts", B)]);
        let store = Arc::new(MemoryVectorStore::new());
        let orchestrator = fx.orchestrator(store.clone());
        let always: &(dyn Fn() -> bool + Sync) = &|| true;

        let report = orchestrator
            .run(&fx.scan(&["src/a.ts", "src/b.ts"]), Some(always))
            .await
            .unwrap();
        assert_eq!(report.files_interrupted, 2);
        assert_eq!(fx.calls(), 0);
        assert!(store.is_empty());
        assert!(IndexCache::load(&fx.cache_path()).is_empty());
    }

    #[tokio::test]
    async fn test_file_without_functions_is_purged() {
        let fx = Fixture::new(&[("src/a.ts", A)]);
        let store = Arc::new(MemoryVectorStore::new());
        let orchestrator = fx.orchestrator(store.clone());
        orchestrator.run(&fx.scan(&["src/a.ts"]), None).await.unwrap();

        std::fs::write(fx.root().join("src/a.ts"), "export const ONLY = 1;\n").unwrap();
        let report = orchestrator.run(&fx.scan(&["src/a.ts"]), None).await.unwrap();
        assert_eq!(report.functions_removed, 2);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_model_change_rebuilds_index() {
        let fx = Fixture::new(&[("src/a.ts", A)]);
        let store = Arc::new(MemoryVectorStore::new());
        let files = fx.scan(&["src/a.ts"]);

        fx.orchestrator(store.clone()).run(&files, None).await.unwrap();

        let wider = IndexOrchestrator::new(store.clone(), fx.embedder(128, None), fx.root(), fx.cache_path());
        let report = wider.run(&files, None).await.unwrap();
        assert!(report.model_reset);
        assert_eq!(report.functions_indexed, 2);
        let stored = store.all().unwrap();
        assert!(stored.iter().all(|s| s.code_vector.len() == 128));
    }

    #[tokio::test]
    async fn test_find_duplicates() {
        let body = "(items) {\n  let sum = 0;\n  for (const item of items) {\n    sum += item.price * item.quantity;\n  }\n  return sum;\n}\n";
        let cart = format!("export function cartTotal{}", body);
        let order = format!("export function orderTotal{}", body);
        let fx = Fixture::new(&[("src/cart.ts", cart.as_str()), ("src/order.ts", order.as_str()), ("src/a.ts", A)]);
        let store = Arc::new(MemoryVectorStore::new());
        let orchestrator = fx.orchestrator(store.clone());
        orchestrator
            .run(&fx.scan(&["src/cart.ts", "src/order.ts", "src/a.ts"]), None)
            .await
            .unwrap();

        let cart_id = store.ids_for_file("src/cart.ts").unwrap().into_iter().next().unwrap();
        let outcome = orchestrator.find_duplicates(&cart_id).unwrap();
        assert!(outcome.is_indexed());
        assert_eq!(outcome.matches()[0].card.file_path, "src/order.ts");
        assert!(outcome.matches().iter().all(|m| m.card.id != cart_id));

        assert!(!orchestrator.find_duplicates("0000000000000000").unwrap().is_indexed());

        let per_file = orchestrator.duplicates_in_file("src/a.ts").unwrap();
        assert_eq!(per_file.len(), 2);
        assert_eq!(per_file[0].name, "add");
        assert!(per_file.iter().all(|d| d.outcome.is_indexed()));
    }

    #[tokio::test]
    async fn test_duplicates_in_edited_file_reports_not_indexed() {
        let fx = Fixture::new(&[("src/a.ts", A)]);
        let store = Arc::new(MemoryVectorStore::new());
        let orchestrator = fx.orchestrator(store.clone());
        orchestrator.run(&fx.scan(&["src/a.ts"]), None).await.unwrap();

        // `sub` grows a line; `add` keeps its range
        let edited = "export function add(a, b) {\n  return a + b;\n}\n\nexport function sub(a, b) {\n  const d = a - b;\n  return d;\n}\n";
        std::fs::write(fx.root().join("src/a.ts"), edited).unwrap();

        let per_file = orchestrator.duplicates_in_file("src/a.ts").unwrap();
        let names: Vec<&str> = per_file.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["add", "sub"]);
        assert!(per_file[0].outcome.is_indexed());
        assert!(matches!(per_file[1].outcome, SearchOutcome::NotIndexed));
        assert_eq!((per_file[1].line_start, per_file[1].line_end), (5, 8));
    }

    #[tokio::test]
    async fn test_dual_mode_stores_summaries_and_nlp_vectors() {
        let fx = Fixture::new(&[("src/a.ts", A)]);
        let store = Arc::new(MemoryVectorStore::new());
        let nlp = EmbedderHandle::with_provider(
            EmbeddingConfig {
                dimensions: 32,
                ..EmbeddingConfig::default()
            },
            Arc::new(HashingEmbedder::new("nlp".to_string(), 32)),
        );
        let orchestrator = fx
            .orchestrator(store.clone())
            .with_dual_embedding(nlp, Arc::new(StaticSummarizer));

        orchestrator.run(&fx.scan(&["src/a.ts"]), None).await.unwrap();

        let stats = store.stats().unwrap();
        assert_eq!(stats.functions_with_nlp, 2);
        let stored = store.all().unwrap();
        assert!(stored.iter().all(|s| s.nlp_vector.as_ref().map(|v| v.len()) == Some(32)));
        assert!(stored.iter().all(|s| s.card.behavioral_profile.as_deref() == Some("pure")));

        let id = stored[0].card.id.clone();
        assert!(orchestrator.find_duplicates(&id).unwrap().is_indexed());
    }

    #[tokio::test]
    async fn test_rebuild_reembeds_everything() {
        let fx = Fixture::new(&[("src/a.ts", A)]);
        let store = Arc::new(MemoryVectorStore::new());
        let orchestrator = fx.orchestrator(store.clone());
        let files = fx.scan(&["src/a.ts"]);

        orchestrator.run(&files, None).await.unwrap();
        let report = orchestrator.rebuild(&files, None).await.unwrap();
        assert_eq!(report.functions_indexed, 2);
        assert_eq!(store.len(), 2);
    }
}
