// File watcher for incremental re-indexing

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::{mpsc, Notify};
use tracing::{debug, error, info, warn};

use super::{scanner, IndexOrchestrator, IndexRunReport};
use crate::config::{Config, CONFIG_FILE};

/// Quiet period after the last event before a batch is indexed.
const DEBOUNCE: Duration = Duration::from_millis(500);

/// What a batch of filesystem events means for the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ChangeKind {
    Ignored,
    Sources,
    /// The project configuration changed; implies a source rescan
    Config,
}

/// Classify changed paths against the project configuration.
pub fn classify_paths(project_root: &Path, config: &Config, paths: &[PathBuf]) -> ChangeKind {
    paths
        .iter()
        .map(|path| {
            let Ok(rel) = path.strip_prefix(project_root) else {
                return ChangeKind::Ignored;
            };
            let rel = rel.to_string_lossy().replace('\\', "/");
            if rel == CONFIG_FILE {
                ChangeKind::Config
            } else if config.should_index_file(&rel) {
                ChangeKind::Sources
            } else {
                ChangeKind::Ignored
            }
        })
        .max()
        .unwrap_or(ChangeKind::Ignored)
}

/// Watches a project and re-runs the orchestrator after each burst of changes.
pub struct IndexWatcher {
    orchestrator: IndexOrchestrator,
    project_root: PathBuf,
    config: Config,
    interrupted: Arc<AtomicBool>,
}

impl IndexWatcher {
    pub fn new(orchestrator: IndexOrchestrator, project_root: PathBuf, config: Config) -> Self {
        Self {
            orchestrator,
            project_root,
            config,
            interrupted: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Rescan the project and bring the index up to date.
    pub async fn reindex(&self) -> Result<IndexRunReport> {
        let paths = scanner::discover_files(&self.project_root, &self.config);
        let files = scanner::scan_files(&self.project_root, &paths);
        let flag = self.interrupted.clone();
        let is_interrupted: &(dyn Fn() -> bool + Sync) = &move || flag.load(Ordering::SeqCst);
        self.orchestrator.run(&files, Some(is_interrupted)).await
    }

    fn reload_config(&mut self) {
        let config = Config::from_project_dir(&self.project_root);
        if self.orchestrator.reconfigure(&config) {
            info!("Embedding configuration changed; the index will be rebuilt");
        }
        self.config = config;
    }

    /// Watch until Ctrl+C.
    pub async fn watch(mut self) -> Result<()> {
        info!("Starting file watcher for: {}", self.project_root.display());

        let (tx, mut rx) = mpsc::channel::<Event>(256);
        let mut watcher = RecommendedWatcher::new(
            move |res: Result<Event, notify::Error>| match res {
                Ok(event) => {
                    if tx.blocking_send(event).is_err() {
                        debug!("Watcher channel closed");
                    }
                }
                Err(e) => error!("File watch error: {}", e),
            },
            notify::Config::default(),
        )
        .context("Failed to create file watcher")?;
        watcher
            .watch(&self.project_root, RecursiveMode::Recursive)
            .with_context(|| format!("Failed to watch {}", self.project_root.display()))?;

        let flag = self.interrupted.clone();
        let stop = Arc::new(Notify::new());
        let stop_signal = stop.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Interrupt received; finishing in-flight work");
                flag.store(true, Ordering::SeqCst);
                stop_signal.notify_one();
            }
        });

        info!("File watcher started. Monitoring for changes...");
        loop {
            let first = tokio::select! {
                event = rx.recv() => event,
                _ = stop.notified() => None,
            };
            let Some(first) = first else {
                break;
            };
            let mut batch = vec![first];
            // Debounce: keep draining until the tree is quiet.
            while let Ok(Some(event)) = tokio::time::timeout(DEBOUNCE, rx.recv()).await {
                batch.push(event);
            }
            if self.interrupted.load(Ordering::SeqCst) {
                break;
            }

            let paths: Vec<PathBuf> = batch
                .into_iter()
                .filter(|e| matches!(e.kind, EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)))
                .flat_map(|e| e.paths)
                .collect();
            match classify_paths(&self.project_root, &self.config, &paths) {
                ChangeKind::Ignored => continue,
                ChangeKind::Config => self.reload_config(),
                ChangeKind::Sources => {}
            }
            debug!("{} changed paths", paths.len());

            match self.reindex().await {
                Ok(report) => info!(
                    "Re-indexed: {} files updated, {} errored, {} removed",
                    report.files_indexed, report.files_errored, report.files_collected
                ),
                Err(e) => warn!("Re-index failed: {:#}", e),
            }
            if self.interrupted.load(Ordering::SeqCst) {
                break;
            }
        }

        info!("File watcher stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_paths() {
        let root = PathBuf::from("/project");
        let config = Config::default();
        let classify = |paths: &[&str]| {
            let paths: Vec<PathBuf> = paths.iter().map(|p| root.join(p)).collect();
            classify_paths(&root, &config, &paths)
        };

        assert_eq!(classify(&["src/a.ts"]), ChangeKind::Sources);
        assert_eq!(classify(&["README.md", "node_modules/x/index.js"]), ChangeKind::Ignored);
        assert_eq!(classify(&["src/a.ts", CONFIG_FILE]), ChangeKind::Config);
        assert_eq!(classify(&[".auditgraph/index-cache.json"]), ChangeKind::Ignored);
        assert_eq!(classify(&[]), ChangeKind::Ignored);
    }

    #[test]
    fn test_paths_outside_project_are_ignored() {
        let config = Config::default();
        let outside = vec![PathBuf::from("/elsewhere/a.ts")];
        assert_eq!(classify_paths(Path::new("/project"), &config, &outside), ChangeKind::Ignored);
    }

    #[tokio::test]
    async fn test_reindex_picks_up_new_files() {
        use crate::embedding::EmbedderHandle;
        use crate::index::store::MemoryVectorStore;

        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().to_path_buf();
        std::fs::create_dir_all(root.join("src")).unwrap();
        std::fs::write(root.join("src/a.ts"), "export function one() {\n  return 1;\n}\n").unwrap();

        let config = Config::default();
        let store = Arc::new(MemoryVectorStore::new());
        let orchestrator = IndexOrchestrator::new(
            store.clone(),
            EmbedderHandle::new(config.embedding.clone()),
            &root,
            config.cache_path(&root),
        );
        let watcher = IndexWatcher::new(orchestrator, root.clone(), config);

        let report = watcher.reindex().await.unwrap();
        assert_eq!(report.functions_indexed, 1);

        std::fs::write(root.join("src/b.ts"), "export function two() {\n  return 2;\n}\n").unwrap();
        let report = watcher.reindex().await.unwrap();
        assert_eq!(report.files_fresh, 1);
        assert_eq!(report.functions_indexed, 1);
        assert_eq!(store.len(), 2);
    }
}
