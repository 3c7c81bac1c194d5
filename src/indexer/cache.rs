// Persisted function id -> content hash cache

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cache serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Which content hash each function was last indexed at.
///
/// `model` records the embedding model the entries were produced with; the
/// orchestrator drops the whole cache when it changes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IndexCache {
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub entries: BTreeMap<String, String>,
}

impl IndexCache {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            entries: BTreeMap::new(),
        }
    }

    /// Read the cache at `path`. A missing file is an empty cache; an
    /// unreadable or corrupt one is logged and treated as empty too.
    pub fn load(path: &Path) -> Self {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No index cache at {}", path.display());
                return Self::default();
            }
            Err(e) => {
                warn!("Could not read index cache {}: {}; starting empty", path.display(), e);
                return Self::default();
            }
        };

        match serde_json::from_str(&content) {
            Ok(cache) => cache,
            Err(e) => {
                warn!("Index cache {} is corrupt ({}); starting empty", path.display(), e);
                Self::default()
            }
        }
    }

    /// Replace the file at `path` atomically: write a sibling temp file, then rename.
    pub fn save(&self, path: &Path) -> Result<(), CacheError> {
        let dir = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let io_err = |source: std::io::Error| CacheError::Io {
            path: path.to_path_buf(),
            source,
        };

        std::fs::create_dir_all(&dir).map_err(io_err)?;
        let json = serde_json::to_vec_pretty(self)?;

        let mut tmp = NamedTempFile::new_in(&dir).map_err(io_err)?;
        tmp.write_all(&json).map_err(io_err)?;
        tmp.as_file().sync_all().map_err(io_err)?;
        tmp.persist(path).map_err(|e| io_err(e.error))?;

        debug!("Wrote index cache with {} entries to {}", self.entries.len(), path.display());
        Ok(())
    }

    pub fn get(&self, function_id: &str) -> Option<&str> {
        self.entries.get(function_id).map(String::as_str)
    }

    pub fn is_fresh(&self, function_id: &str, content_hash: &str) -> bool {
        self.get(function_id) == Some(content_hash)
    }

    pub fn insert(&mut self, function_id: String, content_hash: String) {
        self.entries.insert(function_id, content_hash);
    }

    pub fn remove(&mut self, function_id: &str) -> bool {
        self.entries.remove(function_id).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_missing_file_is_empty() {
        let dir = tempdir().unwrap();
        let cache = IndexCache::load(&dir.path().join("nope.json"));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested/cache.json");

        let mut cache = IndexCache::new("hashing:m:8");
        cache.insert("abc".to_string(), "h1".to_string());
        cache.save(&path).unwrap();

        let loaded = IndexCache::load(&path);
        assert_eq!(loaded, cache);
        assert!(loaded.is_fresh("abc", "h1"));
        assert!(!loaded.is_fresh("abc", "h2"));
        assert!(!loaded.is_fresh("xyz", "h1"));
    }

    #[test]
    fn test_corrupt_file_is_empty() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cache.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(IndexCache::load(&path).is_empty());
    }

    #[test]
    fn test_save_replaces_previous_content() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cache.json");

        let mut cache = IndexCache::new("m");
        cache.insert("a".to_string(), "1".to_string());
        cache.save(&path).unwrap();
        cache.remove("a");
        cache.insert("b".to_string(), "2".to_string());
        cache.save(&path).unwrap();

        let loaded = IndexCache::load(&path);
        assert!(loaded.get("a").is_none());
        assert_eq!(loaded.get("b"), Some("2"));

        // only the cache file itself remains; no stray temp files
        let files: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(files.len(), 1);
    }
}
