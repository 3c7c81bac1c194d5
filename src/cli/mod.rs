// CLI command implementations

pub mod duplicates;
pub mod index;
pub mod stats;
pub mod unused;
pub mod usage;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};

use crate::config::Config;
use crate::index::db::IndexDatabase;
use crate::index::store::{MemoryVectorStore, VectorStore};

/// Absolute project root; notify reports absolute paths.
pub fn project_root(project: &str) -> Result<PathBuf> {
    std::fs::canonicalize(project).with_context(|| format!("Project directory not found: {}", project))
}

/// The on-disk SQLite store, or a throwaway in-memory one.
pub fn open_store(config: &Config, root: &Path, memory: bool) -> Result<Arc<dyn VectorStore>> {
    if memory {
        return Ok(Arc::new(MemoryVectorStore::new()));
    }
    Ok(Arc::new(IndexDatabase::new(config.db_path(root))?))
}

/// Print `value` as pretty JSON.
pub fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub fn check_format(format: &str) -> Result<()> {
    match format {
        "json" | "text" => Ok(()),
        other => anyhow::bail!("Unknown format: {} (expected json or text)", other),
    }
}
