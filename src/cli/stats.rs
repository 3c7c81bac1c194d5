use std::path::Path;

use anyhow::Result;

use crate::config::Config;
use crate::query::QueryEngine;

pub async fn show_stats(project: String, verbose: bool) -> Result<()> {
    let root = super::project_root(&project)?;
    let config = Config::from_project_dir(&root);

    println!("auditgraph statistics v{}", env!("CARGO_PKG_VERSION"));
    println!("Project: {}", root.display());
    println!("Config: {}", if config.project.name != "unnamed-project" { "loaded" } else { "default" });

    let db_path = config.db_path(&root);
    let store = super::open_store(&config, &root, false)?;
    let stats = store.stats()?;

    println!("\nSemantic index:");
    println!("  Indexed files: {}", stats.total_files);
    println!("  Functions: {}", stats.total_functions);
    println!("  Functions with NLP vectors: {}", stats.functions_with_nlp);
    println!("  Index size: {:.2} MB", db_size_mb(&db_path));

    if verbose {
        let project_stats = QueryEngine::load(&root, &config).stats();
        println!("\nUsage graph:");
        println!("  Source files: {}", project_stats.files);
        println!(
            "  Symbols: {} ({} exported, {} functions)",
            project_stats.symbols, project_stats.exported_symbols, project_stats.function_symbols
        );
        println!("  Import edges: {}", project_stats.import_edges);
        if !project_stats.symbols_by_kind.is_empty() {
            println!("  Symbols by kind:");
            for (kind, count) in &project_stats.symbols_by_kind {
                println!("    {}: {}", kind, count);
            }
        }
        if !project_stats.edges_by_mode.is_empty() {
            println!("  Imports by mode:");
            for (mode, count) in &project_stats.edges_by_mode {
                println!("    {}: {}", mode, count);
            }
        }
    }

    Ok(())
}

/// SQLite file plus its WAL, in megabytes.
fn db_size_mb(db_path: &Path) -> f64 {
    let wal = db_path.with_extension("db-wal");
    let bytes: u64 = [db_path, wal.as_path()]
        .iter()
        .filter_map(|p| std::fs::metadata(p).ok())
        .map(|m| m.len())
        .sum();
    bytes as f64 / (1024.0 * 1024.0)
}
