use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use crate::config::Config;
use crate::indexer::watcher::IndexWatcher;
use crate::indexer::{scanner, IndexOrchestrator, IndexRunReport};

pub async fn index_project(project: String, watch: bool, rebuild: bool, memory: bool) -> Result<()> {
    let root = super::project_root(&project)?;
    let config = Config::from_project_dir(&root);

    println!("auditgraph indexer v{}", env!("CARGO_PKG_VERSION"));
    println!("Project: {}", root.display());
    println!("Config: {}", if config.project.name != "unnamed-project" { "loaded" } else { "default" });

    let should_watch = watch || config.indexing.watch;
    let store = super::open_store(&config, &root, memory)?;
    let orchestrator = IndexOrchestrator::from_config(&config, &root, store)?;
    println!("Model: {}", orchestrator.fingerprint());
    println!("Store: {}", if memory { "memory".to_string() } else { config.db_path(&root).display().to_string() });

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(ProgressStyle::with_template("{spinner} {msg} [{elapsed}]")?);
    spinner.enable_steady_tick(Duration::from_millis(120));

    spinner.set_message("Scanning project files...");
    let paths = scanner::discover_files(&root, &config);
    let files = scanner::scan_files(&root, &paths);
    info!("Scanned {} files", files.len());

    let interrupted = Arc::new(AtomicBool::new(false));
    let flag = interrupted.clone();
    let ctrl_c = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            flag.store(true, Ordering::SeqCst);
        }
    });
    let stop = interrupted.clone();
    let is_interrupted: &(dyn Fn() -> bool + Sync) = &move || stop.load(Ordering::SeqCst);

    spinner.set_message(format!("Indexing {} files...", files.len()));
    let report = if rebuild {
        orchestrator.rebuild(&files, Some(is_interrupted)).await?
    } else {
        orchestrator.run(&files, Some(is_interrupted)).await?
    };
    ctrl_c.abort();
    spinner.finish_and_clear();

    print_report(&report);
    let stats = orchestrator.store().stats()?;
    println!(
        "Index: {} files, {} functions ({} with NLP vectors)",
        stats.total_files, stats.total_functions, stats.functions_with_nlp
    );

    if interrupted.load(Ordering::SeqCst) {
        println!("\nInterrupted; unfinished files will be picked up by the next run.");
        return Ok(());
    }

    if should_watch {
        println!("\nWatching for file changes. Press Ctrl+C to stop.");
        IndexWatcher::new(orchestrator, root, config).watch().await?;
    }

    Ok(())
}

fn print_report(report: &IndexRunReport) {
    println!("\nIndexing complete!");
    if report.model_reset {
        println!("  Embedding model changed: index rebuilt");
    }
    println!("  Files: {} total, {} up to date", report.files_total, report.files_fresh);
    println!("  Indexed: {} files, {} functions", report.files_indexed, report.functions_indexed);
    if report.files_errored > 0 {
        println!("  Errored: {} files (retried next run)", report.files_errored);
    }
    if report.files_interrupted > 0 {
        println!("  Interrupted: {} files", report.files_interrupted);
    }
    println!(
        "  Removed: {} functions ({} deleted files)",
        report.functions_removed, report.files_collected
    );
}
