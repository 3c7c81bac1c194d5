use anyhow::Result;

use crate::config::Config;
use crate::query::QueryEngine;

pub async fn show_usage(symbol: String, file: String, project: String, format: String) -> Result<()> {
    super::check_format(&format)?;
    let root = super::project_root(&project)?;
    let config = Config::from_project_dir(&root);
    let engine = QueryEngine::load(&root, &config);
    let report = engine.usage(&symbol, &file);

    if format == "json" {
        return super::print_json(&report);
    }

    if !report.defined {
        println!("Note: {} does not export '{}'", report.file, report.symbol);
    }
    if !report.is_used() {
        println!("No project file imports '{}' from {}", report.symbol, report.file);
        if !report.file_importers.is_empty() {
            println!(
                "({} files import other names from {})",
                report.file_importers.len(),
                report.file
            );
        }
        return Ok(());
    }
    if !report.runtime.is_empty() {
        println!("Runtime importers ({}):", report.runtime.len());
        for file in &report.runtime {
            println!("  {}", file);
        }
    }
    if !report.type_only.is_empty() {
        println!("Type-only importers ({}):", report.type_only.len());
        for file in &report.type_only {
            println!("  {}", file);
        }
    }
    Ok(())
}
