use anyhow::Result;
use serde_json::json;

use crate::config::Config;
use crate::index::SearchOutcome;
use crate::indexer::{FunctionDuplicates, IndexOrchestrator};
use crate::query::engine::normalize_file_arg;

pub async fn find_duplicates(file: String, name: Option<String>, project: String, format: String) -> Result<()> {
    super::check_format(&format)?;
    let root = super::project_root(&project)?;
    let config = Config::from_project_dir(&root);
    let store = super::open_store(&config, &root, false)?;
    let orchestrator = IndexOrchestrator::from_config(&config, &root, store)?;

    let file = normalize_file_arg(&file);
    let results: Vec<FunctionDuplicates> = orchestrator
        .duplicates_in_file(&file)?
        .into_iter()
        .filter(|d| name.as_deref().map(|n| d.name == n).unwrap_or(true))
        .collect();

    if format == "json" {
        let value: Vec<serde_json::Value> = results
            .iter()
            .map(|d| {
                json!({
                    "functionId": d.function_id,
                    "name": d.name,
                    "lineStart": d.line_start,
                    "lineEnd": d.line_end,
                    "indexed": d.outcome.is_indexed(),
                    "matches": d.outcome.matches(),
                })
            })
            .collect();
        return super::print_json(&value);
    }

    if results.is_empty() {
        println!("No functions found in {}", file);
        return Ok(());
    }
    for d in &results {
        println!("{}:{}-{} {}", file, d.line_start, d.line_end, d.name);
        match &d.outcome {
            SearchOutcome::NotIndexed => println!("  (not indexed; run `auditgraph index`)"),
            SearchOutcome::Ranked(hits) if hits.is_empty() => println!("  no similar functions"),
            SearchOutcome::Ranked(hits) => {
                for hit in hits {
                    println!(
                        "  {:.3}  {}:{} {}",
                        hit.score, hit.card.file_path, hit.card.line_start, hit.card.name
                    );
                }
            }
        }
    }
    Ok(())
}
