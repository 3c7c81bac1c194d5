use anyhow::Result;

use crate::config::Config;
use crate::query::QueryEngine;

pub async fn list_unused(project: String, format: String) -> Result<()> {
    super::check_format(&format)?;
    let root = super::project_root(&project)?;
    let config = Config::from_project_dir(&root);
    let engine = QueryEngine::load(&root, &config);
    let unused = engine.unused();

    if format == "json" {
        return super::print_json(&unused);
    }

    if unused.is_empty() {
        println!("Every export in {} files has an importer", engine.files().len());
        return Ok(());
    }
    println!("{} exports with no importers:", unused.len());
    for symbol in &unused {
        println!(
            "  {}:{} - {} ({})",
            symbol.file,
            symbol.line_start,
            symbol.name,
            symbol.kind.as_str()
        );
    }
    Ok(())
}
