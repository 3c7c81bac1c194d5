// Query execution engine

use std::collections::BTreeMap;
use std::path::Path;

use serde::Serialize;
use tracing::info;

use crate::config::Config;
use crate::graph::imports::ImportMode;
use crate::graph::{unused_exports, UsageGraph};
use crate::index::{ScannedFile, Symbol};
use crate::indexer::scanner;

/// Importers of one exported symbol.
#[derive(Debug, Clone, Serialize)]
pub struct UsageReport {
    pub symbol: String,
    pub file: String,
    /// The symbol is declared and exported by `file`
    pub defined: bool,
    pub runtime: Vec<String>,
    pub type_only: Vec<String>,
    /// Files importing anything at all from `file`
    pub file_importers: Vec<String>,
}

impl UsageReport {
    pub fn is_used(&self) -> bool {
        !self.runtime.is_empty() || !self.type_only.is_empty()
    }
}

/// Structural counts for the scanned project.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ProjectStats {
    pub files: usize,
    pub symbols: usize,
    pub exported_symbols: usize,
    pub function_symbols: usize,
    pub import_edges: usize,
    pub symbols_by_kind: BTreeMap<String, usize>,
    pub edges_by_mode: BTreeMap<String, usize>,
}

/// Read-only queries over a scanned project and its usage graph.
pub struct QueryEngine {
    files: Vec<ScannedFile>,
    graph: UsageGraph,
}

impl QueryEngine {
    pub fn new(files: Vec<ScannedFile>, graph: UsageGraph) -> Self {
        Self { files, graph }
    }

    /// Discover, scan and link every project file.
    pub fn load(project_root: &Path, config: &Config) -> Self {
        let paths = scanner::discover_files(project_root, config);
        let files = scanner::scan_files(project_root, &paths);
        let graph = UsageGraph::build(project_root, &paths);
        info!(
            "Loaded {} files with {} import edges",
            files.len(),
            graph.edges().len()
        );
        Self::new(files, graph)
    }

    pub fn files(&self) -> &[ScannedFile] {
        &self.files
    }

    pub fn usage(&self, symbol: &str, file: &str) -> UsageReport {
        let file = normalize_file_arg(file);
        let defined = self
            .files
            .iter()
            .filter(|f| f.path == file)
            .flat_map(|f| f.symbols.iter())
            .any(|s| s.exported && s.name == symbol);

        UsageReport {
            symbol: symbol.to_string(),
            file: file.clone(),
            defined,
            runtime: self.graph.usage_of(symbol, &file),
            type_only: self.graph.type_usage_of(symbol, &file),
            file_importers: self.graph.importers_of(&file),
        }
    }

    /// Exported symbols with no importers at all.
    pub fn unused(&self) -> Vec<Symbol> {
        unused_exports(&self.graph, &self.files)
    }

    pub fn stats(&self) -> ProjectStats {
        let mut stats = ProjectStats {
            files: self.files.len(),
            import_edges: self.graph.edges().len(),
            ..Default::default()
        };
        for symbol in self.files.iter().flat_map(|f| f.symbols.iter()) {
            stats.symbols += 1;
            if symbol.exported {
                stats.exported_symbols += 1;
            }
            if symbol.kind.is_function_like() {
                stats.function_symbols += 1;
            }
            *stats.symbols_by_kind.entry(symbol.kind.as_str().to_string()).or_default() += 1;
        }
        for edge in self.graph.edges() {
            *stats.edges_by_mode.entry(mode_name(edge.mode).to_string()).or_default() += 1;
        }
        stats
    }
}

fn mode_name(mode: ImportMode) -> &'static str {
    match mode {
        ImportMode::Runtime => "runtime",
        ImportMode::TypeOnly => "type-only",
        ImportMode::Namespace => "namespace",
        ImportMode::Default => "default",
        ImportMode::ReExport => "re-export",
        ImportMode::TypeReExport => "type-re-export",
    }
}

/// Accept `./src/a.ts` or `src\a.ts` for the project-relative `src/a.ts`.
pub fn normalize_file_arg(file: &str) -> String {
    file.replace('\\', "/").trim_start_matches("./").to_string()
}
