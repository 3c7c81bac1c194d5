// Cross-file symbol usage graph

pub mod imports;
pub mod resolve;

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use tracing::{debug, info, warn};

use crate::index::{ScannedFile, Symbol};
use crate::indexer::scanner::scan_source;
use imports::{default_export_name, has_default_export, parse_imports, ImportEdge, ImportMode};
use resolve::resolve_specifier;

type UsageKey = (String, String);

/// Who imports what, and how.
///
/// Maps `(symbol, defining file)` to its importers, in a runtime view and a
/// type-only view. Imports through a re-exporting module are also credited
/// to the module that defines the symbol.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UsageGraph {
    runtime: BTreeMap<UsageKey, BTreeSet<String>>,
    type_only: BTreeMap<UsageKey, BTreeSet<String>>,
    edges: Vec<ImportEdge>,
    /// File -> local name bound to its default export
    default_names: BTreeMap<String, String>,
}

/// What a module makes importable.
#[derive(Debug, Default)]
struct ModuleExports {
    /// Names declared and exported in the module itself (plus `default`)
    own: BTreeSet<String>,
    /// exported name -> (origin name, origin file)
    named: BTreeMap<String, Vec<(String, String)>>,
    /// `export * from` origins
    stars: Vec<String>,
}

impl UsageGraph {
    /// Scan `files` (project-relative) under `project_root` and link their imports.
    ///
    /// The result depends only on the file set, not on its order. Unreadable
    /// files contribute nothing.
    pub fn build(project_root: &Path, files: &[String]) -> Self {
        let file_set: BTreeSet<String> = files.iter().cloned().collect();
        let mut sources = BTreeMap::new();
        for file in &file_set {
            match std::fs::read_to_string(project_root.join(file)) {
                Ok(content) => {
                    sources.insert(file.clone(), content);
                }
                Err(e) => warn!("Skipping {} in usage graph: {}", file, e),
            }
        }
        Self::from_sources(&sources)
    }

    /// Build from in-memory `path -> source` pairs.
    pub fn from_sources(sources: &BTreeMap<String, String>) -> Self {
        let file_set: BTreeSet<String> = sources.keys().cloned().collect();
        let mut graph = UsageGraph::default();
        let mut exports: BTreeMap<String, ModuleExports> = BTreeMap::new();

        for (file, source) in sources {
            let module = exports.entry(file.clone()).or_default();
            module.own.extend(
                scan_source(file, source)
                    .into_iter()
                    .filter(|s| s.exported)
                    .map(|s| s.name),
            );
            if has_default_export(source) {
                module.own.insert("default".to_string());
            }
            if let Some(name) = default_export_name(source) {
                graph.default_names.insert(file.clone(), name);
            }

            for raw in parse_imports(source) {
                let Some(target) = resolve_specifier(file, &raw.specifier, &file_set) else {
                    debug!("Unresolved import {} in {}", raw.specifier, file);
                    continue;
                };
                if target == *file {
                    continue;
                }
                if raw.mode.is_reexport() {
                    let module = exports.entry(file.clone()).or_default();
                    if raw.imported_name == "*" {
                        module.stars.push(target.clone());
                    } else {
                        module
                            .named
                            .entry(raw.local_alias.clone())
                            .or_default()
                            .push((raw.imported_name.clone(), target.clone()));
                    }
                }
                graph.edges.push(ImportEdge {
                    importer_file: file.clone(),
                    target_file: target,
                    imported_name: raw.imported_name,
                    local_alias: raw.local_alias,
                    mode: raw.mode,
                });
            }
        }

        graph.edges.sort();
        graph.edges.dedup();

        let edges = graph.edges.clone();
        for edge in &edges {
            match edge.mode {
                ImportMode::Runtime | ImportMode::Default | ImportMode::ReExport => {
                    // `export * from` gives no usage by itself
                    if edge.imported_name != "*" {
                        graph.credit(false, &exports, &edge.imported_name, &edge.target_file, &edge.importer_file);
                    }
                }
                ImportMode::TypeOnly | ImportMode::TypeReExport => {
                    graph.credit(true, &exports, &edge.imported_name, &edge.target_file, &edge.importer_file);
                }
                ImportMode::Namespace => {
                    let mut seen = BTreeSet::new();
                    for name in export_surface(&exports, &edge.target_file, &mut seen) {
                        graph.credit(false, &exports, &name, &edge.target_file, &edge.importer_file);
                    }
                }
            }
        }

        info!(
            "Usage graph: {} files, {} import edges, {} used symbols",
            sources.len(),
            graph.edges.len(),
            graph.runtime.len() + graph.type_only.len()
        );
        graph
    }

    /// Record `importer` as a user of `name@file`, then follow re-exports
    /// of `file` down to the defining modules.
    fn credit(
        &mut self,
        type_only: bool,
        exports: &BTreeMap<String, ModuleExports>,
        name: &str,
        file: &str,
        importer: &str,
    ) {
        let mut visited = BTreeSet::new();
        let mut pending = vec![(name.to_string(), file.to_string())];

        while let Some((name, file)) = pending.pop() {
            if !visited.insert((name.clone(), file.clone())) {
                continue;
            }
            if file != importer {
                let map = if type_only { &mut self.type_only } else { &mut self.runtime };
                map.entry((name.clone(), file.clone()))
                    .or_default()
                    .insert(importer.to_string());
            }

            let Some(module) = exports.get(&file) else {
                continue;
            };
            if let Some(origins) = module.named.get(&name) {
                pending.extend(origins.iter().cloned());
            }
            if name != "default" {
                pending.extend(module.stars.iter().map(|origin| (name.clone(), origin.clone())));
            }
        }
    }

    /// Files importing `symbol` from `file` at runtime, sorted.
    pub fn usage_of(&self, symbol: &str, file: &str) -> Vec<String> {
        lookup(&self.runtime, symbol, file)
    }

    /// Files importing `symbol` from `file` as a type only, sorted.
    pub fn type_usage_of(&self, symbol: &str, file: &str) -> Vec<String> {
        lookup(&self.type_only, symbol, file)
    }

    /// True when anything imports `symbol@file`, in either view, under its
    /// own name or as the module's default export.
    pub fn is_used(&self, symbol: &str, file: &str) -> bool {
        let key = (symbol.to_string(), file.to_string());
        if self.runtime.contains_key(&key) || self.type_only.contains_key(&key) {
            return true;
        }
        self.default_names.get(file).map(|n| n == symbol).unwrap_or(false)
            && (!self.usage_of("default", file).is_empty() || !self.type_usage_of("default", file).is_empty())
    }

    pub fn edges(&self) -> &[ImportEdge] {
        &self.edges
    }

    /// Files that import anything from `file`.
    pub fn importers_of(&self, file: &str) -> Vec<String> {
        self.edges
            .iter()
            .filter(|e| e.target_file == file)
            .map(|e| e.importer_file.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }
}

fn lookup(map: &BTreeMap<UsageKey, BTreeSet<String>>, symbol: &str, file: &str) -> Vec<String> {
    map.get(&(symbol.to_string(), file.to_string()))
        .map(|set| set.iter().cloned().collect())
        .unwrap_or_default()
}

/// Every name importable from `file`, including names reached through `export *`.
fn export_surface(
    exports: &BTreeMap<String, ModuleExports>,
    file: &str,
    seen: &mut BTreeSet<String>,
) -> BTreeSet<String> {
    let mut names = BTreeSet::new();
    if !seen.insert(file.to_string()) {
        return names;
    }
    let Some(module) = exports.get(file) else {
        return names;
    };
    names.extend(module.own.iter().cloned());
    names.extend(module.named.keys().cloned());
    for origin in &module.stars {
        names.extend(
            export_surface(exports, origin, seen)
                .into_iter()
                .filter(|n| n != "default"),
        );
    }
    names
}

/// Exported symbols nobody imports, in either view; sorted by file, then line.
pub fn unused_exports(graph: &UsageGraph, files: &[ScannedFile]) -> Vec<Symbol> {
    let mut unused: Vec<Symbol> = files
        .iter()
        .flat_map(|f| f.symbols.iter())
        .filter(|s| s.exported && !graph.is_used(&s.name, &s.file))
        .cloned()
        .collect();
    unused.sort_by(|a, b| (&a.file, a.line_start, &a.name).cmp(&(&b.file, b.line_start, &b.name)));
    unused
}
