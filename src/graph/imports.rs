// Import/export statement extraction

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use crate::indexer::scanner::strip_comments;

static IMPORT_FROM_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?s)\bimport\s+(type\s+)?([\w$*{}\s,]*?)\s*from\s*['"]([^'"\n]+)['"]"#)
        .expect("valid import regex")
});
static EXPORT_FROM_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?s)\bexport\s+(type\s+)?(\*\s*(?:as\s+([\w$]+))?|\{[^}]*\})\s*from\s*['"]([^'"\n]+)['"]"#)
        .expect("valid re-export regex")
});
static DYNAMIC_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"\b(?:import|require)\s*\(\s*['"]([^'"\n]+)['"]\s*\)"#).expect("valid dynamic import regex")
});
static DEFAULT_EXPORT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\bexport\s+default\b(?:\s+(?:async\s+)?(?:function\s*\*?|(?:abstract\s+)?class)?\s*([A-Za-z_$][\w$]*))?")
        .expect("valid default export regex")
});

/// How a name crosses a module boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ImportMode {
    /// `import { X } from`
    Runtime,
    /// `import type { X }`, `import { type X }`
    TypeOnly,
    /// `import * as ns`, `export * as ns from`, dynamic `import()` and `require()`
    Namespace,
    /// `import X from`
    Default,
    /// `export { X } from`, `export * from`
    ReExport,
    /// `export type { X } from`
    TypeReExport,
}

impl ImportMode {
    pub fn is_reexport(&self) -> bool {
        matches!(self, ImportMode::ReExport | ImportMode::TypeReExport)
    }
}

/// An import before its specifier is resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawImport {
    pub specifier: String,
    /// Name in the target module; `"default"` for default imports, `"*"` for
    /// whole-module imports and star re-exports
    pub imported_name: String,
    /// Local binding, or the exported name for re-exports
    pub local_alias: String,
    pub mode: ImportMode,
}

/// A resolved import between two project files.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportEdge {
    pub importer_file: String,
    pub target_file: String,
    pub imported_name: String,
    pub local_alias: String,
    pub mode: ImportMode,
}

/// Every import and re-export statement of `source`, in order of appearance.
pub fn parse_imports(source: &str) -> Vec<RawImport> {
    let code = strip_comments(source);
    let mut found: Vec<(usize, RawImport)> = Vec::new();

    for c in IMPORT_FROM_RE.captures_iter(&code) {
        let at = c.get(0).map(|m| m.start()).unwrap_or(0);
        let type_only = c.get(1).is_some();
        let specifier = &c[3];
        for import in parse_import_clause(&c[2], specifier, type_only) {
            found.push((at, import));
        }
    }

    for c in EXPORT_FROM_RE.captures_iter(&code) {
        let at = c.get(0).map(|m| m.start()).unwrap_or(0);
        let type_only = c.get(1).is_some();
        let clause = c[2].trim();
        let specifier = c[4].to_string();

        if clause.starts_with('*') {
            let import = match c.get(3) {
                Some(alias) => RawImport {
                    specifier,
                    imported_name: "*".to_string(),
                    local_alias: alias.as_str().to_string(),
                    mode: ImportMode::Namespace,
                },
                None => RawImport {
                    specifier,
                    imported_name: "*".to_string(),
                    local_alias: "*".to_string(),
                    mode: ImportMode::ReExport,
                },
            };
            found.push((at, import));
            continue;
        }

        for (name, alias, inline_type) in named_specifiers(clause) {
            let mode = if type_only || inline_type {
                ImportMode::TypeReExport
            } else {
                ImportMode::ReExport
            };
            found.push((
                at,
                RawImport {
                    specifier: specifier.clone(),
                    imported_name: name,
                    local_alias: alias,
                    mode,
                },
            ));
        }
    }

    for c in DYNAMIC_RE.captures_iter(&code) {
        let at = c.get(0).map(|m| m.start()).unwrap_or(0);
        found.push((
            at,
            RawImport {
                specifier: c[1].to_string(),
                imported_name: "*".to_string(),
                local_alias: "*".to_string(),
                mode: ImportMode::Namespace,
            },
        ));
    }

    found.sort_by_key(|(at, _)| *at);
    found.into_iter().map(|(_, import)| import).collect()
}

fn parse_import_clause(clause: &str, specifier: &str, type_only: bool) -> Vec<RawImport> {
    let mut imports = Vec::new();
    let make = |imported: &str, alias: &str, mode: ImportMode| RawImport {
        specifier: specifier.to_string(),
        imported_name: imported.to_string(),
        local_alias: alias.to_string(),
        mode,
    };

    let (head, named) = match (clause.find('{'), clause.rfind('}')) {
        (Some(open), Some(close)) if open < close => (&clause[..open], Some(&clause[open + 1..close])),
        _ => (clause, None),
    };

    for part in head.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        if let Some(alias) = part.strip_prefix('*') {
            let alias = alias.trim().strip_prefix("as").map(str::trim).unwrap_or("*");
            imports.push(make("*", alias, ImportMode::Namespace));
        } else if type_only {
            imports.push(make("default", part, ImportMode::TypeOnly));
        } else {
            imports.push(make("default", part, ImportMode::Default));
        }
    }

    if let Some(named) = named {
        for (name, alias, inline_type) in named_specifiers(named) {
            let mode = if type_only || inline_type {
                ImportMode::TypeOnly
            } else if name == "default" {
                ImportMode::Default
            } else {
                ImportMode::Runtime
            };
            imports.push(make(&name, &alias, mode));
        }
    }

    imports
}

/// `(name, alias, inline type)` for each entry of a `{ a, b as c, type T }` list.
fn named_specifiers(list: &str) -> Vec<(String, String, bool)> {
    list.trim_matches(|c| c == '{' || c == '}')
        .split(',')
        .filter_map(|entry| {
            let mut words: Vec<&str> = entry.split_whitespace().collect();
            let inline_type = words.len() > 1 && words[0] == "type";
            if inline_type {
                words.remove(0);
            }
            match words.as_slice() {
                [name] => Some((name.to_string(), name.to_string(), inline_type)),
                [name, "as", alias] => Some((name.to_string(), alias.to_string(), inline_type)),
                _ => None,
            }
        })
        .collect()
}

/// Whether the module has a default export.
pub fn has_default_export(source: &str) -> bool {
    DEFAULT_EXPORT_RE.is_match(&strip_comments(source))
}

/// Local name bound to the default export, when it has one
/// (`export default function main`, `export default Store`).
pub fn default_export_name(source: &str) -> Option<String> {
    DEFAULT_EXPORT_RE
        .captures(&strip_comments(source))
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .filter(|name| !matches!(name.as_str(), "function" | "class" | "async" | "new"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn modes(imports: &[RawImport]) -> Vec<(&str, &str, ImportMode)> {
        imports
            .iter()
            .map(|i| (i.imported_name.as_str(), i.local_alias.as_str(), i.mode))
            .collect()
    }

    #[test]
    fn test_named_and_aliased_imports() {
        let imports = parse_imports("import { f, g as h } from './a';");
        assert_eq!(
            modes(&imports),
            vec![("f", "f", ImportMode::Runtime), ("g", "h", ImportMode::Runtime)]
        );
        assert!(imports.iter().all(|i| i.specifier == "./a"));
    }

    #[test]
    fn test_default_and_namespace() {
        let imports = parse_imports("import React, { useState } from 'react';\nimport * as api from \"./api\";");
        assert_eq!(
            modes(&imports),
            vec![
                ("default", "React", ImportMode::Default),
                ("useState", "useState", ImportMode::Runtime),
                ("*", "api", ImportMode::Namespace),
            ]
        );
    }

    #[test]
    fn test_type_only_forms() {
        let imports = parse_imports(
            "import type { A } from './t';\nimport { type B, C } from './t';\nexport type { D } from './t';",
        );
        assert_eq!(
            modes(&imports),
            vec![
                ("A", "A", ImportMode::TypeOnly),
                ("B", "B", ImportMode::TypeOnly),
                ("C", "C", ImportMode::Runtime),
                ("D", "D", ImportMode::TypeReExport),
            ]
        );
    }

    #[test]
    fn test_reexports() {
        let imports = parse_imports(
            "export { f, g as gg } from './a';\nexport * from './b';\nexport * as ns from './c';",
        );
        assert_eq!(
            modes(&imports),
            vec![
                ("f", "f", ImportMode::ReExport),
                ("g", "gg", ImportMode::ReExport),
                ("*", "*", ImportMode::ReExport),
                ("*", "ns", ImportMode::Namespace),
            ]
        );
    }

    #[test]
    fn test_multiline_import_and_dynamic() {
        let source = "import {\n  one,\n  two,\n} from './m';\nconst lazy = () => import('./lazy');\nconst cjs = require('./old');";
        let imports = parse_imports(source);
        assert_eq!(imports.len(), 4);
        assert_eq!(imports[0].imported_name, "one");
        assert_eq!(imports[1].imported_name, "two");
        assert_eq!(imports[2].specifier, "./lazy");
        assert_eq!(imports[2].mode, ImportMode::Namespace);
        assert_eq!(imports[3].specifier, "./old");
    }

    #[test]
    fn test_commented_imports_ignored() {
        let imports = parse_imports("// import { x } from './x';\n/* import y from './y'; */\nimport { z } from './z';");
        assert_eq!(imports.len(), 1);
        assert_eq!(imports[0].imported_name, "z");
    }

    #[test]
    fn test_side_effect_import_has_no_names() {
        assert!(parse_imports("import './polyfill';").is_empty());
    }

    #[test]
    fn test_default_export_detection() {
        assert_eq!(default_export_name("export default function main() {}"), Some("main".to_string()));
        assert_eq!(default_export_name("class S {}\nexport default S;"), Some("S".to_string()));
        assert_eq!(default_export_name("export default class {}"), None);
        assert!(has_default_export("export default { a: 1 };"));
        assert!(!has_default_export("export const a = 1;"));
    }
}
