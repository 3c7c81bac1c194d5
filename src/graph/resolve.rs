// Import specifier resolution

use std::collections::BTreeSet;

/// Extensions tried for extensionless specifiers, in order.
pub const SOURCE_EXTENSIONS: &[&str] = &["ts", "tsx", "js", "jsx", "mjs", "cjs"];

const JS_EXTENSIONS: &[&str] = &["js", "jsx", "mjs", "cjs"];
const TS_EXTENSIONS: &[&str] = &["ts", "tsx", "mts", "cts"];

/// Resolve `specifier` as imported from `importer` to a project file.
///
/// Relative and root-absolute specifiers only; packages and path aliases
/// resolve to `None`. A `.js`-family extension also matches the TypeScript
/// file of the same stem. Extensionless specifiers try every source
/// extension, then an `index` file inside the directory.
pub fn resolve_specifier(importer: &str, specifier: &str, files: &BTreeSet<String>) -> Option<String> {
    let joined = if let Some(rooted) = specifier.strip_prefix('/') {
        rooted.to_string()
    } else if specifier.starts_with("./") || specifier.starts_with("../") || specifier == "." || specifier == ".." {
        match importer.rfind('/') {
            Some(idx) => format!("{}/{}", &importer[..idx], specifier),
            None => specifier.to_string(),
        }
    } else {
        return None;
    };
    let base = normalize(&joined)?;

    if let Some((stem, ext)) = split_extension(&base) {
        if SOURCE_EXTENSIONS.contains(&ext) || TS_EXTENSIONS.contains(&ext) {
            if files.contains(&base) {
                return Some(base);
            }
            if JS_EXTENSIONS.contains(&ext) {
                if let Some(found) = TS_EXTENSIONS
                    .iter()
                    .map(|ts| format!("{}.{}", stem, ts))
                    .find(|candidate| files.contains(candidate))
                {
                    return Some(found);
                }
            }
            return None;
        }
    }

    SOURCE_EXTENSIONS
        .iter()
        .map(|ext| candidate_path(&base, ext, false))
        .chain(SOURCE_EXTENSIONS.iter().map(|ext| candidate_path(&base, ext, true)))
        .find(|candidate| files.contains(candidate))
}

fn candidate_path(base: &str, ext: &str, as_index: bool) -> String {
    match (as_index, base.is_empty()) {
        (false, _) => format!("{}.{}", base, ext),
        (true, true) => format!("index.{}", ext),
        (true, false) => format!("{}/index.{}", base, ext),
    }
}

/// `("src/a", "ts")` for `src/a.ts`; `None` when the last segment has no dot.
fn split_extension(path: &str) -> Option<(&str, &str)> {
    let last_segment = path.rsplit('/').next().unwrap_or(path);
    let dot = last_segment.rfind('.')?;
    if dot == 0 {
        return None;
    }
    let split_at = path.len() - last_segment.len() + dot;
    Some((&path[..split_at], &path[split_at + 1..]))
}

/// Collapse `.` and `..` segments; `None` when the path escapes the project root.
fn normalize(path: &str) -> Option<String> {
    let mut parts: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                parts.pop()?;
            }
            s => parts.push(s),
        }
    }
    Some(parts.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn files(paths: &[&str]) -> BTreeSet<String> {
        paths.iter().map(|p| p.to_string()).collect()
    }

    #[test]
    fn test_relative_with_extension_fallback() {
        let set = files(&["src/a.ts", "src/lib/b.tsx"]);
        assert_eq!(resolve_specifier("src/main.ts", "./a", &set), Some("src/a.ts".to_string()));
        assert_eq!(resolve_specifier("src/x/y.ts", "../lib/b", &set), Some("src/lib/b.tsx".to_string()));
    }

    #[test]
    fn test_explicit_extension() {
        let set = files(&["src/a.ts", "src/c.js"]);
        assert_eq!(resolve_specifier("src/m.ts", "./c.js", &set), Some("src/c.js".to_string()));
        assert_eq!(resolve_specifier("src/m.ts", "./a.ts", &set), Some("src/a.ts".to_string()));
        assert_eq!(resolve_specifier("src/m.ts", "./missing.ts", &set), None);
    }

    #[test]
    fn test_esm_js_specifier_maps_to_ts_source() {
        let set = files(&["src/util.ts"]);
        assert_eq!(resolve_specifier("src/m.ts", "./util.js", &set), Some("src/util.ts".to_string()));
    }

    #[test]
    fn test_directory_index() {
        let set = files(&["src/components/index.tsx", "index.ts"]);
        assert_eq!(
            resolve_specifier("src/app.tsx", "./components", &set),
            Some("src/components/index.tsx".to_string())
        );
        assert_eq!(resolve_specifier("src/app.tsx", "..", &set), Some("index.ts".to_string()));
    }

    #[test]
    fn test_dotted_basename_is_not_an_extension() {
        let set = files(&["src/user.service.ts"]);
        assert_eq!(
            resolve_specifier("src/m.ts", "./user.service", &set),
            Some("src/user.service.ts".to_string())
        );
    }

    #[test]
    fn test_root_absolute() {
        let set = files(&["src/a.ts"]);
        assert_eq!(resolve_specifier("lib/deep/m.ts", "/src/a", &set), Some("src/a.ts".to_string()));
    }

    #[test]
    fn test_unresolvable_is_dropped() {
        let set = files(&["src/a.ts"]);
        assert_eq!(resolve_specifier("src/m.ts", "react", &set), None);
        assert_eq!(resolve_specifier("src/m.ts", "@/a", &set), None);
        assert_eq!(resolve_specifier("src/m.ts", "./nope", &set), None);
        assert_eq!(resolve_specifier("m.ts", "../../a", &set), None);
    }
}
