// Lightweight TS/JS symbol scanner and project file discovery

use std::collections::BTreeSet;
use std::path::Path;

use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::config::Config;
use crate::hashing::content_hash;
use crate::index::{ScannedFile, Symbol, SymbolKind};

const NAME: &str = r"[A-Za-z_$][\w$]*";

fn compile(pattern: &str) -> Regex {
    Regex::new(&pattern.replace("NAME", NAME)).expect("valid scanner regex")
}

static FUNCTION_RE: Lazy<Regex> = Lazy::new(|| {
    compile(r"^\s*(export\s+)?(?:default\s+)?(?:declare\s+)?(?:async\s+)?function\s*\*?\s*(NAME)")
});
static CLASS_RE: Lazy<Regex> = Lazy::new(|| {
    compile(r"^\s*(export\s+)?(?:default\s+)?(?:declare\s+)?(?:abstract\s+)?class\s+(NAME)")
});
static INTERFACE_RE: Lazy<Regex> =
    Lazy::new(|| compile(r"^\s*(export\s+)?(?:declare\s+)?interface\s+(NAME)"));
static TYPE_RE: Lazy<Regex> =
    Lazy::new(|| compile(r"^\s*(export\s+)?(?:declare\s+)?type\s+(NAME)\s*(?:<[^=]*>)?\s*="));
static ENUM_RE: Lazy<Regex> =
    Lazy::new(|| compile(r"^\s*(export\s+)?(?:declare\s+)?(?:const\s+)?enum\s+(NAME)"));
static VAR_RE: Lazy<Regex> =
    Lazy::new(|| compile(r"^\s*(export\s+)?(?:declare\s+)?(const|let|var)\s+(NAME)"));

static METHOD_RE: Lazy<Regex> = Lazy::new(|| {
    compile(
        r"^\s*(?:(?:public|private|protected|static|async|readonly|override|abstract|declare|get|set)\s+)*\*?\s*(#?NAME)\s*\??\s*(?:<[^>]*>)?\s*\(",
    )
});
static PROPERTY_RE: Lazy<Regex> = Lazy::new(|| {
    compile(r"^\s*(?:(?:public|private|protected|static|readonly|override|declare)\s+)*(#?NAME)\s*\??\s*(?::[^=]*)?=[^=>]")
});

/// Right-hand side that evaluates to a function.
static FUNCTION_VALUE_RE: Lazy<Regex> = Lazy::new(|| {
    compile(
        r"(?s)^\s*(?:async\s+)?(?:function\b|(?:<[^>]*>\s*)?\([^;]*?\)\s*(?::[^=;]+?)?\s*=>|NAME\s*=>)",
    )
});

static EXPORT_LIST_RE: Lazy<Regex> =
    Lazy::new(|| compile(r"(?s)\bexport\s*(?:type\s+)?\{([^}]*)\}(\s*from\b)?"));
static EXPORT_DEFAULT_NAME_RE: Lazy<Regex> =
    Lazy::new(|| compile(r"(?m)\bexport\s+default\s+(NAME)\s*;?\s*$"));
static HOOK_NAME_RE: Lazy<Regex> = Lazy::new(|| compile(r"^use[A-Z0-9]"));

const MEMBER_KEYWORDS: &[&str] = &["if", "for", "while", "switch", "catch", "return", "function", "new"];
/// Lines joined when deciding whether a `const` holds a function
const LOOKAHEAD_LINES: usize = 5;

/// Tokens after which a `/` opens a regex literal rather than dividing.
/// `<` and `}` are left out so JSX closing tags stay code.
const REGEX_PREFIX_CHARS: &str = "(,=:[!&|?{;+-*%>~^";
const REGEX_PREFIX_KEYWORDS: &[&str] = &[
    "return", "typeof", "case", "do", "else", "in", "of", "delete", "void", "throw", "new", "yield", "await",
];

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

/// Replace comments (and, with `blank_strings`, string and regex literal
/// contents) by spaces, keeping every newline so line numbers survive.
///
/// A `/` starts a regex literal when it follows an operator, an opening
/// bracket, a keyword like `return`, or nothing at all.
pub fn mask_source(source: &str, blank_strings: bool) -> String {
    #[derive(Clone, Copy, PartialEq)]
    enum State {
        Code,
        LineComment,
        BlockComment,
        Str(char),
        Regex { in_class: bool },
    }

    let mut out = String::with_capacity(source.len());
    let mut state = State::Code;
    let mut chars = source.chars().peekable();
    let literal = |c: char| if blank_strings && c != '\n' { ' ' } else { c };
    // Last non-whitespace code char, and the identifier it ends.
    let mut prev: Option<char> = None;
    let mut word = String::new();
    let mut in_word = false;

    while let Some(c) = chars.next() {
        match state {
            State::Code => {
                match c {
                    '/' if chars.peek() == Some(&'/') => {
                        chars.next();
                        out.push_str("  ");
                        state = State::LineComment;
                        in_word = false;
                        continue;
                    }
                    '/' if chars.peek() == Some(&'*') => {
                        chars.next();
                        out.push_str("  ");
                        state = State::BlockComment;
                        in_word = false;
                        continue;
                    }
                    '/' => {
                        let opens_regex = match prev {
                            None => true,
                            Some(p) if is_ident_char(p) => REGEX_PREFIX_KEYWORDS.contains(&word.as_str()),
                            Some(p) => REGEX_PREFIX_CHARS.contains(p),
                        };
                        if opens_regex {
                            state = State::Regex { in_class: false };
                        }
                        out.push(c);
                    }
                    '\'' | '"' | '`' => {
                        out.push(c);
                        state = State::Str(c);
                    }
                    _ => out.push(c),
                }
                if is_ident_char(c) {
                    if !in_word {
                        word.clear();
                    }
                    word.push(c);
                    in_word = true;
                } else {
                    in_word = false;
                }
                if !c.is_whitespace() {
                    prev = Some(c);
                }
            }
            State::Regex { in_class } => {
                if c == '\\' {
                    out.push(literal(c));
                    if let Some(next) = chars.next() {
                        out.push(if next == '\n' { next } else { literal(next) });
                    }
                } else if c == '/' && !in_class {
                    out.push(c);
                    state = State::Code;
                    // a closed regex is an operand, so the next `/` divides
                    prev = Some(')');
                } else if c == '\n' {
                    // not a regex after all; resync on the next line
                    out.push('\n');
                    state = State::Code;
                } else {
                    state = State::Regex {
                        in_class: match c {
                            '[' => true,
                            ']' => false,
                            _ => in_class,
                        },
                    };
                    out.push(literal(c));
                }
            }
            State::LineComment => {
                if c == '\n' {
                    out.push('\n');
                    state = State::Code;
                } else {
                    out.push(' ');
                }
            }
            State::BlockComment => {
                if c == '*' && chars.peek() == Some(&'/') {
                    chars.next();
                    out.push_str("  ");
                    state = State::Code;
                } else if c == '\n' {
                    out.push('\n');
                } else {
                    out.push(' ');
                }
            }
            State::Str(quote) => {
                if c == '\\' {
                    out.push(literal(c));
                    if let Some(next) = chars.next() {
                        out.push(literal(next));
                    }
                } else if c == quote {
                    out.push(c);
                    state = State::Code;
                } else if c == '\n' && quote != '`' {
                    // unterminated quote; resync on the next line
                    out.push('\n');
                    state = State::Code;
                } else {
                    out.push(literal(c));
                }
            }
        }
    }
    out
}

/// Remove comments only.
pub fn strip_comments(source: &str) -> String {
    mask_source(source, false)
}

#[derive(Clone, Copy)]
enum EndMode {
    /// Declarations with a `{ ... }` body (functions, classes, interfaces, enums)
    Block,
    /// `const`/`let`/`type` statements ending at `;` or at a line that does not continue
    Statement,
}

/// Scan one source text into its ordered symbol list.
pub fn scan_source(file: &str, source: &str) -> Vec<Symbol> {
    let masked = mask_source(source, true);
    let lines: Vec<&str> = masked.lines().collect();
    let depths = line_depths(&lines);
    let listed = exported_names(&masked);

    let mut symbols = Vec::new();
    let mut i = 0;
    while i < lines.len() {
        if depths[i] != 0 {
            i += 1;
            continue;
        }
        let line = lines[i];
        let mut push = |name: &str, kind: SymbolKind, exported: bool, end: usize| {
            symbols.push(Symbol {
                name: name.to_string(),
                kind,
                exported: exported || listed.contains(name),
                file: file.to_string(),
                line_start: i + 1,
                line_end: end + 1,
            });
        };

        if let Some(c) = FUNCTION_RE.captures(line) {
            let name = &c[2];
            let end = declaration_end(&lines, i, EndMode::Block);
            push(name, function_kind(name), c.get(1).is_some(), end);
        } else if let Some(c) = CLASS_RE.captures(line) {
            let end = declaration_end(&lines, i, EndMode::Block);
            push(&c[2], SymbolKind::Class, c.get(1).is_some(), end);
            scan_class_members(file, &lines, &depths, i, end, &mut symbols);
            i = end.max(i) + 1;
            continue;
        } else if let Some(c) = INTERFACE_RE.captures(line) {
            let end = declaration_end(&lines, i, EndMode::Block);
            push(&c[2], SymbolKind::Type, c.get(1).is_some(), end);
        } else if let Some(c) = TYPE_RE.captures(line) {
            let end = declaration_end(&lines, i, EndMode::Statement);
            push(&c[2], SymbolKind::Type, c.get(1).is_some(), end);
        } else if let Some(c) = ENUM_RE.captures(line) {
            let end = declaration_end(&lines, i, EndMode::Block);
            push(&c[2], SymbolKind::Enum, c.get(1).is_some(), end);
        } else if let Some(c) = VAR_RE.captures(line) {
            let name = &c[3];
            let end = declaration_end(&lines, i, EndMode::Statement);
            let rest = initializer(&lines, i, c.get(0).map(|m| m.end()).unwrap_or(0));
            let kind = if rest.map(|r| FUNCTION_VALUE_RE.is_match(&r)).unwrap_or(false) {
                function_kind(name)
            } else if &c[2] == "const" {
                SymbolKind::Constant
            } else {
                SymbolKind::Variable
            };
            push(name, kind, c.get(1).is_some(), end);
        }
        i += 1;
    }

    symbols.sort_by_key(|s| (s.line_start, s.line_end));
    symbols
}

fn function_kind(name: &str) -> SymbolKind {
    if HOOK_NAME_RE.is_match(name) {
        SymbolKind::Hook
    } else {
        SymbolKind::Function
    }
}

fn scan_class_members(
    file: &str,
    lines: &[&str],
    depths: &[i32],
    class_start: usize,
    class_end: usize,
    symbols: &mut Vec<Symbol>,
) {
    let mut i = class_start + 1;
    while i < class_end {
        if depths[i] != 1 {
            i += 1;
            continue;
        }
        let line = lines[i];

        let member = if let Some(c) = METHOD_RE.captures(line) {
            let name = c[1].to_string();
            (!MEMBER_KEYWORDS.contains(&name.as_str()))
                .then(|| (name, declaration_end(lines, i, EndMode::Block)))
        } else if let Some(c) = PROPERTY_RE.captures(line) {
            let is_fn = initializer(lines, i, c.get(1).map(|m| m.end()).unwrap_or(0))
                .map(|r| FUNCTION_VALUE_RE.is_match(&r))
                .unwrap_or(false);
            is_fn.then(|| (c[1].to_string(), declaration_end(lines, i, EndMode::Statement)))
        } else {
            None
        };

        match member {
            Some((name, end)) => {
                let end = end.min(class_end);
                symbols.push(Symbol {
                    name,
                    kind: SymbolKind::Method,
                    exported: false,
                    file: file.to_string(),
                    line_start: i + 1,
                    line_end: end + 1,
                });
                i = end.max(i) + 1;
            }
            None => i += 1,
        }
    }
}

/// Brace depth at the start of every line.
fn line_depths(lines: &[&str]) -> Vec<i32> {
    let mut depth = 0i32;
    lines
        .iter()
        .map(|line| {
            let at_start = depth;
            for c in line.chars() {
                match c {
                    '{' => depth += 1,
                    '}' => depth = (depth - 1).max(0),
                    _ => {}
                }
            }
            at_start
        })
        .collect()
}

/// Text after the top-level `=` of a declaration starting at `lines[start][col..]`,
/// joined with a few following lines.
fn initializer(lines: &[&str], start: usize, col: usize) -> Option<String> {
    let text = lines[start..(start + LOOKAHEAD_LINES).min(lines.len())].join("\n");
    let bytes = text.as_bytes();
    let mut depth = 0i32;
    let mut idx = col.min(bytes.len());
    while idx < bytes.len() {
        match bytes[idx] {
            b'(' | b'[' | b'{' | b'<' => depth += 1,
            b')' | b']' | b'}' => depth -= 1,
            b'>' if idx > 0 && bytes[idx - 1] != b'=' => depth -= 1,
            b';' if depth <= 0 => return None,
            b'=' if depth <= 0 => {
                let prev = if idx > 0 { bytes[idx - 1] } else { b' ' };
                let next = bytes.get(idx + 1).copied().unwrap_or(b' ');
                if next != b'>' && next != b'=' && !matches!(prev, b'=' | b'!' | b'<' | b'>') {
                    return Some(text[idx + 1..].to_string());
                }
            }
            _ => {}
        }
        idx += 1;
    }
    None
}

/// 0-based index of the last line of the declaration starting at `start`.
fn declaration_end(lines: &[&str], start: usize, mode: EndMode) -> usize {
    let mut paren = 0i32;
    let mut brace = 0i32;
    let mut body = false;

    for (i, line) in lines.iter().enumerate().skip(start) {
        for c in line.chars() {
            match c {
                '(' | '[' => paren += 1,
                ')' | ']' => paren -= 1,
                '{' => {
                    if matches!(mode, EndMode::Block) && paren == 0 && brace == 0 {
                        body = true;
                    }
                    brace += 1;
                }
                '}' => {
                    brace -= 1;
                    if body && brace == 0 {
                        return i;
                    }
                }
                ';' if paren <= 0 && brace <= 0 && !body => return i,
                _ => {}
            }
        }

        if paren <= 0 && brace <= 0 && !body && !continues(line, next_code_line(lines, i)) {
            return i;
        }
    }
    lines.len().saturating_sub(1).max(start)
}

fn next_code_line<'a>(lines: &[&'a str], after: usize) -> Option<&'a str> {
    lines.iter().skip(after + 1).map(|l| l.trim()).find(|l| !l.is_empty())
}

/// Whether a statement that is balanced at the end of `line` carries on.
fn continues(line: &str, next: Option<&str>) -> bool {
    const TRAILING: &[&str] = &["=", "=>", "(", "[", "{", ",", "+", "-", "*", "?", ":", "&&", "||", "|", "&"];
    const LEADING: &[&str] = &[".", "?", ":", "+", "-", "*", "&&", "||", "|", "&", "=>", "{", "extends", "implements"];

    let trimmed = line.trim_end();
    if trimmed.trim().is_empty() {
        return true;
    }
    if TRAILING.iter().any(|t| trimmed.ends_with(t)) {
        return true;
    }
    next.map(|n| LEADING.iter().any(|l| n.starts_with(l))).unwrap_or(false)
}

/// Names exported through local `export { a, b as c }` lists or `export default name`.
fn exported_names(masked: &str) -> BTreeSet<String> {
    let mut names = BTreeSet::new();
    for c in EXPORT_LIST_RE.captures_iter(masked) {
        if c.get(2).is_some() {
            continue;
        }
        for entry in c[1].split(',') {
            let entry = entry.trim();
            let entry = entry.strip_prefix("type ").unwrap_or(entry).trim();
            if let Some(local) = entry.split_whitespace().next() {
                names.insert(local.to_string());
            }
        }
    }
    for c in EXPORT_DEFAULT_NAME_RE.captures_iter(masked) {
        names.insert(c[1].to_string());
    }
    names
}

/// Read and scan one project file.
pub fn scan_file(project_root: &Path, rel_path: &str) -> Result<ScannedFile> {
    let content = std::fs::read_to_string(project_root.join(rel_path))
        .with_context(|| format!("Failed to read {}", rel_path))?;
    Ok(ScannedFile {
        path: rel_path.to_string(),
        content_hash: content_hash(&content),
        symbols: scan_source(rel_path, &content),
    })
}

/// Scan every file, skipping (and logging) the unreadable ones.
pub fn scan_files(project_root: &Path, files: &[String]) -> Vec<ScannedFile> {
    files
        .iter()
        .filter_map(|f| match scan_file(project_root, f) {
            Ok(scanned) => Some(scanned),
            Err(e) => {
                warn!("Skipping {}: {:#}", f, e);
                None
            }
        })
        .collect()
}

/// Project-relative source paths (with `/` separators), sorted.
pub fn discover_files(project_root: &Path, config: &Config) -> Vec<String> {
    let walker = WalkDir::new(project_root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|e| {
            if e.depth() == 0 || !e.file_type().is_dir() {
                return true;
            }
            relative_path(project_root, e.path())
                .map(|rel| !config.is_excluded_dir(&rel))
                .unwrap_or(true)
        });

    let mut files: Vec<String> = walker
        .filter_map(|entry| match entry {
            Ok(e) => Some(e),
            Err(err) => {
                warn!("Walk error: {}", err);
                None
            }
        })
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| relative_path(project_root, e.path()))
        .filter(|rel| config.should_index_file(rel))
        .collect();

    files.sort();
    debug!("Discovered {} source files under {}", files.len(), project_root.display());
    files
}

fn relative_path(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    let parts: Vec<&str> = rel.components().filter_map(|c| c.as_os_str().to_str()).collect();
    Some(parts.join("/"))
}
