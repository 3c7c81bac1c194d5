// Function card construction

use std::collections::BTreeSet;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::hashing::function_id;
use crate::index::{FunctionCard, Symbol};

pub const MAX_SIGNATURE_CHARS: usize = 200;
const MAX_SIGNATURE_LINES: usize = 3;
/// Upper bound on the code text handed to an embedder
pub const MAX_EMBED_CHARS: usize = 8000;

static BRANCH_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\bif\s*\(|\bcase\b|\bcatch\b|&&|\|\|").expect("valid branch regex"));
static CALL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([A-Za-z_$][A-Za-z0-9_$]*)[(<]").expect("valid call regex"));

/// Build one card per function, method or hook of `file`.
///
/// Pure: the same inputs (including `indexed_at`) always give the same cards.
pub fn build_cards(file: &str, source: &str, symbols: &[Symbol], indexed_at: i64) -> Vec<FunctionCard> {
    let lines: Vec<&str> = source.lines().collect();
    let names: BTreeSet<&str> = symbols.iter().map(|s| s.name.as_str()).collect();

    symbols
        .iter()
        .filter(|s| s.kind.is_function_like())
        .map(|symbol| {
            let body = slice_lines(&lines, symbol.line_start, symbol.line_end);
            FunctionCard {
                id: function_id(file, symbol.line_start, symbol.line_end),
                file_path: file.to_string(),
                name: symbol.name.clone(),
                line_start: symbol.line_start,
                line_end: symbol.line_end,
                signature: extract_signature(&lines, symbol.line_start),
                complexity_score: complexity_bucket(raw_complexity(&body)),
                called_internals: called_internals(&body, &symbol.name, &names),
                summary: None,
                key_concepts: None,
                behavioral_profile: None,
                last_indexed: indexed_at,
            }
        })
        .collect()
}

/// Source text of lines `start..=end` (1-based).
pub fn function_body(source: &str, line_start: usize, line_end: usize) -> String {
    let lines: Vec<&str> = source.lines().collect();
    slice_lines(&lines, line_start, line_end)
}

fn slice_lines(lines: &[&str], line_start: usize, line_end: usize) -> String {
    let start = line_start.saturating_sub(1).min(lines.len());
    let end = line_end.min(lines.len()).max(start);
    lines[start..end].join("\n")
}

/// Declaration text: from the first line through the first line that opens
/// the body (`{` or `=>`), at most three lines, capped at 200 characters.
pub fn extract_signature(lines: &[&str], line_start: usize) -> String {
    let start = line_start.saturating_sub(1);
    let mut parts = Vec::new();
    for line in lines.iter().skip(start).take(MAX_SIGNATURE_LINES) {
        let trimmed = line.trim();
        parts.push(trimmed);
        if trimmed.contains('{') || trimmed.contains("=>") {
            break;
        }
    }
    truncate_chars(&parts.join(" "), MAX_SIGNATURE_CHARS)
}

/// 1 + number of branch points in `body`.
pub fn raw_complexity(body: &str) -> usize {
    1 + BRANCH_RE.find_iter(body).count() + count_ternaries(body)
}

/// `?` that is not part of `?.`, `??`, or an optional marker `?:`/`?)`.
fn count_ternaries(body: &str) -> usize {
    let bytes = body.as_bytes();
    (0..bytes.len())
        .filter(|&i| {
            bytes[i] == b'?'
                && (i == 0 || bytes[i - 1] != b'?')
                && !matches!(bytes.get(i + 1), Some(b'.') | Some(b'?') | Some(b':') | Some(b')'))
        })
        .count()
}

pub fn complexity_bucket(raw: usize) -> u8 {
    match raw {
        0..=2 => 1,
        3..=5 => 2,
        6..=10 => 3,
        11..=20 => 4,
        _ => 5,
    }
}

/// Names of other symbols in the same file that `body` calls (`name(` or `name<`).
pub fn called_internals(body: &str, own_name: &str, names: &BTreeSet<&str>) -> BTreeSet<String> {
    CALL_RE
        .captures_iter(body)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str())
        .filter(|name| *name != own_name && names.contains(name))
        .map(str::to_string)
        .collect()
}

/// Text embedded into the code space.
pub fn code_embedding_text(body: &str) -> String {
    truncate_chars(body, MAX_EMBED_CHARS)
}

fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}
