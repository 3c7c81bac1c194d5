// Index data model and vector storage

pub mod db;
pub mod schema;
pub mod search;
pub mod store;

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// A declaration extracted from one file by the scanner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Symbol {
    pub name: String,
    pub kind: SymbolKind,
    pub exported: bool,
    pub file: String,
    /// 1-based, inclusive
    pub line_start: usize,
    /// 1-based, inclusive
    pub line_end: usize,
}

/// Symbol kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SymbolKind {
    Function,
    Class,
    Method,
    Type,
    Constant,
    Variable,
    Enum,
    Hook,
}

impl SymbolKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SymbolKind::Function => "function",
            SymbolKind::Class => "class",
            SymbolKind::Method => "method",
            SymbolKind::Type => "type",
            SymbolKind::Constant => "constant",
            SymbolKind::Variable => "variable",
            SymbolKind::Enum => "enum",
            SymbolKind::Hook => "hook",
        }
    }

    /// Kinds that get a function card and embeddings.
    pub fn is_function_like(&self) -> bool {
        matches!(self, SymbolKind::Function | SymbolKind::Method | SymbolKind::Hook)
    }
}

/// One project file as handed over by the scanner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScannedFile {
    /// Project-relative path with `/` separators
    pub path: String,
    pub content_hash: String,
    pub symbols: Vec<Symbol>,
}

impl ScannedFile {
    pub fn function_symbols(&self) -> impl Iterator<Item = &Symbol> {
        self.symbols.iter().filter(|s| s.kind.is_function_like())
    }
}

/// Structural metadata for one function; the unit stored in the semantic index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCard {
    pub id: String,
    pub file_path: String,
    pub name: String,
    pub line_start: usize,
    pub line_end: usize,
    pub signature: String,
    /// Bucketed into 1..=5
    pub complexity_score: u8,
    pub called_internals: BTreeSet<String>,
    pub summary: Option<String>,
    pub key_concepts: Option<Vec<String>>,
    pub behavioral_profile: Option<String>,
    /// Unix timestamp (seconds)
    pub last_indexed: i64,
}

/// A card together with its vectors, as held by a vector store.
#[derive(Debug, Clone)]
pub struct StoredFunction {
    pub card: FunctionCard,
    pub code_vector: Vec<f32>,
    pub nlp_vector: Option<Vec<f32>>,
}

/// A search hit.
#[derive(Debug, Clone, Serialize)]
pub struct ScoredCard {
    pub card: FunctionCard,
    pub score: f32,
}

/// Result of a similarity lookup by function id.
///
/// `NotIndexed` carries no duplication evidence at all, while an empty
/// `Ranked` list is positive evidence that the function is unique.
#[derive(Debug, Clone)]
pub enum SearchOutcome {
    NotIndexed,
    Ranked(Vec<ScoredCard>),
}

impl SearchOutcome {
    pub fn is_indexed(&self) -> bool {
        matches!(self, SearchOutcome::Ranked(_))
    }

    pub fn matches(&self) -> &[ScoredCard] {
        match self {
            SearchOutcome::NotIndexed => &[],
            SearchOutcome::Ranked(hits) => hits,
        }
    }
}

/// Index statistics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IndexStats {
    pub total_files: usize,
    pub total_functions: usize,
    pub functions_with_nlp: usize,
}
