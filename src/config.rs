// Configuration management for auditgraph

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::index::search::{DEFAULT_CODE_WEIGHT, DEFAULT_MIN_SCORE, DEFAULT_TOP_K};

pub const CONFIG_FILE: &str = ".auditgraph.toml";

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub project: ProjectConfig,
    pub indexing: IndexingConfig,
    pub index: IndexConfig,
    pub embedding: EmbeddingConfig,
    pub nlp_embedding: Option<EmbeddingConfig>,
    pub summary: Option<SummaryConfig>,
    pub search: SearchConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    pub name: String,
}

/// Which files take part in a scan
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexingConfig {
    pub exclude: Vec<String>,
    pub include: Vec<String>,
    pub extensions: Vec<String>,
    pub watch: bool,
}

/// Semantic index settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// Relative to the project root
    pub db_path: String,
    /// Relative to the project root
    pub cache_path: String,
    pub concurrency: usize,
    /// Also generate summaries and embed them in a second vector space
    pub dual_embedding: bool,
}

/// One embedding space
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// "hashing" (local) or "http" (OpenAI-compatible endpoint)
    pub provider: String,
    pub model: String,
    pub dimensions: usize,
    pub url: Option<String>,
    /// Name of the environment variable holding the API key
    pub api_key_env: Option<String>,
}

/// Natural-language summary generation for dual embedding mode
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryConfig {
    pub url: String,
    pub model: String,
    pub api_key_env: Option<String>,
    #[serde(default = "default_summary_batch")]
    pub batch_size: usize,
}

fn default_summary_batch() -> usize {
    8
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub top_k: usize,
    pub min_score: f32,
    pub code_weight: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            project: ProjectConfig::default(),
            indexing: IndexingConfig::default(),
            index: IndexConfig::default(),
            embedding: EmbeddingConfig::default(),
            nlp_embedding: None,
            summary: None,
            search: SearchConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            name: "unnamed-project".to_string(),
        }
    }
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            exclude: vec![
                "node_modules/".to_string(),
                "dist/".to_string(),
                "build/".to_string(),
                "coverage/".to_string(),
                ".git/".to_string(),
                ".auditgraph/".to_string(),
                "*.d.ts".to_string(),
            ],
            include: vec![],
            extensions: ["ts", "tsx", "js", "jsx", "mjs", "cjs"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            watch: false,
        }
    }
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            db_path: ".auditgraph/index.db".to_string(),
            cache_path: ".auditgraph/index-cache.json".to_string(),
            concurrency: 4,
            dual_embedding: false,
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "hashing".to_string(),
            model: "feature-hash-v1".to_string(),
            dimensions: 256,
            url: None,
            api_key_env: None,
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            top_k: DEFAULT_TOP_K,
            min_score: DEFAULT_MIN_SCORE,
            code_weight: DEFAULT_CODE_WEIGHT,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from project directory
    /// Looks for .auditgraph.toml in the project root
    pub fn from_project_dir<P: AsRef<Path>>(project_dir: P) -> Self {
        let config_path = project_dir.as_ref().join(CONFIG_FILE);

        if !config_path.exists() {
            tracing::info!("No {} found, using default configuration", CONFIG_FILE);
            return Self::default();
        }

        match Self::from_file(&config_path) {
            Ok(config) => {
                tracing::info!("Loaded configuration from {}", config_path.display());
                config
            }
            Err(e) => {
                tracing::warn!("Could not load config from {}: {}", config_path.display(), e);
                tracing::info!("Using default configuration");
                Self::default()
            }
        }
    }

    pub fn db_path(&self, project_dir: &Path) -> PathBuf {
        project_dir.join(&self.index.db_path)
    }

    pub fn cache_path(&self, project_dir: &Path) -> PathBuf {
        project_dir.join(&self.index.cache_path)
    }

    /// Embedding space used for NLP vectors; defaults to the code space settings.
    pub fn nlp_embedding(&self) -> &EmbeddingConfig {
        self.nlp_embedding.as_ref().unwrap_or(&self.embedding)
    }

    /// Check if a project-relative path should be scanned
    pub fn should_index_file(&self, file_path: &str) -> bool {
        let has_extension = Path::new(file_path)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| self.indexing.extensions.iter().any(|x| x == e))
            .unwrap_or(false);
        if !has_extension {
            return false;
        }

        for pattern in &self.indexing.exclude {
            if self.matches_pattern(file_path, pattern) {
                return false;
            }
        }

        if !self.indexing.include.is_empty() {
            return self
                .indexing
                .include
                .iter()
                .any(|pattern| self.matches_pattern(file_path, pattern));
        }

        true
    }

    /// Whether a whole project-relative directory can be pruned from traversal
    pub fn is_excluded_dir(&self, dir_path: &str) -> bool {
        let dir = format!("{}/", dir_path.trim_end_matches('/'));
        self.indexing
            .exclude
            .iter()
            .filter(|p| p.ends_with('/'))
            .any(|p| self.matches_pattern(&dir, p))
    }

    /// Simple pattern matching (supports glob-style patterns)
    fn matches_pattern(&self, file_path: &str, pattern: &str) -> bool {
        if pattern.ends_with('/') {
            // Directory pattern
            file_path.starts_with(pattern) || file_path.contains(&format!("/{}", pattern))
        } else if let Some(inner) = pattern.strip_prefix("**/").and_then(|p| p.strip_suffix("/**")) {
            // Any directory level, e.g. **/__tests__/**
            file_path.starts_with(&format!("{}/", inner)) || file_path.contains(&format!("/{}/", inner))
        } else if let Some(suffix) = pattern.strip_prefix('*') {
            // Suffix pattern like *.d.ts or *.test.ts
            file_path.ends_with(suffix)
        } else {
            // Exact match or prefix
            file_path == pattern || file_path.starts_with(pattern)
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.project.name.is_empty() {
            return Err(anyhow::anyhow!("Project name cannot be empty"));
        }

        if self.indexing.extensions.is_empty() {
            return Err(anyhow::anyhow!("At least one source extension is required"));
        }

        if self.index.concurrency == 0 {
            return Err(anyhow::anyhow!("Index concurrency must be greater than 0"));
        }

        validate_embedding("embedding", &self.embedding)?;
        if let Some(nlp) = &self.nlp_embedding {
            validate_embedding("nlp_embedding", nlp)?;
        }

        if self.index.dual_embedding && self.summary.is_none() {
            return Err(anyhow::anyhow!("dual_embedding requires a [summary] section"));
        }
        if let Some(summary) = &self.summary {
            if summary.batch_size == 0 {
                return Err(anyhow::anyhow!("Summary batch size must be greater than 0"));
            }
        }

        if self.search.top_k == 0 {
            return Err(anyhow::anyhow!("Search top_k must be greater than 0"));
        }
        if !(-1.0..=1.0).contains(&self.search.min_score) {
            return Err(anyhow::anyhow!("Search min_score must lie in [-1, 1]"));
        }
        if !(0.0..=1.0).contains(&self.search.code_weight) {
            return Err(anyhow::anyhow!("Search code_weight must lie in [0, 1]"));
        }

        let valid_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(anyhow::anyhow!("Invalid log level: {}", self.logging.level));
        }
        let valid_formats = ["compact", "pretty", "json"];
        if !valid_formats.contains(&self.logging.format.as_str()) {
            return Err(anyhow::anyhow!("Invalid log format: {}", self.logging.format));
        }

        Ok(())
    }
}

fn validate_embedding(section: &str, config: &EmbeddingConfig) -> anyhow::Result<()> {
    match config.provider.as_str() {
        "hashing" => {}
        "http" => {
            if config.url.is_none() {
                return Err(anyhow::anyhow!("[{}] provider \"http\" needs a url", section));
            }
        }
        other => return Err(anyhow::anyhow!("[{}] unknown embedding provider: {}", section, other)),
    }
    if config.dimensions == 0 {
        return Err(anyhow::anyhow!("[{}] dimensions must be greater than 0", section));
    }
    if config.model.is_empty() {
        return Err(anyhow::anyhow!("[{}] model cannot be empty", section));
    }
    Ok(())
}
