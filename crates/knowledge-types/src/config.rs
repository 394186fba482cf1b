//! Configuration loading for the knowledge engine.
//!
//! Layered config: defaults -> config file -> env vars -> CLI flags.
//! The default config file lives at ~/.config/knowledgedb/config.toml.

use config::{Config, Environment, File};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::KnowledgeError;
use crate::history::DEFAULT_HISTORY_LIMIT;

const APP_NAME: &str = "knowledgedb";

/// Weights for three-way (keyword + graph + vector) fusion.
///
/// Weights need not sum to 1; each component is clamped independently.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FusionWeights {
    #[serde(default = "default_keyword_weight")]
    pub keyword: f64,
    #[serde(default = "default_graph_weight")]
    pub graph: f64,
    #[serde(default = "default_vector_weight")]
    pub vector: f64,
}

fn default_keyword_weight() -> f64 {
    0.3
}

fn default_graph_weight() -> f64 {
    0.3
}

fn default_vector_weight() -> f64 {
    0.4
}

impl Default for FusionWeights {
    fn default() -> Self {
        Self {
            keyword: default_keyword_weight(),
            graph: default_graph_weight(),
            vector: default_vector_weight(),
        }
    }
}

impl FusionWeights {
    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), String> {
        for (name, w) in [
            ("keyword", self.keyword),
            ("graph", self.graph),
            ("vector", self.vector),
        ] {
            if !w.is_finite() || w < 0.0 {
                return Err(format!("{} weight must be a non-negative number, got {}", name, w));
            }
        }
        Ok(())
    }
}

/// Free-text search settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchSettings {
    /// BFS depth used by graph-based search scoring
    #[serde(default = "default_graph_depth")]
    pub graph_depth: usize,

    /// Result limit when the caller gives none
    #[serde(default = "default_limit")]
    pub default_limit: usize,

    /// BM25 term-frequency saturation
    #[serde(default = "default_bm25_k1")]
    pub bm25_k1: f64,

    /// BM25 length normalization
    #[serde(default = "default_bm25_b")]
    pub bm25_b: f64,

    #[serde(default)]
    pub weights: FusionWeights,
}

fn default_graph_depth() -> usize {
    2
}

fn default_limit() -> usize {
    10
}

fn default_bm25_k1() -> f64 {
    1.5
}

fn default_bm25_b() -> f64 {
    0.75
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            graph_depth: default_graph_depth(),
            default_limit: default_limit(),
            bm25_k1: default_bm25_k1(),
            bm25_b: default_bm25_b(),
            weights: FusionWeights::default(),
        }
    }
}

impl SearchSettings {
    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.graph_depth == 0 || self.graph_depth > 5 {
            return Err(format!("graph_depth must be 1-5, got {}", self.graph_depth));
        }
        if self.default_limit == 0 {
            return Err("default_limit must be > 0".to_string());
        }
        if self.bm25_k1 < 0.0 {
            return Err(format!("bm25_k1 must be >= 0, got {}", self.bm25_k1));
        }
        if !(0.0..=1.0).contains(&self.bm25_b) {
            return Err(format!("bm25_b must be 0.0-1.0, got {}", self.bm25_b));
        }
        self.weights.validate()
    }
}

/// Hashed vector index settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorSettings {
    /// Leading LSH signature bits a candidate must share with the query
    #[serde(default = "default_lsh_prefix_bits")]
    pub lsh_prefix_bits: usize,

    /// Compute corpus IDF weights when rebuilding an index
    #[serde(default = "default_corpus_idf")]
    pub corpus_idf: bool,
}

fn default_lsh_prefix_bits() -> usize {
    8
}

fn default_corpus_idf() -> bool {
    true
}

impl Default for VectorSettings {
    fn default() -> Self {
        Self {
            lsh_prefix_bits: default_lsh_prefix_bits(),
            corpus_idf: default_corpus_idf(),
        }
    }
}

impl VectorSettings {
    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.lsh_prefix_bits > 20 {
            return Err(format!(
                "lsh_prefix_bits must be 0-20, got {}",
                self.lsh_prefix_bits
            ));
        }
        Ok(())
    }
}

/// Main application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Path to RocksDB storage directory
    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Upper bound on a single engine call from the CLI
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Snapshots retained per document
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,

    /// Cap on stored memory items for one agent
    #[serde(default = "default_max_memory_items")]
    pub max_memory_items_per_agent: usize,

    #[serde(default)]
    pub search: SearchSettings,

    #[serde(default)]
    pub vector: VectorSettings,
}

fn default_data_dir() -> String {
    ProjectDirs::from("", "", APP_NAME)
        .map(|p| p.data_local_dir().join("db"))
        .unwrap_or_else(|| PathBuf::from("./data"))
        .to_string_lossy()
        .to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_request_timeout_ms() -> u64 {
    30_000
}

fn default_history_limit() -> usize {
    DEFAULT_HISTORY_LIMIT
}

fn default_max_memory_items() -> usize {
    1000
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            log_level: default_log_level(),
            request_timeout_ms: default_request_timeout_ms(),
            history_limit: default_history_limit(),
            max_memory_items_per_agent: default_max_memory_items(),
            search: SearchSettings::default(),
            vector: VectorSettings::default(),
        }
    }
}

impl Settings {
    /// Load settings with layered precedence:
    /// 1. Built-in defaults
    /// 2. Config file (~/.config/knowledgedb/config.toml)
    /// 3. CLI-specified config file (optional)
    /// 4. Environment variables (KNOWLEDGE_*, nested keys joined by `__`)
    ///
    /// CLI flags should be applied by the caller after this returns.
    pub fn load(cli_config_path: Option<&str>) -> Result<Self, KnowledgeError> {
        let config_dir = ProjectDirs::from("", "", APP_NAME)
            .map(|p| p.config_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."));

        let default_config_path = config_dir.join("config");

        let mut builder = Config::builder()
            .set_default("data_dir", default_data_dir())
            .map_err(|e| KnowledgeError::Config(e.to_string()))?
            .set_default("log_level", default_log_level())
            .map_err(|e| KnowledgeError::Config(e.to_string()))?
            .set_default("request_timeout_ms", default_request_timeout_ms())
            .map_err(|e| KnowledgeError::Config(e.to_string()))?
            .set_default("history_limit", default_history_limit() as u64)
            .map_err(|e| KnowledgeError::Config(e.to_string()))?
            .set_default(
                "max_memory_items_per_agent",
                default_max_memory_items() as u64,
            )
            .map_err(|e| KnowledgeError::Config(e.to_string()))?
            .add_source(File::with_name(&default_config_path.to_string_lossy()).required(false));

        if let Some(path) = cli_config_path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        // KNOWLEDGE_DATA_DIR, KNOWLEDGE_SEARCH__GRAPH_DEPTH, ...
        builder = builder.add_source(
            Environment::with_prefix("KNOWLEDGE")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder
            .build()
            .map_err(|e| KnowledgeError::Config(e.to_string()))?;

        let settings: Settings = config
            .try_deserialize()
            .map_err(|e| KnowledgeError::Config(e.to_string()))?;
        settings.validate().map_err(KnowledgeError::Config)?;
        Ok(settings)
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.data_dir.trim().is_empty() {
            return Err("data_dir must not be empty".to_string());
        }
        if self.request_timeout_ms == 0 {
            return Err("request_timeout_ms must be > 0".to_string());
        }
        if self.history_limit == 0 {
            return Err("history_limit must be > 0".to_string());
        }
        if self.max_memory_items_per_agent == 0 {
            return Err("max_memory_items_per_agent must be > 0".to_string());
        }
        self.search.validate()?;
        self.vector.validate()
    }

    /// Expand ~ in data_dir to the home directory
    pub fn expanded_data_dir(&self) -> PathBuf {
        if let Some(rest) = self.data_dir.strip_prefix("~/") {
            if let Some(home) = std::env::var_os("HOME") {
                return PathBuf::from(home).join(rest);
            }
        }
        PathBuf::from(&self.data_dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.history_limit, 50);
        assert_eq!(settings.max_memory_items_per_agent, 1000);
        assert_eq!(settings.request_timeout_ms, 30_000);
        assert_eq!(settings.search.graph_depth, 2);
        assert_eq!(settings.vector.lsh_prefix_bits, 8);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_default_fusion_weights() {
        let weights = FusionWeights::default();
        assert!((weights.keyword - 0.3).abs() < f64::EPSILON);
        assert!((weights.graph - 0.3).abs() < f64::EPSILON);
        assert!((weights.vector - 0.4).abs() < f64::EPSILON);
    }

    #[test]
    fn test_load_with_defaults() {
        let settings = Settings::load(None).unwrap();
        assert_eq!(settings.log_level, "info");
        assert!((settings.search.bm25_k1 - 1.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut settings = Settings::default();
        settings.search.bm25_b = 1.5;
        assert!(settings.validate().is_err());

        let mut settings = Settings::default();
        settings.history_limit = 0;
        assert!(settings.validate().is_err());

        let mut settings = Settings::default();
        settings.search.weights.vector = -0.1;
        assert!(settings.validate().is_err());

        let mut settings = Settings::default();
        settings.vector.lsh_prefix_bits = 21;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_partial_search_settings_fill_defaults() {
        let search: SearchSettings = serde_json::from_str(r#"{"graph_depth": 3}"#).unwrap();
        assert_eq!(search.graph_depth, 3);
        assert_eq!(search.default_limit, 10);
        assert!((search.weights.vector - 0.4).abs() < f64::EPSILON);
    }

    #[test]
    fn test_expanded_data_dir_plain() {
        let settings = Settings {
            data_dir: "/var/lib/knowledgedb".to_string(),
            ..Default::default()
        };
        assert_eq!(settings.expanded_data_dir(), PathBuf::from("/var/lib/knowledgedb"));
    }
}
