use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use graphmill_core::chunk::ChunkingConfig;
use graphmill_core::score::ScoringWeights;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub extraction: ExtractionConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub cache: CacheSettings,
    #[serde(default)]
    pub scoring: ScoringWeights,
    #[serde(default)]
    pub ingest: IngestConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ExtractionConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_extraction_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_entity_types")]
    pub entity_types: Vec<String>,
    #[serde(default = "default_max_document_bytes")]
    pub max_document_bytes: usize,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            base_url: None,
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_extraction_timeout_secs(),
            entity_types: default_entity_types(),
            max_document_bytes: default_max_document_bytes(),
        }
    }
}

impl ExtractionConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_batch_size() -> usize {
    5
}
fn default_max_retries() -> u32 {
    3
}
fn default_extraction_timeout_secs() -> u64 {
    60
}
fn default_entity_types() -> Vec<String> {
    [
        "Person",
        "Organization",
        "Location",
        "Technology",
        "Concept",
        "Event",
        "Product",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}
fn default_max_document_bytes() -> usize {
    2_000_000
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "default_dims")]
    pub dims: usize,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_embedding_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_embedding_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_embedding_max_chars")]
    pub max_chars: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            dims: default_dims(),
            base_url: None,
            max_retries: default_embedding_max_retries(),
            timeout_secs: default_embedding_timeout_secs(),
            max_chars: default_embedding_max_chars(),
        }
    }
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_dims() -> usize {
    graphmill_core::embedding::DEFAULT_DIMS
}
fn default_embedding_max_retries() -> u32 {
    5
}
fn default_embedding_timeout_secs() -> u64 {
    30
}
fn default_embedding_max_chars() -> usize {
    8000
}

#[derive(Debug, Deserialize, Clone)]
pub struct CacheSettings {
    #[serde(default = "default_extraction_cache_entries")]
    pub extraction_max_entries: usize,
    #[serde(default = "default_extraction_cache_age_secs")]
    pub extraction_max_age_secs: i64,
    #[serde(default = "default_embedding_cache_entries")]
    pub embedding_max_entries: usize,
    #[serde(default = "default_embedding_cache_age_secs")]
    pub embedding_max_age_secs: i64,
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            extraction_max_entries: default_extraction_cache_entries(),
            extraction_max_age_secs: default_extraction_cache_age_secs(),
            embedding_max_entries: default_embedding_cache_entries(),
            embedding_max_age_secs: default_embedding_cache_age_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

fn default_extraction_cache_entries() -> usize {
    512
}
fn default_extraction_cache_age_secs() -> i64 {
    3600
}
fn default_embedding_cache_entries() -> usize {
    4096
}
fn default_embedding_cache_age_secs() -> i64 {
    86_400
}
fn default_sweep_interval_secs() -> u64 {
    300
}

#[derive(Debug, Deserialize, Clone)]
pub struct IngestConfig {
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            include_globs: default_include_globs(),
            exclude_globs: Vec::new(),
        }
    }
}

fn default_include_globs() -> Vec<String> {
    vec![
        "**/*.md".to_string(),
        "**/*.txt".to_string(),
        "**/*.json".to_string(),
        "**/*.xml".to_string(),
    ]
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    // Validate chunking
    if config.chunking.max_chunk_size == 0 {
        anyhow::bail!("chunking.max_chunk_size must be > 0");
    }
    if config.chunking.min_chunk_size >= config.chunking.max_chunk_size {
        anyhow::bail!("chunking.min_chunk_size must be < chunking.max_chunk_size");
    }
    if config.chunking.overlap_size >= config.chunking.max_chunk_size / 2 {
        anyhow::bail!("chunking.overlap_size must be < chunking.max_chunk_size / 2");
    }

    // Validate extraction
    match config.extraction.provider.as_str() {
        "disabled" | "openai" => {}
        other => anyhow::bail!(
            "Unknown extraction provider: '{}'. Must be disabled or openai.",
            other
        ),
    }
    if config.extraction.batch_size == 0 {
        anyhow::bail!("extraction.batch_size must be >= 1");
    }
    if config.extraction.is_enabled() && config.extraction.model.is_none() {
        anyhow::bail!(
            "extraction.model must be specified when provider is '{}'",
            config.extraction.provider
        );
    }

    // Validate embedding
    match config.embedding.provider.as_str() {
        "disabled" | "openai" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled or openai.",
            other
        ),
    }
    if config.embedding.is_enabled() {
        if config.embedding.dims == 0 {
            anyhow::bail!(
                "embedding.dims must be > 0 when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.model.is_none() {
            anyhow::bail!(
                "embedding.model must be specified when provider is '{}'",
                config.embedding.provider
            );
        }
    }

    // Validate scoring weight tables
    if let Err(reason) = config.scoring.validate() {
        anyhow::bail!("Invalid scoring weights: {}", reason);
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_minimal_config_gets_defaults() {
        let file = write_config("[db]\npath = \"data/graph.sqlite\"\n");
        let config = load_config(file.path()).unwrap();
        assert_eq!(config.chunking.max_chunk_size, 2000);
        assert_eq!(config.extraction.batch_size, 5);
        assert_eq!(config.extraction.provider, "disabled");
        assert_eq!(config.embedding.dims, 384);
        assert!(config.scoring.validate().is_ok());
    }

    #[test]
    fn test_invalid_overlap_rejected() {
        let file = write_config(
            "[db]\npath = \"g.sqlite\"\n\n[chunking]\nmax_chunk_size = 100\nmin_chunk_size = 10\noverlap_size = 90\n",
        );
        assert!(load_config(file.path()).is_err());
    }

    #[test]
    fn test_unknown_provider_rejected() {
        let file = write_config("[db]\npath = \"g.sqlite\"\n\n[extraction]\nprovider = \"divination\"\n");
        assert!(load_config(file.path()).is_err());
    }

    #[test]
    fn test_enabled_extraction_requires_model() {
        let file = write_config("[db]\npath = \"g.sqlite\"\n\n[extraction]\nprovider = \"openai\"\n");
        assert!(load_config(file.path()).is_err());
    }

    #[test]
    fn test_scoring_weights_overridable() {
        let file = write_config(
            "[db]\npath = \"g.sqlite\"\n\n[scoring.entity]\nname_length = 0.2\ndescription_length = 0.2\nuniqueness = 0.2\ncontext_relevance = 0.2\ncross_doc_frequency = 0.2\n",
        );
        let config = load_config(file.path()).unwrap();
        assert_eq!(config.scoring.entity.name_length, 0.2);
    }

    #[test]
    fn test_bad_scoring_weights_rejected() {
        let file = write_config(
            "[db]\npath = \"g.sqlite\"\n\n[scoring.entity]\nname_length = 0.9\n",
        );
        assert!(load_config(file.path()).is_err());
    }
}
