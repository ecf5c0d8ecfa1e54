//! Configuration management for Reelseek
//!
//! Static startup configuration: embedding provider credentials and model, vector
//! store location, vector dimension and the list of index configurations. Loaded
//! from TOML, then overridden from the environment, then validated.

use crate::error::{ReelseekError, Result};
use crate::registry::{IndexConfiguration, IndexRegistry, IndexType, MetricType};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

mod validator;

pub use validator::ConfigValidator;

pub const SCHEMA_VERSION: &str = "1.0.0";

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(rename = "_meta")]
    pub meta: MetaConfig,
    pub catalogue: CatalogueConfig,
    pub embedding: EmbeddingConfig,
    pub store: StoreConfig,
    pub benchmark: BenchmarkConfig,
    #[serde(default)]
    pub indexes: Vec<IndexConfiguration>,
}

/// Metadata about the configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetaConfig {
    pub schema_version: String,
    #[serde(default = "current_timestamp")]
    pub created_at: String,
}

fn current_timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// Catalogue source
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogueConfig {
    pub path: PathBuf,
    /// Column whose text is embedded
    pub text_field: String,
}

/// Embedding provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// "openai" or "fastembed"
    pub provider: String,
    pub model: String,
    pub api_base: String,
    /// Name of the environment variable holding the API key
    pub api_key_env: String,
    pub dimension: usize,
    pub batch_size: usize,
    /// Provider request ceiling, 0 for unthrottled
    pub requests_per_minute: u32,
    pub max_retries: u32,
    pub backoff_secs: u64,
}

/// Vector store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    pub path: PathBuf,
    pub default_top_k: usize,
}

/// Benchmark harness configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchmarkConfig {
    pub queries: Vec<String>,
    pub output: PathBuf,
    pub top_k: usize,
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(ReelseekError::ConfigNotFound {
                path: path.to_path_buf(),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| ReelseekError::Io {
            source: e,
            context: format!("Failed to read config file: {:?}", path),
        })?;
        let mut config: Config = toml::from_str(&content)?;

        config.apply_env_overrides();
        ConfigValidator::validate(&config)?;

        Ok(config)
    }

    /// Defaults plus `REELSEEK_*` overrides, for when no config file exists
    pub fn load_defaults() -> Result<Self> {
        Self::defaults_with(env_overrides())
    }

    fn defaults_with(overrides: impl IntoIterator<Item = (String, String)>) -> Result<Self> {
        let mut config = Self::default();
        config.apply_overrides(overrides);
        ConfigValidator::validate(&config)?;
        Ok(config)
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ReelseekError::Io {
                source: e,
                context: format!("Failed to create config directory: {:?}", parent),
            })?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|e| ReelseekError::Io {
            source: e,
            context: format!("Failed to write config file: {:?}", path),
        })?;
        Ok(())
    }

    /// Typed view of `indexes`, rejecting colliding collection names
    pub fn registry(&self) -> Result<IndexRegistry> {
        IndexRegistry::new(self.indexes.iter().cloned())
    }

    /// Apply environment variable overrides
    /// Environment variables in format: REELSEEK_SECTION__KEY=value
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(env_overrides());
    }

    fn apply_overrides(&mut self, overrides: impl IntoIterator<Item = (String, String)>) {
        for (key, value) in overrides {
            if let Err(e) = self.set_value_from_env(&key, &value) {
                tracing::warn!("Failed to apply env override REELSEEK_{}: {}", key, e);
            }
        }
    }

    fn set_value_from_env(&mut self, path: &str, value: &str) -> Result<()> {
        match path {
            "CATALOGUE__PATH" => self.catalogue.path = PathBuf::from(value),
            "CATALOGUE__TEXT_FIELD" => self.catalogue.text_field = value.to_string(),
            "EMBEDDING__PROVIDER" => self.embedding.provider = value.to_string(),
            "EMBEDDING__MODEL" => self.embedding.model = value.to_string(),
            "EMBEDDING__API_BASE" => self.embedding.api_base = value.to_string(),
            "EMBEDDING__DIMENSION" => self.embedding.dimension = parse_number(path, value)?,
            "EMBEDDING__REQUESTS_PER_MINUTE" => {
                self.embedding.requests_per_minute = parse_number(path, value)?
            }
            "EMBEDDING__BACKOFF_SECS" => self.embedding.backoff_secs = parse_number(path, value)?,
            "STORE__PATH" => self.store.path = PathBuf::from(value),
            _ => {
                tracing::debug!("Unknown env config key: {}", path);
            }
        }
        Ok(())
    }

    /// Get the default configuration file path
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| ReelseekError::Config("Cannot determine config directory".to_string()))?;

        Ok(config_dir.join("reelseek").join("config.toml"))
    }
}

/// `REELSEEK_SECTION__KEY` variables with the prefix stripped
fn env_overrides() -> Vec<(String, String)> {
    std::env::vars()
        .filter_map(|(key, value)| {
            key.strip_prefix("REELSEEK_")
                .map(|config_key| (config_key.to_string(), value))
        })
        .collect()
}

fn parse_number<T: std::str::FromStr>(path: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| ReelseekError::InvalidConfigValue {
            path: path.to_string(),
            message: format!("Cannot parse '{}' as a number", value),
        })
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = PathBuf::from("~/.reelseek");

        Self {
            meta: MetaConfig {
                schema_version: SCHEMA_VERSION.to_string(),
                created_at: current_timestamp(),
            },
            catalogue: CatalogueConfig {
                path: data_dir.join("data").join("etrange_festival_2023.csv"),
                text_field: "Description_movie_full".to_string(),
            },
            embedding: EmbeddingConfig {
                provider: "openai".to_string(),
                model: "text-embedding-ada-002".to_string(),
                api_base: "https://api.openai.com/v1".to_string(),
                api_key_env: "OPENAI_API_KEY".to_string(),
                dimension: 1536,
                batch_size: 16,
                requests_per_minute: 60,
                max_retries: 1,
                backoff_secs: 60,
            },
            store: StoreConfig {
                path: data_dir.join("vectors.db"),
                default_top_k: 5,
            },
            benchmark: BenchmarkConfig {
                queries: vec![
                    "film d'horreur".to_string(),
                    "film érotique".to_string(),
                    "film de science-fiction".to_string(),
                ],
                output: data_dir.join("data").join("search_results.csv"),
                top_k: 5,
            },
            indexes: vec![
                IndexConfiguration::new(IndexType::IvfFlat, MetricType::L2)
                    .with_param("nlist", 1024),
                IndexConfiguration::new(IndexType::Hnsw, MetricType::L2)
                    .with_param("M", 4)
                    .with_param("efConstruction", 16),
            ],
        }
    }
}
