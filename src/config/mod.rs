//! Configuration management for snappychain
//!
//! Loads a TOML file, applies environment overrides and validates the
//! result. Every section has defaults, so an empty file is a valid config.

use crate::error::{Result, SnappyError};
use crate::retrieval::TokenizerConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

mod validator;

pub use validator::ConfigValidator;

/// Environment variable holding the registry TTL in hours
pub const CACHE_TTL_ENV: &str = "CHAIN_CACHE_LRU_HOUR";

/// Default registry TTL in hours
pub const DEFAULT_TTL_HOURS: u64 = 24;

/// Upper bound keeping the TTL representable as a duration
const MAX_TTL_HOURS: u64 = 1_000_000;

const ENV_PREFIX: &str = "SNAPPYCHAIN_";

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(rename = "_meta", default)]
    pub meta: MetaConfig,
    #[serde(default)]
    pub retriever: RetrieverConfig,
    #[serde(default)]
    pub registry: RegistryConfig,
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

impl Default for MetaConfig {
    fn default() -> Self {
        Self {
            schema_version: "1.0.0".to_string(),
            created_at: current_timestamp(),
        }
    }
}

/// BM25 retriever settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrieverConfig {
    pub k1: f64,
    pub b: f64,
    /// Default number of results per query
    pub k: usize,
    pub tokenizer: TokenizerConfig,
}

impl Default for RetrieverConfig {
    fn default() -> Self {
        Self {
            k1: 1.2,
            b: 0.75,
            k: crate::retrieval::DEFAULT_K,
            tokenizer: TokenizerConfig::default(),
        }
    }
}

/// Component registry settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Idle time after which a cached component is evicted
    pub ttl_hours: u64,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            ttl_hours: DEFAULT_TTL_HOURS,
        }
    }
}

impl RegistryConfig {
    /// Read `CHAIN_CACHE_LRU_HOUR`; missing or invalid values give the default
    pub fn from_env() -> Self {
        let raw = std::env::var(CACHE_TTL_ENV).ok();
        Self {
            ttl_hours: parse_ttl_hours(raw.as_deref()).unwrap_or(DEFAULT_TTL_HOURS),
        }
    }

    pub fn ttl(&self) -> chrono::Duration {
        chrono::Duration::hours(self.ttl_hours.min(MAX_TTL_HOURS) as i64)
    }
}

/// Parse a TTL in whole hours. `None` for absent, non-numeric or zero values.
pub fn parse_ttl_hours(raw: Option<&str>) -> Option<u64> {
    let raw = raw?;
    match raw.trim().parse::<u64>() {
        Ok(hours) if hours > 0 => Some(hours),
        _ => {
            tracing::warn!(
                "Ignoring invalid {} value '{}', using {} hours",
                CACHE_TTL_ENV,
                raw,
                DEFAULT_TTL_HOURS
            );
            None
        }
    }
}

impl Config {
    /// Load configuration from a file, then apply environment overrides
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = Self::read_file(path)?;
        config.apply_env_overrides();
        ConfigValidator::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a file exactly as written
    pub fn load_without_env(path: &Path) -> Result<Self> {
        let config = Self::read_file(path)?;
        ConfigValidator::validate(&config)?;
        Ok(config)
    }

    fn read_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(SnappyError::ConfigNotFound {
                path: path.to_path_buf(),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| SnappyError::Io {
            source: e,
            context: format!("Failed to read config file: {:?}", path),
        })?;
        Ok(toml::from_str(&content)?)
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|e| SnappyError::Io {
            source: e,
            context: format!("Failed to write config file: {:?}", path),
        })?;
        Ok(())
    }

    /// Apply environment variable overrides
    ///
    /// Variables use the form `SNAPPYCHAIN_SECTION__KEY=value`; the legacy
    /// `CHAIN_CACHE_LRU_HOUR` is honoured as well.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(std::env::vars());
    }

    /// Apply overrides from explicit `(name, value)` pairs
    pub fn apply_overrides<I>(&mut self, vars: I)
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (key, value) in vars {
            if key == CACHE_TTL_ENV {
                if let Some(hours) = parse_ttl_hours(Some(&value)) {
                    self.registry.ttl_hours = hours;
                }
            } else if let Some(config_key) = key.strip_prefix(ENV_PREFIX) {
                if let Err(e) = self.set_value_from_env(config_key, &value) {
                    tracing::warn!("Failed to apply env override {}: {}", key, e);
                }
            }
        }
    }

    fn set_value_from_env(&mut self, path: &str, value: &str) -> Result<()> {
        match path {
            "RETRIEVER__K1" => self.retriever.k1 = parse_value(path, value)?,
            "RETRIEVER__B" => self.retriever.b = parse_value(path, value)?,
            "RETRIEVER__K" => self.retriever.k = parse_value(path, value)?,
            "RETRIEVER__TOKENIZER__CJK_NGRAM" => {
                self.retriever.tokenizer.cjk_ngram = parse_value(path, value)?
            }
            "RETRIEVER__TOKENIZER__CJK_UNIGRAMS" => {
                self.retriever.tokenizer.cjk_unigrams = parse_value(path, value)?
            }
            "REGISTRY__TTL_HOURS" => self.registry.ttl_hours = parse_value(path, value)?,
            _ => {
                tracing::debug!("Unknown env config key: {}", path);
            }
        }
        Ok(())
    }

    /// Get the default configuration file path
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| SnappyError::Config("Cannot determine config directory".to_string()))?;

        Ok(config_dir.join("snappychain").join("config.toml"))
    }
}

fn parse_value<T: std::str::FromStr>(path: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| SnappyError::InvalidConfigValue {
            path: path.to_string(),
            message: format!("Cannot parse '{}'", value),
        })
}
