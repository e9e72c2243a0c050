use crate::constants::{
    AGGREGATED_FILE, AUXILIARY_DIR, CONSOLIDATED_FILE, DEFAULT_MAX_PERIODS, DEFAULT_TIMEOUT_SECS,
    ENRICHED_FILE, EXTRACTED_DIR, MANIFEST_FILE, RAW_DIR, REGISTRY_BASE_URL, REGISTRY_FILE,
    STATEMENTS_BASE_URL, SUMMARY_FILE,
};
use crate::error::{EtlError, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_CONFIG_FILE: &str = "ans_etl.toml";

/// Settings for a pipeline run. Every field has a default, so an empty or
/// missing config file is valid.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub statements_url: String,
    pub registry_url: String,
    pub data_dir: PathBuf,
    pub log_dir: PathBuf,
    pub max_periods: usize,
    pub timeout_secs: u64,
    /// Fail an entry instead of overwriting a file extracted from an earlier archive
    pub reject_duplicate_entries: bool,
    /// Fail the registry load instead of keeping the last row for a repeated id
    pub reject_duplicate_registry_ids: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            statements_url: STATEMENTS_BASE_URL.to_string(),
            registry_url: REGISTRY_BASE_URL.to_string(),
            data_dir: PathBuf::from("data"),
            log_dir: PathBuf::from("logs"),
            max_periods: DEFAULT_MAX_PERIODS,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            reject_duplicate_entries: false,
            reject_duplicate_registry_ids: false,
        }
    }
}

impl PipelineConfig {
    /// Loads the TOML file at `path` (or `ans_etl.toml` when present), then
    /// applies `ANS_ETL_*` environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => Self::from_file(path)?,
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                Self::from_file(Path::new(DEFAULT_CONFIG_FILE))?
            }
            None => Self::default(),
        };
        config.with_env_overrides()
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            EtlError::Config(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: PipelineConfig = toml::from_str(content)?;
        Ok(config)
    }

    fn with_env_overrides(mut self) -> Result<Self> {
        if let Ok(dir) = std::env::var("ANS_ETL_DATA_DIR") {
            if !dir.trim().is_empty() {
                self.data_dir = PathBuf::from(dir);
            }
        }
        if let Ok(value) = std::env::var("ANS_ETL_MAX_PERIODS") {
            self.max_periods = value.trim().parse().map_err(|_| {
                EtlError::Config(format!("ANS_ETL_MAX_PERIODS is not a number: '{}'", value))
            })?;
        }
        if let Ok(value) = std::env::var("ANS_ETL_TIMEOUT_SECS") {
            self.timeout_secs = value.trim().parse().map_err(|_| {
                EtlError::Config(format!("ANS_ETL_TIMEOUT_SECS is not a number: '{}'", value))
            })?;
        }
        Ok(self)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn raw_dir(&self) -> PathBuf {
        self.data_dir.join(RAW_DIR)
    }

    pub fn extracted_dir(&self) -> PathBuf {
        self.data_dir.join(EXTRACTED_DIR)
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.extracted_dir().join(MANIFEST_FILE)
    }

    pub fn registry_cache_path(&self) -> PathBuf {
        self.data_dir.join(AUXILIARY_DIR).join(REGISTRY_FILE)
    }

    pub fn consolidated_path(&self) -> PathBuf {
        self.data_dir.join(CONSOLIDATED_FILE)
    }

    pub fn enriched_path(&self) -> PathBuf {
        self.data_dir.join(ENRICHED_FILE)
    }

    pub fn aggregated_path(&self) -> PathBuf {
        self.data_dir.join(AGGREGATED_FILE)
    }

    pub fn summary_path(&self) -> PathBuf {
        self.data_dir.join(SUMMARY_FILE)
    }
}
