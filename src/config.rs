//! Configuration for navrank
//!
//! Settings come from a TOML file (every key optional), then environment
//! overrides, then command-line flags applied by the caller. The file is
//! looked up at `--config`, `$NAVRANK_CONFIG`, then
//! `<config dir>/navrank/config.toml`.

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use crate::provider::mfapi::DEFAULT_BASE_URL;
use crate::reports::RankingConfig;
use crate::returns::ReturnConfig;

const APP_DIR: &str = "navrank";
const CONFIG_FILE: &str = "config.toml";
const MAX_RETRIES_LIMIT: u32 = 10;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api: ApiConfig,
    pub sync: SyncConfig,
    pub returns: ReturnsConfig,
    pub ranking: RankingSection,
    pub persistence: PersistenceConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
    pub timeout_secs: u64,
    /// Scheme-list pagination batch
    pub page_size: usize,
    pub max_retries: u32,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout_secs: 30,
            page_size: 1000,
            max_retries: 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub staleness_days: u32,
    /// Schemes processed in parallel
    pub concurrency: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            staleness_days: 5,
            concurrency: 25,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReturnsConfig {
    pub min_history_months: u32,
}

impl Default for ReturnsConfig {
    fn default() -> Self {
        Self {
            min_history_months: ReturnConfig::default().min_history_months,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RankingSection {
    pub overall_top_n: usize,
    pub category_top_n: usize,
    pub scheme_limit: Option<usize>,
}

impl Default for RankingSection {
    fn default() -> Self {
        let defaults = RankingConfig::default();
        Self {
            overall_top_n: defaults.overall_top_n,
            category_top_n: defaults.category_top_n,
            scheme_limit: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistenceConfig {
    pub data_dir: Option<PathBuf>,
    pub shard_count: usize,
    pub reports_dir: Option<PathBuf>,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            shard_count: 16,
            reports_dir: None,
        }
    }
}

impl Config {
    /// Load from `explicit`, `$NAVRANK_CONFIG` or the default location, then
    /// apply environment overrides. Only the default location may be absent.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let requested = explicit
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os("NAVRANK_CONFIG").map(PathBuf::from));

        let mut config = match requested {
            Some(path) => Self::from_file(&path)?,
            None => match default_config_path() {
                Some(path) if path.exists() => Self::from_file(&path)?,
                _ => {
                    debug!("No config file found, using defaults");
                    Self::default()
                }
            },
        };

        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {:?}", path))?;
        let config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {:?}", path))?;
        debug!("Loaded config from {:?}", path);
        Ok(config)
    }

    /// Apply `NAVRANK_*` overrides using `lookup` to read variables
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = lookup("NAVRANK_DATA_DIR") {
            self.persistence.data_dir = Some(PathBuf::from(dir));
        }

        if let Some(limit) = lookup("NAVRANK_SCHEME_LIMIT") {
            self.ranking.scheme_limit = Some(
                limit
                    .trim()
                    .parse()
                    .map_err(|e| anyhow!("Invalid NAVRANK_SCHEME_LIMIT: {}", e))?,
            );
        }

        if let Some(days) = lookup("NAVRANK_STALENESS_DAYS") {
            self.sync.staleness_days = days
                .trim()
                .parse()
                .map_err(|e| anyhow!("Invalid NAVRANK_STALENESS_DAYS: {}", e))?;
        }

        if let Some(url) = lookup("NAVRANK_API_BASE_URL") {
            self.api.base_url = url;
        }

        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.persistence.shard_count == 0 {
            return Err(anyhow!("persistence.shard_count must be at least 1"));
        }
        if self.sync.concurrency == 0 {
            return Err(anyhow!("sync.concurrency must be at least 1"));
        }
        if self.returns.min_history_months == 0 {
            return Err(anyhow!("returns.min_history_months must be at least 1"));
        }
        if self.api.base_url.trim().is_empty() {
            return Err(anyhow!("api.base_url cannot be empty"));
        }
        if self.api.timeout_secs == 0 {
            return Err(anyhow!("api.timeout_secs must be at least 1"));
        }
        if self.api.max_retries > MAX_RETRIES_LIMIT {
            return Err(anyhow!(
                "api.max_retries must be at most {}, got {}",
                MAX_RETRIES_LIMIT,
                self.api.max_retries
            ));
        }
        Ok(())
    }

    pub fn api_timeout(&self) -> Duration {
        Duration::from_secs(self.api.timeout_secs)
    }

    pub fn return_config(&self) -> ReturnConfig {
        ReturnConfig {
            min_history_months: self.returns.min_history_months,
        }
    }

    pub fn ranking_config(&self) -> RankingConfig {
        RankingConfig {
            overall_top_n: self.ranking.overall_top_n,
            category_top_n: self.ranking.category_top_n,
        }
    }

    /// Persistence root: configured, or `<data dir>/navrank`
    pub fn data_dir(&self) -> Result<PathBuf> {
        match &self.persistence.data_dir {
            Some(dir) => Ok(dir.clone()),
            None => dir_spec::data_home()
                .map(|dir| dir.join(APP_DIR))
                .ok_or_else(|| anyhow!("Could not determine data directory")),
        }
    }

    pub fn reports_dir(&self) -> Result<PathBuf> {
        match &self.persistence.reports_dir {
            Some(dir) => Ok(dir.clone()),
            None => Ok(self.data_dir()?.join("reports")),
        }
    }
}

pub fn default_config_path() -> Option<PathBuf> {
    dir_spec::config_home().map(|dir| dir.join(APP_DIR).join(CONFIG_FILE))
}
