//! TOML configuration parsing and validation.
//!
//! ```toml
//! [db]
//! path = "./data/crowdcrawl.sqlite"
//!
//! [ingest]
//! batch_limit = 100
//! retry_delay_secs = 10
//!
//! [index]
//! num_pages = 25600
//!
//! [blacklist]
//! path = "./config/blacklist.txt"
//!
//! [logging]
//! json = false
//! ```

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub blacklist: BlacklistConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct IngestConfig {
    /// Maximum batches reconciled per cycle.
    #[serde(default = "default_batch_limit")]
    pub batch_limit: usize,
    /// Pause between driver cycles, after success or failure.
    #[serde(default = "default_retry_delay_secs")]
    pub retry_delay_secs: u64,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            batch_limit: default_batch_limit(),
            retry_delay_secs: default_retry_delay_secs(),
        }
    }
}

impl IngestConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }
}

fn default_batch_limit() -> usize {
    100
}
fn default_retry_delay_secs() -> u64 {
    10
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexConfig {
    #[serde(default = "default_num_pages")]
    pub num_pages: u64,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            num_pages: default_num_pages(),
        }
    }
}

fn default_num_pages() -> u64 {
    25_600
}

/// Where the domain blacklist comes from. Neither set means no blacklist.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct BlacklistConfig {
    /// Local file, one domain per line.
    pub path: Option<PathBuf>,
    /// Remote list in the same format.
    pub url: Option<String>,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct LoggingConfig {
    #[serde(default)]
    pub json: bool,
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

pub fn validate(config: &Config) -> Result<()> {
    if config.ingest.batch_limit == 0 {
        anyhow::bail!("ingest.batch_limit must be >= 1");
    }

    if config.index.num_pages == 0 {
        anyhow::bail!("index.num_pages must be >= 1");
    }

    if config.blacklist.path.is_some() && config.blacklist.url.is_some() {
        anyhow::bail!("blacklist.path and blacklist.url are mutually exclusive");
    }

    Ok(())
}
