//! Configuration management

use crate::error::{AggregatorError, Result};
use crate::types::DataSource;
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub aggregator: AggregatorSettings,
    /// Registration order of this list is the output order of every aggregation
    #[serde(default)]
    pub exchanges: Vec<ExchangeConfig>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AggregatorSettings {
    /// Upper bound for a single source fetch, in milliseconds
    pub request_timeout_ms: u64,
    /// Timeout applied by the HTTP client itself
    pub http_timeout_secs: u64,
    pub user_agent: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExchangeConfig {
    pub source: DataSource,
    /// REST endpoint, e.g. https://api.binance.com
    pub base_url: String,
    pub api_key: String,
    pub secret_key: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl Default for AggregatorSettings {
    fn default() -> Self {
        Self {
            request_timeout_ms: 5_000,
            http_timeout_secs: 30,
            user_agent: concat!("liquidity-aggregator/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl Config {
    /// Load configuration from file
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path
            .as_ref()
            .to_str()
            .ok_or_else(|| anyhow::anyhow!("config path is not valid UTF-8"))?;

        let settings = config::Config::builder()
            .add_source(config::File::with_name(path))
            .add_source(config::Environment::with_prefix("AGGREGATOR").separator("__"))
            .build()?;

        let config: Config = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Load from default locations
    pub fn load_default() -> anyhow::Result<Self> {
        let paths = [
            "config.toml",
            "config.yaml",
            "~/.config/liquidity-aggregator/config.toml",
        ];

        for path in paths {
            let expanded = shellexpand::tilde(path);
            if Path::new(expanded.as_ref()).exists() {
                return Self::load(expanded.as_ref());
            }
        }

        anyhow::bail!("No configuration file found")
    }

    /// Exchanges that take part in aggregation, in registration order
    pub fn enabled_exchanges(&self) -> impl Iterator<Item = &ExchangeConfig> {
        self.exchanges.iter().filter(|e| e.enabled)
    }

    pub fn validate(&self) -> Result<()> {
        if self.aggregator.request_timeout_ms == 0 {
            return Err(AggregatorError::Config(
                "request_timeout_ms must be positive".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for ex in &self.exchanges {
            if !seen.insert(ex.source) {
                return Err(AggregatorError::Config(format!(
                    "duplicate exchange {}",
                    ex.source
                )));
            }
            if ex.api_key.is_empty() || ex.secret_key.is_empty() {
                return Err(AggregatorError::Config(format!(
                    "missing credentials for {}",
                    ex.source
                )));
            }
            if ex.base_url.is_empty() {
                return Err(AggregatorError::Config(format!(
                    "missing base_url for {}",
                    ex.source
                )));
            }
        }
        Ok(())
    }
}
