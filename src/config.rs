use crate::error::{EtlError, Result};
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// Runtime configuration for both pipelines, loaded from a TOML file with
/// environment variable overrides applied on top.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    /// Optional Prometheus pushgateway endpoint for run metrics.
    #[serde(default)]
    pub pushgateway_url: Option<String>,
    #[serde(default)]
    pub catalog: CatalogConfig,
    #[serde(default)]
    pub rates: RatesConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CatalogConfig {
    /// Path to the source CSV export.
    #[serde(default = "default_catalog_csv")]
    pub csv_path: PathBuf,
    /// Path to the staging SQLite database.
    #[serde(default = "default_catalog_db")]
    pub db_path: PathBuf,
    /// Number of keys to process between commits.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Clear link tables before loading so re-runs fully replace associations.
    #[serde(default = "default_full_reload")]
    pub full_reload: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RatesConfig {
    /// SQLite database holding the financial_transactions table.
    #[serde(default = "default_transactions_db")]
    pub transactions_db: PathBuf,
    /// Destination CSV for fetched exchange rates.
    #[serde(default = "default_rates_csv")]
    pub output_csv: PathBuf,
    /// Base URL of the historical rates API.
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    /// Currency the rates are quoted against.
    #[serde(default = "default_base_currency")]
    pub base_currency: String,
    /// Maximum in-flight API requests.
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,
    /// When set, raw API payloads are archived here as JSON, one file per date.
    #[serde(default)]
    pub archive_dir: Option<PathBuf>,
}

fn default_catalog_csv() -> PathBuf {
    PathBuf::from("shows.csv")
}

fn default_catalog_db() -> PathBuf {
    PathBuf::from("catalog.db")
}

fn default_batch_size() -> usize {
    100
}

fn default_full_reload() -> bool {
    true
}

fn default_transactions_db() -> PathBuf {
    PathBuf::from("transactions.db")
}

fn default_rates_csv() -> PathBuf {
    PathBuf::from("exchange_rates.csv")
}

fn default_api_base_url() -> String {
    "https://api.frankfurter.dev/v1".to_string()
}

fn default_base_currency() -> String {
    "USD".to_string()
}

fn default_workers() -> usize {
    10
}

fn default_http_timeout_secs() -> u64 {
    30
}

impl Default for CatalogConfig {
    fn default() -> Self {
        CatalogConfig {
            csv_path: default_catalog_csv(),
            db_path: default_catalog_db(),
            batch_size: default_batch_size(),
            full_reload: default_full_reload(),
        }
    }
}

impl Default for RatesConfig {
    fn default() -> Self {
        RatesConfig {
            transactions_db: default_transactions_db(),
            output_csv: default_rates_csv(),
            api_base_url: default_api_base_url(),
            base_currency: default_base_currency(),
            workers: default_workers(),
            http_timeout_secs: default_http_timeout_secs(),
            archive_dir: None,
        }
    }
}

impl Config {
    /// Loads configuration from the given TOML file, then applies any
    /// STAGELOAD_* environment overrides.
    pub fn load(path: &Path) -> Result<Self> {
        let config_content = fs::read_to_string(path).map_err(|e| {
            EtlError::Config(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;

        let mut config: Config = toml::from_str(&config_content)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Builds a configuration from defaults and environment overrides alone,
    /// for running without a config file.
    pub fn from_env() -> Self {
        let mut config = Config::default();
        config.apply_env_overrides();
        config
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(url) = env::var("STAGELOAD_RATES_URL") {
            self.rates.api_base_url = url;
        }
        if let Ok(currency) = env::var("STAGELOAD_BASE_CURRENCY") {
            self.rates.base_currency = currency;
        }
        if let Ok(db) = env::var("STAGELOAD_TRANSACTIONS_DB") {
            self.rates.transactions_db = PathBuf::from(db);
        }
        if let Ok(db) = env::var("STAGELOAD_CATALOG_DB") {
            self.catalog.db_path = PathBuf::from(db);
        }
        if let Ok(url) = env::var("STAGELOAD_PUSHGATEWAY_URL") {
            self.pushgateway_url = Some(url);
        }
    }
}
