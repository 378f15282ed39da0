use crate::error::Result;
use crate::pipeline::RecordFetcher;
use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::Client;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{error, info, warn};

/// Fetches historical quotes for one date from the rates API.
///
/// Transport and decode failures are logged per date and reported as a miss
/// so the remaining dates still get their quotes.
pub struct RateFetcher {
    client: Client,
    base_url: String,
    base_currency: String,
    archive_dir: Option<PathBuf>,
}

impl RateFetcher {
    pub fn new(base_url: &str, base_currency: &str, timeout_secs: u64) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;
        Ok(RateFetcher {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            base_currency: base_currency.to_string(),
            archive_dir: None,
        })
    }

    /// Raw API payloads get archived here as one JSON file per date.
    pub fn with_archive_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.archive_dir = dir;
        self
    }

    fn rate_url(&self, date: &str) -> String {
        format!("{}/{}?from={}", self.base_url, date, self.base_currency)
    }

    async fn fetch_quote(&self, date: &str) -> Result<serde_json::Value> {
        let url = self.rate_url(date);
        let response = self.client.get(&url).send().await?.error_for_status()?;
        let payload = response.json().await?;
        Ok(payload)
    }

    fn archive(&self, date: &str, payload: &serde_json::Value) {
        let Some(dir) = &self.archive_dir else {
            return;
        };
        let path = dir.join(format!("exchange_rate_{}.json", date));
        let pretty = serde_json::to_string_pretty(payload).unwrap_or_default();
        let result = fs::create_dir_all(dir).and_then(|_| fs::write(&path, pretty));
        if let Err(e) = result {
            warn!("Failed to archive payload for {}: {}", date, e);
        }
    }
}

#[async_trait]
impl RecordFetcher for RateFetcher {
    type Key = String;
    type Raw = serde_json::Value;

    async fn fetch(&self, date: String) -> (String, Option<serde_json::Value>) {
        // A key that is not a real date would only waste an API call
        if NaiveDate::parse_from_str(&date, "%Y-%m-%d").is_err() {
            error!("Skipping '{}': not a YYYY-MM-DD date", date);
            return (date, None);
        }

        match self.fetch_quote(&date).await {
            Ok(payload) => {
                info!("Received API response for {}", date);
                self.archive(&date, &payload);
                (date, Some(payload))
            }
            Err(e) => {
                error!("Failed to fetch rates for {}: {}", date, e);
                (date, None)
            }
        }
    }
}
