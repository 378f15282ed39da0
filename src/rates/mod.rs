//! Exchange-rate staging: transaction dates in, quoted rates CSV out.

pub mod client;
pub mod source;
pub mod transform;
pub mod writer;

use crate::config::Config;
use crate::error::Result;
use crate::pipeline::{Pipeline, RunSummary};
use client::RateFetcher;
use source::TransactionDateSource;
use transform::RateTransformer;
use writer::RatesCsvWriter;

/// Runs the rates pipeline with the configured endpoints and paths.
pub async fn run(config: &Config) -> Result<RunSummary> {
    let rates = &config.rates;
    let source = TransactionDateSource::open(&rates.transactions_db)?;
    let fetcher = RateFetcher::new(
        &rates.api_base_url,
        &rates.base_currency,
        rates.http_timeout_secs,
    )?
    .with_archive_dir(rates.archive_dir.clone());
    let writer = RatesCsvWriter::new(&rates.output_csv);

    Pipeline::new("rates", source, fetcher, RateTransformer, writer)
        .with_workers(rates.workers)
        .with_pushgateway(config.pushgateway_url.clone())
        .run()
        .await
}
