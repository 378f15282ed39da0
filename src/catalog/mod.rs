//! Staging load for the show catalog: CSV export in, relational SQLite out.

pub mod source;
pub mod store;
pub mod transform;

use crate::config::Config;
use crate::error::Result;
use crate::pipeline::{IdentityFetcher, Pipeline, RunSummary};
use source::CsvShowSource;
use store::CatalogStore;
use transform::ShowTransformer;

/// Runs the catalog pipeline with the configured paths.
///
/// Rows come straight out of the CSV, so the fetch stage is the identity and
/// keys are processed sequentially in file order.
pub async fn run(config: &Config) -> Result<RunSummary> {
    let source = CsvShowSource::open(&config.catalog.csv_path)?;
    let store = CatalogStore::open(
        &config.catalog.db_path,
        config.catalog.batch_size,
        config.catalog.full_reload,
    )?;

    Pipeline::new(
        "catalog",
        source,
        IdentityFetcher::new(),
        ShowTransformer,
        store,
    )
    .with_pushgateway(config.pushgateway_url.clone())
    .run()
    .await
}
