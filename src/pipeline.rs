use crate::error::{EtlError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use metrics::{counter, histogram};
use serde::Serialize;
use std::collections::HashSet;
use std::fmt::Display;
use std::hash::Hash;
use std::marker::PhantomData;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

/// A key identifying one unit of work in a pipeline run.
pub trait PipelineKey: Clone + Eq + Hash + Send + Display + 'static {
    /// Canonical form used for deduplication.
    fn normalized(self) -> Self {
        self
    }

    /// Blank keys are dropped before fetching.
    fn is_blank(&self) -> bool;
}

impl PipelineKey for String {
    fn normalized(self) -> Self {
        self.trim().to_string()
    }

    fn is_blank(&self) -> bool {
        self.trim().is_empty()
    }
}

/// Produces the keys that drive a run.
pub trait KeySource {
    type Key: PipelineKey;

    /// Calls `emit` once per key in source order and returns how many keys
    /// were emitted, before normalization and deduplication.
    fn for_each_key(&mut self, emit: &mut dyn FnMut(Self::Key)) -> Result<usize>;
}

/// Resolves a key to its raw record.
///
/// Fetchers isolate failures: a key that cannot be resolved comes back as
/// `None` after logging, so one bad key never aborts the run.
#[async_trait]
pub trait RecordFetcher: Send + Sync {
    type Key: PipelineKey;
    type Raw: Send;

    async fn fetch(&self, key: Self::Key) -> (Self::Key, Option<Self::Raw>);
}

/// Turns one raw record into zero or more sink rows. No I/O happens here.
pub trait Transformer: Send + Sync {
    type Key: PipelineKey;
    type Raw: Send;
    type Row: Send;

    fn transform(&self, key: &Self::Key, raw: Self::Raw) -> Vec<Self::Row>;
}

/// Destination for transformed rows.
///
/// `begin` prepares the destination, `write` is called once per key with that
/// key's rows, and `finish` flushes and returns the total rows written.
pub trait Sink: Send {
    type Row: Send;

    fn begin(&self) -> Result<()>;
    fn write(&self, rows: Vec<Self::Row>) -> Result<usize>;
    fn finish(&self) -> Result<u64>;
}

/// Fetcher for sources whose keys already carry the record, such as rows read
/// straight out of a file.
pub struct IdentityFetcher<K> {
    _marker: PhantomData<K>,
}

impl<K> IdentityFetcher<K> {
    pub fn new() -> Self {
        IdentityFetcher {
            _marker: PhantomData,
        }
    }
}

impl<K> Default for IdentityFetcher<K> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<K: PipelineKey + Sync> RecordFetcher for IdentityFetcher<K> {
    type Key = K;
    type Raw = K;

    async fn fetch(&self, key: K) -> (K, Option<K>) {
        (key.clone(), Some(key))
    }
}

/// Result of a complete pipeline run
#[derive(Debug, Serialize)]
pub struct RunSummary {
    pub run_id: String,
    pub pipeline: String,
    pub started_at: DateTime<Utc>,
    pub keys_found: usize,
    pub fetch_failures: usize,
    pub keys_without_rows: usize,
    pub sink_errors: usize,
    pub rows_written: u64,
    pub duration_secs: f64,
}

/// Generic staging-load pipeline: keys from a source, records fetched with
/// bounded concurrency, rows transformed and written as each fetch completes.
pub struct Pipeline<S, F, T, W>
where
    S: KeySource,
    F: RecordFetcher<Key = S::Key>,
    T: Transformer<Key = S::Key, Raw = F::Raw>,
    W: Sink<Row = T::Row>,
{
    label: &'static str,
    source: S,
    fetcher: F,
    transformer: T,
    sink: W,
    workers: usize,
    pushgateway_url: Option<String>,
}

impl<S, F, T, W> Pipeline<S, F, T, W>
where
    S: KeySource,
    F: RecordFetcher<Key = S::Key>,
    T: Transformer<Key = S::Key, Raw = F::Raw>,
    W: Sink<Row = T::Row>,
{
    pub fn new(label: &'static str, source: S, fetcher: F, transformer: T, sink: W) -> Self {
        Pipeline {
            label,
            source,
            fetcher,
            transformer,
            sink,
            workers: 1,
            pushgateway_url: None,
        }
    }

    /// Sets the maximum number of in-flight fetches. One worker means keys
    /// are processed strictly in source order.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_pushgateway(mut self, url: Option<String>) -> Self {
        self.pushgateway_url = url;
        self
    }

    /// Runs the pipeline to completion.
    ///
    /// Fails only when the key source is empty, when the sink cannot be
    /// opened or finalized, or when every key ends up contributing nothing.
    #[instrument(skip(self), fields(pipeline = %self.label))]
    pub async fn run(mut self) -> Result<RunSummary> {
        let run_id = Uuid::new_v4().to_string();
        let started_at = Utc::now();
        info!("🚀 Starting {} pipeline (run {})", self.label, run_id);
        println!("🚀 Starting {} pipeline", self.label);
        counter!("stageload_runs_total", "pipeline" => self.label).increment(1);
        let t_run = std::time::Instant::now();

        self.sink.begin()?;

        // Step 1: collect keys, dropping blanks and duplicates
        let mut keys: Vec<S::Key> = Vec::new();
        let mut seen = HashSet::new();
        let emitted = self.source.for_each_key(&mut |key| {
            let key = key.normalized();
            if key.is_blank() {
                return;
            }
            if seen.insert(key.clone()) {
                keys.push(key);
            }
        })?;
        debug!(
            "Key source emitted {} keys, {} unique after filtering",
            emitted,
            keys.len()
        );

        if keys.is_empty() {
            error!("No keys found for {} pipeline, nothing to do", self.label);
            return Err(EtlError::NoKeys);
        }
        let keys_found = keys.len();
        info!("📋 Collected {} keys", keys_found);
        println!("📋 Collected {} keys", keys_found);

        // Step 2: fetch with bounded concurrency, draining in completion order
        let mut fetch_failures = 0usize;
        let mut keys_without_rows = 0usize;
        let mut sink_errors = 0usize;

        let workers = self.workers.max(1);
        let fetcher = &self.fetcher;
        let mut results =
            stream::iter(keys.into_iter().map(|key| fetcher.fetch(key))).buffer_unordered(workers);

        while let Some((key, raw)) = results.next().await {
            let Some(raw) = raw else {
                fetch_failures += 1;
                counter!("stageload_fetch_failures_total", "pipeline" => self.label).increment(1);
                continue;
            };

            let rows = self.transformer.transform(&key, raw);
            if rows.is_empty() {
                keys_without_rows += 1;
                counter!("stageload_keys_without_rows_total", "pipeline" => self.label)
                    .increment(1);
                warn!(
                    "No rows produced for key {} even after a successful fetch",
                    key
                );
                continue;
            }

            match self.sink.write(rows) {
                Ok(written) => {
                    debug!("Wrote {} rows for key {}", written, key);
                }
                Err(e) => {
                    sink_errors += 1;
                    counter!("stageload_sink_errors_total", "pipeline" => self.label).increment(1);
                    error!("Failed to write rows for key {}: {}", key, e);
                }
            }
        }
        drop(results);

        // Step 3: finalize the sink and settle the run outcome
        let rows_written = self.sink.finish()?;
        let duration_secs = t_run.elapsed().as_secs_f64();
        histogram!("stageload_pipeline_duration_seconds", "pipeline" => self.label)
            .record(duration_secs);
        counter!("stageload_rows_written_total", "pipeline" => self.label).increment(rows_written);

        info!(
            "✅ {} pipeline finished: {} rows written from {} keys ({} fetch failures, {} without rows, {} sink errors)",
            self.label, rows_written, keys_found, fetch_failures, keys_without_rows, sink_errors
        );
        println!(
            "✅ {} rows written from {} keys ({} fetch failures, {} sink errors)",
            rows_written, keys_found, fetch_failures, sink_errors
        );

        let summary = RunSummary {
            run_id,
            pipeline: self.label.to_string(),
            started_at,
            keys_found,
            fetch_failures,
            keys_without_rows,
            sink_errors,
            rows_written,
            duration_secs,
        };

        self.push_run_snapshot(&summary).await;

        if summary.rows_written == 0 {
            error!(
                "Keys were found for {} pipeline but no rows were written",
                self.label
            );
            return Err(EtlError::NothingWritten);
        }

        Ok(summary)
    }

    /// Push a minimal metrics snapshot to Pushgateway if configured
    async fn push_run_snapshot(&self, summary: &RunSummary) {
        let base = match &self.pushgateway_url {
            Some(v) if !v.trim().is_empty() => v.clone(),
            _ => return,
        };
        let push_url = format!(
            "{}/metrics/job/{}/instance/{}",
            base.trim_end_matches('/'),
            "stageload",
            self.label
        );

        // Current timestamp for freshness tracking
        let timestamp_secs = Utc::now().timestamp() as f64;

        let body = format!(
            "# TYPE stageload_runs_total counter\n\
             stageload_runs_total 1\n\
             # TYPE stageload_keys_found gauge\n\
             stageload_keys_found {}\n\
             # TYPE stageload_rows_written_total counter\n\
             stageload_rows_written_total {}\n\
             # TYPE stageload_fetch_failures_total counter\n\
             stageload_fetch_failures_total {}\n\
             # TYPE stageload_sink_errors_total counter\n\
             stageload_sink_errors_total {}\n\
             # TYPE stageload_pipeline_duration_seconds gauge\n\
             stageload_pipeline_duration_seconds {}\n\
             # TYPE stageload_last_run_timestamp_seconds gauge\n\
             stageload_last_run_timestamp_seconds {}\n",
            summary.keys_found,
            summary.rows_written,
            summary.fetch_failures,
            summary.sink_errors,
            summary.duration_secs,
            timestamp_secs
        );

        let client = reqwest::Client::new();
        let push_res = client
            .post(&push_url)
            .header("Content-Type", "text/plain; version=0.0.4")
            .body(body)
            .send()
            .await;

        match push_res {
            Ok(r) if r.status().is_success() => {
                info!("Pushed metrics to Pushgateway for pipeline={}", self.label);
            }
            Ok(r) => {
                warn!(
                    "Pushgateway push responded with status {} for pipeline={}",
                    r.status().as_u16(),
                    self.label
                );
            }
            Err(e) => {
                warn!(
                    "Failed to push metrics to Pushgateway for pipeline={}: {}",
                    self.label, e
                );
            }
        }
    }
}
