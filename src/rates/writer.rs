use crate::error::Result;
use crate::pipeline::Sink;
use crate::rates::transform::RateRow;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::info;

struct WriterState {
    writer: Option<csv::Writer<File>>,
    rows_written: u64,
}

/// CSV sink for the rates pipeline.
///
/// The header row is written once, lazily, when the first data row arrives.
/// A run that writes nothing leaves an empty file with no header.
pub struct RatesCsvWriter {
    path: PathBuf,
    state: Mutex<WriterState>,
}

impl RatesCsvWriter {
    pub fn new(path: &Path) -> Self {
        RatesCsvWriter {
            path: path.to_path_buf(),
            state: Mutex::new(WriterState {
                writer: None,
                rows_written: 0,
            }),
        }
    }
}

impl Sink for RatesCsvWriter {
    type Row = RateRow;

    fn begin(&self) -> Result<()> {
        // Truncate up front so a rerun never appends to stale output
        File::create(&self.path)?;
        let mut state = self.state.lock().unwrap();
        state.writer = None;
        state.rows_written = 0;
        Ok(())
    }

    fn write(&self, rows: Vec<RateRow>) -> Result<usize> {
        let mut state = self.state.lock().unwrap();
        let first_write = state.writer.is_none();
        if first_write {
            let file = OpenOptions::new().append(true).open(&self.path)?;
            state.writer = Some(csv::Writer::from_writer(file));
        }

        let writer = state.writer.as_mut().unwrap();
        let mut written = 0;
        for row in &rows {
            writer.serialize(row)?;
            written += 1;
        }
        writer.flush()?;
        if first_write {
            // Serializing the first row is what emits the header
            info!("CSV header written to {}", self.path.display());
        }

        state.rows_written += written as u64;
        Ok(written)
    }

    fn finish(&self) -> Result<u64> {
        let mut state = self.state.lock().unwrap();
        if let Some(writer) = state.writer.as_mut() {
            writer.flush()?;
        }
        Ok(state.rows_written)
    }
}
