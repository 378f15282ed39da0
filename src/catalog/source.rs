use crate::error::Result;
use crate::pipeline::{KeySource, PipelineKey};
use csv::ReaderBuilder;
use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::{info, warn};

/// Number of columns a catalog row carries.
pub const SHOW_COLUMNS: usize = 12;

/// One raw CSV row plus the line it came from.
///
/// Carrying the line number keeps physically distinct rows distinct during
/// deduplication even when their contents repeat.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SourceRow {
    pub line: u64,
    pub fields: Vec<String>,
}

impl fmt::Display for SourceRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "row {}", self.line)
    }
}

impl PipelineKey for SourceRow {
    fn is_blank(&self) -> bool {
        self.fields.iter().all(|f| f.trim().is_empty())
    }
}

/// Reads catalog rows from a CSV export.
///
/// The export predates this loader and is not always well formed: rows can be
/// short, long, or carry 8-bit text that is not valid UTF-8. Short rows are
/// dropped, long rows are truncated, and non-UTF-8 bytes fall back to a
/// latin-1 reading so no row is lost to encoding alone.
///
/// Rows are materialized when the source is opened; each enumeration replays
/// the full set.
pub struct CsvShowSource {
    rows: Vec<SourceRow>,
}

impl CsvShowSource {
    pub fn open(path: &Path) -> Result<Self> {
        info!("Reading catalog rows from {}", path.display());
        let file = File::open(path)?;
        Self::read_from(file)
    }

    pub fn read_from<R: Read>(reader: R) -> Result<Self> {
        let mut csv_reader = ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(reader);

        let mut rows = Vec::new();
        for (idx, record) in csv_reader.byte_records().enumerate() {
            let record = record?;
            let line = idx as u64 + 1;
            let fields: Vec<String> = record.iter().map(decode_field).collect();

            if fields.iter().all(|f| f.trim().is_empty()) {
                continue;
            }
            // The export sometimes ships with its header row intact
            if idx == 0 && fields[0].to_lowercase().contains("show_id") {
                continue;
            }

            match fields.len() {
                n if n < SHOW_COLUMNS => {
                    warn!(
                        "Skipping row {}: expected {} columns, got {}",
                        line, SHOW_COLUMNS, n
                    );
                }
                n if n > SHOW_COLUMNS => {
                    warn!(
                        "Row {} has {} columns, keeping the first {}",
                        line, n, SHOW_COLUMNS
                    );
                    let mut fields = fields;
                    fields.truncate(SHOW_COLUMNS);
                    rows.push(SourceRow { line, fields });
                }
                _ => rows.push(SourceRow { line, fields }),
            }
        }

        info!("Loaded {} usable catalog rows", rows.len());
        Ok(CsvShowSource { rows })
    }
}

impl KeySource for CsvShowSource {
    type Key = SourceRow;

    fn for_each_key(&mut self, emit: &mut dyn FnMut(SourceRow)) -> Result<usize> {
        let mut count = 0;
        for row in &self.rows {
            emit(row.clone());
            count += 1;
        }
        Ok(count)
    }
}

fn decode_field(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(s) => s.to_string(),
        // Legacy exports carry latin-1 text; map each byte to its code point
        Err(_) => bytes.iter().map(|&b| b as char).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn collect(source: &mut CsvShowSource) -> Vec<SourceRow> {
        let mut keys = Vec::new();
        source.for_each_key(&mut |k| keys.push(k)).unwrap();
        keys
    }

    #[test]
    fn skips_header_and_short_rows() {
        let data = "\
show_id,type,title,director,cast,country,date_added,release_year,rating,duration,listed_in,description
s1,Movie,Title A,Dir,Actor,US,2019-08-14,2019,PG,90 min,Drama,Something
s2,Movie,Too Short
s3,TV Show,Title B,Dir,Actor,US,2020-01-01,2020,TV-MA,2 Seasons,Comedy,Else
";
        let mut source = CsvShowSource::read_from(Cursor::new(data.as_bytes().to_vec())).unwrap();
        let keys = collect(&mut source);
        assert_eq!(keys.len(), 2);
        assert_eq!(keys[0].fields[0], "s1");
        assert_eq!(keys[0].line, 2);
        assert_eq!(keys[1].fields[0], "s3");
    }

    #[test]
    fn truncates_long_rows() {
        let data = "s1,Movie,Title,D,A,US,2019-08-14,2019,PG,90 min,Drama,Desc,EXTRA,MORE\n";
        let mut source = CsvShowSource::read_from(Cursor::new(data.as_bytes().to_vec())).unwrap();
        let keys = collect(&mut source);
        assert_eq!(keys.len(), 1);
        assert_eq!(keys[0].fields.len(), SHOW_COLUMNS);
        assert_eq!(keys[0].fields.last().unwrap(), "Desc");
    }

    #[test]
    fn falls_back_to_latin1_for_non_utf8_bytes() {
        let mut data = b"s1,Movie,Caf".to_vec();
        data.push(0xE9);
        data.extend_from_slice(b",D,A,FR,2019-08-14,2019,PG,90 min,Drama,Desc\n");
        let mut source = CsvShowSource::read_from(Cursor::new(data)).unwrap();
        let keys = collect(&mut source);
        assert_eq!(keys[0].fields[2], "Café");
    }

    #[test]
    fn reinvoking_replays_the_same_rows() {
        let data = "s1,Movie,Title,D,A,US,2019-08-14,2019,PG,90 min,Drama,Desc\n";
        let mut source = CsvShowSource::read_from(Cursor::new(data.as_bytes().to_vec())).unwrap();
        let first = collect(&mut source);
        let second = collect(&mut source);
        assert_eq!(first, second);
        assert_eq!(second.len(), 1);
    }

    #[test]
    fn drops_fully_blank_rows() {
        let data = "s1,Movie,Title,D,A,US,2019-08-14,2019,PG,90 min,Drama,Desc\n,,,,,,,,,,,\n";
        let mut source = CsvShowSource::read_from(Cursor::new(data.as_bytes().to_vec())).unwrap();
        let keys = collect(&mut source);
        assert_eq!(keys.len(), 1);
    }

    #[test]
    fn duplicate_content_on_different_lines_stays_distinct() {
        let row = SourceRow {
            line: 3,
            fields: vec!["s1".to_string()],
        };
        let twin = SourceRow {
            line: 7,
            fields: vec!["s1".to_string()],
        };
        assert_ne!(row, twin);
        assert_eq!(format!("{}", row), "row 3");
    }
}
