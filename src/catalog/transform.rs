use crate::catalog::source::SourceRow;
use crate::error::{EtlError, Result};
use crate::pipeline::Transformer;
use chrono::{Datelike, NaiveDate};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;
use tracing::warn;

pub const KIND_MOVIE: &str = "Movie";
pub const KIND_SERIES: &str = "TV Show";

const COL_SHOW_ID: usize = 0;
const COL_KIND: usize = 1;
const COL_TITLE: usize = 2;
const COL_DIRECTOR: usize = 3;
const COL_CAST: usize = 4;
const COL_COUNTRY: usize = 5;
const COL_DATE_ADDED: usize = 6;
const COL_RELEASE_YEAR: usize = 7;
const COL_RATING: usize = 8;
const COL_DURATION: usize = 9;
const COL_LISTED_IN: usize = 10;
const COL_DESCRIPTION: usize = 11;

static FIRST_INT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d+)").unwrap());

/// Fully parsed catalog row ready for staging.
#[derive(Debug, Clone, PartialEq)]
pub struct ShowRecord {
    pub show_id: String,
    pub kind: String,
    pub title: String,
    pub date_added_day: Option<String>,
    pub date_added_year: Option<i32>,
    pub release_year: i32,
    pub rating: String,
    pub duration_min: Option<i32>,
    pub num_seasons: Option<i32>,
    pub description: String,
    pub directors: Vec<String>,
    pub cast_members: Vec<String>,
    pub countries: Vec<String>,
    pub genres: Vec<String>,
}

/// Parses raw catalog rows into [`ShowRecord`]s.
///
/// A row that cannot be parsed is logged and dropped; it never fails the run.
pub struct ShowTransformer;

impl Transformer for ShowTransformer {
    type Key = SourceRow;
    type Raw = SourceRow;
    type Row = ShowRecord;

    fn transform(&self, key: &SourceRow, raw: SourceRow) -> Vec<ShowRecord> {
        match parse_show(&raw) {
            Ok(record) => vec![record],
            Err(e) => {
                warn!("Dropping {}: {}", key, e);
                Vec::new()
            }
        }
    }
}

fn parse_show(row: &SourceRow) -> Result<ShowRecord> {
    let field = |i: usize| row.fields[i].trim();

    let show_id = field(COL_SHOW_ID).to_string();
    if show_id.is_empty() {
        return Err(EtlError::RowParse {
            line: row.line,
            reason: "empty show_id".to_string(),
        });
    }

    let kind = field(COL_KIND).to_string();
    let release_year: i32 = field(COL_RELEASE_YEAR).parse().map_err(|_| EtlError::RowParse {
        line: row.line,
        reason: format!("release_year '{}' is not a number", field(COL_RELEASE_YEAR)),
    })?;

    let (duration_min, num_seasons) = split_duration(&kind, field(COL_DURATION), row.line);
    let (date_added_day, date_added_year) = decompose_date(field(COL_DATE_ADDED), row.line);

    Ok(ShowRecord {
        show_id,
        kind,
        title: field(COL_TITLE).to_string(),
        date_added_day,
        date_added_year,
        release_year,
        rating: field(COL_RATING).to_string(),
        duration_min,
        num_seasons,
        description: field(COL_DESCRIPTION).to_string(),
        directors: split_names(field(COL_DIRECTOR)),
        cast_members: split_names(field(COL_CAST)),
        countries: split_names(field(COL_COUNTRY)),
        genres: split_names(field(COL_LISTED_IN)),
    })
}

/// Pulls the leading number out of strings like "90 min" or "3 Seasons" and
/// assigns it to minutes or seasons depending on the kind of title.
fn split_duration(kind: &str, duration: &str, line: u64) -> (Option<i32>, Option<i32>) {
    let value = first_int(duration);
    match kind {
        KIND_MOVIE => (value, None),
        KIND_SERIES => (None, value),
        other => {
            if !other.is_empty() {
                warn!("Row {} has unknown kind '{}', duration left empty", line, other);
            }
            (None, None)
        }
    }
}

fn first_int(text: &str) -> Option<i32> {
    FIRST_INT
        .captures(text)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Splits a `YYYY-MM-DD` date into the day-of-month string and year the
/// staging schema stores. Unparseable dates stay empty rather than failing
/// the row.
fn decompose_date(date: &str, line: u64) -> (Option<String>, Option<i32>) {
    if date.is_empty() {
        return (None, None);
    }
    match NaiveDate::parse_from_str(date, "%Y-%m-%d") {
        Ok(parsed) => (Some(parsed.format("%d").to_string()), Some(parsed.year())),
        Err(_) => {
            warn!("Row {} has unparseable date_added '{}'", line, date);
            (None, None)
        }
    }
}

/// Splits a comma separated name list, trimming entries and dropping blanks
/// and repeats while keeping first-seen order.
fn split_names(list: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut names = Vec::new();
    for name in list.split(',') {
        let name = name.trim();
        if name.is_empty() {
            continue;
        }
        if seen.insert(name.to_string()) {
            names.push(name.to_string());
        }
    }
    names
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(fields: &[&str]) -> SourceRow {
        SourceRow {
            line: 1,
            fields: fields.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn full_row() -> SourceRow {
        row(&[
            "s1",
            "Movie",
            "Inland Empire",
            "David Lynch",
            "Laura Dern, Jeremy Irons, Laura Dern",
            "United States",
            "2019-08-04",
            "2006",
            "R",
            "180 min",
            "Dramas, Thrillers",
            "A woman in trouble.",
        ])
    }

    fn transform_one(raw: SourceRow) -> Vec<ShowRecord> {
        let key = raw.clone();
        ShowTransformer.transform(&key, raw)
    }

    #[test]
    fn parses_a_movie_row() {
        let records = transform_one(full_row());
        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record.show_id, "s1");
        assert_eq!(record.kind, KIND_MOVIE);
        assert_eq!(record.duration_min, Some(180));
        assert_eq!(record.num_seasons, None);
        assert_eq!(record.release_year, 2006);
        assert_eq!(record.directors, vec!["David Lynch"]);
        assert_eq!(record.cast_members, vec!["Laura Dern", "Jeremy Irons"]);
        assert_eq!(record.genres, vec!["Dramas", "Thrillers"]);
    }

    #[test]
    fn series_duration_becomes_seasons() {
        let mut raw = full_row();
        raw.fields[COL_KIND] = "TV Show".to_string();
        raw.fields[COL_DURATION] = "3 Seasons".to_string();
        let record = &transform_one(raw)[0];
        assert_eq!(record.duration_min, None);
        assert_eq!(record.num_seasons, Some(3));
    }

    #[test]
    fn unknown_kind_gets_no_duration() {
        let mut raw = full_row();
        raw.fields[COL_KIND] = "Documentary".to_string();
        let record = &transform_one(raw)[0];
        assert_eq!(record.duration_min, None);
        assert_eq!(record.num_seasons, None);
    }

    #[test]
    fn date_splits_into_day_and_year() {
        let record = &transform_one(full_row())[0];
        assert_eq!(record.date_added_day.as_deref(), Some("04"));
        assert_eq!(record.date_added_year, Some(2019));
    }

    #[test]
    fn unparseable_date_stays_empty_but_row_survives() {
        let mut raw = full_row();
        raw.fields[COL_DATE_ADDED] = "August 4, 2019".to_string();
        let records = transform_one(raw);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].date_added_day, None);
        assert_eq!(records[0].date_added_year, None);
    }

    #[test]
    fn missing_show_id_drops_the_row() {
        let mut raw = full_row();
        raw.fields[COL_SHOW_ID] = "  ".to_string();
        assert!(transform_one(raw).is_empty());
    }

    #[test]
    fn bad_release_year_drops_the_row() {
        let mut raw = full_row();
        raw.fields[COL_RELEASE_YEAR] = "unknown".to_string();
        assert!(transform_one(raw).is_empty());
    }

    #[test]
    fn name_lists_are_trimmed_and_deduped() {
        assert_eq!(split_names(" a, b , a,,c "), vec!["a", "b", "c"]);
        assert!(split_names("   ").is_empty());
    }

    #[test]
    fn first_int_handles_missing_numbers() {
        assert_eq!(first_int("90 min"), Some(90));
        assert_eq!(first_int("Seasons"), None);
    }
}
