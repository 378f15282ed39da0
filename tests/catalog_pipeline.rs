use anyhow::Result;
use rusqlite::Connection;
use stageload::catalog;
use stageload::config::{CatalogConfig, Config};
use stageload::error::EtlError;
use std::fs;
use std::path::Path;

const CATALOG_CSV: &str = "\
show_id,type,title,director,cast,country,date_added,release_year,rating,duration,listed_in,description
s1,Movie,Inland Empire,David Lynch,\"Laura Dern, Justin Theroux\",United States,2019-08-14,2006,R,180 min,\"Dramas, Thrillers\",A woman in trouble.
s2,TV Show,Twin Peaks,David Lynch,\"Kyle MacLachlan, Laura Dern\",United States,2019-09-01,1990,TV-MA,3 Seasons,\"Dramas, Mysteries\",Who killed Laura Palmer?
s3,Movie,Too Short
s4,Movie,Bad Year,Someone,Someone Else,France,2020-01-01,unknown,PG,90 min,Comedies,Never loads.
s5,Movie,Eraserhead,David Lynch,Jack Nance,United States,not a date,1977,R,89 min,Horror,In heaven everything is fine.
";

fn test_config(dir: &Path) -> Config {
    let mut config = Config::default();
    config.catalog = CatalogConfig {
        csv_path: dir.join("shows.csv"),
        db_path: dir.join("catalog.db"),
        batch_size: 2,
        full_reload: true,
    };
    config
}

fn count(conn: &Connection, table: &str) -> i64 {
    conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |r| r.get(0))
        .unwrap()
}

#[tokio::test]
async fn catalog_load_stages_good_rows_and_skips_bad_ones() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let config = test_config(dir.path());
    fs::write(&config.catalog.csv_path, CATALOG_CSV)?;

    let summary = catalog::run(&config).await?;
    // The short row never becomes a key, the bad release year drops in the
    // transformer
    assert_eq!(summary.keys_found, 4);
    assert_eq!(summary.keys_without_rows, 1);
    assert_eq!(summary.rows_written, 3);

    let conn = Connection::open(&config.catalog.db_path)?;
    assert_eq!(count(&conn, "shows"), 3);
    assert_eq!(count(&conn, "directors"), 1);
    assert_eq!(count(&conn, "show_directors"), 3);
    assert_eq!(count(&conn, "cast_members"), 4);
    assert_eq!(count(&conn, "show_cast_members"), 5);
    assert_eq!(count(&conn, "countries"), 1);
    assert_eq!(count(&conn, "genres"), 4);

    // Movie and series durations land in different columns
    let (duration, seasons): (Option<i64>, Option<i64>) = conn.query_row(
        "SELECT duration_min, num_seasons FROM shows WHERE show_id = 's1'",
        [],
        |r| Ok((r.get(0)?, r.get(1)?)),
    )?;
    assert_eq!(duration, Some(180));
    assert_eq!(seasons, None);

    let (duration, seasons): (Option<i64>, Option<i64>) = conn.query_row(
        "SELECT duration_min, num_seasons FROM shows WHERE show_id = 's2'",
        [],
        |r| Ok((r.get(0)?, r.get(1)?)),
    )?;
    assert_eq!(duration, None);
    assert_eq!(seasons, Some(3));

    // Dates decompose into day and year, or stay empty when unparseable
    let (day, year): (Option<String>, Option<i64>) = conn.query_row(
        "SELECT date_added_day, date_added_year FROM shows WHERE show_id = 's1'",
        [],
        |r| Ok((r.get(0)?, r.get(1)?)),
    )?;
    assert_eq!(day.as_deref(), Some("14"));
    assert_eq!(year, Some(2019));

    let (day, year): (Option<String>, Option<i64>) = conn.query_row(
        "SELECT date_added_day, date_added_year FROM shows WHERE show_id = 's5'",
        [],
        |r| Ok((r.get(0)?, r.get(1)?)),
    )?;
    assert_eq!(day, None);
    assert_eq!(year, None);

    Ok(())
}

#[tokio::test]
async fn reloading_the_same_export_changes_nothing() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let config = test_config(dir.path());
    fs::write(&config.catalog.csv_path, CATALOG_CSV)?;

    catalog::run(&config).await?;
    let summary = catalog::run(&config).await?;
    assert_eq!(summary.rows_written, 3);

    let conn = Connection::open(&config.catalog.db_path)?;
    assert_eq!(count(&conn, "shows"), 3);
    assert_eq!(count(&conn, "directors"), 1);
    assert_eq!(count(&conn, "show_directors"), 3);
    assert_eq!(count(&conn, "show_cast_members"), 5);
    assert_eq!(count(&conn, "show_genres"), 5);
    Ok(())
}

#[tokio::test]
async fn header_only_export_is_a_hard_failure() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let config = test_config(dir.path());
    fs::write(
        &config.catalog.csv_path,
        "show_id,type,title,director,cast,country,date_added,release_year,rating,duration,listed_in,description\n",
    )?;

    let err = catalog::run(&config).await.unwrap_err();
    assert!(matches!(err, EtlError::NoKeys));
    Ok(())
}

#[tokio::test]
async fn export_with_only_bad_rows_is_a_hard_failure() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let config = test_config(dir.path());
    fs::write(
        &config.catalog.csv_path,
        "s1,Movie,Bad Year,D,A,US,2020-01-01,unknown,PG,90 min,Comedy,Desc\n",
    )?;

    let err = catalog::run(&config).await.unwrap_err();
    assert!(matches!(err, EtlError::NothingWritten));
    Ok(())
}
