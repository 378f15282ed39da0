use crate::error::Result;
use crate::pipeline::KeySource;
use rusqlite::{Connection, OpenFlags};
use std::path::Path;
use tracing::info;

/// Distinct transaction dates needing a quote, oldest first.
const DATES_SQL: &str = "\
    SELECT DISTINCT strftime('%Y-%m-%d', transaction_date) AS txn_date \
    FROM financial_transactions \
    WHERE transaction_date IS NOT NULL \
    ORDER BY txn_date";

/// Pulls the set of dates needing exchange rates out of the transactions
/// database. The database is only ever read.
pub struct TransactionDateSource {
    conn: Connection,
}

impl TransactionDateSource {
    pub fn open(path: &Path) -> Result<Self> {
        info!("Reading transaction dates from {}", path.display());
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        Ok(TransactionDateSource { conn })
    }

    pub fn from_connection(conn: Connection) -> Self {
        TransactionDateSource { conn }
    }
}

impl KeySource for TransactionDateSource {
    type Key = String;

    fn for_each_key(&mut self, emit: &mut dyn FnMut(String)) -> Result<usize> {
        let mut stmt = self.conn.prepare(DATES_SQL)?;
        let mut rows = stmt.query([])?;
        let mut count = 0;
        while let Some(row) = rows.next()? {
            // strftime returns NULL for values it cannot read as a date
            let date: Option<String> = row.get(0)?;
            if let Some(date) = date {
                emit(date);
                count += 1;
            }
        }
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE financial_transactions (
                transaction_id INTEGER PRIMARY KEY,
                transaction_date TEXT,
                amount REAL
            );",
        )
        .unwrap();
        conn
    }

    #[test]
    fn emits_distinct_dates_in_order() {
        let conn = empty_db();
        conn.execute_batch(
            "INSERT INTO financial_transactions (transaction_date, amount) VALUES
                ('2023-01-02', 10.0),
                ('2023-01-01', 5.0),
                ('2023-01-02', 7.5),
                ('2023-01-03 09:15:00', 3.0),
                (NULL, 1.0);",
        )
        .unwrap();
        let mut source = TransactionDateSource::from_connection(conn);
        let mut dates = Vec::new();
        source.for_each_key(&mut |d| dates.push(d)).unwrap();
        assert_eq!(dates, vec!["2023-01-01", "2023-01-02", "2023-01-03"]);
    }

    #[test]
    fn empty_table_emits_nothing() {
        let mut source = TransactionDateSource::from_connection(empty_db());
        let mut dates = Vec::new();
        let emitted = source.for_each_key(&mut |d| dates.push(d)).unwrap();
        assert_eq!(emitted, 0);
        assert!(dates.is_empty());
    }
}
