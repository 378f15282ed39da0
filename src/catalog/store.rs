use crate::catalog::transform::ShowRecord;
use crate::error::Result;
use crate::pipeline::Sink;
use rusqlite::{params, Connection, OptionalExtension};
use std::cell::Cell;
use std::path::Path;
use tracing::{error, info};

/// Staging schema for the catalog. Lookup names are unique, link tables use
/// composite keys, and links disappear with the rows they reference.
const SCHEMA_DDL: &str = "
CREATE TABLE IF NOT EXISTS shows (
    show_id TEXT PRIMARY KEY,
    kind TEXT NOT NULL,
    title TEXT NOT NULL,
    date_added_day TEXT,
    date_added_year INTEGER,
    release_year INTEGER NOT NULL,
    rating TEXT,
    duration_min INTEGER,
    num_seasons INTEGER,
    description TEXT
);

CREATE TABLE IF NOT EXISTS directors (
    director_id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS cast_members (
    cast_member_id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS countries (
    country_id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS genres (
    genre_id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS show_directors (
    show_id TEXT NOT NULL REFERENCES shows(show_id) ON DELETE CASCADE,
    director_id INTEGER NOT NULL REFERENCES directors(director_id) ON DELETE CASCADE,
    PRIMARY KEY (show_id, director_id)
);

CREATE TABLE IF NOT EXISTS show_cast_members (
    show_id TEXT NOT NULL REFERENCES shows(show_id) ON DELETE CASCADE,
    cast_member_id INTEGER NOT NULL REFERENCES cast_members(cast_member_id) ON DELETE CASCADE,
    PRIMARY KEY (show_id, cast_member_id)
);

CREATE TABLE IF NOT EXISTS show_countries (
    show_id TEXT NOT NULL REFERENCES shows(show_id) ON DELETE CASCADE,
    country_id INTEGER NOT NULL REFERENCES countries(country_id) ON DELETE CASCADE,
    PRIMARY KEY (show_id, country_id)
);

CREATE TABLE IF NOT EXISTS show_genres (
    show_id TEXT NOT NULL REFERENCES shows(show_id) ON DELETE CASCADE,
    genre_id INTEGER NOT NULL REFERENCES genres(genre_id) ON DELETE CASCADE,
    PRIMARY KEY (show_id, genre_id)
);
";

/// The four lookup vocabularies a catalog row links into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Director,
    CastMember,
    Country,
    Genre,
}

impl EntityKind {
    pub const ALL: [EntityKind; 4] = [
        EntityKind::Director,
        EntityKind::CastMember,
        EntityKind::Country,
        EntityKind::Genre,
    ];

    pub fn table(self) -> &'static str {
        match self {
            EntityKind::Director => "directors",
            EntityKind::CastMember => "cast_members",
            EntityKind::Country => "countries",
            EntityKind::Genre => "genres",
        }
    }

    pub fn id_column(self) -> &'static str {
        match self {
            EntityKind::Director => "director_id",
            EntityKind::CastMember => "cast_member_id",
            EntityKind::Country => "country_id",
            EntityKind::Genre => "genre_id",
        }
    }

    pub fn link_table(self) -> &'static str {
        match self {
            EntityKind::Director => "show_directors",
            EntityKind::CastMember => "show_cast_members",
            EntityKind::Country => "show_countries",
            EntityKind::Genre => "show_genres",
        }
    }
}

fn names_for(record: &ShowRecord, kind: EntityKind) -> &[String] {
    match kind {
        EntityKind::Director => &record.directors,
        EntityKind::CastMember => &record.cast_members,
        EntityKind::Country => &record.countries,
        EntityKind::Genre => &record.genres,
    }
}

/// SQLite sink for the catalog pipeline.
///
/// Writes run inside explicit transactions committed every `batch_size` keys.
/// Each record gets its own savepoint so a failing record is rolled back
/// alone and the rest of the batch survives.
pub struct CatalogStore {
    conn: Connection,
    batch_size: usize,
    full_reload: bool,
    keys_done: Cell<usize>,
    rows_written: Cell<u64>,
    in_tx: Cell<bool>,
}

impl CatalogStore {
    pub fn open(path: &Path, batch_size: usize, full_reload: bool) -> Result<Self> {
        let conn = Connection::open(path)?;
        Self::with_connection(conn, batch_size, full_reload)
    }

    /// Wraps an existing connection, applying pragmas and creating the
    /// staging schema if needed.
    pub fn with_connection(conn: Connection, batch_size: usize, full_reload: bool) -> Result<Self> {
        let _ = conn.pragma_update(None, "journal_mode", "WAL");
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.execute_batch(SCHEMA_DDL)?;
        Ok(CatalogStore {
            conn,
            batch_size: batch_size.max(1),
            full_reload,
            keys_done: Cell::new(0),
            rows_written: Cell::new(0),
            in_tx: Cell::new(false),
        })
    }

    /// Returns the id for `name` in the given lookup table, inserting it
    /// first if missing. A concurrent insert of the same name is absorbed by
    /// re-reading after the unique constraint fires.
    pub fn resolve_or_create(&self, kind: EntityKind, name: &str) -> Result<i64> {
        let select = format!(
            "SELECT {} FROM {} WHERE name = ?1",
            kind.id_column(),
            kind.table()
        );
        if let Some(id) = self
            .conn
            .query_row(&select, params![name], |row| row.get(0))
            .optional()?
        {
            return Ok(id);
        }

        let insert = format!("INSERT INTO {} (name) VALUES (?1)", kind.table());
        match self.conn.execute(&insert, params![name]) {
            Ok(_) => Ok(self.conn.last_insert_rowid()),
            // Someone else created the row between our select and insert
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                self.conn
                    .query_row(&select, params![name], |row| row.get(0))
                    .map_err(Into::into)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn upsert_show(&self, record: &ShowRecord) -> Result<()> {
        self.conn.execute(
            "INSERT INTO shows (show_id, kind, title, date_added_day, date_added_year, \
             release_year, rating, duration_min, num_seasons, description) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10) \
             ON CONFLICT(show_id) DO UPDATE SET \
                kind = excluded.kind, \
                title = excluded.title, \
                date_added_day = excluded.date_added_day, \
                date_added_year = excluded.date_added_year, \
                release_year = excluded.release_year, \
                rating = excluded.rating, \
                duration_min = excluded.duration_min, \
                num_seasons = excluded.num_seasons, \
                description = excluded.description",
            params![
                record.show_id,
                record.kind,
                record.title,
                record.date_added_day,
                record.date_added_year,
                record.release_year,
                record.rating,
                record.duration_min,
                record.num_seasons,
                record.description,
            ],
        )?;
        Ok(())
    }

    fn link(&self, kind: EntityKind, show_id: &str, entity_id: i64) -> Result<()> {
        let sql = format!(
            "INSERT OR IGNORE INTO {} (show_id, {}) VALUES (?1, ?2)",
            kind.link_table(),
            kind.id_column()
        );
        self.conn.execute(&sql, params![show_id, entity_id])?;
        Ok(())
    }

    fn stage_record(&self, record: &ShowRecord) -> Result<()> {
        self.upsert_show(record)?;
        for kind in EntityKind::ALL {
            for name in names_for(record, kind) {
                let id = self.resolve_or_create(kind, name)?;
                self.link(kind, &record.show_id, id)?;
            }
        }
        Ok(())
    }
}

impl Sink for CatalogStore {
    type Row = ShowRecord;

    fn begin(&self) -> Result<()> {
        if self.full_reload {
            // Re-runs replace link rows wholesale so removed associations
            // do not linger
            for kind in EntityKind::ALL {
                let cleared = self
                    .conn
                    .execute(&format!("DELETE FROM {}", kind.link_table()), [])?;
                if cleared > 0 {
                    info!("Cleared {} rows from {}", cleared, kind.link_table());
                }
            }
        }
        self.conn.execute_batch("BEGIN")?;
        self.in_tx.set(true);
        self.keys_done.set(0);
        self.rows_written.set(0);
        Ok(())
    }

    fn write(&self, rows: Vec<ShowRecord>) -> Result<usize> {
        let mut written = 0;
        for record in rows {
            self.conn.execute_batch("SAVEPOINT show_row")?;
            match self.stage_record(&record) {
                Ok(()) => {
                    self.conn.execute_batch("RELEASE show_row")?;
                    written += 1;
                }
                Err(e) => {
                    // Undo this record only, the rest of the batch stands
                    self.conn
                        .execute_batch("ROLLBACK TO show_row; RELEASE show_row")?;
                    error!("Failed to stage show '{}': {}", record.show_id, e);
                }
            }
        }
        self.rows_written.set(self.rows_written.get() + written as u64);

        let done = self.keys_done.get() + 1;
        self.keys_done.set(done);
        if done % self.batch_size == 0 {
            self.conn.execute_batch("COMMIT; BEGIN")?;
            info!("Processed and committed {} keys", done);
        }
        Ok(written)
    }

    fn finish(&self) -> Result<u64> {
        if self.in_tx.get() {
            self.conn.execute_batch("COMMIT")?;
            self.in_tx.set(false);
        }
        Ok(self.rows_written.get())
    }
}
