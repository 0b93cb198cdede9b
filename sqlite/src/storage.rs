//! [`Storage`] over a single SQLite connection.

use std::path::Path;

use rusqlite::{params_from_iter, Connection};
use tabula_core::{
    ExecOutcome, MigrationManager, Result as CoreResult, Row, Session, Sqlite, Storage, Value,
};
use tracing::debug;

use crate::convert::{from_sql, to_sql};
use crate::error::{storage_error, Result};

/// SQLite-backed storage.
///
/// Foreign key enforcement is switched on for every connection the storage
/// wraps.
///
/// # Examples
///
/// ```no_run
/// use tabula_sqlite::SqliteStorage;
///
/// let storage = SqliteStorage::open("app.db").unwrap();
/// let session = storage.session();
/// let tables = session.list_tables().unwrap();
/// println!("{} tables", tables.len());
/// ```
pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    /// Opens (or creates) a database file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        debug!(path = %path.display(), "opening sqlite database");
        Self::from_connection(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    /// Wraps an existing connection.
    pub fn from_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Ok(Self { conn })
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn into_connection(self) -> Connection {
        self.conn
    }

    /// A session using the SQLite dialect.
    pub fn session(&self) -> Session<'_> {
        Session::new(self, &Sqlite)
    }

    /// A migration manager over the ledger `table`.
    pub fn migrations(&self, table: &str) -> CoreResult<MigrationManager<'_>> {
        MigrationManager::new(self, &Sqlite, table)
    }
}

fn is_insert(sql: &str) -> bool {
    sql.trim_start()
        .get(..6)
        .is_some_and(|head| head.eq_ignore_ascii_case("INSERT"))
}

impl Storage for SqliteStorage {
    fn execute(&self, sql: &str, args: &[Value]) -> CoreResult<ExecOutcome> {
        let mut stmt = self.conn.prepare_cached(sql).map_err(storage_error)?;
        let changed = stmt
            .execute(params_from_iter(args.iter().map(to_sql)))
            .map_err(storage_error)?;

        let last_insert_id = (is_insert(sql) && changed > 0).then(|| self.conn.last_insert_rowid());
        Ok(ExecOutcome {
            rows_affected: changed as u64,
            last_insert_id,
        })
    }

    fn query(&self, sql: &str, args: &[Value]) -> CoreResult<Vec<Row>> {
        let mut stmt = self.conn.prepare_cached(sql).map_err(storage_error)?;
        let columns: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();

        let mut rows = stmt
            .query(params_from_iter(args.iter().map(to_sql)))
            .map_err(storage_error)?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().map_err(storage_error)? {
            let mut values = Vec::with_capacity(columns.len());
            for i in 0..columns.len() {
                values.push(from_sql(row.get_ref(i).map_err(storage_error)?)?);
            }
            out.push(Row::new(columns.clone(), values));
        }
        Ok(out)
    }

    fn execute_script(&self, sql: &str) -> CoreResult<()> {
        self.conn.execute_batch(sql).map_err(storage_error)
    }

    fn begin(&self) -> CoreResult<()> {
        self.conn.execute_batch("BEGIN").map_err(storage_error)
    }

    fn commit(&self) -> CoreResult<()> {
        self.conn.execute_batch("COMMIT").map_err(storage_error)
    }

    fn rollback(&self) -> CoreResult<()> {
        self.conn.execute_batch("ROLLBACK").map_err(storage_error)
    }

    fn in_transaction(&self) -> bool {
        !self.conn.is_autocommit()
    }
}
