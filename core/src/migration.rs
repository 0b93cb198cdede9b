//! Versioned schema scripts tracked in a ledger table.
//!
//! Each migration is either Pending (`applied_at` is NULL) or Applied. The
//! ledger row is the only record of that state and only
//! [`MigrationManager`] changes it. Runs are transactional:
//! [`migrate_up`](MigrationManager::migrate_up) applies every pending script
//! in one transaction and keeps none of them if any fails, and
//! [`migrate_down`](MigrationManager::migrate_down) reverts the latest
//! applied migration in its own transaction.
//!
//! The manager needs only a [`Storage`] and the dialect's quoting, type and
//! placeholder rules; it does not go through record descriptors.
//!
//! # Example
//!
//! ```no_run
//! # use tabula_core::{MigrationManager, NewMigration, Sqlite, Storage, Result};
//! # fn demo(storage: &dyn Storage) -> Result<()> {
//! let manager = MigrationManager::new(storage, &Sqlite, "migrations")?;
//! manager.register(
//!     NewMigration::new("20240101000000_create_users", "CREATE TABLE users (id INTEGER PRIMARY KEY)")
//!         .down("DROP TABLE users"),
//! )?;
//! let applied = manager.migrate_up()?;
//! assert_eq!(applied.len(), 1);
//! # Ok(())
//! # }
//! ```

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info};

use crate::dialect::Dialect;
use crate::error::{Error, Result};
use crate::storage::Storage;
use crate::transaction::with_transaction;
use crate::types::{Row, Value, ValueType};
use crate::validate::{validate_identifier, ValidationError, ValidationErrors};

/// Default ledger table name.
pub const DEFAULT_LEDGER_TABLE: &str = "migrations";

const COLUMNS: [&str; 7] = ["id", "name", "description", "up", "down", "created_at", "applied_at"];

/// Ledger state of a migration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MigrationState {
    Pending,
    Applied,
}

/// One ledger row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Migration {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub up: String,
    pub down: String,
    pub created_at: DateTime<Utc>,
    pub applied_at: Option<DateTime<Utc>>,
}

impl Migration {
    pub fn state(&self) -> MigrationState {
        if self.applied_at.is_some() {
            MigrationState::Applied
        } else {
            MigrationState::Pending
        }
    }

    pub fn is_applied(&self) -> bool {
        self.applied_at.is_some()
    }

    fn from_row(row: &Row) -> Result<Self> {
        Ok(Self {
            id: row.decode("id")?,
            name: row.decode("name")?,
            description: row.decode::<Option<String>>("description")?.unwrap_or_default(),
            up: row.decode("up")?,
            down: row.decode::<Option<String>>("down")?.unwrap_or_default(),
            created_at: row.decode("created_at")?,
            applied_at: row.decode("applied_at")?,
        })
    }
}

/// A migration to add to the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NewMigration {
    pub name: String,
    pub description: String,
    pub up: String,
    pub down: String,
}

impl NewMigration {
    pub fn new(name: impl Into<String>, up: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            up: up.into(),
            ..Self::default()
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn down(mut self, down: impl Into<String>) -> Self {
        self.down = down.into();
        self
    }

    fn validate(&self) -> Result<()> {
        let mut errors = ValidationErrors::default();
        if self.name.trim().is_empty() {
            errors.push(ValidationError::new("name", "is required"));
        }
        if self.up.trim().is_empty() {
            errors.push(ValidationError::new("up", "is required"));
        }
        errors.into_result()
    }
}

/// Ledger summary.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MigrationStatus {
    pub applied: usize,
    pub pending: usize,
    pub migrations: Vec<Migration>,
}

/// Applies and reverts migrations recorded in a ledger table.
pub struct MigrationManager<'s> {
    storage: &'s dyn Storage,
    dialect: &'s dyn Dialect,
    table: String,
}

impl<'s> MigrationManager<'s> {
    /// Creates a manager over the ledger `table`.
    ///
    /// # Errors
    ///
    /// [`Error::Validation`] when `table` is not a plain identifier
    /// (letters, digits and `_`).
    pub fn new(storage: &'s dyn Storage, dialect: &'s dyn Dialect, table: &str) -> Result<Self> {
        ValidationErrors::from(validate_identifier("table", table)).into_result()?;
        Ok(Self {
            storage,
            dialect,
            table: table.to_string(),
        })
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Creates the ledger table if it does not exist.
    pub fn ensure_ledger(&self) -> Result<()> {
        let d = self.dialect;
        let mut id = format!(
            "{} {}",
            d.quote("id"),
            d.auto_increment_definition(ValueType::BigInt)
        );
        if !d.auto_increment_declares_key() {
            id.push_str(" PRIMARY KEY");
        }
        let definitions = vec![
            id,
            format!("{} {} NOT NULL UNIQUE", d.quote("name"), d.data_type(ValueType::Text, 255, 0, 0)),
            format!("{} {}", d.quote("description"), d.data_type(ValueType::Text, 0, 0, 0)),
            format!("{} {} NOT NULL", d.quote("up"), d.data_type(ValueType::Text, 0, 0, 0)),
            format!("{} {}", d.quote("down"), d.data_type(ValueType::Text, 0, 0, 0)),
            format!(
                "{} {} NOT NULL DEFAULT CURRENT_TIMESTAMP",
                d.quote("created_at"),
                d.data_type(ValueType::Timestamp, 0, 0, 0)
            ),
            format!("{} {}", d.quote("applied_at"), d.data_type(ValueType::Timestamp, 0, 0, 0)),
        ];
        let sql = d.create_table_sql(&self.table, &definitions);
        debug!(table = %self.table, "ensuring migration ledger");
        self.storage.execute(&sql, &[])?;
        Ok(())
    }

    /// Adds a migration, or refreshes the scripts of a pending one with the
    /// same name.
    ///
    /// # Errors
    ///
    /// [`Error::Validation`] when the name or up script is empty, or when
    /// an applied migration of that name has different scripts.
    pub fn register(&self, migration: NewMigration) -> Result<Migration> {
        migration.validate()?;
        self.ensure_ledger()?;

        match self.find_by_name(&migration.name)? {
            Some(existing) if existing.is_applied() => {
                if existing.up != migration.up || existing.down != migration.down {
                    return Err(ValidationErrors::from(vec![ValidationError::new(
                        "up",
                        format!("migration {} is already applied and its scripts changed", existing.name),
                    )])
                    .into());
                }
                Ok(existing)
            }
            Some(existing) => {
                let sql = format!(
                    "UPDATE {} SET {} = {}, {} = {}, {} = {} WHERE {} = {}",
                    self.quoted_table(),
                    self.q("description"),
                    self.p(1),
                    self.q("up"),
                    self.p(2),
                    self.q("down"),
                    self.p(3),
                    self.q("id"),
                    self.p(4)
                );
                self.storage.execute(
                    &sql,
                    &[
                        Value::from(migration.description),
                        Value::from(migration.up),
                        Value::from(migration.down),
                        Value::Int(existing.id),
                    ],
                )?;
                debug!(migration = %existing.name, "refreshed pending migration");
                self.require_by_name(&existing.name)
            }
            None => {
                let sql = format!(
                    "INSERT INTO {} ({}, {}, {}, {}, {}) VALUES ({}, {}, {}, {}, {})",
                    self.quoted_table(),
                    self.q("name"),
                    self.q("description"),
                    self.q("up"),
                    self.q("down"),
                    self.q("created_at"),
                    self.p(1),
                    self.p(2),
                    self.p(3),
                    self.p(4),
                    self.p(5)
                );
                let name = migration.name.clone();
                self.storage.execute(
                    &sql,
                    &[
                        Value::from(migration.name),
                        Value::from(migration.description),
                        Value::from(migration.up),
                        Value::from(migration.down),
                        Value::Timestamp(Utc::now()),
                    ],
                )?;
                info!(migration = %name, "registered migration");
                self.require_by_name(&name)
            }
        }
    }

    /// Every ledger row in id order.
    pub fn migrations(&self) -> Result<Vec<Migration>> {
        self.select("", "ASC")
    }

    /// Pending migrations in id order.
    pub fn pending(&self) -> Result<Vec<Migration>> {
        let clause = format!(" WHERE {} IS NULL", self.q("applied_at"));
        self.select(&clause, "ASC")
    }

    /// Applied migrations, most recent first.
    pub fn applied(&self) -> Result<Vec<Migration>> {
        let clause = format!(" WHERE {} IS NOT NULL", self.q("applied_at"));
        self.select(&clause, "DESC")
    }

    /// Counts and per-migration state.
    pub fn status(&self) -> Result<MigrationStatus> {
        self.ensure_ledger()?;
        let migrations = self.migrations()?;
        let applied = migrations.iter().filter(|m| m.is_applied()).count();
        Ok(MigrationStatus {
            applied,
            pending: migrations.len() - applied,
            migrations,
        })
    }

    /// Applies every pending migration in one transaction.
    ///
    /// Returns the names applied by this run; an empty list when nothing was
    /// pending. Already applied migrations are not touched.
    ///
    /// # Errors
    ///
    /// [`Error::Migration`] naming the migration whose script or ledger
    /// update failed. The transaction is rolled back, so none of this run's
    /// migrations stay applied.
    pub fn migrate_up(&self) -> Result<Vec<String>> {
        self.ensure_ledger()?;
        let pending = self.pending()?;
        if pending.is_empty() {
            info!("no pending migrations");
            return Ok(Vec::new());
        }

        let mark = format!(
            "UPDATE {} SET {} = {} WHERE {} = {}",
            self.quoted_table(),
            self.q("applied_at"),
            self.p(1),
            self.q("id"),
            self.p(2)
        );

        let applied = with_transaction(self.storage, |storage| {
            let mut names = Vec::with_capacity(pending.len());
            for migration in &pending {
                let failed = |source: Error| Error::Migration {
                    name: migration.name.clone(),
                    source: Box::new(source),
                };
                storage.execute_script(&migration.up).map_err(failed)?;
                storage
                    .execute(&mark, &[Value::Timestamp(Utc::now()), Value::Int(migration.id)])
                    .map_err(failed)?;
                debug!(migration = %migration.name, "up script executed");
                names.push(migration.name.clone());
            }
            Ok(names)
        })?;

        for name in &applied {
            info!(migration = %name, "applied migration");
        }
        Ok(applied)
    }

    /// Reverts the most recently applied migration.
    ///
    /// # Errors
    ///
    /// [`Error::NoMigrations`] when nothing is applied, and
    /// [`Error::Migration`] when the down script or ledger update fails; the
    /// migration then stays applied.
    pub fn migrate_down(&self) -> Result<Migration> {
        self.ensure_ledger()?;
        let clause = format!(" WHERE {} IS NOT NULL", self.q("applied_at"));
        let mut latest = self
            .select_limit(&clause, "DESC", 1)?
            .into_iter()
            .next()
            .ok_or(Error::NoMigrations)?;

        let unmark = format!(
            "UPDATE {} SET {} = NULL WHERE {} = {}",
            self.quoted_table(),
            self.q("applied_at"),
            self.q("id"),
            self.p(1)
        );

        with_transaction(self.storage, |storage| {
            let failed = |source: Error| Error::Migration {
                name: latest.name.clone(),
                source: Box::new(source),
            };
            if !latest.down.trim().is_empty() {
                storage.execute_script(&latest.down).map_err(failed)?;
            }
            storage.execute(&unmark, &[Value::Int(latest.id)]).map_err(failed)?;
            Ok(())
        })?;

        info!(migration = %latest.name, "reverted migration");
        latest.applied_at = None;
        Ok(latest)
    }

    /// Reverts up to `steps` migrations, newest first, each in its own
    /// transaction.
    ///
    /// # Errors
    ///
    /// [`Error::NoMigrations`] when fewer than `steps` migrations are
    /// applied; the ones reverted before that stay reverted.
    pub fn rollback(&self, steps: usize) -> Result<Vec<Migration>> {
        let mut reverted = Vec::with_capacity(steps);
        for _ in 0..steps {
            reverted.push(self.migrate_down()?);
        }
        Ok(reverted)
    }

    fn find_by_name(&self, name: &str) -> Result<Option<Migration>> {
        let sql = format!(
            "SELECT {} FROM {} WHERE {} = {}",
            self.column_list(),
            self.quoted_table(),
            self.q("name"),
            self.p(1)
        );
        let rows = self.storage.query(&sql, &[Value::from(name)])?;
        rows.first().map(Migration::from_row).transpose()
    }

    fn require_by_name(&self, name: &str) -> Result<Migration> {
        self.find_by_name(name)?.ok_or_else(|| Error::NotFound {
            table: self.table.clone(),
        })
    }

    fn select(&self, clause: &str, order: &str) -> Result<Vec<Migration>> {
        self.select_limit(clause, order, 0)
    }

    fn select_limit(&self, clause: &str, order: &str, limit: u64) -> Result<Vec<Migration>> {
        let mut sql = format!(
            "SELECT {} FROM {}{clause} ORDER BY {} {order}",
            self.column_list(),
            self.quoted_table(),
            self.q("id")
        );
        if limit > 0 {
            sql.push_str(&format!(" LIMIT {limit}"));
        }
        self.storage
            .query(&sql, &[])?
            .iter()
            .map(Migration::from_row)
            .collect()
    }

    fn column_list(&self) -> String {
        self.dialect.quote_list(&COLUMNS)
    }

    fn quoted_table(&self) -> String {
        self.dialect.quote(&self.table)
    }

    fn q(&self, column: &str) -> String {
        self.dialect.quote(column)
    }

    fn p(&self, position: usize) -> String {
        self.dialect.placeholder(position)
    }
}
