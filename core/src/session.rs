//! Record CRUD against a storage backend.
//!
//! A [`Session`] pairs a [`Storage`] with the active [`Dialect`]. Each call
//! derives the record's table descriptor, builds the statement through
//! [`QueryBuilder`] and maps result rows back onto the record by column
//! name.
//!
//! # Example
//!
//! ```no_run
//! # use tabula_core::{Session, Storage, Sqlite, Model, Result};
//! # fn demo<M: Model>(storage: &dyn Storage, mut record: M) -> Result<()> {
//! let session = Session::new(storage, &Sqlite);
//! session.create(&mut record)?;
//! session.update(&mut record)?;
//! session.delete(&record)?;
//! # Ok(())
//! # }
//! ```

use tracing::debug;

use crate::dialect::Dialect;
use crate::error::{Error, Result};
use crate::metadata::{FieldDescriptor, TableDescriptor};
use crate::model::{apply_row, Entity, Model};
use crate::query::{QueryBuilder, Statement};
use crate::storage::{ExecOutcome, Storage};
use crate::transaction::with_transaction;
use crate::types::{Row, Value};

/// Executes record operations through one storage and dialect.
#[derive(Clone, Copy)]
pub struct Session<'a> {
    storage: &'a dyn Storage,
    dialect: &'a dyn Dialect,
}

impl<'a> Session<'a> {
    pub fn new(storage: &'a dyn Storage, dialect: &'a dyn Dialect) -> Self {
        Self { storage, dialect }
    }

    pub fn storage(&self) -> &'a dyn Storage {
        self.storage
    }

    pub fn dialect(&self) -> &'a dyn Dialect {
        self.dialect
    }

    /// Starts a builder bound to this session's dialect.
    pub fn builder(&self, table: impl Into<String>) -> QueryBuilder<'a> {
        QueryBuilder::new(self.dialect, table)
    }

    /// Inserts `record`.
    ///
    /// Auto-generated primary keys are left out of the INSERT; the key the
    /// storage reports for the new row is written back into the record.
    pub fn create(&self, record: &mut dyn Entity) -> Result<()> {
        let table = record.describe()?;
        let mut builder = self.builder(&table.name).insert();
        for field in &table.fields {
            if field.is_key && field.is_auto {
                continue;
            }
            builder = builder.set(&field.column, field_value(record, &table, field)?);
        }

        let outcome = self.execute(&builder.build())?;

        if let Some(key) = table.fields.iter().find(|f| f.is_key && f.is_auto) {
            if let Some(id) = outcome.last_insert_id {
                record.assign(&key.name, Value::Int(id))?;
            }
        }
        Ok(())
    }

    /// Loads the row whose primary key equals `key` into `record`.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] when no row matches.
    pub fn find(&self, record: &mut dyn Entity, key: impl Into<Value>) -> Result<()> {
        let table = record.describe()?;
        let stmt = self
            .builder(&table.name)
            .filter_eq(&table.primary_key, key)
            .build();
        self.load_one(record, &table, &stmt)
    }

    /// Loads the first row matching `predicate` into `record`. An empty
    /// predicate matches any row.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] when no row matches.
    pub fn first(&self, record: &mut dyn Entity, predicate: &str, args: &[Value]) -> Result<()> {
        let table = record.describe()?;
        let mut builder = self.builder(&table.name);
        if !predicate.is_empty() {
            builder = builder.filter(predicate, args.iter().cloned());
        }
        let stmt = builder.limit(1).build();
        self.load_one(record, &table, &stmt)
    }

    /// Writes every non-key field of `record` to its row.
    ///
    /// # Errors
    ///
    /// [`Error::MissingKey`] when the key is absent and [`Error::NotFound`]
    /// when no row was updated.
    pub fn update(&self, record: &mut dyn Entity) -> Result<()> {
        let table = record.describe()?;
        let key = key_value(record, &table)?;

        let mut builder = self.builder(&table.name).update();
        for field in table.fields.iter().filter(|f| !f.is_key) {
            builder = builder.set(&field.column, field_value(record, &table, field)?);
        }
        let stmt = builder.filter_eq(&table.primary_key, key).build();

        if self.execute(&stmt)?.rows_affected == 0 {
            return Err(Error::NotFound { table: table.name });
        }
        Ok(())
    }

    /// Deletes the row of `record`.
    ///
    /// # Errors
    ///
    /// [`Error::MissingKey`] when the key is absent and [`Error::NotFound`]
    /// when no row was deleted.
    pub fn delete(&self, record: &dyn Entity) -> Result<()> {
        let table = record.describe()?;
        let key = key_value(record, &table)?;
        let stmt = self
            .builder(&table.name)
            .delete()
            .filter_eq(&table.primary_key, key)
            .build();

        if self.execute(&stmt)?.rows_affected == 0 {
            return Err(Error::NotFound { table: table.name });
        }
        Ok(())
    }

    /// Appends every row matching `predicate` to `dest`, in row order. An
    /// empty predicate selects all rows.
    pub fn all<M: Model>(&self, dest: &mut Vec<M>, predicate: &str, args: &[Value]) -> Result<()> {
        let table = M::descriptor()?;
        let mut builder = self.builder(&table.name);
        if !predicate.is_empty() {
            builder = builder.filter(predicate, args.iter().cloned());
        }
        for row in self.query(&builder.build())? {
            let mut record = M::default();
            apply_row(&mut record, &table, &row)?;
            dest.push(record);
        }
        Ok(())
    }

    /// Counts rows of `M` matching `predicate`.
    pub fn count<M: Model>(&self, predicate: &str, args: &[Value]) -> Result<u64> {
        let table = M::descriptor()?;
        let mut builder = self.builder(&table.name).select_raw(["COUNT(*)"]);
        if !predicate.is_empty() {
            builder = builder.filter(predicate, args.iter().cloned());
        }
        let stmt = builder.build();
        let rows = self.query(&stmt)?;
        rows.first()
            .and_then(|row| row.value(0).cloned())
            .unwrap_or(Value::Int(0))
            .decode()
    }

    /// Runs `body` in one transaction with a session bound to it.
    ///
    /// Commits when `body` returns `Ok`; rolls back on `Err` or panic.
    pub fn transaction<T, F>(&self, body: F) -> Result<T>
    where
        F: FnOnce(&Session<'a>) -> Result<T>,
    {
        let dialect = self.dialect;
        with_transaction(self.storage, |storage| body(&Session::new(storage, dialect)))
    }

    /// Names of the tables in the current database.
    pub fn list_tables(&self) -> Result<Vec<String>> {
        let stmt = Statement::new(self.dialect.list_tables_sql(), Vec::new());
        self.query(&stmt)?
            .into_iter()
            .filter_map(|row| row.value(0).cloned())
            .map(Value::decode)
            .collect()
    }

    /// Whether `table` exists.
    pub fn table_exists(&self, table: &str) -> Result<bool> {
        let stmt = self.dialect.table_exists_sql(table);
        let rows = self.query(&stmt)?;
        match rows.first().and_then(|row| row.value(0).cloned()) {
            Some(value) => value.decode::<bool>(),
            None => Ok(false),
        }
    }

    /// Executes a statement, logging it first.
    pub fn execute(&self, stmt: &Statement) -> Result<ExecOutcome> {
        debug!(sql = %stmt.sql, args = ?stmt.args, "execute");
        self.storage.execute(&stmt.sql, &stmt.args)
    }

    /// Runs a query, logging it first.
    pub fn query(&self, stmt: &Statement) -> Result<Vec<Row>> {
        debug!(sql = %stmt.sql, args = ?stmt.args, "query");
        self.storage.query(&stmt.sql, &stmt.args)
    }

    fn load_one(&self, record: &mut dyn Entity, table: &TableDescriptor, stmt: &Statement) -> Result<()> {
        let rows = self.query(stmt)?;
        let row = rows.first().ok_or_else(|| Error::NotFound {
            table: table.name.clone(),
        })?;
        apply_row(record, table, row)
    }
}

/// Reads a mapped field, failing if the record does not expose it.
pub(crate) fn field_value(
    record: &dyn Entity,
    table: &TableDescriptor,
    field: &FieldDescriptor,
) -> Result<Value> {
    record.value_of(&field.name).ok_or_else(|| Error::UnknownField {
        model: table.name.clone(),
        field: field.name.clone(),
    })
}

/// The record's primary key value.
///
/// # Errors
///
/// [`Error::MissingKey`] when the record has no key field or the value is
/// absent (null, zero or empty text).
pub(crate) fn key_value(record: &dyn Entity, table: &TableDescriptor) -> Result<Value> {
    let missing = || Error::MissingKey {
        table: table.name.clone(),
    };
    let field = table
        .key_field()
        .or_else(|| table.field_by_column(&table.primary_key))
        .ok_or_else(missing)?;
    match record.value_of(&field.name) {
        Some(value) if !value.is_absent() => Ok(value),
        _ => Err(missing()),
    }
}
