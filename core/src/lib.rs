//! Core mapping, query and migration types.
//!
//! This crate maps record types onto relational tables and runs their
//! persistence against any backend that implements [`Storage`]:
//!
//! - [`Model`] and [`extract`] derive a [`TableDescriptor`] from a record's
//!   declared [`Shape`] and field tags.
//! - [`Dialect`] captures backend syntax ([`Postgres`], [`MySql`],
//!   [`Sqlite`]); [`QueryBuilder`] renders parameterized statements with it.
//! - [`Session`] runs create, find, first, update, delete, all and count,
//!   and loads or links related records declared in [`Relations`].
//! - Nested calls ([`Session::create_nested`] and friends) cascade writes
//!   across relationships as one [`UnitOfWork`].
//! - [`MigrationManager`] applies and reverts versioned scripts tracked in
//!   a ledger table.
//! - [`TableSchema`] generates table and index DDL from descriptors.
//!
//! Connection handling lives outside this crate; `tabula-sqlite` provides a
//! SQLite storage.
//!
//! # Example
//!
//! ```
//! use tabula_core::*;
//!
//! let stmt = QueryBuilder::new(&Postgres, "users")
//!     .filter_eq("username", "jdoe")
//!     .order_by("id", Order::Desc)
//!     .limit(10)
//!     .build();
//!
//! assert_eq!(
//!     stmt.sql,
//!     "SELECT * FROM \"users\" WHERE \"username\" = $1 ORDER BY \"id\" DESC LIMIT 10"
//! );
//! assert_eq!(stmt.args, vec![Value::from("jdoe")]);
//! ```

mod dialect;
mod error;
mod metadata;
mod migration;
mod model;
mod nested;
mod preload;
mod query;
mod relation;
mod schema;
mod session;
mod storage;
mod transaction;
mod types;
mod validate;

pub use dialect::{dialect_for, Dialect, DialectKind, MySql, Postgres, Sqlite};
pub use error::{Error, Result};
pub use metadata::{
    extract, to_snake_case, FieldDecl, FieldDescriptor, Shape, TableDescriptor, TableOverride,
};
pub use migration::{
    Migration, MigrationManager, MigrationState, MigrationStatus, NewMigration, DEFAULT_LEDGER_TABLE,
};
pub use model::{apply_row, Entity, ManySlot, Model, OneSlot, RelationMut};
pub use nested::{
    DeletePolicy, NestedOptions, NestedPlan, SaveMode, Step, UnitOfWork, WorkAction, WorkItem,
};
pub use query::{Operation, Order, QueryBuilder, Statement};
pub use relation::{RelationKind, Relations, Relationship};
pub use schema::{ForeignKey, ForeignKeyAction, TableSchema};
pub use session::Session;
pub use storage::{ExecOutcome, Storage};
pub use transaction::{with_transaction, Transaction};
pub use types::{parse_timestamp, FromValue, Row, Value, ValueType};
pub use validate::{validate_identifier, ValidationError, ValidationErrors};
