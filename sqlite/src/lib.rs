//! SQLite storage backend for tabula sessions and migrations.
//!
//! [`SqliteStorage`] implements [`tabula_core::Storage`] on a single
//! `rusqlite` connection, so every core operation (record CRUD,
//! relationship loading, nested persistence and the migration ledger) runs
//! against SQLite through it.
//!
//! # Quick start
//!
//! ```no_run
//! use tabula_core::NewMigration;
//! use tabula_sqlite::SqliteStorage;
//!
//! let storage = SqliteStorage::open("app.db").unwrap();
//!
//! let manager = storage.migrations("migrations").unwrap();
//! manager
//!     .register(NewMigration::new(
//!         "20240101000000_create_users",
//!         "CREATE TABLE users (id INTEGER PRIMARY KEY AUTOINCREMENT, username TEXT NOT NULL)",
//!     ))
//!     .unwrap();
//! manager.migrate_up().unwrap();
//!
//! assert!(storage.session().table_exists("users").unwrap());
//! ```

mod convert;
mod error;
mod storage;

pub use error::{Result, SqliteError};
pub use storage::SqliteStorage;
