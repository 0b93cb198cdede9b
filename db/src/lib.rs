//! Project configuration and on-disk migration scripts for tabula.
//!
//! This crate loads the YAML project configuration used by the `tabula`
//! tool and reads migration scripts from a directory so they can be
//! registered with a [`tabula_core::MigrationManager`] ledger.
//!
//! # Quick start
//!
//! ```no_run
//! use chrono::Utc;
//! use tabula_db::{scaffold, MigrationSource, TabulaConfig};
//!
//! let config = TabulaConfig::load_or_default("tabula.yml").unwrap();
//!
//! // Write an empty script pair, then read the whole directory back
//! scaffold(&config.migrations_dir, "create users", Utc::now()).unwrap();
//! let source = MigrationSource::from_dir(&config.migrations_dir).unwrap();
//! println!("{} migrations on disk", source.len());
//! ```

mod config;
mod error;
mod source;

pub use config::{TabulaConfig, DEFAULT_CONFIG_FILE};
pub use error::{DbError, Result};
pub use source::{scaffold, slugify, MigrationSource};
