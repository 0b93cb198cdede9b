//! Error types for record mapping, persistence and migrations.
//!
//! Every fallible operation in this crate returns [`Result`], whose error
//! side is the single [`Error`] enum. Storage backends wrap their own
//! failures in [`Error::Storage`].

use thiserror::Error;

use crate::validate::ValidationErrors;

/// Errors produced by sessions, relationships and the migration manager.
#[derive(Debug, Error)]
pub enum Error {
    /// The record type cannot be mapped onto a table.
    #[error("invalid model {model}: {reason}")]
    InvalidModel { model: String, reason: String },

    /// A lookup, update or delete matched no row.
    #[error("record not found in table {table}")]
    NotFound { table: String },

    /// The record's primary key is absent (null, zero or empty).
    #[error("record for table {table} has no primary key value")]
    MissingKey { table: String },

    /// A relationship kind outside the supported set.
    #[error("unsupported relationship type: {0}")]
    UnsupportedRelationship(String),

    /// One or more declaration problems, collected.
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationErrors),

    /// There is no applied migration to roll back.
    #[error("no applied migrations to roll back")]
    NoMigrations,

    /// A migration script or ledger update failed; the run was rolled back.
    #[error("migration {name} failed: {source}")]
    Migration {
        name: String,
        #[source]
        source: Box<Error>,
    },

    /// A field name the record does not expose.
    #[error("model {model} has no field {field}")]
    UnknownField { model: String, field: String },

    /// A value could not be converted to the requested type.
    #[error("cannot convert {found} to {expected}")]
    Conversion { expected: String, found: String },

    /// An operation was called with arguments it does not accept.
    #[error("usage error: {0}")]
    Usage(String),

    /// The active dialect cannot express the operation.
    #[error("{dialect} does not support {operation}")]
    Unsupported { dialect: String, operation: String },

    /// Failure reported by the storage backend.
    #[error("storage error: {0}")]
    Storage(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
    /// Wraps a backend error.
    pub fn storage(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Error::Storage(Box::new(err))
    }

    /// Returns `true` for [`Error::NotFound`].
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. })
    }

    pub(crate) fn conversion(expected: &str, found: impl Into<String>) -> Self {
        Error::Conversion {
            expected: expected.to_string(),
            found: found.into(),
        }
    }
}

/// Convenience alias for results with [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
