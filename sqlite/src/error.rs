//! Error types for the SQLite backend.

use thiserror::Error;

/// Errors raised by the SQLite storage.
#[derive(Debug, Error)]
pub enum SqliteError {
    /// SQLite database operation failure.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// A column value could not be represented as a core value.
    #[error("conversion error: {0}")]
    Conversion(String),
}

/// Convenience alias for results with [`SqliteError`].
pub type Result<T> = std::result::Result<T, SqliteError>;

impl From<SqliteError> for tabula_core::Error {
    fn from(err: SqliteError) -> Self {
        tabula_core::Error::storage(err)
    }
}

/// Wraps a driver error for the core storage interface.
pub(crate) fn storage_error(err: rusqlite::Error) -> tabula_core::Error {
    SqliteError::from(err).into()
}
