//! Error types for configuration and migration sources.
//!
//! Covers file I/O, YAML parsing, invalid configuration values, malformed
//! migration directories and failures surfaced by the core ledger.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while loading configuration or migration scripts.
#[derive(Debug, Error)]
pub enum DbError {
    /// File I/O failure.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// YAML parsing or serialization failure.
    #[error("YAML error: {0}")]
    YamlError(#[from] serde_yaml::Error),

    /// A configuration value is out of range or unknown.
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    /// A migration file or name does not follow the naming rules.
    #[error("invalid migration: {0}")]
    InvalidMigration(String),

    /// Scaffolding would overwrite an existing script.
    #[error("migration file already exists: {}", .0.display())]
    AlreadyExists(PathBuf),

    /// Failure reported by the core ledger.
    #[error(transparent)]
    Core(#[from] tabula_core::Error),
}

/// Convenience alias for results with [`DbError`].
pub type Result<T> = std::result::Result<T, DbError>;
