//! Project configuration for the `tabula` tool.
//!
//! Defines the YAML-serializable configuration naming the backend, the
//! database location, the migration ledger table and the directory holding
//! migration scripts. Every key is optional; missing keys take their
//! defaults.
//!
//! # Example YAML
//!
//! ```yaml
//! dialect: sqlite
//! database: app.db
//! ledger_table: migrations
//! migrations_dir: migrations
//! log_level: info
//! ```

use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tabula_core::{validate_identifier, DialectKind, ValidationErrors};

use crate::error::{DbError, Result};

/// Default configuration file name, looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "tabula.yml";

const LOG_LEVELS: [&str; 6] = ["off", "error", "warn", "info", "debug", "trace"];

/// Top-level project configuration.
///
/// # Examples
///
/// ```
/// use tabula_db::TabulaConfig;
///
/// let config: TabulaConfig = serde_yaml::from_str("database: shop.db").unwrap();
/// assert_eq!(config.database, "shop.db");
/// assert_eq!(config.ledger_table, "migrations");
/// assert_eq!(config.dialect, "sqlite");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TabulaConfig {
    /// Backend dialect name (`sqlite`, `postgres`, `mysql`).
    pub dialect: String,
    /// Database location; a file path for SQLite.
    pub database: String,
    /// Name of the migration ledger table.
    pub ledger_table: String,
    /// Directory holding `<name>.up.sql` / `<name>.down.sql` scripts.
    pub migrations_dir: PathBuf,
    /// Default log filter when `RUST_LOG` is unset.
    pub log_level: String,
}

impl Default for TabulaConfig {
    fn default() -> Self {
        Self {
            dialect: DialectKind::Sqlite.to_string(),
            database: "tabula.db".to_string(),
            ledger_table: tabula_core::DEFAULT_LEDGER_TABLE.to_string(),
            migrations_dir: PathBuf::from("migrations"),
            log_level: "info".to_string(),
        }
    }
}

impl TabulaConfig {
    /// Loads configuration from a YAML file and validates it.
    ///
    /// # Errors
    ///
    /// Returns [`IoError`](DbError::IoError) if the file cannot be read,
    /// [`YamlError`](DbError::YamlError) if parsing fails, or
    /// [`InvalidConfig`](DbError::InvalidConfig) for bad values.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        let reader = BufReader::new(file);
        let config: Self = serde_yaml::from_reader(reader)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads `path` when it exists, otherwise returns the defaults.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Saves the configuration as YAML.
    ///
    /// # Errors
    ///
    /// Returns [`IoError`](DbError::IoError) if the file cannot be written,
    /// or [`YamlError`](DbError::YamlError) if serialization fails.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let file = std::fs::File::create(path)?;
        let writer = BufWriter::new(file);
        serde_yaml::to_writer(writer, self)?;
        Ok(())
    }

    /// The configured dialect.
    pub fn dialect_kind(&self) -> Result<DialectKind> {
        self.dialect
            .parse()
            .map_err(|_| DbError::InvalidConfig(format!("unknown dialect `{}`", self.dialect)))
    }

    /// Checks the dialect, ledger table name, database and log level.
    pub fn validate(&self) -> Result<()> {
        self.dialect_kind()?;
        if self.database.trim().is_empty() {
            return Err(DbError::InvalidConfig("database must not be empty".into()));
        }
        let errors = validate_identifier("ledger_table", &self.ledger_table);
        if !errors.is_empty() {
            return Err(DbError::InvalidConfig(ValidationErrors::from(errors).to_string()));
        }
        if !LOG_LEVELS.contains(&self.log_level.to_ascii_lowercase().as_str()) {
            return Err(DbError::InvalidConfig(format!(
                "unknown log level `{}`",
                self.log_level
            )));
        }
        Ok(())
    }
}
