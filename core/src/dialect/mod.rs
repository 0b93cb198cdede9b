//! SQL dialects.
//!
//! A [`Dialect`] captures everything that differs between backends:
//! identifier quoting, positional placeholders, column type mapping and the
//! text of DDL statements. Three implementations are provided:
//!
//! - [`Postgres`]: `"ident"`, `$N` placeholders, `SERIAL`, `RETURNING`
//! - [`MySql`]: `` `ident` ``, `?` placeholders, `AUTO_INCREMENT`
//! - [`Sqlite`]: `"ident"`, `?` placeholders, `INTEGER PRIMARY KEY AUTOINCREMENT`
//!
//! The dialect is chosen once, usually from configuration through
//! [`DialectKind`], and passed by reference to sessions and builders.
//!
//! # Example
//!
//! ```
//! use tabula_core::{dialect_for, DialectKind};
//!
//! let kind: DialectKind = "postgres".parse().unwrap();
//! let dialect = dialect_for(kind);
//! assert_eq!(dialect.quote("users"), "\"users\"");
//! assert_eq!(dialect.placeholder(2), "$2");
//! ```

mod mysql;
mod postgres;
mod sqlite;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::query::Statement;
use crate::types::ValueType;

pub use mysql::MySql;
pub use postgres::Postgres;
pub use sqlite::Sqlite;

/// Backend-specific SQL syntax.
pub trait Dialect: Send + Sync + fmt::Debug {
    fn name(&self) -> &'static str;

    /// Quotes an identifier, doubling embedded quote characters.
    fn quote(&self, identifier: &str) -> String;

    /// Placeholder for the 1-based argument `position`.
    fn placeholder(&self, position: usize) -> String;

    /// Column type for a logical type and its size parameters.
    fn data_type(&self, value_type: ValueType, size: u32, precision: u32, scale: u32) -> String;

    fn auto_increment_keyword(&self) -> &'static str;

    /// Type and keyword for an auto-generated key column of `value_type`.
    fn auto_increment_definition(&self, value_type: ValueType) -> String;

    /// Whether [`auto_increment_definition`](Self::auto_increment_definition)
    /// already declares the column as primary key.
    fn auto_increment_declares_key(&self) -> bool {
        false
    }

    fn supports_returning(&self) -> bool {
        false
    }

    /// Tail of an INSERT that supplies no columns.
    fn default_values_clause(&self) -> &'static str {
        "DEFAULT VALUES"
    }

    /// `CREATE TABLE IF NOT EXISTS` from prepared column and constraint definitions.
    fn create_table_sql(&self, table: &str, definitions: &[String]) -> String {
        format!(
            "CREATE TABLE IF NOT EXISTS {} (\n  {}\n)",
            self.quote(table),
            definitions.join(",\n  ")
        )
    }

    fn add_column_sql(&self, table: &str, column_definition: &str) -> String {
        format!("ALTER TABLE {} ADD COLUMN {column_definition}", self.quote(table))
    }

    /// # Errors
    ///
    /// [`Error::Unsupported`] for backends without `DROP COLUMN`.
    fn drop_column_sql(&self, table: &str, column: &str) -> Result<String> {
        Ok(format!(
            "ALTER TABLE {} DROP COLUMN {}",
            self.quote(table),
            self.quote(column)
        ))
    }

    fn create_index_sql(&self, table: &str, index: &str, columns: &[&str], unique: bool) -> String {
        format!(
            "CREATE {}INDEX {} ON {} ({})",
            if unique { "UNIQUE " } else { "" },
            self.quote(index),
            self.quote(table),
            self.quote_list(columns)
        )
    }

    fn drop_index_sql(&self, table: &str, index: &str) -> String;

    fn truncate_table_sql(&self, table: &str) -> String {
        format!("TRUNCATE TABLE {}", self.quote(table))
    }

    fn drop_table_sql(&self, table: &str) -> String {
        format!("DROP TABLE IF EXISTS {}", self.quote(table))
    }

    fn rename_table_sql(&self, from: &str, to: &str) -> String {
        format!("ALTER TABLE {} RENAME TO {}", self.quote(from), self.quote(to))
    }

    fn current_database_sql(&self) -> &'static str;

    /// Query returning one table name per row in the first column.
    fn list_tables_sql(&self) -> &'static str;

    /// Query whose single value is truthy when `table` exists.
    fn table_exists_sql(&self, table: &str) -> Statement;

    /// Quotes and comma-joins a column list.
    fn quote_list(&self, columns: &[&str]) -> String {
        columns
            .iter()
            .map(|c| self.quote(c))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Wraps `identifier` in `quote`, doubling any embedded occurrence.
pub(crate) fn quote_with(quote: char, identifier: &str) -> String {
    let doubled = format!("{quote}{quote}");
    format!("{quote}{}{quote}", identifier.replace(quote, &doubled))
}

pub(crate) fn unsupported(dialect: &dyn Dialect, operation: &str) -> Error {
    Error::Unsupported {
        dialect: dialect.name().to_string(),
        operation: operation.to_string(),
    }
}

/// Supported backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DialectKind {
    Postgres,
    Mysql,
    #[default]
    Sqlite,
}

impl DialectKind {
    pub fn as_str(self) -> &'static str {
        match self {
            DialectKind::Postgres => "postgres",
            DialectKind::Mysql => "mysql",
            DialectKind::Sqlite => "sqlite",
        }
    }
}

impl fmt::Display for DialectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DialectKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(DialectKind::Postgres),
            "mysql" => Ok(DialectKind::Mysql),
            "sqlite" | "sqlite3" => Ok(DialectKind::Sqlite),
            other => Err(Error::Usage(format!("unknown dialect: {other}"))),
        }
    }
}

/// Returns the dialect implementation for `kind`.
pub fn dialect_for(kind: DialectKind) -> &'static dyn Dialect {
    match kind {
        DialectKind::Postgres => &Postgres,
        DialectKind::Mysql => &MySql,
        DialectKind::Sqlite => &Sqlite,
    }
}
