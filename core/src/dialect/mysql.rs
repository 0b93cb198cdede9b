use super::{quote_with, Dialect};
use crate::query::Statement;
use crate::types::{Value, ValueType};

/// Longest VARCHAR emitted before falling back to TEXT.
const MAX_VARCHAR: u32 = 65_535;

/// MySQL syntax.
#[derive(Debug, Clone, Copy, Default)]
pub struct MySql;

impl Dialect for MySql {
    fn name(&self) -> &'static str {
        "mysql"
    }

    fn quote(&self, identifier: &str) -> String {
        quote_with('`', identifier)
    }

    fn placeholder(&self, _position: usize) -> String {
        "?".to_string()
    }

    fn data_type(&self, value_type: ValueType, size: u32, precision: u32, scale: u32) -> String {
        match value_type {
            ValueType::Bool => "TINYINT(1)".to_string(),
            ValueType::Int => "INT".to_string(),
            ValueType::BigInt => "BIGINT".to_string(),
            ValueType::UnsignedInt => "INT UNSIGNED".to_string(),
            ValueType::UnsignedBigInt => "BIGINT UNSIGNED".to_string(),
            ValueType::Float => match (precision, scale) {
                (0, _) => "DOUBLE".to_string(),
                (p, 0) => format!("DECIMAL({p})"),
                (p, s) => format!("DECIMAL({p},{s})"),
            },
            ValueType::Text if size > 0 && size <= MAX_VARCHAR => format!("VARCHAR({size})"),
            ValueType::Text => "TEXT".to_string(),
            ValueType::Timestamp => "DATETIME".to_string(),
            ValueType::Bytes => "BLOB".to_string(),
        }
    }

    fn auto_increment_keyword(&self) -> &'static str {
        "AUTO_INCREMENT"
    }

    fn auto_increment_definition(&self, value_type: ValueType) -> String {
        format!(
            "{} {}",
            self.data_type(value_type, 0, 0, 0),
            self.auto_increment_keyword()
        )
    }

    fn default_values_clause(&self) -> &'static str {
        "() VALUES ()"
    }

    fn create_table_sql(&self, table: &str, definitions: &[String]) -> String {
        format!(
            "CREATE TABLE IF NOT EXISTS {} (\n  {}\n) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4 COLLATE=utf8mb4_unicode_ci",
            self.quote(table),
            definitions.join(",\n  ")
        )
    }

    fn drop_index_sql(&self, table: &str, index: &str) -> String {
        format!("DROP INDEX {} ON {}", self.quote(index), self.quote(table))
    }

    fn rename_table_sql(&self, from: &str, to: &str) -> String {
        format!("RENAME TABLE {} TO {}", self.quote(from), self.quote(to))
    }

    fn current_database_sql(&self) -> &'static str {
        "SELECT DATABASE()"
    }

    fn list_tables_sql(&self) -> &'static str {
        "SHOW TABLES"
    }

    fn table_exists_sql(&self, table: &str) -> Statement {
        Statement::new(
            "SELECT COUNT(*) FROM information_schema.tables WHERE table_schema = DATABASE() AND table_name = ?",
            vec![Value::Text(table.to_string())],
        )
    }
}
