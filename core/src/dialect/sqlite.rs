use super::{quote_with, unsupported, Dialect};
use crate::error::Result;
use crate::query::Statement;
use crate::types::{Value, ValueType};

/// SQLite syntax.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sqlite;

impl Dialect for Sqlite {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn quote(&self, identifier: &str) -> String {
        quote_with('"', identifier)
    }

    fn placeholder(&self, _position: usize) -> String {
        "?".to_string()
    }

    fn data_type(&self, value_type: ValueType, _size: u32, _precision: u32, _scale: u32) -> String {
        match value_type {
            ValueType::Bool => "BOOLEAN",
            ValueType::Int
            | ValueType::BigInt
            | ValueType::UnsignedInt
            | ValueType::UnsignedBigInt => "INTEGER",
            ValueType::Float => "REAL",
            ValueType::Text => "TEXT",
            ValueType::Timestamp => "DATETIME",
            ValueType::Bytes => "BLOB",
        }
        .to_string()
    }

    fn auto_increment_keyword(&self) -> &'static str {
        "INTEGER PRIMARY KEY AUTOINCREMENT"
    }

    fn auto_increment_definition(&self, _value_type: ValueType) -> String {
        self.auto_increment_keyword().to_string()
    }

    fn auto_increment_declares_key(&self) -> bool {
        true
    }

    /// SQLite needs a table rebuild to drop a column.
    fn drop_column_sql(&self, _table: &str, _column: &str) -> Result<String> {
        Err(unsupported(self, "DROP COLUMN; rebuild the table instead"))
    }

    fn create_index_sql(&self, table: &str, index: &str, columns: &[&str], unique: bool) -> String {
        format!(
            "CREATE {}INDEX IF NOT EXISTS {} ON {} ({})",
            if unique { "UNIQUE " } else { "" },
            self.quote(index),
            self.quote(table),
            self.quote_list(columns)
        )
    }

    fn drop_index_sql(&self, _table: &str, index: &str) -> String {
        format!("DROP INDEX IF EXISTS {}", self.quote(index))
    }

    fn truncate_table_sql(&self, table: &str) -> String {
        format!("DELETE FROM {}", self.quote(table))
    }

    fn current_database_sql(&self) -> &'static str {
        "PRAGMA database_list"
    }

    fn list_tables_sql(&self) -> &'static str {
        "SELECT name FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%'"
    }

    fn table_exists_sql(&self, table: &str) -> Statement {
        Statement::new(
            "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name = ?",
            vec![Value::Text(table.to_string())],
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[test]
    fn test_type_mapping() {
        let d = Sqlite;
        assert_eq!(d.data_type(ValueType::BigInt, 0, 0, 0), "INTEGER");
        assert_eq!(d.data_type(ValueType::Float, 0, 10, 2), "REAL");
        assert_eq!(d.data_type(ValueType::Text, 50, 0, 0), "TEXT");
        assert_eq!(d.data_type(ValueType::Timestamp, 0, 0, 0), "DATETIME");
    }

    #[test]
    fn test_drop_column_unsupported() {
        let err = Sqlite.drop_column_sql("users", "age").unwrap_err();
        assert!(matches!(err, Error::Unsupported { ref dialect, .. } if dialect == "sqlite"));
    }

    #[test]
    fn test_ddl() {
        let d = Sqlite;
        assert_eq!(d.truncate_table_sql("users"), "DELETE FROM \"users\"");
        assert_eq!(d.drop_index_sql("users", "idx"), "DROP INDEX IF EXISTS \"idx\"");
        assert_eq!(
            d.create_index_sql("users", "idx_users_a_b", &["a", "b"], false),
            "CREATE INDEX IF NOT EXISTS \"idx_users_a_b\" ON \"users\" (\"a\", \"b\")"
        );
    }
}
