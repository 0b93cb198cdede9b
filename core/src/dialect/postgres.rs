use super::{quote_with, Dialect};
use crate::query::Statement;
use crate::types::{Value, ValueType};

/// PostgreSQL syntax.
#[derive(Debug, Clone, Copy, Default)]
pub struct Postgres;

impl Dialect for Postgres {
    fn name(&self) -> &'static str {
        "postgres"
    }

    fn quote(&self, identifier: &str) -> String {
        quote_with('"', identifier)
    }

    fn placeholder(&self, position: usize) -> String {
        format!("${position}")
    }

    fn data_type(&self, value_type: ValueType, size: u32, precision: u32, scale: u32) -> String {
        match value_type {
            ValueType::Bool => "BOOLEAN".to_string(),
            ValueType::Int | ValueType::UnsignedInt => "INTEGER".to_string(),
            ValueType::BigInt | ValueType::UnsignedBigInt => "BIGINT".to_string(),
            ValueType::Float => match (precision, scale) {
                (0, _) => "DOUBLE PRECISION".to_string(),
                (p, 0) => format!("NUMERIC({p})"),
                (p, s) => format!("NUMERIC({p},{s})"),
            },
            ValueType::Text if size > 0 => format!("VARCHAR({size})"),
            ValueType::Text => "TEXT".to_string(),
            ValueType::Timestamp => "TIMESTAMP WITH TIME ZONE".to_string(),
            ValueType::Bytes => "BYTEA".to_string(),
        }
    }

    fn auto_increment_keyword(&self) -> &'static str {
        "SERIAL"
    }

    fn auto_increment_definition(&self, value_type: ValueType) -> String {
        match value_type {
            ValueType::BigInt | ValueType::UnsignedBigInt => "BIGSERIAL".to_string(),
            _ => self.auto_increment_keyword().to_string(),
        }
    }

    fn supports_returning(&self) -> bool {
        true
    }

    fn drop_index_sql(&self, _table: &str, index: &str) -> String {
        format!("DROP INDEX {}", self.quote(index))
    }

    fn current_database_sql(&self) -> &'static str {
        "SELECT current_database()"
    }

    fn list_tables_sql(&self) -> &'static str {
        "SELECT table_name FROM information_schema.tables WHERE table_schema = 'public'"
    }

    fn table_exists_sql(&self, table: &str) -> Statement {
        Statement::new(
            format!(
                "SELECT EXISTS (SELECT 1 FROM information_schema.tables WHERE table_schema = 'public' AND table_name = {})",
                self.placeholder(1)
            ),
            vec![Value::Text(table.to_string())],
        )
    }
}
