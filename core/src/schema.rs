//! Table DDL derived from descriptors.
//!
//! [`TableSchema`] turns a [`TableDescriptor`] into `CREATE TABLE` and
//! `CREATE INDEX` statements for a dialect. Fields tagged `index` get a
//! plain index named `idx_<table>_<column>`; fields tagged `unique` get a
//! unique index named `uq_<table>_<column>`.

use std::fmt;

use crate::dialect::Dialect;
use crate::error::{Error, Result};
use crate::metadata::{FieldDescriptor, TableDescriptor};
use crate::relation::{RelationKind, Relations};

/// Referential action of a foreign key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ForeignKeyAction {
    #[default]
    NoAction,
    Restrict,
    Cascade,
    SetNull,
    SetDefault,
}

impl ForeignKeyAction {
    pub fn as_sql(self) -> &'static str {
        match self {
            ForeignKeyAction::NoAction => "NO ACTION",
            ForeignKeyAction::Restrict => "RESTRICT",
            ForeignKeyAction::Cascade => "CASCADE",
            ForeignKeyAction::SetNull => "SET NULL",
            ForeignKeyAction::SetDefault => "SET DEFAULT",
        }
    }
}

impl fmt::Display for ForeignKeyAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

/// A foreign key constraint on one column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKey {
    pub column: String,
    pub references_table: String,
    pub references_column: String,
    pub on_delete: ForeignKeyAction,
    pub on_update: ForeignKeyAction,
}

impl ForeignKey {
    pub fn new(column: &str, references_table: &str, references_column: &str) -> Self {
        Self {
            column: column.to_string(),
            references_table: references_table.to_string(),
            references_column: references_column.to_string(),
            on_delete: ForeignKeyAction::NoAction,
            on_update: ForeignKeyAction::NoAction,
        }
    }

    pub fn on_delete(mut self, action: ForeignKeyAction) -> Self {
        self.on_delete = action;
        self
    }

    pub fn on_update(mut self, action: ForeignKeyAction) -> Self {
        self.on_update = action;
        self
    }

    fn definition(&self, dialect: &dyn Dialect) -> String {
        let mut sql = format!(
            "FOREIGN KEY ({}) REFERENCES {} ({})",
            dialect.quote(&self.column),
            dialect.quote(&self.references_table),
            dialect.quote(&self.references_column)
        );
        if self.on_delete != ForeignKeyAction::NoAction {
            sql.push_str(&format!(" ON DELETE {}", self.on_delete));
        }
        if self.on_update != ForeignKeyAction::NoAction {
            sql.push_str(&format!(" ON UPDATE {}", self.on_update));
        }
        sql
    }
}

/// DDL view of one table.
#[derive(Debug, Clone, PartialEq)]
pub struct TableSchema {
    pub table: TableDescriptor,
    pub foreign_keys: Vec<ForeignKey>,
}

impl TableSchema {
    pub fn from_descriptor(table: TableDescriptor) -> Self {
        Self {
            table,
            foreign_keys: Vec::new(),
        }
    }

    /// Adds a foreign key.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidModel`] when `column` is not a column of the table.
    pub fn with_foreign_key(mut self, foreign_key: ForeignKey) -> Result<Self> {
        if self.table.field_by_column(&foreign_key.column).is_none() {
            return Err(Error::InvalidModel {
                model: self.table.name.clone(),
                reason: format!("foreign key column {} does not exist", foreign_key.column),
            });
        }
        self.foreign_keys.push(foreign_key);
        Ok(self)
    }

    /// Adds a foreign key for every `BelongsTo` relationship in `relations`.
    pub fn with_relations(mut self, relations: &Relations, on_delete: ForeignKeyAction) -> Result<Self> {
        for (_, relationship) in relations.iter() {
            if relationship.kind != RelationKind::BelongsTo {
                continue;
            }
            let fk = ForeignKey::new(
                &relationship.foreign_key,
                &relationship.target.name,
                &relationship.reference_key,
            )
            .on_delete(on_delete);
            self = self.with_foreign_key(fk)?;
        }
        Ok(self)
    }

    /// Column definition for one field.
    pub fn column_definition(&self, dialect: &dyn Dialect, field: &FieldDescriptor) -> String {
        let column = dialect.quote(&field.column);
        if field.is_key && field.is_auto {
            return format!("{column} {}", dialect.auto_increment_definition(field.value_type));
        }

        let mut sql = format!(
            "{column} {}",
            dialect.data_type(field.value_type, field.size, field.precision, field.scale)
        );
        if field.is_key || !field.nullable {
            sql.push_str(" NOT NULL");
        }
        if let Some(default) = &field.default {
            sql.push_str(" DEFAULT ");
            sql.push_str(default);
        }
        sql
    }

    /// `CREATE TABLE` statement.
    pub fn create_table_sql(&self, dialect: &dyn Dialect) -> String {
        let mut definitions: Vec<String> = self
            .table
            .fields
            .iter()
            .map(|f| self.column_definition(dialect, f))
            .collect();

        let key_declared = dialect.auto_increment_declares_key()
            && self.table.fields.iter().any(|f| f.is_key && f.is_auto);
        if !key_declared {
            let keys: Vec<&str> = self
                .table
                .fields
                .iter()
                .filter(|f| f.is_key)
                .map(|f| f.column.as_str())
                .collect();
            if !keys.is_empty() {
                definitions.push(format!("PRIMARY KEY ({})", dialect.quote_list(&keys)));
            }
        }

        definitions.extend(self.foreign_keys.iter().map(|fk| fk.definition(dialect)));
        dialect.create_table_sql(&self.table.name, &definitions)
    }

    /// One `CREATE INDEX` per `index` or `unique` field.
    pub fn create_index_statements(&self, dialect: &dyn Dialect) -> Vec<String> {
        let table = &self.table.name;
        self.table
            .fields
            .iter()
            .filter(|f| !f.is_key && (f.unique || f.indexed))
            .map(|f| {
                let (prefix, unique) = if f.unique { ("uq", true) } else { ("idx", false) };
                let index = format!("{prefix}_{table}_{}", f.column);
                dialect.create_index_sql(table, &index, &[f.column.as_str()], unique)
            })
            .collect()
    }

    pub fn drop_table_sql(&self, dialect: &dyn Dialect) -> String {
        dialect.drop_table_sql(&self.table.name)
    }
}
