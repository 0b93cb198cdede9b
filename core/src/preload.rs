//! Loading and linking related records.
//!
//! Preloading runs one query per relationship and stores the results in the
//! owner's relation slot:
//!
//! - `HasOne` loads the first related row whose foreign key holds the
//!   owner's reference key. When none matches the slot is left untouched.
//! - `BelongsTo` loads the related row whose reference key equals the
//!   owner's foreign key. An absent foreign key or a missing row leaves the
//!   slot untouched.
//! - `HasMany` replaces the collection with every matching row, so no match
//!   yields an empty collection.
//! - `ManyToMany` selects related rows through an inner join on the join
//!   table.
//!
//! [`Session::associate`] and [`Session::dissociate`] insert and delete
//! join table rows for many-to-many relationships.

use tracing::debug;

use crate::error::{Error, Result};
use crate::metadata::TableDescriptor;
use crate::model::{Entity, Model, RelationMut};
use crate::query::Statement;
use crate::relation::{RelationKind, Relations, Relationship};
use crate::session::{key_value, Session};
use crate::types::{Row, Value};

impl Session<'_> {
    /// Loads every relationship in `relations` into `owner`.
    ///
    /// # Errors
    ///
    /// [`Error::Usage`] when `relations` belongs to another type,
    /// [`Error::Validation`] for malformed relationships and
    /// [`Error::MissingKey`] when the owner's key is needed but absent.
    pub fn preload(&self, owner: &mut dyn Entity, relations: &Relations) -> Result<()> {
        let table = owner.describe()?;
        check_source(&table, relations)?;
        for (field, relationship) in relations.iter() {
            self.preload_field(owner, &table, field, relationship)?;
        }
        Ok(())
    }

    /// Preloads each record of `owners` independently.
    pub fn preload_many<M: Model>(&self, owners: &mut [M], relations: &Relations) -> Result<()> {
        for owner in owners.iter_mut() {
            self.preload(owner, relations)?;
        }
        Ok(())
    }

    /// Finds a record by key and preloads its relationships.
    pub fn find_with(
        &self,
        record: &mut dyn Entity,
        key: impl Into<Value>,
        relations: &Relations,
    ) -> Result<()> {
        self.find(record, key)?;
        self.preload(record, relations)
    }

    /// Loads the first matching record and preloads its relationships.
    pub fn first_with(
        &self,
        record: &mut dyn Entity,
        predicate: &str,
        args: &[Value],
        relations: &Relations,
    ) -> Result<()> {
        self.first(record, predicate, args)?;
        self.preload(record, relations)
    }

    /// Appends matching records to `dest` and preloads the new ones.
    pub fn all_with<M: Model>(
        &self,
        dest: &mut Vec<M>,
        predicate: &str,
        args: &[Value],
        relations: &Relations,
    ) -> Result<()> {
        let start = dest.len();
        self.all(dest, predicate, args)?;
        self.preload_many(&mut dest[start..], relations)
    }

    /// Links `source` and `target` by inserting a join table row.
    ///
    /// # Errors
    ///
    /// [`Error::Usage`] unless `relationship` is many-to-many.
    pub fn associate(
        &self,
        source: &dyn Entity,
        target: &dyn Entity,
        relationship: &Relationship,
    ) -> Result<()> {
        let (source_key, target_key) = link_keys(source, target, relationship)?;
        let stmt = self.link_statement(relationship, source_key, target_key)?;
        self.execute(&stmt)?;
        Ok(())
    }

    /// Removes the join table row linking `source` and `target`.
    ///
    /// Removing a link that does not exist is not an error.
    ///
    /// # Errors
    ///
    /// [`Error::Usage`] unless `relationship` is many-to-many.
    pub fn dissociate(
        &self,
        source: &dyn Entity,
        target: &dyn Entity,
        relationship: &Relationship,
    ) -> Result<()> {
        let (source_key, target_key) = link_keys(source, target, relationship)?;
        let stmt = self.unlink_statement(relationship, source_key, target_key)?;
        self.execute(&stmt)?;
        Ok(())
    }

    pub(crate) fn link_statement(
        &self,
        relationship: &Relationship,
        source_key: Value,
        target_key: Value,
    ) -> Result<Statement> {
        let join = relationship.join()?;
        Ok(self
            .builder(join.table)
            .insert()
            .set(join.foreign_key, source_key)
            .set(join.reference_key, target_key)
            .build())
    }

    pub(crate) fn unlink_statement(
        &self,
        relationship: &Relationship,
        source_key: Value,
        target_key: Value,
    ) -> Result<Statement> {
        let join = relationship.join()?;
        Ok(self
            .builder(join.table)
            .delete()
            .filter_eq(join.foreign_key, source_key)
            .filter_eq(join.reference_key, target_key)
            .build())
    }

    /// Keys of the related rows currently linked to `owner_key`.
    pub(crate) fn linked_keys(&self, relationship: &Relationship, owner_key: &Value) -> Result<Vec<Value>> {
        let join = relationship.join()?;
        let stmt = self
            .builder(join.table)
            .select([join.reference_key])
            .filter_eq(join.foreign_key, owner_key.clone())
            .build();
        Ok(self
            .query(&stmt)?
            .into_iter()
            .filter_map(|row| row.value(0).cloned())
            .collect())
    }

    fn preload_field(
        &self,
        owner: &mut dyn Entity,
        table: &TableDescriptor,
        field: &str,
        relationship: &Relationship,
    ) -> Result<()> {
        relationship.validate()?;
        let target = &relationship.target;

        let stmt = match relationship.kind {
            RelationKind::HasOne | RelationKind::HasMany => {
                let owner_key = required_value(owner, table, &relationship.reference_key)?;
                let mut builder = self.builder(&target.name).filter_eq(&relationship.foreign_key, owner_key);
                if relationship.kind == RelationKind::HasOne {
                    builder = builder.limit(1);
                }
                builder.build()
            }
            RelationKind::BelongsTo => {
                let owner_fk = column_value(owner, table, &relationship.foreign_key)?;
                if owner_fk.is_absent() {
                    debug!(field, "foreign key absent, skipping belongs_to preload");
                    return Ok(());
                }
                self.builder(&target.name)
                    .filter_eq(&relationship.reference_key, owner_fk)
                    .limit(1)
                    .build()
            }
            RelationKind::ManyToMany => {
                let join = relationship.join()?;
                let owner_key = key_value(owner, table)?;
                let builder = self.builder(&target.name);
                let condition = format!(
                    "{} = {}",
                    builder.quote_column(&format!("{}.{}", target.name, relationship.target_key())),
                    builder.quote_column(&format!("{}.{}", join.table, join.reference_key)),
                );
                builder
                    .select([format!("{}.*", target.name)])
                    .join(join.table, condition)
                    .filter_eq(&format!("{}.{}", join.table, join.foreign_key), owner_key)
                    .build()
            }
        };

        let rows = self.query(&stmt)?;
        debug!(field, kind = %relationship.kind, rows = rows.len(), "preloaded");
        store_rows(owner, table, field, rows)
    }
}

/// Writes loaded rows into the owner's relation slot.
fn store_rows(owner: &mut dyn Entity, table: &TableDescriptor, field: &str, rows: Vec<Row>) -> Result<()> {
    match owner.relation_slot(field) {
        Some(RelationMut::One(slot)) => match rows.first() {
            Some(row) => slot.load(row),
            None => Ok(()),
        },
        Some(RelationMut::Many(slot)) => slot.load_all(&rows),
        None => Err(Error::UnknownField {
            model: table.name.clone(),
            field: field.to_string(),
        }),
    }
}

pub(crate) fn check_source(table: &TableDescriptor, relations: &Relations) -> Result<()> {
    if relations.source().name != table.name {
        return Err(Error::Usage(format!(
            "relations declared for {} cannot be applied to {}",
            relations.source().name,
            table.name
        )));
    }
    Ok(())
}

/// Value of the field mapped to `column` (or named `column`).
pub(crate) fn column_value(entity: &dyn Entity, table: &TableDescriptor, column: &str) -> Result<Value> {
    let unknown = || Error::UnknownField {
        model: table.name.clone(),
        field: column.to_string(),
    };
    let field = table.resolve_field(column).ok_or_else(unknown)?;
    entity.value_of(&field.name).ok_or_else(unknown)
}

/// Like [`column_value`], but an absent value is [`Error::MissingKey`].
pub(crate) fn required_value(entity: &dyn Entity, table: &TableDescriptor, column: &str) -> Result<Value> {
    let value = column_value(entity, table, column)?;
    if value.is_absent() {
        return Err(Error::MissingKey {
            table: table.name.clone(),
        });
    }
    Ok(value)
}

/// Assigns `value` to the field mapped to `column`.
pub(crate) fn assign_column(entity: &mut dyn Entity, table: &TableDescriptor, column: &str, value: Value) -> Result<()> {
    let field = table.resolve_field(column).ok_or_else(|| Error::UnknownField {
        model: table.name.clone(),
        field: column.to_string(),
    })?;
    entity.assign(&field.name, value)
}

fn link_keys(source: &dyn Entity, target: &dyn Entity, relationship: &Relationship) -> Result<(Value, Value)> {
    relationship.join()?;
    let source_table = source.describe()?;
    let target_table = target.describe()?;
    if target_table.name != relationship.target.name {
        return Err(Error::Usage(format!(
            "relationship targets {} but record belongs to {}",
            relationship.target.name, target_table.name
        )));
    }
    let source_key = key_value(source, &source_table)?;
    let target_key = required_value(target, &target_table, relationship.target_key())?;
    Ok((source_key, target_key))
}
