//! The record contract.
//!
//! A type becomes persistable by implementing [`Model`]: it declares its
//! [`Shape`] once, exposes field values by application name, and hands out
//! relation slots for the fields that hold related records. Sessions work
//! against the object-safe [`Entity`] view, which every `Model` implements.
//!
//! # Example
//!
//! ```
//! use tabula_core::{FieldDecl, Model, RelationMut, Result, Shape, TableOverride, Value, ValueType};
//!
//! #[derive(Debug, Default)]
//! struct Post {
//!     id: i64,
//!     user_id: i64,
//!     title: String,
//! }
//!
//! #[derive(Debug, Default)]
//! struct User {
//!     id: i64,
//!     username: String,
//!     posts: Vec<Post>,
//! }
//!
//! impl Model for Post {
//!     fn shape() -> Shape {
//!         Shape::record("Post", vec![
//!             FieldDecl::new("ID", ValueType::BigInt).tag("id,pk,auto"),
//!             FieldDecl::new("UserID", ValueType::BigInt).tag("user_id"),
//!             FieldDecl::new("Title", ValueType::Text),
//!         ])
//!     }
//!     fn get(&self, field: &str) -> Option<Value> {
//!         match field {
//!             "ID" => Some(self.id.into()),
//!             "UserID" => Some(self.user_id.into()),
//!             "Title" => Some(self.title.clone().into()),
//!             _ => None,
//!         }
//!     }
//!     fn set(&mut self, field: &str, value: Value) -> Result<()> {
//!         match field {
//!             "ID" => self.id = value.decode()?,
//!             "UserID" => self.user_id = value.decode()?,
//!             "Title" => self.title = value.decode()?,
//!             _ => return Err(Self::unknown_field(field)),
//!         }
//!         Ok(())
//!     }
//! }
//!
//! impl Model for User {
//!     fn shape() -> Shape {
//!         Shape::record("User", vec![
//!             FieldDecl::new("ID", ValueType::BigInt).tag("id,pk,auto"),
//!             FieldDecl::new("Username", ValueType::Text),
//!         ])
//!     }
//!     fn table_override() -> Option<TableOverride> {
//!         Some(TableOverride::new("users", "id"))
//!     }
//!     fn get(&self, field: &str) -> Option<Value> {
//!         match field {
//!             "ID" => Some(self.id.into()),
//!             "Username" => Some(self.username.clone().into()),
//!             _ => None,
//!         }
//!     }
//!     fn set(&mut self, field: &str, value: Value) -> Result<()> {
//!         match field {
//!             "ID" => self.id = value.decode()?,
//!             "Username" => self.username = value.decode()?,
//!             _ => return Err(Self::unknown_field(field)),
//!         }
//!         Ok(())
//!     }
//!     fn relation(&mut self, field: &str) -> Option<RelationMut<'_>> {
//!         match field {
//!             "Posts" => Some(RelationMut::Many(&mut self.posts)),
//!             _ => None,
//!         }
//!     }
//! }
//!
//! let users = User::descriptor().unwrap();
//! assert_eq!(users.name, "users");
//! ```

use crate::error::{Error, Result};
use crate::metadata::{extract, Shape, TableDescriptor, TableOverride};
use crate::types::{Row, Value};

/// A record type that maps onto a table.
pub trait Model: Default + 'static {
    /// Declared structure of the record.
    fn shape() -> Shape;

    /// Table name and primary key, when the defaults do not apply.
    fn table_override() -> Option<TableOverride> {
        None
    }

    /// Current value of a field, by application name.
    fn get(&self, field: &str) -> Option<Value>;

    /// Assigns a field, converting the value to the field's type.
    ///
    /// # Errors
    ///
    /// [`Error::UnknownField`] for names the record does not declare and
    /// [`Error::Conversion`] when the value does not fit.
    fn set(&mut self, field: &str, value: Value) -> Result<()>;

    /// Slot holding related records for a relationship field.
    fn relation(&mut self, _field: &str) -> Option<RelationMut<'_>> {
        None
    }

    /// Derives the table descriptor for this type.
    fn descriptor() -> Result<TableDescriptor> {
        extract(&Self::shape(), Self::table_override())
    }

    /// Builds an [`Error::UnknownField`] for this type.
    fn unknown_field(field: &str) -> Error {
        let model = match Self::shape() {
            Shape::Record { type_name, .. } => type_name,
            _ => std::any::type_name::<Self>().to_string(),
        };
        Error::UnknownField {
            model,
            field: field.to_string(),
        }
    }

    /// Builds a fresh record from a result row.
    fn from_row(row: &Row) -> Result<Self> {
        let descriptor = Self::descriptor()?;
        let mut record = Self::default();
        apply_row(&mut record, &descriptor, row)?;
        Ok(record)
    }
}

/// Object-safe view of a [`Model`] instance.
pub trait Entity {
    /// Table descriptor of the underlying record type.
    fn describe(&self) -> Result<TableDescriptor>;
    fn value_of(&self, field: &str) -> Option<Value>;
    fn assign(&mut self, field: &str, value: Value) -> Result<()>;
    fn relation_slot(&mut self, field: &str) -> Option<RelationMut<'_>>;
}

impl<M: Model> Entity for M {
    fn describe(&self) -> Result<TableDescriptor> {
        M::descriptor()
    }

    fn value_of(&self, field: &str) -> Option<Value> {
        self.get(field)
    }

    fn assign(&mut self, field: &str, value: Value) -> Result<()> {
        self.set(field, value)
    }

    fn relation_slot(&mut self, field: &str) -> Option<RelationMut<'_>> {
        self.relation(field)
    }
}

/// Copies matching columns of `row` into `entity`.
///
/// Columns are matched to fields by case-insensitive column name; columns
/// without a field are ignored and fields without a column keep their value.
pub fn apply_row(entity: &mut dyn Entity, descriptor: &TableDescriptor, row: &Row) -> Result<()> {
    for (column, value) in row.iter() {
        if let Some(field) = descriptor.field_by_column(column) {
            entity.assign(&field.name, value.clone())?;
        }
    }
    Ok(())
}

/// Mutable access to a relationship field.
pub enum RelationMut<'a> {
    /// A field holding at most one related record.
    One(&'a mut dyn OneSlot),
    /// A field holding a collection of related records.
    Many(&'a mut dyn ManySlot),
}

impl RelationMut<'_> {
    /// Descriptor of the related type.
    pub fn target(&self) -> Result<TableDescriptor> {
        match self {
            RelationMut::One(slot) => slot.target(),
            RelationMut::Many(slot) => slot.target(),
        }
    }
}

/// A single related record, typically `Option<T>`.
pub trait OneSlot {
    fn target(&self) -> Result<TableDescriptor>;
    /// The held record, if any.
    fn entity_mut(&mut self) -> Option<&mut dyn Entity>;
    /// Replaces the held record with one built from `row`.
    fn load(&mut self, row: &Row) -> Result<()>;
}

/// A collection of related records, typically `Vec<T>`.
pub trait ManySlot {
    fn target(&self) -> Result<TableDescriptor>;
    fn entities_mut(&mut self) -> Vec<&mut dyn Entity>;
    /// Replaces the collection with records built from `rows`.
    fn load_all(&mut self, rows: &[Row]) -> Result<()>;
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<M: Model> OneSlot for Option<M> {
    fn target(&self) -> Result<TableDescriptor> {
        M::descriptor()
    }

    fn entity_mut(&mut self) -> Option<&mut dyn Entity> {
        self.as_mut().map(|m| m as &mut dyn Entity)
    }

    fn load(&mut self, row: &Row) -> Result<()> {
        *self = Some(M::from_row(row)?);
        Ok(())
    }
}

impl<M: Model> ManySlot for Vec<M> {
    fn target(&self) -> Result<TableDescriptor> {
        M::descriptor()
    }

    fn entities_mut(&mut self) -> Vec<&mut dyn Entity> {
        self.iter_mut().map(|m| m as &mut dyn Entity).collect()
    }

    fn load_all(&mut self, rows: &[Row]) -> Result<()> {
        let loaded = rows.iter().map(M::from_row).collect::<Result<Vec<_>>>()?;
        *self = loaded;
        Ok(())
    }

    fn len(&self) -> usize {
        Vec::len(self)
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::{Post, User};
    use super::*;

    #[test]
    fn test_from_row_maps_by_column() {
        let row = Row::new(
            vec!["ID".into(), "USERNAME".into(), "extra".into()],
            vec![Value::Int(4), Value::Text("jdoe".into()), Value::Int(9)],
        );
        let user = User::from_row(&row).unwrap();
        assert_eq!(user.id, 4);
        assert_eq!(user.username, "jdoe");
    }

    #[test]
    fn test_unmatched_fields_keep_defaults() {
        let row = Row::new(vec!["id".into()], vec![Value::Int(2)]);
        let post = Post::from_row(&row).unwrap();
        assert_eq!(post.id, 2);
        assert_eq!(post.title, "");
    }

    #[test]
    fn test_unknown_field_error() {
        let mut user = User::default();
        let err = user.set("Nope", Value::Null).unwrap_err();
        assert_eq!(err.to_string(), "model User has no field Nope");
    }

    #[test]
    fn test_many_slot_load_replaces() {
        let mut posts = vec![Post::default()];
        let rows = vec![
            Row::new(vec!["id".into()], vec![Value::Int(1)]),
            Row::new(vec!["id".into()], vec![Value::Int(2)]),
        ];
        ManySlot::load_all(&mut posts, &rows).unwrap();
        assert_eq!(posts.iter().map(|p| p.id).collect::<Vec<_>>(), vec![1, 2]);

        ManySlot::load_all(&mut posts, &[]).unwrap();
        assert!(posts.is_empty());
    }

    #[test]
    fn test_relation_slot_targets() {
        let mut user = User::default();
        let slot = user.relation_slot("Posts").unwrap();
        assert_eq!(slot.target().unwrap().name, "posts");
        assert!(user.relation_slot("Missing").is_none());
    }
}
