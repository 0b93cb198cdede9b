//! Record-to-table metadata extraction.
//!
//! A record type describes itself once through [`Shape`]: the type name and
//! its fields, each with a logical [`ValueType`] and an optional annotation
//! tag. [`extract`] turns that declaration into a [`TableDescriptor`]
//! holding the table name, primary key and per-field column mapping.
//!
//! Annotation tags follow the `column,opt,opt,...` form:
//!
//! | option | effect |
//! |---|---|
//! | `pk` | field is the primary key |
//! | `auto` | value is generated by the database |
//! | `nullable`, `unique`, `index` | column flags |
//! | `size:N`, `precision:N`, `scale:N` | type parameters |
//! | `default:V` | default expression for DDL |
//!
//! A tag of `-` excludes the field. An empty column part keeps the
//! snake_case form of the field name.
//!
//! # Example
//!
//! ```
//! use tabula_core::{extract, FieldDecl, Shape, ValueType};
//!
//! let shape = Shape::record("BlogPost", vec![
//!     FieldDecl::new("ID", ValueType::BigInt).tag("id,pk,auto"),
//!     FieldDecl::new("AuthorID", ValueType::BigInt),
//!     FieldDecl::new("Title", ValueType::Text).tag(",size:200"),
//!     FieldDecl::new("Draft", ValueType::Bool).tag("-"),
//! ]);
//!
//! let table = extract(&shape, None).unwrap();
//! assert_eq!(table.name, "blog_post");
//! assert_eq!(table.primary_key, "id");
//! assert_eq!(table.fields.len(), 3);
//! assert_eq!(table.field("AuthorID").unwrap().column, "author_i_d");
//! assert_eq!(table.field("Title").unwrap().size, 200);
//! ```

use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::types::ValueType;

/// Declared structure of a type as seen by the extractor.
#[derive(Debug, Clone, PartialEq)]
pub enum Shape {
    /// A record with named fields; the only shape that maps to a table.
    Record {
        type_name: String,
        fields: Vec<FieldDecl>,
    },
    /// Indirection to another shape (a pointer or box in the host type).
    Reference(Box<Shape>),
    /// A single scalar value.
    Scalar(ValueType),
    /// A list of values of the inner shape.
    Sequence(Box<Shape>),
}

impl Shape {
    pub fn record(type_name: impl Into<String>, fields: Vec<FieldDecl>) -> Self {
        Shape::Record {
            type_name: type_name.into(),
            fields,
        }
    }

    pub fn reference(inner: Shape) -> Self {
        Shape::Reference(Box::new(inner))
    }

    fn describe(&self) -> &'static str {
        match self {
            Shape::Record { .. } => "record",
            Shape::Reference(_) => "reference",
            Shape::Scalar(_) => "scalar",
            Shape::Sequence(_) => "sequence",
        }
    }
}

/// One declared field of a record.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDecl {
    pub name: String,
    pub value_type: ValueType,
    pub tag: Option<String>,
    pub public: bool,
}

impl FieldDecl {
    /// A public field without annotation.
    pub fn new(name: impl Into<String>, value_type: ValueType) -> Self {
        Self {
            name: name.into(),
            value_type,
            tag: None,
            public: true,
        }
    }

    /// Attaches an annotation tag.
    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    /// Marks the field as non-public; the extractor skips it.
    pub fn private(mut self) -> Self {
        self.public = false;
        self
    }
}

/// Table name and primary key supplied by the record itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableOverride {
    pub table: String,
    pub primary_key: String,
}

impl TableOverride {
    pub fn new(table: impl Into<String>, primary_key: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            primary_key: primary_key.into(),
        }
    }
}

/// Column mapping for one field.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FieldDescriptor {
    /// Application-level field name.
    pub name: String,
    pub column: String,
    pub value_type: ValueType,
    pub is_key: bool,
    pub is_auto: bool,
    pub nullable: bool,
    pub unique: bool,
    pub indexed: bool,
    pub size: u32,
    pub precision: u32,
    pub scale: u32,
    /// Default expression, used only for DDL.
    pub default: Option<String>,
}

/// Derived mapping of a record type onto a table.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TableDescriptor {
    pub name: String,
    /// Primary key column name.
    pub primary_key: String,
    pub fields: Vec<FieldDescriptor>,
}

impl TableDescriptor {
    /// Finds a field by application name.
    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Finds a field by column name, ignoring ASCII case.
    pub fn field_by_column(&self, column: &str) -> Option<&FieldDescriptor> {
        self.fields
            .iter()
            .find(|f| f.column.eq_ignore_ascii_case(column))
    }

    /// The primary key field, if the record maps one.
    pub fn key_field(&self) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.is_key)
    }

    /// Resolves a name that may be either a column or a field name to the
    /// field's application name.
    pub fn resolve_field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.field_by_column(name).or_else(|| self.field(name))
    }
}

/// Derives the table descriptor for a declared shape.
///
/// References are followed to the underlying shape. When `table` is given
/// its table name and primary key replace the defaults (snake_case type
/// name and `"id"`); a `pk` tag still takes precedence for the key.
///
/// # Errors
///
/// Returns [`Error::InvalidModel`] if the shape is not a record or if two
/// fields map to the same column (compared case-insensitively).
pub fn extract(shape: &Shape, table: Option<TableOverride>) -> Result<TableDescriptor> {
    let mut shape = shape;
    while let Shape::Reference(inner) = shape {
        shape = inner;
    }

    let Shape::Record { type_name, fields } = shape else {
        return Err(Error::InvalidModel {
            model: shape.describe().to_string(),
            reason: "model must be a record".to_string(),
        });
    };

    let (name, mut primary_key) = match table {
        Some(o) => (o.table, o.primary_key),
        None => (to_snake_case(type_name), "id".to_string()),
    };

    let mut descriptors = Vec::with_capacity(fields.len());
    let mut seen: HashMap<String, String> = HashMap::new();
    let mut key_field: Option<String> = None;

    for decl in fields.iter().filter(|f| f.public) {
        let tag = decl.tag.as_deref().unwrap_or("");
        if tag == "-" {
            continue;
        }

        let mut parts = tag.split(',');
        let column = match parts.next() {
            Some(c) if !c.is_empty() => c.to_string(),
            _ => to_snake_case(&decl.name),
        };

        let mut field = FieldDescriptor {
            name: decl.name.clone(),
            column,
            value_type: decl.value_type,
            ..FieldDescriptor::default()
        };

        for opt in parts {
            match opt {
                "pk" => {
                    if let Some(previous) = &key_field {
                        return Err(Error::InvalidModel {
                            model: type_name.clone(),
                            reason: format!(
                                "fields {previous} and {} are both tagged pk",
                                decl.name
                            ),
                        });
                    }
                    key_field = Some(decl.name.clone());
                    field.is_key = true;
                    primary_key = field.column.clone();
                }
                "auto" => field.is_auto = true,
                "nullable" => field.nullable = true,
                "unique" => field.unique = true,
                "index" => field.indexed = true,
                _ => {
                    if let Some(n) = opt.strip_prefix("size:") {
                        field.size = n.parse().unwrap_or(0);
                    } else if let Some(n) = opt.strip_prefix("precision:") {
                        field.precision = n.parse().unwrap_or(0);
                    } else if let Some(n) = opt.strip_prefix("scale:") {
                        field.scale = n.parse().unwrap_or(0);
                    } else if let Some(v) = opt.strip_prefix("default:") {
                        field.default = Some(v.to_string());
                    }
                }
            }
        }

        if let Some(previous) = seen.insert(field.column.to_ascii_lowercase(), decl.name.clone()) {
            return Err(Error::InvalidModel {
                model: type_name.clone(),
                reason: format!(
                    "fields {previous} and {} both map to column {}",
                    decl.name, field.column
                ),
            });
        }

        descriptors.push(field);
    }

    // Without an explicit pk tag the field backing the key column is the key.
    if !descriptors.iter().any(|f| f.is_key) {
        if let Some(field) = descriptors
            .iter_mut()
            .find(|f| f.column.eq_ignore_ascii_case(&primary_key))
        {
            field.is_key = true;
        }
    }

    Ok(TableDescriptor {
        name,
        primary_key,
        fields: descriptors,
    })
}

/// Converts `CamelCase` to `snake_case` by inserting `_` before every
/// uppercase letter after the first character.
///
/// # Examples
///
/// ```
/// use tabula_core::to_snake_case;
///
/// assert_eq!(to_snake_case("UserProfile"), "user_profile");
/// assert_eq!(to_snake_case("ID"), "i_d");
/// ```
pub fn to_snake_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 4);
    for (i, c) in s.chars().enumerate() {
        if i > 0 && c.is_ascii_uppercase() {
            out.push('_');
        }
        out.push(c);
    }
    out.to_lowercase()
}
