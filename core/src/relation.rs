//! Relationship declarations.
//!
//! A [`Relationship`] describes how records of one type reach records of
//! another: through a foreign key on either side or through a join table.
//! [`Relations`] groups the relationships of one source type by field name
//! and checks each declaration when it is registered, so malformed
//! relationships are rejected before any query runs.
//!
//! Key naming by kind:
//!
//! | kind | `foreign_key` | `reference_key` |
//! |---|---|---|
//! | `HasOne`, `HasMany` | column on the related table | column on the owner |
//! | `BelongsTo` | column on the owner | column on the related table |
//! | `ManyToMany` | unused | column on the related table matched by `join_reference_key` |
//!
//! # Example
//!
//! ```no_run
//! # use tabula_core::{Model, Relations, Relationship, Result};
//! # fn demo<User: Model, Post: Model, Tag: Model>() -> Result<()> {
//! let relations = Relations::of::<User>()?
//!     .with("Posts", Relationship::has_many::<Post>("user_id", "id")?)?
//!     .with("Tags", Relationship::many_to_many::<Tag>("user_tags", "user_id", "tag_id")?)?;
//! assert_eq!(relations.len(), 2);
//! # Ok(())
//! # }
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};
use crate::metadata::TableDescriptor;
use crate::model::{Model, RelationMut};
use crate::validate::{ValidationError, ValidationErrors};

/// How two record types are related.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RelationKind {
    HasOne,
    BelongsTo,
    HasMany,
    ManyToMany,
}

impl RelationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            RelationKind::HasOne => "has_one",
            RelationKind::BelongsTo => "belongs_to",
            RelationKind::HasMany => "has_many",
            RelationKind::ManyToMany => "many_to_many",
        }
    }

    /// Whether the owner holds a collection of related records.
    pub fn is_collection(self) -> bool {
        matches!(self, RelationKind::HasMany | RelationKind::ManyToMany)
    }
}

impl fmt::Display for RelationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RelationKind {
    type Err = Error;

    /// Accepts `has_one`, `HasOne`, `has-one` and similar spellings.
    fn from_str(s: &str) -> Result<Self> {
        let normalized: String = s
            .chars()
            .filter(|c| !matches!(c, '_' | '-' | ' '))
            .collect::<String>()
            .to_ascii_lowercase();
        match normalized.as_str() {
            "hasone" => Ok(RelationKind::HasOne),
            "belongsto" => Ok(RelationKind::BelongsTo),
            "hasmany" => Ok(RelationKind::HasMany),
            "manytomany" => Ok(RelationKind::ManyToMany),
            _ => Err(Error::UnsupportedRelationship(s.to_string())),
        }
    }
}

/// A declared relationship from an owner type to a related type.
#[derive(Debug, Clone, PartialEq)]
pub struct Relationship {
    pub kind: RelationKind,
    /// Descriptor of the related type.
    pub target: TableDescriptor,
    pub foreign_key: String,
    pub reference_key: String,
    pub join_table: Option<String>,
    pub join_foreign_key: Option<String>,
    pub join_reference_key: Option<String>,
    /// Loaded by [`Relations::preloaded`] lookups.
    pub preload: bool,
}

impl Relationship {
    /// A relationship with no keys set.
    pub fn new(kind: RelationKind, target: TableDescriptor) -> Self {
        Self {
            kind,
            target,
            foreign_key: String::new(),
            reference_key: String::new(),
            join_table: None,
            join_foreign_key: None,
            join_reference_key: None,
            preload: false,
        }
    }

    /// Owner has at most one `M` whose `foreign_key` holds the owner's
    /// `reference_key`.
    pub fn has_one<M: Model>(foreign_key: &str, reference_key: &str) -> Result<Self> {
        Self::keyed::<M>(RelationKind::HasOne, foreign_key, reference_key)
    }

    /// Owner's `foreign_key` holds the `reference_key` of one `M`.
    pub fn belongs_to<M: Model>(foreign_key: &str, reference_key: &str) -> Result<Self> {
        Self::keyed::<M>(RelationKind::BelongsTo, foreign_key, reference_key)
    }

    /// Owner has any number of `M` whose `foreign_key` holds the owner's
    /// `reference_key`.
    pub fn has_many<M: Model>(foreign_key: &str, reference_key: &str) -> Result<Self> {
        Self::keyed::<M>(RelationKind::HasMany, foreign_key, reference_key)
    }

    /// Owner and `M` are linked through rows of `join_table`.
    pub fn many_to_many<M: Model>(
        join_table: &str,
        join_foreign_key: &str,
        join_reference_key: &str,
    ) -> Result<Self> {
        let target = M::descriptor()?;
        let reference_key = target.primary_key.clone();
        let mut rel = Self::new(RelationKind::ManyToMany, target);
        rel.reference_key = reference_key;
        rel.join_table = Some(join_table.to_string());
        rel.join_foreign_key = Some(join_foreign_key.to_string());
        rel.join_reference_key = Some(join_reference_key.to_string());
        Ok(rel)
    }

    fn keyed<M: Model>(kind: RelationKind, foreign_key: &str, reference_key: &str) -> Result<Self> {
        let mut rel = Self::new(kind, M::descriptor()?);
        rel.foreign_key = foreign_key.to_string();
        rel.reference_key = reference_key.to_string();
        Ok(rel)
    }

    pub fn with_preload(mut self, preload: bool) -> Self {
        self.preload = preload;
        self
    }

    /// Overrides the related-table column matched through the join table.
    pub fn with_reference_key(mut self, reference_key: &str) -> Self {
        self.reference_key = reference_key.to_string();
        self
    }

    /// Checks the keys required by the relationship kind, collecting every
    /// problem.
    ///
    /// # Errors
    ///
    /// [`Error::Validation`] listing each missing attribute.
    pub fn validate(&self) -> Result<()> {
        let mut errors = ValidationErrors::default();
        if self.target.name.is_empty() {
            errors.push(ValidationError::new("target", "is required"));
        }

        match self.kind {
            RelationKind::HasOne | RelationKind::BelongsTo | RelationKind::HasMany => {
                if self.foreign_key.is_empty() {
                    errors.push(ValidationError::new(
                        "foreign_key",
                        format!("is required for {} relationships", self.kind),
                    ));
                }
                if self.reference_key.is_empty() {
                    errors.push(ValidationError::new(
                        "reference_key",
                        format!("is required for {} relationships", self.kind),
                    ));
                }
            }
            RelationKind::ManyToMany => {
                for (name, value) in [
                    ("join_table", &self.join_table),
                    ("join_foreign_key", &self.join_foreign_key),
                    ("join_reference_key", &self.join_reference_key),
                ] {
                    if value.as_deref().is_none_or(str::is_empty) {
                        errors.push(ValidationError::new(
                            name,
                            "is required for many_to_many relationships",
                        ));
                    }
                }
            }
        }

        errors.into_result()
    }

    /// Join table parts of a many-to-many relationship.
    pub(crate) fn join(&self) -> Result<JoinSpec<'_>> {
        match (
            self.join_table.as_deref(),
            self.join_foreign_key.as_deref(),
            self.join_reference_key.as_deref(),
        ) {
            (Some(table), Some(foreign_key), Some(reference_key)) if self.kind == RelationKind::ManyToMany => {
                Ok(JoinSpec {
                    table,
                    foreign_key,
                    reference_key,
                })
            }
            _ => Err(Error::Usage(format!(
                "join table operations require a many_to_many relationship, got {}",
                self.kind
            ))),
        }
    }

    /// Related-table column matched through the join table.
    pub(crate) fn target_key(&self) -> &str {
        if self.reference_key.is_empty() {
            &self.target.primary_key
        } else {
            &self.reference_key
        }
    }
}

/// Borrowed join table columns.
#[derive(Debug, Clone, Copy)]
pub(crate) struct JoinSpec<'r> {
    pub table: &'r str,
    pub foreign_key: &'r str,
    pub reference_key: &'r str,
}

/// Relationships of one source type, keyed by field name.
#[derive(Debug, Clone)]
pub struct Relations {
    source: TableDescriptor,
    entries: BTreeMap<String, Relationship>,
    checker: fn(&str) -> Option<SlotInfo>,
}

/// What a source type exposes for one relation field.
#[derive(Debug, Clone, PartialEq)]
struct SlotInfo {
    collection: bool,
    target: String,
}

fn slot_info<M: Model>(field: &str) -> Option<SlotInfo> {
    let mut scratch = M::default();
    let slot = scratch.relation(field)?;
    let collection = matches!(slot, RelationMut::Many(_));
    let target = slot.target().ok()?.name;
    Some(SlotInfo { collection, target })
}

impl Relations {
    /// An empty registry for source type `M`.
    pub fn of<M: Model>() -> Result<Self> {
        Ok(Self {
            source: M::descriptor()?,
            entries: BTreeMap::new(),
            checker: slot_info::<M>,
        })
    }

    /// Registers `relationship` under `field`.
    ///
    /// # Errors
    ///
    /// [`Error::Validation`] when the relationship is malformed, the source
    /// type has no relation slot named `field`, the slot's arity does not
    /// match the kind, or the slot holds a different type than the target.
    pub fn with(mut self, field: &str, relationship: Relationship) -> Result<Self> {
        relationship.validate()?;

        let mut errors = ValidationErrors::default();
        match (self.checker)(field) {
            None => errors.push(ValidationError::new(
                field,
                format!("{} has no relation field {field}", self.source.name),
            )),
            Some(slot) => {
                if slot.collection != relationship.kind.is_collection() {
                    errors.push(ValidationError::new(
                        field,
                        format!(
                            "{} relationship needs a {} field",
                            relationship.kind,
                            if relationship.kind.is_collection() { "collection" } else { "single-record" }
                        ),
                    ));
                }
                if slot.target != relationship.target.name {
                    errors.push(ValidationError::new(
                        field,
                        format!(
                            "field holds {} records but relationship targets {}",
                            slot.target, relationship.target.name
                        ),
                    ));
                }
            }
        }
        errors.into_result()?;

        self.entries.insert(field.to_string(), relationship);
        Ok(self)
    }

    pub fn source(&self) -> &TableDescriptor {
        &self.source
    }

    pub fn get(&self, field: &str) -> Option<&Relationship> {
        self.entries.get(field)
    }

    /// Iterates `(field, relationship)` in field-name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Relationship)> {
        self.entries.iter().map(|(f, r)| (f.as_str(), r))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Only the relationships flagged for preloading.
    pub fn preloaded(&self) -> Relations {
        Relations {
            source: self.source.clone(),
            entries: self
                .entries
                .iter()
                .filter(|(_, r)| r.preload)
                .map(|(f, r)| (f.clone(), r.clone()))
                .collect(),
            checker: self.checker,
        }
    }

    /// Restricts the registry to the named fields.
    pub fn only(&self, fields: &[&str]) -> Relations {
        Relations {
            source: self.source.clone(),
            entries: self
                .entries
                .iter()
                .filter(|(f, _)| fields.contains(&f.as_str()))
                .map(|(f, r)| (f.clone(), r.clone()))
                .collect(),
            checker: self.checker,
        }
    }
}
