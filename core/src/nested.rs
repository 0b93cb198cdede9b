//! Cascading persistence across relationship edges.
//!
//! A nested call first turns the record's [`Relations`] and the per-call
//! [`NestedOptions`] into a [`NestedPlan`]: an ordered list of [`Step`]s.
//! A [`UnitOfWork`] then executes the plan inside a single transaction
//! guard, so the first failing statement rolls back every write the call
//! made. The unit of work keeps a journal of the writes it performed and
//! hands it back on commit.
//!
//! Step order:
//!
//! - create and update run `BelongsTo` edges first so the root row is written
//!   with its foreign key already set, then the root, then `HasOne`,
//!   `HasMany` and `ManyToMany` edges.
//! - delete runs the child edges the [`DeletePolicy`] selects, then deletes
//!   the root. `BelongsTo` edges are never cascaded on delete.
//!
//! # Example
//!
//! ```no_run
//! # use tabula_core::{Entity, NestedOptions, Relations, Result, Session};
//! # fn demo(session: &Session<'_>, user: &mut dyn Entity, relations: &Relations) -> Result<()> {
//! let journal = session.create_nested(user, relations, &NestedOptions::default())?;
//! for item in &journal {
//!     println!("{item}");
//! }
//! # Ok(())
//! # }
//! ```

use std::fmt;

use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::metadata::TableDescriptor;
use crate::model::{Entity, RelationMut};
use crate::preload::{assign_column, check_source, required_value};
use crate::query::Statement;
use crate::relation::{RelationKind, Relations, Relationship};
use crate::session::{key_value, Session};
use crate::transaction::Transaction;
use crate::types::Value;

/// What happens to children when their parent is deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeletePolicy {
    /// Leave children and join rows untouched.
    #[default]
    Skip,
    /// Delete `HasOne`/`HasMany` children and `ManyToMany` join rows. With
    /// `delete_related`, also delete the related `ManyToMany` rows.
    Cascade { delete_related: bool },
    /// Set child foreign keys to NULL. `ManyToMany` join rows are removed.
    Nullify,
}

/// Per-call options for nested persistence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NestedOptions {
    /// Cascade create and update to related records.
    pub auto_save: bool,
    /// On update, remove join rows for records no longer in a
    /// `ManyToMany` collection.
    pub prune_associations: bool,
    pub on_delete: DeletePolicy,
}

impl Default for NestedOptions {
    fn default() -> Self {
        Self {
            auto_save: true,
            prune_associations: false,
            on_delete: DeletePolicy::Skip,
        }
    }
}

impl NestedOptions {
    pub fn auto_save(mut self, enabled: bool) -> Self {
        self.auto_save = enabled;
        self
    }

    pub fn prune_associations(mut self, enabled: bool) -> Self {
        self.prune_associations = enabled;
        self
    }

    pub fn on_delete(mut self, policy: DeletePolicy) -> Self {
        self.on_delete = policy;
        self
    }
}

/// How related records are written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveMode {
    /// Insert children; keep related records that already have a key.
    Create,
    /// Insert keyless records and update the rest.
    Upsert,
}

/// One planned operation of a nested call.
#[derive(Debug, Clone, Copy)]
pub enum Step<'r> {
    CreateRoot,
    UpdateRoot,
    DeleteRoot,
    /// Write the `BelongsTo` record and copy its key into the root.
    SaveOwner {
        field: &'r str,
        relationship: &'r Relationship,
        mode: SaveMode,
    },
    /// Stamp the root key into `HasOne`/`HasMany` children and write them.
    SaveChildren {
        field: &'r str,
        relationship: &'r Relationship,
        mode: SaveMode,
    },
    /// Write `ManyToMany` records and insert missing join rows.
    LinkChildren {
        field: &'r str,
        relationship: &'r Relationship,
        mode: SaveMode,
        prune: bool,
    },
    DeleteChildren { relationship: &'r Relationship },
    NullifyChildren { relationship: &'r Relationship },
    /// Remove every join row of the root.
    UnlinkAll {
        relationship: &'r Relationship,
        delete_related: bool,
    },
}

impl fmt::Display for Step<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Step::CreateRoot => f.write_str("create root"),
            Step::UpdateRoot => f.write_str("update root"),
            Step::DeleteRoot => f.write_str("delete root"),
            Step::SaveOwner { field, mode, .. } => write!(f, "save owner {field} ({mode:?})"),
            Step::SaveChildren { field, mode, .. } => write!(f, "save children {field} ({mode:?})"),
            Step::LinkChildren { field, prune, .. } => {
                write!(f, "link {field}")?;
                if *prune {
                    f.write_str(" and prune")?;
                }
                Ok(())
            }
            Step::DeleteChildren { relationship } => write!(f, "delete {}", relationship.target.name),
            Step::NullifyChildren { relationship } => write!(f, "nullify {}", relationship.target.name),
            Step::UnlinkAll {
                relationship,
                delete_related,
            } => {
                write!(f, "unlink {}", relationship.target.name)?;
                if *delete_related {
                    f.write_str(" and delete related")?;
                }
                Ok(())
            }
        }
    }
}

/// Ordered steps for one nested call.
#[derive(Debug, Clone)]
pub struct NestedPlan<'r> {
    steps: Vec<Step<'r>>,
}

impl<'r> NestedPlan<'r> {
    pub fn create(relations: &'r Relations, options: &NestedOptions) -> Self {
        Self::save(relations, options, SaveMode::Create, Step::CreateRoot)
    }

    pub fn update(relations: &'r Relations, options: &NestedOptions) -> Self {
        Self::save(relations, options, SaveMode::Upsert, Step::UpdateRoot)
    }

    pub fn delete(relations: &'r Relations, options: &NestedOptions) -> Self {
        let mut steps = Vec::new();
        for (_, relationship) in relations.iter() {
            let step = match (relationship.kind, options.on_delete) {
                (_, DeletePolicy::Skip) | (RelationKind::BelongsTo, _) => continue,
                (RelationKind::HasOne | RelationKind::HasMany, DeletePolicy::Cascade { .. }) => {
                    Step::DeleteChildren { relationship }
                }
                (RelationKind::HasOne | RelationKind::HasMany, DeletePolicy::Nullify) => {
                    Step::NullifyChildren { relationship }
                }
                (RelationKind::ManyToMany, DeletePolicy::Cascade { delete_related }) => Step::UnlinkAll {
                    relationship,
                    delete_related,
                },
                (RelationKind::ManyToMany, DeletePolicy::Nullify) => Step::UnlinkAll {
                    relationship,
                    delete_related: false,
                },
            };
            steps.push(step);
        }
        steps.push(Step::DeleteRoot);
        Self { steps }
    }

    fn save(relations: &'r Relations, options: &NestedOptions, mode: SaveMode, root: Step<'r>) -> Self {
        let mut owners = Vec::new();
        let mut children = Vec::new();
        if options.auto_save {
            for (field, relationship) in relations.iter() {
                match relationship.kind {
                    RelationKind::BelongsTo => owners.push(Step::SaveOwner {
                        field,
                        relationship,
                        mode,
                    }),
                    RelationKind::HasOne | RelationKind::HasMany => children.push(Step::SaveChildren {
                        field,
                        relationship,
                        mode,
                    }),
                    RelationKind::ManyToMany => children.push(Step::LinkChildren {
                        field,
                        relationship,
                        mode,
                        prune: mode == SaveMode::Upsert && options.prune_associations,
                    }),
                }
            }
        }
        let mut steps = owners;
        steps.push(root);
        steps.extend(children);
        Self { steps }
    }

    pub fn steps(&self) -> &[Step<'r>] {
        &self.steps
    }
}

/// Kind of write recorded in a [`UnitOfWork`] journal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkAction {
    Insert,
    Update,
    Delete,
    Nullify,
    Link,
    Unlink,
}

/// One write performed by a [`UnitOfWork`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
    pub action: WorkAction,
    pub table: String,
    pub rows_affected: u64,
}

impl fmt::Display for WorkItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} {} ({} rows)", self.action, self.table, self.rows_affected)
    }
}

/// Writes executed under one transaction guard.
///
/// Dropping the unit without [`commit`](UnitOfWork::commit) rolls back
/// everything it wrote.
pub struct UnitOfWork<'s> {
    tx: Transaction<'s>,
    session: Session<'s>,
    journal: Vec<WorkItem>,
}

impl<'s> UnitOfWork<'s> {
    pub fn begin(session: &Session<'s>) -> Result<Self> {
        let tx = Transaction::begin(session.storage())?;
        let session = Session::new(tx.storage(), session.dialect());
        Ok(Self {
            tx,
            session,
            journal: Vec::new(),
        })
    }

    pub fn session(&self) -> Session<'s> {
        self.session
    }

    pub fn journal(&self) -> &[WorkItem] {
        &self.journal
    }

    pub fn insert(&mut self, record: &mut dyn Entity) -> Result<()> {
        let table = record.describe()?;
        self.session.create(record)?;
        self.note(WorkAction::Insert, &table.name, 1);
        Ok(())
    }

    pub fn update(&mut self, record: &mut dyn Entity) -> Result<()> {
        let table = record.describe()?;
        self.session.update(record)?;
        self.note(WorkAction::Update, &table.name, 1);
        Ok(())
    }

    pub fn delete(&mut self, record: &dyn Entity) -> Result<()> {
        let table = record.describe()?;
        self.session.delete(record)?;
        self.note(WorkAction::Delete, &table.name, 1);
        Ok(())
    }

    /// Inserts `record` when its key is absent, updates it otherwise.
    pub fn save(&mut self, record: &mut dyn Entity) -> Result<()> {
        if has_key(record)? {
            self.update(record)
        } else {
            self.insert(record)
        }
    }

    /// Executes a prepared statement and records it.
    pub fn execute(&mut self, action: WorkAction, table: &str, stmt: &Statement) -> Result<u64> {
        let rows = self.session.execute(stmt)?.rows_affected;
        self.note(action, table, rows);
        Ok(rows)
    }

    /// Commits and returns the journal.
    pub fn commit(self) -> Result<Vec<WorkItem>> {
        self.tx.commit()?;
        debug!(writes = self.journal.len(), "unit of work committed");
        Ok(self.journal)
    }

    fn note(&mut self, action: WorkAction, table: &str, rows_affected: u64) {
        self.journal.push(WorkItem {
            action,
            table: table.to_string(),
            rows_affected,
        });
    }
}

impl Session<'_> {
    /// Creates `record` and, with `auto_save`, its related records.
    ///
    /// Runs in one transaction and returns the writes performed.
    pub fn create_nested(
        &self,
        record: &mut dyn Entity,
        relations: &Relations,
        options: &NestedOptions,
    ) -> Result<Vec<WorkItem>> {
        let table = record.describe()?;
        check_source(&table, relations)?;
        self.run_save(&NestedPlan::create(relations, options), record, &table)
    }

    /// Updates `record` and, with `auto_save`, creates or updates its
    /// related records.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] when the root or a keyed related record has no
    /// row; nothing is written in that case.
    pub fn update_nested(
        &self,
        record: &mut dyn Entity,
        relations: &Relations,
        options: &NestedOptions,
    ) -> Result<Vec<WorkItem>> {
        let table = record.describe()?;
        check_source(&table, relations)?;
        self.run_save(&NestedPlan::update(relations, options), record, &table)
    }

    /// Processes child relationships per `options.on_delete`, then deletes
    /// `record`.
    pub fn delete_nested(
        &self,
        record: &dyn Entity,
        relations: &Relations,
        options: &NestedOptions,
    ) -> Result<Vec<WorkItem>> {
        let table = record.describe()?;
        check_source(&table, relations)?;
        let plan = NestedPlan::delete(relations, options);

        let mut work = UnitOfWork::begin(self)?;
        for step in plan.steps() {
            debug!(table = %table.name, step = %step, "nested delete");
            match *step {
                Step::DeleteRoot => work.delete(record)?,
                Step::DeleteChildren { relationship } => {
                    let parent = required_value(record, &table, &relationship.reference_key)?;
                    let stmt = self
                        .builder(&relationship.target.name)
                        .delete()
                        .filter_eq(&relationship.foreign_key, parent)
                        .build();
                    work.execute(WorkAction::Delete, &relationship.target.name, &stmt)?;
                }
                Step::NullifyChildren { relationship } => {
                    let parent = required_value(record, &table, &relationship.reference_key)?;
                    let stmt = self
                        .builder(&relationship.target.name)
                        .update()
                        .set(&relationship.foreign_key, Value::Null)
                        .filter_eq(&relationship.foreign_key, parent)
                        .build();
                    work.execute(WorkAction::Nullify, &relationship.target.name, &stmt)?;
                }
                Step::UnlinkAll {
                    relationship,
                    delete_related,
                } => unlink_all(&mut work, record, &table, relationship, delete_related)?,
                _ => return Err(misplaced(step)),
            }
        }
        work.commit()
    }

    fn run_save(
        &self,
        plan: &NestedPlan<'_>,
        record: &mut dyn Entity,
        table: &TableDescriptor,
    ) -> Result<Vec<WorkItem>> {
        let mut work = UnitOfWork::begin(self)?;
        for step in plan.steps() {
            debug!(table = %table.name, step = %step, "nested save");
            match *step {
                Step::CreateRoot => work.insert(record)?,
                Step::UpdateRoot => work.update(record)?,
                Step::SaveOwner {
                    field,
                    relationship,
                    mode,
                } => save_owner(&mut work, record, table, field, relationship, mode)?,
                Step::SaveChildren {
                    field,
                    relationship,
                    mode,
                } => save_children(&mut work, record, table, field, relationship, mode)?,
                Step::LinkChildren {
                    field,
                    relationship,
                    mode,
                    prune,
                } => link_children(&mut work, record, table, field, relationship, mode, prune)?,
                _ => return Err(misplaced(step)),
            }
        }
        work.commit()
    }
}

fn misplaced(step: &Step<'_>) -> Error {
    Error::Usage(format!("step '{step}' cannot run in this operation"))
}

fn has_key(record: &dyn Entity) -> Result<bool> {
    match key_value(record, &record.describe()?) {
        Ok(_) => Ok(true),
        Err(Error::MissingKey { .. }) => Ok(false),
        Err(err) => Err(err),
    }
}

/// Mutable views of the records held in a relation slot.
fn related_records<'e>(
    record: &'e mut dyn Entity,
    table: &TableDescriptor,
    field: &str,
) -> Option<Vec<&'e mut dyn Entity>> {
    match record.relation_slot(field) {
        Some(RelationMut::One(slot)) => Some(slot.entity_mut().into_iter().collect()),
        Some(RelationMut::Many(slot)) => Some(slot.entities_mut()),
        None => {
            warn!(table = %table.name, field, "relation field not exposed, skipping");
            None
        }
    }
}

/// Inserts keyless related records; with [`SaveMode::Upsert`] also updates
/// the keyed ones.
fn persist_related(work: &mut UnitOfWork<'_>, related: &mut dyn Entity, mode: SaveMode) -> Result<()> {
    match (has_key(related)?, mode) {
        (false, _) => work.insert(related),
        (true, SaveMode::Upsert) => work.update(related),
        (true, SaveMode::Create) => Ok(()),
    }
}

fn save_owner(
    work: &mut UnitOfWork<'_>,
    record: &mut dyn Entity,
    table: &TableDescriptor,
    field: &str,
    relationship: &Relationship,
    mode: SaveMode,
) -> Result<()> {
    let key = {
        let Some(mut owners) = related_records(record, table, field) else {
            return Ok(());
        };
        let Some(owner) = owners.pop() else {
            return Ok(());
        };
        match mode {
            SaveMode::Create => work.insert(owner)?,
            SaveMode::Upsert => work.save(owner)?,
        }
        required_value(owner, &relationship.target, &relationship.reference_key)?
    };
    assign_column(record, table, &relationship.foreign_key, key)
}

fn save_children(
    work: &mut UnitOfWork<'_>,
    record: &mut dyn Entity,
    table: &TableDescriptor,
    field: &str,
    relationship: &Relationship,
    mode: SaveMode,
) -> Result<()> {
    let parent = required_value(record, table, &relationship.reference_key)?;
    let Some(children) = related_records(record, table, field) else {
        return Ok(());
    };
    for child in children {
        assign_column(child, &relationship.target, &relationship.foreign_key, parent.clone())?;
        match mode {
            SaveMode::Create => work.insert(child)?,
            SaveMode::Upsert => work.save(child)?,
        }
    }
    Ok(())
}

fn link_children(
    work: &mut UnitOfWork<'_>,
    record: &mut dyn Entity,
    table: &TableDescriptor,
    field: &str,
    relationship: &Relationship,
    mode: SaveMode,
    prune: bool,
) -> Result<()> {
    let owner_key = key_value(record, table)?;
    let current = match mode {
        SaveMode::Create => Vec::new(),
        SaveMode::Upsert => work.session().linked_keys(relationship, &owner_key)?,
    };
    let join_table = relationship.join()?.table;

    let Some(children) = related_records(record, table, field) else {
        return Ok(());
    };
    let mut desired: Vec<Value> = Vec::new();
    for child in children {
        persist_related(work, child, mode)?;
        let key = required_value(child, &relationship.target, relationship.target_key())?;
        if !current.contains(&key) && !desired.contains(&key) {
            let stmt = work
                .session()
                .link_statement(relationship, owner_key.clone(), key.clone())?;
            work.execute(WorkAction::Link, join_table, &stmt)?;
        }
        desired.push(key);
    }

    if prune {
        for stale in current.into_iter().filter(|k| !desired.contains(k)) {
            let stmt = work
                .session()
                .unlink_statement(relationship, owner_key.clone(), stale)?;
            work.execute(WorkAction::Unlink, join_table, &stmt)?;
        }
    }
    Ok(())
}

fn unlink_all(
    work: &mut UnitOfWork<'_>,
    record: &dyn Entity,
    table: &TableDescriptor,
    relationship: &Relationship,
    delete_related: bool,
) -> Result<()> {
    let join = relationship.join()?;
    let owner_key = key_value(record, table)?;
    let session = work.session();

    let related = if delete_related {
        session.linked_keys(relationship, &owner_key)?
    } else {
        Vec::new()
    };

    let stmt = session
        .builder(join.table)
        .delete()
        .filter_eq(join.foreign_key, owner_key)
        .build();
    work.execute(WorkAction::Unlink, join.table, &stmt)?;

    if !related.is_empty() {
        let builder = session.builder(&relationship.target.name).delete();
        let predicate = format!(
            "{} IN ({})",
            builder.quote_column(relationship.target_key()),
            vec!["?"; related.len()].join(", ")
        );
        let stmt = builder.filter(predicate, related).build();
        work.execute(WorkAction::Delete, &relationship.target.name, &stmt)?;
    }
    Ok(())
}
