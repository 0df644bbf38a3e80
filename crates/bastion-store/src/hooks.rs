//! The persistence hook engine.
//!
//! Hooks are resolved once per entity type into a [`Lifecycle`] and invoked
//! by the [`Session`](crate::Session) around every create, update and delete.

use bastion_id::IdGenerator;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::schema::*;
use crate::{ActorContext, Entity, Error, Result, Value};

/// Everything a hook may read: who, when, and where fresh IDs come from.
pub struct HookContext<'a> {
    pub actor: &'a ActorContext,
    pub now: DateTime<Utc>,
    pub ids: &'a IdGenerator,
}

impl HookContext<'_> {
    pub fn user_id(&self) -> Option<i64> {
        self.actor.user_id()
    }
}

/// A fresh optimistic-concurrency token.
pub fn new_version() -> String {
    Uuid::new_v4().to_string()
}

/// Ordered column assignments for an update.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ChangeSet {
    columns: Vec<(String, Value)>,
}

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets `column`, replacing an earlier assignment to it.
    pub fn set(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(column, value);
        self
    }

    pub fn insert(&mut self, column: impl Into<String>, value: impl Into<Value>) {
        let column = column.into();
        let value = value.into();
        match self.columns.iter_mut().find(|(c, _)| *c == column) {
            Some((_, slot)) => *slot = value,
            None => self.columns.push((column, value)),
        }
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns
            .iter()
            .find_map(|(c, v)| (c == column).then_some(v))
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn assignments(&self) -> &[(String, Value)] {
        &self.columns
    }

    /// Rejects empty change-sets, unknown columns and attempts to move the
    /// primary key.
    pub fn validate(&self, schema: &Schema) -> Result<()> {
        if self.is_empty() {
            return Err(Error::EmptyChangeSet(schema.table.to_string()));
        }
        for (column, _) in &self.columns {
            if !schema.has(column) {
                return Err(Error::UnknownColumn {
                    table: schema.table.to_string(),
                    column: column.clone(),
                });
            }
            if column == ID {
                return Err(Error::Validation(format!(
                    "`{ID}` of `{}` cannot be updated",
                    schema.table
                )));
            }
        }
        Ok(())
    }
}

impl From<Vec<(String, Value)>> for ChangeSet {
    fn from(columns: Vec<(String, Value)>) -> Self {
        columns
            .into_iter()
            .fold(Self::new(), |set, (c, v)| set.set(c, v))
    }
}

/// How a delete is carried out. Exactly one plan is taken per delete.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DeletePlan {
    /// Rewrite into an `UPDATE` of the soft-delete triad.
    Soft {
        deleted_time: DateTime<Utc>,
        delete_user_id: Option<i64>,
        d_version: String,
    },
    /// Physically remove the rows.
    Hard,
}

impl DeletePlan {
    pub fn assignments(&self) -> Vec<(String, Value)> {
        match self {
            Self::Soft {
                deleted_time,
                delete_user_id,
                d_version,
            } => vec![
                (DELETED_TIME.to_string(), Value::from(*deleted_time)),
                (DELETE_USER_ID.to_string(), Value::from(*delete_user_id)),
                (D_VERSION.to_string(), Value::from(d_version.as_str())),
            ],
            Self::Hard => Vec::new(),
        }
    }
}

/// Typed hooks run by the session around each write.
pub trait Lifecycle<E: Entity>: Send + Sync {
    fn before_create(&self, ctx: &HookContext<'_>, entity: &mut E);

    fn before_update(&self, ctx: &HookContext<'_>, changes: &mut ChangeSet);

    fn before_delete(&self, ctx: &HookContext<'_>, unscoped: bool) -> DeletePlan;
}

/// The engine's hooks: ID assignment, audit stamping, version tokens and
/// soft deletes, driven by the columns the schema persists.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AuditLifecycle {
    caps: Capabilities,
}

impl AuditLifecycle {
    pub fn resolve(schema: &Schema) -> Self {
        Self {
            caps: Capabilities::resolve(schema),
        }
    }

    pub const fn capabilities(&self) -> &Capabilities {
        &self.caps
    }
}

impl<E: Entity> Lifecycle<E> for AuditLifecycle {
    fn before_create(&self, ctx: &HookContext<'_>, entity: &mut E) {
        let audit = entity.audit_mut();
        if audit.is_blank() {
            audit.id = ctx.ids.generate().as_i64();
        }
        if audit.created_time.is_none() {
            audit.created_time = Some(ctx.now);
        }
        if audit.create_user_id.is_none() {
            audit.create_user_id = ctx.user_id();
        }
        if audit.updated_time.is_none() {
            audit.updated_time = Some(ctx.now);
        }
        if audit.update_user_id.is_none() {
            audit.update_user_id = ctx.user_id();
        }
        if audit.d_version.is_none() {
            audit.d_version = Some(new_version());
        }
    }

    fn before_update(&self, ctx: &HookContext<'_>, changes: &mut ChangeSet) {
        if self.caps.updated_time {
            changes.insert(UPDATED_TIME, ctx.now);
        }
        if self.caps.update_user_id {
            changes.insert(UPDATE_USER_ID, ctx.user_id());
        }
        if self.caps.d_version {
            changes.insert(D_VERSION, new_version());
        }
    }

    fn before_delete(&self, ctx: &HookContext<'_>, unscoped: bool) -> DeletePlan {
        if self.caps.soft_delete() && !unscoped {
            DeletePlan::Soft {
                deleted_time: ctx.now,
                delete_user_id: ctx.user_id(),
                d_version: new_version(),
            }
        } else {
            DeletePlan::Hard
        }
    }
}
