use crate::{Audit, Result, Value};
use sqlx::any::AnyRow;

pub const ID: &str = "id";
pub const CREATED_TIME: &str = "created_time";
pub const CREATE_USER_ID: &str = "create_user_id";
pub const UPDATED_TIME: &str = "updated_time";
pub const UPDATE_USER_ID: &str = "update_user_id";
pub const DELETED_TIME: &str = "deleted_time";
pub const DELETE_USER_ID: &str = "delete_user_id";
pub const D_VERSION: &str = "d_version";

/// Every column the audit block knows about, in storage order.
pub const AUDIT_COLUMNS: [&str; 8] = [
    ID,
    CREATED_TIME,
    CREATE_USER_ID,
    UPDATED_TIME,
    UPDATE_USER_ID,
    DELETED_TIME,
    DELETE_USER_ID,
    D_VERSION,
];

/// Raw table name and the persisted column list of an entity.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Schema {
    pub table: &'static str,
    pub columns: &'static [&'static str],
}

impl Schema {
    pub const fn new(table: &'static str, columns: &'static [&'static str]) -> Self {
        Self { table, columns }
    }

    pub fn has(&self, column: &str) -> bool {
        self.columns.contains(&column)
    }
}

/// Which audit columns a schema persists, resolved once at registration.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Capabilities {
    pub id: bool,
    pub created_time: bool,
    pub create_user_id: bool,
    pub updated_time: bool,
    pub update_user_id: bool,
    pub deleted_time: bool,
    pub delete_user_id: bool,
    pub d_version: bool,
}

impl Capabilities {
    pub fn resolve(schema: &Schema) -> Self {
        Self {
            id: schema.has(ID),
            created_time: schema.has(CREATED_TIME),
            create_user_id: schema.has(CREATE_USER_ID),
            updated_time: schema.has(UPDATED_TIME),
            update_user_id: schema.has(UPDATE_USER_ID),
            deleted_time: schema.has(DELETED_TIME),
            delete_user_id: schema.has(DELETE_USER_ID),
            d_version: schema.has(D_VERSION),
        }
    }

    /// Deletes become updates only when the full triad is persisted.
    pub const fn soft_delete(&self) -> bool {
        self.deleted_time && self.delete_user_id && self.d_version
    }

    pub fn has(&self, column: &str) -> bool {
        match column {
            ID => self.id,
            CREATED_TIME => self.created_time,
            CREATE_USER_ID => self.create_user_id,
            UPDATED_TIME => self.updated_time,
            UPDATE_USER_ID => self.update_user_id,
            DELETED_TIME => self.deleted_time,
            DELETE_USER_ID => self.delete_user_id,
            D_VERSION => self.d_version,
            _ => false,
        }
    }
}

/// A record persisted through a [`Session`](crate::Session).
///
/// Implementors expose their embedded [`Audit`] block and their own
/// (non-audit) columns; the engine takes care of the audit columns.
pub trait Entity: Send + Sync + Sized + 'static {
    fn schema() -> &'static Schema;

    fn audit(&self) -> &Audit;

    fn audit_mut(&mut self) -> &mut Audit;

    /// Non-audit columns and their current values.
    fn columns(&self) -> Vec<(String, Value)>;

    /// Rebuilds the entity from a row whose audit block is already decoded.
    fn from_row(row: &AnyRow, audit: Audit) -> Result<Self>;

    /// Runs before any hook. An error aborts the operation untouched.
    fn validate(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn soft_delete_requires_the_full_triad() {
        let full = Schema::new("a", &[ID, DELETED_TIME, DELETE_USER_ID, D_VERSION]);
        assert!(Capabilities::resolve(&full).soft_delete());

        let partial = Schema::new("b", &[ID, DELETED_TIME, D_VERSION]);
        let caps = Capabilities::resolve(&partial);
        assert!(!caps.soft_delete());
        assert!(caps.deleted_time);
        assert!(!caps.has("name"));
    }
}
