use chrono::{DateTime, Utc};
use sqlx::any::AnyRow;
use sqlx::Row;

use crate::schema::*;
use crate::{millis_to_time, Error, Result, Value};

/// The audit block every entity embeds.
///
/// Which fields are persisted depends on the entity's [`Schema`]; the rest
/// are still stamped in memory.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Audit {
    /// `0` means not yet assigned.
    pub id: i64,
    pub created_time: Option<DateTime<Utc>>,
    pub create_user_id: Option<i64>,
    pub updated_time: Option<DateTime<Utc>>,
    pub update_user_id: Option<i64>,
    pub deleted_time: Option<DateTime<Utc>>,
    pub delete_user_id: Option<i64>,
    pub d_version: Option<String>,
}

impl Audit {
    pub const fn is_blank(&self) -> bool {
        self.id == 0
    }

    /// The persisted audit columns, in [`AUDIT_COLUMNS`] order.
    pub fn values(&self, caps: &Capabilities) -> Vec<(String, Value)> {
        AUDIT_COLUMNS
            .iter()
            .filter(|c| caps.has(c))
            .map(|&c| (c.to_string(), self.value(c)))
            .collect()
    }

    fn value(&self, column: &str) -> Value {
        match column {
            ID => Value::from(self.id),
            CREATED_TIME => Value::from(self.created_time),
            CREATE_USER_ID => Value::from(self.create_user_id),
            UPDATED_TIME => Value::from(self.updated_time),
            UPDATE_USER_ID => Value::from(self.update_user_id),
            DELETED_TIME => Value::from(self.deleted_time),
            DELETE_USER_ID => Value::from(self.delete_user_id),
            D_VERSION => Value::from(self.d_version.clone()),
            _ => Value::NULL_TEXT,
        }
    }

    /// Copies audit assignments back into the block. Non-audit columns and
    /// mismatched value kinds are ignored.
    pub fn absorb<'a>(&mut self, assignments: impl IntoIterator<Item = &'a (String, Value)>) {
        for (column, value) in assignments {
            match (column.as_str(), value) {
                (ID, Value::Int(Some(v))) => self.id = *v,
                (CREATED_TIME, Value::Int(v)) => self.created_time = millis_to_time(*v),
                (CREATE_USER_ID, Value::Int(v)) => self.create_user_id = *v,
                (UPDATED_TIME, Value::Int(v)) => self.updated_time = millis_to_time(*v),
                (UPDATE_USER_ID, Value::Int(v)) => self.update_user_id = *v,
                (DELETED_TIME, Value::Int(v)) => self.deleted_time = millis_to_time(*v),
                (DELETE_USER_ID, Value::Int(v)) => self.delete_user_id = *v,
                (D_VERSION, Value::Text(v)) => self.d_version = v.clone(),
                _ => {}
            }
        }
    }

    pub fn decode(row: &AnyRow, caps: &Capabilities) -> Result<Self> {
        let int = |column: &str, present: bool| -> Result<Option<i64>> {
            if present { decode_column(row, column) } else { Ok(None) }
        };
        Ok(Self {
            id: int(ID, caps.id)?.unwrap_or_default(),
            created_time: millis_to_time(int(CREATED_TIME, caps.created_time)?),
            create_user_id: int(CREATE_USER_ID, caps.create_user_id)?,
            updated_time: millis_to_time(int(UPDATED_TIME, caps.updated_time)?),
            update_user_id: int(UPDATE_USER_ID, caps.update_user_id)?,
            deleted_time: millis_to_time(int(DELETED_TIME, caps.deleted_time)?),
            delete_user_id: int(DELETE_USER_ID, caps.delete_user_id)?,
            d_version: if caps.d_version { decode_column(row, D_VERSION)? } else { None },
        })
    }
}

/// Reads one column, attributing failures to it.
pub fn decode_column<'r, T>(row: &'r AnyRow, column: &str) -> Result<T>
where
    T: sqlx::Decode<'r, sqlx::Any> + sqlx::Type<sqlx::Any>,
{
    row.try_get(column).map_err(|source| Error::Decode {
        column: column.to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn values_follow_capabilities() {
        let schema = Schema::new("t", &[ID, CREATED_TIME, D_VERSION, "name"]);
        let caps = Capabilities::resolve(&schema);
        let audit = Audit {
            id: 5,
            d_version: Some("v1".into()),
            ..Audit::default()
        };
        let values = audit.values(&caps);
        let names: Vec<_> = values.iter().map(|(c, _)| c.as_str()).collect();
        assert_eq!(names, [ID, CREATED_TIME, D_VERSION]);
        assert_eq!(values[1].1, Value::NULL_INT);
    }

    #[test]
    fn absorb_copies_audit_assignments_only() {
        let now = DateTime::<Utc>::from_timestamp_millis(1_700_000_000_000).unwrap();
        let mut audit = Audit::default();
        audit.absorb(&[
            (UPDATED_TIME.to_string(), Value::from(now)),
            (UPDATE_USER_ID.to_string(), Value::from(3_i64)),
            (D_VERSION.to_string(), Value::from("v2")),
            ("name".to_string(), Value::from("ignored")),
        ]);
        assert_eq!(audit.updated_time, Some(now));
        assert_eq!(audit.update_user_id, Some(3));
        assert_eq!(audit.d_version.as_deref(), Some("v2"));
        assert!(audit.is_blank());
    }
}
