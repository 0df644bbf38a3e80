//! Error types for the data layer.
//!
//! Validation failures are reported before any hook runs, so a failed
//! operation never carries partially stamped audit fields.

pub type Result<T, E = Error> = core::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The connection pool could not be opened.
    #[error("failed to open {driver} pool: {source}")]
    Open {
        driver: &'static str,
        #[source]
        source: sqlx::Error,
    },

    /// The database driver name is not one of the supported drivers.
    #[error("unsupported database driver `{0}`")]
    UnsupportedDriver(String),

    /// Statement execution failed.
    #[error("statement failed: {0}")]
    Sql(#[from] sqlx::Error),

    /// The entity or change-set was rejected before reaching the database.
    #[error("validation failed: {0}")]
    Validation(String),

    /// A change-set or filter names a column the table does not have.
    #[error("table `{table}` has no column `{column}`")]
    UnknownColumn { table: String, column: String },

    /// An update carried no changes.
    #[error("change-set for `{0}` is empty")]
    EmptyChangeSet(String),

    /// An update or delete carried no condition and would touch every row.
    #[error("refusing to modify every row of `{0}` without a condition")]
    MissingCondition(String),

    /// A row could not be decoded into an entity.
    #[error("failed to decode `{column}`: {source}")]
    Decode {
        column: String,
        #[source]
        source: sqlx::Error,
    },

    /// The ID generator could not be built.
    #[error("id generator: {0}")]
    Id(#[from] bastion_id::Error),
}
