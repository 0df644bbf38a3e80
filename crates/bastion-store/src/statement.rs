//! Dialect-aware SQL text with bound arguments.
//!
//! Statements are assembled from fragments, quoted identifiers, a
//! [`QualifiedTable`] and bound [`Value`]s. Values never reach the SQL text.

use core::fmt;
use sqlx::any::AnyArguments;
use sqlx::query::Query;
use sqlx::Any;

use crate::Value;

/// SQL flavour of the connected database.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Dialect {
    Postgres,
    MySql,
    Sqlite,
}

impl Dialect {
    const fn quote_char(&self) -> char {
        match self {
            Self::MySql => '`',
            Self::Postgres | Self::Sqlite => '"',
        }
    }

    /// Appends `ident` quoted, doubling any embedded quote character.
    pub fn quote_into(&self, ident: &str, out: &mut String) {
        let q = self.quote_char();
        out.reserve(ident.len() + 2);
        out.push(q);
        for c in ident.chars() {
            if c == q {
                out.push(q);
            }
            out.push(c);
        }
        out.push(q);
    }

    pub fn quote(&self, ident: &str) -> String {
        let mut out = String::new();
        self.quote_into(ident, &mut out);
        out
    }

    /// Appends the placeholder for the 1-based argument `index`.
    fn placeholder_into(&self, index: usize, out: &mut String) {
        match self {
            Self::Postgres => {
                out.push('$');
                out.push_str(&index.to_string());
            }
            Self::MySql | Self::Sqlite => out.push('?'),
        }
    }
}

/// A table name with the configured prefix applied.
///
/// The only constructor is [`QualifiedTable::qualify`] and every statement
/// builder takes this type, so a name cannot be prefixed twice.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct QualifiedTable(String);

impl QualifiedTable {
    pub fn qualify(prefix: &str, raw: &str) -> Self {
        let mut name = String::with_capacity(prefix.len() + raw.len());
        name.push_str(prefix);
        name.push_str(raw);
        Self(name)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for QualifiedTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// SQL text plus its arguments in placeholder order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Statement {
    pub sql: String,
    pub args: Vec<Value>,
}

impl Statement {
    pub(crate) fn query(&self) -> Query<'_, Any, AnyArguments<'_>> {
        self.args
            .iter()
            .cloned()
            .fold(sqlx::query(&self.sql), |query, value| value.bind(query))
    }
}

pub struct StatementBuilder {
    dialect: Dialect,
    sql: String,
    args: Vec<Value>,
}

impl StatementBuilder {
    pub fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            sql: String::new(),
            args: Vec::new(),
        }
    }

    /// Appends trusted SQL text.
    pub fn push(&mut self, sql: &str) -> &mut Self {
        self.sql.push_str(sql);
        self
    }

    pub fn push_ident(&mut self, ident: &str) -> &mut Self {
        self.dialect.quote_into(ident, &mut self.sql);
        self
    }

    pub fn push_table(&mut self, table: &QualifiedTable) -> &mut Self {
        self.push_ident(table.as_str())
    }

    pub fn push_bind(&mut self, value: impl Into<Value>) -> &mut Self {
        self.args.push(value.into());
        self.dialect.placeholder_into(self.args.len(), &mut self.sql);
        self
    }

    /// Appends ` WHERE ...` for a non-empty filter.
    pub fn push_filter(&mut self, filter: &Filter) -> &mut Self {
        for (i, condition) in filter.conditions.iter().enumerate() {
            self.push(if i == 0 { " WHERE " } else { " AND " });
            match condition {
                Condition::Eq(column, value) => {
                    self.push_ident(column).push(" = ").push_bind(value.clone());
                }
                Condition::IsNull(column) => {
                    self.push_ident(column).push(" IS NULL");
                }
            }
        }
        self
    }

    /// Appends `a = ?, b = ?` for the given assignments.
    pub fn push_assignments(&mut self, columns: &[(String, Value)]) -> &mut Self {
        for (i, (column, value)) in columns.iter().enumerate() {
            if i > 0 {
                self.push(", ");
            }
            self.push_ident(column).push(" = ").push_bind(value.clone());
        }
        self
    }

    pub fn build(self) -> Statement {
        Statement {
            sql: self.sql,
            args: self.args,
        }
    }

    pub fn insert(dialect: Dialect, table: &QualifiedTable, columns: &[(String, Value)]) -> Statement {
        let mut b = Self::new(dialect);
        b.push("INSERT INTO ").push_table(table).push(" (");
        for (i, (column, _)) in columns.iter().enumerate() {
            if i > 0 {
                b.push(", ");
            }
            b.push_ident(column);
        }
        b.push(") VALUES (");
        for (i, (_, value)) in columns.iter().enumerate() {
            if i > 0 {
                b.push(", ");
            }
            b.push_bind(value.clone());
        }
        b.push(")");
        b.build()
    }

    pub fn update(
        dialect: Dialect,
        table: &QualifiedTable,
        columns: &[(String, Value)],
        filter: &Filter,
        extra: Option<&str>,
    ) -> Statement {
        let mut b = Self::new(dialect);
        b.push("UPDATE ")
            .push_table(table)
            .push(" SET ")
            .push_assignments(columns)
            .push_filter(filter);
        b.push_extra(extra);
        b.build()
    }

    pub fn delete(
        dialect: Dialect,
        table: &QualifiedTable,
        filter: &Filter,
        extra: Option<&str>,
    ) -> Statement {
        let mut b = Self::new(dialect);
        b.push("DELETE FROM ").push_table(table).push_filter(filter);
        b.push_extra(extra);
        b.build()
    }

    pub fn select(
        dialect: Dialect,
        table: &QualifiedTable,
        columns: &[&str],
        filter: &Filter,
    ) -> Statement {
        let mut b = Self::new(dialect);
        b.push("SELECT ");
        for (i, column) in columns.iter().enumerate() {
            if i > 0 {
                b.push(", ");
            }
            b.push_ident(column);
        }
        b.push(" FROM ").push_table(table).push_filter(filter);
        b.build()
    }

    fn push_extra(&mut self, extra: Option<&str>) {
        if let Some(extra) = extra.map(str::trim).filter(|e| !e.is_empty()) {
            self.push(" ").push(extra);
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum Condition {
    Eq(String, Value),
    IsNull(String),
}

impl Condition {
    fn column(&self) -> &str {
        match self {
            Self::Eq(column, _) | Self::IsNull(column) => column,
        }
    }
}

/// AND-ed conditions, rendered in insertion order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Filter {
    conditions: Vec<Condition>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.conditions.push(Condition::Eq(column.into(), value.into()));
        self
    }

    pub fn is_null(mut self, column: impl Into<String>) -> Self {
        self.conditions.push(Condition::IsNull(column.into()));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.conditions.iter().map(Condition::column)
    }
}
