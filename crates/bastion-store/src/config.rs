use core::fmt;
use core::str::FromStr;
use serde::{Deserialize, Serialize};

use crate::{Dialect, Error};

/// The database drivers the pool can open.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Driver {
    Postgres,
    Mysql,
    Sqlite,
}

impl Driver {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Postgres => "postgres",
            Self::Mysql => "mysql",
            Self::Sqlite => "sqlite",
        }
    }

    pub const fn dialect(&self) -> Dialect {
        match self {
            Self::Postgres => Dialect::Postgres,
            Self::Mysql => Dialect::MySql,
            Self::Sqlite => Dialect::Sqlite,
        }
    }
}

impl FromStr for Driver {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(Self::Postgres),
            "mysql" => Ok(Self::Mysql),
            "sqlite" => Ok(Self::Sqlite),
            _ => Err(Error::UnsupportedDriver(s.to_string())),
        }
    }
}

impl fmt::Display for Driver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Connection and pool settings for [`Store::open`](crate::Store::open).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub driver: Driver,
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    /// Database name; for SQLite the file path, or `:memory:`.
    pub name: String,
    /// Driver options appended as a query string, e.g. `sslmode=disable`.
    pub options: String,
    /// Prepended to every table name exactly once.
    pub table_prefix: String,
    pub max_idle_conns: u32,
    pub max_open_conns: u32,
    /// Log every statement at `debug`.
    pub debug: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            driver: Driver::Sqlite,
            host: String::from("localhost"),
            port: 5432,
            user: String::new(),
            password: String::new(),
            name: String::from(":memory:"),
            options: String::new(),
            table_prefix: String::new(),
            max_idle_conns: 1,
            max_open_conns: 1,
            debug: false,
        }
    }
}

impl DatabaseConfig {
    /// Builds the connection URL understood by `sqlx`'s `Any` driver.
    ///
    /// Credentials are inserted verbatim and must therefore be URL-safe.
    pub fn url(&self) -> String {
        let mut url = match self.driver {
            Driver::Postgres | Driver::Mysql => format!(
                "{}://{}:{}@{}:{}/{}",
                self.driver, self.user, self.password, self.host, self.port, self.name
            ),
            Driver::Sqlite => format!("sqlite:{}", self.name),
        };
        if !self.options.is_empty() {
            url.push('?');
            url.push_str(&self.options);
        }
        url
    }

    /// Whether every connection would open its own private SQLite database.
    pub fn is_private_memory(&self) -> bool {
        self.driver == Driver::Sqlite
            && (self.name.contains(":memory:") || self.options.contains("mode=memory"))
            && !self.options.contains("cache=shared")
    }

    /// The pool size actually used: `max_open_conns`, at least one, and
    /// exactly one for a private in-memory database.
    pub fn max_connections(&self) -> u32 {
        if self.is_private_memory() {
            1
        } else {
            self.max_open_conns.max(1)
        }
    }

    /// The URL with the password masked, for logging.
    pub fn redacted_url(&self) -> String {
        if self.password.is_empty() {
            return self.url();
        }
        self.url()
            .replacen(&format!(":{}@", self.password), ":***@", 1)
    }
}
