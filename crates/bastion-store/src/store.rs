use bastion_id::IdGenerator;
use sqlx::any::{AnyPoolOptions, AnyRow};
use sqlx::AnyPool;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::{
    ActorContext, AuditLifecycle, Capabilities, DatabaseConfig, Dialect, Driver, Entity, Error,
    Lifecycle, QualifiedTable, Result, Schema, Session, Statement,
};

/// A connection pool plus the hook engine installed on it.
///
/// Cloning is cheap; clones share the pool.
#[derive(Clone)]
pub struct Store {
    inner: Arc<StoreInner>,
}

struct StoreInner {
    pool: AnyPool,
    dialect: Dialect,
    prefix: String,
    ids: Arc<IdGenerator>,
    debug: bool,
}

impl Store {
    /// Opens the pool described by `config`. Entities registered on the
    /// returned store draw their IDs from `ids`.
    pub async fn open(config: &DatabaseConfig, ids: Arc<IdGenerator>) -> Result<Self> {
        sqlx::any::install_default_drivers();

        let max = config.max_connections();
        if max < config.max_open_conns {
            tracing::warn!(
                requested = config.max_open_conns,
                max,
                "private in-memory database, pool limited to one connection"
            );
        }
        let mut options = AnyPoolOptions::new()
            .max_connections(max)
            .min_connections(config.max_idle_conns.min(max));
        if config.driver == Driver::Sqlite {
            // An in-memory database lives exactly as long as its connection.
            options = options.idle_timeout(None).max_lifetime(None);
        }

        let pool = options
            .connect(&config.url())
            .await
            .map_err(|source| Error::Open {
                driver: config.driver.as_str(),
                source,
            })?;

        tracing::info!(
            driver = %config.driver,
            url = %config.redacted_url(),
            max_open = max,
            table_prefix = %config.table_prefix,
            "database pool opened"
        );

        Ok(Self {
            inner: Arc::new(StoreInner {
                pool,
                dialect: config.driver.dialect(),
                prefix: config.table_prefix.clone(),
                ids,
                debug: config.debug,
            }),
        })
    }

    /// Closes the pool. Later statements fail with [`Error::Sql`].
    pub async fn close(&self) {
        self.inner.pool.close().await;
        tracing::info!("database pool closed");
    }

    pub fn is_closed(&self) -> bool {
        self.inner.pool.is_closed()
    }

    pub fn dialect(&self) -> Dialect {
        self.inner.dialect
    }

    pub fn ids(&self) -> &IdGenerator {
        &self.inner.ids
    }

    pub fn pool(&self) -> &AnyPool {
        &self.inner.pool
    }

    pub fn qualify(&self, raw: &str) -> QualifiedTable {
        QualifiedTable::qualify(&self.inner.prefix, raw)
    }

    /// Resolves the engine's hooks for `E` once.
    pub fn register<E: Entity>(&self) -> Table<E> {
        self.register_with(AuditLifecycle::resolve(E::schema()))
    }

    pub fn register_with<E, L>(&self, lifecycle: L) -> Table<E>
    where
        E: Entity,
        L: Lifecycle<E> + 'static,
    {
        let schema = E::schema();
        let table = Table {
            table: self.qualify(schema.table),
            schema,
            caps: Capabilities::resolve(schema),
            lifecycle: Arc::new(lifecycle),
            _entity: PhantomData,
        };
        tracing::debug!(
            table = %table.table,
            soft_delete = table.caps.soft_delete(),
            "entity registered"
        );
        table
    }

    pub fn session(&self, actor: ActorContext) -> Session<'_> {
        Session::new(self, actor)
    }

    pub async fn execute(&self, statement: &Statement) -> Result<u64> {
        self.trace(statement);
        let done = statement.query().execute(&self.inner.pool).await?;
        Ok(done.rows_affected())
    }

    pub async fn fetch_all(&self, statement: &Statement) -> Result<Vec<AnyRow>> {
        self.trace(statement);
        Ok(statement.query().fetch_all(&self.inner.pool).await?)
    }

    fn trace(&self, statement: &Statement) {
        if self.inner.debug {
            tracing::debug!(sql = %statement.sql, args = ?statement.args, "executing statement");
        }
    }
}

impl core::fmt::Debug for Store {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Store")
            .field("dialect", &self.inner.dialect)
            .field("prefix", &self.inner.prefix)
            .field("node_id", &self.inner.ids.node_id())
            .finish()
    }
}

/// A registered entity type: its qualified table, persisted audit columns
/// and resolved lifecycle.
pub struct Table<E: Entity> {
    table: QualifiedTable,
    schema: &'static Schema,
    caps: Capabilities,
    lifecycle: Arc<dyn Lifecycle<E>>,
    _entity: PhantomData<fn() -> E>,
}

impl<E: Entity> Clone for Table<E> {
    fn clone(&self) -> Self {
        Self {
            table: self.table.clone(),
            schema: self.schema,
            caps: self.caps,
            lifecycle: Arc::clone(&self.lifecycle),
            _entity: PhantomData,
        }
    }
}

impl<E: Entity> Table<E> {
    pub fn name(&self) -> &QualifiedTable {
        &self.table
    }

    pub fn schema(&self) -> &'static Schema {
        self.schema
    }

    pub fn capabilities(&self) -> &Capabilities {
        &self.caps
    }

    pub(crate) fn lifecycle(&self) -> &dyn Lifecycle<E> {
        self.lifecycle.as_ref()
    }
}
