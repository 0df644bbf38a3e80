use chrono::Utc;

use crate::schema::*;
use crate::{
    ActorContext, Audit, ChangeSet, DeletePlan, Entity, Error, Filter, HookContext, Result,
    StatementBuilder, Store, Table, Value,
};

/// Trailing SQL appended after a delete's condition.
///
/// The fragment is trusted caller text and is not escaped.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DeleteOptions {
    pub extra: Option<String>,
}

impl DeleteOptions {
    pub fn extra(extra: impl Into<String>) -> Self {
        Self {
            extra: Some(extra.into()),
        }
    }
}

/// Entity operations on behalf of one actor.
///
/// Scoped sessions hide soft-deleted rows and soft-delete when the schema
/// allows it; [`Session::unscoped`] sees every row and always hard-deletes.
#[derive(Clone, Copy, Debug)]
pub struct Session<'s> {
    store: &'s Store,
    actor: ActorContext,
    unscoped: bool,
}

impl<'s> Session<'s> {
    pub(crate) fn new(store: &'s Store, actor: ActorContext) -> Self {
        Self {
            store,
            actor,
            unscoped: false,
        }
    }

    pub fn unscoped(self) -> Self {
        Self {
            unscoped: true,
            ..self
        }
    }

    pub fn is_unscoped(&self) -> bool {
        self.unscoped
    }

    pub fn actor(&self) -> &ActorContext {
        &self.actor
    }

    fn hook_context(&self) -> HookContext<'_> {
        HookContext {
            actor: &self.actor,
            now: Utc::now(),
            ids: self.store.ids(),
        }
    }

    fn scope<E: Entity>(&self, table: &Table<E>, filter: Filter) -> Filter {
        if !self.unscoped && table.capabilities().deleted_time {
            filter.is_null(DELETED_TIME)
        } else {
            filter
        }
    }

    fn check_filter<E: Entity>(&self, table: &Table<E>, filter: &Filter) -> Result<()> {
        let schema = table.schema();
        match filter.columns().find(|c| !schema.has(c)) {
            Some(column) => Err(Error::UnknownColumn {
                table: schema.table.to_string(),
                column: column.to_string(),
            }),
            None => Ok(()),
        }
    }

    /// Inserts `entity`, assigning its ID and audit fields first.
    pub async fn create<E: Entity>(&self, table: &Table<E>, entity: &mut E) -> Result<()> {
        entity.validate()?;
        if entity.audit().is_blank() {
            entity.audit_mut().id = self.store.ids().generate_async().await.as_i64();
        }
        table.lifecycle().before_create(&self.hook_context(), entity);

        let mut columns = entity.audit().values(table.capabilities());
        columns.extend(entity.columns());
        let statement =
            StatementBuilder::insert(self.store.dialect(), table.name(), &columns);
        self.store.execute(&statement).await?;
        Ok(())
    }

    /// Applies `changes` to every row matching `filter`.
    pub async fn update<E: Entity>(
        &self,
        table: &Table<E>,
        filter: Filter,
        mut changes: ChangeSet,
    ) -> Result<u64> {
        changes.validate(table.schema())?;
        self.check_filter(table, &filter)?;
        if filter.is_empty() {
            return Err(Error::MissingCondition(table.name().to_string()));
        }
        table
            .lifecycle()
            .before_update(&self.hook_context(), &mut changes);

        let filter = self.scope(table, filter);
        let statement = StatementBuilder::update(
            self.store.dialect(),
            table.name(),
            changes.assignments(),
            &filter,
            None,
        );
        self.store.execute(&statement).await
    }

    /// Writes every non-audit column of `entity` by ID and copies the
    /// stamped audit values back into it. When no row matched, `entity` is
    /// left untouched and `Ok(0)` is returned.
    pub async fn save<E: Entity>(&self, table: &Table<E>, entity: &mut E) -> Result<u64> {
        entity.validate()?;
        let id = entity.audit().id;
        if id == 0 {
            return Err(Error::Validation(format!(
                "cannot save a `{}` row without an id",
                table.schema().table
            )));
        }
        let mut changes = ChangeSet::from(entity.columns());
        changes.validate(table.schema())?;
        table
            .lifecycle()
            .before_update(&self.hook_context(), &mut changes);

        let filter = self.scope(table, Filter::new().eq(ID, id));
        let statement = StatementBuilder::update(
            self.store.dialect(),
            table.name(),
            changes.assignments(),
            &filter,
            None,
        );
        let affected = self.store.execute(&statement).await?;
        if affected > 0 {
            entity.audit_mut().absorb(changes.assignments());
        }
        Ok(affected)
    }

    /// Deletes `entity` by ID. A soft delete that hit a row writes its stamps
    /// back.
    pub async fn delete<E: Entity>(
        &self,
        table: &Table<E>,
        entity: &mut E,
        options: DeleteOptions,
    ) -> Result<u64> {
        let id = entity.audit().id;
        if id == 0 {
            return Err(Error::MissingCondition(table.name().to_string()));
        }
        let (affected, plan) = self.run_delete(table, Filter::new().eq(ID, id), options).await?;
        if affected > 0 {
            entity.audit_mut().absorb(&plan.assignments());
        }
        Ok(affected)
    }

    pub async fn delete_where<E: Entity>(
        &self,
        table: &Table<E>,
        filter: Filter,
        options: DeleteOptions,
    ) -> Result<u64> {
        self.check_filter(table, &filter)?;
        if filter.is_empty() {
            return Err(Error::MissingCondition(table.name().to_string()));
        }
        let (affected, _) = self.run_delete(table, filter, options).await?;
        Ok(affected)
    }

    async fn run_delete<E: Entity>(
        &self,
        table: &Table<E>,
        filter: Filter,
        options: DeleteOptions,
    ) -> Result<(u64, DeletePlan)> {
        let plan = table
            .lifecycle()
            .before_delete(&self.hook_context(), self.unscoped);
        let filter = self.scope(table, filter);
        let extra = options.extra.as_deref();
        let dialect = self.store.dialect();

        let statement = match &plan {
            DeletePlan::Soft { .. } => StatementBuilder::update(
                dialect,
                table.name(),
                &plan.assignments(),
                &filter,
                extra,
            ),
            DeletePlan::Hard => StatementBuilder::delete(dialect, table.name(), &filter, extra),
        };
        let affected = self.store.execute(&statement).await?;
        tracing::debug!(
            table = %table.name(),
            soft = matches!(plan, DeletePlan::Soft { .. }),
            affected,
            "delete"
        );
        Ok((affected, plan))
    }

    /// First row matching `filter`, if any.
    pub async fn find<E: Entity>(&self, table: &Table<E>, filter: Filter) -> Result<Option<E>> {
        Ok(self.all(table, filter).await?.into_iter().next())
    }

    pub async fn find_by_id<E: Entity>(&self, table: &Table<E>, id: i64) -> Result<Option<E>> {
        self.find(table, Filter::new().eq(ID, Value::from(id))).await
    }

    pub async fn all<E: Entity>(&self, table: &Table<E>, filter: Filter) -> Result<Vec<E>> {
        self.check_filter(table, &filter)?;
        let filter = self.scope(table, filter);
        let statement = StatementBuilder::select(
            self.store.dialect(),
            table.name(),
            table.schema().columns,
            &filter,
        );
        self.store
            .fetch_all(&statement)
            .await?
            .iter()
            .map(|row| {
                let audit = Audit::decode(row, table.capabilities())?;
                E::from_row(row, audit)
            })
            .collect()
    }
}
