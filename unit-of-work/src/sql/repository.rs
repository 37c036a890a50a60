//! Generic relational repository

use std::marker::PhantomData;
use std::sync::Arc;

use serde::Serialize;
use serde_json::{Map, Value};

use super::context::SqlContext;
use super::include::{load_includes, Include};
use super::{row, statement};
use crate::entity::{self, Entity, EntityField};
use crate::error::DatabaseOperation;
use crate::pagination::{PageRequest, PageSource, Pagination, Window};
use crate::repository::{
    FieldUpdates, FieldValue, Predicate, Repository, RepositoryError,
    RepositoryOperation, RepositoryResult,
};

/// Repository for entity `T` bound to one [`SqlContext`]
///
/// Reads without an explicit ordering keep the table's storage order, so a
/// page is always a slice of the unwindowed result.
pub struct SqlRepository<T: Entity> {
    context: Arc<SqlContext>,
    _entity: PhantomData<fn() -> T>,
}

impl<T: Entity> SqlRepository<T> {
    pub fn new(context: Arc<SqlContext>) -> Self {
        Self {
            context,
            _entity: PhantomData,
        }
    }

    /// The session this repository writes through
    pub fn context(&self) -> &Arc<SqlContext> {
        &self.context
    }

    /// The session's tracked state of the entity with identity `id`
    pub fn tracked(&self, id: impl Into<FieldValue>) -> Option<T> {
        self.context.tracked::<T>(id)
    }

    /// Every matching entity with `includes` attached
    pub async fn get_all_including(
        &self,
        predicate: Option<&Predicate<T>>,
        includes: &[Include],
    ) -> RepositoryResult<Vec<T>> {
        let mut records = self.fetch_records(predicate, None).await?;
        load_includes(&self.context, &mut records, includes)
            .await
            .map_err(|e| e.with_entity(T::entity_name()))?;
        records.into_iter().map(entity::from_record).collect()
    }

    /// One page of matching entities with `includes` attached
    pub async fn get_paged_including(
        &self,
        predicate: Option<&Predicate<T>>,
        request: PageRequest,
        includes: &[Include],
    ) -> RepositoryResult<Pagination<T>> {
        let mut records = self.fetch_records(predicate, request.window()).await?;
        load_includes(&self.context, &mut records, includes)
            .await
            .map_err(|e| e.with_entity(T::entity_name()))?;
        let items = records
            .into_iter()
            .map(entity::from_record)
            .collect::<RepositoryResult<Vec<T>>>()?;
        let total = self.count(predicate).await?;
        Ok(Pagination::assemble(items, total, request))
    }

    async fn fetch_records(
        &self,
        predicate: Option<&Predicate<T>>,
        window: Option<Window>,
    ) -> RepositoryResult<Vec<Map<String, Value>>> {
        let columns: Vec<&str> = T::Field::all().iter().map(|f| f.name()).collect();
        let stmt = statement::select(
            self.context.dialect(),
            self.context.table_name::<T>(),
            Some(columns.as_slice()),
            predicate.map(Predicate::conditions).unwrap_or_default(),
            predicate.and_then(Predicate::ordering),
            window,
        )
        .map_err(|e| e.with_entity(T::entity_name()))?;

        let rows = self
            .context
            .fetch_all(&stmt)
            .await
            .map_err(|e| e.with_entity(T::entity_name()))?;
        rows.iter().map(row::to_record).collect()
    }

    async fn insert(&self, entity: &T) -> RepositoryResult<()> {
        let record = entity::to_record(entity)?;
        let stmt = statement::insert(
            self.context.dialect(),
            self.context.table_name::<T>(),
            record.iter().map(|(column, value)| (column.as_str(), value)),
        )?;
        self.context
            .execute(&stmt, DatabaseOperation::Insert)
            .await
            .map_err(|e| e.with_entity(T::entity_name()))?;
        self.context.track(entity)
    }
}

impl<T: Entity> Clone for SqlRepository<T> {
    fn clone(&self) -> Self {
        Self::new(Arc::clone(&self.context))
    }
}

impl<T: Entity> std::fmt::Debug for SqlRepository<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqlRepository")
            .field("entity", &T::entity_name())
            .field("table", &self.context.table_name::<T>())
            .finish()
    }
}

impl<T: Entity> PageSource<T> for SqlRepository<T> {
    async fn fetch_window(
        &self,
        predicate: Option<&Predicate<T>>,
        window: Option<Window>,
    ) -> RepositoryResult<Vec<T>> {
        self.fetch_records(predicate, window)
            .await?
            .into_iter()
            .map(entity::from_record)
            .collect()
    }

    async fn count_matching(&self, predicate: Option<&Predicate<T>>) -> RepositoryResult<u64> {
        self.count(predicate).await
    }
}

impl<T: Entity> Repository<T> for SqlRepository<T> {
    async fn get_all(&self, predicate: Option<&Predicate<T>>) -> RepositoryResult<Vec<T>> {
        self.fetch_window(predicate, None).await
    }

    async fn get_paged(
        &self,
        predicate: Option<&Predicate<T>>,
        request: PageRequest,
    ) -> RepositoryResult<Pagination<T>> {
        crate::pagination::paginate_source(self, predicate, request).await
    }

    async fn count(&self, predicate: Option<&Predicate<T>>) -> RepositoryResult<u64> {
        let stmt = statement::count(
            self.context.dialect(),
            self.context.table_name::<T>(),
            predicate.map(Predicate::conditions).unwrap_or_default(),
        )?;
        let rows = self.context.fetch_all(&stmt).await.map_err(|e| {
            e.with_operation(RepositoryOperation::Count)
                .with_entity(T::entity_name())
        })?;
        rows.first().map_or(Ok(0), row::count_of)
    }

    async fn find(&self, predicate: &Predicate<T>) -> RepositoryResult<Option<T>> {
        let first = self
            .fetch_window(Some(predicate), Some(Window { offset: 0, limit: 1 }))
            .await
            .map_err(|e| e.with_operation(RepositoryOperation::Find))?
            .into_iter()
            .next();
        if let Some(found) = &first {
            self.context.track(found)?;
        }
        Ok(first)
    }

    async fn create(&self, entity: &T) -> RepositoryResult<()> {
        self.insert(entity).await
    }

    async fn create_bulk(&self, entities: &[T]) -> RepositoryResult<()> {
        for entity in entities {
            self.insert(entity).await?;
        }
        tracing::debug!(entity = T::entity_name(), count = entities.len(), "Bulk insert");
        Ok(())
    }

    async fn delete(&self, predicate: &Predicate<T>) -> RepositoryResult<u64> {
        let stmt = statement::delete(
            self.context.dialect(),
            self.context.table_name::<T>(),
            predicate.conditions(),
        )?;
        let removed = self
            .context
            .execute(&stmt, DatabaseOperation::Delete)
            .await
            .map_err(|e| e.with_entity(T::entity_name()))?;
        if removed > 0 {
            self.context.untrack_all::<T>();
        }
        Ok(removed)
    }

    async fn update(&self, entity: &T) -> RepositoryResult<()> {
        let record = entity::to_record(entity)?;
        let updates = FieldUpdates::<T>::from_object(&record)?;
        let id = entity::identity_of(entity)?;
        let stmt = statement::update_statement(
            self.context.dialect(),
            self.context.table_name::<T>(),
            &updates,
            T::Field::ID,
            &id,
        )?;
        let affected = self
            .context
            .execute(&stmt, DatabaseOperation::Update)
            .await
            .map_err(|e| e.with_entity(T::entity_name()))?;
        if affected == 0 {
            return Err(
                RepositoryError::not_found(T::entity_name(), T::Field::ID.name(), id.to_string())
                    .with_operation(RepositoryOperation::Update),
            );
        }
        self.context.track(entity)
    }

    async fn update_by_field<U>(
        &self,
        field: T::Field,
        value: FieldValue,
        updates: &U,
    ) -> RepositoryResult<u64>
    where
        U: Serialize + Sync + ?Sized,
    {
        let updates = FieldUpdates::<T>::from_object(updates)?;
        if updates.is_empty() {
            return Ok(0);
        }

        let stmt = statement::update_statement(
            self.context.dialect(),
            self.context.table_name::<T>(),
            &updates,
            field,
            &value,
        )?;
        let affected = self
            .context
            .execute(&stmt, DatabaseOperation::Update)
            .await
            .map_err(|e| e.with_entity(T::entity_name()))?;

        if affected > 0 {
            if updates.touches_identity() {
                // entries tracked under the previous identities are stale
                self.context.untrack_all::<T>();
            }
            // re-key on the assigned value when the filter field itself changed
            let key = updates
                .iter()
                .find(|(assigned, _)| *assigned == field)
                .and_then(|(_, v)| FieldValue::from_json(v))
                .unwrap_or(value);
            for reloaded in self.get_all(Some(&Predicate::field_eq(field, key))).await? {
                self.context.track(&reloaded)?;
            }
        }

        tracing::debug!(
            entity = T::entity_name(),
            field = field.name(),
            assignments = updates.len(),
            affected,
            "Partial update"
        );
        Ok(affected)
    }
}
