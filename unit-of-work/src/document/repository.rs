//! Generic document repository

use std::marker::PhantomData;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use super::context::DocumentContext;
use super::query::{self, SurrealQuery};
use super::SurrealClient;
use crate::entity::{self, Entity, EntityField};
use crate::error::{DatabaseError, DatabaseOperation};
use crate::pagination::{PageRequest, PageSource, Pagination, Window};
use crate::repository::{
    FieldUpdates, FieldValue, FilterCondition, FilterOperator, Predicate, Repository,
    RepositoryError, RepositoryResult,
};

#[derive(Deserialize)]
struct CountRow {
    total: u64,
}

fn store_error(err: surrealdb::Error, operation: DatabaseOperation) -> RepositoryError {
    DatabaseError::from(err).during(operation).into()
}

async fn run(
    client: &SurrealClient,
    query: SurrealQuery,
    operation: DatabaseOperation,
) -> RepositoryResult<surrealdb::Response> {
    tracing::trace!(query = %query.text, "surrealql");
    client
        .query(query.text)
        .bind(query.bindings)
        .await
        .and_then(|response| response.check())
        .map_err(|e| store_error(e, operation))
}

fn take_count(response: &mut surrealdb::Response, operation: DatabaseOperation) -> RepositoryResult<u64> {
    let rows: Vec<CountRow> = response.take(0).map_err(|e| store_error(e, operation))?;
    Ok(rows.first().map_or(0, |row| row.total))
}

async fn insert_document(
    client: SurrealClient,
    collection: String,
    document: Map<String, Value>,
) -> RepositoryResult<()> {
    let key = Uuid::now_v7().simple().to_string();
    run(
        &client,
        query::create(&collection, &key, document),
        DatabaseOperation::Insert,
    )
    .await?;
    Ok(())
}

/// Repository for entity `T` bound to one [`DocumentContext`]
pub struct DocumentRepository<T: Entity> {
    context: Arc<DocumentContext>,
    _entity: PhantomData<fn() -> T>,
}

impl<T: Entity> DocumentRepository<T> {
    pub fn new(context: Arc<DocumentContext>) -> Self {
        Self {
            context,
            _entity: PhantomData,
        }
    }

    /// The session this repository belongs to
    pub fn context(&self) -> &Arc<DocumentContext> {
        &self.context
    }

    /// Queue the creation of `entity` until the next commit
    ///
    /// The entity is serialized now, so serialization errors surface here.
    pub fn create_without_commit(&self, entity: &T) -> RepositoryResult<()> {
        let write = self.deferred_insert(entity)?;
        self.context.defer(write);
        Ok(())
    }

    /// Like [`Self::create_without_commit`], but the write may run
    /// concurrently with other concurrent deferred writes
    pub fn create_without_commit_concurrent(&self, entity: &T) -> RepositoryResult<()> {
        let write = self.deferred_insert(entity)?;
        self.context.defer_concurrent(write);
        Ok(())
    }

    fn deferred_insert(
        &self,
        entity: &T,
    ) -> RepositoryResult<impl std::future::Future<Output = RepositoryResult<()>> + Send + 'static>
    {
        let document = entity::to_record(entity)?;
        let client = self.context.client().clone();
        let collection = self.context.collection_name::<T>();
        let name = T::entity_name();
        Ok(async move {
            insert_document(client, collection, document)
                .await
                .map_err(|e| e.with_entity(name))
        })
    }

    /// Generic view: matching documents as JSON records
    async fn fetch_documents(
        &self,
        predicate: Option<&Predicate<T>>,
        window: Option<Window>,
    ) -> RepositoryResult<Vec<Map<String, Value>>> {
        let query = self.select_query(predicate, window)?;
        let mut response = run(self.context.client(), query, DatabaseOperation::Query)
            .await
            .map_err(|e| e.with_entity(T::entity_name()))?;
        let documents: Vec<Value> = response
            .take(0)
            .map_err(|e| store_error(e, DatabaseOperation::Query).with_entity(T::entity_name()))?;
        Ok(documents
            .into_iter()
            .filter_map(|document| match document {
                Value::Object(map) => Some(map),
                _ => None,
            })
            .collect())
    }

    fn select_query(
        &self,
        predicate: Option<&Predicate<T>>,
        window: Option<Window>,
    ) -> RepositoryResult<SurrealQuery> {
        query::select(
            &self.context.collection_name::<T>(),
            predicate.map(Predicate::conditions).unwrap_or_default(),
            predicate.and_then(Predicate::ordering),
            window,
        )
    }
}

impl<T: Entity> Clone for DocumentRepository<T> {
    fn clone(&self) -> Self {
        Self::new(Arc::clone(&self.context))
    }
}

impl<T: Entity> std::fmt::Debug for DocumentRepository<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentRepository")
            .field("entity", &T::entity_name())
            .field("collection", &self.context.collection_name::<T>())
            .finish()
    }
}

impl<T: Entity> PageSource<T> for DocumentRepository<T> {
    /// Typed view: documents decoded straight into `T`
    async fn fetch_window(
        &self,
        predicate: Option<&Predicate<T>>,
        window: Option<Window>,
    ) -> RepositoryResult<Vec<T>> {
        let query = self.select_query(predicate, window)?;
        let mut response = run(self.context.client(), query, DatabaseOperation::Query)
            .await
            .map_err(|e| e.with_entity(T::entity_name()))?;
        response
            .take(0)
            .map_err(|e| store_error(e, DatabaseOperation::Query).with_entity(T::entity_name()))
    }

    async fn count_matching(&self, predicate: Option<&Predicate<T>>) -> RepositoryResult<u64> {
        self.count(predicate).await
    }
}

impl<T: Entity> Repository<T> for DocumentRepository<T> {
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
        let query = query::count(
            &self.context.collection_name::<T>(),
            predicate.map(Predicate::conditions).unwrap_or_default(),
        )?;
        let mut response = run(self.context.client(), query, DatabaseOperation::Query)
            .await
            .map_err(|e| e.with_entity(T::entity_name()))?;
        take_count(&mut response, DatabaseOperation::Query)
    }

    async fn find(&self, predicate: &Predicate<T>) -> RepositoryResult<Option<T>> {
        let first = self
            .fetch_documents(Some(predicate), Some(Window { offset: 0, limit: 1 }))
            .await?
            .into_iter()
            .next();
        first.map(entity::from_record).transpose()
    }

    async fn create(&self, entity: &T) -> RepositoryResult<()> {
        insert_document(
            self.context.client().clone(),
            self.context.collection_name::<T>(),
            entity::to_record(entity)?,
        )
        .await
        .map_err(|e| e.with_entity(T::entity_name()))
    }

    async fn create_bulk(&self, entities: &[T]) -> RepositoryResult<()> {
        for entity in entities {
            self.create(entity).await?;
        }
        tracing::debug!(entity = T::entity_name(), count = entities.len(), "Bulk insert");
        Ok(())
    }

    async fn delete(&self, predicate: &Predicate<T>) -> RepositoryResult<u64> {
        let query = query::delete(&self.context.collection_name::<T>(), predicate.conditions())?;
        let mut response = run(self.context.client(), query, DatabaseOperation::Delete)
            .await
            .map_err(|e| e.with_entity(T::entity_name()))?;
        take_count(&mut response, DatabaseOperation::Delete)
    }

    /// Replace the document with the same identity, creating it when absent
    async fn update(&self, entity: &T) -> RepositoryResult<()> {
        let document = entity::to_record(entity)?;
        let key = [FilterCondition::new(
            T::Field::ID.name(),
            FilterOperator::Equal,
            entity::identity_of(entity)?,
        )];
        let query = query::replace(&self.context.collection_name::<T>(), document, &key)?;
        let mut response = run(self.context.client(), query, DatabaseOperation::Update)
            .await
            .map_err(|e| e.with_entity(T::entity_name()))?;
        if take_count(&mut response, DatabaseOperation::Update)? == 0 {
            self.create(entity).await?;
        }
        Ok(())
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

        let key = [FilterCondition::new(field.name(), FilterOperator::Equal, value)];
        let query = query::update(
            &self.context.collection_name::<T>(),
            updates.iter().map(|(assigned, v)| (assigned.name(), v)),
            &key,
        )?;
        let mut response = run(self.context.client(), query, DatabaseOperation::Update)
            .await
            .map_err(|e| e.with_entity(T::entity_name()))?;
        let affected = take_count(&mut response, DatabaseOperation::Update)?;

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
