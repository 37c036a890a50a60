//! Repository trait definitions
//!
//! [`Repository`] is the contract both adapters implement. Adapters supply
//! the nullable fetch ([`Repository::find`]) and the mutations; the strict
//! tier, field and identity lookups and the wrap-with-cause forms are provided
//! on top of it so every backend reports "not found" the same way.
//!
//! # Example
//!
//! ```rust,ignore
//! let customers = uow.get_entity_repository::<Customer>()?;
//!
//! let maybe = customers.find_by_id("c-1").await?;          // Option<Customer>
//! let sure = customers.get_by_id("c-1").await?;            // NotFound on None
//! let mine = customers
//!     .get_by_id_or_raise("c-1", |cause| AppError::MissingCustomer(cause))
//!     .await?;
//! ```

use std::future::Future;

use serde::de::DeserializeOwned;
use serde::Serialize;

use super::error::{RepositoryError, RepositoryOperation};
use super::filter::{FieldValue, Predicate};
use crate::entity::{Entity, EntityField};
use crate::pagination::{PageRequest, Pagination};

/// Result type for repository operations
pub type RepositoryResult<T> = std::result::Result<T, RepositoryError>;

/// Field name reported by predicate-based strict fetches
pub const CONDITION_FIELD: &str = "condition";

/// Per-entity CRUD, query and pagination contract
///
/// Async methods return `impl Future + Send` (RPITIT), so repositories can
/// be used from multi-threaded runtimes without boxing.
pub trait Repository<T: Entity>: Send + Sync {
    /// All entities matching `predicate` (all entities when `None`)
    fn get_all(
        &self,
        predicate: Option<&Predicate<T>>,
    ) -> impl Future<Output = RepositoryResult<Vec<T>>> + Send;

    /// One page of entities matching `predicate`
    ///
    /// See [`crate::pagination`] for the unbounded-request rules.
    fn get_paged(
        &self,
        predicate: Option<&Predicate<T>>,
        request: PageRequest,
    ) -> impl Future<Output = RepositoryResult<Pagination<T>>> + Send;

    /// Number of entities matching `predicate`
    fn count(
        &self,
        predicate: Option<&Predicate<T>>,
    ) -> impl Future<Output = RepositoryResult<u64>> + Send;

    /// First entity matching `predicate`, or `None`
    fn find(
        &self,
        predicate: &Predicate<T>,
    ) -> impl Future<Output = RepositoryResult<Option<T>>> + Send;

    /// Persist a new entity
    fn create(&self, entity: &T) -> impl Future<Output = RepositoryResult<()>> + Send;

    /// Persist several new entities
    fn create_bulk(&self, entities: &[T]) -> impl Future<Output = RepositoryResult<()>> + Send;

    /// Delete every entity matching `predicate`, returning how many were removed
    fn delete(
        &self,
        predicate: &Predicate<T>,
    ) -> impl Future<Output = RepositoryResult<u64>> + Send;

    /// Replace the stored entity that has the same identity
    fn update(&self, entity: &T) -> impl Future<Output = RepositoryResult<()>> + Send;

    /// Assign the top-level fields of `updates` to every entity whose
    /// `field` equals `value`, returning the number of affected entities
    fn update_by_field<U>(
        &self,
        field: T::Field,
        value: FieldValue,
        updates: &U,
    ) -> impl Future<Output = RepositoryResult<u64>> + Send
    where
        U: Serialize + Sync + ?Sized;

    /// Project every matching entity into another deserializable shape
    fn get_all_as<R>(
        &self,
        predicate: Option<&Predicate<T>>,
    ) -> impl Future<Output = RepositoryResult<Vec<R>>> + Send
    where
        R: DeserializeOwned + Send,
    {
        async move {
            self.get_all(predicate)
                .await?
                .iter()
                .map(|entity| {
                    serde_json::to_value(entity)
                        .and_then(serde_json::from_value)
                        .map_err(|e| {
                            RepositoryError::from(e)
                                .with_operation(RepositoryOperation::FindAll)
                                .with_entity(T::entity_name())
                        })
                })
                .collect()
        }
    }

    /// Map every matching entity through `selector`
    fn get_all_with<R, F>(
        &self,
        selector: F,
        predicate: Option<&Predicate<T>>,
    ) -> impl Future<Output = RepositoryResult<Vec<R>>> + Send
    where
        F: FnMut(T) -> R + Send,
        R: Send,
    {
        async move { Ok(self.get_all(predicate).await?.into_iter().map(selector).collect()) }
    }

    /// Whether any entity matches `predicate`
    fn exist(&self, predicate: &Predicate<T>) -> impl Future<Output = RepositoryResult<bool>> + Send {
        async move { Ok(self.count(Some(predicate)).await? > 0) }
    }

    /// First entity whose `field` equals `value`, or `None`
    fn find_by_field(
        &self,
        field: T::Field,
        value: impl Into<FieldValue> + Send,
    ) -> impl Future<Output = RepositoryResult<Option<T>>> + Send {
        let predicate = Predicate::<T>::field_eq(field, value);
        async move { self.find(&predicate).await }
    }

    /// Entity with the given identity, or `None`
    fn find_by_id(
        &self,
        id: impl Into<FieldValue> + Send,
    ) -> impl Future<Output = RepositoryResult<Option<T>>> + Send {
        self.find_by_field(T::Field::ID, id)
    }

    /// First entity matching `predicate`
    ///
    /// Fails with `NotFound` (field `condition`, value the rendered predicate).
    fn get(&self, predicate: &Predicate<T>) -> impl Future<Output = RepositoryResult<T>> + Send {
        async move {
            self.find(predicate).await?.ok_or_else(|| {
                RepositoryError::not_found(T::entity_name(), CONDITION_FIELD, predicate.to_string())
            })
        }
    }

    /// First entity whose `field` equals `value`
    ///
    /// Fails with `NotFound` naming the field and value.
    fn get_by_field(
        &self,
        field: T::Field,
        value: impl Into<FieldValue> + Send,
    ) -> impl Future<Output = RepositoryResult<T>> + Send {
        let value = value.into();
        async move {
            let rendered = value.to_string();
            self.find_by_field(field, value).await?.ok_or_else(|| {
                RepositoryError::not_found(T::entity_name(), field.name(), rendered)
            })
        }
    }

    /// Entity with the given identity
    fn get_by_id(
        &self,
        id: impl Into<FieldValue> + Send,
    ) -> impl Future<Output = RepositoryResult<T>> + Send {
        self.get_by_field(T::Field::ID, id)
    }

    /// Nullable fetch that reports any failure through the caller's error
    fn find_or_raise<E, W>(
        &self,
        predicate: &Predicate<T>,
        wrap: W,
    ) -> impl Future<Output = Result<Option<T>, E>> + Send
    where
        W: FnOnce(RepositoryError) -> E + Send,
        E: Send,
    {
        async move { self.find(predicate).await.map_err(wrap) }
    }

    /// Strict fetch that reports any failure, including "not found", through
    /// the caller's error; the original failure is handed to `wrap`
    fn get_or_raise<E, W>(
        &self,
        predicate: &Predicate<T>,
        wrap: W,
    ) -> impl Future<Output = Result<T, E>> + Send
    where
        W: FnOnce(RepositoryError) -> E + Send,
        E: Send,
    {
        async move { self.get(predicate).await.map_err(wrap) }
    }

    /// [`Repository::get_by_field`] with a caller-supplied error
    fn get_by_field_or_raise<E, W>(
        &self,
        field: T::Field,
        value: impl Into<FieldValue> + Send,
        wrap: W,
    ) -> impl Future<Output = Result<T, E>> + Send
    where
        W: FnOnce(RepositoryError) -> E + Send,
        E: Send,
    {
        let value = value.into();
        async move { self.get_by_field(field, value).await.map_err(wrap) }
    }

    /// [`Repository::get_by_id`] with a caller-supplied error
    fn get_by_id_or_raise<E, W>(
        &self,
        id: impl Into<FieldValue> + Send,
        wrap: W,
    ) -> impl Future<Output = Result<T, E>> + Send
    where
        W: FnOnce(RepositoryError) -> E + Send,
        E: Send,
    {
        self.get_by_field_or_raise(T::Field::ID, id, wrap)
    }

    /// [`Repository::update_by_field`] keyed on the identity field
    fn update_by_id<U>(
        &self,
        id: impl Into<FieldValue> + Send,
        updates: &U,
    ) -> impl Future<Output = RepositoryResult<u64>> + Send
    where
        U: Serialize + Sync + ?Sized,
    {
        self.update_by_field(T::Field::ID, id.into(), updates)
    }
}
