//! Session abstraction shared by the adapters

use std::future::Future;
use std::sync::Arc;

use crate::entity::Entity;
use crate::repository::{Repository, RepositoryResult};

/// One backend session: the unit that repositories share and that commits
///
/// A relational session commits its open transaction; a document session
/// drains its deferred-write queue.
pub trait DatabaseContext: Send + Sync + 'static {
    /// The generic adapter bound to this kind of session
    type EntityRepository<T: Entity>: Repository<T> + Send + Sync + 'static;

    /// Bind the generic adapter for `T` to `context`
    fn bind_repository<T: Entity>(context: Arc<Self>) -> Self::EntityRepository<T>
    where
        Self: Sized;

    /// Whether the backend answers, optionally probing one table or collection
    fn ping(&self, check_table: Option<&str>) -> impl Future<Output = bool> + Send;

    /// Make every staged or deferred write durable
    fn save_changes(&self) -> impl Future<Output = RepositoryResult<()>> + Send;
}

#[cfg(feature = "database")]
impl DatabaseContext for crate::sql::SqlContext {
    type EntityRepository<T: Entity> = crate::sql::SqlRepository<T>;

    fn bind_repository<T: Entity>(context: Arc<Self>) -> Self::EntityRepository<T> {
        crate::sql::SqlRepository::new(context)
    }

    async fn ping(&self, check_table: Option<&str>) -> bool {
        crate::sql::SqlContext::ping(self, check_table).await
    }

    async fn save_changes(&self) -> RepositoryResult<()> {
        crate::sql::SqlContext::save_changes(self).await
    }
}

#[cfg(feature = "surrealdb")]
impl DatabaseContext for crate::document::DocumentContext {
    type EntityRepository<T: Entity> = crate::document::DocumentRepository<T>;

    fn bind_repository<T: Entity>(context: Arc<Self>) -> Self::EntityRepository<T> {
        crate::document::DocumentRepository::new(context)
    }

    async fn ping(&self, check_table: Option<&str>) -> bool {
        crate::document::DocumentContext::ping(self, check_table).await
    }

    async fn save_changes(&self) -> RepositoryResult<()> {
        crate::document::DocumentContext::save_changes(self).await
    }
}
