//! Document session and its deferred-write queue
//!
//! Document writes issued through a repository apply immediately. Writes
//! queued with [`DocumentContext::defer`] or
//! [`DocumentContext::defer_concurrent`] wait until
//! [`DocumentContext::save_changes`], which runs the ordered queue first,
//! then the concurrent batch, and reports every failure together.

use std::any::TypeId;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};

use futures::future::BoxFuture;
use futures::{FutureExt, StreamExt};

use super::SurrealClient;
use crate::entity::Entity;
use crate::repository::{RepositoryError, RepositoryResult};

/// Concurrent deferred writes in flight at once, unless configured
pub const DEFAULT_MAX_CONCURRENT_DEFERRED: usize = 8;

type DeferredAction = BoxFuture<'static, RepositoryResult<()>>;

enum Deferred {
    Ordered(DeferredAction),
    Concurrent(DeferredAction),
}

/// Configures collection names and commit concurrency before a session is opened
pub struct DocumentContextBuilder {
    pub(super) client: SurrealClient,
    pub(super) collections: HashMap<TypeId, String>,
    pub(super) max_concurrent_deferred: usize,
}

impl DocumentContextBuilder {
    /// Store entity `T` in `collection` instead of the pluralized entity name
    #[must_use]
    pub fn collection<T: Entity>(mut self, collection: impl Into<String>) -> Self {
        self.collections.insert(TypeId::of::<T>(), collection.into());
        self
    }

    /// Bound the number of concurrent deferred writes run by a commit
    #[must_use]
    pub fn max_concurrent_deferred(mut self, limit: usize) -> Self {
        self.max_concurrent_deferred = limit.max(1);
        self
    }

    /// Open the session
    pub fn build(self) -> DocumentContext {
        DocumentContext {
            client: self.client,
            collections: self.collections,
            max_concurrent_deferred: self.max_concurrent_deferred,
            deferred: Mutex::new(Vec::new()),
        }
    }
}

/// One document-store session
pub struct DocumentContext {
    client: SurrealClient,
    collections: HashMap<TypeId, String>,
    max_concurrent_deferred: usize,
    deferred: Mutex<Vec<Deferred>>,
}

impl DocumentContext {
    /// The underlying client
    pub fn client(&self) -> &SurrealClient {
        &self.client
    }

    /// Collection that stores entity `T` (`"{entity_name}s"` by default)
    pub fn collection_name<T: Entity>(&self) -> String {
        self.collections
            .get(&TypeId::of::<T>())
            .cloned()
            .unwrap_or_else(|| format!("{}s", T::entity_name()))
    }

    fn queue(&self) -> MutexGuard<'_, Vec<Deferred>> {
        self.deferred.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue a write to run, in order, on the next commit
    pub fn defer<F>(&self, action: F)
    where
        F: Future<Output = RepositoryResult<()>> + Send + 'static,
    {
        self.queue().push(Deferred::Ordered(action.boxed()));
    }

    /// Queue a write to run concurrently with other concurrent writes on the
    /// next commit
    pub fn defer_concurrent<F>(&self, action: F)
    where
        F: Future<Output = RepositoryResult<()>> + Send + 'static,
    {
        self.queue().push(Deferred::Concurrent(action.boxed()));
    }

    /// Number of queued writes
    pub fn pending(&self) -> usize {
        self.queue().len()
    }

    /// Run every queued write
    ///
    /// Ordered writes run one after another in the order they were queued,
    /// then concurrent writes run at most `max_concurrent_deferred` at a time.
    /// Every write is awaited even if an earlier one fails; failures are
    /// returned together as `DeferredWriteFailed`.
    pub async fn save_changes(&self) -> RepositoryResult<()> {
        let queued = std::mem::take(&mut *self.queue());
        if queued.is_empty() {
            return Ok(());
        }

        let total = queued.len();
        let mut failures = Vec::new();
        let mut concurrent = Vec::new();
        for action in queued {
            match action {
                Deferred::Ordered(write) => {
                    if let Err(e) = write.await {
                        failures.push(e);
                    }
                }
                Deferred::Concurrent(write) => concurrent.push(write),
            }
        }

        let results: Vec<RepositoryResult<()>> = futures::stream::iter(concurrent)
            .buffer_unordered(self.max_concurrent_deferred)
            .collect()
            .await;
        failures.extend(results.into_iter().filter_map(Result::err));

        if failures.is_empty() {
            tracing::debug!(writes = total, "Deferred writes committed");
            Ok(())
        } else {
            tracing::warn!(
                writes = total,
                failed = failures.len(),
                "Deferred writes failed during commit"
            );
            Err(RepositoryError::deferred_write_failed(failures))
        }
    }

    /// Whether the store answers
    ///
    /// With a `check_table` collection name, also checks that it can be queried.
    pub async fn ping(&self, check_table: Option<&str>) -> bool {
        if let Err(e) = self.client.health().await {
            tracing::warn!("Document store health check failed: {}", e);
            return false;
        }
        let Some(collection) = check_table else {
            return true;
        };
        match self
            .client
            .query("SELECT count() FROM type::table($table) GROUP ALL")
            .bind(("table", collection.to_string()))
            .await
            .and_then(|response| response.check())
        {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!(collection, "Document store ping failed: {}", e);
                false
            }
        }
    }
}

impl std::fmt::Debug for DocumentContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentContext")
            .field("collections", &self.collections.len())
            .field("max_concurrent_deferred", &self.max_concurrent_deferred)
            .field("pending", &self.pending())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::{RepositoryErrorKind, RepositoryOperation};
    use crate::test_support::document::database;
    use crate::test_support::Note;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_collection_names() {
        let db = database().await;
        assert_eq!(db.context().collection_name::<Note>(), "Notes");
        let ctx = db.context_builder().collection::<Note>("archive").build();
        assert_eq!(ctx.collection_name::<Note>(), "archive");
    }

    #[tokio::test]
    async fn test_ordered_writes_run_in_order() {
        let db = database().await;
        let ctx = db.context();
        let log = Arc::new(Mutex::new(Vec::new()));
        for i in 0..3 {
            let log = Arc::clone(&log);
            ctx.defer(async move {
                tokio::time::sleep(Duration::from_millis(5 * (3 - i))).await;
                log.lock().unwrap().push(i);
                Ok(())
            });
        }
        assert_eq!(ctx.pending(), 3);
        assert!(log.lock().unwrap().is_empty());

        ctx.save_changes().await.unwrap();
        assert_eq!(*log.lock().unwrap(), vec![0, 1, 2]);
        assert_eq!(ctx.pending(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_writes_respect_the_limit() {
        let db = database().await;
        let ctx = db.context_builder().max_concurrent_deferred(2).build();
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        for _ in 0..6 {
            let running = Arc::clone(&running);
            let peak = Arc::clone(&peak);
            ctx.defer_concurrent(async move {
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(10)).await;
                running.fetch_sub(1, Ordering::SeqCst);
                Ok(())
            });
        }
        ctx.save_changes().await.unwrap();
        assert!(peak.load(Ordering::SeqCst) <= 2);
        assert!(peak.load(Ordering::SeqCst) >= 1);
    }

    #[tokio::test]
    async fn test_failures_are_aggregated_and_others_still_run() {
        let db = database().await;
        let ctx = db.context();
        let done = Arc::new(AtomicUsize::new(0));

        ctx.defer(async {
            Err(RepositoryError::database_error(
                RepositoryOperation::Create,
                "first",
            ))
        });
        let counter = Arc::clone(&done);
        ctx.defer(async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        ctx.defer_concurrent(async {
            Err(RepositoryError::database_error(
                RepositoryOperation::Create,
                "second",
            ))
        });

        let err = ctx.save_changes().await.unwrap_err();
        assert_eq!(err.kind, RepositoryErrorKind::DeferredWriteFailed);
        assert!(err.message.starts_with("2 deferred write(s) failed"));
        assert_eq!(done.load(Ordering::SeqCst), 1);
        assert_eq!(ctx.pending(), 0);
    }

    #[tokio::test]
    async fn test_empty_commit_and_ping() {
        let db = database().await;
        let ctx = db.context();
        ctx.save_changes().await.unwrap();
        assert!(ctx.ping(None).await);
        assert!(ctx.ping(Some("Notes")).await);
    }
}
