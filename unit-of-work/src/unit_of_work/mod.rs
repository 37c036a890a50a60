//! Unit-of-work coordinator
//!
//! A [`UnitOfWork`] owns exactly one session. Every repository it hands out
//! shares that session, so their writes commit together through
//! [`UnitOfWork::commit_changes`].
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use unit_of_work::prelude::*;
//! # use serde::{Deserialize, Serialize};
//! # #[derive(Debug, Clone, Serialize, Deserialize)]
//! # struct Customer { #[serde(rename = "Id")] id: String }
//! # #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
//! # enum CustomerField { Id }
//! # impl EntityField for CustomerField {
//! #     const ID: Self = Self::Id;
//! #     fn name(self) -> &'static str { "Id" }
//! #     fn all() -> &'static [Self] { &[Self::Id] }
//! # }
//! # impl Entity for Customer { type Field = CustomerField; }
//!
//! # async fn example(database: unit_of_work::sql::SqlDatabase) -> RepositoryResult<()> {
//! let uow = UnitOfWork::new(database.context());
//! let customers = uow.get_entity_repository::<Customer>()?;
//! customers.create(&Customer { id: "c-1".into() }).await?;
//! uow.commit_changes().await?;
//! # Ok(())
//! # }
//! ```

mod context;
mod registry;

use std::sync::Arc;

use crate::entity::Entity;
use crate::repository::{RepositoryError, RepositoryOperation, RepositoryResult};

pub use context::DatabaseContext;
pub use registry::RepositoryRegistry;

/// Coordinates repositories over one shared session
pub struct UnitOfWork<C: DatabaseContext> {
    context: Option<Arc<C>>,
    registry: Arc<RepositoryRegistry<C>>,
}

impl<C: DatabaseContext> UnitOfWork<C> {
    /// A coordinator bound to `context` with no registered repositories
    pub fn new(context: C) -> Self {
        Self::with_registry(context, Arc::new(RepositoryRegistry::new()))
    }

    /// A coordinator bound to `context` that resolves through `registry`
    pub fn with_registry(context: C, registry: Arc<RepositoryRegistry<C>>) -> Self {
        Self {
            context: Some(Arc::new(context)),
            registry,
        }
    }

    /// A coordinator with no session yet
    pub fn unbound(registry: Arc<RepositoryRegistry<C>>) -> Self {
        Self {
            context: None,
            registry,
        }
    }

    /// Bind a session, returning the one it replaces
    pub fn bind(&mut self, context: C) -> Option<Arc<C>> {
        self.bind_shared(Arc::new(context))
    }

    /// Bind a session that is already shared
    pub fn bind_shared(&mut self, context: Arc<C>) -> Option<Arc<C>> {
        let previous = self.context.replace(context);
        if previous.is_some() {
            tracing::debug!("Unit of work rebound to a new session");
        }
        previous
    }

    /// Detach the session; later operations fail with `SessionNotBound`
    pub fn release(&mut self) -> Option<Arc<C>> {
        self.context.take()
    }

    pub fn is_bound(&self) -> bool {
        self.context.is_some()
    }

    /// The bound session
    pub fn context(&self) -> RepositoryResult<&Arc<C>> {
        self.bound(RepositoryOperation::Resolve)
    }

    pub fn registry(&self) -> &Arc<RepositoryRegistry<C>> {
        &self.registry
    }

    fn bound(&self, operation: RepositoryOperation) -> RepositoryResult<&Arc<C>> {
        self.context
            .as_ref()
            .ok_or_else(|| RepositoryError::session_not_bound(operation))
    }

    /// Repository for `T` over this coordinator's session
    ///
    /// Uses the registered repository when it is the session's generic
    /// adapter type, otherwise binds a fresh generic adapter.
    pub fn get_entity_repository<T: Entity>(&self) -> RepositoryResult<C::EntityRepository<T>> {
        let context = self.bound(RepositoryOperation::Resolve)?;
        Ok(self
            .registry
            .try_resolve::<T, C::EntityRepository<T>>(context)
            .unwrap_or_else(|| C::bind_repository::<T>(Arc::clone(context))))
    }

    /// The repository registered for `T`, as the requested type `R`
    pub fn get_repository<R, T>(&self) -> RepositoryResult<R>
    where
        R: 'static,
        T: Entity,
    {
        let context = self.bound(RepositoryOperation::Resolve)?;
        self.registry.resolve::<T, R>(Arc::clone(context))
    }

    /// Commit everything staged or deferred in the session
    pub async fn commit_changes(&self) -> RepositoryResult<()> {
        let context = self.bound(RepositoryOperation::Commit)?;
        context.save_changes().await?;
        tracing::info!("Unit of work committed");
        Ok(())
    }

    /// Whether the session's backend answers; `false` when unbound
    pub async fn ping(&self, check_table: Option<&str>) -> bool {
        match &self.context {
            Some(context) => context.ping(check_table).await,
            None => false,
        }
    }
}

impl<C: DatabaseContext> std::fmt::Debug for UnitOfWork<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnitOfWork")
            .field("bound", &self.is_bound())
            .field("registry", &self.registry)
            .finish()
    }
}
