//! Repository registration
//!
//! Maps each entity type to a factory that builds its repository from a
//! session. A registry is built once, then shared between coordinators.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use super::context::DatabaseContext;
use crate::entity::{simple_type_name, Entity};
use crate::repository::{RepositoryError, RepositoryResult};

type Factory<C, R> = Arc<dyn Fn(Arc<C>) -> R + Send + Sync>;

struct Registration {
    repository: &'static str,
    factory: Box<dyn Any + Send + Sync>,
}

/// Entity type to repository factory map for sessions of type `C`
pub struct RepositoryRegistry<C> {
    registrations: HashMap<TypeId, Registration>,
    _context: std::marker::PhantomData<fn(Arc<C>)>,
}

impl<C: 'static> RepositoryRegistry<C> {
    pub fn new() -> Self {
        Self {
            registrations: HashMap::new(),
            _context: std::marker::PhantomData,
        }
    }

    /// Register the repository for entity `T`, replacing any earlier one
    #[must_use]
    pub fn register<T, R, F>(mut self, factory: F) -> Self
    where
        T: Entity,
        R: Send + Sync + 'static,
        F: Fn(Arc<C>) -> R + Send + Sync + 'static,
    {
        let factory: Factory<C, R> = Arc::new(factory);
        let repository = simple_type_name::<R>();
        if self
            .registrations
            .insert(
                TypeId::of::<T>(),
                Registration {
                    repository,
                    factory: Box::new(factory),
                },
            )
            .is_some()
        {
            tracing::debug!(entity = T::entity_name(), repository, "Replaced repository registration");
        }
        self
    }

    /// Register the session's generic adapter for entity `T`
    #[must_use]
    pub fn register_default<T: Entity>(self) -> Self
    where
        C: DatabaseContext,
    {
        self.register::<T, _, _>(C::bind_repository::<T>)
    }

    /// Whether a repository is registered for entity `T`
    pub fn is_registered<T: Entity>(&self) -> bool {
        self.registrations.contains_key(&TypeId::of::<T>())
    }

    /// Number of registered entity types
    pub fn len(&self) -> usize {
        self.registrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registrations.is_empty()
    }

    /// Build the repository registered for `T` as type `R`
    ///
    /// Fails with `RepositoryNotRegistered` when nothing is registered for
    /// `T`, and with `CapabilityMismatch` when the registered repository is
    /// not an `R`.
    pub fn resolve<T, R>(&self, context: Arc<C>) -> RepositoryResult<R>
    where
        T: Entity,
        R: 'static,
    {
        let registration = self
            .registrations
            .get(&TypeId::of::<T>())
            .ok_or_else(|| RepositoryError::not_registered(T::entity_name()))?;
        let factory = registration
            .factory
            .downcast_ref::<Factory<C, R>>()
            .ok_or_else(|| {
                tracing::debug!(
                    entity = T::entity_name(),
                    registered = registration.repository,
                    requested = simple_type_name::<R>(),
                    "Repository type mismatch"
                );
                RepositoryError::capability_mismatch(T::entity_name(), simple_type_name::<R>())
            })?;
        Ok(factory(context))
    }

    /// Like [`Self::resolve`], but `None` instead of an error
    pub(crate) fn try_resolve<T, R>(&self, context: &Arc<C>) -> Option<R>
    where
        T: Entity,
        R: 'static,
    {
        self.registrations
            .get(&TypeId::of::<T>())
            .and_then(|registration| registration.factory.downcast_ref::<Factory<C, R>>())
            .map(|factory| factory(Arc::clone(context)))
    }
}

impl<C: 'static> Default for RepositoryRegistry<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> fmt::Debug for RepositoryRegistry<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut repositories: Vec<_> = self
            .registrations
            .values()
            .map(|registration| registration.repository)
            .collect();
        repositories.sort_unstable();
        f.debug_struct("RepositoryRegistry")
            .field("repositories", &repositories)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::RepositoryErrorKind;
    use crate::test_support::{Customer, Order};

    struct Session;

    #[derive(Debug, PartialEq)]
    struct Lookup(&'static str);

    #[test]
    fn test_resolve_registered() {
        let registry = RepositoryRegistry::<Session>::new().register::<Customer, _, _>(|_| Lookup("customers"));
        assert!(registry.is_registered::<Customer>());
        assert!(!registry.is_registered::<Order>());
        assert_eq!(registry.len(), 1);

        let resolved: Lookup = registry.resolve::<Customer, _>(Arc::new(Session)).unwrap();
        assert_eq!(resolved, Lookup("customers"));
    }

    #[test]
    fn test_resolve_failures() {
        let registry = RepositoryRegistry::<Session>::new().register::<Customer, _, _>(|_| Lookup("customers"));

        let err = registry
            .resolve::<Order, Lookup>(Arc::new(Session))
            .unwrap_err();
        assert_eq!(err.kind, RepositoryErrorKind::RepositoryNotRegistered);
        assert_eq!(err.entity_type.as_deref(), Some("Order"));

        let err = registry
            .resolve::<Customer, String>(Arc::new(Session))
            .unwrap_err();
        assert_eq!(err.kind, RepositoryErrorKind::CapabilityMismatch);
        assert!(err.message.contains("String"));
        assert!(registry.try_resolve::<Customer, String>(&Arc::new(Session)).is_none());
    }

    #[test]
    fn test_later_registration_wins() {
        let registry = RepositoryRegistry::<Session>::new()
            .register::<Customer, _, _>(|_| Lookup("first"))
            .register::<Customer, _, _>(|_| Lookup("second"));
        assert_eq!(registry.len(), 1);
        assert_eq!(
            registry.resolve::<Customer, Lookup>(Arc::new(Session)).unwrap(),
            Lookup("second")
        );
        assert!(format!("{:?}", registry).contains("Lookup"));
    }
}
