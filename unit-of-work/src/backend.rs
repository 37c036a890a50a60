//! Backend selected by configuration
//!
//! [`Store::connect`] opens whichever adapter `unit_of_work.backend` names.
//! [`AnyContext`] and [`AnyRepository`] dispatch to that adapter, so code
//! written against them runs unchanged on either backend.

use std::sync::Arc;

use serde::Serialize;

use crate::config::{Backend, Config};
use crate::entity::Entity;
use crate::error::{Error, Result};
use crate::pagination::{PageRequest, Pagination};
use crate::repository::{FieldValue, Predicate, Repository, RepositoryResult};
use crate::unit_of_work::{DatabaseContext, RepositoryRegistry, UnitOfWork};

#[cfg(feature = "surrealdb")]
use crate::document::{DocumentContext, DocumentDatabase, DocumentRepository};
#[cfg(feature = "database")]
use crate::sql::{SqlContext, SqlDatabase, SqlRepository};

/// A connected backend
#[derive(Debug, Clone)]
pub enum Store {
    #[cfg(feature = "database")]
    Relational(SqlDatabase),
    #[cfg(feature = "surrealdb")]
    Document {
        database: DocumentDatabase,
        max_concurrent_deferred: usize,
    },
}

impl Store {
    /// Connect the backend named by `config.unit_of_work.backend`
    pub async fn connect(config: &Config) -> Result<Self> {
        match config.unit_of_work.backend {
            Backend::Relational => Self::connect_relational(config).await,
            Backend::Document => Self::connect_document(config).await,
        }
    }

    #[cfg(feature = "database")]
    async fn connect_relational(config: &Config) -> Result<Self> {
        let database = config
            .database
            .as_ref()
            .ok_or_else(|| Error::MissingConfig("[database] section".to_string()))?;
        Ok(Self::Relational(crate::sql::connect(database).await?))
    }

    #[cfg(not(feature = "database"))]
    async fn connect_relational(_config: &Config) -> Result<Self> {
        Err(Error::MissingConfig(
            "relational backend requires the `database` feature".to_string(),
        ))
    }

    #[cfg(feature = "surrealdb")]
    async fn connect_document(config: &Config) -> Result<Self> {
        let surrealdb = config
            .surrealdb
            .as_ref()
            .ok_or_else(|| Error::MissingConfig("[surrealdb] section".to_string()))?;
        Ok(Self::Document {
            database: crate::document::connect(surrealdb).await?,
            max_concurrent_deferred: config.unit_of_work.max_concurrent_deferred,
        })
    }

    #[cfg(not(feature = "surrealdb"))]
    async fn connect_document(_config: &Config) -> Result<Self> {
        Err(Error::MissingConfig(
            "document backend requires the `surrealdb` feature".to_string(),
        ))
    }

    /// Which backend this store is
    pub fn backend(&self) -> Backend {
        match self {
            #[cfg(feature = "database")]
            Self::Relational(_) => Backend::Relational,
            #[cfg(feature = "surrealdb")]
            Self::Document { .. } => Backend::Document,
        }
    }

    /// Open a new session
    pub fn context(&self) -> AnyContext {
        match self {
            #[cfg(feature = "database")]
            Self::Relational(database) => AnyContext::Relational(Arc::new(database.context())),
            #[cfg(feature = "surrealdb")]
            Self::Document {
                database,
                max_concurrent_deferred,
            } => AnyContext::Document(Arc::new(
                database
                    .context_builder()
                    .max_concurrent_deferred(*max_concurrent_deferred)
                    .build(),
            )),
        }
    }

    /// A coordinator over a new session
    pub fn unit_of_work(&self, registry: Arc<RepositoryRegistry<AnyContext>>) -> UnitOfWork<AnyContext> {
        UnitOfWork::with_registry(self.context(), registry)
    }
}

/// A session on whichever backend was selected
#[derive(Debug, Clone)]
pub enum AnyContext {
    #[cfg(feature = "database")]
    Relational(Arc<SqlContext>),
    #[cfg(feature = "surrealdb")]
    Document(Arc<DocumentContext>),
}

impl DatabaseContext for AnyContext {
    type EntityRepository<T: Entity> = AnyRepository<T>;

    fn bind_repository<T: Entity>(context: Arc<Self>) -> AnyRepository<T> {
        match &*context {
            #[cfg(feature = "database")]
            Self::Relational(sql) => AnyRepository::Relational(SqlRepository::new(Arc::clone(sql))),
            #[cfg(feature = "surrealdb")]
            Self::Document(document) => {
                AnyRepository::Document(DocumentRepository::new(Arc::clone(document)))
            }
        }
    }

    async fn ping(&self, check_table: Option<&str>) -> bool {
        match self {
            #[cfg(feature = "database")]
            Self::Relational(context) => context.ping(check_table).await,
            #[cfg(feature = "surrealdb")]
            Self::Document(context) => context.ping(check_table).await,
        }
    }

    async fn save_changes(&self) -> RepositoryResult<()> {
        match self {
            #[cfg(feature = "database")]
            Self::Relational(context) => context.save_changes().await,
            #[cfg(feature = "surrealdb")]
            Self::Document(context) => context.save_changes().await,
        }
    }
}

/// A repository on whichever backend was selected
pub enum AnyRepository<T: Entity> {
    #[cfg(feature = "database")]
    Relational(SqlRepository<T>),
    #[cfg(feature = "surrealdb")]
    Document(DocumentRepository<T>),
}

macro_rules! dispatch {
    ($repository:expr, $inner:ident => $call:expr) => {
        match $repository {
            #[cfg(feature = "database")]
            AnyRepository::Relational($inner) => $call,
            #[cfg(feature = "surrealdb")]
            AnyRepository::Document($inner) => $call,
        }
    };
}

impl<T: Entity> Clone for AnyRepository<T> {
    fn clone(&self) -> Self {
        match self {
            #[cfg(feature = "database")]
            Self::Relational(repository) => Self::Relational(repository.clone()),
            #[cfg(feature = "surrealdb")]
            Self::Document(repository) => Self::Document(repository.clone()),
        }
    }
}

impl<T: Entity> std::fmt::Debug for AnyRepository<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let backend = match self {
            #[cfg(feature = "database")]
            Self::Relational(_) => "relational",
            #[cfg(feature = "surrealdb")]
            Self::Document(_) => "document",
        };
        f.debug_struct("AnyRepository")
            .field("entity", &T::entity_name())
            .field("backend", &backend)
            .finish()
    }
}

impl<T: Entity> Repository<T> for AnyRepository<T> {
    async fn get_all(&self, predicate: Option<&Predicate<T>>) -> RepositoryResult<Vec<T>> {
        dispatch!(self, repository => repository.get_all(predicate).await)
    }

    async fn get_paged(
        &self,
        predicate: Option<&Predicate<T>>,
        request: PageRequest,
    ) -> RepositoryResult<Pagination<T>> {
        dispatch!(self, repository => repository.get_paged(predicate, request).await)
    }

    async fn count(&self, predicate: Option<&Predicate<T>>) -> RepositoryResult<u64> {
        dispatch!(self, repository => repository.count(predicate).await)
    }

    async fn find(&self, predicate: &Predicate<T>) -> RepositoryResult<Option<T>> {
        dispatch!(self, repository => repository.find(predicate).await)
    }

    async fn create(&self, entity: &T) -> RepositoryResult<()> {
        dispatch!(self, repository => repository.create(entity).await)
    }

    async fn create_bulk(&self, entities: &[T]) -> RepositoryResult<()> {
        dispatch!(self, repository => repository.create_bulk(entities).await)
    }

    async fn delete(&self, predicate: &Predicate<T>) -> RepositoryResult<u64> {
        dispatch!(self, repository => repository.delete(predicate).await)
    }

    async fn update(&self, entity: &T) -> RepositoryResult<()> {
        dispatch!(self, repository => repository.update(entity).await)
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
        dispatch!(self, repository => repository.update_by_field(field, value, updates).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DatabaseConfig, SurrealDbConfig};
    use crate::test_support::{Note, NoteField};
    use serde_json::json;

    fn config(backend: Backend) -> Config {
        let mut config = Config::default();
        config.unit_of_work.backend = backend;
        config.unit_of_work.max_concurrent_deferred = 2;
        config.database = Some(DatabaseConfig {
            url: "sqlite::memory:".to_string(),
            max_connections: 1,
            min_connections: 1,
            connection_timeout_secs: 5,
            max_retries: 0,
            retry_delay_secs: 0,
        });
        config.surrealdb = Some(SurrealDbConfig {
            url: "mem://".to_string(),
            namespace: "test".to_string(),
            database: "test".to_string(),
            username: None,
            password: None,
            max_retries: 0,
            retry_delay_secs: 0,
        });
        config
    }

    /// The same calls behave the same on either backend
    async fn exercise(store: &Store) {
        let uow = store.unit_of_work(Arc::new(RepositoryRegistry::new()));
        let notes = uow.get_entity_repository::<Note>().unwrap();

        notes
            .create_bulk(&[
                Note::new("A", "alpha", 3),
                Note::new("B", "beta", 5),
                Note::new("C", "gamma", 1),
            ])
            .await
            .unwrap();
        let page = notes.get_paged(None, PageRequest::new(2, 2)).await.unwrap();
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].id, "C");
        assert_eq!(page.total_pages, 2);

        assert_eq!(notes.update_by_id("B", &json!({"stars": 7})).await.unwrap(), 1);
        assert_eq!(notes.get_by_id("B").await.unwrap().stars, 7);
        assert_eq!(
            notes
                .delete(&Predicate::<Note>::new().lt(NoteField::Stars, 4))
                .await
                .unwrap(),
            2
        );

        uow.commit_changes().await.unwrap();
        assert_eq!(notes.count(None).await.unwrap(), 1);
        assert!(uow.ping(None).await);
    }

    #[cfg(feature = "database")]
    async fn relational_store() -> Store {
        let store = Store::connect(&config(Backend::Relational)).await.unwrap();
        if let Store::Relational(database) = &store {
            database
                .execute_raw(r#"CREATE TABLE "Note" ("_id" TEXT PRIMARY KEY, "title" TEXT NOT NULL, "stars" INTEGER NOT NULL)"#)
                .await
                .unwrap();
        }
        store
    }

    /// Ids of every note, of page 1 of size 2, and of the first note with stars
    async fn listing_order(store: &Store) -> (Vec<String>, Vec<String>, Option<String>) {
        let uow = store.unit_of_work(Arc::new(RepositoryRegistry::new()));
        let notes = uow.get_entity_repository::<Note>().unwrap();
        notes
            .create_bulk(&[
                Note::new("z", "zeta", 2),
                Note::new("a", "alpha", 0),
                Note::new("m", "mu", 4),
            ])
            .await
            .unwrap();
        uow.commit_changes().await.unwrap();

        let ids = |items: Vec<Note>| items.into_iter().map(|n| n.id).collect::<Vec<_>>();
        let all = ids(notes.get_all(None).await.unwrap());
        let page = ids(notes
            .get_paged(None, PageRequest::new(1, 2))
            .await
            .unwrap()
            .items);
        let first = notes
            .find(&Predicate::<Note>::new().gte(NoteField::Stars, 1))
            .await
            .unwrap()
            .map(|n| n.id);
        (all, page, first)
    }

    #[cfg(feature = "database")]
    #[tokio::test]
    async fn test_relational_store() {
        let store = relational_store().await;
        assert_eq!(store.backend(), Backend::Relational);
        exercise(&store).await;
    }

    #[cfg(all(feature = "database", feature = "surrealdb"))]
    #[tokio::test]
    async fn test_backends_list_in_insertion_order() {
        let relational = listing_order(&relational_store().await).await;
        let document = listing_order(&Store::connect(&config(Backend::Document)).await.unwrap()).await;

        assert_eq!(relational.0, vec!["z", "a", "m"]);
        assert_eq!(relational.1, vec!["z", "a"]);
        assert_eq!(relational.2.as_deref(), Some("z"));
        assert_eq!(relational, document);
    }

    #[cfg(feature = "surrealdb")]
    #[tokio::test]
    async fn test_document_store() {
        let store = Store::connect(&config(Backend::Document)).await.unwrap();
        assert_eq!(store.backend(), Backend::Document);
        match store.context() {
            AnyContext::Document(context) => {
                assert!(format!("{:?}", context).contains("max_concurrent_deferred: 2"))
            }
            #[allow(unreachable_patterns)]
            other => panic!("expected a document session, got {:?}", other),
        }
        exercise(&store).await;
    }

    #[tokio::test]
    async fn test_missing_section_is_reported() {
        let mut config = config(Backend::Document);
        config.surrealdb = None;
        assert!(matches!(
            Store::connect(&config).await,
            Err(Error::MissingConfig(_))
        ));
    }
}
