//! # unit-of-work
//!
//! Backend-agnostic repository and unit-of-work layer. One CRUD, query and
//! pagination contract is implemented over a transactional SQL session and
//! over a document store with deferred writes.
//!
//! ## Features
//!
//! - **Repositories**: nullable `find*` and strict `get*` fetch tiers, counts,
//!   projections, bulk creates and typed partial updates
//! - **Pagination**: identical page arithmetic in memory and on both backends,
//!   including unbounded requests
//! - **Relational adapter** (`database` feature): sqlx `Any` driver
//!   (PostgreSQL, SQLite) with writes staged in one transaction per session
//! - **Document adapter** (`surrealdb` feature): SurrealDB with an ordered and
//!   a bounded-concurrency deferred-write queue
//! - **Unit of work**: one session shared by every repository, one commit point
//! - **Configuration**: layered figment config selecting the backend at runtime
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use unit_of_work::prelude::*;
//! # use serde::{Deserialize, Serialize};
//! # #[derive(Debug, Clone, Serialize, Deserialize)]
//! # struct Customer { #[serde(rename = "Id")] id: String, name: String }
//! # #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
//! # enum CustomerField { Id, Name }
//! # impl EntityField for CustomerField {
//! #     const ID: Self = Self::Id;
//! #     fn name(self) -> &'static str { match self { Self::Id => "Id", Self::Name => "name" } }
//! #     fn all() -> &'static [Self] { &[Self::Id, Self::Name] }
//! # }
//! # impl Entity for Customer { type Field = CustomerField; }
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = Config::load()?;
//!     init_tracing(&config)?;
//!
//!     let store = Store::connect(&config).await?;
//!     let uow = store.unit_of_work(Arc::new(RepositoryRegistry::new()));
//!     let customers = uow.get_entity_repository::<Customer>()?;
//!
//!     customers.update_by_id("c-1", &serde_json::json!({ "name": "Ada" })).await?;
//!     let page = customers.get_paged(None, PageRequest::new(1, 20)).await?;
//!     println!("{} of {} customers", page.items.len(), page.total_items);
//!
//!     uow.commit_changes().await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod entity;
pub mod error;
pub mod observability;
pub mod pagination;
pub mod repository;
pub mod unit_of_work;

#[cfg(feature = "database")]
pub mod sql;

#[cfg(feature = "surrealdb")]
pub mod document;

#[cfg(any(feature = "database", feature = "surrealdb"))]
pub mod backend;

#[cfg(test)]
mod test_support;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::config::{Backend, Config};
    pub use crate::entity::{Entity, EntityField};
    pub use crate::error::{DatabaseError, DatabaseErrorKind, DatabaseOperation, Error, Result};
    pub use crate::observability::init_tracing;
    pub use crate::pagination::{paginate, PageRequest, Pagination};
    pub use crate::repository::{
        FieldUpdates, FieldValue, OrderDirection, Predicate, Repository, RepositoryError,
        RepositoryErrorKind, RepositoryResult,
    };
    pub use crate::unit_of_work::{DatabaseContext, RepositoryRegistry, UnitOfWork};

    #[cfg(feature = "database")]
    pub use crate::sql::{Include, Relation, SqlContext, SqlDatabase, SqlRepository};

    #[cfg(feature = "surrealdb")]
    pub use crate::document::{DocumentContext, DocumentDatabase, DocumentRepository};

    #[cfg(any(feature = "database", feature = "surrealdb"))]
    pub use crate::backend::{AnyContext, AnyRepository, Store};
}
