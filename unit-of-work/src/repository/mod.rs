//! Repository contract shared by every backend
//!
//! - [`Repository`]: per-entity CRUD, query and pagination, with a nullable
//!   (`find*`) and a strict (`get*`) fetch tier
//! - [`Predicate`]: typed filter conditions and ordering
//! - [`FieldUpdates`]: partial updates derived from any serializable object
//! - [`RepositoryError`]: classified failures with entity, field and value
//!
//! # Example
//!
//! ```rust,ignore
//! use unit_of_work::repository::{Predicate, Repository};
//!
//! let adults = Predicate::<Customer>::new().gte(CustomerField::Age, 18);
//! let page = customers.get_paged(Some(&adults), PageRequest::new(1, 20)).await?;
//! ```

mod error;
mod filter;
mod traits;
mod update;

pub use error::{ErrorSource, RepositoryError, RepositoryErrorKind, RepositoryOperation};
pub use filter::{FieldValue, FilterCondition, FilterOperator, OrderDirection, Predicate};
pub use traits::{Repository, RepositoryResult, CONDITION_FIELD};
pub use update::FieldUpdates;
