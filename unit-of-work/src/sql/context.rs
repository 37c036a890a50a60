//! Relational session
//!
//! A [`SqlContext`] begins its transaction on first use and keeps every
//! statement of every repository bound to it on that transaction, so reads
//! observe the session's own uncommitted writes. Entities the session has
//! written or reloaded are kept in an identity map keyed by type and identity.

use std::any::TypeId;
use std::collections::HashMap;

use dashmap::DashMap;
use serde_json::{Map, Value};
use sqlx::any::AnyRow;
use sqlx::{Any, AnyPool, Transaction};
use tokio::sync::Mutex;

use super::dialect::Dialect;
use super::row;
use super::statement::{SqlParam, SqlStatement};
use crate::entity::{self, Entity, EntityField};
use crate::error::{DatabaseError, DatabaseOperation};
use crate::repository::{FieldValue, RepositoryError, RepositoryOperation, RepositoryResult};

type Query<'q> = sqlx::query::Query<'q, Any, sqlx::any::AnyArguments<'q>>;

/// Configures table names before a session is opened
pub struct SqlContextBuilder {
    pub(super) pool: AnyPool,
    pub(super) dialect: Dialect,
    pub(super) tables: HashMap<TypeId, String>,
}

impl SqlContextBuilder {
    /// Store entity `T` in `table` instead of a table named after the entity
    #[must_use]
    pub fn table<T: Entity>(mut self, table: impl Into<String>) -> Self {
        self.tables.insert(TypeId::of::<T>(), table.into());
        self
    }

    /// Open the session
    pub fn build(self) -> SqlContext {
        SqlContext {
            pool: self.pool,
            dialect: self.dialect,
            tables: self.tables,
            transaction: Mutex::new(None),
            tracked: DashMap::new(),
        }
    }
}

/// One relational session
pub struct SqlContext {
    pool: AnyPool,
    dialect: Dialect,
    tables: HashMap<TypeId, String>,
    transaction: Mutex<Option<Transaction<'static, Any>>>,
    tracked: DashMap<(TypeId, String), Map<String, Value>>,
}

impl SqlContext {
    /// The session's SQL dialect
    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// Table that stores entity `T`
    pub fn table_name<T: Entity>(&self) -> &str {
        self.tables
            .get(&TypeId::of::<T>())
            .map_or(T::entity_name(), String::as_str)
    }

    /// Whether a transaction is open
    pub async fn in_transaction(&self) -> bool {
        self.transaction.lock().await.is_some()
    }

    pub(crate) async fn fetch_all(&self, statement: &SqlStatement) -> RepositoryResult<Vec<AnyRow>> {
        tracing::trace!(sql = %statement.sql, params = statement.params.len(), "fetch");
        let mut guard = self.transaction.lock().await;
        let tx = self.transaction_in(&mut guard).await?;
        bind_params(sqlx::query(&statement.sql), &statement.params)
            .fetch_all(&mut **tx)
            .await
            .map_err(|e| {
                RepositoryError::from(
                    DatabaseError::from(e).add_context(statement.sql.clone()),
                )
            })
    }

    pub(crate) async fn execute(
        &self,
        statement: &SqlStatement,
        operation: DatabaseOperation,
    ) -> RepositoryResult<u64> {
        tracing::trace!(sql = %statement.sql, params = statement.params.len(), "execute");
        let mut guard = self.transaction.lock().await;
        let tx = self.transaction_in(&mut guard).await?;
        let result = bind_params(sqlx::query(&statement.sql), &statement.params)
            .execute(&mut **tx)
            .await
            .map_err(|e| {
                RepositoryError::from(
                    DatabaseError::from(e)
                        .during(operation)
                        .add_context(statement.sql.clone()),
                )
            })?;
        Ok(result.rows_affected())
    }

    async fn transaction_in<'g>(
        &self,
        slot: &'g mut Option<Transaction<'static, Any>>,
    ) -> RepositoryResult<&'g mut Transaction<'static, Any>> {
        if slot.is_none() {
            let tx = self.pool.begin().await.map_err(|e| {
                RepositoryError::from(DatabaseError::from(e).during(DatabaseOperation::Transaction))
            })?;
            tracing::debug!("Session transaction started");
            *slot = Some(tx);
        }
        slot.as_mut().ok_or_else(|| {
            RepositoryError::database_error(RepositoryOperation::Commit, "Transaction unavailable")
        })
    }

    /// Commit everything written through this session
    ///
    /// A session with nothing pending commits trivially. The next statement
    /// starts a fresh transaction.
    pub async fn save_changes(&self) -> RepositoryResult<()> {
        let Some(tx) = self.transaction.lock().await.take() else {
            return Ok(());
        };
        tx.commit().await.map_err(|e| {
            RepositoryError::from(DatabaseError::from(e).during(DatabaseOperation::Transaction))
        })?;
        tracing::debug!("Session transaction committed");
        Ok(())
    }

    /// Discard everything written through this session since the last commit
    pub async fn rollback(&self) -> RepositoryResult<()> {
        let Some(tx) = self.transaction.lock().await.take() else {
            return Ok(());
        };
        self.tracked.clear();
        tx.rollback().await.map_err(|e| {
            RepositoryError::from(DatabaseError::from(e).during(DatabaseOperation::Transaction))
        })?;
        tracing::debug!("Session transaction rolled back");
        Ok(())
    }

    /// Whether the database answers
    ///
    /// With a `check_table` name, also checks that the table can be read.
    /// Runs on the open transaction when there is one.
    pub async fn ping(&self, check_table: Option<&str>) -> bool {
        let sql = match check_table {
            Some(table) => match self.dialect.quote(table) {
                Ok(table) => format!("SELECT 1 FROM {} LIMIT 1", table),
                Err(_) => return false,
            },
            None => "SELECT 1".to_string(),
        };

        let mut guard = self.transaction.lock().await;
        let result = match guard.as_mut() {
            Some(tx) => sqlx::query(&sql).fetch_all(&mut **tx).await,
            None => sqlx::query(&sql).fetch_all(&self.pool).await,
        };
        match result {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!(table = ?check_table, "Database ping failed: {}", e);
                false
            }
        }
    }

    /// Remember the current state of `entity`
    pub(crate) fn track<T: Entity>(&self, entity: &T) -> RepositoryResult<()> {
        let record = entity::to_record(entity)?;
        let id = record
            .get(T::Field::ID.name())
            .and_then(FieldValue::from_json)
            .unwrap_or(FieldValue::Null);
        self.tracked
            .insert((TypeId::of::<T>(), id.to_string()), record);
        Ok(())
    }

    /// The tracked state of the entity with identity `id`
    pub fn tracked<T: Entity>(&self, id: impl Into<FieldValue>) -> Option<T> {
        let key = (TypeId::of::<T>(), id.into().to_string());
        let record = self.tracked.get(&key)?.clone();
        entity::from_record(record).ok()
    }

    /// Forget every tracked entity of type `T`
    pub(crate) fn untrack_all<T: Entity>(&self) {
        let type_id = TypeId::of::<T>();
        self.tracked.retain(|(tracked_type, _), _| *tracked_type != type_id);
    }

    /// Number of tracked entities
    pub fn tracked_count(&self) -> usize {
        self.tracked.len()
    }
}

impl std::fmt::Debug for SqlContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqlContext")
            .field("dialect", &self.dialect)
            .field("tables", &self.tables.len())
            .field("tracked", &self.tracked.len())
            .finish_non_exhaustive()
    }
}

fn bind_params<'q>(mut query: Query<'q>, params: &[SqlParam]) -> Query<'q> {
    for param in params {
        query = match param {
            SqlParam::Bool(b) => query.bind(*b),
            SqlParam::Int(n) => query.bind(*n),
            SqlParam::Float(n) => query.bind(*n),
            SqlParam::Text(s) => query.bind(s.clone()),
        };
    }
    query
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::sql::database;
    use crate::test_support::Customer;

    #[tokio::test]
    async fn test_table_override() {
        let db = database().await;
        let ctx = db.context_builder().table::<Customer>("customers").build();
        assert_eq!(ctx.table_name::<Customer>(), "customers");
        assert_eq!(db.context().table_name::<Customer>(), "Customer");
    }

    #[tokio::test]
    async fn test_transaction_is_lazy_and_committed() {
        let db = database().await;
        let ctx = db.context();
        assert!(!ctx.in_transaction().await);

        let stmt = SqlStatement {
            sql: r#"INSERT INTO "Customer" ("Id", "name", "age") VALUES (?, ?, ?)"#.to_string(),
            params: vec![
                SqlParam::Text("A".to_string()),
                SqlParam::Text("Ada".to_string()),
                SqlParam::Int(36),
            ],
        };
        assert_eq!(ctx.execute(&stmt, DatabaseOperation::Insert).await.unwrap(), 1);
        assert!(ctx.in_transaction().await);

        ctx.save_changes().await.unwrap();
        assert!(!ctx.in_transaction().await);

        // a second session sees the committed row
        drop(ctx);
        let count = SqlStatement {
            sql: r#"SELECT COUNT(*) AS "total" FROM "Customer""#.to_string(),
            params: Vec::new(),
        };
        let rows = db.context().fetch_all(&count).await.unwrap();
        assert_eq!(row::count_of(&rows[0]).unwrap(), 1);
    }

    #[tokio::test]
    async fn test_rollback_discards_writes() {
        let db = database().await;
        let ctx = db.context();
        ctx.execute(
            &SqlStatement {
                sql: r#"INSERT INTO "Customer" ("Id", "name", "age") VALUES ('A', 'Ada', 36)"#
                    .to_string(),
                params: Vec::new(),
            },
            DatabaseOperation::Insert,
        )
        .await
        .unwrap();
        ctx.rollback().await.unwrap();

        let rows = ctx
            .fetch_all(&SqlStatement {
                sql: r#"SELECT COUNT(*) AS "total" FROM "Customer""#.to_string(),
                params: Vec::new(),
            })
            .await
            .unwrap();
        assert_eq!(row::count_of(&rows[0]).unwrap(), 0);
    }

    #[tokio::test]
    async fn test_ping() {
        let db = database().await;
        let ctx = db.context();
        assert!(ctx.ping(None).await);
        assert!(ctx.ping(Some("Customer")).await);
        assert!(!ctx.ping(Some("missing_table")).await);
        assert!(!ctx.ping(Some("bad name")).await);
    }

    #[tokio::test]
    async fn test_track_and_lookup() {
        let db = database().await;
        let ctx = db.context();
        ctx.track(&Customer::new("A", "Ada", 36)).unwrap();
        assert_eq!(ctx.tracked::<Customer>("A").unwrap().name, "Ada");
        assert!(ctx.tracked::<Customer>("B").is_none());
        assert_eq!(ctx.tracked_count(), 1);
    }
}
