//! Fixtures shared by the unit tests

use serde::{Deserialize, Serialize};

use crate::entity::{Entity, EntityField};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    #[serde(rename = "Id")]
    pub id: String,
    pub name: String,
    pub age: i64,
    pub email: Option<String>,
}

impl Customer {
    pub fn new(id: &str, name: &str, age: i64) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            age,
            email: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CustomerField {
    Id,
    Name,
    Age,
    Email,
}

impl EntityField for CustomerField {
    const ID: Self = Self::Id;

    fn name(self) -> &'static str {
        match self {
            Self::Id => "Id",
            Self::Name => "name",
            Self::Age => "age",
            Self::Email => "email",
        }
    }

    fn all() -> &'static [Self] {
        &[Self::Id, Self::Name, Self::Age, Self::Email]
    }
}

impl Entity for Customer {
    type Field = CustomerField;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    #[serde(rename = "Id")]
    pub id: String,
    pub customer_id: String,
    pub total: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OrderField {
    Id,
    CustomerId,
    Total,
}

impl EntityField for OrderField {
    const ID: Self = Self::Id;

    fn name(self) -> &'static str {
        match self {
            Self::Id => "Id",
            Self::CustomerId => "customer_id",
            Self::Total => "total",
        }
    }

    fn all() -> &'static [Self] {
        &[Self::Id, Self::CustomerId, Self::Total]
    }
}

impl Entity for Order {
    type Field = OrderField;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    #[serde(rename = "Id")]
    pub id: String,
    pub order_id: String,
    pub sku: String,
}

/// Customer read together with its orders and their lines
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerWithOrders {
    #[serde(rename = "Id")]
    pub id: String,
    pub name: String,
    pub age: i64,
    pub email: Option<String>,
    #[serde(default)]
    pub orders: Vec<OrderWithLines>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderWithLines {
    #[serde(rename = "Id")]
    pub id: String,
    pub customer_id: String,
    pub total: i64,
    #[serde(default)]
    pub lines: Vec<OrderLine>,
}

impl Entity for CustomerWithOrders {
    type Field = CustomerField;

    fn entity_name() -> &'static str {
        "Customer"
    }
}

/// Document-style entity keyed by `_id`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    #[serde(rename = "_id")]
    pub id: String,
    pub title: String,
    pub stars: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NoteField {
    Id,
    Title,
    Stars,
}

impl EntityField for NoteField {
    const ID: Self = Self::Id;

    fn name(self) -> &'static str {
        match self {
            Self::Id => "_id",
            Self::Title => "title",
            Self::Stars => "stars",
        }
    }

    fn all() -> &'static [Self] {
        &[Self::Id, Self::Title, Self::Stars]
    }
}

impl Entity for Note {
    type Field = NoteField;
}

impl Note {
    pub fn new(id: &str, title: &str, stars: i64) -> Self {
        Self {
            id: id.to_string(),
            title: title.to_string(),
            stars,
        }
    }
}

#[cfg(feature = "database")]
pub mod sql {
    use crate::config::DatabaseConfig;
    use crate::sql::{connect, SqlDatabase};

    pub const SCHEMA: &[&str] = &[
        r#"CREATE TABLE "Customer" ("Id" TEXT PRIMARY KEY, "name" TEXT NOT NULL, "age" INTEGER NOT NULL, "email" TEXT)"#,
        r#"CREATE TABLE "Order" ("Id" TEXT PRIMARY KEY, "customer_id" TEXT NOT NULL, "total" INTEGER NOT NULL)"#,
        r#"CREATE TABLE "order_lines" ("Id" TEXT PRIMARY KEY, "order_id" TEXT NOT NULL, "sku" TEXT NOT NULL)"#,
    ];

    /// A single-connection in-memory SQLite database with the fixture schema
    ///
    /// One connection keeps every context on the same in-memory database, so
    /// a context must commit or be dropped before the next one starts.
    pub async fn database() -> SqlDatabase {
        let config = DatabaseConfig {
            url: "sqlite::memory:".to_string(),
            max_connections: 1,
            min_connections: 1,
            connection_timeout_secs: 5,
            max_retries: 0,
            retry_delay_secs: 0,
        };
        let database = connect(&config).await.expect("sqlite should open");
        for statement in SCHEMA {
            database
                .execute_raw(statement)
                .await
                .expect("schema should apply");
        }
        database
    }
}

#[cfg(feature = "surrealdb")]
pub mod document {
    use crate::config::SurrealDbConfig;
    use crate::document::{connect, DocumentDatabase};

    /// A fresh in-memory SurrealDB
    pub async fn database() -> DocumentDatabase {
        let config = SurrealDbConfig {
            url: "mem://".to_string(),
            namespace: "test".to_string(),
            database: "test".to_string(),
            username: None,
            password: None,
            max_retries: 0,
            retry_delay_secs: 0,
        };
        connect(&config).await.expect("in-memory surrealdb should open")
    }
}
