//! Document adapter over SurrealDB
//!
//! Supports runtime protocol selection via URL scheme:
//! - `ws://` / `wss://` - WebSocket connections
//! - `http://` / `https://` - HTTP connections
//! - `mem://` - In-memory database (for testing)
//!
//! Entities are stored one document per record in a collection named after
//! the entity. Record keys are generated UUIDv7 strings, so a plain scan
//! returns documents in insertion order; the entity's own identity field is
//! an ordinary document field.

mod context;
pub mod query;
mod repository;

use std::collections::HashMap;
use std::time::Duration;

use crate::{
    config::SurrealDbConfig,
    error::{sanitize_url, DatabaseError, Error, Result},
};

pub use context::{DocumentContext, DocumentContextBuilder, DEFAULT_MAX_CONCURRENT_DEFERRED};
pub use repository::DocumentRepository;

/// SurrealDB client type alias using the `Any` engine for runtime protocol selection
pub type SurrealClient = surrealdb::Surreal<surrealdb::engine::any::Any>;

/// A connected document store
#[derive(Clone)]
pub struct DocumentDatabase {
    client: SurrealClient,
}

impl DocumentDatabase {
    /// The underlying client
    pub fn client(&self) -> &SurrealClient {
        &self.client
    }

    /// A new session with default collection names
    pub fn context(&self) -> DocumentContext {
        self.context_builder().build()
    }

    /// Start configuring a new session
    pub fn context_builder(&self) -> DocumentContextBuilder {
        DocumentContextBuilder {
            client: self.client.clone(),
            collections: HashMap::new(),
            max_concurrent_deferred: DEFAULT_MAX_CONCURRENT_DEFERRED,
        }
    }
}

impl std::fmt::Debug for DocumentDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentDatabase").finish_non_exhaustive()
    }
}

/// Connect to the configured SurrealDB with retry logic
///
/// Uses exponential backoff between attempts.
pub async fn connect(config: &SurrealDbConfig) -> Result<DocumentDatabase> {
    let mut attempt = 0;
    let base_delay = Duration::from_secs(config.retry_delay_secs);

    loop {
        match try_connect(config).await {
            Ok(client) => {
                if attempt > 0 {
                    tracing::info!(
                        "SurrealDB connection established after {} attempt(s)",
                        attempt + 1
                    );
                } else {
                    tracing::info!(
                        "SurrealDB connected: url={}, ns={}, db={}",
                        sanitize_url(&config.url),
                        config.namespace,
                        config.database
                    );
                }
                return Ok(DocumentDatabase { client });
            }
            Err(e) => {
                attempt += 1;

                if attempt > config.max_retries {
                    tracing::error!(
                        "Failed to connect to SurrealDB after {} attempts: {}",
                        config.max_retries + 1,
                        e
                    );
                    return Err(e);
                }

                let delay = base_delay * 2_u32.pow(attempt.saturating_sub(1));

                tracing::warn!(
                    "SurrealDB connection attempt {} failed: {}. Retrying in {:?}...",
                    attempt,
                    e,
                    delay
                );

                tokio::time::sleep(delay).await;
            }
        }
    }
}

async fn try_connect(config: &SurrealDbConfig) -> Result<SurrealClient> {
    let url_safe = sanitize_url(&config.url);
    tracing::debug!("Connecting to SurrealDB: {}", url_safe);

    let failed = |stage: &str, e: surrealdb::Error| {
        Error::Database(
            DatabaseError::from(e).add_context(format!("{} at '{}'", stage, url_safe)),
        )
    };

    let client = surrealdb::engine::any::connect(&config.url)
        .await
        .map_err(|e| failed("connect", e))?;

    if let (Some(username), Some(password)) = (&config.username, &config.password) {
        client
            .signin(surrealdb::opt::auth::Root { username, password })
            .await
            .map_err(|e| failed("signin", e))?;
    }

    client
        .use_ns(&config.namespace)
        .use_db(&config.database)
        .await
        .map_err(|e| failed("select namespace/database", e))?;

    Ok(client)
}
