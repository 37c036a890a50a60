//! SQL dialect detection and identifier quoting

use crate::error::{DatabaseError, DatabaseErrorKind, DatabaseOperation};
use crate::repository::{
    RepositoryError, RepositoryErrorKind, RepositoryOperation, RepositoryResult,
};

/// The SQL flavour spoken by the connected database
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    /// PostgreSQL (`$1` placeholders)
    Postgres,
    /// SQLite (`?` placeholders)
    Sqlite,
}

impl Dialect {
    /// Detect the dialect from a connection URL
    pub fn from_url(url: &str) -> Result<Self, DatabaseError> {
        if url.starts_with("postgres://") || url.starts_with("postgresql://") {
            Ok(Self::Postgres)
        } else if url.starts_with("sqlite:") {
            Ok(Self::Sqlite)
        } else {
            Err(DatabaseError::new(
                DatabaseOperation::Connect,
                DatabaseErrorKind::Configuration,
                format!(
                    "Unsupported database URL scheme in '{}' (expected postgres:// or sqlite:)",
                    crate::error::sanitize_url(url)
                ),
            ))
        }
    }

    /// Placeholder for the 1-based parameter `index`
    pub fn placeholder(self, index: usize) -> String {
        match self {
            Self::Postgres => format!("${}", index),
            Self::Sqlite => "?".to_string(),
        }
    }

    /// Validate and double-quote a table or column name
    pub fn quote(self, identifier: &str) -> RepositoryResult<String> {
        if crate::entity::is_identifier(identifier) {
            Ok(format!("\"{}\"", identifier))
        } else {
            Err(RepositoryError::new(
                RepositoryOperation::FindAll,
                RepositoryErrorKind::InvalidField,
                format!("Invalid SQL identifier '{}'", identifier),
            ))
        }
    }
}
