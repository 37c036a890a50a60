//! Repository error types
//!
//! Every adapter reports failures through [`RepositoryError`], which records
//! the operation in progress, a category, and whichever of entity type, field
//! and value were involved. Backend failures are kept as the error's source.
//!
//! # Example
//!
//! ```rust
//! use unit_of_work::repository::{RepositoryError, RepositoryErrorKind};
//!
//! let error = RepositoryError::not_found("User", "Id", "usr_123");
//! assert!(matches!(error.kind, RepositoryErrorKind::NotFound));
//! assert_eq!(error.field.as_deref(), Some("Id"));
//! ```

use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

/// Operation being performed when the repository error occurred
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RepositoryOperation {
    /// Fetching a single entity
    Find,
    /// Fetching multiple entities with a predicate
    FindAll,
    /// Counting entities matching a predicate
    Count,
    /// Checking if any entity matches
    Exists,
    /// Creating one or more entities
    Create,
    /// Updating entities
    Update,
    /// Deleting entities
    Delete,
    /// Committing the session or draining deferred writes
    Commit,
    /// Resolving a repository from the registry
    Resolve,
    /// Loading related rows for an include
    BatchLoad,
}

impl fmt::Display for RepositoryOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Find => write!(f, "find"),
            Self::FindAll => write!(f, "find_all"),
            Self::Count => write!(f, "count"),
            Self::Exists => write!(f, "exists"),
            Self::Create => write!(f, "create"),
            Self::Update => write!(f, "update"),
            Self::Delete => write!(f, "delete"),
            Self::Commit => write!(f, "commit"),
            Self::Resolve => write!(f, "resolve"),
            Self::BatchLoad => write!(f, "batch_load"),
        }
    }
}

/// Category of repository error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RepositoryErrorKind {
    /// Entity was not found
    NotFound,
    /// The unit of work has no session bound
    SessionNotBound,
    /// A field name is not declared by the entity
    InvalidField,
    /// No repository was registered for the entity type
    RepositoryNotRegistered,
    /// A repository was registered but not with the requested type
    CapabilityMismatch,
    /// Database constraint violation
    ConstraintViolation,
    /// Failed to connect to database
    ConnectionFailed,
    /// Operation timed out
    Timeout,
    /// Underlying database error
    DatabaseError,
    /// Serialization or deserialization error
    SerializationError,
    /// One or more deferred writes failed during commit
    DeferredWriteFailed,
    /// Other unclassified error
    Other,
}

impl fmt::Display for RepositoryErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "not_found"),
            Self::SessionNotBound => write!(f, "session_not_bound"),
            Self::InvalidField => write!(f, "invalid_field"),
            Self::RepositoryNotRegistered => write!(f, "repository_not_registered"),
            Self::CapabilityMismatch => write!(f, "capability_mismatch"),
            Self::ConstraintViolation => write!(f, "constraint_violation"),
            Self::ConnectionFailed => write!(f, "connection_failed"),
            Self::Timeout => write!(f, "timeout"),
            Self::DatabaseError => write!(f, "database_error"),
            Self::SerializationError => write!(f, "serialization_error"),
            Self::DeferredWriteFailed => write!(f, "deferred_write_failed"),
            Self::Other => write!(f, "other"),
        }
    }
}

/// Shared, cloneable cause attached to a [`RepositoryError`]
pub type ErrorSource = Arc<dyn StdError + Send + Sync + 'static>;

/// Structured repository error with operation context
///
/// # Example
///
/// ```rust
/// use unit_of_work::repository::RepositoryError;
///
/// let error = RepositoryError::not_found("User", "Id", "usr_abc123");
/// assert_eq!(
///     error.to_string(),
///     "Repository not_found error during find: Entity not found [User.Id = usr_abc123]"
/// );
/// ```
#[derive(Debug, Clone)]
pub struct RepositoryError {
    /// The operation being performed when the error occurred
    pub operation: RepositoryOperation,
    /// The category of error
    pub kind: RepositoryErrorKind,
    /// Human-readable error message
    pub message: String,
    /// The type of entity involved (e.g., "User", "Order")
    pub entity_type: Option<String>,
    /// The field that was searched or updated
    pub field: Option<String>,
    /// The value the field was matched against
    pub value: Option<String>,
    source: Option<ErrorSource>,
}

impl RepositoryError {
    /// Create a new repository error
    pub fn new(
        operation: RepositoryOperation,
        kind: RepositoryErrorKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            operation,
            kind,
            message: message.into(),
            entity_type: None,
            field: None,
            value: None,
            source: None,
        }
    }

    /// Create a "not found" error naming the entity, the searched field and value
    ///
    /// Predicate lookups report the field `condition` and the rendered
    /// predicate as the value.
    pub fn not_found(
        entity_type: impl Into<String>,
        field: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self::new(
            RepositoryOperation::Find,
            RepositoryErrorKind::NotFound,
            "Entity not found",
        )
        .with_entity(entity_type)
        .with_field(field, value)
    }

    /// The unit of work was used before a session was bound to it
    pub fn session_not_bound(operation: RepositoryOperation) -> Self {
        Self::new(
            operation,
            RepositoryErrorKind::SessionNotBound,
            "No session is bound to the unit of work",
        )
    }

    /// A field name that the entity does not declare
    pub fn invalid_field(entity_type: impl Into<String>, field: impl Into<String>) -> Self {
        let field = field.into();
        Self {
            message: format!("Unknown field '{}'", field),
            field: Some(field),
            ..Self::new(
                RepositoryOperation::Update,
                RepositoryErrorKind::InvalidField,
                "",
            )
        }
        .with_entity(entity_type)
    }

    /// No repository factory was registered for the entity type
    pub fn not_registered(entity_type: impl Into<String>) -> Self {
        Self::new(
            RepositoryOperation::Resolve,
            RepositoryErrorKind::RepositoryNotRegistered,
            "No repository registered for entity",
        )
        .with_entity(entity_type)
    }

    /// The registered repository is not of the requested type
    pub fn capability_mismatch(
        entity_type: impl Into<String>,
        requested: impl Into<String>,
    ) -> Self {
        Self::new(
            RepositoryOperation::Resolve,
            RepositoryErrorKind::CapabilityMismatch,
            format!(
                "Registered repository is not a {}",
                requested.into()
            ),
        )
        .with_entity(entity_type)
    }

    /// Create a constraint violation error
    pub fn constraint_violation(
        operation: RepositoryOperation,
        message: impl Into<String>,
    ) -> Self {
        Self::new(operation, RepositoryErrorKind::ConstraintViolation, message)
    }

    /// Create a connection failed error
    pub fn connection_failed(message: impl Into<String>) -> Self {
        Self::new(
            RepositoryOperation::Find,
            RepositoryErrorKind::ConnectionFailed,
            message,
        )
    }

    /// Create a timeout error
    pub fn timeout(operation: RepositoryOperation, message: impl Into<String>) -> Self {
        Self::new(operation, RepositoryErrorKind::Timeout, message)
    }

    /// Create a database error
    pub fn database_error(operation: RepositoryOperation, message: impl Into<String>) -> Self {
        Self::new(operation, RepositoryErrorKind::DatabaseError, message)
    }

    /// Create a serialization error
    pub fn serialization_error(operation: RepositoryOperation, message: impl Into<String>) -> Self {
        Self::new(operation, RepositoryErrorKind::SerializationError, message)
    }

    /// Aggregate the failures of deferred writes drained during a commit
    pub fn deferred_write_failed(failures: Vec<RepositoryError>) -> Self {
        let detail = failures
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ");
        let mut error = Self::new(
            RepositoryOperation::Commit,
            RepositoryErrorKind::DeferredWriteFailed,
            format!("{} deferred write(s) failed: {}", failures.len(), detail),
        );
        if let Some(first) = failures.into_iter().next() {
            error.source = Some(Arc::new(first));
        }
        error
    }

    /// Add the entity type to an existing error
    #[must_use]
    pub fn with_entity(mut self, entity_type: impl Into<String>) -> Self {
        self.entity_type = Some(entity_type.into());
        self
    }

    /// Add the searched field and value to an existing error
    #[must_use]
    pub fn with_field(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self.value = Some(value.into());
        self
    }

    /// Set the operation that caused the error
    #[must_use]
    pub fn with_operation(mut self, operation: RepositoryOperation) -> Self {
        self.operation = operation;
        self
    }

    /// Attach the underlying failure
    #[must_use]
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        self.source = Some(Arc::new(source));
        self
    }

    /// Check if this error is retriable (transient errors that may succeed on retry)
    pub fn is_retriable(&self) -> bool {
        matches!(
            self.kind,
            RepositoryErrorKind::ConnectionFailed | RepositoryErrorKind::Timeout
        )
    }

    /// Whether this is a strict-tier "not found" error
    pub fn is_not_found(&self) -> bool {
        self.kind == RepositoryErrorKind::NotFound
    }
}

impl PartialEq for RepositoryError {
    fn eq(&self, other: &Self) -> bool {
        self.operation == other.operation
            && self.kind == other.kind
            && self.message == other.message
            && self.entity_type == other.entity_type
            && self.field == other.field
            && self.value == other.value
    }
}

impl Eq for RepositoryError {}

impl fmt::Display for RepositoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Repository {} error during {}: {}",
            self.kind, self.operation, self.message
        )?;
        match (&self.entity_type, &self.field, &self.value) {
            (Some(entity), Some(field), Some(value)) => {
                write!(f, " [{}.{} = {}]", entity, field, value)
            }
            (Some(entity), Some(field), None) => write!(f, " [{}.{}]", entity, field),
            (Some(entity), None, _) => write!(f, " [{}]", entity),
            _ => Ok(()),
        }
    }
}

impl StdError for RepositoryError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_deref()
            .map(|source| source as &(dyn StdError + 'static))
    }
}

impl From<serde_json::Error> for RepositoryError {
    fn from(err: serde_json::Error) -> Self {
        Self::serialization_error(RepositoryOperation::Find, err.to_string()).with_source(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repository_operation_display() {
        assert_eq!(format!("{}", RepositoryOperation::Find), "find");
        assert_eq!(format!("{}", RepositoryOperation::FindAll), "find_all");
        assert_eq!(format!("{}", RepositoryOperation::Commit), "commit");
        assert_eq!(format!("{}", RepositoryOperation::Resolve), "resolve");
        assert_eq!(format!("{}", RepositoryOperation::BatchLoad), "batch_load");
    }

    #[test]
    fn test_repository_error_kind_display() {
        assert_eq!(format!("{}", RepositoryErrorKind::NotFound), "not_found");
        assert_eq!(
            format!("{}", RepositoryErrorKind::SessionNotBound),
            "session_not_bound"
        );
        assert_eq!(
            format!("{}", RepositoryErrorKind::CapabilityMismatch),
            "capability_mismatch"
        );
        assert_eq!(
            format!("{}", RepositoryErrorKind::DeferredWriteFailed),
            "deferred_write_failed"
        );
    }

    #[test]
    fn test_not_found_carries_field_and_value() {
        let error = RepositoryError::not_found("Customer", "Id", "missing");
        assert_eq!(error.kind, RepositoryErrorKind::NotFound);
        assert_eq!(error.entity_type.as_deref(), Some("Customer"));
        assert_eq!(error.field.as_deref(), Some("Id"));
        assert_eq!(error.value.as_deref(), Some("missing"));
        assert!(error.is_not_found());
    }

    #[test]
    fn test_invalid_field_message() {
        let error = RepositoryError::invalid_field("Customer", "nickname");
        assert_eq!(error.kind, RepositoryErrorKind::InvalidField);
        assert_eq!(error.message, "Unknown field 'nickname'");
        assert_eq!(error.to_string(), "Repository invalid_field error during update: Unknown field 'nickname' [Customer.nickname]");
    }

    #[test]
    fn test_source_is_preserved() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk on fire");
        let error = RepositoryError::database_error(RepositoryOperation::Create, "write failed")
            .with_source(io);
        let source = error.source().map(ToString::to_string);
        assert_eq!(source.as_deref(), Some("disk on fire"));
    }

    #[test]
    fn test_deferred_write_failed_aggregates() {
        let error = RepositoryError::deferred_write_failed(vec![
            RepositoryError::database_error(RepositoryOperation::Create, "first"),
            RepositoryError::database_error(RepositoryOperation::Create, "second"),
        ]);
        assert_eq!(error.kind, RepositoryErrorKind::DeferredWriteFailed);
        assert!(error.message.starts_with("2 deferred write(s) failed"));
        assert!(error.message.contains("first"));
        assert!(error.message.contains("second"));
        assert!(error.source().is_some());
    }

    #[test]
    fn test_is_retriable() {
        assert!(RepositoryError::connection_failed("refused").is_retriable());
        assert!(RepositoryError::timeout(RepositoryOperation::FindAll, "timeout").is_retriable());
        assert!(!RepositoryError::not_found("User", "Id", "123").is_retriable());
        assert!(!RepositoryError::session_not_bound(RepositoryOperation::Find).is_retriable());
    }

    #[test]
    fn test_display_without_entity() {
        let error = RepositoryError::new(
            RepositoryOperation::Create,
            RepositoryErrorKind::DatabaseError,
            "Query failed",
        );
        assert_eq!(
            error.to_string(),
            "Repository database_error error during create: Query failed"
        );
    }

    #[test]
    fn test_equality_ignores_source() {
        let plain = RepositoryError::not_found("User", "Id", "1");
        let sourced = RepositoryError::not_found("User", "Id", "1")
            .with_source(std::fmt::Error);
        assert_eq!(plain, sourced);
    }
}
