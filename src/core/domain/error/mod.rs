use crate::core::domain::model::{node::NodeId, resource_kind::ResourceKind};
use thiserror::Error;

/// The main error type for fleet synchronization.
///
/// Remote failures never show up here: the agent client folds them into the
/// response envelope and the reconciler turns them into task counters. What
/// remains are the conditions a caller has to act on.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Represents errors that occur while building the HTTP transport
    ///
    /// # Fields
    /// * `0` - A description of what went wrong
    #[error("Connection error: {0}")]
    Connection(String),

    /// Represents validation failures with detailed context
    ///
    /// # Fields
    /// * `source` - The underlying validation error
    #[error("Validation error: {source}")]
    Validation { source: ValidationError },

    /// The cache store rejected an operation
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// No node is registered under the given id
    #[error("Node {0} not found")]
    NodeNotFound(NodeId),

    /// A run for the same kind and node is already in flight
    ///
    /// Callers should treat this as "try again later", not as a failure.
    #[error("{kind} sync for node {node_id} is already running")]
    AlreadyRunning { kind: ResourceKind, node_id: NodeId },

    /// The run was interrupted through its cancellation token
    #[error("Sync cancelled")]
    Cancelled,

    /// A background run ended without producing a result (panic or abort)
    #[error("Sync task aborted: {0}")]
    Aborted(String),

    /// Invalid or unreadable configuration
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<ValidationError> for SyncError {
    fn from(error: ValidationError) -> Self {
        SyncError::Validation { source: error }
    }
}

/// Specialized error type for validation failures.
///
/// This enum provides detailed context about why a validation
/// failed, including field-specific errors and format violations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// Represents a validation failure for a specific field
    ///
    /// # Fields
    /// * `field` - The name of the field that failed validation
    /// * `message` - A detailed message about why validation failed
    #[error("Field '{field}' validation failed: {message}")]
    Field { field: String, message: String },

    /// Represents format/syntax validation failures
    ///
    /// # Fields
    /// * `0` - Description of the format violation
    #[error("Format error: {0}")]
    Format(String),

    /// Represents violations of domain constraints
    ///
    /// # Fields
    /// * `0` - Description of the constraint violation
    #[error("Domain constraint violation: {0}")]
    ConstraintViolation(String),
}

/// Errors raised by a [`CacheStore`](crate::CacheStore) backend.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error("record not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("backend error: {0}")]
    Backend(String),
}

/// Type alias for Results that may fail with a SyncError
pub type SyncResult<T> = Result<T, SyncError>;

/// Type alias for store operations
pub type StoreResult<T> = Result<T, StoreError>;
