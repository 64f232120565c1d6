//! Error types for the convoy reconciler
//!
//! Errors are structured with fields to aid debugging in production.
//! Variants carry the remote object identity, the logical section being
//! applied, or the operation that was in flight, so a caller can decide
//! whether re-running the whole invocation is safe.

use std::time::Duration;

use thiserror::Error;

/// Default context value when no specific context is available
pub const UNKNOWN_CONTEXT: &str = "unknown";

/// Main error type for convoy operations
#[derive(Debug, Error)]
pub enum Error {
    /// A remote object with the same identity already exists at create time
    #[error("cluster {cluster} already exists and must be imported before it can be managed")]
    AlreadyExists {
        /// Identity of the colliding remote object
        cluster: String,
    },

    /// The remote object does not exist
    #[error("cluster {cluster} was not found")]
    NotFound {
        /// Identity of the missing remote object
        cluster: String,
    },

    /// Node pool scaling bounds are missing or inconsistent
    #[error("invalid scaling bounds for node pool {pool}: {message}")]
    InvalidScalingBounds {
        /// Name of the node pool
        pool: String,
        /// Description of the violated bound
        message: String,
    },

    /// A credential blob returned by the remote could not be parsed
    #[error("malformed credential bundle: {message}")]
    MalformedCredentialBundle {
        /// Description of what is missing or invalid
        message: String,
    },

    /// A long-running operation reached a terminal failure state
    #[error("operation {operation} failed: {message}")]
    OperationFailed {
        /// Description of the operation (e.g. "update cluster")
        operation: String,
        /// Message reported by the remote service
        message: String,
    },

    /// A long-running operation did not reach a terminal state in time
    #[error("operation {operation} did not complete within {timeout:?}")]
    OperationTimedOut {
        /// Description of the operation
        operation: String,
        /// The timeout that elapsed
        timeout: Duration,
    },

    /// The invocation was cancelled by the caller
    #[error("operation {operation} was cancelled")]
    Cancelled {
        /// Description of the operation that was abandoned
        operation: String,
    },

    /// Validation error for a desired cluster
    #[error("validation error for {cluster}: {message}")]
    Validation {
        /// Identity of the cluster with invalid configuration
        cluster: String,
        /// Description of what's invalid
        message: String,
        /// The invalid field path (e.g., "default_node_pool.max_count")
        field: Option<String>,
    },

    /// The remote service rejected a call outright
    #[error("remote error for {cluster}: {message}")]
    Remote {
        /// Identity of the remote object
        cluster: String,
        /// Description of what failed
        message: String,
        /// Whether re-running the invocation may succeed
        retryable: bool,
    },

    /// Serialization/deserialization error
    #[error("serialization error: {message}")]
    Serialization {
        /// Description of what failed
        message: String,
        /// The document kind being processed (if known)
        kind: Option<String>,
    },

    /// A step of a reconcile failed while applying a logical section
    #[error("{section} of cluster {cluster}: {source}")]
    Section {
        /// Identity of the remote object
        cluster: String,
        /// Logical section that was in flight (e.g. "node pool", "version")
        section: String,
        /// The underlying failure
        #[source]
        source: Box<Error>,
    },

    /// Internal/operational error
    #[error("internal error [{context}]: {message}")]
    Internal {
        /// Description of what failed
        message: String,
        /// Context where the error occurred (e.g., "saga", "lifecycle")
        context: String,
    },
}

impl Error {
    /// Create a validation error with cluster context and field path
    pub fn validation_for_field(
        cluster: impl Into<String>,
        field: impl Into<String>,
        msg: impl Into<String>,
    ) -> Self {
        Self::Validation {
            cluster: cluster.into(),
            message: msg.into(),
            field: Some(field.into()),
        }
    }

    /// Create an already-exists error for a colliding remote object
    pub fn already_exists(cluster: impl Into<String>) -> Self {
        Self::AlreadyExists {
            cluster: cluster.into(),
        }
    }

    /// Create a not-found error
    pub fn not_found(cluster: impl Into<String>) -> Self {
        Self::NotFound {
            cluster: cluster.into(),
        }
    }

    /// Create a scaling bounds error for a node pool
    pub fn invalid_scaling_bounds(pool: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::InvalidScalingBounds {
            pool: pool.into(),
            message: msg.into(),
        }
    }

    /// Create a malformed credential bundle error
    pub fn malformed_credentials(msg: impl Into<String>) -> Self {
        Self::MalformedCredentialBundle {
            message: msg.into(),
        }
    }

    /// Create an operation failure carrying the remote message
    pub fn operation_failed(operation: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::OperationFailed {
            operation: operation.into(),
            message: msg.into(),
        }
    }

    /// Create an operation timeout error
    pub fn operation_timed_out(operation: impl Into<String>, timeout: Duration) -> Self {
        Self::OperationTimedOut {
            operation: operation.into(),
            timeout,
        }
    }

    /// Create a cancellation error
    pub fn cancelled(operation: impl Into<String>) -> Self {
        Self::Cancelled {
            operation: operation.into(),
        }
    }

    /// Create a remote error with the given message
    ///
    /// For remote errors without cluster context. Retryable by default.
    pub fn remote(msg: impl Into<String>) -> Self {
        Self::Remote {
            cluster: UNKNOWN_CONTEXT.to_string(),
            message: msg.into(),
            retryable: true,
        }
    }

    /// Create a non-retryable remote error (e.g. the request was invalid)
    pub fn remote_permanent(cluster: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Remote {
            cluster: cluster.into(),
            message: msg.into(),
            retryable: false,
        }
    }

    /// Create a serialization error with the given message
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
            kind: None,
        }
    }

    /// Create a serialization error with document kind context
    pub fn serialization_for_kind(kind: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
            kind: Some(kind.into()),
        }
    }

    /// Create an internal error with context
    pub fn internal_with_context(context: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Internal {
            message: msg.into(),
            context: context.into(),
        }
    }

    /// Wrap this error with the cluster identity and the section in flight
    ///
    /// An error that already names a section is returned unchanged so the
    /// innermost section wins.
    pub fn in_section(self, cluster: impl Into<String>, section: impl Into<String>) -> Self {
        match self {
            Error::Section { .. } => self,
            other => Error::Section {
                cluster: cluster.into(),
                section: section.into(),
                source: Box::new(other),
            },
        }
    }

    /// The innermost error, looking through section wrappers
    pub fn root(&self) -> &Error {
        match self {
            Error::Section { source, .. } => source.root(),
            other => other,
        }
    }

    /// Check if this error is retryable
    ///
    /// Retrying means re-running the whole invocation; nothing is retried
    /// inside the reconciler. Validation, scaling bound and malformed
    /// credential errors require a configuration fix. Cancellation is a
    /// caller decision.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::AlreadyExists { .. } => false,
            Error::NotFound { .. } => true,
            Error::InvalidScalingBounds { .. } => false,
            Error::MalformedCredentialBundle { .. } => false,
            Error::OperationFailed { .. } => true,
            Error::OperationTimedOut { .. } => true,
            Error::Cancelled { .. } => false,
            Error::Validation { .. } => false,
            Error::Remote { retryable, .. } => *retryable,
            Error::Serialization { .. } => false,
            Error::Section { source, .. } => source.is_retryable(),
            Error::Internal { .. } => true,
        }
    }

    /// Check if this error means the remote object is gone
    pub fn is_not_found(&self) -> bool {
        matches!(self.root(), Error::NotFound { .. })
    }

    /// Get the cluster identity if this error is associated with one
    pub fn cluster(&self) -> Option<&str> {
        match self {
            Error::AlreadyExists { cluster } => Some(cluster),
            Error::NotFound { cluster } => Some(cluster),
            Error::Validation { cluster, .. } => Some(cluster),
            Error::Remote { cluster, .. } => Some(cluster),
            Error::Section { cluster, .. } => Some(cluster),
            _ => None,
        }
    }

    /// Get the logical section that was in flight, if known
    pub fn section(&self) -> Option<&str> {
        match self {
            Error::Section { section, .. } => Some(section),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::serialization(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ==========================================================================
    // Story Tests: Error Propagation in Cluster Operations
    // ==========================================================================

    /// Story: a failed update step names both the cluster and the section
    ///
    /// The caller never sees a bare transport error; the message says which
    /// remote object and which logical section were being applied.
    #[test]
    fn story_section_errors_name_cluster_and_section() {
        let err = Error::operation_failed("update node pool", "quota exceeded")
            .in_section("resourceGroups/rg/managedClusters/prod", "node pool");

        let msg = err.to_string();
        assert!(msg.contains("node pool"));
        assert!(msg.contains("resourceGroups/rg/managedClusters/prod"));
        assert!(msg.contains("quota exceeded"));
        assert_eq!(err.section(), Some("node pool"));
        assert_eq!(
            err.cluster(),
            Some("resourceGroups/rg/managedClusters/prod")
        );
    }

    /// Story: nested section wrapping keeps the innermost section
    #[test]
    fn story_innermost_section_wins() {
        let err = Error::operation_timed_out("upgrade", Duration::from_secs(1))
            .in_section("c", "version")
            .in_section("c", "update");
        assert_eq!(err.section(), Some("version"));
        assert!(matches!(err.root(), Error::OperationTimedOut { .. }));
    }

    /// Story: configuration problems are not retryable, remote hiccups are
    #[test]
    fn story_error_retryability() {
        assert!(!Error::validation_for_field("c", "dns_prefix", "bad config").is_retryable());
        assert!(!Error::invalid_scaling_bounds("default", "min > max").is_retryable());
        assert!(!Error::malformed_credentials("no clusters").is_retryable());
        assert!(!Error::already_exists("c").is_retryable());
        assert!(!Error::cancelled("poll").is_retryable());
        assert!(!Error::remote_permanent("c", "bad request").is_retryable());

        assert!(Error::remote("throttled").is_retryable());
        assert!(Error::operation_failed("create", "internal").is_retryable());
        assert!(Error::operation_timed_out("create", Duration::from_secs(5)).is_retryable());

        // Section wrapping delegates to the source
        assert!(!Error::validation_for_field("c", "tags", "x")
            .in_section("c", "tags")
            .is_retryable());
        assert!(Error::remote("x").in_section("c", "tags").is_retryable());
    }

    #[test]
    fn test_not_found_detection_looks_through_sections() {
        assert!(Error::not_found("c").is_not_found());
        assert!(Error::not_found("c").in_section("c", "delete").is_not_found());
        assert!(!Error::remote("boom").is_not_found());
    }

    #[test]
    fn test_validation_error_with_field() {
        let err = Error::validation_for_field("my-cluster", "dns_prefix", "must not be empty");
        match &err {
            Error::Validation { field, cluster, .. } => {
                assert_eq!(field.as_deref(), Some("dns_prefix"));
                assert_eq!(cluster, "my-cluster");
            }
            _ => panic!("Expected Validation variant"),
        }
    }

    #[test]
    fn test_unknown_context_constant() {
        assert_eq!(UNKNOWN_CONTEXT, "unknown");
        match Error::remote("test") {
            Error::Remote { cluster, .. } => assert_eq!(cluster, UNKNOWN_CONTEXT),
            _ => panic!("Expected Remote variant"),
        }
        let err = Error::remote("unexpected");
        assert_eq!(err.to_string(), "remote error for unknown: unexpected");
    }

    #[test]
    fn test_serde_json_errors_convert_to_serialization() {
        let parse: std::result::Result<serde_json::Value, _> = serde_json::from_str("{");
        let err: Error = parse.unwrap_err().into();
        assert!(matches!(err, Error::Serialization { .. }));
    }
}
