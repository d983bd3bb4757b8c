//! Error types for the reconciliation engine.
//!
//! This module provides the error hierarchy for every stage of a
//! reconciliation pass: normalization, comparison, planning, the execution
//! adapter, and the surrounding manifest and snapshot handling.

use std::path::PathBuf;
use thiserror::Error;

/// The main error type for the reconciliation engine.
#[derive(Debug, Error)]
pub enum ConvergeError {
    /// Normalization rejected syntactically invalid input.
    #[error("Malformed spec: {0}")]
    MalformedSpec(#[from] MalformedSpecError),

    /// The policy table produced an impossible plan.
    #[error("Policy violation: {0}")]
    PolicyViolation(#[from] PolicyViolationError),

    /// The execution adapter could not be reached or failed.
    #[error("Backend unavailable: {0}")]
    BackendUnavailable(#[from] BackendError),

    /// A requested field cannot be honored by the negotiated backend version.
    #[error("Unsupported by backend: {0}")]
    VersionUnsupported(#[from] VersionUnsupportedError),

    /// Manifest-related errors.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Snapshot bookkeeping and locking errors.
    #[error("State error: {0}")]
    State(#[from] StateError),

    /// IO errors.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Errors raised while normalizing a raw document.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MalformedSpecError {
    /// An opening `[` in an address has no matching `]`.
    #[error("{field}: cannot find closing \"]\" in input \"{input}\" for opening \"[\" at index {index}")]
    UnbalancedBracket {
        /// Field being normalized.
        field: String,
        /// The offending input.
        input: String,
        /// One-based index of the opening bracket.
        index: usize,
    },

    /// A bind address was a hostname rather than an IP literal.
    #[error(
        "{field}: bind addresses for published ports must be IPv4 or IPv6 addresses, not hostnames (found hostname: {host})"
    )]
    HostnameNotAllowed {
        /// Field being normalized.
        field: String,
        /// The hostname that was supplied.
        host: String,
    },

    /// A colon-delimited port description had the wrong number of segments.
    #[error(
        "{field}: invalid port description \"{input}\": expected 1 to 3 colon-separated parts, but got {found}. Maybe you forgot to use square brackets ([...]) around an IPv6 address?"
    )]
    PortSegments {
        /// Field being normalized.
        field: String,
        /// The offending input.
        input: String,
        /// Number of segments found.
        found: usize,
    },

    /// A port or port range could not be parsed.
    #[error("{field}: invalid port range \"{input}\": expected PORT or START-END with 1 <= START <= END <= 65535")]
    InvalidPortRange {
        /// Field being normalized.
        field: String,
        /// The offending input.
        input: String,
    },

    /// A host port range does not match the container port range it maps.
    #[error(
        "{field}: port description \"{input}\" maps {host_len} host port(s) onto {container_len} container port(s)"
    )]
    RangeLengthMismatch {
        /// Field being normalized.
        field: String,
        /// The offending input.
        input: String,
        /// Number of host ports.
        host_len: usize,
        /// Number of container ports.
        container_len: usize,
    },

    /// A value had the wrong form for its field.
    #[error("{field}: expected {expected}, found {found}")]
    InvalidValue {
        /// Field being normalized.
        field: String,
        /// Description of the accepted form.
        expected: String,
        /// The value that was supplied.
        found: String,
    },

    /// The field is not known for this resource type.
    #[error("{field}: unknown field for resource type {resource_type}")]
    UnknownField {
        /// Field that was supplied.
        field: String,
        /// Resource type being normalized.
        resource_type: String,
    },

    /// The same field was given twice, directly or through an alias.
    #[error("{field}: given more than once (as \"{first}\" and \"{second}\")")]
    DuplicateField {
        /// Canonical field name.
        field: String,
        /// First spelling encountered.
        first: String,
        /// Second spelling encountered.
        second: String,
    },

    /// A required field is missing.
    #[error("{field}: required for resource type {resource_type}")]
    MissingField {
        /// Missing field name.
        field: String,
        /// Resource type being normalized.
        resource_type: String,
    },
}

/// Errors that indicate a defect in a policy table.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PolicyViolationError {
    /// A field classified as not comparable was reported as changed.
    #[error("{field}: classified not comparable but reported changed ({before} -> {after})")]
    NotComparableChanged {
        /// Field name.
        field: String,
        /// Rendered before value.
        before: String,
        /// Rendered after value.
        after: String,
    },

    /// A changed field has no entry in the mutability table.
    #[error("{field}: changed but missing from the mutability table")]
    MissingMutability {
        /// Field name.
        field: String,
    },

    /// The same field was declared twice in a policy table.
    #[error("{field}: declared more than once in the {resource_type} policy table")]
    DuplicateDeclaration {
        /// Field name.
        field: String,
        /// Resource type of the table.
        resource_type: String,
    },
}

/// Errors surfaced by an execution adapter.
#[derive(Debug, Error)]
pub enum BackendError {
    /// The backend could not be reached or read.
    #[error("{backend} backend unavailable: {message}")]
    Unavailable {
        /// Adapter type name.
        backend: String,
        /// Description of the failure.
        message: String,
    },

    /// The backend rejected an action.
    #[error("{backend} backend failed to apply {action} to {resource}: {message}")]
    ActionFailed {
        /// Adapter type name.
        backend: String,
        /// Resource identifier.
        resource: String,
        /// Action that failed.
        action: String,
        /// Description of the failure.
        message: String,
    },

    /// The backend reported a version string that cannot be parsed.
    #[error("{backend} backend reported an invalid API version \"{version}\"")]
    InvalidVersion {
        /// Adapter type name.
        backend: String,
        /// The reported version.
        version: String,
    },
}

/// A field was requested that the backend version cannot provide.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("{field}: requires API version {required} or later, backend reports {actual}")]
pub struct VersionUnsupportedError {
    /// Field name.
    pub field: String,
    /// Minimum version required by the field.
    pub required: String,
    /// Version reported by the backend.
    pub actual: String,
}

/// Manifest-related errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The manifest file was not found.
    #[error("Manifest file not found: {path}")]
    FileNotFound {
        /// Path to the missing file.
        path: PathBuf,
    },

    /// The manifest could not be parsed.
    #[error("Failed to parse manifest: {message}")]
    ParseError {
        /// Description of the parse error.
        message: String,
        /// Optional source location.
        location: Option<String>,
    },

    /// Validation failed.
    #[error("Manifest validation failed: {message}")]
    ValidationError {
        /// Description of the validation error.
        message: String,
        /// Field that failed validation.
        field: Option<String>,
    },

    /// Duplicate resource definition.
    #[error("Duplicate {resource_type} name: {name}")]
    DuplicateName {
        /// Type of resource.
        resource_type: String,
        /// The duplicated name.
        name: String,
    },

    /// A comparison override is not valid for its field.
    #[error("Invalid comparison override for {field}: {message}")]
    InvalidOverride {
        /// Field (or `*`) the override targets.
        field: String,
        /// Description of the problem.
        message: String,
    },

    /// An API version string could not be parsed.
    #[error("Invalid API version \"{version}\"")]
    InvalidVersion {
        /// The offending version string.
        version: String,
    },
}

/// Snapshot bookkeeping errors.
#[derive(Debug, Error)]
pub enum StateError {
    /// Snapshot is corrupted.
    #[error("Snapshot is corrupted: {message}")]
    Corrupted {
        /// Description of the corruption.
        message: String,
    },

    /// Lock acquisition failed.
    #[error("Failed to acquire snapshot lock: {message}")]
    LockFailed {
        /// Description of the lock failure.
        message: String,
    },

    /// Snapshot is locked by another reconciliation.
    #[error("Snapshot is locked by another process (lock holder: {holder}, since: {since})")]
    LockedByOther {
        /// Identifier of the lock holder.
        holder: String,
        /// When the lock was acquired.
        since: String,
    },

    /// Serialization error.
    #[error("Snapshot serialization error: {message}")]
    SerializationError {
        /// Description of the serialization error.
        message: String,
    },
}

/// Result type alias for reconciliation operations.
pub type Result<T> = std::result::Result<T, ConvergeError>;

impl ConvergeError {
    /// Creates a new internal error with the given message.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Returns true if the caller can fix the input and retry.
    #[must_use]
    pub const fn is_user_correctable(&self) -> bool {
        matches!(
            self,
            Self::MalformedSpec(_) | Self::VersionUnsupported(_) | Self::Config(_)
        )
    }

    /// Returns true if the error indicates a programming or policy-table defect.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::PolicyViolation(_) | Self::Internal(_))
    }
}

impl MalformedSpecError {
    /// Creates an invalid-value error for a field.
    #[must_use]
    pub fn invalid(
        field: impl Into<String>,
        expected: impl Into<String>,
        found: impl std::fmt::Display,
    ) -> Self {
        Self::InvalidValue {
            field: field.into(),
            expected: expected.into(),
            found: found.to_string(),
        }
    }

    /// Creates an invalid port range error.
    #[must_use]
    pub fn port_range(field: impl Into<String>, input: impl Into<String>) -> Self {
        Self::InvalidPortRange {
            field: field.into(),
            input: input.into(),
        }
    }
}

impl ConfigError {
    /// Creates a validation error for a specific field.
    #[must_use]
    pub fn validation(message: impl Into<String>, field: impl Into<String>) -> Self {
        Self::ValidationError {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    /// Creates an invalid comparison override error.
    #[must_use]
    pub fn invalid_override(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidOverride {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl StateError {
    /// Creates a serialization error with the given message.
    #[must_use]
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::SerializationError {
            message: message.into(),
        }
    }
}

impl BackendError {
    /// Creates an unavailable-backend error.
    #[must_use]
    pub fn unavailable(backend: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Unavailable {
            backend: backend.into(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_port_segments_message() {
        let err = MalformedSpecError::PortSegments {
            field: String::from("published_ports"),
            input: String::from("::1:80:80"),
            found: 5,
        };
        assert_eq!(
            err.to_string(),
            "published_ports: invalid port description \"::1:80:80\": expected 1 to 3 colon-separated parts, but got 5. Maybe you forgot to use square brackets ([...]) around an IPv6 address?"
        );
    }

    #[test]
    fn test_version_unsupported_message() {
        let err = ConvergeError::from(VersionUnsupportedError {
            field: String::from("cpus"),
            required: String::from("1.25"),
            actual: String::from("1.24"),
        });
        assert_eq!(
            err.to_string(),
            "Unsupported by backend: cpus: requires API version 1.25 or later, backend reports 1.24"
        );
        assert!(err.is_user_correctable());
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_policy_violation_is_fatal() {
        let err = ConvergeError::from(PolicyViolationError::MissingMutability {
            field: String::from("image"),
        });
        assert!(err.is_fatal());
        assert!(!err.is_user_correctable());
    }
}
