//! Identity-linking error types.
//!
//! This module defines the errors that can occur while resolving an
//! external identity to a local account. All of them are request-scoped;
//! most are turned into a [`FlowOutcome`](crate::flow::FlowOutcome) by the
//! flow layer and never reach the host as `Err`.

use std::fmt;

/// Errors that can occur during identity linking operations.
#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    /// The provider rejected the assertion or the user declined consent.
    #[error("Verification failed: {provider} - {message}")]
    VerificationFailed {
        /// The provider that failed verification.
        provider: String,
        /// Description of the failure.
        message: String,
    },

    /// OpenID discovery could not locate the provider endpoint.
    #[error("Discovery failure: {message}")]
    DiscoveryFailure {
        /// Description of the discovery failure.
        message: String,
    },

    /// A uniqueness constraint was violated by a create.
    #[error("Constraint violation: {message}")]
    ConstraintViolation {
        /// Description of the violated constraint.
        message: String,
    },

    /// Account setup was reached without an unmatched identity in session.
    #[error("No pending registration in session")]
    MissingPendingRegistration,

    /// The username belongs to an account that cannot be claimed by password.
    #[error("Username '{username}' is taken by an account without a usable password")]
    UsernameCollisionWithoutClaimableAccount {
        /// The colliding username.
        username: String,
    },

    /// A link target referenced by type and id does not exist.
    #[error("Link target not found: {object_type}/{object_id}")]
    TargetNotFound {
        /// The target's object type.
        object_type: String,
        /// The target's object id.
        object_id: String,
    },

    /// The request is malformed.
    #[error("Invalid request: {message}")]
    InvalidRequest {
        /// Description of why the request is invalid.
        message: String,
    },

    /// An error occurred while storing or retrieving accounts or profiles.
    #[error("Storage error: {message}")]
    Storage {
        /// Description of the storage error.
        message: String,
    },

    /// The engine configuration is invalid.
    #[error("Configuration error: {message}")]
    Configuration {
        /// Description of the configuration error.
        message: String,
    },

    /// An unexpected internal error occurred.
    #[error("Internal error: {message}")]
    Internal {
        /// Description of the internal error.
        message: String,
    },
}

impl LinkError {
    /// Creates a new `VerificationFailed` error.
    #[must_use]
    pub fn verification_failed(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::VerificationFailed {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Creates a new `DiscoveryFailure` error.
    #[must_use]
    pub fn discovery_failure(message: impl Into<String>) -> Self {
        Self::DiscoveryFailure {
            message: message.into(),
        }
    }

    /// Creates a new `ConstraintViolation` error.
    #[must_use]
    pub fn constraint_violation(message: impl Into<String>) -> Self {
        Self::ConstraintViolation {
            message: message.into(),
        }
    }

    /// Creates a new `UsernameCollisionWithoutClaimableAccount` error.
    #[must_use]
    pub fn unclaimable_username(username: impl Into<String>) -> Self {
        Self::UsernameCollisionWithoutClaimableAccount {
            username: username.into(),
        }
    }

    /// Creates a new `TargetNotFound` error.
    #[must_use]
    pub fn target_not_found(object_type: impl Into<String>, object_id: impl Into<String>) -> Self {
        Self::TargetNotFound {
            object_type: object_type.into(),
            object_id: object_id.into(),
        }
    }

    /// Creates a new `InvalidRequest` error.
    #[must_use]
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest {
            message: message.into(),
        }
    }

    /// Creates a new `Storage` error.
    #[must_use]
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    /// Creates a new `Configuration` error.
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Creates a new `Internal` error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns `true` if this is a uniqueness constraint violation.
    #[must_use]
    pub fn is_constraint_violation(&self) -> bool {
        matches!(self, Self::ConstraintViolation { .. })
    }

    /// Returns `true` if this error is caused by the request (4xx category).
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::VerificationFailed { .. }
                | Self::DiscoveryFailure { .. }
                | Self::MissingPendingRegistration
                | Self::UsernameCollisionWithoutClaimableAccount { .. }
                | Self::TargetNotFound { .. }
                | Self::InvalidRequest { .. }
        )
    }

    /// Returns `true` if this is a server error (5xx category).
    #[must_use]
    pub fn is_server_error(&self) -> bool {
        matches!(
            self,
            Self::Storage { .. } | Self::Configuration { .. } | Self::Internal { .. }
        )
    }

    /// Returns the error category for logging purposes.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::VerificationFailed { .. } => ErrorCategory::Verification,
            Self::DiscoveryFailure { .. } => ErrorCategory::Verification,
            Self::ConstraintViolation { .. } => ErrorCategory::Conflict,
            Self::MissingPendingRegistration => ErrorCategory::Session,
            Self::UsernameCollisionWithoutClaimableAccount { .. } => ErrorCategory::Conflict,
            Self::TargetNotFound { .. } => ErrorCategory::Validation,
            Self::InvalidRequest { .. } => ErrorCategory::Validation,
            Self::Storage { .. } => ErrorCategory::Infrastructure,
            Self::Configuration { .. } => ErrorCategory::Configuration,
            Self::Internal { .. } => ErrorCategory::Internal,
        }
    }
}

impl From<crate::config::ConfigError> for LinkError {
    fn from(err: crate::config::ConfigError) -> Self {
        Self::configuration(err.to_string())
    }
}

impl From<serde_json::Error> for LinkError {
    fn from(err: serde_json::Error) -> Self {
        Self::internal(format!("session serialization: {err}"))
    }
}

/// Categories of linking errors for logging and monitoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Provider verification or discovery errors.
    Verification,
    /// Request validation errors.
    Validation,
    /// Uniqueness conflicts.
    Conflict,
    /// Missing or stale session flow state.
    Session,
    /// Infrastructure/storage errors.
    Infrastructure,
    /// Configuration errors.
    Configuration,
    /// Internal errors.
    Internal,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Verification => write!(f, "verification"),
            Self::Validation => write!(f, "validation"),
            Self::Conflict => write!(f, "conflict"),
            Self::Session => write!(f, "session"),
            Self::Infrastructure => write!(f, "infrastructure"),
            Self::Configuration => write!(f, "configuration"),
            Self::Internal => write!(f, "internal"),
        }
    }
}
