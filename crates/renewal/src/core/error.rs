//! Error types for renewal and rotation
//!
//! [`RenewalError`] is the single error surfaced to the invocation trigger.
//! Its variants follow the failure taxonomy of the handler:
//!
//! - [`RenewalError::ConfigInvalid`]: fatal, raised before any rotation attempt
//! - [`RenewalError::IssuanceFailed`]: retryable, nothing was written
//! - [`RenewalError::SecretStoreUnavailable`]: retryable, writes only follow successful reads
//! - [`RenewalError::ValidationFailed`]: raised by testSecret, never promotes
//! - [`RenewalError::NotFound`]: the secret itself is absent (first run)
//!
//! # Retry classification
//!
//! ```
//! use signing_key_renewal::RenewalError;
//!
//! let err = RenewalError::IssuanceFailed {
//!     reason: "connection reset".to_string(),
//! };
//! assert!(err.is_retryable());
//!
//! let err = RenewalError::MalformedEvent {
//!     reason: "Step missing".to_string(),
//! };
//! assert!(!err.is_retryable());
//! ```

use std::time::Duration;

use thiserror::Error;

use crate::config::ConfigError;

/// Top-level renewal error
#[derive(Debug, Error)]
pub enum RenewalError {
    /// Configuration rejected at start-up
    #[error("Invalid configuration: {0}")]
    ConfigInvalid(#[from] ConfigError),

    /// The key-issuance service failed or returned unusable key material
    #[error("Signing key issuance failed: {reason}")]
    IssuanceFailed {
        /// What went wrong
        reason: String,
    },

    /// The secret store could not be reached or rejected the call
    #[error("Secret store unavailable for '{secret_id}': {source}")]
    SecretStoreUnavailable {
        /// Secret the call targeted
        secret_id: String,
        /// Underlying transport or service error
        #[source]
        source: std::io::Error,
    },

    /// The pending version failed its pre-promotion checks
    #[error("Validation failed for secret '{secret_id}' version '{version_id}': {reason}")]
    ValidationFailed {
        /// Secret under rotation
        secret_id: String,
        /// Version that failed
        version_id: String,
        /// Reason for failure
        reason: String,
    },

    /// The secret does not exist
    #[error("Secret '{secret_id}' not found")]
    NotFound {
        /// Missing secret
        secret_id: String,
    },

    /// The secret exists but the requested version or stage does not
    #[error("Version '{version_id}' of secret '{secret_id}' not found")]
    VersionNotFound {
        /// Secret queried
        secret_id: String,
        /// Version id or stage label queried
        version_id: String,
    },

    /// A stored payload could not be decoded as a signing key record
    #[error("Malformed payload in secret '{secret_id}': {reason}")]
    MalformedPayload {
        /// Secret holding the payload
        secret_id: String,
        /// Decoding failure
        reason: String,
    },

    /// Rotation lifecycle invoked on a secret without rotation enabled
    #[error("Secret '{secret_id}' is not enabled for rotation")]
    RotationNotEnabled {
        /// Secret under rotation
        secret_id: String,
    },

    /// The request token does not name a version staged for rotation
    #[error("Version '{version_id}' of secret '{secret_id}' is not staged for rotation: {reason}")]
    InvalidVersionStage {
        /// Secret under rotation
        secret_id: String,
        /// Request token / version id
        version_id: String,
        /// What was found instead
        reason: String,
    },

    /// A write conflicted with an existing version under the same token
    #[error("Conflicting write to secret '{secret_id}' version '{version_id}'")]
    Conflict {
        /// Secret written
        secret_id: String,
        /// Version id / request token
        version_id: String,
    },

    /// The invocation payload could not be classified
    #[error("Malformed invocation event: {reason}")]
    MalformedEvent {
        /// What was wrong with the payload
        reason: String,
    },

    /// The invocation exceeded its time budget
    #[error("Invocation timed out after {duration:?}")]
    Timeout {
        /// Budget that was exceeded
        duration: Duration,
    },
}

impl RenewalError {
    /// Whether the trigger's own retry/backoff should re-deliver the invocation
    ///
    /// Transient failures (issuance, store availability, timeout) are retryable;
    /// configuration, validation, and malformed-input errors are not, because
    /// re-delivering the same input cannot change the result.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::IssuanceFailed { .. }
                | Self::SecretStoreUnavailable { .. }
                | Self::Timeout { .. }
        )
    }

    /// Short, stable label used as a metric/log field
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ConfigInvalid(_) => "config_invalid",
            Self::IssuanceFailed { .. } => "issuance_failed",
            Self::SecretStoreUnavailable { .. } => "secret_store_unavailable",
            Self::ValidationFailed { .. } => "validation_failed",
            Self::NotFound { .. } => "not_found",
            Self::VersionNotFound { .. } => "version_not_found",
            Self::MalformedPayload { .. } => "malformed_payload",
            Self::RotationNotEnabled { .. } => "rotation_not_enabled",
            Self::InvalidVersionStage { .. } => "invalid_version_stage",
            Self::Conflict { .. } => "conflict",
            Self::MalformedEvent { .. } => "malformed_event",
            Self::Timeout { .. } => "timeout",
        }
    }

    pub(crate) fn unavailable(secret_id: &str, reason: impl ToString) -> Self {
        Self::SecretStoreUnavailable {
            secret_id: secret_id.to_string(),
            source: std::io::Error::other(reason.to_string()),
        }
    }

    pub(crate) fn issuance(reason: impl Into<String>) -> Self {
        Self::IssuanceFailed {
            reason: reason.into(),
        }
    }
}

/// Result type alias for renewal operations
pub type RenewalResult<T> = std::result::Result<T, RenewalError>;
