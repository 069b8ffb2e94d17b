//! Four-stage rotation state machine
//!
//! Every stage is a separate invocation. Nothing is carried between stages in
//! process memory: the pending version, keyed by the request token, is the
//! only cross-stage state.
//!
//! # Pre-checks (every stage)
//!
//! 1. the secret has rotation enabled
//! 2. the request token names a known version of the secret
//! 3. a token already holding `AWSCURRENT` makes the stage a successful no-op
//! 4. otherwise the token must hold `AWSPENDING`
//!
//! # Stages
//!
//! | Stage          | Effect                                                       |
//! |----------------|--------------------------------------------------------------|
//! | `createSecret` | write `AWSPENDING` (issued or mirrored key), once per token  |
//! | `setSecret`    | hand the pending key to the [`KeyPublisher`], if any         |
//! | `testSecret`   | decode and validate the pending key; never promotes          |
//! | `finishSecret` | move `AWSCURRENT` to the written pending version             |

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::ConfigError;
use crate::core::{RenewalResult, SigningKeyRecord};
use crate::decision::RenewalDecision;
use crate::metrics::Outcome;

mod stage;
mod workflow;

pub use stage::{RotationRequest, RotationStage};
pub use workflow::RotationWorkflow;

/// What `createSecret` does when the current key is not yet due
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnchangedKeyMode {
    /// Write a pending version mirroring the current key; issue nothing
    #[default]
    Mirror,
    /// Issue a new key regardless of the decision
    Issue,
}

impl UnchangedKeyMode {
    /// Config name
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mirror => "mirror",
            Self::Issue => "issue",
        }
    }
}

impl FromStr for UnchangedKeyMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mirror" => Ok(Self::Mirror),
            "issue" => Ok(Self::Issue),
            other => Err(ConfigError::InvalidValue {
                field: "unchanged_key_mode".into(),
                reason: format!("expected 'mirror' or 'issue', got '{other}'"),
            }),
        }
    }
}

impl std::fmt::Display for UnchangedKeyMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pre-registers a pending key with a dependent system during `setSecret`
///
/// Implementations must tolerate redelivery of the same record.
#[async_trait]
pub trait KeyPublisher: Send + Sync {
    /// Make `record` known to the consumer before it becomes current
    async fn publish(&self, secret_id: &str, record: &SigningKeyRecord) -> RenewalResult<()>;

    /// Publisher name for logs
    fn name(&self) -> &'static str;
}

/// Result of one successfully handled stage
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum StageOutcome {
    /// A new key was issued and written as `AWSPENDING`
    PendingCreated {
        /// Pending version id
        version_id: String,
        /// Issued key id
        key_id: String,
        /// Issued key expiry
        expires_at: DateTime<Utc>,
        /// Decision that led here
        decision: RenewalDecision,
    },
    /// The current key was not due; `AWSPENDING` mirrors it
    PendingMirrored {
        /// Pending version id
        version_id: String,
        /// Mirrored key id
        key_id: String,
        /// Decision that led here
        decision: RenewalDecision,
    },
    /// A pending version already existed for the token
    PendingExists {
        /// Pending version id
        version_id: String,
        /// Key id it holds
        key_id: String,
    },
    /// `setSecret` completed
    Published {
        /// Pending version id
        version_id: String,
        /// Key id handed over
        key_id: String,
        /// Publisher used, `None` when no push is configured
        publisher: Option<&'static str>,
    },
    /// `testSecret` accepted the pending version
    Verified {
        /// Pending version id
        version_id: String,
        /// Verified key id
        key_id: String,
        /// Verified key expiry
        expires_at: DateTime<Utc>,
    },
    /// `finishSecret` moved `AWSCURRENT`
    Promoted {
        /// Newly current version id
        version_id: String,
        /// Key id now current
        key_id: String,
        /// Former current version, now `AWSPREVIOUS`
        previous: Option<String>,
        /// Whether the key differs from the one it replaced
        renewed: bool,
    },
    /// The token's version already held `AWSCURRENT`
    AlreadyCurrent {
        /// Current version id
        version_id: String,
    },
}

impl StageOutcome {
    /// Metric outcome: `Renewed` when a key was issued or a different key became current
    #[must_use]
    pub fn outcome(&self) -> Outcome {
        match self {
            Self::PendingCreated { .. } | Self::Promoted { renewed: true, .. } => Outcome::Renewed,
            _ => Outcome::Skipped,
        }
    }

    /// Version the stage acted on
    #[must_use]
    pub fn version_id(&self) -> &str {
        match self {
            Self::PendingCreated { version_id, .. }
            | Self::PendingMirrored { version_id, .. }
            | Self::PendingExists { version_id, .. }
            | Self::Published { version_id, .. }
            | Self::Verified { version_id, .. }
            | Self::Promoted { version_id, .. }
            | Self::AlreadyCurrent { version_id } => version_id,
        }
    }

    /// Key id involved, when the stage read or wrote one
    #[must_use]
    pub fn key_id(&self) -> Option<&str> {
        match self {
            Self::PendingCreated { key_id, .. }
            | Self::PendingMirrored { key_id, .. }
            | Self::PendingExists { key_id, .. }
            | Self::Published { key_id, .. }
            | Self::Verified { key_id, .. }
            | Self::Promoted { key_id, .. } => Some(key_id),
            Self::AlreadyCurrent { .. } => None,
        }
    }

    /// Expiry of a key the stage issued or verified
    #[must_use]
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::PendingCreated { expires_at, .. } | Self::Verified { expires_at, .. } => {
                Some(*expires_at)
            }
            _ => None,
        }
    }
}
