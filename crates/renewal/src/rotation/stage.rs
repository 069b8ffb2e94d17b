//! Rotation lifecycle stages
//!
//! ```text
//! createSecret → setSecret → testSecret → finishSecret → done
//! ```
//!
//! Each stage is delivered independently and may be redelivered; ordering is
//! the trigger's responsibility. [`RotationStage::next`] describes the
//! forward order for callers that drive the whole cycle themselves.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::core::RenewalError;

/// One stage of the four-step rotation lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RotationStage {
    /// Issue (or mirror) a key and write it as `AWSPENDING`
    #[serde(rename = "createSecret")]
    CreateSecret,
    /// Push the pending key to dependent systems
    #[serde(rename = "setSecret")]
    SetSecret,
    /// Verify the pending version before promotion
    #[serde(rename = "testSecret")]
    TestSecret,
    /// Move `AWSCURRENT` to the pending version
    #[serde(rename = "finishSecret")]
    FinishSecret,
}

impl RotationStage {
    /// All stages in lifecycle order
    pub const ALL: [Self; 4] = [
        Self::CreateSecret,
        Self::SetSecret,
        Self::TestSecret,
        Self::FinishSecret,
    ];

    /// Wire name used by the rotation trigger
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CreateSecret => "createSecret",
            Self::SetSecret => "setSecret",
            Self::TestSecret => "testSecret",
            Self::FinishSecret => "finishSecret",
        }
    }

    /// Stage that follows this one, `None` after `finishSecret`
    #[must_use]
    pub fn next(&self) -> Option<Self> {
        match self {
            Self::CreateSecret => Some(Self::SetSecret),
            Self::SetSecret => Some(Self::TestSecret),
            Self::TestSecret => Some(Self::FinishSecret),
            Self::FinishSecret => None,
        }
    }

    /// Whether completing this stage completes the rotation
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::FinishSecret)
    }
}

impl FromStr for RotationStage {
    type Err = RenewalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|stage| stage.as_str() == s)
            .ok_or_else(|| RenewalError::MalformedEvent {
                reason: format!("unknown rotation step '{s}'"),
            })
    }
}

impl std::fmt::Display for RotationStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The unit of work delivered by the rotation trigger
///
/// `request_token` is the idempotency key and the id of the version the
/// rotation writes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RotationRequest {
    /// Secret under rotation
    #[serde(rename = "SecretId")]
    pub secret_id: String,
    /// Client request token / pending version id
    #[serde(rename = "ClientRequestToken")]
    pub request_token: String,
    /// Stage to run
    #[serde(rename = "Step")]
    pub stage: RotationStage,
}

impl RotationRequest {
    /// Build a request
    pub fn new(
        secret_id: impl Into<String>,
        request_token: impl Into<String>,
        stage: RotationStage,
    ) -> Self {
        Self {
            secret_id: secret_id.into(),
            request_token: request_token.into(),
            stage,
        }
    }

    /// Same secret and token, another stage
    #[must_use]
    pub fn at(&self, stage: RotationStage) -> Self {
        Self {
            stage,
            ..self.clone()
        }
    }
}
