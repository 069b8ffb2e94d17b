//! Scheduler-tick renewal
//!
//! Single step: decide → issue → store as `AWSCURRENT`. There is no staged
//! promotion to coordinate here; the write itself is what readers observe.
//! The secret is created (under the configured KMS key) when absent.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::core::{RenewalPolicy, RenewalResult};
use crate::decision::{RenewalDecision, evaluate};
use crate::issuer::CredentialClient;
use crate::metrics::Outcome;
use crate::store::SecretStoreAdapter;

/// What a scheduler tick did
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum TickOutcome {
    /// A new key was issued and stored as current
    Renewed {
        /// Version written
        version_id: String,
        /// New key id
        key_id: String,
        /// New key expiry
        expires_at: DateTime<Utc>,
        /// Why renewal happened
        decision: RenewalDecision,
    },
    /// The current key is not due
    Skipped {
        /// Current version
        version_id: String,
        /// Current key id
        key_id: String,
        /// Current key expiry
        expires_at: DateTime<Utc>,
        /// Decision, always `NotDue`
        decision: RenewalDecision,
    },
}

impl TickOutcome {
    /// Metric outcome
    #[must_use]
    pub fn outcome(&self) -> Outcome {
        match self {
            Self::Renewed { .. } => Outcome::Renewed,
            Self::Skipped { .. } => Outcome::Skipped,
        }
    }

    /// Key now served as current
    #[must_use]
    pub fn key_id(&self) -> &str {
        match self {
            Self::Renewed { key_id, .. } | Self::Skipped { key_id, .. } => key_id,
        }
    }

    /// Expiry of the key now served as current
    #[must_use]
    pub fn expires_at(&self) -> DateTime<Utc> {
        match self {
            Self::Renewed { expires_at, .. } | Self::Skipped { expires_at, .. } => *expires_at,
        }
    }
}

/// Scheduler-path workflow
#[derive(Debug, Clone)]
pub struct RenewalWorkflow {
    store: SecretStoreAdapter,
    client: CredentialClient,
    policy: RenewalPolicy,
}

impl RenewalWorkflow {
    /// Build the workflow
    pub fn new(store: SecretStoreAdapter, client: CredentialClient, policy: RenewalPolicy) -> Self {
        Self {
            store,
            client,
            policy,
        }
    }

    /// Renew `secret_id` if its current key is absent, expired or due
    ///
    /// Nothing is written when issuance fails.
    #[tracing::instrument(skip(self), fields(path = "scheduled"))]
    pub async fn run(&self, secret_id: &str, now: DateTime<Utc>) -> RenewalResult<TickOutcome> {
        let current = self.store.get_current_version(secret_id).await?;
        let decision = evaluate(current.as_ref().map(|v| &v.payload), &self.policy, now);
        decision.log(secret_id);

        if let (false, Some(current)) = (decision.should_renew(), &current) {
            return Ok(TickOutcome::Skipped {
                version_id: current.version_id.clone(),
                key_id: current.payload.key_id.clone(),
                expires_at: current.payload.expires_at,
                decision,
            });
        }

        let record = self
            .client
            .issue_signing_key(self.policy.ttl_minutes(), now)
            .await?;
        let written = self.store.put_current(secret_id, &record).await?;

        Ok(TickOutcome::Renewed {
            version_id: written.version_id,
            key_id: written.payload.key_id,
            expires_at: written.payload.expires_at,
            decision,
        })
    }
}
