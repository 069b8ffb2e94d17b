//! Stage handlers

use std::sync::Arc;

use chrono::{DateTime, Utc};

use super::{KeyPublisher, RotationRequest, RotationStage, StageOutcome, UnchangedKeyMode};
use crate::core::{RenewalError, RenewalPolicy, RenewalResult, SigningKeyRecord, VersionStage};
use crate::decision::evaluate;
use crate::issuer::CredentialClient;
use crate::store::{Promotion, SecretStoreAdapter, SecretVersion};

enum Precheck {
    AlreadyCurrent,
    Pending,
}

/// Runs one rotation stage per call
#[derive(Clone)]
pub struct RotationWorkflow {
    store: SecretStoreAdapter,
    client: CredentialClient,
    policy: RenewalPolicy,
    mode: UnchangedKeyMode,
    publisher: Option<Arc<dyn KeyPublisher>>,
}

impl std::fmt::Debug for RotationWorkflow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RotationWorkflow")
            .field("store", &self.store)
            .field("client", &self.client)
            .field("policy", &self.policy)
            .field("mode", &self.mode)
            .field("publisher", &self.publisher.as_ref().map(|p| p.name()))
            .finish()
    }
}

impl RotationWorkflow {
    /// Workflow in the default [`UnchangedKeyMode::Mirror`] mode, no publisher
    pub fn new(store: SecretStoreAdapter, client: CredentialClient, policy: RenewalPolicy) -> Self {
        Self {
            store,
            client,
            policy,
            mode: UnchangedKeyMode::default(),
            publisher: None,
        }
    }

    /// Choose what `createSecret` does when the key is not due
    pub fn with_mode(mut self, mode: UnchangedKeyMode) -> Self {
        self.mode = mode;
        self
    }

    /// Push pending keys to `publisher` during `setSecret`
    pub fn with_publisher(mut self, publisher: Arc<dyn KeyPublisher>) -> Self {
        self.publisher = Some(publisher);
        self
    }

    /// Run the stage named by `request`
    #[tracing::instrument(
        skip(self, request),
        fields(
            secret_id = %request.secret_id,
            request_token = %request.request_token,
            stage = %request.stage,
        )
    )]
    pub async fn run(
        &self,
        request: &RotationRequest,
        now: DateTime<Utc>,
    ) -> RenewalResult<StageOutcome> {
        if let Precheck::AlreadyCurrent = self.precheck(request).await? {
            tracing::info!("Version already marked as current, nothing to do");
            return Ok(StageOutcome::AlreadyCurrent {
                version_id: request.request_token.clone(),
            });
        }

        let result = match request.stage {
            RotationStage::CreateSecret => self.create_secret(request, now).await,
            RotationStage::SetSecret => self.set_secret(request).await,
            RotationStage::TestSecret => self.test_secret(request, now).await,
            RotationStage::FinishSecret => self.finish_secret(request).await,
        };

        match &result {
            Ok(outcome) => tracing::info!(outcome = ?outcome, "Rotation stage completed"),
            Err(e) => tracing::error!(
                error = %e,
                kind = e.kind(),
                retryable = e.is_retryable(),
                "Rotation stage failed"
            ),
        }
        result
    }

    /// Run every stage from `createSecret` to `finishSecret` for one token
    ///
    /// Stops at the first failure; earlier stages stay applied.
    pub async fn run_to_completion(
        &self,
        secret_id: &str,
        request_token: &str,
        now: DateTime<Utc>,
    ) -> RenewalResult<Vec<StageOutcome>> {
        let mut outcomes = Vec::with_capacity(RotationStage::ALL.len());
        let mut stage = Some(RotationStage::CreateSecret);
        while let Some(current) = stage {
            let request = RotationRequest::new(secret_id, request_token, current);
            outcomes.push(self.run(&request, now).await?);
            stage = current.next();
        }
        Ok(outcomes)
    }

    async fn precheck(&self, request: &RotationRequest) -> RenewalResult<Precheck> {
        let description = self.store.describe(&request.secret_id).await?;
        if !description.rotation_enabled {
            return Err(RenewalError::RotationNotEnabled {
                secret_id: request.secret_id.clone(),
            });
        }

        let stages = description
            .stages_of(&request.request_token)
            .ok_or_else(|| RenewalError::InvalidVersionStage {
                secret_id: request.secret_id.clone(),
                version_id: request.request_token.clone(),
                reason: "version has no stage for rotation".into(),
            })?;

        if stages.contains(&VersionStage::Current) {
            return Ok(Precheck::AlreadyCurrent);
        }
        if !stages.contains(&VersionStage::Pending) {
            return Err(RenewalError::InvalidVersionStage {
                secret_id: request.secret_id.clone(),
                version_id: request.request_token.clone(),
                reason: format!("expected {}, found {stages:?}", VersionStage::Pending),
            });
        }
        Ok(Precheck::Pending)
    }

    async fn create_secret(
        &self,
        request: &RotationRequest,
        now: DateTime<Utc>,
    ) -> RenewalResult<StageOutcome> {
        let (secret_id, token) = (&request.secret_id, &request.request_token);

        if let Some(existing) = self.store.get_pending_version(secret_id, token).await? {
            tracing::info!(key_id = %existing.payload.key_id, "Pending version already exists for token");
            return Ok(StageOutcome::PendingExists {
                version_id: existing.version_id,
                key_id: existing.payload.key_id,
            });
        }

        let current = self.store.get_current_version(secret_id).await?;
        let decision = evaluate(current.as_ref().map(|v| &v.payload), &self.policy, now);
        decision.log(secret_id);

        if !decision.should_renew() {
            match (self.mode, current) {
                (UnchangedKeyMode::Mirror, Some(current)) => {
                    let written = self
                        .store
                        .put_pending_version(secret_id, token, &current.payload)
                        .await?;
                    return Ok(StageOutcome::PendingMirrored {
                        version_id: written.version_id,
                        key_id: written.payload.key_id,
                        decision,
                    });
                }
                (UnchangedKeyMode::Issue, _) => {
                    tracing::info!("Rotation requested while key not due, issuing anyway");
                }
                // NotDue always carries a current record
                (UnchangedKeyMode::Mirror, None) => {}
            }
        }

        let record = self
            .client
            .issue_signing_key(self.policy.ttl_minutes(), now)
            .await?;
        let written = self
            .store
            .put_pending_version(secret_id, token, &record)
            .await?;

        Ok(StageOutcome::PendingCreated {
            version_id: written.version_id,
            key_id: written.payload.key_id,
            expires_at: written.payload.expires_at,
            decision,
        })
    }

    async fn set_secret(&self, request: &RotationRequest) -> RenewalResult<StageOutcome> {
        let pending = self.require_pending(request).await?;

        let publisher = match &self.publisher {
            Some(publisher) => {
                publisher
                    .publish(&request.secret_id, &pending.payload)
                    .await?;
                tracing::info!(
                    publisher = publisher.name(),
                    key_id = %pending.payload.key_id,
                    "Published pending key"
                );
                Some(publisher.name())
            }
            None => {
                tracing::debug!("No key publisher configured, setSecret only re-read the pending version");
                None
            }
        };

        Ok(StageOutcome::Published {
            version_id: pending.version_id,
            key_id: pending.payload.key_id,
            publisher,
        })
    }

    async fn test_secret(
        &self,
        request: &RotationRequest,
        now: DateTime<Utc>,
    ) -> RenewalResult<StageOutcome> {
        let (secret_id, token) = (&request.secret_id, &request.request_token);
        let invalid = |reason: String| RenewalError::ValidationFailed {
            secret_id: secret_id.clone(),
            version_id: token.clone(),
            reason,
        };

        let stages = self.store.describe_version(secret_id, token).await?;
        if !stages.contains(&VersionStage::Pending) {
            return Err(invalid(format!("version is not {}", VersionStage::Pending)));
        }

        let pending = match self.store.get_pending_version(secret_id, token).await {
            Ok(Some(pending)) => pending,
            Ok(None) => return Err(invalid("pending version holds no value".into())),
            Err(RenewalError::MalformedPayload { reason, .. }) => {
                return Err(invalid(format!("payload does not decode: {reason}")));
            }
            Err(e) => return Err(e),
        };

        pending.payload.validate(now).map_err(invalid)?;
        verify_round_trip(&pending.payload).map_err(invalid)?;

        Ok(StageOutcome::Verified {
            version_id: pending.version_id,
            key_id: pending.payload.key_id,
            expires_at: pending.payload.expires_at,
        })
    }

    async fn finish_secret(&self, request: &RotationRequest) -> RenewalResult<StageOutcome> {
        let pending = self.require_pending(request).await?;

        // an unreadable current value counts as replaced
        let current = match self.store.get_current_version(&request.secret_id).await {
            Ok(current) => current,
            Err(RenewalError::MalformedPayload { .. }) => None,
            Err(e) => return Err(e),
        };
        let renewed = current.is_none_or(|current| current.payload != pending.payload);

        let promotion = self
            .store
            .promote_to_current(&request.secret_id, &request.request_token)
            .await?;

        Ok(match promotion {
            Promotion::AlreadyCurrent => StageOutcome::AlreadyCurrent {
                version_id: request.request_token.clone(),
            },
            Promotion::Promoted { previous } => StageOutcome::Promoted {
                version_id: request.request_token.clone(),
                key_id: pending.payload.key_id,
                previous,
                renewed,
            },
        })
    }

    async fn require_pending(&self, request: &RotationRequest) -> RenewalResult<SecretVersion> {
        self.store
            .get_pending_version(&request.secret_id, &request.request_token)
            .await?
            .ok_or_else(|| RenewalError::VersionNotFound {
                secret_id: request.secret_id.clone(),
                version_id: request.request_token.clone(),
            })
    }
}

fn verify_round_trip(record: &SigningKeyRecord) -> Result<(), String> {
    let encoded = record.to_secret_string()?;
    let decoded = SigningKeyRecord::from_secret_string(&encoded)?;
    if &decoded != record {
        return Err("payload does not survive an encode/decode round trip".into());
    }
    Ok(())
}
