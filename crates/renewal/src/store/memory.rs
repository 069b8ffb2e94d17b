//! In-memory secret store
//!
//! Reproduces the managed store's label semantics so the rotation lifecycle
//! can run without a network: unique labels, `AWSCURRENT` → `AWSPREVIOUS`
//! demotion, token-keyed idempotent writes, and the valueless `AWSPENDING`
//! placeholder the store creates when it starts a rotation
//! ([`InMemorySecretStore::begin_rotation`]).
//!
//! Every write is recorded with the KMS key reference it carried, and the
//! whole store can be switched unavailable to exercise failure paths.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};

use super::{CreateSecret, PutSecretValue, SecretDescription, SecretStore, SecretValue};
use crate::core::{RenewalError, RenewalResult, VersionStage};

/// A write observed by the store
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WriteRecord {
    /// `create_secret`, `put_secret_value` or `update_version_stage`
    pub operation: &'static str,
    /// Target secret
    pub secret_id: String,
    /// Version written or relabelled
    pub version_id: String,
    /// KMS key reference passed with the write
    pub kms_key_id: Option<String>,
}

#[derive(Debug)]
struct StoredVersion {
    secret_string: Option<String>,
    labels: BTreeSet<String>,
}

#[derive(Debug)]
struct StoredSecret {
    rotation_enabled: bool,
    kms_key_id: Option<String>,
    versions: BTreeMap<String, StoredVersion>,
}

impl StoredSecret {
    fn holder_of(&self, label: &str) -> Option<String> {
        self.versions
            .iter()
            .find(|(_, v)| v.labels.contains(label))
            .map(|(id, _)| id.clone())
    }

    /// Attach `stage` to `version_id`, enforcing label uniqueness and the
    /// `AWSCURRENT` → `AWSPREVIOUS` demotion. A version becoming current
    /// drops its `AWSPENDING` label.
    fn attach(&mut self, stage: VersionStage, version_id: &str) {
        let label = stage.label();
        let previous_holder = self.holder_of(label);
        if previous_holder.as_deref() == Some(version_id) {
            return;
        }
        if let Some(holder) = &previous_holder
            && let Some(v) = self.versions.get_mut(holder)
        {
            v.labels.remove(label);
        }
        if let Some(v) = self.versions.get_mut(version_id) {
            v.labels.insert(label.to_string());
        }
        if stage == VersionStage::Current {
            if let Some(v) = self.versions.get_mut(version_id) {
                v.labels.remove(VersionStage::Pending.label());
            }
            if let Some(demoted) = previous_holder {
                self.attach(VersionStage::Previous, &demoted);
            }
        }
    }
}

/// [`SecretStore`] held in process memory
#[derive(Debug, Default)]
pub struct InMemorySecretStore {
    secrets: RwLock<HashMap<String, StoredSecret>>,
    unavailable: AtomicBool,
    writes: Mutex<Vec<WriteRecord>>,
}

impl InMemorySecretStore {
    /// Empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every call fail with `SecretStoreUnavailable` until reset
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Turn on the rotation lifecycle for an existing secret
    pub fn enable_rotation(&self, secret_id: &str) -> RenewalResult<()> {
        let mut secrets = self.secrets.write();
        let secret = secrets.get_mut(secret_id).ok_or_else(|| not_found(secret_id))?;
        secret.rotation_enabled = true;
        Ok(())
    }

    /// Register the valueless `AWSPENDING` placeholder the managed store
    /// creates when it starts a rotation under `token`
    pub fn begin_rotation(&self, secret_id: &str, token: &str) -> RenewalResult<()> {
        let mut secrets = self.secrets.write();
        let secret = secrets.get_mut(secret_id).ok_or_else(|| not_found(secret_id))?;
        if !secret.rotation_enabled {
            return Err(RenewalError::RotationNotEnabled {
                secret_id: secret_id.to_string(),
            });
        }
        secret
            .versions
            .entry(token.to_string())
            .or_insert_with(|| StoredVersion {
                secret_string: None,
                labels: BTreeSet::new(),
            });
        secret.attach(VersionStage::Pending, token);
        Ok(())
    }

    /// Writes observed so far, in order
    pub fn writes(&self) -> Vec<WriteRecord> {
        self.writes.lock().clone()
    }

    /// Number of versions holding a value, across all labels
    pub fn version_count(&self, secret_id: &str) -> usize {
        self.secrets.read().get(secret_id).map_or(0, |s| {
            s.versions
                .values()
                .filter(|v| v.secret_string.is_some())
                .count()
        })
    }

    /// KMS key the secret was created under
    pub fn kms_key_id(&self, secret_id: &str) -> Option<String> {
        self.secrets
            .read()
            .get(secret_id)
            .and_then(|s| s.kms_key_id.clone())
    }

    fn check_available(&self, secret_id: &str) -> RenewalResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(RenewalError::unavailable(
                secret_id,
                "in-memory store switched unavailable",
            ));
        }
        Ok(())
    }

    fn record_write(
        &self,
        operation: &'static str,
        secret_id: &str,
        version_id: &str,
        kms_key_id: Option<&str>,
    ) {
        self.writes.lock().push(WriteRecord {
            operation,
            secret_id: secret_id.to_string(),
            version_id: version_id.to_string(),
            kms_key_id: kms_key_id.map(str::to_string),
        });
    }
}

fn not_found(secret_id: &str) -> RenewalError {
    RenewalError::NotFound {
        secret_id: secret_id.to_string(),
    }
}

fn version_not_found(secret_id: &str, version: &str) -> RenewalError {
    RenewalError::VersionNotFound {
        secret_id: secret_id.to_string(),
        version_id: version.to_string(),
    }
}

#[async_trait]
impl SecretStore for InMemorySecretStore {
    async fn describe_secret(&self, secret_id: &str) -> RenewalResult<SecretDescription> {
        self.check_available(secret_id)?;
        let secrets = self.secrets.read();
        let secret = secrets.get(secret_id).ok_or_else(|| not_found(secret_id))?;

        Ok(SecretDescription {
            name: secret_id.to_string(),
            rotation_enabled: secret.rotation_enabled,
            versions: secret
                .versions
                .iter()
                .filter(|(_, v)| !v.labels.is_empty())
                .map(|(id, v)| (id.clone(), v.labels.iter().cloned().collect()))
                .collect(),
        })
    }

    async fn get_secret_value(
        &self,
        secret_id: &str,
        version_id: Option<&str>,
        stage: Option<VersionStage>,
    ) -> RenewalResult<SecretValue> {
        self.check_available(secret_id)?;
        let secrets = self.secrets.read();
        let secret = secrets.get(secret_id).ok_or_else(|| not_found(secret_id))?;

        let resolved = match (version_id, stage) {
            (Some(id), _) => id.to_string(),
            (None, stage) => {
                let stage = stage.unwrap_or(VersionStage::Current);
                secret
                    .holder_of(stage.label())
                    .ok_or_else(|| version_not_found(secret_id, stage.label()))?
            }
        };

        let version = secret
            .versions
            .get(&resolved)
            .ok_or_else(|| version_not_found(secret_id, &resolved))?;

        if let Some(stage) = stage
            && !version.labels.contains(stage.label())
        {
            return Err(version_not_found(secret_id, &resolved));
        }

        let secret_string = version
            .secret_string
            .clone()
            .ok_or_else(|| version_not_found(secret_id, &resolved))?;

        Ok(SecretValue {
            version_id: resolved,
            secret_string,
        })
    }

    async fn create_secret(&self, request: CreateSecret<'_>) -> RenewalResult<String> {
        self.check_available(request.name)?;
        let mut secrets = self.secrets.write();
        if secrets.contains_key(request.name) {
            return Err(RenewalError::Conflict {
                secret_id: request.name.to_string(),
                version_id: "[create]".to_string(),
            });
        }

        let version_id = request
            .client_request_token
            .map_or_else(|| uuid::Uuid::new_v4().to_string(), str::to_string);

        let mut versions = BTreeMap::new();
        versions.insert(
            version_id.clone(),
            StoredVersion {
                secret_string: Some(request.secret_string.to_string()),
                labels: BTreeSet::from([VersionStage::Current.label().to_string()]),
            },
        );
        secrets.insert(
            request.name.to_string(),
            StoredSecret {
                rotation_enabled: false,
                kms_key_id: request.kms_key_id.map(str::to_string),
                versions,
            },
        );
        drop(secrets);

        self.record_write("create_secret", request.name, &version_id, request.kms_key_id);
        Ok(version_id)
    }

    async fn put_secret_value(&self, request: PutSecretValue<'_>) -> RenewalResult<String> {
        self.check_available(request.secret_id)?;
        let mut secrets = self.secrets.write();
        let secret = secrets
            .get_mut(request.secret_id)
            .ok_or_else(|| not_found(request.secret_id))?;

        let version_id = request
            .client_request_token
            .map_or_else(|| uuid::Uuid::new_v4().to_string(), str::to_string);

        match secret.versions.get_mut(&version_id) {
            Some(existing) => match &existing.secret_string {
                Some(value) if value == request.secret_string => {
                    tracing::debug!(
                        secret_id = request.secret_id,
                        version_id = %version_id,
                        "Identical value already stored under token"
                    );
                    return Ok(version_id);
                }
                Some(_) => {
                    return Err(RenewalError::Conflict {
                        secret_id: request.secret_id.to_string(),
                        version_id,
                    });
                }
                None => existing.secret_string = Some(request.secret_string.to_string()),
            },
            None => {
                secret.versions.insert(
                    version_id.clone(),
                    StoredVersion {
                        secret_string: Some(request.secret_string.to_string()),
                        labels: BTreeSet::new(),
                    },
                );
            }
        }

        let stages = if request.stages.is_empty() {
            &[VersionStage::Current][..]
        } else {
            request.stages
        };
        for stage in stages {
            secret.attach(*stage, &version_id);
        }
        drop(secrets);

        self.record_write(
            "put_secret_value",
            request.secret_id,
            &version_id,
            request.kms_key_id,
        );
        Ok(version_id)
    }

    async fn update_version_stage(
        &self,
        secret_id: &str,
        stage: VersionStage,
        move_to: &str,
        remove_from: Option<&str>,
    ) -> RenewalResult<()> {
        self.check_available(secret_id)?;
        let mut secrets = self.secrets.write();
        let secret = secrets.get_mut(secret_id).ok_or_else(|| not_found(secret_id))?;

        let Some(version) = secret.versions.get(move_to) else {
            return Err(version_not_found(secret_id, move_to));
        };
        if stage == VersionStage::Current && version.secret_string.is_none() {
            return Err(RenewalError::InvalidVersionStage {
                secret_id: secret_id.to_string(),
                version_id: move_to.to_string(),
                reason: "version has no value and cannot become AWSCURRENT".to_string(),
            });
        }

        let holder = secret.holder_of(stage.label());
        if let Some(holder) = &holder
            && holder != move_to
            && remove_from != Some(holder.as_str())
        {
            return Err(RenewalError::InvalidVersionStage {
                secret_id: secret_id.to_string(),
                version_id: move_to.to_string(),
                reason: format!(
                    "{} is attached to version '{holder}', which must be named as remove_from",
                    stage.label()
                ),
            });
        }

        secret.attach(stage, move_to);
        let kms = secret.kms_key_id.clone();
        drop(secrets);

        self.record_write("update_version_stage", secret_id, move_to, kms.as_deref());
        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
