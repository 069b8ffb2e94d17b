//! Renewal-level operations over a [`SecretStore`]

use std::sync::Arc;

use super::{
    CreateSecret, PutSecretValue, SECRET_DESCRIPTION, SecretDescription, SecretStore, SecretValue,
    SecretVersion,
};
use crate::config::ConfigError;
use crate::core::{RenewalError, RenewalResult, SecretString, SigningKeyRecord, VersionStage};

/// Result of moving `AWSCURRENT` onto a version
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Promotion {
    /// The version already held `AWSCURRENT`; nothing was written
    AlreadyCurrent,
    /// `AWSCURRENT` moved; `previous` now holds `AWSPREVIOUS`
    Promoted {
        /// Former `AWSCURRENT` holder, if there was one
        previous: Option<String>,
    },
}

/// Stage-aware facade over a [`SecretStore`]
///
/// Owns the record codec and the optional KMS key reference, which is passed
/// unchanged on every write.
#[derive(Clone)]
pub struct SecretStoreAdapter {
    store: Arc<dyn SecretStore>,
    kms_key_id: Option<String>,
}

impl std::fmt::Debug for SecretStoreAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretStoreAdapter")
            .field("store", &self.store.name())
            .field("kms_key_id", &self.kms_key_id)
            .finish()
    }
}

impl SecretStoreAdapter {
    /// Wrap a store; an empty KMS reference is treated as unset
    pub fn new(store: Arc<dyn SecretStore>, kms_key_id: Option<String>) -> Self {
        Self {
            store,
            kms_key_id: kms_key_id.filter(|k| !k.trim().is_empty()),
        }
    }

    /// KMS key reference passed on writes
    pub fn kms_key_id(&self) -> Option<&str> {
        self.kms_key_id.as_deref()
    }

    /// Rotation flag and version labels of the secret
    pub async fn describe(&self, secret_id: &str) -> RenewalResult<SecretDescription> {
        self.store.describe_secret(secret_id).await
    }

    /// Stages currently attached to `version_id`
    ///
    /// # Errors
    ///
    /// * `NotFound` - the secret does not exist
    /// * `VersionNotFound` - the version is unknown to the secret
    pub async fn describe_version(
        &self,
        secret_id: &str,
        version_id: &str,
    ) -> RenewalResult<Vec<VersionStage>> {
        self.describe(secret_id)
            .await?
            .stages_of(version_id)
            .ok_or_else(|| RenewalError::VersionNotFound {
                secret_id: secret_id.to_string(),
                version_id: version_id.to_string(),
            })
    }

    /// The `AWSCURRENT` version, or `None` when the secret or its current
    /// value does not exist yet
    ///
    /// # Errors
    ///
    /// * `MalformedPayload` - the current value is not a signing key record
    /// * `SecretStoreUnavailable` - the store call failed
    pub async fn get_current_version(
        &self,
        secret_id: &str,
    ) -> RenewalResult<Option<SecretVersion>> {
        match self
            .store
            .get_secret_value(secret_id, None, Some(VersionStage::Current))
            .await
        {
            Ok(value) => decode(secret_id, value, VersionStage::Current).map(Some),
            Err(RenewalError::NotFound { .. } | RenewalError::VersionNotFound { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// The `AWSPENDING` version written under `token`, if it has a value
    pub async fn get_pending_version(
        &self,
        secret_id: &str,
        token: &str,
    ) -> RenewalResult<Option<SecretVersion>> {
        match self
            .store
            .get_secret_value(secret_id, Some(token), Some(VersionStage::Pending))
            .await
        {
            Ok(value) => decode(secret_id, value, VersionStage::Pending).map(Some),
            Err(RenewalError::VersionNotFound { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Write `record` as the `AWSPENDING` version keyed by `token`
    ///
    /// Idempotent: when a pending version already exists under `token`, it is
    /// returned untouched and nothing is written.
    pub async fn put_pending_version(
        &self,
        secret_id: &str,
        token: &str,
        record: &SigningKeyRecord,
    ) -> RenewalResult<SecretVersion> {
        if let Some(existing) = self.get_pending_version(secret_id, token).await? {
            tracing::info!(
                secret_id,
                version_id = token,
                key_id = %existing.payload.key_id,
                "Pending version already written for token"
            );
            return Ok(existing);
        }

        let encoded = encode(secret_id, record)?;
        let version_id = self
            .store
            .put_secret_value(PutSecretValue {
                secret_id,
                secret_string: &encoded,
                client_request_token: Some(token),
                stages: &[VersionStage::Pending],
                kms_key_id: self.kms_key_id(),
            })
            .await?;

        tracing::info!(
            secret_id,
            version_id = %version_id,
            key_id = %record.key_id,
            expires_at = %record.expires_at.to_rfc3339(),
            "Wrote pending version"
        );

        Ok(SecretVersion {
            version_id,
            stage: VersionStage::Pending,
            payload: record.clone(),
        })
    }

    /// Move `AWSCURRENT` onto `version_id`
    ///
    /// The former holder becomes `AWSPREVIOUS`. Calling this for a version that
    /// already holds `AWSCURRENT` writes nothing.
    pub async fn promote_to_current(
        &self,
        secret_id: &str,
        version_id: &str,
    ) -> RenewalResult<Promotion> {
        let description = self.describe(secret_id).await?;
        let previous = description
            .version_holding(VersionStage::Current)
            .map(str::to_string);

        if previous.as_deref() == Some(version_id) {
            tracing::info!(secret_id, version_id, "Version already marked as current");
            return Ok(Promotion::AlreadyCurrent);
        }

        self.store
            .update_version_stage(
                secret_id,
                VersionStage::Current,
                version_id,
                previous.as_deref(),
            )
            .await?;

        tracing::info!(
            secret_id,
            version_id,
            previous = previous.as_deref().unwrap_or("<none>"),
            "Promoted version to current"
        );

        Ok(Promotion::Promoted { previous })
    }

    /// Store `record` directly as `AWSCURRENT`, creating the secret on first use
    ///
    /// Used by the scheduled path, which bypasses the staged lifecycle.
    pub async fn put_current(
        &self,
        secret_id: &str,
        record: &SigningKeyRecord,
    ) -> RenewalResult<SecretVersion> {
        let encoded = encode(secret_id, record)?;
        let token = uuid::Uuid::new_v4().to_string();

        let version_id = match self.store.describe_secret(secret_id).await {
            Ok(_) => {
                self.store
                    .put_secret_value(PutSecretValue {
                        secret_id,
                        secret_string: &encoded,
                        client_request_token: Some(&token),
                        stages: &[VersionStage::Current],
                        kms_key_id: self.kms_key_id(),
                    })
                    .await?
            }
            Err(RenewalError::NotFound { .. }) => {
                tracing::info!(secret_id, "Secret does not exist yet, creating it");
                self.store
                    .create_secret(CreateSecret {
                        name: secret_id,
                        description: SECRET_DESCRIPTION,
                        secret_string: &encoded,
                        kms_key_id: self.kms_key_id(),
                        client_request_token: Some(&token),
                    })
                    .await?
            }
            Err(e) => return Err(e),
        };

        tracing::info!(
            secret_id,
            version_id = %version_id,
            key_id = %record.key_id,
            "Stored signing key as current"
        );

        Ok(SecretVersion {
            version_id,
            stage: VersionStage::Current,
            payload: record.clone(),
        })
    }

    /// Read the issuer auth token held in `secret_id`
    ///
    /// With `field` set, the secret is a JSON object and the token is that
    /// field's string value; otherwise the whole secret string is the token.
    ///
    /// # Errors
    ///
    /// * `ConfigInvalid` - the secret, its current version or the field is missing
    /// * `SecretStoreUnavailable` - the store call failed
    pub async fn read_auth_token(
        &self,
        secret_id: &str,
        field: Option<&str>,
    ) -> RenewalResult<SecretString> {
        let value = match self
            .store
            .get_secret_value(secret_id, None, Some(VersionStage::Current))
            .await
        {
            Ok(value) => value,
            Err(RenewalError::NotFound { .. } | RenewalError::VersionNotFound { .. }) => {
                return Err(ConfigError::InvalidValue {
                    field: "auth_token_secret_id".into(),
                    reason: format!("secret '{secret_id}' has no current value"),
                }
                .into());
            }
            Err(e) => return Err(e),
        };

        let Some(field) = field else {
            return Ok(SecretString::new(value.secret_string));
        };

        let missing = || -> RenewalError {
            ConfigError::InvalidValue {
                field: "auth_token_secret_key_name".into(),
                reason: format!("secret '{secret_id}' has no string field '{field}'"),
            }
            .into()
        };
        let parsed: serde_json::Value =
            serde_json::from_str(&value.secret_string).map_err(|_| missing())?;
        match parsed.get(field) {
            Some(serde_json::Value::String(token)) if !token.is_empty() => {
                tracing::debug!(secret_id, field, "Loaded issuer auth token");
                Ok(SecretString::new(token.clone()))
            }
            _ => Err(missing()),
        }
    }
}

fn encode(secret_id: &str, record: &SigningKeyRecord) -> RenewalResult<String> {
    record
        .to_secret_string()
        .map_err(|reason| RenewalError::MalformedPayload {
            secret_id: secret_id.to_string(),
            reason,
        })
}

fn decode(secret_id: &str, value: SecretValue, stage: VersionStage) -> RenewalResult<SecretVersion> {
    let payload = SigningKeyRecord::from_secret_string(&value.secret_string).map_err(|reason| {
        RenewalError::MalformedPayload {
            secret_id: secret_id.to_string(),
            reason,
        }
    })?;
    Ok(SecretVersion {
        version_id: value.version_id,
        stage,
        payload,
    })
}
