//! Secret store primitives and backends
//!
//! Two layers:
//!
//! - [`SecretStore`]: the managed store's native calls (describe, get, create,
//!   put, move a stage label). Backends implement only this.
//! - [`SecretStoreAdapter`]: the renewal-level operations (current version,
//!   idempotent pending write, promotion) built on those calls, owning the
//!   record codec and the optional KMS key reference.
//!
//! # Label semantics
//!
//! A stage label is held by at most one version. Moving `AWSCURRENT` off a
//! version relabels it `AWSPREVIOUS`. Writing a version under a client
//! request token that already holds identical content is a no-op; different
//! content under the same token is a conflict.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::Serialize;

use crate::core::{RenewalResult, SigningKeyRecord, VersionStage};

mod adapter;
pub mod memory;

#[cfg(feature = "store-aws")]
pub mod aws;

pub use adapter::{Promotion, SecretStoreAdapter};
pub use memory::{InMemorySecretStore, WriteRecord};

#[cfg(feature = "store-aws")]
pub use aws::{AwsSecretsManagerConfig, AwsSecretsManagerStore};

/// Description given to secrets the handler creates
pub const SECRET_DESCRIPTION: &str = "Stores a serialized signing key issued by the key-issuance service";

/// Secret metadata: rotation flag and the version → labels map
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SecretDescription {
    /// Secret name or ARN as reported by the store
    pub name: String,
    /// Whether the store's rotation lifecycle is enabled
    pub rotation_enabled: bool,
    /// Labels attached to each version, custom labels included
    pub versions: BTreeMap<String, Vec<String>>,
}

impl SecretDescription {
    /// Version currently holding `stage`, if any
    #[must_use]
    pub fn version_holding(&self, stage: VersionStage) -> Option<&str> {
        self.versions
            .iter()
            .find(|(_, labels)| labels.iter().any(|l| l == stage.label()))
            .map(|(id, _)| id.as_str())
    }

    /// Known stages of `version_id`; `None` when the version is unknown
    #[must_use]
    pub fn stages_of(&self, version_id: &str) -> Option<Vec<VersionStage>> {
        self.versions.get(version_id).map(|labels| {
            labels
                .iter()
                .filter_map(|l| VersionStage::from_label(l))
                .collect()
        })
    }
}

/// A raw secret value as returned by the store
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SecretValue {
    /// Version the value belongs to
    pub version_id: String,
    /// Stored string
    pub secret_string: String,
}

/// Arguments of [`SecretStore::create_secret`]
#[derive(Clone, Debug)]
pub struct CreateSecret<'a> {
    /// Secret name
    pub name: &'a str,
    /// Human description
    pub description: &'a str,
    /// Initial value, labelled `AWSCURRENT`
    pub secret_string: &'a str,
    /// Customer-managed encryption key; `None` uses the store default
    pub kms_key_id: Option<&'a str>,
    /// Idempotency token, used as the first version id
    pub client_request_token: Option<&'a str>,
}

/// Arguments of [`SecretStore::put_secret_value`]
#[derive(Clone, Debug)]
pub struct PutSecretValue<'a> {
    /// Target secret
    pub secret_id: &'a str,
    /// Value to store
    pub secret_string: &'a str,
    /// Idempotency token, becomes the version id
    pub client_request_token: Option<&'a str>,
    /// Labels for the new version; empty means `AWSCURRENT`
    pub stages: &'a [VersionStage],
    /// Customer-managed encryption key passed through unchanged
    pub kms_key_id: Option<&'a str>,
}

/// Managed secret store
///
/// # Contract
///
/// - `NotFound` only when the secret itself is absent
/// - `VersionNotFound` when the secret exists but the version/label does not,
///   or the version has no value yet
/// - transport and service failures map to `SecretStoreUnavailable`
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Rotation flag and version labels
    async fn describe_secret(&self, secret_id: &str) -> RenewalResult<SecretDescription>;

    /// Value by version id and/or stage; neither means `AWSCURRENT`
    async fn get_secret_value(
        &self,
        secret_id: &str,
        version_id: Option<&str>,
        stage: Option<VersionStage>,
    ) -> RenewalResult<SecretValue>;

    /// Create the secret with its first version; returns the version id
    async fn create_secret(&self, request: CreateSecret<'_>) -> RenewalResult<String>;

    /// Write a new version; returns the version id
    async fn put_secret_value(&self, request: PutSecretValue<'_>) -> RenewalResult<String>;

    /// Attach `stage` to `move_to`, detaching it from `remove_from`
    async fn update_version_stage(
        &self,
        secret_id: &str,
        stage: VersionStage,
        move_to: &str,
        remove_from: Option<&str>,
    ) -> RenewalResult<()>;

    /// Backend name for logs
    fn name(&self) -> &'static str;
}

/// A decoded secret version
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SecretVersion {
    /// Version id (the rotation request token for staged versions)
    pub version_id: String,
    /// Stage this version was read under
    pub stage: VersionStage,
    /// Decoded signing key
    pub payload: SigningKeyRecord,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_description_lookups() {
        let mut versions = BTreeMap::new();
        versions.insert("a".to_string(), vec!["AWSPREVIOUS".to_string()]);
        versions.insert(
            "b".to_string(),
            vec!["AWSCURRENT".to_string(), "custom".to_string()],
        );
        versions.insert("c".to_string(), vec!["AWSPENDING".to_string()]);
        let description = SecretDescription {
            name: "s".into(),
            rotation_enabled: true,
            versions,
        };

        assert_eq!(description.version_holding(VersionStage::Current), Some("b"));
        assert_eq!(description.version_holding(VersionStage::Pending), Some("c"));
        assert_eq!(
            description.stages_of("b"),
            Some(vec![VersionStage::Current])
        );
        assert_eq!(description.stages_of("missing"), None);
    }
}
