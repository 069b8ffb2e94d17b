//! AWS Secrets Manager backend
//!
//! # Configuration
//!
//! ```rust,ignore
//! use signing_key_renewal::store::{AwsSecretsManagerConfig, AwsSecretsManagerStore};
//! use std::time::Duration;
//!
//! let config = AwsSecretsManagerConfig {
//!     region: Some("us-west-2".into()),
//!     timeout: Duration::from_secs(5),
//!     ..Default::default()
//! };
//!
//! let store = AwsSecretsManagerStore::new(config).await?;
//! ```
//!
//! # Error mapping
//!
//! | Service error code          | Mapped to                 |
//! |-----------------------------|---------------------------|
//! | `ResourceNotFoundException` | `NotFound` / `VersionNotFound` |
//! | `ResourceExistsException`   | `Conflict`                |
//! | `InvalidRequestException` on stage moves | `InvalidVersionStage` |
//! | anything else               | `SecretStoreUnavailable`  |

use std::time::{Duration, Instant};

use async_trait::async_trait;
use aws_sdk_secretsmanager::Client as SecretsManagerClient;
use aws_sdk_secretsmanager::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use serde::{Deserialize, Serialize};

use super::{CreateSecret, PutSecretValue, SecretDescription, SecretStore, SecretValue};
use crate::config::ConfigError;
use crate::core::{RenewalError, RenewalResult, VersionStage};

/// AWS Secrets Manager configuration
///
/// # Example
///
/// ```rust
/// use signing_key_renewal::store::AwsSecretsManagerConfig;
/// use std::time::Duration;
///
/// let config = AwsSecretsManagerConfig {
///     region: Some("us-east-1".into()),
///     timeout: Duration::from_secs(10),
///     ..Default::default()
/// };
///
/// assert!(config.validate().is_ok());
/// ```
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AwsSecretsManagerConfig {
    /// AWS region; the SDK default chain applies when `None`
    pub region: Option<String>,

    /// Custom endpoint URL (LocalStack or another compatible service)
    pub endpoint_url: Option<String>,

    /// Per-operation timeout
    ///
    /// **Validation**: between 1 and 60 seconds
    pub timeout: Duration,
}

impl Default for AwsSecretsManagerConfig {
    fn default() -> Self {
        Self {
            region: None,
            endpoint_url: None,
            timeout: Duration::from_secs(5),
        }
    }
}

impl AwsSecretsManagerConfig {
    /// Check field ranges
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(region) = &self.region
            && region.trim().is_empty()
        {
            return Err(ConfigError::InvalidValue {
                field: "secrets_manager_region".into(),
                reason: "must not be blank".into(),
            });
        }

        if let Some(endpoint) = &self.endpoint_url
            && url::Url::parse(endpoint).is_err()
        {
            return Err(ConfigError::InvalidValue {
                field: "secrets_manager_endpoint_url".into(),
                reason: format!("'{endpoint}' is not a valid URL"),
            });
        }

        let timeout_secs = self.timeout.as_secs();
        if !(1..=60).contains(&timeout_secs) {
            return Err(ConfigError::InvalidValue {
                field: "timeout".into(),
                reason: format!("must be between 1 and 60 seconds, got {timeout_secs} seconds"),
            });
        }

        Ok(())
    }
}

/// [`SecretStore`] backed by AWS Secrets Manager
#[derive(Clone)]
pub struct AwsSecretsManagerStore {
    client: SecretsManagerClient,
    config: AwsSecretsManagerConfig,
}

impl std::fmt::Debug for AwsSecretsManagerStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AwsSecretsManagerStore")
            .field("config", &self.config)
            .finish()
    }
}

impl AwsSecretsManagerStore {
    /// Build the client from the SDK default credential chain
    ///
    /// # Errors
    ///
    /// * `ConfigInvalid` - configuration validation failed
    pub async fn new(config: AwsSecretsManagerConfig) -> RenewalResult<Self> {
        config.validate()?;

        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest()).timeout_config(
            aws_config::timeout::TimeoutConfig::builder()
                .operation_timeout(config.timeout)
                .build(),
        );

        if let Some(region) = &config.region {
            loader = loader.region(aws_config::Region::new(region.clone()));
        }

        if let Some(endpoint) = &config.endpoint_url {
            loader = loader.endpoint_url(endpoint);
        }

        let sdk_config = loader.load().await;
        let client = SecretsManagerClient::new(&sdk_config);

        tracing::info!(
            store = "AWS Secrets Manager",
            region = ?config.region,
            endpoint = ?config.endpoint_url,
            "Initialized secret store"
        );

        Ok(Self { client, config })
    }
}

/// Map an SDK failure using the service error code
fn classify<E>(
    err: &SdkError<E>,
    secret_id: &str,
    version: Option<&str>,
    operation: &'static str,
) -> RenewalError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
{
    match err.code() {
        Some("ResourceNotFoundException") => missing_resource(secret_id, version, err.message()),
        Some("ResourceExistsException") => RenewalError::Conflict {
            secret_id: secret_id.to_string(),
            version_id: version.unwrap_or("[create]").to_string(),
        },
        Some("InvalidRequestException") if operation == "update_version_stage" => {
            RenewalError::InvalidVersionStage {
                secret_id: secret_id.to_string(),
                version_id: version.unwrap_or_default().to_string(),
                reason: err.message().unwrap_or("rejected by the service").to_string(),
            }
        }
        _ => RenewalError::unavailable(
            secret_id,
            format!("{operation}: {}", DisplayErrorContext(err)),
        ),
    }
}

/// `ResourceNotFoundException` is raised for a missing secret and for a missing
/// version alike; only the message tells them apart
fn missing_resource(secret_id: &str, version: Option<&str>, message: Option<&str>) -> RenewalError {
    let names_version = message.is_none_or(|message| {
        let message = message.to_ascii_lowercase();
        ["secret value", "versionid", "version id", "staging label"]
            .iter()
            .any(|needle| message.contains(needle))
    });

    match version {
        Some(version_id) if names_version => RenewalError::VersionNotFound {
            secret_id: secret_id.to_string(),
            version_id: version_id.to_string(),
        },
        _ => RenewalError::NotFound {
            secret_id: secret_id.to_string(),
        },
    }
}

fn log_call(operation: &'static str, secret_id: &str, start: Instant, ok: bool) {
    tracing::debug!(
        operation,
        secret_id,
        success = ok,
        duration_ms = start.elapsed().as_millis() as u64,
        "Secrets Manager call finished"
    );
}

#[async_trait]
impl SecretStore for AwsSecretsManagerStore {
    #[tracing::instrument(skip(self), fields(store = "aws"))]
    async fn describe_secret(&self, secret_id: &str) -> RenewalResult<SecretDescription> {
        let start = Instant::now();
        let result = self
            .client
            .describe_secret()
            .secret_id(secret_id)
            .send()
            .await;
        log_call("describe_secret", secret_id, start, result.is_ok());

        let output = result.map_err(|e| classify(&e, secret_id, None, "describe_secret"))?;

        Ok(SecretDescription {
            name: output.name().unwrap_or(secret_id).to_string(),
            rotation_enabled: output.rotation_enabled().unwrap_or(false),
            versions: output
                .version_ids_to_stages()
                .map(|m| m.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
                .unwrap_or_default(),
        })
    }

    #[tracing::instrument(skip(self), fields(store = "aws"))]
    async fn get_secret_value(
        &self,
        secret_id: &str,
        version_id: Option<&str>,
        stage: Option<VersionStage>,
    ) -> RenewalResult<SecretValue> {
        let start = Instant::now();
        let result = self
            .client
            .get_secret_value()
            .secret_id(secret_id)
            .set_version_id(version_id.map(str::to_string))
            .set_version_stage(stage.map(|s| s.label().to_string()))
            .send()
            .await;
        log_call("get_secret_value", secret_id, start, result.is_ok());

        let output =
            result.map_err(|e| classify(&e, secret_id, version_id, "get_secret_value"))?;

        let resolved = output.version_id().unwrap_or_default().to_string();
        let secret_string = output
            .secret_string()
            .ok_or_else(|| RenewalError::MalformedPayload {
                secret_id: secret_id.to_string(),
                reason: format!("version '{resolved}' does not contain string data"),
            })?
            .to_string();

        Ok(SecretValue {
            version_id: resolved,
            secret_string,
        })
    }

    #[tracing::instrument(skip(self, request), fields(store = "aws", secret_id = request.name))]
    async fn create_secret(&self, request: CreateSecret<'_>) -> RenewalResult<String> {
        let start = Instant::now();
        let result = self
            .client
            .create_secret()
            .name(request.name)
            .description(request.description)
            .secret_string(request.secret_string)
            .set_kms_key_id(request.kms_key_id.map(str::to_string))
            .set_client_request_token(request.client_request_token.map(str::to_string))
            .send()
            .await;
        log_call("create_secret", request.name, start, result.is_ok());

        let output = result.map_err(|e| classify(&e, request.name, None, "create_secret"))?;
        Ok(output
            .version_id()
            .or(request.client_request_token)
            .unwrap_or_default()
            .to_string())
    }

    #[tracing::instrument(skip(self, request), fields(store = "aws", secret_id = request.secret_id))]
    async fn put_secret_value(&self, request: PutSecretValue<'_>) -> RenewalResult<String> {
        let start = Instant::now();
        // PutSecretValue has no KMS parameter; the key chosen at creation applies.
        let stages = (!request.stages.is_empty()).then(|| {
            request
                .stages
                .iter()
                .map(|s| s.label().to_string())
                .collect::<Vec<_>>()
        });
        let result = self
            .client
            .put_secret_value()
            .secret_id(request.secret_id)
            .secret_string(request.secret_string)
            .set_client_request_token(request.client_request_token.map(str::to_string))
            .set_version_stages(stages)
            .send()
            .await;
        log_call("put_secret_value", request.secret_id, start, result.is_ok());

        let output = result.map_err(|e| {
            classify(
                &e,
                request.secret_id,
                request.client_request_token,
                "put_secret_value",
            )
        })?;
        Ok(output
            .version_id()
            .or(request.client_request_token)
            .unwrap_or_default()
            .to_string())
    }

    #[tracing::instrument(skip(self), fields(store = "aws"))]
    async fn update_version_stage(
        &self,
        secret_id: &str,
        stage: VersionStage,
        move_to: &str,
        remove_from: Option<&str>,
    ) -> RenewalResult<()> {
        let start = Instant::now();
        let result = self
            .client
            .update_secret_version_stage()
            .secret_id(secret_id)
            .version_stage(stage.label())
            .move_to_version_id(move_to)
            .set_remove_from_version_id(remove_from.map(str::to_string))
            .send()
            .await;
        log_call("update_version_stage", secret_id, start, result.is_ok());

        result
            .map(|_| ())
            .map_err(|e| classify(&e, secret_id, Some(move_to), "update_version_stage"))
    }

    fn name(&self) -> &'static str {
        "aws"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(AwsSecretsManagerConfig::default().validate().is_ok());
    }

    #[test]
    fn test_timeout_out_of_range() {
        let config = AwsSecretsManagerConfig {
            timeout: Duration::from_secs(120),
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { field, .. }) if field == "timeout"
        ));
    }

    #[test]
    fn test_missing_secret_with_version_is_not_found() {
        let err = missing_resource(
            "signing-key",
            Some("tok"),
            Some("Secrets Manager can't find the specified secret."),
        );
        assert!(matches!(err, RenewalError::NotFound { .. }), "{err}");
    }

    #[test]
    fn test_missing_version_is_version_not_found() {
        for message in [
            "Secrets Manager can't find the specified secret value for VersionId: tok",
            "Secrets Manager can't find the specified secret value for staging label: AWSPENDING",
        ] {
            let err = missing_resource("signing-key", Some("tok"), Some(message));
            assert!(matches!(err, RenewalError::VersionNotFound { .. }), "{message}");
        }
    }

    #[test]
    fn test_missing_resource_without_version_or_message() {
        assert!(matches!(
            missing_resource("signing-key", None, Some("secret value for staging label")),
            RenewalError::NotFound { .. }
        ));
        assert!(matches!(
            missing_resource("signing-key", Some("tok"), None),
            RenewalError::VersionNotFound { .. }
        ));
    }

    #[test]
    fn test_bad_endpoint_rejected() {
        let config = AwsSecretsManagerConfig {
            endpoint_url: Some("not a url".into()),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
