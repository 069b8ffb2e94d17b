//! Handler configuration
//!
//! Precedence (lowest to highest):
//! 1. Compiled defaults
//! 2. TOML config file (optional)
//! 3. Environment variables (unprefixed, see [`ENV_KEYS`])
//!
//! Validation runs once at start-up; an invalid configuration fails before
//! any store or issuer call.

use std::path::Path;
use std::time::Duration;

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::core::RenewalPolicy;
use crate::rotation::UnchangedKeyMode;

/// Environment variables read by [`RenewalConfig::figment`]
pub const ENV_KEYS: &[&str] = &[
    "SIGNING_KEY_SECRET_ID",
    "AUTH_TOKEN_SECRET_ID",
    "AUTH_TOKEN_SECRET_KEY_NAME",
    "SIGNING_KEY_TTL_MINUTES",
    "RENEW_WITHIN_DAYS",
    "RENEW_WITHIN_MINUTES",
    "EXPORT_METRICS",
    "METRICS_NAMESPACE",
    "SECRETS_MANAGER_REGION",
    "SECRETS_MANAGER_ENDPOINT_URL",
    "KMS_KEY_ARN",
    "ISSUER_ENDPOINT",
    "ISSUER_TIMEOUT_SECS",
    "INVOCATION_TIMEOUT_SECS",
    "UNCHANGED_KEY_MODE",
];

const DEFAULT_TTL_MINUTES: u32 = 10_080;
const DEFAULT_RENEW_WITHIN_DAYS: u32 = 1;
const DEFAULT_ISSUER_TIMEOUT_SECS: u64 = 10;
const DEFAULT_INVOCATION_TIMEOUT_SECS: u64 = 30;
const MAX_INVOCATION_TIMEOUT_SECS: u64 = 900;

/// Configuration error
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A field holds a value outside its allowed range
    #[error("Invalid configuration value for '{field}': {reason}")]
    InvalidValue {
        /// Field name
        field: String,
        /// What is wrong with it
        reason: String,
    },

    /// A required field is missing or blank
    #[error("Missing required configuration field: {field}")]
    MissingRequired {
        /// Field name
        field: String,
    },

    /// Fields are individually valid but inconsistent
    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),

    /// The layered sources could not be read or extracted
    #[error("Failed to load configuration: {0}")]
    Load(String),
}

/// Effective handler configuration
///
/// Holds identifiers only; no secret material is ever part of it, so it can
/// be printed as-is.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenewalConfig {
    /// Secret holding the signing key (`SIGNING_KEY_SECRET_ID`)
    pub signing_key_secret_id: String,
    /// Secret holding the issuer auth token
    pub auth_token_secret_id: Option<String>,
    /// JSON field of the auth-token secret holding the token; whole string when unset
    pub auth_token_secret_key_name: Option<String>,
    /// TTL requested for new keys
    pub signing_key_ttl_minutes: u32,
    /// Renewal window in days (exclusive with `renew_within_minutes`)
    pub renew_within_days: Option<u32>,
    /// Renewal window in minutes (exclusive with `renew_within_days`)
    pub renew_within_minutes: Option<u32>,
    /// Send datapoints to the metric sink
    pub export_metrics: bool,
    /// Metric namespace
    pub metrics_namespace: String,
    /// Secrets Manager region override
    pub secrets_manager_region: Option<String>,
    /// Secrets Manager endpoint override
    pub secrets_manager_endpoint_url: Option<String>,
    /// Customer-managed KMS key for the signing-key secret; blank means unset
    pub kms_key_arn: Option<String>,
    /// Base URL of the key-issuance service
    pub issuer_endpoint: Option<String>,
    /// Per-request timeout towards the issuer
    pub issuer_timeout_secs: u64,
    /// Budget for one invocation
    pub invocation_timeout_secs: u64,
    /// `createSecret` behaviour when the key is not due
    pub unchanged_key_mode: UnchangedKeyMode,
}

impl Default for RenewalConfig {
    fn default() -> Self {
        Self {
            signing_key_secret_id: String::new(),
            auth_token_secret_id: None,
            auth_token_secret_key_name: None,
            signing_key_ttl_minutes: DEFAULT_TTL_MINUTES,
            renew_within_days: None,
            renew_within_minutes: None,
            export_metrics: false,
            metrics_namespace: "SigningKeyRenewal".to_string(),
            secrets_manager_region: None,
            secrets_manager_endpoint_url: None,
            kms_key_arn: None,
            issuer_endpoint: None,
            issuer_timeout_secs: DEFAULT_ISSUER_TIMEOUT_SECS,
            invocation_timeout_secs: DEFAULT_INVOCATION_TIMEOUT_SECS,
            unchanged_key_mode: UnchangedKeyMode::default(),
        }
    }
}

fn blank_to_none(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

impl RenewalConfig {
    /// Defaults, then `path` if given and present, then the environment
    pub fn figment(path: Option<&Path>) -> Figment {
        let mut figment = Figment::new().merge(Serialized::defaults(Self::default()));
        if let Some(path) = path {
            if path.exists() {
                figment = figment.merge(Toml::file(path));
            } else {
                tracing::debug!(path = %path.display(), "Config file missing, using defaults and env only");
            }
        }
        figment.merge(Env::raw().only(ENV_KEYS))
    }

    /// Extract and validate
    pub fn from_figment(figment: &Figment) -> Result<Self, ConfigError> {
        let mut config: Self = figment
            .extract()
            .map_err(|e| ConfigError::Load(e.to_string()))?;
        config.normalize();
        config.validate()?;

        tracing::debug!(
            signing_key_secret_id = %config.signing_key_secret_id,
            ttl_minutes = config.signing_key_ttl_minutes,
            export_metrics = config.export_metrics,
            unchanged_key_mode = %config.unchanged_key_mode,
            "Configuration loaded"
        );
        Ok(config)
    }

    /// Load from defaults, optional file and environment
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        Self::from_figment(&Self::figment(path))
    }

    fn normalize(&mut self) {
        self.auth_token_secret_id = blank_to_none(self.auth_token_secret_id.take());
        self.auth_token_secret_key_name = blank_to_none(self.auth_token_secret_key_name.take());
        self.secrets_manager_region = blank_to_none(self.secrets_manager_region.take());
        self.secrets_manager_endpoint_url = blank_to_none(self.secrets_manager_endpoint_url.take());
        self.kms_key_arn = blank_to_none(self.kms_key_arn.take());
        self.issuer_endpoint = blank_to_none(self.issuer_endpoint.take());
    }

    /// Validate everything needed by any mode
    ///
    /// # Validation Rules
    ///
    /// - `signing_key_secret_id` is set
    /// - the policy invariant holds (window strictly shorter than the TTL)
    /// - `invocation_timeout_secs` is within 1..=900, `issuer_timeout_secs` ≥ 1
    /// - `metrics_namespace` is non-blank
    /// - `issuer_endpoint`, when set, is an http(s) URL
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.signing_key_secret_id.trim().is_empty() {
            return Err(ConfigError::MissingRequired {
                field: "signing_key_secret_id".into(),
            });
        }

        self.policy()?;

        if !(1..=MAX_INVOCATION_TIMEOUT_SECS).contains(&self.invocation_timeout_secs) {
            return Err(ConfigError::InvalidValue {
                field: "invocation_timeout_secs".into(),
                reason: format!(
                    "must be between 1 and {MAX_INVOCATION_TIMEOUT_SECS} seconds, got {}",
                    self.invocation_timeout_secs
                ),
            });
        }

        if self.issuer_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "issuer_timeout_secs".into(),
                reason: "must be at least 1 second".into(),
            });
        }

        if self.metrics_namespace.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "metrics_namespace".into(),
                reason: "must not be blank".into(),
            });
        }

        if self.issuer_endpoint.is_some() {
            self.issuer_url()?;
        }

        Ok(())
    }

    /// Additional requirements when talking to the real issuer
    pub fn validate_remote(&self) -> Result<(), ConfigError> {
        if self.issuer_endpoint.is_none() {
            return Err(ConfigError::MissingRequired {
                field: "issuer_endpoint".into(),
            });
        }
        if self.auth_token_secret_id.is_none() {
            return Err(ConfigError::MissingRequired {
                field: "auth_token_secret_id".into(),
            });
        }
        Ok(())
    }

    /// Renewal policy from the TTL and whichever window setting is present
    pub fn policy(&self) -> Result<RenewalPolicy, ConfigError> {
        match (self.renew_within_days, self.renew_within_minutes) {
            (Some(_), Some(_)) => Err(ConfigError::ValidationFailed(
                "renew_within_days and renew_within_minutes are mutually exclusive".into(),
            )),
            (Some(days), None) => RenewalPolicy::from_days(self.signing_key_ttl_minutes, days),
            (None, Some(minutes)) => {
                RenewalPolicy::from_minutes(self.signing_key_ttl_minutes, minutes)
            }
            (None, None) => {
                RenewalPolicy::from_days(self.signing_key_ttl_minutes, DEFAULT_RENEW_WITHIN_DAYS)
            }
        }
    }

    /// Issuer base URL
    pub fn issuer_url(&self) -> Result<Url, ConfigError> {
        let raw = self
            .issuer_endpoint
            .as_deref()
            .ok_or_else(|| ConfigError::MissingRequired {
                field: "issuer_endpoint".into(),
            })?;
        let url = Url::parse(raw).map_err(|e| ConfigError::InvalidValue {
            field: "issuer_endpoint".into(),
            reason: format!("'{raw}' is not a valid URL: {e}"),
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::InvalidValue {
                field: "issuer_endpoint".into(),
                reason: format!("unsupported scheme '{}'", url.scheme()),
            });
        }
        Ok(url)
    }

    /// Invocation budget
    pub fn invocation_timeout(&self) -> Duration {
        Duration::from_secs(self.invocation_timeout_secs)
    }

    /// Per-request issuer timeout
    pub fn issuer_timeout(&self) -> Duration {
        Duration::from_secs(self.issuer_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;
    use pretty_assertions::assert_eq;

    fn config() -> RenewalConfig {
        RenewalConfig {
            signing_key_secret_id: "signing-key".into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_defaults_need_only_secret_id() {
        let config = config();
        assert!(config.validate().is_ok());
        let policy = config.policy().unwrap();
        assert_eq!(policy.ttl_minutes(), 10_080);
        assert_eq!(policy.renew_within_minutes(), 1_440);
    }

    #[test]
    fn test_missing_secret_id() {
        let err = RenewalConfig::default().validate().unwrap_err();
        assert!(
            matches!(err, ConfigError::MissingRequired { ref field } if field == "signing_key_secret_id")
        );
    }

    #[test]
    fn test_window_must_be_shorter_than_ttl() {
        let config = RenewalConfig {
            signing_key_ttl_minutes: 4_320,
            renew_within_days: Some(3),
            ..config()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationFailed(_))
        ));
    }

    #[test]
    fn test_window_settings_are_exclusive() {
        let config = RenewalConfig {
            renew_within_days: Some(1),
            renew_within_minutes: Some(60),
            ..config()
        };
        assert!(config.policy().is_err());
    }

    #[test]
    fn test_invocation_timeout_range() {
        let config = RenewalConfig {
            invocation_timeout_secs: 901,
            ..config()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { ref field, .. }) if field == "invocation_timeout_secs"
        ));
    }

    #[test]
    fn test_remote_requires_issuer_and_token() {
        let mut config = config();
        assert!(config.validate_remote().is_err());
        config.issuer_endpoint = Some("https://keys.example.com".into());
        assert!(config.validate_remote().is_err());
        config.auth_token_secret_id = Some("auth-token".into());
        assert!(config.validate_remote().is_ok());
    }

    #[test]
    fn test_issuer_scheme_checked() {
        let config = RenewalConfig {
            issuer_endpoint: Some("ftp://keys.example.com".into()),
            ..config()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_env_overrides_file() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "renewal.toml",
                r#"
                signing_key_secret_id = "from-file"
                signing_key_ttl_minutes = 20160
                renew_within_days = 3
                "#,
            )?;
            jail.set_env("SIGNING_KEY_SECRET_ID", "from-env");
            jail.set_env("EXPORT_METRICS", "true");
            jail.set_env("KMS_KEY_ARN", "");
            jail.set_env("UNCHANGED_KEY_MODE", "issue");

            let config = RenewalConfig::load(Some(Path::new("renewal.toml")))
                .map_err(|e| e.to_string())?;

            assert_eq!(config.signing_key_secret_id, "from-env");
            assert_eq!(config.signing_key_ttl_minutes, 20_160);
            assert_eq!(config.renew_within_days, Some(3));
            assert!(config.export_metrics);
            assert_eq!(config.kms_key_arn, None);
            assert_eq!(config.unchanged_key_mode, UnchangedKeyMode::Issue);
            Ok(())
        });
    }

    #[test]
    fn test_unparseable_env_is_load_error() {
        Jail::expect_with(|jail| {
            jail.set_env("SIGNING_KEY_SECRET_ID", "s");
            jail.set_env("SIGNING_KEY_TTL_MINUTES", "a week");

            let err = RenewalConfig::load(None).unwrap_err();
            assert!(matches!(err, ConfigError::Load(_)));
            Ok(())
        });
    }
}
