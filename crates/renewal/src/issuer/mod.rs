//! Credential client over the key-issuance service
//!
//! [`SigningKeyIssuer`] is the opaque RPC seam; [`CredentialClient`] wraps it
//! and refuses to hand back anything that is not a usable key. One issuer call
//! per `issue_signing_key`: retries belong to the invocation trigger, so a
//! redelivered stage is the only way a second key can be requested.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::core::{RenewalError, RenewalResult, SecretString, SigningKeyRecord};

#[cfg(feature = "issuer-http")]
pub mod http;
pub mod mock;

#[cfg(feature = "issuer-http")]
pub use http::{HttpIssuerConfig, HttpSigningKeyIssuer};
pub use mock::MockIssuer;

/// Raw issuer response, before validation
#[derive(Clone, Debug)]
pub struct IssuedSigningKey {
    /// Identifier assigned by the issuer
    pub key_id: String,
    /// Endpoint the key is valid for
    pub endpoint: Option<String>,
    /// Key material
    pub key: SecretString,
    /// Absolute expiry reported by the issuer
    pub expires_at: DateTime<Utc>,
}

/// Key-issuance service
///
/// # Contract
///
/// - exactly one remote call per `issue`
/// - transport and service failures map to [`RenewalError::IssuanceFailed`]
#[async_trait]
pub trait SigningKeyIssuer: Send + Sync {
    /// Request a new signing key living `ttl_minutes`
    async fn issue(&self, ttl_minutes: u32) -> RenewalResult<IssuedSigningKey>;

    /// Name for logs
    fn name(&self) -> &'static str;
}

/// Validating wrapper around a [`SigningKeyIssuer`]
#[derive(Clone)]
pub struct CredentialClient {
    issuer: Arc<dyn SigningKeyIssuer>,
}

impl std::fmt::Debug for CredentialClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialClient")
            .field("issuer", &self.issuer.name())
            .finish()
    }
}

impl CredentialClient {
    /// Wrap an issuer
    pub fn new(issuer: Arc<dyn SigningKeyIssuer>) -> Self {
        Self { issuer }
    }

    /// Issue a new key and validate it against `now`
    ///
    /// # Errors
    ///
    /// * `IssuanceFailed` - the issuer failed, or returned an empty id or key,
    ///   or an expiry that is not in the future
    #[tracing::instrument(skip(self), fields(issuer = self.issuer.name()))]
    pub async fn issue_signing_key(
        &self,
        ttl_minutes: u32,
        now: DateTime<Utc>,
    ) -> RenewalResult<SigningKeyRecord> {
        let issued = self.issuer.issue(ttl_minutes).await?;

        let record = SigningKeyRecord {
            key_id: issued.key_id,
            endpoint: issued.endpoint,
            key: issued.key,
            issued_at: now,
            expires_at: issued.expires_at,
        };

        record
            .validate(now)
            .map_err(|reason| RenewalError::issuance(format!("issuer returned unusable key: {reason}")))?;

        tracing::info!(
            key_id = %record.key_id,
            expires_at = %record.expires_at.to_rfc3339(),
            "Issued new signing key"
        );
        Ok(record)
    }
}
