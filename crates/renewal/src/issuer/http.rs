//! HTTP key-issuance client
//!
//! `POST {endpoint}/signing-keys` with `{"ttlMinutes": n}` and a bearer auth
//! token. The response body is
//! `{"keyId": "...", "endpoint": "...", "key": "...", "expiresAt": <RFC3339 | epoch seconds>}`.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use url::Url;

use super::{IssuedSigningKey, SigningKeyIssuer};
use crate::core::{RenewalError, RenewalResult, SecretString, Timestamp};

/// Maximum length for error response body to log (prevents log flooding)
const MAX_ERROR_BODY_LOG_LENGTH: usize = 500;

/// Truncate a response body and redact key material before logging
fn sanitize_response_for_logging(body: &str) -> String {
    if let Ok(mut json) = serde_json::from_str::<serde_json::Value>(body) {
        for field in ["key", "token", "secret", "authToken"] {
            if json.get(field).is_some() {
                json[field] = serde_json::json!("[REDACTED]");
            }
        }
        let rendered = json.to_string();
        return truncate(&rendered);
    }
    truncate(body)
}

fn truncate(body: &str) -> String {
    if body.len() > MAX_ERROR_BODY_LOG_LENGTH {
        let mut cut = MAX_ERROR_BODY_LOG_LENGTH;
        while !body.is_char_boundary(cut) {
            cut -= 1;
        }
        format!("{}... [truncated, {} total bytes]", &body[..cut], body.len())
    } else {
        body.to_string()
    }
}

/// HTTP issuer configuration
#[derive(Clone, Debug)]
pub struct HttpIssuerConfig {
    /// Base URL of the key-issuance service
    pub endpoint: Url,
    /// Bearer token presented on every call
    pub auth_token: SecretString,
    /// Per-request timeout
    pub timeout: Duration,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct IssueRequest {
    ttl_minutes: u32,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct IssueResponse {
    key_id: String,
    #[serde(default)]
    endpoint: Option<String>,
    key: String,
    expires_at: Timestamp,
}

/// [`SigningKeyIssuer`] over HTTP
#[derive(Clone, Debug)]
pub struct HttpSigningKeyIssuer {
    client: reqwest::Client,
    issue_url: Url,
    auth_token: SecretString,
}

impl HttpSigningKeyIssuer {
    /// Build the client
    ///
    /// # Errors
    ///
    /// * `IssuanceFailed` - the endpoint cannot be joined or the client cannot be built
    pub fn new(config: HttpIssuerConfig) -> RenewalResult<Self> {
        let mut endpoint = config.endpoint;
        if !endpoint.path().ends_with('/') {
            let path = format!("{}/", endpoint.path());
            endpoint.set_path(&path);
        }
        let issue_url = endpoint
            .join("signing-keys")
            .map_err(|e| RenewalError::issuance(format!("invalid issuer endpoint: {e}")))?;

        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| RenewalError::issuance(format!("cannot build HTTP client: {e}")))?;

        tracing::info!(
            issuer = "http",
            url = %issue_url,
            timeout_ms = config.timeout.as_millis() as u64,
            "Initialized signing key issuer"
        );

        Ok(Self {
            client,
            issue_url,
            auth_token: config.auth_token,
        })
    }
}

#[async_trait]
impl SigningKeyIssuer for HttpSigningKeyIssuer {
    #[tracing::instrument(skip(self), fields(issuer = "http", url = %self.issue_url))]
    async fn issue(&self, ttl_minutes: u32) -> RenewalResult<IssuedSigningKey> {
        let request = self
            .auth_token
            .expose_secret(|token| self.client.post(self.issue_url.clone()).bearer_auth(token))
            .json(&IssueRequest { ttl_minutes });

        let response = request
            .send()
            .await
            .map_err(|e| RenewalError::issuance(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(
                status = status.as_u16(),
                body = %sanitize_response_for_logging(&body),
                "Key-issuance service rejected the request"
            );
            return Err(RenewalError::issuance(format!(
                "issuer responded with status {status}"
            )));
        }

        let body: IssueResponse = response
            .json()
            .await
            .map_err(|e| RenewalError::issuance(format!("undecodable issuer response: {e}")))?;

        let expires_at = body
            .expires_at
            .into_datetime()
            .map_err(|e| RenewalError::issuance(format!("invalid expiresAt: {e}")))?;

        Ok(IssuedSigningKey {
            key_id: body.key_id,
            endpoint: body.endpoint,
            key: SecretString::new(body.key),
            expires_at,
        })
    }

    fn name(&self) -> &'static str {
        "http"
    }
}
