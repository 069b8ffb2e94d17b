//! Signing key record and its stored form
//!
//! A [`SigningKeyRecord`] is immutable once issued. Rotation never edits a
//! record; it writes a new secret version holding a new record.
//!
//! # Stored format
//!
//! ```json
//! {"keyId":"k-1","endpoint":"cell-1.example.com","key":"…","issuedAt":"2026-01-01T00:00:00Z","expiresAt":"2026-01-15T00:00:00Z"}
//! ```
//!
//! Decoding also accepts the legacy envelope `{"signingKey": "<record json>"}`,
//! where the inner record may carry `expiresAt` as epoch seconds or as a
//! US-style date (`"Jan 15, 2026, 12:00:00 AM"`, read as UTC) and may omit
//! `issuedAt`.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use super::SecretString;

/// A time-limited signing key as issued by the key-issuance service
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SigningKeyRecord {
    /// Identifier assigned by the issuer
    pub key_id: String,
    /// Endpoint the key is valid for, when the issuer reports one
    pub endpoint: Option<String>,
    /// Key material
    pub key: SecretString,
    /// When the handler received the key
    pub issued_at: DateTime<Utc>,
    /// Absolute expiry
    pub expires_at: DateTime<Utc>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StoredRecordRef<'a> {
    key_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    endpoint: Option<&'a str>,
    key: &'a str,
    issued_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredRecord {
    key_id: String,
    #[serde(default)]
    endpoint: Option<String>,
    key: String,
    #[serde(default)]
    issued_at: Option<Timestamp>,
    expires_at: Timestamp,
}

/// US date-time layouts written by legacy deployments, with and without the
/// comma before the time
const LEGACY_DATE_FORMATS: &[&str] = &["%b %d, %Y, %I:%M:%S %p", "%b %d, %Y %I:%M:%S %p"];

/// Wire timestamp: RFC3339 string, epoch seconds or a legacy US date string
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum Timestamp {
    Rfc3339(DateTime<Utc>),
    EpochSeconds(i64),
    LegacyDate(String),
}

impl Timestamp {
    pub(crate) fn into_datetime(self) -> Result<DateTime<Utc>, String> {
        match self {
            Self::Rfc3339(at) => Ok(at),
            Self::EpochSeconds(secs) => DateTime::from_timestamp(secs, 0)
                .ok_or_else(|| format!("epoch seconds {secs} out of range")),
            Self::LegacyDate(raw) => parse_legacy_date(&raw),
        }
    }
}

fn parse_legacy_date(raw: &str) -> Result<DateTime<Utc>, String> {
    // newer JDKs put a narrow no-break space before AM/PM
    let normalized = raw.trim().replace('\u{202f}', " ");
    LEGACY_DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(&normalized, format).ok())
        .map(|naive| naive.and_utc())
        .ok_or_else(|| format!("unrecognized timestamp '{raw}'"))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LegacyEnvelope {
    signing_key: String,
}

impl SigningKeyRecord {
    /// Time left before expiry, negative once expired
    #[must_use]
    pub fn remaining(&self, now: DateTime<Utc>) -> chrono::Duration {
        self.expires_at - now
    }

    /// Whether the key is already expired at `now`
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    /// Check structural validity against `now`
    ///
    /// # Rules
    ///
    /// - `key_id` and `key` are non-empty
    /// - `expires_at` is strictly after `now`
    pub fn validate(&self, now: DateTime<Utc>) -> Result<(), String> {
        if self.key_id.trim().is_empty() {
            return Err("keyId is empty".to_string());
        }
        if self.key.is_empty() {
            return Err(format!("key material for '{}' is empty", self.key_id));
        }
        if self.is_expired(now) {
            return Err(format!(
                "key '{}' expired at {} (now {})",
                self.key_id,
                self.expires_at.to_rfc3339(),
                now.to_rfc3339()
            ));
        }
        Ok(())
    }

    /// Encode into the stored secret-string form
    pub fn to_secret_string(&self) -> Result<String, String> {
        self.key.expose_secret(|key| {
            serde_json::to_string(&StoredRecordRef {
                key_id: &self.key_id,
                endpoint: self.endpoint.as_deref(),
                key,
                issued_at: self.issued_at,
                expires_at: self.expires_at,
            })
            .map_err(|e| e.to_string())
        })
    }

    /// Decode from a stored secret string (current or legacy envelope form)
    pub fn from_secret_string(raw: &str) -> Result<Self, String> {
        let value: serde_json::Value =
            serde_json::from_str(raw).map_err(|e| format!("not JSON: {e}"))?;

        let stored: StoredRecord = if value.get("signingKey").is_some() {
            let envelope: LegacyEnvelope =
                serde_json::from_value(value).map_err(|e| format!("legacy envelope: {e}"))?;
            serde_json::from_str(&envelope.signing_key)
                .map_err(|e| format!("legacy signingKey: {e}"))?
        } else {
            serde_json::from_value(value).map_err(|e| e.to_string())?
        };

        let expires_at = stored.expires_at.into_datetime()?;
        let issued_at = match stored.issued_at {
            Some(at) => at.into_datetime()?,
            None => expires_at,
        };

        Ok(Self {
            key_id: stored.key_id,
            endpoint: stored.endpoint,
            key: SecretString::new(stored.key),
            issued_at,
            expires_at,
        })
    }
}
