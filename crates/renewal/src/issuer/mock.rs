//! Deterministic in-process issuer
//!
//! Used by tests and by the CLI's local mode. Key ids are sequential
//! (`mock-key-1`, `mock-key-2`, …), expiry is `now + ttl` unless overridden,
//! and failures can be injected.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;

use super::{IssuedSigningKey, SigningKeyIssuer};
use crate::core::{RenewalError, RenewalResult, SecretString};

/// In-process [`SigningKeyIssuer`]
#[derive(Debug, Default)]
pub struct MockIssuer {
    calls: AtomicU64,
    issue_time: Option<DateTime<Utc>>,
    expiry_offset: Option<Duration>,
    key_material: Option<String>,
    fail_next: Mutex<Option<String>>,
}

impl MockIssuer {
    /// Issuer whose keys expire `ttl` after the wall clock
    pub fn new() -> Self {
        Self::default()
    }

    /// Compute expiry from this instant instead of the wall clock
    pub fn with_issue_time(mut self, at: DateTime<Utc>) -> Self {
        self.issue_time = Some(at);
        self
    }

    /// Expire keys `offset` after the issue time, ignoring the requested TTL
    pub fn with_expiry_offset(mut self, offset: Duration) -> Self {
        self.expiry_offset = Some(offset);
        self
    }

    /// Return this exact key material
    pub fn with_key_material(mut self, material: impl Into<String>) -> Self {
        self.key_material = Some(material.into());
        self
    }

    /// Fail the next call with `IssuanceFailed(reason)`
    pub fn fail_next(&self, reason: impl Into<String>) {
        *self.fail_next.lock() = Some(reason.into());
    }

    /// Number of `issue` calls so far, failed ones included
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SigningKeyIssuer for MockIssuer {
    async fn issue(&self, ttl_minutes: u32) -> RenewalResult<IssuedSigningKey> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;

        if let Some(reason) = self.fail_next.lock().take() {
            return Err(RenewalError::issuance(reason));
        }

        let base = self.issue_time.unwrap_or_else(Utc::now);
        let lifetime = self
            .expiry_offset
            .unwrap_or_else(|| Duration::minutes(i64::from(ttl_minutes)));
        let material = self
            .key_material
            .clone()
            .unwrap_or_else(|| format!("mock-signing-key-{n}-{}", uuid::Uuid::new_v4()));

        Ok(IssuedSigningKey {
            key_id: format!("mock-key-{n}"),
            endpoint: Some("mock.local".to_string()),
            key: SecretString::new(material),
            expires_at: base + lifetime,
        })
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}
