//! Shared fixtures for the renewal integration tests

#![allow(dead_code)]

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use signing_key_renewal::prelude::*;

/// Secret used by every scenario
pub const SECRET_ID: &str = "signing-key";

/// Fixed invocation time
pub fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 4, 1, 9, 30, 0).unwrap()
}

/// A stored record expiring `expires_in` after [`now`]
pub fn record(key_id: &str, expires_in: Duration) -> SigningKeyRecord {
    SigningKeyRecord {
        key_id: key_id.to_string(),
        endpoint: Some("cell-1.example.com".to_string()),
        key: SecretString::new(format!("{key_id}-material")),
        issued_at: now() - Duration::days(1),
        expires_at: now() + expires_in,
    }
}

/// Store, issuer, metrics sink and a dispatcher wired over them
pub struct Harness {
    pub store: Arc<InMemorySecretStore>,
    pub issuer: Arc<MockIssuer>,
    pub sink: Arc<MemorySink>,
    pub adapter: SecretStoreAdapter,
    pub dispatcher: Dispatcher,
}

impl Harness {
    /// Policy `{ttl: 20160, renewWithin: 3 days}`, mirror mode, export on
    pub fn new() -> Self {
        Self::with_mode(UnchangedKeyMode::Mirror)
    }

    pub fn with_mode(mode: UnchangedKeyMode) -> Self {
        let store = Arc::new(InMemorySecretStore::new());
        let issuer = Arc::new(MockIssuer::new().with_issue_time(now()));
        let sink = Arc::new(MemorySink::new());

        let adapter = SecretStoreAdapter::new(store.clone(), Some("alias/signing-key".into()));
        let client = CredentialClient::new(issuer.clone());
        let policy = RenewalPolicy::from_days(20_160, 3).unwrap();

        let dispatcher = Dispatcher::new(
            RenewalWorkflow::new(adapter.clone(), client.clone(), policy),
            RotationWorkflow::new(adapter.clone(), client, policy).with_mode(mode),
            OutcomeReporter::new(vec![sink.clone()], true),
            SECRET_ID,
        );

        Self {
            store,
            issuer,
            sink,
            adapter,
            dispatcher,
        }
    }

    /// Seed a current record and start a rotation under `token`
    pub async fn seed_rotation(&self, current: &SigningKeyRecord, token: &str) -> String {
        let version = self.adapter.put_current(SECRET_ID, current).await.unwrap();
        self.store.enable_rotation(SECRET_ID).unwrap();
        self.store.begin_rotation(SECRET_ID, token).unwrap();
        version.version_id
    }

    /// Rotation event as delivered by the trigger
    pub fn event(token: &str, step: &str) -> serde_json::Value {
        serde_json::json!({
            "SecretId": SECRET_ID,
            "ClientRequestToken": token,
            "Step": step,
        })
    }

    /// Version currently holding `stage`
    pub async fn holder(&self, stage: VersionStage) -> Option<String> {
        self.store
            .describe_secret(SECRET_ID)
            .await
            .unwrap()
            .version_holding(stage)
            .map(str::to_string)
    }
}
