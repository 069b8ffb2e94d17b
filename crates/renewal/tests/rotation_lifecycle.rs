//! End-to-end renewal and rotation scenarios
//!
//! Each test drives the dispatcher with the raw payloads the triggers deliver
//! and checks the resulting version history in the in-memory store.

mod common;

use chrono::Duration;
use common::{Harness, SECRET_ID, now, record};
use pretty_assertions::assert_eq;
use serde_json::json;
use signing_key_renewal::prelude::*;
use signing_key_renewal::store::PutSecretValue;

#[tokio::test]
async fn scenario_a_first_tick_creates_current_key() {
    // GIVEN: No secret exists yet
    let h = Harness::new();

    // WHEN: A scheduler tick arrives
    let report = h
        .dispatcher
        .handle(&json!({"source": "aws.events", "detail-type": "Scheduled Event"}), now())
        .await
        .unwrap();

    // THEN: One key is issued and stored as current, expiring one TTL from now
    assert_eq!(report.kind, "scheduled");
    assert_eq!(report.outcome, Outcome::Renewed);
    assert_eq!(h.issuer.calls(), 1);
    assert_eq!(h.store.version_count(SECRET_ID), 1);

    let current = h.adapter.get_current_version(SECRET_ID).await.unwrap().unwrap();
    assert_eq!(current.payload.expires_at, now() + Duration::minutes(20_160));
    assert_eq!(report.key_id.as_deref(), Some(current.payload.key_id.as_str()));

    // AND: The secret was created under the configured KMS key
    assert_eq!(h.store.kms_key_id(SECRET_ID).as_deref(), Some("alias/signing-key"));
}

#[tokio::test]
async fn scenario_b_due_key_goes_through_all_four_stages() {
    // GIVEN: A current key expiring in one day, inside the 3-day window
    let h = Harness::new();
    let old_version = h.seed_rotation(&record("old", Duration::days(1)), "tok-b").await;

    // WHEN: The trigger delivers every stage in order
    let mut outcomes = Vec::new();
    for step in ["createSecret", "setSecret", "testSecret", "finishSecret"] {
        let report = h
            .dispatcher
            .handle(&Harness::event("tok-b", step), now())
            .await
            .unwrap();
        outcomes.push(report.outcome);
    }

    // THEN: A new key is issued once and becomes current; the old one is previous
    assert_eq!(
        outcomes,
        vec![
            Outcome::Renewed,
            Outcome::Skipped,
            Outcome::Skipped,
            Outcome::Renewed
        ]
    );
    assert_eq!(h.issuer.calls(), 1);
    assert_eq!(h.holder(VersionStage::Current).await.as_deref(), Some("tok-b"));
    assert_eq!(
        h.holder(VersionStage::Previous).await.as_deref(),
        Some(old_version.as_str())
    );

    let current = h.adapter.get_current_version(SECRET_ID).await.unwrap().unwrap();
    assert_eq!(current.payload.key_id, "mock-key-1");
}

#[tokio::test]
async fn scenario_c_key_not_due_is_skipped() {
    // GIVEN: A current key expiring in ten days
    let h = Harness::new();
    h.adapter
        .put_current(SECRET_ID, &record("fresh", Duration::days(10)))
        .await
        .unwrap();

    // WHEN: A scheduler tick arrives
    let report = h.dispatcher.handle(&json!({}), now()).await.unwrap();

    // THEN: Nothing is issued and the outcome is SKIPPED
    assert_eq!(report.outcome, Outcome::Skipped);
    assert_eq!(report.key_id.as_deref(), Some("fresh"));
    assert_eq!(h.issuer.calls(), 0);
    assert_eq!(h.store.version_count(SECRET_ID), 1);
}

#[tokio::test]
async fn scenario_c_rotation_mirrors_current_when_not_due() {
    // GIVEN: A rotation started while the current key has ten days left
    let h = Harness::new();
    h.seed_rotation(&record("fresh", Duration::days(10)), "tok-c").await;

    // WHEN: The whole lifecycle runs
    let mut outcomes = Vec::new();
    for step in ["createSecret", "setSecret", "testSecret", "finishSecret"] {
        let report = h
            .dispatcher
            .handle(&Harness::event("tok-c", step), now())
            .await
            .unwrap();
        outcomes.push(report.outcome);
    }

    // THEN: No key was issued, no stage counts as a renewal and the served key is unchanged
    assert_eq!(outcomes, vec![Outcome::Skipped; 4]);
    assert_eq!(h.issuer.calls(), 0);
    let current = h.adapter.get_current_version(SECRET_ID).await.unwrap().unwrap();
    assert_eq!(current.version_id, "tok-c");
    assert_eq!(current.payload.key_id, "fresh");
}

#[tokio::test]
async fn finish_before_create_leaves_current_key_served() {
    // GIVEN: A rotation token registered as AWSPENDING with no value yet
    let h = Harness::new();
    let old_version = h.seed_rotation(&record("old", Duration::days(1)), "tok-f").await;

    // WHEN: finishSecret is delivered before createSecret
    let result = h
        .dispatcher
        .handle(&Harness::event("tok-f", "finishSecret"), now())
        .await;

    // THEN: The step fails and the old key stays current
    assert!(matches!(result, Err(RenewalError::VersionNotFound { .. })));
    let current = h.adapter.get_current_version(SECRET_ID).await.unwrap().unwrap();
    assert_eq!(current.version_id, old_version);
    assert_eq!(current.payload.key_id, "old");
}

#[tokio::test]
async fn issue_mode_renews_even_when_not_due() {
    let h = Harness::with_mode(UnchangedKeyMode::Issue);
    h.seed_rotation(&record("fresh", Duration::days(10)), "tok-i").await;

    let report = h
        .dispatcher
        .handle(&Harness::event("tok-i", "createSecret"), now())
        .await
        .unwrap();

    assert_eq!(report.outcome, Outcome::Renewed);
    assert_eq!(h.issuer.calls(), 1);
}

#[tokio::test]
async fn scenario_d_malformed_pending_fails_test_and_never_promotes() {
    // GIVEN: A rotation whose pending version holds a malformed payload
    let h = Harness::new();
    let old_version = h.seed_rotation(&record("old", Duration::days(1)), "tok-d").await;
    h.store
        .put_secret_value(PutSecretValue {
            secret_id: SECRET_ID,
            secret_string: "{\"keyId\": 42}",
            client_request_token: Some("tok-d"),
            stages: &[VersionStage::Pending],
            kms_key_id: None,
        })
        .await
        .unwrap();

    // WHEN: testSecret runs
    let err = h
        .dispatcher
        .handle(&Harness::event("tok-d", "testSecret"), now())
        .await
        .unwrap_err();

    // THEN: Validation fails loudly and the current version is untouched
    assert!(matches!(err, RenewalError::ValidationFailed { .. }), "{err}");
    assert!(!err.is_retryable());
    assert_eq!(
        h.holder(VersionStage::Current).await.as_deref(),
        Some(old_version.as_str())
    );
    assert!(
        h.store
            .writes()
            .iter()
            .all(|w| w.operation != "update_version_stage"),
        "no stage move may happen after a failed test"
    );
    assert_eq!(h.sink.named("signing_key_renewal_failed").len(), 1);
}

#[tokio::test]
async fn expired_pending_fails_test() {
    let h = Harness::new();
    h.seed_rotation(&record("old", Duration::days(1)), "tok-e").await;
    h.adapter
        .put_pending_version(SECRET_ID, "tok-e", &record("stale", Duration::minutes(-5)))
        .await
        .unwrap();

    let err = h
        .dispatcher
        .handle(&Harness::event("tok-e", "testSecret"), now())
        .await
        .unwrap_err();

    assert!(matches!(err, RenewalError::ValidationFailed { .. }));
}

#[tokio::test]
async fn create_secret_twice_writes_one_pending_version() {
    // GIVEN: A due key and a started rotation
    let h = Harness::new();
    h.seed_rotation(&record("old", Duration::hours(6)), "tok-x").await;

    // WHEN: createSecret is delivered twice
    let first = h
        .dispatcher
        .handle(&Harness::event("tok-x", "createSecret"), now())
        .await
        .unwrap();
    let second = h
        .dispatcher
        .handle(&Harness::event("tok-x", "createSecret"), now())
        .await
        .unwrap();

    // THEN: Exactly one pending version exists and one key was issued
    assert_eq!(h.issuer.calls(), 1);
    assert_eq!(h.store.version_count(SECRET_ID), 2);
    assert_eq!(first.key_id, second.key_id);
    assert_eq!(second.outcome, Outcome::Skipped);
}

#[tokio::test]
async fn finish_secret_on_current_version_is_noop() {
    // GIVEN: A completed rotation
    let h = Harness::new();
    h.seed_rotation(&record("old", Duration::days(1)), "tok-f").await;
    for step in ["createSecret", "setSecret", "testSecret", "finishSecret"] {
        h.dispatcher
            .handle(&Harness::event("tok-f", step), now())
            .await
            .unwrap();
    }
    let writes_before = h.store.writes().len();

    // WHEN: finishSecret is redelivered
    let report = h
        .dispatcher
        .handle(&Harness::event("tok-f", "finishSecret"), now())
        .await
        .unwrap();

    // THEN: It succeeds without touching the store
    assert_eq!(report.outcome, Outcome::Skipped);
    assert_eq!(h.store.writes().len(), writes_before);
    assert_eq!(h.holder(VersionStage::Current).await.as_deref(), Some("tok-f"));
}

#[tokio::test]
async fn store_outage_during_create_is_retryable() {
    let h = Harness::new();
    h.seed_rotation(&record("old", Duration::days(1)), "tok-o").await;
    h.store.set_unavailable(true);

    let err = h
        .dispatcher
        .handle(&Harness::event("tok-o", "createSecret"), now())
        .await
        .unwrap_err();
    assert!(err.is_retryable());

    // Redelivery after recovery completes the stage
    h.store.set_unavailable(false);
    let report = h
        .dispatcher
        .handle(&Harness::event("tok-o", "createSecret"), now())
        .await
        .unwrap();
    assert_eq!(report.outcome, Outcome::Renewed);
    assert_eq!(h.issuer.calls(), 1);
}

#[tokio::test]
async fn legacy_envelope_is_read_as_current() {
    let h = Harness::new();
    let inner = json!({
        "keyId": "legacy",
        "endpoint": "cell-1.example.com",
        "key": "legacy-material",
        "expiresAt": (now() + Duration::days(10)).timestamp(),
    })
    .to_string();
    h.store
        .create_secret(signing_key_renewal::store::CreateSecret {
            name: SECRET_ID,
            description: "legacy",
            secret_string: &json!({ "signingKey": inner }).to_string(),
            kms_key_id: None,
            client_request_token: None,
        })
        .await
        .unwrap();

    let report = h.dispatcher.handle(&json!(null), now()).await.unwrap();

    assert_eq!(report.outcome, Outcome::Skipped);
    assert_eq!(report.key_id.as_deref(), Some("legacy"));
}
