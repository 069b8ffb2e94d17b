//! Dispatcher reporting: outcome counters, exported metrics and time budget

mod common;

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::Duration;
use common::{Harness, SECRET_ID, now, record};
use pretty_assertions::assert_eq;
use serde_json::json;
use signing_key_renewal::metrics::EXPIRY_GAUGE;
use signing_key_renewal::prelude::*;

/// Issuer that never answers inside the test's budget
struct StalledIssuer;

#[async_trait]
impl SigningKeyIssuer for StalledIssuer {
    async fn issue(&self, _ttl_minutes: u32) -> RenewalResult<IssuedSigningKey> {
        tokio::time::sleep(StdDuration::from_secs(30)).await;
        Err(RenewalError::IssuanceFailed {
            reason: "unreachable".into(),
        })
    }

    fn name(&self) -> &'static str {
        "stalled"
    }
}

fn dispatcher_over(
    store: Arc<InMemorySecretStore>,
    issuer: Arc<dyn SigningKeyIssuer>,
    reporter: OutcomeReporter,
) -> Dispatcher {
    let adapter = SecretStoreAdapter::new(store, None);
    let client = CredentialClient::new(issuer);
    let policy = RenewalPolicy::from_days(20_160, 3).unwrap();
    Dispatcher::new(
        RenewalWorkflow::new(adapter.clone(), client.clone(), policy),
        RotationWorkflow::new(adapter, client, policy),
        reporter,
        SECRET_ID,
    )
}

#[tokio::test]
async fn tick_emits_outcome_duration_and_expiry_gauge() {
    // GIVEN: Metric export enabled and a key with ten days left
    let h = Harness::new();
    h.adapter
        .put_current(SECRET_ID, &record("fresh", Duration::days(10)))
        .await
        .unwrap();

    // WHEN: A tick runs
    h.dispatcher.handle(&json!({}), now()).await.unwrap();

    // THEN: The skipped counter, the duration and the gauge were exported
    assert_eq!(h.sink.named("signing_key_renewal_skipped").len(), 1);
    assert_eq!(h.sink.named("signing_key_renewal_duration_ms").len(), 1);

    let gauge = h.sink.named(EXPIRY_GAUGE);
    assert_eq!(gauge.len(), 1);
    assert_eq!(gauge[0].value, Duration::days(10).num_seconds() as f64);
}

#[tokio::test]
async fn create_secret_with_new_key_emits_expiry_gauge() {
    // GIVEN: A rotation started for a key inside the renewal window
    let h = Harness::new();
    h.seed_rotation(&record("old", Duration::days(1)), "tok-g").await;

    // WHEN: createSecret issues the replacement
    h.dispatcher
        .handle(&Harness::event("tok-g", "createSecret"), now())
        .await
        .unwrap();

    // THEN: The gauge reports the new key's full lifetime
    assert_eq!(h.sink.named("signing_key_renewal_renewed").len(), 1);
    let gauge = h.sink.named(EXPIRY_GAUGE);
    assert_eq!(gauge.len(), 1);
    assert_eq!(gauge[0].value, Duration::minutes(20_160).num_seconds() as f64);
}

#[tokio::test]
async fn mirrored_rotation_stage_emits_no_expiry_gauge() {
    let h = Harness::new();
    h.seed_rotation(&record("fresh", Duration::days(10)), "tok-m").await;

    h.dispatcher
        .handle(&Harness::event("tok-m", "createSecret"), now())
        .await
        .unwrap();

    assert_eq!(h.sink.named("signing_key_renewal_skipped").len(), 1);
    assert!(h.sink.named(EXPIRY_GAUGE).is_empty());
}

#[tokio::test]
async fn export_disabled_sends_nothing_to_sinks() {
    // GIVEN: A reporter with a sink but export turned off
    let store = Arc::new(InMemorySecretStore::new());
    let sink = Arc::new(MemorySink::new());
    let dispatcher = dispatcher_over(
        store,
        Arc::new(MockIssuer::new().with_issue_time(now())),
        OutcomeReporter::new(vec![sink.clone()], false),
    );

    // WHEN: A tick renews the key
    let report = dispatcher.handle(&json!({}), now()).await.unwrap();

    // THEN: Counters move but no metric reaches the sink
    assert_eq!(report.outcome, Outcome::Renewed);
    assert_eq!(dispatcher.reporter().counters().renewed(), 1);
    assert!(sink.metrics().is_empty());
}

#[tokio::test]
async fn failing_sink_never_fails_the_invocation() {
    // GIVEN: The only sink rejects every datapoint
    let h = Harness::new();
    h.sink.fail_with("throttled");

    // WHEN: A tick runs
    let report = h.dispatcher.handle(&json!({}), now()).await.unwrap();

    // THEN: The key is renewed and the sink errors are only counted
    assert_eq!(report.outcome, Outcome::Renewed);
    assert_eq!(h.store.version_count(SECRET_ID), 1);
    let counters = h.dispatcher.reporter().counters();
    assert_eq!(counters.renewed(), 1);
    assert!(counters.sink_errors() >= 3);
}

#[tokio::test]
async fn malformed_event_is_counted_as_failed() {
    let h = Harness::new();

    let err = h
        .dispatcher
        .handle(&json!({"SecretId": SECRET_ID, "Step": "createSecret"}), now())
        .await
        .unwrap_err();

    assert!(matches!(err, RenewalError::MalformedEvent { .. }));
    assert_eq!(h.dispatcher.reporter().counters().failed(), 1);
    assert_eq!(h.sink.named("signing_key_renewal_failed").len(), 1);
    assert_eq!(h.issuer.calls(), 0);
}

#[tokio::test]
async fn unknown_step_is_malformed() {
    let h = Harness::new();

    let err = h
        .dispatcher
        .handle(&Harness::event("tok-u", "rollbackSecret"), now())
        .await
        .unwrap_err();

    assert!(matches!(err, RenewalError::MalformedEvent { .. }));
}

#[tokio::test]
async fn invocation_over_budget_times_out_and_writes_nothing() {
    // GIVEN: An issuer that stalls past the invocation budget
    let store = Arc::new(InMemorySecretStore::new());
    let dispatcher = dispatcher_over(
        store.clone(),
        Arc::new(StalledIssuer),
        OutcomeReporter::disabled(),
    )
    .with_timeout(StdDuration::from_millis(50));

    // WHEN: A tick needs a new key
    let err = dispatcher.handle(&json!(null), now()).await.unwrap_err();

    // THEN: The invocation is abandoned as a retryable timeout
    assert!(matches!(err, RenewalError::Timeout { .. }), "{err}");
    assert!(err.is_retryable());
    assert_eq!(dispatcher.reporter().counters().failed(), 1);
    assert_eq!(store.version_count(SECRET_ID), 0);
}

#[tokio::test]
async fn report_serializes_for_the_caller() {
    let h = Harness::new();
    h.seed_rotation(&record("old", Duration::days(1)), "tok-r").await;

    let report = h
        .dispatcher
        .handle(&Harness::event("tok-r", "createSecret"), now())
        .await
        .unwrap();
    let rendered = serde_json::to_value(&report).unwrap();

    assert_eq!(rendered["kind"], "rotation");
    assert_eq!(rendered["stage"], "createSecret");
    assert_eq!(rendered["request_token"], "tok-r");
    assert_eq!(rendered["outcome"], "RENEWED");
    assert_eq!(rendered["result"]["result"], "pending_created");
    assert_eq!(rendered["key_id"], "mock-key-1");
}
