//! HTTP issuer against a mock key-issuance service
#![cfg(feature = "issuer-http")]

use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use serde_json::json;
use signing_key_renewal::prelude::*;
use url::Url;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn issuer(server: &MockServer, timeout: Duration) -> HttpSigningKeyIssuer {
    HttpSigningKeyIssuer::new(HttpIssuerConfig {
        endpoint: Url::parse(&format!("{}/v1", server.uri())).unwrap(),
        auth_token: SecretString::new("test-auth-token"),
        timeout,
    })
    .unwrap()
}

#[tokio::test]
async fn issues_key_with_bearer_token_and_ttl() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/signing-keys"))
        .and(header("authorization", "Bearer test-auth-token"))
        .and(body_json(json!({"ttlMinutes": 20160})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "keyId": "key-123",
            "endpoint": "cell-1.example.com",
            "key": "signing-material",
            "expiresAt": "2030-01-15T00:00:00Z",
        })))
        .expect(1)
        .mount(&server)
        .await;

    let issued = issuer(&server, Duration::from_secs(5))
        .issue(20_160)
        .await
        .unwrap();

    assert_eq!(issued.key_id, "key-123");
    assert_eq!(issued.endpoint.as_deref(), Some("cell-1.example.com"));
    assert_eq!(
        issued.expires_at,
        Utc.with_ymd_and_hms(2030, 1, 15, 0, 0, 0).unwrap()
    );
    issued.key.expose_secret(|k| assert_eq!(k, "signing-material"));
}

#[tokio::test]
async fn accepts_epoch_seconds_expiry() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "keyId": "key-epoch",
            "key": "m",
            "expiresAt": 1_893_456_000,
        })))
        .mount(&server)
        .await;

    let issued = issuer(&server, Duration::from_secs(5)).issue(60).await.unwrap();
    assert_eq!(issued.expires_at.timestamp(), 1_893_456_000);
    assert_eq!(issued.endpoint, None);
}

#[tokio::test]
async fn error_status_is_issuance_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
        .mount(&server)
        .await;

    let err = issuer(&server, Duration::from_secs(5))
        .issue(60)
        .await
        .unwrap_err();

    assert!(matches!(err, RenewalError::IssuanceFailed { .. }));
    assert!(err.is_retryable());
}

#[tokio::test]
async fn undecodable_body_is_issuance_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"token": "wrong shape"})))
        .mount(&server)
        .await;

    let err = issuer(&server, Duration::from_secs(5))
        .issue(60)
        .await
        .unwrap_err();
    assert!(matches!(err, RenewalError::IssuanceFailed { .. }));
}

#[tokio::test]
async fn slow_service_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_delay(Duration::from_secs(2))
                .set_body_json(json!({"keyId": "late", "key": "m", "expiresAt": 1_893_456_000})),
        )
        .mount(&server)
        .await;

    let err = issuer(&server, Duration::from_millis(200))
        .issue(60)
        .await
        .unwrap_err();
    assert!(matches!(err, RenewalError::IssuanceFailed { .. }));
}

#[tokio::test]
async fn already_expired_key_is_rejected_by_client() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "keyId": "expired",
            "key": "m",
            "expiresAt": "2020-01-01T00:00:00Z",
        })))
        .mount(&server)
        .await;

    let client = CredentialClient::new(Arc::new(issuer(&server, Duration::from_secs(5))));
    let err = client
        .issue_signing_key(60, Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap())
        .await
        .unwrap_err();

    assert!(matches!(err, RenewalError::IssuanceFailed { .. }));
}
