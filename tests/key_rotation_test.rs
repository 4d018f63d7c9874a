//! JWKS lifecycle: rotation grace, ETag revalidation, failure recovery.

mod common;

use common::{epoch_now, jwks_of, mount_jwks, TestKey};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokenward::jwks::{HttpJwksConfig, HttpJwksLoader, JwksLoader, LoaderStatus};
use tokenward::runtime::{ReqwestHttpClient, SystemClock, TokioScheduler};
use tokenward::{IssuerConfig, SecurityEventCounter, SecurityEventType, TokenValidator};
use url::Url;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const ISSUER: &str = "https://issuer.example";

fn http_loader(jwks_url: Option<&str>, well_known: Option<&str>, refresh: Duration) -> Arc<HttpJwksLoader> {
    HttpJwksLoader::new(
        HttpJwksConfig {
            jwks_url: jwks_url.map(|u| Url::parse(u).unwrap()),
            well_known_url: well_known.map(|u| Url::parse(u).unwrap()),
            refresh_interval: refresh,
            ..HttpJwksConfig::default()
        },
        Arc::new(ReqwestHttpClient::new(Duration::from_secs(2), Duration::from_secs(2)).unwrap()),
        Arc::new(SystemClock),
        Arc::new(TokioScheduler),
        None,
    )
}

#[tokio::test]
async fn rotated_out_key_stays_valid_within_grace_period() {
    let old_key = TestKey::generate("k1");
    let new_key = TestKey::generate("k2");

    let server = MockServer::start().await;
    mount_jwks(&server, old_key.jwks()).await;

    let validator = TokenValidator::builder()
        .issuer(
            IssuerConfig::builder(ISSUER)
                .jwks_url(format!("{}/jwks", server.uri()))
                .audience("app")
                .refresh_interval(Duration::from_millis(200)),
        )
        .build()
        .unwrap();

    let claims = json!({
        "iss": ISSUER, "aud": "app", "sub": "u1",
        "exp": epoch_now() + 3600, "iat": epoch_now(), "jti": "j1",
    });
    let old_token = old_key.sign(&claims);
    assert!(validator.validate(&old_token).await.is_ok());

    // Rotate: the endpoint now serves only the new key.
    server.reset().await;
    mount_jwks(&server, new_key.jwks()).await;
    tokio::time::sleep(Duration::from_millis(700)).await;

    let counter = validator.security_event_counter();
    assert!(
        counter.count(SecurityEventType::KeyRotationDetected) >= 1,
        "rotation was not detected"
    );

    // New tokens verify against the new key.
    let new_token = new_key.sign(&claims);
    assert!(validator.validate(&new_token).await.is_ok());

    // Tokens signed by the retired key stay valid within the grace period.
    let mut old_claims = claims.clone();
    old_claims["jti"] = json!("j2");
    let late_old_token = old_key.sign(&old_claims);
    assert!(
        validator.validate(&late_old_token).await.is_ok(),
        "retired key was not honored within the grace period"
    );
}

#[tokio::test]
async fn etag_revalidation_keeps_keys_on_304() {
    let key = TestKey::generate("k1");
    let server = MockServer::start().await;

    // Revalidations (carrying the stored ETag) answer 304; the initial
    // fetch falls through to the full response.
    Mock::given(method("GET"))
        .and(path("/jwks"))
        .and(header("if-none-match", "\"jwks-v1\""))
        .respond_with(ResponseTemplate::new(304))
        .expect(1..)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/jwks"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("etag", "\"jwks-v1\"")
                .set_body_json(key.jwks()),
        )
        .expect(1)
        .mount(&server)
        .await;

    let jwks_url = format!("{}/jwks", server.uri());
    let loader = http_loader(Some(&jwks_url), None, Duration::from_millis(150));
    let counter = Arc::new(SecurityEventCounter::new());
    assert_eq!(loader.init(Arc::clone(&counter)).await, LoaderStatus::Ok);
    let loaded_at = loader.last_successful_load().unwrap();

    tokio::time::sleep(Duration::from_millis(500)).await;

    // Keys survived the 304 refreshes; revalidation counted as success.
    assert_eq!(loader.status(), LoaderStatus::Ok);
    assert!(loader.get_key_info(Some("k1")).is_some());
    assert!(loader.last_successful_load().unwrap() > loaded_at);
    assert_eq!(counter.count(SecurityEventType::JwksFetchFailed), 0);
    assert_eq!(counter.count(SecurityEventType::KeyRotationDetected), 0);

    loader.close();
    server.verify().await;
}

#[tokio::test]
async fn fetch_failure_preserves_cached_keys() {
    let key = TestKey::generate("k1");
    let server = MockServer::start().await;
    mount_jwks(&server, key.jwks()).await;

    let jwks_url = format!("{}/jwks", server.uri());
    let loader = http_loader(Some(&jwks_url), None, Duration::from_millis(150));
    let counter = Arc::new(SecurityEventCounter::new());
    assert_eq!(loader.init(Arc::clone(&counter)).await, LoaderStatus::Ok);

    // The endpoint degrades to 503; refreshes fail but keys remain.
    server.reset().await;
    Mock::given(method("GET"))
        .and(path("/jwks"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;
    tokio::time::sleep(Duration::from_millis(500)).await;

    assert_eq!(loader.status(), LoaderStatus::Ok);
    assert!(loader.get_key_info(Some("k1")).is_some());
    assert!(counter.count(SecurityEventType::JwksFetchFailed) >= 1);
    loader.close();
}

#[tokio::test]
async fn parse_failure_preserves_cached_keys() {
    let key = TestKey::generate("k1");
    let server = MockServer::start().await;
    mount_jwks(&server, key.jwks()).await;

    let jwks_url = format!("{}/jwks", server.uri());
    let loader = http_loader(Some(&jwks_url), None, Duration::from_millis(150));
    let counter = Arc::new(SecurityEventCounter::new());
    assert_eq!(loader.init(Arc::clone(&counter)).await, LoaderStatus::Ok);

    server.reset().await;
    Mock::given(method("GET"))
        .and(path("/jwks"))
        .respond_with(ResponseTemplate::new(200).set_body_string("{not json"))
        .mount(&server)
        .await;
    tokio::time::sleep(Duration::from_millis(500)).await;

    assert_eq!(loader.status(), LoaderStatus::Ok);
    assert!(loader.get_key_info(Some("k1")).is_some());
    assert!(counter.count(SecurityEventType::JwksJsonParseFailed) >= 1);
    loader.close();
}

#[tokio::test]
async fn error_status_recovers_once_endpoint_returns() {
    let key = TestKey::generate("k1");
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/jwks"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let jwks_url = format!("{}/jwks", server.uri());
    // Long refresh interval: recovery must come from the backoff retry.
    let loader = http_loader(Some(&jwks_url), None, Duration::from_secs(600));
    let counter = Arc::new(SecurityEventCounter::new());
    assert_eq!(loader.init(Arc::clone(&counter)).await, LoaderStatus::Error);
    assert!(loader.get_key_info(Some("k1")).is_none());
    assert!(counter.count(SecurityEventType::JwksFetchFailed) >= 1);

    server.reset().await;
    mount_jwks(&server, key.jwks()).await;
    tokio::time::sleep(Duration::from_millis(2500)).await;

    assert_eq!(loader.status(), LoaderStatus::Ok);
    assert!(loader.get_key_info(Some("k1")).is_some());
    loader.close();
}

#[tokio::test]
async fn jwks_uri_is_discovered_from_well_known_document() {
    let key = TestKey::generate("k1");
    let server = MockServer::start().await;
    let jwks_uri = format!("{}/keys", server.uri());
    Mock::given(method("GET"))
        .and(path("/.well-known/openid-configuration"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"issuer": ISSUER, "jwks_uri": jwks_uri})),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/keys"))
        .respond_with(ResponseTemplate::new(200).set_body_json(key.jwks()))
        .mount(&server)
        .await;

    let well_known = format!("{}/.well-known/openid-configuration", server.uri());
    let loader = http_loader(None, Some(&well_known), Duration::from_secs(600));
    let counter = Arc::new(SecurityEventCounter::new());
    assert_eq!(loader.init(counter).await, LoaderStatus::Ok);
    assert!(loader.get_key_info(Some("k1")).is_some());
    loader.close();
}

#[tokio::test]
async fn failed_well_known_resolution_is_retried() {
    let key = TestKey::generate("k1");
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/.well-known/openid-configuration"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let well_known = format!("{}/.well-known/openid-configuration", server.uri());
    let loader = http_loader(None, Some(&well_known), Duration::from_secs(600));
    let counter = Arc::new(SecurityEventCounter::new());
    assert_eq!(loader.init(Arc::clone(&counter)).await, LoaderStatus::Error);

    // The discovery document becomes available; the scheduled retry must
    // resolve it rather than leaving the loader poisoned.
    server.reset().await;
    let jwks_uri = format!("{}/keys", server.uri());
    Mock::given(method("GET"))
        .and(path("/.well-known/openid-configuration"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"jwks_uri": jwks_uri})))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/keys"))
        .respond_with(ResponseTemplate::new(200).set_body_json(key.jwks()))
        .mount(&server)
        .await;
    tokio::time::sleep(Duration::from_millis(2500)).await;

    assert_eq!(loader.status(), LoaderStatus::Ok);
    assert!(loader.get_key_info(Some("k1")).is_some());
    loader.close();
}

#[tokio::test]
async fn retired_sets_are_bounded() {
    let keys: Vec<TestKey> = (0..6).map(|i| TestKey::generate(&format!("k{i}"))).collect();
    let server = MockServer::start().await;
    mount_jwks(&server, jwks_of(&[&keys[0]])).await;

    let jwks_url = format!("{}/jwks", server.uri());
    let loader = http_loader(Some(&jwks_url), None, Duration::from_millis(100));
    let counter = Arc::new(SecurityEventCounter::new());
    assert_eq!(loader.init(Arc::clone(&counter)).await, LoaderStatus::Ok);

    for key in &keys[1..] {
        server.reset().await;
        mount_jwks(&server, jwks_of(&[key])).await;
        tokio::time::sleep(Duration::from_millis(250)).await;
    }

    assert!(counter.count(SecurityEventType::KeyRotationDetected) >= 4);
    // The newest key is current; the very first one fell off the bounded
    // retired list (default bound 3) long ago.
    assert!(loader.get_key_info(Some("k5")).is_some());
    assert!(loader.get_key_info(Some("k0")).is_none());
    loader.close();
}
