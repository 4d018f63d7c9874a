//! Boundary behaviors: size limits, temporal edges, empty JWKS.

mod common;

use common::{serve_jwks, FixedClock, TestKey};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokenward::{IssuerConfig, ParserConfig, SecurityEventType, TokenValidator};

const ISSUER: &str = "https://issuer.example";
const NOW: i64 = 1_700_000_000;
const SKEW: u64 = 60;

fn validator_at(jwks_url: &str, parser: ParserConfig) -> TokenValidator {
    TokenValidator::builder()
        .issuer(
            IssuerConfig::builder(ISSUER)
                .jwks_url(jwks_url)
                .audience("app"),
        )
        .parser(parser)
        .clock(Arc::new(FixedClock::at_epoch(NOW)))
        .clock_skew(Duration::from_secs(SKEW))
        .build()
        .unwrap()
}

fn claims_with(exp: i64, nbf: Option<i64>) -> serde_json::Value {
    let mut claims = json!({
        "iss": ISSUER,
        "aud": "app",
        "sub": "u1",
        "exp": exp,
        "iat": NOW - 10,
        "jti": "j1",
    });
    if let Some(nbf) = nbf {
        claims["nbf"] = json!(nbf);
    }
    claims
}

#[tokio::test]
async fn token_at_exact_size_limit_validates() {
    let key = TestKey::generate("k1");
    let (_server, jwks_url) = serve_jwks(key.jwks()).await;

    let token = key.sign(&claims_with(NOW + 3600, None));

    let at_limit = validator_at(
        &jwks_url,
        ParserConfig::default().with_max_token_size(token.len()),
    );
    assert!(at_limit.validate(&token).await.is_ok());

    let one_under = validator_at(
        &jwks_url,
        ParserConfig::default().with_max_token_size(token.len() - 1),
    );
    let err = one_under.validate(&token).await.unwrap_err();
    assert_eq!(err.event_type(), SecurityEventType::TokenSizeExceeded);
}

#[tokio::test]
async fn exp_is_exclusive_at_the_skew_boundary() {
    let key = TestKey::generate("k1");
    let (_server, jwks_url) = serve_jwks(key.jwks()).await;
    let validator = validator_at(&jwks_url, ParserConfig::default());

    // now >= exp + skew fails; one second inside the window passes.
    let err = validator
        .validate(&key.sign(&claims_with(NOW - SKEW as i64, None)))
        .await
        .unwrap_err();
    assert_eq!(err.event_type(), SecurityEventType::TokenExpired);

    assert!(validator
        .validate(&key.sign(&claims_with(NOW - SKEW as i64 + 1, None)))
        .await
        .is_ok());
}

#[tokio::test]
async fn nbf_tolerates_exactly_the_configured_skew() {
    let key = TestKey::generate("k1");
    let (_server, jwks_url) = serve_jwks(key.jwks()).await;
    let validator = validator_at(&jwks_url, ParserConfig::default());

    assert!(validator
        .validate(&key.sign(&claims_with(NOW + 3600, Some(NOW + SKEW as i64))))
        .await
        .is_ok());

    let err = validator
        .validate(&key.sign(&claims_with(NOW + 3600, Some(NOW + SKEW as i64 + 1))))
        .await
        .unwrap_err();
    assert_eq!(err.event_type(), SecurityEventType::TokenNbfFuture);
}

#[tokio::test]
async fn empty_jwks_surfaces_as_key_not_found_on_first_use() {
    let key = TestKey::generate("k1");
    let (_server, jwks_url) = serve_jwks(json!({"keys": []})).await;
    let validator = validator_at(&jwks_url, ParserConfig::default());

    // Construction and issuer resolution succeed; only signature
    // verification notices the empty key set.
    let err = validator
        .validate(&key.sign(&claims_with(NOW + 3600, None)))
        .await
        .unwrap_err();
    assert_eq!(err.event_type(), SecurityEventType::KeyNotFound);
    assert_eq!(
        validator
            .security_event_counter()
            .count(SecurityEventType::KeyNotFound),
        1
    );
}

#[tokio::test]
async fn oversized_decoded_payload_is_rejected() {
    let key = TestKey::generate("k1");
    let (_server, jwks_url) = serve_jwks(key.jwks()).await;
    let validator = validator_at(
        &jwks_url,
        ParserConfig::default().with_max_decoded_part_size(64),
    );

    let err = validator
        .validate(&key.sign(&claims_with(NOW + 3600, None)))
        .await
        .unwrap_err();
    assert_eq!(err.event_type(), SecurityEventType::DecodedPartSizeExceeded);
}

#[tokio::test]
async fn missing_recommended_claim_warns_but_succeeds() {
    let key = TestKey::generate("k1");
    let (_server, jwks_url) = serve_jwks(key.jwks()).await;
    let validator = validator_at(&jwks_url, ParserConfig::default());

    let mut claims = claims_with(NOW + 3600, None);
    claims.as_object_mut().unwrap().remove("jti");
    assert!(validator.validate(&key.sign(&claims)).await.is_ok());
    assert_eq!(
        validator
            .security_event_counter()
            .count(SecurityEventType::MissingRecommendedElement),
        1
    );
}
