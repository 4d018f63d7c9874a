//! Shared test rig: on-the-fly RSA keys, token signing and a fixed clock.

#![allow(dead_code)]

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use chrono::{DateTime, TimeZone, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use parking_lot::Mutex;
use rsa::pkcs1::EncodeRsaPrivateKey;
use rsa::pkcs8::LineEnding;
use rsa::traits::PublicKeyParts;
use rsa::RsaPrivateKey;
use serde_json::json;
use tokenward::runtime::Clock;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// An RSA signing key with its public JWK form.
pub struct TestKey {
    pub kid: String,
    encoding_key: EncodingKey,
    n_b64: String,
    e_b64: String,
}

impl TestKey {
    /// Generate a fresh 2048-bit RSA key under the given `kid`.
    pub fn generate(kid: &str) -> Self {
        let private_key = RsaPrivateKey::new(&mut rsa::rand_core::OsRng, 2048)
            .expect("failed to generate RSA test key");
        let pem = private_key
            .to_pkcs1_pem(LineEnding::LF)
            .expect("failed to encode RSA test key");
        let encoding_key =
            EncodingKey::from_rsa_pem(pem.as_bytes()).expect("failed to build encoding key");
        Self {
            kid: kid.to_owned(),
            encoding_key,
            n_b64: URL_SAFE_NO_PAD.encode(private_key.n().to_bytes_be()),
            e_b64: URL_SAFE_NO_PAD.encode(private_key.e().to_bytes_be()),
        }
    }

    /// The public JWK for this key.
    pub fn jwk(&self) -> serde_json::Value {
        json!({
            "kty": "RSA",
            "use": "sig",
            "alg": "RS256",
            "kid": self.kid,
            "n": self.n_b64,
            "e": self.e_b64,
        })
    }

    /// A JWKS document containing only this key.
    pub fn jwks(&self) -> serde_json::Value {
        json!({ "keys": [self.jwk()] })
    }

    /// Sign `claims` as an RS256 JWT carrying this key's `kid`.
    pub fn sign(&self, claims: &serde_json::Value) -> String {
        let mut header = Header::new(Algorithm::RS256);
        header.kid = Some(self.kid.clone());
        jsonwebtoken::encode(&header, claims, &self.encoding_key).expect("failed to sign token")
    }

    /// Sign `claims` without a `kid` header.
    pub fn sign_without_kid(&self, claims: &serde_json::Value) -> String {
        let header = Header::new(Algorithm::RS256);
        jsonwebtoken::encode(&header, claims, &self.encoding_key).expect("failed to sign token")
    }

    /// Sign with this key but another key's `kid`, for mismatch scenarios.
    pub fn sign_with_kid(&self, kid: &str, claims: &serde_json::Value) -> String {
        let mut header = Header::new(Algorithm::RS256);
        header.kid = Some(kid.to_owned());
        jsonwebtoken::encode(&header, claims, &self.encoding_key).expect("failed to sign token")
    }
}

/// A JWKS document over several keys.
pub fn jwks_of(keys: &[&TestKey]) -> serde_json::Value {
    json!({ "keys": keys.iter().map(|k| k.jwk()).collect::<Vec<_>>() })
}

/// Seconds since the epoch, now.
pub fn epoch_now() -> i64 {
    Utc::now().timestamp()
}

/// Start a mock server answering `GET /jwks` with the given document.
pub async fn serve_jwks(body: serde_json::Value) -> (MockServer, String) {
    let server = MockServer::start().await;
    mount_jwks(&server, body).await;
    let url = format!("{}/jwks", server.uri());
    (server, url)
}

/// Mount (or re-mount after a reset) the `GET /jwks` response.
pub async fn mount_jwks(server: &MockServer, body: serde_json::Value) {
    Mock::given(method("GET"))
        .and(path("/jwks"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

/// A manually advanced clock.
#[derive(Debug)]
pub struct FixedClock(Mutex<DateTime<Utc>>);

impl FixedClock {
    pub fn at_epoch(seconds: i64) -> Self {
        Self(Mutex::new(
            Utc.timestamp_opt(seconds, 0).single().expect("valid epoch"),
        ))
    }

    pub fn set_epoch(&self, seconds: i64) {
        *self.0.lock() = Utc.timestamp_opt(seconds, 0).single().expect("valid epoch");
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.0.lock()
    }
}
