//! In-memory parsed JWKS with kid-indexed lookup.

use super::{algorithm_name, AlgorithmWhitelist, KeyInfo};
use chrono::{DateTime, Utc};
use jsonwebtoken::jwk::{AlgorithmParameters, EllipticCurve, Jwk, JwkSet, KeyAlgorithm, PublicKeyUse};
use jsonwebtoken::DecodingKey;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use thiserror::Error;
use tracing::warn;

/// A JWKS document that could not be turned into a key set.
#[derive(Debug, Clone, Error)]
#[error("invalid JWKS document: {0}")]
pub struct KeySetError(String);

/// An immutable, kid-indexed set of verification keys.
///
/// Built once from a parsed JWKS document; lookup is a plain map read. Keys
/// whose type, use or algorithm the issuer does not accept are skipped with a
/// warning rather than failing the whole set — a JWKS endpoint may well
/// publish encryption keys next to signature keys.
#[derive(Debug, Clone)]
pub struct JwksKeySet {
    keys: HashMap<String, KeyInfo>,
    fallback: Option<KeyInfo>,
    thumbprints: BTreeMap<String, [u8; 32]>,
    issued_at: DateTime<Utc>,
}

impl JwksKeySet {
    /// Parse a JWKS document, keeping only keys the whitelist accepts.
    pub fn parse(
        body: &[u8],
        whitelist: &AlgorithmWhitelist,
        issued_at: DateTime<Utc>,
    ) -> Result<Self, KeySetError> {
        let jwks: JwkSet =
            serde_json::from_slice(body).map_err(|e| KeySetError(e.to_string()))?;

        let mut keys = HashMap::new();
        let mut thumbprints = BTreeMap::new();
        let mut accepted = Vec::new();

        for (index, jwk) in jwks.keys.iter().enumerate() {
            let Some(info) = Self::materialize(jwk, whitelist) else {
                continue;
            };
            let label = info
                .key_id
                .clone()
                .unwrap_or_else(|| format!("#{index}"));
            thumbprints.insert(label, thumbprint(jwk));
            if let Some(kid) = &info.key_id {
                keys.insert(kid.clone(), info.clone());
            }
            accepted.push(info);
        }

        let fallback = match accepted.as_slice() {
            [only] => Some(only.clone()),
            _ => None,
        };

        Ok(Self {
            keys,
            fallback,
            thumbprints,
            issued_at,
        })
    }

    fn materialize(jwk: &Jwk, whitelist: &AlgorithmWhitelist) -> Option<KeyInfo> {
        if let Some(key_use) = &jwk.common.public_key_use {
            if *key_use != PublicKeyUse::Signature {
                warn!(kid = ?jwk.common.key_id, "skipping JWK not intended for signatures");
                return None;
            }
        }

        let algorithm = match &jwk.common.key_algorithm {
            Some(alg) => match alg {
                KeyAlgorithm::HS256 => jsonwebtoken::Algorithm::HS256,
                KeyAlgorithm::HS384 => jsonwebtoken::Algorithm::HS384,
                KeyAlgorithm::HS512 => jsonwebtoken::Algorithm::HS512,
                KeyAlgorithm::RS256 => jsonwebtoken::Algorithm::RS256,
                KeyAlgorithm::RS384 => jsonwebtoken::Algorithm::RS384,
                KeyAlgorithm::RS512 => jsonwebtoken::Algorithm::RS512,
                KeyAlgorithm::ES256 => jsonwebtoken::Algorithm::ES256,
                KeyAlgorithm::ES384 => jsonwebtoken::Algorithm::ES384,
                KeyAlgorithm::PS256 => jsonwebtoken::Algorithm::PS256,
                KeyAlgorithm::PS384 => jsonwebtoken::Algorithm::PS384,
                KeyAlgorithm::PS512 => jsonwebtoken::Algorithm::PS512,
                KeyAlgorithm::EdDSA => jsonwebtoken::Algorithm::EdDSA,
                _ => {
                    warn!(kid = ?jwk.common.key_id, "skipping JWK with non-signature algorithm");
                    return None;
                }
            },
            None => match &jwk.algorithm {
                AlgorithmParameters::RSA(_) => jsonwebtoken::Algorithm::RS256,
                AlgorithmParameters::EllipticCurve(params) => match params.curve {
                    EllipticCurve::P256 => jsonwebtoken::Algorithm::ES256,
                    EllipticCurve::P384 => jsonwebtoken::Algorithm::ES384,
                    _ => {
                        warn!(kid = ?jwk.common.key_id, "skipping JWK with unsupported curve");
                        return None;
                    }
                },
                _ => {
                    warn!(kid = ?jwk.common.key_id, "skipping JWK with unsupported key type");
                    return None;
                }
            },
        };

        if !matches!(
            jwk.algorithm,
            AlgorithmParameters::RSA(_) | AlgorithmParameters::EllipticCurve(_)
        ) {
            warn!(kid = ?jwk.common.key_id, "skipping non-RSA, non-EC JWK");
            return None;
        }

        if !whitelist.allows(algorithm) {
            warn!(
                kid = ?jwk.common.key_id,
                alg = algorithm_name(algorithm),
                "skipping JWK with non-whitelisted algorithm"
            );
            return None;
        }

        match DecodingKey::from_jwk(jwk) {
            Ok(key) => Some(KeyInfo {
                key_id: jwk.common.key_id.clone(),
                algorithm,
                decoding_key: Arc::new(key),
            }),
            Err(e) => {
                warn!(kid = ?jwk.common.key_id, error = %e, "failed to materialize JWK");
                None
            }
        }
    }

    /// Look up a key. With `None`, a single-key set yields its key.
    pub fn get(&self, kid: Option<&str>) -> Option<KeyInfo> {
        match kid {
            Some(kid) => self.keys.get(kid).cloned(),
            None => self.fallback.clone(),
        }
    }

    /// Number of usable keys.
    pub fn len(&self) -> usize {
        self.thumbprints.len()
    }

    /// Whether the set holds no usable keys.
    pub fn is_empty(&self) -> bool {
        self.thumbprints.is_empty()
    }

    /// When this set was loaded.
    pub fn issued_at(&self) -> DateTime<Utc> {
        self.issued_at
    }

    /// The key ids present in the set.
    pub fn key_ids(&self) -> Vec<&str> {
        self.keys.keys().map(String::as_str).collect()
    }

    /// Whether `other` holds the same key material.
    ///
    /// Compared by per-key content digests, so reordering the JWKS document
    /// does not register as a rotation but replacing a key under the same
    /// `kid` does.
    pub fn same_keys(&self, other: &Self) -> bool {
        self.thumbprints == other.thumbprints
    }
}

fn thumbprint(jwk: &Jwk) -> [u8; 32] {
    let serialized = serde_json::to_vec(jwk).unwrap_or_default();
    Sha256::digest(&serialized).into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use base64::Engine as _;
    use rsa::traits::PublicKeyParts;
    use rsa::RsaPrivateKey;
    use std::sync::OnceLock;

    fn test_rsa_jwk(kid: &str) -> serde_json::Value {
        static KEY: OnceLock<RsaPrivateKey> = OnceLock::new();
        let key = KEY.get_or_init(|| {
            RsaPrivateKey::new(&mut rsa::rand_core::OsRng, 2048).expect("generate test RSA key")
        });
        serde_json::json!({
            "kty": "RSA",
            "use": "sig",
            "alg": "RS256",
            "kid": kid,
            "n": URL_SAFE_NO_PAD.encode(key.n().to_bytes_be()),
            "e": URL_SAFE_NO_PAD.encode(key.e().to_bytes_be()),
        })
    }

    fn parse(body: serde_json::Value) -> JwksKeySet {
        JwksKeySet::parse(
            body.to_string().as_bytes(),
            &AlgorithmWhitelist::default(),
            Utc::now(),
        )
        .expect("parse test JWKS")
    }

    #[test]
    fn test_lookup_by_kid() {
        let set = parse(serde_json::json!({"keys": [test_rsa_jwk("k1")]}));
        assert_eq!(set.len(), 1);
        let key = set.get(Some("k1")).expect("k1 present");
        assert_eq!(key.key_id.as_deref(), Some("k1"));
        assert_eq!(key.algorithm, jsonwebtoken::Algorithm::RS256);
        assert!(set.get(Some("absent")).is_none());
    }

    #[test]
    fn test_single_key_is_default_for_missing_kid() {
        let set = parse(serde_json::json!({"keys": [test_rsa_jwk("only")]}));
        assert!(set.get(None).is_some());

        let two = parse(serde_json::json!({"keys": [test_rsa_jwk("a"), test_rsa_jwk("b")]}));
        assert!(two.get(None).is_none());
    }

    #[test]
    fn test_non_whitelisted_algorithm_skipped() {
        let mut jwk = test_rsa_jwk("ps");
        jwk["alg"] = serde_json::json!("PS256");
        let set = parse(serde_json::json!({"keys": [jwk]}));
        assert!(set.is_empty());
        assert!(set.get(Some("ps")).is_none());
    }

    #[test]
    fn test_encryption_key_skipped() {
        let mut jwk = test_rsa_jwk("enc");
        jwk["use"] = serde_json::json!("enc");
        let set = parse(serde_json::json!({"keys": [jwk]}));
        assert!(set.is_empty());
    }

    #[test]
    fn test_malformed_document_is_an_error() {
        let result = JwksKeySet::parse(
            b"{\"keys\": \"oops\"}",
            &AlgorithmWhitelist::default(),
            Utc::now(),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_empty_document_is_ok_and_empty() {
        let set = parse(serde_json::json!({"keys": []}));
        assert!(set.is_empty());
        assert!(set.get(Some("any")).is_none());
        assert!(set.get(None).is_none());
    }

    #[test]
    fn test_same_keys_ignores_order_but_not_material() {
        let a = test_rsa_jwk("k1");
        let b = test_rsa_jwk("k2");
        let set_ab = parse(serde_json::json!({"keys": [a.clone(), b.clone()]}));
        let set_ba = parse(serde_json::json!({"keys": [b, a.clone()]}));
        assert!(set_ab.same_keys(&set_ba));

        let mut replaced = a;
        replaced["alg"] = serde_json::json!("RS384");
        let set_replaced = parse(serde_json::json!({"keys": [replaced]}));
        assert!(!set_ab.same_keys(&set_replaced));
    }
}
