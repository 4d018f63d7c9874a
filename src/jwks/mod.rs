//! Key material: JWKS parsing, loading and rotation-aware lookup.
//!
//! A [`JwksLoader`] supplies verification keys to the pipeline. The shipped
//! implementations are:
//!
//! - [`HttpJwksLoader`] — fetches a remote JWKS endpoint (directly or via an
//!   OIDC well-known document), keeps it fresh in the background, survives
//!   transient failures and honors a grace period for rotated-out keys;
//! - [`FileJwksLoader`] — reads a JWKS document from disk once;
//! - [`InMemoryJwksLoader`] — wraps an already-parsed key set, mainly for
//!   tests and embedders that manage key material themselves.
//!
//! Key lookup is lock-free on every loader: the pipeline's hot path never
//! waits on a refresh.

pub mod file;
pub mod http;
pub mod key_set;
pub mod memory;

pub use file::FileJwksLoader;
pub use http::{HttpJwksConfig, HttpJwksLoader};
pub use key_set::{JwksKeySet, KeySetError};
pub use memory::InMemoryJwksLoader;

use crate::events::SecurityEventCounter;
use async_trait::async_trait;
use jsonwebtoken::{Algorithm, DecodingKey};
use std::collections::HashSet;
use std::sync::Arc;

/// Lifecycle state of a key loader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LoaderStatus {
    /// No load has been attempted yet.
    Undefined = 0,
    /// A load is in flight and no usable keys exist yet.
    Loading = 1,
    /// A key set is available.
    Ok = 2,
    /// Loading failed and no usable keys exist.
    Error = 3,
}

impl LoaderStatus {
    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Loading,
            2 => Self::Ok,
            3 => Self::Error,
            _ => Self::Undefined,
        }
    }
}

/// One verification key with the algorithm it is used under.
#[derive(Clone)]
pub struct KeyInfo {
    /// The `kid` this key was published under, if any.
    pub key_id: Option<String>,
    /// The signature algorithm the key verifies.
    pub algorithm: Algorithm,
    /// The verification key.
    pub decoding_key: Arc<DecodingKey>,
}

impl std::fmt::Debug for KeyInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyInfo")
            .field("key_id", &self.key_id)
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}

/// Supplies verification keys to the validation pipeline.
///
/// `init` is idempotent: the first caller triggers the initial load and every
/// concurrent or later caller observes that same outcome. `get_key_info` must
/// be non-blocking and must never panic; it is called on the validation hot
/// path.
#[async_trait]
pub trait JwksLoader: Send + Sync + std::fmt::Debug {
    /// Trigger (or await) the initial key load.
    async fn init(&self, counter: Arc<SecurityEventCounter>) -> LoaderStatus;

    /// Look up a key by `kid`. With `None`, a single-key JWKS yields its key.
    fn get_key_info(&self, kid: Option<&str>) -> Option<KeyInfo>;

    /// Current lifecycle state; a single atomic read.
    fn status(&self) -> LoaderStatus;

    /// Release background resources. Idempotent.
    fn close(&self);
}

/// The set of signature algorithms an issuer accepts.
///
/// Names are compared case-insensitively (uppercase-folded). The default
/// whitelist covers the asymmetric algorithms common in OIDC deployments;
/// symmetric algorithms are never accepted implicitly.
#[derive(Debug, Clone)]
pub struct AlgorithmWhitelist {
    allowed: HashSet<String>,
}

impl Default for AlgorithmWhitelist {
    fn default() -> Self {
        Self::of(&["RS256", "RS384", "RS512", "ES256", "ES384"])
    }
}

impl AlgorithmWhitelist {
    /// Build a whitelist from algorithm names without validating them.
    pub fn of(names: &[&str]) -> Self {
        Self {
            allowed: names.iter().map(|n| n.to_ascii_uppercase()).collect(),
        }
    }

    /// Build a whitelist, rejecting names no supported algorithm matches.
    pub fn from_names<I, S>(names: I) -> Result<Self, crate::error::ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut allowed = HashSet::new();
        for name in names {
            let folded = name.as_ref().trim().to_ascii_uppercase();
            if parse_algorithm(&folded).is_none() {
                return Err(crate::error::ConfigError::UnknownAlgorithm(folded));
            }
            allowed.insert(folded);
        }
        Ok(Self { allowed })
    }

    /// Whether the named algorithm is accepted.
    pub fn is_allowed(&self, name: &str) -> bool {
        self.allowed.contains(&name.to_ascii_uppercase())
    }

    /// Whether the given algorithm is accepted.
    pub fn allows(&self, algorithm: Algorithm) -> bool {
        self.is_allowed(algorithm_name(algorithm))
    }
}

/// Canonical name of a signature algorithm.
pub(crate) fn algorithm_name(algorithm: Algorithm) -> &'static str {
    match algorithm {
        Algorithm::HS256 => "HS256",
        Algorithm::HS384 => "HS384",
        Algorithm::HS512 => "HS512",
        Algorithm::RS256 => "RS256",
        Algorithm::RS384 => "RS384",
        Algorithm::RS512 => "RS512",
        Algorithm::ES256 => "ES256",
        Algorithm::ES384 => "ES384",
        Algorithm::PS256 => "PS256",
        Algorithm::PS384 => "PS384",
        Algorithm::PS512 => "PS512",
        Algorithm::EdDSA => "EdDSA",
    }
}

/// Parse an uppercase-folded algorithm name.
pub(crate) fn parse_algorithm(name: &str) -> Option<Algorithm> {
    match name {
        "HS256" => Some(Algorithm::HS256),
        "HS384" => Some(Algorithm::HS384),
        "HS512" => Some(Algorithm::HS512),
        "RS256" => Some(Algorithm::RS256),
        "RS384" => Some(Algorithm::RS384),
        "RS512" => Some(Algorithm::RS512),
        "ES256" => Some(Algorithm::ES256),
        "ES384" => Some(Algorithm::ES384),
        "PS256" => Some(Algorithm::PS256),
        "PS384" => Some(Algorithm::PS384),
        "PS512" => Some(Algorithm::PS512),
        "EDDSA" => Some(Algorithm::EdDSA),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_whitelist_is_asymmetric_only() {
        let whitelist = AlgorithmWhitelist::default();
        assert!(whitelist.is_allowed("RS256"));
        assert!(whitelist.is_allowed("rs256"));
        assert!(whitelist.is_allowed("ES384"));
        assert!(!whitelist.is_allowed("HS256"));
        assert!(!whitelist.is_allowed("none"));
    }

    #[test]
    fn test_from_names_rejects_unknown() {
        assert!(AlgorithmWhitelist::from_names(["RS256", "ES256"]).is_ok());
        assert!(AlgorithmWhitelist::from_names(["RS256", "XX999"]).is_err());
    }

    #[test]
    fn test_status_round_trip() {
        for status in [
            LoaderStatus::Undefined,
            LoaderStatus::Loading,
            LoaderStatus::Ok,
            LoaderStatus::Error,
        ] {
            assert_eq!(LoaderStatus::from_u8(status as u8), status);
        }
    }
}
