//! JWKS loader over an already-parsed key set.

use super::key_set::{JwksKeySet, KeySetError};
use super::{AlgorithmWhitelist, JwksLoader, KeyInfo, LoaderStatus};
use crate::events::SecurityEventCounter;
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;

/// A loader whose key material is fixed at construction.
///
/// Mainly for tests and embedders that obtain key material out of band.
#[derive(Debug)]
pub struct InMemoryJwksLoader {
    keys: JwksKeySet,
}

impl InMemoryJwksLoader {
    /// Wrap an existing key set.
    pub fn new(keys: JwksKeySet) -> Self {
        Self { keys }
    }

    /// Parse a JWKS document and wrap the result.
    pub fn from_json(body: &[u8], algorithms: &AlgorithmWhitelist) -> Result<Self, KeySetError> {
        Ok(Self {
            keys: JwksKeySet::parse(body, algorithms, Utc::now())?,
        })
    }
}

#[async_trait]
impl JwksLoader for InMemoryJwksLoader {
    async fn init(&self, _counter: Arc<SecurityEventCounter>) -> LoaderStatus {
        LoaderStatus::Ok
    }

    fn get_key_info(&self, kid: Option<&str>) -> Option<KeyInfo> {
        self.keys.get(kid)
    }

    fn status(&self) -> LoaderStatus {
        LoaderStatus::Ok
    }

    fn close(&self) {}
}
