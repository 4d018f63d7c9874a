//! JWKS loader reading a document from disk.

use super::key_set::JwksKeySet;
use super::{AlgorithmWhitelist, JwksLoader, KeyInfo, LoaderStatus};
use crate::events::{SecurityEventCounter, SecurityEventType};
use crate::runtime::Clock;
use arc_swap::ArcSwapOption;
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use tracing::warn;

/// Loads a JWKS document from a file once, at `init`.
///
/// Useful for air-gapped deployments and tests. There is no refresh; replace
/// the validator to pick up new key material.
#[derive(Debug)]
pub struct FileJwksLoader {
    path: PathBuf,
    algorithms: AlgorithmWhitelist,
    clock: Arc<dyn Clock>,
    status: AtomicU8,
    keys: ArcSwapOption<JwksKeySet>,
}

impl FileJwksLoader {
    /// Create a loader for the JWKS document at `path`.
    pub fn new(path: impl Into<PathBuf>, algorithms: AlgorithmWhitelist, clock: Arc<dyn Clock>) -> Self {
        Self {
            path: path.into(),
            algorithms,
            clock,
            status: AtomicU8::new(LoaderStatus::Undefined as u8),
            keys: ArcSwapOption::const_empty(),
        }
    }
}

#[async_trait]
impl JwksLoader for FileJwksLoader {
    async fn init(&self, counter: Arc<SecurityEventCounter>) -> LoaderStatus {
        if self.status() != LoaderStatus::Undefined {
            return self.status();
        }
        self.status.store(LoaderStatus::Loading as u8, Ordering::Release);

        let body = match std::fs::read(&self.path) {
            Ok(body) => body,
            Err(e) => {
                counter.increment(SecurityEventType::FailedToReadJwksFile);
                warn!(path = %self.path.display(), error = %e, "failed to read JWKS file");
                self.status.store(LoaderStatus::Error as u8, Ordering::Release);
                return LoaderStatus::Error;
            }
        };

        match JwksKeySet::parse(&body, &self.algorithms, self.clock.now()) {
            Ok(set) => {
                self.keys.store(Some(Arc::new(set)));
                self.status.store(LoaderStatus::Ok as u8, Ordering::Release);
                LoaderStatus::Ok
            }
            Err(e) => {
                counter.increment(SecurityEventType::JwksJsonParseFailed);
                warn!(path = %self.path.display(), error = %e, "failed to parse JWKS file");
                self.status.store(LoaderStatus::Error as u8, Ordering::Release);
                LoaderStatus::Error
            }
        }
    }

    fn get_key_info(&self, kid: Option<&str>) -> Option<KeyInfo> {
        self.keys.load_full().and_then(|keys| keys.get(kid))
    }

    fn status(&self) -> LoaderStatus {
        LoaderStatus::from_u8(self.status.load(Ordering::Acquire))
    }

    fn close(&self) {}
}
