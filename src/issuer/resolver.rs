//! Lazy issuer resolution with a lock-free steady state.
//!
//! Resolution goes through two phases. During warm-up, a mutex-guarded state
//! holds the configurations still waiting for their first health check
//! (`pending`) and the ones already resolved. Once every configuration has
//! been processed, a read-only snapshot is published into a `OnceLock` and
//! every later lookup is a plain map read with no lock at all.
//!
//! A disabled configuration is dropped silently; a configuration whose key
//! loader cannot produce keys is dropped as unhealthy. Neither failure is
//! fatal to the resolver.

use super::config::IssuerConfig;
use crate::error::{Result, ValidationError};
use crate::events::{SecurityEventCounter, SecurityEventType};
use crate::jwks::LoaderStatus;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use tokio::sync::Mutex;
use tracing::{debug, warn};

struct ResolverState {
    resolved: HashMap<String, Arc<IssuerConfig>>,
    pending: Vec<Arc<IssuerConfig>>,
}

/// Resolves issuer identifiers to their configurations.
pub struct IssuerConfigResolver {
    all_configs: Vec<Arc<IssuerConfig>>,
    immutable: OnceLock<HashMap<String, Arc<IssuerConfig>>>,
    state: Mutex<ResolverState>,
    counter: Arc<SecurityEventCounter>,
}

impl std::fmt::Debug for IssuerConfigResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IssuerConfigResolver")
            .field("configured", &self.all_configs.len())
            .field("optimized", &self.immutable.get().is_some())
            .finish()
    }
}

impl IssuerConfigResolver {
    /// Create a resolver over the given configurations.
    pub fn new(configs: Vec<Arc<IssuerConfig>>, counter: Arc<SecurityEventCounter>) -> Self {
        Self {
            all_configs: configs.clone(),
            immutable: OnceLock::new(),
            state: Mutex::new(ResolverState {
                resolved: HashMap::new(),
                pending: configs,
            }),
            counter,
        }
    }

    /// Resolve the configuration for `issuer`.
    ///
    /// After warm-up this is a lock-free snapshot read. During warm-up the
    /// resolver health-checks pending configurations (which may await their
    /// first key load) under a cold-path mutex.
    ///
    /// The returned `NO_ISSUER_CONFIG` error is not counted here; the
    /// pipeline increments exactly one event per failed validation.
    pub async fn resolve(&self, issuer: &str) -> Result<Arc<IssuerConfig>> {
        if let Some(snapshot) = self.immutable.get() {
            return snapshot.get(issuer).cloned().ok_or_else(|| no_issuer(issuer));
        }

        let mut state = self.state.lock().await;

        // Another caller may have published while this one waited.
        if let Some(snapshot) = self.immutable.get() {
            return snapshot.get(issuer).cloned().ok_or_else(|| no_issuer(issuer));
        }
        if let Some(config) = state.resolved.get(issuer) {
            return Ok(Arc::clone(config));
        }

        let pending = std::mem::take(&mut state.pending);
        let mut found = None;
        let mut iter = pending.into_iter();
        for config in iter.by_ref() {
            if !config.enabled() {
                self.counter.increment(SecurityEventType::IssuerConfigSkipped);
                debug!(issuer = config.issuer_identifier(), "skipping disabled issuer config");
                continue;
            }
            let status = config.jwks_loader().init(Arc::clone(&self.counter)).await;
            if status == LoaderStatus::Error {
                self.counter.increment(SecurityEventType::IssuerConfigUnhealthy);
                warn!(
                    issuer = config.issuer_identifier(),
                    "dropping issuer config whose key loader failed its health check"
                );
                continue;
            }
            state
                .resolved
                .insert(config.issuer_identifier().to_owned(), Arc::clone(&config));
            if config.issuer_identifier() == issuer {
                found = Some(config);
                break;
            }
        }
        state.pending = iter.collect();

        if state.pending.is_empty() {
            // Publish the final set; reads never take the mutex again.
            let _ = self.immutable.set(state.resolved.clone());
            debug!(
                issuers = state.resolved.len(),
                "issuer resolution optimized to immutable snapshot"
            );
        }

        found.ok_or_else(|| no_issuer(issuer))
    }

    /// Whether the immutable snapshot has been published.
    pub fn is_optimized(&self) -> bool {
        self.immutable.get().is_some()
    }

    /// Close every configured key loader, resolved or not.
    pub fn close(&self) {
        for config in &self.all_configs {
            config.jwks_loader().close();
        }
    }
}

fn no_issuer(issuer: &str) -> ValidationError {
    ValidationError::new(
        SecurityEventType::NoIssuerConfig,
        format!("no issuer configuration matches '{issuer}'"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::issuer::config::BuildContext;
    use crate::jwks::{InMemoryJwksLoader, JwksLoader, KeyInfo};
    use crate::metrics::{MeasurementConfig, MeasurementMonitor};
    use crate::runtime::{SystemClock, TokioScheduler};
    use async_trait::async_trait;

    fn context() -> BuildContext {
        BuildContext {
            http_override: None,
            clock: Arc::new(SystemClock),
            scheduler: Arc::new(TokioScheduler),
            monitor: Arc::new(MeasurementMonitor::new(&MeasurementConfig::default())),
        }
    }

    fn healthy_config(issuer: &str) -> Arc<IssuerConfig> {
        let loader = InMemoryJwksLoader::from_json(
            br#"{"keys": []}"#,
            &crate::jwks::AlgorithmWhitelist::default(),
        )
        .unwrap();
        IssuerConfig::builder(issuer)
            .loader(Arc::new(loader))
            .build(&context())
            .unwrap()
    }

    fn disabled_config(issuer: &str) -> Arc<IssuerConfig> {
        let loader = InMemoryJwksLoader::from_json(
            br#"{"keys": []}"#,
            &crate::jwks::AlgorithmWhitelist::default(),
        )
        .unwrap();
        IssuerConfig::builder(issuer)
            .loader(Arc::new(loader))
            .enabled(false)
            .build(&context())
            .unwrap()
    }

    #[derive(Debug)]
    struct BrokenLoader;

    #[async_trait]
    impl JwksLoader for BrokenLoader {
        async fn init(&self, _counter: Arc<SecurityEventCounter>) -> LoaderStatus {
            LoaderStatus::Error
        }
        fn get_key_info(&self, _kid: Option<&str>) -> Option<KeyInfo> {
            None
        }
        fn status(&self) -> LoaderStatus {
            LoaderStatus::Error
        }
        fn close(&self) {}
    }

    fn unhealthy_config(issuer: &str) -> Arc<IssuerConfig> {
        IssuerConfig::builder(issuer)
            .loader(Arc::new(BrokenLoader))
            .build(&context())
            .unwrap()
    }

    #[tokio::test]
    async fn test_resolves_and_optimizes() {
        let counter = Arc::new(SecurityEventCounter::new());
        let resolver = IssuerConfigResolver::new(
            vec![healthy_config("https://a.example"), healthy_config("https://b.example")],
            counter,
        );
        assert!(!resolver.is_optimized());

        let config = resolver.resolve("https://b.example").await.unwrap();
        assert_eq!(config.issuer_identifier(), "https://b.example");
        // Both configs were walked (a first, healthy, non-matching), so the
        // snapshot is published.
        assert!(resolver.is_optimized());

        let again = resolver.resolve("https://a.example").await.unwrap();
        assert_eq!(again.issuer_identifier(), "https://a.example");
    }

    #[tokio::test]
    async fn test_unknown_issuer_fails_without_counting() {
        let counter = Arc::new(SecurityEventCounter::new());
        let resolver =
            IssuerConfigResolver::new(vec![healthy_config("https://a.example")], Arc::clone(&counter));
        let err = resolver.resolve("https://other.example").await.unwrap_err();
        assert_eq!(err.event_type(), SecurityEventType::NoIssuerConfig);
        // The pipeline owns the exactly-once increment.
        assert_eq!(counter.count(SecurityEventType::NoIssuerConfig), 0);
    }

    #[tokio::test]
    async fn test_disabled_config_is_skipped() {
        let counter = Arc::new(SecurityEventCounter::new());
        let resolver = IssuerConfigResolver::new(
            vec![disabled_config("https://a.example")],
            Arc::clone(&counter),
        );
        let err = resolver.resolve("https://a.example").await.unwrap_err();
        assert_eq!(err.event_type(), SecurityEventType::NoIssuerConfig);
        assert_eq!(counter.count(SecurityEventType::IssuerConfigSkipped), 1);
    }

    #[tokio::test]
    async fn test_unhealthy_config_is_dropped() {
        let counter = Arc::new(SecurityEventCounter::new());
        let resolver = IssuerConfigResolver::new(
            vec![unhealthy_config("https://a.example"), healthy_config("https://b.example")],
            Arc::clone(&counter),
        );
        let config = resolver.resolve("https://b.example").await.unwrap();
        assert_eq!(config.issuer_identifier(), "https://b.example");
        assert_eq!(counter.count(SecurityEventType::IssuerConfigUnhealthy), 1);

        // The unhealthy issuer stays unknown even before another resolve.
        let err = resolver.resolve("https://a.example").await.unwrap_err();
        assert_eq!(err.event_type(), SecurityEventType::NoIssuerConfig);
    }

    #[tokio::test]
    async fn test_resolution_is_stable_after_optimization() {
        let counter = Arc::new(SecurityEventCounter::new());
        let resolver =
            IssuerConfigResolver::new(vec![healthy_config("https://a.example")], counter);
        let first = resolver.resolve("https://a.example").await.unwrap();
        let second = resolver.resolve("https://a.example").await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }
}
