//! HTTP-backed JWKS loader with background refresh and rotation grace.
//!
//! The loader keeps the current key set in an atomically swapped reference so
//! the validation hot path reads keys without locking. All mutation happens
//! on the refresh task: conditional GETs with the stored ETag, atomic swap on
//! rotation, a bounded FIFO of retired key sets that stay usable for a grace
//! period, and exponential backoff (capped at the refresh interval) while no
//! keys have ever been loaded.
//!
//! Fetch or parse trouble never discards usable keys: a loader that has keys
//! stays `Ok` and serves them until a refresh succeeds.

use super::key_set::JwksKeySet;
use super::{AlgorithmWhitelist, JwksLoader, KeyInfo, LoaderStatus};
use crate::events::{SecurityEventCounter, SecurityEventType};
use crate::metrics::{MeasurementMonitor, MeasurementType};
use crate::runtime::scheduler::RepeatingTask;
use crate::runtime::{Clock, HttpClient, HttpResponse, Scheduler, TaskHandle};
use arc_swap::{ArcSwap, ArcSwapOption};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU8, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};
use url::Url;

/// Configuration of an [`HttpJwksLoader`].
#[derive(Debug, Clone)]
pub struct HttpJwksConfig {
    /// Direct JWKS endpoint. Either this or `well_known_url` must be set.
    pub jwks_url: Option<Url>,
    /// OIDC discovery document from which `jwks_uri` is resolved.
    pub well_known_url: Option<Url>,
    /// Cadence of the background refresh.
    pub refresh_interval: Duration,
    /// How long a rotated-out key set remains usable.
    pub grace_period: Duration,
    /// Maximum number of retired key sets kept.
    pub max_retired_sets: usize,
    /// Algorithms whose keys are accepted.
    pub algorithms: AlgorithmWhitelist,
}

impl Default for HttpJwksConfig {
    fn default() -> Self {
        Self {
            jwks_url: None,
            well_known_url: None,
            refresh_interval: Duration::from_secs(600),
            grace_period: Duration::from_secs(300),
            max_retired_sets: 3,
            algorithms: AlgorithmWhitelist::default(),
        }
    }
}

/// A key set that was replaced by a rotation, kept for the grace period.
#[derive(Debug, Clone)]
struct RetiredKeySet {
    keys: Arc<JwksKeySet>,
    retired_at: DateTime<Utc>,
}

/// JWKS loader backed by a remote endpoint.
///
/// See the module documentation for the refresh and rotation behavior. All
/// lookup methods are lock-free; `init` is idempotent and memoizes the first
/// load so concurrent cold callers share one HTTP request.
pub struct HttpJwksLoader {
    config: HttpJwksConfig,
    grace: chrono::Duration,
    http: Arc<dyn HttpClient>,
    clock: Arc<dyn Clock>,
    scheduler: Arc<dyn Scheduler>,
    monitor: Option<Arc<MeasurementMonitor>>,
    status: AtomicU8,
    current: ArcSwapOption<JwksKeySet>,
    retired: ArcSwap<Vec<RetiredKeySet>>,
    resolved_jwks_url: ArcSwapOption<Url>,
    etag: Mutex<Option<String>>,
    last_success: Mutex<Option<DateTime<Utc>>>,
    consecutive_failures: AtomicU32,
    counter: ArcSwapOption<SecurityEventCounter>,
    init_cell: OnceCell<()>,
    refresh_handle: Mutex<Option<Box<dyn TaskHandle>>>,
    closed: AtomicBool,
    weak_self: Weak<HttpJwksLoader>,
}

impl std::fmt::Debug for HttpJwksLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpJwksLoader")
            .field("jwks_url", &self.config.jwks_url)
            .field("well_known_url", &self.config.well_known_url)
            .field("status", &self.status())
            .field("keys", &self.current.load().as_ref().map_or(0, |k| k.len()))
            .finish_non_exhaustive()
    }
}

impl HttpJwksLoader {
    /// Create a loader. No network activity happens until `init`.
    pub fn new(
        config: HttpJwksConfig,
        http: Arc<dyn HttpClient>,
        clock: Arc<dyn Clock>,
        scheduler: Arc<dyn Scheduler>,
        monitor: Option<Arc<MeasurementMonitor>>,
    ) -> Arc<Self> {
        let grace = chrono::Duration::from_std(config.grace_period)
            .unwrap_or_else(|_| chrono::Duration::days(36_500));
        Arc::new_cyclic(|weak_self| Self {
            config,
            grace,
            http,
            clock,
            scheduler,
            monitor,
            status: AtomicU8::new(LoaderStatus::Undefined as u8),
            current: ArcSwapOption::const_empty(),
            retired: ArcSwap::from_pointee(Vec::new()),
            resolved_jwks_url: ArcSwapOption::const_empty(),
            etag: Mutex::new(None),
            last_success: Mutex::new(None),
            consecutive_failures: AtomicU32::new(0),
            counter: ArcSwapOption::const_empty(),
            init_cell: OnceCell::new(),
            refresh_handle: Mutex::new(None),
            closed: AtomicBool::new(false),
            weak_self: weak_self.clone(),
        })
    }

    /// When the last successful load (including 304 revalidations) happened.
    pub fn last_successful_load(&self) -> Option<DateTime<Utc>> {
        *self.last_success.lock()
    }

    fn set_status(&self, status: LoaderStatus) {
        self.status.store(status as u8, Ordering::Release);
    }

    fn count(&self, event: SecurityEventType) {
        if let Some(counter) = self.counter.load_full() {
            counter.increment(event);
        }
    }

    fn sample(&self, ty: MeasurementType, elapsed: Duration) {
        if let Some(monitor) = &self.monitor {
            monitor.record(ty, elapsed);
        }
    }

    /// Resolve the JWKS endpoint, consulting the well-known document when no
    /// direct URL is configured. A failed resolution is reported as a fetch
    /// failure and retried on the next tick; it never poisons the loader.
    async fn jwks_endpoint(&self) -> Result<Url, String> {
        if let Some(resolved) = self.resolved_jwks_url.load_full() {
            return Ok((*resolved).clone());
        }
        if let Some(url) = &self.config.jwks_url {
            self.resolved_jwks_url.store(Some(Arc::new(url.clone())));
            return Ok(url.clone());
        }
        let well_known = self
            .config
            .well_known_url
            .as_ref()
            .ok_or_else(|| "no JWKS or well-known URL configured".to_owned())?;

        let started = Instant::now();
        let result = self.resolve_well_known(well_known).await;
        self.sample(MeasurementType::WellKnownResolution, started.elapsed());

        let url = result?;
        debug!(%url, "resolved jwks_uri from well-known document");
        self.resolved_jwks_url.store(Some(Arc::new(url.clone())));
        Ok(url)
    }

    async fn resolve_well_known(&self, well_known: &Url) -> Result<Url, String> {
        let response = self
            .http
            .get(well_known, &[])
            .await
            .map_err(|e| format!("well-known fetch failed: {e}"))?;
        if !response.is_success() {
            return Err(format!(
                "well-known endpoint returned status {}",
                response.status
            ));
        }
        let document: serde_json::Value = serde_json::from_slice(&response.body)
            .map_err(|e| format!("well-known document is not valid JSON: {e}"))?;
        let jwks_uri = document
            .get("jwks_uri")
            .and_then(serde_json::Value::as_str)
            .ok_or_else(|| "well-known document has no jwks_uri".to_owned())?;
        Url::parse(jwks_uri).map_err(|e| format!("jwks_uri is not a valid URL: {e}"))
    }

    /// One load attempt: conditional GET, parse, rotation handling.
    async fn load_once(&self) -> LoaderStatus {
        self.set_status(LoaderStatus::Loading);

        let url = match self.jwks_endpoint().await {
            Ok(url) => url,
            Err(reason) => return self.fail_fetch(&reason),
        };

        let mut headers = Vec::new();
        if let Some(etag) = self.etag.lock().clone() {
            headers.push(("if-none-match".to_owned(), etag));
        }

        let started = Instant::now();
        let response = self.http.get(&url, &headers).await;
        self.sample(MeasurementType::JwksFetch, started.elapsed());

        match response {
            Err(e) => self.fail_fetch(&e.to_string()),
            Ok(response) if response.status == 304 => {
                if self.current.load().is_some() {
                    debug!("JWKS unchanged (304), keeping current keys");
                    self.mark_success()
                } else {
                    // A 304 without keys to serve cannot satisfy anyone.
                    self.fail_fetch("304 received but no key set is cached")
                }
            }
            Ok(response) if response.is_success() => self.apply_document(&response),
            Ok(response) => {
                self.fail_fetch(&format!("JWKS endpoint returned status {}", response.status))
            }
        }
    }

    fn apply_document(&self, response: &HttpResponse) -> LoaderStatus {
        let started = Instant::now();
        let parsed = JwksKeySet::parse(&response.body, &self.config.algorithms, self.clock.now());
        self.sample(MeasurementType::JwksParse, started.elapsed());

        let new_set = match parsed {
            Ok(set) => Arc::new(set),
            Err(e) => {
                self.count(SecurityEventType::JwksJsonParseFailed);
                return if self.current.load().is_some() {
                    warn!(error = %e, "JWKS parse failed, keeping cached keys");
                    self.mark_success_status_only()
                } else {
                    warn!(error = %e, "JWKS parse failed with no cached keys");
                    self.fail_terminal()
                };
            }
        };

        *self.etag.lock() = response.header("etag").map(str::to_owned);

        if let Some(previous) = self.current.load_full() {
            if previous.same_keys(&new_set) {
                debug!("JWKS refreshed, key material unchanged");
            } else {
                self.retire(previous);
                self.count(SecurityEventType::KeyRotationDetected);
                info!(keys = new_set.len(), "JWKS key rotation detected");
                self.current.store(Some(new_set));
            }
        } else {
            debug!(keys = new_set.len(), "initial JWKS load complete");
            self.current.store(Some(new_set));
        }

        self.mark_success()
    }

    /// Push the outgoing key set onto the retired FIFO, bounded by count and
    /// by the grace period.
    fn retire(&self, outgoing: Arc<JwksKeySet>) {
        let now = self.clock.now();
        let mut retired = vec![RetiredKeySet {
            keys: outgoing,
            retired_at: now,
        }];
        for entry in self.retired.load().iter() {
            if retired.len() >= self.config.max_retired_sets {
                break;
            }
            if entry.retired_at + self.grace > now {
                retired.push(entry.clone());
            }
        }
        self.retired.store(Arc::new(retired));
    }

    fn mark_success(&self) -> LoaderStatus {
        *self.last_success.lock() = Some(self.clock.now());
        self.consecutive_failures.store(0, Ordering::Relaxed);
        self.set_status(LoaderStatus::Ok);
        LoaderStatus::Ok
    }

    /// Parse failed but cached keys remain usable: status stays `Ok`, the
    /// success timestamp is not advanced.
    fn mark_success_status_only(&self) -> LoaderStatus {
        self.set_status(LoaderStatus::Ok);
        LoaderStatus::Ok
    }

    fn fail_fetch(&self, reason: &str) -> LoaderStatus {
        self.count(SecurityEventType::JwksFetchFailed);
        if self.current.load().is_some() {
            warn!(reason, "JWKS refresh failed, keeping cached keys");
            self.set_status(LoaderStatus::Ok);
            LoaderStatus::Ok
        } else {
            warn!(reason, "JWKS load failed with no cached keys");
            self.fail_terminal()
        }
    }

    fn fail_terminal(&self) -> LoaderStatus {
        self.consecutive_failures.fetch_add(1, Ordering::Relaxed);
        self.set_status(LoaderStatus::Error);
        LoaderStatus::Error
    }

    /// Delay until the next refresh: the configured interval, or exponential
    /// backoff capped at that interval while no keys have ever loaded.
    fn next_delay(&self) -> Duration {
        if self.status() == LoaderStatus::Error {
            let failures = self.consecutive_failures.load(Ordering::Relaxed);
            let exponent = failures.saturating_sub(1).min(16);
            let backoff = Duration::from_secs(1u64 << exponent);
            backoff.min(self.config.refresh_interval)
        } else {
            self.config.refresh_interval
        }
    }

    async fn tick(&self) -> Duration {
        if self.closed.load(Ordering::Acquire) {
            return Duration::from_secs(86_400);
        }
        self.load_once().await;
        self.next_delay()
    }

    fn spawn_refresh(&self) {
        let weak = self.weak_self.clone();
        let task: RepeatingTask = Box::new(move || {
            let weak = weak.clone();
            Box::pin(async move {
                match weak.upgrade() {
                    Some(loader) => loader.tick().await,
                    // Loader dropped; park until the handle is cancelled.
                    None => Duration::from_secs(86_400),
                }
            })
        });
        let handle = self.scheduler.schedule(self.next_delay(), task);
        *self.refresh_handle.lock() = Some(handle);
    }
}

#[async_trait]
impl JwksLoader for HttpJwksLoader {
    async fn init(&self, counter: Arc<SecurityEventCounter>) -> LoaderStatus {
        self.init_cell
            .get_or_init(|| async {
                self.counter.store(Some(counter));
                self.load_once().await;
                self.spawn_refresh();
            })
            .await;
        self.status()
    }

    fn get_key_info(&self, kid: Option<&str>) -> Option<KeyInfo> {
        if let Some(current) = self.current.load_full() {
            if let Some(key) = current.get(kid) {
                return Some(key);
            }
        }
        let now = self.clock.now();
        for entry in self.retired.load().iter() {
            if entry.retired_at + self.grace > now {
                if let Some(key) = entry.keys.get(kid) {
                    debug!(kid = ?kid, "serving key from retired set within grace period");
                    return Some(key);
                }
            }
        }
        None
    }

    fn status(&self) -> LoaderStatus {
        LoaderStatus::from_u8(self.status.load(Ordering::Acquire))
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
        if let Some(handle) = self.refresh_handle.lock().take() {
            handle.cancel();
        }
    }
}

impl Drop for HttpJwksLoader {
    fn drop(&mut self) {
        self.close();
    }
}
