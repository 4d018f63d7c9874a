//! Content-addressed cache of validated access tokens.
//!
//! Keyed by the SHA-256 of the raw token; the raw token is stored next to the
//! content and compared on lookup so a hash collision can never leak another
//! token's content. Entries disappear at their `exp` time at the latest:
//! lookups check expiry inline and a background sweep removes the rest.
//! Eviction above the size bound is LRU by a per-entry atomic access stamp.

use crate::runtime::scheduler::RepeatingTask;
use crate::runtime::{Clock, Scheduler, TaskHandle};
use crate::token::AccessTokenContent;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tracing::{debug, warn};

/// Configuration of the access-token cache.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Maximum number of entries. `0` disables the cache entirely.
    pub max_size: usize,
    /// Cadence of the background expiry sweep.
    pub eviction_interval: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_size: 1000,
            eviction_interval: Duration::from_secs(10),
        }
    }
}

impl CacheConfig {
    /// A configuration with the cache disabled.
    pub fn disabled() -> Self {
        Self {
            max_size: 0,
            ..Self::default()
        }
    }
}

struct CacheEntry {
    raw_token: String,
    content: AccessTokenContent,
    expires_at: DateTime<Utc>,
    last_access: AtomicI64,
}

/// Bounded, concurrency-friendly cache of validated access tokens.
pub struct AccessTokenCache {
    entries: DashMap<String, CacheEntry>,
    config: CacheConfig,
    clock: Arc<dyn Clock>,
    evictor: Mutex<Option<Box<dyn TaskHandle>>>,
    evictor_started: AtomicBool,
}

impl std::fmt::Debug for AccessTokenCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessTokenCache")
            .field("size", &self.entries.len())
            .field("max_size", &self.config.max_size)
            .finish()
    }
}

impl AccessTokenCache {
    /// Create a cache. The expiry sweep starts lazily on first store.
    pub fn new(config: CacheConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: DashMap::new(),
            config,
            clock,
            evictor: Mutex::new(None),
            evictor_started: AtomicBool::new(false),
        }
    }

    /// Whether the cache is turned off (`max_size == 0`).
    pub fn is_disabled(&self) -> bool {
        self.config.max_size == 0
    }

    /// Look up content for a raw token. Never returns expired content.
    pub fn lookup(&self, raw: &str) -> Option<AccessTokenContent> {
        if self.is_disabled() {
            return None;
        }
        let key = token_key(raw);
        let now = self.clock.now();
        {
            let entry = self.entries.get(&key)?;
            if entry.raw_token != raw {
                warn!("cache key collision detected, treating as miss");
                return None;
            }
            if entry.expires_at > now {
                entry
                    .last_access
                    .store(now.timestamp_millis(), Ordering::Relaxed);
                return Some(entry.content.clone());
            }
        }
        // Expired: remove outside the shard guard.
        self.entries.remove(&key);
        None
    }

    /// Store validated content. No-op when disabled or already expired.
    pub fn store(&self, raw: &str, content: &AccessTokenContent) {
        if self.is_disabled() {
            return;
        }
        let Some(expires_at) = content.expires_at() else {
            return;
        };
        let now = self.clock.now();
        if expires_at <= now {
            return;
        }
        let key = token_key(raw);
        self.entries.insert(
            key,
            CacheEntry {
                raw_token: raw.to_owned(),
                content: content.clone(),
                expires_at,
                last_access: AtomicI64::new(now.timestamp_millis()),
            },
        );
        while self.entries.len() > self.config.max_size {
            if !self.evict_least_recently_used() {
                break;
            }
        }
    }

    /// Remove every entry whose expiry has passed.
    pub fn evict_expired(&self) {
        let now = self.clock.now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.expires_at > now);
        let evicted = before.saturating_sub(self.entries.len());
        if evicted > 0 {
            debug!(evicted, "evicted expired access tokens from cache");
        }
    }

    /// Current number of entries.
    pub fn size(&self) -> usize {
        self.entries.len()
    }

    fn evict_least_recently_used(&self) -> bool {
        let mut oldest: Option<(String, i64)> = None;
        for entry in self.entries.iter() {
            let stamp = entry.last_access.load(Ordering::Relaxed);
            match &oldest {
                Some((_, best)) if *best <= stamp => {}
                _ => oldest = Some((entry.key().clone(), stamp)),
            }
        }
        match oldest {
            Some((key, _)) => self.entries.remove(&key).is_some(),
            None => false,
        }
    }

    /// Start the background expiry sweep, once.
    pub(crate) fn ensure_evictor(self: &Arc<Self>, scheduler: &dyn Scheduler) {
        if self.is_disabled()
            || self
                .evictor_started
                .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                .is_err()
        {
            return;
        }
        let weak: Weak<AccessTokenCache> = Arc::downgrade(self);
        let interval = self.config.eviction_interval;
        let task: RepeatingTask = Box::new(move || {
            let weak = weak.clone();
            Box::pin(async move {
                if let Some(cache) = weak.upgrade() {
                    cache.evict_expired();
                    cache.config.eviction_interval
                } else {
                    Duration::from_secs(86_400)
                }
            })
        });
        let handle = scheduler.schedule(interval, task);
        *self.evictor.lock() = Some(handle);
    }

    /// Stop the background sweep.
    pub fn close(&self) {
        if let Some(handle) = self.evictor.lock().take() {
            handle.cancel();
        }
    }
}

/// SHA-256 hex of the raw token.
fn token_key(raw: &str) -> String {
    let digest = Sha256::digest(raw.as_bytes());
    let mut key = String::with_capacity(64);
    for byte in digest {
        use std::fmt::Write as _;
        let _ = write!(key, "{byte:02x}");
    }
    key
}
