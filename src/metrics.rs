//! Latency sampling for pipeline stages and JWKS operations.
//!
//! The [`MeasurementMonitor`] keeps one lock-free ring buffer per
//! [`MeasurementType`]. Recording a sample on the hot path is an atomic
//! cursor bump plus an atomic slot store; there is no allocation and no
//! synchronization. Reads copy the current window and compute percentiles,
//! tolerating concurrent writers with best-effort consistency.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

/// Identifies one measured operation.
///
/// The first eleven values mirror the pipeline stages in execution order;
/// the remainder cover JWKS key-material operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(usize)]
pub enum MeasurementType {
    /// Stage 0: the whole validation, enclosing stages 1-10.
    CompleteValidation,
    /// Stage 1: raw token shape and size checks.
    TokenFormatCheck,
    /// Stage 2: base64url decoding and JSON parsing.
    TokenParsing,
    /// Stage 3: `iss` claim extraction.
    IssuerExtraction,
    /// Stage 4: access-token cache lookup.
    CacheLookup,
    /// Stage 5: issuer configuration resolution.
    IssuerConfigResolution,
    /// Stage 6: header `alg`/`typ`/`kid` validation.
    HeaderValidation,
    /// Stage 7: cryptographic signature verification.
    SignatureValidation,
    /// Stage 8: claim mapping and content construction.
    TokenBuilding,
    /// Stage 9: temporal and semantic claim validation.
    ClaimsValidation,
    /// Stage 10: access-token cache store.
    CacheStore,
    /// HTTP fetch of a JWKS document.
    JwksFetch,
    /// Parsing a JWKS document into a key set.
    JwksParse,
    /// Key lookup across current and retired key sets.
    KeyLookup,
    /// Resolving the JWKS URI from a well-known document.
    WellKnownResolution,
}

impl MeasurementType {
    /// All measurement types, in declaration order.
    pub const ALL: [MeasurementType; 15] = [
        Self::CompleteValidation,
        Self::TokenFormatCheck,
        Self::TokenParsing,
        Self::IssuerExtraction,
        Self::CacheLookup,
        Self::IssuerConfigResolution,
        Self::HeaderValidation,
        Self::SignatureValidation,
        Self::TokenBuilding,
        Self::ClaimsValidation,
        Self::CacheStore,
        Self::JwksFetch,
        Self::JwksParse,
        Self::KeyLookup,
        Self::WellKnownResolution,
    ];

    /// Number of measurement types.
    pub const COUNT: usize = Self::ALL.len();
}

/// Configuration for the measurement monitor.
#[derive(Debug, Clone)]
pub struct MeasurementConfig {
    /// Samples retained per measurement type. Clamped to `1..=10_000`.
    pub window_size: usize,
    /// Types that record samples; the rest drop them.
    pub enabled_types: Vec<MeasurementType>,
}

impl Default for MeasurementConfig {
    fn default() -> Self {
        Self {
            window_size: 100,
            enabled_types: MeasurementType::ALL.to_vec(),
        }
    }
}

impl MeasurementConfig {
    /// Disable all sampling.
    pub fn disabled() -> Self {
        Self {
            window_size: 1,
            enabled_types: Vec::new(),
        }
    }
}

/// Percentile summary over the current sample window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MeasurementStats {
    /// Samples currently in the window.
    pub count: usize,
    /// Median duration.
    pub p50: Duration,
    /// 95th percentile duration.
    pub p95: Duration,
    /// 99th percentile duration.
    pub p99: Duration,
}

impl MeasurementStats {
    fn empty() -> Self {
        Self {
            count: 0,
            p50: Duration::ZERO,
            p95: Duration::ZERO,
            p99: Duration::ZERO,
        }
    }
}

/// One ring buffer of recent durations in nanoseconds.
struct Stripe {
    slots: Box<[AtomicU64]>,
    cursor: AtomicUsize,
}

impl Stripe {
    fn new(window: usize) -> Self {
        let slots = (0..window).map(|_| AtomicU64::new(0)).collect::<Vec<_>>();
        Self {
            slots: slots.into_boxed_slice(),
            cursor: AtomicUsize::new(0),
        }
    }

    fn record(&self, nanos: u64) {
        let index = self.cursor.fetch_add(1, Ordering::Relaxed) % self.slots.len();
        self.slots[index].store(nanos, Ordering::Relaxed);
    }

    fn snapshot(&self) -> Vec<u64> {
        let written = self.cursor.load(Ordering::Relaxed).min(self.slots.len());
        self.slots[..written]
            .iter()
            .map(|slot| slot.load(Ordering::Relaxed))
            .collect()
    }

    fn reset(&self) {
        self.cursor.store(0, Ordering::Relaxed);
        for slot in self.slots.iter() {
            slot.store(0, Ordering::Relaxed);
        }
    }
}

/// Striped latency monitor, one stripe per [`MeasurementType`].
///
/// # Example
///
/// ```rust
/// use std::time::Duration;
/// use tokenward::metrics::{MeasurementConfig, MeasurementMonitor, MeasurementType};
///
/// let monitor = MeasurementMonitor::new(&MeasurementConfig::default());
/// monitor.record(MeasurementType::SignatureValidation, Duration::from_micros(80));
/// let stats = monitor.stats(MeasurementType::SignatureValidation);
/// assert_eq!(stats.count, 1);
/// ```
pub struct MeasurementMonitor {
    stripes: Vec<Stripe>,
    enabled: [bool; MeasurementType::COUNT],
}

impl std::fmt::Debug for MeasurementMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MeasurementMonitor")
            .field("window", &self.stripes.first().map_or(0, |s| s.slots.len()))
            .field("enabled", &self.enabled)
            .finish()
    }
}

impl MeasurementMonitor {
    /// Create a monitor from the given configuration.
    pub fn new(config: &MeasurementConfig) -> Self {
        let window = config.window_size.clamp(1, 10_000);
        let mut enabled = [false; MeasurementType::COUNT];
        for ty in &config.enabled_types {
            enabled[*ty as usize] = true;
        }
        Self {
            stripes: (0..MeasurementType::COUNT).map(|_| Stripe::new(window)).collect(),
            enabled,
        }
    }

    /// Whether `ty` records samples.
    pub fn is_enabled(&self, ty: MeasurementType) -> bool {
        self.enabled[ty as usize]
    }

    /// Record one duration sample for `ty`. Disabled types drop the sample.
    pub fn record(&self, ty: MeasurementType, duration: Duration) {
        if self.enabled[ty as usize] {
            let nanos = u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX);
            self.stripes[ty as usize].record(nanos);
        }
    }

    /// Percentile summary of the current window for `ty`.
    pub fn stats(&self, ty: MeasurementType) -> MeasurementStats {
        let mut samples = self.stripes[ty as usize].snapshot();
        if samples.is_empty() {
            return MeasurementStats::empty();
        }
        samples.sort_unstable();
        let percentile = |p: f64| {
            let rank = ((samples.len() - 1) as f64 * p).round() as usize;
            Duration::from_nanos(samples[rank])
        };
        MeasurementStats {
            count: samples.len(),
            p50: percentile(0.50),
            p95: percentile(0.95),
            p99: percentile(0.99),
        }
    }

    /// Samples currently recorded for `ty`.
    pub fn sample_count(&self, ty: MeasurementType) -> usize {
        self.stripes[ty as usize].snapshot().len()
    }

    /// Zero the window for `ty`.
    pub fn reset(&self, ty: MeasurementType) {
        self.stripes[ty as usize].reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn monitor() -> MeasurementMonitor {
        MeasurementMonitor::new(&MeasurementConfig::default())
    }

    #[test]
    fn test_empty_stats_are_zero() {
        let stats = monitor().stats(MeasurementType::CompleteValidation);
        assert_eq!(stats.count, 0);
        assert_eq!(stats.p99, Duration::ZERO);
    }

    #[test]
    fn test_percentiles_over_known_samples() {
        let monitor = monitor();
        for millis in 1..=100 {
            monitor.record(MeasurementType::JwksFetch, Duration::from_millis(millis));
        }
        let stats = monitor.stats(MeasurementType::JwksFetch);
        assert_eq!(stats.count, 100);
        assert_eq!(stats.p50, Duration::from_millis(51));
        assert_eq!(stats.p95, Duration::from_millis(95));
        assert_eq!(stats.p99, Duration::from_millis(99));
    }

    #[test]
    fn test_window_wraps_oldest_samples() {
        let config = MeasurementConfig {
            window_size: 4,
            ..MeasurementConfig::default()
        };
        let monitor = MeasurementMonitor::new(&config);
        for nanos in [10u64, 20, 30, 40, 50, 60] {
            monitor.record(MeasurementType::KeyLookup, Duration::from_nanos(nanos));
        }
        let stats = monitor.stats(MeasurementType::KeyLookup);
        assert_eq!(stats.count, 4);
        // 50 and 60 overwrote 10 and 20.
        assert_eq!(stats.p50, Duration::from_nanos(50));
    }

    #[test]
    fn test_disabled_type_records_nothing() {
        let config = MeasurementConfig {
            window_size: 16,
            enabled_types: vec![MeasurementType::CompleteValidation],
        };
        let monitor = MeasurementMonitor::new(&config);
        monitor.record(MeasurementType::CacheLookup, Duration::from_micros(5));
        assert_eq!(monitor.sample_count(MeasurementType::CacheLookup), 0);
        assert!(!monitor.is_enabled(MeasurementType::CacheLookup));
    }

    #[test]
    fn test_reset_clears_window() {
        let monitor = monitor();
        monitor.record(MeasurementType::TokenParsing, Duration::from_micros(3));
        monitor.reset(MeasurementType::TokenParsing);
        assert_eq!(monitor.sample_count(MeasurementType::TokenParsing), 0);
    }
}
