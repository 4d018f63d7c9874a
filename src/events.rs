//! Security event taxonomy and counters.
//!
//! Every discrete validation failure, every JWKS lifecycle event and every
//! successful token creation is classified as a [`SecurityEventType`]. The
//! [`SecurityEventCounter`] keeps one monotonic 64-bit counter per event type
//! so operators can alert on spikes (e.g. a burst of
//! `SIGNATURE_VALIDATION_FAILED`) and tests can assert exact failure paths.
//!
//! The counter is shared by reference across the whole validator. Incrementing
//! is a single relaxed atomic add on a dense array slot; there is no locking
//! on any path.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// Classification of a security-relevant event.
///
/// The set is closed: structural token failures, semantic claim failures,
/// signature and key failures, JWKS lifecycle events, and the success events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(usize)]
pub enum SecurityEventType {
    // Structural failures
    /// The presented token was empty or whitespace.
    TokenEmpty,
    /// The raw token exceeded the configured maximum size.
    TokenSizeExceeded,
    /// The token did not consist of three dot-separated segments.
    InvalidJwtFormat,
    /// The signature segment could not be base64url-decoded.
    FailedToDecodeJwt,
    /// The header segment could not be decoded or parsed.
    FailedToDecodeHeader,
    /// The payload segment could not be decoded or parsed.
    FailedToDecodePayload,
    /// A decoded segment exceeded the configured maximum size.
    DecodedPartSizeExceeded,

    // Semantic failures
    /// A required claim was absent or unmappable.
    MissingClaim,
    /// A recommended claim was absent (logged, never fatal).
    MissingRecommendedElement,
    /// The `exp` claim lies in the past.
    TokenExpired,
    /// The `nbf` claim lies in the future.
    TokenNbfFuture,
    /// The `aud` claim did not intersect the expected audience.
    AudienceMismatch,
    /// The `azp` claim did not match the expected client id.
    AzpMismatch,
    /// The `iss` claim did not match the resolved issuer identifier.
    IssuerMismatch,

    // Signature and key failures
    /// No configured issuer matched the token's `iss` claim.
    NoIssuerConfig,
    /// Cryptographic signature verification failed.
    SignatureValidationFailed,
    /// No key matching the token's `kid` was available.
    KeyNotFound,
    /// The header `alg` was absent or not whitelisted.
    UnsupportedAlgorithm,

    // JWKS lifecycle
    /// A JWKS endpoint fetch failed.
    JwksFetchFailed,
    /// A JWKS document failed to parse.
    JwksJsonParseFailed,
    /// A JWKS file could not be read.
    FailedToReadJwksFile,
    /// A refresh produced a key set differing from the current one.
    KeyRotationDetected,

    // Issuer configuration lifecycle
    /// A disabled issuer configuration was dropped during resolution.
    IssuerConfigSkipped,
    /// An issuer configuration failed its health check and was dropped.
    IssuerConfigUnhealthy,

    // Successes
    /// An access token passed the full pipeline.
    AccessTokenCreated,
    /// An ID token passed the full pipeline.
    IdTokenCreated,
    /// A refresh token passed the full pipeline.
    RefreshTokenCreated,
    /// An access token was served from the content cache.
    AccessTokenCacheHit,
}

impl SecurityEventType {
    /// All event types, in declaration order.
    pub const ALL: [SecurityEventType; 28] = [
        Self::TokenEmpty,
        Self::TokenSizeExceeded,
        Self::InvalidJwtFormat,
        Self::FailedToDecodeJwt,
        Self::FailedToDecodeHeader,
        Self::FailedToDecodePayload,
        Self::DecodedPartSizeExceeded,
        Self::MissingClaim,
        Self::MissingRecommendedElement,
        Self::TokenExpired,
        Self::TokenNbfFuture,
        Self::AudienceMismatch,
        Self::AzpMismatch,
        Self::IssuerMismatch,
        Self::NoIssuerConfig,
        Self::SignatureValidationFailed,
        Self::KeyNotFound,
        Self::UnsupportedAlgorithm,
        Self::JwksFetchFailed,
        Self::JwksJsonParseFailed,
        Self::FailedToReadJwksFile,
        Self::KeyRotationDetected,
        Self::IssuerConfigSkipped,
        Self::IssuerConfigUnhealthy,
        Self::AccessTokenCreated,
        Self::IdTokenCreated,
        Self::RefreshTokenCreated,
        Self::AccessTokenCacheHit,
    ];

    /// Number of event types.
    pub const COUNT: usize = Self::ALL.len();

    /// Stable screaming-snake name, used in logs and error messages.
    pub fn name(self) -> &'static str {
        match self {
            Self::TokenEmpty => "TOKEN_EMPTY",
            Self::TokenSizeExceeded => "TOKEN_SIZE_EXCEEDED",
            Self::InvalidJwtFormat => "INVALID_JWT_FORMAT",
            Self::FailedToDecodeJwt => "FAILED_TO_DECODE_JWT",
            Self::FailedToDecodeHeader => "FAILED_TO_DECODE_HEADER",
            Self::FailedToDecodePayload => "FAILED_TO_DECODE_PAYLOAD",
            Self::DecodedPartSizeExceeded => "DECODED_PART_SIZE_EXCEEDED",
            Self::MissingClaim => "MISSING_CLAIM",
            Self::MissingRecommendedElement => "MISSING_RECOMMENDED_ELEMENT",
            Self::TokenExpired => "TOKEN_EXPIRED",
            Self::TokenNbfFuture => "TOKEN_NBF_FUTURE",
            Self::AudienceMismatch => "AUDIENCE_MISMATCH",
            Self::AzpMismatch => "AZP_MISMATCH",
            Self::IssuerMismatch => "ISSUER_MISMATCH",
            Self::NoIssuerConfig => "NO_ISSUER_CONFIG",
            Self::SignatureValidationFailed => "SIGNATURE_VALIDATION_FAILED",
            Self::KeyNotFound => "KEY_NOT_FOUND",
            Self::UnsupportedAlgorithm => "UNSUPPORTED_ALGORITHM",
            Self::JwksFetchFailed => "JWKS_FETCH_FAILED",
            Self::JwksJsonParseFailed => "JWKS_JSON_PARSE_FAILED",
            Self::FailedToReadJwksFile => "FAILED_TO_READ_JWKS_FILE",
            Self::KeyRotationDetected => "KEY_ROTATION_DETECTED",
            Self::IssuerConfigSkipped => "ISSUER_CONFIG_SKIPPED",
            Self::IssuerConfigUnhealthy => "ISSUER_CONFIG_UNHEALTHY",
            Self::AccessTokenCreated => "ACCESS_TOKEN_CREATED",
            Self::IdTokenCreated => "ID_TOKEN_CREATED",
            Self::RefreshTokenCreated => "REFRESH_TOKEN_CREATED",
            Self::AccessTokenCacheHit => "ACCESS_TOKEN_CACHE_HIT",
        }
    }
}

impl std::fmt::Display for SecurityEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Monotonic per-event counters.
///
/// One `AtomicU64` per [`SecurityEventType`]; the hot path is a single
/// `fetch_add` with relaxed ordering. Observed counts across events form a
/// consistent but not linearizable snapshot.
///
/// # Example
///
/// ```rust
/// use tokenward::events::{SecurityEventCounter, SecurityEventType};
///
/// let counter = SecurityEventCounter::new();
/// counter.increment(SecurityEventType::TokenExpired);
/// assert_eq!(counter.count(SecurityEventType::TokenExpired), 1);
/// ```
#[derive(Debug, Default)]
pub struct SecurityEventCounter {
    counters: [AtomicU64; SecurityEventType::COUNT],
}

impl SecurityEventCounter {
    /// Create a counter with every event at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Increment the counter for `event` and return the new value.
    pub fn increment(&self, event: SecurityEventType) -> u64 {
        self.counters[event as usize].fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Current count for `event`.
    pub fn count(&self, event: SecurityEventType) -> u64 {
        self.counters[event as usize].load(Ordering::Relaxed)
    }

    /// Snapshot of all counters with a non-zero value.
    pub fn snapshot(&self) -> HashMap<SecurityEventType, u64> {
        SecurityEventType::ALL
            .iter()
            .filter_map(|&event| {
                let value = self.count(event);
                (value > 0).then_some((event, value))
            })
            .collect()
    }

    /// Reset the counter for `event` to zero.
    ///
    /// Intended for tests; production counters are monotonic.
    pub fn reset(&self, event: SecurityEventType) {
        self.counters[event as usize].store(0, Ordering::Relaxed);
    }
}
