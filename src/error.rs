//! Error types for token validation and validator construction.
//!
//! Every validation failure is categorized by a [`SecurityEventType`] so that
//! callers can branch on the failure class and metrics can count it, while the
//! message carries a human-readable, non-sensitive detail. Raw token material
//! never appears in an error.

use crate::events::SecurityEventType;
use thiserror::Error;

/// Result alias for validation operations.
pub type Result<T> = std::result::Result<T, ValidationError>;

/// A categorized token validation failure.
///
/// Carries the [`SecurityEventType`] that classifies the failure, the claim
/// name when the failure is about a specific claim, and an optional cause
/// string for diagnostics.
///
/// # Example
///
/// ```rust
/// use tokenward::error::ValidationError;
/// use tokenward::events::SecurityEventType;
///
/// let err = ValidationError::new(SecurityEventType::TokenExpired, "token has expired");
/// assert_eq!(err.event_type(), SecurityEventType::TokenExpired);
/// ```
#[derive(Debug, Clone, Error)]
#[error("{}: {message}{}", event_type.name(), claim_name.as_deref().map(|c| format!(" (claim '{c}')")).unwrap_or_default())]
pub struct ValidationError {
    event_type: SecurityEventType,
    message: String,
    claim_name: Option<String>,
    cause: Option<String>,
}

impl ValidationError {
    /// Create a validation error with the given category and message.
    pub fn new(event_type: SecurityEventType, message: impl Into<String>) -> Self {
        Self {
            event_type,
            message: message.into(),
            claim_name: None,
            cause: None,
        }
    }

    /// Create a `MISSING_CLAIM` error for the named claim.
    pub fn missing_claim(claim: impl Into<String>) -> Self {
        let claim = claim.into();
        Self {
            event_type: SecurityEventType::MissingClaim,
            message: format!("required claim '{claim}' is missing"),
            claim_name: Some(claim),
            cause: None,
        }
    }

    /// Attach the claim name this error is about.
    #[must_use]
    pub fn with_claim(mut self, claim: impl Into<String>) -> Self {
        self.claim_name = Some(claim.into());
        self
    }

    /// Attach a non-sensitive cause description.
    #[must_use]
    pub fn with_cause(mut self, cause: impl Into<String>) -> Self {
        self.cause = Some(cause.into());
        self
    }

    /// The failure category.
    pub fn event_type(&self) -> SecurityEventType {
        self.event_type
    }

    /// The human-readable detail message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// The claim this failure is about, if any.
    pub fn claim_name(&self) -> Option<&str> {
        self.claim_name.as_deref()
    }

    /// The underlying cause description, if any.
    pub fn cause(&self) -> Option<&str> {
        self.cause.as_deref()
    }
}

/// Errors raised while building a validator or an issuer configuration.
///
/// Configuration problems fail loudly at construction time and prevent the
/// validator from being built at all.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An endpoint URL could not be parsed.
    #[error("invalid URL '{url}' for issuer '{issuer}': {reason}")]
    InvalidUrl {
        /// Issuer the URL belongs to.
        issuer: String,
        /// The offending URL string.
        url: String,
        /// Parse failure detail.
        reason: String,
    },

    /// An issuer was configured without any key source.
    #[error("issuer '{0}' has neither a JWKS URL, a well-known URL, a JWKS file nor an injected loader")]
    MissingKeySource(String),

    /// Two issuer configurations share the same issuer identifier.
    #[error("duplicate issuer identifier '{0}'")]
    DuplicateIssuer(String),

    /// The algorithm whitelist contains a name no supported algorithm matches.
    #[error("unknown signature algorithm '{0}' in whitelist")]
    UnknownAlgorithm(String),

    /// No issuer configuration was supplied at all.
    #[error("at least one issuer configuration is required")]
    NoIssuers,

    /// The HTTP client could not be constructed.
    #[error("failed to build HTTP client: {0}")]
    HttpClient(String),
}
