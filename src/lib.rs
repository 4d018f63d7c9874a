//! # tokenward
//!
//! JWT validation for OAuth 2.0 / OpenID Connect access, ID and refresh
//! tokens: given a compact-serialized token and a set of trusted issuer
//! configurations, decide whether it is cryptographically authentic,
//! temporally valid and claim-compliant, returning typed content or one
//! precisely categorized error.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                       TokenValidator                         │
//! │  ┌──────────────┐  ┌────────────────┐  ┌─────────────────┐  │
//! │  │  Validation  │→ │ IssuerConfig   │→ │ HttpJwksLoader  │  │
//! │  │  pipeline    │  │ resolver       │  │ (per issuer)    │  │
//! │  └──────┬───────┘  └────────────────┘  └─────────────────┘  │
//! │         │            ┌──────────────┐  ┌─────────────────┐  │
//! │         └──────────→ │ AccessToken  │  │ Event counter + │  │
//! │                      │ cache        │  │ latency monitor │  │
//! │                      └──────────────┘  └─────────────────┘  │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! The validation pipeline walks a token through a fixed stage sequence and
//! short-circuits on the first failed invariant. Key material is fetched and
//! refreshed in the background per issuer; rotated-out keys stay usable for a
//! grace period so synchronized key rolls do not cause validation blips. The
//! hot path — after warm-up — takes no locks and performs no I/O.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use tokenward::{IssuerConfig, TokenValidator};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let validator = TokenValidator::builder()
//!     .issuer(
//!         IssuerConfig::builder("https://issuer.example")
//!             .well_known_url("https://issuer.example/.well-known/openid-configuration")
//!             .audience("my-api")
//!             .algorithms(["RS256", "ES256"]),
//!     )
//!     .build()?;
//!
//! let content = validator.validate("eyJhbGciOi...").await?;
//! println!("subject: {:?}, scopes: {:?}", content.subject(), content.scopes());
//! # Ok(())
//! # }
//! ```
//!
//! # Observability
//!
//! Every failure category and success increments a
//! [`SecurityEventCounter`](events::SecurityEventCounter) event, and every
//! pipeline stage records its latency into the
//! [`MeasurementMonitor`](metrics::MeasurementMonitor) ring buffers. Both are
//! exposed on the validator for metrics export.

#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]

pub mod cache;
pub mod claims;
pub mod error;
pub mod events;
pub mod issuer;
pub mod jwks;
pub mod metrics;
mod pipeline;
pub mod runtime;
pub mod token;
pub mod validator;

pub use cache::CacheConfig;
pub use error::{ConfigError, ValidationError};
pub use events::{SecurityEventCounter, SecurityEventType};
pub use issuer::{IssuerConfig, IssuerConfigBuilder};
pub use jwks::{AlgorithmWhitelist, JwksLoader, KeyInfo, LoaderStatus};
pub use metrics::{MeasurementConfig, MeasurementMonitor, MeasurementType};
pub use token::{
    AccessTokenContent, IdTokenContent, ParserConfig, RefreshTokenContent, TokenType,
};
pub use validator::{TokenValidator, TokenValidatorBuilder};
