//! The public validator facade.
//!
//! A [`TokenValidator`] owns the whole validation machinery: the issuer
//! resolver with its key loaders, the access-token cache, the security event
//! counter and the latency monitor. Construction ingests every configuration
//! eagerly and fails loudly on misconfiguration; validation itself is a total
//! function returning either typed content or one categorized error.
//!
//! # Example
//!
//! ```rust,no_run
//! use tokenward::{IssuerConfig, TokenValidator};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let validator = TokenValidator::builder()
//!     .issuer(
//!         IssuerConfig::builder("https://issuer.example")
//!             .jwks_url("https://issuer.example/protocol/openid-connect/certs")
//!             .audience("my-api"),
//!     )
//!     .build()?;
//!
//! match validator.validate("eyJhbGci...").await {
//!     Ok(content) => println!("subject: {:?}", content.subject()),
//!     Err(error) => println!("rejected: {error}"),
//! }
//! # Ok(())
//! # }
//! ```

use crate::cache::{AccessTokenCache, CacheConfig};
use crate::error::{ConfigError, Result};
use crate::events::SecurityEventCounter;
use crate::issuer::config::BuildContext;
use crate::issuer::{IssuerConfigBuilder, IssuerConfigResolver};
use crate::metrics::{MeasurementConfig, MeasurementMonitor};
use crate::pipeline::PipelineValidator;
use crate::runtime::{Clock, HttpClient, Scheduler, SystemClock, TokioScheduler};
use crate::token::{
    AccessTokenContent, IdTokenContent, ParserConfig, RefreshTokenContent, TokenDecoder,
};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Validates OAuth 2.0 / OIDC tokens against a set of trusted issuers.
///
/// Cheap to share behind an `Arc`; `validate` is re-entrant and designed for
/// massive caller concurrency. Call [`close`](Self::close) (or drop the
/// validator) to stop background refresh and eviction tasks.
#[derive(Debug)]
pub struct TokenValidator {
    pipeline: PipelineValidator,
    resolver: Arc<IssuerConfigResolver>,
    cache: Arc<AccessTokenCache>,
    counter: Arc<SecurityEventCounter>,
    monitor: Arc<MeasurementMonitor>,
    closed: AtomicBool,
}

impl TokenValidator {
    /// Start building a validator.
    pub fn builder() -> TokenValidatorBuilder {
        TokenValidatorBuilder::default()
    }

    /// Validate an access token.
    pub async fn validate(&self, raw: &str) -> Result<AccessTokenContent> {
        self.pipeline.validate_access_token(raw).await
    }

    /// Validate an ID token.
    pub async fn validate_id_token(&self, raw: &str) -> Result<IdTokenContent> {
        self.pipeline.validate_id_token(raw).await
    }

    /// Validate a refresh token.
    pub async fn validate_refresh_token(&self, raw: &str) -> Result<RefreshTokenContent> {
        self.pipeline.validate_refresh_token(raw).await
    }

    /// The shared security event counter.
    pub fn security_event_counter(&self) -> Arc<SecurityEventCounter> {
        Arc::clone(&self.counter)
    }

    /// The shared latency monitor.
    pub fn performance_monitor(&self) -> Arc<MeasurementMonitor> {
        Arc::clone(&self.monitor)
    }

    /// Stop background key refresh and cache eviction. Idempotent.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.resolver.close();
        self.cache.close();
    }
}

impl Drop for TokenValidator {
    fn drop(&mut self) {
        self.close();
    }
}

/// Builder for [`TokenValidator`].
pub struct TokenValidatorBuilder {
    issuers: Vec<IssuerConfigBuilder>,
    parser: ParserConfig,
    cache: CacheConfig,
    measurement: MeasurementConfig,
    clock_skew: Duration,
    http_client: Option<Arc<dyn HttpClient>>,
    clock: Option<Arc<dyn Clock>>,
    scheduler: Option<Arc<dyn Scheduler>>,
    counter: Option<Arc<SecurityEventCounter>>,
}

impl Default for TokenValidatorBuilder {
    fn default() -> Self {
        Self {
            issuers: Vec::new(),
            parser: ParserConfig::default(),
            cache: CacheConfig::default(),
            measurement: MeasurementConfig::default(),
            clock_skew: Duration::from_secs(60),
            http_client: None,
            clock: None,
            scheduler: None,
            counter: None,
        }
    }
}

impl std::fmt::Debug for TokenValidatorBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenValidatorBuilder")
            .field("issuers", &self.issuers.len())
            .field("parser", &self.parser)
            .field("cache", &self.cache)
            .field("clock_skew", &self.clock_skew)
            .finish_non_exhaustive()
    }
}

impl TokenValidatorBuilder {
    /// Add a trusted issuer.
    #[must_use]
    pub fn issuer(mut self, issuer: IssuerConfigBuilder) -> Self {
        self.issuers.push(issuer);
        self
    }

    /// Set the token parsing limits.
    #[must_use]
    pub fn parser(mut self, parser: ParserConfig) -> Self {
        self.parser = parser;
        self
    }

    /// Configure the access-token cache.
    #[must_use]
    pub fn cache(mut self, cache: CacheConfig) -> Self {
        self.cache = cache;
        self
    }

    /// Configure latency sampling.
    #[must_use]
    pub fn measurement(mut self, measurement: MeasurementConfig) -> Self {
        self.measurement = measurement;
        self
    }

    /// Tolerance applied to `exp` and `nbf` checks.
    #[must_use]
    pub fn clock_skew(mut self, skew: Duration) -> Self {
        self.clock_skew = skew;
        self
    }

    /// Use one HTTP client for every issuer instead of per-issuer clients.
    #[must_use]
    pub fn http_client(mut self, http: Arc<dyn HttpClient>) -> Self {
        self.http_client = Some(http);
        self
    }

    /// Substitute the time source.
    #[must_use]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Substitute the background task scheduler.
    #[must_use]
    pub fn scheduler(mut self, scheduler: Arc<dyn Scheduler>) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    /// Share a counter across validators instead of creating a fresh one.
    #[must_use]
    pub fn security_event_counter(mut self, counter: Arc<SecurityEventCounter>) -> Self {
        self.counter = Some(counter);
        self
    }

    /// Build the validator, failing loudly on any configuration problem.
    pub fn build(self) -> std::result::Result<TokenValidator, ConfigError> {
        if self.issuers.is_empty() {
            return Err(ConfigError::NoIssuers);
        }
        let mut seen = HashSet::new();
        for issuer in &self.issuers {
            if !seen.insert(issuer.issuer_identifier().to_owned()) {
                return Err(ConfigError::DuplicateIssuer(
                    issuer.issuer_identifier().to_owned(),
                ));
            }
        }

        let counter = self
            .counter
            .unwrap_or_else(|| Arc::new(SecurityEventCounter::new()));
        let monitor = Arc::new(MeasurementMonitor::new(&self.measurement));
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let scheduler = self.scheduler.unwrap_or_else(|| Arc::new(TokioScheduler));

        let context = BuildContext {
            http_override: self.http_client,
            clock: Arc::clone(&clock),
            scheduler: Arc::clone(&scheduler),
            monitor: Arc::clone(&monitor),
        };
        let configs = self
            .issuers
            .into_iter()
            .map(|issuer| issuer.build(&context))
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let resolver = Arc::new(IssuerConfigResolver::new(configs, Arc::clone(&counter)));
        let cache = Arc::new(AccessTokenCache::new(self.cache, Arc::clone(&clock)));
        let pipeline = PipelineValidator::new(
            TokenDecoder::new(self.parser),
            Arc::clone(&resolver),
            Arc::clone(&cache),
            Arc::clone(&counter),
            Arc::clone(&monitor),
            clock,
            scheduler,
            self.clock_skew,
        );

        Ok(TokenValidator {
            pipeline,
            resolver,
            cache,
            counter,
            monitor,
            closed: AtomicBool::new(false),
        })
    }
}
