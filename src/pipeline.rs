//! The staged validation pipeline.
//!
//! A token walks a fixed sequence of stages — format check, decoding, issuer
//! extraction, cache lookup, issuer resolution, header validation, signature
//! verification, claim mapping, claim validation, cache store — and never
//! advances past a stage whose invariant failed. The first failure
//! short-circuits the run; it is fatal to that token, never to the validator,
//! and increments exactly one security event.
//!
//! After warm-up the only `await` point is issuer resolution's lock-free
//! snapshot read; every other stage is synchronous and allocation-light.

use crate::cache::AccessTokenCache;
use crate::claims::{ClaimValue, MappedClaim};
use crate::error::{Result, ValidationError};
use crate::events::{SecurityEventCounter, SecurityEventType};
use crate::issuer::{IssuerConfig, IssuerConfigResolver};
use crate::jwks::algorithm_name;
use crate::metrics::{MeasurementMonitor, MeasurementType};
use crate::runtime::{Clock, Scheduler};
use crate::token::content::ClaimSet;
use crate::token::{
    AccessTokenContent, DecodedToken, IdTokenContent, RefreshTokenContent, TokenDecoder, TokenType,
};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// Claims whose absence fails validation.
const REQUIRED_CLAIMS: [&str; 3] = ["sub", "exp", "iat"];

/// Claims whose absence is logged but never fatal.
const RECOMMENDED_CLAIMS: [&str; 1] = ["jti"];

pub(crate) struct PipelineValidator {
    decoder: TokenDecoder,
    resolver: Arc<IssuerConfigResolver>,
    cache: Arc<AccessTokenCache>,
    counter: Arc<SecurityEventCounter>,
    monitor: Arc<MeasurementMonitor>,
    clock: Arc<dyn Clock>,
    scheduler: Arc<dyn Scheduler>,
    clock_skew: chrono::Duration,
}

impl std::fmt::Debug for PipelineValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineValidator")
            .field("decoder", &self.decoder)
            .field("resolver", &self.resolver)
            .field("clock_skew", &self.clock_skew)
            .finish_non_exhaustive()
    }
}

impl PipelineValidator {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        decoder: TokenDecoder,
        resolver: Arc<IssuerConfigResolver>,
        cache: Arc<AccessTokenCache>,
        counter: Arc<SecurityEventCounter>,
        monitor: Arc<MeasurementMonitor>,
        clock: Arc<dyn Clock>,
        scheduler: Arc<dyn Scheduler>,
        clock_skew: std::time::Duration,
    ) -> Self {
        Self {
            decoder,
            resolver,
            cache,
            counter,
            monitor,
            clock,
            scheduler,
            clock_skew: chrono::Duration::from_std(clock_skew).unwrap_or(chrono::Duration::zero()),
        }
    }

    /// Validate an access token, consulting and feeding the content cache.
    pub(crate) async fn validate_access_token(&self, raw: &str) -> Result<AccessTokenContent> {
        let total = Instant::now();
        let outcome = self.run_access(raw).await;
        self.monitor
            .record(MeasurementType::CompleteValidation, total.elapsed());
        self.finish(outcome)
    }

    /// Validate an ID token. No caching.
    pub(crate) async fn validate_id_token(&self, raw: &str) -> Result<IdTokenContent> {
        let total = Instant::now();
        let outcome = self
            .run_uncached(raw, TokenType::Id)
            .await
            .map(|claim_set| IdTokenContent { claim_set });
        self.monitor
            .record(MeasurementType::CompleteValidation, total.elapsed());
        self.finish(outcome)
    }

    /// Validate a refresh token. No caching, no audience enforcement.
    pub(crate) async fn validate_refresh_token(&self, raw: &str) -> Result<RefreshTokenContent> {
        let total = Instant::now();
        let outcome = self
            .run_uncached(raw, TokenType::Refresh)
            .await
            .map(|claim_set| RefreshTokenContent { claim_set });
        self.monitor
            .record(MeasurementType::CompleteValidation, total.elapsed());
        self.finish(outcome)
    }

    /// Exactly-once event accounting for the whole pipeline: a failed run
    /// increments the event of its first (and only) error here, a successful
    /// run already counted its creation event.
    fn finish<T>(&self, outcome: Result<T>) -> Result<T> {
        if let Err(error) = &outcome {
            self.counter.increment(error.event_type());
            debug!(event = error.event_type().name(), "token validation failed");
        }
        outcome
    }

    async fn run_access(&self, raw: &str) -> Result<AccessTokenContent> {
        let decoded = self.decode_stages(raw)?;
        let issuer = self.extract_issuer(&decoded)?;

        // Stage 4: cache lookup, access tokens only.
        let lookup = Instant::now();
        let hit = self.cache.lookup(raw);
        self.monitor
            .record(MeasurementType::CacheLookup, lookup.elapsed());
        if let Some(content) = hit {
            self.counter
                .increment(SecurityEventType::AccessTokenCacheHit);
            debug!("access token served from cache");
            return Ok(content);
        }

        let config = self.resolve_issuer(&issuer).await?;
        let claim_set = self.verify_and_build(&decoded, &config, TokenType::Access)?;
        let content = AccessTokenContent { claim_set };

        // Stage 10: cache store.
        let store = Instant::now();
        self.cache.ensure_evictor(&*self.scheduler);
        self.cache.store(raw, &content);
        self.monitor
            .record(MeasurementType::CacheStore, store.elapsed());

        self.counter
            .increment(SecurityEventType::AccessTokenCreated);
        Ok(content)
    }

    async fn run_uncached(&self, raw: &str, token_type: TokenType) -> Result<ClaimSet> {
        let decoded = self.decode_stages(raw)?;
        let issuer = self.extract_issuer(&decoded)?;
        let config = self.resolve_issuer(&issuer).await?;
        let claim_set = self.verify_and_build(&decoded, &config, token_type)?;
        self.counter.increment(match token_type {
            TokenType::Access => SecurityEventType::AccessTokenCreated,
            TokenType::Id => SecurityEventType::IdTokenCreated,
            TokenType::Refresh => SecurityEventType::RefreshTokenCreated,
        });
        Ok(claim_set)
    }

    /// Stages 1 and 2.
    fn decode_stages(&self, raw: &str) -> Result<DecodedToken> {
        let format = Instant::now();
        let jwt = self.decoder.check_format(raw);
        self.monitor
            .record(MeasurementType::TokenFormatCheck, format.elapsed());
        let jwt = jwt?;

        let parsing = Instant::now();
        let decoded = self.decoder.decode(jwt);
        self.monitor
            .record(MeasurementType::TokenParsing, parsing.elapsed());
        decoded
    }

    /// Stage 3.
    fn extract_issuer(&self, decoded: &DecodedToken) -> Result<String> {
        let started = Instant::now();
        let issuer = decoded
            .issuer()
            .map(str::to_owned)
            .ok_or_else(|| ValidationError::missing_claim("iss"));
        self.monitor
            .record(MeasurementType::IssuerExtraction, started.elapsed());
        issuer
    }

    /// Stage 5.
    async fn resolve_issuer(&self, issuer: &str) -> Result<Arc<IssuerConfig>> {
        let started = Instant::now();
        let config = self.resolver.resolve(issuer).await;
        self.monitor
            .record(MeasurementType::IssuerConfigResolution, started.elapsed());
        config
    }

    /// Stages 6 through 9.
    fn verify_and_build(
        &self,
        decoded: &DecodedToken,
        config: &IssuerConfig,
        token_type: TokenType,
    ) -> Result<ClaimSet> {
        let header = Instant::now();
        let kid = self.validate_header(decoded, config);
        self.monitor
            .record(MeasurementType::HeaderValidation, header.elapsed());
        let kid = kid?;

        let signature = Instant::now();
        let verified = self.verify_signature(decoded, config, kid.as_deref());
        self.monitor
            .record(MeasurementType::SignatureValidation, signature.elapsed());
        verified?;

        let building = Instant::now();
        let claim_set = self.build_claim_set(decoded, config);
        self.monitor
            .record(MeasurementType::TokenBuilding, building.elapsed());
        let claim_set = claim_set?;

        let claims = Instant::now();
        let validated = self.validate_claims(&claim_set, config, token_type);
        self.monitor
            .record(MeasurementType::ClaimsValidation, claims.elapsed());
        validated?;

        Ok(claim_set)
    }

    /// Stage 6: `alg` whitelisted, `typ` acceptable, `kid` extracted.
    ///
    /// `alg` and `kid` must be ASCII; other header fields may carry any
    /// string content.
    fn validate_header(
        &self,
        decoded: &DecodedToken,
        config: &IssuerConfig,
    ) -> Result<Option<String>> {
        let alg = decoded
            .header_str("alg")
            .filter(|alg| alg.is_ascii())
            .ok_or_else(|| {
                ValidationError::new(
                    SecurityEventType::UnsupportedAlgorithm,
                    "header has no usable alg parameter",
                )
            })?;
        if !config.algorithms().is_allowed(alg) {
            return Err(ValidationError::new(
                SecurityEventType::UnsupportedAlgorithm,
                format!("algorithm '{}' is not whitelisted", alg.to_ascii_uppercase()),
            ));
        }
        if let Some(typ) = decoded.header_str("typ") {
            if typ != "JWT" {
                return Err(ValidationError::new(
                    SecurityEventType::UnsupportedAlgorithm,
                    "header typ is present but not 'JWT'",
                ));
            }
        }
        let kid = decoded.header_str("kid");
        if let Some(kid) = kid {
            if !kid.is_ascii() {
                return Err(ValidationError::new(
                    SecurityEventType::UnsupportedAlgorithm,
                    "header kid contains non-ASCII characters",
                ));
            }
        }
        Ok(kid.map(str::to_owned))
    }

    /// Stage 7: key lookup and signature verification over the exact signed
    /// byte range. A missing key never triggers a key reload; refresh is
    /// timer-driven.
    fn verify_signature(
        &self,
        decoded: &DecodedToken,
        config: &IssuerConfig,
        kid: Option<&str>,
    ) -> Result<()> {
        let lookup = Instant::now();
        let key = config.jwks_loader().get_key_info(kid);
        self.monitor
            .record(MeasurementType::KeyLookup, lookup.elapsed());

        let key = key.ok_or_else(|| {
            ValidationError::new(
                SecurityEventType::KeyNotFound,
                match kid {
                    Some(kid) => format!("no verification key for kid '{kid}'"),
                    None => "no default verification key available".to_owned(),
                },
            )
        })?;

        // The token's alg must be the one the key verifies; a mismatch can
        // never produce a valid signature, so fail it explicitly.
        let token_alg = decoded.header_str("alg").unwrap_or_default();
        if !token_alg.eq_ignore_ascii_case(algorithm_name(key.algorithm)) {
            return Err(ValidationError::new(
                SecurityEventType::SignatureValidationFailed,
                "token algorithm does not match the verification key",
            ));
        }

        match jsonwebtoken::crypto::verify(
            decoded.signature_b64(),
            decoded.signed_data(),
            &key.decoding_key,
            key.algorithm,
        ) {
            Ok(true) => Ok(()),
            Ok(false) => Err(ValidationError::new(
                SecurityEventType::SignatureValidationFailed,
                "signature does not verify",
            )),
            Err(e) => Err(ValidationError::new(
                SecurityEventType::SignatureValidationFailed,
                "signature verification failed",
            )
            .with_cause(e.to_string())),
        }
    }

    /// Stage 8: apply mappers and construct the claim set.
    ///
    /// Claims with a registered mapper go through it; other scalar claims are
    /// kept as strings; unmapped structured claims stay available through the
    /// raw payload only.
    fn build_claim_set(&self, decoded: &DecodedToken, config: &IssuerConfig) -> Result<ClaimSet> {
        let payload = decoded.payload();
        let mut claims = HashMap::new();

        for (name, mapper) in config.claim_mappers() {
            match mapper.map(payload, name)? {
                MappedClaim::Present(value) => {
                    claims.insert(name.clone(), value);
                }
                MappedClaim::Absent => {}
            }
        }

        for (name, value) in payload {
            if claims.contains_key(name) || config.claim_mappers().contains_key(name) {
                continue;
            }
            let mapped = match value {
                Value::String(s) => ClaimValue::string(s.clone()),
                Value::Number(n) => match n.as_i64() {
                    Some(i) => ClaimValue::integer(i),
                    None => ClaimValue::string(n.to_string()),
                },
                Value::Bool(b) => ClaimValue::boolean(*b),
                Value::Null | Value::Array(_) | Value::Object(_) => continue,
            };
            claims.insert(name.clone(), mapped);
        }

        Ok(ClaimSet {
            claims,
            raw_token: decoded.raw().to_owned(),
            raw_payload: payload.clone(),
        })
    }

    /// Stage 9: temporal and semantic claim validation.
    fn validate_claims(
        &self,
        claim_set: &ClaimSet,
        config: &IssuerConfig,
        token_type: TokenType,
    ) -> Result<()> {
        let now = self.clock.now();
        let claims = &claim_set.claims;

        let exp = claims
            .get("exp")
            .and_then(ClaimValue::as_date_time)
            .ok_or_else(|| ValidationError::missing_claim("exp"))?;
        if now >= exp + self.clock_skew {
            return Err(ValidationError::new(
                SecurityEventType::TokenExpired,
                "token has expired",
            )
            .with_claim("exp"));
        }

        if let Some(nbf) = claims.get("nbf").and_then(ClaimValue::as_date_time) {
            if nbf - self.clock_skew > now {
                return Err(ValidationError::new(
                    SecurityEventType::TokenNbfFuture,
                    "token is not yet valid",
                )
                .with_claim("nbf"));
            }
        }

        let issuer = claims.get("iss").and_then(ClaimValue::as_str).unwrap_or("");
        if issuer != config.issuer_identifier() {
            return Err(ValidationError::new(
                SecurityEventType::IssuerMismatch,
                "iss does not match the issuer configuration",
            )
            .with_claim("iss"));
        }

        // Refresh tokens commonly carry no audience; skip the check for them.
        if token_type != TokenType::Refresh && !config.expected_audience().is_empty() {
            let audiences = claims
                .get("aud")
                .and_then(ClaimValue::as_list)
                .unwrap_or(&[]);
            let matched = audiences
                .iter()
                .any(|aud| config.expected_audience().contains(aud));
            if !matched {
                return Err(ValidationError::new(
                    SecurityEventType::AudienceMismatch,
                    "aud does not intersect the expected audience",
                )
                .with_claim("aud"));
            }
        }

        if token_type != TokenType::Refresh {
            if let Some(expected) = config.expected_client_id() {
                let azp = claims.get("azp").and_then(ClaimValue::as_str);
                if azp != Some(expected) {
                    return Err(ValidationError::new(
                        SecurityEventType::AzpMismatch,
                        "azp does not match the expected client id",
                    )
                    .with_claim("azp"));
                }
            }
        }

        for claim in REQUIRED_CLAIMS {
            if !claims.contains_key(claim) {
                return Err(ValidationError::missing_claim(claim));
            }
        }

        for claim in RECOMMENDED_CLAIMS {
            if !claims.contains_key(claim) {
                self.counter
                    .increment(SecurityEventType::MissingRecommendedElement);
                warn!(claim, "recommended claim is absent");
            }
        }

        Ok(())
    }
}
