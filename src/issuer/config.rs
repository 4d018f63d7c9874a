//! Per-issuer validation configuration.
//!
//! An [`IssuerConfig`] is immutable once built. The builder validates
//! endpoints and algorithm names eagerly so misconfiguration fails validator
//! construction instead of the first validation call.

use crate::claims::{
    AudienceMapper, ClaimMapper, DateTimeMapper, KeycloakGroupsMapper, KeycloakRolesMapper,
    ScopeMapper,
};
use crate::error::ConfigError;
use crate::jwks::{
    AlgorithmWhitelist, FileJwksLoader, HttpJwksConfig, HttpJwksLoader, JwksLoader,
};
use crate::metrics::MeasurementMonitor;
use crate::runtime::{Clock, HttpClient, ReqwestHttpClient, Scheduler};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Runtime collaborators handed to issuer builders at validator construction.
pub(crate) struct BuildContext {
    pub http_override: Option<Arc<dyn HttpClient>>,
    pub clock: Arc<dyn Clock>,
    pub scheduler: Arc<dyn Scheduler>,
    pub monitor: Arc<MeasurementMonitor>,
}

/// A trusted issuer: its identity, key source and claim expectations.
///
/// Immutable once resolved; the resolver hands out shared references.
pub struct IssuerConfig {
    issuer_identifier: String,
    enabled: bool,
    jwks_loader: Arc<dyn JwksLoader>,
    expected_audience: HashSet<String>,
    expected_client_id: Option<String>,
    claim_mappers: HashMap<String, Arc<dyn ClaimMapper>>,
    algorithms: AlgorithmWhitelist,
}

impl std::fmt::Debug for IssuerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IssuerConfig")
            .field("issuer_identifier", &self.issuer_identifier)
            .field("enabled", &self.enabled)
            .field("expected_audience", &self.expected_audience)
            .field("expected_client_id", &self.expected_client_id)
            .finish_non_exhaustive()
    }
}

impl IssuerConfig {
    /// Start building a configuration for the given issuer identifier.
    pub fn builder(issuer_identifier: impl Into<String>) -> IssuerConfigBuilder {
        IssuerConfigBuilder::new(issuer_identifier)
    }

    /// The expected `iss` value, compared byte-exactly.
    pub fn issuer_identifier(&self) -> &str {
        &self.issuer_identifier
    }

    /// Whether this issuer participates in validation.
    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// The key source for this issuer.
    pub fn jwks_loader(&self) -> &Arc<dyn JwksLoader> {
        &self.jwks_loader
    }

    /// Audiences at least one of which must appear in `aud`. Empty disables
    /// the audience check.
    pub fn expected_audience(&self) -> &HashSet<String> {
        &self.expected_audience
    }

    /// The client id the `azp` claim must equal, when set.
    pub fn expected_client_id(&self) -> Option<&str> {
        self.expected_client_id.as_deref()
    }

    /// Claim mappers by claim name.
    pub fn claim_mappers(&self) -> &HashMap<String, Arc<dyn ClaimMapper>> {
        &self.claim_mappers
    }

    /// The accepted signature algorithms.
    pub fn algorithms(&self) -> &AlgorithmWhitelist {
        &self.algorithms
    }
}

/// Builder for [`IssuerConfig`].
///
/// # Example
///
/// ```rust
/// use tokenward::issuer::IssuerConfig;
///
/// let issuer = IssuerConfig::builder("https://issuer.example")
///     .jwks_url("https://issuer.example/jwks")
///     .audience("my-app")
///     .algorithms(["RS256", "ES256"]);
/// ```
#[derive(Clone)]
pub struct IssuerConfigBuilder {
    issuer_identifier: String,
    enabled: bool,
    jwks_url: Option<String>,
    well_known_url: Option<String>,
    jwks_file: Option<PathBuf>,
    loader: Option<Arc<dyn JwksLoader>>,
    expected_audience: HashSet<String>,
    expected_client_id: Option<String>,
    algorithm_names: Option<Vec<String>>,
    refresh_interval: Duration,
    connect_timeout: Duration,
    read_timeout: Duration,
    grace_period: Duration,
    max_retired_sets: usize,
    claim_mappers: HashMap<String, Arc<dyn ClaimMapper>>,
}

impl std::fmt::Debug for IssuerConfigBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IssuerConfigBuilder")
            .field("issuer_identifier", &self.issuer_identifier)
            .field("jwks_url", &self.jwks_url)
            .field("well_known_url", &self.well_known_url)
            .field("jwks_file", &self.jwks_file)
            .finish_non_exhaustive()
    }
}

impl IssuerConfigBuilder {
    /// Create a builder for the given issuer identifier.
    pub fn new(issuer_identifier: impl Into<String>) -> Self {
        Self {
            issuer_identifier: issuer_identifier.into(),
            enabled: true,
            jwks_url: None,
            well_known_url: None,
            jwks_file: None,
            loader: None,
            expected_audience: HashSet::new(),
            expected_client_id: None,
            algorithm_names: None,
            refresh_interval: Duration::from_secs(600),
            connect_timeout: Duration::from_secs(5),
            read_timeout: Duration::from_secs(10),
            grace_period: Duration::from_secs(300),
            max_retired_sets: 3,
            claim_mappers: HashMap::new(),
        }
    }

    /// Enable or disable this issuer. Disabled issuers are skipped during
    /// resolution without failing construction.
    #[must_use]
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Set a direct JWKS endpoint.
    #[must_use]
    pub fn jwks_url(mut self, url: impl Into<String>) -> Self {
        self.jwks_url = Some(url.into());
        self
    }

    /// Set an OIDC well-known endpoint from which `jwks_uri` is discovered.
    #[must_use]
    pub fn well_known_url(mut self, url: impl Into<String>) -> Self {
        self.well_known_url = Some(url.into());
        self
    }

    /// Load key material from a JWKS file instead of the network.
    #[must_use]
    pub fn jwks_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.jwks_file = Some(path.into());
        self
    }

    /// Inject a custom key loader, bypassing the built-in sources.
    #[must_use]
    pub fn loader(mut self, loader: Arc<dyn JwksLoader>) -> Self {
        self.loader = Some(loader);
        self
    }

    /// Add an accepted audience.
    #[must_use]
    pub fn audience(mut self, audience: impl Into<String>) -> Self {
        self.expected_audience.insert(audience.into());
        self
    }

    /// Require the `azp` claim to equal this client id.
    #[must_use]
    pub fn client_id(mut self, client_id: impl Into<String>) -> Self {
        self.expected_client_id = Some(client_id.into());
        self
    }

    /// Restrict accepted signature algorithms.
    #[must_use]
    pub fn algorithms<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.algorithm_names = Some(names.into_iter().map(Into::into).collect());
        self
    }

    /// Set the JWKS refresh cadence.
    #[must_use]
    pub fn refresh_interval(mut self, interval: Duration) -> Self {
        self.refresh_interval = interval;
        self
    }

    /// Set the HTTP connect timeout.
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the HTTP read timeout.
    #[must_use]
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Set how long rotated-out keys remain usable.
    #[must_use]
    pub fn key_rotation_grace_period(mut self, grace: Duration) -> Self {
        self.grace_period = grace;
        self
    }

    /// Set how many retired key sets are kept.
    #[must_use]
    pub fn max_retired_key_sets(mut self, count: usize) -> Self {
        self.max_retired_sets = count;
        self
    }

    /// Register (or override) the mapper for a claim.
    #[must_use]
    pub fn claim_mapper(mut self, claim: impl Into<String>, mapper: Arc<dyn ClaimMapper>) -> Self {
        self.claim_mappers.insert(claim.into(), mapper);
        self
    }

    /// The issuer identifier this builder configures.
    pub fn issuer_identifier(&self) -> &str {
        &self.issuer_identifier
    }

    fn parse_url(&self, url: &str) -> Result<Url, ConfigError> {
        Url::parse(url).map_err(|e| ConfigError::InvalidUrl {
            issuer: self.issuer_identifier.clone(),
            url: url.to_owned(),
            reason: e.to_string(),
        })
    }

    pub(crate) fn build(self, context: &BuildContext) -> Result<Arc<IssuerConfig>, ConfigError> {
        let algorithms = match &self.algorithm_names {
            Some(names) => AlgorithmWhitelist::from_names(names)?,
            None => AlgorithmWhitelist::default(),
        };

        let jwks_loader: Arc<dyn JwksLoader> = if let Some(loader) = self.loader.clone() {
            loader
        } else if let Some(path) = &self.jwks_file {
            Arc::new(FileJwksLoader::new(
                path.clone(),
                algorithms.clone(),
                Arc::clone(&context.clock),
            ))
        } else if self.jwks_url.is_some() || self.well_known_url.is_some() {
            let jwks_url = self.jwks_url.as_deref().map(|u| self.parse_url(u)).transpose()?;
            let well_known_url = self
                .well_known_url
                .as_deref()
                .map(|u| self.parse_url(u))
                .transpose()?;
            let http: Arc<dyn HttpClient> = match &context.http_override {
                Some(http) => Arc::clone(http),
                None => Arc::new(
                    ReqwestHttpClient::new(self.connect_timeout, self.read_timeout)
                        .map_err(|e| ConfigError::HttpClient(e.to_string()))?,
                ),
            };
            HttpJwksLoader::new(
                HttpJwksConfig {
                    jwks_url,
                    well_known_url,
                    refresh_interval: self.refresh_interval,
                    grace_period: self.grace_period,
                    max_retired_sets: self.max_retired_sets,
                    algorithms: algorithms.clone(),
                },
                http,
                Arc::clone(&context.clock),
                Arc::clone(&context.scheduler),
                Some(Arc::clone(&context.monitor)),
            )
        } else {
            return Err(ConfigError::MissingKeySource(self.issuer_identifier));
        };

        let mut claim_mappers = default_claim_mappers();
        claim_mappers.extend(self.claim_mappers);

        Ok(Arc::new(IssuerConfig {
            issuer_identifier: self.issuer_identifier,
            enabled: self.enabled,
            jwks_loader,
            expected_audience: self.expected_audience,
            expected_client_id: self.expected_client_id,
            claim_mappers,
            algorithms,
        }))
    }
}

/// The mapper registry applied when an issuer does not override a claim.
fn default_claim_mappers() -> HashMap<String, Arc<dyn ClaimMapper>> {
    let mut mappers: HashMap<String, Arc<dyn ClaimMapper>> = HashMap::new();
    let date_time: Arc<dyn ClaimMapper> = Arc::new(DateTimeMapper);
    for claim in ["exp", "nbf", "iat", "auth_time"] {
        mappers.insert(claim.to_owned(), Arc::clone(&date_time));
    }
    mappers.insert("aud".to_owned(), Arc::new(AudienceMapper));
    mappers.insert("scope".to_owned(), Arc::new(ScopeMapper));
    mappers.insert("roles".to_owned(), Arc::new(KeycloakRolesMapper));
    mappers.insert("groups".to_owned(), Arc::new(KeycloakGroupsMapper));
    mappers
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::MeasurementConfig;
    use crate::runtime::{SystemClock, TokioScheduler};

    fn context() -> BuildContext {
        BuildContext {
            http_override: None,
            clock: Arc::new(SystemClock),
            scheduler: Arc::new(TokioScheduler),
            monitor: Arc::new(MeasurementMonitor::new(&MeasurementConfig::default())),
        }
    }

    #[test]
    fn test_build_requires_a_key_source() {
        let err = IssuerConfig::builder("https://issuer.example")
            .build(&context())
            .unwrap_err();
        assert!(matches!(err, ConfigError::MissingKeySource(_)));
    }

    #[test]
    fn test_build_rejects_invalid_url() {
        let err = IssuerConfig::builder("https://issuer.example")
            .jwks_url("not a url")
            .build(&context())
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidUrl { .. }));
    }

    #[test]
    fn test_build_rejects_unknown_algorithm() {
        let err = IssuerConfig::builder("https://issuer.example")
            .jwks_url("https://issuer.example/jwks")
            .algorithms(["RS256", "BOGUS"])
            .build(&context())
            .unwrap_err();
        assert!(matches!(err, ConfigError::UnknownAlgorithm(_)));
    }

    #[test]
    fn test_build_wires_defaults_and_overrides() {
        let config = IssuerConfig::builder("https://issuer.example")
            .jwks_url("https://issuer.example/jwks")
            .audience("app")
            .client_id("client-1")
            .build(&context())
            .unwrap();

        assert_eq!(config.issuer_identifier(), "https://issuer.example");
        assert!(config.enabled());
        assert!(config.expected_audience().contains("app"));
        assert_eq!(config.expected_client_id(), Some("client-1"));
        // Default registry covers the temporal and Keycloak claims.
        assert!(config.claim_mappers().contains_key("exp"));
        assert!(config.claim_mappers().contains_key("roles"));
        assert!(config.algorithms().is_allowed("RS256"));
        assert!(!config.algorithms().is_allowed("HS256"));
    }
}
