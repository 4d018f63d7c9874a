//! HTTP client abstraction for key-material fetches.

use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Errors from the HTTP layer.
///
/// Network failures are collapsed to a description string; the JWKS loader
/// treats every variant the same way (fetch failed, keep cached keys).
#[derive(Debug, Clone, Error)]
pub enum HttpClientError {
    /// The client could not be constructed.
    #[error("failed to build HTTP client: {0}")]
    Build(String),
    /// The request did not produce a response.
    #[error("request to {url} failed: {reason}")]
    Request {
        /// Target URL.
        url: String,
        /// Failure description.
        reason: String,
    },
}

/// A minimal HTTP response: status, lowercase header names, raw body.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response headers with lowercased names.
    pub headers: HashMap<String, String>,
    /// Raw response body.
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// Whether the status is in the 2xx range.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// A header value by lowercase name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }
}

/// Asynchronous HTTP GET, the only verb the key-material subsystem needs.
///
/// Implementations own TLS configuration and timeouts.
#[async_trait]
pub trait HttpClient: Send + Sync + std::fmt::Debug {
    /// Perform a GET with the given extra request headers.
    async fn get(
        &self,
        url: &Url,
        headers: &[(String, String)],
    ) -> Result<HttpResponse, HttpClientError>;
}

/// [`HttpClient`] backed by `reqwest` with rustls TLS.
#[derive(Debug, Clone)]
pub struct ReqwestHttpClient {
    client: reqwest::Client,
}

impl ReqwestHttpClient {
    /// Build a client with the given connect and read timeouts.
    pub fn new(connect_timeout: Duration, read_timeout: Duration) -> Result<Self, HttpClientError> {
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .timeout(read_timeout)
            .build()
            .map_err(|e| HttpClientError::Build(e.to_string()))?;
        Ok(Self { client })
    }

    /// Wrap an existing `reqwest` client.
    pub fn from_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl HttpClient for ReqwestHttpClient {
    async fn get(
        &self,
        url: &Url,
        headers: &[(String, String)],
    ) -> Result<HttpResponse, HttpClientError> {
        let mut request = self.client.get(url.clone());
        for (name, value) in headers {
            request = request.header(name, value);
        }
        let response = request.send().await.map_err(|e| HttpClientError::Request {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_ascii_lowercase(), v.to_owned()))
            })
            .collect();
        let body = response
            .bytes()
            .await
            .map_err(|e| HttpClientError::Request {
                url: url.to_string(),
                reason: e.to_string(),
            })?
            .to_vec();

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}
