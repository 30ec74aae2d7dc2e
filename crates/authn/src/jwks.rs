//! Retrieval of an issuer's published signing keys.
//!
//! [`KeySetFetcher`] is the seam between [`JwksKeyCache`](crate::JwksKeyCache)
//! and the network. [`HttpKeySetFetcher`] is the production implementation:
//! one shared [`reqwest::Client`] with bounded connect and read timeouts and
//! an overall deadline of their sum, fetching `{issuer}/.well-known/jwks.json`.

use std::time::Duration;

use async_trait::async_trait;
use jsonwebtoken::jwk::{Jwk, JwkSet};
use reqwest::header::ACCEPT;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use url::Url;

use crate::config::AuthnConfig;

/// Path of the key set document below an issuer URL.
pub const JWKS_PATH: &str = "/.well-known/jwks.json";

/// Largest key set document accepted.
pub const MAX_JWKS_BYTES: usize = 256 * 1024;

/// Why a key set could not be retrieved.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum KeyFetchError {
    /// The issuer does not form a valid key set URL.
    #[error("invalid key set URL: {0}")]
    InvalidUrl(String),

    /// The HTTP client could not be constructed.
    #[error("HTTP client setup failed: {0}")]
    Client(String),

    /// The issuer could not be reached.
    #[error("connection failed: {0}")]
    Connect(String),

    /// The connect timeout, read timeout or overall deadline elapsed.
    #[error("request timed out")]
    Timeout,

    /// The issuer answered with a non-success status.
    #[error("unexpected HTTP status {0}")]
    Status(u16),

    /// The response is not a usable key set document.
    #[error("invalid key set document: {0}")]
    Parse(String),
}

impl KeyFetchError {
    /// Returns `true` for failures that may clear up on their own:
    /// connection errors, timeouts and 5xx responses.
    ///
    /// Only transient failures may be answered from the fallback cache.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Connect(_) | Self::Timeout => true,
            Self::Status(status) => *status >= 500,
            Self::InvalidUrl(_) | Self::Client(_) | Self::Parse(_) => false,
        }
    }
}

/// Source of issuer key sets.
#[async_trait]
pub trait KeySetFetcher: Send + Sync {
    /// Fetches the current key set of `issuer`.
    async fn fetch(&self, issuer: &str) -> Result<JwkSet, KeyFetchError>;
}

/// Builds the key set URL of an issuer.
///
/// ```
/// use tenantgate_authn::jwks::jwks_url;
///
/// let url = jwks_url("https://idp/pools/us-east-1_ABC").expect("valid");
/// assert_eq!(url.as_str(), "https://idp/pools/us-east-1_ABC/.well-known/jwks.json");
/// ```
///
/// # Errors
///
/// Returns [`KeyFetchError::InvalidUrl`] unless the result is an absolute
/// `http` or `https` URL.
pub fn jwks_url(issuer: &str) -> Result<Url, KeyFetchError> {
    let base = issuer.trim_end_matches('/');
    let url = Url::parse(&format!("{base}{JWKS_PATH}"))
        .map_err(|e| KeyFetchError::InvalidUrl(format!("{issuer}: {e}")))?;
    match url.scheme() {
        "https" | "http" => Ok(url),
        other => Err(KeyFetchError::InvalidUrl(format!("unsupported scheme '{other}'"))),
    }
}

#[derive(Deserialize)]
struct RawKeySet {
    keys: Vec<Value>,
}

/// Parses a key set document.
///
/// Entries the signing library cannot represent are skipped rather than
/// failing the whole document.
///
/// # Errors
///
/// Returns [`KeyFetchError::Parse`] if the body is not a JSON object with a
/// `keys` array.
pub fn parse_jwks(body: &[u8]) -> Result<JwkSet, KeyFetchError> {
    let raw: RawKeySet =
        serde_json::from_slice(body).map_err(|e| KeyFetchError::Parse(e.to_string()))?;

    let keys = raw
        .keys
        .into_iter()
        .filter_map(|value| match serde_json::from_value::<Jwk>(value) {
            Ok(jwk) => Some(jwk),
            Err(e) => {
                tracing::debug!(error = %e, "Skipping undecodable JWK");
                None
            },
        })
        .collect();

    Ok(JwkSet { keys })
}

fn classify(err: &reqwest::Error) -> KeyFetchError {
    if err.is_timeout() {
        KeyFetchError::Timeout
    } else if err.is_decode() {
        KeyFetchError::Parse(err.to_string())
    } else {
        KeyFetchError::Connect(err.to_string())
    }
}

/// Fetches key sets over HTTPS.
///
/// Holds a single connection-pooling client; clone it to share.
#[derive(Debug, Clone)]
pub struct HttpKeySetFetcher {
    client: reqwest::Client,
}

impl HttpKeySetFetcher {
    /// Creates a fetcher with the given timeouts.
    ///
    /// `read_timeout` bounds each wait for data. The whole request, body
    /// included, must finish within `connect_timeout + read_timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`KeyFetchError::Client`] if the TLS backend cannot be
    /// initialised.
    pub fn new(connect_timeout: Duration, read_timeout: Duration) -> Result<Self, KeyFetchError> {
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .read_timeout(read_timeout)
            .timeout(connect_timeout.saturating_add(read_timeout))
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| KeyFetchError::Client(e.to_string()))?;
        Ok(Self { client })
    }

    /// Creates a fetcher with the timeouts of `config`.
    ///
    /// # Errors
    ///
    /// See [`new`](Self::new).
    pub fn from_config(config: &AuthnConfig) -> Result<Self, KeyFetchError> {
        Self::new(config.connect_timeout(), config.read_timeout())
    }

    /// Returns the shared HTTP client.
    #[must_use]
    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }
}

#[async_trait]
impl KeySetFetcher for HttpKeySetFetcher {
    #[tracing::instrument(skip(self))]
    async fn fetch(&self, issuer: &str) -> Result<JwkSet, KeyFetchError> {
        let url = jwks_url(issuer)?;

        let mut response = self
            .client
            .get(url)
            .header(ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| classify(&e))?;

        let status = response.status();
        if !status.is_success() {
            tracing::warn!(status = status.as_u16(), "Key set request failed");
            return Err(KeyFetchError::Status(status.as_u16()));
        }

        if let Some(length) = response.content_length()
            && length > MAX_JWKS_BYTES as u64
        {
            return Err(KeyFetchError::Parse(format!("document of {length} bytes is too large")));
        }

        // Chunked responses carry no length; stop reading once over the limit.
        let capacity = response.content_length().and_then(|len| usize::try_from(len).ok());
        let mut body = Vec::with_capacity(capacity.unwrap_or(0));
        while let Some(chunk) = response.chunk().await.map_err(|e| classify(&e))? {
            if body.len() + chunk.len() > MAX_JWKS_BYTES {
                return Err(KeyFetchError::Parse(format!(
                    "document is too large: more than {MAX_JWKS_BYTES} bytes"
                )));
            }
            body.extend_from_slice(&chunk);
        }

        let key_set = parse_jwks(&body)?;
        tracing::debug!(keys = key_set.keys.len(), "Fetched key set");
        Ok(key_set)
    }
}
