//! Spotify Web API catalogue.
//!
//! Authenticates with the client-credentials flow and reads
//! `album.release_date` from `GET /v1/tracks/{id}`. The access token is
//! cached until shortly before it expires.
//!
//! Transport failures surface as [`PrepError::HttpRequest`], refused or
//! incomplete answers as [`PrepError::CatalogueLookup`].

use super::CatalogueLookup;
use crate::error::{PrepError, Result};
use parking_lot::Mutex;
use reqwest::blocking::Client;
use serde::Deserialize;
use std::time::{Duration, Instant};
use tracing::debug;

/// Default token endpoint.
const DEFAULT_TOKEN_URL: &str = "https://accounts.spotify.com/api/token";

/// Default Web API base URL.
const DEFAULT_API_BASE_URL: &str = "https://api.spotify.com/v1";

/// Default timeout for API requests in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Tokens are refreshed this long before they expire.
const TOKEN_EXPIRY_MARGIN_SECS: u64 = 30;

/// Environment variables holding the client credentials.
pub const CLIENT_ID_VAR: &str = "CLIENT_ID";
pub const CLIENT_SECRET_VAR: &str = "CLIENT_SECRET";

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    expires_in: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct TrackResponse {
    album: Option<Album>,
}

#[derive(Debug, Deserialize)]
struct Album {
    release_date: Option<String>,
}

struct CachedToken {
    value: String,
    expires_at: Instant,
}

/// Configuration for the Spotify catalogue.
#[derive(Debug, Clone)]
pub struct SpotifyConfig {
    pub token_url: String,
    pub api_base_url: String,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for SpotifyConfig {
    fn default() -> Self {
        Self {
            token_url: DEFAULT_TOKEN_URL.to_string(),
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl SpotifyConfig {
    /// Create a new configuration builder.
    pub fn builder() -> SpotifyConfigBuilder {
        SpotifyConfigBuilder::default()
    }
}

/// Builder for [`SpotifyConfig`].
#[derive(Default)]
pub struct SpotifyConfigBuilder {
    token_url: Option<String>,
    api_base_url: Option<String>,
    timeout_secs: Option<u64>,
}

impl SpotifyConfigBuilder {
    pub fn token_url(mut self, url: impl Into<String>) -> Self {
        self.token_url = Some(url.into());
        self
    }

    pub fn api_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = Some(url.into());
        self
    }

    pub fn timeout_secs(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = Some(timeout_secs);
        self
    }

    pub fn build(self) -> SpotifyConfig {
        SpotifyConfig {
            token_url: self.token_url.unwrap_or_else(|| DEFAULT_TOKEN_URL.to_string()),
            api_base_url: self
                .api_base_url
                .unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string()),
            timeout_secs: self.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS),
        }
    }
}

/// Release-date lookups against the Spotify Web API.
///
/// # Example
///
/// ```rust,ignore
/// use track_prep::catalogue::{SpotifyCatalogue, lookup_release_date};
///
/// let catalogue = SpotifyCatalogue::from_env()?;
/// let date = lookup_release_date(&catalogue, "0VjIjW4GlUZAMYd2vXMi3b");
/// ```
pub struct SpotifyCatalogue {
    client_id: String,
    client_secret: String,
    config: SpotifyConfig,
    client: Client,
    token: Mutex<Option<CachedToken>>,
}

impl SpotifyCatalogue {
    /// Create a catalogue client with default configuration.
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Result<Self> {
        Self::with_config(client_id, client_secret, SpotifyConfig::default())
    }

    /// Create a catalogue client with custom configuration.
    ///
    /// # Errors
    ///
    /// Returns [`PrepError::HttpRequest`] if the HTTP client cannot be created.
    pub fn with_config(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        config: SpotifyConfig,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            config,
            client,
            token: Mutex::new(None),
        })
    }

    /// Read `CLIENT_ID` / `CLIENT_SECRET` from the environment.
    pub fn from_env() -> Result<Self> {
        let client_id = std::env::var(CLIENT_ID_VAR)
            .map_err(|_| PrepError::InvalidConfig(format!("{} is not set", CLIENT_ID_VAR)))?;
        let client_secret = std::env::var(CLIENT_SECRET_VAR)
            .map_err(|_| PrepError::InvalidConfig(format!("{} is not set", CLIENT_SECRET_VAR)))?;
        Self::new(client_id, client_secret)
    }

    /// Raw release date of `track_id`, with the typed error on failure.
    pub fn fetch_release_date(&self, track_id: &str) -> Result<String> {
        let token = self.access_token()?;
        let url = format!("{}/tracks/{}", self.config.api_base_url, track_id);

        let response = self.client.get(&url).bearer_auth(token).send()?;

        if !response.status().is_success() {
            return Err(PrepError::CatalogueLookup(format!(
                "Spotify API error {} for track '{}'",
                response.status(),
                track_id
            )));
        }

        release_date_from_body(&response.text()?)
    }

    fn access_token(&self) -> Result<String> {
        let mut cached = self.token.lock();
        if let Some(token) = cached.as_ref().filter(|t| t.expires_at > Instant::now()) {
            return Ok(token.value.clone());
        }

        let response = self
            .client
            .post(&self.config.token_url)
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()?;

        let status = response.status();
        if !status.is_success() {
            return Err(PrepError::CatalogueLookup(format!(
                "Spotify token error {}: {}",
                status,
                response.text()?
            )));
        }

        let body: TokenResponse = response.json()?;
        let value = body
            .access_token
            .ok_or_else(|| {
                PrepError::CatalogueLookup("No access token in Spotify response".to_string())
            })?;
        let lifetime = body
            .expires_in
            .unwrap_or(0)
            .saturating_sub(TOKEN_EXPIRY_MARGIN_SECS);

        debug!("Obtained Spotify access token valid for {}s", lifetime);
        *cached = Some(CachedToken {
            value: value.clone(),
            expires_at: Instant::now() + Duration::from_secs(lifetime),
        });
        Ok(value)
    }
}

/// Extract `album.release_date` from a track response body.
fn release_date_from_body(body: &str) -> Result<String> {
    let track: TrackResponse = serde_json::from_str(body)?;
    track
        .album
        .and_then(|album| album.release_date)
        .ok_or_else(|| {
            PrepError::CatalogueLookup("Track response has no album release date".to_string())
        })
}

impl CatalogueLookup for SpotifyCatalogue {
    fn release_date(&self, track_id: &str) -> anyhow::Result<String> {
        Ok(self.fetch_release_date(track_id)?)
    }

    fn name(&self) -> &str {
        "Spotify"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_builder_defaults() {
        let config = SpotifyConfig::builder().timeout_secs(3).build();
        assert_eq!(config.token_url, DEFAULT_TOKEN_URL);
        assert_eq!(config.api_base_url, DEFAULT_API_BASE_URL);
        assert_eq!(config.timeout_secs, 3);
    }

    #[test]
    fn test_release_date_from_body() {
        let body = r#"{"id":"abc","album":{"name":"After Hours","release_date":"2020-03-20"}}"#;
        assert_eq!(release_date_from_body(body).unwrap(), "2020-03-20");

        let year_only = r#"{"album":{"release_date":"1987","release_date_precision":"year"}}"#;
        assert_eq!(release_date_from_body(year_only).unwrap(), "1987");
    }

    #[test]
    fn test_release_date_from_body_missing_album() {
        let code = |body: &str| release_date_from_body(body).unwrap_err().error_code();
        assert_eq!(code(r#"{"id":"abc"}"#), "CATALOGUE_LOOKUP_FAILED");
        assert_eq!(code(r#"{"album":{}}"#), "CATALOGUE_LOOKUP_FAILED");
        assert_eq!(code("not json"), "JSON_ERROR");
    }

    #[test]
    fn test_unreachable_catalogue_is_unknown() {
        let config = SpotifyConfig::builder()
            .token_url("http://127.0.0.1:9/token")
            .api_base_url("http://127.0.0.1:9/v1")
            .timeout_secs(1)
            .build();
        let catalogue = SpotifyCatalogue::with_config("id", "secret", config).unwrap();

        let err = catalogue.fetch_release_date("abc").unwrap_err();
        assert_eq!(err.error_code(), "HTTP_REQUEST_ERROR");
        assert!(!err.is_fatal());
        assert!(catalogue.release_date("abc").is_err());
        assert_eq!(
            super::super::lookup_release_date(&catalogue, "abc"),
            super::super::ReleaseDateLookup::Unknown
        );
    }
}
