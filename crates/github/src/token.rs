//! GitHub App installation tokens.
//!
//! The App signs a short-lived RS256 JWT with its private key and exchanges
//! it for an installation token via
//! `POST /app/installations/{id}/access_tokens`. Installation tokens live for
//! an hour; the provider caches one and refreshes it once less than
//! [`REFRESH_MARGIN_SECS`] remain before expiry.

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Duration as TimeDelta, Utc};
use ingestion::{AccessToken, RepositoryError, TokenProvider};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::{Method, Url};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::client::{endpoint, failure, http_client, parse_api_base, read_json};
use crate::GitHubError;

/// A cached token is reused only while more than this many seconds remain.
pub const REFRESH_MARGIN_SECS: i64 = 60;

/// App JWT lifetime. GitHub caps this at ten minutes.
const JWT_LIFETIME_SECS: i64 = 600;

/// Back-dating applied to `iat` to absorb clock drift.
const JWT_CLOCK_SKEW_SECS: i64 = 60;

#[derive(Debug, Serialize, PartialEq, Eq)]
struct AppClaims {
    iat: i64,
    exp: i64,
    iss: String,
}

impl AppClaims {
    fn issued_at(app_id: u64, now: DateTime<Utc>) -> Self {
        let now = now.timestamp();
        Self {
            iat: now - JWT_CLOCK_SKEW_SECS,
            exp: now + JWT_LIFETIME_SECS,
            iss: app_id.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct InstallationTokenPayload {
    token: String,
    expires_at: DateTime<Utc>,
}

#[derive(Clone)]
struct CachedToken {
    token: AccessToken,
    expires_at: DateTime<Utc>,
}

impl CachedToken {
    fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        self.expires_at - now > TimeDelta::seconds(REFRESH_MARGIN_SECS)
    }
}

/// [`TokenProvider`] that authenticates as a GitHub App installation.
///
/// Refreshes are serialized through the cache lock, so concurrent requests
/// share one exchange instead of each minting a token.
pub struct GitHubAppTokenProvider {
    app_id: u64,
    installation_id: u64,
    key: EncodingKey,
    http: reqwest::Client,
    api_base: Url,
    cache: Mutex<Option<CachedToken>>,
}

impl std::fmt::Debug for GitHubAppTokenProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitHubAppTokenProvider")
            .field("app_id", &self.app_id)
            .field("installation_id", &self.installation_id)
            .field("api_base", &self.api_base.as_str())
            .finish_non_exhaustive()
    }
}

impl GitHubAppTokenProvider {
    /// Creates a provider from a PEM-encoded RSA private key.
    ///
    /// # Errors
    ///
    /// [`GitHubError::Jwt`] if the key does not parse;
    /// [`GitHubError::Configuration`] for an unusable API URL.
    pub fn new(
        app_id: u64,
        installation_id: u64,
        private_key_pem: &[u8],
        api_base: &str,
    ) -> Result<Self, GitHubError> {
        Ok(Self {
            app_id,
            installation_id,
            key: EncodingKey::from_rsa_pem(private_key_pem)?,
            http: http_client()?,
            api_base: parse_api_base(api_base)?,
            cache: Mutex::new(None),
        })
    }

    /// Reads the private key from `path` and calls [`Self::new`].
    ///
    /// # Errors
    ///
    /// [`GitHubError::Jwt`] if the file cannot be read, plus those of
    /// [`Self::new`].
    pub fn from_key_file(
        app_id: u64,
        installation_id: u64,
        path: &Path,
        api_base: &str,
    ) -> Result<Self, GitHubError> {
        let pem = std::fs::read(path).map_err(|e| {
            GitHubError::Jwt(format!("cannot read private key {}: {e}", path.display()))
        })?;
        Self::new(app_id, installation_id, &pem, api_base)
    }

    fn app_jwt(&self) -> Result<String, GitHubError> {
        let claims = AppClaims::issued_at(self.app_id, Utc::now());
        Ok(jsonwebtoken::encode(
            &Header::new(Algorithm::RS256),
            &claims,
            &self.key,
        )?)
    }

    async fn exchange(&self) -> Result<CachedToken, RepositoryError> {
        let jwt = self.app_jwt()?;
        let installation = self.installation_id.to_string();
        let url = endpoint(
            &self.api_base,
            ["app", "installations", installation.as_str(), "access_tokens"],
        )?;

        let response = self
            .http
            .request(Method::POST, url)
            .bearer_auth(jwt)
            .send()
            .await
            .map_err(|e| RepositoryError::transport(format!("installation token: {e}")))?;
        if !response.status().is_success() {
            return Err(failure(response).await);
        }

        let payload: InstallationTokenPayload = read_json(response).await?;
        tracing::info!(
            installation_id = self.installation_id,
            expires_at = %payload.expires_at,
            "Obtained GitHub installation token"
        );
        Ok(CachedToken {
            token: AccessToken::new(payload.token),
            expires_at: payload.expires_at,
        })
    }
}

#[async_trait]
impl TokenProvider for GitHubAppTokenProvider {
    async fn token(&self) -> Result<AccessToken, RepositoryError> {
        let mut cache = self.cache.lock().await;
        if let Some(cached) = cache.as_ref().filter(|c| c.is_fresh(Utc::now())) {
            return Ok(cached.token.clone());
        }

        let fresh = self.exchange().await?;
        let token = fresh.token.clone();
        *cache = Some(fresh);
        Ok(token)
    }
}
