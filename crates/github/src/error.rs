//! GitHub adapter error types.

use ingestion::RepositoryError;
use thiserror::Error;

/// Errors raised while constructing or authenticating the GitHub adapter.
///
/// Request-time failures cross the port boundary as [`RepositoryError`]; this
/// type covers what can go wrong before a request is ever sent.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum GitHubError {
    /// Invalid adapter configuration.
    #[error("GitHub configuration error: {0}")]
    Configuration(String),

    /// The App private key could not be read or parsed, or signing failed.
    #[error("GitHub App JWT error: {0}")]
    Jwt(String),

    /// The HTTP client could not be built.
    #[error("GitHub HTTP client error: {0}")]
    Client(String),
}

impl From<jsonwebtoken::errors::Error> for GitHubError {
    fn from(value: jsonwebtoken::errors::Error) -> Self {
        Self::Jwt(value.to_string())
    }
}

impl From<reqwest::Error> for GitHubError {
    fn from(value: reqwest::Error) -> Self {
        Self::Client(value.to_string())
    }
}

impl From<GitHubError> for RepositoryError {
    fn from(value: GitHubError) -> Self {
        RepositoryError::transport(value.to_string())
    }
}
