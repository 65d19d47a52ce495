//! The repository a reconcile targets, bundled with the capabilities needed to
//! reach it.

use ingestion::{AccessToken, IngestError, RepositoryClient, RepositoryId, TokenProvider};

/// A target repository plus the client and token source used to reach it.
///
/// A fresh token is fetched before every remote call; providers are expected
/// to cache.
#[derive(Clone, Copy)]
pub struct RepositoryHandle<'a> {
    client: &'a dyn RepositoryClient,
    tokens: &'a dyn TokenProvider,
    repo: &'a RepositoryId,
}

impl<'a> RepositoryHandle<'a> {
    pub fn new(
        client: &'a dyn RepositoryClient,
        tokens: &'a dyn TokenProvider,
        repo: &'a RepositoryId,
    ) -> Self {
        Self {
            client,
            tokens,
            repo,
        }
    }

    pub fn client(&self) -> &'a dyn RepositoryClient {
        self.client
    }

    pub fn repo(&self) -> &'a RepositoryId {
        self.repo
    }

    /// Fetches a token for the next call.
    ///
    /// # Errors
    ///
    /// A provider failure is reported as [`IngestError::Remote`] for
    /// `operation`, the call the token was needed for.
    pub async fn token(&self, operation: &'static str) -> Result<AccessToken, IngestError> {
        self.tokens
            .token()
            .await
            .map_err(|source| IngestError::remote(operation, source))
    }
}
