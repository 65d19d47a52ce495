//! Port traits consumed by the reconciliation engine.
//!
//! Infrastructure crates implement these; the engine never sees HTTP,
//! pagination, or rate-limit bookkeeping. Conditions the engine treats as
//! normal control flow ("already exists", "not found", "stale version") are
//! returned as result variants so reconcilers branch on a tagged value
//! instead of inspecting errors.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};

use crate::{
    BranchName, CommitSha, DefaultBranch, FilePath, PullRequestRef, RepositoryError,
    RepositoryId, VersionToken,
};

// ---------------------------------------------------------------------------
// Credentials
// ---------------------------------------------------------------------------

/// A bearer token valid for at least the call it is fetched for.
///
/// Wrapped in [`SecretString`] so it never appears in `Debug` output or logs.
#[derive(Clone)]
pub struct AccessToken(SecretString);

impl AccessToken {
    /// Wraps a raw token value.
    pub fn new(token: impl Into<String>) -> Self {
        Self(SecretString::from(token.into()))
    }

    /// Returns the raw token for placing in an `Authorization` header.
    pub fn expose(&self) -> &str {
        self.0.expose_secret()
    }
}

impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("AccessToken(<redacted>)")
    }
}

/// Source of bearer tokens for the remote repository API.
///
/// Implementations may cache; callers fetch a token before every remote call
/// and assume nothing about its lifetime beyond that call.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// Returns a token valid for the next remote call.
    async fn token(&self) -> Result<AccessToken, RepositoryError>;
}

/// A [`TokenProvider`] that always returns the same token.
///
/// Used with personal access tokens and in tests.
#[derive(Debug, Clone)]
pub struct StaticTokenProvider {
    token: AccessToken,
}

impl StaticTokenProvider {
    /// Creates a provider returning `token` on every call.
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: AccessToken::new(token),
        }
    }
}

#[async_trait]
impl TokenProvider for StaticTokenProvider {
    async fn token(&self) -> Result<AccessToken, RepositoryError> {
        Ok(self.token.clone())
    }
}

// ---------------------------------------------------------------------------
// Repository results
// ---------------------------------------------------------------------------

/// Outcome of a branch-creation attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BranchCreation {
    /// The ref was created at the requested commit.
    Created,
    /// A ref with that name was already present; it was left untouched.
    AlreadyExisted,
}

/// Current content of a file on a branch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFile {
    /// Raw blob bytes.
    pub content: Vec<u8>,
    /// Revision identifier to pass back on update.
    pub version: VersionToken,
}

/// Outcome of a file lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileLookup {
    /// The path exists on the branch.
    Found(RemoteFile),
    /// No file at that path on the branch.
    NotFound,
}

/// Outcome of a compare-and-swap file update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileUpdate {
    /// The new content was committed.
    Updated,
    /// The supplied version token no longer names the current revision.
    Conflict,
}

// ---------------------------------------------------------------------------
// Repository client
// ---------------------------------------------------------------------------

/// The remote git-hosting operations the engine needs.
///
/// Every method receives the token to authenticate with; implementations do
/// not acquire credentials themselves.
#[async_trait]
pub trait RepositoryClient: Send + Sync {
    /// Returns the default branch and its tip commit.
    async fn default_branch_tip(
        &self,
        token: &AccessToken,
        repo: &RepositoryId,
    ) -> Result<DefaultBranch, RepositoryError>;

    /// Creates `refs/heads/<name>` at `from`, leaving an existing ref as is.
    async fn create_branch(
        &self,
        token: &AccessToken,
        repo: &RepositoryId,
        name: &BranchName,
        from: &CommitSha,
    ) -> Result<BranchCreation, RepositoryError>;

    /// Reads the blob at `path` on `branch`.
    async fn get_file(
        &self,
        token: &AccessToken,
        repo: &RepositoryId,
        path: &FilePath,
        branch: &BranchName,
    ) -> Result<FileLookup, RepositoryError>;

    /// Commits a new file at `path` on `branch`.
    async fn create_file(
        &self,
        token: &AccessToken,
        repo: &RepositoryId,
        path: &FilePath,
        content: &str,
        message: &str,
        branch: &BranchName,
    ) -> Result<(), RepositoryError>;

    /// Commits new content for an existing file, provided `version` is still
    /// the file's current revision.
    #[allow(clippy::too_many_arguments)]
    async fn update_file(
        &self,
        token: &AccessToken,
        repo: &RepositoryId,
        path: &FilePath,
        content: &str,
        message: &str,
        version: &VersionToken,
        branch: &BranchName,
    ) -> Result<FileUpdate, RepositoryError>;

    /// Lists open pull requests from `head` (`owner:branch`) into `base`.
    async fn list_pull_requests(
        &self,
        token: &AccessToken,
        repo: &RepositoryId,
        head: &str,
        base: &BranchName,
    ) -> Result<Vec<PullRequestRef>, RepositoryError>;

    /// Opens a pull request.
    async fn create_pull_request(
        &self,
        token: &AccessToken,
        repo: &RepositoryId,
        title: &str,
        body: &str,
        head: &str,
        base: &BranchName,
    ) -> Result<PullRequestRef, RepositoryError>;

    /// Replaces a pull request's title and body.
    async fn edit_pull_request(
        &self,
        token: &AccessToken,
        repo: &RepositoryId,
        pull_request: &PullRequestRef,
        title: &str,
        body: &str,
    ) -> Result<(), RepositoryError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn access_token_debug_is_redacted() {
        let token = AccessToken::new("ghs_secret");
        assert_eq!(format!("{token:?}"), "AccessToken(<redacted>)");
        assert_eq!(token.expose(), "ghs_secret");
    }

    #[tokio::test]
    async fn static_provider_returns_same_token() {
        let provider = StaticTokenProvider::new("abc");
        assert_eq!(provider.token().await.unwrap().expose(), "abc");
        assert_eq!(provider.token().await.unwrap().expose(), "abc");
    }
}
