//! [`RepositoryClient`] over the GitHub REST API.
//!
//! Each trait method maps onto one or two REST calls:
//!
//! | Method                 | Endpoint                                             |
//! |------------------------|------------------------------------------------------|
//! | `default_branch_tip`   | `GET /repos/{o}/{r}`, `GET /repos/{o}/{r}/branches/{b}` |
//! | `create_branch`        | `POST /repos/{o}/{r}/git/refs`                       |
//! | `get_file`             | `GET /repos/{o}/{r}/contents/{path}?ref={branch}`    |
//! | `create_file`/`update_file` | `PUT /repos/{o}/{r}/contents/{path}`            |
//! | `list_pull_requests`   | `GET /repos/{o}/{r}/pulls?state=open&head=&base=`    |
//! | `create_pull_request`  | `POST /repos/{o}/{r}/pulls`                          |
//! | `edit_pull_request`    | `PATCH /repos/{o}/{r}/pulls/{n}`                     |
//!
//! Files above the contents API's inline limit come back without content and
//! are fetched through `GET /repos/{o}/{r}/git/blobs/{sha}`.
//!
//! The `x-ratelimit-*` headers of every response are recorded; the latest
//! reading is available from [`GitHubRepositoryClient::rate_limit`].

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::Utc;
use ingestion::{
    AccessToken, BranchCreation, BranchName, CommitSha, DefaultBranch, FileLookup, FilePath,
    FileUpdate, PullRequestNumber, PullRequestRef, RemoteFile, RepositoryClient, RepositoryError,
    RepositoryId, VersionToken,
};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use reqwest::{Method, RequestBuilder, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::GitHubError;

/// Default REST API root.
pub const DEFAULT_API_URL: &str = "https://api.github.com";

const API_VERSION: &str = "2022-11-28";
const USER_AGENT: &str = concat!("repo-ingestion/", env!("CARGO_PKG_VERSION"));
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

// ---------------------------------------------------------------------------
// Shared HTTP plumbing
// ---------------------------------------------------------------------------

/// Builds the HTTP client used for every GitHub call.
pub(crate) fn http_client() -> Result<reqwest::Client, GitHubError> {
    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT, HeaderValue::from_static("application/vnd.github+json"));
    headers.insert("x-github-api-version", HeaderValue::from_static(API_VERSION));

    Ok(reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .default_headers(headers)
        .timeout(REQUEST_TIMEOUT)
        .build()?)
}

/// Parses the API root, rejecting URLs that cannot carry a path.
pub(crate) fn parse_api_base(api_base: &str) -> Result<Url, GitHubError> {
    let url = Url::parse(api_base)
        .map_err(|e| GitHubError::Configuration(format!("invalid API URL '{api_base}': {e}")))?;
    if url.cannot_be_a_base() {
        return Err(GitHubError::Configuration(format!(
            "API URL '{api_base}' cannot be used as a base"
        )));
    }
    Ok(url)
}

/// Appends percent-encoded path segments to `base`.
pub(crate) fn endpoint<'s>(
    base: &Url,
    segments: impl IntoIterator<Item = &'s str>,
) -> Result<Url, RepositoryError> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|()| RepositoryError::transport("API URL cannot be used as a base"))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

/// Builds the error for a non-success response from its parts.
pub(crate) fn error_from_parts(
    status: StatusCode,
    headers: &HeaderMap,
    body: &str,
    now_epoch: i64,
) -> RepositoryError {
    let error = RepositoryError::http(status.as_u16(), error_message(body));
    match retry_after(headers, now_epoch) {
        Some(after) => error.with_retry_after(after),
        None => error,
    }
}

/// Reads a non-success response into a [`RepositoryError`].
pub(crate) async fn failure(response: Response) -> RepositoryError {
    let status = response.status();
    let headers = response.headers().clone();
    let body = response.text().await.unwrap_or_default();
    error_from_parts(status, &headers, &body, Utc::now().timestamp())
}

/// Deserializes a success response body.
pub(crate) async fn read_json<T: DeserializeOwned>(
    response: Response,
) -> Result<T, RepositoryError> {
    response
        .json::<T>()
        .await
        .map_err(|e| RepositoryError::transport(format!("malformed GitHub response: {e}")))
}

fn transport(operation: &str, error: reqwest::Error) -> RepositoryError {
    RepositoryError::transport(format!("{operation}: {error}"))
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

fn error_message(body: &str) -> String {
    match serde_json::from_str::<ErrorBody>(body) {
        Ok(parsed) => parsed.message,
        Err(_) => body.trim().to_string(),
    }
}

fn header_number<T: std::str::FromStr>(headers: &HeaderMap, name: &str) -> Option<T> {
    headers.get(name)?.to_str().ok()?.trim().parse().ok()
}

/// Back-off hint from `retry-after`, or from the rate-limit reset time when
/// the primary limit is exhausted.
fn retry_after(headers: &HeaderMap, now_epoch: i64) -> Option<Duration> {
    if let Some(seconds) = header_number::<u64>(headers, "retry-after") {
        return Some(Duration::from_secs(seconds));
    }
    let remaining = header_number::<u64>(headers, "x-ratelimit-remaining")?;
    if remaining > 0 {
        return None;
    }
    let reset = header_number::<i64>(headers, "x-ratelimit-reset")?;
    Some(Duration::from_secs(u64::try_from(reset - now_epoch).unwrap_or(0)))
}

// ---------------------------------------------------------------------------
// Rate limit
// ---------------------------------------------------------------------------

/// A reading of the primary rate limit, taken from response headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RateLimit {
    /// Requests allowed per window.
    pub limit: u64,
    /// Requests left in the current window.
    pub remaining: u64,
    /// Requests spent in the current window.
    pub used: Option<u64>,
    /// Unix time at which the window resets.
    pub reset: Option<i64>,
}

impl RateLimit {
    /// Parses the `x-ratelimit-*` headers; `None` when they are absent.
    pub fn from_headers(headers: &HeaderMap) -> Option<Self> {
        Some(Self {
            limit: header_number(headers, "x-ratelimit-limit")?,
            remaining: header_number(headers, "x-ratelimit-remaining")?,
            used: header_number(headers, "x-ratelimit-used"),
            reset: header_number(headers, "x-ratelimit-reset"),
        })
    }
}

// ---------------------------------------------------------------------------
// Response payloads
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct RepositoryPayload {
    default_branch: String,
}

#[derive(Debug, Deserialize)]
struct BranchPayload {
    name: String,
    commit: CommitPayload,
}

#[derive(Debug, Deserialize)]
struct CommitPayload {
    sha: String,
}

#[derive(Debug, Deserialize)]
struct ContentPayload {
    #[serde(rename = "type")]
    kind: String,
    sha: String,
    #[serde(default)]
    encoding: Option<String>,
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BlobPayload {
    content: String,
    encoding: String,
}

#[derive(Debug, Deserialize)]
struct PullPayload {
    number: u64,
    html_url: String,
    title: String,
    #[serde(default)]
    body: Option<String>,
    head: PullHeadPayload,
    base: PullBasePayload,
}

#[derive(Debug, Deserialize)]
struct PullHeadPayload {
    label: String,
}

#[derive(Debug, Deserialize)]
struct PullBasePayload {
    #[serde(rename = "ref")]
    name: String,
}

impl From<PullPayload> for PullRequestRef {
    fn from(value: PullPayload) -> Self {
        PullRequestRef {
            number: PullRequestNumber::new(value.number),
            head_ref: value.head.label,
            base_ref: value.base.name,
            title: value.title,
            body: value.body.unwrap_or_default(),
            url: value.html_url,
        }
    }
}

fn decode_base64(encoded: &str) -> Result<Vec<u8>, RepositoryError> {
    let compact: String = encoded.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    STANDARD
        .decode(compact)
        .map_err(|e| RepositoryError::transport(format!("invalid base64 file content: {e}")))
}

/// Decodes inline content, or returns `None` when the API omitted it.
fn inline_content(payload: &ContentPayload) -> Result<Option<Vec<u8>>, RepositoryError> {
    if payload.kind != "file" {
        return Err(RepositoryError::transport(format!(
            "expected a file but found a {}",
            payload.kind
        )));
    }
    match (payload.encoding.as_deref(), payload.content.as_deref()) {
        (Some("base64"), Some(content)) => decode_base64(content).map(Some),
        _ => Ok(None),
    }
}

fn is_existing_ref(body: &str) -> bool {
    error_message(body).to_ascii_lowercase().contains("already exists")
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// GitHub REST implementation of [`RepositoryClient`].
#[derive(Debug)]
pub struct GitHubRepositoryClient {
    http: reqwest::Client,
    api_base: Url,
    rate_limit: Mutex<Option<RateLimit>>,
}

impl GitHubRepositoryClient {
    /// Creates a client rooted at `api_base` (e.g. [`DEFAULT_API_URL`]).
    ///
    /// # Errors
    ///
    /// [`GitHubError::Configuration`] for an unusable URL;
    /// [`GitHubError::Client`] if the HTTP client cannot be built.
    pub fn new(api_base: &str) -> Result<Self, GitHubError> {
        Ok(Self {
            http: http_client()?,
            api_base: parse_api_base(api_base)?,
            rate_limit: Mutex::new(None),
        })
    }

    /// The most recent rate-limit reading, if any response carried one.
    pub fn rate_limit(&self) -> Option<RateLimit> {
        *self
            .rate_limit
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn repo_url(&self, repo: &RepositoryId, rest: &[&str]) -> Result<Url, RepositoryError> {
        endpoint(
            &self.api_base,
            ["repos", repo.owner(), repo.name()]
                .into_iter()
                .chain(rest.iter().copied()),
        )
    }

    fn contents_url(&self, repo: &RepositoryId, path: &FilePath) -> Result<Url, RepositoryError> {
        endpoint(
            &self.api_base,
            ["repos", repo.owner(), repo.name(), "contents"]
                .into_iter()
                .chain(path.as_str().split('/').filter(|s| !s.is_empty())),
        )
    }

    fn request(&self, method: Method, url: Url, token: &AccessToken) -> RequestBuilder {
        self.http.request(method, url).bearer_auth(token.expose())
    }

    async fn send(
        &self,
        operation: &'static str,
        request: RequestBuilder,
    ) -> Result<Response, RepositoryError> {
        let response = request.send().await.map_err(|e| transport(operation, e))?;
        if let Some(reading) = RateLimit::from_headers(response.headers()) {
            tracing::debug!(
                operation,
                status = response.status().as_u16(),
                remaining = reading.remaining,
                limit = reading.limit,
                "GitHub rate limit"
            );
            if reading.remaining == 0 {
                tracing::warn!(operation, reset = ?reading.reset, "GitHub rate limit exhausted");
            }
            *self
                .rate_limit
                .lock()
                .unwrap_or_else(PoisonError::into_inner) = Some(reading);
        }
        Ok(response)
    }

    async fn read_blob(
        &self,
        token: &AccessToken,
        repo: &RepositoryId,
        sha: &str,
    ) -> Result<Vec<u8>, RepositoryError> {
        let url = self.repo_url(repo, &["git", "blobs", sha])?;
        let response = self
            .send("read blob", self.request(Method::GET, url, token))
            .await?;
        if !response.status().is_success() {
            return Err(failure(response).await);
        }
        let blob: BlobPayload = read_json(response).await?;
        if blob.encoding != "base64" {
            return Err(RepositoryError::transport(format!(
                "unexpected blob encoding '{}'",
                blob.encoding
            )));
        }
        decode_base64(&blob.content)
    }

    #[allow(clippy::too_many_arguments)]
    async fn put_contents(
        &self,
        operation: &'static str,
        token: &AccessToken,
        repo: &RepositoryId,
        path: &FilePath,
        content: &str,
        message: &str,
        version: Option<&VersionToken>,
        branch: &BranchName,
    ) -> Result<Response, RepositoryError> {
        let mut body = json!({
            "message": message,
            "content": STANDARD.encode(content.as_bytes()),
            "branch": branch.as_str(),
        });
        if let Some(version) = version {
            body["sha"] = json!(version.as_str());
        }
        let url = self.contents_url(repo, path)?;
        self.send(operation, self.request(Method::PUT, url, token).json(&body))
            .await
    }
}

#[async_trait]
impl RepositoryClient for GitHubRepositoryClient {
    async fn default_branch_tip(
        &self,
        token: &AccessToken,
        repo: &RepositoryId,
    ) -> Result<DefaultBranch, RepositoryError> {
        let url = self.repo_url(repo, &[])?;
        let response = self
            .send("get repository", self.request(Method::GET, url, token))
            .await?;
        if !response.status().is_success() {
            return Err(failure(response).await);
        }
        let repository: RepositoryPayload = read_json(response).await?;

        let url = self.repo_url(repo, &["branches", repository.default_branch.as_str()])?;
        let response = self
            .send("get branch", self.request(Method::GET, url, token))
            .await?;
        if !response.status().is_success() {
            return Err(failure(response).await);
        }
        let branch: BranchPayload = read_json(response).await?;

        Ok(DefaultBranch {
            name: BranchName::new(branch.name)
                .ok_or_else(|| RepositoryError::transport("GitHub returned an empty branch name"))?,
            tip: CommitSha::new(branch.commit.sha)
                .ok_or_else(|| RepositoryError::transport("GitHub returned an empty commit sha"))?,
        })
    }

    async fn create_branch(
        &self,
        token: &AccessToken,
        repo: &RepositoryId,
        name: &BranchName,
        from: &CommitSha,
    ) -> Result<BranchCreation, RepositoryError> {
        let url = self.repo_url(repo, &["git", "refs"])?;
        let body = json!({
            "ref": format!("refs/heads/{name}"),
            "sha": from.as_str(),
        });
        let response = self
            .send("create ref", self.request(Method::POST, url, token).json(&body))
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(BranchCreation::Created);
        }
        if status != StatusCode::UNPROCESSABLE_ENTITY {
            return Err(failure(response).await);
        }

        let headers = response.headers().clone();
        let text = response.text().await.unwrap_or_default();
        if is_existing_ref(&text) {
            Ok(BranchCreation::AlreadyExisted)
        } else {
            Err(error_from_parts(status, &headers, &text, Utc::now().timestamp()))
        }
    }

    async fn get_file(
        &self,
        token: &AccessToken,
        repo: &RepositoryId,
        path: &FilePath,
        branch: &BranchName,
    ) -> Result<FileLookup, RepositoryError> {
        let mut url = self.contents_url(repo, path)?;
        url.query_pairs_mut().append_pair("ref", branch.as_str());
        let response = self
            .send("get contents", self.request(Method::GET, url, token))
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(FileLookup::NotFound);
        }
        if !response.status().is_success() {
            return Err(failure(response).await);
        }

        let payload: ContentPayload = read_json(response).await?;
        let content = match inline_content(&payload)? {
            Some(content) => content,
            None => self.read_blob(token, repo, &payload.sha).await?,
        };
        let version = VersionToken::new(payload.sha)
            .ok_or_else(|| RepositoryError::transport("GitHub returned an empty blob sha"))?;

        Ok(FileLookup::Found(RemoteFile { content, version }))
    }

    async fn create_file(
        &self,
        token: &AccessToken,
        repo: &RepositoryId,
        path: &FilePath,
        content: &str,
        message: &str,
        branch: &BranchName,
    ) -> Result<(), RepositoryError> {
        let response = self
            .put_contents("create file", token, repo, path, content, message, None, branch)
            .await?;
        if !response.status().is_success() {
            return Err(failure(response).await);
        }
        Ok(())
    }

    async fn update_file(
        &self,
        token: &AccessToken,
        repo: &RepositoryId,
        path: &FilePath,
        content: &str,
        message: &str,
        version: &VersionToken,
        branch: &BranchName,
    ) -> Result<FileUpdate, RepositoryError> {
        let response = self
            .put_contents(
                "update file",
                token,
                repo,
                path,
                content,
                message,
                Some(version),
                branch,
            )
            .await?;
        let status = response.status();
        if status.is_success() {
            Ok(FileUpdate::Updated)
        } else if status == StatusCode::CONFLICT {
            Ok(FileUpdate::Conflict)
        } else {
            Err(failure(response).await)
        }
    }

    async fn list_pull_requests(
        &self,
        token: &AccessToken,
        repo: &RepositoryId,
        head: &str,
        base: &BranchName,
    ) -> Result<Vec<PullRequestRef>, RepositoryError> {
        let mut url = self.repo_url(repo, &["pulls"])?;
        url.query_pairs_mut()
            .append_pair("state", "open")
            .append_pair("head", head)
            .append_pair("base", base.as_str())
            .append_pair("per_page", "100");
        let response = self
            .send("list pulls", self.request(Method::GET, url, token))
            .await?;
        if !response.status().is_success() {
            return Err(failure(response).await);
        }
        let pulls: Vec<PullPayload> = read_json(response).await?;
        Ok(pulls.into_iter().map(PullRequestRef::from).collect())
    }

    async fn create_pull_request(
        &self,
        token: &AccessToken,
        repo: &RepositoryId,
        title: &str,
        body: &str,
        head: &str,
        base: &BranchName,
    ) -> Result<PullRequestRef, RepositoryError> {
        let url = self.repo_url(repo, &["pulls"])?;
        let payload = json!({
            "title": title,
            "body": body,
            "head": head,
            "base": base.as_str(),
        });
        let response = self
            .send("create pull", self.request(Method::POST, url, token).json(&payload))
            .await?;
        if !response.status().is_success() {
            return Err(failure(response).await);
        }
        let pull: PullPayload = read_json(response).await?;
        Ok(pull.into())
    }

    async fn edit_pull_request(
        &self,
        token: &AccessToken,
        repo: &RepositoryId,
        pull_request: &PullRequestRef,
        title: &str,
        body: &str,
    ) -> Result<(), RepositoryError> {
        let number = pull_request.number.as_u64().to_string();
        let url = self.repo_url(repo, &["pulls", number.as_str()])?;
        let payload = json!({ "title": title, "body": body });
        let response = self
            .send("edit pull", self.request(Method::PATCH, url, token).json(&payload))
            .await?;
        if !response.status().is_success() {
            return Err(failure(response).await);
        }
        Ok(())
    }
}
