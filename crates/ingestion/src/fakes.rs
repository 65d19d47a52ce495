//! In-memory fakes for the port traits (testing only).
//!
//! [`InMemoryRepository`] behaves like a single-owner GitHub repository: refs,
//! blobs with version tokens, and pull requests. Every call is recorded so
//! tests can assert which remote operations a reconcile performed.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use crate::ports::{
    AccessToken, BranchCreation, FileLookup, FileUpdate, RemoteFile, RepositoryClient,
};
use crate::{
    BranchName, CommitSha, DefaultBranch, FilePath, PullRequestNumber, PullRequestRef,
    RepositoryError, RepositoryId, VersionToken,
};

/// One recorded call against [`InMemoryRepository`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordedCall {
    DefaultBranchTip,
    CreateBranch { name: String },
    GetFile { path: String },
    CreateFile { path: String },
    UpdateFile { path: String },
    ListPullRequests { head: String, base: String },
    CreatePullRequest { head: String },
    EditPullRequest { number: u64 },
}

impl RecordedCall {
    /// Returns `true` for calls that change remote state.
    pub fn is_write(&self) -> bool {
        matches!(
            self,
            Self::CreateBranch { .. }
                | Self::CreateFile { .. }
                | Self::UpdateFile { .. }
                | Self::CreatePullRequest { .. }
                | Self::EditPullRequest { .. }
        )
    }
}

#[derive(Debug)]
struct StoredFile {
    content: Vec<u8>,
    version: u64,
}

#[derive(Debug)]
struct State {
    default_branch: String,
    branches: BTreeMap<String, String>,
    files: HashMap<(String, String), StoredFile>,
    pull_requests: Vec<PullRequestRef>,
    next_version: u64,
    next_pull_number: u64,
    calls: Vec<RecordedCall>,
    failures: HashMap<&'static str, RepositoryError>,
    racing_paths: HashSet<String>,
    required_token: Option<String>,
}

/// In-memory repository implementing [`RepositoryClient`].
#[derive(Debug)]
pub struct InMemoryRepository {
    state: Mutex<State>,
}

impl Default for InMemoryRepository {
    fn default() -> Self {
        Self::new("main", "0000000000000000000000000000000000000001")
    }
}

impl InMemoryRepository {
    /// Creates a repository whose default branch `default_branch` points at `tip`.
    pub fn new(default_branch: &str, tip: &str) -> Self {
        let mut branches = BTreeMap::new();
        branches.insert(default_branch.to_string(), tip.to_string());
        Self {
            state: Mutex::new(State {
                default_branch: default_branch.to_string(),
                branches,
                files: HashMap::new(),
                pull_requests: Vec::new(),
                next_version: 1,
                next_pull_number: 1,
                calls: Vec::new(),
                failures: HashMap::new(),
                racing_paths: HashSet::new(),
                required_token: None,
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Rejects calls whose token is not `token` with HTTP 401.
    pub fn require_token(&self, token: &str) {
        self.state().required_token = Some(token.to_string());
    }

    /// Makes every call to `operation` fail with `error`.
    ///
    /// Operation names match the [`RecordedCall`] variants in snake case
    /// (e.g. `"create_branch"`, `"get_file"`).
    pub fn fail(&self, operation: &'static str, error: RepositoryError) {
        self.state().failures.insert(operation, error);
    }

    /// Stops failing `operation`.
    pub fn recover(&self, operation: &'static str) {
        self.state().failures.remove(operation);
    }

    /// Simulates another writer committing to `path` between this engine's
    /// read and its update: the next update of `path` sees a newer revision.
    pub fn race_next_update(&self, path: &str) {
        self.state().racing_paths.insert(path.to_string());
    }

    /// Stores a file directly, bypassing call recording.
    pub fn seed_file(&self, branch: &str, path: &str, content: &str) {
        let mut state = self.state();
        let version = state.bump_version();
        state.files.insert(
            (branch.to_string(), path.to_string()),
            StoredFile {
                content: content.as_bytes().to_vec(),
                version,
            },
        );
    }

    /// Opens a pull request directly, bypassing call recording.
    pub fn seed_pull_request(
        &self,
        head: &str,
        base: &str,
        title: &str,
        body: &str,
    ) -> PullRequestRef {
        let mut state = self.state();
        state.open_pull_request(head, base, title, body)
    }

    /// Overwrites a pull request body, as an operator editing it by hand would.
    pub fn set_pull_request_body(&self, number: PullRequestNumber, body: &str) {
        if let Some(pr) = self
            .state()
            .pull_requests
            .iter_mut()
            .find(|pr| pr.number == number)
        {
            pr.body = body.to_string();
        }
    }

    /// Current content of `path` on `branch`, if present and valid UTF-8.
    pub fn file(&self, branch: &str, path: &str) -> Option<String> {
        self.state()
            .files
            .get(&(branch.to_string(), path.to_string()))
            .and_then(|f| String::from_utf8(f.content.clone()).ok())
    }

    /// Tip of `branch`, if it exists.
    pub fn branch_tip(&self, branch: &str) -> Option<String> {
        self.state().branches.get(branch).cloned()
    }

    /// All pull requests.
    pub fn pull_requests(&self) -> Vec<PullRequestRef> {
        self.state().pull_requests.clone()
    }

    /// Every call made so far, in order.
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.state().calls.clone()
    }

    /// Number of calls that changed remote state.
    pub fn write_count(&self) -> usize {
        self.state().calls.iter().filter(|c| c.is_write()).count()
    }

    /// Forgets recorded calls.
    pub fn clear_calls(&self) {
        self.state().calls.clear();
    }

    fn enter(
        &self,
        token: &AccessToken,
        operation: &'static str,
        call: RecordedCall,
    ) -> Result<MutexGuard<'_, State>, RepositoryError> {
        let mut state = self.state();
        state.calls.push(call);
        if let Some(required) = &state.required_token {
            if required != token.expose() {
                return Err(RepositoryError::http(401, "Bad credentials"));
            }
        }
        if let Some(error) = state.failures.get(operation) {
            return Err(error.clone());
        }
        Ok(state)
    }
}

impl State {
    fn bump_version(&mut self) -> u64 {
        let version = self.next_version;
        self.next_version += 1;
        version
    }

    fn open_pull_request(
        &mut self,
        head: &str,
        base: &str,
        title: &str,
        body: &str,
    ) -> PullRequestRef {
        let number = self.next_pull_number;
        self.next_pull_number += 1;
        let pr = PullRequestRef {
            number: PullRequestNumber::new(number),
            head_ref: head.to_string(),
            base_ref: base.to_string(),
            title: title.to_string(),
            body: body.to_string(),
            url: format!("https://github.example/pull/{number}"),
        };
        self.pull_requests.push(pr.clone());
        pr
    }
}

fn invalid(field: &str) -> RepositoryError {
    RepositoryError::http(422, format!("{field} is invalid"))
}

#[async_trait]
impl RepositoryClient for InMemoryRepository {
    async fn default_branch_tip(
        &self,
        token: &AccessToken,
        _repo: &RepositoryId,
    ) -> Result<DefaultBranch, RepositoryError> {
        let state = self.enter(token, "default_branch_tip", RecordedCall::DefaultBranchTip)?;
        let tip = state
            .branches
            .get(&state.default_branch)
            .ok_or_else(|| RepositoryError::http(404, "Branch not found"))?;
        Ok(DefaultBranch {
            name: BranchName::new(state.default_branch.clone()).ok_or_else(|| invalid("branch"))?,
            tip: CommitSha::new(tip.clone()).ok_or_else(|| invalid("sha"))?,
        })
    }

    async fn create_branch(
        &self,
        token: &AccessToken,
        _repo: &RepositoryId,
        name: &BranchName,
        from: &CommitSha,
    ) -> Result<BranchCreation, RepositoryError> {
        let mut state = self.enter(
            token,
            "create_branch",
            RecordedCall::CreateBranch {
                name: name.to_string(),
            },
        )?;
        if state.branches.contains_key(name.as_str()) {
            return Ok(BranchCreation::AlreadyExisted);
        }
        state
            .branches
            .insert(name.to_string(), from.to_string());

        // The new ref shares the default branch's tree.
        let default_branch = state.default_branch.clone();
        let inherited: Vec<_> = state
            .files
            .iter()
            .filter(|((branch, _), _)| *branch == default_branch)
            .map(|((_, path), file)| (path.clone(), file.content.clone(), file.version))
            .collect();
        for (path, content, version) in inherited {
            state
                .files
                .insert((name.to_string(), path), StoredFile { content, version });
        }
        Ok(BranchCreation::Created)
    }

    async fn get_file(
        &self,
        token: &AccessToken,
        _repo: &RepositoryId,
        path: &FilePath,
        branch: &BranchName,
    ) -> Result<FileLookup, RepositoryError> {
        let state = self.enter(
            token,
            "get_file",
            RecordedCall::GetFile {
                path: path.to_string(),
            },
        )?;
        Ok(
            match state
                .files
                .get(&(branch.to_string(), path.to_string()))
            {
                Some(file) => FileLookup::Found(RemoteFile {
                    content: file.content.clone(),
                    version: VersionToken::new(format!("v{}", file.version))
                        .ok_or_else(|| invalid("sha"))?,
                }),
                None => FileLookup::NotFound,
            },
        )
    }

    async fn create_file(
        &self,
        token: &AccessToken,
        _repo: &RepositoryId,
        path: &FilePath,
        content: &str,
        _message: &str,
        branch: &BranchName,
    ) -> Result<(), RepositoryError> {
        let mut state = self.enter(
            token,
            "create_file",
            RecordedCall::CreateFile {
                path: path.to_string(),
            },
        )?;
        if !state.branches.contains_key(branch.as_str()) {
            return Err(RepositoryError::http(404, "Branch not found"));
        }
        let key = (branch.to_string(), path.to_string());
        if state.files.contains_key(&key) {
            return Err(invalid("sha"));
        }
        let version = state.bump_version();
        state.files.insert(
            key,
            StoredFile {
                content: content.as_bytes().to_vec(),
                version,
            },
        );
        Ok(())
    }

    async fn update_file(
        &self,
        token: &AccessToken,
        _repo: &RepositoryId,
        path: &FilePath,
        content: &str,
        _message: &str,
        version: &VersionToken,
        branch: &BranchName,
    ) -> Result<FileUpdate, RepositoryError> {
        let mut state = self.enter(
            token,
            "update_file",
            RecordedCall::UpdateFile {
                path: path.to_string(),
            },
        )?;
        let key = (branch.to_string(), path.to_string());
        if state.racing_paths.remove(path.as_str()) {
            let bumped = state.bump_version();
            if let Some(file) = state.files.get_mut(&key) {
                file.version = bumped;
            }
        }
        let new_version = state.bump_version();
        let Some(file) = state.files.get_mut(&key) else {
            return Err(RepositoryError::http(404, "Not Found"));
        };
        if format!("v{}", file.version) != version.as_str() {
            return Ok(FileUpdate::Conflict);
        }
        file.content = content.as_bytes().to_vec();
        file.version = new_version;
        Ok(FileUpdate::Updated)
    }

    async fn list_pull_requests(
        &self,
        token: &AccessToken,
        _repo: &RepositoryId,
        head: &str,
        base: &BranchName,
    ) -> Result<Vec<PullRequestRef>, RepositoryError> {
        let state = self.enter(
            token,
            "list_pull_requests",
            RecordedCall::ListPullRequests {
                head: head.to_string(),
                base: base.to_string(),
            },
        )?;
        Ok(state
            .pull_requests
            .iter()
            .filter(|pr| pr.head_ref == head && pr.base_ref == base.as_str())
            .cloned()
            .collect())
    }

    async fn create_pull_request(
        &self,
        token: &AccessToken,
        _repo: &RepositoryId,
        title: &str,
        body: &str,
        head: &str,
        base: &BranchName,
    ) -> Result<PullRequestRef, RepositoryError> {
        let mut state = self.enter(
            token,
            "create_pull_request",
            RecordedCall::CreatePullRequest {
                head: head.to_string(),
            },
        )?;
        Ok(state.open_pull_request(head, base.as_str(), title, body))
    }

    async fn edit_pull_request(
        &self,
        token: &AccessToken,
        _repo: &RepositoryId,
        pull_request: &PullRequestRef,
        title: &str,
        body: &str,
    ) -> Result<(), RepositoryError> {
        let mut state = self.enter(
            token,
            "edit_pull_request",
            RecordedCall::EditPullRequest {
                number: pull_request.number.as_u64(),
            },
        )?;
        let pr = state
            .pull_requests
            .iter_mut()
            .find(|pr| pr.number == pull_request.number)
            .ok_or_else(|| RepositoryError::http(404, "Not Found"))?;
        pr.title = title.to_string();
        pr.body = body.to_string();
        Ok(())
    }
}
