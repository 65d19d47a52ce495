//! Ingestion orchestrator: the single entry point for a request.
//!
//! Stages run in a fixed order and the first failure ends the request:
//!
//! 1. authorize the payload against the allowlist (no remote calls before this);
//! 2. transform every file (all must succeed before anything is written);
//! 3. ensure the working branch exists;
//! 4. reconcile each file, in request order;
//! 5. reconcile the pull request.
//!
//! Nothing is rolled back on failure. Every stage is idempotent, so the caller
//! replays the whole request and it converges.

use std::sync::Arc;

use ingestion::{
    transform_files, AllowList, IngestError, IngestOutcome, IngestRequest, IngestionSettings,
    RepositoryClient, TokenProvider,
};
use tracing::Instrument;

use crate::{
    ensure_branch, reconcile_files, reconcile_pull_request, DesiredPullRequest, RepositoryHandle,
};

/// Reconciles the remote repository with `request`.
///
/// # Errors
///
/// Any [`IngestError`]; see the module documentation for which stage produces
/// which kind.
pub async fn reconcile(
    mut request: IngestRequest,
    allow_list: &AllowList,
    client: &dyn RepositoryClient,
    tokens: &dyn TokenProvider,
    settings: &IngestionSettings,
) -> Result<IngestOutcome, IngestError> {
    let span = tracing::info_span!(
        "ingest",
        repository = %request.repository,
        branch = %settings.working_branch(&request.branch_suffix),
        files = request.files.len(),
    );

    async move {
        allow_list.authorize(&request)?;
        transform_files(&mut request.files)?;

        let handle = RepositoryHandle::new(client, tokens, &request.repository);

        let token = handle.token("read default branch").await?;
        let default_branch = client
            .default_branch_tip(&token, &request.repository)
            .await
            .map_err(|source| IngestError::remote("read default branch", source))?;

        let branch = settings.working_branch(&request.branch_suffix);
        tracing::info!(%branch, from = %default_branch.tip, "Ensuring working branch");
        ensure_branch(&handle, &branch, &default_branch.tip).await?;

        let outcomes = reconcile_files(&handle, &branch, &request.files).await?;
        tracing::debug!(?outcomes, "Files reconciled");

        let desired = DesiredPullRequest::for_submission(
            request.repository.owner(),
            &branch,
            default_branch.name,
            &request.files,
        );
        let outcome = reconcile_pull_request(&handle, settings.markers(), &desired).await?;
        let pr = outcome.pull_request();
        tracing::info!(pr = %pr.number, url = %pr.url, "Ingest complete");

        Ok(IngestOutcome {
            pr_url: pr.url.clone(),
        })
    }
    .instrument(span)
    .await
}

/// Owns everything a reconcile needs besides the request, for callers that
/// serve many requests (e.g. the HTTP front door).
///
/// Holds no per-request state; concurrent calls are independent.
#[derive(Clone)]
pub struct Reconciler {
    allow_list: Arc<AllowList>,
    client: Arc<dyn RepositoryClient>,
    tokens: Arc<dyn TokenProvider>,
    settings: Arc<IngestionSettings>,
}

impl Reconciler {
    pub fn new(
        allow_list: AllowList,
        client: Arc<dyn RepositoryClient>,
        tokens: Arc<dyn TokenProvider>,
        settings: IngestionSettings,
    ) -> Self {
        Self {
            allow_list: Arc::new(allow_list),
            client,
            tokens,
            settings: Arc::new(settings),
        }
    }

    /// See [`reconcile`].
    ///
    /// # Errors
    ///
    /// Any [`IngestError`] produced by [`reconcile`].
    pub async fn reconcile(&self, request: IngestRequest) -> Result<IngestOutcome, IngestError> {
        reconcile(
            request,
            &self.allow_list,
            self.client.as_ref(),
            self.tokens.as_ref(),
            &self.settings,
        )
        .await
    }
}
