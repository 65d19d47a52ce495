//! Branch reconciler.

use ingestion::{BranchCreation, BranchName, CommitSha, IngestError};

use crate::RepositoryHandle;

/// Ensures `refs/heads/<name>` exists, creating it at `tip` if absent.
///
/// An existing branch is never moved back to `tip`: once the working branch
/// has commits of its own, replays build on them.
///
/// # Errors
///
/// Any failure other than "reference already exists" is returned as
/// [`IngestError::Remote`].
pub async fn ensure_branch(
    handle: &RepositoryHandle<'_>,
    name: &BranchName,
    tip: &CommitSha,
) -> Result<BranchCreation, IngestError> {
    const OPERATION: &str = "create branch";

    let token = handle.token(OPERATION).await?;
    let outcome = handle
        .client()
        .create_branch(&token, handle.repo(), name, tip)
        .await
        .map_err(|source| IngestError::remote(OPERATION, source))?;

    match outcome {
        BranchCreation::Created => tracing::info!(branch = %name, %tip, "Created branch"),
        BranchCreation::AlreadyExisted => tracing::info!(branch = %name, "Branch already exists"),
    }
    Ok(outcome)
}
