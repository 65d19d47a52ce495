//! File reconciler.
//!
//! Files are reconciled one at a time, in request order, so the commit order
//! on the working branch is the same on every run and matches the log.

use ingestion::{BranchName, FileChange, FileLookup, FileUpdate, IngestError};

use crate::RepositoryHandle;

/// What reconciling one file did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileOutcome {
    /// The path did not exist and was created.
    Created,
    /// The path existed with different content and was updated.
    Updated,
    /// The path already held exactly this content; nothing was written.
    Unchanged,
}

/// Commit message for writes to `path`.
pub fn commit_message(path: &str) -> String {
    format!("Create or update {path}")
}

/// Makes the blob at `file.path` on `branch` equal `file.content`.
///
/// # Errors
///
/// - [`IngestError::Conflict`] if the file changed between read and update.
/// - [`IngestError::Remote`] for any other remote failure.
pub async fn reconcile_file(
    handle: &RepositoryHandle<'_>,
    branch: &BranchName,
    file: &FileChange,
) -> Result<FileOutcome, IngestError> {
    let path = &file.path;
    let message = commit_message(path.as_str());

    let token = handle.token("read file").await?;
    let lookup = handle
        .client()
        .get_file(&token, handle.repo(), path, branch)
        .await
        .map_err(|source| IngestError::remote("read file", source))?;

    match lookup {
        FileLookup::NotFound => {
            tracing::info!(%path, "File does not exist, creating");
            let token = handle.token("create file").await?;
            handle
                .client()
                .create_file(&token, handle.repo(), path, &file.content, &message, branch)
                .await
                .map_err(|source| IngestError::remote("create file", source))?;
            Ok(FileOutcome::Created)
        }
        FileLookup::Found(existing) if existing.content == file.content.as_bytes() => {
            tracing::info!(%path, "File already up to date");
            Ok(FileOutcome::Unchanged)
        }
        FileLookup::Found(existing) => {
            tracing::info!(%path, version = %existing.version, "File differs, updating");
            let token = handle.token("update file").await?;
            let update = handle
                .client()
                .update_file(
                    &token,
                    handle.repo(),
                    path,
                    &file.content,
                    &message,
                    &existing.version,
                    branch,
                )
                .await
                .map_err(|source| IngestError::remote("update file", source))?;
            match update {
                FileUpdate::Updated => Ok(FileOutcome::Updated),
                FileUpdate::Conflict => {
                    tracing::warn!(%path, "File changed concurrently; update rejected");
                    Err(IngestError::Conflict { path: path.clone() })
                }
            }
        }
    }
}

/// Reconciles `files` sequentially, stopping at the first failure.
///
/// # Errors
///
/// The first error from [`reconcile_file`].
pub async fn reconcile_files(
    handle: &RepositoryHandle<'_>,
    branch: &BranchName,
    files: &[FileChange],
) -> Result<Vec<FileOutcome>, IngestError> {
    let mut outcomes = Vec::with_capacity(files.len());
    for file in files {
        outcomes.push(reconcile_file(handle, branch, file).await?);
    }
    Ok(outcomes)
}
