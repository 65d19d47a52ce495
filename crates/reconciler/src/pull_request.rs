//! Pull request reconciler.
//!
//! There is exactly one open pull request per `(head, base)` pair. Zero means
//! create; one means compare and possibly edit; more than one is corrupted
//! state the reconciler refuses to choose from.

use ingestion::{same_lines, BranchName, FileChange, IngestError, PullRequestRef, SectionMarkers};

use crate::RepositoryHandle;

/// Desired state of the working pull request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DesiredPullRequest {
    /// Head in `owner:branch` form.
    pub head: String,
    /// Base branch.
    pub base: BranchName,
    /// Full title.
    pub title: String,
    /// New managed-section content, not yet wrapped in markers.
    pub managed_body: String,
}

impl DesiredPullRequest {
    /// Builds the pull request for a submission of `files` from `owner:branch`
    /// into `base`.
    pub fn for_submission(
        owner: &str,
        branch: &BranchName,
        base: BranchName,
        files: &[FileChange],
    ) -> Self {
        let head = format!("{owner}:{branch}");
        Self {
            title: format!("Create or update files: {head}"),
            managed_body: describe_submission(files),
            head,
            base,
        }
    }
}

/// The managed-section text listing the submitted files.
pub fn describe_submission(files: &[FileChange]) -> String {
    let file_list: String = files
        .iter()
        .map(|file| format!("* {}\n", file.path))
        .collect();
    format!(
        "### Introduction\n\
         \n\
         This PR is automatically generated by the \
         [repo-ingestion](https://github.com/WATonomous/repo-ingestion) service.\n\
         \n\
         <!-- tags: repo-ingestion -->\n\
         \n\
         ### Files in the latest submission:\n\
         \n\
         {file_list}"
    )
}

/// What reconciling the pull request did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PullRequestOutcome {
    Created(PullRequestRef),
    Updated(PullRequestRef),
    Unchanged(PullRequestRef),
}

impl PullRequestOutcome {
    /// The pull request as it now stands.
    pub fn pull_request(&self) -> &PullRequestRef {
        match self {
            Self::Created(pr) | Self::Updated(pr) | Self::Unchanged(pr) => pr,
        }
    }
}

/// Ensures the one open pull request for `desired.head → desired.base` has
/// the desired title and managed section, preserving the rest of its body.
///
/// # Errors
///
/// - [`IngestError::InvariantViolation`] if more than one open pull request
///   exists for the pair; nothing is edited.
/// - [`IngestError::Remote`] for remote failures.
pub async fn reconcile_pull_request(
    handle: &RepositoryHandle<'_>,
    markers: &SectionMarkers,
    desired: &DesiredPullRequest,
) -> Result<PullRequestOutcome, IngestError> {
    let token = handle.token("list pull requests").await?;
    let mut open = handle
        .client()
        .list_pull_requests(&token, handle.repo(), &desired.head, &desired.base)
        .await
        .map_err(|source| IngestError::remote("list pull requests", source))?;

    if open.len() > 1 {
        let numbers: Vec<String> = open.iter().map(|pr| pr.number.to_string()).collect();
        tracing::error!(head = %desired.head, base = %desired.base, prs = ?numbers, "Duplicate pull requests");
        return Err(IngestError::InvariantViolation {
            reason: format!(
                "expected at most one pull request from {} to {}, found {} ({})",
                desired.head,
                desired.base,
                open.len(),
                numbers.join(", ")
            ),
        });
    }

    let Some(mut existing) = open.pop() else {
        tracing::info!(head = %desired.head, base = %desired.base, "Pull request does not exist, creating");
        let body = markers.merge_managed("", &desired.managed_body);
        let token = handle.token("create pull request").await?;
        let created = handle
            .client()
            .create_pull_request(
                &token,
                handle.repo(),
                &desired.title,
                &body,
                &desired.head,
                &desired.base,
            )
            .await
            .map_err(|source| IngestError::remote("create pull request", source))?;
        return Ok(PullRequestOutcome::Created(created));
    };

    let managed = markers.extract_managed(&existing.body);
    if existing.title == desired.title && same_lines(managed, &desired.managed_body) {
        tracing::info!(pr = %existing.number, "Pull request already up to date");
        return Ok(PullRequestOutcome::Unchanged(existing));
    }

    tracing::info!(pr = %existing.number, "Pull request out of date, updating");
    let body = markers.merge_managed(&existing.body, &desired.managed_body);
    let token = handle.token("edit pull request").await?;
    handle
        .client()
        .edit_pull_request(&token, handle.repo(), &existing, &desired.title, &body)
        .await
        .map_err(|source| IngestError::remote("edit pull request", source))?;

    existing.title.clone_from(&desired.title);
    existing.body = body;
    Ok(PullRequestOutcome::Updated(existing))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ingestion::FilePath;

    #[test]
    fn submission_lists_files_in_order() {
        let files: Vec<FileChange> = ["b.yml", "a.yml"]
            .iter()
            .map(|p| FileChange {
                path: FilePath::new(*p).unwrap(),
                content: String::new(),
                transforms: Vec::new(),
            })
            .collect();
        let body = describe_submission(&files);
        assert!(body.starts_with("### Introduction\n\nThis PR is automatically generated"));
        assert!(body.ends_with("### Files in the latest submission:\n\n* b.yml\n* a.yml\n"));
    }

    #[test]
    fn desired_pull_request_uses_owner_qualified_head() {
        let branch = BranchName::new("repo-ingestion-x").unwrap();
        let base = BranchName::new("main").unwrap();
        let desired = DesiredPullRequest::for_submission("acme", &branch, base, &[]);
        assert_eq!(desired.head, "acme:repo-ingestion-x");
        assert_eq!(desired.title, "Create or update files: acme:repo-ingestion-x");
    }
}
