//! Request-scoped value types for the ingestion domain.
//!
//! None of these types outlive a single reconcile. The only durable state is
//! the remote repository's branches, blobs, and pull requests.

use serde::{Deserialize, Serialize};

use crate::{BranchName, CommitSha, FilePath, PullRequestNumber, RepositoryId};

// ---------------------------------------------------------------------------
// Request
// ---------------------------------------------------------------------------

/// A batch of file changes destined for one repository's working branch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestRequest {
    /// Target repository (`owner/name`).
    #[serde(rename = "repo")]
    pub repository: RepositoryId,

    /// Suffix appended to the configured prefix to form the working branch.
    pub branch_suffix: String,

    /// Files to reconcile, in the order their commits should land.
    pub files: Vec<FileChange>,
}

/// One desired file on the working branch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileChange {
    /// Path relative to the repository root.
    pub path: FilePath,

    /// File content. Pre-transform on receipt; replaced by the transformed
    /// output once the transform pipeline has run.
    pub content: String,

    /// Transforms applied to `content`, left to right.
    #[serde(default)]
    pub transforms: Vec<TransformSpec>,
}

// ---------------------------------------------------------------------------
// Transforms
// ---------------------------------------------------------------------------

/// A named content transform.
///
/// Decoded from its wire name. Names outside the known set are kept as
/// [`TransformSpec::Unrecognized`] so the pipeline can reject them with a
/// request-level error instead of the decoder failing the whole payload.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TransformSpec {
    /// Parse JSON, emit YAML.
    JsonToYaml,
    /// Parse YAML, emit compact JSON.
    YamlToJson,
    /// Any name not listed above.
    Unrecognized(String),
}

impl TransformSpec {
    /// Returns the wire name of this transform.
    pub fn name(&self) -> &str {
        match self {
            Self::JsonToYaml => "json2yaml",
            Self::YamlToJson => "yaml2json",
            Self::Unrecognized(name) => name,
        }
    }
}

impl From<String> for TransformSpec {
    fn from(value: String) -> Self {
        match value.as_str() {
            "json2yaml" => Self::JsonToYaml,
            "yaml2json" => Self::YamlToJson,
            _ => Self::Unrecognized(value),
        }
    }
}

impl From<TransformSpec> for String {
    fn from(value: TransformSpec) -> Self {
        value.name().to_string()
    }
}

impl std::fmt::Display for TransformSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

// ---------------------------------------------------------------------------
// Remote state snapshots
// ---------------------------------------------------------------------------

/// The repository's default branch and the commit it currently points at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefaultBranch {
    /// Branch name (e.g. `main`).
    pub name: BranchName,
    /// Tip commit.
    pub tip: CommitSha,
}

/// A pull request as seen on the remote.
///
/// The identity key is `(head_ref, base_ref)`: at most one open pull request
/// may exist per key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequestRef {
    /// Number assigned by the remote.
    pub number: PullRequestNumber,
    /// Head in `owner:branch` form.
    pub head_ref: String,
    /// Base branch name.
    pub base_ref: String,
    /// Current title.
    pub title: String,
    /// Current body; empty when the remote reports none.
    pub body: String,
    /// Browser URL.
    pub url: String,
}

// ---------------------------------------------------------------------------
// Result
// ---------------------------------------------------------------------------

/// Returned by a successful reconcile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestOutcome {
    /// URL of the pull request that now reflects the request.
    pub pr_url: String,
}
