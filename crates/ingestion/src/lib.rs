//! Core domain for repo-ingestion.
//!
//! This crate holds every domain concept the reconciliation engine works with:
//! the request model, the allowlist, the content transforms, the managed
//! section codec for pull request bodies, and the port traits through which
//! the engine reaches the remote repository. Infrastructure crates implement
//! the ports; they never add domain rules.
//!
//! ## Architectural Layer
//!
//! **Business logic + port definitions.** This crate has no I/O dependencies.
//! It defines *what* is needed; infrastructure crates define *how* to supply it.
//!
//! ## Module Layout
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`identifiers`] | Newtype identifiers (`RepositoryId`, `BranchName`, `VersionToken`, etc.) |
//! | [`types`] | Request, file change, transform, and pull request value types |
//! | [`errors`] | Request-level error taxonomy, port error, retry policy |
//! | [`ports`] | `RepositoryClient` and `TokenProvider` traits |
//! | [`authorizer`] | Allowlist rules and request authorization |
//! | [`transform`] | `json2yaml` / `yaml2json` pipeline |
//! | [`pr_body`] | Managed-section extract/merge codec |
//! | [`settings`] | Branch prefix and marker settings |
//! | [`fakes`] | In-memory `RepositoryClient` for tests |

pub mod authorizer;
pub mod errors;
pub mod fakes;
pub mod identifiers;
pub mod ports;
pub mod pr_body;
pub mod settings;
pub mod transform;
pub mod types;

// Re-export everything at the crate root for ergonomic usage by downstream crates.
pub use authorizer::{AllowList, AllowRule, AllowRuleConfig, FilePatternConfig};
pub use errors::{ConfigError, ErrorKind, IngestError, RepositoryError, RetryPolicy};
pub use identifiers::{
    BranchName, CommitSha, FilePath, PullRequestNumber, RepositoryId, VersionToken,
};
pub use ports::{
    AccessToken, BranchCreation, FileLookup, FileUpdate, RemoteFile, RepositoryClient,
    StaticTokenProvider, TokenProvider,
};
pub use pr_body::{same_lines, SectionMarkers};
pub use settings::{IngestionSettings, DEFAULT_BRANCH_PREFIX};
pub use transform::{apply_transforms, json_to_yaml, transform_files, yaml_to_json};
pub use types::{
    DefaultBranch, FileChange, IngestOutcome, IngestRequest, PullRequestRef, TransformSpec,
};
