//! Repo-ingestion reconciliation engine.
//!
//! This crate sequences the domain rules of the [`ingestion`] crate against a
//! remote repository reached through its `RepositoryClient` and
//! `TokenProvider` ports. Each reconciler makes one piece of remote state match
//! the request and is safe to run again: a replay of a successful request
//! performs no writes.
//!
//! ## Architectural Layer
//!
//! **Orchestration layer.** Reconcilers sequence calls between business logic
//! in [`ingestion`] and the infrastructure traits. They contain no domain rules
//! of their own.
//!
//! ## Concurrency
//!
//! Requests are not serialized against each other. The compare-and-swap on file
//! updates turns a lost race into [`ingestion::IngestError::Conflict`]; branch
//! creation races are absorbed as "already exists"; concurrent pull request
//! edits for the same branch are last-writer-wins. Callers needing strict
//! per-branch ordering must queue requests ahead of [`reconcile`].

pub mod branch;
pub mod files;
pub mod handle;
pub mod orchestrator;
pub mod pull_request;

pub use branch::ensure_branch;
pub use files::{commit_message, reconcile_file, reconcile_files, FileOutcome};
pub use handle::RepositoryHandle;
pub use orchestrator::{reconcile, Reconciler};
pub use pull_request::{
    describe_submission, reconcile_pull_request, DesiredPullRequest, PullRequestOutcome,
};
