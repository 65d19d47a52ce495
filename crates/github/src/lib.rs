//! Repo-ingestion GitHub infrastructure adapter.
//!
//! Implements the ports defined in the [`ingestion`] crate against the GitHub
//! REST API:
//!
//! | Type                        | Port                          |
//! |-----------------------------|-------------------------------|
//! | [`GitHubRepositoryClient`]  | `ingestion::RepositoryClient` |
//! | [`GitHubAppTokenProvider`]  | `ingestion::TokenProvider`    |
//!
//! Personal access tokens need no adapter; use
//! `ingestion::StaticTokenProvider`.
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** This crate must not contain domain rules.
//! All GitHub API details (rate limiting, pagination, authentication, base64
//! content encoding) are handled here; the [`ingestion`] crate never sees them.
//! The idempotent conditions the engine branches on map as follows:
//!
//! | Response                               | Result                          |
//! |----------------------------------------|---------------------------------|
//! | `422 Reference already exists` on refs | `BranchCreation::AlreadyExisted` |
//! | `404` on contents                      | `FileLookup::NotFound`          |
//! | `409` on a contents update             | `FileUpdate::Conflict`          |

pub mod client;
pub mod error;
pub mod token;

pub use client::{GitHubRepositoryClient, RateLimit, DEFAULT_API_URL};
pub use error::GitHubError;
pub use token::{GitHubAppTokenProvider, REFRESH_MARGIN_SECS};
