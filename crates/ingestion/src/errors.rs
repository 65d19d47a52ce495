//! Error and retry-policy types for the ingestion domain.
//!
//! [`IngestError`] is the request-level taxonomy: every stage of a reconcile
//! fails fast with one of its variants. [`RepositoryError`] is what the
//! `RepositoryClient` and `TokenProvider` ports report for unexpected remote
//! failures; the documented idempotent conditions ("already exists",
//! "not found", "stale version") are result variants, not errors.
//!
//! [`RetryPolicy`] tells the caller whether replaying the whole request is
//! expected to converge. The engine itself never retries.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::FilePath;

// ---------------------------------------------------------------------------
// Retry semantics
// ---------------------------------------------------------------------------

/// Whether an error condition is safe to retry and, if so, after what delay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RetryPolicy {
    /// The whole request may be replayed.
    Retryable {
        /// Minimum back-off before the next attempt. `None` means apply the
        /// caller's own back-off schedule.
        after: Option<Duration>,
    },
    /// Replaying the identical request will fail the same way.
    NonRetryable,
}

// ---------------------------------------------------------------------------
// Port errors
// ---------------------------------------------------------------------------

/// An unexpected failure reported by the remote repository or token source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryError {
    /// HTTP status, when the failure came from a response.
    pub status: Option<u16>,
    /// Human-readable description (response body or transport error).
    pub message: String,
    /// Back-off hint from a `Retry-After` or rate-limit reset header.
    pub retry_after: Option<Duration>,
}

impl RepositoryError {
    /// A failure carried by an HTTP response.
    pub fn http(status: u16, message: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            message: message.into(),
            retry_after: None,
        }
    }

    /// A failure with no response (connection, decoding, credentials).
    pub fn transport(message: impl Into<String>) -> Self {
        Self {
            status: None,
            message: message.into(),
            retry_after: None,
        }
    }

    /// Attaches a back-off hint.
    #[must_use]
    pub fn with_retry_after(mut self, after: Duration) -> Self {
        self.retry_after = Some(after);
        self
    }

    /// Returns `true` for failures a later attempt may not hit: transport
    /// errors, rate limiting, and server-side errors.
    pub fn is_transient(&self) -> bool {
        match self.status {
            None => true,
            Some(status) => status == 429 || status >= 500,
        }
    }
}

impl std::fmt::Display for RepositoryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.status {
            Some(status) => write!(f, "HTTP {status}: {}", self.message),
            None => f.write_str(&self.message),
        }
    }
}

impl std::error::Error for RepositoryError {}

// ---------------------------------------------------------------------------
// Request-level errors
// ---------------------------------------------------------------------------

/// Serialisable discriminant of [`IngestError`], used in structured responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Unauthorized,
    MalformedInput,
    UnsupportedTransform,
    Remote,
    Conflict,
    InvariantViolation,
}

/// Errors that abort a reconcile.
///
/// No variant implies a rollback: mutations applied before the failure stay
/// on the remote, and a replay of the same request converges from there.
#[derive(Debug, Error)]
pub enum IngestError {
    /// The payload is not covered by any allowlist rule.
    ///
    /// Produced by: payload authorizer, before any remote call.
    #[error("Unauthorized: {reason}")]
    Unauthorized {
        /// Which file failed which rule, or a generic statement when no rule
        /// applied to the repository and branch suffix at all.
        reason: String,
    },

    /// A transform was given content it cannot parse.
    #[error("Malformed input in '{path}' for transform {transform}: {reason}")]
    MalformedInput {
        /// File whose content failed to parse.
        path: FilePath,
        /// Wire name of the failing transform.
        transform: String,
        /// Parser message.
        reason: String,
    },

    /// A file named a transform outside the known set.
    #[error("Unsupported transform '{name}' requested for '{path}'")]
    UnsupportedTransform {
        /// File that requested the transform.
        path: FilePath,
        /// The unrecognised name.
        name: String,
    },

    /// An unexpected failure from the repository client or token provider.
    #[error("Remote error during {operation}: {source}")]
    Remote {
        /// Which remote operation failed (e.g. `"create branch"`).
        operation: &'static str,
        /// The port-level failure.
        #[source]
        source: RepositoryError,
    },

    /// A file update lost an optimistic-concurrency race.
    #[error("Conflict updating '{path}': the file changed since it was read")]
    Conflict {
        /// The file whose version token was stale.
        path: FilePath,
    },

    /// Remote state breaks an invariant the engine refuses to repair
    /// (e.g. two open pull requests for one head/base pair).
    #[error("Invariant violation: {reason}")]
    InvariantViolation {
        /// Description of the violated invariant.
        reason: String,
    },
}

impl IngestError {
    /// Wraps a port failure with the operation that produced it.
    pub fn remote(operation: &'static str, source: RepositoryError) -> Self {
        Self::Remote { operation, source }
    }

    /// Returns the serialisable discriminant.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Unauthorized { .. } => ErrorKind::Unauthorized,
            Self::MalformedInput { .. } => ErrorKind::MalformedInput,
            Self::UnsupportedTransform { .. } => ErrorKind::UnsupportedTransform,
            Self::Remote { .. } => ErrorKind::Remote,
            Self::Conflict { .. } => ErrorKind::Conflict,
            Self::InvariantViolation { .. } => ErrorKind::InvariantViolation,
        }
    }

    /// Whether replaying the whole request is expected to help.
    pub fn retry_policy(&self) -> RetryPolicy {
        match self {
            Self::Remote { source, .. } if source.is_transient() => RetryPolicy::Retryable {
                after: source.retry_after,
            },
            Self::Conflict { .. } => RetryPolicy::Retryable { after: None },
            _ => RetryPolicy::NonRetryable,
        }
    }
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

/// Problems found while loading configuration. Raised at start-up only.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The allowlist document is not valid JSON of the expected shape.
    #[error("Allowlist could not be parsed: {0}")]
    AllowlistFormat(#[from] serde_json::Error),

    /// A pattern in an allowlist rule does not compile.
    #[error("Allowlist rule {rule} has an invalid {field} pattern: {source}")]
    InvalidPattern {
        /// Zero-based index of the rule in the configured list.
        rule: usize,
        /// Which of the four patterns failed.
        field: &'static str,
        /// Compiler message.
        #[source]
        source: regex::Error,
    },

    /// A setting is missing or has an unusable value.
    #[error("Configuration error: {message}")]
    Invalid {
        /// Description of the configuration problem.
        message: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_remote_errors_are_retryable_with_hint() {
        let err = IngestError::remote(
            "list pull requests",
            RepositoryError::http(429, "rate limited").with_retry_after(Duration::from_secs(30)),
        );
        assert_eq!(
            err.retry_policy(),
            RetryPolicy::Retryable {
                after: Some(Duration::from_secs(30))
            }
        );
    }

    #[test]
    fn client_errors_are_not_retryable() {
        let err = IngestError::remote("create branch", RepositoryError::http(403, "forbidden"));
        assert_eq!(err.retry_policy(), RetryPolicy::NonRetryable);
        assert_eq!(err.kind(), ErrorKind::Remote);
    }

    #[test]
    fn conflict_converges_on_retry() {
        let err = IngestError::Conflict {
            path: FilePath::new("a.yaml").unwrap(),
        };
        assert!(matches!(err.retry_policy(), RetryPolicy::Retryable { .. }));
    }

    #[test]
    fn repository_error_display_includes_status() {
        assert_eq!(
            RepositoryError::http(502, "bad gateway").to_string(),
            "HTTP 502: bad gateway"
        );
        assert_eq!(RepositoryError::transport("timed out").to_string(), "timed out");
    }

    #[test]
    fn error_kind_serialises_snake_case() {
        assert_eq!(
            serde_json::to_string(&ErrorKind::InvariantViolation).unwrap(),
            "\"invariant_violation\""
        );
    }
}
