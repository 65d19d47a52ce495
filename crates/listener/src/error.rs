//! Mapping of ingest failures onto HTTP responses.

use axum::extract::rejection::JsonRejection;
use axum::http::{header::RETRY_AFTER, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use ingestion::{ErrorKind, IngestError, RetryPolicy};
use serde::Serialize;

#[derive(Debug, Serialize)]
struct ErrorEnvelope<'a> {
    error: ErrorBody<'a>,
}

#[derive(Debug, Serialize)]
struct ErrorBody<'a> {
    kind: &'a str,
    message: String,
}

/// An error returned by a handler, rendered as
/// `{"error": {"kind": ..., "message": ...}}`.
#[derive(Debug)]
pub enum ApiError {
    /// The reconcile failed.
    Ingest(IngestError),
    /// The body was not a valid ingest request.
    InvalidRequest(JsonRejection),
}

/// HTTP status for each ingest error kind.
pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Unauthorized => StatusCode::FORBIDDEN,
        ErrorKind::MalformedInput | ErrorKind::UnsupportedTransform => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        ErrorKind::Conflict => StatusCode::CONFLICT,
        ErrorKind::Remote => StatusCode::BAD_GATEWAY,
        ErrorKind::InvariantViolation => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn kind_name(kind: ErrorKind) -> &'static str {
    match kind {
        ErrorKind::Unauthorized => "unauthorized",
        ErrorKind::MalformedInput => "malformed_input",
        ErrorKind::UnsupportedTransform => "unsupported_transform",
        ErrorKind::Remote => "remote",
        ErrorKind::Conflict => "conflict",
        ErrorKind::InvariantViolation => "invariant_violation",
    }
}

impl From<IngestError> for ApiError {
    fn from(value: IngestError) -> Self {
        Self::Ingest(value)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(value: JsonRejection) -> Self {
        Self::InvalidRequest(value)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            Self::InvalidRequest(rejection) => {
                let body = ErrorEnvelope {
                    error: ErrorBody {
                        kind: "invalid_request",
                        message: rejection.body_text(),
                    },
                };
                (rejection.status(), Json(body)).into_response()
            }
            Self::Ingest(error) => {
                let kind = error.kind();
                let body = ErrorEnvelope {
                    error: ErrorBody {
                        kind: kind_name(kind),
                        message: error.to_string(),
                    },
                };
                let mut response = (status_for(kind), Json(body)).into_response();
                if let RetryPolicy::Retryable { after: Some(after) } = error.retry_policy() {
                    if let Ok(value) = HeaderValue::from_str(&after.as_secs().to_string()) {
                        response.headers_mut().insert(RETRY_AFTER, value);
                    }
                }
                response
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ingestion::{FilePath, RepositoryError};
    use std::time::Duration;

    #[test]
    fn every_kind_has_its_documented_status() {
        let cases = [
            (ErrorKind::Unauthorized, 403),
            (ErrorKind::MalformedInput, 422),
            (ErrorKind::UnsupportedTransform, 422),
            (ErrorKind::Conflict, 409),
            (ErrorKind::Remote, 502),
            (ErrorKind::InvariantViolation, 500),
        ];
        for (kind, status) in cases {
            assert_eq!(status_for(kind).as_u16(), status, "{kind:?}");
        }
    }

    #[test]
    fn kind_names_match_serde_names() {
        for kind in [
            ErrorKind::Unauthorized,
            ErrorKind::MalformedInput,
            ErrorKind::UnsupportedTransform,
            ErrorKind::Remote,
            ErrorKind::Conflict,
            ErrorKind::InvariantViolation,
        ] {
            assert_eq!(
                serde_json::to_value(kind).unwrap(),
                serde_json::Value::from(kind_name(kind))
            );
        }
    }

    #[test]
    fn rate_limited_remote_error_sets_retry_after() {
        let error = IngestError::remote(
            "create file",
            RepositoryError::http(429, "slow down").with_retry_after(Duration::from_secs(42)),
        );
        let response = ApiError::from(error).into_response();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(response.headers()[RETRY_AFTER], "42");
    }

    #[test]
    fn conflict_has_no_retry_after_header() {
        let error = IngestError::Conflict {
            path: FilePath::new("a.txt").unwrap(),
        };
        let response = ApiError::from(error).into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);
        assert!(response.headers().get(RETRY_AFTER).is_none());
    }
}
