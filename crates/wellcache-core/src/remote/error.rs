use thiserror::Error;

use crate::error::FailureKind;

#[derive(Error, Debug)]
pub enum RemoteError {
    #[error("No directory backend configured")]
    NotConfigured,

    #[error("Invalid backend configuration: {0}")]
    InvalidConfig(String),

    #[error("Unauthorized - check the anon key")]
    Unauthorized,

    #[error("Table not found: {0}")]
    NotFound(String),

    #[error("Rate limited - please wait before retrying")]
    RateLimited,

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Directory fetch timed out after {0:?}")]
    TimedOut(std::time::Duration),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Backend returned no services")]
    EmptyResult,
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

impl RemoteError {
    /// Truncate a response body to avoid logging excessive data
    fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            return body.to_string();
        }
        let mut end = MAX_ERROR_BODY_LENGTH;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
    }

    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        let truncated = Self::truncate_body(body);
        match status.as_u16() {
            401 | 403 => RemoteError::Unauthorized,
            404 => RemoteError::NotFound(truncated),
            429 => RemoteError::RateLimited,
            500..=599 => RemoteError::ServerError(truncated),
            _ => RemoteError::InvalidResponse(format!("Status {}: {}", status, truncated)),
        }
    }

    pub fn kind(&self) -> FailureKind {
        FailureKind::RemoteFetchFailed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    #[test]
    fn test_from_status_mapping() {
        assert!(matches!(
            RemoteError::from_status(StatusCode::UNAUTHORIZED, ""),
            RemoteError::Unauthorized
        ));
        assert!(matches!(
            RemoteError::from_status(StatusCode::FORBIDDEN, ""),
            RemoteError::Unauthorized
        ));
        assert!(matches!(
            RemoteError::from_status(StatusCode::NOT_FOUND, "relation does not exist"),
            RemoteError::NotFound(body) if body == "relation does not exist"
        ));
        assert!(matches!(
            RemoteError::from_status(StatusCode::TOO_MANY_REQUESTS, ""),
            RemoteError::RateLimited
        ));
        assert!(matches!(
            RemoteError::from_status(StatusCode::BAD_GATEWAY, "upstream"),
            RemoteError::ServerError(_)
        ));
        assert!(matches!(
            RemoteError::from_status(StatusCode::BAD_REQUEST, "bad filter"),
            RemoteError::InvalidResponse(msg) if msg.contains("400")
        ));
    }

    #[test]
    fn test_long_bodies_are_truncated() {
        let body = "é".repeat(400);
        let err = RemoteError::from_status(StatusCode::INTERNAL_SERVER_ERROR, &body);
        let RemoteError::ServerError(msg) = err else {
            panic!("expected server error");
        };
        assert!(msg.contains("truncated, 800 total bytes"));
        assert!(msg.len() < body.len());
    }

    #[test]
    fn test_every_variant_is_a_fetch_failure() {
        assert_eq!(RemoteError::EmptyResult.kind(), FailureKind::RemoteFetchFailed);
        assert_eq!(RemoteError::NotConfigured.kind(), FailureKind::RemoteFetchFailed);
    }
}
