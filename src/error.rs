use thiserror::Error;

/// Failure taxonomy for one generation attempt.
///
/// `Cancelled` covers both user-initiated aborts and the local-backend
/// timeout; callers present it as a neutral state, never as an error.
/// Everything unexpected from a reachable backend (bad status, malformed
/// response shape, transport failure) normalizes to `Backend`.
#[derive(Debug, Error)]
pub enum GenerateError {
    #[error("generation cancelled")]
    Cancelled,

    #[error("configuration error: {0}")]
    Config(String),

    #[error("backend error{}: {detail}", status.map(|s| format!(" (HTTP {s})")).unwrap_or_default())]
    Backend { status: Option<u16>, detail: String },
}

impl GenerateError {
    /// Backend failure without an HTTP status (transport error, bad shape).
    pub fn backend(detail: impl Into<String>) -> Self {
        GenerateError::Backend {
            status: None,
            detail: detail.into(),
        }
    }

    /// Backend failure carrying the non-2xx status and the response body.
    pub fn http(status: u16, body: impl Into<String>) -> Self {
        GenerateError::Backend {
            status: Some(status),
            detail: body.into(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, GenerateError::Cancelled)
    }
}

impl From<reqwest::Error> for GenerateError {
    fn from(e: reqwest::Error) -> Self {
        let status = e.status().map(|s| s.as_u16());
        GenerateError::Backend {
            status,
            detail: e.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancelled_display_is_neutral() {
        let e = GenerateError::Cancelled;
        assert_eq!(e.to_string(), "generation cancelled");
        assert!(e.is_cancelled());
    }

    #[test]
    fn test_config_display() {
        let e = GenerateError::Config("profile not found".to_string());
        assert_eq!(e.to_string(), "configuration error: profile not found");
        assert!(!e.is_cancelled());
    }

    #[test]
    fn test_http_display_includes_status() {
        let e = GenerateError::http(502, "bad gateway");
        assert_eq!(e.to_string(), "backend error (HTTP 502): bad gateway");
    }

    #[test]
    fn test_backend_display_without_status() {
        let e = GenerateError::backend("connection refused");
        assert_eq!(e.to_string(), "backend error: connection refused");
    }

    #[test]
    fn test_backend_is_not_cancelled() {
        assert!(!GenerateError::http(500, "boom").is_cancelled());
        assert!(!GenerateError::backend("x").is_cancelled());
    }
}
