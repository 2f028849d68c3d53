//! Application error model with MCP and HTTP error mapping
//!
//! Defines a typed error hierarchy using `thiserror` for internal error handling,
//! and maps each variant to the appropriate MCP `ErrorData` type (tool servers)
//! or HTTP status code (intake adapter).

use axum::http::StatusCode;
use rmcp::model::ErrorData;
use serde_json::json;
use thiserror::Error;

/// Application error type
///
/// Covers every failure the two stages surface to an immediate caller. Most
/// failures inside the pipeline are absorbed locally and never become an
/// `AppError`; see the enrichment and capture modules.
#[derive(Debug, Error)]
pub enum AppError {
    /// Invalid user input (validation failed, malformed request)
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// Resource not found (message, data file)
    #[error("not found: {0}")]
    NotFound(String),
    /// No usable credential could be supplied
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    /// Operation timeout (TCP connect, TLS handshake, IMAP response)
    #[error("operation timed out: {0}")]
    Timeout(String),
    /// External API answered with a failure or could not be reached
    #[error("upstream failure: {0}")]
    Upstream(String),
    /// Internal error (unexpected failure, external crate error)
    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Convenience constructor for `InvalidInput`
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Stable machine-readable code for this error
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidInput(_) => "invalid_input",
            Self::NotFound(_) => "not_found",
            Self::Unauthorized(_) => "unauthorized",
            Self::Timeout(_) => "timeout",
            Self::Upstream(_) => "upstream",
            Self::Internal(_) => "internal",
        }
    }

    /// Convert to MCP `ErrorData`
    ///
    /// # Mappings
    ///
    /// - `InvalidInput` → `invalid_params`
    /// - `NotFound` → `resource_not_found`
    /// - `Unauthorized` → `invalid_request`
    /// - `Timeout`, `Upstream`, `Internal` → `internal_error`
    pub fn to_error_data(&self) -> ErrorData {
        let data = Some(json!({ "code": self.code() }));
        match self {
            Self::InvalidInput(msg) => ErrorData::invalid_params(msg.clone(), data),
            Self::NotFound(msg) => ErrorData::resource_not_found(msg.clone(), data),
            Self::Unauthorized(msg) => ErrorData::invalid_request(msg.clone(), data),
            Self::Timeout(msg) | Self::Upstream(msg) | Self::Internal(msg) => {
                ErrorData::internal_error(msg.clone(), data)
            }
        }
    }

    /// HTTP status used by the intake adapter
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidInput(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            Self::Upstream(_) => StatusCode::BAD_GATEWAY,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<reqwest::Error> for AppError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout(e.to_string())
        } else {
            Self::Upstream(e.to_string())
        }
    }
}

/// Type alias for fallible return values
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::AppError;
    use axum::http::StatusCode;

    #[test]
    fn unauthorized_maps_to_structured_code() {
        let err = AppError::Unauthorized("token file missing".to_owned());
        let data = err.to_error_data();
        assert_eq!(data.message, "token file missing");
        assert_eq!(
            data.data.as_ref().and_then(|d| d["code"].as_str()),
            Some("unauthorized")
        );
        assert_eq!(err.status_code(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn upstream_is_a_bad_gateway() {
        let err = AppError::Upstream("503 from video index".to_owned());
        assert_eq!(err.code(), "upstream");
        assert_eq!(err.status_code(), StatusCode::BAD_GATEWAY);
    }
}
