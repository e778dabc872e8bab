use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by the workflow API client and the payload assembler.
#[derive(Debug, Error)]
pub enum ApiError {
    /// No access token is configured.
    #[error("Authentication required")]
    AuthenticationRequired,

    /// Transport failure, non-success status, or undecodable body on a pass-through call.
    #[error("Request failed: {message}")]
    RequestFailed { message: String },

    /// A local upload path is missing or unreadable.
    #[error("cannot open '{}': {source}", path.display())]
    FileAccess {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A remote upload source could not be fetched.
    #[error("failed to fetch '{url}': {reason}")]
    RemoteFetch { url: String, reason: String },

    /// A blob declared a MIME type that cannot be parsed.
    #[error("invalid content type '{content_type}' for field '{field}'")]
    InvalidContentType { field: String, content_type: String },

    /// The downloaded result archive could not be written.
    #[error("failed to write '{}': {source}", path.display())]
    ResultWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Configuration error: {message}")]
    InvalidConfig { message: String },
}

impl ApiError {
    pub(crate) fn request_failed(error: impl std::fmt::Display) -> Self {
        ApiError::RequestFailed { message: error.to_string() }
    }

    /// Stable machine-readable code for structured error payloads.
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::AuthenticationRequired => "AUTHENTICATION_REQUIRED",
            ApiError::RequestFailed { .. } => "REQUEST_FAILED",
            ApiError::FileAccess { .. } => "FILE_ACCESS_ERROR",
            ApiError::RemoteFetch { .. } => "REMOTE_FETCH_ERROR",
            ApiError::InvalidContentType { .. } => "INVALID_CONTENT_TYPE",
            ApiError::ResultWrite { .. } => "RESULT_WRITE_ERROR",
            ApiError::InvalidConfig { .. } => "INVALID_CONFIG",
        }
    }

}

pub type ApiResult<T> = Result<T, ApiError>;
