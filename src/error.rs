use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Main error type for the application.
#[derive(Error, Debug)]
pub enum AppError {
    /// Unknown route, missing file, or a path that escapes the catalog root.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Configuration error. Fatal at startup.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The external converter failed.
    #[error("Conversion failed: {0}")]
    Conversion(String),

    /// I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// HTTP status for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        // Bodies are fixed strings: the detail may contain filesystem paths.
        let body = match &self {
            AppError::NotFound(_) => {
                tracing::debug!(error = %self, "Not found");
                "Not Found"
            }
            AppError::Conversion(_) => {
                tracing::warn!(error = %self, "Conversion error");
                "Conversion failed"
            }
            _ => {
                tracing::error!(error = %self, "Request error");
                "Internal error"
            }
        };

        (status, body).into_response()
    }
}

/// Result type alias for the application.
pub type Result<T> = std::result::Result<T, AppError>;
