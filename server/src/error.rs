//! HTTP error responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;
use tracing::{debug, error};

use finledger_common::{ErrorKind, LedgerError};

/// Error returned by request handlers.
#[derive(Error, Debug)]
pub enum ApiError {
    /// Body or path could not be decoded.
    #[error("Invalid input data")]
    InvalidInput(String),

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

impl ApiError {
    /// HTTP status for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            ApiError::Ledger(err) => match err.kind() {
                ErrorKind::InvalidInput | ErrorKind::Rejected => StatusCode::BAD_REQUEST,
                ErrorKind::NotFound => StatusCode::NOT_FOUND,
                ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }

    /// Machine-readable error code.
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::InvalidInput(_) => "INVALID_INPUT",
            ApiError::Ledger(err) => err.error_code(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();

        if let ApiError::InvalidInput(detail) = &self {
            debug!(detail = %detail, "Rejected malformed request");
        }
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!(code = self.code(), error = %self, "Request failed");
        }

        let body = Json(json!({
            "error": self.to_string(),
            "code": self.code(),
        }));

        (status, body).into_response()
    }
}
