//! REST error type and its JSON envelope.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use taxdesk_store::StoreError;
use tracing::error;

/// Missing or invalid bearer token.
pub const UNAUTHORIZED: &str = "UNAUTHORIZED";
/// Authenticated but not allowed.
pub const FORBIDDEN: &str = "FORBIDDEN";
/// Requested resource not found.
pub const NOT_FOUND: &str = "NOT_FOUND";
/// Request body or path failed validation.
pub const INVALID_PARAMS: &str = "INVALID_PARAMS";
/// Internal server error.
pub const INTERNAL_ERROR: &str = "INTERNAL_ERROR";

/// Error returned by REST handlers.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Missing or invalid bearer token.
    #[error("{message}")]
    Unauthorized {
        /// Description.
        message: String,
    },

    /// Caller lacks the required role.
    #[error("{message}")]
    Forbidden {
        /// Description.
        message: String,
    },

    /// Requested resource not found.
    #[error("{message}")]
    NotFound {
        /// Description.
        message: String,
    },

    /// Request failed validation.
    #[error("{message}")]
    InvalidParams {
        /// Description of what is wrong.
        message: String,
    },

    /// Internal server error. The message is logged, not returned.
    #[error("{message}")]
    Internal {
        /// Description.
        message: String,
    },
}

/// Wire-format error body.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    /// Machine-readable code.
    pub code: &'static str,
    /// Human-readable message.
    pub message: String,
}

#[derive(Serialize)]
struct Envelope {
    error: ErrorBody,
}

impl ApiError {
    /// Shorthand for [`ApiError::InvalidParams`].
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidParams { message: message.into() }
    }

    /// Shorthand for [`ApiError::NotFound`].
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound { message: message.into() }
    }

    /// Machine-readable error code for this variant.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Unauthorized { .. } => UNAUTHORIZED,
            Self::Forbidden { .. } => FORBIDDEN,
            Self::NotFound { .. } => NOT_FOUND,
            Self::InvalidParams { .. } => INVALID_PARAMS,
            Self::Internal { .. } => INTERNAL_ERROR,
        }
    }

    /// HTTP status for this variant.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Unauthorized { .. } => StatusCode::UNAUTHORIZED,
            Self::Forbidden { .. } => StatusCode::FORBIDDEN,
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::InvalidParams { .. } => StatusCode::BAD_REQUEST,
            Self::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Convert to the wire-format error body.
    pub fn to_error_body(&self) -> ErrorBody {
        let message = match self {
            Self::Internal { .. } => "internal server error".to_owned(),
            other => other.to_string(),
        };
        ErrorBody {
            code: self.code(),
            message,
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(what) => Self::NotFound { message: what },
            other => {
                error!(error = %other, "store failure");
                Self::Internal {
                    message: other.to_string(),
                }
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Envelope {
            error: self.to_error_body(),
        };
        (self.status(), Json(body)).into_response()
    }
}
