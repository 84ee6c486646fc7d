//! Service-wide error taxonomy and HTTP mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

/// Failures a request can surface. Storage and internal errors are logged
/// with context and returned to the caller as a generic 500.
#[derive(Debug, Error)]
pub enum Error {
    #[error("{0}")]
    Validation(String),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error(transparent)]
    Conflict(#[from] Conflict),

    #[error("not authorized to access this route")]
    Unauthorized,

    #[error("you do not have permission to perform this action")]
    Forbidden,

    #[error("storage error")]
    Storage(#[from] sqlx::Error),

    #[error("internal error")]
    Internal(#[from] anyhow::Error),
}

/// Business conflicts the client can resolve by adjusting the request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Conflict {
    #[error("insufficient inventory for {product} - {variant}")]
    InsufficientStock { product: String, variant: String },

    #[error("insufficient loyalty points")]
    InsufficientPoints,

    #[error("invalid or expired discount code")]
    DiscountInvalid,

    #[error("discount code already exists")]
    DuplicateCode,

    #[error("email already registered")]
    DuplicateEmail,

    #[error("cannot cancel a delivered order")]
    CannotCancel,
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = match &self {
            Error::Validation(_) | Error::Conflict(_) => StatusCode::BAD_REQUEST,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::Unauthorized => StatusCode::UNAUTHORIZED,
            Error::Forbidden => StatusCode::FORBIDDEN,
            Error::Storage(_) | Error::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = ?self, "request failed");
            "internal server error".to_string()
        } else {
            self.to_string()
        };
        let body = Json(serde_json::json!({ "success": false, "message": message }));
        (status, body).into_response()
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
