//! The closed error taxonomy of the evaluation core (§4.6, §7).
//!
//! Value-level evaluation errors (`#DIV/0!`, `#REF!`, ...) are *not* variants
//! here: they are first-class `computed` strings produced by [`crate::eval`]
//! and never escape as exceptions.

use crate::address::Address;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

#[derive(Debug, Clone, thiserror::Error)]
pub enum CoreError {
    #[error("workbook or sheet not found: {0}")]
    NotFound(String),

    #[error("cell address out of bounds: {0}")]
    OutOfBounds(String),

    #[error("invalid cell address: {0}")]
    InvalidAddress(String),

    #[error("#ERROR! formula parse error: {0}")]
    Parse(String),

    #[error("formula reference error: {0}")]
    Ref(String),

    #[error("#CYCLE! circular dependency through {0}")]
    Cycle(Address),

    #[error("version conflict at {0}")]
    VersionConflict(Address),

    #[error("edit cancelled")]
    Cancelled,
}

impl CoreError {
    fn status(&self) -> StatusCode {
        match self {
            CoreError::NotFound(_) => StatusCode::NOT_FOUND,
            CoreError::OutOfBounds(_) => StatusCode::BAD_REQUEST,
            CoreError::InvalidAddress(_) => StatusCode::BAD_REQUEST,
            CoreError::Parse(_) => StatusCode::BAD_REQUEST,
            CoreError::Ref(_) => StatusCode::BAD_REQUEST,
            CoreError::Cycle(_) => StatusCode::BAD_REQUEST,
            CoreError::VersionConflict(_) => StatusCode::CONFLICT,
            CoreError::Cancelled => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// The stable external code used in the §6 error-mapping table.
    fn code(&self) -> &'static str {
        match self {
            CoreError::NotFound(_) => "not-found",
            CoreError::OutOfBounds(_) => "bad-request",
            CoreError::InvalidAddress(_) => "bad-request",
            CoreError::Parse(_) => "bad-request",
            CoreError::Ref(_) => "bad-request",
            CoreError::Cycle(_) => "bad-request",
            CoreError::VersionConflict(_) => "conflict",
            CoreError::Cancelled => "cancelled",
        }
    }
}

impl IntoResponse for CoreError {
    fn into_response(self) -> Response {
        let body = json!({
            "error": self.code(),
            "message": self.to_string(),
        });
        (self.status(), axum::Json(body)).into_response()
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
