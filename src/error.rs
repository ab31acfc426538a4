//! Typed errors and HTTP mapping.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    /// Update/remove target does not exist. Raised before any mutation.
    #[error("record not found")]
    RecordNotFound,
    /// Token undecodable or resolving to no matching user.
    #[error("invalid token")]
    InvalidToken,
    /// Primary-data access denied by the authorization collaborator.
    /// Included-resource filtering never raises this; it silently drops.
    #[error("access denied: {0}")]
    Unauthorized(String),
    #[error("unknown resource type: {0}")]
    UnknownType(String),
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("database: {0}")]
    Db(#[from] sqlx::Error),
    #[error("internal: {0}")]
    Internal(String),
}

/// One member of a JSON:API `errors` document.
#[derive(Serialize)]
pub struct ErrorObject {
    pub status: u16,
    pub code: String,
    pub detail: String,
}

#[derive(Serialize)]
pub struct ErrorsDocument {
    pub errors: Vec<ErrorObject>,
}

impl ApiError {
    pub fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::RecordNotFound => (StatusCode::NOT_FOUND, "record_not_found"),
            ApiError::InvalidToken => (StatusCode::UNAUTHORIZED, "invalid_token"),
            ApiError::Unauthorized(_) => (StatusCode::FORBIDDEN, "forbidden"),
            ApiError::UnknownType(_) => (StatusCode::NOT_FOUND, "unknown_type"),
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            ApiError::Db(e) => {
                if let sqlx::Error::RowNotFound = e {
                    (StatusCode::NOT_FOUND, "record_not_found")
                } else {
                    (StatusCode::INTERNAL_SERVER_ERROR, "database_error")
                }
            }
            ApiError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        let body = ErrorsDocument {
            errors: vec![ErrorObject {
                status: status.as_u16(),
                code: code.to_string(),
                detail: self.to_string(),
            }],
        };
        (status, Json(body)).into_response()
    }
}
