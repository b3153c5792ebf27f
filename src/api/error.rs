//! Failures the booking and account endpoints report to clients.
//!
//! Every variant renders as `{"error": <message>}` with its status code.
//! Storage failures are logged with their context and reported generically.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

#[derive(Debug, Error)]
pub enum ApiError {
    /// Missing or malformed request fields.
    #[error("{0}")]
    Invalid(String),
    #[error("Invalid phone or password")]
    InvalidCredentials,
    /// Unknown, or not visible to the caller.
    #[error("{0} not found")]
    Missing(&'static str),
    #[error("Phone number already registered")]
    PhoneTaken,
    #[error("No availability for selected time and table size")]
    NoCapacity,
    #[error("Database error")]
    Storage,
    #[error("Service temporarily unavailable")]
    StoreUnavailable,
    #[error("{0}")]
    Internal(&'static str),
}

impl ApiError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::Invalid(msg.into())
    }

    pub fn storage(context: &str, e: impl std::fmt::Display) -> Self {
        error!("{}: {}", context, e);
        Self::Storage
    }

    pub fn store_unavailable(context: &str, e: impl std::fmt::Display) -> Self {
        error!("{}: {}", context, e);
        Self::StoreUnavailable
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Invalid(_) => StatusCode::BAD_REQUEST,
            ApiError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            ApiError::Missing(_) => StatusCode::NOT_FOUND,
            ApiError::PhoneTaken | ApiError::NoCapacity => StatusCode::CONFLICT,
            ApiError::StoreUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Storage | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(json!({ "error": self.to_string() }))).into_response()
    }
}

/// Map database and key-value store failures onto [`ApiError`].
pub trait ResultExt<T> {
    fn db_err(self, context: &str) -> Result<T, ApiError>;
    fn cache_err(self, context: &str) -> Result<T, ApiError>;
}

impl<T, E: std::fmt::Display> ResultExt<T> for Result<T, E> {
    fn db_err(self, context: &str) -> Result<T, ApiError> {
        self.map_err(|e| ApiError::storage(context, e))
    }

    fn cache_err(self, context: &str) -> Result<T, ApiError> {
        self.map_err(|e| ApiError::store_unavailable(context, e))
    }
}

/// Require a non-blank string field, returning it trimmed.
pub fn required<'a>(value: Option<&'a str>, msg: &str) -> Result<&'a str, ApiError> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ApiError::invalid(msg))
}
