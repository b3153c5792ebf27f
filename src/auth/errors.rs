//! Authentication error types.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

use crate::jwt::JwtError;

/// Failure of a session primitive.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("not authenticated")]
    NotAuthenticated,
    #[error("invalid or expired token")]
    InvalidToken,
    #[error("refresh token revoked or unknown")]
    RevokedRefresh,
    #[error("role lookup failed: {0}")]
    RoleLookupFailure(String),
    #[error(transparent)]
    TokenIssue(#[from] JwtError),
}

impl AuthError {
    /// Whether the failure is the caller's fault (bad or missing credentials)
    /// rather than an internal one.
    pub fn is_credential_failure(&self) -> bool {
        matches!(
            self,
            AuthError::NotAuthenticated | AuthError::InvalidToken | AuthError::RevokedRefresh
        )
    }
}

/// Rejection for API requests that fail authentication or authorization.
/// Always rendered as a terse JSON body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiAuthError {
    Unauthorized,
    Forbidden,
}

impl IntoResponse for ApiAuthError {
    fn into_response(self) -> Response {
        #[derive(Serialize)]
        struct ErrorResponse {
            error: &'static str,
        }

        let (status, error) = match self {
            ApiAuthError::Unauthorized => (StatusCode::UNAUTHORIZED, "Unauthorized"),
            ApiAuthError::Forbidden => (StatusCode::FORBIDDEN, "Forbidden"),
        };
        (status, Json(ErrorResponse { error })).into_response()
    }
}
