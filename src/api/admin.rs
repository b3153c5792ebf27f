//! Admin API endpoints.
//!
//! All endpoints require a global OWNER or ADMIN role.

use axum::{
    Json, Router,
    extract::{Path, State},
    response::IntoResponse,
    routing::{delete, get},
};
use serde_json::json;
use tracing::info;

use super::error::{ApiError, ResultExt};
use crate::auth::{AdminOnly, AuthBackend, Authorized};
use crate::db::Database;
use crate::impl_has_auth_backend;

/// State for admin endpoints.
#[derive(Clone)]
pub struct AdminState {
    pub db: Database,
    pub auth: AuthBackend,
}

impl_has_auth_backend!(AdminState);

pub fn router(state: AdminState) -> Router {
    Router::new()
        .route("/users/{id}/roles", get(user_roles))
        .route("/tokens/{jti}", delete(revoke_token))
        .with_state(state)
}

/// Role assignments of any user.
async fn user_roles(
    State(state): State<AdminState>,
    _auth: Authorized<AdminOnly>,
    Path(user_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .db
        .users()
        .get_by_id(&user_id)
        .await
        .db_err("Failed to load user")?
        .ok_or_else(|| ApiError::Missing("User"))?;

    let roles = state
        .auth
        .roles
        .get_user_roles(&user_id)
        .await
        .db_err("Failed to load roles")?;

    Ok(Json(json!({ "userId": user_id, "roles": roles })))
}

/// Revoke a refresh token by its JTI. The holder's next refresh fails.
async fn revoke_token(
    State(state): State<AdminState>,
    auth: Authorized<AdminOnly>,
    Path(jti): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let revoked = state
        .auth
        .registry
        .revoke(&jti)
        .await
        .cache_err("Failed to revoke refresh token")?;

    info!(admin_id = %auth.user().id, jti = %jti, revoked, "Refresh token revoked by admin");
    Ok(Json(json!({ "revoked": revoked })))
}
