//! Restaurant management endpoints.
//!
//! - GET `/restaurants/{id}/reservations` - All bookings for a restaurant

use axum::{
    Json, Router,
    extract::{Path, State},
    response::IntoResponse,
    routing::get,
};
use serde_json::json;
use tracing::info;

use super::error::{ApiError, ResultExt};
use super::reservations::ReservationResponse;
use crate::auth::roles::{ADMIN, MANAGER, OWNER, ScopeType};
use crate::auth::{ApiAuthError, AuthBackend, CurrentUser, ScopeQuery};
use crate::db::Database;
use crate::impl_has_auth_backend;

#[derive(Clone)]
pub struct ManagementState {
    pub db: Database,
    pub auth: AuthBackend,
}

impl_has_auth_backend!(ManagementState);

pub fn router(state: ManagementState) -> Router {
    Router::new()
        .route("/restaurants/{id}/reservations", get(list_reservations))
        .with_state(state)
}

/// A manager of this restaurant, or a global owner or admin.
async fn can_manage(auth: &AuthBackend, user_id: &str, restaurant_id: &str) -> bool {
    auth.roles
        .has_role_for_user(user_id, MANAGER, &ScopeQuery::restaurant(restaurant_id))
        .await
        || auth
            .roles
            .has_any_role_for_user(
                user_id,
                &[OWNER, ADMIN],
                &ScopeQuery::within(ScopeType::Global),
            )
            .await
}

async fn list_reservations(
    State(state): State<ManagementState>,
    CurrentUser(user): CurrentUser,
    Path(restaurant_id): Path<String>,
) -> Result<axum::response::Response, ApiError> {
    if !can_manage(&state.auth, &user.id, &restaurant_id).await {
        info!(user_id = %user.id, restaurant_id = %restaurant_id, "Management access denied");
        return Ok(ApiAuthError::Forbidden.into_response());
    }

    let reservations: Vec<ReservationResponse> = state
        .db
        .reservations()
        .list_for_restaurant(&restaurant_id)
        .await
        .db_err("Failed to list reservations")?
        .into_iter()
        .map(ReservationResponse::from)
        .collect();

    Ok(Json(json!({ "reservations": reservations })).into_response())
}
