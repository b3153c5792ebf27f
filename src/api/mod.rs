mod admin;
mod auth;
mod error;
mod management;
mod reservations;

use axum::Router;
use std::sync::Arc;

use crate::auth::AuthBackend;
use crate::cache::KeyValueStore;
use crate::db::Database;

pub use error::ApiError;
pub use reservations::SlotLocks;

/// Create the API router.
pub fn create_api_router(
    db: Database,
    auth: AuthBackend,
    cache: Arc<dyn KeyValueStore>,
) -> Router {
    let auth_state = auth::AuthApiState {
        db: db.clone(),
        auth: auth.clone(),
    };

    let reservations_state = reservations::ReservationsState {
        db: db.clone(),
        auth: auth.clone(),
        cache,
        locks: SlotLocks::default(),
    };

    let management_state = management::ManagementState {
        db: db.clone(),
        auth: auth.clone(),
    };

    let admin_state = admin::AdminState { db, auth };

    Router::new()
        .nest("/auth", auth::router(auth_state))
        .nest("/reservations", reservations::router(reservations_state))
        .nest("/management", management::router(management_state))
        .nest("/admin", admin::router(admin_state))
}
