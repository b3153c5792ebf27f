//! Account and session API endpoints.
//!
//! - POST `/register` - Create an account
//! - POST `/login` - Exchange phone and password for session cookies
//! - POST `/logout` - Revoke refresh token and clear cookies
//! - POST `/refresh` - Rotate the refresh token and mint a new access token
//! - GET `/me` - Current user, refreshing the access cookie when needed

use axum::{
    Json, Router,
    extract::State,
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{error, info, warn};

use super::error::{ApiError, ResultExt, required};
use crate::auth::{
    ApiAuthError, AuthBackend, AuthenticatedUser, RoleAssignment, hash_password,
    verify_password,
};
use crate::db::{Database, User, is_unique_violation};
use crate::impl_has_auth_backend;

const AUTH_ME_HEADER: HeaderName = HeaderName::from_static("x-auth-me");

#[derive(Clone)]
pub struct AuthApiState {
    pub db: Database,
    pub auth: AuthBackend,
}

impl_has_auth_backend!(AuthApiState);

pub fn router(state: AuthApiState) -> Router {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/logout", post(logout))
        .route("/refresh", post(refresh))
        .route("/me", get(me))
        .with_state(state)
}

#[derive(Debug, Serialize)]
struct UserResponse {
    id: String,
    phone: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    roles: Option<Vec<RoleAssignment>>,
}

impl From<&User> for UserResponse {
    fn from(user: &User) -> Self {
        Self {
            id: user.id.clone(),
            phone: user.phone.clone(),
            name: user.name.clone(),
            roles: None,
        }
    }
}

impl From<&User> for AuthenticatedUser {
    fn from(user: &User) -> Self {
        Self {
            id: user.id.clone(),
            phone: user.phone.clone(),
            name: user.name.clone(),
        }
    }
}

#[derive(Deserialize)]
struct RegisterRequest {
    phone: Option<String>,
    password: Option<String>,
    name: Option<String>,
}

async fn register(
    State(state): State<AuthApiState>,
    Json(body): Json<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let phone = required(body.phone.as_deref(), "phone and password are required")?;
    let password = required(body.password.as_deref(), "phone and password are required")?;
    let name = body
        .name
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty());

    let password_hash = hash_password(password).map_err(|e| {
        error!("Failed to hash password: {}", e);
        ApiError::Internal("Failed to create account")
    })?;

    let id = match state.db.users().create(phone, name, &password_hash).await {
        Ok(id) => id,
        Err(e) if is_unique_violation(&e) => {
            return Err(ApiError::PhoneTaken);
        }
        Err(e) => return Err(ApiError::storage("Failed to create user", e)),
    };

    let user = state
        .db
        .users()
        .get_by_id(&id)
        .await
        .db_err("Failed to load user")?
        .ok_or_else(|| ApiError::Internal("User vanished after insert"))?;

    info!(user_id = %id, "User registered");
    Ok((
        StatusCode::CREATED,
        Json(json!({ "user": UserResponse::from(&user) })),
    ))
}

#[derive(Deserialize)]
struct LoginRequest {
    phone: Option<String>,
    password: Option<String>,
}

async fn login(
    State(state): State<AuthApiState>,
    Json(body): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let phone = required(body.phone.as_deref(), "phone and password are required")?;
    let password = required(body.password.as_deref(), "phone and password are required")?;

    let user = state
        .db
        .users()
        .get_by_phone(phone)
        .await
        .db_err("Failed to look up user")?;

    let Some(user) = user.filter(|u| verify_password(password, &u.password_hash).is_ok()) else {
        info!("Rejected login attempt");
        return Err(ApiError::InvalidCredentials);
    };

    let mut cookies = state.auth.cookie_jar();
    state
        .auth
        .issue_session(&AuthenticatedUser::from(&user), &mut cookies)
        .await
        .map_err(|e| {
            error!("Failed to issue session: {}", e);
            ApiError::Internal("Failed to generate token")
        })?;

    Ok((
        StatusCode::OK,
        cookies,
        Json(json!({ "user": UserResponse::from(&user) })),
    ))
}

async fn logout(State(state): State<AuthApiState>, headers: HeaderMap) -> impl IntoResponse {
    let mut cookies = state.auth.cookie_jar();
    state.auth.end_session(&headers, &mut cookies).await;

    (StatusCode::OK, cookies, Json(json!({ "success": true })))
}

async fn refresh(State(state): State<AuthApiState>, headers: HeaderMap) -> Response {
    let mut cookies = state.auth.cookie_jar();
    match state
        .auth
        .refresh_access_token(&headers, Some(&mut cookies))
        .await
    {
        Ok(session) => {
            info!(user_id = %session.user.id, rotated = session.rotated, "Session refreshed");
            (
                StatusCode::OK,
                cookies,
                Json(json!({ "success": true, "user": session.user })),
            )
                .into_response()
        }
        Err(e) if e.is_credential_failure() => ApiAuthError::Unauthorized.into_response(),
        Err(e) => {
            error!("Refresh failed: {}", e);
            ApiError::Internal("Failed to generate token").into_response()
        }
    }
}

fn not_authenticated() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({ "authenticated": false })),
    )
        .into_response()
}

async fn profile(state: &AuthApiState, user_id: &str) -> Result<Option<UserResponse>, ApiError> {
    let Some(user) = state
        .db
        .users()
        .get_by_id(user_id)
        .await
        .db_err("Failed to load user")?
    else {
        return Ok(None);
    };

    let roles = match state.auth.roles.get_user_roles(user_id).await {
        Ok(roles) => roles,
        Err(e) => {
            warn!(user_id = %user_id, error = %e, "Role lookup failed");
            Vec::new()
        }
    };

    Ok(Some(UserResponse {
        roles: Some(roles),
        ..UserResponse::from(&user)
    }))
}

async fn me(State(state): State<AuthApiState>, headers: HeaderMap) -> Result<Response, ApiError> {
    if let Some(token_user) = state.auth.get_user_from_request(&headers) {
        if let Some(user) = profile(&state, &token_user.id).await? {
            return Ok(Json(json!({ "authenticated": true, "user": user })).into_response());
        }
    }

    // Access cookie only; the refresh token is left unrotated
    let session = match state.auth.refresh_access_token(&headers, None).await {
        Ok(session) => session,
        Err(e) => {
            if !e.is_credential_failure() {
                error!("Failed to mint access token: {}", e);
            }
            return Ok(not_authenticated());
        }
    };

    let Some(user) = profile(&state, &session.user.id).await? else {
        return Ok(not_authenticated());
    };

    let mut cookies = state.auth.cookie_jar();
    cookies.push_access(&session.access_token, state.auth.jwt.access_ttl());

    Ok((
        cookies,
        [(AUTH_ME_HEADER, HeaderValue::from_static("refreshed"))],
        Json(json!({ "authenticated": true, "user": user, "refreshed": true })),
    )
        .into_response())
}
