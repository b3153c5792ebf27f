//! Axum extractors for authentication.

use std::marker::PhantomData;

use axum::{extract::FromRequestParts, http::request::Parts};

use super::errors::ApiAuthError;
use super::roles::{ADMIN, OWNER, ScopeQuery};
use super::state::HasAuthBackend;
use super::types::AuthenticatedUser;

/// Identity placed in extensions by the guard, else read from the access token.
fn identify<S: HasAuthBackend>(parts: &Parts, state: &S) -> Option<AuthenticatedUser> {
    parts
        .extensions
        .get::<AuthenticatedUser>()
        .cloned()
        .or_else(|| state.auth().get_user_from_request(&parts.headers))
}

/// Extractor for endpoints that require a signed-in user.
/// Rejects with 401 JSON; never refreshes on its own.
pub struct CurrentUser(pub AuthenticatedUser);

impl<S> FromRequestParts<S> for CurrentUser
where
    S: HasAuthBackend + Send + Sync,
{
    type Rejection = ApiAuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        identify(parts, state)
            .map(CurrentUser)
            .ok_or(ApiAuthError::Unauthorized)
    }
}

/// Optional authentication extractor - never fails.
pub struct MaybeUser(pub Option<AuthenticatedUser>);

impl<S> FromRequestParts<S> for MaybeUser
where
    S: HasAuthBackend + Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        Ok(MaybeUser(identify(parts, state)))
    }
}

/// Role requirement checked by [`Authorized`].
pub trait RoleConstraint {
    /// Any of these roles is enough.
    const ROLES: &'static [&'static str];

    fn scope() -> ScopeQuery {
        ScopeQuery::any()
    }
}

/// Global OWNER or ADMIN.
pub struct AdminOnly;

impl RoleConstraint for AdminOnly {
    const ROLES: &'static [&'static str] = &[OWNER, ADMIN];

    fn scope() -> ScopeQuery {
        ScopeQuery::within(super::roles::ScopeType::Global)
    }
}

/// Extractor for endpoints gated on a role: 401 when signed out,
/// 403 when signed in without the role.
pub struct Authorized<R: RoleConstraint> {
    pub user: AuthenticatedUser,
    _role: PhantomData<R>,
}

impl<R: RoleConstraint> Authorized<R> {
    pub fn user(&self) -> &AuthenticatedUser {
        &self.user
    }
}

impl<S, R> FromRequestParts<S> for Authorized<R>
where
    S: HasAuthBackend + Send + Sync,
    R: RoleConstraint + Send,
{
    type Rejection = ApiAuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let user = identify(parts, state).ok_or(ApiAuthError::Unauthorized)?;

        let allowed = state
            .auth()
            .roles
            .has_any_role_for_user(&user.id, R::ROLES, &R::scope())
            .await;
        if !allowed {
            tracing::info!(user_id = %user.id, roles = ?R::ROLES, "Role check failed");
            return Err(ApiAuthError::Forbidden);
        }

        Ok(Authorized {
            user,
            _role: PhantomData,
        })
    }
}
