//! Session primitives shared by the guard and the route handlers.
//!
//! Access tokens are stateless. Refresh tokens carry a JTI that must still be
//! present in the registry; every refresh on a path that can set cookies
//! rotates the JTI.

use axum::http::HeaderMap;
use tracing::{debug, info, warn};

use super::cookie::{ACCESS_COOKIE_NAME, REFRESH_COOKIE_NAME, SetCookies, extract_bearer, get_cookie};
use super::errors::AuthError;
use super::state::AuthBackend;
use super::types::{AuthenticatedUser, RefreshedSession};

impl AuthBackend {
    /// Fresh cookie jar honouring the configured `Secure` flag.
    pub fn cookie_jar(&self) -> SetCookies {
        SetCookies::new(self.settings.secure_cookies)
    }

    /// Identity from a valid access token: the cookie first, then a bearer
    /// header. Never touches the registry.
    pub fn get_user_from_request(&self, headers: &HeaderMap) -> Option<AuthenticatedUser> {
        let token = get_cookie(headers, ACCESS_COOKIE_NAME)
            .filter(|t| !t.is_empty())
            .or_else(|| extract_bearer(headers))?;
        self.jwt.validate_access_token(token).ok()?.user()
    }

    /// Mint a new access token from the refresh cookie.
    ///
    /// When `cookies` is given the refresh token is rotated and both new
    /// cookies are pushed onto it. Without it, nothing is rotated and the
    /// caller is responsible for delivering the returned access token.
    pub async fn refresh_access_token(
        &self,
        headers: &HeaderMap,
        cookies: Option<&mut SetCookies>,
    ) -> Result<RefreshedSession, AuthError> {
        let refresh_token =
            get_cookie(headers, REFRESH_COOKIE_NAME).ok_or(AuthError::NotAuthenticated)?;
        let claims = self
            .jwt
            .validate_refresh_token(refresh_token)
            .map_err(|_| AuthError::InvalidToken)?;
        let user = claims.user().ok_or(AuthError::InvalidToken)?;

        let mut rotated = false;
        let cookies = match claims.registry_jti() {
            Some(jti) => {
                let present = match self.registry.exists(jti).await {
                    Ok(present) => present,
                    Err(e) => {
                        let allow = self.settings.registry_policy.on_unavailable();
                        warn!(error = %e, allow, "Refresh registry unavailable");
                        allow
                    }
                };
                if !present {
                    debug!(user_id = %user.id, "Refresh token not in registry");
                    return Err(AuthError::RevokedRefresh);
                }

                match cookies {
                    Some(cookies) => {
                        let next = self.jwt.generate_refresh_token(&user, None)?;
                        if let Err(e) = self
                            .registry
                            .rotate(jti, &next.jti, &user.id, next.duration)
                            .await
                        {
                            warn!(user_id = %user.id, error = %e, "Failed to rotate refresh token");
                        }
                        cookies.push_refresh(&next.token, next.duration);
                        rotated = true;
                        Some(cookies)
                    }
                    None => None,
                }
            }
            None => cookies,
        };

        let access = self.jwt.generate_access_token(&user)?;
        if let Some(cookies) = cookies {
            cookies.push_access(&access.token, access.duration);
        }

        Ok(RefreshedSession {
            access_token: access.token,
            user,
            rotated,
        })
    }

    /// Issue a new access/refresh pair for `user` and record the refresh JTI.
    pub async fn issue_session(
        &self,
        user: &AuthenticatedUser,
        cookies: &mut SetCookies,
    ) -> Result<(), AuthError> {
        let access = self.jwt.generate_access_token(user)?;
        let refresh = self.jwt.generate_refresh_token(user, None)?;

        if let Err(e) = self
            .registry
            .store(&refresh.jti, &user.id, refresh.duration)
            .await
        {
            warn!(user_id = %user.id, error = %e, "Failed to record refresh token");
        }

        cookies.push_access(&access.token, access.duration);
        cookies.push_refresh(&refresh.token, refresh.duration);
        info!(user_id = %user.id, "Session issued");
        Ok(())
    }

    /// Revoke the presented refresh token, if any, and clear both cookies.
    pub async fn end_session(&self, headers: &HeaderMap, cookies: &mut SetCookies) {
        if let Some(token) = get_cookie(headers, REFRESH_COOKIE_NAME) {
            if let Ok(claims) = self.jwt.validate_refresh_token(token) {
                if let Some(jti) = claims.registry_jti() {
                    if let Err(e) = self.registry.revoke(jti).await {
                        warn!(user_id = %claims.sub, error = %e, "Failed to revoke refresh token");
                    }
                }
            }
        }
        cookies.clear_all();
    }
}
