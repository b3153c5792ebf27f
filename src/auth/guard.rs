//! Request guard mounted in front of every route.
//!
//! The decision is computed by [`AuthBackend::decide`] and applied by the
//! [`auth_guard`] middleware. Path classification always happens before any
//! token work, so public routes never touch the registry.

use axum::{
    extract::{Request, State},
    http::{HeaderMap, HeaderName, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use serde_json::json;
use std::sync::Arc;
use tracing::debug;

use super::cookie::{ACCESS_COOKIE_NAME, REFRESH_COOKIE_NAME, SetCookies, extract_bearer, get_cookie};
use super::errors::ApiAuthError;
use super::routes::{RouteClass, RouteTable};
use super::state::AuthBackend;
use super::types::AuthenticatedUser;

pub const AUTH_DEBUG_HEADER: &str = "x-auth-debug";

/// What the guard learned about the caller's credentials.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No credentials presented
    Unauthenticated,
    AccessValid,
    AccessExpiredRefreshValid,
    /// Credentials presented but none usable
    FullyInvalid,
}

impl SessionState {
    fn as_str(self) -> &'static str {
        match self {
            SessionState::Unauthenticated => "unauthenticated",
            SessionState::AccessValid => "access-valid",
            SessionState::AccessExpiredRefreshValid => "refreshed",
            SessionState::FullyInvalid => "invalid",
        }
    }
}

#[derive(Debug)]
pub enum GuardOutcome {
    /// Forward to the handler, with the caller's identity when known.
    Pass { user: Option<AuthenticatedUser> },
    /// 307 to `location`.
    Redirect { location: String },
    /// 401 JSON for API callers.
    Unauthorized,
}

#[derive(Debug)]
pub struct GuardDecision {
    pub outcome: GuardOutcome,
    /// Cookies to attach to whatever response is sent.
    pub cookies: SetCookies,
    /// `None` when the route did not require looking at credentials.
    pub state: Option<SessionState>,
    pub class: Option<RouteClass>,
    pub action: &'static str,
}

impl GuardDecision {
    fn debug_json(&self, path: &str) -> String {
        let mut value = json!({
            "path": path,
            "action": self.action,
        });
        if let Some(class) = self.class {
            value["isApi"] = json!(class.is_api);
            value["needsAuth"] = json!(class.needs_auth);
            value["isPublic"] = json!(class.is_public);
        }
        if let Some(state) = self.state {
            value["state"] = json!(state.as_str());
            value["authed"] = json!(matches!(
                state,
                SessionState::AccessValid | SessionState::AccessExpiredRefreshValid
            ));
        }
        value.to_string()
    }
}

fn has_credentials(headers: &HeaderMap) -> bool {
    get_cookie(headers, ACCESS_COOKIE_NAME).is_some_and(|v| !v.is_empty())
        || get_cookie(headers, REFRESH_COOKIE_NAME).is_some_and(|v| !v.is_empty())
        || extract_bearer(headers).is_some()
}

fn with_query(path: &str, query: Option<&str>) -> String {
    match query.filter(|q| !q.is_empty()) {
        Some(query) => format!("{path}?{query}"),
        None => path.to_string(),
    }
}

fn login_redirect(routes: &RouteTable, path: &str, query: Option<&str>) -> String {
    let from = url::form_urlencoded::Serializer::new(String::new())
        .append_pair("from", &with_query(path, query))
        .finish();
    format!("{}?{}", routes.login_path, from)
}

impl AuthBackend {
    pub async fn decide(
        &self,
        routes: &RouteTable,
        path: &str,
        query: Option<&str>,
        headers: &HeaderMap,
    ) -> GuardDecision {
        let failed_state = if has_credentials(headers) {
            SessionState::FullyInvalid
        } else {
            SessionState::Unauthenticated
        };

        // Landing and login pages bounce signed-in users home
        if routes.is_landing(path) || routes.is_login(path) {
            if self.get_user_from_request(headers).is_some() {
                return GuardDecision {
                    outcome: GuardOutcome::Redirect {
                        location: routes.home_path.clone(),
                    },
                    cookies: self.cookie_jar(),
                    state: Some(SessionState::AccessValid),
                    class: None,
                    action: "redirect-home",
                };
            }

            let mut cookies = self.cookie_jar();
            return match self.refresh_access_token(headers, Some(&mut cookies)).await {
                Ok(_) => GuardDecision {
                    outcome: GuardOutcome::Redirect {
                        location: routes.home_path.clone(),
                    },
                    cookies,
                    state: Some(SessionState::AccessExpiredRefreshValid),
                    class: None,
                    action: "redirect-home",
                },
                Err(e) => {
                    debug!(path = %path, error = %e, "No session on landing page");
                    GuardDecision {
                        outcome: GuardOutcome::Pass { user: None },
                        cookies: self.cookie_jar(),
                        state: Some(failed_state),
                        class: None,
                        action: if routes.is_login(path) {
                            "show-login"
                        } else {
                            "show-landing"
                        },
                    }
                }
            };
        }

        let class = routes.classify(path);
        if class.passes_without_auth() {
            return GuardDecision {
                outcome: GuardOutcome::Pass { user: None },
                cookies: self.cookie_jar(),
                state: None,
                class: Some(class),
                action: "pass",
            };
        }

        if let Some(user) = self.get_user_from_request(headers) {
            return GuardDecision {
                outcome: GuardOutcome::Pass { user: Some(user) },
                cookies: self.cookie_jar(),
                state: Some(SessionState::AccessValid),
                class: Some(class),
                action: "pass",
            };
        }

        let mut cookies = self.cookie_jar();
        match self.refresh_access_token(headers, Some(&mut cookies)).await {
            Ok(session) if class.is_api => GuardDecision {
                outcome: GuardOutcome::Pass {
                    user: Some(session.user),
                },
                cookies,
                state: Some(SessionState::AccessExpiredRefreshValid),
                class: Some(class),
                action: "pass-refreshed",
            },
            Ok(_) => GuardDecision {
                outcome: GuardOutcome::Redirect {
                    location: with_query(path, query),
                },
                cookies,
                state: Some(SessionState::AccessExpiredRefreshValid),
                class: Some(class),
                action: "redirect-refreshed",
            },
            Err(e) => {
                debug!(path = %path, error = %e, "Guard rejected request");
                let outcome = if class.is_api {
                    GuardOutcome::Unauthorized
                } else {
                    GuardOutcome::Redirect {
                        location: login_redirect(routes, path, query),
                    }
                };
                GuardDecision {
                    outcome,
                    cookies: self.cookie_jar(),
                    state: Some(failed_state),
                    class: Some(class),
                    action: if class.is_api {
                        "unauthorized"
                    } else {
                        "redirect-login"
                    },
                }
            }
        }
    }
}

/// Middleware state.
#[derive(Clone)]
pub struct GuardState {
    pub auth: AuthBackend,
    pub routes: Arc<RouteTable>,
}

/// Axum middleware applying the guard decision.
pub async fn auth_guard(
    State(state): State<GuardState>,
    mut request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path().to_string();
    let query = request.uri().query().map(str::to_string);

    let decision = state
        .auth
        .decide(&state.routes, &path, query.as_deref(), request.headers())
        .await;

    let debug_header = state
        .auth
        .settings
        .debug_headers
        .then(|| decision.debug_json(&path));

    let GuardDecision {
        outcome, cookies, ..
    } = decision;

    let mut response = match outcome {
        GuardOutcome::Pass { user } => {
            if let Some(user) = user {
                request.extensions_mut().insert(user);
            }
            next.run(request).await
        }
        GuardOutcome::Redirect { location } => Redirect::temporary(&location).into_response(),
        GuardOutcome::Unauthorized => ApiAuthError::Unauthorized.into_response(),
    };

    cookies.append_to(response.headers_mut());
    if let Some(debug_header) = debug_header {
        if let Ok(value) = HeaderValue::from_str(&debug_header) {
            response
                .headers_mut()
                .insert(HeaderName::from_static(AUTH_DEBUG_HEADER), value);
        }
    }
    response
}
