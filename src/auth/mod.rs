//! JWT sessions with scoped role-based access control.
//!
//! Dual-token system: short-lived access tokens (15 min, stateless) and
//! long-lived refresh tokens (2 weeks, registry-tracked and rotated on use).
//! The guard middleware refreshes expired sessions transparently on the
//! routes it protects.

mod cookie;
mod errors;
mod extractors;
mod guard;
mod password;
mod registry;
pub mod roles;
mod routes;
mod session;
mod state;
mod types;

pub use cookie::{
    ACCESS_COOKIE_NAME, REFRESH_COOKIE_NAME, SetCookies, extract_bearer, get_cookie,
};
pub use errors::{ApiAuthError, AuthError};
pub use extractors::{AdminOnly, Authorized, CurrentUser, MaybeUser, RoleConstraint};
pub use guard::{
    AUTH_DEBUG_HEADER, GuardDecision, GuardOutcome, GuardState, SessionState, auth_guard,
};
pub use password::{PasswordError, hash_password, verify_password};
pub use registry::RefreshRegistry;
pub use roles::{RoleAssignment, RoleResolver, ScopeQuery, ScopeType, user_has_role};
pub use routes::{PathRule, RouteClass, RouteTable, normalize_path};
pub use state::{AuthBackend, HasAuthBackend};
pub use types::{AuthenticatedUser, RefreshedSession};
