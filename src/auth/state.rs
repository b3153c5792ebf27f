//! Authentication state shared by the guard, extractors and handlers.

use std::sync::Arc;

use super::registry::RefreshRegistry;
use super::roles::RoleResolver;
use crate::jwt::JwtConfig;
use crate::server_config::AuthSettings;

/// Everything the session primitives need.
#[derive(Clone)]
pub struct AuthBackend {
    pub jwt: Arc<JwtConfig>,
    pub registry: RefreshRegistry,
    pub roles: RoleResolver,
    pub settings: Arc<AuthSettings>,
}

/// Trait for state types that carry an [`AuthBackend`].
pub trait HasAuthBackend {
    fn auth(&self) -> &AuthBackend;
}

impl HasAuthBackend for AuthBackend {
    fn auth(&self) -> &AuthBackend {
        self
    }
}

/// Implement `HasAuthBackend` for state structs with an `auth: AuthBackend` field.
///
/// # Example
/// ```ignore
/// use crate::impl_has_auth_backend;
///
/// #[derive(Clone)]
/// pub struct MyState {
///     pub db: Database,
///     pub auth: AuthBackend,
/// }
///
/// impl_has_auth_backend!(MyState);
/// ```
#[macro_export]
macro_rules! impl_has_auth_backend {
    ($state_type:ty) => {
        impl $crate::auth::HasAuthBackend for $state_type {
            fn auth(&self) -> &$crate::auth::AuthBackend {
                &self.auth
            }
        }
    };
}
