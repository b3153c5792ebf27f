//! Runtime settings for the authentication core.
//!
//! Values are resolved once at startup from CLI arguments and environment
//! variables, then shared read-only across all request handlers.

/// Access token lifetime: 15 minutes.
pub const DEFAULT_ACCESS_TTL_SECS: u64 = 15 * 60;

/// Refresh token lifetime: 2 weeks.
pub const DEFAULT_REFRESH_TTL_SECS: u64 = 14 * 24 * 60 * 60;

/// Role cache lifetime: 1 minute.
pub const DEFAULT_ROLE_CACHE_TTL_SECS: u64 = 60;

/// Lower bound applied to the role cache TTL.
const MIN_ROLE_CACHE_TTL_SECS: u64 = 10;

/// Errors that make the server impossible to start.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("JWT_SECRET and NEXTAUTH_SECRET are both unset")]
    MissingSecret,
}

/// Deployment mode. Controls the default for the cookie `Secure` flag and
/// whether guard decisions are echoed in a debug header.
#[derive(clap::ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Environment {
    #[default]
    Development,
    Production,
}

/// What the refresh flow does when the registry cannot be reached.
///
/// `FailOpen` keeps users signed in through a cache outage at the cost of
/// honouring revoked refresh tokens until the store is back.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RegistryPolicy {
    #[default]
    FailOpen,
    FailClosed,
}

impl RegistryPolicy {
    /// Resolve an existence check that could not be answered.
    pub fn on_unavailable(self) -> bool {
        matches!(self, RegistryPolicy::FailOpen)
    }
}

/// Settings consumed by the auth guard, the role resolver and the cookie helpers.
/// Token lifetimes live on [`crate::jwt::JwtConfig`].
#[derive(Clone, Debug)]
pub struct AuthSettings {
    pub role_cache_ttl: u64,
    pub secure_cookies: bool,
    pub registry_policy: RegistryPolicy,
    /// Attach an `x-auth-debug` header describing each guard decision.
    pub debug_headers: bool,
}

impl AuthSettings {
    pub fn new(environment: Environment) -> Self {
        Self {
            role_cache_ttl: DEFAULT_ROLE_CACHE_TTL_SECS,
            secure_cookies: environment == Environment::Production,
            registry_policy: RegistryPolicy::default(),
            debug_headers: environment == Environment::Development,
        }
    }

    pub fn with_role_cache_ttl(mut self, raw: Option<&str>) -> Self {
        self.role_cache_ttl =
            read_seconds(raw, DEFAULT_ROLE_CACHE_TTL_SECS).max(MIN_ROLE_CACHE_TTL_SECS);
        self
    }

    pub fn with_cookie_secure(mut self, raw: Option<&str>, environment: Environment) -> Self {
        self.secure_cookies = resolve_secure_cookies(raw, environment);
        self
    }

    pub fn with_registry_policy(mut self, policy: RegistryPolicy) -> Self {
        self.registry_policy = policy;
        self
    }

    pub fn with_debug_headers(mut self, enabled: bool) -> Self {
        self.debug_headers = enabled;
        self
    }
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self::new(Environment::Development)
    }
}

/// Parse a whole number of seconds.
///
/// Missing, unparsable, non-finite and non-positive values fall back to
/// `fallback`; fractional values are floored.
pub fn read_seconds(raw: Option<&str>, fallback: u64) -> u64 {
    let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
        return fallback;
    };
    match raw.parse::<f64>() {
        Ok(n) if n.is_finite() && n >= 1.0 => n.floor() as u64,
        _ => fallback,
    }
}

/// `COOKIE_SECURE=true|false` wins; anything else defers to the environment.
pub fn resolve_secure_cookies(raw: Option<&str>, environment: Environment) -> bool {
    match raw.map(|s| s.trim().to_ascii_lowercase()).as_deref() {
        Some("true") => true,
        Some("false") => false,
        _ => environment == Environment::Production,
    }
}
