//! Authentication user types.

use serde::Serialize;

/// Identity carried by a verified token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthenticatedUser {
    /// User id (token subject)
    pub id: String,
    pub phone: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Outcome of a successful silent refresh.
#[derive(Debug, Clone)]
pub struct RefreshedSession {
    /// Newly minted access token
    pub access_token: String,
    pub user: AuthenticatedUser,
    /// Whether the refresh token was rotated as part of this refresh
    pub rotated: bool,
}
