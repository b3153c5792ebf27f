//! JWT token generation and validation.

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::auth::AuthenticatedUser;
use crate::server_config::{ConfigError, DEFAULT_ACCESS_TTL_SECS, DEFAULT_REFRESH_TTL_SECS};

/// Token type for distinguishing access vs refresh tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenType {
    /// Short-lived access token - stateless, no JTI
    Access,
    /// Long-lived refresh token - gated by the refresh registry through its JTI
    Refresh,
}

/// JWT claims shared by both token types.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user id)
    pub sub: String,
    /// Phone number the user signs in with
    pub phone: String,
    /// Display name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Token type
    #[serde(rename = "typ")]
    pub token_type: TokenType,
    /// JWT ID, only present on refresh tokens
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jti: Option<String>,
    /// Issued at (Unix timestamp)
    pub iat: u64,
    /// Expiration time (Unix timestamp)
    pub exp: u64,
}

impl Claims {
    /// The identity carried by the token, if both subject and phone are present.
    pub fn user(&self) -> Option<AuthenticatedUser> {
        if self.sub.is_empty() || self.phone.is_empty() {
            return None;
        }
        Some(AuthenticatedUser {
            id: self.sub.clone(),
            phone: self.phone.clone(),
            name: self.name.clone(),
        })
    }

    /// The registry key, when the token is registry-gated.
    pub fn registry_jti(&self) -> Option<&str> {
        self.jti.as_deref().filter(|jti| !jti.is_empty())
    }
}

static SIGNING_SECRET: OnceLock<Vec<u8>> = OnceLock::new();

/// Process-wide signing secret, read from `JWT_SECRET` or `NEXTAUTH_SECRET`.
///
/// The first successful read is kept for the lifetime of the process. A
/// failed read is not cached, so a later call sees a secret set in between.
pub fn signing_secret() -> Result<&'static [u8], ConfigError> {
    if let Some(secret) = SIGNING_SECRET.get() {
        return Ok(secret);
    }
    let secret = resolve_secret(
        std::env::var("JWT_SECRET").ok(),
        std::env::var("NEXTAUTH_SECRET").ok(),
    )?;
    Ok(SIGNING_SECRET.get_or_init(|| secret.into_bytes()))
}

/// First non-empty candidate wins.
pub fn resolve_secret(
    jwt_secret: Option<String>,
    nextauth_secret: Option<String>,
) -> Result<String, ConfigError> {
    [jwt_secret, nextauth_secret]
        .into_iter()
        .flatten()
        .find(|s| !s.is_empty())
        .ok_or(ConfigError::MissingSecret)
}

/// Configuration for JWT operations.
#[derive(Clone)]
pub struct JwtConfig {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    access_ttl: u64,
    refresh_ttl: u64,
}

/// Result of generating an access token (no JTI).
#[derive(Debug, Clone)]
pub struct AccessTokenResult {
    /// The JWT token string
    pub token: String,
    /// Token duration in seconds
    pub duration: u64,
}

/// Result of generating a refresh token (with JTI for tracking).
#[derive(Debug, Clone)]
pub struct RefreshTokenResult {
    /// The JWT token string
    pub token: String,
    /// JWT ID (registry key)
    pub jti: String,
    /// Issued at timestamp (Unix seconds)
    pub issued_at: u64,
    /// Expiration timestamp (Unix seconds)
    pub expires_at: u64,
    /// Token duration in seconds
    pub duration: u64,
}

impl JwtConfig {
    /// Create a new JWT configuration with the given secret and default lifetimes.
    pub fn new(secret: &[u8]) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            access_ttl: DEFAULT_ACCESS_TTL_SECS,
            refresh_ttl: DEFAULT_REFRESH_TTL_SECS,
        }
    }

    /// Override token lifetimes. Zero keeps the current value.
    pub fn with_ttls(mut self, access_ttl: u64, refresh_ttl: u64) -> Self {
        if access_ttl > 0 {
            self.access_ttl = access_ttl;
        }
        if refresh_ttl > 0 {
            self.refresh_ttl = refresh_ttl;
        }
        self
    }

    pub fn access_ttl(&self) -> u64 {
        self.access_ttl
    }

    pub fn refresh_ttl(&self) -> u64 {
        self.refresh_ttl
    }

    /// Generate a stateless access token for a user.
    pub fn generate_access_token(
        &self,
        user: &AuthenticatedUser,
    ) -> Result<AccessTokenResult, JwtError> {
        let now = now_secs()?;

        let claims = Claims {
            sub: user.id.clone(),
            phone: user.phone.clone(),
            name: user.name.clone(),
            token_type: TokenType::Access,
            jti: None,
            iat: now,
            exp: now + self.access_ttl,
        };

        let token = jsonwebtoken::encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(JwtError::Encoding)?;

        Ok(AccessTokenResult {
            token,
            duration: self.access_ttl,
        })
    }

    /// Generate a refresh token for a user.
    /// A fresh JTI is generated unless one is supplied.
    pub fn generate_refresh_token(
        &self,
        user: &AuthenticatedUser,
        jti: Option<&str>,
    ) -> Result<RefreshTokenResult, JwtError> {
        let now = now_secs()?;

        let jti = match jti {
            Some(jti) if !jti.is_empty() => jti.to_string(),
            _ => uuid::Uuid::new_v4().to_string(),
        };
        let exp = now + self.refresh_ttl;

        let claims = Claims {
            sub: user.id.clone(),
            phone: user.phone.clone(),
            name: user.name.clone(),
            token_type: TokenType::Refresh,
            jti: Some(jti.clone()),
            iat: now,
            exp,
        };

        let token = jsonwebtoken::encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(JwtError::Encoding)?;

        Ok(RefreshTokenResult {
            token,
            jti,
            issued_at: now,
            expires_at: exp,
            duration: self.refresh_ttl,
        })
    }

    /// Check signature and expiry of any token issued by this service.
    ///
    /// Malformed, expired and wrongly-signed tokens all yield
    /// [`JwtError::InvalidToken`].
    pub fn verify(&self, token: &str) -> Result<Claims, JwtError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;

        jsonwebtoken::decode::<Claims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| {
                tracing::debug!(error = %e, "Token rejected");
                JwtError::InvalidToken
            })
    }

    /// Validate and decode an access token.
    pub fn validate_access_token(&self, token: &str) -> Result<Claims, JwtError> {
        let claims = self.verify(token)?;
        if claims.token_type != TokenType::Access {
            return Err(JwtError::InvalidToken);
        }
        Ok(claims)
    }

    /// Validate and decode a refresh token.
    pub fn validate_refresh_token(&self, token: &str) -> Result<Claims, JwtError> {
        let claims = self.verify(token)?;
        if claims.token_type != TokenType::Refresh {
            return Err(JwtError::InvalidToken);
        }
        Ok(claims)
    }
}

fn now_secs() -> Result<u64, JwtError> {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .map_err(|_| JwtError::TimeError)
}

/// Errors that can occur during JWT operations.
#[derive(Debug, thiserror::Error)]
pub enum JwtError {
    #[error("failed to encode token: {0}")]
    Encoding(jsonwebtoken::errors::Error),
    #[error("invalid token")]
    InvalidToken,
    #[error("system time error")]
    TimeError,
}
