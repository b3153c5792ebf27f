//! Cookie parsing and Set-Cookie construction for authentication.

use axum::http::{HeaderMap, HeaderValue, header};
use axum::response::{IntoResponseParts, ResponseParts};
use std::convert::Infallible;

/// Cookie name for the access token (short-lived, 15 minutes by default).
pub const ACCESS_COOKIE_NAME: &str = "access_token";

/// Cookie name for the refresh token (long-lived, 2 weeks by default).
pub const REFRESH_COOKIE_NAME: &str = "refresh_token";

/// Extract a cookie value from the Cookie header.
pub fn get_cookie<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    let cookie_header = headers.get(header::COOKIE)?.to_str().ok()?;
    for part in cookie_header.split(';') {
        let part = part.trim();
        if let Some((key, value)) = part.split_once('=') {
            if key.trim() == name {
                return Some(value.trim());
            }
        }
    }
    None
}

/// Extract a token from `Authorization: Bearer <token>`. The scheme is
/// matched case-insensitively.
pub fn extract_bearer(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

fn auth_cookie(name: &str, value: &str, max_age: u64, secure: bool) -> String {
    let secure = if secure { "; Secure" } else { "" };
    format!("{name}={value}; HttpOnly; SameSite=Lax; Path=/; Max-Age={max_age}{secure}")
}

/// Set-Cookie values collected while handling a request, applied to
/// whichever response ends up being sent.
#[derive(Debug, Clone, Default)]
pub struct SetCookies {
    secure: bool,
    cookies: Vec<String>,
}

impl SetCookies {
    pub fn new(secure: bool) -> Self {
        Self {
            secure,
            cookies: Vec::new(),
        }
    }

    pub fn push_access(&mut self, token: &str, max_age: u64) {
        self.cookies
            .push(auth_cookie(ACCESS_COOKIE_NAME, token, max_age, self.secure));
    }

    pub fn push_refresh(&mut self, token: &str, max_age: u64) {
        self.cookies
            .push(auth_cookie(REFRESH_COOKIE_NAME, token, max_age, self.secure));
    }

    /// Expire both auth cookies.
    pub fn clear_all(&mut self) {
        self.cookies
            .push(auth_cookie(ACCESS_COOKIE_NAME, "", 0, self.secure));
        self.cookies
            .push(auth_cookie(REFRESH_COOKIE_NAME, "", 0, self.secure));
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.cookies.iter().map(String::as_str)
    }

    pub fn append_to(&self, headers: &mut HeaderMap) {
        for cookie in &self.cookies {
            match HeaderValue::from_str(cookie) {
                Ok(value) => {
                    headers.append(header::SET_COOKIE, value);
                }
                Err(e) => tracing::error!(error = %e, "Invalid Set-Cookie value"),
            }
        }
    }
}

impl IntoResponseParts for SetCookies {
    type Error = Infallible;

    fn into_response_parts(self, mut res: ResponseParts) -> Result<ResponseParts, Self::Error> {
        self.append_to(res.headers_mut());
        Ok(res)
    }
}
