//! Cookie transport for access and refresh tokens.

use axum::http::{HeaderMap, header};

use crate::jwt::IssuedToken;

/// Cookie name for the access token.
pub const ACCESS_COOKIE_NAME: &str = "accessToken";

/// Cookie name for the refresh token.
pub const REFRESH_COOKIE_NAME: &str = "refreshToken";

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

/// Extract the access token: the `accessToken` cookie, else an
/// `Authorization: Bearer` header.
pub fn access_token_from_headers(headers: &HeaderMap) -> Option<&str> {
    if let Some(token) = get_cookie(headers, ACCESS_COOKIE_NAME).filter(|t| !t.is_empty()) {
        return Some(token);
    }

    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.trim().split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

/// Extract the refresh token. Only the cookie is accepted.
pub fn refresh_token_from_headers(headers: &HeaderMap) -> Option<&str> {
    get_cookie(headers, REFRESH_COOKIE_NAME).filter(|t| !t.is_empty())
}

/// Deployment-specific cookie attributes.
#[derive(Debug, Clone, Default)]
pub struct CookieSettings {
    pub domain: Option<String>,
    pub secure: bool,
}

impl CookieSettings {
    fn build(&self, name: &str, value: &str, max_age: u64) -> String {
        let domain = match &self.domain {
            Some(domain) => format!("; Domain={}", domain),
            None => String::new(),
        };
        let secure = if self.secure { "; Secure" } else { "" };
        format!(
            "{}={}; HttpOnly; SameSite=Strict; Path=/; Max-Age={}{}{}",
            name, value, max_age, domain, secure
        )
    }

    pub fn access_cookie(&self, token: &IssuedToken) -> String {
        self.build(ACCESS_COOKIE_NAME, &token.token, token.duration)
    }

    pub fn refresh_cookie(&self, token: &IssuedToken) -> String {
        self.build(REFRESH_COOKIE_NAME, &token.token, token.duration)
    }

    /// Cookies that remove both tokens from the client.
    pub fn clear_all(&self) -> [String; 2] {
        [
            self.build(ACCESS_COOKIE_NAME, "", 0),
            self.build(REFRESH_COOKIE_NAME, "", 0),
        ]
    }
}
