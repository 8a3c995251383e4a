//! Refresh cookie parsing and construction.

use axum::http::header;

/// Cookie name for the refresh token.
pub const REFRESH_COOKIE_NAME: &str = "refresh_token";

/// Default cookie path. The refresh cookie is only ever sent to the refresh
/// endpoint, so a deployment under a prefix must pass the public path instead.
pub const REFRESH_COOKIE_PATH: &str = "/refresh";

/// Extract a cookie value from the Cookie header.
pub fn get_cookie<'a>(headers: &'a axum::http::HeaderMap, name: &str) -> Option<&'a str> {
    for value in headers.get_all(header::COOKIE) {
        let Ok(cookie_header) = value.to_str() else {
            continue;
        };
        for part in cookie_header.split(';') {
            let part = part.trim();
            if let Some((key, value)) = part.split_once('=') {
                if key.trim() == name {
                    return Some(value.trim());
                }
            }
        }
    }
    None
}

/// Set-Cookie value carrying a refresh token.
pub fn refresh_cookie(token: &str, max_age_secs: u64, path: &str, secure: bool) -> String {
    format!(
        "{}={}; HttpOnly; SameSite=Strict; Path={}; Max-Age={}{}",
        REFRESH_COOKIE_NAME,
        token,
        path,
        max_age_secs,
        secure_attr(secure)
    )
}

/// Set-Cookie value that removes the refresh cookie.
pub fn clear_refresh_cookie(path: &str, secure: bool) -> String {
    format!(
        "{}=; HttpOnly; SameSite=Strict; Path={}; Max-Age=0{}",
        REFRESH_COOKIE_NAME,
        path,
        secure_attr(secure)
    )
}

fn secure_attr(secure: bool) -> &'static str {
    if secure { "; Secure" } else { "" }
}
