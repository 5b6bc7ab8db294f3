use std::hash::{Hash, Hasher};

use axum::http::{header, HeaderMap};

use crate::error::AppError;

pub fn extract_bearer_token(headers: &HeaderMap) -> Result<&str, AppError> {
    let header = headers
        .get(header::AUTHORIZATION)
        .ok_or_else(|| AppError::unauthorized("Missing Authorization header"))?
        .to_str()
        .map_err(|_| AppError::unauthorized("Authorization header is not valid UTF-8"))?;

    let (scheme, token) = header
        .split_once(' ')
        .ok_or_else(|| AppError::unauthorized("Authorization header must be `Bearer <token>`"))?;

    if !scheme.eq_ignore_ascii_case("bearer") {
        return Err(AppError::unauthorized(
            "Authorization scheme must be `Bearer`",
        ));
    }
    let token = token.trim();
    if token.is_empty() {
        return Err(AppError::unauthorized("Bearer token is empty"));
    }

    Ok(token)
}

/// Session token for a sync call: the bearer header, else the `authToken` body field
pub fn session_token(headers: &HeaderMap, body_token: Option<&str>) -> Result<String, AppError> {
    if headers.contains_key(header::AUTHORIZATION) {
        return extract_bearer_token(headers).map(str::to_string);
    }

    body_token
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(str::to_string)
        .ok_or_else(|| AppError::unauthorized("Missing Authorization header"))
}

/// Check the admin bearer token against the configured one
pub fn require_admin(headers: &HeaderMap, admin_token: Option<&str>) -> Result<(), AppError> {
    let Some(expected) = admin_token else {
        return Err(AppError::NotFound("admin routes are disabled".to_string()));
    };

    let presented = extract_bearer_token(headers)?;
    if !constant_time_eq(presented.as_bytes(), expected.as_bytes()) {
        return Err(AppError::unauthorized("Admin token is not valid"));
    }
    Ok(())
}

/// Stable hash for logging and rate limiting without exposing the token
pub fn token_fingerprint(token: &str) -> u64 {
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    token.hash(&mut hasher);
    hasher.finish()
}

fn constant_time_eq(left: &[u8], right: &[u8]) -> bool {
    if left.len() != right.len() {
        return false;
    }
    left.iter()
        .zip(right)
        .fold(0_u8, |acc, (a, b)| acc | (a ^ b))
        == 0
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    #[test]
    fn bearer_token_extractor_accepts_standard_header() {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", HeaderValue::from_static("Bearer abc123"));

        assert_eq!(extract_bearer_token(&headers).unwrap(), "abc123");
    }

    #[test]
    fn bearer_token_extractor_rejects_wrong_scheme() {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", HeaderValue::from_static("Basic abc"));
        assert!(extract_bearer_token(&headers).is_err());
    }

    #[test]
    fn session_token_falls_back_to_body() {
        let headers = HeaderMap::new();
        assert_eq!(session_token(&headers, Some(" tok ")).unwrap(), "tok");
        assert!(session_token(&headers, Some("  ")).is_err());
        assert!(session_token(&headers, None).is_err());
    }

    #[test]
    fn session_token_prefers_header() {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", HeaderValue::from_static("Bearer header-tok"));
        assert_eq!(
            session_token(&headers, Some("body-tok")).unwrap(),
            "header-tok"
        );
    }

    #[test]
    fn admin_check_requires_configured_token() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "authorization",
            HeaderValue::from_static("Bearer admin-token-0123456789"),
        );

        assert!(matches!(
            require_admin(&headers, None),
            Err(AppError::NotFound(_))
        ));
        assert!(require_admin(&headers, Some("admin-token-0123456789")).is_ok());
        assert!(matches!(
            require_admin(&headers, Some("another-token-0123456")),
            Err(AppError::Unauthorized(_))
        ));
    }
}
