//! Credential extraction from request headers.

use axum::http::HeaderMap;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;

/// Pull the token out of an `Authorization: Bearer <token>` header.
pub fn extract_bearer(headers: &HeaderMap) -> Option<&str> {
    let header = headers.get(axum::http::header::AUTHORIZATION)?;
    let header = header.to_str().ok()?;
    let token = header.strip_prefix("Bearer ")?.trim();
    if token.is_empty() {
        return None;
    }
    Some(token)
}

/// Pull `(username, password)` out of an `Authorization: Basic` header.
pub fn extract_basic(headers: &HeaderMap) -> Option<(String, String)> {
    let header = headers.get(axum::http::header::AUTHORIZATION)?;
    let header = header.to_str().ok()?;
    let encoded = header.strip_prefix("Basic ")?.trim();
    let decoded = STANDARD.decode(encoded).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (username, password) = decoded.split_once(':')?;
    if username.is_empty() {
        return None;
    }
    Some((username.to_string(), password.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::header::AUTHORIZATION;

    fn headers(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, value.parse().unwrap());
        headers
    }

    #[test]
    fn bearer_extraction() {
        assert_eq!(extract_bearer(&headers("Bearer abc123")), Some("abc123"));
        assert_eq!(extract_bearer(&headers("Bearer ")), None);
        assert_eq!(extract_bearer(&headers("Basic abc")), None);
        assert_eq!(extract_bearer(&HeaderMap::new()), None);
    }

    #[test]
    fn basic_extraction() {
        // "alice:wonderland"
        let encoded = STANDARD.encode("alice:wonderland");
        let got = extract_basic(&headers(&format!("Basic {encoded}")));
        assert_eq!(got, Some(("alice".to_string(), "wonderland".to_string())));

        // Password may contain colons.
        let encoded = STANDARD.encode("alice:pass:word");
        let got = extract_basic(&headers(&format!("Basic {encoded}")));
        assert_eq!(got, Some(("alice".to_string(), "pass:word".to_string())));

        assert_eq!(extract_basic(&headers("Basic !!!")), None);
        assert_eq!(extract_basic(&headers("Bearer abc")), None);
    }
}
