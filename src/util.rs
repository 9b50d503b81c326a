//! Shared request helpers.

use axum::http::HeaderMap;

/// Extract the client IP address for audit logging.
///
/// Takes the first hop of `x-forwarded-for` (for proxied requests), then
/// `x-real-ip`, then `cf-connecting-ip`. Falls back to "unknown".
pub fn extract_client_ip(headers: &HeaderMap) -> String {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|s| !s.is_empty())
    };

    if let Some(first) = header("x-forwarded-for")
        .and_then(|xf| xf.split(',').next())
        .map(str::trim)
        .filter(|s| !s.is_empty())
    {
        return first.to_string();
    }

    header("x-real-ip")
        .or_else(|| header("cf-connecting-ip"))
        .unwrap_or("unknown")
        .to_string()
}

/// Extract a Bearer token from the Authorization header.
///
/// Returns the token string without the "Bearer " prefix, or None if
/// the header is missing, malformed, or empty after the prefix.
pub fn extract_bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn forwarded_for_takes_first_hop() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.7, 10.0.0.1"));
        headers.insert("x-real-ip", HeaderValue::from_static("10.0.0.2"));
        assert_eq!(extract_client_ip(&headers), "203.0.113.7");
    }

    #[test]
    fn falls_back_through_headers() {
        let mut headers = HeaderMap::new();
        headers.insert("cf-connecting-ip", HeaderValue::from_static("198.51.100.4"));
        assert_eq!(extract_client_ip(&headers), "198.51.100.4");

        headers.insert("x-real-ip", HeaderValue::from_static("10.0.0.2"));
        assert_eq!(extract_client_ip(&headers), "10.0.0.2");
    }

    #[test]
    fn unknown_without_headers() {
        assert_eq!(extract_client_ip(&HeaderMap::new()), "unknown");
    }

    #[test]
    fn bearer_token() {
        let mut headers = HeaderMap::new();
        assert_eq!(extract_bearer_token(&headers), None);

        headers.insert("Authorization", HeaderValue::from_static("Bearer  "));
        assert_eq!(extract_bearer_token(&headers), None);

        headers.insert("Authorization", HeaderValue::from_static("Bearer kw_abc"));
        assert_eq!(extract_bearer_token(&headers), Some("kw_abc"));
    }
}
