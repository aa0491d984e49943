use axum::http::{header, HeaderMap, HeaderName, HeaderValue};

pub const X_TENANT_ID: &str = "x-tenant-id";
pub const X_USER_ID: &str = "x-user-id";
pub const X_USER_ROLE: &str = "x-user-role";
pub const X_FORWARDED_FOR: &str = "x-forwarded-for";
pub const X_FORWARDED_PROTO: &str = "x-forwarded-proto";
pub const X_REAL_IP: &str = "x-real-ip";
pub const X_GATEWAY_VERSION: &str = "x-gateway-version";
pub const X_GATEWAY_SERVICE: &str = "x-gateway-service";
pub const X_GATEWAY_RESPONSE_TIME: &str = "x-gateway-response-time";

/// Headers that only make sense between two directly connected parties.
pub const HOP_BY_HOP_HEADERS: [&str; 9] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "trailers",
    "transfer-encoding",
    "upgrade",
];

pub fn is_hop_by_hop(name: &HeaderName) -> bool {
    HOP_BY_HOP_HEADERS.contains(&name.as_str())
}

/// Extra per-message hop-by-hop headers named in `Connection`.
fn connection_tokens(headers: &HeaderMap) -> Vec<String> {
    headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(|token| token.trim().to_ascii_lowercase())
        .filter(|token| !token.is_empty())
        .collect()
}

/// Copy the headers a proxy may relay in either direction.
///
/// Drops hop-by-hop headers, anything listed in `Connection`, plus `Host` and
/// `Content-Length`, which the outbound client recomputes.
pub fn forwardable_headers(headers: &HeaderMap) -> HeaderMap {
    let named = connection_tokens(headers);
    let mut out = HeaderMap::with_capacity(headers.len());

    for (name, value) in headers.iter() {
        if is_hop_by_hop(name)
            || name == header::HOST
            || name == header::CONTENT_LENGTH
            || named.iter().any(|token| token == name.as_str())
        {
            continue;
        }
        out.append(name.clone(), value.clone());
    }

    out
}

/// Insert or replace a header, skipping values that are not valid header text.
pub fn set_header(headers: &mut HeaderMap, name: &'static str, value: &str) -> bool {
    match HeaderValue::from_str(value) {
        Ok(value) => {
            headers.insert(HeaderName::from_static(name), value);
            true
        }
        Err(_) => {
            tracing::debug!(header = name, "Dropping header with invalid value");
            false
        }
    }
}

/// Remove client-supplied identity headers before the gateway sets its own.
pub fn strip_identity_headers(headers: &mut HeaderMap) {
    headers.remove(X_TENANT_ID);
    headers.remove(X_USER_ID);
    headers.remove(X_USER_ROLE);
}

/// Overwrite the identity headers with verified values.
pub fn apply_identity_headers(headers: &mut HeaderMap, tenant_id: &str, user_id: &str, role: &str) {
    strip_identity_headers(headers);
    set_header(headers, X_TENANT_ID, tenant_id);
    set_header(headers, X_USER_ID, user_id);
    set_header(headers, X_USER_ROLE, role);
}

/// First `X-Forwarded-For` entry, else `X-Real-IP`.
pub fn forwarded_client_ip(headers: &HeaderMap) -> Option<String> {
    let from_xff = headers
        .get(X_FORWARDED_FOR)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());

    from_xff
        .or_else(|| {
            headers
                .get(X_REAL_IP)
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|v| !v.is_empty())
        })
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.append(
                HeaderName::from_static(name),
                HeaderValue::from_static(value),
            );
        }
        map
    }

    #[test]
    fn test_strips_hop_by_hop() {
        let input = headers(&[
            ("connection", "keep-alive"),
            ("keep-alive", "timeout=5"),
            ("transfer-encoding", "chunked"),
            ("upgrade", "websocket"),
            ("te", "trailers"),
            ("proxy-authorization", "Basic abc"),
            ("accept", "application/json"),
            ("authorization", "Bearer t"),
        ]);

        let out = forwardable_headers(&input);
        for name in HOP_BY_HOP_HEADERS {
            assert!(out.get(name).is_none(), "{} should be stripped", name);
        }
        assert_eq!(out.get("accept").unwrap(), "application/json");
        assert_eq!(out.get("authorization").unwrap(), "Bearer t");
    }

    #[test]
    fn test_strips_headers_named_in_connection() {
        let input = headers(&[
            ("connection", "close, X-Debug-Hop"),
            ("x-debug-hop", "1"),
            ("x-keep", "1"),
        ]);

        let out = forwardable_headers(&input);
        assert!(out.get("x-debug-hop").is_none());
        assert!(out.get("x-keep").is_some());
    }

    #[test]
    fn test_strips_host_and_content_length() {
        let input = headers(&[("host", "gateway.local"), ("content-length", "12")]);
        let out = forwardable_headers(&input);
        assert!(out.is_empty());
    }

    #[test]
    fn test_keeps_repeated_values() {
        let input = headers(&[("accept-language", "en"), ("accept-language", "de")]);
        let out = forwardable_headers(&input);
        assert_eq!(out.get_all("accept-language").iter().count(), 2);
    }

    #[test]
    fn test_identity_headers_override_client_values() {
        let mut map = headers(&[
            ("x-tenant-id", "attacker"),
            ("x-user-id", "root"),
            ("x-user-role", "superadmin"),
        ]);

        apply_identity_headers(&mut map, "acme", "user-1", "viewer");

        assert_eq!(map.get_all(X_TENANT_ID).iter().count(), 1);
        assert_eq!(map.get(X_TENANT_ID).unwrap(), "acme");
        assert_eq!(map.get(X_USER_ID).unwrap(), "user-1");
        assert_eq!(map.get(X_USER_ROLE).unwrap(), "viewer");
    }

    #[test]
    fn test_set_header_rejects_invalid_values() {
        let mut map = HeaderMap::new();
        assert!(!set_header(&mut map, X_TENANT_ID, "bad\nvalue"));
        assert!(map.get(X_TENANT_ID).is_none());
    }

    #[test]
    fn test_forwarded_client_ip() {
        let map = headers(&[("x-forwarded-for", "203.0.113.7, 10.0.0.1")]);
        assert_eq!(forwarded_client_ip(&map).as_deref(), Some("203.0.113.7"));

        let map = headers(&[("x-real-ip", "198.51.100.2")]);
        assert_eq!(forwarded_client_ip(&map).as_deref(), Some("198.51.100.2"));

        assert_eq!(forwarded_client_ip(&HeaderMap::new()), None);
    }
}
