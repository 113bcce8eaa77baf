//! Request snapshot construction.

use super::{empty_object, headers_value};
use crate::errors::{ErrorCollector, ErrorKind};
use crate::masking::{mask_bytes, mask_string, mask_value, MaskRules};
use crate::middleware::Request;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use std::net::IpAddr;

/// Redacted structural record of a request. Built once per exchange,
/// immutable thereafter.
#[derive(Debug, Clone, Serialize)]
pub struct RequestSnapshot {
    pub timestamp: String,
    pub ip: String,
    pub url: String,
    pub route_path: String,
    pub user_agent: String,
    pub method: String,
    pub protocol: String,
    pub headers: Value,
    pub query: Value,
    pub body: Value,
}

impl Default for RequestSnapshot {
    fn default() -> Self {
        Self {
            timestamp: String::new(),
            ip: String::new(),
            url: String::new(),
            route_path: String::new(),
            user_agent: String::new(),
            method: String::new(),
            protocol: String::new(),
            headers: empty_object(),
            query: empty_object(),
            body: empty_object(),
        }
    }
}

/// Build the redacted request snapshot.
///
/// Never fails: a body that is not valid JSON is recorded as a validation
/// error and replaced with an empty object.
pub fn capture_request(
    request: &Request,
    started_at: DateTime<Utc>,
    rules: &MaskRules,
    collector: &ErrorCollector,
) -> RequestSnapshot {
    let scheme = detect_scheme(request);
    let host = request
        .headers()
        .get(http::header::HOST)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
        .or_else(|| request.uri().authority().map(|a| a.to_string()))
        .unwrap_or_default();

    let mut url = format!("{scheme}://{host}{}", request.uri().path());

    let raw_query = request.query_string().unwrap_or_default();
    let pairs = parse_query_pairs(raw_query);
    if !pairs.is_empty() {
        url.push('?');
        url.push_str(&masked_query_string(&pairs, rules));
    }

    let body = if request.body().is_empty() {
        empty_object()
    } else {
        match mask_bytes(request.body(), rules) {
            Ok(masked) => masked,
            Err(error) => {
                collector.add(
                    format!("request body is not valid JSON: {error}"),
                    ErrorKind::ValidationError,
                    "request_body",
                );
                empty_object()
            }
        }
    };

    RequestSnapshot {
        timestamp: started_at.format("%Y-%m-%d %H:%M:%S").to_string(),
        ip: client_ip(request),
        url,
        route_path: request.path().to_string(),
        user_agent: request
            .headers()
            .get(http::header::USER_AGENT)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_string(),
        method: request.method().to_string(),
        protocol: protocol_name(request.version()),
        headers: mask_value(headers_value(request.headers()), rules),
        query: mask_value(Value::Object(query_object(&pairs)), rules),
        body,
    }
}

pub(crate) fn protocol_name(version: http::Version) -> String {
    format!("{version:?}")
}

fn detect_scheme(request: &Request) -> &'static str {
    let forwarded = request
        .headers()
        .get("x-forwarded-proto")
        .and_then(|value| value.to_str().ok());
    match forwarded {
        Some(proto) if proto.eq_ignore_ascii_case("https") => "https",
        Some(_) => "http",
        None => match request.uri().scheme_str() {
            Some("https") => "https",
            _ => "http",
        },
    }
}

/// Prefer X-Forwarded-For, then X-Real-IP, then the peer address.
fn client_ip(request: &Request) -> String {
    if let Some(forwarded) = header_str(request, "x-forwarded-for") {
        if let Some(ip) = first_valid_ip(forwarded) {
            return ip;
        }
    }
    if let Some(real_ip) = header_str(request, "x-real-ip") {
        if let Some(ip) = first_valid_ip(real_ip) {
            return ip;
        }
    }
    match request.remote_addr() {
        Some(addr) => addr.ip().to_string(),
        None => "127.0.0.1".to_string(),
    }
}

fn header_str<'a>(request: &'a Request, name: &str) -> Option<&'a str> {
    request.headers().get(name).and_then(|value| value.to_str().ok())
}

fn first_valid_ip(candidates: &str) -> Option<String> {
    candidates
        .split(',')
        .map(str::trim)
        .find(|candidate| candidate.parse::<IpAddr>().is_ok())
        .map(str::to_string)
}

fn parse_query_pairs(query: &str) -> Vec<(String, String)> {
    if query.is_empty() {
        return Vec::new();
    }
    query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            (decode(key), decode(value))
        })
        .collect()
}

fn decode(component: &str) -> String {
    urlencoding::decode(component)
        .map(|decoded| decoded.into_owned())
        .unwrap_or_else(|_| component.to_string())
}

/// Query parameters as an object; repeated keys become arrays.
fn query_object(pairs: &[(String, String)]) -> Map<String, Value> {
    let mut map = Map::new();
    for (key, value) in pairs {
        match map.get_mut(key) {
            Some(Value::Array(existing)) => existing.push(Value::String(value.clone())),
            Some(existing) => {
                let first = existing.take();
                *existing = Value::Array(vec![first, Value::String(value.clone())]);
            }
            None => {
                map.insert(key.clone(), Value::String(value.clone()));
            }
        }
    }
    map
}

/// Re-encode the query string with matched values masked, so the reported URL
/// leaks nothing the query object hides.
fn masked_query_string(pairs: &[(String, String)], rules: &MaskRules) -> String {
    pairs
        .iter()
        .map(|(key, value)| {
            let reported = if rules.matches(key) {
                mask_string(value)
            } else {
                value.clone()
            };
            format!(
                "{}={}",
                urlencoding::encode(key),
                urlencoding::encode(&reported)
            )
        })
        .collect::<Vec<_>>()
        .join("&")
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use serde_json::json;

    fn request(uri: &str) -> Request {
        request_with_body(uri, Bytes::new())
    }

    fn request_with_body(uri: &str, body: Bytes) -> Request {
        let (parts, _) = http::Request::builder()
            .method("POST")
            .uri(uri)
            .header("host", "api.example.com")
            .header("user-agent", "test-agent/1.0")
            .body(())
            .unwrap()
            .into_parts();
        Request::new(parts, body)
    }

    fn capture(request: &Request) -> (RequestSnapshot, ErrorCollector) {
        let collector = ErrorCollector::new();
        let snapshot = capture_request(
            request,
            Utc::now(),
            &MaskRules::defaults(),
            &collector,
        );
        (snapshot, collector)
    }

    #[test]
    fn test_basic_fields() {
        let req = request("/users/42?page=2");
        let (snapshot, collector) = capture(&req);

        assert_eq!(snapshot.method, "POST");
        assert_eq!(snapshot.route_path, "/users/42");
        assert_eq!(snapshot.user_agent, "test-agent/1.0");
        assert_eq!(snapshot.protocol, "HTTP/1.1");
        assert_eq!(snapshot.url, "http://api.example.com/users/42?page=2");
        assert_eq!(snapshot.query, json!({"page": "2"}));
        assert!(collector.is_empty());
    }

    #[test]
    fn test_query_values_masked_in_object_and_url() {
        let req = request("/login?user=jo&api_key=s3cret");
        let (snapshot, _) = capture(&req);

        assert_eq!(snapshot.query, json!({"user": "jo", "api_key": "*********"}));
        assert_eq!(
            snapshot.url,
            "http://api.example.com/login?user=jo&api_key=%2A%2A%2A%2A%2A%2A%2A%2A%2A"
        );
    }

    #[test]
    fn test_repeated_query_keys_become_arrays() {
        let req = request("/search?tag=a&tag=b");
        let (snapshot, _) = capture(&req);
        assert_eq!(snapshot.query, json!({"tag": ["a", "b"]}));
    }

    #[test]
    fn test_json_body_is_redacted() {
        let req = request_with_body(
            "/users",
            Bytes::from(r#"{"name":"jo","password":"secret"}"#),
        );
        let (snapshot, collector) = capture(&req);
        assert_eq!(snapshot.body, json!({"name": "jo", "password": "*********"}));
        assert!(collector.is_empty());
    }

    #[test]
    fn test_non_json_body_becomes_validation_record() {
        let req = request_with_body("/users", Bytes::from_static(b"name=jo&x=1"));
        let (snapshot, collector) = capture(&req);

        assert_eq!(snapshot.body, json!({}));
        let records = collector.snapshot();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].kind, ErrorKind::ValidationError);
        assert_eq!(records[0].source, "request_body");
    }

    #[test]
    fn test_empty_body_is_empty_object() {
        let req = request("/ping");
        let (snapshot, collector) = capture(&req);
        assert_eq!(snapshot.body, json!({}));
        assert!(collector.is_empty());
    }

    #[test]
    fn test_masked_headers() {
        let (parts, _) = http::Request::builder()
            .uri("/x")
            .header("host", "h")
            .header("authorization", "Bearer abc123")
            .header("accept", "application/json")
            .body(())
            .unwrap()
            .into_parts();
        let req = Request::new(parts, Bytes::new());
        let (snapshot, _) = capture(&req);

        assert_eq!(snapshot.headers["authorization"], json!("Bearer *********"));
        assert_eq!(snapshot.headers["accept"], json!("application/json"));
    }

    #[test]
    fn test_client_ip_prefers_forwarded_for() {
        let (parts, _) = http::Request::builder()
            .uri("/x")
            .header("x-forwarded-for", "not-an-ip, 203.0.113.7")
            .body(())
            .unwrap()
            .into_parts();
        let req = Request::new(parts, Bytes::new())
            .with_remote_addr("10.0.0.1:5000".parse().unwrap());
        let (snapshot, _) = capture(&req);
        assert_eq!(snapshot.ip, "203.0.113.7");
    }

    #[test]
    fn test_client_ip_falls_back_to_peer_address() {
        let req = request("/x").with_remote_addr("10.0.0.9:41000".parse().unwrap());
        let (snapshot, _) = capture(&req);
        assert_eq!(snapshot.ip, "10.0.0.9");
    }

    #[test]
    fn test_https_detected_from_forwarded_proto() {
        let (parts, _) = http::Request::builder()
            .uri("/x")
            .header("host", "h")
            .header("x-forwarded-proto", "https")
            .body(())
            .unwrap()
            .into_parts();
        let req = Request::new(parts, Bytes::new());
        let (snapshot, _) = capture(&req);
        assert!(snapshot.url.starts_with("https://"));
    }
}
