//! Response snapshot construction.

use super::{empty_object, headers_value};
use crate::errors::{ErrorCollector, ErrorKind, ErrorRecord};
use crate::masking::{mask_bytes, mask_value, MaskError, MaskRules};
use bytes::Bytes;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;

/// Largest response body carried in a snapshot, in bytes.
pub const MAX_RESPONSE_BYTES: usize = 2 * 1024 * 1024;

/// Redacted structural record of a response, including every error collected
/// during the exchange.
#[derive(Debug, Clone, Serialize)]
pub struct ResponseSnapshot {
    pub code: u16,
    pub size: usize,
    pub load_time: f64,
    pub headers: Value,
    pub body: Value,
    pub errors: Vec<ErrorRecord>,
}

impl Default for ResponseSnapshot {
    fn default() -> Self {
        Self {
            code: 0,
            size: 0,
            load_time: 0.0,
            headers: empty_object(),
            body: empty_object(),
            errors: Vec::new(),
        }
    }
}

/// Build the redacted response snapshot from buffered response parts.
///
/// Bodies over [`MAX_RESPONSE_BYTES`] are discarded: size is forced to zero,
/// the body becomes an empty object and one response-kind record names the
/// violation. Non-JSON bodies are re-encoded as a JSON string so the snapshot
/// stays well-formed.
pub fn capture_response(
    parts: &http::response::Parts,
    body: &Bytes,
    elapsed: Duration,
    rules: &MaskRules,
    collector: &ErrorCollector,
) -> ResponseSnapshot {
    let mut snapshot = ResponseSnapshot {
        code: parts.status.as_u16(),
        size: body.len(),
        load_time: elapsed.as_micros() as f64,
        headers: mask_value(headers_value(&parts.headers), rules),
        body: empty_object(),
        errors: Vec::new(),
    };

    if body.is_empty() {
        return snapshot;
    }

    if body.len() > MAX_RESPONSE_BYTES {
        snapshot.size = 0;
        collector.add(
            format!("response body exceeds maximum size of {MAX_RESPONSE_BYTES} bytes"),
            ErrorKind::ResponseError,
            "response_size_limit",
        );
        return snapshot;
    }

    snapshot.body = match mask_bytes(body, rules) {
        Ok(masked) => masked,
        // Not JSON: keep the raw bytes as a JSON string literal.
        Err(MaskError::NotJson | MaskError::Decode(_)) => {
            Value::String(String::from_utf8_lossy(body).into_owned())
        }
    };
    snapshot
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parts(status: u16) -> http::response::Parts {
        let (mut parts, _) = http::Response::new(()).into_parts();
        parts.status = http::StatusCode::from_u16(status).unwrap();
        parts
    }

    fn capture(status: u16, body: &[u8]) -> (ResponseSnapshot, ErrorCollector) {
        let collector = ErrorCollector::new();
        let snapshot = capture_response(
            &parts(status),
            &Bytes::copy_from_slice(body),
            Duration::from_micros(1500),
            &MaskRules::defaults(),
            &collector,
        );
        (snapshot, collector)
    }

    #[test]
    fn test_json_body_is_redacted_and_sized() {
        let (snapshot, collector) =
            capture(200, br#"{"ok":true,"password":"secret"}"#);
        assert_eq!(snapshot.code, 200);
        assert_eq!(snapshot.size, 31);
        assert_eq!(snapshot.load_time, 1500.0);
        assert_eq!(snapshot.body, json!({"ok": true, "password": "*********"}));
        assert!(collector.is_empty());
    }

    #[test]
    fn test_body_one_byte_over_the_cap_is_invalidated() {
        let oversized = vec![b'a'; MAX_RESPONSE_BYTES + 1];
        let (snapshot, collector) = capture(200, &oversized);

        assert_eq!(snapshot.size, 0);
        assert_eq!(snapshot.body, json!({}));
        let records = collector.snapshot();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].kind, ErrorKind::ResponseError);
        assert!(records[0].message.contains("2097152"));
    }

    #[test]
    fn test_body_exactly_at_the_cap_is_preserved() {
        let body = vec![b'a'; MAX_RESPONSE_BYTES];
        let (snapshot, collector) = capture(200, &body);

        assert_eq!(snapshot.size, MAX_RESPONSE_BYTES);
        // Not JSON, so it is carried as a string literal of the raw bytes.
        assert_eq!(
            snapshot.body,
            Value::String(String::from_utf8(body).unwrap())
        );
        assert!(collector.is_empty());
    }

    #[test]
    fn test_non_json_body_becomes_string_literal() {
        let (snapshot, collector) = capture(200, b"<html>hello</html>");
        assert_eq!(snapshot.body, json!("<html>hello</html>"));
        assert_eq!(snapshot.size, 18);
        assert!(collector.is_empty());
    }

    #[test]
    fn test_empty_body_is_empty_object() {
        let (snapshot, collector) = capture(204, b"");
        assert_eq!(snapshot.body, json!({}));
        assert_eq!(snapshot.size, 0);
        assert!(collector.is_empty());
    }

    #[test]
    fn test_response_headers_are_masked() {
        let collector = ErrorCollector::new();
        let (mut parts, _) = http::Response::new(()).into_parts();
        parts
            .headers
            .insert("set-cookie", "session=abc".parse().unwrap());
        parts
            .headers
            .insert("content-type", "text/plain".parse().unwrap());

        let snapshot = capture_response(
            &parts,
            &Bytes::new(),
            Duration::ZERO,
            &MaskRules::defaults(),
            &collector,
        );
        assert_eq!(snapshot.headers["set-cookie"], json!("*********"));
        assert_eq!(snapshot.headers["content-type"], json!("text/plain"));
    }
}
