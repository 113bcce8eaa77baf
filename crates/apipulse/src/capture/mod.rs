//! Immutable, redacted snapshots of one HTTP exchange.

mod request;
mod response;

pub use request::{capture_request, RequestSnapshot};
pub use response::{capture_response, ResponseSnapshot, MAX_RESPONSE_BYTES};

use http::HeaderMap;
use serde_json::{Map, Value};

/// Header map as a JSON object; repeated headers become arrays.
pub(crate) fn headers_value(headers: &HeaderMap) -> Value {
    let mut map = Map::new();
    for name in headers.keys() {
        let mut values: Vec<Value> = headers
            .get_all(name)
            .iter()
            .map(|value| Value::String(String::from_utf8_lossy(value.as_bytes()).into_owned()))
            .collect();
        let entry = if values.len() == 1 {
            values.remove(0)
        } else {
            Value::Array(values)
        };
        map.insert(name.as_str().to_string(), entry);
    }
    Value::Object(map)
}

pub(crate) fn empty_object() -> Value {
    Value::Object(Map::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_repeated_headers_become_arrays() {
        let mut headers = HeaderMap::new();
        headers.append("set-cookie", "a=1".parse().unwrap());
        headers.append("set-cookie", "b=2".parse().unwrap());
        headers.insert("content-type", "application/json".parse().unwrap());

        let value = headers_value(&headers);
        assert_eq!(value["set-cookie"], json!(["a=1", "b=2"]));
        assert_eq!(value["content-type"], json!("application/json"));
    }
}
