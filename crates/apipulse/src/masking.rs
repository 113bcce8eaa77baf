//! Structural JSON redaction.
//!
//! Field names listed in a [`MaskRules`] set have their values replaced with a
//! fixed-length token before a snapshot leaves the process. Matching is by key
//! name only, case-insensitive, at any depth; values under unmatched keys are
//! traversed but never altered.

use serde_json::Value;
use std::collections::HashSet;
use thiserror::Error;

/// Replacement token for masked values.
///
/// The token length is fixed for every value kind so the redacted output does
/// not reveal the size of what it hides.
pub const MASK_TOKEN: &str = "*********";

/// Field names masked when no explicit list is configured.
pub const DEFAULT_MASKED_FIELDS: &[&str] = &[
    "password",
    "pwd",
    "secret",
    "password_confirmation",
    "passwordConfirmation",
    "cc",
    "card_number",
    "cardNumber",
    "ccv",
    "ssn",
    "credit_score",
    "creditScore",
    "api_key",
    "apiKey",
    "authorization",
    "cookie",
    "set-cookie",
    "x-api-key",
];

/// Error produced when a raw payload cannot be masked.
#[derive(Debug, Error)]
pub enum MaskError {
    /// The bytes are not JSON at all. Callers typically wrap the raw payload
    /// as an opaque string instead of aborting.
    #[error("payload is not JSON")]
    NotJson,

    /// The payload looked like JSON but could not be decoded.
    #[error("JSON decode error: {0}")]
    Decode(serde_json::Error),
}

/// Case-insensitive set of field names whose values must be masked.
///
/// Built once at configuration time and shared read-only afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MaskRules {
    fields: HashSet<String>,
}

impl MaskRules {
    /// Build a rule set from a base list plus caller additions.
    ///
    /// Names are trimmed and lower-cased; empty entries are discarded.
    pub fn new<I, J>(base: I, additional: J) -> Self
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
        J: IntoIterator,
        J::Item: AsRef<str>,
    {
        let fields = base
            .into_iter()
            .map(|f| f.as_ref().trim().to_lowercase())
            .chain(
                additional
                    .into_iter()
                    .map(|f| f.as_ref().trim().to_lowercase()),
            )
            .filter(|f| !f.is_empty())
            .collect();
        Self { fields }
    }

    /// Rule set with only the built-in defaults.
    pub fn defaults() -> Self {
        Self::new(DEFAULT_MASKED_FIELDS, std::iter::empty::<&str>())
    }

    /// Whether a field name is covered by the rules.
    pub fn matches(&self, field: &str) -> bool {
        self.fields.contains(&field.to_lowercase())
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Parse raw bytes as JSON and mask them.
///
/// Bytes that are not JSON yield [`MaskError::NotJson`] so the caller can
/// decide how to represent them.
pub fn mask_bytes(payload: &[u8], rules: &MaskRules) -> Result<Value, MaskError> {
    let value: Value = serde_json::from_slice(payload).map_err(classify)?;
    Ok(mask_value(value, rules))
}

fn classify(err: serde_json::Error) -> MaskError {
    use serde_json::error::Category;
    match err.classify() {
        Category::Syntax | Category::Eof => MaskError::NotJson,
        _ => MaskError::Decode(err),
    }
}

/// Mask a JSON tree. Total over every well-formed value.
pub fn mask_value(value: Value, rules: &MaskRules) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(key, val)| {
                    if rules.matches(&key) {
                        (key, mask_matched(val))
                    } else {
                        (key, mask_value(val, rules))
                    }
                })
                .collect(),
        ),
        Value::Array(items) => {
            Value::Array(items.into_iter().map(|v| mask_value(v, rules)).collect())
        }
        scalar => scalar,
    }
}

/// Mask the value of a matched field.
fn mask_matched(value: Value) -> Value {
    match value {
        Value::String(s) => Value::String(mask_string(&s)),
        Value::Array(items) => Value::Array(items.into_iter().map(mask_element).collect()),
        // Numbers, booleans, nulls and nested structures all collapse to the
        // opaque token; the original kind is not recoverable from the output.
        _ => Value::String(MASK_TOKEN.to_string()),
    }
}

fn mask_element(value: Value) -> Value {
    match value {
        Value::String(s) => Value::String(mask_string(&s)),
        _ => Value::String(MASK_TOKEN.to_string()),
    }
}

/// Mask a matched string value.
///
/// A value with a single leading scheme token ("Bearer abc123") keeps the
/// scheme and masks the remainder; anything else is replaced wholesale.
pub fn mask_string(value: &str) -> String {
    match value.split_once(' ') {
        Some((scheme, rest)) if !scheme.is_empty() && !rest.is_empty() => {
            format!("{scheme} {MASK_TOKEN}")
        }
        _ => MASK_TOKEN.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn rules(fields: &[&str]) -> MaskRules {
        MaskRules::new(fields.iter().copied(), std::iter::empty::<&str>())
    }

    #[test]
    fn test_flat_object_masking() {
        let masked = mask_value(json!({"id": 1, "password": "secret"}), &rules(&["password"]));
        assert_eq!(masked, json!({"id": 1, "password": "*********"}));
    }

    #[test]
    fn test_nested_fields_masked_independently() {
        let masked = mask_value(
            json!({"users": [{"password": "a", "name": "x"}, {"password": "b", "name": "y"}]}),
            &rules(&["password"]),
        );
        assert_eq!(
            masked,
            json!({"users": [
                {"password": "*********", "name": "x"},
                {"password": "*********", "name": "y"}
            ]})
        );
    }

    #[test]
    fn test_scheme_prefix_preserved() {
        let masked = mask_value(
            json!({"authorization": "Bearer abc123"}),
            &rules(&["authorization"]),
        );
        assert_eq!(masked, json!({"authorization": "Bearer *********"}));

        let masked = mask_value(json!({"authorization": "abc123"}), &rules(&["authorization"]));
        assert_eq!(masked, json!({"authorization": "*********"}));
    }

    #[test]
    fn test_string_array_masked_per_element() {
        let masked = mask_value(
            json!({"api_key": ["one", "two"]}),
            &rules(&["api_key"]),
        );
        assert_eq!(masked, json!({"api_key": ["*********", "*********"]}));
    }

    #[test]
    fn test_non_string_values_become_opaque_token() {
        let r = rules(&["ssn", "cc"]);
        let masked = mask_value(json!({"ssn": 123456789, "cc": {"number": "4111"}}), &r);
        assert_eq!(masked, json!({"ssn": "*********", "cc": "*********"}));
    }

    #[test]
    fn test_matching_is_case_insensitive() {
        let masked = mask_value(json!({"PassWord": "secret"}), &rules(&["password"]));
        assert_eq!(masked, json!({"PassWord": "*********"}));
    }

    #[test]
    fn test_unmatched_keys_untouched_at_any_depth() {
        let value = json!({"a": {"b": {"c": [1, "two", null, true]}}});
        assert_eq!(mask_value(value.clone(), &rules(&["password"])), value);
    }

    #[test]
    fn test_empty_containers_round_trip() {
        let r = rules(&["password"]);
        assert_eq!(mask_value(json!({}), &r), json!({}));
        assert_eq!(mask_value(json!([]), &r), json!([]));
    }

    #[test]
    fn test_top_level_scalars_pass_through() {
        let r = rules(&["password"]);
        assert_eq!(mask_value(json!("password"), &r), json!("password"));
        assert_eq!(mask_value(json!(42), &r), json!(42));
        assert_eq!(mask_value(Value::Null, &r), Value::Null);
    }

    #[test]
    fn test_mask_bytes_not_json() {
        let err = mask_bytes(b"<html>nope</html>", &rules(&["password"])).unwrap_err();
        assert!(matches!(err, MaskError::NotJson));

        let err = mask_bytes(b"", &rules(&["password"])).unwrap_err();
        assert!(matches!(err, MaskError::NotJson));
    }

    #[test]
    fn test_rules_trim_and_drop_empty_entries() {
        let r = MaskRules::new(["  Token  ", ""], ["pin"]);
        assert_eq!(r.len(), 2);
        assert!(r.matches("token"));
        assert!(r.matches("PIN"));
    }

    #[test]
    fn test_defaults_cover_transport_credentials() {
        let r = MaskRules::defaults();
        assert!(r.matches("Authorization"));
        assert!(r.matches("Set-Cookie"));
        assert!(r.matches("password"));
    }

    fn arb_key() -> impl Strategy<Value = String> {
        prop_oneof![
            Just("password".to_string()),
            Just("api_key".to_string()),
            Just("Authorization".to_string()),
            "[a-z]{1,8}",
        ]
    }

    fn arb_json() -> impl Strategy<Value = Value> {
        let leaf = prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::Bool),
            any::<i64>().prop_map(|n| json!(n)),
            "[ -~]{0,16}".prop_map(Value::String),
        ];
        leaf.prop_recursive(4, 32, 6, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..6).prop_map(Value::Array),
                prop::collection::btree_map(arb_key(), inner, 0..6)
                    .prop_map(|m| Value::Object(m.into_iter().collect())),
            ]
        })
    }

    fn shape_matches(a: &Value, b: &Value) -> bool {
        match (a, b) {
            (Value::Object(x), Value::Object(y)) => {
                x.len() == y.len() && x.keys().all(|k| y.contains_key(k))
            }
            (Value::Array(x), Value::Array(y)) => x.len() == y.len(),
            _ => true,
        }
    }

    proptest! {
        // Masking twice is the same as masking once.
        #[test]
        fn prop_masking_is_idempotent(value in arb_json()) {
            let r = MaskRules::defaults();
            let once = mask_value(value, &r);
            let twice = mask_value(once.clone(), &r);
            prop_assert_eq!(once, twice);
        }

        // Key sets and array lengths survive masking at the top level, and
        // unmatched subtrees survive verbatim.
        #[test]
        fn prop_masking_preserves_shape(value in arb_json()) {
            let r = MaskRules::defaults();
            let masked = mask_value(value.clone(), &r);
            prop_assert!(shape_matches(&value, &masked));

            if let (Value::Object(before), Value::Object(after)) = (&value, &masked) {
                for (key, val) in before {
                    if !r.matches(key) && !matches!(val, Value::Object(_) | Value::Array(_)) {
                        prop_assert_eq!(val, &after[key]);
                    }
                }
            }
        }

        // A rule set that matches nothing leaves every value untouched.
        #[test]
        fn prop_empty_rules_are_identity(value in arb_json()) {
            let r = MaskRules::new(std::iter::empty::<&str>(), std::iter::empty::<&str>());
            prop_assert_eq!(mask_value(value.clone(), &r), value);
        }
    }
}
