//! Sanitization — strips secrets and bounds the size of captured bodies
//! before an audit record is persisted.

use axum::http::HeaderMap;
use serde_json::{Map, Value};

pub const REDACTION_MARKER: &str = "[REDACTED]";
pub const TRUNCATION_MARKER: &str = "...[TRUNCATED]";
pub const DEPTH_MARKER: &str = "[MAX_DEPTH_EXCEEDED]";
pub const TOO_MANY_KEYS_MARKER: &str = "[TOO_MANY_KEYS]";

const MAX_DEPTH: usize = 3;
const MAX_STRING_CHARS: usize = 1000;
const MAX_ARRAY_ELEMENTS: usize = 10;
const MAX_MAP_ENTRIES: usize = 50;

/// Mapping keys whose value is always redacted (matched as a lowercase
/// substring of the key).
const SENSITIVE_KEY_FRAGMENTS: &[&str] = &[
    "password",
    "token",
    "apikey",
    "api_key",
    "authorization",
    "x-api-key",
    "secret",
    "key",
];

/// Header names whose value is redacted in the shallow header pass.
const SENSITIVE_HEADER_FRAGMENTS: &[&str] = &["api-key", "authorization", "token"];

fn is_sensitive_key(key: &str) -> bool {
    let lower = key.to_lowercase();
    SENSITIVE_KEY_FRAGMENTS.iter().any(|f| lower.contains(f))
}

/// Recursively sanitizes a captured JSON body: redacts sensitive keys,
/// truncates long strings, caps sequences and mappings, and stops at a
/// fixed traversal depth.
pub fn sanitize_value(value: &Value) -> Value {
    sanitize_at(value, 0)
}

fn sanitize_at(value: &Value, depth: usize) -> Value {
    match value {
        Value::Object(map) => {
            if depth >= MAX_DEPTH {
                return Value::String(DEPTH_MARKER.to_string());
            }
            let mut out = Map::new();
            for (i, (key, v)) in map.iter().enumerate() {
                if i >= MAX_MAP_ENTRIES {
                    out.insert(
                        "_truncated".to_string(),
                        Value::String(TOO_MANY_KEYS_MARKER.to_string()),
                    );
                    break;
                }
                if is_sensitive_key(key) {
                    out.insert(key.clone(), Value::String(REDACTION_MARKER.to_string()));
                } else {
                    out.insert(key.clone(), sanitize_at(v, depth + 1));
                }
            }
            Value::Object(out)
        }
        Value::Array(items) => {
            if depth >= MAX_DEPTH {
                return Value::String(DEPTH_MARKER.to_string());
            }
            Value::Array(
                items
                    .iter()
                    .take(MAX_ARRAY_ELEMENTS)
                    .map(|v| sanitize_at(v, depth + 1))
                    .collect(),
            )
        }
        Value::String(s) => Value::String(truncate_string(s)),
        other => other.clone(),
    }
}

fn truncate_string(s: &str) -> String {
    if s.chars().count() <= MAX_STRING_CHARS {
        return s.to_string();
    }
    let mut out: String = s.chars().take(MAX_STRING_CHARS).collect();
    out.push_str(TRUNCATION_MARKER);
    out
}

/// Shallow header pass: redacts values of headers whose name contains
/// "api-key", "authorization", or "token"; everything else passes through.
pub fn sanitize_headers(headers: &HeaderMap) -> Value {
    let mut out = Map::new();
    for (name, value) in headers {
        let name_str = name.as_str().to_lowercase();
        let rendered = if SENSITIVE_HEADER_FRAGMENTS
            .iter()
            .any(|f| name_str.contains(f))
        {
            REDACTION_MARKER.to_string()
        } else {
            value.to_str().unwrap_or("[non-ascii]").to_string()
        };
        out.insert(name_str, Value::String(rendered));
    }
    Value::Object(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use serde_json::json;

    #[test]
    fn test_password_is_redacted_at_any_nesting() {
        let body = json!({
            "password": "xyz",
            "nested": { "token": "abc", "note": "hi" }
        });
        let sanitized = sanitize_value(&body);
        assert_eq!(
            sanitized,
            json!({
                "password": REDACTION_MARKER,
                "nested": { "token": REDACTION_MARKER, "note": "hi" }
            })
        );
    }

    #[test]
    fn test_redaction_is_case_insensitive() {
        let body = json!({ "PassWord": "xyz", "API_KEY": "abc" });
        let sanitized = sanitize_value(&body);
        assert_eq!(sanitized["PassWord"], REDACTION_MARKER);
        assert_eq!(sanitized["API_KEY"], REDACTION_MARKER);
    }

    #[test]
    fn test_long_strings_are_truncated_with_marker() {
        let long = "x".repeat(1500);
        let sanitized = sanitize_value(&json!({ "note": long }));
        let out = sanitized["note"].as_str().unwrap();
        assert!(out.ends_with(TRUNCATION_MARKER));
        assert_eq!(out.chars().count(), 1000 + TRUNCATION_MARKER.chars().count());
    }

    #[test]
    fn test_exactly_1000_chars_is_untouched() {
        let exact = "y".repeat(1000);
        let sanitized = sanitize_value(&json!({ "note": exact.clone() }));
        assert_eq!(sanitized["note"].as_str().unwrap(), exact);
    }

    #[test]
    fn test_arrays_are_capped_at_ten_elements() {
        let body = json!({ "items": (0..25).collect::<Vec<i32>>() });
        let sanitized = sanitize_value(&body);
        assert_eq!(sanitized["items"].as_array().unwrap().len(), 10);
    }

    #[test]
    fn test_oversized_mapping_gets_marker_entry() {
        let mut map = serde_json::Map::new();
        for i in 0..60 {
            map.insert(format!("field_{i:03}"), json!(i));
        }
        let sanitized = sanitize_value(&Value::Object(map));
        let out = sanitized.as_object().unwrap();
        assert_eq!(out.len(), 51); // 50 entries + the marker
        assert_eq!(out["_truncated"], TOO_MANY_KEYS_MARKER);
    }

    #[test]
    fn test_depth_cap_replaces_deep_subtrees() {
        let body = json!({ "a": { "b": { "c": { "d": { "e": 1 } } } } });
        let sanitized = sanitize_value(&body);
        assert_eq!(sanitized["a"]["b"]["c"], DEPTH_MARKER);
    }

    #[test]
    fn test_scalars_pass_through() {
        let body = json!({ "n": 42, "f": 1.5, "b": true, "z": null });
        assert_eq!(sanitize_value(&body), body);
    }

    #[test]
    fn test_header_pass_redacts_credentials_only() {
        let mut headers = HeaderMap::new();
        headers.insert("x-api-key", HeaderValue::from_static("sk-secret"));
        headers.insert("authorization", HeaderValue::from_static("Bearer abc"));
        headers.insert("user-agent", HeaderValue::from_static("jobpilot-ext/1.2"));
        let sanitized = sanitize_headers(&headers);
        assert_eq!(sanitized["x-api-key"], REDACTION_MARKER);
        assert_eq!(sanitized["authorization"], REDACTION_MARKER);
        assert_eq!(sanitized["user-agent"], "jobpilot-ext/1.2");
    }
}
