use serde_json::{Map, Value};

/// Deterministic encoding of `{method, path, timestamp, body}` that both
/// the signer and the verifier must produce byte-for-byte identically
/// (spec.md §4.1). `serde_json::Value::Object` is backed by a `BTreeMap`
/// only when the `preserve_order` feature is off, which it is here, so
/// keys already serialize in sorted order; we still build the object
/// explicitly (rather than `json!`) so the four top-level keys and the
/// `body` default are unambiguous at every call site.
pub fn canonical_payload(method: &str, path: &str, timestamp: &str, body: &Value) -> String {
    let mut object = Map::new();
    object.insert("method".to_string(), Value::String(method.to_string()));
    object.insert("path".to_string(), Value::String(path.to_string()));
    object.insert(
        "timestamp".to_string(),
        Value::String(timestamp.to_string()),
    );
    object.insert(
        "body".to_string(),
        if body.is_null() {
            Value::Object(Map::new())
        } else {
            body.clone()
        },
    );

    serde_json::to_string(&Value::Object(object)).expect("canonical payload always serializes")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn key_order_is_stable_regardless_of_call_order() {
        let body = json!({"email": "a@acme.io", "password": "x"});
        let a = canonical_payload("POST", "/v1/auth/login", "1000", &body);
        let b = canonical_payload("POST", "/v1/auth/login", "1000", &body);
        assert_eq!(a, b);
        assert!(a.starts_with(r#"{"body":"#));
    }

    #[test]
    fn missing_body_defaults_to_empty_object() {
        let encoded = canonical_payload("GET", "/v1/documents", "1000", &Value::Null);
        assert!(encoded.contains(r#""body":{}"#));
    }
}
