//! Stripe's form encoding for nested parameters.
//!
//! Stripe takes `application/x-www-form-urlencoded` bodies where nesting is
//! written with brackets: `line_items[0][price]=price_123`,
//! `metadata[user_id]=abc`.

use serde_json::Value;

/// Flatten a JSON object into Stripe form pairs.
///
/// Strings, numbers and booleans become text, arrays are indexed from zero,
/// and `null` values are left out. Anything other than an object at the top
/// level encodes to nothing.
#[must_use]
pub fn form_encode(value: &Value) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    if let Value::Object(map) = value {
        for (key, value) in map {
            flatten(key.clone(), value, &mut pairs);
        }
    }
    pairs
}

fn flatten(key: String, value: &Value, pairs: &mut Vec<(String, String)>) {
    match value {
        Value::Null => {}
        Value::Bool(b) => pairs.push((key, b.to_string())),
        Value::Number(n) => pairs.push((key, n.to_string())),
        Value::String(s) => pairs.push((key, s.clone())),
        Value::Array(items) => {
            for (index, item) in items.iter().enumerate() {
                flatten(format!("{key}[{index}]"), item, pairs);
            }
        }
        Value::Object(map) => {
            for (child, value) in map {
                flatten(format!("{key}[{child}]"), value, pairs);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn encoded(value: &Value) -> Vec<(String, String)> {
        let mut pairs = form_encode(value);
        pairs.sort();
        pairs
    }

    fn pair(k: &str, v: &str) -> (String, String) {
        (k.to_string(), v.to_string())
    }

    #[test]
    fn test_flat_values() {
        let pairs = encoded(&json!({"mode": "payment", "quantity": 2, "enabled": true}));
        assert_eq!(
            pairs,
            vec![pair("enabled", "true"), pair("mode", "payment"), pair("quantity", "2")]
        );
    }

    #[test]
    fn test_checkout_session_shape() {
        let pairs = encoded(&json!({
            "line_items": [{"price": "price_123", "quantity": 1}],
            "payment_method_types": ["card"],
            "metadata": {"user_id": "abc"},
            "invoice_creation": {"enabled": true, "invoice_data": {"metadata": {"user_id": "abc"}}},
        }));
        assert_eq!(
            pairs,
            vec![
                pair("invoice_creation[enabled]", "true"),
                pair("invoice_creation[invoice_data][metadata][user_id]", "abc"),
                pair("line_items[0][price]", "price_123"),
                pair("line_items[0][quantity]", "1"),
                pair("metadata[user_id]", "abc"),
                pair("payment_method_types[0]", "card"),
            ]
        );
    }

    #[test]
    fn test_nulls_are_skipped() {
        let pairs = encoded(&json!({"customer": null, "metadata": {"guild": null, "a": "b"}}));
        assert_eq!(pairs, vec![pair("metadata[a]", "b")]);
    }

    #[test]
    fn test_non_object_encodes_nothing() {
        assert!(form_encode(&json!(["a", "b"])).is_empty());
        assert!(form_encode(&json!("a")).is_empty());
    }
}
