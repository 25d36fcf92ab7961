//! Case conversion for the API: request keys camelCase -> snake_case (DB
//! columns), response keys snake_case -> camelCase (wire format).

use serde_json::{Map, Value};

/// "created_at" -> "createdAt"
pub fn to_camel_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut capitalize_next = false;
    for c in s.chars() {
        if c == '_' {
            capitalize_next = true;
        } else if capitalize_next {
            out.extend(c.to_uppercase());
            capitalize_next = false;
        } else {
            out.push(c);
        }
    }
    out
}

/// "createdAt" -> "created_at"
pub fn to_snake_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 4);
    for (i, c) in s.chars().enumerate() {
        if c.is_uppercase() {
            if i > 0 {
                out.push('_');
            }
            out.extend(c.to_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

/// Convert all keys of a JSON object from camelCase to snake_case, returning
/// a new map. Used for request bodies before they meet the model.
pub fn object_keys_to_snake_case(obj: &Map<String, Value>) -> Map<String, Value> {
    obj.iter()
        .map(|(k, v)| (to_snake_case(k), v.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn round_trips_common_identifiers() {
        for (snake, camel) in [
            ("created_at", "createdAt"),
            ("invoice_number", "invoiceNumber"),
            ("payment_method", "paymentMethod"),
            ("id", "id"),
        ] {
            assert_eq!(to_camel_case(snake), camel);
            assert_eq!(to_snake_case(camel), snake);
        }
    }

    #[test]
    fn object_keys_convert_without_touching_values() {
        let obj = json!({"invoiceNumber": "INV-1", "amount": 3.0});
        let converted = object_keys_to_snake_case(obj.as_object().unwrap());
        assert_eq!(converted.get("invoice_number"), Some(&json!("INV-1")));
        assert_eq!(converted.get("amount"), Some(&json!(3.0)));
    }
}
