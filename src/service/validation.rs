//! Request validation against the model's column rules.

use crate::error::AppError;
use crate::model::{ColumnType, EntityDef};
use serde_json::{Map, Value};

/// Validate the fields present in a body (snake_case column keys). Absent and
/// null fields pass; only explicitly supplied values are checked, so the same
/// routine serves create and partial update.
pub fn validate(entity: &EntityDef, body: &Map<String, Value>) -> Result<(), AppError> {
    for col in entity.columns {
        let Some(value) = body.get(col.name) else { continue };
        if value.is_null() {
            continue;
        }
        validate_field(col.name, value, col)?;
    }
    Ok(())
}

fn validate_field(name: &str, value: &Value, col: &crate::model::ColumnDef) -> Result<(), AppError> {
    match col.ty {
        ColumnType::Text => {
            let Some(s) = value.as_str() else {
                return Err(AppError::Validation(format!("{} must be a string", name)));
            };
            if let Some(max) = col.max_length {
                if s.len() > max as usize {
                    return Err(AppError::Validation(format!(
                        "{} must be at most {} characters",
                        name, max
                    )));
                }
            }
        }
        ColumnType::Double | ColumnType::Integer => {
            let Some(n) = value.as_f64() else {
                return Err(AppError::Validation(format!("{} must be a number", name)));
            };
            if col.ty == ColumnType::Integer && value.as_i64().is_none() {
                return Err(AppError::Validation(format!("{} must be an integer", name)));
            }
            if let Some(min) = col.minimum {
                if n < min {
                    return Err(AppError::Validation(format!(
                        "{} must be at least {}",
                        name, min
                    )));
                }
            }
            if let Some(max) = col.maximum {
                if n > max {
                    return Err(AppError::Validation(format!(
                        "{} must be at most {}",
                        name, max
                    )));
                }
            }
        }
        ColumnType::Timestamp => {
            let ok = value
                .as_str()
                .map(|s| chrono::DateTime::parse_from_rfc3339(s).is_ok())
                .unwrap_or(false);
            if !ok {
                return Err(AppError::Validation(format!(
                    "{} must be an ISO-8601 datetime",
                    name
                )));
            }
        }
        ColumnType::Enum { values, .. } => {
            let ok = value.as_str().map(|s| values.contains(&s)).unwrap_or(false);
            if !ok {
                return Err(AppError::Validation(format!(
                    "{} must be one of: {}",
                    name,
                    values.join(", ")
                )));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Model;
    use serde_json::json;

    fn body(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap()
    }

    fn payments() -> &'static EntityDef {
        Model::invoicing().entity_by_path("payments").unwrap()
    }

    #[test]
    fn amount_outside_the_declared_range_fails() {
        let e = payments();
        assert!(validate(e, &body(json!({"amount": 1_000_000_000.0}))).is_err());
        assert!(validate(e, &body(json!({"amount": -999_999_999.0}))).is_ok());
    }

    #[test]
    fn payment_method_must_be_a_known_token() {
        let e = payments();
        assert!(validate(e, &body(json!({"payment_method": "Cash"}))).is_ok());
        assert!(validate(e, &body(json!({"payment_method": "Barter"}))).is_err());
    }

    #[test]
    fn absent_and_null_fields_pass() {
        let e = payments();
        assert!(validate(e, &body(json!({}))).is_ok());
        assert!(validate(e, &body(json!({"payment_method": null}))).is_ok());
    }

    #[test]
    fn timestamps_must_parse_as_rfc3339() {
        let e = payments();
        assert!(validate(e, &body(json!({"payment_date": "2026-03-01T10:00:00Z"}))).is_ok());
        assert!(validate(e, &body(json!({"payment_date": "yesterday"}))).is_err());
    }

    #[test]
    fn string_length_bounds_apply() {
        let model = Model::invoicing();
        let customers = model.entity_by_path("customers").unwrap();
        let long = "x".repeat(1001);
        assert!(validate(customers, &body(json!({"address": long}))).is_err());
        assert!(validate(customers, &body(json!({"address": "10 Main St"}))).is_ok());
    }

    #[test]
    fn quantity_must_be_an_integer() {
        let model = Model::invoicing();
        let products = model.entity_by_path("products").unwrap();
        assert!(validate(products, &body(json!({"quantity": 2.5}))).is_err());
        assert!(validate(products, &body(json!({"quantity": 3}))).is_ok());
    }
}
