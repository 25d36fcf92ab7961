//! Relation input parsing and pure connect/replace planning.

use crate::error::AppError;
use crate::model::{EntityDef, RelationDef, RelationKind};
use serde_json::{Map, Value};

/// Relation references pulled out of a create/update body.
#[derive(Debug, Default)]
pub struct RelationInputs {
    /// (relation, requested parent id) — belongs-to references present in the body.
    pub belongs_to: Vec<(&'static RelationDef, String)>,
    /// (relation, requested child ids) — has-many collections present in the body.
    pub has_many: Vec<(&'static RelationDef, Vec<String>)>,
}

/// Remove relation fields from a snake_case body map and parse them.
///
/// A belongs-to value may be a bare id string or an `{ "id": … }` object
/// (create uses objects, update uses bare ids in the original API); nulls are
/// ignored. A raw FK column key (e.g. `customer_id`) is pulled out too and
/// treated as a belongs-to reference, so it goes through the same
/// resolve-or-drop step instead of hitting the FK constraint. A has-many
/// value is an array of either form; ids are deduplicated preserving order.
pub fn split_inputs(
    entity: &'static EntityDef,
    body: &mut Map<String, Value>,
) -> Result<RelationInputs, AppError> {
    let mut inputs = RelationInputs::default();
    for rel in entity.relations {
        let named = body.remove(rel.name).filter(|v| !v.is_null());
        let value = match rel.kind {
            RelationKind::BelongsTo => {
                // The relation-name form wins when both are supplied.
                let raw_fk = body.remove(rel.fk_column).filter(|v| !v.is_null());
                named.or(raw_fk)
            }
            RelationKind::HasMany => named,
        };
        let Some(value) = value else { continue };
        match rel.kind {
            RelationKind::BelongsTo => {
                let id = id_of(&value).ok_or_else(|| {
                    AppError::BadRequest(format!(
                        "{} must be an id or an object with an id",
                        rel.name
                    ))
                })?;
                inputs.belongs_to.push((rel, id));
            }
            RelationKind::HasMany => {
                let Value::Array(items) = value else {
                    return Err(AppError::BadRequest(format!(
                        "{} must be an array of references",
                        rel.name
                    )));
                };
                let mut ids = Vec::with_capacity(items.len());
                for item in &items {
                    let id = id_of(item).ok_or_else(|| {
                        AppError::BadRequest(format!(
                            "each {} reference must be an id or an object with an id",
                            rel.name
                        ))
                    })?;
                    ids.push(id);
                }
                inputs.has_many.push((rel, dedup(ids)));
            }
        }
    }
    Ok(inputs)
}

/// Extract an id from a bare string or an `{ "id": … }` object.
pub fn id_of(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Object(obj) => match obj.get("id") {
            Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
            _ => None,
        },
        _ => None,
    }
}

/// Deduplicate ids preserving first-seen order.
pub fn dedup(ids: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    ids.into_iter().filter(|id| seen.insert(id.clone())).collect()
}

/// Connect and replace both demand at least one resolved child: an empty
/// resolved set is NotFound, never a clear of the collection.
pub fn require_resolved(resolved: &[String]) -> Result<&[String], AppError> {
    if resolved.is_empty() {
        return Err(AppError::NotFound);
    }
    Ok(resolved)
}

/// Connect is a set union: only children not already attached get connected.
pub fn ids_to_connect(resolved: &[String], attached: &[String]) -> Vec<String> {
    resolved
        .iter()
        .filter(|id| !attached.contains(id))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Model;
    use serde_json::json;

    fn invoices() -> &'static EntityDef {
        Model::invoicing().entity_by_path("invoices").unwrap()
    }

    #[test]
    fn splits_belongs_to_and_has_many_out_of_the_body() {
        let mut body = json!({
            "amount": 10.0,
            "customer": {"id": "c1"},
            "payments": [{"id": "p1"}, {"id": "p2"}, {"id": "p1"}]
        })
        .as_object()
        .cloned()
        .unwrap();
        let inputs = split_inputs(invoices(), &mut body).unwrap();
        assert!(body.get("customer").is_none() && body.get("payments").is_none());
        assert_eq!(body.get("amount"), Some(&json!(10.0)));
        assert_eq!(inputs.belongs_to.len(), 1);
        assert_eq!(inputs.belongs_to[0].1, "c1");
        // duplicate child ids collapse
        assert_eq!(inputs.has_many[0].1, vec!["p1".to_string(), "p2".to_string()]);
    }

    #[test]
    fn bare_id_strings_work_for_belongs_to() {
        let mut body = json!({"customer": "c7"}).as_object().cloned().unwrap();
        let inputs = split_inputs(invoices(), &mut body).unwrap();
        assert_eq!(inputs.belongs_to[0].1, "c7");
    }

    #[test]
    fn raw_fk_columns_resolve_like_relation_references() {
        let mut body = json!({"amount": 5.0, "customer_id": "c9"})
            .as_object()
            .cloned()
            .unwrap();
        let inputs = split_inputs(invoices(), &mut body).unwrap();
        // The FK column never reaches the insert directly.
        assert!(body.get("customer_id").is_none());
        assert_eq!(inputs.belongs_to[0].1, "c9");
    }

    #[test]
    fn relation_name_wins_over_the_raw_fk_column() {
        let mut body = json!({"customer": "c1", "customer_id": "c2"})
            .as_object()
            .cloned()
            .unwrap();
        let inputs = split_inputs(invoices(), &mut body).unwrap();
        assert_eq!(inputs.belongs_to.len(), 1);
        assert_eq!(inputs.belongs_to[0].1, "c1");
        assert!(body.get("customer_id").is_none());
    }

    #[test]
    fn null_references_are_ignored() {
        let mut body = json!({"customer": null, "payments": null})
            .as_object()
            .cloned()
            .unwrap();
        let inputs = split_inputs(invoices(), &mut body).unwrap();
        assert!(inputs.belongs_to.is_empty() && inputs.has_many.is_empty());
    }

    #[test]
    fn malformed_references_are_rejected() {
        let mut body = json!({"payments": "p1"}).as_object().cloned().unwrap();
        assert!(matches!(
            split_inputs(invoices(), &mut body),
            Err(AppError::BadRequest(_))
        ));
    }

    #[test]
    fn replacing_with_zero_resolved_children_is_not_found_never_a_clear() {
        assert!(matches!(require_resolved(&[]), Err(AppError::NotFound)));
        let resolved = vec!["p1".to_string()];
        assert_eq!(require_resolved(&resolved).unwrap(), &["p1".to_string()]);
    }

    #[test]
    fn connect_planning_is_an_idempotent_union() {
        let resolved = vec!["a".to_string(), "b".to_string()];
        let attached = vec!["b".to_string()];
        assert_eq!(ids_to_connect(&resolved, &attached), vec!["a".to_string()]);
        // connecting again is a no-op
        let attached = vec!["a".to_string(), "b".to_string()];
        assert!(ids_to_connect(&resolved, &attached).is_empty());
    }
}
