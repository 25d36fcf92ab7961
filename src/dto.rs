//! Row -> DTO projection: the externally visible shape of a persisted row.
//!
//! Scalar columns project under camelCase keys; a belongs-to FK projects
//! under the relation name as a bare id; each has-many collection projects
//! under the relation name as an array of child ids.

use crate::case::to_camel_case;
use crate::model::{EntityDef, RelationKind};
use serde_json::{Map, Value};

/// Project one row (snake_case column keys plus has-many id arrays, as
/// produced by the service's row readers) into the API DTO.
pub fn project(entity: &EntityDef, row: &Map<String, Value>) -> Value {
    let mut dto = Map::new();
    for col in entity.columns {
        let value = row.get(col.name).cloned().unwrap_or(Value::Null);
        let key = entity
            .relations
            .iter()
            .find(|r| r.kind == RelationKind::BelongsTo && r.fk_column == col.name)
            .map(|r| r.name.to_string())
            .unwrap_or_else(|| to_camel_case(col.name));
        dto.insert(key, value);
    }
    for rel in entity.has_many() {
        let ids = row.get(rel.name).cloned().unwrap_or_else(|| Value::Array(vec![]));
        dto.insert(rel.name.to_string(), ids);
    }
    Value::Object(dto)
}

/// Project a batch of rows.
pub fn project_all(entity: &EntityDef, rows: &[Map<String, Value>]) -> Vec<Value> {
    rows.iter().map(|r| project(entity, r)).collect()
}
