//! Generic entity CRUD handlers, resolved from the path segment.

use crate::broker::EventAction;
use crate::error::AppError;
use crate::extractors::{AuthUser, ROLE_USER};
use crate::model::{EntityDef, RelationKind};
use crate::query::{self, FindManyArgs};
use crate::response::{created, Meta};
use crate::service::EntityService;
use crate::state::AppState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Response,
    Json,
};
use serde_json::{json, Map, Value};

pub fn lookup(state: &AppState, path: &str) -> Result<&'static EntityDef, AppError> {
    state.model.entity_by_path(path).ok_or(AppError::NotFound)
}

fn service<'a>(state: &'a AppState, entity: &'static EntityDef) -> EntityService<'a> {
    EntityService::new(&state.pool, state.model, entity)
}

/// POST /:entity — create one row, 201 with a Location header.
pub async fn create(
    State(state): State<AppState>,
    Path(entity): Path<String>,
    user: AuthUser,
    Json(body): Json<Value>,
) -> Result<Response, AppError> {
    user.require_role(ROLE_USER)?;
    let entity = lookup(&state, &entity)?;
    let input = body
        .as_object()
        .ok_or_else(|| AppError::BadRequest("body must be a JSON object".into()))?;

    let dto = service(&state, entity).create(input).await?;
    publish(&state, entity, EventAction::Created, dto.clone()).await;

    let id = dto.get("id").and_then(Value::as_str).unwrap_or_default();
    Ok(created(format!("/api/{}/{}", entity.path_segment, id), dto))
}

/// GET /:entity — filtered, sorted, paginated list.
pub async fn list(
    State(state): State<AppState>,
    Path(entity): Path<String>,
    Query(pairs): Query<Vec<(String, String)>>,
    user: AuthUser,
) -> Result<Json<Vec<Value>>, AppError> {
    user.require_role(ROLE_USER)?;
    let entity = lookup(&state, &entity)?;
    let args = FindManyArgs::from_pairs(entity, &pairs);
    let dtos = service(&state, entity).find_many(&args).await?;
    Ok(Json(dtos))
}

/// POST /:entity/meta — count of rows matching the where clause. Ungated.
pub async fn meta(
    State(state): State<AppState>,
    Path(entity): Path<String>,
    Query(pairs): Query<Vec<(String, String)>>,
) -> Result<Json<Meta>, AppError> {
    let entity = lookup(&state, &entity)?;
    let args = FindManyArgs::from_pairs(entity, &pairs);
    let count = service(&state, entity).meta(&args).await?;
    Ok(Json(Meta { count }))
}

/// GET /:entity/:id — one row or 404.
pub async fn get_one(
    State(state): State<AppState>,
    Path((entity, id)): Path<(String, String)>,
    user: AuthUser,
) -> Result<Json<Value>, AppError> {
    user.require_role(ROLE_USER)?;
    let entity = lookup(&state, &entity)?;
    let dto = service(&state, entity).get(&id).await?;
    Ok(Json(dto))
}

/// PATCH /:entity/:id — partial update. Fields come from the query string,
/// a JSON body, or both; body fields win on conflict.
pub async fn update(
    State(state): State<AppState>,
    Path((entity, id)): Path<(String, String)>,
    Query(pairs): Query<Vec<(String, String)>>,
    user: AuthUser,
    body: Option<Json<Value>>,
) -> Result<StatusCode, AppError> {
    user.require_role(ROLE_USER)?;
    let entity = lookup(&state, &entity)?;

    let mut patch = patch_from_pairs(entity, &pairs);
    if let Some(Json(Value::Object(fields))) = body {
        for (key, value) in fields {
            patch.insert(key, value);
        }
    }

    let svc = service(&state, entity);
    svc.update(&id, &patch).await?;
    if let Ok(dto) = svc.get(&id).await {
        publish(&state, entity, EventAction::Updated, dto).await;
    }
    Ok(StatusCode::NO_CONTENT)
}

/// DELETE /:entity/:id — 204, or 404 if the row never existed.
pub async fn delete_one(
    State(state): State<AppState>,
    Path((entity, id)): Path<(String, String)>,
    user: AuthUser,
) -> Result<StatusCode, AppError> {
    user.require_role(ROLE_USER)?;
    let entity = lookup(&state, &entity)?;
    service(&state, entity).delete(&id).await?;
    publish(&state, entity, EventAction::Deleted, json!({ "id": id })).await;
    Ok(StatusCode::NO_CONTENT)
}

/// Build a patch map from query-string pairs. Scalar fields get typed values,
/// relation fields get ids (repeated keys accumulate into arrays for
/// collections); keys that match nothing in the model are dropped.
fn patch_from_pairs(entity: &'static EntityDef, pairs: &[(String, String)]) -> Map<String, Value> {
    let mut patch = Map::new();
    for (key, raw) in pairs {
        if let Some(rel) = entity.relation(key) {
            if rel.kind == RelationKind::HasMany {
                let entry = patch
                    .entry(key.clone())
                    .or_insert_with(|| Value::Array(Vec::new()));
                if let Value::Array(items) = entry {
                    items.push(Value::String(raw.clone()));
                }
            } else {
                patch.insert(key.clone(), Value::String(raw.clone()));
            }
            continue;
        }
        if let Some(column) = query::resolve_filter_column(entity, key) {
            let typed = query::typed_column_value(entity, &column, raw);
            patch.insert(key.clone(), typed);
        }
    }
    patch
}

/// Lifecycle events are best-effort; a broker failure never fails the request.
async fn publish(state: &AppState, entity: &EntityDef, action: EventAction, payload: Value) {
    if let Err(e) = state
        .producer
        .entity_event(entity.event_name, action, payload)
        .await
    {
        tracing::warn!(entity = entity.event_name, error = %e, "event publish failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Model;

    fn invoices() -> &'static EntityDef {
        Model::invoicing().entity_by_path("invoices").unwrap()
    }

    fn pairs(raw: &[(&str, &str)]) -> Vec<(String, String)> {
        raw.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn query_patch_types_scalars_and_collects_relation_ids() {
        let patch = patch_from_pairs(
            invoices(),
            &pairs(&[
                ("amount", "12.5"),
                ("customer", "c1"),
                ("payments", "p1"),
                ("payments", "p2"),
                ("bogus", "x"),
            ]),
        );
        assert_eq!(patch.get("amount"), Some(&json!(12.5)));
        assert_eq!(patch.get("customer"), Some(&json!("c1")));
        assert_eq!(patch.get("payments"), Some(&json!(["p1", "p2"])));
        assert!(patch.get("bogus").is_none());
    }
}
