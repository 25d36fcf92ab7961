//! Relation handlers: to-one reads and collection connect / disconnect /
//! find / replace, resolved from the `/:entity/:id/:relation` path.

use crate::error::AppError;
use crate::extractors::{AuthUser, ROLE_USER};
use crate::handlers::entity::lookup;
use crate::model::{EntityDef, RelationDef, RelationKind};
use crate::query::FindManyArgs;
use crate::service::{relations, EntityService};
use crate::state::AppState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde_json::Value;

fn resolve(
    state: &AppState,
    entity: &str,
    relation: &str,
) -> Result<(&'static EntityDef, &'static RelationDef), AppError> {
    let entity = lookup(state, entity)?;
    let rel = entity.relation(relation).ok_or(AppError::NotFound)?;
    Ok((entity, rel))
}

/// Child references arrive either as repeated `id=` query parameters or as a
/// JSON body array of ids / `{ "id": … }` objects; the body wins when present.
fn child_ids(pairs: &[(String, String)], body: Option<&Value>) -> Result<Vec<String>, AppError> {
    match body {
        Some(Value::Array(items)) => {
            let mut ids = Vec::with_capacity(items.len());
            for item in items {
                let id = relations::id_of(item).ok_or_else(|| {
                    AppError::BadRequest("each reference must be an id or an object with an id".into())
                })?;
                ids.push(id);
            }
            Ok(ids)
        }
        Some(_) => Err(AppError::BadRequest("body must be a JSON array of references".into())),
        None => Ok(pairs
            .iter()
            .filter(|(k, _)| k == "id")
            .map(|(_, v)| v.clone())
            .collect()),
    }
}

/// GET /:entity/:id/:relation — the related parent for a to-one relation
/// (ungated), or the filtered child collection for a to-many one.
pub async fn get(
    State(state): State<AppState>,
    Path((entity, id, relation)): Path<(String, String, String)>,
    Query(pairs): Query<Vec<(String, String)>>,
    user: Option<AuthUser>,
) -> Result<Json<Value>, AppError> {
    let (entity, rel) = resolve(&state, &entity, &relation)?;
    let svc = EntityService::new(&state.pool, state.model, entity);
    match rel.kind {
        RelationKind::BelongsTo => {
            let dto = svc.get_related(&id, rel).await?;
            Ok(Json(dto))
        }
        RelationKind::HasMany => {
            user.ok_or_else(|| AppError::Unauthorized("missing bearer token".into()))?
                .require_role(ROLE_USER)?;
            let target = state.model.entity_by_path(rel.target).ok_or(AppError::NotFound)?;
            let args = FindManyArgs::from_pairs(target, &pairs);
            let dtos = svc.find_related(&id, rel, args).await?;
            Ok(Json(Value::Array(dtos)))
        }
    }
}

/// POST /:entity/:id/:relation — connect children (idempotent set union).
pub async fn connect(
    State(state): State<AppState>,
    Path((entity, id, relation)): Path<(String, String, String)>,
    Query(pairs): Query<Vec<(String, String)>>,
    user: AuthUser,
    body: Option<Json<Value>>,
) -> Result<StatusCode, AppError> {
    user.require_role(ROLE_USER)?;
    let (entity, rel) = resolve(&state, &entity, &relation)?;
    let ids = child_ids(&pairs, body.as_deref())?;
    EntityService::new(&state.pool, state.model, entity)
        .connect_related(&id, rel, &ids)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// DELETE /:entity/:id/:relation — disconnect children; unknown or
/// unattached ids are silent no-ops.
pub async fn disconnect(
    State(state): State<AppState>,
    Path((entity, id, relation)): Path<(String, String, String)>,
    Query(pairs): Query<Vec<(String, String)>>,
    user: AuthUser,
    body: Option<Json<Value>>,
) -> Result<StatusCode, AppError> {
    user.require_role(ROLE_USER)?;
    let (entity, rel) = resolve(&state, &entity, &relation)?;
    let ids = child_ids(&pairs, body.as_deref())?;
    EntityService::new(&state.pool, state.model, entity)
        .disconnect_related(&id, rel, &ids)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// PATCH /:entity/:id/:relation — replace the collection with the given set.
pub async fn update(
    State(state): State<AppState>,
    Path((entity, id, relation)): Path<(String, String, String)>,
    Query(pairs): Query<Vec<(String, String)>>,
    user: AuthUser,
    body: Option<Json<Value>>,
) -> Result<StatusCode, AppError> {
    user.require_role(ROLE_USER)?;
    let (entity, rel) = resolve(&state, &entity, &relation)?;
    let ids = child_ids(&pairs, body.as_deref())?;
    EntityService::new(&state.pool, state.model, entity)
        .update_related(&id, rel, &ids)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn pairs(raw: &[(&str, &str)]) -> Vec<(String, String)> {
        raw.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn child_ids_come_from_repeated_query_params() {
        let ids = child_ids(&pairs(&[("id", "p1"), ("id", "p2"), ("take", "5")]), None).unwrap();
        assert_eq!(ids, vec!["p1".to_string(), "p2".to_string()]);
    }

    #[test]
    fn body_array_wins_over_query_params() {
        let body = json!([{"id": "p3"}, "p4"]);
        let ids = child_ids(&pairs(&[("id", "p1")]), Some(&body)).unwrap();
        assert_eq!(ids, vec!["p3".to_string(), "p4".to_string()]);
    }

    #[test]
    fn non_array_body_is_rejected() {
        let body = json!({"id": "p1"});
        assert!(matches!(
            child_ids(&[], Some(&body)),
            Err(AppError::BadRequest(_))
        ));
    }
}
