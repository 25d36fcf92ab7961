//! Generic entity service: CRUD and relation management against PostgreSQL,
//! parameterized by the static entity model.

use crate::case::object_keys_to_snake_case;
use crate::dto;
use crate::error::AppError;
use crate::model::{EntityDef, Model, RelationDef, RelationKind};
use crate::query::FindManyArgs;
use crate::service::relations::{self, RelationInputs};
use crate::service::validation;
use crate::sql::{self, PgBindValue, QueryBuf};
use chrono::Utc;
use serde_json::{Map, Value};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

/// One service instance per request, holding the connection pool handle and
/// the entity it operates on.
pub struct EntityService<'a> {
    pool: &'a PgPool,
    model: Model,
    entity: &'static EntityDef,
}

impl<'a> EntityService<'a> {
    pub fn new(pool: &'a PgPool, model: Model, entity: &'static EntityDef) -> Self {
        EntityService { pool, model, entity }
    }

    pub fn entity(&self) -> &'static EntityDef {
        self.entity
    }

    /// Create one row. Client-supplied id is honored, else a UUID is
    /// generated. Relation references resolve by id lookup; unresolved
    /// references are dropped with a warning. The insert, relation
    /// attachment, and defensive re-read share one transaction.
    pub async fn create(&self, input: &Map<String, Value>) -> Result<Value, AppError> {
        let mut row = object_keys_to_snake_case(input);
        let rel_inputs = relations::split_inputs(self.entity, &mut row)?;
        validation::validate(self.entity, &row)?;

        let id = match row.get("id").and_then(Value::as_str) {
            Some(s) if !s.is_empty() => s.to_string(),
            _ => Uuid::new_v4().to_string(),
        };
        row.insert("id".to_string(), Value::String(id.clone()));
        let now = Value::String(Utc::now().to_rfc3339());
        if !row.contains_key("created_at") {
            row.insert("created_at".to_string(), now.clone());
        }
        if !row.contains_key("updated_at") {
            row.insert("updated_at".to_string(), now);
        }

        let mut tx = self.pool.begin().await?;
        self.apply_belongs_to(&mut tx, &mut row, &rel_inputs).await?;
        execute(&mut tx, &sql::insert(self.entity, &row)).await?;
        self.attach_has_many(&mut tx, &id, &rel_inputs).await?;

        let reread = sql::select_list(self.entity, &FindManyArgs::by_id(self.entity, &id));
        let rows = fetch_rows(&mut tx, &reread).await?;
        tx.commit().await?;

        // Defensive: the row was just inserted, so an empty re-read is a fault.
        let row = rows.first().ok_or(AppError::NotFound)?;
        Ok(dto::project(self.entity, row))
    }

    /// Delete one row by id; children detach via FK ON DELETE SET NULL.
    pub async fn delete(&self, id: &str) -> Result<(), AppError> {
        let mut conn = self.pool.acquire().await?;
        let affected = execute(&mut conn, &sql::delete(self.entity, id)).await?;
        if affected == 0 {
            return Err(AppError::NotFound);
        }
        Ok(())
    }

    /// Filtered/sorted/paginated DTO list.
    pub async fn find_many(&self, args: &FindManyArgs) -> Result<Vec<Value>, AppError> {
        let mut conn = self.pool.acquire().await?;
        let rows = fetch_rows(&mut conn, &sql::select_list(self.entity, args)).await?;
        Ok(dto::project_all(self.entity, &rows))
    }

    /// Count of rows matching the where clause; skip/take/sort ignored.
    pub async fn meta(&self, args: &FindManyArgs) -> Result<i64, AppError> {
        let q = sql::count(self.entity, &args.filters);
        tracing::debug!(sql = %q.sql, "query");
        let mut query = sqlx::query_scalar::<_, i64>(&q.sql);
        for p in &q.params {
            query = query.bind(PgBindValue::from_json(p));
        }
        Ok(query.fetch_one(self.pool).await?)
    }

    /// Get one row: find-many filtered by id, first result.
    pub async fn get(&self, id: &str) -> Result<Value, AppError> {
        let dtos = self.find_many(&FindManyArgs::by_id(self.entity, id)).await?;
        dtos.into_iter().next().ok_or(AppError::NotFound)
    }

    /// Partial update: only fields present in the patch are written.
    /// A patch that matches no row is NotFound.
    pub async fn update(&self, id: &str, patch: &Map<String, Value>) -> Result<(), AppError> {
        let mut row = object_keys_to_snake_case(patch);
        let rel_inputs = relations::split_inputs(self.entity, &mut row)?;
        validation::validate(self.entity, &row)?;

        let mut tx = self.pool.begin().await?;
        self.apply_belongs_to(&mut tx, &mut row, &rel_inputs).await?;
        let affected = execute(&mut tx, &sql::update_partial(self.entity, id, &row)).await?;
        if affected == 0 {
            return Err(AppError::NotFound);
        }
        // A has-many field in the patch replaces the collection outright.
        for (rel, ids) in &rel_inputs.has_many {
            let child = self.target(rel)?;
            let resolved = resolve_ids(&mut tx, child, ids).await?;
            warn_on_dropped(self.entity, rel, ids, &resolved);
            execute(&mut tx, &sql::clear_fk_of_parent(child, rel.fk_column, id)).await?;
            if !resolved.is_empty() {
                execute(&mut tx, &sql::set_fk(child, rel.fk_column, id, &resolved)).await?;
            }
        }
        tx.commit().await?;
        Ok(())
    }

    /// Load the DTO on the one-side of a belongs-to relation.
    pub async fn get_related(&self, id: &str, rel: &RelationDef) -> Result<Value, AppError> {
        if rel.kind != RelationKind::BelongsTo {
            return Err(AppError::BadRequest(format!("{} is not a to-one relation", rel.name)));
        }
        let mut conn = self.pool.acquire().await?;
        let owner = sql::select_list(self.entity, &FindManyArgs::by_id(self.entity, id));
        let rows = fetch_rows(&mut conn, &owner).await?;
        let row = rows.first().ok_or(AppError::NotFound)?;
        let related_id = row
            .get(rel.fk_column)
            .and_then(Value::as_str)
            .ok_or(AppError::NotFound)?
            .to_string();

        let target = self.target(rel)?;
        let related = sql::select_list(target, &FindManyArgs::by_id(target, &related_id));
        let rows = fetch_rows(&mut conn, &related).await?;
        let row = rows.first().ok_or(AppError::NotFound)?;
        Ok(dto::project(target, row))
    }

    /// Set-union connect: only children not already attached get their FK set.
    /// NotFound when the parent is absent or no child id resolves.
    pub async fn connect_related(
        &self,
        id: &str,
        rel: &RelationDef,
        child_ids: &[String],
    ) -> Result<(), AppError> {
        let child = self.require_has_many(rel)?;
        let wanted = relations::dedup(child_ids.to_vec());

        let mut tx = self.pool.begin().await?;
        self.require_parent(&mut tx, id).await?;
        let resolved = resolve_ids(&mut tx, child, &wanted).await?;
        let resolved = relations::require_resolved(&resolved)?;
        let attached = fetch_ids(&mut tx, &sql::select_attached_ids(child, rel.fk_column, id)).await?;
        let to_connect = relations::ids_to_connect(resolved, &attached);
        if !to_connect.is_empty() {
            execute(&mut tx, &sql::set_fk(child, rel.fk_column, id, &to_connect)).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Set-difference disconnect: resolved, attached children get their FK
    /// nulled; unresolved or unattached ids are silent no-ops.
    pub async fn disconnect_related(
        &self,
        id: &str,
        rel: &RelationDef,
        child_ids: &[String],
    ) -> Result<(), AppError> {
        let child = self.require_has_many(rel)?;
        let wanted = relations::dedup(child_ids.to_vec());

        let mut tx = self.pool.begin().await?;
        self.require_parent(&mut tx, id).await?;
        let resolved = resolve_ids(&mut tx, child, &wanted).await?;
        if !resolved.is_empty() {
            execute(&mut tx, &sql::clear_fk_for_ids(child, rel.fk_column, id, &resolved)).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Children of the parent, filtered through the standard pipeline. An
    /// unknown parent simply matches no children and yields an empty list.
    pub async fn find_related(
        &self,
        id: &str,
        rel: &RelationDef,
        args: FindManyArgs,
    ) -> Result<Vec<Value>, AppError> {
        let child = self.require_has_many(rel)?;
        let args = args.with_fk(rel.fk_column, id);
        let mut conn = self.pool.acquire().await?;
        let rows = fetch_rows(&mut conn, &sql::select_list(child, &args)).await?;
        Ok(dto::project_all(child, &rows))
    }

    /// Replace the whole collection with the resolved set. Zero resolved
    /// children is NotFound, never a clear.
    pub async fn update_related(
        &self,
        id: &str,
        rel: &RelationDef,
        child_ids: &[String],
    ) -> Result<(), AppError> {
        let child = self.require_has_many(rel)?;
        let wanted = relations::dedup(child_ids.to_vec());

        let mut tx = self.pool.begin().await?;
        self.require_parent(&mut tx, id).await?;
        let resolved = resolve_ids(&mut tx, child, &wanted).await?;
        let resolved = relations::require_resolved(&resolved)?;
        execute(&mut tx, &sql::clear_fk_of_parent(child, rel.fk_column, id)).await?;
        execute(&mut tx, &sql::set_fk(child, rel.fk_column, id, resolved)).await?;
        tx.commit().await?;
        Ok(())
    }

    fn target(&self, rel: &RelationDef) -> Result<&'static EntityDef, AppError> {
        self.model
            .entity_by_path(rel.target)
            .ok_or_else(|| AppError::BadRequest(format!("unknown relation target {}", rel.target)))
    }

    fn require_has_many(&self, rel: &RelationDef) -> Result<&'static EntityDef, AppError> {
        if rel.kind != RelationKind::HasMany {
            return Err(AppError::BadRequest(format!(
                "{} is not a collection relation",
                rel.name
            )));
        }
        self.target(rel)
    }

    async fn require_parent(&self, conn: &mut PgConnection, id: &str) -> Result<(), AppError> {
        let ids = fetch_ids(conn, &sql::select_ids_in(self.entity, &[id.to_string()])).await?;
        if ids.is_empty() {
            return Err(AppError::NotFound);
        }
        Ok(())
    }

    /// Resolve belongs-to references and write their FK columns into the row.
    async fn apply_belongs_to(
        &self,
        conn: &mut PgConnection,
        row: &mut Map<String, Value>,
        inputs: &RelationInputs,
    ) -> Result<(), AppError> {
        for (rel, wanted) in &inputs.belongs_to {
            let target = self.target(rel)?;
            let resolved = resolve_ids(conn, target, std::slice::from_ref(wanted)).await?;
            if resolved.is_empty() {
                tracing::warn!(
                    entity = self.entity.path_segment,
                    relation = rel.name,
                    id = %wanted,
                    "unresolved reference dropped"
                );
            } else {
                row.insert(rel.fk_column.to_string(), Value::String(wanted.clone()));
            }
        }
        Ok(())
    }

    /// Attach has-many references by setting the FK on resolved children.
    async fn attach_has_many(
        &self,
        conn: &mut PgConnection,
        parent_id: &str,
        inputs: &RelationInputs,
    ) -> Result<(), AppError> {
        for (rel, ids) in &inputs.has_many {
            let child = self.target(rel)?;
            let resolved = resolve_ids(conn, child, ids).await?;
            warn_on_dropped(self.entity, rel, ids, &resolved);
            if !resolved.is_empty() {
                execute(conn, &sql::set_fk(child, rel.fk_column, parent_id, &resolved)).await?;
            }
        }
        Ok(())
    }
}

fn warn_on_dropped(entity: &EntityDef, rel: &RelationDef, wanted: &[String], resolved: &[String]) {
    if resolved.len() < wanted.len() {
        tracing::warn!(
            entity = entity.path_segment,
            relation = rel.name,
            wanted = wanted.len(),
            resolved = resolved.len(),
            "unresolved references dropped"
        );
    }
}

async fn resolve_ids(
    conn: &mut PgConnection,
    entity: &EntityDef,
    ids: &[String],
) -> Result<Vec<String>, AppError> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    fetch_ids(conn, &sql::select_ids_in(entity, ids)).await
}

async fn fetch_ids(conn: &mut PgConnection, q: &QueryBuf) -> Result<Vec<String>, AppError> {
    tracing::debug!(sql = %q.sql, "query");
    let mut query = sqlx::query_scalar::<_, String>(&q.sql);
    for p in &q.params {
        query = query.bind(PgBindValue::from_json(p));
    }
    Ok(query.fetch_all(&mut *conn).await?)
}

async fn fetch_rows(
    conn: &mut PgConnection,
    q: &QueryBuf,
) -> Result<Vec<Map<String, Value>>, AppError> {
    tracing::debug!(sql = %q.sql, "query");
    let mut query = sqlx::query(&q.sql);
    for p in &q.params {
        query = query.bind(PgBindValue::from_json(p));
    }
    let rows = query.fetch_all(&mut *conn).await?;
    Ok(rows.iter().map(row_to_map).collect())
}

async fn execute(conn: &mut PgConnection, q: &QueryBuf) -> Result<u64, AppError> {
    tracing::debug!(sql = %q.sql, "query");
    let mut query = sqlx::query(&q.sql);
    for p in &q.params {
        query = query.bind(PgBindValue::from_json(p));
    }
    let result = query.execute(&mut *conn).await?;
    Ok(result.rows_affected())
}

fn row_to_map(row: &sqlx::postgres::PgRow) -> Map<String, Value> {
    use sqlx::{Column, Row};
    let mut map = Map::new();
    for col in row.columns() {
        let name = col.name();
        map.insert(name.to_string(), cell_to_value(row, name));
    }
    map
}

fn cell_to_value(row: &sqlx::postgres::PgRow, name: &str) -> Value {
    use sqlx::Row;
    if let Ok(Some(n)) = row.try_get::<Option<i32>, _>(name) {
        return Value::Number(n.into());
    }
    if let Ok(Some(n)) = row.try_get::<Option<i64>, _>(name) {
        return Value::Number(n.into());
    }
    if let Ok(Some(n)) = row.try_get::<Option<f64>, _>(name) {
        if let Some(n) = serde_json::Number::from_f64(n) {
            return Value::Number(n);
        }
    }
    if let Ok(Some(b)) = row.try_get::<Option<bool>, _>(name) {
        return Value::Bool(b);
    }
    if let Ok(Some(d)) = row.try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(name) {
        return Value::String(d.to_rfc3339());
    }
    if let Ok(Some(s)) = row.try_get::<Option<String>, _>(name) {
        return Value::String(s);
    }
    if let Ok(Some(j)) = row.try_get::<Option<Value>, _>(name) {
        return j;
    }
    Value::Null
}
