//! Builds parameterized INSERT, SELECT, UPDATE, DELETE from the entity model.
//! Identifiers come from the static model only; values always bind as parameters.

use crate::model::{ColumnType, EntityDef, RelationDef};
use crate::query::FindManyArgs;
use serde_json::{Map, Value};

/// Quote identifier for PostgreSQL (safe: only from the static model).
fn quoted(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}

pub struct QueryBuf {
    pub sql: String,
    pub params: Vec<Value>,
}

impl QueryBuf {
    fn new() -> Self {
        QueryBuf {
            sql: String::new(),
            params: Vec::new(),
        }
    }

    fn push_param(&mut self, v: Value) -> usize {
        self.params.push(v);
        self.params.len()
    }
}

/// SELECT list for an entity: enum columns as `col::text` so sqlx returns String.
fn select_column_list(entity: &EntityDef, alias: Option<&str>) -> String {
    entity
        .columns
        .iter()
        .map(|c| {
            let q = quoted(c.name);
            let prefixed = match alias {
                Some(a) => format!("{}.{}", a, q),
                None => q.clone(),
            };
            if matches!(c.ty, ColumnType::Enum { .. }) {
                format!("{}::text AS {}", prefixed, q)
            } else if alias.is_some() {
                format!("{} AS {}", prefixed, q)
            } else {
                prefixed
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}

const MAIN_ALIAS: &str = "main";

/// Hard ceiling on page size.
const MAX_TAKE: u64 = 1000;

/// Scalar subquery producing the ordered id array of one has-many collection.
fn has_many_ids_subquery(rel: &RelationDef) -> String {
    format!(
        "(SELECT COALESCE(json_agg(sub.\"id\" ORDER BY sub.\"id\"), '[]'::json) FROM {} sub WHERE sub.{} = {}.\"id\") AS {}",
        quoted(rel.target_table),
        quoted(rel.fk_column),
        MAIN_ALIAS,
        quoted(rel.name)
    )
}

fn cast_placeholder(entity: &EntityDef, col: &str, param_num: usize) -> String {
    match entity.column(col) {
        Some(c) => format!("${}::{}", param_num, c.ty.pg_type()),
        None => format!("${}", param_num),
    }
}

fn where_clause(q: &mut QueryBuf, entity: &EntityDef, filters: &[(String, Value)], alias: Option<&str>) -> String {
    let mut parts = Vec::new();
    for (col, val) in filters {
        if entity.column(col).is_none() {
            continue;
        }
        let n = q.push_param(val.clone());
        let lhs = match alias {
            Some(a) => format!("{}.{}", a, quoted(col)),
            None => quoted(col),
        };
        parts.push(format!("{} = {}", lhs, cast_placeholder(entity, col, n)));
    }
    if parts.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", parts.join(" AND "))
    }
}

/// SELECT the DTO row set: scalar columns plus has-many id arrays, with the
/// pipeline composed in fixed order: where, then ORDER BY, then LIMIT (take)
/// and OFFSET (skip).
pub fn select_list(entity: &EntityDef, args: &FindManyArgs) -> QueryBuf {
    let mut q = QueryBuf::new();

    let mut select_parts = vec![select_column_list(entity, Some(MAIN_ALIAS))];
    for rel in entity.has_many() {
        select_parts.push(has_many_ids_subquery(rel));
    }

    let where_sql = where_clause(&mut q, entity, &args.filters, Some(MAIN_ALIAS));

    let order_sql = if args.sort_by.is_empty() {
        format!(" ORDER BY {}.{}", MAIN_ALIAS, quoted(entity.pk_column()))
    } else {
        let keys: Vec<String> = args
            .sort_by
            .iter()
            .map(|k| {
                format!(
                    "{}.{} {}",
                    MAIN_ALIAS,
                    quoted(&k.column),
                    if k.descending { "DESC" } else { "ASC" }
                )
            })
            .collect();
        format!(" ORDER BY {}", keys.join(", "))
    };

    let limit_sql = args
        .take
        .map(|n| format!(" LIMIT {}", n.min(MAX_TAKE)))
        .unwrap_or_default();
    let offset_sql = args.skip.map(|n| format!(" OFFSET {}", n)).unwrap_or_default();

    q.sql = format!(
        "SELECT {} FROM {} {}{}{}{}{}",
        select_parts.join(", "),
        quoted(entity.table_name),
        MAIN_ALIAS,
        where_sql,
        order_sql,
        limit_sql,
        offset_sql
    );
    q
}

/// COUNT rows matching the where clause only; skip/take/sort never apply.
pub fn count(entity: &EntityDef, filters: &[(String, Value)]) -> QueryBuf {
    let mut q = QueryBuf::new();
    let where_sql = where_clause(&mut q, entity, filters, None);
    q.sql = format!(
        "SELECT COUNT(*) FROM {}{}",
        quoted(entity.table_name),
        where_sql
    );
    q
}

/// INSERT one row from body (snake_case column keys). Only model columns are
/// written; the service supplies id and timestamps before calling this.
pub fn insert(entity: &EntityDef, body: &Map<String, Value>) -> QueryBuf {
    let mut q = QueryBuf::new();
    let mut cols = Vec::new();
    let mut placeholders = Vec::new();
    for c in entity.columns {
        let Some(val) = body.get(c.name) else { continue };
        let n = q.push_param(val.clone());
        cols.push(quoted(c.name));
        placeholders.push(format!("${}::{}", n, c.ty.pg_type()));
    }
    q.sql = format!(
        "INSERT INTO {} ({}) VALUES ({}) RETURNING {}",
        quoted(entity.table_name),
        cols.join(", "),
        placeholders.join(", "),
        quoted(entity.pk_column())
    );
    q
}

/// UPDATE by id: SET only columns present in body. `updated_at` is always
/// bumped so the patch contract holds even for relation-only patches.
pub fn update_partial(entity: &EntityDef, id: &str, body: &Map<String, Value>) -> QueryBuf {
    let mut q = QueryBuf::new();
    let pk = entity.pk_column();
    let mut sets = Vec::new();
    for (k, v) in body {
        if k == pk {
            continue;
        }
        let Some(c) = entity.column(k) else { continue };
        let n = q.push_param(v.clone());
        sets.push(format!("{} = ${}::{}", quoted(k), n, c.ty.pg_type()));
    }
    if !body.contains_key("updated_at") {
        sets.push(format!("{} = NOW()", quoted("updated_at")));
    }
    let id_param = q.push_param(Value::String(id.to_string()));
    q.sql = format!(
        "UPDATE {} SET {} WHERE {} = ${}",
        quoted(entity.table_name),
        sets.join(", "),
        quoted(pk),
        id_param
    );
    q
}

/// DELETE by id.
pub fn delete(entity: &EntityDef, id: &str) -> QueryBuf {
    let mut q = QueryBuf::new();
    let n = q.push_param(Value::String(id.to_string()));
    q.sql = format!(
        "DELETE FROM {} WHERE {} = ${}",
        quoted(entity.table_name),
        quoted(entity.pk_column()),
        n
    );
    q
}

/// SELECT existing ids from the entity where id IN (ids). Used to resolve
/// relation references; ids that do not come back did not resolve.
pub fn select_ids_in(entity: &EntityDef, ids: &[String]) -> QueryBuf {
    let mut q = QueryBuf::new();
    let pk = quoted(entity.pk_column());
    if ids.is_empty() {
        q.sql = format!("SELECT {} FROM {} WHERE 1 = 0", pk, quoted(entity.table_name));
        return q;
    }
    let placeholders: Vec<String> = ids
        .iter()
        .map(|id| {
            let n = q.push_param(Value::String(id.clone()));
            format!("${}", n)
        })
        .collect();
    q.sql = format!(
        "SELECT {} FROM {} WHERE {} IN ({}) ORDER BY {}",
        pk,
        quoted(entity.table_name),
        pk,
        placeholders.join(", "),
        pk
    );
    q
}

/// SELECT the ids currently attached to a parent via fk_column.
pub fn select_attached_ids(child: &EntityDef, fk_column: &str, parent_id: &str) -> QueryBuf {
    let mut q = QueryBuf::new();
    let n = q.push_param(Value::String(parent_id.to_string()));
    q.sql = format!(
        "SELECT {} FROM {} WHERE {} = ${} ORDER BY {}",
        quoted(child.pk_column()),
        quoted(child.table_name),
        quoted(fk_column),
        n,
        quoted(child.pk_column())
    );
    q
}

/// UPDATE children's fk to point at parent (connect / replace).
pub fn set_fk(child: &EntityDef, fk_column: &str, parent_id: &str, ids: &[String]) -> QueryBuf {
    let mut q = QueryBuf::new();
    let parent = q.push_param(Value::String(parent_id.to_string()));
    let placeholders: Vec<String> = ids
        .iter()
        .map(|id| format!("${}", q.push_param(Value::String(id.clone()))))
        .collect();
    q.sql = format!(
        "UPDATE {} SET {} = ${} WHERE {} IN ({})",
        quoted(child.table_name),
        quoted(fk_column),
        parent,
        quoted(child.pk_column()),
        placeholders.join(", ")
    );
    q
}

/// UPDATE children's fk to NULL for the given ids, only where currently
/// attached to parent (disconnect).
pub fn clear_fk_for_ids(child: &EntityDef, fk_column: &str, parent_id: &str, ids: &[String]) -> QueryBuf {
    let mut q = QueryBuf::new();
    let parent = q.push_param(Value::String(parent_id.to_string()));
    let placeholders: Vec<String> = ids
        .iter()
        .map(|id| format!("${}", q.push_param(Value::String(id.clone()))))
        .collect();
    q.sql = format!(
        "UPDATE {} SET {} = NULL WHERE {} = ${} AND {} IN ({})",
        quoted(child.table_name),
        quoted(fk_column),
        quoted(fk_column),
        parent,
        quoted(child.pk_column()),
        placeholders.join(", ")
    );
    q
}

/// UPDATE all current children's fk to NULL (first half of a replace).
pub fn clear_fk_of_parent(child: &EntityDef, fk_column: &str, parent_id: &str) -> QueryBuf {
    let mut q = QueryBuf::new();
    let n = q.push_param(Value::String(parent_id.to_string()));
    q.sql = format!(
        "UPDATE {} SET {} = NULL WHERE {} = ${}",
        quoted(child.table_name),
        quoted(fk_column),
        quoted(fk_column),
        n
    );
    q
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Model;
    use crate::query::{FindManyArgs, SortKey};
    use serde_json::json;

    fn invoices() -> &'static EntityDef {
        Model::invoicing().entity_by_path("invoices").unwrap()
    }

    fn payments() -> &'static EntityDef {
        Model::invoicing().entity_by_path("payments").unwrap()
    }

    #[test]
    fn list_composes_where_order_limit_offset_in_fixed_order() {
        let args = FindManyArgs {
            filters: vec![("customer_id".to_string(), json!("c1"))],
            skip: Some(2),
            take: Some(1),
            sort_by: vec![],
        };
        let q = select_list(invoices(), &args);
        let where_pos = q.sql.find("WHERE").unwrap();
        let order_pos = q.sql.find("ORDER BY").unwrap();
        let limit_pos = q.sql.find("LIMIT 1").unwrap();
        let offset_pos = q.sql.find("OFFSET 2").unwrap();
        assert!(where_pos < order_pos && order_pos < limit_pos && limit_pos < offset_pos);
        assert_eq!(q.params, vec![json!("c1")]);
    }

    #[test]
    fn default_sort_is_primary_key() {
        let q = select_list(invoices(), &FindManyArgs::default());
        assert!(q.sql.contains("ORDER BY main.\"id\""));
        assert!(!q.sql.contains("LIMIT"));
        assert!(!q.sql.contains("OFFSET"));
    }

    #[test]
    fn explicit_sort_keys_apply_in_order() {
        let args = FindManyArgs {
            sort_by: vec![
                SortKey { column: "created_at".into(), descending: true },
                SortKey { column: "id".into(), descending: false },
            ],
            ..Default::default()
        };
        let q = select_list(invoices(), &args);
        assert!(q.sql.contains("ORDER BY main.\"created_at\" DESC, main.\"id\" ASC"));
    }

    #[test]
    fn list_selects_has_many_id_arrays() {
        let q = select_list(invoices(), &FindManyArgs::default());
        assert!(q.sql.contains("json_agg(sub.\"id\""));
        assert!(q.sql.contains("\"invoice_id\" = main.\"id\""));
        assert!(q.sql.contains("AS \"payments\""));
        assert!(q.sql.contains("AS \"products\""));
    }

    #[test]
    fn take_is_capped_at_the_page_ceiling() {
        let args = FindManyArgs { take: Some(u64::MAX), ..Default::default() };
        let q = select_list(invoices(), &args);
        assert!(q.sql.contains("LIMIT 1000"));
        assert!(!q.sql.contains(&u64::MAX.to_string()));
    }

    #[test]
    fn related_list_is_a_plain_fk_filter_on_the_child_table() {
        // A parent id that matches nothing yields an empty list, not an error:
        // the query never consults the parent table.
        let args = FindManyArgs::default().with_fk("invoice_id", "ghost");
        let q = select_list(payments(), &args);
        assert!(q.sql.contains("FROM \"payments\""));
        assert!(q.sql.contains("WHERE main.\"invoice_id\" = $1::text"));
        assert!(!q.sql.contains("\"invoices\""));
        assert_eq!(q.params, vec![json!("ghost")]);
    }

    #[test]
    fn unknown_filter_fields_impose_no_constraint() {
        let args = FindManyArgs {
            filters: vec![("no_such_column".to_string(), json!("x"))],
            ..Default::default()
        };
        let q = select_list(invoices(), &args);
        assert!(!q.sql.contains("WHERE"));
        assert!(q.params.is_empty());
    }

    #[test]
    fn count_ignores_pagination_and_sort() {
        let args_filters = vec![("amount".to_string(), json!(10.0))];
        let q = count(invoices(), &args_filters);
        assert_eq!(
            q.sql,
            "SELECT COUNT(*) FROM \"invoices\" WHERE \"amount\" = $1::double precision"
        );
        assert!(!q.sql.contains("LIMIT") && !q.sql.contains("ORDER BY"));
    }

    #[test]
    fn enum_columns_read_back_as_text() {
        let q = select_list(payments(), &FindManyArgs::default());
        assert!(q.sql.contains("\"payment_method\"::text AS \"payment_method\""));
    }

    #[test]
    fn update_partial_sets_only_present_columns_and_bumps_updated_at() {
        let mut body = Map::new();
        body.insert("amount".to_string(), json!(12.5));
        let q = update_partial(invoices(), "inv-1", &body);
        assert!(q.sql.contains("\"amount\" = $1::double precision"));
        assert!(q.sql.contains("\"updated_at\" = NOW()"));
        assert!(!q.sql.contains("\"invoice_number\""));
        assert_eq!(q.params.last(), Some(&json!("inv-1")));
    }

    #[test]
    fn insert_writes_only_model_columns() {
        let mut body = Map::new();
        body.insert("id".to_string(), json!("inv-1"));
        body.insert("amount".to_string(), json!(10.0));
        body.insert("rogue".to_string(), json!("x"));
        let q = insert(invoices(), &body);
        assert!(q.sql.starts_with("INSERT INTO \"invoices\""));
        assert!(!q.sql.contains("rogue"));
        assert!(q.sql.ends_with("RETURNING \"id\""));
        assert_eq!(q.params.len(), 2);
    }

    #[test]
    fn resolve_with_no_ids_matches_nothing() {
        let q = select_ids_in(payments(), &[]);
        assert!(q.sql.contains("WHERE 1 = 0"));
        assert!(q.params.is_empty());
    }

    #[test]
    fn disconnect_only_touches_children_of_the_parent() {
        let q = clear_fk_for_ids(payments(), "invoice_id", "inv-1", &["p1".into(), "p2".into()]);
        assert!(q.sql.contains("\"invoice_id\" = NULL") || q.sql.contains("SET \"invoice_id\" = NULL"));
        assert!(q.sql.contains("\"invoice_id\" = $1"));
        assert_eq!(q.params.len(), 3);
    }
}
