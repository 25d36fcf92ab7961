//! Filter/paginate/sort arguments parsed from the request query string.

use crate::case::to_snake_case;
use crate::model::{ColumnType, EntityDef, RelationKind};
use serde_json::Value;

#[derive(Clone, Debug, PartialEq)]
pub struct SortKey {
    pub column: String,
    pub descending: bool,
}

/// The find-many pipeline inputs. Filters apply before skip/take/sort are
/// composed, in that fixed order; omitted fields impose no constraint.
#[derive(Clone, Debug, Default)]
pub struct FindManyArgs {
    /// (column, equality value) pairs; columns are already snake_case model names.
    pub filters: Vec<(String, Value)>,
    pub skip: Option<u64>,
    pub take: Option<u64>,
    pub sort_by: Vec<SortKey>,
}

impl FindManyArgs {
    /// Args selecting a single row by primary key.
    pub fn by_id(entity: &EntityDef, id: &str) -> Self {
        FindManyArgs {
            filters: vec![(entity.pk_column().to_string(), Value::String(id.to_string()))],
            ..Default::default()
        }
    }

    /// Parse from decoded query-string pairs. Accepts `where[field]=v` and bare
    /// `field=v` for filters; `skip`, `take` and `sortBy` are reserved keys.
    /// Unknown fields and malformed values are ignored (no constraint).
    pub fn from_pairs(entity: &EntityDef, pairs: &[(String, String)]) -> Self {
        let mut args = FindManyArgs::default();
        for (key, value) in pairs {
            match key.as_str() {
                "skip" => args.skip = value.parse().ok(),
                "take" => args.take = value.parse().ok(),
                "sortBy" => args.sort_by = parse_sort_by(entity, value),
                _ => {
                    let field = key
                        .strip_prefix("where[")
                        .and_then(|rest| rest.strip_suffix(']'))
                        .unwrap_or(key);
                    if let Some((column, typed)) = filter_value(entity, field, value) {
                        args.filters.push((column, typed));
                    }
                }
            }
        }
        args
    }

    /// The same args with a parent-FK equality filter prepended (find-related).
    pub fn with_fk(mut self, fk_column: &str, parent_id: &str) -> Self {
        self.filters.insert(
            0,
            (fk_column.to_string(), Value::String(parent_id.to_string())),
        );
        self
    }
}

/// Resolve an API field name to a model column: camelCase scalars map to their
/// snake_case column, belongs-to relation names map to their FK column.
pub fn resolve_filter_column(entity: &EntityDef, field: &str) -> Option<String> {
    let snake = to_snake_case(field);
    if entity.column(&snake).is_some() {
        return Some(snake);
    }
    entity
        .relation(field)
        .filter(|r| r.kind == RelationKind::BelongsTo)
        .map(|r| r.fk_column.to_string())
}

/// Type a raw query-string value for a column so the bind cast succeeds.
pub fn typed_column_value(entity: &EntityDef, column: &str, raw: &str) -> Value {
    match entity.column(column).map(|c| c.ty) {
        Some(ColumnType::Double) => raw
            .parse::<f64>()
            .ok()
            .and_then(|f| serde_json::Number::from_f64(f))
            .map(Value::Number)
            .unwrap_or_else(|| Value::String(raw.to_string())),
        Some(ColumnType::Integer) => raw
            .parse::<i64>()
            .map(|n| Value::Number(n.into()))
            .unwrap_or_else(|_| Value::String(raw.to_string())),
        _ => Value::String(raw.to_string()),
    }
}

fn filter_value(entity: &EntityDef, field: &str, raw: &str) -> Option<(String, Value)> {
    let column = resolve_filter_column(entity, field)?;
    let typed = typed_column_value(entity, &column, raw);
    Some((column, typed))
}

/// `sortBy=createdAt:desc,id` — comma-separated keys, optional `:asc`/`:desc`
/// suffix. Keys that do not name a column are dropped.
fn parse_sort_by(entity: &EntityDef, raw: &str) -> Vec<SortKey> {
    raw.split(',')
        .filter_map(|part| {
            let part = part.trim();
            if part.is_empty() {
                return None;
            }
            let (field, dir) = match part.split_once(':') {
                Some((f, d)) => (f, d),
                None => (part, "asc"),
            };
            let column = to_snake_case(field);
            entity.column(&column)?;
            Some(SortKey {
                column,
                descending: dir.eq_ignore_ascii_case("desc"),
            })
        })
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

    fn pairs(raw: &[(&str, &str)]) -> Vec<(String, String)> {
        raw.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn parses_skip_take_and_sort() {
        let args = FindManyArgs::from_pairs(
            invoices(),
            &pairs(&[("skip", "2"), ("take", "1"), ("sortBy", "createdAt:desc,id")]),
        );
        assert_eq!(args.skip, Some(2));
        assert_eq!(args.take, Some(1));
        assert_eq!(
            args.sort_by,
            vec![
                SortKey { column: "created_at".into(), descending: true },
                SortKey { column: "id".into(), descending: false },
            ]
        );
    }

    #[test]
    fn bare_and_bracketed_filters_are_equivalent() {
        let bare = FindManyArgs::from_pairs(invoices(), &pairs(&[("invoiceNumber", "INV-7")]));
        let bracketed =
            FindManyArgs::from_pairs(invoices(), &pairs(&[("where[invoiceNumber]", "INV-7")]));
        assert_eq!(bare.filters, bracketed.filters);
        assert_eq!(bare.filters, vec![("invoice_number".to_string(), json!("INV-7"))]);
    }

    #[test]
    fn belongs_to_field_filters_on_fk_column() {
        let args = FindManyArgs::from_pairs(invoices(), &pairs(&[("customer", "c1")]));
        assert_eq!(args.filters, vec![("customer_id".to_string(), json!("c1"))]);
    }

    #[test]
    fn numeric_columns_get_typed_values() {
        let args = FindManyArgs::from_pairs(invoices(), &pairs(&[("amount", "12.5")]));
        assert_eq!(args.filters, vec![("amount".to_string(), json!(12.5))]);
    }

    #[test]
    fn unknown_fields_and_sort_keys_are_dropped() {
        let args = FindManyArgs::from_pairs(
            invoices(),
            &pairs(&[("nonsense", "x"), ("sortBy", "nonsense:desc,amount")]),
        );
        assert!(args.filters.is_empty());
        assert_eq!(args.sort_by, vec![SortKey { column: "amount".into(), descending: false }]);
    }

    #[test]
    fn with_fk_prepends_the_parent_filter() {
        let args = FindManyArgs::from_pairs(invoices(), &pairs(&[("amount", "3")]))
            .with_fk("customer_id", "c9");
        assert_eq!(args.filters[0], ("customer_id".to_string(), json!("c9")));
    }
}
