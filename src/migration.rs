//! Apply the entity model to the database: enum types, tables, and foreign
//! keys, ordered by PostgreSQL dependencies. Idempotent: types and
//! constraints tolerate already-exists, tables use IF NOT EXISTS.

use crate::error::AppError;
use crate::model::{ColumnType, EntityDef, Model, RelationKind, PAYMENT_METHOD_TYPE, PAYMENT_METHOD_VALUES};
use sqlx::PgPool;

fn quote(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}

pub async fn apply_migrations(pool: &PgPool, model: &Model) -> Result<(), AppError> {
    // CREATE TYPE has no IF NOT EXISTS; a second run fails harmlessly.
    let _ = sqlx::query(&enum_type_sql()).execute(pool).await;

    for entity in model.entities() {
        sqlx::query(&create_table_sql(entity)).execute(pool).await?;
    }

    for sql in foreign_key_sqls(model) {
        let _ = sqlx::query(&sql).execute(pool).await;
    }

    Ok(())
}

fn enum_type_sql() -> String {
    let values: Vec<String> = PAYMENT_METHOD_VALUES
        .iter()
        .map(|v| format!("'{}'", v.replace('\'', "''")))
        .collect();
    format!(
        "CREATE TYPE {} AS ENUM ({})",
        quote(PAYMENT_METHOD_TYPE),
        values.join(", ")
    )
}

fn column_sql_type(ty: ColumnType) -> &'static str {
    match ty {
        ColumnType::Text => "TEXT",
        ColumnType::Double => "DOUBLE PRECISION",
        ColumnType::Integer => "INTEGER",
        ColumnType::Timestamp => "TIMESTAMPTZ",
        ColumnType::Enum { type_name, .. } => type_name,
    }
}

fn create_table_sql(entity: &EntityDef) -> String {
    let mut defs: Vec<String> = Vec::new();
    for col in entity.columns {
        let mut def = format!("{} {}", quote(col.name), column_sql_type(col.ty));
        if col.pk {
            def.push_str(" PRIMARY KEY");
        } else if matches!(col.name, "created_at" | "updated_at") {
            def.push_str(" NOT NULL DEFAULT NOW()");
        }
        defs.push(def);
    }
    format!(
        "CREATE TABLE IF NOT EXISTS {} (\n  {}\n)",
        quote(entity.table_name),
        defs.join(",\n  ")
    )
}

/// One ALTER TABLE per belongs-to relation. ON DELETE SET NULL keeps
/// children when their parent is deleted.
fn foreign_key_sqls(model: &Model) -> Vec<String> {
    let mut sqls = Vec::new();
    for entity in model.entities() {
        for rel in entity.relations {
            if rel.kind != RelationKind::BelongsTo {
                continue;
            }
            let constraint = format!("fk_{}_{}", entity.table_name, rel.fk_column);
            sqls.push(format!(
                "ALTER TABLE {} ADD CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {} (\"id\") ON DELETE SET NULL",
                quote(entity.table_name),
                quote(&constraint),
                quote(rel.fk_column),
                quote(rel.target_table)
            ));
        }
    }
    sqls
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enum_type_lists_every_method_token() {
        let sql = enum_type_sql();
        assert!(sql.starts_with("CREATE TYPE \"payment_method\" AS ENUM"));
        for token in PAYMENT_METHOD_VALUES {
            assert!(sql.contains(&format!("'{}'", token)));
        }
    }

    #[test]
    fn payments_table_uses_the_enum_type() {
        let model = Model::invoicing();
        let sql = create_table_sql(model.entity_by_path("payments").unwrap());
        assert!(sql.starts_with("CREATE TABLE IF NOT EXISTS \"payments\""));
        assert!(sql.contains("\"payment_method\" payment_method"));
        assert!(sql.contains("\"id\" TEXT PRIMARY KEY"));
        assert!(sql.contains("\"created_at\" TIMESTAMPTZ NOT NULL DEFAULT NOW()"));
    }

    #[test]
    fn every_belongs_to_gets_a_set_null_foreign_key() {
        let model = Model::invoicing();
        let sqls = foreign_key_sqls(&model);
        // invoices→customers, payments→invoices, products→invoices
        assert_eq!(sqls.len(), 3);
        assert!(sqls.iter().all(|s| s.ends_with("ON DELETE SET NULL")));
        assert!(sqls
            .iter()
            .any(|s| s.contains("\"invoices\" ADD CONSTRAINT \"fk_invoices_customer_id\"")));
    }
}
