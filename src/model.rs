//! Static entity model: tables, columns, and relations for the invoicing domain.

/// Payment method tokens as they appear on the wire and in the Postgres enum type.
pub const PAYMENT_METHOD_VALUES: &[&str] =
    &["CreditCard", "DebitCard", "BankTransfer", "Cash", "Check"];

/// Name of the Postgres enum type backing `payments.payment_method`.
pub const PAYMENT_METHOD_TYPE: &str = "payment_method";

/// Column value type, used for SQL casts, query-string typing, and validation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ColumnType {
    Text,
    Double,
    Integer,
    Timestamp,
    /// Postgres enum type with a fixed token set.
    Enum { type_name: &'static str, values: &'static [&'static str] },
}

impl ColumnType {
    /// Postgres type name for `$n::type` casts when binding string values.
    pub fn pg_type(&self) -> &'static str {
        match *self {
            ColumnType::Text => "text",
            ColumnType::Double => "double precision",
            ColumnType::Integer => "integer",
            ColumnType::Timestamp => "timestamptz",
            ColumnType::Enum { type_name, .. } => type_name,
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct ColumnDef {
    pub name: &'static str,
    pub ty: ColumnType,
    pub pk: bool,
    /// Maximum string length (original StringLength annotations).
    pub max_length: Option<u32>,
    /// Inclusive numeric bounds (original Range annotations).
    pub minimum: Option<f64>,
    pub maximum: Option<f64>,
}

impl ColumnDef {
    const fn text(name: &'static str) -> Self {
        ColumnDef { name, ty: ColumnType::Text, pk: false, max_length: None, minimum: None, maximum: None }
    }

    const fn bounded_text(name: &'static str, max_length: u32) -> Self {
        ColumnDef { name, ty: ColumnType::Text, pk: false, max_length: Some(max_length), minimum: None, maximum: None }
    }

    const fn ranged(name: &'static str, ty: ColumnType) -> Self {
        ColumnDef { name, ty, pk: false, max_length: None, minimum: Some(-999_999_999.0), maximum: Some(999_999_999.0) }
    }

    const fn timestamp(name: &'static str) -> Self {
        ColumnDef { name, ty: ColumnType::Timestamp, pk: false, max_length: None, minimum: None, maximum: None }
    }

    const fn primary_key() -> Self {
        ColumnDef { name: "id", ty: ColumnType::Text, pk: true, max_length: None, minimum: None, maximum: None }
    }
}

/// Direction of a relation as seen from the owning entity.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RelationKind {
    /// This entity carries the FK column (e.g. invoice → customer).
    BelongsTo,
    /// The related entity carries the FK column back to us.
    HasMany,
}

#[derive(Clone, Copy, Debug)]
pub struct RelationDef {
    /// API field name: "customer" on invoices, "payments" on invoices.
    pub name: &'static str,
    pub kind: RelationKind,
    /// Path segment of the related entity, for model lookup.
    pub target: &'static str,
    /// Table of the related entity (avoids a lookup in SQL construction).
    pub target_table: &'static str,
    /// FK column: on this table for BelongsTo, on the target table for HasMany.
    pub fk_column: &'static str,
}

#[derive(Clone, Copy, Debug)]
pub struct EntityDef {
    pub table_name: &'static str,
    /// Lowercase plural URL segment (e.g. "invoices").
    pub path_segment: &'static str,
    /// Singular name used in broker topics (e.g. "invoice").
    pub event_name: &'static str,
    pub columns: &'static [ColumnDef],
    pub relations: &'static [RelationDef],
}

impl EntityDef {
    pub fn pk_column(&self) -> &'static str {
        self.columns.iter().find(|c| c.pk).map(|c| c.name).unwrap_or("id")
    }

    pub fn column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn relation(&self, name: &str) -> Option<&RelationDef> {
        self.relations.iter().find(|r| r.name == name)
    }

    /// Relations where the related table points back at us with a FK.
    pub fn has_many(&self) -> impl Iterator<Item = &RelationDef> {
        self.relations.iter().filter(|r| r.kind == RelationKind::HasMany)
    }
}

const CUSTOMER_COLUMNS: &[ColumnDef] = &[
    ColumnDef::primary_key(),
    ColumnDef::bounded_text("address", 1000),
    ColumnDef::text("email"),
    ColumnDef::bounded_text("first_name", 1000),
    ColumnDef::bounded_text("last_name", 1000),
    ColumnDef::timestamp("created_at"),
    ColumnDef::timestamp("updated_at"),
];

const CUSTOMER_RELATIONS: &[RelationDef] = &[RelationDef {
    name: "invoices",
    kind: RelationKind::HasMany,
    target: "invoices",
    target_table: "invoices",
    fk_column: "customer_id",
}];

const INVOICE_COLUMNS: &[ColumnDef] = &[
    ColumnDef::primary_key(),
    ColumnDef::ranged("amount", ColumnType::Double),
    ColumnDef::bounded_text("invoice_number", 1000),
    ColumnDef::timestamp("issue_date"),
    ColumnDef::timestamp("due_date"),
    ColumnDef::text("customer_id"),
    ColumnDef::timestamp("created_at"),
    ColumnDef::timestamp("updated_at"),
];

const INVOICE_RELATIONS: &[RelationDef] = &[
    RelationDef {
        name: "customer",
        kind: RelationKind::BelongsTo,
        target: "customers",
        target_table: "customers",
        fk_column: "customer_id",
    },
    RelationDef {
        name: "payments",
        kind: RelationKind::HasMany,
        target: "payments",
        target_table: "payments",
        fk_column: "invoice_id",
    },
    RelationDef {
        name: "products",
        kind: RelationKind::HasMany,
        target: "products",
        target_table: "products",
        fk_column: "invoice_id",
    },
];

const PAYMENT_COLUMNS: &[ColumnDef] = &[
    ColumnDef::primary_key(),
    ColumnDef::ranged("amount", ColumnType::Double),
    ColumnDef::timestamp("payment_date"),
    ColumnDef {
        name: "payment_method",
        ty: ColumnType::Enum { type_name: PAYMENT_METHOD_TYPE, values: PAYMENT_METHOD_VALUES },
        pk: false,
        max_length: None,
        minimum: None,
        maximum: None,
    },
    ColumnDef::text("invoice_id"),
    ColumnDef::timestamp("created_at"),
    ColumnDef::timestamp("updated_at"),
];

const PAYMENT_RELATIONS: &[RelationDef] = &[RelationDef {
    name: "invoice",
    kind: RelationKind::BelongsTo,
    target: "invoices",
    target_table: "invoices",
    fk_column: "invoice_id",
}];

const PRODUCT_COLUMNS: &[ColumnDef] = &[
    ColumnDef::primary_key(),
    ColumnDef::ranged("price", ColumnType::Double),
    ColumnDef::bounded_text("product_name", 1000),
    ColumnDef::ranged("quantity", ColumnType::Integer),
    ColumnDef::text("invoice_id"),
    ColumnDef::timestamp("created_at"),
    ColumnDef::timestamp("updated_at"),
];

const PRODUCT_RELATIONS: &[RelationDef] = &[RelationDef {
    name: "invoice",
    kind: RelationKind::BelongsTo,
    target: "invoices",
    target_table: "invoices",
    fk_column: "invoice_id",
}];

const ENTITIES: &[EntityDef] = &[
    EntityDef {
        table_name: "customers",
        path_segment: "customers",
        event_name: "customer",
        columns: CUSTOMER_COLUMNS,
        relations: CUSTOMER_RELATIONS,
    },
    EntityDef {
        table_name: "invoices",
        path_segment: "invoices",
        event_name: "invoice",
        columns: INVOICE_COLUMNS,
        relations: INVOICE_RELATIONS,
    },
    EntityDef {
        table_name: "payments",
        path_segment: "payments",
        event_name: "payment",
        columns: PAYMENT_COLUMNS,
        relations: PAYMENT_RELATIONS,
    },
    EntityDef {
        table_name: "products",
        path_segment: "products",
        event_name: "product",
        columns: PRODUCT_COLUMNS,
        relations: PRODUCT_RELATIONS,
    },
];

/// The resolved entity model. One instance is built at startup and shared via AppState.
#[derive(Clone, Copy, Debug)]
pub struct Model {
    entities: &'static [EntityDef],
}

impl Model {
    /// The invoicing model: customers, invoices, payments, products.
    pub fn invoicing() -> Self {
        Model { entities: ENTITIES }
    }

    pub fn entities(&self) -> &'static [EntityDef] {
        self.entities
    }

    pub fn entity_by_path(&self, path: &str) -> Option<&'static EntityDef> {
        self.entities.iter().find(|e| e.path_segment == path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_entities_resolve_by_path() {
        let model = Model::invoicing();
        for path in ["customers", "invoices", "payments", "products"] {
            let e = model.entity_by_path(path).unwrap();
            assert_eq!(e.path_segment, path);
            assert_eq!(e.pk_column(), "id");
        }
        assert!(model.entity_by_path("orders").is_none());
    }

    #[test]
    fn relation_fk_columns_exist_on_the_owning_table() {
        let model = Model::invoicing();
        for entity in model.entities() {
            for rel in entity.relations {
                let owner = match rel.kind {
                    RelationKind::BelongsTo => entity,
                    RelationKind::HasMany => model.entity_by_path(rel.target).unwrap(),
                };
                assert!(
                    owner.column(rel.fk_column).is_some(),
                    "{}.{} missing fk column {}",
                    entity.path_segment,
                    rel.name,
                    rel.fk_column
                );
            }
        }
    }

    #[test]
    fn invoice_has_three_relations() {
        let model = Model::invoicing();
        let invoice = model.entity_by_path("invoices").unwrap();
        assert!(matches!(invoice.relation("customer").unwrap().kind, RelationKind::BelongsTo));
        assert_eq!(invoice.has_many().count(), 2);
    }
}
