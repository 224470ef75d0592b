use std::str::FromStr;

use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use crate::errors::ServiceError;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::EnumString,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum InvoiceStatus {
    Issued,
    Void,
}

impl InvoiceStatus {
    pub fn from_db(value: &str) -> Result<Self, ServiceError> {
        Self::from_str(value)
            .map_err(|_| ServiceError::Internal(format!("unknown invoice state '{}'", value)))
    }
}

/// Issued invoice. Immutable except for the ISSUED → VOID state flip.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "invoices")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    /// "FAC-" + zero-padded six digits, strictly monotonic per deployment.
    #[sea_orm(unique)]
    pub number: String,
    pub sales_order_id: Option<i64>,
    pub customer_id: i64,
    /// Fiscal identity at issue time; later customer edits must not bleed in.
    pub tax_id: Option<String>,
    pub legal_name: Option<String>,
    pub issued_at: DateTimeUtc,
    pub due_at: Option<DateTimeUtc>,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub subtotal: Decimal,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub discount: Decimal,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub tax: Decimal,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub total: Decimal,
    pub status: String,
    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::customer::Entity",
        from = "Column::CustomerId",
        to = "super::customer::Column::Id"
    )]
    Customer,
    #[sea_orm(has_many = "super::invoice_item::Entity")]
    InvoiceItem,
    #[sea_orm(has_many = "super::payment::Entity")]
    Payment,
}

impl Related<super::customer::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Customer.def()
    }
}

impl Related<super::invoice_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::InvoiceItem.def()
    }
}

impl Related<super::payment::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Payment.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
