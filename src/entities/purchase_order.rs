use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use crate::errors::ServiceError;

/// Canonical purchase order states. Stored values are the uppercase Spanish
/// identifiers the deployment standardized on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PurchaseOrderStatus {
    Borrador,
    Enviado,
    Confirmado,
    Rechazado,
    Recibido,
    Facturado,
    Cerrado,
}

impl PurchaseOrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Borrador => "BORRADOR",
            Self::Enviado => "ENVIADO",
            Self::Confirmado => "CONFIRMADO",
            Self::Rechazado => "RECHAZADO",
            Self::Recibido => "RECIBIDO",
            Self::Facturado => "FACTURADO",
            Self::Cerrado => "CERRADO",
        }
    }

    /// Parses a stored state, normalizing the lowercase values the legacy
    /// system wrote. Legacy rows are rewritten canonically on first mutation.
    pub fn from_db(value: &str) -> Result<Self, ServiceError> {
        match value {
            "BORRADOR" | "draft" => Ok(Self::Borrador),
            "ENVIADO" | "sent" => Ok(Self::Enviado),
            "CONFIRMADO" | "confirmed" => Ok(Self::Confirmado),
            "RECHAZADO" | "canceled" | "rejected" => Ok(Self::Rechazado),
            "RECIBIDO" | "received" | "partial" => Ok(Self::Recibido),
            "FACTURADO" | "invoiced" => Ok(Self::Facturado),
            "CERRADO" | "closed" => Ok(Self::Cerrado),
            other => Err(ServiceError::Internal(format!(
                "unknown purchase order state '{}'",
                other
            ))),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Rechazado | Self::Cerrado)
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "purchase_orders")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub supplier_id: i64,
    pub status: String,
    /// Warehouse credited when the order is received.
    pub warehouse_id: i64,
    pub supplier_invoice_number: Option<String>,
    pub notes: Option<String>,
    pub rejection_reason: Option<String>,
    pub created_at: DateTimeUtc,
    pub sent_at: Option<DateTimeUtc>,
    pub confirmed_at: Option<DateTimeUtc>,
    pub received_at: Option<DateTimeUtc>,
    pub invoiced_at: Option<DateTimeUtc>,
    pub closed_at: Option<DateTimeUtc>,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::supplier::Entity",
        from = "Column::SupplierId",
        to = "super::supplier::Column::Id"
    )]
    Supplier,
    #[sea_orm(has_many = "super::purchase_order_item::Entity")]
    PurchaseOrderItem,
}

impl Related<super::supplier::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Supplier.def()
    }
}

impl Related<super::purchase_order_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::PurchaseOrderItem.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
