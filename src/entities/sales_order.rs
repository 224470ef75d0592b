use std::str::FromStr;

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use crate::errors::ServiceError;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::EnumString,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum SalesOrderStatus {
    Pending,
    Paid,
    Preparing,
    Shipped,
    ReadyPickup,
    Delivered,
    PickedUp,
    Cancelled,
}

impl SalesOrderStatus {
    pub fn from_db(value: &str) -> Result<Self, ServiceError> {
        Self::from_str(value).map_err(|_| {
            ServiceError::Internal(format!("unknown sales order state '{}'", value))
        })
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Delivered | Self::PickedUp | Self::Cancelled)
    }

    /// True while the order's stock consumption is outstanding: goods left
    /// the shelves at ship / ready-for-pickup and have not reached a terminal
    /// hand-off yet.
    pub fn stock_committed(&self) -> bool {
        matches!(self, Self::Shipped | Self::ReadyPickup)
    }
}

/// How and when this order is paid; fixes the legal delivery edges.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::EnumString,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum SalesPaymentMethod {
    Prepaid,
    Cod,
    Pickup,
    Credit,
}

impl SalesPaymentMethod {
    pub fn from_db(value: &str) -> Result<Self, ServiceError> {
        Self::from_str(value).map_err(|_| {
            ServiceError::Internal(format!("unknown payment method '{}'", value))
        })
    }

    /// Payment is captured on the final hand-off edge rather than up front.
    pub fn is_deferred(&self) -> bool {
        matches!(self, Self::Cod | Self::Pickup)
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "sales_orders")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub customer_id: i64,
    pub status: String,
    pub payment_method: String,
    /// Warehouse the order's stock is consumed from, fixed at creation.
    pub warehouse_id: i64,
    pub delivery_address: Option<String>,
    pub pickup_branch: Option<String>,
    pub courier_user_id: Option<i64>,
    pub recipient_name: Option<String>,
    pub notes: Option<String>,
    pub cancellation_reason: Option<String>,
    pub created_at: DateTimeUtc,
    pub paid_at: Option<DateTimeUtc>,
    pub prepared_at: Option<DateTimeUtc>,
    pub shipped_at: Option<DateTimeUtc>,
    pub ready_at: Option<DateTimeUtc>,
    pub delivered_at: Option<DateTimeUtc>,
    pub picked_up_at: Option<DateTimeUtc>,
    pub cancelled_at: Option<DateTimeUtc>,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::customer::Entity",
        from = "Column::CustomerId",
        to = "super::customer::Column::Id"
    )]
    Customer,
    #[sea_orm(has_many = "super::sales_order_item::Entity")]
    SalesOrderItem,
}

impl Related<super::customer::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Customer.def()
    }
}

impl Related<super::sales_order_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::SalesOrderItem.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
