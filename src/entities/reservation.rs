use std::str::FromStr;

use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use crate::errors::ServiceError;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::EnumString,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ReservationStatus {
    Pending,
    Deposited,
    Confirmed,
    Completed,
    Cancelled,
}

impl ReservationStatus {
    pub fn from_db(value: &str) -> Result<Self, ServiceError> {
        Self::from_str(value)
            .map_err(|_| ServiceError::Internal(format!("unknown reservation state '{}'", value)))
    }

    /// A pinned reservation claims its quantities against availability.
    pub fn pins_stock(&self) -> bool {
        matches!(self, Self::Pending | Self::Deposited | Self::Confirmed)
    }
}

/// States whose reservations count against availability, as stored strings.
pub const PINNED_STATES: [&str; 3] = ["PENDING", "DEPOSITED", "CONFIRMED"];

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "reservations")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub customer_id: i64,
    pub status: String,
    pub reserve_at: Option<DateTimeUtc>,
    pub notes: Option<String>,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))", nullable)]
    pub deposit_amount: Option<Decimal>,
    pub deposit_method: Option<String>,
    pub deposit_receipt: Option<String>,
    pub deposit_at: Option<DateTimeUtc>,
    pub confirmed_at: Option<DateTimeUtc>,
    pub reminder_at: Option<DateTimeUtc>,
    /// Sales order spawned on completion.
    pub sales_order_id: Option<i64>,
    pub cancellation_reason: Option<String>,
    pub cancelled_at: Option<DateTimeUtc>,
    pub created_at: DateTimeUtc,
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
    #[sea_orm(has_many = "super::reservation_item::Entity")]
    ReservationItem,
}

impl Related<super::customer::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Customer.def()
    }
}

impl Related<super::reservation_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ReservationItem.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
