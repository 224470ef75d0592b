use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "stock_transfer_items")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub transfer_id: i64,
    pub variant_id: i64,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub quantity: Decimal,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::stock_transfer::Entity",
        from = "Column::TransferId",
        to = "super::stock_transfer::Column::Id"
    )]
    StockTransfer,
}

impl Related<super::stock_transfer::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::StockTransfer.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
