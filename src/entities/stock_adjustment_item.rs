use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "stock_adjustment_items")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub adjustment_id: i64,
    pub variant_id: i64,
    pub warehouse_id: i64,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub quantity_before: Decimal,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub quantity_after: Decimal,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::stock_adjustment::Entity",
        from = "Column::AdjustmentId",
        to = "super::stock_adjustment::Column::Id"
    )]
    StockAdjustment,
}

impl Related<super::stock_adjustment::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::StockAdjustment.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
