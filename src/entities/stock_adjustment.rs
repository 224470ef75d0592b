use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "stock_adjustments")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Matches the batch_id of the movements this adjustment emitted.
    pub batch_id: Uuid,
    pub reason: String,
    pub actor_id: i64,
    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::stock_adjustment_item::Entity")]
    StockAdjustmentItem,
}

impl Related<super::stock_adjustment_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::StockAdjustmentItem.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
