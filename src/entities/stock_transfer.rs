use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "stock_transfers")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub batch_id: Uuid,
    pub source_warehouse_id: i64,
    pub dest_warehouse_id: i64,
    pub reason: String,
    pub actor_id: i64,
    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::stock_transfer_item::Entity")]
    StockTransferItem,
}

impl Related<super::stock_transfer_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::StockTransferItem.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
