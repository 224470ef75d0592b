use std::collections::BTreeMap;

use rust_decimal::Decimal;
use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder};
use serde::{Deserialize, Serialize};

use crate::entities::{
    stock_balance::{self, Entity as StockBalance},
    stock_movement::{self, Entity as StockMovement},
};
use crate::errors::ServiceError;
use crate::services::inventory;

/// Per-variant aggregate across all warehouses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockSummaryRow {
    pub variant_id: i64,
    pub total_on_hand: Decimal,
    pub pinned_by_reservations: Decimal,
    pub available: Decimal,
}

/// Stock summary read model: thin aggregation over the authoritative tables,
/// rebuilt on every call.
pub async fn stock_summary<C: ConnectionTrait>(
    conn: &C,
) -> Result<Vec<StockSummaryRow>, ServiceError> {
    let balances = StockBalance::find().all(conn).await?;

    let mut on_hand: BTreeMap<i64, Decimal> = BTreeMap::new();
    for balance in balances {
        *on_hand.entry(balance.variant_id).or_default() += balance.quantity;
    }

    let mut rows = Vec::with_capacity(on_hand.len());
    for (variant_id, total) in on_hand {
        let pinned = inventory::pinned_quantity(conn, variant_id).await?;
        rows.push(StockSummaryRow {
            variant_id,
            total_on_hand: total,
            pinned_by_reservations: pinned,
            available: total - pinned,
        });
    }
    Ok(rows)
}

/// Balances held at one warehouse.
pub async fn warehouse_stock<C: ConnectionTrait>(
    conn: &C,
    warehouse_id: i64,
) -> Result<Vec<stock_balance::Model>, ServiceError> {
    Ok(StockBalance::find()
        .filter(stock_balance::Column::WarehouseId.eq(warehouse_id))
        .order_by_asc(stock_balance::Column::VariantId)
        .all(conn)
        .await?)
}

/// Ledger history for one (variant, warehouse) pair, oldest first. Summing
/// IN minus OUT over this list reproduces the balance.
pub async fn movement_history<C: ConnectionTrait>(
    conn: &C,
    variant_id: i64,
    warehouse_id: i64,
) -> Result<Vec<stock_movement::Model>, ServiceError> {
    Ok(StockMovement::find()
        .filter(stock_movement::Column::VariantId.eq(variant_id))
        .filter(stock_movement::Column::WarehouseId.eq(warehouse_id))
        .order_by_asc(stock_movement::Column::Id)
        .all(conn)
        .await?)
}
