use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QuerySelect, Set,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::auth::AuthContext;
use crate::db::{transact_with_retry, DbPool};
use crate::entities::{
    purchase_order::{self, Entity as PurchaseOrder, PurchaseOrderStatus},
    purchase_order_item::{self, Entity as PurchaseOrderItem},
    supplier::Entity as Supplier,
};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::services::inventory;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PurchaseItem {
    pub variant_id: i64,
    pub quantity: Decimal,
    pub unit_price: Option<Decimal>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatePurchaseOrder {
    pub supplier_id: i64,
    pub items: Vec<PurchaseItem>,
    /// Receiving warehouse; falls back to the configured default.
    pub warehouse_id: Option<i64>,
    pub notes: Option<String>,
}

/// A received line. Quantities may differ from what was ordered; zero means
/// the line never arrived.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReceivedItem {
    pub variant_id: i64,
    pub quantity: Decimal,
    pub unit_price: Option<Decimal>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PurchaseOrderWithItems {
    pub order: purchase_order::Model,
    pub items: Vec<purchase_order_item::Model>,
}

fn validate_items(items: &[PurchaseItem]) -> Result<(), ServiceError> {
    if items.is_empty() {
        return Err(ServiceError::InvalidInput("order has no items".into()));
    }
    for item in items {
        if item.quantity <= Decimal::ZERO {
            return Err(ServiceError::InvalidInput(format!(
                "quantity for variant {} must be positive",
                item.variant_id
            )));
        }
        if item.unit_price.is_some_and(|p| p < Decimal::ZERO) {
            return Err(ServiceError::InvalidInput(format!(
                "unit price for variant {} must not be negative",
                item.variant_id
            )));
        }
    }
    Ok(())
}

/// Loads the order under an exclusive lock and checks the transition edge.
/// Legacy lowercase states parse here and get rewritten by the mutation.
async fn load_for_transition<C: ConnectionTrait>(
    conn: &C,
    order_id: i64,
    allowed: &[PurchaseOrderStatus],
    edge: &str,
) -> Result<(purchase_order::Model, PurchaseOrderStatus), ServiceError> {
    let order = PurchaseOrder::find_by_id(order_id)
        .lock_exclusive()
        .one(conn)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("purchase order {} not found", order_id)))?;

    let status = PurchaseOrderStatus::from_db(&order.status)?;
    if !allowed.contains(&status) {
        return Err(ServiceError::InvalidState(format!(
            "cannot {} purchase order {} from state {}",
            edge,
            order_id,
            status.as_str()
        )));
    }
    Ok((order, status))
}

async fn replace_items<C: ConnectionTrait>(
    conn: &C,
    order_id: i64,
    items: &[PurchaseItem],
) -> Result<(), ServiceError> {
    PurchaseOrderItem::delete_many()
        .filter(purchase_order_item::Column::PurchaseOrderId.eq(order_id))
        .exec(conn)
        .await?;
    for item in items {
        purchase_order_item::ActiveModel {
            purchase_order_id: Set(order_id),
            variant_id: Set(item.variant_id),
            quantity: Set(item.quantity),
            unit_price: Set(item.unit_price),
            ..Default::default()
        }
        .insert(conn)
        .await?;
    }
    Ok(())
}

/// The purchasing state machine:
/// BORRADOR → ENVIADO → CONFIRMADO → RECIBIDO → FACTURADO → CERRADO,
/// with ENVIADO → RECHAZADO as the terminal refusal.
#[derive(Clone)]
pub struct PurchaseOrderService {
    db: Arc<DbPool>,
    event_sender: Arc<EventSender>,
    default_warehouse_id: Option<i64>,
}

impl PurchaseOrderService {
    pub fn new(
        db: Arc<DbPool>,
        event_sender: Arc<EventSender>,
        default_warehouse_id: Option<i64>,
    ) -> Self {
        Self {
            db,
            event_sender,
            default_warehouse_id,
        }
    }

    async fn emit(&self, event: Event) {
        if let Err(e) = self.event_sender.send(event).await {
            warn!(error = %e, "failed to send purchase order event");
        }
    }

    #[instrument(skip(self, request, actor), fields(supplier_id = request.supplier_id, actor_id = actor.user_id))]
    pub async fn create(
        &self,
        request: CreatePurchaseOrder,
        actor: &AuthContext,
    ) -> Result<purchase_order::Model, ServiceError> {
        validate_items(&request.items)?;
        let warehouse_id = request
            .warehouse_id
            .or(self.default_warehouse_id)
            .ok_or_else(|| {
                ServiceError::InvalidInput("no receiving warehouse configured".into())
            })?;

        let created = transact_with_retry(&self.db, move |txn| {
            let request = request.clone();
            Box::pin(async move {
                Supplier::find_by_id(request.supplier_id)
                    .one(txn)
                    .await?
                    .ok_or_else(|| {
                        ServiceError::NotFound(format!(
                            "supplier {} not found",
                            request.supplier_id
                        ))
                    })?;

                let now = Utc::now();
                let order = purchase_order::ActiveModel {
                    supplier_id: Set(request.supplier_id),
                    status: Set(PurchaseOrderStatus::Borrador.as_str().to_string()),
                    warehouse_id: Set(warehouse_id),
                    notes: Set(request.notes.clone()),
                    created_at: Set(now),
                    updated_at: Set(now),
                    ..Default::default()
                }
                .insert(txn)
                .await?;

                replace_items(txn, order.id, &request.items).await?;
                Ok(order)
            })
        })
        .await?;

        info!(purchase_order_id = created.id, "purchase order created");
        self.emit(Event::PurchaseOrderCreated(created.id)).await;
        Ok(created)
    }

    /// Edits a draft: items, supplier and notes are all still negotiable.
    #[instrument(skip(self, items, actor), fields(actor_id = actor.user_id))]
    pub async fn update_draft(
        &self,
        order_id: i64,
        items: Option<Vec<PurchaseItem>>,
        supplier_id: Option<i64>,
        notes: Option<String>,
        actor: &AuthContext,
    ) -> Result<purchase_order::Model, ServiceError> {
        if let Some(items) = &items {
            validate_items(items)?;
        }

        transact_with_retry(&self.db, move |txn| {
            let items = items.clone();
            let notes = notes.clone();
            Box::pin(async move {
                let (order, _) =
                    load_for_transition(txn, order_id, &[PurchaseOrderStatus::Borrador], "edit")
                        .await?;

                if let Some(supplier_id) = supplier_id {
                    Supplier::find_by_id(supplier_id)
                        .one(txn)
                        .await?
                        .ok_or_else(|| {
                            ServiceError::NotFound(format!("supplier {} not found", supplier_id))
                        })?;
                }
                if let Some(items) = &items {
                    replace_items(txn, order.id, items).await?;
                }

                let mut active: purchase_order::ActiveModel = order.into();
                active.status = Set(PurchaseOrderStatus::Borrador.as_str().to_string());
                if let Some(supplier_id) = supplier_id {
                    active.supplier_id = Set(supplier_id);
                }
                if let Some(notes) = notes {
                    active.notes = Set(Some(notes));
                }
                active.updated_at = Set(Utc::now());
                Ok(active.update(txn).await?)
            })
        })
        .await
    }

    #[instrument(skip(self, actor), fields(actor_id = actor.user_id))]
    pub async fn send(
        &self,
        order_id: i64,
        notes: Option<String>,
        actor: &AuthContext,
    ) -> Result<purchase_order::Model, ServiceError> {
        let sent = transact_with_retry(&self.db, move |txn| {
            let notes = notes.clone();
            Box::pin(async move {
                let (order, _) =
                    load_for_transition(txn, order_id, &[PurchaseOrderStatus::Borrador], "send")
                        .await?;

                let item_count = PurchaseOrderItem::find()
                    .filter(purchase_order_item::Column::PurchaseOrderId.eq(order.id))
                    .all(txn)
                    .await?
                    .len();
                if item_count == 0 {
                    return Err(ServiceError::InvalidInput(
                        "cannot send a purchase order without items".into(),
                    ));
                }

                let mut active: purchase_order::ActiveModel = order.into();
                active.status = Set(PurchaseOrderStatus::Enviado.as_str().to_string());
                active.sent_at = Set(Some(Utc::now()));
                if let Some(notes) = notes {
                    active.notes = Set(Some(notes));
                }
                active.updated_at = Set(Utc::now());
                Ok(active.update(txn).await?)
            })
        })
        .await?;

        info!(purchase_order_id = sent.id, "purchase order sent");
        self.emit(Event::PurchaseOrderSent(sent.id)).await;
        Ok(sent)
    }

    /// Supplier confirmation; the supplier may counter with revised items.
    #[instrument(skip(self, updated_items, actor), fields(actor_id = actor.user_id))]
    pub async fn confirm(
        &self,
        order_id: i64,
        updated_items: Option<Vec<PurchaseItem>>,
        notes: Option<String>,
        actor: &AuthContext,
    ) -> Result<purchase_order::Model, ServiceError> {
        if let Some(items) = &updated_items {
            validate_items(items)?;
        }

        let confirmed = transact_with_retry(&self.db, move |txn| {
            let updated_items = updated_items.clone();
            let notes = notes.clone();
            Box::pin(async move {
                let (order, _) =
                    load_for_transition(txn, order_id, &[PurchaseOrderStatus::Enviado], "confirm")
                        .await?;

                if let Some(items) = &updated_items {
                    replace_items(txn, order.id, items).await?;
                }

                let mut active: purchase_order::ActiveModel = order.into();
                active.status = Set(PurchaseOrderStatus::Confirmado.as_str().to_string());
                active.confirmed_at = Set(Some(Utc::now()));
                if let Some(notes) = notes {
                    active.notes = Set(Some(notes));
                }
                active.updated_at = Set(Utc::now());
                Ok(active.update(txn).await?)
            })
        })
        .await?;

        info!(purchase_order_id = confirmed.id, "purchase order confirmed");
        self.emit(Event::PurchaseOrderConfirmed(confirmed.id)).await;
        Ok(confirmed)
    }

    #[instrument(skip(self, actor), fields(actor_id = actor.user_id))]
    pub async fn reject(
        &self,
        order_id: i64,
        reason: String,
        actor: &AuthContext,
    ) -> Result<purchase_order::Model, ServiceError> {
        let rejected = transact_with_retry(&self.db, move |txn| {
            let reason = reason.clone();
            Box::pin(async move {
                let (order, _) =
                    load_for_transition(txn, order_id, &[PurchaseOrderStatus::Enviado], "reject")
                        .await?;

                let mut active: purchase_order::ActiveModel = order.into();
                active.status = Set(PurchaseOrderStatus::Rechazado.as_str().to_string());
                active.rejection_reason = Set(Some(reason));
                active.updated_at = Set(Utc::now());
                Ok(active.update(txn).await?)
            })
        })
        .await?;

        info!(purchase_order_id = rejected.id, "purchase order rejected");
        self.emit(Event::PurchaseOrderRejected(rejected.id)).await;
        Ok(rejected)
    }

    /// Books the goods that actually arrived. Item lines are replaced with
    /// the received quantities and the warehouse is credited in the same
    /// transaction; a stock failure leaves the order untouched.
    #[instrument(skip(self, received_items, actor), fields(actor_id = actor.user_id))]
    pub async fn receive(
        &self,
        order_id: i64,
        received_items: Vec<ReceivedItem>,
        notes: Option<String>,
        actor: &AuthContext,
    ) -> Result<purchase_order::Model, ServiceError> {
        if received_items.is_empty() {
            return Err(ServiceError::InvalidInput("nothing received".into()));
        }
        for item in &received_items {
            if item.quantity < Decimal::ZERO {
                return Err(ServiceError::InvalidInput(format!(
                    "received quantity for variant {} must not be negative",
                    item.variant_id
                )));
            }
            if item.unit_price.is_some_and(|p| p < Decimal::ZERO) {
                return Err(ServiceError::InvalidInput(format!(
                    "unit price for variant {} must not be negative",
                    item.variant_id
                )));
            }
        }

        let actor_id = actor.user_id;
        let (received, warehouse_id) = transact_with_retry(&self.db, move |txn| {
            let received_items = received_items.clone();
            let notes = notes.clone();
            Box::pin(async move {
                let (order, _) = load_for_transition(
                    txn,
                    order_id,
                    &[PurchaseOrderStatus::Confirmado, PurchaseOrderStatus::Enviado],
                    "receive",
                )
                .await?;
                let warehouse_id = order.warehouse_id;

                let as_items: Vec<PurchaseItem> = received_items
                    .iter()
                    .map(|r| PurchaseItem {
                        variant_id: r.variant_id,
                        quantity: r.quantity,
                        unit_price: r.unit_price,
                    })
                    .collect();
                replace_items(txn, order.id, &as_items).await?;

                let credited: Vec<(i64, Decimal, Option<Decimal>)> = received_items
                    .iter()
                    .filter(|r| r.quantity > Decimal::ZERO)
                    .map(|r| (r.variant_id, r.quantity, r.unit_price))
                    .collect();
                if !credited.is_empty() {
                    inventory::produce(
                        txn,
                        warehouse_id,
                        &credited,
                        actor_id,
                        &format!("purchase order {} receipt", order.id),
                        Uuid::new_v4(),
                    )
                    .await?;
                }

                let mut active: purchase_order::ActiveModel = order.into();
                active.status = Set(PurchaseOrderStatus::Recibido.as_str().to_string());
                active.received_at = Set(Some(Utc::now()));
                if let Some(notes) = notes {
                    active.notes = Set(Some(notes));
                }
                active.updated_at = Set(Utc::now());
                Ok((active.update(txn).await?, warehouse_id))
            })
        })
        .await?;

        info!(purchase_order_id = received.id, warehouse_id, "purchase order received");
        self.emit(Event::PurchaseOrderReceived {
            purchase_order_id: received.id,
            warehouse_id,
        })
        .await;
        Ok(received)
    }

    #[instrument(skip(self, actor), fields(actor_id = actor.user_id))]
    pub async fn invoice(
        &self,
        order_id: i64,
        supplier_invoice_number: String,
        notes: Option<String>,
        actor: &AuthContext,
    ) -> Result<purchase_order::Model, ServiceError> {
        if supplier_invoice_number.trim().is_empty() {
            return Err(ServiceError::InvalidInput(
                "supplier invoice number is required".into(),
            ));
        }

        let invoiced = transact_with_retry(&self.db, move |txn| {
            let supplier_invoice_number = supplier_invoice_number.clone();
            let notes = notes.clone();
            Box::pin(async move {
                let (order, _) =
                    load_for_transition(txn, order_id, &[PurchaseOrderStatus::Recibido], "invoice")
                        .await?;

                let mut active: purchase_order::ActiveModel = order.into();
                active.status = Set(PurchaseOrderStatus::Facturado.as_str().to_string());
                active.supplier_invoice_number = Set(Some(supplier_invoice_number));
                active.invoiced_at = Set(Some(Utc::now()));
                if let Some(notes) = notes {
                    active.notes = Set(Some(notes));
                }
                active.updated_at = Set(Utc::now());
                Ok(active.update(txn).await?)
            })
        })
        .await?;

        info!(purchase_order_id = invoiced.id, "purchase order invoiced");
        self.emit(Event::PurchaseOrderInvoiced(invoiced.id)).await;
        Ok(invoiced)
    }

    #[instrument(skip(self, actor), fields(actor_id = actor.user_id))]
    pub async fn close(
        &self,
        order_id: i64,
        notes: Option<String>,
        actor: &AuthContext,
    ) -> Result<purchase_order::Model, ServiceError> {
        let closed = transact_with_retry(&self.db, move |txn| {
            let notes = notes.clone();
            Box::pin(async move {
                let (order, _) =
                    load_for_transition(txn, order_id, &[PurchaseOrderStatus::Facturado], "close")
                        .await?;

                let mut active: purchase_order::ActiveModel = order.into();
                active.status = Set(PurchaseOrderStatus::Cerrado.as_str().to_string());
                active.closed_at = Set(Some(Utc::now()));
                if let Some(notes) = notes {
                    active.notes = Set(Some(notes));
                }
                active.updated_at = Set(Utc::now());
                Ok(active.update(txn).await?)
            })
        })
        .await?;

        info!(purchase_order_id = closed.id, "purchase order closed");
        self.emit(Event::PurchaseOrderClosed(closed.id)).await;
        Ok(closed)
    }

    /// Reads the order with its items, reporting the normalized state even
    /// for rows the legacy system wrote lowercase.
    pub async fn get(&self, order_id: i64) -> Result<PurchaseOrderWithItems, ServiceError> {
        let db = &*self.db;
        let mut order = PurchaseOrder::find_by_id(order_id)
            .one(db)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("purchase order {} not found", order_id))
            })?;
        order.status = PurchaseOrderStatus::from_db(&order.status)?.as_str().to_string();

        let items = PurchaseOrderItem::find()
            .filter(purchase_order_item::Column::PurchaseOrderId.eq(order_id))
            .all(db)
            .await?;
        Ok(PurchaseOrderWithItems { order, items })
    }
}
