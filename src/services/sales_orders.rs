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
    customer::Entity as Customer,
    invoice::{self, Entity as Invoice, InvoiceStatus},
    payment::{self, Entity as Payment, PaymentStatus},
    product_variant::Entity as ProductVariant,
    sales_order::{self, Entity as SalesOrder, SalesOrderStatus, SalesPaymentMethod},
    sales_order_item::{self, Entity as SalesOrderItem},
    warehouse::{self, Entity as Warehouse},
};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::services::inventory;
use crate::services::invoicing::{self, InvoiceLine, IssueInvoice, RecordPayment};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SalesItem {
    pub variant_id: i64,
    pub quantity: Decimal,
    /// Falls back to the variant's list price.
    pub unit_price: Option<Decimal>,
    pub discount: Option<Decimal>,
}

/// How the caller names the customer: an existing row, or an email that is
/// resolved case-insensitively and created on first sight.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum CustomerResolution {
    ById(i64),
    ByEmail {
        email: String,
        name: String,
        user_id: Option<i64>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateSalesOrder {
    pub customer: CustomerResolution,
    pub items: Vec<SalesItem>,
    pub payment_method: SalesPaymentMethod,
    pub delivery_address: Option<String>,
    pub pickup_branch: Option<String>,
    /// Fulfillment warehouse; PICKUP orders resolve their branch's warehouse,
    /// everything else falls back to the configured default.
    pub warehouse_id: Option<i64>,
    pub notes: Option<String>,
}

/// Money handed over on a deferred-capture edge (COD deliver, PICKUP pickup)
/// or on an up-front pay.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentCapture {
    pub amount: Decimal,
    pub method: String,
    pub receipt: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SalesOrderWithItems {
    pub order: sales_order::Model,
    pub items: Vec<sales_order_item::Model>,
}

/// Legal edges of the sales state machine, cancellation aside.
fn is_valid_transition(from: SalesOrderStatus, to: SalesOrderStatus) -> bool {
    use SalesOrderStatus::*;
    matches!(
        (from, to),
        (Pending, Paid)
            | (Paid, Preparing)
            | (Paid, Shipped)
            | (Preparing, Shipped)
            | (Paid, ReadyPickup)
            | (Preparing, ReadyPickup)
            | (Shipped, Delivered)
            | (ReadyPickup, PickedUp)
    )
}

/// Pre-tax order total the deferred capture is checked against.
fn order_subtotal(items: &[sales_order_item::Model]) -> Decimal {
    invoicing::round_money(
        items
            .iter()
            .map(|i| i.quantity * i.unit_price - i.discount)
            .sum(),
    )
}

fn invoice_lines(
    items: &[sales_order_item::Model],
    descriptions: &[String],
) -> Vec<InvoiceLine> {
    items
        .iter()
        .zip(descriptions)
        .map(|(item, description)| InvoiceLine {
            variant_id: Some(item.variant_id),
            description: description.clone(),
            quantity: item.quantity,
            unit_price: item.unit_price,
            discount: item.discount,
        })
        .collect()
}

async fn load_for_transition<C: ConnectionTrait>(
    conn: &C,
    order_id: i64,
    edge: &str,
    allowed: &[SalesOrderStatus],
) -> Result<(sales_order::Model, SalesOrderStatus), ServiceError> {
    let order = SalesOrder::find_by_id(order_id)
        .lock_exclusive()
        .one(conn)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("sales order {} not found", order_id)))?;

    let status = SalesOrderStatus::from_db(&order.status)?;
    if !allowed.contains(&status) {
        return Err(ServiceError::InvalidState(format!(
            "cannot {} sales order {} from state {}",
            edge, order_id, status
        )));
    }
    Ok((order, status))
}

async fn load_items<C: ConnectionTrait>(
    conn: &C,
    order_id: i64,
) -> Result<Vec<sales_order_item::Model>, ServiceError> {
    Ok(SalesOrderItem::find()
        .filter(sales_order_item::Column::SalesOrderId.eq(order_id))
        .all(conn)
        .await?)
}

async fn variant_descriptions<C: ConnectionTrait>(
    conn: &C,
    items: &[sales_order_item::Model],
) -> Result<Vec<String>, ServiceError> {
    let mut descriptions = Vec::with_capacity(items.len());
    for item in items {
        let name = ProductVariant::find_by_id(item.variant_id)
            .one(conn)
            .await?
            .map(|v| v.name)
            .unwrap_or_else(|| format!("variant {}", item.variant_id));
        descriptions.push(name);
    }
    Ok(descriptions)
}

/// Most recent ISSUED invoice for the order, if any.
async fn order_invoice<C: ConnectionTrait>(
    conn: &C,
    order_id: i64,
) -> Result<Option<invoice::Model>, ServiceError> {
    Ok(Invoice::find()
        .filter(invoice::Column::SalesOrderId.eq(order_id))
        .filter(invoice::Column::Status.eq(InvoiceStatus::Issued.to_string()))
        .one(conn)
        .await?)
}

async fn has_confirmed_payment<C: ConnectionTrait>(
    conn: &C,
    order_id: i64,
) -> Result<bool, ServiceError> {
    Ok(Payment::find()
        .filter(payment::Column::SalesOrderId.eq(order_id))
        .filter(payment::Column::Status.eq(PaymentStatus::Confirmed.to_string()))
        .one(conn)
        .await?
        .is_some())
}

/// Issues the order's invoice (unless one exists) and records the captured
/// payment against it, all inside the caller's transaction.
async fn post_capture<C: ConnectionTrait>(
    conn: &C,
    order: &sales_order::Model,
    items: &[sales_order_item::Model],
    capture: &PaymentCapture,
    tax_rate: Decimal,
    actor_id: i64,
) -> Result<invoice::Model, ServiceError> {
    if capture.amount <= Decimal::ZERO {
        return Err(ServiceError::InvalidInput(
            "payment amount must be positive".into(),
        ));
    }
    let total = order_subtotal(items);
    if capture.amount < total {
        return Err(ServiceError::InvalidInput(format!(
            "payment {} is below the order total {}",
            capture.amount, total
        )));
    }

    let inv = match order_invoice(conn, order.id).await? {
        Some(existing) => existing,
        None => {
            let descriptions = variant_descriptions(conn, items).await?;
            invoicing::issue_invoice_in_txn(
                conn,
                &IssueInvoice {
                    customer_id: order.customer_id,
                    sales_order_id: Some(order.id),
                    items: invoice_lines(items, &descriptions),
                    tax_id: None,
                    legal_name: None,
                    due_at: None,
                },
                tax_rate,
            )
            .await?
        }
    };

    // Overpayment stays on this single row; it is never split.
    invoicing::record_payment_in_txn(
        conn,
        &RecordPayment {
            customer_id: order.customer_id,
            invoice_id: Some(inv.id),
            sales_order_id: Some(order.id),
            amount: capture.amount,
            method: capture.method.clone(),
            receipt: capture.receipt.clone(),
            paid_at: None,
            status: Some(PaymentStatus::Confirmed),
        },
        actor_id,
    )
    .await?;

    Ok(inv)
}

/// The selling state machine, from checkout to hand-off:
/// PENDING → PAID → PREPARING → SHIPPED → DELIVERED on the courier path,
/// PENDING → PAID → PREPARING → READY_PICKUP → PICKED_UP over the counter,
/// with COD and PICKUP capturing invoice + payment on the final edge.
#[derive(Clone)]
pub struct SalesOrderService {
    db: Arc<DbPool>,
    event_sender: Arc<EventSender>,
    tax_rate: Decimal,
    default_warehouse_id: Option<i64>,
}

impl SalesOrderService {
    pub fn new(
        db: Arc<DbPool>,
        event_sender: Arc<EventSender>,
        tax_rate: Decimal,
        default_warehouse_id: Option<i64>,
    ) -> Self {
        Self {
            db,
            event_sender,
            tax_rate,
            default_warehouse_id,
        }
    }

    async fn emit(&self, event: Event) {
        if let Err(e) = self.event_sender.send(event).await {
            warn!(error = %e, "failed to send sales order event");
        }
    }

    /// Creates the order in PENDING. Stock is not touched here; it commits at
    /// ship / ready-for-pickup. CREDIT orders get their invoice immediately.
    #[instrument(skip(self, request, actor), fields(actor_id = actor.user_id))]
    pub async fn create(
        &self,
        request: CreateSalesOrder,
        actor: &AuthContext,
    ) -> Result<SalesOrderWithItems, ServiceError> {
        if request.items.is_empty() {
            return Err(ServiceError::InvalidInput("order has no items".into()));
        }
        for item in &request.items {
            if item.quantity <= Decimal::ZERO {
                return Err(ServiceError::InvalidInput(format!(
                    "quantity for variant {} must be positive",
                    item.variant_id
                )));
            }
            if item.discount.is_some_and(|d| d < Decimal::ZERO)
                || item.unit_price.is_some_and(|p| p < Decimal::ZERO)
            {
                return Err(ServiceError::InvalidInput(format!(
                    "negative amounts on variant {}",
                    item.variant_id
                )));
            }
        }
        if request.payment_method == SalesPaymentMethod::Pickup
            && request.pickup_branch.is_none()
        {
            return Err(ServiceError::InvalidInput(
                "pickup orders need a pickup branch".into(),
            ));
        }

        let tax_rate = self.tax_rate;
        let default_warehouse_id = self.default_warehouse_id;
        let created = transact_with_retry(&self.db, move |txn| {
            let request = request.clone();
            Box::pin(async move {
                create_in_txn(txn, &request, tax_rate, default_warehouse_id).await
            })
        })
        .await?;

        info!(sales_order_id = created.order.id, "sales order created");
        self.emit(Event::SalesOrderCreated(created.order.id)).await;
        Ok(created)
    }

    /// Generic administrative transition. Only side-effect-free edges are
    /// reachable here; stock- or money-moving edges go through their
    /// dedicated operations.
    #[instrument(skip(self, actor), fields(actor_id = actor.user_id))]
    pub async fn update_status(
        &self,
        order_id: i64,
        new_status: SalesOrderStatus,
        actor: &AuthContext,
    ) -> Result<sales_order::Model, ServiceError> {
        let updated = transact_with_retry(&self.db, move |txn| {
            Box::pin(async move {
                let order = SalesOrder::find_by_id(order_id)
                    .lock_exclusive()
                    .one(txn)
                    .await?
                    .ok_or_else(|| {
                        ServiceError::NotFound(format!("sales order {} not found", order_id))
                    })?;
                let current = SalesOrderStatus::from_db(&order.status)?;

                if !is_valid_transition(current, new_status) {
                    return Err(ServiceError::InvalidState(format!(
                        "cannot move sales order {} from {} to {}",
                        order_id, current, new_status
                    )));
                }
                let side_effect_free = matches!(
                    new_status,
                    SalesOrderStatus::Paid | SalesOrderStatus::Preparing
                );
                if !side_effect_free {
                    return Err(ServiceError::InvalidState(format!(
                        "transition to {} moves stock or money; use its dedicated operation",
                        new_status
                    )));
                }

                let now = Utc::now();
                let old_status = order.status.clone();
                let mut active: sales_order::ActiveModel = order.into();
                active.status = Set(new_status.to_string());
                match new_status {
                    SalesOrderStatus::Paid => active.paid_at = Set(Some(now)),
                    SalesOrderStatus::Preparing => active.prepared_at = Set(Some(now)),
                    _ => unreachable!("side-effect-free set is closed"),
                }
                active.updated_at = Set(now);
                let updated = active.update(txn).await?;
                Ok((updated, old_status))
            })
        })
        .await?;

        let (order, old_status) = updated;
        self.emit(Event::SalesOrderStatusChanged {
            sales_order_id: order.id,
            old_status,
            new_status: order.status.clone(),
        })
        .await;
        Ok(order)
    }

    /// PENDING → PAID. A capture, when supplied, posts invoice + payment
    /// atomically with the transition (the PREPAID storefront flow).
    #[instrument(skip(self, capture, actor), fields(actor_id = actor.user_id))]
    pub async fn pay(
        &self,
        order_id: i64,
        capture: Option<PaymentCapture>,
        actor: &AuthContext,
    ) -> Result<sales_order::Model, ServiceError> {
        let tax_rate = self.tax_rate;
        let actor_id = actor.user_id;
        let paid = transact_with_retry(&self.db, move |txn| {
            let capture = capture.clone();
            Box::pin(async move {
                let (order, _) =
                    load_for_transition(txn, order_id, "pay", &[SalesOrderStatus::Pending])
                        .await?;

                if let Some(capture) = &capture {
                    let items = load_items(txn, order.id).await?;
                    post_capture(txn, &order, &items, capture, tax_rate, actor_id).await?;
                }

                let now = Utc::now();
                let mut active: sales_order::ActiveModel = order.into();
                active.status = Set(SalesOrderStatus::Paid.to_string());
                active.paid_at = Set(Some(now));
                active.updated_at = Set(now);
                Ok(active.update(txn).await?)
            })
        })
        .await?;

        info!(sales_order_id = paid.id, "sales order paid");
        self.emit(Event::SalesOrderStatusChanged {
            sales_order_id: paid.id,
            old_status: SalesOrderStatus::Pending.to_string(),
            new_status: paid.status.clone(),
        })
        .await;
        Ok(paid)
    }

    /// PAID/PREPARING → SHIPPED. Consumes stock from the order's warehouse;
    /// any shortfall aborts the whole edge.
    #[instrument(skip(self, actor), fields(actor_id = actor.user_id))]
    pub async fn ship(
        &self,
        order_id: i64,
        courier_user_id: Option<i64>,
        address: Option<String>,
        actor: &AuthContext,
    ) -> Result<sales_order::Model, ServiceError> {
        let actor_id = actor.user_id;
        let shipped = transact_with_retry(&self.db, move |txn| {
            let address = address.clone();
            Box::pin(async move {
                let (order, _) = load_for_transition(
                    txn,
                    order_id,
                    "ship",
                    &[SalesOrderStatus::Paid, SalesOrderStatus::Preparing],
                )
                .await?;

                let method = SalesPaymentMethod::from_db(&order.payment_method)?;
                if method == SalesPaymentMethod::Pickup {
                    return Err(ServiceError::InvalidState(
                        "pickup orders are handed over at the branch, not shipped".into(),
                    ));
                }
                let effective_address = address.clone().or_else(|| order.delivery_address.clone());
                if matches!(method, SalesPaymentMethod::Prepaid | SalesPaymentMethod::Cod)
                    && effective_address.is_none()
                {
                    return Err(ServiceError::InvalidInput(
                        "shipping needs a delivery address".into(),
                    ));
                }

                let items = load_items(txn, order.id).await?;
                let lines: Vec<(i64, Decimal)> =
                    items.iter().map(|i| (i.variant_id, i.quantity)).collect();
                inventory::consume(
                    txn,
                    order.warehouse_id,
                    &lines,
                    actor_id,
                    &format!("sales order {} shipment", order.id),
                    Uuid::new_v4(),
                )
                .await?;

                let now = Utc::now();
                let mut active: sales_order::ActiveModel = order.into();
                active.status = Set(SalesOrderStatus::Shipped.to_string());
                active.shipped_at = Set(Some(now));
                active.courier_user_id = Set(courier_user_id);
                if let Some(addr) = effective_address {
                    active.delivery_address = Set(Some(addr));
                }
                active.updated_at = Set(now);
                Ok(active.update(txn).await?)
            })
        })
        .await?;

        info!(sales_order_id = shipped.id, "sales order shipped");
        self.emit(Event::SalesOrderShipped(shipped.id)).await;
        Ok(shipped)
    }

    /// SHIPPED → DELIVERED. COD orders must hand over the money here; the
    /// invoice and payment post in the same transaction as the transition.
    #[instrument(skip(self, cod_payment, actor), fields(actor_id = actor.user_id))]
    pub async fn deliver(
        &self,
        order_id: i64,
        recipient_name: String,
        notes: Option<String>,
        cod_payment: Option<PaymentCapture>,
        actor: &AuthContext,
    ) -> Result<sales_order::Model, ServiceError> {
        if recipient_name.trim().is_empty() {
            return Err(ServiceError::InvalidInput("recipient name is required".into()));
        }

        let tax_rate = self.tax_rate;
        let actor_id = actor.user_id;
        let delivered = transact_with_retry(&self.db, move |txn| {
            let recipient_name = recipient_name.clone();
            let notes = notes.clone();
            let cod_payment = cod_payment.clone();
            Box::pin(async move {
                let (order, _) =
                    load_for_transition(txn, order_id, "deliver", &[SalesOrderStatus::Shipped])
                        .await?;

                let method = SalesPaymentMethod::from_db(&order.payment_method)?;
                if method == SalesPaymentMethod::Cod {
                    let capture = cod_payment.as_ref().ok_or_else(|| {
                        ServiceError::InvalidInput(
                            "cash-on-delivery needs the payment at the door".into(),
                        )
                    })?;
                    let items = load_items(txn, order.id).await?;
                    post_capture(txn, &order, &items, capture, tax_rate, actor_id).await?;
                } else if cod_payment.is_some() {
                    return Err(ServiceError::InvalidInput(format!(
                        "order is {}, not cash-on-delivery",
                        method
                    )));
                }

                let now = Utc::now();
                let mut active: sales_order::ActiveModel = order.into();
                active.status = Set(SalesOrderStatus::Delivered.to_string());
                active.delivered_at = Set(Some(now));
                active.recipient_name = Set(Some(recipient_name));
                if let Some(notes) = notes {
                    active.notes = Set(Some(notes));
                }
                active.updated_at = Set(now);
                Ok(active.update(txn).await?)
            })
        })
        .await?;

        info!(sales_order_id = delivered.id, "sales order delivered");
        self.emit(Event::SalesOrderDelivered(delivered.id)).await;
        Ok(delivered)
    }

    /// PAID/PREPARING → READY_PICKUP. Goods are set aside, so stock commits
    /// now.
    #[instrument(skip(self, actor), fields(actor_id = actor.user_id))]
    pub async fn ready_for_pickup(
        &self,
        order_id: i64,
        actor: &AuthContext,
    ) -> Result<sales_order::Model, ServiceError> {
        let actor_id = actor.user_id;
        let (ready, old_status) = transact_with_retry(&self.db, move |txn| {
            Box::pin(async move {
                let (order, old_status) = load_for_transition(
                    txn,
                    order_id,
                    "ready",
                    &[SalesOrderStatus::Paid, SalesOrderStatus::Preparing],
                )
                .await?;

                let method = SalesPaymentMethod::from_db(&order.payment_method)?;
                if method == SalesPaymentMethod::Cod {
                    return Err(ServiceError::InvalidState(
                        "cash-on-delivery orders ship with a courier".into(),
                    ));
                }

                let items = load_items(txn, order.id).await?;
                let lines: Vec<(i64, Decimal)> =
                    items.iter().map(|i| (i.variant_id, i.quantity)).collect();
                inventory::consume(
                    txn,
                    order.warehouse_id,
                    &lines,
                    actor_id,
                    &format!("sales order {} set aside for pickup", order.id),
                    Uuid::new_v4(),
                )
                .await?;

                let now = Utc::now();
                let mut active: sales_order::ActiveModel = order.into();
                active.status = Set(SalesOrderStatus::ReadyPickup.to_string());
                active.ready_at = Set(Some(now));
                active.updated_at = Set(now);
                Ok((active.update(txn).await?, old_status))
            })
        })
        .await?;

        info!(sales_order_id = ready.id, "sales order ready for pickup");
        self.emit(Event::SalesOrderStatusChanged {
            sales_order_id: ready.id,
            old_status: old_status.to_string(),
            new_status: ready.status.clone(),
        })
        .await;
        Ok(ready)
    }

    /// READY_PICKUP → PICKED_UP. A PICKUP order that was never paid captures
    /// its payment here, invoice included.
    #[instrument(skip(self, pickup_payment, actor), fields(actor_id = actor.user_id))]
    pub async fn pickup(
        &self,
        order_id: i64,
        recipient_name: String,
        notes: Option<String>,
        pickup_payment: Option<PaymentCapture>,
        actor: &AuthContext,
    ) -> Result<sales_order::Model, ServiceError> {
        if recipient_name.trim().is_empty() {
            return Err(ServiceError::InvalidInput("recipient name is required".into()));
        }

        let tax_rate = self.tax_rate;
        let actor_id = actor.user_id;
        let picked_up = transact_with_retry(&self.db, move |txn| {
            let recipient_name = recipient_name.clone();
            let notes = notes.clone();
            let pickup_payment = pickup_payment.clone();
            Box::pin(async move {
                let (order, _) = load_for_transition(
                    txn,
                    order_id,
                    "pickup",
                    &[SalesOrderStatus::ReadyPickup],
                )
                .await?;

                let method = SalesPaymentMethod::from_db(&order.payment_method)?;
                if method == SalesPaymentMethod::Pickup
                    && !has_confirmed_payment(txn, order.id).await?
                {
                    let capture = pickup_payment.as_ref().ok_or_else(|| {
                        ServiceError::InvalidInput(
                            "unpaid pickup orders collect the payment at the counter".into(),
                        )
                    })?;
                    let items = load_items(txn, order.id).await?;
                    post_capture(txn, &order, &items, capture, tax_rate, actor_id).await?;
                }

                let now = Utc::now();
                let mut active: sales_order::ActiveModel = order.into();
                active.status = Set(SalesOrderStatus::PickedUp.to_string());
                active.picked_up_at = Set(Some(now));
                active.recipient_name = Set(Some(recipient_name));
                if let Some(notes) = notes {
                    active.notes = Set(Some(notes));
                }
                active.updated_at = Set(now);
                Ok(active.update(txn).await?)
            })
        })
        .await?;

        info!(sales_order_id = picked_up.id, "sales order picked up");
        self.emit(Event::SalesOrderPickedUp(picked_up.id)).await;
        Ok(picked_up)
    }

    /// Cancels from any non-terminal state; consumed stock is produced back.
    /// On a terminal order this is a no-op returning the order as-is.
    #[instrument(skip(self, actor), fields(actor_id = actor.user_id))]
    pub async fn cancel(
        &self,
        order_id: i64,
        reason: Option<String>,
        actor: &AuthContext,
    ) -> Result<sales_order::Model, ServiceError> {
        let actor_id = actor.user_id;
        let (order, was_cancelled) = transact_with_retry(&self.db, move |txn| {
            let reason = reason.clone();
            Box::pin(async move {
                let order = SalesOrder::find_by_id(order_id)
                    .lock_exclusive()
                    .one(txn)
                    .await?
                    .ok_or_else(|| {
                        ServiceError::NotFound(format!("sales order {} not found", order_id))
                    })?;
                let status = SalesOrderStatus::from_db(&order.status)?;

                if status.is_terminal() {
                    return Ok((order, false));
                }

                if status.stock_committed() {
                    let items = load_items(txn, order.id).await?;
                    let lines: Vec<(i64, Decimal, Option<Decimal>)> = items
                        .iter()
                        .map(|i| (i.variant_id, i.quantity, None))
                        .collect();
                    inventory::produce(
                        txn,
                        order.warehouse_id,
                        &lines,
                        actor_id,
                        &format!("sales order {} cancellation", order.id),
                        Uuid::new_v4(),
                    )
                    .await?;
                }

                let now = Utc::now();
                let mut active: sales_order::ActiveModel = order.into();
                active.status = Set(SalesOrderStatus::Cancelled.to_string());
                active.cancellation_reason = Set(reason);
                active.cancelled_at = Set(Some(now));
                active.updated_at = Set(now);
                Ok((active.update(txn).await?, true))
            })
        })
        .await?;

        if was_cancelled {
            info!(sales_order_id = order.id, "sales order cancelled");
            self.emit(Event::SalesOrderCancelled(order.id)).await;
        }
        Ok(order)
    }

    pub async fn get(&self, order_id: i64) -> Result<SalesOrderWithItems, ServiceError> {
        let db = &*self.db;
        let order = SalesOrder::find_by_id(order_id)
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("sales order {} not found", order_id)))?;
        let items = load_items(db, order_id).await?;
        Ok(SalesOrderWithItems { order, items })
    }
}

/// Creates the order row, its items and (for CREDIT) the invoice inside the
/// caller's transaction. Shared by checkout and by reservation completion.
pub(crate) async fn create_in_txn<C: ConnectionTrait>(
    conn: &C,
    request: &CreateSalesOrder,
    tax_rate: Decimal,
    default_warehouse_id: Option<i64>,
) -> Result<SalesOrderWithItems, ServiceError> {
    let customer = match &request.customer {
        CustomerResolution::ById(id) => Customer::find_by_id(*id)
            .one(conn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("customer {} not found", id)))?,
        CustomerResolution::ByEmail {
            email,
            name,
            user_id,
        } => super::customers::find_or_create_by_email(conn, email, name, *user_id).await?,
    };

    let warehouse_id = resolve_warehouse(
        conn,
        request.pickup_branch.as_deref(),
        request.warehouse_id,
        default_warehouse_id,
    )
    .await?;

    let now = Utc::now();
    let order = sales_order::ActiveModel {
        customer_id: Set(customer.id),
        status: Set(SalesOrderStatus::Pending.to_string()),
        payment_method: Set(request.payment_method.to_string()),
        warehouse_id: Set(warehouse_id),
        delivery_address: Set(request.delivery_address.clone()),
        pickup_branch: Set(request.pickup_branch.clone()),
        notes: Set(request.notes.clone()),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    }
    .insert(conn)
    .await?;

    let mut items = Vec::with_capacity(request.items.len());
    for item in &request.items {
        let variant = ProductVariant::find_by_id(item.variant_id)
            .one(conn)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("variant {} not found", item.variant_id))
            })?;
        let unit_price = item.unit_price.or(variant.unit_price).ok_or_else(|| {
            ServiceError::InvalidInput(format!("variant {} has no price", item.variant_id))
        })?;
        let row = sales_order_item::ActiveModel {
            sales_order_id: Set(order.id),
            variant_id: Set(item.variant_id),
            quantity: Set(item.quantity),
            unit_price: Set(unit_price),
            discount: Set(item.discount.unwrap_or(Decimal::ZERO)),
            ..Default::default()
        }
        .insert(conn)
        .await?;
        items.push(row);
    }

    // Credit sales carry their invoice from day one; payments accumulate
    // against it over time.
    if request.payment_method == SalesPaymentMethod::Credit {
        let descriptions = variant_descriptions(conn, &items).await?;
        invoicing::issue_invoice_in_txn(
            conn,
            &IssueInvoice {
                customer_id: customer.id,
                sales_order_id: Some(order.id),
                items: invoice_lines(&items, &descriptions),
                tax_id: None,
                legal_name: None,
                due_at: None,
            },
            tax_rate,
        )
        .await?;
    }

    Ok(SalesOrderWithItems { order, items })
}

/// Picks the fulfillment warehouse: the pickup branch's warehouse when one is
/// named, then the explicit override, then the configured default.
async fn resolve_warehouse<C: ConnectionTrait>(
    conn: &C,
    pickup_branch: Option<&str>,
    explicit: Option<i64>,
    default: Option<i64>,
) -> Result<i64, ServiceError> {
    if let Some(branch) = pickup_branch {
        if let Some(wh) = Warehouse::find()
            .filter(warehouse::Column::Branch.eq(branch))
            .one(conn)
            .await?
        {
            return Ok(wh.id);
        }
        return Err(ServiceError::NotFound(format!(
            "no warehouse serves branch '{}'",
            branch
        )));
    }
    if let Some(id) = explicit {
        Warehouse::find_by_id(id)
            .one(conn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("warehouse {} not found", id)))?;
        return Ok(id);
    }
    default.ok_or_else(|| ServiceError::InvalidInput("no fulfillment warehouse configured".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn transition_table_matches_the_machine() {
        use SalesOrderStatus::*;
        assert!(is_valid_transition(Pending, Paid));
        assert!(is_valid_transition(Paid, Preparing));
        assert!(is_valid_transition(Paid, Shipped));
        assert!(is_valid_transition(Preparing, ReadyPickup));
        assert!(is_valid_transition(Shipped, Delivered));
        assert!(is_valid_transition(ReadyPickup, PickedUp));

        assert!(!is_valid_transition(Pending, Shipped));
        assert!(!is_valid_transition(Shipped, ReadyPickup));
        assert!(!is_valid_transition(Delivered, Paid));
        assert!(!is_valid_transition(ReadyPickup, Delivered));
    }

    #[test]
    fn order_subtotal_nets_line_discounts() {
        let items = vec![
            sales_order_item::Model {
                id: 1,
                sales_order_id: 1,
                variant_id: 1,
                quantity: dec!(2),
                unit_price: dec!(10.00),
                discount: dec!(0),
            },
            sales_order_item::Model {
                id: 2,
                sales_order_id: 1,
                variant_id: 2,
                quantity: dec!(1),
                unit_price: dec!(5.00),
                discount: dec!(1.00),
            },
        ];
        assert_eq!(order_subtotal(&items), dec!(24.00));
    }
}
