use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QuerySelect, Set,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::auth::AuthContext;
use crate::db::{transact_with_retry, DbPool};
use crate::entities::{
    customer::Entity as Customer,
    reservation::{self, Entity as Reservation, ReservationStatus},
    reservation_item::{self, Entity as ReservationItem},
    sales_order::SalesPaymentMethod,
};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::services::inventory;
use crate::services::sales_orders::{
    self, CreateSalesOrder, CustomerResolution, SalesItem, SalesOrderWithItems,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReserveItem {
    pub variant_id: i64,
    pub quantity: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateReservation {
    pub customer_id: i64,
    pub items: Vec<ReserveItem>,
    pub reserve_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReservationWithItems {
    pub reservation: reservation::Model,
    pub items: Vec<reservation_item::Model>,
}

async fn load_for_transition<C: ConnectionTrait>(
    conn: &C,
    reservation_id: i64,
    edge: &str,
    allowed: &[ReservationStatus],
) -> Result<(reservation::Model, ReservationStatus), ServiceError> {
    let res = Reservation::find_by_id(reservation_id)
        .lock_exclusive()
        .one(conn)
        .await?
        .ok_or_else(|| {
            ServiceError::NotFound(format!("reservation {} not found", reservation_id))
        })?;

    let status = ReservationStatus::from_db(&res.status)?;
    if !allowed.contains(&status) {
        return Err(ServiceError::InvalidState(format!(
            "cannot {} reservation {} from state {}",
            edge, reservation_id, status
        )));
    }
    Ok((res, status))
}

async fn load_items<C: ConnectionTrait>(
    conn: &C,
    reservation_id: i64,
) -> Result<Vec<reservation_item::Model>, ServiceError> {
    Ok(ReservationItem::find()
        .filter(reservation_item::Column::ReservationId.eq(reservation_id))
        .all(conn)
        .await?)
}

/// Holds goods for a customer ahead of a sale:
/// PENDING → DEPOSITED → CONFIRMED → COMPLETED, cancellable until completed.
/// An open reservation pins its quantities against availability.
#[derive(Clone)]
pub struct ReservationService {
    db: Arc<DbPool>,
    event_sender: Arc<EventSender>,
    tax_rate: Decimal,
    default_warehouse_id: Option<i64>,
}

impl ReservationService {
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
            warn!(error = %e, "failed to send reservation event");
        }
    }

    /// Creates the reservation after checking availability for every line
    /// under locked stock rows, so a concurrent checkout cannot claim the
    /// same units.
    #[instrument(skip(self, request, actor), fields(customer_id = request.customer_id, actor_id = actor.user_id))]
    pub async fn create(
        &self,
        request: CreateReservation,
        actor: &AuthContext,
    ) -> Result<ReservationWithItems, ServiceError> {
        if request.items.is_empty() {
            return Err(ServiceError::InvalidInput("reservation has no items".into()));
        }
        for item in &request.items {
            if item.quantity <= Decimal::ZERO {
                return Err(ServiceError::InvalidInput(format!(
                    "quantity for variant {} must be positive",
                    item.variant_id
                )));
            }
        }

        let created = transact_with_retry(&self.db, move |txn| {
            let request = request.clone();
            Box::pin(async move {
                Customer::find_by_id(request.customer_id)
                    .one(txn)
                    .await?
                    .ok_or_else(|| {
                        ServiceError::NotFound(format!(
                            "customer {} not found",
                            request.customer_id
                        ))
                    })?;

                let lines: Vec<(i64, Decimal)> = request
                    .items
                    .iter()
                    .map(|i| (i.variant_id, i.quantity))
                    .collect();
                for (variant_id, quantity) in inventory::coalesce_lines(&lines) {
                    let available = inventory::available_quantity(txn, variant_id).await?;
                    if quantity > available {
                        return Err(ServiceError::InsufficientAvailability {
                            variant_id,
                            shortfall: quantity - available,
                        });
                    }
                }

                let now = Utc::now();
                let res = reservation::ActiveModel {
                    customer_id: Set(request.customer_id),
                    status: Set(ReservationStatus::Pending.to_string()),
                    reserve_at: Set(request.reserve_at),
                    notes: Set(request.notes.clone()),
                    created_at: Set(now),
                    updated_at: Set(now),
                    ..Default::default()
                }
                .insert(txn)
                .await?;

                let mut items = Vec::with_capacity(request.items.len());
                for item in &request.items {
                    let row = reservation_item::ActiveModel {
                        reservation_id: Set(res.id),
                        variant_id: Set(item.variant_id),
                        quantity: Set(item.quantity),
                        ..Default::default()
                    }
                    .insert(txn)
                    .await?;
                    items.push(row);
                }

                Ok(ReservationWithItems {
                    reservation: res,
                    items,
                })
            })
        })
        .await?;

        info!(reservation_id = created.reservation.id, "reservation created");
        self.emit(Event::ReservationCreated(created.reservation.id)).await;
        Ok(created)
    }

    /// PENDING → DEPOSITED, recording the down payment.
    #[instrument(skip(self, actor), fields(actor_id = actor.user_id))]
    pub async fn deposit(
        &self,
        reservation_id: i64,
        amount: Decimal,
        method: String,
        receipt: Option<String>,
        actor: &AuthContext,
    ) -> Result<reservation::Model, ServiceError> {
        if amount <= Decimal::ZERO {
            return Err(ServiceError::InvalidInput(
                "deposit amount must be positive".into(),
            ));
        }

        let deposited = transact_with_retry(&self.db, move |txn| {
            let method = method.clone();
            let receipt = receipt.clone();
            Box::pin(async move {
                let (res, _) = load_for_transition(
                    txn,
                    reservation_id,
                    "deposit",
                    &[ReservationStatus::Pending],
                )
                .await?;

                let now = Utc::now();
                let mut active: reservation::ActiveModel = res.into();
                active.status = Set(ReservationStatus::Deposited.to_string());
                active.deposit_amount = Set(Some(amount));
                active.deposit_method = Set(Some(method));
                active.deposit_receipt = Set(receipt);
                active.deposit_at = Set(Some(now));
                active.updated_at = Set(now);
                Ok(active.update(txn).await?)
            })
        })
        .await?;

        info!(reservation_id = deposited.id, "reservation deposit recorded");
        self.emit(Event::ReservationDeposited {
            reservation_id: deposited.id,
        })
        .await;
        Ok(deposited)
    }

    /// DEPOSITED → CONFIRMED, optionally scheduling a pickup reminder. The
    /// reminder timestamp is observable state; dispatching it is someone
    /// else's job.
    #[instrument(skip(self, actor), fields(actor_id = actor.user_id))]
    pub async fn confirm(
        &self,
        reservation_id: i64,
        reminder_at: Option<DateTime<Utc>>,
        actor: &AuthContext,
    ) -> Result<reservation::Model, ServiceError> {
        let confirmed = transact_with_retry(&self.db, move |txn| {
            Box::pin(async move {
                let (res, _) = load_for_transition(
                    txn,
                    reservation_id,
                    "confirm",
                    &[ReservationStatus::Deposited],
                )
                .await?;

                let now = Utc::now();
                let mut active: reservation::ActiveModel = res.into();
                active.status = Set(ReservationStatus::Confirmed.to_string());
                active.confirmed_at = Set(Some(now));
                active.reminder_at = Set(reminder_at);
                active.updated_at = Set(now);
                Ok(active.update(txn).await?)
            })
        })
        .await?;

        info!(reservation_id = confirmed.id, "reservation confirmed");
        self.emit(Event::ReservationConfirmed(confirmed.id)).await;
        Ok(confirmed)
    }

    /// CONFIRMED → COMPLETED: spawns the sales order in the same transaction
    /// and records the link. Stock moves later, when the order ships or is
    /// set aside; until then the reservation's claim keeps holding the units.
    #[instrument(skip(self, actor), fields(actor_id = actor.user_id))]
    pub async fn complete(
        &self,
        reservation_id: i64,
        payment_method: SalesPaymentMethod,
        delivery_address: Option<String>,
        pickup_branch: Option<String>,
        actor: &AuthContext,
    ) -> Result<(reservation::Model, SalesOrderWithItems), ServiceError> {
        let tax_rate = self.tax_rate;
        let default_warehouse_id = self.default_warehouse_id;
        let (completed, order) = transact_with_retry(&self.db, move |txn| {
            let delivery_address = delivery_address.clone();
            let pickup_branch = pickup_branch.clone();
            Box::pin(async move {
                let (res, _) = load_for_transition(
                    txn,
                    reservation_id,
                    "complete",
                    &[ReservationStatus::Confirmed],
                )
                .await?;

                let items = load_items(txn, res.id).await?;
                let order = sales_orders::create_in_txn(
                    txn,
                    &CreateSalesOrder {
                        customer: CustomerResolution::ById(res.customer_id),
                        items: items
                            .iter()
                            .map(|i| SalesItem {
                                variant_id: i.variant_id,
                                quantity: i.quantity,
                                unit_price: None,
                                discount: None,
                            })
                            .collect(),
                        payment_method,
                        delivery_address,
                        pickup_branch,
                        warehouse_id: None,
                        notes: res.notes.clone(),
                    },
                    tax_rate,
                    default_warehouse_id,
                )
                .await?;

                let now = Utc::now();
                let mut active: reservation::ActiveModel = res.into();
                active.status = Set(ReservationStatus::Completed.to_string());
                active.sales_order_id = Set(Some(order.order.id));
                active.updated_at = Set(now);
                Ok((active.update(txn).await?, order))
            })
        })
        .await?;

        info!(
            reservation_id = completed.id,
            sales_order_id = order.order.id,
            "reservation completed"
        );
        self.emit(Event::ReservationCompleted {
            reservation_id: completed.id,
            sales_order_id: order.order.id,
        })
        .await;
        Ok((completed, order))
    }

    /// Cancels an open reservation, releasing its claim.
    #[instrument(skip(self, actor), fields(actor_id = actor.user_id))]
    pub async fn cancel(
        &self,
        reservation_id: i64,
        reason: Option<String>,
        actor: &AuthContext,
    ) -> Result<reservation::Model, ServiceError> {
        let cancelled = transact_with_retry(&self.db, move |txn| {
            let reason = reason.clone();
            Box::pin(async move {
                let (res, _) = load_for_transition(
                    txn,
                    reservation_id,
                    "cancel",
                    &[
                        ReservationStatus::Pending,
                        ReservationStatus::Deposited,
                        ReservationStatus::Confirmed,
                    ],
                )
                .await?;

                let now = Utc::now();
                let mut active: reservation::ActiveModel = res.into();
                active.status = Set(ReservationStatus::Cancelled.to_string());
                active.cancellation_reason = Set(reason);
                active.cancelled_at = Set(Some(now));
                active.updated_at = Set(now);
                Ok(active.update(txn).await?)
            })
        })
        .await?;

        info!(reservation_id = cancelled.id, "reservation cancelled");
        self.emit(Event::ReservationCancelled(cancelled.id)).await;
        Ok(cancelled)
    }

    pub async fn get(&self, reservation_id: i64) -> Result<ReservationWithItems, ServiceError> {
        let db = &*self.db;
        let res = Reservation::find_by_id(reservation_id)
            .one(db)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("reservation {} not found", reservation_id))
            })?;
        let items = load_items(db, reservation_id).await?;
        Ok(ReservationWithItems {
            reservation: res,
            items,
        })
    }
}
