//! Transactional core for a hardware-retail back office.
//!
//! The crate owns the inventory ledger, the purchase and sales state
//! machines, reservations, invoice/payment posting and the idempotency
//! layer. Transport, auth token handling and reporting live elsewhere and
//! talk to this crate through the services in [`services`].
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]

pub mod auth;
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod migrator;
pub mod queries;
pub mod services;

use std::sync::Arc;

use sea_orm::DatabaseConnection;
use tokio::sync::mpsc;

use crate::config::AppConfig;
use crate::events::{Event, EventSender};
use crate::services::customers::CustomerService;
use crate::services::idempotency::IdempotencyService;
use crate::services::inventory::InventoryService;
use crate::services::invoicing::InvoicingService;
use crate::services::purchase_orders::PurchaseOrderService;
use crate::services::reservations::ReservationService;
use crate::services::sales_orders::SalesOrderService;

/// Wired service graph shared by the transport layer and the test harness.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: AppConfig,
    pub event_sender: EventSender,
    pub inventory: InventoryService,
    pub purchase_orders: PurchaseOrderService,
    pub sales_orders: SalesOrderService,
    pub reservations: ReservationService,
    pub invoicing: InvoicingService,
    pub customers: CustomerService,
    pub idempotency: IdempotencyService,
}

impl AppState {
    /// Builds the service graph. The returned receiver feeds
    /// [`events::process_events`]; run it on a background task.
    pub fn build(
        db: Arc<DatabaseConnection>,
        config: AppConfig,
    ) -> (Self, mpsc::Receiver<Event>) {
        let (event_sender, receiver) = events::channel(256);
        let sender = Arc::new(event_sender.clone());

        let state = Self {
            inventory: InventoryService::new(db.clone(), sender.clone()),
            purchase_orders: PurchaseOrderService::new(
                db.clone(),
                sender.clone(),
                config.default_warehouse_id,
            ),
            sales_orders: SalesOrderService::new(
                db.clone(),
                sender.clone(),
                config.tax_rate,
                config.default_warehouse_id,
            ),
            reservations: ReservationService::new(
                db.clone(),
                sender.clone(),
                config.tax_rate,
                config.default_warehouse_id,
            ),
            invoicing: InvoicingService::new(db.clone(), sender.clone(), config.tax_rate),
            customers: CustomerService::new(db.clone(), sender.clone()),
            idempotency: IdempotencyService::new(db.clone(), config.idempotency_ttl_hours),
            event_sender,
            config,
            db,
        };
        (state, receiver)
    }
}
