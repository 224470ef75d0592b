use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, info};
use uuid::Uuid;

/// Domain events emitted after successful workflow commits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    // Inventory events
    StockEntryRegistered {
        warehouse_id: i64,
        batch_id: Uuid,
        line_count: usize,
    },
    StockTransferred {
        source_warehouse_id: i64,
        dest_warehouse_id: i64,
        batch_id: Uuid,
    },
    StockAdjusted {
        adjustment_id: i64,
        batch_id: Uuid,
    },

    // Purchase workflow events
    PurchaseOrderCreated(i64),
    PurchaseOrderSent(i64),
    PurchaseOrderConfirmed(i64),
    PurchaseOrderRejected(i64),
    PurchaseOrderReceived {
        purchase_order_id: i64,
        warehouse_id: i64,
    },
    PurchaseOrderInvoiced(i64),
    PurchaseOrderClosed(i64),

    // Sales workflow events
    SalesOrderCreated(i64),
    SalesOrderStatusChanged {
        sales_order_id: i64,
        old_status: String,
        new_status: String,
    },
    SalesOrderShipped(i64),
    SalesOrderDelivered(i64),
    SalesOrderPickedUp(i64),
    SalesOrderCancelled(i64),

    // Reservation events
    ReservationCreated(i64),
    ReservationDeposited {
        reservation_id: i64,
    },
    ReservationConfirmed(i64),
    ReservationCompleted {
        reservation_id: i64,
        sales_order_id: i64,
    },
    ReservationCancelled(i64),

    // Posting events
    InvoiceIssued {
        invoice_id: i64,
        number: String,
    },
    PaymentRecorded {
        payment_id: i64,
        invoice_id: Option<i64>,
    },

    // Partner events
    CustomerCreated(i64),
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously.
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }
}

/// Creates a channel pair sized for one node's in-flight operations.
pub fn channel(buffer: usize) -> (EventSender, mpsc::Receiver<Event>) {
    let (tx, rx) = mpsc::channel(buffer);
    (EventSender::new(tx), rx)
}

/// Drains events, logging each. Run on a background task.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    while let Some(event) = rx.recv().await {
        match &event {
            Event::InvoiceIssued { invoice_id, number } => {
                info!(invoice_id, number = %number, "invoice issued");
            }
            Event::SalesOrderStatusChanged {
                sales_order_id,
                old_status,
                new_status,
            } => {
                info!(sales_order_id, %old_status, %new_status, "sales order transition");
            }
            other => debug!(event = ?other, "domain event"),
        }
    }
}
