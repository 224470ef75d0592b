pub mod customers;
pub mod idempotency;
pub mod inventory;
pub mod invoicing;
pub mod purchase_orders;
pub mod reservations;
pub mod sales_orders;
