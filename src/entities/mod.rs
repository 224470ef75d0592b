pub mod customer;
pub mod idempotency_record;
pub mod invoice;
pub mod invoice_item;
pub mod payment;
pub mod product;
pub mod product_variant;
pub mod purchase_order;
pub mod purchase_order_item;
pub mod reservation;
pub mod reservation_item;
pub mod sales_order;
pub mod sales_order_item;
pub mod stock_adjustment;
pub mod stock_adjustment_item;
pub mod stock_balance;
pub mod stock_movement;
pub mod stock_transfer;
pub mod stock_transfer_item;
pub mod supplier;
pub mod supplier_product;
pub mod warehouse;
