mod common;

use assert_matches::assert_matches;
use common::*;
use ferreteria_api::entities::sales_order::{SalesOrderStatus, SalesPaymentMethod};
use ferreteria_api::entities::{invoice, payment};
use ferreteria_api::errors::ServiceError;
use ferreteria_api::services::inventory::EntryItem;
use ferreteria_api::services::sales_orders::{
    CreateSalesOrder, CustomerResolution, PaymentCapture, SalesItem,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};

fn sales_item(variant_id: i64, qty: Decimal, price: Decimal) -> SalesItem {
    SalesItem {
        variant_id,
        quantity: qty,
        unit_price: Some(price),
        discount: None,
    }
}

async fn stock_of(
    db: &sea_orm::DatabaseConnection,
    variant_id: i64,
    warehouse_id: i64,
) -> Decimal {
    use ferreteria_api::entities::stock_balance;
    stock_balance::Entity::find()
        .filter(stock_balance::Column::VariantId.eq(variant_id))
        .filter(stock_balance::Column::WarehouseId.eq(warehouse_id))
        .one(db)
        .await
        .expect("query")
        .map(|b| b.quantity)
        .unwrap_or(Decimal::ZERO)
}

#[tokio::test]
async fn cod_happy_path_posts_invoice_and_payment_at_the_door() {
    let db = setup_db().await;
    let wh = seed_warehouse(&db, "Central", "La Paz").await;
    let a = seed_variant(&db, "Candado 40mm", Some(dec!(10.00))).await;
    let b = seed_variant(&db, "Cadena 1m", Some(dec!(5.00))).await;
    let customer = seed_customer(&db, "Rosa Mamani", Some("rosa@example.com")).await;
    let state = build_state(db.clone(), Some(wh));
    let actor = admin();

    state
        .inventory
        .register_entry(
            wh,
            vec![
                EntryItem {
                    variant_id: a,
                    quantity: dec!(5),
                    unit_cost: None,
                },
                EntryItem {
                    variant_id: b,
                    quantity: dec!(3),
                    unit_cost: None,
                },
            ],
            &actor,
            "load",
        )
        .await
        .expect("stock");

    let created = state
        .sales_orders
        .create(
            CreateSalesOrder {
                customer: CustomerResolution::ById(customer),
                items: vec![sales_item(a, dec!(2), dec!(10.00)), sales_item(b, dec!(1), dec!(5.00))],
                payment_method: SalesPaymentMethod::Cod,
                delivery_address: Some("Av. Buenos Aires 742".into()),
                pickup_branch: None,
                warehouse_id: None,
                notes: None,
            },
            &actor,
        )
        .await
        .expect("create");
    let order_id = created.order.id;
    assert_eq!(created.order.status, "PENDING");

    state.sales_orders.pay(order_id, None, &actor).await.expect("pay");
    let shipped = state
        .sales_orders
        .ship(order_id, Some(7), None, &actor)
        .await
        .expect("ship");
    assert_eq!(shipped.status, "SHIPPED");
    assert_eq!(stock_of(&db, a, wh).await, dec!(3));
    assert_eq!(stock_of(&db, b, wh).await, dec!(2));

    let delivered = state
        .sales_orders
        .deliver(
            order_id,
            "Rosa Mamani".into(),
            None,
            Some(PaymentCapture {
                amount: dec!(25.00),
                method: "EFECTIVO".into(),
                receipt: None,
            }),
            &actor,
        )
        .await
        .expect("deliver");
    assert_eq!(delivered.status, "DELIVERED");

    let inv = invoice::Entity::find()
        .filter(invoice::Column::SalesOrderId.eq(order_id))
        .one(&*db)
        .await
        .expect("query")
        .expect("invoice");
    assert_eq!(inv.number, "FAC-000001");
    assert_eq!(inv.subtotal, dec!(25.00));
    assert_eq!(inv.tax, dec!(3.25));
    assert_eq!(inv.total, dec!(28.25));
    assert_eq!(inv.status, "ISSUED");

    let pay = payment::Entity::find()
        .filter(payment::Column::InvoiceId.eq(inv.id))
        .one(&*db)
        .await
        .expect("query")
        .expect("payment");
    assert_eq!(pay.amount, dec!(25.00));
    assert_eq!(pay.status, "CONFIRMED");
    assert_eq!(pay.method, "EFECTIVO");
    assert_eq!(pay.sales_order_id, Some(order_id));
}

#[tokio::test]
async fn cod_delivery_without_payment_is_rejected() {
    let db = setup_db().await;
    let wh = seed_warehouse(&db, "Central", "La Paz").await;
    let v = seed_variant(&db, "Serrucho", Some(dec!(30.00))).await;
    let customer = seed_customer(&db, "Juan Quispe", None).await;
    let state = build_state(db.clone(), Some(wh));
    let actor = admin();

    state
        .inventory
        .register_entry(
            wh,
            vec![EntryItem {
                variant_id: v,
                quantity: dec!(2),
                unit_cost: None,
            }],
            &actor,
            "load",
        )
        .await
        .expect("stock");

    let order = state
        .sales_orders
        .create(
            CreateSalesOrder {
                customer: CustomerResolution::ById(customer),
                items: vec![sales_item(v, dec!(1), dec!(30.00))],
                payment_method: SalesPaymentMethod::Cod,
                delivery_address: Some("Calle Sagarnaga 212".into()),
                pickup_branch: None,
                warehouse_id: None,
                notes: None,
            },
            &actor,
        )
        .await
        .expect("create")
        .order;

    state.sales_orders.pay(order.id, None, &actor).await.expect("pay");
    state
        .sales_orders
        .ship(order.id, None, None, &actor)
        .await
        .expect("ship");

    let err = state
        .sales_orders
        .deliver(order.id, "Juan Quispe".into(), None, None, &actor)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InvalidInput(_));

    // The failed delivery neither moved state nor returned stock.
    let read = state.sales_orders.get(order.id).await.expect("get");
    assert_eq!(read.order.status, "SHIPPED");
    assert_eq!(stock_of(&db, v, wh).await, dec!(1));

    // An underpayment is rejected the same way.
    let err = state
        .sales_orders
        .deliver(
            order.id,
            "Juan Quispe".into(),
            None,
            Some(PaymentCapture {
                amount: dec!(20.00),
                method: "EFECTIVO".into(),
                receipt: None,
            }),
            &actor,
        )
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InvalidInput(_));
}

#[tokio::test]
async fn oversell_is_prevented_at_ship_time() {
    let db = setup_db().await;
    let wh = seed_warehouse(&db, "Central", "La Paz").await;
    let v = seed_variant(&db, "Amoladora", Some(dec!(120.00))).await;
    let customer = seed_customer(&db, "Carla Flores", None).await;
    let state = build_state(db.clone(), Some(wh));
    let actor = admin();

    state
        .inventory
        .register_entry(
            wh,
            vec![EntryItem {
                variant_id: v,
                quantity: dec!(3),
                unit_cost: None,
            }],
            &actor,
            "load",
        )
        .await
        .expect("stock");

    let mut orders = Vec::new();
    for _ in 0..2 {
        let order = state
            .sales_orders
            .create(
                CreateSalesOrder {
                    customer: CustomerResolution::ById(customer),
                    items: vec![sales_item(v, dec!(2), dec!(120.00))],
                    payment_method: SalesPaymentMethod::Prepaid,
                    delivery_address: Some("Av. Arce 900".into()),
                    pickup_branch: None,
                    warehouse_id: None,
                    notes: None,
                },
                &actor,
            )
            .await
            .expect("create")
            .order;
        state.sales_orders.pay(order.id, None, &actor).await.expect("pay");
        orders.push(order);
    }

    state
        .sales_orders
        .ship(orders[0].id, None, None, &actor)
        .await
        .expect("first ship");

    let err = state
        .sales_orders
        .ship(orders[1].id, None, None, &actor)
        .await
        .unwrap_err();
    assert_matches!(
        err,
        ServiceError::InsufficientStock { variant_id, shortfall }
            if variant_id == v && shortfall == dec!(1)
    );
    assert_eq!(stock_of(&db, v, wh).await, dec!(1));
}

#[tokio::test]
async fn cancel_after_ship_returns_stock_and_is_idempotent_on_terminals() {
    let db = setup_db().await;
    let wh = seed_warehouse(&db, "Central", "La Paz").await;
    let v = seed_variant(&db, "Escalera 6 pasos", Some(dec!(260.00))).await;
    let customer = seed_customer(&db, "Hugo Ticona", None).await;
    let state = build_state(db.clone(), Some(wh));
    let actor = admin();

    state
        .inventory
        .register_entry(
            wh,
            vec![EntryItem {
                variant_id: v,
                quantity: dec!(4),
                unit_cost: None,
            }],
            &actor,
            "load",
        )
        .await
        .expect("stock");

    let order = state
        .sales_orders
        .create(
            CreateSalesOrder {
                customer: CustomerResolution::ById(customer),
                items: vec![sales_item(v, dec!(3), dec!(260.00))],
                payment_method: SalesPaymentMethod::Prepaid,
                delivery_address: Some("Calle Illampu 55".into()),
                pickup_branch: None,
                warehouse_id: None,
                notes: None,
            },
            &actor,
        )
        .await
        .expect("create")
        .order;

    state.sales_orders.pay(order.id, None, &actor).await.expect("pay");
    state
        .sales_orders
        .ship(order.id, None, None, &actor)
        .await
        .expect("ship");
    assert_eq!(stock_of(&db, v, wh).await, dec!(1));

    let cancelled = state
        .sales_orders
        .cancel(order.id, Some("customer changed their mind".into()), &actor)
        .await
        .expect("cancel");
    assert_eq!(cancelled.status, "CANCELLED");
    // Round trip: on-hand is back to its pre-ship value.
    assert_eq!(stock_of(&db, v, wh).await, dec!(4));

    // Terminal cancel is a no-op returning the order as-is.
    let again = state
        .sales_orders
        .cancel(order.id, Some("noise".into()), &actor)
        .await
        .expect("cancel again");
    assert_eq!(again.status, "CANCELLED");
    assert_eq!(
        again.cancellation_reason.as_deref(),
        Some("customer changed their mind")
    );
    assert_eq!(stock_of(&db, v, wh).await, dec!(4));
}

#[tokio::test]
async fn pickup_flow_collects_payment_at_the_counter() {
    let db = setup_db().await;
    let wh = seed_warehouse(&db, "Sucursal Sur", "El Alto").await;
    let v = seed_variant(&db, "Taladro 650W", Some(dec!(300.00))).await;
    let customer = seed_customer(&db, "Lidia Condori", None).await;
    let state = build_state(db.clone(), Some(wh));
    let actor = admin();

    state
        .inventory
        .register_entry(
            wh,
            vec![EntryItem {
                variant_id: v,
                quantity: dec!(2),
                unit_cost: None,
            }],
            &actor,
            "load",
        )
        .await
        .expect("stock");

    let order = state
        .sales_orders
        .create(
            CreateSalesOrder {
                customer: CustomerResolution::ById(customer),
                items: vec![sales_item(v, dec!(1), dec!(300.00))],
                payment_method: SalesPaymentMethod::Pickup,
                delivery_address: None,
                pickup_branch: Some("El Alto".into()),
                warehouse_id: None,
                notes: None,
            },
            &actor,
        )
        .await
        .expect("create")
        .order;

    // Pickup orders never go out with a courier.
    state.sales_orders.pay(order.id, None, &actor).await.expect("pay");
    assert_matches!(
        state
            .sales_orders
            .ship(order.id, None, None, &actor)
            .await
            .unwrap_err(),
        ServiceError::InvalidState(_)
    );

    state
        .sales_orders
        .ready_for_pickup(order.id, &actor)
        .await
        .expect("ready");
    assert_eq!(stock_of(&db, v, wh).await, dec!(1));

    // No money yet, so the counter must collect it.
    assert_matches!(
        state
            .sales_orders
            .pickup(order.id, "Lidia Condori".into(), None, None, &actor)
            .await
            .unwrap_err(),
        ServiceError::InvalidInput(_)
    );

    let picked = state
        .sales_orders
        .pickup(
            order.id,
            "Lidia Condori".into(),
            None,
            Some(PaymentCapture {
                amount: dec!(320.00),
                method: "QR".into(),
                receipt: Some("QR-9912".into()),
            }),
            &actor,
        )
        .await
        .expect("pickup");
    assert_eq!(picked.status, "PICKED_UP");

    // Overpayment stays on the single payment row.
    let pay = payment::Entity::find()
        .filter(payment::Column::SalesOrderId.eq(order.id))
        .one(&*db)
        .await
        .expect("query")
        .expect("payment");
    assert_eq!(pay.amount, dec!(320.00));
    assert_eq!(pay.status, "CONFIRMED");
}

#[tokio::test]
async fn credit_orders_are_invoiced_at_creation() {
    let db = setup_db().await;
    let wh = seed_warehouse(&db, "Central", "La Paz").await;
    let v = seed_variant(&db, "Compresora 24L", Some(dec!(1500.00))).await;
    let customer = seed_customer(&db, "Constructora Andina SRL", Some("compras@andina.bo")).await;
    let state = build_state(db.clone(), Some(wh));
    let actor = admin();

    let order = state
        .sales_orders
        .create(
            CreateSalesOrder {
                customer: CustomerResolution::ById(customer),
                items: vec![sales_item(v, dec!(2), dec!(1500.00))],
                payment_method: SalesPaymentMethod::Credit,
                delivery_address: Some("Parque Industrial, Galp\u{f3}n 4".into()),
                pickup_branch: None,
                warehouse_id: None,
                notes: None,
            },
            &actor,
        )
        .await
        .expect("create")
        .order;

    let inv = invoice::Entity::find()
        .filter(invoice::Column::SalesOrderId.eq(order.id))
        .one(&*db)
        .await
        .expect("query")
        .expect("invoice exists from day one");
    assert_eq!(inv.subtotal, dec!(3000.00));
    assert_eq!(inv.total, dec!(3390.00));

    // Payments accumulate over time against that invoice.
    state
        .invoicing
        .record_payment(
            ferreteria_api::services::invoicing::RecordPayment {
                customer_id: customer,
                invoice_id: Some(inv.id),
                sales_order_id: Some(order.id),
                amount: dec!(1000.00),
                method: "TRANSFERENCIA".into(),
                receipt: None,
                paid_at: None,
                status: None,
            },
            &actor,
        )
        .await
        .expect("first installment");
    let paid = state.invoicing.total_paid(inv.id).await.expect("total");
    assert_eq!(paid, dec!(1000.00));
}

#[tokio::test]
async fn generic_update_status_only_walks_safe_edges() {
    let db = setup_db().await;
    let wh = seed_warehouse(&db, "Central", "La Paz").await;
    let v = seed_variant(&db, "Carretilla", Some(dec!(400.00))).await;
    let customer = seed_customer(&db, "Mario Apaza", None).await;
    let state = build_state(db.clone(), Some(wh));
    let actor = admin();

    let order = state
        .sales_orders
        .create(
            CreateSalesOrder {
                customer: CustomerResolution::ById(customer),
                items: vec![sales_item(v, dec!(1), dec!(400.00))],
                payment_method: SalesPaymentMethod::Prepaid,
                delivery_address: Some("Zona Achumani".into()),
                pickup_branch: None,
                warehouse_id: None,
                notes: None,
            },
            &actor,
        )
        .await
        .expect("create")
        .order;

    // Not an edge of the machine at all.
    assert_matches!(
        state
            .sales_orders
            .update_status(order.id, SalesOrderStatus::Delivered, &actor)
            .await
            .unwrap_err(),
        ServiceError::InvalidState(_)
    );

    let paid = state
        .sales_orders
        .update_status(order.id, SalesOrderStatus::Paid, &actor)
        .await
        .expect("pay via generic edge");
    assert_eq!(paid.status, "PAID");
    assert!(paid.paid_at.is_some());

    // A legal edge that moves stock is refused here.
    assert_matches!(
        state
            .sales_orders
            .update_status(order.id, SalesOrderStatus::Shipped, &actor)
            .await
            .unwrap_err(),
        ServiceError::InvalidState(_)
    );

    let preparing = state
        .sales_orders
        .update_status(order.id, SalesOrderStatus::Preparing, &actor)
        .await
        .expect("prepare");
    assert_eq!(preparing.status, "PREPARING");
}

#[tokio::test]
async fn customer_resolution_by_email_folds_case_and_reuses_rows() {
    let db = setup_db().await;
    let wh = seed_warehouse(&db, "Central", "La Paz").await;
    let v = seed_variant(&db, "Flexometro 5m", Some(dec!(25.00))).await;
    let state = build_state(db.clone(), Some(wh));
    let actor = admin();

    let first = state
        .sales_orders
        .create(
            CreateSalesOrder {
                customer: CustomerResolution::ByEmail {
                    email: "Pedro.Rojas@example.com".into(),
                    name: "Pedro Rojas".into(),
                    user_id: None,
                },
                items: vec![sales_item(v, dec!(1), dec!(25.00))],
                payment_method: SalesPaymentMethod::Prepaid,
                delivery_address: Some("Calle Murillo 101".into()),
                pickup_branch: None,
                warehouse_id: None,
                notes: None,
            },
            &actor,
        )
        .await
        .expect("first order")
        .order;

    let second = state
        .sales_orders
        .create(
            CreateSalesOrder {
                customer: CustomerResolution::ByEmail {
                    email: "  pedro.rojas@EXAMPLE.com ".into(),
                    name: "Pedro R.".into(),
                    user_id: None,
                },
                items: vec![sales_item(v, dec!(2), dec!(25.00))],
                payment_method: SalesPaymentMethod::Prepaid,
                delivery_address: Some("Calle Murillo 101".into()),
                pickup_branch: None,
                warehouse_id: None,
                notes: None,
            },
            &actor,
        )
        .await
        .expect("second order")
        .order;

    assert_eq!(first.customer_id, second.customer_id);
}
