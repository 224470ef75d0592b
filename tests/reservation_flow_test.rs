mod common;

use assert_matches::assert_matches;
use common::*;
use ferreteria_api::entities::sales_order::SalesPaymentMethod;
use ferreteria_api::errors::ServiceError;
use ferreteria_api::services::inventory::EntryItem;
use ferreteria_api::services::reservations::{CreateReservation, ReserveItem};
use ferreteria_api::services::sales_orders::PaymentCapture;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

async fn load_stock(
    state: &ferreteria_api::AppState,
    warehouse_id: i64,
    variant_id: i64,
    qty: Decimal,
) {
    state
        .inventory
        .register_entry(
            warehouse_id,
            vec![EntryItem {
                variant_id,
                quantity: qty,
                unit_cost: None,
            }],
            &admin(),
            "load",
        )
        .await
        .expect("stock");
}

#[tokio::test]
async fn open_reservations_pin_availability() {
    let db = setup_db().await;
    let wh = seed_warehouse(&db, "Central", "La Paz").await;
    let v = seed_variant(&db, "Generador 2kW", Some(dec!(2200.00))).await;
    let customer = seed_customer(&db, "Elsa Choque", None).await;
    let state = build_state(db.clone(), Some(wh));
    let actor = admin();

    load_stock(&state, wh, v, dec!(5)).await;

    let before = state.inventory.availability(v).await.expect("availability");
    assert_eq!(before.available, dec!(5));

    let reservation = state
        .reservations
        .create(
            CreateReservation {
                customer_id: customer,
                items: vec![ReserveItem {
                    variant_id: v,
                    quantity: dec!(2),
                }],
                reserve_at: None,
                notes: None,
            },
            &actor,
        )
        .await
        .expect("reserve");

    let pinned = state.inventory.availability(v).await.expect("availability");
    assert_eq!(pinned.total_on_hand, dec!(5));
    assert_eq!(pinned.pinned_by_reservations, dec!(2));
    assert_eq!(pinned.available, dec!(3));

    // Cancelling releases the claim in full.
    state
        .reservations
        .cancel(reservation.reservation.id, Some("no deposit".into()), &actor)
        .await
        .expect("cancel");
    let after = state.inventory.availability(v).await.expect("availability");
    assert_eq!(after.available, dec!(5));
}

#[tokio::test]
async fn creation_fails_when_exceeding_availability() {
    let db = setup_db().await;
    let wh = seed_warehouse(&db, "Central", "La Paz").await;
    let v = seed_variant(&db, "Soldadora", Some(dec!(900.00))).await;
    let customer = seed_customer(&db, "Oscar Laruta", None).await;
    let state = build_state(db.clone(), Some(wh));
    let actor = admin();

    load_stock(&state, wh, v, dec!(3)).await;

    state
        .reservations
        .create(
            CreateReservation {
                customer_id: customer,
                items: vec![ReserveItem {
                    variant_id: v,
                    quantity: dec!(2),
                }],
                reserve_at: None,
                notes: None,
            },
            &actor,
        )
        .await
        .expect("first reservation");

    // 3 on hand, 2 already claimed: asking for 2 more is short by 1.
    let err = state
        .reservations
        .create(
            CreateReservation {
                customer_id: customer,
                items: vec![ReserveItem {
                    variant_id: v,
                    quantity: dec!(2),
                }],
                reserve_at: None,
                notes: None,
            },
            &actor,
        )
        .await
        .unwrap_err();
    assert_matches!(
        err,
        ServiceError::InsufficientAvailability { variant_id, shortfall }
            if variant_id == v && shortfall == dec!(1)
    );
}

#[tokio::test]
async fn lifecycle_deposit_confirm_complete_pickup() {
    let db = setup_db().await;
    let wh = seed_warehouse(&db, "Sucursal Sur", "El Alto").await;
    let v = seed_variant(&db, "Motosierra", Some(dec!(1800.00))).await;
    let customer = seed_customer(&db, "Felix Huanca", None).await;
    let state = build_state(db.clone(), Some(wh));
    let actor = admin();

    load_stock(&state, wh, v, dec!(4)).await;

    let reservation = state
        .reservations
        .create(
            CreateReservation {
                customer_id: customer,
                items: vec![ReserveItem {
                    variant_id: v,
                    quantity: dec!(2),
                }],
                reserve_at: None,
                notes: Some("pickup next week".into()),
            },
            &actor,
        )
        .await
        .expect("reserve")
        .reservation;

    // Confirm requires a deposit first.
    assert_matches!(
        state
            .reservations
            .confirm(reservation.id, None, &actor)
            .await
            .unwrap_err(),
        ServiceError::InvalidState(_)
    );

    let deposited = state
        .reservations
        .deposit(reservation.id, dec!(200.00), "EFECTIVO".into(), Some("R-0088".into()), &actor)
        .await
        .expect("deposit");
    assert_eq!(deposited.status, "DEPOSITED");
    assert_eq!(deposited.deposit_amount, Some(dec!(200.00)));

    let confirmed = state
        .reservations
        .confirm(reservation.id, None, &actor)
        .await
        .expect("confirm");
    assert_eq!(confirmed.status, "CONFIRMED");

    let (completed, spawned) = state
        .reservations
        .complete(
            reservation.id,
            SalesPaymentMethod::Pickup,
            None,
            Some("El Alto".into()),
            &actor,
        )
        .await
        .expect("complete");
    assert_eq!(completed.status, "COMPLETED");
    assert_eq!(completed.sales_order_id, Some(spawned.order.id));
    assert_eq!(spawned.order.customer_id, customer);
    assert_eq!(spawned.items.len(), 1);
    // Price came from the variant's list price.
    assert_eq!(spawned.items[0].unit_price, dec!(1800.00));

    // The claim survives completion until the order consumes stock.
    let availability = state.inventory.availability(v).await.expect("availability");
    assert_eq!(availability.total_on_hand, dec!(4));
    assert_eq!(availability.pinned_by_reservations, dec!(2));
    assert_eq!(availability.available, dec!(2));

    state
        .sales_orders
        .pay(spawned.order.id, None, &actor)
        .await
        .expect("pay");
    state
        .sales_orders
        .ready_for_pickup(spawned.order.id, &actor)
        .await
        .expect("ready");

    // Stock is consumed, the claim hands over to the physical decrement.
    let availability = state.inventory.availability(v).await.expect("availability");
    assert_eq!(availability.total_on_hand, dec!(2));
    assert_eq!(availability.pinned_by_reservations, dec!(0));
    assert_eq!(availability.available, dec!(2));

    state
        .sales_orders
        .pickup(
            spawned.order.id,
            "Felix Huanca".into(),
            None,
            Some(PaymentCapture {
                amount: dec!(3600.00),
                method: "EFECTIVO".into(),
                receipt: None,
            }),
            &actor,
        )
        .await
        .expect("pickup");

    let reservation = state.reservations.get(reservation.id).await.expect("get");
    assert_eq!(reservation.reservation.status, "COMPLETED");
}

#[tokio::test]
async fn completed_and_cancelled_reservations_are_settled() {
    let db = setup_db().await;
    let wh = seed_warehouse(&db, "Central", "La Paz").await;
    let v = seed_variant(&db, "Nivel laser", Some(dec!(450.00))).await;
    let customer = seed_customer(&db, "Nora Vargas", None).await;
    let state = build_state(db.clone(), Some(wh));
    let actor = admin();

    load_stock(&state, wh, v, dec!(1)).await;

    let reservation = state
        .reservations
        .create(
            CreateReservation {
                customer_id: customer,
                items: vec![ReserveItem {
                    variant_id: v,
                    quantity: dec!(1),
                }],
                reserve_at: None,
                notes: None,
            },
            &actor,
        )
        .await
        .expect("reserve")
        .reservation;

    let cancelled = state
        .reservations
        .cancel(reservation.id, None, &actor)
        .await
        .expect("cancel");
    assert_eq!(cancelled.status, "CANCELLED");

    // Cancelled is terminal: no deposit, confirm, complete or second cancel.
    assert_matches!(
        state
            .reservations
            .deposit(reservation.id, dec!(10.00), "EFECTIVO".into(), None, &actor)
            .await
            .unwrap_err(),
        ServiceError::InvalidState(_)
    );
    assert_matches!(
        state
            .reservations
            .complete(reservation.id, SalesPaymentMethod::Prepaid, None, None, &actor)
            .await
            .unwrap_err(),
        ServiceError::InvalidState(_)
    );
    assert_matches!(
        state
            .reservations
            .cancel(reservation.id, None, &actor)
            .await
            .unwrap_err(),
        ServiceError::InvalidState(_)
    );
}
