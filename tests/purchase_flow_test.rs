mod common;

use assert_matches::assert_matches;
use common::*;
use ferreteria_api::errors::ServiceError;
use ferreteria_api::queries::stock_queries;
use ferreteria_api::services::purchase_orders::{CreatePurchaseOrder, PurchaseItem, ReceivedItem};
use rust_decimal_macros::dec;
use sea_orm::{ActiveModelTrait, EntityTrait, Set};

fn item(variant_id: i64, qty: rust_decimal::Decimal, price: Option<rust_decimal::Decimal>) -> PurchaseItem {
    PurchaseItem {
        variant_id,
        quantity: qty,
        unit_price: price,
    }
}

#[tokio::test]
async fn purchase_happy_path_credits_stock_with_received_quantities() {
    let db = setup_db().await;
    let wh = seed_warehouse(&db, "Central", "La Paz").await;
    let v = seed_variant(&db, "Cer\u{e1}mica 40x40", None).await;
    let supplier = seed_supplier(&db, "Importadora Illimani").await;
    let state = build_state(db.clone(), Some(wh));
    let actor = admin();

    let po = state
        .purchase_orders
        .create(
            CreatePurchaseOrder {
                supplier_id: supplier,
                items: vec![item(v, dec!(10), Some(dec!(5.00)))],
                warehouse_id: None,
                notes: None,
            },
            &actor,
        )
        .await
        .expect("create");
    assert_eq!(po.status, "BORRADOR");

    let po = state
        .purchase_orders
        .send(po.id, None, &actor)
        .await
        .expect("send");
    assert_eq!(po.status, "ENVIADO");
    assert!(po.sent_at.is_some());

    // Supplier counters with more units at a better price.
    let po = state
        .purchase_orders
        .confirm(po.id, Some(vec![item(v, dec!(12), Some(dec!(4.80)))]), None, &actor)
        .await
        .expect("confirm");
    assert_eq!(po.status, "CONFIRMADO");

    // Only 11 units actually show up.
    let po = state
        .purchase_orders
        .receive(
            po.id,
            vec![ReceivedItem {
                variant_id: v,
                quantity: dec!(11),
                unit_price: Some(dec!(4.80)),
            }],
            None,
            &actor,
        )
        .await
        .expect("receive");
    assert_eq!(po.status, "RECIBIDO");
    assert!(po.received_at.is_some());

    let stock = stock_queries::warehouse_stock(&*db, wh).await.expect("stock");
    assert_eq!(stock.len(), 1);
    assert_eq!(stock[0].quantity, dec!(11));
    assert_eq!(stock[0].average_cost, dec!(4.80));

    let with_items = state.purchase_orders.get(po.id).await.expect("get");
    assert_eq!(with_items.items.len(), 1);
    assert_eq!(with_items.items[0].quantity, dec!(11));

    let po = state
        .purchase_orders
        .invoice(po.id, "A-123".to_string(), None, &actor)
        .await
        .expect("invoice");
    assert_eq!(po.status, "FACTURADO");
    assert_eq!(po.supplier_invoice_number.as_deref(), Some("A-123"));

    let po = state
        .purchase_orders
        .close(po.id, None, &actor)
        .await
        .expect("close");
    assert_eq!(po.status, "CERRADO");
    assert!(po.closed_at.is_some());
}

#[tokio::test]
async fn edges_outside_the_machine_are_invalid_state() {
    let db = setup_db().await;
    let wh = seed_warehouse(&db, "Central", "La Paz").await;
    let v = seed_variant(&db, "Teja colonial", None).await;
    let supplier = seed_supplier(&db, "Tejar San Roque").await;
    let state = build_state(db.clone(), Some(wh));
    let actor = admin();

    let po = state
        .purchase_orders
        .create(
            CreatePurchaseOrder {
                supplier_id: supplier,
                items: vec![item(v, dec!(100), None)],
                warehouse_id: None,
                notes: None,
            },
            &actor,
        )
        .await
        .expect("create");

    // A draft was never sent, so it cannot be confirmed, invoiced or closed.
    assert_matches!(
        state.purchase_orders.confirm(po.id, None, None, &actor).await.unwrap_err(),
        ServiceError::InvalidState(_)
    );
    assert_matches!(
        state
            .purchase_orders
            .invoice(po.id, "X-1".into(), None, &actor)
            .await
            .unwrap_err(),
        ServiceError::InvalidState(_)
    );
    assert_matches!(
        state.purchase_orders.close(po.id, None, &actor).await.unwrap_err(),
        ServiceError::InvalidState(_)
    );

    let po = state.purchase_orders.send(po.id, None, &actor).await.expect("send");

    // Once sent, the draft edit window is closed.
    assert_matches!(
        state
            .purchase_orders
            .update_draft(po.id, None, None, Some("late note".into()), &actor)
            .await
            .unwrap_err(),
        ServiceError::InvalidState(_)
    );

    let po = state
        .purchase_orders
        .reject(po.id, "out of stock upstream".into(), &actor)
        .await
        .expect("reject");
    assert_eq!(po.status, "RECHAZADO");
    assert_eq!(po.rejection_reason.as_deref(), Some("out of stock upstream"));

    // Terminal: nothing else applies.
    assert_matches!(
        state
            .purchase_orders
            .receive(
                po.id,
                vec![ReceivedItem {
                    variant_id: v,
                    quantity: dec!(1),
                    unit_price: None
                }],
                None,
                &actor
            )
            .await
            .unwrap_err(),
        ServiceError::InvalidState(_)
    );
}

#[tokio::test]
async fn receive_directly_from_sent_is_allowed() {
    let db = setup_db().await;
    let wh = seed_warehouse(&db, "Central", "La Paz").await;
    let v = seed_variant(&db, "Cal hidratada", None).await;
    let supplier = seed_supplier(&db, "Calera Viacha").await;
    let state = build_state(db.clone(), Some(wh));
    let actor = admin();

    let po = state
        .purchase_orders
        .create(
            CreatePurchaseOrder {
                supplier_id: supplier,
                items: vec![item(v, dec!(40), Some(dec!(2.10)))],
                warehouse_id: None,
                notes: None,
            },
            &actor,
        )
        .await
        .expect("create");
    state.purchase_orders.send(po.id, None, &actor).await.expect("send");

    // Goods arrive before any formal confirmation.
    let po = state
        .purchase_orders
        .receive(
            po.id,
            vec![ReceivedItem {
                variant_id: v,
                quantity: dec!(40),
                unit_price: Some(dec!(2.10)),
            }],
            None,
            &actor,
        )
        .await
        .expect("receive");
    assert_eq!(po.status, "RECIBIDO");
}

#[tokio::test]
async fn zero_received_lines_book_no_stock() {
    let db = setup_db().await;
    let wh = seed_warehouse(&db, "Central", "La Paz").await;
    let v1 = seed_variant(&db, "Tubo PVC 2in", None).await;
    let v2 = seed_variant(&db, "Tubo PVC 4in", None).await;
    let supplier = seed_supplier(&db, "Plastiforte").await;
    let state = build_state(db.clone(), Some(wh));
    let actor = admin();

    let po = state
        .purchase_orders
        .create(
            CreatePurchaseOrder {
                supplier_id: supplier,
                items: vec![item(v1, dec!(10), None), item(v2, dec!(10), None)],
                warehouse_id: None,
                notes: None,
            },
            &actor,
        )
        .await
        .expect("create");
    state.purchase_orders.send(po.id, None, &actor).await.expect("send");
    state
        .purchase_orders
        .receive(
            po.id,
            vec![
                ReceivedItem {
                    variant_id: v1,
                    quantity: dec!(10),
                    unit_price: None,
                },
                ReceivedItem {
                    variant_id: v2,
                    quantity: dec!(0),
                    unit_price: None,
                },
            ],
            None,
            &actor,
        )
        .await
        .expect("receive");

    let stock = stock_queries::warehouse_stock(&*db, wh).await.expect("stock");
    assert_eq!(stock.len(), 1);
    assert_eq!(stock[0].variant_id, v1);
}

#[tokio::test]
async fn legacy_lowercase_states_normalize_on_read_and_rewrite_on_mutation() {
    let db = setup_db().await;
    let wh = seed_warehouse(&db, "Central", "La Paz").await;
    let v = seed_variant(&db, "Bisagra", None).await;
    let supplier = seed_supplier(&db, "Ferrimport").await;
    let state = build_state(db.clone(), Some(wh));
    let actor = admin();

    let po = state
        .purchase_orders
        .create(
            CreatePurchaseOrder {
                supplier_id: supplier,
                items: vec![item(v, dec!(5), None)],
                warehouse_id: None,
                notes: None,
            },
            &actor,
        )
        .await
        .expect("create");

    // Simulate a row the legacy system wrote.
    use ferreteria_api::entities::purchase_order;
    let row = purchase_order::Entity::find_by_id(po.id)
        .one(&*db)
        .await
        .expect("find")
        .expect("row");
    let mut legacy: purchase_order::ActiveModel = row.into();
    legacy.status = Set("sent".to_string());
    legacy.update(&*db).await.expect("write legacy state");

    // Reads report the canonical value.
    let read = state.purchase_orders.get(po.id).await.expect("get");
    assert_eq!(read.order.status, "ENVIADO");

    // The first mutation rewrites it canonically in storage.
    state
        .purchase_orders
        .confirm(po.id, None, None, &actor)
        .await
        .expect("confirm from legacy sent");
    let stored = purchase_order::Entity::find_by_id(po.id)
        .one(&*db)
        .await
        .expect("find")
        .expect("row");
    assert_eq!(stored.status, "CONFIRMADO");
}
