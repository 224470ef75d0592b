mod common;

use assert_matches::assert_matches;
use common::*;
use ferreteria_api::errors::ServiceError;
use ferreteria_api::services::customers::CreateCustomer;
use sea_orm::{EntityTrait, PaginatorTrait};
use serde_json::json;

fn create_body(name: &str, email: &str) -> serde_json::Value {
    json!({ "name": name, "email": email })
}

async fn customer_count(db: &sea_orm::DatabaseConnection) -> u64 {
    ferreteria_api::entities::customer::Entity::find()
        .count(db)
        .await
        .expect("count")
}

#[tokio::test]
async fn replay_returns_identical_response_without_reexecuting() {
    let db = setup_db().await;
    let state = build_state(db.clone(), None);
    let actor = admin();
    let body = create_body("Maria Nina", "maria.nina@example.com");

    let mut responses = Vec::new();
    for _ in 0..5 {
        let customers = state.customers.clone();
        let actor = actor.clone();
        let response = state
            .idempotency
            .execute(Some("reg-778"), "/customers", "POST", &body, || async move {
                let created = customers
                    .create(
                        CreateCustomer {
                            name: "Maria Nina".into(),
                            tax_id: None,
                            email: Some("maria.nina@example.com".into()),
                            phone: None,
                            user_id: None,
                        },
                        &actor,
                    )
                    .await?;
                Ok((201u16, serde_json::to_value(&created).unwrap()))
            })
            .await
            .expect("execute");
        responses.push(response);
    }

    // One row, five byte-identical answers.
    assert_eq!(customer_count(&db).await, 1);
    assert!(!responses[0].replayed);
    for response in &responses[1..] {
        assert!(response.replayed);
        assert_eq!(response.status, responses[0].status);
        assert_eq!(response.body, responses[0].body);
    }
    let ids: Vec<&serde_json::Value> = responses.iter().map(|r| &r.body["id"]).collect();
    assert!(ids.iter().all(|id| *id == ids[0]));
}

#[tokio::test]
async fn same_key_different_body_is_a_conflict() {
    let db = setup_db().await;
    let state = build_state(db.clone(), None);

    state
        .idempotency
        .execute(Some("key-1"), "/customers", "POST", &create_body("A", "a@example.com"), || async {
            Ok((201u16, json!({"ok": true})))
        })
        .await
        .expect("first");

    let err = state
        .idempotency
        .execute(Some("key-1"), "/customers", "POST", &create_body("B", "b@example.com"), || async {
            Ok((201u16, json!({"ok": true})))
        })
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::Conflict(_));
}

#[tokio::test]
async fn same_key_different_route_is_a_conflict() {
    let db = setup_db().await;
    let state = build_state(db.clone(), None);
    let body = json!({"x": 1});

    state
        .idempotency
        .execute(Some("key-2"), "/customers", "POST", &body, || async {
            Ok((200u16, json!(1)))
        })
        .await
        .expect("first");

    let err = state
        .idempotency
        .execute(Some("key-2"), "/suppliers", "POST", &body, || async {
            Ok((200u16, json!(2)))
        })
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::Conflict(_));
}

#[tokio::test]
async fn error_envelopes_replay_exactly() {
    let db = setup_db().await;
    let state = build_state(db.clone(), None);
    let body = json!({"variant": 7});

    let first = state
        .idempotency
        .execute(Some("key-3"), "/orders", "POST", &body, || async {
            Err(ServiceError::InvalidState("cannot ship from PENDING".into()))
        })
        .await
        .expect("first call caches the failure");
    assert_eq!(first.status, 422);
    assert!(!first.replayed);

    // The operation must not run again: a would-be success still replays the
    // original failure.
    let second = state
        .idempotency
        .execute(Some("key-3"), "/orders", "POST", &body, || async {
            Ok((200u16, json!({"never": "happens"})))
        })
        .await
        .expect("replay");
    assert!(second.replayed);
    assert_eq!(second.status, first.status);
    assert_eq!(second.body, first.body);
}

#[tokio::test]
async fn missing_key_runs_uncached() {
    let db = setup_db().await;
    let state = build_state(db.clone(), None);
    let body = json!({"n": 1});

    for i in 0..3u16 {
        let response = state
            .idempotency
            .execute(None, "/ping", "POST", &body, || async move {
                Ok((200u16, json!({ "call": i })))
            })
            .await
            .expect("uncached");
        assert!(!response.replayed);
        assert_eq!(response.body["call"], json!(i));
    }
    assert_eq!(state.idempotency.record_count().await.expect("count"), 0);
}

#[tokio::test]
async fn oversized_keys_are_rejected() {
    let db = setup_db().await;
    let state = build_state(db.clone(), None);
    let long_key = "k".repeat(256);

    let err = state
        .idempotency
        .execute(Some(&long_key), "/x", "POST", &json!({}), || async {
            Ok((200u16, json!(null)))
        })
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InvalidInput(_));
}

#[tokio::test]
async fn purge_drops_only_expired_records() {
    let db = setup_db().await;
    let state = build_state(db.clone(), None);

    state
        .idempotency
        .execute(Some("fresh"), "/x", "POST", &json!({"a": 1}), || async {
            Ok((200u16, json!(null)))
        })
        .await
        .expect("fresh record");

    // Nothing is old enough to purge yet.
    assert_eq!(state.idempotency.purge_expired().await.expect("purge"), 0);
    assert_eq!(state.idempotency.record_count().await.expect("count"), 1);

    // Age the record past its TTL by hand.
    use chrono::{Duration, Utc};
    use ferreteria_api::entities::idempotency_record;
    use sea_orm::{ActiveModelTrait, Set};
    let record = idempotency_record::Entity::find()
        .one(&*db)
        .await
        .expect("query")
        .expect("record");
    let mut active: idempotency_record::ActiveModel = record.into();
    active.expires_at = Set(Utc::now() - Duration::hours(1));
    active.update(&*db).await.expect("age");

    assert_eq!(state.idempotency.purge_expired().await.expect("purge"), 1);
    assert_eq!(state.idempotency.record_count().await.expect("count"), 0);

    // The key is usable again after expiry.
    let response = state
        .idempotency
        .execute(Some("fresh"), "/x", "POST", &json!({"a": 1}), || async {
            Ok((200u16, json!({"second": "run"})))
        })
        .await
        .expect("reuse");
    assert!(!response.replayed);
    assert_eq!(response.body["second"], json!("run"));
}
