#![allow(dead_code)]

use std::sync::Arc;

use chrono::Utc;
use ferreteria_api::auth::{AuthContext, Role};
use ferreteria_api::config::AppConfig;
use ferreteria_api::entities::{customer, product, product_variant, supplier, warehouse};
use ferreteria_api::{db, events, AppState};
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, DatabaseConnection, Set};

/// Fresh in-memory database with the full schema applied.
pub async fn setup_db() -> Arc<DatabaseConnection> {
    let pool = db::establish_connection("sqlite::memory:")
        .await
        .expect("connect");
    db::run_migrations(&pool).await.expect("migrate");
    Arc::new(pool)
}

/// Service graph over the given database; the event consumer runs on a
/// background task for the life of the test.
pub fn build_state(db: Arc<DatabaseConnection>, default_warehouse_id: Option<i64>) -> AppState {
    let mut config = AppConfig::for_database("sqlite::memory:");
    config.default_warehouse_id = default_warehouse_id;
    let (state, rx) = AppState::build(db, config);
    tokio::spawn(events::process_events(rx));
    state
}

pub fn admin() -> AuthContext {
    AuthContext::new(1, vec![Role::Admin])
}

pub async fn seed_warehouse(db: &DatabaseConnection, name: &str, branch: &str) -> i64 {
    warehouse::ActiveModel {
        name: Set(name.to_string()),
        branch: Set(branch.to_string()),
        created_at: Set(Utc::now()),
        ..Default::default()
    }
    .insert(db)
    .await
    .expect("seed warehouse")
    .id
}

pub async fn seed_variant(
    db: &DatabaseConnection,
    name: &str,
    unit_price: Option<Decimal>,
) -> i64 {
    let now = Utc::now();
    let prod = product::ActiveModel {
        name: Set(format!("{} product", name)),
        active: Set(true),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    }
    .insert(db)
    .await
    .expect("seed product");

    product_variant::ActiveModel {
        product_id: Set(prod.id),
        name: Set(name.to_string()),
        unit_of_measure: Set("unidad".to_string()),
        unit_price: Set(unit_price),
        created_at: Set(now),
        ..Default::default()
    }
    .insert(db)
    .await
    .expect("seed variant")
    .id
}

pub async fn seed_customer(db: &DatabaseConnection, name: &str, email: Option<&str>) -> i64 {
    let now = Utc::now();
    customer::ActiveModel {
        name: Set(name.to_string()),
        email: Set(email.map(|e| e.to_string())),
        email_normalized: Set(email.map(customer::normalize_email)),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    }
    .insert(db)
    .await
    .expect("seed customer")
    .id
}

pub async fn seed_supplier(db: &DatabaseConnection, name: &str) -> i64 {
    let now = Utc::now();
    supplier::ActiveModel {
        name: Set(name.to_string()),
        active: Set(true),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    }
    .insert(db)
    .await
    .expect("seed supplier")
    .id
}
