use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Replay cache row for at-least-once-safe public mutations.
///
/// Inserted as an in-flight marker (`response_status` null) before the
/// wrapped operation executes, then completed with the serialized response.
/// Rows expire after the configured TTL and are purged opportunistically.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "idempotency_records")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    #[sea_orm(unique)]
    pub key: String,
    pub route: String,
    pub method: String,
    /// SHA-256 of the canonical JSON request body, hex-encoded.
    pub body_hash: String,
    pub response_status: Option<i32>,
    #[sea_orm(column_type = "Text", nullable)]
    pub response_body: Option<String>,
    pub expires_at: DateTimeUtc,
    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
