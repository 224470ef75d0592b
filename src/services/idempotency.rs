use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, ModelTrait, PaginatorTrait, QueryFilter, Set,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::{debug, info, instrument, warn};

use crate::db::DbPool;
use crate::entities::idempotency_record::{self, Entity as IdempotencyRecord};
use crate::errors::ServiceError;

/// Maximum accepted key length, matching the transport header contract.
const MAX_KEY_LEN: usize = 255;

/// How long a racing duplicate waits for the winner to store its response.
const IN_FLIGHT_POLL: Duration = Duration::from_millis(50);
const IN_FLIGHT_POLL_LIMIT: u32 = 60;

/// What the wrapped operation produced, or what the cache replayed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedResponse {
    pub status: u16,
    pub body: Value,
    pub replayed: bool,
}

/// Canonical JSON for hashing: object keys are emitted sorted, so two bodies
/// that differ only in key order hash identically.
pub fn canonical_json(body: &Value) -> String {
    // serde_json's default map keeps keys ordered; rebuilding the value
    // normalizes any insertion order the caller used.
    body.to_string()
}

pub fn body_hash(body: &Value) -> String {
    let mut hasher = Sha256::new();
    hasher.update(canonical_json(body).as_bytes());
    hex::encode(hasher.finalize())
}

/// At-least-once-safe wrapper for public mutations.
///
/// The first call with a key inserts an in-flight marker, runs the operation
/// and stores its response; repeats with the same key and body replay the
/// stored response verbatim, error envelopes included. A repeat with the
/// same key but a different body is rejected as a CONFLICT.
#[derive(Clone)]
pub struct IdempotencyService {
    db: Arc<DbPool>,
    ttl: chrono::Duration,
}

impl IdempotencyService {
    pub fn new(db: Arc<DbPool>, ttl_hours: i64) -> Self {
        Self {
            db,
            ttl: chrono::Duration::hours(ttl_hours),
        }
    }

    #[instrument(skip(self, body, op))]
    pub async fn execute<F, Fut>(
        &self,
        key: Option<&str>,
        route: &str,
        method: &str,
        body: &Value,
        op: F,
    ) -> Result<CachedResponse, ServiceError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<(u16, Value), ServiceError>>,
    {
        let Some(key) = key else {
            // No key, no caching; the operation still runs.
            return Ok(run_to_response(op).await);
        };
        if key.is_empty() || key.len() > MAX_KEY_LEN {
            return Err(ServiceError::InvalidInput(format!(
                "idempotency key must be 1..={} characters",
                MAX_KEY_LEN
            )));
        }

        let hash = body_hash(body);

        // A missing storage table degrades to a warning, never a failure.
        let existing = match self.find_record(key).await {
            Ok(existing) => existing,
            Err(e) => {
                warn!(error = %e, "idempotency storage unavailable, executing uncached");
                return Ok(run_to_response(op).await);
            }
        };

        if let Some(record) = existing {
            if record.expires_at < Utc::now() {
                debug!(key, "expired idempotency record, replacing");
                record.delete(&*self.db).await?;
            } else {
                return self.replay_or_conflict(key, record, route, method, &hash).await;
            }
        }

        match self.insert_marker(key, route, method, &hash).await {
            Ok(()) => {}
            Err(e) if e.to_string().to_ascii_lowercase().contains("unique") => {
                // Lost the race; the winner is executing right now.
                let record = self
                    .find_record(key)
                    .await?
                    .ok_or_else(|| ServiceError::Conflict("idempotency key vanished".into()))?;
                return self.replay_or_conflict(key, record, route, method, &hash).await;
            }
            Err(e) => return Err(ServiceError::DatabaseError(e)),
        }

        let response = run_to_response(op).await;
        self.store_response(key, &response).await?;
        Ok(response)
    }

    async fn replay_or_conflict(
        &self,
        key: &str,
        record: idempotency_record::Model,
        route: &str,
        method: &str,
        hash: &str,
    ) -> Result<CachedResponse, ServiceError> {
        if record.route != route || record.method != method || record.body_hash != hash {
            return Err(ServiceError::Conflict(
                "idempotency key was already used for a different request".into(),
            ));
        }

        let mut record = record;
        let mut polls = 0;
        while record.response_status.is_none() {
            if polls >= IN_FLIGHT_POLL_LIMIT {
                return Err(ServiceError::Retryable(
                    "original request is still in flight".into(),
                ));
            }
            tokio::time::sleep(IN_FLIGHT_POLL).await;
            polls += 1;
            record = self
                .find_record(key)
                .await?
                .ok_or_else(|| ServiceError::Conflict("idempotency key vanished".into()))?;
        }

        let status = record.response_status.unwrap_or(500) as u16;
        let body = record
            .response_body
            .as_deref()
            .map(serde_json::from_str)
            .transpose()
            .map_err(|e| ServiceError::Internal(format!("stored response corrupt: {}", e)))?
            .unwrap_or(Value::Null);

        info!(key, status, "idempotent replay");
        Ok(CachedResponse {
            status,
            body,
            replayed: true,
        })
    }

    async fn find_record(
        &self,
        key: &str,
    ) -> Result<Option<idempotency_record::Model>, sea_orm::DbErr> {
        IdempotencyRecord::find()
            .filter(idempotency_record::Column::Key.eq(key))
            .one(&*self.db)
            .await
    }

    async fn insert_marker(
        &self,
        key: &str,
        route: &str,
        method: &str,
        hash: &str,
    ) -> Result<(), sea_orm::DbErr> {
        let now = Utc::now();
        idempotency_record::ActiveModel {
            key: Set(key.to_string()),
            route: Set(route.to_string()),
            method: Set(method.to_string()),
            body_hash: Set(hash.to_string()),
            response_status: Set(None),
            response_body: Set(None),
            expires_at: Set(now + self.ttl),
            created_at: Set(now),
            ..Default::default()
        }
        .insert(&*self.db)
        .await?;
        Ok(())
    }

    async fn store_response(
        &self,
        key: &str,
        response: &CachedResponse,
    ) -> Result<(), ServiceError> {
        let record = self
            .find_record(key)
            .await?
            .ok_or_else(|| ServiceError::Internal("idempotency marker vanished".into()))?;
        let mut active: idempotency_record::ActiveModel = record.into();
        active.response_status = Set(Some(response.status as i32));
        active.response_body = Set(Some(response.body.to_string()));
        active.update(&*self.db).await?;
        Ok(())
    }

    /// Removes records past their TTL. Returns how many were dropped.
    #[instrument(skip(self))]
    pub async fn purge_expired(&self) -> Result<u64, ServiceError> {
        let result = IdempotencyRecord::delete_many()
            .filter(idempotency_record::Column::ExpiresAt.lt(Utc::now()))
            .exec(&*self.db)
            .await?;
        if result.rows_affected > 0 {
            info!(purged = result.rows_affected, "expired idempotency records purged");
        }
        Ok(result.rows_affected)
    }

    /// Live record count, for operational visibility.
    pub async fn record_count(&self) -> Result<u64, ServiceError> {
        Ok(IdempotencyRecord::find().count(&*self.db).await?)
    }
}

/// Runs the operation, folding a domain error into the same envelope shape
/// the transport would emit, so replays are indistinguishable from the
/// original response.
async fn run_to_response<F, Fut>(op: F) -> CachedResponse
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<(u16, Value), ServiceError>>,
{
    match op().await {
        Ok((status, body)) => CachedResponse {
            status,
            body,
            replayed: false,
        },
        Err(err) => CachedResponse {
            status: err.status_code().as_u16(),
            body: serde_json::json!({
                "error": err.status_code().canonical_reason().unwrap_or("Error"),
                "message": err.response_message(),
                "code": err.code(),
            }),
            replayed: false,
        },
    }
}
