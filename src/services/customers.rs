use std::sync::Arc;

use chrono::Utc;
use sea_orm::{ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, Set};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use validator::Validate;

use crate::auth::AuthContext;
use crate::db::{transact_with_retry, DbPool};
use crate::entities::customer::{self, normalize_email, Entity as Customer};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateCustomer {
    #[validate(length(min = 1, message = "Customer name is required"))]
    pub name: String,
    pub tax_id: Option<String>,
    #[validate(email)]
    pub email: Option<String>,
    pub phone: Option<String>,
    /// Back-office user this customer belongs to, at most one customer each.
    pub user_id: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateCustomer {
    pub name: Option<String>,
    pub tax_id: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
}

fn map_unique_violation(e: sea_orm::DbErr, what: &str) -> ServiceError {
    if e.to_string().to_ascii_lowercase().contains("unique") {
        ServiceError::Conflict(format!("{} already in use", what))
    } else {
        ServiceError::DatabaseError(e)
    }
}

pub(crate) async fn find_by_email<C: ConnectionTrait>(
    conn: &C,
    email: &str,
) -> Result<Option<customer::Model>, ServiceError> {
    let normalized = normalize_email(email);
    Ok(Customer::find()
        .filter(customer::Column::EmailNormalized.eq(normalized))
        .one(conn)
        .await?)
}

/// Resolves a customer by case-folded email, creating the row when missing.
/// The unique index on the normalized column decides races; the loser re-reads.
pub(crate) async fn find_or_create_by_email<C: ConnectionTrait>(
    conn: &C,
    email: &str,
    name: &str,
    user_id: Option<i64>,
) -> Result<customer::Model, ServiceError> {
    if let Some(existing) = find_by_email(conn, email).await? {
        return Ok(existing);
    }

    let now = Utc::now();
    let inserted = customer::ActiveModel {
        name: Set(name.to_string()),
        email: Set(Some(email.trim().to_string())),
        email_normalized: Set(Some(normalize_email(email))),
        user_id: Set(user_id),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    }
    .insert(conn)
    .await;

    match inserted {
        Ok(model) => Ok(model),
        Err(e) if e.to_string().to_ascii_lowercase().contains("unique") => {
            find_by_email(conn, email)
                .await?
                .ok_or_else(|| ServiceError::Conflict("customer email already in use".into()))
        }
        Err(e) => Err(ServiceError::DatabaseError(e)),
    }
}

#[derive(Clone)]
pub struct CustomerService {
    db: Arc<DbPool>,
    event_sender: Arc<EventSender>,
}

impl CustomerService {
    pub fn new(db: Arc<DbPool>, event_sender: Arc<EventSender>) -> Self {
        Self { db, event_sender }
    }

    #[instrument(skip(self, request, _actor))]
    pub async fn create(
        &self,
        request: CreateCustomer,
        _actor: &AuthContext,
    ) -> Result<customer::Model, ServiceError> {
        request.validate()?;

        let created = transact_with_retry(&self.db, move |txn| {
            let request = request.clone();
            Box::pin(async move {
                let now = Utc::now();
                customer::ActiveModel {
                    name: Set(request.name.clone()),
                    tax_id: Set(request.tax_id.clone()),
                    email: Set(request.email.as_deref().map(|e| e.trim().to_string())),
                    email_normalized: Set(request.email.as_deref().map(normalize_email)),
                    user_id: Set(request.user_id),
                    phone: Set(request.phone.clone()),
                    created_at: Set(now),
                    updated_at: Set(now),
                    ..Default::default()
                }
                .insert(txn)
                .await
                .map_err(|e| map_unique_violation(e, "customer email or user link"))
            })
        })
        .await?;

        info!(customer_id = created.id, "customer created");
        let _ = self.event_sender.send(Event::CustomerCreated(created.id)).await;
        Ok(created)
    }

    #[instrument(skip(self, request, _actor))]
    pub async fn update(
        &self,
        customer_id: i64,
        request: UpdateCustomer,
        _actor: &AuthContext,
    ) -> Result<customer::Model, ServiceError> {
        transact_with_retry(&self.db, move |txn| {
            let request = request.clone();
            Box::pin(async move {
                let existing = Customer::find_by_id(customer_id)
                    .one(txn)
                    .await?
                    .ok_or_else(|| {
                        ServiceError::NotFound(format!("customer {} not found", customer_id))
                    })?;

                let mut active: customer::ActiveModel = existing.into();
                if let Some(name) = request.name {
                    active.name = Set(name);
                }
                if let Some(tax_id) = request.tax_id {
                    active.tax_id = Set(Some(tax_id));
                }
                if let Some(email) = request.email {
                    active.email_normalized = Set(Some(normalize_email(&email)));
                    active.email = Set(Some(email.trim().to_string()));
                }
                if let Some(phone) = request.phone {
                    active.phone = Set(Some(phone));
                }
                active.updated_at = Set(Utc::now());
                active
                    .update(txn)
                    .await
                    .map_err(|e| map_unique_violation(e, "customer email"))
            })
        })
        .await
    }

    pub async fn get(&self, customer_id: i64) -> Result<Option<customer::Model>, ServiceError> {
        Ok(Customer::find_by_id(customer_id).one(&*self.db).await?)
    }

    pub async fn find_by_email(&self, email: &str) -> Result<Option<customer::Model>, ServiceError> {
        find_by_email(&*self.db, email).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_normalization_folds_case_and_trims() {
        assert_eq!(normalize_email("  Ana.Perez@Example.COM "), "ana.perez@example.com");
    }
}
