use serde::{Deserialize, Serialize};

use crate::errors::ServiceError;

/// Roles recognized by the back office. Issued by the external auth service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::EnumString)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Admin,
    Manager,
    Warehouse,
    Seller,
    Courier,
}

/// Authenticated actor attached to every mutating operation.
///
/// Token issuance and verification live in the auth service; the core only
/// consumes the resolved identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthContext {
    pub user_id: i64,
    pub roles: Vec<Role>,
}

impl AuthContext {
    pub fn new(user_id: i64, roles: Vec<Role>) -> Self {
        Self { user_id, roles }
    }

    pub fn has_role(&self, role: Role) -> bool {
        self.roles.contains(&role) || self.roles.contains(&Role::Admin)
    }

    pub fn require_role(&self, role: Role) -> Result<(), ServiceError> {
        if self.has_role(role) {
            Ok(())
        } else {
            Err(ServiceError::Forbidden(format!(
                "user {} lacks role {}",
                self.user_id, role
            )))
        }
    }
}
