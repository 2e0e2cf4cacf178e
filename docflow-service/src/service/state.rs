//! Caller identity carried through service operations.

use serde::{Deserialize, Serialize};

use crate::error::{ServiceError, ServiceResult};

/// The authenticated caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserContext {
    pub user_id: String,
    #[serde(default)]
    pub is_admin: bool,
}

impl UserContext {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            is_admin: false,
        }
    }

    pub fn admin(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            is_admin: true,
        }
    }

    /// Allow the owner of a resource, or an admin
    pub fn require_ownership(&self, owner_id: &str) -> ServiceResult<()> {
        if self.is_admin || self.user_id == owner_id {
            Ok(())
        } else {
            Err(ServiceError::Forbidden)
        }
    }
}
