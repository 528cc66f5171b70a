use axum::{extract::FromRequestParts, http::request::Parts};
use uuid::Uuid;

use crate::app::{error::AppError, ApiContext};
use crate::domain::user::Role;

/// Attached to the request by the HMAC gate once the organization has
/// been resolved from `X-Client-ID`.
#[derive(Debug, Clone)]
pub struct OrgContext {
    pub org_id: Uuid,
    pub org_name: String,
}

impl FromRequestParts<ApiContext> for OrgContext {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &ApiContext,
    ) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<OrgContext>()
            .cloned()
            .ok_or(AppError::MissingHmacHeader)
    }
}

/// Attached to the request by the bearer gate. Present only on routes that
/// run `bearer_required` after `hmac_required`.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub org_id: Uuid,
    pub role: Role,
}

impl AuthUser {
    pub fn require_role(&self, minimum: Role) -> Result<(), AppError> {
        if self.role.at_least(minimum) {
            Ok(())
        } else {
            Err(AppError::InsufficientPermission)
        }
    }

    pub fn is_self_or_admin(&self, subject_user_id: Uuid) -> bool {
        self.user_id == subject_user_id || self.role.at_least(Role::Admin)
    }
}

impl FromRequestParts<ApiContext> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &ApiContext,
    ) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthUser>()
            .cloned()
            .ok_or(AppError::MissingAuthHeader)
    }
}
