use uuid::Uuid;

use super::Timestamptz;

/// A `refresh_tokens` row. At most one non-revoked record exists per
/// issued refresh token; rotation revokes the old record in the same
/// transaction that inserts the new one.
#[derive(Debug, Clone)]
pub struct RefreshTokenRecord {
    pub token_id: Uuid,
    pub user_id: Uuid,
    pub org_id: Uuid,
    pub token_hash: String,
    pub expires_at: Timestamptz,
    pub revoked: bool,
    pub revoked_at: Option<Timestamptz>,
    pub created_at: Timestamptz,
}

impl RefreshTokenRecord {
    pub fn is_valid(&self, now: time::OffsetDateTime) -> bool {
        !self.revoked && self.expires_at.0 > now
    }
}
