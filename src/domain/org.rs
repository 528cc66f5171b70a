use serde::Serialize;
use uuid::Uuid;

use super::Timestamptz;

/// An `organizations` row: the top-level tenant boundary. The raw
/// `client_id`/`client_secret` pair is handed back to the caller exactly
/// once at registration time; only their hashes are ever persisted.
#[derive(Debug, Clone, Serialize)]
pub struct Organization {
    pub org_id: Uuid,
    pub display_name: String,
    pub client_id_prefix: String,
    pub client_id_hash: String,
    pub client_secret_hash: String,
    pub is_active: bool,
    pub created_at: Timestamptz,
    pub updated_at: Timestamptz,
}
