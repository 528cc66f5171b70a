use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use super::Timestamptz;

/// Append-only `audit_entries` row. Security-relevant entries
/// (`LOGIN_FAILED_ACCOUNT_LOCKED`, `TOKEN_REUSE_DETECTED`, `LOGIN_SUCCESS`)
/// are written in the same transaction as the state change they describe,
/// so an audit entry is never lost relative to the event it records.
#[derive(Debug, Clone, Serialize)]
pub struct AuditEntry {
    pub id: Uuid,
    pub org_id: Uuid,
    pub user_id: Option<Uuid>,
    pub action: String,
    pub resource: String,
    pub status: String,
    pub details: Value,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: Timestamptz,
}

/// Well-known audit action names referenced directly by spec.md §4.2/§8.
pub mod actions {
    pub const LOGIN_SUCCESS: &str = "LOGIN_SUCCESS";
    pub const LOGIN_FAILED: &str = "LOGIN_FAILED";
    pub const LOGIN_FAILED_ACCOUNT_LOCKED: &str = "LOGIN_FAILED_ACCOUNT_LOCKED";
    pub const TOKEN_REUSE_DETECTED: &str = "TOKEN_REUSE_DETECTED";
    pub const TOKEN_REFRESHED: &str = "TOKEN_REFRESHED";
    pub const LOGOUT: &str = "LOGOUT";
    pub const ORG_REGISTERED: &str = "ORG_REGISTERED";
    pub const DOCUMENT_UPLOAD_ISSUED: &str = "DOCUMENT_UPLOAD_ISSUED";
    pub const DOCUMENT_DELETED: &str = "DOCUMENT_DELETED";
}
