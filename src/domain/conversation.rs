use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Timestamptz;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize)]
pub struct Conversation {
    pub conversation_id: Uuid,
    pub org_id: Uuid,
    pub user_id: Uuid,
    pub title: Option<String>,
    pub message_count: i32,
    pub created_at: Timestamptz,
    pub updated_at: Timestamptz,
}

/// A retrieved-passage attribution attached to an assistant message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceRef {
    pub document_id: Uuid,
    pub filename: String,
    pub excerpt: String,
    pub score: f32,
}

#[derive(Debug, Clone, Serialize)]
pub struct Message {
    pub message_id: Uuid,
    pub conversation_id: Uuid,
    pub role: MessageRole,
    pub content: String,
    pub sources: Vec<SourceRef>,
    pub created_at: Timestamptz,
}
