use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Timestamptz;

/// The document lifecycle state machine of spec.md §4.6. Transitions are
/// checked by [`DocumentStatus::can_transition_to`]; status mutations are
/// compare-and-set against the currently stored value so at-least-once
/// event redelivery can never regress a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum DocumentStatus {
    Pending,
    Uploaded,
    Processing,
    Completed,
    Failed,
}

impl DocumentStatus {
    /// Validates one edge of the DAG in spec.md §4.6. A document that is
    /// already in a terminal state accepts a no-op "transition" to itself
    /// (idempotent replay), but never regresses.
    pub fn can_transition_to(&self, next: DocumentStatus) -> bool {
        use DocumentStatus::*;
        match (self, next) {
            (a, b) if *a == b => true,
            (Pending, Uploaded) => true,
            (Uploaded, Processing) => true,
            (Processing, Completed) => true,
            (Processing, Failed) => true,
            _ => false,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, DocumentStatus::Completed | DocumentStatus::Failed)
    }
}

impl std::fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            DocumentStatus::Pending => "pending",
            DocumentStatus::Uploaded => "uploaded",
            DocumentStatus::Processing => "processing",
            DocumentStatus::Completed => "completed",
            DocumentStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// A `documents` row. `org_id` is immutable once set; the storage key is
/// namespaced by org so a leaked key can never address another tenant's
/// bytes.
#[derive(Debug, Clone, Serialize)]
pub struct Document {
    pub document_id: Uuid,
    pub org_id: Uuid,
    pub uploader_user_id: Uuid,
    pub filename: String,
    pub sanitized_filename: String,
    pub content_type: String,
    pub size_bytes: i64,
    pub storage_key: String,
    pub status: DocumentStatus,
    pub chunks_count: Option<i32>,
    pub error_message: Option<String>,
    pub error_code: Option<String>,
    pub retry_count: i32,
    pub processed_at: Option<Timestamptz>,
    pub deleted_at: Option<Timestamptz>,
    pub created_at: Timestamptz,
    pub updated_at: Timestamptz,
}

impl Document {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Derived `processing_time_seconds` for a completed document.
    pub fn processing_time_seconds(&self) -> Option<i64> {
        let processed = self.processed_at?;
        Some((processed.0 - self.created_at.0).whole_seconds())
    }
}

/// A single chunk's embedding record as upserted into the vector index.
/// Identity is `{document_id}_{chunk_index}`, which also makes upserts
/// idempotent under redelivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub org_id: Uuid,
    pub document_id: Uuid,
    pub chunk_index: usize,
    pub total_chunks: usize,
    pub text: String,
    pub filename: String,
    pub uploaded_at: String,
}

#[derive(Debug, Clone)]
pub struct ChunkVector {
    pub id: String,
    pub values: Vec<f32>,
    pub metadata: ChunkMetadata,
}

impl ChunkVector {
    pub fn key(document_id: Uuid, chunk_index: usize) -> String {
        format!("{document_id}_{chunk_index}")
    }
}

pub fn namespace_for_org(org_id: Uuid) -> String {
    format!("org_{org_id}")
}
