//! Event bus adapter (spec.md §4.5/§6.4). Delivery is at-least-once;
//! every consumer is idempotent keyed by `document_id`. A publish failure
//! never drops an event silently — it lands in the `failed_events` outbox
//! instead (`outbox`).

pub mod kafka;
pub mod memory;
pub mod outbox;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::{format_description::well_known::Rfc3339, OffsetDateTime};
use uuid::Uuid;

use crate::app::error::AppError;

pub const TOPIC_DOCUMENT_UPLOADED: &str = "document.uploaded";
pub const TOPIC_DOCUMENT_PROCESSED: &str = "document.processed";
pub const TOPIC_DOCUMENT_FAILED: &str = "document.failed";

fn now_rfc3339() -> String {
    OffsetDateTime::now_utc().format(&Rfc3339).unwrap_or_default()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentUploadedEvent {
    pub event_type: &'static str,
    pub document_id: Uuid,
    pub org_id: Uuid,
    pub s3_key: String,
    pub content_type: String,
    pub filename: String,
    pub uploaded_at: String,
    pub timestamp: String,
}

impl DocumentUploadedEvent {
    pub fn new(
        document_id: Uuid,
        org_id: Uuid,
        s3_key: String,
        content_type: String,
        filename: String,
    ) -> Self {
        let uploaded_at = now_rfc3339();
        DocumentUploadedEvent {
            event_type: "document.uploaded",
            document_id,
            org_id,
            s3_key,
            content_type,
            filename,
            uploaded_at: uploaded_at.clone(),
            timestamp: uploaded_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentProcessedEvent {
    pub event_type: &'static str,
    pub document_id: Uuid,
    pub org_id: Uuid,
    pub status: &'static str,
    pub chunks_count: i32,
    pub timestamp: String,
}

impl DocumentProcessedEvent {
    pub fn new(document_id: Uuid, org_id: Uuid, chunks_count: i32) -> Self {
        DocumentProcessedEvent {
            event_type: "document.processed",
            document_id,
            org_id,
            status: "completed",
            chunks_count,
            timestamp: now_rfc3339(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentFailedEvent {
    pub event_type: &'static str,
    pub document_id: Uuid,
    pub org_id: Uuid,
    pub error_message: String,
    pub error_code: Option<String>,
    pub timestamp: String,
}

impl DocumentFailedEvent {
    pub fn new(document_id: Uuid, org_id: Uuid, error_message: String, error_code: Option<String>) -> Self {
        DocumentFailedEvent {
            event_type: "document.failed",
            document_id,
            org_id,
            error_message,
            error_code,
            timestamp: now_rfc3339(),
        }
    }
}

/// A message handed to a consumer loop, prior to commit.
#[derive(Debug, Clone)]
pub struct IncomingEvent {
    pub topic: String,
    pub payload: Value,
    /// Opaque offset handle the bus implementation needs to commit this
    /// message; consumers never interpret it.
    pub offset_token: String,
}

/// The event bus boundary. `publish` is used by the content service and
/// ingestion worker's terminal step; `subscribe` returns a boxed consumer
/// the ingestion worker polls in a loop, committing only after processing
/// completes without exception (spec.md §4.5).
#[async_trait]
pub trait EventBus: Send + Sync {
    async fn publish(&self, topic: &str, key: &str, payload: &Value) -> Result<(), AppError>;

    async fn subscribe(&self, topic: &str) -> Result<Box<dyn EventConsumer>, AppError>;
}

#[async_trait]
pub trait EventConsumer: Send {
    /// Blocks until the next message arrives, or returns `None` when the
    /// bus has been told to stop (used to implement graceful shutdown).
    async fn recv(&mut self) -> Option<IncomingEvent>;

    async fn commit(&mut self, event: &IncomingEvent) -> Result<(), AppError>;
}
