use std::sync::Arc;

use regex::Regex;
use serde_json::json;
use sqlx::PgPool;
use std::sync::OnceLock;
use uuid::Uuid;

use crate::app::error::AppError;
use crate::domain::audit::actions;
use crate::domain::document::{namespace_for_org, Document, DocumentStatus};
use crate::events::outbox::OutboxRepository;
use crate::events::{DocumentUploadedEvent, EventBus, TOPIC_DOCUMENT_UPLOADED};
use crate::identity::repository::CredentialRepository;
use crate::storage::{ObjectStore, PresignedUpload};
use crate::vectorstore::VectorIndex;

use super::repository::{DocumentRepository, ListQuery, ListResult};

/// Minimum lifetime for an issued upload URL (spec.md §4.4: "a time-limited
/// (>= 15 min) upload URL").
const MIN_UPLOAD_URL_TTL_SECONDS: u64 = 15 * 60;

fn sanitize_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"[^A-Za-z0-9._-]+").expect("static sanitize pattern is valid"))
}

/// Filename sanitization per spec.md §4.4: replace runs of anything
/// outside `[A-Za-z0-9._-]` with a single `_`, then trim to 255 bytes.
pub fn sanitize_filename(filename: &str) -> String {
    let replaced = sanitize_pattern().replace_all(filename, "_");
    replaced.chars().take(255).collect()
}

fn extension_of(filename: &str) -> &str {
    filename.rsplit_once('.').map(|(_, ext)| ext).unwrap_or("bin")
}

pub struct IssuedUpload {
    pub document_id: Uuid,
    pub upload_url: String,
    pub expires_in: u64,
}

/// The content service (spec.md §4.4): document metadata CRUD, upload URL
/// issuance, and the lifecycle updates the ingestion worker drives through
/// `document.processed`/`document.failed` events.
#[derive(Clone)]
pub struct ContentService {
    documents: DocumentRepository,
    audit: CredentialRepository,
    storage: Arc<dyn ObjectStore>,
    bus: Arc<dyn EventBus>,
    outbox: Arc<OutboxRepository>,
    vector_index: Arc<dyn VectorIndex>,
    allowed_content_types: Vec<String>,
    max_file_size: i64,
}

impl ContentService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        pool: PgPool,
        storage: Arc<dyn ObjectStore>,
        bus: Arc<dyn EventBus>,
        outbox: Arc<OutboxRepository>,
        vector_index: Arc<dyn VectorIndex>,
        allowed_content_types: Vec<String>,
        max_file_size: i64,
    ) -> Self {
        ContentService {
            documents: DocumentRepository::new(pool.clone()),
            audit: CredentialRepository::new(pool),
            storage,
            bus,
            outbox,
            vector_index,
            allowed_content_types,
            max_file_size,
        }
    }

    fn content_type_allowed(&self, content_type: &str) -> bool {
        let normalized = content_type.to_ascii_lowercase();
        self.allowed_content_types.iter().any(|allowed| {
            normalized == *allowed
                || normalized == format!("application/{allowed}")
                || (allowed == "txt" && normalized == "text/plain")
                || (allowed == "md" && normalized == "text/markdown")
                || (allowed == "docx"
                    && normalized
                        == "application/vnd.openxmlformats-officedocument.wordprocessingml.document")
        })
    }

    /// `IssueUpload` (spec.md §4.4). On event-publish failure the document
    /// row is still created and the response still succeeds — the event
    /// lands in the outbox instead (spec.md §4.5/§9).
    #[tracing::instrument(name = "Issue upload", skip_all, fields(%org_id, %user_id, filename = %filename))]
    pub async fn issue_upload(
        &self,
        org_id: Uuid,
        user_id: Uuid,
        filename: &str,
        content_type: &str,
        file_size: Option<i64>,
    ) -> Result<IssuedUpload, AppError> {
        if !self.content_type_allowed(content_type) {
            return Err(AppError::InvalidFileType);
        }

        if let Some(size) = file_size {
            if size > self.max_file_size {
                return Err(AppError::FileTooLarge);
            }
        }

        let sanitized = sanitize_filename(filename);
        let document_id = Uuid::new_v4();
        let ext = extension_of(&sanitized);
        let storage_key = format!("{org_id}/documents/{document_id}.{ext}");

        let document = self
            .documents
            .insert_pending(
                document_id,
                org_id,
                user_id,
                filename,
                &sanitized,
                content_type,
                file_size.unwrap_or(0),
                &storage_key,
            )
            .await?;

        let presigned: PresignedUpload = self
            .storage
            .presign_upload(&storage_key, content_type, MIN_UPLOAD_URL_TTL_SECONDS)
            .await?;

        let event = DocumentUploadedEvent::new(
            document.document_id,
            org_id,
            storage_key.clone(),
            content_type.to_string(),
            filename.to_string(),
        );
        let payload = serde_json::to_value(&event).map_err(|e| anyhow::anyhow!(e))?;

        if let Err(publish_err) = self
            .bus
            .publish(TOPIC_DOCUMENT_UPLOADED, &document.document_id.to_string(), &payload)
            .await
        {
            tracing::warn!(error = ?publish_err, "document.uploaded publish failed, recording to outbox");
            self.outbox
                .record_failure(TOPIC_DOCUMENT_UPLOADED, &payload, &publish_err.to_string())
                .await?;
        }

        self.audit
            .record_audit(
                org_id,
                Some(user_id),
                actions::DOCUMENT_UPLOAD_ISSUED,
                "document",
                "success",
                json!({ "document_id": document.document_id, "filename": filename }),
            )
            .await?;

        Ok(IssuedUpload {
            document_id: document.document_id,
            upload_url: presigned.url,
            expires_in: presigned.expires_in,
        })
    }

    pub async fn list(&self, org_id: Uuid, query: ListQuery) -> Result<ListResult, AppError> {
        self.documents.list(org_id, &query).await
    }

    pub async fn get_status(&self, document_id: Uuid, org_id: Uuid) -> Result<Document, AppError> {
        self.documents
            .find(document_id, org_id)
            .await?
            .ok_or(AppError::DocumentNotFound)
    }

    /// Admin-only soft delete. Schedules best-effort object deletion and
    /// purges the tenant's vector namespace is left to the owning
    /// document's chunks only when the whole namespace is retired
    /// (`delete_namespace` purges everything in `org_{org_id}`, so it is
    /// never called here for a single-document delete).
    #[tracing::instrument(name = "Delete document", skip_all, fields(%document_id, %org_id))]
    pub async fn delete(&self, document_id: Uuid, org_id: Uuid, actor_user_id: Uuid) -> Result<(), AppError> {
        let document = self
            .documents
            .find(document_id, org_id)
            .await?
            .ok_or(AppError::DocumentNotFound)?;

        if !self.documents.soft_delete(document_id, org_id).await? {
            return Err(AppError::DocumentNotFound);
        }

        if let Err(e) = self.storage.delete(&document.storage_key).await {
            tracing::warn!(error = ?e, "best-effort object deletion failed");
        }

        self.audit
            .record_audit(
                org_id,
                Some(actor_user_id),
                actions::DOCUMENT_DELETED,
                "document",
                "success",
                json!({ "document_id": document_id }),
            )
            .await?;

        Ok(())
    }

    /// `MarkUploaded` (spec.md §4.4): called by the object-store upload
    /// callback once the client's PUT to the presigned URL completes,
    /// transitioning `pending -> uploaded`. 404s rather than no-ops on an
    /// unknown/cross-tenant document so the caller can't probe for ids
    /// outside its own org.
    pub async fn mark_uploaded(&self, document_id: Uuid, org_id: Uuid) -> Result<(), AppError> {
        if self.documents.mark_uploaded(document_id, org_id).await? {
            Ok(())
        } else {
            Err(AppError::DocumentNotFound)
        }
    }

    /// Purges an org's entire vector namespace, used by the "replay" admin
    /// action when an operator explicitly wants to reprocess from scratch
    /// (spec.md §4.6 invariant: no implicit `completed -> processing`
    /// regression without one).
    pub async fn purge_namespace(&self, org_id: Uuid) -> Result<(), AppError> {
        self.vector_index.delete_namespace(&namespace_for_org(org_id)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collapses_runs_of_unsafe_characters() {
        assert_eq!(sanitize_filename("my report (final)!!.pdf"), "my_report_final_.pdf");
    }

    #[test]
    fn trims_to_255_characters() {
        let long_name = "a".repeat(300);
        assert_eq!(sanitize_filename(&long_name).len(), 255);
    }

    #[test]
    fn extension_falls_back_to_bin_without_a_dot() {
        assert_eq!(extension_of("noext"), "bin");
        assert_eq!(extension_of("report.pdf"), "pdf");
    }
}
