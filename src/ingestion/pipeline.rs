use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use uuid::Uuid;

use crate::app::error::AppError;
use crate::content::repository::DocumentRepository;
use crate::domain::document::{namespace_for_org, ChunkMetadata, ChunkVector, Document};
use crate::events::{DocumentFailedEvent, DocumentProcessedEvent, EventBus, TOPIC_DOCUMENT_FAILED, TOPIC_DOCUMENT_PROCESSED};
use crate::llm::{validate_vectors, EmbeddingClient};
use crate::storage::ObjectStore;
use crate::vectorstore::VectorIndex;

use super::chunker;
use super::parser;

/// Embed-step retry policy (spec.md §4.6 step 5: "exponential backoff with
/// jitter" around the batch embedding call before falling back to
/// per-item calls).
const EMBED_MAX_ATTEMPTS: u32 = 3;
const EMBED_BASE_BACKOFF_MS: u64 = 1000;

/// Vector upserts are sent in bounded batches so a single oversized
/// document doesn't produce one giant request to the index.
const UPSERT_BATCH_SIZE: usize = 100;

/// Upsert-step retry policy (spec.md §4.6 step 6: retry transport errors
/// with backoff, fail fast on `DIMENSION_MISMATCH`).
const UPSERT_MAX_ATTEMPTS: u32 = 3;

/// The two field-name spellings the per-item embedding fallback tries in
/// turn, matching the heterogeneous shapes normalized in `llm`.
const EMBED_FIELD_NAMES: [&str; 2] = ["input", "text"];

pub struct PipelineConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub embedding_dimensions: usize,
    pub embedding_batch_size: usize,
}

/// The dependencies one pipeline run needs; the worker constructs this once
/// and shares it (behind `Arc`s) across every concurrently processed job.
pub struct Pipeline {
    pub documents: DocumentRepository,
    pub storage: Arc<dyn ObjectStore>,
    pub embedding_client: Arc<dyn EmbeddingClient>,
    pub vector_index: Arc<dyn VectorIndex>,
    pub bus: Arc<dyn EventBus>,
    pub config: PipelineConfig,
}

impl Pipeline {
    /// Runs the full fetch -> parse -> chunk -> embed -> upsert sequence
    /// for one document (spec.md §4.6 steps 1-7). The terminal status write
    /// and event emission always happen before returning, but a processing
    /// failure is rethrown after that so the consumer can apply its own
    /// retry/DLQ policy on the underlying error (spec.md §4.6 step 7);
    /// redelivery is safe regardless, since the CAS transitions make
    /// reprocessing an already-terminal document a no-op.
    #[tracing::instrument(name = "Process document", skip(self), fields(%document_id))]
    pub async fn process(&self, document_id: Uuid) -> Result<(), AppError> {
        let document = self
            .documents
            .find_for_ingestion(document_id)
            .await?
            .ok_or(AppError::DocumentNotFound)?;

        if document.status.is_terminal() {
            tracing::info!(status = %document.status, "document already in a terminal state, skipping");
            return Ok(());
        }

        if !self.documents.transition_to_processing(document_id).await? {
            tracing::info!("could not acquire processing transition, another worker may own this document");
            return Ok(());
        }

        match self.run(&document).await {
            Ok(chunks_count) => {
                self.documents.mark_completed(document_id, chunks_count).await?;
                self.emit_processed(&document, chunks_count).await;
                Ok(())
            }
            Err(err) => {
                let error_code = err.code();
                self.documents
                    .mark_failed(document_id, &err.to_string(), error_code)
                    .await?;
                self.emit_failed(&document, &err, error_code).await;
                Err(err)
            }
        }
    }

    async fn run(&self, document: &Document) -> Result<i32, AppError> {
        let bytes = self.storage.fetch(&document.storage_key).await?;
        let text = parser::parse(&document.content_type, &bytes)?;

        let chunks = chunker::split(&text, self.config.chunk_size, self.config.chunk_overlap);
        if chunks.is_empty() {
            return Err(AppError::InsufficientText);
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = self.embed_with_fallback(&texts).await?;
        validate_vectors(&vectors, self.config.embedding_dimensions)?;

        let uploaded_at = document.created_at.0.to_string();
        let records: Vec<ChunkVector> = chunks
            .iter()
            .zip(vectors.into_iter())
            .map(|(chunk, values)| ChunkVector {
                id: ChunkVector::key(document.document_id, chunk.chunk_index),
                values,
                metadata: ChunkMetadata {
                    org_id: document.org_id,
                    document_id: document.document_id,
                    chunk_index: chunk.chunk_index,
                    total_chunks: chunks.len(),
                    text: chunk.text.clone(),
                    filename: document.sanitized_filename.clone(),
                    uploaded_at: uploaded_at.clone(),
                },
            })
            .collect();

        let namespace = namespace_for_org(document.org_id);
        for batch in records.chunks(UPSERT_BATCH_SIZE) {
            self.upsert_with_retry(&namespace, batch).await?;
        }

        Ok(chunks.len() as i32)
    }

    /// Retries transport failures with backoff; a `DIMENSION_MISMATCH`
    /// fails fast since no amount of retrying fixes a bad embedding
    /// (spec.md §4.6 step 6).
    async fn upsert_with_retry(&self, namespace: &str, batch: &[ChunkVector]) -> Result<(), AppError> {
        let mut last_err = AppError::VectorUpsertUnreachable;
        for attempt in 0..UPSERT_MAX_ATTEMPTS {
            match self.vector_index.upsert(namespace, batch).await {
                Ok(()) => return Ok(()),
                Err(AppError::DimensionMismatch) => return Err(AppError::DimensionMismatch),
                Err(e) => {
                    last_err = e;
                    if attempt + 1 < UPSERT_MAX_ATTEMPTS {
                        tokio::time::sleep(backoff_with_jitter(attempt)).await;
                    }
                }
            }
        }
        Err(last_err)
    }

    /// Embeds `texts` in `embedding_batch_size`-sized groups, retrying each
    /// group with backoff; a group whose call still fails or returns a
    /// mismatched count falls back to embedding its chunks one at a time,
    /// trying both observed field-name spellings, so one malformed chunk
    /// never fails the rest of the document (spec.md §4.6 step 5).
    async fn embed_with_fallback(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, AppError> {
        let mut vectors = Vec::with_capacity(texts.len());
        for group in texts.chunks(self.config.embedding_batch_size.max(1)) {
            match self.embed_batch_with_retry(group).await {
                Ok(group_vectors) if group_vectors.len() == group.len() => vectors.extend(group_vectors),
                Ok(_) | Err(_) => {
                    for text in group {
                        vectors.push(self.embed_one_with_fallback_fields(text).await?);
                    }
                }
            }
        }
        Ok(vectors)
    }

    async fn embed_batch_with_retry(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, AppError> {
        let mut last_err = AppError::EmbeddingFailed;
        for attempt in 0..EMBED_MAX_ATTEMPTS {
            match self.embedding_client.embed_batch(texts).await {
                Ok(vectors) => return Ok(vectors),
                Err(e) => {
                    last_err = e;
                    if attempt + 1 < EMBED_MAX_ATTEMPTS {
                        tokio::time::sleep(backoff_with_jitter(attempt)).await;
                    }
                }
            }
        }
        Err(last_err)
    }

    async fn embed_one_with_fallback_fields(&self, text: &str) -> Result<Vec<f32>, AppError> {
        let mut last_err = AppError::EmbeddingFailed;
        for field_name in EMBED_FIELD_NAMES {
            match self.embedding_client.embed_one(text, field_name).await {
                Ok(vector) => return Ok(vector),
                Err(e) => last_err = e,
            }
        }
        Err(last_err)
    }

    async fn emit_processed(&self, document: &Document, chunks_count: i32) {
        let event = DocumentProcessedEvent::new(document.document_id, document.org_id, chunks_count);
        if let Ok(payload) = serde_json::to_value(&event) {
            if let Err(e) = self
                .bus
                .publish(TOPIC_DOCUMENT_PROCESSED, &document.document_id.to_string(), &payload)
                .await
            {
                tracing::warn!(error = ?e, "failed to publish document.processed");
            }
        }
    }

    async fn emit_failed(&self, document: &Document, err: &AppError, error_code: &str) {
        let event = DocumentFailedEvent::new(
            document.document_id,
            document.org_id,
            err.to_string(),
            Some(error_code.to_string()),
        );
        if let Ok(payload) = serde_json::to_value(&event) {
            if let Err(e) = self
                .bus
                .publish(TOPIC_DOCUMENT_FAILED, &document.document_id.to_string(), &payload)
                .await
            {
                tracing::warn!(error = ?e, "failed to publish document.failed");
            }
        }
    }
}

fn backoff_with_jitter(attempt: u32) -> Duration {
    let base = EMBED_BASE_BACKOFF_MS * 2u64.pow(attempt);
    let jitter = rand::thread_rng().gen_range(0..=base / 2);
    Duration::from_millis(base + jitter)
}
