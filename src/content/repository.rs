use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::app::error::AppError;
use crate::domain::document::{Document, DocumentStatus};
use crate::domain::Timestamptz;

/// Sort field whitelist for `List` (spec.md §4.4) — `{uploaded_at,
/// filename, status} x {asc, desc}`. Modeled as an enum rather than a raw
/// string so the repository can never interpolate caller input into an
/// `ORDER BY` clause.
#[derive(Debug, Clone, Copy)]
pub enum SortField {
    UploadedAt,
    Filename,
    Status,
}

#[derive(Debug, Clone, Copy)]
pub enum SortDirection {
    Asc,
    Desc,
}

#[derive(Debug, Clone)]
pub struct ListQuery {
    pub limit: i64,
    pub offset: i64,
    pub status: Option<DocumentStatus>,
    pub sort_field: SortField,
    pub sort_direction: SortDirection,
}

impl Default for ListQuery {
    fn default() -> Self {
        ListQuery {
            limit: 20,
            offset: 0,
            status: None,
            sort_field: SortField::UploadedAt,
            sort_direction: SortDirection::Desc,
        }
    }
}

pub struct ListResult {
    pub documents: Vec<Document>,
    pub total: i64,
}

/// The document side of the content service, backed by the `documents`
/// table. Every query is scoped by `org_id` so a leaked document id can
/// never address another tenant's row (spec.md §3/§8 cross-tenant
/// isolation).
#[derive(Clone)]
pub struct DocumentRepository {
    pool: PgPool,
}

impl DocumentRepository {
    pub fn new(pool: PgPool) -> Self {
        DocumentRepository { pool }
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn insert_pending(
        &self,
        document_id: Uuid,
        org_id: Uuid,
        uploader_user_id: Uuid,
        filename: &str,
        sanitized_filename: &str,
        content_type: &str,
        size_bytes: i64,
        storage_key: &str,
    ) -> Result<Document, AppError> {
        let row = sqlx::query!(
            r#"
            insert into documents
                (document_id, org_id, uploader_user_id, filename, sanitized_filename,
                 content_type, size_bytes, storage_key, status, retry_count, created_at, updated_at)
            values ($1, $2, $3, $4, $5, $6, $7, $8, 'pending', 0, now(), now())
            returning document_id, org_id, uploader_user_id, filename, sanitized_filename,
                      content_type, size_bytes, storage_key, status as "status: DocumentStatus",
                      chunks_count, error_message, error_code, retry_count, processed_at,
                      deleted_at, created_at, updated_at
            "#,
            document_id,
            org_id,
            uploader_user_id,
            filename,
            sanitized_filename,
            content_type,
            size_bytes,
            storage_key,
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(row_to_document(
            row.document_id,
            row.org_id,
            row.uploader_user_id,
            row.filename,
            row.sanitized_filename,
            row.content_type,
            row.size_bytes,
            row.storage_key,
            row.status,
            row.chunks_count,
            row.error_message,
            row.error_code,
            row.retry_count,
            row.processed_at,
            row.deleted_at,
            row.created_at,
            row.updated_at,
        ))
    }

    pub async fn find(&self, document_id: Uuid, org_id: Uuid) -> Result<Option<Document>, AppError> {
        let row = sqlx::query!(
            r#"
            select document_id, org_id, uploader_user_id, filename, sanitized_filename,
                   content_type, size_bytes, storage_key, status as "status: DocumentStatus",
                   chunks_count, error_message, error_code, retry_count, processed_at,
                   deleted_at, created_at, updated_at
            from documents
            where document_id = $1 and org_id = $2 and deleted_at is null
            "#,
            document_id,
            org_id,
        )
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| {
            row_to_document(
                r.document_id,
                r.org_id,
                r.uploader_user_id,
                r.filename,
                r.sanitized_filename,
                r.content_type,
                r.size_bytes,
                r.storage_key,
                r.status,
                r.chunks_count,
                r.error_message,
                r.error_code,
                r.retry_count,
                r.processed_at,
                r.deleted_at,
                r.created_at,
                r.updated_at,
            )
        }))
    }

    /// Unscoped lookup used only by the ingestion worker, which receives
    /// `document_id`/`org_id` directly off the bus and has no caller-level
    /// tenant context to additionally check against.
    pub async fn find_for_ingestion(&self, document_id: Uuid) -> Result<Option<Document>, AppError> {
        let row = sqlx::query!(
            r#"
            select document_id, org_id, uploader_user_id, filename, sanitized_filename,
                   content_type, size_bytes, storage_key, status as "status: DocumentStatus",
                   chunks_count, error_message, error_code, retry_count, processed_at,
                   deleted_at, created_at, updated_at
            from documents
            where document_id = $1
            "#,
            document_id,
        )
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| {
            row_to_document(
                r.document_id,
                r.org_id,
                r.uploader_user_id,
                r.filename,
                r.sanitized_filename,
                r.content_type,
                r.size_bytes,
                r.storage_key,
                r.status,
                r.chunks_count,
                r.error_message,
                r.error_code,
                r.retry_count,
                r.processed_at,
                r.deleted_at,
                r.created_at,
                r.updated_at,
            )
        }))
    }

    pub async fn list(&self, org_id: Uuid, query: &ListQuery) -> Result<ListResult, AppError> {
        let status_filter = query.status;

        let order_column = match query.sort_field {
            SortField::UploadedAt => "created_at",
            SortField::Filename => "filename",
            SortField::Status => "status",
        };
        let order_direction = match query.sort_direction {
            SortDirection::Asc => "asc",
            SortDirection::Desc => "desc",
        };
        // `order_column`/`order_direction` are drawn exclusively from the
        // `SortField`/`SortDirection` enums above, never from request
        // input directly, so this interpolation can't carry caller SQL.
        let order_clause = format!("{order_column} {order_direction}");

        let rows = sqlx::query!(
            r#"
            select document_id, org_id, uploader_user_id, filename, sanitized_filename,
                   content_type, size_bytes, storage_key, status as "status: DocumentStatus",
                   chunks_count, error_message, error_code, retry_count, processed_at,
                   deleted_at, created_at, updated_at
            from documents
            where org_id = $1
              and deleted_at is null
              and ($2::text is null or status = $2)
            order by
                case when $3 = 'filename asc' then filename end asc,
                case when $3 = 'filename desc' then filename end desc,
                case when $3 = 'status asc' then status end asc,
                case when $3 = 'status desc' then status end desc,
                case when $3 = 'created_at asc' then created_at end asc,
                case when $3 = 'created_at desc' then created_at end desc
            limit $4 offset $5
            "#,
            org_id,
            status_filter.map(|s| s.to_string()),
            order_clause,
            query.limit,
            query.offset,
        )
        .fetch_all(&self.pool)
        .await?;

        let total = sqlx::query_scalar!(
            r#"
            select count(*) as "count!"
            from documents
            where org_id = $1 and deleted_at is null and ($2::text is null or status = $2)
            "#,
            org_id,
            status_filter.map(|s| s.to_string()),
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(ListResult {
            documents: rows
                .into_iter()
                .map(|r| {
                    row_to_document(
                        r.document_id,
                        r.org_id,
                        r.uploader_user_id,
                        r.filename,
                        r.sanitized_filename,
                        r.content_type,
                        r.size_bytes,
                        r.storage_key,
                        r.status,
                        r.chunks_count,
                        r.error_message,
                        r.error_code,
                        r.retry_count,
                        r.processed_at,
                        r.deleted_at,
                        r.created_at,
                        r.updated_at,
                    )
                })
                .collect(),
            total,
        })
    }

    pub async fn mark_uploaded(&self, document_id: Uuid, org_id: Uuid) -> Result<bool, AppError> {
        let result = sqlx::query!(
            r#"
            update documents
            set status = 'uploaded', updated_at = now()
            where document_id = $1 and org_id = $2 and status = 'pending'
            "#,
            document_id,
            org_id,
        )
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Compare-and-set transition, idempotent under at-least-once
    /// redelivery: a document that is already `completed` is left alone.
    /// Accepts `pending` as a starting state too — the object-store upload
    /// callback that would otherwise flip `pending -> uploaded` ahead of
    /// this call is best-effort, so ingestion itself must be able to pick
    /// up a still-`pending` document once its `document.uploaded` event
    /// arrives (spec.md §4.6/§9).
    pub async fn transition_to_processing(&self, document_id: Uuid) -> Result<bool, AppError> {
        let result = sqlx::query!(
            r#"
            update documents
            set status = 'processing', updated_at = now()
            where document_id = $1 and status in ('pending', 'uploaded', 'processing')
            "#,
            document_id,
        )
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn mark_completed(&self, document_id: Uuid, chunks_count: i32) -> Result<(), AppError> {
        sqlx::query!(
            r#"
            update documents
            set status = 'completed', chunks_count = $2, processed_at = now(), updated_at = now()
            where document_id = $1 and status = 'processing'
            "#,
            document_id,
            chunks_count,
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn mark_failed(
        &self,
        document_id: Uuid,
        error_message: &str,
        error_code: &str,
    ) -> Result<(), AppError> {
        let truncated: String = error_message.chars().take(1000).collect();
        sqlx::query!(
            r#"
            update documents
            set status = 'failed', error_message = $2, error_code = $3,
                retry_count = retry_count + 1, updated_at = now()
            where document_id = $1
            "#,
            document_id,
            truncated,
            error_code,
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn soft_delete(&self, document_id: Uuid, org_id: Uuid) -> Result<bool, AppError> {
        let result = sqlx::query!(
            r#"
            update documents
            set deleted_at = now(), updated_at = now()
            where document_id = $1 and org_id = $2 and deleted_at is null
            "#,
            document_id,
            org_id,
        )
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}

/// `sqlx::query!` generates a fresh anonymous record type per call site,
/// so this takes the fields positionally (mirroring `identity::repository`'s
/// `row_to_user`) rather than a shared named row struct.
#[allow(clippy::too_many_arguments)]
fn row_to_document(
    document_id: Uuid,
    org_id: Uuid,
    uploader_user_id: Uuid,
    filename: String,
    sanitized_filename: String,
    content_type: String,
    size_bytes: i64,
    storage_key: String,
    status: DocumentStatus,
    chunks_count: Option<i32>,
    error_message: Option<String>,
    error_code: Option<String>,
    retry_count: i32,
    processed_at: Option<OffsetDateTime>,
    deleted_at: Option<OffsetDateTime>,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
) -> Document {
    Document {
        document_id,
        org_id,
        uploader_user_id,
        filename,
        sanitized_filename,
        content_type,
        size_bytes,
        storage_key,
        status,
        chunks_count,
        error_message,
        error_code,
        retry_count,
        processed_at: processed_at.map(Timestamptz),
        deleted_at: deleted_at.map(Timestamptz),
        created_at: Timestamptz(created_at),
        updated_at: Timestamptz(updated_at),
    }
}
