//! Document routes (spec.md §6.1 `/v1/documents/*`): bearer-gated only —
//! no HMAC stage, matching the table in spec.md §6.1 exactly (unlike the
//! chat routes, which require both).

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::Router;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::app::error::AppError;
use crate::app::extractor::AuthUser;
use crate::app::response::{ApiResponse, StatusApiResponse};
use crate::app::validated_json::ValidatedJson;
use crate::app::ApiContext;
use crate::content::repository::{ListQuery, SortDirection, SortField};
use crate::domain::document::{Document, DocumentStatus};
use crate::domain::user::Role;

pub fn router() -> Router<ApiContext> {
    Router::new()
        .route("/v1/documents/upload", post(issue_upload))
        .route("/v1/documents", get(list_documents))
        .route("/v1/documents/{id}/status", get(document_status))
        .route("/v1/documents/{id}", axum::routing::delete(delete_document))
        .route("/v1/documents/{id}/uploaded", post(mark_uploaded))
}

#[derive(Debug, Deserialize, Validate)]
struct IssueUploadRequest {
    #[validate(length(min = 1, max = 255))]
    filename: String,
    #[validate(length(min = 1))]
    content_type: String,
    file_size: Option<i64>,
}

#[derive(Debug, Serialize)]
struct IssueUploadResponse {
    document_id: Uuid,
    upload_url: String,
    expires_in: u64,
}

/// `POST /v1/documents/upload` (spec.md §4.4): admin-and-above only.
#[tracing::instrument(name = "Issue upload", skip_all, fields(org_id = %user.org_id, filename = %req.filename))]
async fn issue_upload(
    ctx: State<ApiContext>,
    user: AuthUser,
    ValidatedJson(req): ValidatedJson<IssueUploadRequest>,
) -> Result<StatusApiResponse<IssueUploadResponse>, AppError> {
    user.require_role(Role::Admin)?;

    let issued = ctx
        .content
        .issue_upload(user.org_id, user.user_id, &req.filename, &req.content_type, req.file_size)
        .await?;

    Ok(StatusApiResponse(
        StatusCode::CREATED,
        ApiResponse::ok(
            "upload issued",
            IssueUploadResponse {
                document_id: issued.document_id,
                upload_url: issued.upload_url,
                expires_in: issued.expires_in,
            },
        ),
    ))
}

#[derive(Debug, Deserialize)]
struct ListDocumentsQuery {
    limit: Option<i64>,
    offset: Option<i64>,
    status: Option<DocumentStatus>,
    sort: Option<String>,
    order: Option<String>,
}

#[derive(Debug, Serialize)]
struct Pagination {
    total: i64,
    has_more: bool,
}

#[derive(Debug, Serialize)]
struct ListDocumentsResponse {
    documents: Vec<Document>,
    pagination: Pagination,
}

/// `GET /v1/documents` (spec.md §4.4): any authenticated member, scoped to
/// their own org.
#[tracing::instrument(name = "List documents", skip_all, fields(org_id = %user.org_id))]
async fn list_documents(
    ctx: State<ApiContext>,
    user: AuthUser,
    Query(params): Query<ListDocumentsQuery>,
) -> Result<ApiResponse<ListDocumentsResponse>, AppError> {
    let sort_field = match params.sort.as_deref() {
        Some("filename") => SortField::Filename,
        Some("status") => SortField::Status,
        _ => SortField::UploadedAt,
    };
    let sort_direction = match params.order.as_deref() {
        Some("asc") => SortDirection::Asc,
        _ => SortDirection::Desc,
    };

    let limit = params.limit.unwrap_or(20).clamp(1, 100);
    let offset = params.offset.unwrap_or(0).max(0);

    let query = ListQuery {
        limit,
        offset,
        status: params.status,
        sort_field,
        sort_direction,
    };

    let result = ctx.content.list(user.org_id, query).await?;
    let has_more = offset + (result.documents.len() as i64) < result.total;

    Ok(ApiResponse::ok(
        "documents listed",
        ListDocumentsResponse {
            documents: result.documents,
            pagination: Pagination { total: result.total, has_more },
        },
    ))
}

/// `GET /v1/documents/{id}/status` (spec.md §4.4/§8): a document belonging
/// to another org 404s rather than 403ing, so its existence is never
/// leaked cross-tenant.
#[tracing::instrument(name = "Document status", skip_all, fields(org_id = %user.org_id, %document_id))]
async fn document_status(
    ctx: State<ApiContext>,
    user: AuthUser,
    Path(document_id): Path<Uuid>,
) -> Result<ApiResponse<Document>, AppError> {
    let document = ctx.content.get_status(document_id, user.org_id).await?;
    Ok(ApiResponse::ok("document status", document))
}

/// `POST /v1/documents/{id}/uploaded` (spec.md §4.4 `MarkUploaded`): the
/// object-store upload callback, invoked once the client's PUT to the
/// presigned URL completes. Bearer-gated like the rest of this router
/// rather than left as an unauthenticated webhook, since this crate has no
/// separate object-store-signed-callback trust boundary.
#[tracing::instrument(name = "Mark uploaded", skip_all, fields(org_id = %user.org_id, %document_id))]
async fn mark_uploaded(
    ctx: State<ApiContext>,
    user: AuthUser,
    Path(document_id): Path<Uuid>,
) -> Result<ApiResponse<()>, AppError> {
    ctx.content.mark_uploaded(document_id, user.org_id).await?;
    Ok(ApiResponse::ok("document marked uploaded", ()))
}

/// `DELETE /v1/documents/{id}` (spec.md §4.4): admin-and-above, soft delete.
#[tracing::instrument(name = "Delete document", skip_all, fields(org_id = %user.org_id, %document_id))]
async fn delete_document(
    ctx: State<ApiContext>,
    user: AuthUser,
    Path(document_id): Path<Uuid>,
) -> Result<ApiResponse<()>, AppError> {
    user.require_role(Role::Admin)?;
    ctx.content.delete(document_id, user.org_id, user.user_id).await?;
    Ok(ApiResponse::ok("document deleted", ()))
}
