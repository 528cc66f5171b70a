//! Chat routes (spec.md §6.1 `/v1/chat/*`, §4.7): HMAC + bearer, per the
//! endpoint table — unlike documents, a chat query is itself attributed to
//! the signing org as well as the bearer user.

use std::convert::Infallible;
use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::routing::{get, post};
use axum::Router;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::app::error::AppError;
use crate::app::extractor::AuthUser;
use crate::app::response::ApiResponse;
use crate::app::validated_json::ValidatedJson;
use crate::app::ApiContext;
use crate::domain::conversation::{Conversation, Message, SourceRef};
use crate::rag::orchestrator::ChatResponse;

/// Query length ceiling (spec.md §7 `QUERY_TOO_LONG`).
const MAX_QUERY_LEN: u64 = 4000;

pub fn router() -> Router<ApiContext> {
    Router::new()
        .route("/v1/chat/query", post(query))
        .route("/v1/chat/query/stream", post(query_stream))
        .route("/v1/chat/conversations", get(list_conversations))
        .route("/v1/chat/conversations/{id}/messages", get(list_messages))
}

#[derive(Debug, Deserialize, Validate)]
struct ChatQueryRequest {
    #[validate(length(min = 1))]
    query: String,
    conversation_id: Option<Uuid>,
}

/// `POST /v1/chat/query` (spec.md §4.7): non-streaming RAG query.
#[tracing::instrument(name = "Chat query", skip_all, fields(org_id = %user.org_id, user_id = %user.user_id))]
async fn query(
    ctx: State<ApiContext>,
    user: AuthUser,
    ValidatedJson(req): ValidatedJson<ChatQueryRequest>,
) -> Result<ApiResponse<ChatResponse>, AppError> {
    if req.query.len() as u64 > MAX_QUERY_LEN {
        return Err(AppError::QueryTooLong);
    }

    let response = ctx
        .rag
        .query(user.org_id, user.user_id, &req.query, req.conversation_id)
        .await?;

    Ok(ApiResponse::ok("query answered", response))
}

#[derive(Debug, Serialize)]
struct StreamStart {
    conversation_id: Uuid,
    sources: Vec<SourceRef>,
}

/// `POST /v1/chat/query/stream` (spec.md §4.7 step 8): server-sent-events
/// variant of the same query. Supplements the base endpoint table with the
/// streaming surface spec.md's ambient-stack expansion calls for; the
/// first event carries `conversation_id`/`sources`, every following event
/// is one answer chunk, and the stream ends with a sentinel `done` event.
#[tracing::instrument(name = "Chat query stream", skip_all, fields(org_id = %user.org_id, user_id = %user.user_id))]
async fn query_stream(
    ctx: State<ApiContext>,
    user: AuthUser,
    ValidatedJson(req): ValidatedJson<ChatQueryRequest>,
) -> Result<Sse<impl futures::Stream<Item = Result<Event, Infallible>>>, AppError> {
    if req.query.len() as u64 > MAX_QUERY_LEN {
        return Err(AppError::QueryTooLong);
    }

    let (conversation_id, sources, chunks) = ctx
        .rag
        .query_stream(user.org_id, user.user_id, &req.query, req.conversation_id)
        .await?;

    let start = Event::default()
        .event("start")
        .json_data(StreamStart { conversation_id, sources })
        .unwrap_or_else(|_| Event::default().event("start"));

    let chunk_events = chunks.map(|chunk| match chunk {
        Ok(text) => Ok(Event::default().event("chunk").data(text)),
        Err(e) => Ok(Event::default().event("error").data(e.to_string())),
    });

    let done = futures::stream::once(async { Ok(Event::default().event("done").data("")) });

    let stream = futures::stream::once(async move { Ok(start) })
        .chain(chunk_events)
        .chain(done);

    Ok(Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15))))
}

#[derive(Debug, Deserialize)]
struct ListConversationsQuery {
    limit: Option<i64>,
    offset: Option<i64>,
}

#[derive(Debug, Serialize)]
struct ListConversationsResponse {
    conversations: Vec<Conversation>,
    total: i64,
}

/// `GET /v1/chat/conversations` (spec.md §4.8).
#[tracing::instrument(name = "List conversations", skip_all, fields(org_id = %user.org_id, user_id = %user.user_id))]
async fn list_conversations(
    ctx: State<ApiContext>,
    user: AuthUser,
    Query(params): Query<ListConversationsQuery>,
) -> Result<ApiResponse<ListConversationsResponse>, AppError> {
    let limit = params.limit.unwrap_or(20).clamp(1, 100);
    let offset = params.offset.unwrap_or(0).max(0);

    let (conversations, total) = ctx.conversations.list(user.org_id, user.user_id, limit, offset).await?;

    Ok(ApiResponse::ok(
        "conversations listed",
        ListConversationsResponse { conversations, total },
    ))
}

/// `GET /v1/chat/conversations/{id}/messages` (spec.md §4.8/§8):
/// cross-tenant/cross-user ownership is enforced by scoping the lookup to
/// `(org_id, user_id)` — an unowned conversation 404s.
#[tracing::instrument(name = "List messages", skip_all, fields(org_id = %user.org_id, user_id = %user.user_id, %conversation_id))]
async fn list_messages(
    ctx: State<ApiContext>,
    user: AuthUser,
    Path(conversation_id): Path<Uuid>,
) -> Result<ApiResponse<Vec<Message>>, AppError> {
    ctx.conversations
        .find(conversation_id, user.org_id, user.user_id)
        .await?
        .ok_or(AppError::ConversationNotFound)?;

    let messages = ctx.conversations.list_messages(conversation_id).await?;
    Ok(ApiResponse::ok("messages listed", messages))
}
