use std::sync::Arc;

use futures::stream::BoxStream;
use serde::Serialize;
use time::{format_description::well_known::Rfc3339, OffsetDateTime};
use uuid::Uuid;

use crate::app::error::AppError;
use crate::conversation::repository::ConversationRepository;
use crate::domain::conversation::{Conversation, MessageRole, SourceRef};
use crate::domain::document::namespace_for_org;
use crate::llm::{EmbeddingClient, GenerationClient};
use crate::vectorstore::VectorIndex;

use super::prompt;

/// Top-K passages retrieved per query (spec.md §4.7 step 4).
const DEFAULT_TOP_K: usize = 5;
/// Minimum similarity score a retrieved passage must clear to be cited
/// (spec.md §4.7 step 4); below this, the response templates an
/// empty-sources answer rather than erroring.
const MIN_SCORE_FLOOR: f32 = 0.3;
/// Bounded conversation context carried into the prompt (spec.md §4.7
/// step 5 "recent conversation turns up to a bounded context window").
const RECENT_MESSAGE_WINDOW: i64 = 10;

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub answer: String,
    pub sources: Vec<SourceRef>,
    pub conversation_id: Uuid,
    pub timestamp: String,
}

/// The RAG query orchestrator (spec.md §4.7): resolves the conversation,
/// embeds the query, retrieves tenant-scoped passages, composes a
/// grounded prompt, generates an answer, and persists both turns.
#[derive(Clone)]
pub struct RagOrchestrator {
    conversations: ConversationRepository,
    embedding_client: Arc<dyn EmbeddingClient>,
    generation_client: Arc<dyn GenerationClient>,
    vector_index: Arc<dyn VectorIndex>,
    embedding_dimensions: usize,
}

impl RagOrchestrator {
    pub fn new(
        conversations: ConversationRepository,
        embedding_client: Arc<dyn EmbeddingClient>,
        generation_client: Arc<dyn GenerationClient>,
        vector_index: Arc<dyn VectorIndex>,
        embedding_dimensions: usize,
    ) -> Self {
        RagOrchestrator {
            conversations,
            embedding_client,
            generation_client,
            vector_index,
            embedding_dimensions,
        }
    }

    /// Resolves the caller's conversation, creating a new one when no id
    /// was supplied; 404s when a supplied id doesn't belong to this
    /// `(org_id, user_id)` (spec.md §4.7 step 1 / §8 cross-tenant
    /// isolation).
    async fn resolve_conversation(
        &self,
        org_id: Uuid,
        user_id: Uuid,
        conversation_id: Option<Uuid>,
    ) -> Result<Conversation, AppError> {
        match conversation_id {
            Some(id) => self
                .conversations
                .find(id, org_id, user_id)
                .await?
                .ok_or(AppError::ConversationNotFound),
            None => self.conversations.create(org_id, user_id).await,
        }
    }

    #[tracing::instrument(name = "RAG query", skip(self, query), fields(%org_id, %user_id))]
    pub async fn query(
        &self,
        org_id: Uuid,
        user_id: Uuid,
        query: &str,
        conversation_id: Option<Uuid>,
    ) -> Result<ChatResponse, AppError> {
        let conversation = self.resolve_conversation(org_id, user_id, conversation_id).await?;

        self.conversations
            .append_message(conversation.conversation_id, MessageRole::User, query, &[])
            .await?;

        let query_vector = self
            .embedding_client
            .embed_batch(std::slice::from_ref(&query.to_string()))
            .await
            .ok()
            .and_then(|mut v| if v.len() == 1 { v.pop() } else { None });
        let query_vector = match query_vector {
            Some(v) if v.len() == self.embedding_dimensions => v,
            _ => self
                .embedding_client
                .embed_one(query, "input")
                .await
                .map_err(|_| AppError::EmbeddingFailed)?,
        };

        let namespace = namespace_for_org(org_id);
        let matches = self
            .vector_index
            .query(&namespace, &query_vector, DEFAULT_TOP_K)
            .await?;

        let passages: Vec<_> = matches.into_iter().filter(|m| m.score >= MIN_SCORE_FLOOR).collect();
        let passages = prompt::order_passages(passages);

        let recent = self
            .conversations
            .recent_messages(conversation.conversation_id, RECENT_MESSAGE_WINDOW)
            .await?;

        let composed = prompt::compose(query, &passages, &recent);

        let answer = self
            .generation_client
            .generate(&composed)
            .await
            .map_err(|_| AppError::GenerationFailed)?;

        let sources: Vec<SourceRef> = passages
            .iter()
            .map(|m| SourceRef {
                document_id: m.metadata.document_id,
                filename: m.metadata.filename.clone(),
                excerpt: m.metadata.text.clone(),
                score: m.score,
            })
            .collect();

        self.conversations
            .append_message(conversation.conversation_id, MessageRole::Assistant, &answer, &sources)
            .await?;

        Ok(ChatResponse {
            answer,
            sources,
            conversation_id: conversation.conversation_id,
            timestamp: OffsetDateTime::now_utc().format(&Rfc3339).unwrap_or_default(),
        })
    }

    /// Streaming variant (spec.md §4.7 step 8): identical retrieval and
    /// prompt composition, but the answer is produced as a chunk stream
    /// over SSE rather than one generated string. The assistant message
    /// (and its sources) is persisted only after the stream completes
    /// successfully, matching the non-streaming path's all-or-nothing
    /// persistence.
    #[tracing::instrument(name = "RAG query stream", skip(self, query), fields(%org_id, %user_id))]
    pub async fn query_stream(
        &self,
        org_id: Uuid,
        user_id: Uuid,
        query: &str,
        conversation_id: Option<Uuid>,
    ) -> Result<(Uuid, Vec<SourceRef>, BoxStream<'static, Result<String, AppError>>), AppError> {
        let conversation = self.resolve_conversation(org_id, user_id, conversation_id).await?;

        self.conversations
            .append_message(conversation.conversation_id, MessageRole::User, query, &[])
            .await?;

        let query_vector = self
            .embedding_client
            .embed_one(query, "input")
            .await
            .map_err(|_| AppError::EmbeddingFailed)?;

        let namespace = namespace_for_org(org_id);
        let matches = self
            .vector_index
            .query(&namespace, &query_vector, DEFAULT_TOP_K)
            .await?;
        let passages: Vec<_> = matches.into_iter().filter(|m| m.score >= MIN_SCORE_FLOOR).collect();
        let passages = prompt::order_passages(passages);

        let recent = self
            .conversations
            .recent_messages(conversation.conversation_id, RECENT_MESSAGE_WINDOW)
            .await?;
        let composed = prompt::compose(query, &passages, &recent);

        let sources: Vec<SourceRef> = passages
            .iter()
            .map(|m| SourceRef {
                document_id: m.metadata.document_id,
                filename: m.metadata.filename.clone(),
                excerpt: m.metadata.text.clone(),
                score: m.score,
            })
            .collect();

        let generation_stream = self
            .generation_client
            .generate_stream(&composed)
            .await
            .map_err(|_| AppError::GenerationFailed)?;

        let conversations = self.conversations.clone();
        let conversation_id_value = conversation.conversation_id;
        let sources_for_persist = sources.clone();

        // Drive the upstream generation stream on its own task, forwarding
        // each chunk to the caller over a channel while accumulating the
        // full answer; the assistant message is persisted only once the
        // channel closes, i.e. once generation has fully completed
        // (spec.md §4.7 steps 6-7's persist-after-success contract,
        // generalized to the streaming path).
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel::<Result<String, AppError>>();
        tokio::spawn(async move {
            use futures::StreamExt;

            let mut generation_stream = generation_stream;
            let mut full_answer = String::new();
            let mut failed = false;

            while let Some(chunk) = generation_stream.next().await {
                match &chunk {
                    Ok(text) => full_answer.push_str(text),
                    Err(_) => failed = true,
                }
                if tx.send(chunk).is_err() {
                    return;
                }
            }

            if !failed && !full_answer.is_empty() {
                if let Err(e) = conversations
                    .append_message(
                        conversation_id_value,
                        MessageRole::Assistant,
                        &full_answer,
                        &sources_for_persist,
                    )
                    .await
                {
                    tracing::warn!(error = ?e, "failed to persist streamed assistant message");
                }
            }
        });

        let stream: BoxStream<'static, Result<String, AppError>> =
            Box::pin(futures::stream::unfold(rx, |mut rx| async move {
                rx.recv().await.map(|item| (item, rx))
            }));

        Ok((conversation.conversation_id, sources, stream))
    }
}
