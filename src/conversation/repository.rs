use sqlx::PgPool;
use uuid::Uuid;

use crate::app::error::AppError;
use crate::domain::conversation::{Conversation, Message, MessageRole, SourceRef};
use crate::domain::Timestamptz;

/// The conversation store (spec.md §4.8). Every read and write is scoped
/// by `(org_id, user_id)` so a conversation from one org can never be
/// addressed, let alone mutated, from another (spec.md §8 cross-tenant
/// isolation).
#[derive(Clone)]
pub struct ConversationRepository {
    pool: PgPool,
}

impl ConversationRepository {
    pub fn new(pool: PgPool) -> Self {
        ConversationRepository { pool }
    }

    pub async fn create(&self, org_id: Uuid, user_id: Uuid) -> Result<Conversation, AppError> {
        let conversation_id = Uuid::new_v4();
        let row = sqlx::query!(
            r#"
            insert into conversations (conversation_id, org_id, user_id, message_count, created_at, updated_at)
            values ($1, $2, $3, 0, now(), now())
            returning conversation_id, org_id, user_id, title, message_count, created_at, updated_at
            "#,
            conversation_id,
            org_id,
            user_id,
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(Conversation {
            conversation_id: row.conversation_id,
            org_id: row.org_id,
            user_id: row.user_id,
            title: row.title,
            message_count: row.message_count,
            created_at: Timestamptz(row.created_at),
            updated_at: Timestamptz(row.updated_at),
        })
    }

    pub async fn find(
        &self,
        conversation_id: Uuid,
        org_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<Conversation>, AppError> {
        let row = sqlx::query!(
            r#"
            select conversation_id, org_id, user_id, title, message_count, created_at, updated_at
            from conversations
            where conversation_id = $1 and org_id = $2 and user_id = $3
            "#,
            conversation_id,
            org_id,
            user_id,
        )
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| Conversation {
            conversation_id: r.conversation_id,
            org_id: r.org_id,
            user_id: r.user_id,
            title: r.title,
            message_count: r.message_count,
            created_at: Timestamptz(r.created_at),
            updated_at: Timestamptz(r.updated_at),
        }))
    }

    pub async fn list(
        &self,
        org_id: Uuid,
        user_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<Conversation>, i64), AppError> {
        let rows = sqlx::query!(
            r#"
            select conversation_id, org_id, user_id, title, message_count, created_at, updated_at
            from conversations
            where org_id = $1 and user_id = $2
            order by updated_at desc
            limit $3 offset $4
            "#,
            org_id,
            user_id,
            limit,
            offset,
        )
        .fetch_all(&self.pool)
        .await?;

        let total = sqlx::query_scalar!(
            r#"select count(*) as "count!" from conversations where org_id = $1 and user_id = $2"#,
            org_id,
            user_id,
        )
        .fetch_one(&self.pool)
        .await?;

        Ok((
            rows.into_iter()
                .map(|r| Conversation {
                    conversation_id: r.conversation_id,
                    org_id: r.org_id,
                    user_id: r.user_id,
                    title: r.title,
                    message_count: r.message_count,
                    created_at: Timestamptz(r.created_at),
                    updated_at: Timestamptz(r.updated_at),
                })
                .collect(),
            total,
        ))
    }

    /// Conversation message append is serialized per conversation
    /// (spec.md §5) by updating `message_count` in the same statement that
    /// inserts the message, under the row lock `conversations` already
    /// takes for its own update.
    pub async fn append_message(
        &self,
        conversation_id: Uuid,
        role: MessageRole,
        content: &str,
        sources: &[SourceRef],
    ) -> Result<Message, AppError> {
        let message_id = Uuid::new_v4();
        let sources_json = serde_json::to_value(sources).map_err(|e| anyhow::anyhow!(e))?;

        let mut tx = self.pool.begin().await?;

        let row = sqlx::query!(
            r#"
            insert into messages (message_id, conversation_id, role, content, sources, created_at)
            values ($1, $2, $3, $4, $5, now())
            returning message_id, conversation_id, role as "role: MessageRole", content, sources, created_at
            "#,
            message_id,
            conversation_id,
            role as MessageRole,
            content,
            sources_json,
        )
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query!(
            r#"
            update conversations
            set message_count = message_count + 1, updated_at = now()
            where conversation_id = $1
            "#,
            conversation_id,
        )
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        let sources: Vec<SourceRef> = serde_json::from_value(row.sources).unwrap_or_default();

        Ok(Message {
            message_id: row.message_id,
            conversation_id: row.conversation_id,
            role: row.role,
            content: row.content,
            sources,
            created_at: Timestamptz(row.created_at),
        })
    }

    pub async fn list_messages(&self, conversation_id: Uuid) -> Result<Vec<Message>, AppError> {
        let rows = sqlx::query!(
            r#"
            select message_id, conversation_id, role as "role: MessageRole", content, sources, created_at
            from messages
            where conversation_id = $1
            order by created_at asc
            "#,
            conversation_id,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|r| {
                let sources: Vec<SourceRef> = serde_json::from_value(r.sources).unwrap_or_default();
                Message {
                    message_id: r.message_id,
                    conversation_id: r.conversation_id,
                    role: r.role,
                    content: r.content,
                    sources,
                    created_at: Timestamptz(r.created_at),
                }
            })
            .collect())
    }

    /// Recent turns for prompt context (spec.md §4.7 step 5), oldest
    /// first, bounded to the last `limit` messages.
    pub async fn recent_messages(&self, conversation_id: Uuid, limit: i64) -> Result<Vec<Message>, AppError> {
        let rows = sqlx::query!(
            r#"
            select message_id, conversation_id, role as "role: MessageRole", content, sources, created_at
            from messages
            where conversation_id = $1
            order by created_at desc
            limit $2
            "#,
            conversation_id,
            limit,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut messages: Vec<Message> = rows
            .into_iter()
            .map(|r| {
                let sources: Vec<SourceRef> = serde_json::from_value(r.sources).unwrap_or_default();
                Message {
                    message_id: r.message_id,
                    conversation_id: r.conversation_id,
                    role: r.role,
                    content: r.content,
                    sources,
                    created_at: Timestamptz(r.created_at),
                }
            })
            .collect();
        messages.reverse();
        Ok(messages)
    }

    /// Deleting a conversation cascades its messages (spec.md §3 lifecycle
    /// ownership: "documents own chunks" / "conversations own messages").
    pub async fn delete(&self, conversation_id: Uuid, org_id: Uuid, user_id: Uuid) -> Result<bool, AppError> {
        let mut tx = self.pool.begin().await?;

        let owned = sqlx::query_scalar!(
            r#"select exists(select 1 from conversations where conversation_id = $1 and org_id = $2 and user_id = $3) as "exists!""#,
            conversation_id,
            org_id,
            user_id,
        )
        .fetch_one(&mut *tx)
        .await?;

        if !owned {
            tx.rollback().await?;
            return Ok(false);
        }

        sqlx::query!("delete from messages where conversation_id = $1", conversation_id)
            .execute(&mut *tx)
            .await?;

        sqlx::query!("delete from conversations where conversation_id = $1", conversation_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(true)
    }
}
