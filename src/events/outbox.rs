use serde_json::Value;
use sqlx::PgPool;
use std::sync::Arc;
use uuid::Uuid;

use crate::app::error::AppError;

use super::EventBus;

/// A `failed_events` row: a publish failure can never silently drop an
/// event, because it always lands here first (spec.md §4.5/§9).
#[derive(Debug, Clone)]
pub struct FailedEvent {
    pub id: Uuid,
    pub topic: String,
    pub payload: Value,
    pub error: String,
    pub attempt: i32,
}

pub struct OutboxRepository {
    pool: PgPool,
}

impl OutboxRepository {
    pub fn new(pool: PgPool) -> Self {
        OutboxRepository { pool }
    }

    pub async fn record_failure(
        &self,
        topic: &str,
        payload: &Value,
        error: &str,
    ) -> Result<(), AppError> {
        sqlx::query!(
            r#"
            insert into failed_events (id, topic, payload, error, attempt, created_at)
            values ($1, $2, $3, $4, 0, now())
            "#,
            Uuid::new_v4(),
            topic,
            payload,
            error,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn unresolved(&self, limit: i64) -> Result<Vec<FailedEvent>, AppError> {
        let rows = sqlx::query!(
            r#"
            select id, topic, payload, error, attempt
            from failed_events
            where resolved_at is null
            order by created_at asc
            limit $1
            "#,
            limit
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|r| FailedEvent {
                id: r.id,
                topic: r.topic,
                payload: r.payload,
                error: r.error,
                attempt: r.attempt,
            })
            .collect())
    }

    async fn mark_resolved(&self, id: Uuid) -> Result<(), AppError> {
        sqlx::query!(
            "update failed_events set resolved_at = now() where id = $1",
            id
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn mark_attempted(&self, id: Uuid, error: &str) -> Result<(), AppError> {
        sqlx::query!(
            r#"
            update failed_events
            set attempt = attempt + 1, last_attempted_at = now(), error = $2
            where id = $1
            "#,
            id,
            error
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

/// Background retry task: periodically republishes everything still
/// unresolved in the outbox. Spawned once from `Application::build`.
pub async fn run_outbox_retry_loop(
    repository: Arc<OutboxRepository>,
    bus: Arc<dyn EventBus>,
    interval: std::time::Duration,
) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        ticker.tick().await;

        let pending = match repository.unresolved(50).await {
            Ok(rows) => rows,
            Err(e) => {
                tracing::error!(error = ?e, "failed to load outbox backlog");
                continue;
            }
        };

        for event in pending {
            let key = event
                .payload
                .get("document_id")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();

            match bus.publish(&event.topic, &key, &event.payload).await {
                Ok(()) => {
                    if let Err(e) = repository.mark_resolved(event.id).await {
                        tracing::error!(error = ?e, "failed to mark outbox entry resolved");
                    }
                }
                Err(e) => {
                    let _ = repository
                        .mark_attempted(event.id, &format!("{e}"))
                        .await;
                    tracing::warn!(
                        topic = %event.topic,
                        attempt = event.attempt + 1,
                        error = ?e,
                        "outbox retry failed, will retry again next tick"
                    );
                }
            }
        }
    }
}
