use std::sync::Arc;

use futures::stream::FuturesUnordered;
use futures::StreamExt;
use serde_json::Value;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use uuid::Uuid;

use crate::events::{EventBus, IncomingEvent, TOPIC_DOCUMENT_UPLOADED};

use super::pipeline::Pipeline;

/// The long-running consumer loop (spec.md §4.6 step 1 / §6.5
/// `MAX_CONCURRENT_JOBS`). Each incoming `document.uploaded` message spawns
/// a bounded task against `pipeline`; the offset is only committed once
/// that task's processing has returned, so a crash mid-job is redelivered
/// rather than silently dropped.
pub struct Worker {
    pipeline: Arc<Pipeline>,
    bus: Arc<dyn EventBus>,
    max_concurrent_jobs: usize,
}

impl Worker {
    pub fn new(pipeline: Pipeline, bus: Arc<dyn EventBus>, max_concurrent_jobs: usize) -> Self {
        Worker {
            pipeline: Arc::new(pipeline),
            bus,
            max_concurrent_jobs,
        }
    }

    /// Runs until `shutdown` resolves. In-flight jobs are drained (the
    /// semaphore permits are awaited for, not aborted) before returning, so
    /// a `SIGTERM` during a batch of uploads never leaves a document stuck
    /// in `processing` with no worker left to finish it.
    pub async fn run(&self, shutdown: impl std::future::Future<Output = ()>) -> anyhow::Result<()> {
        let mut consumer = self.bus.subscribe(TOPIC_DOCUMENT_UPLOADED).await?;
        let semaphore = Arc::new(Semaphore::new(self.max_concurrent_jobs));
        let mut in_flight: FuturesUnordered<tokio::task::JoinHandle<Result<IncomingEvent, IncomingEvent>>> =
            FuturesUnordered::new();
        let mut draining = false;

        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                biased;

                _ = &mut shutdown, if !draining => {
                    tracing::info!("shutdown requested, draining in-flight ingestion jobs");
                    draining = true;
                }
                Some(finished) = in_flight.next(), if !in_flight.is_empty() => {
                    match finished {
                        Ok(Ok(event)) => {
                            if let Err(e) = consumer.commit(&event).await {
                                tracing::warn!(error = ?e, "failed to commit offset after processing");
                            }
                        }
                        Ok(Err(event)) => {
                            tracing::warn!(topic = %event.topic, "leaving offset uncommitted for redelivery/DLQ after pipeline failure");
                        }
                        Err(e) => tracing::error!(error = ?e, "ingestion task panicked"),
                    }
                    if draining && in_flight.is_empty() {
                        break;
                    }
                }
                maybe_event = consumer.recv(), if !draining => {
                    let Some(event) = maybe_event else {
                        tracing::info!("event bus closed, stopping ingestion worker");
                        if in_flight.is_empty() {
                            break;
                        }
                        draining = true;
                        continue;
                    };

                    let Some(document_id) = extract_document_id(&event.payload) else {
                        tracing::warn!(topic = %event.topic, "document.uploaded payload missing document_id, committing and skipping");
                        if let Err(e) = consumer.commit(&event).await {
                            tracing::warn!(error = ?e, "failed to commit malformed event");
                        }
                        continue;
                    };

                    let permit = semaphore.clone().acquire_owned().await?;
                    let pipeline = self.pipeline.clone();
                    in_flight.push(tokio::spawn(process_one(pipeline, document_id, event, permit)));
                }
            }

            if draining && in_flight.is_empty() {
                break;
            }
        }

        Ok(())
    }
}

/// `Ok` carries the event to commit; `Err` carries it back uncommitted so
/// the consumer's own retry/DLQ policy decides what happens to it (spec.md
/// §4.6 step 7, §4.5 "consumer offset commits occur only after processing
/// completes without exception"). The document's terminal `failed` status
/// and `document.failed` event are already durable by the time this
/// returns — only the bus offset is still outstanding.
async fn process_one(
    pipeline: Arc<Pipeline>,
    document_id: Uuid,
    event: IncomingEvent,
    permit: OwnedSemaphorePermit,
) -> Result<IncomingEvent, IncomingEvent> {
    let _permit = permit;
    match pipeline.process(document_id).await {
        Ok(()) => Ok(event),
        Err(e) => {
            tracing::error!(error = ?e, %document_id, "ingestion pipeline returned an error");
            Err(event)
        }
    }
}

fn extract_document_id(payload: &Value) -> Option<Uuid> {
    payload.get("document_id")?.as_str()?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_document_id_from_payload() {
        let id = Uuid::new_v4();
        let payload = serde_json::json!({ "document_id": id.to_string() });
        assert_eq!(extract_document_id(&payload), Some(id));
    }

    #[test]
    fn missing_document_id_is_none() {
        let payload = serde_json::json!({ "other_field": "value" });
        assert_eq!(extract_document_id(&payload), None);
    }
}
