use std::{collections::HashMap, sync::Mutex};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::app::error::AppError;

use super::{EventBus, EventConsumer, IncomingEvent};

/// In-process bus selected by `LOCAL_TEST_MODE=true`. Used by integration
/// tests and local development so neither needs a running Kafka broker.
/// One unbounded channel per topic; `subscribe` is only meaningful once
/// per topic (mirrors a single consumer group member), which is all the
/// ingestion worker needs.
pub struct InMemoryEventBus {
    senders: Mutex<HashMap<String, mpsc::UnboundedSender<IncomingEvent>>>,
    receivers: Mutex<HashMap<String, mpsc::UnboundedReceiver<IncomingEvent>>>,
}

impl Default for InMemoryEventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryEventBus {
    pub fn new() -> Self {
        InMemoryEventBus {
            senders: Mutex::new(HashMap::new()),
            receivers: Mutex::new(HashMap::new()),
        }
    }

    fn channel_for(&self, topic: &str) -> mpsc::UnboundedSender<IncomingEvent> {
        let mut senders = self.senders.lock().unwrap();
        if let Some(tx) = senders.get(topic) {
            return tx.clone();
        }

        let (tx, rx) = mpsc::unbounded_channel();
        senders.insert(topic.to_string(), tx.clone());
        self.receivers.lock().unwrap().insert(topic.to_string(), rx);
        tx
    }
}

#[async_trait]
impl EventBus for InMemoryEventBus {
    async fn publish(&self, topic: &str, _key: &str, payload: &Value) -> Result<(), AppError> {
        let tx = self.channel_for(topic);
        tx.send(IncomingEvent {
            topic: topic.to_string(),
            payload: payload.clone(),
            offset_token: uuid::Uuid::new_v4().to_string(),
        })
        .map_err(|e| anyhow::anyhow!("in-memory bus publish failed: {e}"))?;
        Ok(())
    }

    async fn subscribe(&self, topic: &str) -> Result<Box<dyn EventConsumer>, AppError> {
        self.channel_for(topic);
        let rx = self
            .receivers
            .lock()
            .unwrap()
            .remove(topic)
            .ok_or_else(|| anyhow::anyhow!("topic {topic} already has a subscriber"))?;

        Ok(Box::new(InMemoryConsumer { rx }))
    }
}

pub struct InMemoryConsumer {
    rx: mpsc::UnboundedReceiver<IncomingEvent>,
}

#[async_trait]
impl EventConsumer for InMemoryConsumer {
    async fn recv(&mut self) -> Option<IncomingEvent> {
        self.rx.recv().await
    }

    async fn commit(&mut self, _event: &IncomingEvent) -> Result<(), AppError> {
        // No durable offset to advance; delivery already happened exactly
        // once per send, so commit is a no-op.
        Ok(())
    }
}
