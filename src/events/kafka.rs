use async_trait::async_trait;
use rdkafka::{
    consumer::{CommitMode, Consumer, StreamConsumer},
    message::Message,
    producer::{FutureProducer, FutureRecord},
    ClientConfig, TopicPartitionList,
};
use serde_json::Value;
use std::time::Duration;

use crate::app::error::AppError;

use super::{EventBus, EventConsumer, IncomingEvent};

/// Kafka-backed bus (`KAFKA_BROKERS`/`KAFKA_GROUP_ID`). `subscribe` opens
/// one `StreamConsumer` per topic under the shared consumer group, and
/// offsets are committed only after `commit` is called explicitly by the
/// worker loop, never automatically — matching spec.md §4.5's "consumer
/// offset commits occur only after processing completes without
/// exception."
pub struct KafkaEventBus {
    producer: FutureProducer,
    brokers: String,
    group_id: String,
}

impl KafkaEventBus {
    pub fn new(brokers: &str, group_id: &str) -> anyhow::Result<Self> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("message.timeout.ms", "15000")
            .create()?;

        Ok(KafkaEventBus {
            producer,
            brokers: brokers.to_string(),
            group_id: group_id.to_string(),
        })
    }
}

#[async_trait]
impl EventBus for KafkaEventBus {
    async fn publish(&self, topic: &str, key: &str, payload: &Value) -> Result<(), AppError> {
        let body = serde_json::to_string(payload)
            .map_err(|e| anyhow::anyhow!("failed to encode event payload: {e}"))?;

        self.producer
            .send(
                FutureRecord::to(topic).key(key).payload(&body),
                Duration::from_secs(5),
            )
            .await
            .map_err(|(e, _)| anyhow::anyhow!("kafka publish failed: {e}"))?;

        Ok(())
    }

    async fn subscribe(&self, topic: &str) -> Result<Box<dyn EventConsumer>, AppError> {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", &self.brokers)
            .set("group.id", &self.group_id)
            .set("enable.auto.commit", "false")
            .set("auto.offset.reset", "earliest")
            .create()
            .map_err(|e| anyhow::anyhow!("failed to build kafka consumer: {e}"))?;

        consumer
            .subscribe(&[topic])
            .map_err(|e| anyhow::anyhow!("failed to subscribe to {topic}: {e}"))?;

        Ok(Box::new(KafkaConsumer { consumer }))
    }
}

pub struct KafkaConsumer {
    consumer: StreamConsumer,
}

#[async_trait]
impl EventConsumer for KafkaConsumer {
    async fn recv(&mut self) -> Option<IncomingEvent> {
        loop {
            match self.consumer.recv().await {
                Ok(message) => {
                    let Some(bytes) = message.payload() else {
                        continue;
                    };
                    let Ok(payload) = serde_json::from_slice::<Value>(bytes) else {
                        tracing::warn!("dropping malformed kafka payload");
                        continue;
                    };

                    let mut tpl = TopicPartitionList::new();
                    let _ = tpl.add_partition_offset(
                        message.topic(),
                        message.partition(),
                        rdkafka::Offset::Offset(message.offset()),
                    );

                    return Some(IncomingEvent {
                        topic: message.topic().to_string(),
                        payload,
                        offset_token: format!("{}:{}", message.partition(), message.offset()),
                    });
                }
                Err(e) => {
                    tracing::error!(error = ?e, "kafka recv error");
                    return None;
                }
            }
        }
    }

    async fn commit(&mut self, event: &IncomingEvent) -> Result<(), AppError> {
        let Some((partition, offset)) = event.offset_token.split_once(':') else {
            return Ok(());
        };
        let Ok(partition) = partition.parse::<i32>() else {
            return Ok(());
        };
        let Ok(offset) = offset.parse::<i64>() else {
            return Ok(());
        };

        let mut tpl = TopicPartitionList::new();
        tpl.add_partition_offset(&event.topic, partition, rdkafka::Offset::Offset(offset + 1))
            .map_err(|e| anyhow::anyhow!("failed to build commit offset: {e}"))?;

        self.consumer
            .commit(&tpl, CommitMode::Sync)
            .map_err(|e| anyhow::anyhow!("failed to commit kafka offset: {e}"))?;

        Ok(())
    }
}
