use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::Message;
use tracing::{debug, info};

use super::{MessageSource, QueueError};
use crate::config::KafkaSettings;

/// Kafka-backed [`MessageSource`]. Offsets are auto-committed, so delivery is at-least-once.
pub struct KafkaSource {
    consumer: StreamConsumer,
}

impl KafkaSource {
    pub fn connect(settings: &KafkaSettings) -> Result<Self, QueueError> {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", &settings.brokers)
            .set("group.id", &settings.group_id)
            .set("enable.auto.commit", "true")
            .set("auto.offset.reset", "earliest")
            .create()
            .map_err(|e| QueueError::Source(e.to_string()))?;
        consumer
            .subscribe(&[settings.topic.as_str()])
            .map_err(|e| QueueError::Source(e.to_string()))?;
        info!(brokers = %settings.brokers, topic = %settings.topic, group = %settings.group_id, "subscribed to kafka");
        Ok(Self { consumer })
    }
}

#[async_trait]
impl MessageSource for KafkaSource {
    async fn next_message(&mut self) -> Option<Result<Vec<u8>, QueueError>> {
        loop {
            match self.consumer.recv().await {
                Ok(msg) => match payload_bytes(msg.payload()) {
                    Some(bytes) => return Some(Ok(bytes)),
                    None => debug!(partition = msg.partition(), offset = msg.offset(), "skipping kafka tombstone"),
                },
                Err(e) => return Some(Err(QueueError::Source(e.to_string()))),
            }
        }
    }
}

/// Body of a record, or `None` for a tombstone (no payload).
fn payload_bytes(payload: Option<&[u8]>) -> Option<Vec<u8>> {
    payload.map(<[u8]>::to_vec)
}
