use std::sync::Mutex;

use engage_shared::clients::rabbitmq::RabbitMQClient;

pub mod publisher;

/// Destination for serialized domain events.
#[async_trait::async_trait]
pub trait EventSink: Send + Sync {
    async fn publish_raw(&self, routing_key: &str, payload: Vec<u8>) -> anyhow::Result<()>;

    fn is_connected(&self) -> bool {
        true
    }
}

#[async_trait::async_trait]
impl EventSink for RabbitMQClient {
    async fn publish_raw(&self, routing_key: &str, payload: Vec<u8>) -> anyhow::Result<()> {
        RabbitMQClient::publish_raw(self, routing_key, &payload).await?;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        RabbitMQClient::is_connected(self)
    }
}

/// Writes events to the log instead of a broker.
pub struct LogSink;

#[async_trait::async_trait]
impl EventSink for LogSink {
    async fn publish_raw(&self, routing_key: &str, payload: Vec<u8>) -> anyhow::Result<()> {
        tracing::debug!(routing_key = %routing_key, bytes = payload.len(), "event (not published)");
        Ok(())
    }
}

/// Keeps every published event in memory.
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<(String, serde_json::Value)>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn routing_keys(&self) -> Vec<String> {
        self.events
            .lock()
            .map(|events| events.iter().map(|(key, _)| key.clone()).collect())
            .unwrap_or_default()
    }

    pub fn payloads(&self, routing_key: &str) -> Vec<serde_json::Value> {
        self.events
            .lock()
            .map(|events| {
                events
                    .iter()
                    .filter(|(key, _)| key == routing_key)
                    .map(|(_, value)| value.clone())
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[async_trait::async_trait]
impl EventSink for RecordingSink {
    async fn publish_raw(&self, routing_key: &str, payload: Vec<u8>) -> anyhow::Result<()> {
        let value: serde_json::Value = serde_json::from_slice(&payload)?;
        self.events
            .lock()
            .map_err(|_| anyhow::anyhow!("recording sink lock poisoned"))?
            .push((routing_key.to_string(), value));
        Ok(())
    }
}
