use lapin::options::{BasicPublishOptions, ExchangeDeclareOptions};
use lapin::types::FieldTable;
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties, ExchangeKind};

/// Publisher bound to one durable topic exchange.
#[derive(Clone)]
pub struct RabbitMQClient {
    channel: Channel,
    exchange: String,
}

impl RabbitMQClient {
    /// Connect and declare `exchange` as a durable topic exchange.
    pub async fn connect(url: &str, exchange: &str) -> Result<Self, lapin::Error> {
        let conn = Connection::connect(url, ConnectionProperties::default()).await?;
        let channel = conn.create_channel().await?;

        channel
            .exchange_declare(
                exchange,
                ExchangeKind::Topic,
                ExchangeDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await?;

        tracing::info!(url = %url, exchange = %exchange, "connected to RabbitMQ");
        Ok(Self {
            channel,
            exchange: exchange.to_string(),
        })
    }

    /// Publish a serialized JSON event as a persistent message and wait for the broker.
    pub async fn publish_raw(&self, routing_key: &str, payload: &[u8]) -> Result<(), lapin::Error> {
        let properties = BasicProperties::default()
            .with_content_type("application/json".into())
            .with_delivery_mode(2)
            .with_timestamp(chrono::Utc::now().timestamp().max(0) as u64);

        self.channel
            .basic_publish(&self.exchange, routing_key, BasicPublishOptions::default(), payload, properties)
            .await?
            .await?;

        tracing::debug!(exchange = %self.exchange, routing_key = %routing_key, bytes = payload.len(), "event published");
        Ok(())
    }

    pub fn is_connected(&self) -> bool {
        self.channel.status().connected()
    }
}
