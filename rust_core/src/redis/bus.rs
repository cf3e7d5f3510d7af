use anyhow::{Context, Result};
use redis::{aio::Connection, AsyncCommands, Client};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Redis pub/sub bus for operator commands and their replies
#[derive(Clone)]
pub struct RedisBus {
    client: Client,
    connection: Arc<Mutex<Connection>>,
}

impl RedisBus {
    pub async fn new(redis_url: &str) -> Result<Self> {
        let client = Client::open(redis_url).context("Invalid REDIS_URL")?;
        let connection = client
            .get_async_connection()
            .await
            .context("Failed to connect to Redis")?;

        Ok(Self {
            client,
            connection: Arc::new(Mutex::new(connection)),
        })
    }

    pub async fn publish<T: Serialize>(&self, channel: &str, message: &T) -> Result<()> {
        let payload = serde_json::to_string(message)?;
        let mut conn = self.connection.lock().await;
        conn.publish::<_, _, ()>(channel, payload)
            .await
            .context("Failed to publish message")?;
        Ok(())
    }

    /// Dedicated pub/sub connection subscribed to `channel`
    pub async fn subscribe(&self, channel: &str) -> Result<redis::aio::PubSub> {
        let conn = self
            .client
            .get_async_connection()
            .await
            .context("Failed to open Redis pub/sub connection")?;
        let mut pubsub = conn.into_pubsub();
        pubsub
            .subscribe(channel)
            .await
            .with_context(|| format!("Failed to subscribe to {}", channel))?;
        Ok(pubsub)
    }
}
