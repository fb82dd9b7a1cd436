//! Local listeners for routed messages

use crate::models::StoredMessage;
use async_trait::async_trait;
use tokio::sync::broadcast;
use tracing::debug;

/// In-process listener notified of every broadcast message.
///
/// Each call runs on its own task; an error is logged there and never
/// reaches the router.
#[async_trait]
pub trait Subscriber: Send + Sync {
    async fn on_message_received(&self, message: StoredMessage) -> anyhow::Result<()>;
}

/// Re-publishes routed messages on a tokio broadcast channel.
#[derive(Clone)]
pub struct BroadcastSubscriber {
    tx: broadcast::Sender<StoredMessage>,
}

impl BroadcastSubscriber {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StoredMessage> {
        self.tx.subscribe()
    }
}

#[async_trait]
impl Subscriber for BroadcastSubscriber {
    async fn on_message_received(&self, message: StoredMessage) -> anyhow::Result<()> {
        match self.tx.send(message) {
            Ok(receivers) => debug!("Routed message published to {} receivers", receivers),
            Err(_) => debug!("No receivers for routed message"),
        }
        Ok(())
    }
}
