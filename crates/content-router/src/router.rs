//! Content router
//!
//! Decodes inbound envelopes, applies them to the chat or file store while
//! holding the router's guard, then delivers the stored result: straight back
//! to the sender for downloads, to every peer (and every local subscriber)
//! otherwise. Nothing that goes wrong with one envelope is returned to the
//! transport; it is logged, counted, and dropped.

use crate::codec::Codec;
use crate::error::{Error, Result};
use crate::models::{ChatThread, Identifier, InboundMessage, MessageKind, StoredMessage};
use crate::stats::{RouterStats, StatsSnapshot};
use crate::store::{StoreFactory, Stores};
use crate::subscriber::Subscriber;
use crate::transport::{ChannelHandler, Transport};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::sync::{Arc, Weak};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Why an envelope was dropped before delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    Malformed,
    UnknownKind,
    /// The store returned nothing.
    NotFound,
    StoreFailure,
}

/// Terminal state of one inbound envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteOutcome {
    HistoryServed,
    DeliveredDirect,
    Broadcast { notified: usize },
    Discarded(DropReason),
    DeliveryFailed,
}

/// Result of the guarded classify-and-mutate step.
enum Routed {
    Stored(StoredMessage),
    History(Vec<ChatThread>),
}

enum Halt {
    UnknownKind,
    NotFound,
    Store(Error),
}

impl From<Error> for Halt {
    fn from(err: Error) -> Self {
        Halt::Store(err)
    }
}

pub struct ContentRouter {
    channel: String,
    transport: Arc<dyn Transport>,
    factory: Arc<dyn StoreFactory>,
    /// The guard: every store read or write goes through this lock.
    stores: Mutex<Stores>,
    codec: RwLock<Arc<dyn Codec>>,
    subscribers: RwLock<Vec<Arc<dyn Subscriber>>>,
    stats: RouterStats,
}

impl ContentRouter {
    /// Open stores through `factory` and register on `channel` of `transport`.
    pub async fn new(
        channel: impl Into<String>,
        transport: Arc<dyn Transport>,
        factory: Arc<dyn StoreFactory>,
    ) -> Result<Arc<Self>> {
        let stores = factory.open().await?;
        let codec = factory.codec();

        let router = Arc::new(Self {
            channel: channel.into(),
            transport: transport.clone(),
            factory,
            stores: Mutex::new(stores),
            codec: RwLock::new(codec),
            subscribers: RwLock::new(Vec::new()),
            stats: RouterStats::default(),
        });

        transport.subscribe(
            &router.channel,
            Arc::new(RouterHandle(Arc::downgrade(&router))),
        );
        info!("Content router listening on channel {}", router.channel);

        Ok(router)
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn subscribe(&self, subscriber: Arc<dyn Subscriber>) {
        self.subscribers.write().push(subscriber);
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Snapshot of the full chat history.
    pub async fn get_all_messages(&self) -> Result<Vec<ChatThread>> {
        let stores = self.stores.lock().await;
        stores.chat.threads().await
    }

    pub async fn send_history_to_client(&self, recipient: &Identifier) -> Result<()> {
        let threads = self.get_all_messages().await?;
        self.send_threads(&threads, recipient).await
    }

    /// Broadcast `message` to every connected peer.
    pub async fn send(&self, message: &StoredMessage) -> Result<()> {
        let payload = self.codec().encode_message(message)?;
        self.transport.send(&payload, &self.channel, None).await
    }

    /// Send `message` to `recipient` only.
    pub async fn send_file(&self, message: &StoredMessage, recipient: &Identifier) -> Result<()> {
        let payload = self.codec().encode_message(message)?;
        self.transport
            .send(&payload, &self.channel, Some(recipient))
            .await
    }

    /// Hand `message` to every subscriber on its own task without waiting.
    /// Returns the number of tasks spawned.
    ///
    /// # Panics
    ///
    /// Must be called from within a Tokio runtime; each subscriber is
    /// handed off with `tokio::spawn`.
    pub fn notify(&self, message: &StoredMessage) -> usize {
        let subscribers = self.subscribers.read().clone();
        for subscriber in &subscribers {
            let subscriber = subscriber.clone();
            let message = message.clone();
            tokio::spawn(async move {
                let id = message.id().to_string();
                if let Err(e) = subscriber.on_message_received(message).await {
                    warn!("Subscriber failed to handle message {}: {}", id, e);
                }
            });
        }
        subscribers.len()
    }

    /// Replace both stores, the codec and the subscriber set with fresh ones.
    pub async fn reset(&self) -> Result<()> {
        let mut stores = self.stores.lock().await;
        *stores = self.factory.fresh().await?;
        *self.codec.write() = self.factory.codec();
        self.subscribers.write().clear();

        info!("Content router on channel {} reset", self.channel);
        Ok(())
    }

    /// Entry point for every inbound payload on this router's channel.
    pub async fn receive(&self, raw: &str) -> RouteOutcome {
        let outcome = self.route(raw).await;
        self.stats.record(&outcome);
        outcome
    }

    async fn route(&self, raw: &str) -> RouteOutcome {
        let message = match self.codec().decode(raw) {
            Ok(message) => message,
            Err(e) => {
                warn!("Dropping malformed envelope: {}", e);
                return RouteOutcome::Discarded(DropReason::Malformed);
            }
        };

        debug!(
            "Routing {:?}/{:?} from {}",
            message.kind, message.event, message.sender_id
        );

        let routed = match self.classify(&message).await {
            Ok(routed) => routed,
            Err(Halt::UnknownKind) => {
                info!("Ignoring message of unknown kind from {}", message.sender_id);
                return RouteOutcome::Discarded(DropReason::UnknownKind);
            }
            Err(Halt::NotFound) => {
                warn!(
                    "No stored result for {:?}/{:?} from {}, dropping",
                    message.kind, message.event, message.sender_id
                );
                return RouteOutcome::Discarded(DropReason::NotFound);
            }
            Err(Halt::Store(e)) => {
                warn!(
                    "Store failed on {:?} from {}: {}",
                    message.kind, message.sender_id, e
                );
                return RouteOutcome::Discarded(DropReason::StoreFailure);
            }
        };

        match routed {
            Routed::History(threads) => {
                match self.send_threads(&threads, &message.sender_id).await {
                    Ok(()) => RouteOutcome::HistoryServed,
                    Err(e) => {
                        warn!("Failed to send history to {}: {}", message.sender_id, e);
                        RouteOutcome::DeliveryFailed
                    }
                }
            }
            Routed::Stored(stored) => self.deliver(&message, stored).await,
        }
    }

    /// The guarded step. History is read here and sent by the caller once
    /// the guard is released.
    async fn classify(&self, message: &InboundMessage) -> std::result::Result<Routed, Halt> {
        let stores = self.stores.lock().await;

        let stored = match message.kind {
            MessageKind::Chat => stores.chat.receive(message).await?.map(StoredMessage::Chat),
            MessageKind::File => stores.files.receive(message).await?.map(StoredMessage::File),
            MessageKind::HistoryRequest => {
                return Ok(Routed::History(stores.chat.threads().await?));
            }
            MessageKind::Unknown => return Err(Halt::UnknownKind),
        };

        stored.map(Routed::Stored).ok_or(Halt::NotFound)
    }

    async fn deliver(&self, message: &InboundMessage, stored: StoredMessage) -> RouteOutcome {
        let result = if message.event.is_direct_reply() {
            self.send_file(&stored, &message.sender_id)
                .await
                .map(|()| RouteOutcome::DeliveredDirect)
        } else {
            let notified = self.notify(&stored);
            self.send(&stored)
                .await
                .map(|()| RouteOutcome::Broadcast { notified })
        };

        result.unwrap_or_else(|e| {
            warn!(
                "Delivery of {} for {} failed: {}",
                stored.id(),
                message.sender_id,
                e
            );
            RouteOutcome::DeliveryFailed
        })
    }

    async fn send_threads(&self, threads: &[ChatThread], recipient: &Identifier) -> Result<()> {
        let payload = self.codec().encode_history(threads)?;
        self.transport
            .send(&payload, &self.channel, Some(recipient))
            .await
    }

    fn codec(&self) -> Arc<dyn Codec> {
        self.codec.read().clone()
    }
}

/// Transport-side handle; holds the router weakly so the transport does not
/// keep it alive.
struct RouterHandle(Weak<ContentRouter>);

#[async_trait]
impl ChannelHandler for RouterHandle {
    async fn on_data(&self, data: String) {
        match self.0.upgrade() {
            Some(router) => {
                router.receive(&data).await;
            }
            None => debug!("Router dropped, ignoring inbound payload"),
        }
    }
}
