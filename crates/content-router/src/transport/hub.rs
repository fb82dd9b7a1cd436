//! In-process transport
//!
//! Each connected peer owns an unbounded outbound queue; a connection task
//! (see [`ws`](super::ws)) drains it onto the socket.

use super::{ChannelHandler, Frame, Transport};
use crate::error::{Error, Result};
use crate::models::Identifier;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info};
use uuid::Uuid;

struct Peer {
    conn_id: Uuid,
    tx: mpsc::UnboundedSender<Frame>,
}

/// Returned by [`PeerHub::connect`]; `outbound` yields frames addressed to the peer.
pub struct PeerConnection {
    pub conn_id: Uuid,
    pub outbound: mpsc::UnboundedReceiver<Frame>,
}

#[derive(Default)]
pub struct PeerHub {
    peers: RwLock<HashMap<Identifier, Peer>>,
    handlers: RwLock<HashMap<String, Arc<dyn ChannelHandler>>>,
}

impl PeerHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a peer. A second connection with the same id replaces the first.
    pub fn connect(&self, peer_id: Identifier) -> PeerConnection {
        let (tx, outbound) = mpsc::unbounded_channel();
        let conn_id = Uuid::new_v4();

        let previous = self.peers.write().insert(peer_id.clone(), Peer { conn_id, tx });
        if previous.is_some() {
            info!("Peer {} reconnected, dropping previous connection", peer_id);
        } else {
            info!("Peer {} connected", peer_id);
        }

        PeerConnection { conn_id, outbound }
    }

    /// Unregister a peer, unless it has since reconnected under a new connection.
    pub fn disconnect(&self, peer_id: &Identifier, conn_id: Uuid) {
        let mut peers = self.peers.write();
        if peers.get(peer_id).is_some_and(|p| p.conn_id == conn_id) {
            peers.remove(peer_id);
            info!("Peer {} disconnected", peer_id);
        }
    }

    pub fn connected(&self) -> Vec<Identifier> {
        let mut ids: Vec<_> = self.peers.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Hand an inbound frame to its channel's handler. Returns `false` when
    /// nothing listens on that channel.
    pub async fn dispatch(&self, frame: Frame) -> bool {
        let handler = self.handlers.read().get(&frame.channel).cloned();
        match handler {
            Some(handler) => {
                handler.on_data(frame.data).await;
                true
            }
            None => {
                debug!("No handler for channel {}, dropping frame", frame.channel);
                false
            }
        }
    }
}

#[async_trait]
impl Transport for PeerHub {
    async fn send(
        &self,
        payload: &str,
        channel: &str,
        recipient: Option<&Identifier>,
    ) -> Result<()> {
        let frame = Frame {
            channel: channel.to_string(),
            data: payload.to_string(),
        };
        let peers = self.peers.read();

        match recipient {
            Some(id) => {
                let peer = peers
                    .get(id)
                    .ok_or_else(|| Error::UnknownRecipient(id.to_string()))?;
                peer.tx
                    .send(frame)
                    .map_err(|_| Error::Transport(format!("connection to {} is closed", id)))
            }
            None => {
                let mut delivered = 0;
                for (id, peer) in peers.iter() {
                    if peer.tx.send(frame.clone()).is_ok() {
                        delivered += 1;
                    } else {
                        debug!("Skipping closed connection to {}", id);
                    }
                }
                debug!("Broadcast on {} reached {} peers", channel, delivered);
                Ok(())
            }
        }
    }

    fn subscribe(&self, channel: &str, handler: Arc<dyn ChannelHandler>) {
        self.handlers.write().insert(channel.to_string(), handler);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Collect(Mutex<Vec<String>>);

    #[async_trait]
    impl ChannelHandler for Collect {
        async fn on_data(&self, data: String) {
            self.0.lock().push(data);
        }
    }

    #[tokio::test]
    async fn test_targeted_and_broadcast_sends() {
        let hub = PeerHub::new();
        let mut a = hub.connect("a".into());
        let mut b = hub.connect("b".into());

        hub.send("only-a", "content", Some(&"a".into())).await.unwrap();
        hub.send("all", "content", None).await.unwrap();

        assert_eq!(a.outbound.recv().await.unwrap().data, "only-a");
        assert_eq!(a.outbound.recv().await.unwrap().data, "all");
        let frame = b.outbound.recv().await.unwrap();
        assert_eq!(frame.data, "all");
        assert_eq!(frame.channel, "content");
        assert!(b.outbound.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_unknown_recipient_is_an_error() {
        let hub = PeerHub::new();
        let err = hub.send("x", "content", Some(&"ghost".into())).await.unwrap_err();
        assert!(matches!(err, Error::UnknownRecipient(_)));
    }

    #[tokio::test]
    async fn test_stale_disconnect_keeps_new_connection() {
        let hub = PeerHub::new();
        let first = hub.connect("a".into());
        let _second = hub.connect("a".into());

        hub.disconnect(&"a".into(), first.conn_id);
        assert_eq!(hub.connected(), vec![Identifier::from("a")]);
    }

    #[tokio::test]
    async fn test_dispatch_by_channel() {
        let hub = PeerHub::new();
        let handler = Arc::new(Collect::default());
        hub.subscribe("content", handler.clone());

        let frame = |channel: &str| Frame {
            channel: channel.to_string(),
            data: "payload".to_string(),
        };
        assert!(hub.dispatch(frame("content")).await);
        assert!(!hub.dispatch(frame("whiteboard")).await);
        assert_eq!(*handler.0.lock(), vec!["payload".to_string()]);
    }
}
