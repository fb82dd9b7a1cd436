//! Transport contracts
//!
//! The router writes encoded payloads through [`Transport::send`] and is fed
//! inbound payloads through the [`ChannelHandler`] it registers for its channel.

pub mod hub;
pub mod ws;

pub use hub::{PeerConnection, PeerHub};

use crate::error::Result;
use crate::models::Identifier;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Receives every payload arriving on one channel.
#[async_trait]
pub trait ChannelHandler: Send + Sync {
    async fn on_data(&self, data: String);
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// Deliver `payload` on `channel` to `recipient`, or to every connected
    /// peer when `recipient` is `None`.
    async fn send(&self, payload: &str, channel: &str, recipient: Option<&Identifier>)
        -> Result<()>;

    /// Route inbound payloads for `channel` to `handler`, replacing any previous one.
    fn subscribe(&self, channel: &str, handler: Arc<dyn ChannelHandler>);
}

/// Unit carried on a peer connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Frame {
    pub channel: String,
    pub data: String,
}
