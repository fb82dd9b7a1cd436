//! WebSocket bridge between remote peers and the [`PeerHub`]
//!
//! Every text message is a JSON [`Frame`]. Inbound frames are dispatched in
//! the connection's task; outbound frames are drained from the peer's queue.

use super::{Frame, PeerHub};
use crate::models::Identifier;
use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tracing::{debug, warn};

pub async fn serve_peer(socket: WebSocket, peer_id: Identifier, hub: Arc<PeerHub>) {
    let connection = hub.connect(peer_id.clone());
    let conn_id = connection.conn_id;
    let mut outbound = connection.outbound;

    let (mut sender, mut receiver) = socket.split();

    let hub_to_peer = async {
        while let Some(frame) = outbound.recv().await {
            let text = serde_json::to_string(&frame)?;
            sender.send(Message::Text(text.into())).await?;
        }
        Ok::<(), anyhow::Error>(())
    };

    let peer_to_hub = async {
        while let Some(msg) = receiver.next().await {
            match msg? {
                Message::Text(text) => match serde_json::from_str::<Frame>(text.as_str()) {
                    Ok(frame) => {
                        hub.dispatch(frame).await;
                    }
                    Err(e) => warn!("Ignoring malformed frame from {}: {}", peer_id, e),
                },
                Message::Close(_) => break,
                _ => {}
            }
        }
        Ok::<(), anyhow::Error>(())
    };

    tokio::select! {
        result = hub_to_peer => {
            if let Err(err) = result {
                debug!("Writer for {} closed: {}", peer_id, err);
            }
        }
        result = peer_to_hub => {
            if let Err(err) = result {
                debug!("Reader for {} closed: {}", peer_id, err);
            }
        }
    }

    hub.disconnect(&peer_id, conn_id);
}
