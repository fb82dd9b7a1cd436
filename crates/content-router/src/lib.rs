//! Content routing server
//!
//! Receives chat and file envelopes from connected peers, applies them to the
//! chat and file stores one at a time, and fans the results back out.

pub mod codec;
pub mod config;
pub mod error;
pub mod handlers;
pub mod models;
pub mod router;
pub mod stats;
pub mod store;
pub mod subscriber;
pub mod transport;

pub use codec::{Codec, JsonCodec};
pub use config::{AppState, RouterConfig};
pub use error::{Error, Result};
pub use router::{ContentRouter, DropReason, RouteOutcome};
pub use subscriber::{BroadcastSubscriber, Subscriber};

use std::sync::Arc;
use store::DiskStores;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};
use transport::PeerHub;

pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "content_router=debug,content_blobs=info,info".into());

    if tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init()
        .is_err()
    {
        // Already set, ignore
    }
}

pub async fn run() -> anyhow::Result<()> {
    init_tracing();

    let config = RouterConfig::from_env();
    config.ensure_dirs().await?;

    info!("=== Content Router ===");
    info!("Chat storage: {:?}", config.chat_dir);
    info!("Blob storage: {:?}", config.blob_dir);

    let hub = Arc::new(PeerHub::new());
    let router = ContentRouter::new(
        config.channel.clone(),
        hub.clone(),
        Arc::new(DiskStores::new(config.clone())),
    )
    .await?;

    // Activity log for routed messages
    let activity = BroadcastSubscriber::new(256);
    let mut feed = activity.subscribe();
    router.subscribe(Arc::new(activity));
    tokio::spawn(async move {
        loop {
            match feed.recv().await {
                Ok(message) => info!("Routed {:?} {}", message.event(), message.id()),
                Err(RecvError::Lagged(skipped)) => warn!("Activity log skipped {} messages", skipped),
                Err(RecvError::Closed) => break,
            }
        }
    });

    let app = handlers::router(AppState {
        router: router.clone(),
        hub,
    });

    info!("Listening on http://{}", config.bind_addr);
    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
