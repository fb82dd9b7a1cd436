//! Router configuration

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::warn;

use crate::router::ContentRouter;
use crate::transport::PeerHub;

pub const DEFAULT_CHANNEL: &str = "content";
const DEFAULT_ADDR: ([u8; 4], u16) = ([0, 0, 0, 0], 3001);

/// Configuration for the content router process
#[derive(Clone, Debug)]
pub struct RouterConfig {
    /// Chat thread files
    pub chat_dir: PathBuf,
    /// File transfer blobs
    pub blob_dir: PathBuf,
    /// SQLite database holding blob metadata
    pub blob_meta_path: PathBuf,
    /// Transport channel the router listens on
    pub channel: String,
    pub bind_addr: SocketAddr,
    /// Max accepted file size in bytes
    pub max_file_size: u64,
}

impl Default for RouterConfig {
    fn default() -> Self {
        let root = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("content-router");
        Self::with_base_dir(root)
    }
}

impl RouterConfig {
    /// Create config with all storage under `base_dir`
    pub fn with_base_dir(base_dir: impl AsRef<Path>) -> Self {
        let base_dir = base_dir.as_ref();
        Self {
            chat_dir: base_dir.join("chats"),
            blob_dir: base_dir.join("blobs"),
            blob_meta_path: base_dir.join("blob-meta.sqlite"),
            channel: DEFAULT_CHANNEL.to_string(),
            bind_addr: SocketAddr::from(DEFAULT_ADDR),
            max_file_size: 50 * 1024 * 1024,
        }
    }

    /// Build from `CONTENT_ROUTER_*` environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let mut config = match std::env::var("CONTENT_ROUTER_ROOT") {
            Ok(root) => Self::with_base_dir(root),
            Err(_) => Self::default(),
        };

        if let Ok(channel) = std::env::var("CONTENT_ROUTER_CHANNEL") {
            config.channel = channel;
        }

        if let Ok(addr) = std::env::var("CONTENT_ROUTER_ADDR") {
            match addr.parse() {
                Ok(addr) => config.bind_addr = addr,
                Err(e) => warn!("Ignoring invalid CONTENT_ROUTER_ADDR {:?}: {}", addr, e),
            }
        }

        if let Ok(mb) = std::env::var("CONTENT_ROUTER_MAX_FILE_MB") {
            match mb.parse::<u64>() {
                Ok(mb) => config.max_file_size = mb * 1024 * 1024,
                Err(e) => warn!("Ignoring invalid CONTENT_ROUTER_MAX_FILE_MB {:?}: {}", mb, e),
            }
        }

        config
    }

    /// Ensure all directories exist
    pub async fn ensure_dirs(&self) -> std::io::Result<()> {
        tokio::fs::create_dir_all(&self.chat_dir).await?;
        tokio::fs::create_dir_all(&self.blob_dir).await?;
        if let Some(parent) = self.blob_meta_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        Ok(())
    }
}

/// App state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub router: Arc<ContentRouter>,
    pub hub: Arc<PeerHub>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_dir_layout() {
        let config = RouterConfig::with_base_dir("/tmp/router");
        assert_eq!(config.chat_dir, PathBuf::from("/tmp/router/chats"));
        assert_eq!(config.blob_dir, PathBuf::from("/tmp/router/blobs"));
        assert_eq!(config.channel, DEFAULT_CHANNEL);
        assert_eq!(config.bind_addr.port(), 3001);
    }
}
