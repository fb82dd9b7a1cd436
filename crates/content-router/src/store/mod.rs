//! Stores behind the router
//!
//! The router only sees the [`ChatStore`] and [`FileStore`] contracts. A
//! [`StoreFactory`] builds them at startup and again on every reset.

pub mod chat;
pub mod files;

pub use chat::JsonChatStore;
pub use files::BlobFileStore;

use crate::codec::{Codec, JsonCodec};
use crate::config::RouterConfig;
use crate::error::Result;
use crate::models::{ChatMessage, ChatThread, FileMessage, InboundMessage};
use async_trait::async_trait;
use content_blobs::BlobStore;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Owner of chat history.
#[async_trait]
pub trait ChatStore: Send + Sync {
    /// Apply an inbound chat message. `None` means the message was rejected
    /// or referred to something that does not exist.
    async fn receive(&self, message: &InboundMessage) -> Result<Option<ChatMessage>>;

    /// All threads, oldest first.
    async fn threads(&self) -> Result<Vec<ChatThread>>;
}

/// Owner of file metadata and contents.
#[async_trait]
pub trait FileStore: Send + Sync {
    /// Apply an inbound file message. `None` means rejected or not found.
    async fn receive(&self, message: &InboundMessage) -> Result<Option<FileMessage>>;
}

/// The pair of stores a router owns.
#[derive(Clone)]
pub struct Stores {
    pub chat: Arc<dyn ChatStore>,
    pub files: Arc<dyn FileStore>,
}

#[async_trait]
pub trait StoreFactory: Send + Sync {
    /// Stores for a router starting up; existing state may be loaded.
    async fn open(&self) -> Result<Stores>;

    /// Empty stores, used by [`ContentRouter::reset`](crate::router::ContentRouter::reset).
    async fn fresh(&self) -> Result<Stores> {
        self.open().await
    }

    /// Codec paired with these stores.
    fn codec(&self) -> Arc<dyn Codec> {
        Arc::new(JsonCodec)
    }
}

/// JSON chat threads and blob-backed files under a [`RouterConfig`]'s directories.
#[derive(Clone, Debug)]
pub struct DiskStores {
    config: RouterConfig,
}

impl DiskStores {
    pub fn new(config: RouterConfig) -> Self {
        Self { config }
    }

    async fn build(&self) -> Result<(JsonChatStore, BlobFileStore)> {
        self.config.ensure_dirs().await?;

        let chat = JsonChatStore::open(&self.config.chat_dir).await?;
        let files = self.open_files().await?;

        Ok((chat, files))
    }

    async fn open_files(&self) -> Result<BlobFileStore> {
        let blobs = BlobStore::open(
            self.config.blob_dir.clone(),
            self.config.blob_meta_path.clone(),
        )
        .await?;
        Ok(BlobFileStore::new(blobs, self.config.max_file_size))
    }

    /// Sibling of the chat directory that holds the old threads while a
    /// reset is in progress.
    fn staging_dir(&self) -> PathBuf {
        let name = self
            .config
            .chat_dir
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("chats");
        self.config
            .chat_dir
            .with_file_name(format!("{}.reset-{}", name, Uuid::new_v4()))
    }

    async fn wipe(&self, files: &BlobFileStore) -> Result<JsonChatStore> {
        tokio::fs::create_dir_all(&self.config.chat_dir).await?;
        let chat = JsonChatStore::open(&self.config.chat_dir).await?;
        files.clear().await?;
        Ok(chat)
    }

    async fn restore(&self, staged: &Path) -> std::io::Result<()> {
        if tokio::fs::try_exists(&self.config.chat_dir).await? {
            tokio::fs::remove_dir_all(&self.config.chat_dir).await?;
        }
        tokio::fs::rename(staged, &self.config.chat_dir).await
    }
}

#[async_trait]
impl StoreFactory for DiskStores {
    async fn open(&self) -> Result<Stores> {
        let (chat, files) = self.build().await?;
        Ok(Stores {
            chat: Arc::new(chat),
            files: Arc::new(files),
        })
    }

    async fn fresh(&self) -> Result<Stores> {
        // Nothing is removed until every store has opened.
        self.config.ensure_dirs().await?;
        let files = self.open_files().await?;

        let staged = self.staging_dir();
        tokio::fs::rename(&self.config.chat_dir, &staged).await?;

        let chat = match self.wipe(&files).await {
            Ok(chat) => chat,
            Err(e) => {
                if let Err(restore_err) = self.restore(&staged).await {
                    error!(
                        "Failed to restore chat threads from {}: {}",
                        staged.display(),
                        restore_err
                    );
                }
                return Err(e);
            }
        };

        if let Err(e) = tokio::fs::remove_dir_all(&staged).await {
            warn!("Failed to remove {}: {}", staged.display(), e);
        }

        info!("Wiped chat and file storage for reset");
        Ok(Stores {
            chat: Arc::new(chat),
            files: Arc::new(files),
        })
    }
}
