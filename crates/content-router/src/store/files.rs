//! File transfers backed by the blob store

use super::FileStore;
use crate::error::Result;
use crate::models::{FileMessage, InboundMessage, MessageEvent};
use async_trait::async_trait;
use bytes::Bytes;
use content_blobs::{BlobInfo, BlobMetadata, BlobStore};
use tracing::{debug, warn};
use uuid::Uuid;

pub struct BlobFileStore {
    blobs: BlobStore,
    max_file_size: u64,
}

impl BlobFileStore {
    pub fn new(blobs: BlobStore, max_file_size: u64) -> Self {
        Self {
            blobs,
            max_file_size,
        }
    }

    /// Remove every stored file.
    pub async fn clear(&self) -> Result<()> {
        Ok(self.blobs.clear().await?)
    }

    async fn upload(&self, message: &InboundMessage) -> Result<Option<FileMessage>> {
        let Some(file) = &message.file else {
            debug!("File upload from {} without a body", message.sender_id);
            return Ok(None);
        };

        if file.data.len() as u64 > self.max_file_size {
            warn!(
                "Rejecting {} from {}: {} bytes exceeds limit of {}",
                file.file_name,
                message.sender_id,
                file.data.len(),
                self.max_file_size
            );
            return Ok(None);
        }

        let id = Uuid::new_v4().to_string();
        let info = BlobInfo {
            file_name: file.file_name.clone(),
            content_type: file.content_type.clone(),
            owner: message.sender_id.to_string(),
            thread_id: message.thread_id.clone(),
        };
        let meta = self.blobs.put(&id, file.data.clone(), info).await?;

        Ok(Some(to_file_message(meta, MessageEvent::Send, None)))
    }

    async fn download(&self, message: &InboundMessage) -> Result<Option<FileMessage>> {
        let Some(id) = message.message_id.as_deref() else {
            return Ok(None);
        };

        Ok(self
            .blobs
            .get(id)
            .await?
            .map(|(data, meta)| to_file_message(meta, MessageEvent::Download, Some(data))))
    }

    async fn remove(&self, message: &InboundMessage) -> Result<Option<FileMessage>> {
        let Some(id) = message.message_id.as_deref() else {
            return Ok(None);
        };
        let Some(meta) = self.blobs.get_meta(id).await? else {
            return Ok(None);
        };
        if meta.info.owner != message.sender_id.as_str() {
            return Ok(None);
        }

        self.blobs.delete(id).await?;
        Ok(Some(to_file_message(meta, MessageEvent::Delete, None)))
    }
}

#[async_trait]
impl FileStore for BlobFileStore {
    async fn receive(&self, message: &InboundMessage) -> Result<Option<FileMessage>> {
        match message.event {
            MessageEvent::Send => self.upload(message).await,
            MessageEvent::Download => self.download(message).await,
            MessageEvent::Delete => self.remove(message).await,
            MessageEvent::Edit | MessageEvent::Star | MessageEvent::Other => Ok(None),
        }
    }
}

fn to_file_message(meta: BlobMetadata, event: MessageEvent, data: Option<Bytes>) -> FileMessage {
    FileMessage {
        id: meta.key,
        thread_id: meta.info.thread_id,
        sender_id: meta.info.owner.into(),
        file_name: meta.info.file_name,
        content_type: meta.info.content_type,
        size: meta.size,
        content_hash: meta.content_hash,
        event,
        created_at: meta.stored_at,
        data,
    }
}
