//! JSON-backed chat history
//!
//! Each thread is kept in memory and written to `<thread_id>.json` after every
//! accepted mutation (write to a temp file, then rename).

use super::ChatStore;
use crate::error::Result;
use crate::models::{ChatMessage, ChatThread, InboundMessage, MessageEvent};
use async_trait::async_trait;
use chrono::Utc;
use content_blobs::encode_filename;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub struct JsonChatStore {
    /// `None` keeps everything in memory
    storage_dir: Option<PathBuf>,
    threads: RwLock<HashMap<String, ChatThread>>,
}

impl JsonChatStore {
    pub fn in_memory() -> Self {
        Self {
            storage_dir: None,
            threads: RwLock::new(HashMap::new()),
        }
    }

    /// Open a store persisted under `storage_dir`, loading existing threads.
    pub async fn open(storage_dir: impl AsRef<Path>) -> Result<Self> {
        let storage_dir = storage_dir.as_ref().to_path_buf();
        fs::create_dir_all(&storage_dir).await?;

        let threads = load_existing_threads(&storage_dir).await?;
        info!(
            "JSON ChatStore opened at {:?} with {} threads",
            storage_dir,
            threads.len()
        );

        Ok(Self {
            storage_dir: Some(storage_dir),
            threads: RwLock::new(threads),
        })
    }

    async fn save_thread(&self, thread: &ChatThread) -> Result<()> {
        let Some(dir) = &self.storage_dir else {
            return Ok(());
        };

        let path = dir.join(format!("{}.json", encode_filename(&thread.id)));
        let temp_path = path.with_extension("tmp");

        let json = serde_json::to_string_pretty(thread)?;
        fs::write(&temp_path, json).await?;
        fs::rename(&temp_path, &path).await?;

        Ok(())
    }

    async fn post(&self, message: &InboundMessage) -> Result<Option<ChatMessage>> {
        let mut threads = self.threads.write().await;

        let thread_id = message
            .thread_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let mut thread = threads
            .get(&thread_id)
            .cloned()
            .unwrap_or_else(|| ChatThread::new(thread_id.clone()));

        if let Some(reply_to) = &message.reply_to {
            if thread.find(reply_to).is_none() {
                debug!("Reply target {} not in thread {}", reply_to, thread_id);
                return Ok(None);
            }
        }

        let stored = ChatMessage {
            id: Uuid::new_v4().to_string(),
            thread_id: thread_id.clone(),
            sender_id: message.sender_id.clone(),
            content: message.content.clone(),
            reply_to: message.reply_to.clone(),
            starred: false,
            deleted: false,
            event: MessageEvent::Send,
            created_at: Utc::now(),
            edited_at: None,
        };
        thread.messages.push(stored.clone());

        self.save_thread(&thread).await?;
        threads.insert(thread_id, thread);

        Ok(Some(stored))
    }

    /// Apply `change` to an existing message. The closure returns `false` to reject.
    async fn update<F>(&self, message: &InboundMessage, change: F) -> Result<Option<ChatMessage>>
    where
        F: FnOnce(&mut ChatMessage) -> bool,
    {
        let Some(message_id) = message.message_id.as_deref() else {
            return Ok(None);
        };

        let mut threads = self.threads.write().await;
        let Some(thread_id) = locate(&threads, message.thread_id.as_deref(), message_id) else {
            return Ok(None);
        };
        let Some(mut thread) = threads.get(&thread_id).cloned() else {
            return Ok(None);
        };
        let Some(target) = thread.find_mut(message_id) else {
            return Ok(None);
        };

        if !change(target) {
            return Ok(None);
        }
        target.event = message.event;
        let updated = target.clone();

        self.save_thread(&thread).await?;
        threads.insert(thread_id, thread);

        Ok(Some(updated))
    }
}

#[async_trait]
impl ChatStore for JsonChatStore {
    async fn receive(&self, message: &InboundMessage) -> Result<Option<ChatMessage>> {
        let sender = &message.sender_id;
        match message.event {
            MessageEvent::Send => self.post(message).await,
            MessageEvent::Edit => {
                self.update(message, |m| {
                    if m.deleted || &m.sender_id != sender {
                        return false;
                    }
                    m.content = message.content.clone();
                    m.edited_at = Some(Utc::now());
                    true
                })
                .await
            }
            MessageEvent::Delete => {
                self.update(message, |m| {
                    if m.deleted || &m.sender_id != sender {
                        return false;
                    }
                    m.content.clear();
                    m.deleted = true;
                    m.edited_at = Some(Utc::now());
                    true
                })
                .await
            }
            MessageEvent::Star => {
                self.update(message, |m| {
                    if m.deleted {
                        return false;
                    }
                    m.starred = !m.starred;
                    true
                })
                .await
            }
            MessageEvent::Download | MessageEvent::Other => Ok(None),
        }
    }

    async fn threads(&self) -> Result<Vec<ChatThread>> {
        let threads = self.threads.read().await;
        let mut all: Vec<ChatThread> = threads.values().cloned().collect();
        all.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(all)
    }
}

/// Find the thread holding `message_id`, preferring the thread named by the sender.
fn locate(
    threads: &HashMap<String, ChatThread>,
    thread_id: Option<&str>,
    message_id: &str,
) -> Option<String> {
    match thread_id {
        Some(id) => threads
            .get(id)
            .filter(|t| t.find(message_id).is_some())
            .map(|t| t.id.clone()),
        None => threads
            .values()
            .find(|t| t.find(message_id).is_some())
            .map(|t| t.id.clone()),
    }
}

async fn load_existing_threads(dir: &Path) -> Result<HashMap<String, ChatThread>> {
    let mut threads = HashMap::new();
    let mut entries = fs::read_dir(dir).await?;

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().and_then(|s| s.to_str()) != Some("json") {
            continue;
        }

        let loaded = match fs::read_to_string(&path).await {
            Ok(content) => serde_json::from_str::<ChatThread>(&content).map_err(|e| e.to_string()),
            Err(e) => Err(e.to_string()),
        };
        match loaded {
            Ok(thread) => {
                threads.insert(thread.id.clone(), thread);
            }
            Err(e) => warn!("Failed to load thread from {:?}: {}", path, e),
        }
    }

    Ok(threads)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MessageKind;
    use tempfile::TempDir;

    fn chat(event: MessageEvent, sender: &str) -> InboundMessage {
        InboundMessage::new(MessageKind::Chat, event, sender)
    }

    #[tokio::test]
    async fn test_send_creates_thread() {
        let store = JsonChatStore::in_memory();

        let msg = store
            .receive(&chat(MessageEvent::Send, "3").with_thread("t1").with_content("hi"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(msg.thread_id, "t1");
        assert_eq!(msg.content, "hi");

        let threads = store.threads().await.unwrap();
        assert_eq!(threads.len(), 1);
        assert_eq!(threads[0].messages, vec![msg]);
    }

    #[tokio::test]
    async fn test_send_without_thread_opens_new_one() {
        let store = JsonChatStore::in_memory();

        let a = store
            .receive(&chat(MessageEvent::Send, "1").with_content("a"))
            .await
            .unwrap()
            .unwrap();
        let b = store
            .receive(&chat(MessageEvent::Send, "1").with_content("b"))
            .await
            .unwrap()
            .unwrap();
        assert_ne!(a.thread_id, b.thread_id);
        assert_eq!(store.threads().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_reply_to_missing_message_is_rejected() {
        let store = JsonChatStore::in_memory();

        let result = store
            .receive(
                &chat(MessageEvent::Send, "1")
                    .with_thread("t1")
                    .with_reply_to("ghost"),
            )
            .await
            .unwrap();
        assert!(result.is_none());
        assert!(store.threads().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_only_sender_can_edit_or_delete() {
        let store = JsonChatStore::in_memory();
        let original = store
            .receive(&chat(MessageEvent::Send, "1").with_thread("t1").with_content("v1"))
            .await
            .unwrap()
            .unwrap();

        let stranger_edit = chat(MessageEvent::Edit, "2")
            .with_message_id(&original.id)
            .with_content("hacked");
        assert!(store.receive(&stranger_edit).await.unwrap().is_none());

        let edit = chat(MessageEvent::Edit, "1")
            .with_message_id(&original.id)
            .with_content("v2");
        let edited = store.receive(&edit).await.unwrap().unwrap();
        assert_eq!(edited.content, "v2");
        assert_eq!(edited.event, MessageEvent::Edit);
        assert!(edited.edited_at.is_some());

        let delete = chat(MessageEvent::Delete, "1").with_message_id(&original.id);
        let deleted = store.receive(&delete).await.unwrap().unwrap();
        assert!(deleted.deleted);
        assert!(deleted.content.is_empty());

        // Tombstones can't be edited back to life
        assert!(store.receive(&edit).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_star_toggles() {
        let store = JsonChatStore::in_memory();
        let original = store
            .receive(&chat(MessageEvent::Send, "1").with_thread("t1"))
            .await
            .unwrap()
            .unwrap();

        let star = chat(MessageEvent::Star, "2")
            .with_thread("t1")
            .with_message_id(&original.id);
        assert!(store.receive(&star).await.unwrap().unwrap().starred);
        assert!(!store.receive(&star).await.unwrap().unwrap().starred);
    }

    #[tokio::test]
    async fn test_download_and_unknown_targets_are_absent() {
        let store = JsonChatStore::in_memory();
        assert!(store
            .receive(&chat(MessageEvent::Download, "1").with_message_id("x"))
            .await
            .unwrap()
            .is_none());
        assert!(store
            .receive(&chat(MessageEvent::Star, "1").with_message_id("x"))
            .await
            .unwrap()
            .is_none());
        assert!(store
            .receive(&chat(MessageEvent::Edit, "1"))
            .await
            .unwrap()
            .is_none());
        assert!(store
            .receive(&chat(MessageEvent::Other, "1").with_content("?"))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_threads_survive_reopen() {
        let dir = TempDir::new().unwrap();

        {
            let store = JsonChatStore::open(dir.path()).await.unwrap();
            store
                .receive(
                    &chat(MessageEvent::Send, "1")
                        .with_thread("room/1")
                        .with_content("persisted"),
                )
                .await
                .unwrap();
        }

        std::fs::write(dir.path().join("broken.json"), "{ malformed").unwrap();

        let store = JsonChatStore::open(dir.path()).await.unwrap();
        let threads = store.threads().await.unwrap();
        assert_eq!(threads.len(), 1);
        assert_eq!(threads[0].id, "room/1");
        assert_eq!(threads[0].messages[0].content, "persisted");
    }
}
