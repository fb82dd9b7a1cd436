use crate::error::{BlobError, Result};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Descriptive fields supplied by the caller when a blob is written.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobInfo {
    pub file_name: String,
    pub content_type: Option<String>,
    /// Identifier of the peer that uploaded the blob.
    pub owner: String,
    #[serde(default)]
    pub thread_id: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobMetadata {
    pub key: String,
    #[serde(flatten)]
    pub info: BlobInfo,
    /// SHA-256 hash of blob content.
    pub content_hash: String,
    pub size: u64,
    pub stored_at: DateTime<Utc>,
}

#[derive(Clone, Debug)]
pub struct BlobStore {
    blob_dir: PathBuf,
    meta_conn: Arc<Mutex<Connection>>,
}

impl BlobStore {
    /// Open (or create) a store rooted at `blob_dir` with metadata in `meta_db_path`.
    pub async fn open(blob_dir: PathBuf, meta_db_path: PathBuf) -> Result<Self> {
        fs::create_dir_all(&blob_dir).await?;
        if let Some(parent) = meta_db_path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let conn = Connection::open(&meta_db_path)?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS meta (
                key TEXT PRIMARY KEY,
                value JSON
            )",
            [],
        )?;

        info!("Blob store opened at {:?}", blob_dir);

        Ok(Self {
            blob_dir,
            meta_conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub async fn get(&self, key: &str) -> Result<Option<(Bytes, BlobMetadata)>> {
        let Some(meta) = self.get_meta(key).await? else {
            return Ok(None);
        };

        let file_path = self.file_path(key);
        if !fs::try_exists(&file_path).await? {
            return Ok(None);
        }

        let data = fs::read(&file_path).await?;
        let actual = content_hash(&data);
        if actual != meta.content_hash {
            return Err(BlobError::ChecksumMismatch {
                key: key.to_string(),
                expected: meta.content_hash,
                actual,
            });
        }

        Ok(Some((Bytes::from(data), meta)))
    }

    pub async fn get_meta(&self, key: &str) -> Result<Option<BlobMetadata>> {
        let conn = self.meta_conn.lock().await;
        let mut stmt = conn.prepare("SELECT value FROM meta WHERE key = ?")?;
        let mut rows = stmt.query(params![key])?;

        match rows.next()? {
            Some(row) => {
                let value: String = row.get(0)?;
                Ok(Some(serde_json::from_str(&value)?))
            }
            None => Ok(None),
        }
    }

    /// Write `data` under `key`, replacing any previous blob with that key.
    pub async fn put(&self, key: &str, data: Bytes, info: BlobInfo) -> Result<BlobMetadata> {
        let meta = BlobMetadata {
            key: key.to_string(),
            info,
            content_hash: content_hash(&data),
            size: data.len() as u64,
            stored_at: Utc::now(),
        };

        let file_path = self.file_path(key);
        let temp_folder = self.blob_dir.join("tmp");
        atomic_write(&file_path, &data, &temp_folder).await?;

        {
            let conn = self.meta_conn.lock().await;
            let value = serde_json::to_string(&meta)?;
            conn.execute(
                "INSERT OR REPLACE INTO meta (key, value) VALUES (?, ?)",
                params![key, value],
            )?;
        }

        debug!("Stored blob {} ({} bytes)", key, meta.size);
        Ok(meta)
    }

    /// Remove a blob. Returns `false` if nothing was stored under `key`.
    pub async fn delete(&self, key: &str) -> Result<bool> {
        let removed = {
            let conn = self.meta_conn.lock().await;
            conn.execute("DELETE FROM meta WHERE key = ?", params![key])?
        };

        let file_path = self.file_path(key);
        if fs::try_exists(&file_path).await? {
            fs::remove_file(&file_path).await?;
        }

        Ok(removed > 0)
    }

    pub async fn list_keys(&self) -> Result<Vec<String>> {
        let conn = self.meta_conn.lock().await;
        let mut stmt = conn.prepare("SELECT key FROM meta ORDER BY key")?;
        let rows = stmt.query_map([], |row| row.get(0))?;

        let mut keys = Vec::new();
        for key in rows {
            keys.push(key?);
        }
        Ok(keys)
    }

    /// Drop every blob and its metadata.
    pub async fn clear(&self) -> Result<()> {
        {
            let conn = self.meta_conn.lock().await;
            conn.execute("DELETE FROM meta", [])?;
        }

        if fs::try_exists(&self.blob_dir).await? {
            fs::remove_dir_all(&self.blob_dir).await?;
        }
        fs::create_dir_all(&self.blob_dir).await?;

        info!("Cleared blob store at {:?}", self.blob_dir);
        Ok(())
    }

    fn file_path(&self, key: &str) -> PathBuf {
        self.blob_dir.join(encode_filename(key))
    }
}

pub fn content_hash(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

/// Map an arbitrary key onto a single safe path component.
pub fn encode_filename(key: &str) -> String {
    let mut encoded = String::with_capacity(key.len());
    for c in key.chars() {
        if matches!(
            c,
            '<' | '>' | ':' | '"' | '/' | '|' | '\\' | '?' | '*' | '%' | '\x00'..='\x1f' | '\x7f'
        ) {
            encoded.push_str(&format!("%{:02X}", c as u32));
        } else {
            encoded.push(c);
        }
    }

    // "." and ".." would escape the blob directory, "tmp" is the staging folder
    match encoded.as_str() {
        "" | "." | ".." | "tmp" => format!("{}.blob", encoded),
        _ => encoded,
    }
}

pub async fn atomic_write(dest: &Path, data: &[u8], temp_folder: &Path) -> Result<()> {
    fs::create_dir_all(temp_folder).await?;

    let temp_path = temp_folder.join(format!("tmp_{}", uuid::Uuid::new_v4()));
    fs::write(&temp_path, data).await?;

    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent).await?;
    }

    fs::rename(&temp_path, dest).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn open_store(dir: &TempDir) -> BlobStore {
        BlobStore::open(dir.path().join("blobs"), dir.path().join("meta.sqlite"))
            .await
            .unwrap()
    }

    fn info(name: &str) -> BlobInfo {
        BlobInfo {
            file_name: name.to_string(),
            content_type: Some("text/plain".into()),
            owner: "user1".into(),
            thread_id: None,
        }
    }

    #[tokio::test]
    async fn test_put_and_get() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir).await;

        let meta = store
            .put("file-1", Bytes::from("hello blob"), info("notes.txt"))
            .await
            .unwrap();
        assert_eq!(meta.size, 10);
        assert_eq!(meta.content_hash, content_hash(b"hello blob"));

        let (data, loaded) = store.get("file-1").await.unwrap().unwrap();
        assert_eq!(data, Bytes::from("hello blob"));
        assert_eq!(loaded.info.file_name, "notes.txt");
        assert_eq!(loaded.info.owner, "user1");
    }

    #[tokio::test]
    async fn test_missing_key_is_none() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir).await;

        assert!(store.get("nope").await.unwrap().is_none());
        assert!(!store.delete("nope").await.unwrap());
    }

    #[tokio::test]
    async fn test_corruption_is_detected() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir).await;

        store
            .put("file-1", Bytes::from("original"), info("a.txt"))
            .await
            .unwrap();
        std::fs::write(dir.path().join("blobs").join("file-1"), "tampered").unwrap();

        let err = store.get("file-1").await.unwrap_err();
        assert!(matches!(err, BlobError::ChecksumMismatch { .. }));
    }

    #[tokio::test]
    async fn test_delete_and_clear() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir).await;

        store.put("a", Bytes::from("1"), info("a")).await.unwrap();
        store.put("b", Bytes::from("2"), info("b")).await.unwrap();
        assert_eq!(store.list_keys().await.unwrap(), vec!["a", "b"]);

        assert!(store.delete("a").await.unwrap());
        assert_eq!(store.list_keys().await.unwrap(), vec!["b"]);

        store.clear().await.unwrap();
        assert!(store.list_keys().await.unwrap().is_empty());
        assert!(store.get("b").await.unwrap().is_none());
    }

    #[test]
    fn test_encode_filename() {
        assert_eq!(encode_filename("abc-123"), "abc-123");
        assert_eq!(encode_filename("a/b"), "a%2Fb");
        assert_eq!(encode_filename(".."), "...blob");
        assert_eq!(encode_filename("tmp"), "tmp.blob");
    }
}
