//! Blob storage for file transfers.
//!
//! File bodies are written to disk under a sanitized key, metadata is kept
//! in a SQLite table and every read is verified against the SHA-256 hash
//! recorded at write time.

pub mod error;
pub mod store;

pub use error::{BlobError, Result};
pub use store::{atomic_write, content_hash, encode_filename, BlobInfo, BlobMetadata, BlobStore};
