use thiserror::Error;

#[derive(Debug, Error)]
pub enum BlobError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("metadata database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("metadata encoding error: {0}")]
    Metadata(#[from] serde_json::Error),

    #[error("checksum mismatch for blob {key}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        key: String,
        expected: String,
        actual: String,
    },
}

pub type Result<T> = std::result::Result<T, BlobError>;
