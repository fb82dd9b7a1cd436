use thiserror::Error;

/// Failures raised by the router's collaborators.
///
/// None of these escape [`ContentRouter::receive`](crate::router::ContentRouter::receive);
/// they are logged there and turned into a [`RouteOutcome`](crate::router::RouteOutcome).
#[derive(Debug, Error)]
pub enum Error {
    #[error("codec error: {0}")]
    Codec(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("unknown recipient: {0}")]
    UnknownRecipient(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Blob(#[from] content_blobs::BlobError),
}

pub type Result<T> = core::result::Result<T, Error>;

