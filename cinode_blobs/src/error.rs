//! Encoder error kinds.

use cinode_core::{EntrypointError, KeyError, LinkError, StoreError};

/// Errors surfaced by the blob encoder.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum EncoderError {
    #[error("blob not found")]
    NotFound,

    #[error("blob failed validation: {0}")]
    ValidationFailed(String),

    #[error("key validation block mismatch")]
    InvalidKeyValidationBlock,

    #[error("derived IV does not match the stored IV")]
    IvMismatch,

    #[error("link chain exceeded {0} redirects")]
    TooManyRedirects(u32),

    #[error("static blobs cannot be updated")]
    UpdateNotSupported,

    #[error(transparent)]
    Entrypoint(#[from] EntrypointError),

    #[error(transparent)]
    Key(#[from] KeyError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("datastore error: {0}")]
    Store(StoreError),
}

impl From<StoreError> for EncoderError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => EncoderError::NotFound,
            StoreError::ValidationFailed(inner) => EncoderError::ValidationFailed(inner.to_string()),
            other => EncoderError::Store(other),
        }
    }
}

impl From<LinkError> for EncoderError {
    fn from(err: LinkError) -> Self {
        EncoderError::ValidationFailed(err.to_string())
    }
}
