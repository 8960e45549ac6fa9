//! The datastore contract.
//!
//! A datastore is a plain content-addressed byte store keyed by
//! [`BlobName`]. It validates on ingest (a static blob must hash to its
//! name, a dynamic link must pass public-layer validation and the merge
//! rule) but never sees plaintext or key material.

use std::fmt;

use async_trait::async_trait;
use tokio::io::AsyncRead;

use crate::ingest::ValidationError;
use crate::name::BlobName;

/// Boxed reader over blob bytes.
pub type BlobReader = Box<dyn AsyncRead + Send + Unpin>;

/// Errors surfaced by datastore operations.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum StoreError {
    #[error("blob not found")]
    NotFound,

    #[error("blob failed validation: {0}")]
    ValidationFailed(#[from] ValidationError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Raw blob storage.
///
/// `update` commits atomically: a blob either becomes visible with content
/// that passed validation, or not at all. Updates for a given dynamic link
/// are serialised per blob name; concurrent updates resolve through the
/// merge rule (higher `content_version` wins).
#[async_trait]
pub trait DataStore: fmt::Debug + Send + Sync + 'static {
    /// Opens a blob for reading.
    async fn open(&self, name: &BlobName) -> Result<BlobReader, StoreError>;

    /// Ingests blob content, validating it against `name` first.
    ///
    /// For dynamic links an older incoming version is silently ignored in
    /// favour of the stored one.
    async fn update(&self, name: &BlobName, data: BlobReader) -> Result<(), StoreError>;

    /// Whether a blob with this name is stored.
    async fn exists(&self, name: &BlobName) -> Result<bool, StoreError>;

    /// Removes a blob. `NotFound` if it was never stored.
    async fn delete(&self, name: &BlobName) -> Result<(), StoreError>;
}

#[async_trait]
impl<T: DataStore + ?Sized> DataStore for std::sync::Arc<T> {
    async fn open(&self, name: &BlobName) -> Result<BlobReader, StoreError> {
        (**self).open(name).await
    }

    async fn update(&self, name: &BlobName, data: BlobReader) -> Result<(), StoreError> {
        (**self).update(name, data).await
    }

    async fn exists(&self, name: &BlobName) -> Result<bool, StoreError> {
        (**self).exists(name).await
    }

    async fn delete(&self, name: &BlobName) -> Result<(), StoreError> {
        (**self).delete(name).await
    }
}
