//! In-memory datastore backend.
//!
//! Useful for tests and as a cache layer. Ingest validation and the
//! dynamic-link merge rule are applied exactly as in the persistent
//! backends; the map entry is held locked across the read-validate-commit
//! step so updates for one blob name are serialised.

use async_trait::async_trait;
use bytes::Bytes;
use cinode_core::{
    BlobName, BlobReader, DataStore, IngestDecision, StoreError, ingest,
};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::io::AsyncReadExt;
use tracing::debug;

/// Blob store holding everything in process memory.
#[derive(Debug, Default)]
pub struct MemoryDataStore {
    blobs: DashMap<BlobName, Bytes>,
}

impl MemoryDataStore {
    /// Creates a new, empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored blobs.
    pub fn len(&self) -> usize {
        self.blobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty()
    }
}

#[async_trait]
impl DataStore for MemoryDataStore {
    async fn open(&self, name: &BlobName) -> Result<BlobReader, StoreError> {
        let blob = self.blobs.get(name).ok_or(StoreError::NotFound)?;
        Ok(Box::new(std::io::Cursor::new(blob.to_vec())))
    }

    async fn update(&self, name: &BlobName, mut data: BlobReader) -> Result<(), StoreError> {
        let mut incoming = Vec::new();
        data.read_to_end(&mut incoming).await?;
        let incoming = Bytes::from(incoming);

        // The entry guard stays held across validate-and-commit, so
        // updates for one blob name are serialised.
        match self.blobs.entry(*name) {
            Entry::Occupied(mut occupied) => {
                let current = occupied.get().clone();
                match ingest(name, incoming, Some(&current))? {
                    IngestDecision::Commit(bytes) => {
                        occupied.insert(bytes);
                    }
                    IngestDecision::KeepCurrent => {
                        debug!(name = %name.fmt_short(), "kept stored blob over incoming one");
                    }
                }
            }
            Entry::Vacant(vacant) => {
                if let IngestDecision::Commit(bytes) = ingest(name, incoming, None)? {
                    vacant.insert(bytes);
                }
            }
        }
        Ok(())
    }

    async fn exists(&self, name: &BlobName) -> Result<bool, StoreError> {
        Ok(self.blobs.contains_key(name))
    }

    async fn delete(&self, name: &BlobName) -> Result<(), StoreError> {
        self.blobs.remove(name).ok_or(StoreError::NotFound)?;
        Ok(())
    }
}
