//! Multi-source fan-out datastore.
//!
//! Combines several datastores behind the [`DataStore`] contract:
//!
//! - **Reads** (`open`, `exists`): sources are probed in order, the first
//!   hit wins. A failing source is logged and skipped.
//! - **Writes** (`update`): the first source is the primary and must
//!   succeed; the remaining sources are updated best-effort.
//! - **Delete**: fanned out to every source; succeeds if any source held
//!   the blob.
//!
//! Because the incoming reader can only be consumed once, `update`
//! buffers the blob in memory before fanning it out.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use cinode_core::{BlobName, BlobReader, DataStore, StoreError};
use futures::future::join_all;
use tokio::io::AsyncReadExt;
use tracing::{debug, warn};

/// Datastore reading from and writing to several underlying sources.
#[derive(Clone)]
pub struct MultiDataStore {
    sources: Vec<Arc<dyn DataStore>>,
}

impl fmt::Debug for MultiDataStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MultiDataStore")
            .field("sources", &self.sources.len())
            .finish()
    }
}

impl MultiDataStore {
    /// Creates a fan-out store. The first source is the write primary.
    pub fn new(sources: Vec<Arc<dyn DataStore>>) -> Self {
        Self { sources }
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    fn primary(&self) -> Result<&Arc<dyn DataStore>, StoreError> {
        self.sources
            .first()
            .ok_or_else(|| StoreError::Other(anyhow::anyhow!("no datastore sources configured")))
    }
}

#[async_trait]
impl DataStore for MultiDataStore {
    async fn open(&self, name: &BlobName) -> Result<BlobReader, StoreError> {
        for source in &self.sources {
            match source.open(name).await {
                Ok(reader) => return Ok(reader),
                Err(StoreError::NotFound) => continue,
                Err(err) => {
                    debug!(name = %name.fmt_short(), %err, "datastore source failed, trying next");
                    continue;
                }
            }
        }
        Err(StoreError::NotFound)
    }

    async fn update(&self, name: &BlobName, mut data: BlobReader) -> Result<(), StoreError> {
        let mut buffered = Vec::new();
        data.read_to_end(&mut buffered).await?;

        let primary = self.primary()?;
        primary
            .update(name, Box::new(std::io::Cursor::new(buffered.clone())))
            .await?;

        let secondary_updates = self.sources[1..].iter().map(|source| {
            let bytes = buffered.clone();
            async move {
                source
                    .update(name, Box::new(std::io::Cursor::new(bytes)) as BlobReader)
                    .await
            }
        });
        for result in join_all(secondary_updates).await {
            if let Err(err) = result {
                warn!(name = %name.fmt_short(), %err, "secondary datastore update failed");
            }
        }
        Ok(())
    }

    async fn exists(&self, name: &BlobName) -> Result<bool, StoreError> {
        for source in &self.sources {
            match source.exists(name).await {
                Ok(true) => return Ok(true),
                Ok(false) => continue,
                Err(err) => {
                    debug!(name = %name.fmt_short(), %err, "datastore source failed, trying next");
                    continue;
                }
            }
        }
        Ok(false)
    }

    async fn delete(&self, name: &BlobName) -> Result<(), StoreError> {
        let deletions = self.sources.iter().map(|source| source.delete(name));
        let results = join_all(deletions).await;
        if results.iter().any(|result| result.is_ok()) {
            return Ok(());
        }
        Err(StoreError::NotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cinode_core::BlobType;
    use cinode_store_memory::MemoryDataStore;
    use sha2::{Digest, Sha256};

    fn static_blob(content: &[u8]) -> (BlobName, Vec<u8>) {
        let digest: [u8; 32] = Sha256::digest(content).into();
        (
            BlobName::from_hash_and_type(digest, BlobType::Static),
            content.to_vec(),
        )
    }

    fn reader(bytes: &[u8]) -> BlobReader {
        Box::new(std::io::Cursor::new(bytes.to_vec()))
    }

    async fn read_all(store: &dyn DataStore, name: &BlobName) -> Vec<u8> {
        let mut out = Vec::new();
        store
            .open(name)
            .await
            .unwrap()
            .read_to_end(&mut out)
            .await
            .unwrap();
        out
    }

    #[tokio::test]
    async fn reads_fall_through_to_later_sources() {
        let near = Arc::new(MemoryDataStore::new());
        let far = Arc::new(MemoryDataStore::new());
        let (name, content) = static_blob(b"remote only");
        far.update(&name, reader(&content)).await.unwrap();

        let multi = MultiDataStore::new(vec![near.clone() as Arc<dyn DataStore>, far]);
        assert_eq!(read_all(&multi, &name).await, content);
        assert!(multi.exists(&name).await.unwrap());
        // The read did not populate the nearer source.
        assert!(!near.exists(&name).await.unwrap());
    }

    #[tokio::test]
    async fn update_writes_primary_and_propagates() {
        let a = Arc::new(MemoryDataStore::new());
        let b = Arc::new(MemoryDataStore::new());
        let multi = MultiDataStore::new(vec![a.clone() as Arc<dyn DataStore>, b.clone()]);

        let (name, content) = static_blob(b"replicated");
        multi.update(&name, reader(&content)).await.unwrap();
        assert!(a.exists(&name).await.unwrap());
        assert!(b.exists(&name).await.unwrap());
    }

    #[tokio::test]
    async fn missing_everywhere_is_not_found() {
        let multi = MultiDataStore::new(vec![Arc::new(MemoryDataStore::new()) as _]);
        let (name, _) = static_blob(b"absent");
        assert!(matches!(
            multi.open(&name).await.err().unwrap(),
            StoreError::NotFound
        ));
        assert!(!multi.exists(&name).await.unwrap());
        assert!(matches!(
            multi.delete(&name).await.unwrap_err(),
            StoreError::NotFound
        ));
    }

    #[tokio::test]
    async fn delete_succeeds_if_any_source_held_the_blob() {
        let a = Arc::new(MemoryDataStore::new());
        let b = Arc::new(MemoryDataStore::new());
        let (name, content) = static_blob(b"partially stored");
        b.update(&name, reader(&content)).await.unwrap();

        let multi = MultiDataStore::new(vec![a as Arc<dyn DataStore>, b.clone()]);
        multi.delete(&name).await.unwrap();
        assert!(!b.exists(&name).await.unwrap());
    }
}
