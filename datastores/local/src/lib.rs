//! Local filesystem datastore backend.
//!
//! Two directory layouts are supported:
//!
//! - *Sharded*: blob name `XYZABC…` is stored at `root/XYZ/ABC/…`, which
//!   keeps directories small for stores with millions of blobs.
//! - *Raw*: the base58 blob name is used verbatim as the file name.
//!
//! Uploads first land at `<final>.upload_<n>` (n ∈ [0, 4096)) and are
//! renamed into place only after the content passed ingest validation, so
//! a half-written or invalid blob never becomes visible.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use cinode_core::ingest::{IngestDecision, ValidationError, ingest_dynamic_link};
use cinode_core::{BlobName, BlobReader, BlobType, DataStore, StoreError};
use rand::Rng;
use sha2::{Digest, Sha256};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::Mutex;
use tracing::debug;

const UPLOAD_SLOTS: u32 = 4096;
const COPY_BUF_SIZE: usize = 16 * 1024;

/// Directory layout of the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    /// `root/XYZ/ABC/rest-of-name`
    Sharded,
    /// `root/full-name`
    Raw,
}

/// Datastore persisting blobs as files under a base directory.
#[derive(Debug)]
pub struct LocalDataStore {
    base_path: PathBuf,
    layout: Layout,
    // Serialises the read-merge-rename step of dynamic-link updates.
    dynamic_update_lock: Mutex<()>,
}

impl LocalDataStore {
    /// Creates a sharded store rooted at `base_path`.
    pub fn sharded(base_path: impl AsRef<Path>) -> Self {
        Self::with_layout(base_path, Layout::Sharded)
    }

    /// Creates a raw (flat) store rooted at `base_path`.
    pub fn raw(base_path: impl AsRef<Path>) -> Self {
        Self::with_layout(base_path, Layout::Raw)
    }

    pub fn with_layout(base_path: impl AsRef<Path>, layout: Layout) -> Self {
        Self {
            base_path: base_path.as_ref().to_path_buf(),
            layout,
            dynamic_update_lock: Mutex::new(()),
        }
    }

    fn blob_path(&self, name: &BlobName) -> PathBuf {
        let encoded = name.to_base58();
        match self.layout {
            Layout::Raw => self.base_path.join(encoded),
            Layout::Sharded => self
                .base_path
                .join(&encoded[..3])
                .join(&encoded[3..6])
                .join(&encoded[6..]),
        }
    }

    /// Opens a fresh upload file next to `final_path`.
    async fn open_upload_file(
        &self,
        final_path: &Path,
    ) -> Result<(PathBuf, tokio::fs::File), StoreError> {
        if let Some(parent) = final_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        loop {
            let slot: u32 = rand::thread_rng().gen_range(0..UPLOAD_SLOTS);
            let mut candidate = final_path.as_os_str().to_owned();
            candidate.push(format!(".upload_{slot}"));
            let candidate = PathBuf::from(candidate);
            match tokio::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&candidate)
                .await
            {
                Ok(file) => return Ok((candidate, file)),
                Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => continue,
                Err(err) => return Err(err.into()),
            }
        }
    }

    /// Streams a static blob to disk while hashing it, then commits by
    /// atomic rename once the hash matches the name.
    async fn update_static(&self, name: &BlobName, mut data: BlobReader) -> Result<(), StoreError> {
        let final_path = self.blob_path(name);
        let (upload_path, mut file) = self.open_upload_file(&final_path).await?;

        let result: Result<(), StoreError> = async {
            let mut hasher = Sha256::new();
            let mut buf = vec![0u8; COPY_BUF_SIZE];
            loop {
                let n = data.read(&mut buf).await?;
                if n == 0 {
                    break;
                }
                hasher.update(&buf[..n]);
                file.write_all(&buf[..n]).await?;
            }
            file.flush().await?;
            file.sync_all().await?;

            let digest: [u8; 32] = hasher.finalize().into();
            if &digest != name.hash() {
                return Err(ValidationError::HashMismatch.into());
            }

            if tokio::fs::try_exists(&final_path).await? {
                // Content-addressed: an existing blob is identical.
                tokio::fs::remove_file(&upload_path).await?;
            } else {
                tokio::fs::rename(&upload_path, &final_path).await?;
            }
            Ok(())
        }
        .await;

        if result.is_err() {
            let _ = tokio::fs::remove_file(&upload_path).await;
        }
        result
    }

    async fn update_dynamic(&self, name: &BlobName, mut data: BlobReader) -> Result<(), StoreError> {
        let mut incoming = Vec::new();
        data.read_to_end(&mut incoming).await?;
        let incoming = Bytes::from(incoming);

        let _guard = self.dynamic_update_lock.lock().await;

        let final_path = self.blob_path(name);
        let current = match tokio::fs::read(&final_path).await {
            Ok(bytes) => Some(Bytes::from(bytes)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => None,
            Err(err) => return Err(err.into()),
        };

        match ingest_dynamic_link(name, incoming, current.as_ref())? {
            IngestDecision::Commit(bytes) => {
                let (upload_path, mut file) = self.open_upload_file(&final_path).await?;
                let result: Result<(), StoreError> = async {
                    file.write_all(&bytes).await?;
                    file.flush().await?;
                    file.sync_all().await?;
                    tokio::fs::rename(&upload_path, &final_path).await?;
                    Ok(())
                }
                .await;
                if result.is_err() {
                    let _ = tokio::fs::remove_file(&upload_path).await;
                }
                result
            }
            IngestDecision::KeepCurrent => {
                debug!(name = %name.fmt_short(), "kept stored dynamic link over incoming one");
                Ok(())
            }
        }
    }
}

#[async_trait]
impl DataStore for LocalDataStore {
    async fn open(&self, name: &BlobName) -> Result<BlobReader, StoreError> {
        match tokio::fs::File::open(self.blob_path(name)).await {
            Ok(file) => Ok(Box::new(file)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Err(StoreError::NotFound),
            Err(err) => Err(err.into()),
        }
    }

    async fn update(&self, name: &BlobName, data: BlobReader) -> Result<(), StoreError> {
        match name.blob_type() {
            BlobType::Static => self.update_static(name, data).await,
            BlobType::DynamicLink => self.update_dynamic(name, data).await,
        }
    }

    async fn exists(&self, name: &BlobName) -> Result<bool, StoreError> {
        Ok(tokio::fs::try_exists(self.blob_path(name)).await?)
    }

    async fn delete(&self, name: &BlobName) -> Result<(), StoreError> {
        match tokio::fs::remove_file(self.blob_path(name)).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Err(StoreError::NotFound),
            Err(err) => Err(err.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cinode_core::hash::{digest, sha256};
    use cinode_core::link::{NONCE_SIZE, RESERVED_BYTE};
    use cinode_core::DynamicLinkRecord;
    use ed25519_dalek::{Signer, SigningKey};

    fn reader(bytes: &[u8]) -> BlobReader {
        Box::new(std::io::Cursor::new(bytes.to_vec()))
    }

    async fn read_all(store: &LocalDataStore, name: &BlobName) -> Vec<u8> {
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

    fn link_blob(seed: u8, version: u64, payload: &[u8]) -> (BlobName, Bytes) {
        let signing = SigningKey::from_bytes(&[seed; 32]);
        let public_key = signing.verifying_key().to_bytes();
        let nonce = [seed; NONCE_SIZE];
        let name = BlobName::from_hash_and_type(
            digest(&[&[RESERVED_BYTE], &public_key, &nonce]),
            BlobType::DynamicLink,
        );
        let sig_digest = DynamicLinkRecord::signature_digest(&name, version, payload);
        let record = DynamicLinkRecord::from_parts(
            public_key,
            nonce,
            version,
            signing.sign(&sig_digest).to_bytes(),
            vec![0u8; 24],
            Bytes::copy_from_slice(payload),
        );
        (name, record.serialize())
    }

    #[tokio::test]
    async fn sharded_layout_places_blob_under_prefix_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalDataStore::sharded(dir.path());
        let content = b"sharded blob";
        let name = BlobName::from_hash_and_type(sha256(content), BlobType::Static);

        store.update(&name, reader(content)).await.unwrap();

        let encoded = name.to_base58();
        let expected = dir
            .path()
            .join(&encoded[..3])
            .join(&encoded[3..6])
            .join(&encoded[6..]);
        assert!(expected.is_file());
        assert_eq!(read_all(&store, &name).await, content);
    }

    #[tokio::test]
    async fn raw_layout_uses_name_verbatim() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalDataStore::raw(dir.path());
        let content = b"raw blob";
        let name = BlobName::from_hash_and_type(sha256(content), BlobType::Static);

        store.update(&name, reader(content)).await.unwrap();
        assert!(dir.path().join(name.to_base58()).is_file());
    }

    #[tokio::test]
    async fn invalid_static_blob_leaves_no_file_behind() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalDataStore::sharded(dir.path());
        let name = BlobName::from_hash_and_type(sha256(b"expected"), BlobType::Static);

        let err = store.update(&name, reader(b"corrupted")).await.unwrap_err();
        assert!(matches!(err, StoreError::ValidationFailed(_)));
        assert!(!store.exists(&name).await.unwrap());

        // No stray upload files either.
        let mut walker = vec![dir.path().to_path_buf()];
        while let Some(current) = walker.pop() {
            for entry in std::fs::read_dir(current).unwrap() {
                let entry = entry.unwrap();
                if entry.file_type().unwrap().is_dir() {
                    walker.push(entry.path());
                } else {
                    panic!("unexpected file: {:?}", entry.path());
                }
            }
        }
    }

    #[tokio::test]
    async fn dynamic_link_merge_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalDataStore::sharded(dir.path());
        let (name, v1) = link_blob(1, 1, b"v1");
        let (_, v2) = link_blob(1, 2, b"v2");

        store.update(&name, reader(&v1)).await.unwrap();
        store.update(&name, reader(&v2)).await.unwrap();
        store.update(&name, reader(&v1)).await.unwrap();
        assert_eq!(read_all(&store, &name).await, v2.to_vec());
    }

    #[tokio::test]
    async fn missing_blob_errors() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalDataStore::raw(dir.path());
        let name = BlobName::from_hash_and_type(sha256(b"ghost"), BlobType::Static);

        assert!(matches!(
            store.open(&name).await.err().unwrap(),
            StoreError::NotFound
        ));
        assert!(!store.exists(&name).await.unwrap());
        assert!(matches!(
            store.delete(&name).await.unwrap_err(),
            StoreError::NotFound
        ));
    }

    #[tokio::test]
    async fn existing_static_blob_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalDataStore::sharded(dir.path());
        let content = b"same bytes";
        let name = BlobName::from_hash_and_type(sha256(content), BlobType::Static);

        store.update(&name, reader(content)).await.unwrap();
        store.update(&name, reader(content)).await.unwrap();
        assert_eq!(read_all(&store, &name).await, content);
    }
}
