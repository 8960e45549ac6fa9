//! The blob encoder: Create/Open/Update/Exists/Delete over a raw datastore.
//!
//! The encoder dispatches on blob type and owns the key handling the
//! datastore never sees. `open` follows chains of nested entrypoints
//! through dynamic links, bounded by the redirect cap; every hop checks
//! the entrypoint's validity window against the version source's clock.

use std::sync::Arc;

use bytes::Bytes;
use cinode_core::{
    AuthInfo, BlobKey, BlobName, BlobReader, BlobType, DataStore, Entrypoint,
};
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::debug;

use crate::error::EncoderError;
use crate::fifo::{FileFifoFactory, SecureFifoFactory};
use crate::seams::{OsRandomSource, RandomSource, SystemVersionSource, VersionSource};
use crate::{dynamic_link, static_blob};

/// Default cap on link-chain length.
pub const DEFAULT_MAX_LINK_REDIRECTS: u32 = 10;

/// Result of [`BlobEncoder::create`].
#[derive(Debug)]
pub struct CreatedBlob {
    pub name: BlobName,
    pub key: BlobKey,
    /// Writer secret; present for dynamic links only.
    pub auth_info: Option<AuthInfo>,
}

/// Encrypted-blob layer over a plain [`DataStore`].
#[derive(Debug, Clone)]
pub struct BlobEncoder {
    store: Arc<dyn DataStore>,
    random: Arc<dyn RandomSource>,
    versions: Arc<dyn VersionSource>,
    fifos: Arc<dyn SecureFifoFactory>,
    max_link_redirects: u32,
}

impl BlobEncoder {
    /// Creates an encoder with the default seams: OS randomness, the
    /// system clock and file-backed secure FIFOs.
    pub fn new(store: Arc<dyn DataStore>) -> Self {
        let random: Arc<dyn RandomSource> = Arc::new(OsRandomSource);
        Self {
            store,
            fifos: Arc::new(FileFifoFactory::new(random.clone())),
            random,
            versions: Arc::new(SystemVersionSource),
            max_link_redirects: DEFAULT_MAX_LINK_REDIRECTS,
        }
    }

    pub fn with_random_source(mut self, random: Arc<dyn RandomSource>) -> Self {
        self.random = random;
        self
    }

    pub fn with_version_source(mut self, versions: Arc<dyn VersionSource>) -> Self {
        self.versions = versions;
        self
    }

    pub fn with_fifo_factory(mut self, fifos: Arc<dyn SecureFifoFactory>) -> Self {
        self.fifos = fifos;
        self
    }

    pub fn with_max_link_redirects(mut self, max_link_redirects: u32) -> Self {
        self.max_link_redirects = max_link_redirects;
        self
    }

    pub fn store(&self) -> &Arc<dyn DataStore> {
        &self.store
    }

    pub fn max_link_redirects(&self) -> u32 {
        self.max_link_redirects
    }

    /// Unix-microsecond clock shared with version generation.
    pub fn now_micros(&self) -> u64 {
        self.versions.now_micros()
    }

    /// Creates a blob of the given type from `data`.
    ///
    /// Static blobs stream through secure FIFOs; dynamic-link payloads are
    /// size-bounded and buffered in memory.
    pub async fn create(
        &self,
        blob_type: BlobType,
        mut data: impl AsyncRead + Send + Unpin,
    ) -> Result<CreatedBlob, EncoderError> {
        match blob_type {
            BlobType::Static => {
                let (name, key) =
                    static_blob::create(self.store.as_ref(), self.fifos.as_ref(), data).await?;
                Ok(CreatedBlob {
                    name,
                    key,
                    auth_info: None,
                })
            }
            BlobType::DynamicLink => {
                let mut payload = Vec::new();
                data.read_to_end(&mut payload).await?;
                let (name, key, auth_info) = dynamic_link::create(
                    self.store.as_ref(),
                    self.random.as_ref(),
                    self.versions.as_ref(),
                    &payload,
                )
                .await?;
                Ok(CreatedBlob {
                    name,
                    key,
                    auth_info: Some(auth_info),
                })
            }
        }
    }

    /// Opens a blob for reading, following dynamic links until content.
    ///
    /// A dynamic link's payload is interpreted as a nested entrypoint;
    /// every crossing counts against the redirect cap and is checked
    /// against its validity window.
    pub async fn open(&self, name: &BlobName, key: &BlobKey) -> Result<BlobReader, EncoderError> {
        let now = self.versions.now_micros();
        let mut current_name = *name;
        let mut current_key = key.clone();
        let mut redirects = 0u32;

        loop {
            match current_name.blob_type() {
                BlobType::Static => {
                    return static_blob::open(self.store.as_ref(), &current_name, &current_key)
                        .await;
                }
                BlobType::DynamicLink => {
                    redirects += 1;
                    if redirects >= self.max_link_redirects {
                        debug!(
                            name = %name.fmt_short(),
                            cap = self.max_link_redirects,
                            "link chain exceeded the redirect cap"
                        );
                        return Err(EncoderError::TooManyRedirects(self.max_link_redirects));
                    }
                    let payload = self.open_link_payload(&current_name, &current_key).await?;
                    let next = parse_link_target(&payload)?;
                    next.check_valid_at(now)?;
                    current_key = next.require_key()?.clone();
                    current_name = *next.name();
                }
            }
        }
    }

    /// Reads a single dynamic link and returns its decrypted payload
    /// without following it.
    pub async fn open_link_payload(
        &self,
        name: &BlobName,
        key: &BlobKey,
    ) -> Result<Bytes, EncoderError> {
        dynamic_link::open_payload(self.store.as_ref(), name, key).await
    }

    /// Publishes a new version of a dynamic link. Static blobs are
    /// append-once and cannot be updated.
    pub async fn update(
        &self,
        name: &BlobName,
        auth_info: &AuthInfo,
        key: &BlobKey,
        mut data: impl AsyncRead + Send + Unpin,
    ) -> Result<(), EncoderError> {
        if name.blob_type() == BlobType::Static {
            return Err(EncoderError::UpdateNotSupported);
        }
        let mut payload = Vec::new();
        data.read_to_end(&mut payload).await?;
        dynamic_link::update(
            self.store.as_ref(),
            self.versions.as_ref(),
            name,
            auth_info,
            key,
            &payload,
        )
        .await
    }

    /// Forwarded verbatim to the datastore.
    pub async fn exists(&self, name: &BlobName) -> Result<bool, EncoderError> {
        Ok(self.store.exists(name).await?)
    }

    /// Forwarded verbatim to the datastore.
    pub async fn delete(&self, name: &BlobName) -> Result<(), EncoderError> {
        Ok(self.store.delete(name).await?)
    }
}

/// Interprets a link payload as a nested entrypoint.
///
/// Pre-entrypoint payloads (`0x00 ‖ key ‖ name`) are no longer produced
/// and are rejected outright rather than mis-interpreted.
fn parse_link_target(payload: &[u8]) -> Result<Entrypoint, EncoderError> {
    if payload.first() == Some(&0x00) {
        return Err(EncoderError::ValidationFailed(
            "legacy raw redirect payload".into(),
        ));
    }
    Ok(Entrypoint::from_bytes(payload)?)
}
