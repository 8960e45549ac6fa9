//! Secure spill buffers.
//!
//! A secure FIFO is a single-producer single-consumer buffer: write the
//! payload, call `finish`, read it back once. The file-backed variant is
//! created unlinked and every byte on disk is encrypted under an ephemeral
//! XChaCha20 key that never leaves the process, so an attacker with disk
//! access recovers nothing usable. The in-memory variant serves small
//! payloads without touching disk.

use std::fmt;
use std::io;
use std::sync::Arc;

use async_trait::async_trait;
use cinode_core::{BlobKey, BlobReader};
use tokio::io::{AsyncSeekExt, AsyncWriteExt};

use crate::read::DecryptingReader;
use crate::seams::RandomSource;

const EPHEMERAL_KEY_SIZE: usize = 32;
const EPHEMERAL_IV_SIZE: usize = 24;

/// One spill buffer. Writes must complete before `finish`; the returned
/// reader reproduces the written bytes exactly once.
#[async_trait]
pub trait SecureFifo: Send {
    /// Appends a chunk to the buffer.
    async fn write(&mut self, chunk: &[u8]) -> io::Result<()>;

    /// Ends the write phase and returns the reader over the content.
    async fn finish(self: Box<Self>) -> io::Result<BlobReader>;
}

/// Creates spill buffers for the encoder.
pub trait SecureFifoFactory: fmt::Debug + Send + Sync {
    fn open(&self) -> io::Result<Box<dyn SecureFifo>>;
}

/// File-backed FIFO factory; the default for the encoder.
#[derive(Debug)]
pub struct FileFifoFactory {
    random: Arc<dyn RandomSource>,
}

impl FileFifoFactory {
    pub fn new(random: Arc<dyn RandomSource>) -> Self {
        Self { random }
    }
}

impl SecureFifoFactory for FileFifoFactory {
    fn open(&self) -> io::Result<Box<dyn SecureFifo>> {
        // tempfile() hands back a file that is already unlinked; closing
        // the handle releases the disk space.
        let file = tempfile::tempfile()?;

        let mut key_bytes = [0u8; EPHEMERAL_KEY_SIZE];
        self.random.fill(&mut key_bytes);
        let mut iv = [0u8; EPHEMERAL_IV_SIZE];
        self.random.fill(&mut iv);

        let key = BlobKey::chacha20(key_bytes);
        let cipher = key.keystream(&iv).map_err(io::Error::other)?;

        Ok(Box::new(FileFifo {
            file: tokio::fs::File::from_std(file),
            key,
            iv,
            cipher: Some(cipher),
        }))
    }
}

struct FileFifo {
    file: tokio::fs::File,
    key: BlobKey,
    iv: [u8; EPHEMERAL_IV_SIZE],
    cipher: Option<Box<dyn cinode_core::KeystreamCipher>>,
}

#[async_trait]
impl SecureFifo for FileFifo {
    async fn write(&mut self, chunk: &[u8]) -> io::Result<()> {
        let cipher = self
            .cipher
            .as_mut()
            .ok_or_else(|| io::Error::other("fifo already finished"))?;
        let mut encrypted = chunk.to_vec();
        cipher
            .apply_keystream(&mut encrypted)
            .map_err(io::Error::other)?;
        self.file.write_all(&encrypted).await
    }

    async fn finish(mut self: Box<Self>) -> io::Result<BlobReader> {
        self.cipher.take();
        self.file.flush().await?;
        self.file.seek(io::SeekFrom::Start(0)).await?;
        let cipher = self.key.keystream(&self.iv).map_err(io::Error::other)?;
        Ok(Box::new(DecryptingReader::new(self.file, cipher)))
    }
}

/// In-memory FIFO factory for payloads known to be small.
#[derive(Debug, Default, Clone, Copy)]
pub struct MemoryFifoFactory;

impl SecureFifoFactory for MemoryFifoFactory {
    fn open(&self) -> io::Result<Box<dyn SecureFifo>> {
        Ok(Box::new(MemoryFifo { buf: Vec::new() }))
    }
}

struct MemoryFifo {
    buf: Vec<u8>,
}

#[async_trait]
impl SecureFifo for MemoryFifo {
    async fn write(&mut self, chunk: &[u8]) -> io::Result<()> {
        self.buf.extend_from_slice(chunk);
        Ok(())
    }

    async fn finish(self: Box<Self>) -> io::Result<BlobReader> {
        Ok(Box::new(std::io::Cursor::new(self.buf)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::seams::OsRandomSource;
    use tokio::io::AsyncReadExt;

    async fn roundtrip(factory: &dyn SecureFifoFactory, payload: &[u8]) -> Vec<u8> {
        let mut fifo = factory.open().unwrap();
        for chunk in payload.chunks(7) {
            fifo.write(chunk).await.unwrap();
        }
        let mut reader = fifo.finish().await.unwrap();
        let mut out = Vec::new();
        reader.read_to_end(&mut out).await.unwrap();
        out
    }

    #[tokio::test]
    async fn file_fifo_reproduces_writes() {
        let factory = FileFifoFactory::new(Arc::new(OsRandomSource));
        let payload: Vec<u8> = (0u32..4096).map(|i| (i % 251) as u8).collect();
        assert_eq!(roundtrip(&factory, &payload).await, payload);
    }

    #[tokio::test]
    async fn file_fifo_empty_payload() {
        let factory = FileFifoFactory::new(Arc::new(OsRandomSource));
        assert_eq!(roundtrip(&factory, b"").await, Vec::<u8>::new());
    }

    #[tokio::test]
    async fn memory_fifo_reproduces_writes() {
        let payload = b"tiny payload".to_vec();
        assert_eq!(roundtrip(&MemoryFifoFactory, &payload).await, payload);
    }
}
