//! Static blob codec.
//!
//! A static blob is named by the SHA-256 of its ciphertext and encrypted
//! under a key derived from the SHA-256 of its plaintext, so two
//! independent creations of the same content converge on the same
//! `(name, key)` pair. Creation streams through two secure FIFOs to keep
//! memory flat for arbitrarily large payloads:
//!
//! 1. spool plaintext while hashing it; the hash becomes the key
//! 2. re-read, encrypt with a zero XChaCha20 nonce, spool the ciphertext
//!    while hashing it; the hash becomes the name
//! 3. re-read the ciphertext and hand it to the datastore

use cinode_core::key::XCHACHA20_IV_SIZE;
use cinode_core::{BlobKey, BlobName, BlobReader, BlobType, DataStore};
use sha2::{Digest, Sha256};
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::EncoderError;
use crate::fifo::SecureFifoFactory;
use crate::read::DecryptingReader;

/// The zero nonce used for every static blob. Key reuse is impossible
/// because the key is itself a hash of the plaintext.
const STATIC_IV: [u8; XCHACHA20_IV_SIZE] = [0u8; XCHACHA20_IV_SIZE];

const COPY_BUF_SIZE: usize = 16 * 1024;

pub(crate) async fn create(
    store: &dyn DataStore,
    fifos: &dyn SecureFifoFactory,
    mut data: impl AsyncRead + Send + Unpin,
) -> Result<(BlobName, BlobKey), EncoderError> {
    let mut buf = vec![0u8; COPY_BUF_SIZE];

    // Pass 1: spool plaintext, derive the key from its hash.
    let mut plaintext_fifo = fifos.open()?;
    let mut plaintext_hasher = Sha256::new();
    loop {
        let n = data.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        plaintext_hasher.update(&buf[..n]);
        plaintext_fifo.write(&buf[..n]).await?;
    }
    let key = BlobKey::chacha20(plaintext_hasher.finalize().into());

    // Pass 2: encrypt, spool ciphertext, derive the name from its hash.
    let mut plaintext = plaintext_fifo.finish().await?;
    let mut ciphertext_fifo = fifos.open()?;
    let mut ciphertext_hasher = Sha256::new();
    let mut cipher = key.keystream(&STATIC_IV)?;
    loop {
        let n = plaintext.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        cipher.apply_keystream(&mut buf[..n])?;
        ciphertext_hasher.update(&buf[..n]);
        ciphertext_fifo.write(&buf[..n]).await?;
    }
    let name = BlobName::from_hash_and_type(ciphertext_hasher.finalize().into(), BlobType::Static);

    // Pass 3: commit. The datastore re-verifies the ciphertext hash.
    let ciphertext = ciphertext_fifo.finish().await?;
    store.update(&name, ciphertext).await?;

    Ok((name, key))
}

pub(crate) async fn open(
    store: &dyn DataStore,
    name: &BlobName,
    key: &BlobKey,
) -> Result<BlobReader, EncoderError> {
    let ciphertext = store.open(name).await?;
    let cipher = key.keystream(&STATIC_IV)?;
    Ok(Box::new(DecryptingReader::new(ciphertext, cipher)))
}
