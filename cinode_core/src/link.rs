//! Wire format and public-layer validation of dynamic-link blobs.
//!
//! A dynamic link is a signed, versioned, encrypted mutable reference.
//! Everything in this module works without any key material: an untrusted
//! relay can parse a record, recompute the blob name from the unchanging
//! header, verify the Ed25519 signature and apply the ingest ordering.
//! Decryption and the keyed checks live in the blob-encoder crate.
//!
//! Wire layout (multi-byte integers big-endian):
//!
//! ```text
//! reserved        1 byte, must be 0x00
//! public_key     32 bytes, Ed25519
//! nonce           8 bytes, fixed at creation
//! --------------- unchanging header ends here
//! content_version 8 bytes
//! signature      64 bytes, Ed25519
//! iv_length       1 byte
//! iv              iv_length bytes
//! encrypted_link  remainder
//! ```
//!
//! When two well-signed records carry the same `content_version`, the one
//! with the lexicographically greater signature wins. The rule is arbitrary
//! but deterministic, so conflicting writers converge instead of
//! oscillating.

use std::cmp::Ordering;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use ed25519_dalek::{Signature, VerifyingKey};

use crate::hash::{HASH_SIZE, digest};
use crate::name::{BlobName, BlobType};

/// Reserved leading byte of every dynamic-link blob.
pub const RESERVED_BYTE: u8 = 0x00;

/// Size of an Ed25519 public key in bytes.
pub const PUBLIC_KEY_SIZE: usize = 32;

/// Size of the creation nonce in bytes.
pub const NONCE_SIZE: usize = 8;

/// Size of an Ed25519 signature in bytes.
pub const SIGNATURE_SIZE: usize = 64;

/// Errors raised by parsing or public-layer validation of a link record.
#[derive(thiserror::Error, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum LinkError {
    #[error("truncated dynamic link blob")]
    Truncated,

    #[error("reserved byte must be 0x00, got {0:#04x}")]
    ReservedByte(u8),

    #[error("blob name does not match the link header")]
    NameMismatch,

    #[error("malformed Ed25519 public key")]
    InvalidPublicKey,

    #[error("signature verification failed")]
    InvalidSignature,
}

/// A parsed dynamic-link blob.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DynamicLinkRecord {
    public_key: [u8; PUBLIC_KEY_SIZE],
    nonce: [u8; NONCE_SIZE],
    content_version: u64,
    signature: [u8; SIGNATURE_SIZE],
    iv: Vec<u8>,
    ciphertext: Bytes,
}

impl DynamicLinkRecord {
    /// Assembles a record from already-computed parts.
    ///
    /// Used by the encoder after signing; `deserialize` is the read path.
    pub fn from_parts(
        public_key: [u8; PUBLIC_KEY_SIZE],
        nonce: [u8; NONCE_SIZE],
        content_version: u64,
        signature: [u8; SIGNATURE_SIZE],
        iv: Vec<u8>,
        ciphertext: Bytes,
    ) -> Self {
        Self {
            public_key,
            nonce,
            content_version,
            signature,
            iv,
            ciphertext,
        }
    }

    /// Parses a record with strict bound checks.
    pub fn deserialize(mut bytes: Bytes) -> Result<Self, LinkError> {
        const FIXED_PREFIX: usize = 1 + PUBLIC_KEY_SIZE + NONCE_SIZE + 8 + SIGNATURE_SIZE + 1;
        if bytes.remaining() < FIXED_PREFIX {
            return Err(LinkError::Truncated);
        }

        let reserved = bytes.get_u8();
        if reserved != RESERVED_BYTE {
            return Err(LinkError::ReservedByte(reserved));
        }

        let mut public_key = [0u8; PUBLIC_KEY_SIZE];
        bytes.copy_to_slice(&mut public_key);

        let mut nonce = [0u8; NONCE_SIZE];
        bytes.copy_to_slice(&mut nonce);

        let content_version = bytes.get_u64();

        let mut signature = [0u8; SIGNATURE_SIZE];
        bytes.copy_to_slice(&mut signature);

        let iv_length = bytes.get_u8() as usize;
        if bytes.remaining() < iv_length {
            return Err(LinkError::Truncated);
        }
        let mut iv = vec![0u8; iv_length];
        bytes.copy_to_slice(&mut iv);

        let ciphertext = bytes.copy_to_bytes(bytes.remaining());

        Ok(Self {
            public_key,
            nonce,
            content_version,
            signature,
            iv,
            ciphertext,
        })
    }

    /// Serialises the record for storage or transport.
    pub fn serialize(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(
            1 + PUBLIC_KEY_SIZE
                + NONCE_SIZE
                + 8
                + SIGNATURE_SIZE
                + 1
                + self.iv.len()
                + self.ciphertext.len(),
        );
        buf.put_u8(RESERVED_BYTE);
        buf.put_slice(&self.public_key);
        buf.put_slice(&self.nonce);
        buf.put_u64(self.content_version);
        buf.put_slice(&self.signature);
        buf.put_u8(self.iv.len() as u8);
        buf.put_slice(&self.iv);
        buf.put_slice(&self.ciphertext);
        buf.freeze()
    }

    /// The blob name committed to by the unchanging header.
    pub fn blob_name(&self) -> BlobName {
        BlobName::from_hash_and_type(
            digest(&[&[RESERVED_BYTE], &self.public_key, &self.nonce]),
            BlobType::DynamicLink,
        )
    }

    /// Digest the signature covers:
    /// `SHA-256(0x00 ‖ len(name) ‖ name ‖ content_version ‖ encrypted_link)`.
    pub fn signature_digest(
        name: &BlobName,
        content_version: u64,
        ciphertext: &[u8],
    ) -> [u8; HASH_SIZE] {
        digest(&[
            &[0x00],
            &[name.as_bytes().len() as u8],
            name.as_bytes(),
            &content_version.to_be_bytes(),
            ciphertext,
        ])
    }

    /// Public-layer validation: the unchanging header must hash to
    /// `expected_name` and the signature must verify against the embedded
    /// public key. No key material is needed.
    pub fn verify(&self, expected_name: &BlobName) -> Result<(), LinkError> {
        if self.blob_name() != *expected_name {
            return Err(LinkError::NameMismatch);
        }

        let verifying_key =
            VerifyingKey::from_bytes(&self.public_key).map_err(|_| LinkError::InvalidPublicKey)?;
        let digest = Self::signature_digest(expected_name, self.content_version, &self.ciphertext);
        let signature = Signature::from_bytes(&self.signature);
        verifying_key
            .verify_strict(&digest, &signature)
            .map_err(|_| LinkError::InvalidSignature)
    }

    /// Ingest ordering: whether this record replaces `other` in a store.
    ///
    /// Higher `content_version` wins; on a tie the lexicographically greater
    /// signature wins.
    pub fn supersedes(&self, other: &Self) -> bool {
        matches!(self.ingest_cmp(other), Ordering::Greater)
    }

    fn ingest_cmp(&self, other: &Self) -> Ordering {
        self.content_version
            .cmp(&other.content_version)
            .then_with(|| self.signature.cmp(&other.signature))
    }

    pub fn public_key(&self) -> &[u8; PUBLIC_KEY_SIZE] {
        &self.public_key
    }

    pub fn nonce(&self) -> &[u8; NONCE_SIZE] {
        &self.nonce
    }

    pub fn content_version(&self) -> u64 {
        self.content_version
    }

    pub fn signature(&self) -> &[u8; SIGNATURE_SIZE] {
        &self.signature
    }

    pub fn iv(&self) -> &[u8] {
        &self.iv
    }

    pub fn ciphertext(&self) -> &Bytes {
        &self.ciphertext
    }
}
