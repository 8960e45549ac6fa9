//! Blob types and blob names.
//!
//! A blob name is 33 bytes: the blob type byte followed by a 32-byte
//! SHA-256 hash. How the hash is obtained depends on the type: static
//! blobs hash their ciphertext, dynamic links hash the unchanging part
//! of their header. Names render as base58.

use std::fmt;
use std::str::FromStr;

use crate::hash::HASH_SIZE;

/// Total size of an encoded blob name in bytes.
pub const BLOB_NAME_SIZE: usize = 1 + HASH_SIZE;

/// The type of a blob, stored as the leading byte of its name.
///
/// Byte `0x00` is reserved as the invalid marker and never names a blob.
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum BlobType {
    /// Immutable content-addressed blob; the name commits to the ciphertext.
    Static = 0x01,
    /// Mutable signed reference; the name commits to a public key and nonce.
    DynamicLink = 0x02,
}

impl BlobType {
    /// The wire byte for this type.
    pub fn id_byte(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for BlobType {
    type Error = BlobNameError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x01 => Ok(BlobType::Static),
            0x02 => Ok(BlobType::DynamicLink),
            other => Err(BlobNameError::UnknownType(other)),
        }
    }
}

/// Errors that can occur when parsing a [`BlobName`].
#[derive(thiserror::Error, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum BlobNameError {
    #[error("invalid blob name length: expected {BLOB_NAME_SIZE} bytes, got {0}")]
    InvalidLength(usize),

    #[error("unknown blob type byte: {0:#04x}")]
    UnknownType(u8),

    #[error("invalid base58 encoding")]
    InvalidEncoding,
}

/// Identifier of a blob in the system.
///
/// Renders as base58 and is valid iff it is exactly 33 bytes long and its
/// leading byte is a known [`BlobType`].
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BlobName([u8; BLOB_NAME_SIZE]);

impl BlobName {
    /// Builds the name for `hash` under the given blob type.
    pub fn from_hash_and_type(hash: [u8; HASH_SIZE], blob_type: BlobType) -> Self {
        let mut bytes = [0u8; BLOB_NAME_SIZE];
        bytes[0] = blob_type.id_byte();
        bytes[1..].copy_from_slice(&hash);
        Self(bytes)
    }

    /// Parses a name from its raw 33-byte encoding.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, BlobNameError> {
        let array: [u8; BLOB_NAME_SIZE] = bytes
            .try_into()
            .map_err(|_| BlobNameError::InvalidLength(bytes.len()))?;
        BlobType::try_from(array[0])?;
        Ok(Self(array))
    }

    /// The blob type encoded in the leading byte.
    pub fn blob_type(&self) -> BlobType {
        BlobType::try_from(self.0[0]).expect("blob name validated at construction")
    }

    /// The 32-byte hash part of the name.
    pub fn hash(&self) -> &[u8; HASH_SIZE] {
        self.0[1..].try_into().expect("name is 33 bytes")
    }

    /// Raw 33-byte encoding.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Base58 rendering of the full name.
    pub fn to_base58(&self) -> String {
        bs58::encode(&self.0).into_string()
    }

    /// Short prefix of the base58 form for friendly log output.
    pub fn fmt_short(&self) -> String {
        let full = self.to_base58();
        full[..full.len().min(8)].to_string()
    }
}

impl fmt::Display for BlobName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_base58())
    }
}

impl fmt::Debug for BlobName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("BlobName").field(&self.to_base58()).finish()
    }
}

impl FromStr for BlobName {
    type Err = BlobNameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = bs58::decode(s)
            .into_vec()
            .map_err(|_| BlobNameError::InvalidEncoding)?;
        Self::from_bytes(&bytes)
    }
}
