//! Entrypoints and writer infos.
//!
//! An [`Entrypoint`] is the immutable value object embedded in directories
//! and link payloads: blob name, decryption key and optional metadata.
//! A [`WriterInfo`] additionally carries the writer secret for a dynamic
//! link. Both serialise as protobuf and render as base58 strings.

use std::fmt;
use std::str::FromStr;

use bytes::Bytes;
use prost::Message;

use crate::key::{AuthInfo, AuthInfoError, BlobKey, KeyError};
use crate::name::{BlobName, BlobNameError, BlobType};
use crate::proto::{EntrypointMessage, KeyInfoMessage, WriterInfoMessage};

/// Errors raised by entrypoint parsing and validity checks.
#[derive(thiserror::Error, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum EntrypointError {
    #[error("invalid entrypoint data: {0}")]
    InvalidData(String),

    #[error("entrypoint does not carry a key")]
    MissingKeyInfo,

    #[error("entrypoint is not yet valid")]
    NotYetValid,

    #[error("entrypoint has expired")]
    Expired,
}

impl From<BlobNameError> for EntrypointError {
    fn from(err: BlobNameError) -> Self {
        EntrypointError::InvalidData(err.to_string())
    }
}

impl From<KeyError> for EntrypointError {
    fn from(err: KeyError) -> Self {
        EntrypointError::InvalidData(err.to_string())
    }
}

/// Immutable reference to a blob, suitable for embedding in directories.
///
/// Links never carry a mime type; that invariant is enforced both at
/// construction and at parse time.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Entrypoint {
    name: BlobName,
    key: Option<BlobKey>,
    mime_type: Option<String>,
    not_valid_before: Option<u64>,
    not_valid_after: Option<u64>,
}

impl Entrypoint {
    /// Creates an entrypoint for `name` readable with `key`.
    pub fn new(name: BlobName, key: BlobKey) -> Self {
        Self {
            name,
            key: Some(key),
            mime_type: None,
            not_valid_before: None,
            not_valid_after: None,
        }
    }

    /// Attaches a mime type. Returns `InvalidData` for dynamic links,
    /// which never carry one.
    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Result<Self, EntrypointError> {
        if self.name.blob_type() == BlobType::DynamicLink {
            return Err(EntrypointError::InvalidData(
                "links must not carry a mime type".into(),
            ));
        }
        self.mime_type = Some(mime_type.into());
        Ok(self)
    }

    /// Restricts the validity window (unix microseconds, either bound optional).
    pub fn with_validity(mut self, not_before: Option<u64>, not_after: Option<u64>) -> Self {
        self.not_valid_before = not_before;
        self.not_valid_after = not_after;
        self
    }

    pub fn name(&self) -> &BlobName {
        &self.name
    }

    pub fn key(&self) -> Option<&BlobKey> {
        self.key.as_ref()
    }

    /// The key, or `MissingKeyInfo` when the entrypoint carries none.
    pub fn require_key(&self) -> Result<&BlobKey, EntrypointError> {
        self.key.as_ref().ok_or(EntrypointError::MissingKeyInfo)
    }

    pub fn mime_type(&self) -> Option<&str> {
        self.mime_type.as_deref()
    }

    pub fn not_valid_before(&self) -> Option<u64> {
        self.not_valid_before
    }

    pub fn not_valid_after(&self) -> Option<u64> {
        self.not_valid_after
    }

    /// Whether this entrypoint references a dynamic link.
    pub fn is_link(&self) -> bool {
        self.name.blob_type() == BlobType::DynamicLink
    }

    /// Checks the validity window against `now` (unix microseconds).
    pub fn check_valid_at(&self, now_micros: u64) -> Result<(), EntrypointError> {
        if let Some(not_before) = self.not_valid_before
            && not_before > now_micros
        {
            return Err(EntrypointError::NotYetValid);
        }
        if let Some(not_after) = self.not_valid_after
            && not_after < now_micros
        {
            return Err(EntrypointError::Expired);
        }
        Ok(())
    }

    /// Parses the protobuf encoding, enforcing the structural invariants.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, EntrypointError> {
        if bytes.is_empty() {
            return Err(EntrypointError::InvalidData("empty entrypoint bytes".into()));
        }
        let message = EntrypointMessage::decode(bytes)
            .map_err(|err| EntrypointError::InvalidData(err.to_string()))?;
        Self::from_message(message)
    }

    fn from_message(message: EntrypointMessage) -> Result<Self, EntrypointError> {
        let name = BlobName::from_bytes(&message.blob_name)?;
        let key = match message.key_info {
            Some(key_info) => Some(BlobKey::from_bytes(&key_info.key)?),
            None => None,
        };
        if name.blob_type() == BlobType::DynamicLink && message.mime_type.is_some() {
            return Err(EntrypointError::InvalidData(
                "links must not carry a mime type".into(),
            ));
        }
        Ok(Self {
            name,
            key,
            mime_type: message.mime_type,
            not_valid_before: message.not_valid_before_unix_micro,
            not_valid_after: message.not_valid_after_unix_micro,
        })
    }

    fn to_message(&self) -> EntrypointMessage {
        EntrypointMessage {
            blob_name: self.name.as_bytes().to_vec(),
            key_info: self.key.as_ref().map(|key| KeyInfoMessage {
                key: key.to_bytes(),
            }),
            mime_type: self.mime_type.clone(),
            not_valid_before_unix_micro: self.not_valid_before,
            not_valid_after_unix_micro: self.not_valid_after,
        }
    }

    /// Protobuf encoding.
    pub fn to_bytes(&self) -> Bytes {
        Bytes::from(self.to_message().encode_to_vec())
    }
}

impl TryFrom<EntrypointMessage> for Entrypoint {
    type Error = EntrypointError;

    fn try_from(message: EntrypointMessage) -> Result<Self, Self::Error> {
        Self::from_message(message)
    }
}

impl From<&Entrypoint> for EntrypointMessage {
    fn from(entrypoint: &Entrypoint) -> Self {
        entrypoint.to_message()
    }
}

impl fmt::Display for Entrypoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&bs58::encode(self.to_bytes()).into_string())
    }
}

impl FromStr for Entrypoint {
    type Err = EntrypointError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = bs58::decode(s)
            .into_vec()
            .map_err(|err| EntrypointError::InvalidData(err.to_string()))?;
        Self::from_bytes(&bytes)
    }
}

/// Errors raised by writer-info parsing.
#[derive(thiserror::Error, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum WriterInfoError {
    #[error("invalid writer info data: {0}")]
    InvalidData(String),
}

impl From<BlobNameError> for WriterInfoError {
    fn from(err: BlobNameError) -> Self {
        WriterInfoError::InvalidData(err.to_string())
    }
}

impl From<KeyError> for WriterInfoError {
    fn from(err: KeyError) -> Self {
        WriterInfoError::InvalidData(err.to_string())
    }
}

impl From<AuthInfoError> for WriterInfoError {
    fn from(err: AuthInfoError) -> Self {
        WriterInfoError::InvalidData(err.to_string())
    }
}

/// The tuple that grants update capability over a dynamic link.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WriterInfo {
    name: BlobName,
    key: BlobKey,
    auth_info: AuthInfo,
}

impl WriterInfo {
    pub fn new(name: BlobName, key: BlobKey, auth_info: AuthInfo) -> Self {
        Self {
            name,
            key,
            auth_info,
        }
    }

    pub fn name(&self) -> &BlobName {
        &self.name
    }

    pub fn key(&self) -> &BlobKey {
        &self.key
    }

    pub fn auth_info(&self) -> &AuthInfo {
        &self.auth_info
    }

    /// The entrypoint half of this writer info.
    pub fn entrypoint(&self) -> Entrypoint {
        Entrypoint::new(self.name, self.key.clone())
    }

    /// Parses the protobuf encoding.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, WriterInfoError> {
        if bytes.is_empty() {
            return Err(WriterInfoError::InvalidData(
                "empty writer info bytes".into(),
            ));
        }
        let message = WriterInfoMessage::decode(bytes)
            .map_err(|err| WriterInfoError::InvalidData(err.to_string()))?;
        let name = BlobName::from_bytes(&message.blob_name)?;
        let key = BlobKey::from_bytes(&message.key)?;
        let auth_info = AuthInfo::from_bytes(&message.auth_info)?;
        Ok(Self {
            name,
            key,
            auth_info,
        })
    }

    /// Protobuf encoding.
    pub fn to_bytes(&self) -> Bytes {
        let message = WriterInfoMessage {
            blob_name: self.name.as_bytes().to_vec(),
            key: self.key.to_bytes(),
            auth_info: self.auth_info.to_bytes(),
        };
        Bytes::from(message.encode_to_vec())
    }
}

impl fmt::Display for WriterInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&bs58::encode(self.to_bytes()).into_string())
    }
}

impl FromStr for WriterInfo {
    type Err = WriterInfoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = bs58::decode(s)
            .into_vec()
            .map_err(|err| WriterInfoError::InvalidData(err.to_string()))?;
        Self::from_bytes(&bytes)
    }
}
