//! Filesystem error kinds.

use cinode_blobs::EncoderError;
use cinode_core::{EntrypointError, WriterInfoError};

/// Errors surfaced by filesystem operations.
///
/// Every kind a caller may want to react to is its own variant; nothing is
/// swallowed internally.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum FsError {
    #[error("entry not found")]
    EntryNotFound,

    #[error("empty path segment")]
    EmptyName,

    #[error("not a directory")]
    NotADirectory,

    #[error("is a directory")]
    IsADirectory,

    #[error("not a link")]
    NotALink,

    #[error("no writer info registered for the target blob")]
    MissingWriterInfo,

    #[error("directory has unflushed modifications")]
    ModifiedDirectory,

    #[error("duplicate directory entry: {0:?}")]
    DuplicateEntry(String),

    #[error("link chain exceeded {0} redirects")]
    TooManyRedirects(u32),

    #[error("invalid entrypoint data: {0}")]
    InvalidEntrypointData(String),

    #[error("invalid writer info data: {0}")]
    InvalidWriterInfoData(String),

    #[error("entrypoint does not carry a key")]
    MissingKeyInfo,

    #[error("entrypoint is not yet valid")]
    NotYetValid,

    #[error("entrypoint has expired")]
    Expired,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Encoder(EncoderError),
}

impl From<EntrypointError> for FsError {
    fn from(err: EntrypointError) -> Self {
        match err {
            EntrypointError::InvalidData(message) => FsError::InvalidEntrypointData(message),
            EntrypointError::MissingKeyInfo => FsError::MissingKeyInfo,
            EntrypointError::NotYetValid => FsError::NotYetValid,
            EntrypointError::Expired => FsError::Expired,
            other => FsError::InvalidEntrypointData(other.to_string()),
        }
    }
}

impl From<WriterInfoError> for FsError {
    fn from(err: WriterInfoError) -> Self {
        FsError::InvalidWriterInfoData(err.to_string())
    }
}

impl From<EncoderError> for FsError {
    fn from(err: EncoderError) -> Self {
        match err {
            EncoderError::TooManyRedirects(cap) => FsError::TooManyRedirects(cap),
            EncoderError::Entrypoint(inner) => inner.into(),
            other => FsError::Encoder(other),
        }
    }
}

impl From<prost::DecodeError> for FsError {
    fn from(err: prost::DecodeError) -> Self {
        FsError::InvalidEntrypointData(err.to_string())
    }
}
