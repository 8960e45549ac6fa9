//! On-disk directory schema.
//!
//! A directory blob is a protobuf sequence of `{name, entrypoint}` pairs.
//! Names are non-empty and unique, and the encoder always emits them in
//! lexicographic order so identical trees produce identical blob names.

use std::collections::BTreeMap;

use bytes::Bytes;
use cinode_core::Entrypoint;
use cinode_core::proto::EntrypointMessage;
use prost::Message;

use crate::error::FsError;

/// Mime type marking a static blob as a serialised directory.
pub const DIRECTORY_MIME_TYPE: &str = "application/cinode-dir";

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DirectoryMessage {
    #[prost(message, repeated, tag = "1")]
    pub entries: ::prost::alloc::vec::Vec<DirectoryEntryMessage>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DirectoryEntryMessage {
    #[prost(string, tag = "1")]
    pub name: ::prost::alloc::string::String,

    #[prost(message, optional, tag = "2")]
    pub entrypoint: ::core::option::Option<EntrypointMessage>,
}

/// Decodes a directory blob into its entry map.
///
/// Duplicate or empty names are rejected; entry order on disk is not
/// trusted, the map normalises it.
pub(crate) fn decode_entries(bytes: &[u8]) -> Result<BTreeMap<String, Entrypoint>, FsError> {
    let message = DirectoryMessage::decode(bytes)?;
    let mut entries = BTreeMap::new();
    for entry in message.entries {
        if entry.name.is_empty() {
            return Err(FsError::EmptyName);
        }
        let entrypoint_message = entry.entrypoint.ok_or_else(|| {
            FsError::InvalidEntrypointData(format!("directory entry {:?} has no entrypoint", entry.name))
        })?;
        let entrypoint = Entrypoint::try_from(entrypoint_message)?;
        if entries.insert(entry.name.clone(), entrypoint).is_some() {
            return Err(FsError::DuplicateEntry(entry.name));
        }
    }
    Ok(entries)
}

/// Encodes entries sorted by name.
pub(crate) fn encode_entries(entries: &BTreeMap<String, Entrypoint>) -> Bytes {
    let message = DirectoryMessage {
        entries: entries
            .iter()
            .map(|(name, entrypoint)| DirectoryEntryMessage {
                name: name.clone(),
                entrypoint: Some(entrypoint.into()),
            })
            .collect(),
    };
    Bytes::from(message.encode_to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use cinode_core::hash::sha256;
    use cinode_core::{BlobKey, BlobName, BlobType};

    fn entrypoint(content: &[u8]) -> Entrypoint {
        Entrypoint::new(
            BlobName::from_hash_and_type(sha256(content), BlobType::Static),
            BlobKey::chacha20([1u8; 32]),
        )
    }

    #[test]
    fn roundtrip_preserves_entries() {
        let mut entries = BTreeMap::new();
        entries.insert("a.txt".to_string(), entrypoint(b"a"));
        entries.insert("b.txt".to_string(), entrypoint(b"b"));
        entries.insert("subdir".to_string(), entrypoint(b"c"));

        let decoded = decode_entries(&encode_entries(&entries)).unwrap();
        assert_eq!(decoded, entries);
    }

    #[test]
    fn encoding_is_deterministic_regardless_of_insert_order() {
        let mut forward = BTreeMap::new();
        forward.insert("one".to_string(), entrypoint(b"1"));
        forward.insert("two".to_string(), entrypoint(b"2"));

        let mut backward = BTreeMap::new();
        backward.insert("two".to_string(), entrypoint(b"2"));
        backward.insert("one".to_string(), entrypoint(b"1"));

        assert_eq!(encode_entries(&forward), encode_entries(&backward));
    }

    #[test]
    fn duplicate_names_rejected() {
        let message = DirectoryMessage {
            entries: vec![
                DirectoryEntryMessage {
                    name: "twin".to_string(),
                    entrypoint: Some((&entrypoint(b"1")).into()),
                },
                DirectoryEntryMessage {
                    name: "twin".to_string(),
                    entrypoint: Some((&entrypoint(b"2")).into()),
                },
            ],
        };
        assert!(matches!(
            decode_entries(&message.encode_to_vec()).unwrap_err(),
            FsError::DuplicateEntry(name) if name == "twin"
        ));
    }

    #[test]
    fn empty_names_rejected() {
        let message = DirectoryMessage {
            entries: vec![DirectoryEntryMessage {
                name: String::new(),
                entrypoint: Some((&entrypoint(b"1")).into()),
            }],
        };
        assert!(matches!(
            decode_entries(&message.encode_to_vec()).unwrap_err(),
            FsError::EmptyName
        ));
    }

    #[test]
    fn entry_without_entrypoint_rejected() {
        let message = DirectoryMessage {
            entries: vec![DirectoryEntryMessage {
                name: "hollow".to_string(),
                entrypoint: None,
            }],
        };
        assert!(matches!(
            decode_entries(&message.encode_to_vec()).unwrap_err(),
            FsError::InvalidEntrypointData(_)
        ));
    }

    #[test]
    fn empty_directory_roundtrip() {
        let entries = BTreeMap::new();
        let decoded = decode_entries(&encode_entries(&entries)).unwrap();
        assert!(decoded.is_empty());
    }
}
