//! Ingest-time validation shared by all datastore backends.
//!
//! Every backend funnels incoming blob content through [`ingest`] before
//! committing it: static blobs must hash to their name, dynamic links must
//! pass public-layer validation, and an already-stored link only gets
//! replaced when the incoming record supersedes it.

use bytes::Bytes;
use tracing::debug;

use crate::hash::sha256;
use crate::link::{DynamicLinkRecord, LinkError};
use crate::name::{BlobName, BlobType};

/// Reasons a blob is rejected at ingest.
#[derive(thiserror::Error, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum ValidationError {
    #[error("content hash does not match the blob name")]
    HashMismatch,

    #[error(transparent)]
    Link(#[from] LinkError),
}

/// Outcome of a successful ingest check.
#[derive(Debug, PartialEq, Eq)]
pub enum IngestDecision {
    /// Commit the carried bytes as the new stored content.
    Commit(Bytes),
    /// The stored content already supersedes the incoming one; keep it.
    KeepCurrent,
}

/// Validates a static blob: its bytes must hash to the name.
pub fn validate_static(name: &BlobName, content: &[u8]) -> Result<(), ValidationError> {
    if &sha256(content) != name.hash() {
        return Err(ValidationError::HashMismatch);
    }
    Ok(())
}

/// Validates an incoming dynamic link and merges it against the stored one.
pub fn ingest_dynamic_link(
    name: &BlobName,
    incoming: Bytes,
    current: Option<&Bytes>,
) -> Result<IngestDecision, ValidationError> {
    let record = DynamicLinkRecord::deserialize(incoming.clone())?;
    record.verify(name)?;

    if let Some(current) = current {
        // A stored record that no longer parses or verifies loses
        // unconditionally to a valid incoming one.
        if let Ok(stored) = DynamicLinkRecord::deserialize(current.clone())
            && stored.verify(name).is_ok()
            && !record.supersedes(&stored)
        {
            debug!(
                name = %name.fmt_short(),
                incoming_version = record.content_version(),
                stored_version = stored.content_version(),
                "ignoring dynamic link that does not supersede the stored one"
            );
            return Ok(IngestDecision::KeepCurrent);
        }
    }

    Ok(IngestDecision::Commit(incoming))
}

/// Dispatches on the name's blob type.
pub fn ingest(
    name: &BlobName,
    incoming: Bytes,
    current: Option<&Bytes>,
) -> Result<IngestDecision, ValidationError> {
    match name.blob_type() {
        BlobType::Static => {
            validate_static(name, &incoming)?;
            // Content-addressed: identical by construction, committing is
            // equivalent to keeping.
            Ok(IngestDecision::Commit(incoming))
        }
        BlobType::DynamicLink => ingest_dynamic_link(name, incoming, current),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::digest;
    use crate::link::{NONCE_SIZE, RESERVED_BYTE};
    use ed25519_dalek::{Signer, SigningKey};

    fn static_blob(content: &[u8]) -> (BlobName, Bytes) {
        (
            BlobName::from_hash_and_type(sha256(content), BlobType::Static),
            Bytes::copy_from_slice(content),
        )
    }

    fn link_blob(seed: u8, version: u64, ciphertext: &[u8]) -> (BlobName, Bytes) {
        let signing = SigningKey::from_bytes(&[seed; 32]);
        let public_key = signing.verifying_key().to_bytes();
        let nonce = [seed; NONCE_SIZE];
        let name = BlobName::from_hash_and_type(
            digest(&[&[RESERVED_BYTE], &public_key, &nonce]),
            BlobType::DynamicLink,
        );
        let sig_digest = DynamicLinkRecord::signature_digest(&name, version, ciphertext);
        let record = DynamicLinkRecord::from_parts(
            public_key,
            nonce,
            version,
            signing.sign(&sig_digest).to_bytes(),
            vec![0x11; 24],
            Bytes::copy_from_slice(ciphertext),
        );
        (name, record.serialize())
    }

    #[test]
    fn static_hash_must_match() {
        let (name, content) = static_blob(b"good content");
        validate_static(&name, &content).unwrap();
        assert_eq!(
            validate_static(&name, b"tampered").unwrap_err(),
            ValidationError::HashMismatch
        );
    }

    #[test]
    fn static_ingest_commits() {
        let (name, content) = static_blob(b"payload");
        assert_eq!(
            ingest(&name, content.clone(), None).unwrap(),
            IngestDecision::Commit(content)
        );
    }

    #[test]
    fn dynamic_ingest_requires_valid_signature() {
        let (name, encoded) = link_blob(1, 5, b"v5");
        let mut tampered = encoded.to_vec();
        let last = tampered.len() - 1;
        tampered[last] ^= 0x80;
        assert!(matches!(
            ingest(&name, Bytes::from(tampered), None).unwrap_err(),
            ValidationError::Link(LinkError::InvalidSignature)
        ));
    }

    #[test]
    fn newer_version_replaces_older() {
        let (name, old) = link_blob(2, 5, b"old");
        let (_, new) = link_blob(2, 6, b"new");

        assert_eq!(
            ingest(&name, new.clone(), Some(&old)).unwrap(),
            IngestDecision::Commit(new.clone())
        );
        assert_eq!(
            ingest(&name, old, Some(&new)).unwrap(),
            IngestDecision::KeepCurrent
        );
    }

    #[test]
    fn equal_version_resolved_by_signature_order() {
        let (name, a) = link_blob(3, 9, b"variant a");
        let (_, b) = link_blob(3, 9, b"variant b");

        let record_a = DynamicLinkRecord::deserialize(a.clone()).unwrap();
        let record_b = DynamicLinkRecord::deserialize(b.clone()).unwrap();
        let (winner, loser) = if record_a.signature() > record_b.signature() {
            (a, b)
        } else {
            (b, a)
        };

        assert_eq!(
            ingest(&name, winner.clone(), Some(&loser)).unwrap(),
            IngestDecision::Commit(winner.clone())
        );
        assert_eq!(
            ingest(&name, loser, Some(&winner)).unwrap(),
            IngestDecision::KeepCurrent
        );
    }

    #[test]
    fn corrupt_stored_record_loses_to_valid_incoming() {
        let (name, incoming) = link_blob(4, 1, b"fresh");
        let stored = Bytes::from_static(b"\x00garbage");
        assert_eq!(
            ingest(&name, incoming.clone(), Some(&stored)).unwrap(),
            IngestDecision::Commit(incoming)
        );
    }
}
