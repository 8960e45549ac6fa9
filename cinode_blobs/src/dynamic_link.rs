//! Keyed operations on dynamic links.
//!
//! Everything here needs key material: deriving the symmetric key from the
//! signing key, building and checking the key-validation block, deriving
//! the per-version IV and producing signed records. The keyless half
//! (wire format, name recomputation, signature verification, merge
//! ordering) lives in `cinode_core::link`.

use bytes::Bytes;
use cinode_core::hash::{
    DOMAIN_IV_DERIVATION, DOMAIN_KEY_DERIVATION, domain_digest,
};
use cinode_core::key::{ED25519_SEED_SIZE, XCHACHA20_IV_SIZE};
use cinode_core::link::{NONCE_SIZE, RESERVED_BYTE, SIGNATURE_SIZE};
use cinode_core::{
    AuthInfo, BlobKey, BlobName, BlobType, DataStore, DynamicLinkRecord, KeyType,
};
use ed25519_dalek::{Signature, Signer, SigningKey, VerifyingKey};
use tokio::io::AsyncReadExt;
use tracing::debug;
use zeroize::Zeroize;

use crate::error::EncoderError;
use crate::seams::{RandomSource, VersionSource};

/// Version byte of the key-validation block.
const KEY_VALIDATION_VERSION: u8 = 0x00;

/// Length byte of the block: version byte plus one Ed25519 signature.
const KEY_VALIDATION_LEN: usize = 1 + SIGNATURE_SIZE;

/// The message whose signature seeds both the symmetric key and the
/// key-validation block: `0x01 ‖ name`.
fn key_seed_message(name: &BlobName) -> Vec<u8> {
    let mut message = Vec::with_capacity(1 + name.as_bytes().len());
    message.push(DOMAIN_KEY_DERIVATION);
    message.extend_from_slice(name.as_bytes());
    message
}

/// Derives the symmetric key for a link from its signing key.
///
/// Any authorised writer reproduces the same key; an observer holding only
/// the name cannot, because the derivation runs through a signature.
fn derive_key(signing: &SigningKey, name: &BlobName) -> (BlobKey, Signature) {
    let seed_signature = signing.sign(&key_seed_message(name));
    let key_bytes = domain_digest(
        DOMAIN_KEY_DERIVATION,
        &[
            &[KeyType::ChaCha20 as u8],
            &[BlobType::DynamicLink.id_byte()],
            &seed_signature.to_bytes(),
        ],
    );
    (BlobKey::chacha20(key_bytes), seed_signature)
}

/// Deterministic per-version IV covering every byte it protects.
fn derive_iv(name: &BlobName, content_version: u64, plaintext: &[u8]) -> [u8; XCHACHA20_IV_SIZE] {
    let digest = domain_digest(
        DOMAIN_IV_DERIVATION,
        &[
            &[KeyType::ChaCha20 as u8],
            &[BlobType::DynamicLink.id_byte()],
            &[name.as_bytes().len() as u8],
            name.as_bytes(),
            &content_version.to_be_bytes(),
            plaintext,
        ],
    );
    digest[..XCHACHA20_IV_SIZE].try_into().expect("24 <= 32")
}

/// Prefixes the payload with the key-validation block.
fn build_plaintext(seed_signature: &Signature, payload: &[u8]) -> Vec<u8> {
    let mut plaintext = Vec::with_capacity(1 + KEY_VALIDATION_LEN + payload.len());
    plaintext.push(KEY_VALIDATION_LEN as u8);
    plaintext.push(KEY_VALIDATION_VERSION);
    plaintext.extend_from_slice(&seed_signature.to_bytes());
    plaintext.extend_from_slice(payload);
    plaintext
}

/// Checks the key-validation block of decrypted plaintext and returns the
/// payload that follows it.
///
/// The block carries a signature over `0x01 ‖ name`; verifying it against
/// the link's public key proves the decryption key was correct without
/// anyone holding the private key. Decrypting with a wrong key produces a
/// garbage block, which fails here.
fn split_payload<'a>(
    plaintext: &'a [u8],
    name: &BlobName,
    verifying_key: &VerifyingKey,
) -> Result<&'a [u8], EncoderError> {
    let (&block_len, rest) = plaintext
        .split_first()
        .ok_or(EncoderError::InvalidKeyValidationBlock)?;
    let block_len = block_len as usize;
    if block_len != KEY_VALIDATION_LEN || rest.len() < block_len {
        return Err(EncoderError::InvalidKeyValidationBlock);
    }
    let (block, payload) = rest.split_at(block_len);
    if block[0] != KEY_VALIDATION_VERSION {
        return Err(EncoderError::InvalidKeyValidationBlock);
    }
    let signature_bytes: [u8; SIGNATURE_SIZE] = block[1..].try_into().expect("length checked");
    let signature = Signature::from_bytes(&signature_bytes);
    verifying_key
        .verify_strict(&key_seed_message(name), &signature)
        .map_err(|_| EncoderError::InvalidKeyValidationBlock)?;
    Ok(payload)
}

/// Builds a fully signed record for one version of a link.
fn seal_record(
    signing: &SigningKey,
    name: &BlobName,
    key: &BlobKey,
    nonce: [u8; NONCE_SIZE],
    content_version: u64,
    seed_signature: &Signature,
    payload: &[u8],
) -> Result<DynamicLinkRecord, EncoderError> {
    let plaintext = build_plaintext(seed_signature, payload);
    let iv = derive_iv(name, content_version, &plaintext);

    let mut ciphertext = plaintext;
    key.keystream(&iv)?.apply_keystream(&mut ciphertext)?;

    let digest = DynamicLinkRecord::signature_digest(name, content_version, &ciphertext);
    let signature = signing.sign(&digest);

    Ok(DynamicLinkRecord::from_parts(
        signing.verifying_key().to_bytes(),
        nonce,
        content_version,
        signature.to_bytes(),
        iv.to_vec(),
        Bytes::from(ciphertext),
    ))
}

async fn store_record(
    store: &dyn DataStore,
    name: &BlobName,
    record: &DynamicLinkRecord,
) -> Result<(), EncoderError> {
    let encoded = record.serialize();
    store
        .update(name, Box::new(std::io::Cursor::new(encoded.to_vec())))
        .await?;
    Ok(())
}

/// Mints a fresh link holding `payload` as its first version.
pub(crate) async fn create(
    store: &dyn DataStore,
    random: &dyn RandomSource,
    versions: &dyn VersionSource,
    payload: &[u8],
) -> Result<(BlobName, BlobKey, AuthInfo), EncoderError> {
    let mut seed = [0u8; ED25519_SEED_SIZE];
    random.fill(&mut seed);
    let signing = SigningKey::from_bytes(&seed);
    let auth_info = AuthInfo::from_seed(seed);
    seed.zeroize();

    let mut nonce = [0u8; NONCE_SIZE];
    random.fill(&mut nonce);

    let name = link_name(&signing.verifying_key(), &nonce);
    let content_version = versions.now_micros();
    let (key, seed_signature) = derive_key(&signing, &name);

    let record = seal_record(
        &signing,
        &name,
        &key,
        nonce,
        content_version,
        &seed_signature,
        payload,
    )?;
    store_record(store, &name, &record).await?;

    debug!(name = %name.fmt_short(), content_version, "minted dynamic link");
    Ok((name, key, auth_info))
}

/// Reads one link and returns its decrypted, fully validated payload.
pub(crate) async fn open_payload(
    store: &dyn DataStore,
    name: &BlobName,
    key: &BlobKey,
) -> Result<Bytes, EncoderError> {
    let mut reader = store.open(name).await?;
    let mut encoded = Vec::new();
    reader.read_to_end(&mut encoded).await?;

    let record = DynamicLinkRecord::deserialize(Bytes::from(encoded))?;
    record.verify(name)?;

    let mut plaintext = record.ciphertext().to_vec();
    key.keystream(record.iv())?.apply_keystream(&mut plaintext)?;

    let verifying_key = VerifyingKey::from_bytes(record.public_key())
        .map_err(|_| EncoderError::ValidationFailed("malformed public key".into()))?;
    let payload = split_payload(&plaintext, name, &verifying_key)?;

    let expected_iv = derive_iv(name, record.content_version(), &plaintext);
    if expected_iv[..] != *record.iv() {
        return Err(EncoderError::IvMismatch);
    }

    Ok(Bytes::copy_from_slice(payload))
}

/// Publishes a new version of an existing link.
pub(crate) async fn update(
    store: &dyn DataStore,
    versions: &dyn VersionSource,
    name: &BlobName,
    auth_info: &AuthInfo,
    key: &BlobKey,
    payload: &[u8],
) -> Result<(), EncoderError> {
    let signing = auth_info.signing_key();

    // The stored record supplies the creation nonce and current version.
    let mut reader = store.open(name).await?;
    let mut encoded = Vec::new();
    reader.read_to_end(&mut encoded).await?;
    let current = DynamicLinkRecord::deserialize(Bytes::from(encoded))?;
    current.verify(name)?;

    if current.public_key() != &signing.verifying_key().to_bytes() {
        return Err(EncoderError::ValidationFailed(
            "auth info does not match the link's public key".into(),
        ));
    }

    let (derived_key, seed_signature) = derive_key(&signing, name);
    if derived_key != *key {
        return Err(EncoderError::ValidationFailed(
            "provided key does not match the one derived from the auth info".into(),
        ));
    }

    let content_version = versions
        .now_micros()
        .max(current.content_version().saturating_add(1));

    let record = seal_record(
        &signing,
        name,
        &derived_key,
        *current.nonce(),
        content_version,
        &seed_signature,
        payload,
    )?;
    store_record(store, name, &record).await?;

    debug!(name = %name.fmt_short(), content_version, "updated dynamic link");
    Ok(())
}

fn link_name(verifying_key: &VerifyingKey, nonce: &[u8; NONCE_SIZE]) -> BlobName {
    BlobName::from_hash_and_type(
        cinode_core::hash::digest(&[&[RESERVED_BYTE], verifying_key.as_bytes(), nonce]),
        BlobType::DynamicLink,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::seams::testutil::{SequenceRandomSource, TickingVersionSource};
    use cinode_store_memory::MemoryDataStore;

    fn signing_key(seed: u8) -> SigningKey {
        SigningKey::from_bytes(&[seed; ED25519_SEED_SIZE])
    }

    fn name_for(signing: &SigningKey, nonce_byte: u8) -> BlobName {
        link_name(&signing.verifying_key(), &[nonce_byte; NONCE_SIZE])
    }

    #[test]
    fn key_derivation_is_deterministic_per_link() {
        let signing = signing_key(1);
        let name = name_for(&signing, 1);
        let (key_a, sig_a) = derive_key(&signing, &name);
        let (key_b, sig_b) = derive_key(&signing, &name);
        assert_eq!(key_a, key_b);
        assert_eq!(sig_a, sig_b);

        let other_name = name_for(&signing, 2);
        let (other_key, _) = derive_key(&signing, &other_name);
        assert_ne!(key_a, other_key);
    }

    #[test]
    fn iv_binds_name_version_and_plaintext() {
        let signing = signing_key(3);
        let name = name_for(&signing, 3);
        let base = derive_iv(&name, 10, b"plaintext");
        assert_eq!(base, derive_iv(&name, 10, b"plaintext"));
        assert_ne!(base, derive_iv(&name, 11, b"plaintext"));
        assert_ne!(base, derive_iv(&name, 10, b"plaintext!"));
        assert_ne!(base, derive_iv(&name_for(&signing, 4), 10, b"plaintext"));
    }

    #[test]
    fn key_validation_block_roundtrip() {
        let signing = signing_key(5);
        let name = name_for(&signing, 5);
        let (_, seed_signature) = derive_key(&signing, &name);
        let plaintext = build_plaintext(&seed_signature, b"the payload");
        let payload = split_payload(&plaintext, &name, &signing.verifying_key()).unwrap();
        assert_eq!(payload, b"the payload");
    }

    #[test]
    fn key_validation_block_rejects_garbage() {
        let signing = signing_key(6);
        let name = name_for(&signing, 6);
        let verifying = signing.verifying_key();

        // Empty plaintext.
        assert!(matches!(
            split_payload(&[], &name, &verifying).unwrap_err(),
            EncoderError::InvalidKeyValidationBlock
        ));

        // Wrong block length byte.
        let (_, seed_signature) = derive_key(&signing, &name);
        let mut plaintext = build_plaintext(&seed_signature, b"x");
        plaintext[0] = 12;
        assert!(matches!(
            split_payload(&plaintext, &name, &verifying).unwrap_err(),
            EncoderError::InvalidKeyValidationBlock
        ));

        // Wrong block version byte.
        let mut plaintext = build_plaintext(&seed_signature, b"x");
        plaintext[1] = 0x01;
        assert!(matches!(
            split_payload(&plaintext, &name, &verifying).unwrap_err(),
            EncoderError::InvalidKeyValidationBlock
        ));

        // Signature for a different link.
        let other_name = name_for(&signing, 7);
        let (_, other_signature) = derive_key(&signing, &other_name);
        let plaintext = build_plaintext(&other_signature, b"x");
        assert!(matches!(
            split_payload(&plaintext, &name, &verifying).unwrap_err(),
            EncoderError::InvalidKeyValidationBlock
        ));
    }

    #[tokio::test]
    async fn create_open_update_roundtrip() {
        let store = MemoryDataStore::new();
        let random = SequenceRandomSource::default();
        let versions = TickingVersionSource::starting_at(1_000);

        let (name, key, auth_info) =
            create(&store, &random, &versions, b"first payload").await.unwrap();
        assert_eq!(name.blob_type(), BlobType::DynamicLink);
        assert_eq!(
            open_payload(&store, &name, &key).await.unwrap(),
            Bytes::from_static(b"first payload")
        );

        update(&store, &versions, &name, &auth_info, &key, b"second payload")
            .await
            .unwrap();
        assert_eq!(
            open_payload(&store, &name, &key).await.unwrap(),
            Bytes::from_static(b"second payload")
        );
    }

    #[tokio::test]
    async fn update_version_stays_monotonic_with_stalled_clock() {
        let store = MemoryDataStore::new();
        let random = SequenceRandomSource::default();
        // The clock source barely moves; versions must still advance.
        let versions = TickingVersionSource::starting_at(0);

        let (name, key, auth_info) = create(&store, &random, &versions, b"v0").await.unwrap();
        for payload in [b"v1".as_slice(), b"v2", b"v3"] {
            update(&store, &versions, &name, &auth_info, &key, payload)
                .await
                .unwrap();
            assert_eq!(open_payload(&store, &name, &key).await.unwrap(), payload);
        }
    }

    #[tokio::test]
    async fn update_rejects_foreign_auth_info() {
        let store = MemoryDataStore::new();
        let random = SequenceRandomSource::default();
        let versions = TickingVersionSource::starting_at(10);

        let (name, key, _) = create(&store, &random, &versions, b"payload").await.unwrap();
        let foreign = AuthInfo::from_seed([0xEE; ED25519_SEED_SIZE]);
        assert!(matches!(
            update(&store, &versions, &name, &foreign, &key, b"hijack")
                .await
                .unwrap_err(),
            EncoderError::ValidationFailed(_)
        ));
        assert_eq!(
            open_payload(&store, &name, &key).await.unwrap(),
            Bytes::from_static(b"payload")
        );
    }

    #[tokio::test]
    async fn update_rejects_mismatched_key() {
        let store = MemoryDataStore::new();
        let random = SequenceRandomSource::default();
        let versions = TickingVersionSource::starting_at(10);

        let (name, _, auth_info) = create(&store, &random, &versions, b"payload").await.unwrap();
        let wrong_key = BlobKey::chacha20([0xAB; 32]);
        assert!(matches!(
            update(&store, &versions, &name, &auth_info, &wrong_key, b"oops")
                .await
                .unwrap_err(),
            EncoderError::ValidationFailed(_)
        ));
    }

    #[tokio::test]
    async fn wrong_key_fails_key_validation_block() {
        let store = MemoryDataStore::new();
        let random = SequenceRandomSource::default();
        let versions = TickingVersionSource::starting_at(10);

        let (name, _, _) = create(&store, &random, &versions, b"secret").await.unwrap();
        let wrong_key = BlobKey::chacha20([0xCD; 32]);
        assert!(matches!(
            open_payload(&store, &name, &wrong_key).await.unwrap_err(),
            EncoderError::InvalidKeyValidationBlock
        ));
    }

    #[tokio::test]
    async fn non_derived_iv_is_detected() {
        let store = MemoryDataStore::new();
        let signing = signing_key(9);
        let nonce = [9u8; NONCE_SIZE];
        let name = link_name(&signing.verifying_key(), &nonce);
        let (key, seed_signature) = derive_key(&signing, &name);

        // A malicious writer encrypts under an IV derived for a different
        // version, then signs the record consistently. Decryption works and
        // the key-validation block passes, so only the IV recomputation
        // check can catch it.
        let plaintext = build_plaintext(&seed_signature, b"payload");
        let version = 50u64;
        let wrong_iv = derive_iv(&name, version + 1, &plaintext);
        let mut ciphertext = plaintext;
        key.keystream(&wrong_iv).unwrap().apply_keystream(&mut ciphertext).unwrap();
        let digest = DynamicLinkRecord::signature_digest(&name, version, &ciphertext);
        let record = DynamicLinkRecord::from_parts(
            signing.verifying_key().to_bytes(),
            nonce,
            version,
            signing.sign(&digest).to_bytes(),
            wrong_iv.to_vec(),
            Bytes::from(ciphertext),
        );
        store_record(&store, &name, &record).await.unwrap();

        assert!(matches!(
            open_payload(&store, &name, &key).await.unwrap_err(),
            EncoderError::IvMismatch
        ));
    }
}
