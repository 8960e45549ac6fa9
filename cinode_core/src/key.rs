//! Typed encryption keys, writer secrets and the stream-cipher factory.
//!
//! A [`BlobKey`] is serialised as `[key_type] ‖ key bytes`. The key type
//! together with the IV length selects the concrete stream cipher:
//! ChaCha20 for 12-byte IVs, XChaCha20 for 24-byte IVs, and AES-256-CTR
//! (16-byte IVs), which is retained for keyed validation.

use std::fmt;

use chacha20::cipher::{KeyIvInit, StreamCipher, StreamCipherSeek};
use chacha20::{ChaCha20, XChaCha20};
use ed25519_dalek::SigningKey;
use zeroize::Zeroize;

type Aes256Ctr = ctr::Ctr128BE<aes::Aes256>;

/// ChaCha20 / XChaCha20 key length in bytes.
pub const CHACHA20_KEY_SIZE: usize = 32;

/// AES-256 key length in bytes.
pub const AES256_KEY_SIZE: usize = 32;

/// ChaCha20 (IETF) nonce length in bytes.
pub const CHACHA20_IV_SIZE: usize = 12;

/// XChaCha20 nonce length in bytes.
pub const XCHACHA20_IV_SIZE: usize = 24;

/// AES-CTR IV length in bytes.
pub const AES_CTR_IV_SIZE: usize = 16;

/// Cipher family selected by the leading byte of a serialised key.
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum KeyType {
    /// ChaCha20 family; the IV length picks the ChaCha20 or XChaCha20 variant.
    ChaCha20 = 0x00,
    /// AES-256 in CTR mode, retained for keyed validation.
    Aes256Ctr = 0x01,
}

impl KeyType {
    fn key_size(self) -> usize {
        match self {
            KeyType::ChaCha20 => CHACHA20_KEY_SIZE,
            KeyType::Aes256Ctr => AES256_KEY_SIZE,
        }
    }
}

/// Errors from key parsing and cipher construction.
#[derive(thiserror::Error, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum KeyError {
    #[error("empty key data")]
    Empty,

    #[error("unknown key type byte: {0:#04x}")]
    UnknownType(u8),

    #[error("invalid key length for {key_type:?}: expected {expected}, got {actual}")]
    InvalidKeyLength {
        key_type: KeyType,
        expected: usize,
        actual: usize,
    },

    #[error("unsupported IV length {0} for {1:?}")]
    InvalidIvLength(usize, KeyType),

    #[error("keystream exhausted")]
    KeystreamExhausted,
}

/// A typed symmetric key for blob content.
///
/// Key material is scrubbed on drop. `Debug` never prints the bytes.
#[derive(Clone, PartialEq, Eq)]
pub struct BlobKey {
    key_type: KeyType,
    material: Vec<u8>,
}

impl BlobKey {
    /// Wraps raw ChaCha20 key material.
    pub fn chacha20(material: [u8; CHACHA20_KEY_SIZE]) -> Self {
        Self {
            key_type: KeyType::ChaCha20,
            material: material.to_vec(),
        }
    }

    /// Wraps raw AES-256 key material.
    pub fn aes256_ctr(material: [u8; AES256_KEY_SIZE]) -> Self {
        Self {
            key_type: KeyType::Aes256Ctr,
            material: material.to_vec(),
        }
    }

    /// Parses a key from its `[type] ‖ bytes` serialisation.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, KeyError> {
        let (&type_byte, material) = bytes.split_first().ok_or(KeyError::Empty)?;
        let key_type = match type_byte {
            0x00 => KeyType::ChaCha20,
            0x01 => KeyType::Aes256Ctr,
            other => return Err(KeyError::UnknownType(other)),
        };
        if material.len() != key_type.key_size() {
            return Err(KeyError::InvalidKeyLength {
                key_type,
                expected: key_type.key_size(),
                actual: material.len(),
            });
        }
        Ok(Self {
            key_type,
            material: material.to_vec(),
        })
    }

    /// Serialises the key as `[type] ‖ bytes`.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(1 + self.material.len());
        out.push(self.key_type as u8);
        out.extend_from_slice(&self.material);
        out
    }

    pub fn key_type(&self) -> KeyType {
        self.key_type
    }

    /// Raw key material without the type byte.
    pub fn material(&self) -> &[u8] {
        &self.material
    }

    /// Builds a stream cipher for this key and the given IV.
    ///
    /// The IV length selects the variant; an unsupported combination is an
    /// error rather than a silent fallback.
    pub fn keystream(&self, iv: &[u8]) -> Result<Box<dyn KeystreamCipher>, KeyError> {
        match (self.key_type, iv.len()) {
            (KeyType::ChaCha20, CHACHA20_IV_SIZE) => {
                let cipher = ChaCha20::new_from_slices(&self.material, iv)
                    .map_err(|_| KeyError::InvalidIvLength(iv.len(), self.key_type))?;
                Ok(Box::new(RustCryptoCipher(cipher)))
            }
            (KeyType::ChaCha20, XCHACHA20_IV_SIZE) => {
                let cipher = XChaCha20::new_from_slices(&self.material, iv)
                    .map_err(|_| KeyError::InvalidIvLength(iv.len(), self.key_type))?;
                Ok(Box::new(RustCryptoCipher(cipher)))
            }
            (KeyType::Aes256Ctr, AES_CTR_IV_SIZE) => {
                let cipher = Aes256Ctr::new_from_slices(&self.material, iv)
                    .map_err(|_| KeyError::InvalidIvLength(iv.len(), self.key_type))?;
                Ok(Box::new(RustCryptoCipher(cipher)))
            }
            (key_type, len) => Err(KeyError::InvalidIvLength(len, key_type)),
        }
    }
}

impl Drop for BlobKey {
    fn drop(&mut self) {
        self.material.zeroize();
    }
}

impl fmt::Debug for BlobKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlobKey")
            .field("key_type", &self.key_type)
            .field("len", &self.material.len())
            .finish()
    }
}

/// Object-safe seekable keystream cipher.
///
/// The RustCrypto traits themselves are not object safe, so this wraps the
/// `StreamCipher + StreamCipherSeek` pair behind a boxable surface.
pub trait KeystreamCipher: Send {
    /// XORs the keystream into `buf` in place.
    fn apply_keystream(&mut self, buf: &mut [u8]) -> Result<(), KeyError>;

    /// Repositions the keystream to the given byte offset.
    fn seek(&mut self, pos: u64) -> Result<(), KeyError>;
}

struct RustCryptoCipher<C>(C);

impl<C> KeystreamCipher for RustCryptoCipher<C>
where
    C: StreamCipher + StreamCipherSeek + Send,
{
    fn apply_keystream(&mut self, buf: &mut [u8]) -> Result<(), KeyError> {
        self.0
            .try_apply_keystream(buf)
            .map_err(|_| KeyError::KeystreamExhausted)
    }

    fn seek(&mut self, pos: u64) -> Result<(), KeyError> {
        self.0
            .try_seek(pos)
            .map_err(|_| KeyError::KeystreamExhausted)
    }
}

/// Version byte of the auth-info encoding.
pub const AUTH_INFO_VERSION: u8 = 0x00;

/// Size of an Ed25519 private seed in bytes.
pub const ED25519_SEED_SIZE: usize = 32;

/// Errors from [`AuthInfo`] parsing.
#[derive(thiserror::Error, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum AuthInfoError {
    #[error("invalid auth info length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("unsupported auth info version: {0:#04x}")]
    UnsupportedVersion(u8),
}

/// Writer secret for a dynamic link: a versioned Ed25519 private seed.
///
/// Serialised as `[version 0x00] ‖ seed(32)`. The seed is scrubbed on drop
/// and never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct AuthInfo {
    seed: [u8; ED25519_SEED_SIZE],
}

impl AuthInfo {
    /// Wraps a raw Ed25519 seed.
    pub fn from_seed(seed: [u8; ED25519_SEED_SIZE]) -> Self {
        Self { seed }
    }

    /// Parses the `[version] ‖ seed` encoding.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, AuthInfoError> {
        if bytes.len() != 1 + ED25519_SEED_SIZE {
            return Err(AuthInfoError::InvalidLength {
                expected: 1 + ED25519_SEED_SIZE,
                actual: bytes.len(),
            });
        }
        if bytes[0] != AUTH_INFO_VERSION {
            return Err(AuthInfoError::UnsupportedVersion(bytes[0]));
        }
        let seed: [u8; ED25519_SEED_SIZE] = bytes[1..].try_into().expect("length checked");
        Ok(Self { seed })
    }

    /// Serialises as `[version] ‖ seed`.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(1 + ED25519_SEED_SIZE);
        out.push(AUTH_INFO_VERSION);
        out.extend_from_slice(&self.seed);
        out
    }

    /// The Ed25519 signing key this secret expands to.
    pub fn signing_key(&self) -> SigningKey {
        SigningKey::from_bytes(&self.seed)
    }
}

impl Drop for AuthInfo {
    fn drop(&mut self) {
        self.seed.zeroize();
    }
}

impl fmt::Debug for AuthInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthInfo").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_serialisation_roundtrip() {
        let key = BlobKey::chacha20([7u8; CHACHA20_KEY_SIZE]);
        let bytes = key.to_bytes();
        assert_eq!(bytes[0], 0x00);
        assert_eq!(bytes.len(), 33);
        let parsed = BlobKey::from_bytes(&bytes).unwrap();
        assert_eq!(parsed, key);

        let aes = BlobKey::aes256_ctr([9u8; AES256_KEY_SIZE]);
        let parsed = BlobKey::from_bytes(&aes.to_bytes()).unwrap();
        assert_eq!(parsed.key_type(), KeyType::Aes256Ctr);
    }

    #[test]
    fn key_parse_errors() {
        assert_eq!(BlobKey::from_bytes(&[]).unwrap_err(), KeyError::Empty);
        assert_eq!(
            BlobKey::from_bytes(&[0x05; 33]).unwrap_err(),
            KeyError::UnknownType(0x05)
        );
        assert!(matches!(
            BlobKey::from_bytes(&[0x00; 17]).unwrap_err(),
            KeyError::InvalidKeyLength { actual: 16, .. }
        ));
    }

    #[test]
    fn chacha20_keystream_roundtrip() {
        let key = BlobKey::chacha20([1u8; CHACHA20_KEY_SIZE]);
        let iv = [2u8; CHACHA20_IV_SIZE];

        let mut buf = b"attack at dawn".to_vec();
        key.keystream(&iv).unwrap().apply_keystream(&mut buf).unwrap();
        assert_ne!(buf, b"attack at dawn");

        key.keystream(&iv).unwrap().apply_keystream(&mut buf).unwrap();
        assert_eq!(buf, b"attack at dawn");
    }

    #[test]
    fn xchacha20_selected_by_iv_length() {
        let key = BlobKey::chacha20([1u8; CHACHA20_KEY_SIZE]);
        let mut short = b"payload".to_vec();
        let mut long = b"payload".to_vec();
        key.keystream(&[0u8; CHACHA20_IV_SIZE])
            .unwrap()
            .apply_keystream(&mut short)
            .unwrap();
        key.keystream(&[0u8; XCHACHA20_IV_SIZE])
            .unwrap()
            .apply_keystream(&mut long)
            .unwrap();
        // Different variants must produce different keystreams.
        assert_ne!(short, long);
    }

    #[test]
    fn aes_ctr_keystream_roundtrip() {
        let key = BlobKey::aes256_ctr([3u8; AES256_KEY_SIZE]);
        let iv = [4u8; AES_CTR_IV_SIZE];
        let mut buf = b"keyed validation".to_vec();
        key.keystream(&iv).unwrap().apply_keystream(&mut buf).unwrap();
        key.keystream(&iv).unwrap().apply_keystream(&mut buf).unwrap();
        assert_eq!(buf, b"keyed validation");
    }

    #[test]
    fn unsupported_iv_length_rejected() {
        let key = BlobKey::chacha20([1u8; CHACHA20_KEY_SIZE]);
        assert!(matches!(
            key.keystream(&[0u8; 16]).err().unwrap(),
            KeyError::InvalidIvLength(16, KeyType::ChaCha20)
        ));
    }

    #[test]
    fn keystream_seek_matches_offset() {
        let key = BlobKey::chacha20([5u8; CHACHA20_KEY_SIZE]);
        let iv = [6u8; XCHACHA20_IV_SIZE];

        let mut full = vec![0u8; 64];
        key.keystream(&iv).unwrap().apply_keystream(&mut full).unwrap();

        let mut tail = vec![0u8; 32];
        let mut cipher = key.keystream(&iv).unwrap();
        cipher.seek(32).unwrap();
        cipher.apply_keystream(&mut tail).unwrap();
        assert_eq!(&full[32..], &tail[..]);
    }

    #[test]
    fn auth_info_roundtrip() {
        let auth = AuthInfo::from_seed([42u8; ED25519_SEED_SIZE]);
        let bytes = auth.to_bytes();
        assert_eq!(bytes[0], AUTH_INFO_VERSION);
        let parsed = AuthInfo::from_bytes(&bytes).unwrap();
        assert_eq!(parsed, auth);
        assert_eq!(
            parsed.signing_key().verifying_key(),
            auth.signing_key().verifying_key()
        );
    }

    #[test]
    fn auth_info_rejects_unknown_version() {
        let mut bytes = AuthInfo::from_seed([0u8; ED25519_SEED_SIZE]).to_bytes();
        bytes[0] = 0x01;
        assert_eq!(
            AuthInfo::from_bytes(&bytes).unwrap_err(),
            AuthInfoError::UnsupportedVersion(0x01)
        );
    }

    #[test]
    fn auth_info_rejects_wrong_length() {
        assert!(matches!(
            AuthInfo::from_bytes(&[0u8; 12]).unwrap_err(),
            AuthInfoError::InvalidLength { actual: 12, .. }
        ));
    }
}
