//! Domain-separated SHA-256 hashing.
//!
//! Every internal derivation prepends a one-byte domain separator so that
//! hashes computed for one purpose can never collide with hashes computed
//! for another: `0x01` for key derivation, `0x02` for IV derivation.
//! Content hashes (blob names, signature digests) use the plain function.

use sha2::{Digest, Sha256};

/// Size of a SHA-256 digest in bytes.
pub const HASH_SIZE: usize = 32;

/// Domain separator for key derivation hashes.
pub const DOMAIN_KEY_DERIVATION: u8 = 0x01;

/// Domain separator for IV derivation hashes.
pub const DOMAIN_IV_DERIVATION: u8 = 0x02;

/// SHA-256 over the concatenation of `parts`.
pub fn digest(parts: &[&[u8]]) -> [u8; HASH_SIZE] {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize().into()
}

/// SHA-256 of a single byte slice.
pub fn sha256(data: &[u8]) -> [u8; HASH_SIZE] {
    digest(&[data])
}

/// Domain-separated digest: SHA-256 of `domain ‖ parts…`.
pub fn domain_digest(domain: u8, parts: &[&[u8]]) -> [u8; HASH_SIZE] {
    let mut hasher = Sha256::new();
    hasher.update([domain]);
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize().into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_matches_single_update() {
        let joined = sha256(b"hello world");
        let split = digest(&[b"hello", b" ", b"world"]);
        assert_eq!(joined, split);
    }

    #[test]
    fn domains_separate_contexts() {
        let key = domain_digest(DOMAIN_KEY_DERIVATION, &[b"payload"]);
        let iv = domain_digest(DOMAIN_IV_DERIVATION, &[b"payload"]);
        let plain = sha256(b"payload");
        assert_ne!(key, iv);
        assert_ne!(key, plain);
        assert_ne!(iv, plain);
    }

    #[test]
    fn domain_digest_is_prefix_hash() {
        let direct = sha256(b"\x01abc");
        let derived = domain_digest(DOMAIN_KEY_DERIVATION, &[b"abc"]);
        assert_eq!(direct, derived);
    }
}
