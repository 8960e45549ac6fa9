//! Injectable sources of randomness and versions.
//!
//! The encoder never calls the OS clock or RNG directly; tests swap in
//! deterministic doubles so that created blobs are reproducible.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use rand::RngCore;

/// Source of cryptographic randomness.
pub trait RandomSource: fmt::Debug + Send + Sync {
    /// Fills `buf` with random bytes.
    fn fill(&self, buf: &mut [u8]);
}

/// Operating-system RNG.
#[derive(Debug, Default, Clone, Copy)]
pub struct OsRandomSource;

impl RandomSource for OsRandomSource {
    fn fill(&self, buf: &mut [u8]) {
        rand::rngs::OsRng.fill_bytes(buf);
    }
}

/// Source of dynamic-link content versions (unix microseconds).
pub trait VersionSource: fmt::Debug + Send + Sync {
    fn now_micros(&self) -> u64;
}

/// Wall-clock version source.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemVersionSource;

impl VersionSource for SystemVersionSource {
    fn now_micros(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_micros() as u64
    }
}
