//! # Cinode blob encoder
//!
//! Encrypted-datastore layer: turns the raw [`cinode_core::DataStore`]
//! byte store into typed, end-to-end-encrypted blobs.
//!
//! ## Layers
//! 1. `fifo`    – secure spill buffers (unlinked, ephemerally keyed).
//! 2. `static_blob` / `dynamic_link` – the two blob codecs.
//! 3. `encoder` – the `Create/Open/Update/Exists/Delete` facade that
//!    dispatches on blob type and follows link chains.
//! 4. `seams`   – injectable randomness and version sources for
//!    deterministic tests.

mod dynamic_link;
mod encoder;
mod error;
mod fifo;
mod read;
mod seams;
mod static_blob;

pub use encoder::{BlobEncoder, CreatedBlob, DEFAULT_MAX_LINK_REDIRECTS};
pub use error::EncoderError;
pub use fifo::{FileFifoFactory, MemoryFifoFactory, SecureFifo, SecureFifoFactory};
pub use seams::{OsRandomSource, RandomSource, SystemVersionSource, VersionSource};
