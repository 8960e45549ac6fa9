//! Core Cinode protocol types and traits.
//!
//! This crate defines the shared types and traits used by all Cinode
//! crates.
//!
//! ## Protocol types (wire-stable)
//!
//! The following modules define on-the-wire and on-disk formats:
//!
//! - Blob names and types (`name::BlobName`, `name::BlobType`)
//! - Typed keys and writer secrets (`key::BlobKey`, `key::AuthInfo`)
//! - The dynamic-link wire record (`link::DynamicLinkRecord`), including
//!   public-layer validation that needs no key material
//! - Entrypoint and writer-info records (`entrypoint::Entrypoint`,
//!   `entrypoint::WriterInfo`) and their protobuf schema (`proto`)
//!
//! These types appear in persistent storage; changes to them are protocol
//! changes.
//!
//! ## Storage abstractions
//!
//! - The datastore contract (`store::DataStore`) every backend implements
//! - Ingest validation shared by all backends (`ingest`)
//! - Domain-separated hashing (`hash`) and the stream-cipher factory
//!   (`key::BlobKey::keystream`)

pub mod entrypoint;
pub mod hash;
pub mod ingest;
pub mod key;
pub mod link;
pub mod name;
pub mod proto;
pub mod store;

// --- Core Public Surface ---

// Blob identity
pub use name::{BLOB_NAME_SIZE, BlobName, BlobNameError, BlobType};

// Keys and writer secrets
pub use key::{AuthInfo, AuthInfoError, BlobKey, KeyError, KeyType, KeystreamCipher};

// Dynamic-link wire record
pub use link::{DynamicLinkRecord, LinkError};

// Entrypoints
pub use entrypoint::{Entrypoint, EntrypointError, WriterInfo, WriterInfoError};

// Storage
pub use ingest::{IngestDecision, ValidationError, ingest};
pub use store::{BlobReader, DataStore, StoreError};
