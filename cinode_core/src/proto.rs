//! Persisted protobuf messages.
//!
//! The messages are hand-annotated `prost` structs; field tags follow the
//! declaration order and are wire-stable. Domain wrappers with the parse
//! invariants live in [`crate::entrypoint`].

/// Symmetric key material attached to an entrypoint.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct KeyInfoMessage {
    /// Serialised [`crate::BlobKey`]: `[key_type] ‖ key bytes`.
    #[prost(bytes = "vec", tag = "1")]
    pub key: ::prost::alloc::vec::Vec<u8>,
}

/// Serialised reference to a blob: name, key and optional metadata.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct EntrypointMessage {
    /// Raw 33-byte blob name.
    #[prost(bytes = "vec", tag = "1")]
    pub blob_name: ::prost::alloc::vec::Vec<u8>,

    #[prost(message, optional, tag = "2")]
    pub key_info: ::core::option::Option<KeyInfoMessage>,

    #[prost(string, optional, tag = "3")]
    pub mime_type: ::core::option::Option<::prost::alloc::string::String>,

    /// Unix microseconds; unset means no lower validity bound.
    #[prost(uint64, optional, tag = "4")]
    pub not_valid_before_unix_micro: ::core::option::Option<u64>,

    /// Unix microseconds; unset means no upper validity bound.
    #[prost(uint64, optional, tag = "5")]
    pub not_valid_after_unix_micro: ::core::option::Option<u64>,
}

/// Entrypoint plus the writer secret that grants update capability.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct WriterInfoMessage {
    /// Raw 33-byte blob name of the dynamic link.
    #[prost(bytes = "vec", tag = "1")]
    pub blob_name: ::prost::alloc::vec::Vec<u8>,

    /// Serialised [`crate::BlobKey`].
    #[prost(bytes = "vec", tag = "2")]
    pub key: ::prost::alloc::vec::Vec<u8>,

    /// Serialised [`crate::AuthInfo`]: `[version] ‖ Ed25519 seed`.
    #[prost(bytes = "vec", tag = "3")]
    pub auth_info: ::prost::alloc::vec::Vec<u8>,
}
