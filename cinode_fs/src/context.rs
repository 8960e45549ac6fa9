//! Graph context: typed messages over the blob encoder.
//!
//! The context serialises directory and entrypoint records through the
//! encoder, loads nodes on demand and holds the per-instance
//! `blob name → auth info` map that decides writability.

use std::collections::BTreeMap;

use bytes::Bytes;
use cinode_blobs::BlobEncoder;
use cinode_core::{
    AuthInfo, BlobName, BlobReader, BlobType, Entrypoint, WriterInfo,
};
use dashmap::DashMap;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::debug;

use crate::dir::{DIRECTORY_MIME_TYPE, decode_entries, encode_entries};
use crate::error::FsError;
use crate::node::{DirectoryNode, DirtyState, LinkNode, Node};

pub(crate) struct GraphContext {
    be: BlobEncoder,
    writer_infos: DashMap<BlobName, AuthInfo>,
}

impl GraphContext {
    pub(crate) fn new(be: BlobEncoder) -> Self {
        Self {
            be,
            writer_infos: DashMap::new(),
        }
    }

    pub(crate) fn max_link_redirects(&self) -> u32 {
        self.be.max_link_redirects()
    }

    pub(crate) fn now_micros(&self) -> u64 {
        self.be.now_micros()
    }

    pub(crate) fn register_writer_info(&self, name: BlobName, auth_info: AuthInfo) {
        self.writer_infos.insert(name, auth_info);
    }

    pub(crate) fn has_writer_info(&self, name: &BlobName) -> bool {
        self.writer_infos.contains_key(name)
    }

    pub(crate) fn writer_auth(&self, name: &BlobName) -> Option<AuthInfo> {
        self.writer_infos.get(name).map(|auth| auth.value().clone())
    }

    /// Reads the raw content behind an entrypoint, following link chains.
    pub(crate) async fn open_entry_data(&self, ep: &Entrypoint) -> Result<BlobReader, FsError> {
        ep.check_valid_at(self.now_micros())?;
        let key = ep.require_key()?;
        Ok(self.be.open(ep.name(), key).await?)
    }

    /// Reads and parses the directory blob an entrypoint references.
    pub(crate) async fn read_directory(
        &self,
        ep: &Entrypoint,
    ) -> Result<BTreeMap<String, Entrypoint>, FsError> {
        let mut reader = self.open_entry_data(ep).await?;
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes).await?;
        decode_entries(&bytes)
    }

    /// Reads the target entrypoint out of a single link, without
    /// following it further.
    pub(crate) async fn read_link_target(&self, ep: &Entrypoint) -> Result<Entrypoint, FsError> {
        ep.check_valid_at(self.now_micros())?;
        let key = ep.require_key()?;
        let payload = self.be.open_link_payload(ep.name(), key).await?;
        if payload.first() == Some(&0x00) {
            return Err(FsError::InvalidEntrypointData(
                "legacy raw redirect payload".into(),
            ));
        }
        Ok(Entrypoint::from_bytes(&payload)?)
    }

    /// Serialises a message into a fresh static blob.
    pub(crate) async fn create_message(
        &self,
        bytes: Bytes,
        mime_type: Option<&str>,
    ) -> Result<Entrypoint, FsError> {
        let created = self
            .be
            .create(BlobType::Static, std::io::Cursor::new(bytes.to_vec()))
            .await?;
        let mut ep = Entrypoint::new(created.name, created.key);
        if let Some(mime_type) = mime_type {
            ep = ep.with_mime_type(mime_type)?;
        }
        Ok(ep)
    }

    /// Publishes a new payload for an existing dynamic link.
    ///
    /// Fails with `MissingWriterInfo` when no auth info is registered for
    /// the link's blob name.
    pub(crate) async fn update_message(
        &self,
        link_ep: &Entrypoint,
        payload: &[u8],
    ) -> Result<(), FsError> {
        let auth_info = self
            .writer_auth(link_ep.name())
            .ok_or(FsError::MissingWriterInfo)?;
        let key = link_ep.require_key()?;
        self.be
            .update(
                link_ep.name(),
                &auth_info,
                key,
                std::io::Cursor::new(payload.to_vec()),
            )
            .await?;
        Ok(())
    }

    /// Stores a file blob and wraps it in an entrypoint.
    pub(crate) async fn create_file_blob(
        &self,
        data: impl AsyncRead + Send + Unpin,
        mime_type: Option<&str>,
    ) -> Result<Entrypoint, FsError> {
        let created = self.be.create(BlobType::Static, data).await?;
        let mut ep = Entrypoint::new(created.name, created.key);
        if let Some(mime_type) = mime_type {
            ep = ep.with_mime_type(mime_type)?;
        }
        Ok(ep)
    }

    /// Serialises and stores a directory, returning its entrypoint.
    pub(crate) async fn create_directory_blob(
        &self,
        entries: &BTreeMap<String, Entrypoint>,
    ) -> Result<Entrypoint, FsError> {
        self.create_message(encode_entries(entries), Some(DIRECTORY_MIME_TYPE))
            .await
    }

    /// Mints a dynamic link pointing at `target` and registers its writer
    /// secret with this instance.
    pub(crate) async fn mint_link(
        &self,
        target: &Entrypoint,
    ) -> Result<(Entrypoint, WriterInfo), FsError> {
        let created = self
            .be
            .create(
                BlobType::DynamicLink,
                std::io::Cursor::new(target.to_bytes().to_vec()),
            )
            .await?;
        let auth_info = created
            .auth_info
            .expect("dynamic link creation yields auth info");
        self.register_writer_info(created.name, auth_info.clone());
        let link_ep = Entrypoint::new(created.name, created.key.clone());
        let writer_info = WriterInfo::new(created.name, created.key, auth_info);
        debug!(name = %created.name.fmt_short(), "minted link node");
        Ok((link_ep, writer_info))
    }

    /// Materialises the node an entrypoint stands for.
    ///
    /// The entrypoint's validity window is checked here, which covers
    /// every hop of a lazily loaded chain.
    pub(crate) async fn load_node(&self, ep: &Entrypoint) -> Result<Node, FsError> {
        if ep.is_link() {
            let target = self.read_link_target(ep).await?;
            return Ok(Node::Link(LinkNode {
                ep: ep.clone(),
                target: Box::new(Node::Unloaded { ep: target }),
                state: DirtyState::Clean,
            }));
        }
        if ep.mime_type() == Some(DIRECTORY_MIME_TYPE) {
            let stored_entries = self.read_directory(ep).await?;
            let entries = stored_entries
                .into_iter()
                .map(|(name, child_ep)| (name, Node::Unloaded { ep: child_ep }))
                .collect();
            return Ok(Node::Directory(DirectoryNode {
                entries,
                stored: Some(ep.clone()),
                state: DirtyState::Clean,
            }));
        }
        Ok(Node::File { ep: ep.clone() })
    }

    /// Post-order flush; returns the node's entrypoint after persisting
    /// every dirty descendant.
    pub(crate) fn flush_node<'a>(
        &'a self,
        node: &'a mut Node,
    ) -> futures::future::BoxFuture<'a, Result<Entrypoint, FsError>> {
        Box::pin(async move {
            match node {
                Node::File { ep } | Node::Unloaded { ep } => Ok(ep.clone()),
                Node::Directory(dir) => match dir.state {
                    DirtyState::Clean => dir.stored.clone().ok_or(FsError::ModifiedDirectory),
                    DirtyState::SubDirty => {
                        for child in dir.entries.values_mut() {
                            if child.dirty_state() != DirtyState::Clean {
                                self.flush_node(child).await?;
                            }
                        }
                        dir.state = DirtyState::Clean;
                        dir.stored.clone().ok_or(FsError::ModifiedDirectory)
                    }
                    DirtyState::Dirty => {
                        let mut entries = BTreeMap::new();
                        for (name, child) in dir.entries.iter_mut() {
                            let child_ep = self.flush_node(child).await?;
                            entries.insert(name.clone(), child_ep);
                        }
                        let ep = self.create_directory_blob(&entries).await?;
                        dir.stored = Some(ep.clone());
                        dir.state = DirtyState::Clean;
                        Ok(ep)
                    }
                },
                Node::Link(link) => {
                    if link.state == DirtyState::Clean {
                        return Ok(link.ep.clone());
                    }
                    let target_ep = self.flush_node(link.target.as_mut()).await?;
                    self.update_message(&link.ep, &target_ep.to_bytes()).await?;
                    link.state = DirtyState::Clean;
                    Ok(link.ep.clone())
                }
            }
        })
    }
}
