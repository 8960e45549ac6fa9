//! # CinodeFS
//!
//! Content-addressed, end-to-end-encrypted directory trees over the blob
//! encoder. Everything persisted is an immutable static blob or a signed
//! dynamic link; mutability is simulated by rewriting parents and
//! repointing links on flush.
//!
//! ## Layers
//! 1. `dir`      – on-disk directory schema (protobuf encoded).
//! 2. `node`     – in-memory graph: `file | directory | link | unloaded`
//!    with dirty-state tracking.
//! 3. `traverse` – path walking with link crossing and writability
//!    inheritance.
//! 4. `context`  – typed messages through the encoder plus the
//!    writer-info map.
//! 5. `lib`      – the [`CinodeFs`] facade applications use.

mod context;
pub mod dir;
mod error;
mod node;
mod traverse;

use std::collections::BTreeMap;

use cinode_blobs::BlobEncoder;
use cinode_core::{BlobReader, Entrypoint, WriterInfo};
use tokio::io::AsyncRead;
use tokio::sync::Mutex;
use tracing::debug;

use crate::context::GraphContext;
use crate::node::{DirtyState, LinkNode, Node};
use crate::traverse::{GoalAction, TraverseOptions, walk};

pub use crate::dir::DIRECTORY_MIME_TYPE;
pub use crate::error::FsError;

/// A lazily loaded, end-to-end-encrypted filesystem reachable from a
/// single root entrypoint.
///
/// Mutating operations and `flush` serialise on an internal lock; reads of
/// already-flushed state may run concurrently through separate instances
/// opened from the same entrypoint.
pub struct CinodeFs {
    ctx: GraphContext,
    root: Mutex<Node>,
    root_ep: Entrypoint,
}

impl CinodeFs {
    /// Creates a fresh filesystem: an empty directory behind a newly
    /// minted dynamic link. The link's writer info is registered with the
    /// instance and available via [`CinodeFs::root_writer_info`].
    pub async fn new_root_dynamic_link(be: BlobEncoder) -> Result<Self, FsError> {
        let ctx = GraphContext::new(be);
        let empty_dir = ctx.create_directory_blob(&BTreeMap::new()).await?;
        let (link_ep, _) = ctx.mint_link(&empty_dir).await?;
        debug!(root = %link_ep.name().fmt_short(), "created dynamic-link rooted filesystem");
        Ok(Self {
            root: Mutex::new(Node::Link(LinkNode {
                ep: link_ep.clone(),
                target: Box::new(Node::Unloaded { ep: empty_dir }),
                state: DirtyState::Clean,
            })),
            root_ep: link_ep,
            ctx,
        })
    }

    /// Opens an existing filesystem read-only from its root entrypoint.
    pub fn from_entrypoint(be: BlobEncoder, root_ep: Entrypoint) -> Self {
        Self {
            ctx: GraphContext::new(be),
            root: Mutex::new(Node::Unloaded {
                ep: root_ep.clone(),
            }),
            root_ep,
        }
    }

    /// Opens an existing filesystem with write capability over its root
    /// link.
    pub fn from_writer_info(be: BlobEncoder, writer_info: &WriterInfo) -> Self {
        let fs = Self::from_entrypoint(be, writer_info.entrypoint());
        fs.ctx
            .register_writer_info(*writer_info.name(), writer_info.auth_info().clone());
        fs
    }

    /// Opens from the base58 string form of a root entrypoint.
    pub fn from_entrypoint_str(be: BlobEncoder, root: &str) -> Result<Self, FsError> {
        let root_ep: Entrypoint = root.parse()?;
        Ok(Self::from_entrypoint(be, root_ep))
    }

    /// Opens from the base58 string form of a root writer info.
    pub fn from_writer_info_str(be: BlobEncoder, root: &str) -> Result<Self, FsError> {
        let writer_info: WriterInfo = root.parse()?;
        Ok(Self::from_writer_info(be, &writer_info))
    }

    /// Registers an additional writer info, enabling writes beneath the
    /// link it covers.
    pub fn register_writer_info(&self, writer_info: &WriterInfo) {
        self.ctx
            .register_writer_info(*writer_info.name(), writer_info.auth_info().clone());
    }

    /// The entrypoint this filesystem was opened or created with. Stable
    /// for link-rooted filesystems.
    pub async fn root_entrypoint(&self) -> Result<Entrypoint, FsError> {
        let root = self.root.lock().await;
        root.entrypoint()
    }

    pub async fn root_entrypoint_string(&self) -> Result<String, FsError> {
        Ok(self.root_entrypoint().await?.to_string())
    }

    /// Writer info of the root link; fails with `NotALink` for static
    /// roots and `MissingWriterInfo` when opened without the secret.
    pub fn root_writer_info(&self) -> Result<WriterInfo, FsError> {
        if !self.root_ep.is_link() {
            return Err(FsError::NotALink);
        }
        let auth_info = self
            .ctx
            .writer_auth(self.root_ep.name())
            .ok_or(FsError::MissingWriterInfo)?;
        let key = self.root_ep.require_key()?.clone();
        Ok(WriterInfo::new(*self.root_ep.name(), key, auth_info))
    }

    pub fn root_writer_info_string(&self) -> Result<String, FsError> {
        Ok(self.root_writer_info()?.to_string())
    }

    /// Stores `data` as a file at `path`, creating missing directories.
    /// Returns the entrypoint of the new file blob.
    pub async fn set_entry_file(
        &self,
        path: &[&str],
        data: impl AsyncRead + Send + Unpin,
        mime_type: Option<&str>,
    ) -> Result<Entrypoint, FsError> {
        if path.is_empty() {
            return Err(FsError::IsADirectory);
        }
        // Root writability gates the operation before any blob is
        // stored; link-scoped writability is re-evaluated in traversal.
        if !self.ctx.has_writer_info(self.root_ep.name()) {
            return Err(FsError::MissingWriterInfo);
        }
        let file_ep = self.ctx.create_file_blob(data, mime_type).await?;

        let mut replacement = Some(Node::File {
            ep: file_ep.clone(),
        });
        let mut goal = |node: Option<&mut Node>, writable: bool| {
            if !writable {
                return Err(FsError::MissingWriterInfo);
            }
            match node {
                Some(Node::Directory(_)) => return Err(FsError::IsADirectory),
                Some(Node::Unloaded { ep }) if ep.mime_type() == Some(DIRECTORY_MIME_TYPE) => {
                    return Err(FsError::IsADirectory);
                }
                _ => {}
            }
            let node_in = replacement.take().expect("goal runs once");
            Ok((GoalAction::Replace(node_in), DirtyState::Dirty))
        };
        self.walk_root(
            path,
            TraverseOptions {
                create_nodes: true,
                ..TraverseOptions::default()
            },
            &mut goal,
        )
        .await?;
        Ok(file_ep)
    }

    /// Resolves `path` to the entrypoint stored there, crossing links.
    ///
    /// Purely reading: nodes loaded along the way are not kept in memory.
    /// Fails with `ModifiedDirectory` when the path lands on a directory
    /// with unflushed changes.
    pub async fn find_entry(&self, path: &[&str]) -> Result<Entrypoint, FsError> {
        let mut found = None;
        let mut goal = |node: Option<&mut Node>, _writable: bool| {
            let node = node.ok_or(FsError::EntryNotFound)?;
            found = Some(node.entrypoint()?);
            Ok((GoalAction::Keep, DirtyState::Clean))
        };
        self.walk_root(
            path,
            TraverseOptions {
                do_not_cache: true,
                follow_final_links: true,
                ..TraverseOptions::default()
            },
            &mut goal,
        )
        .await?;
        found.ok_or(FsError::EntryNotFound)
    }

    /// Opens the decrypted content behind the entry at `path`.
    pub async fn open_entry_data(&self, path: &[&str]) -> Result<BlobReader, FsError> {
        let ep = self.find_entry(path).await?;
        self.ctx.open_entry_data(&ep).await
    }

    /// Removes the entry at `path` from its parent directory.
    pub async fn delete_entry(&self, path: &[&str]) -> Result<(), FsError> {
        if path.is_empty() {
            return Err(FsError::EntryNotFound);
        }
        let mut goal = |node: Option<&mut Node>, writable: bool| {
            if !writable {
                return Err(FsError::MissingWriterInfo);
            }
            node.ok_or(FsError::EntryNotFound)?;
            Ok((GoalAction::Remove, DirtyState::Dirty))
        };
        self.walk_root(path, TraverseOptions::default(), &mut goal)
            .await
    }

    /// Replaces whatever `path` denotes with an empty directory, creating
    /// the path if needed. With an empty path the root directory itself is
    /// reset.
    pub async fn reset_dir(&self, path: &[&str]) -> Result<(), FsError> {
        let mut replacement = Some(Node::new_empty_dir());
        let mut goal = |_node: Option<&mut Node>, writable: bool| {
            if !writable {
                return Err(FsError::MissingWriterInfo);
            }
            let node_in = replacement.take().expect("goal runs once");
            Ok((GoalAction::Replace(node_in), DirtyState::Dirty))
        };
        self.walk_root(
            path,
            TraverseOptions {
                create_nodes: true,
                follow_final_links: true,
                ..TraverseOptions::default()
            },
            &mut goal,
        )
        .await
    }

    /// Mints a fresh dynamic link at `path`, pointing at a new empty
    /// directory, and returns the writer info that grants update
    /// capability over it.
    ///
    /// A reader holding only the root writer info can traverse into the
    /// linked subtree but cannot modify it.
    pub async fn inject_dynamic_link(&self, path: &[&str]) -> Result<WriterInfo, FsError> {
        if path.is_empty() {
            return Err(FsError::IsADirectory);
        }
        if !self.ctx.has_writer_info(self.root_ep.name()) {
            return Err(FsError::MissingWriterInfo);
        }
        let empty_dir = self.ctx.create_directory_blob(&BTreeMap::new()).await?;
        let (link_ep, writer_info) = self.ctx.mint_link(&empty_dir).await?;

        let mut replacement = Some(Node::Link(LinkNode {
            ep: link_ep,
            target: Box::new(Node::Unloaded { ep: empty_dir }),
            state: DirtyState::Clean,
        }));
        let mut goal = |_node: Option<&mut Node>, writable: bool| {
            if !writable {
                return Err(FsError::MissingWriterInfo);
            }
            let node_in = replacement.take().expect("goal runs once");
            Ok((GoalAction::Replace(node_in), DirtyState::Dirty))
        };
        self.walk_root(
            path,
            TraverseOptions {
                create_nodes: true,
                ..TraverseOptions::default()
            },
            &mut goal,
        )
        .await?;
        Ok(writer_info)
    }

    /// Lists the names in the directory at `path`, sorted.
    ///
    /// Requires flushed state along the path, like [`CinodeFs::find_entry`].
    pub async fn list_entries(&self, path: &[&str]) -> Result<Vec<String>, FsError> {
        let ep = self.find_entry(path).await?;
        if ep.mime_type() != Some(DIRECTORY_MIME_TYPE) {
            return Err(FsError::NotADirectory);
        }
        let entries = self.ctx.read_directory(&ep).await?;
        Ok(entries.into_keys().collect())
    }

    /// Writer info of the dynamic link at `path`.
    ///
    /// Fails with `NotALink` when the path denotes a file or directory and
    /// with `MissingWriterInfo` when this instance does not hold the
    /// link's secret.
    pub async fn entry_writer_info(&self, path: &[&str]) -> Result<WriterInfo, FsError> {
        if path.is_empty() {
            return self.root_writer_info();
        }
        let mut found = None;
        let mut goal = |node: Option<&mut Node>, _writable: bool| {
            let node = node.ok_or(FsError::EntryNotFound)?;
            match node {
                Node::Link(link) => {
                    found = Some(link.ep.clone());
                    Ok((GoalAction::Keep, DirtyState::Clean))
                }
                Node::Unloaded { ep } if ep.is_link() => {
                    found = Some(ep.clone());
                    Ok((GoalAction::Keep, DirtyState::Clean))
                }
                _ => Err(FsError::NotALink),
            }
        };
        self.walk_root(
            path,
            TraverseOptions {
                do_not_cache: true,
                ..TraverseOptions::default()
            },
            &mut goal,
        )
        .await?;
        let link_ep = found.ok_or(FsError::EntryNotFound)?;
        let auth_info = self
            .ctx
            .writer_auth(link_ep.name())
            .ok_or(FsError::MissingWriterInfo)?;
        let key = link_ep.require_key()?.clone();
        Ok(WriterInfo::new(*link_ep.name(), key, auth_info))
    }

    /// Persists every dirty node bottom-up, then drops the in-memory tree
    /// in favour of an unloaded placeholder for the new root.
    ///
    /// Flushing twice in a row is a no-op the second time.
    pub async fn flush(&self) -> Result<(), FsError> {
        let mut root = self.root.lock().await;
        let root_ep = self.ctx.flush_node(&mut root).await?;
        *root = Node::Unloaded { ep: root_ep };
        Ok(())
    }

    async fn walk_root(
        &self,
        path: &[&str],
        opts: TraverseOptions,
        goal: traverse::Goal<'_>,
    ) -> Result<(), FsError> {
        let mut root = self.root.lock().await;
        let writable = self.ctx.has_writer_info(self.root_ep.name());
        walk(&self.ctx, &mut root, path, 0, writable, opts, goal).await?;
        Ok(())
    }
}
