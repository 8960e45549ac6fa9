//! In-memory node model.
//!
//! The graph is a lazily loaded DAG of files, directories, links and
//! unloaded placeholders. Dirtiness drives incremental flushing:
//!
//! - `Clean`: the stored entrypoint matches the whole subtree.
//! - `Dirty`: the node's own serialised bytes changed.
//! - `SubDirty`: own bytes unchanged, but some descendant is dirty.
//!
//! Files and unloaded placeholders are always clean; their entrypoints
//! never change in place.

use std::collections::BTreeMap;

use cinode_core::Entrypoint;

use crate::error::FsError;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum DirtyState {
    Clean,
    Dirty,
    SubDirty,
}

impl DirtyState {
    /// A parent directory's state after observing a child's state.
    ///
    /// A dirty child changes the parent's own bytes (the child's
    /// entrypoint will move), so the parent becomes dirty too; a sub-dirty
    /// child leaves the parent's bytes alone.
    pub(crate) fn combine_child(self, child: DirtyState) -> DirtyState {
        match (self, child) {
            (DirtyState::Dirty, _) | (_, DirtyState::Dirty) => DirtyState::Dirty,
            (DirtyState::SubDirty, _) | (_, DirtyState::SubDirty) => DirtyState::SubDirty,
            (DirtyState::Clean, DirtyState::Clean) => DirtyState::Clean,
        }
    }
}

pub(crate) struct DirectoryNode {
    pub entries: BTreeMap<String, Node>,
    /// Entrypoint of the serialised form, present whenever state is clean.
    pub stored: Option<Entrypoint>,
    pub state: DirtyState,
}

pub(crate) struct LinkNode {
    /// The link's own entrypoint; stable across target updates.
    pub ep: Entrypoint,
    pub target: Box<Node>,
    pub state: DirtyState,
}

pub(crate) enum Node {
    File { ep: Entrypoint },
    Directory(DirectoryNode),
    Link(LinkNode),
    Unloaded { ep: Entrypoint },
}

impl Node {
    /// An empty directory that has never been stored.
    pub(crate) fn new_empty_dir() -> Node {
        Node::Directory(DirectoryNode {
            entries: BTreeMap::new(),
            stored: None,
            state: DirtyState::Dirty,
        })
    }

    pub(crate) fn dirty_state(&self) -> DirtyState {
        match self {
            Node::File { .. } | Node::Unloaded { .. } => DirtyState::Clean,
            Node::Directory(dir) => dir.state,
            Node::Link(link) => link.state,
        }
    }

    /// The entrypoint this node currently stands for.
    ///
    /// A directory with unflushed modifications has no truthful
    /// entrypoint; callers must flush first.
    pub(crate) fn entrypoint(&self) -> Result<Entrypoint, FsError> {
        match self {
            Node::File { ep } | Node::Unloaded { ep } => Ok(ep.clone()),
            Node::Link(link) => Ok(link.ep.clone()),
            Node::Directory(dir) => match dir.state {
                DirtyState::Clean => dir.stored.clone().ok_or(FsError::ModifiedDirectory),
                DirtyState::Dirty | DirtyState::SubDirty => Err(FsError::ModifiedDirectory),
            },
        }
    }
}
