//! Path traversal over the node graph.
//!
//! `walk` descends from a node along path segments, materialising
//! unloaded nodes on demand and crossing links transparently. At the
//! final position it hands the node to a goal callback, which decides
//! what happens (read, replace, remove) and reports the dirtiness
//! contribution that then propagates back up the walked path.
//!
//! Writability is inherited top-down and re-evaluated at every link
//! crossing: a subtree is writable only while the chain of enclosing
//! links is covered by registered writer infos.

use futures::future::BoxFuture;

use crate::context::GraphContext;
use crate::error::FsError;
use crate::node::{DirtyState, Node};

#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct TraverseOptions {
    /// Synthesise missing intermediate directories (writes only).
    pub create_nodes: bool,
    /// Do not graft nodes loaded along the way into the in-memory graph;
    /// keeps pure reads from growing it without bound.
    pub do_not_cache: bool,
    /// Cross a link sitting at the final path position instead of handing
    /// the link node itself to the goal.
    pub follow_final_links: bool,
}

/// What the goal wants done with the node at the final position.
pub(crate) enum GoalAction {
    Keep,
    Replace(Node),
    Remove,
}

#[derive(Debug)]
pub(crate) struct WalkOutcome {
    pub state: DirtyState,
    /// Set when the goal asked for removal; the parent directory acts on it.
    pub removed: bool,
}

pub(crate) type Goal<'g> =
    &'g mut (dyn FnMut(Option<&mut Node>, bool) -> Result<(GoalAction, DirtyState), FsError> + Send);

pub(crate) fn walk<'a>(
    ctx: &'a GraphContext,
    node: &'a mut Node,
    path: &'a [&'a str],
    link_depth: u32,
    writable: bool,
    opts: TraverseOptions,
    goal: Goal<'a>,
) -> BoxFuture<'a, Result<WalkOutcome, FsError>> {
    Box::pin(async move {
        let descending = !path.is_empty() || opts.follow_final_links;

        // Materialise placeholders the walk has to look inside.
        if matches!(node, Node::Unloaded { .. }) && descending {
            let ep = match node {
                Node::Unloaded { ep } => ep.clone(),
                _ => unreachable!(),
            };
            let loaded = ctx.load_node(&ep).await?;
            if opts.do_not_cache {
                let mut detached = loaded;
                return walk(ctx, &mut detached, path, link_depth, writable, opts, goal).await;
            }
            *node = loaded;
            return walk(ctx, node, path, link_depth, writable, opts, goal).await;
        }

        // Cross links transparently; writability restarts from the link's
        // own blob name, and every crossing counts against the cap.
        if let Node::Link(link) = node
            && descending
        {
            let link_depth = link_depth + 1;
            if link_depth >= ctx.max_link_redirects() {
                return Err(FsError::TooManyRedirects(ctx.max_link_redirects()));
            }
            let inner_writable = ctx.has_writer_info(link.ep.name());
            let outcome = walk(
                ctx,
                link.target.as_mut(),
                path,
                link_depth,
                inner_writable,
                opts,
                goal,
            )
            .await?;
            if outcome.removed {
                // A link target cannot be removed, only repointed.
                return Err(FsError::EntryNotFound);
            }
            if outcome.state != DirtyState::Clean && link.state == DirtyState::Clean {
                link.state = DirtyState::SubDirty;
            }
            return Ok(WalkOutcome {
                state: link.state,
                removed: false,
            });
        }

        // Final position: the goal decides.
        if path.is_empty() {
            let (action, state) = goal(Some(&mut *node), writable)?;
            return match action {
                GoalAction::Keep => Ok(WalkOutcome {
                    state,
                    removed: false,
                }),
                GoalAction::Replace(replacement) => {
                    *node = replacement;
                    Ok(WalkOutcome {
                        state,
                        removed: false,
                    })
                }
                GoalAction::Remove => Ok(WalkOutcome {
                    state,
                    removed: true,
                }),
            };
        }

        match node {
            Node::Directory(dir) => {
                let (head, rest) = path.split_first().expect("path checked non-empty");
                if head.is_empty() {
                    return Err(FsError::EmptyName);
                }
                match dir.entries.get_mut(*head) {
                    Some(child) => {
                        let outcome =
                            walk(ctx, child, rest, link_depth, writable, opts, goal).await?;
                        if outcome.removed {
                            dir.entries.remove(*head);
                            dir.state = DirtyState::Dirty;
                            return Ok(WalkOutcome {
                                state: DirtyState::Dirty,
                                removed: false,
                            });
                        }
                        dir.state = dir.state.combine_child(outcome.state);
                        Ok(WalkOutcome {
                            state: dir.state,
                            removed: false,
                        })
                    }
                    None if rest.is_empty() => {
                        let (action, state) = goal(None, writable)?;
                        match action {
                            GoalAction::Keep => Ok(WalkOutcome {
                                state,
                                removed: false,
                            }),
                            GoalAction::Replace(new_node) => {
                                dir.entries.insert((*head).to_string(), new_node);
                                dir.state = DirtyState::Dirty;
                                Ok(WalkOutcome {
                                    state: DirtyState::Dirty,
                                    removed: false,
                                })
                            }
                            GoalAction::Remove => Err(FsError::EntryNotFound),
                        }
                    }
                    None if opts.create_nodes => {
                        if !writable {
                            return Err(FsError::MissingWriterInfo);
                        }
                        // Build the missing chain detached and graft it only
                        // once the goal succeeded.
                        let mut created = Node::new_empty_dir();
                        walk(ctx, &mut created, rest, link_depth, writable, opts, goal).await?;
                        dir.entries.insert((*head).to_string(), created);
                        dir.state = DirtyState::Dirty;
                        Ok(WalkOutcome {
                            state: DirtyState::Dirty,
                            removed: false,
                        })
                    }
                    None => Err(FsError::EntryNotFound),
                }
            }
            Node::File { .. } => Err(FsError::NotADirectory),
            // Unloaded and link nodes were handled before the match.
            _ => unreachable!("unloaded and link nodes handled above"),
        }
    })
}
