//! Insert, update and delete over the node algebra.
//!
//! Both operations are path-copying: nodes along the descent are replaced
//! by writable copies, everything off the path is shared with the input
//! tree. Displaced nodes that had been persisted are collected as orphans
//! and handed back to the caller, who owns reporting them to the store.

use std::cmp::Ordering;
use std::rc::Rc;

use crate::{
    error::Result,
    store::NodeStore,
    tree::balance::rebalance,
    tree::node::{Child, FreshNode, Node, SealedNode, Side},
};

/// Result of [`set`].
#[derive(Debug)]
pub struct SetOutcome {
    pub root: Node,
    /// True when the key already existed and only its value was replaced.
    pub updated: bool,
    pub orphans: Vec<Rc<SealedNode>>,
}

/// Result of [`remove`].
#[derive(Debug)]
pub struct RemoveOutcome {
    pub root: Option<Node>,
    /// The removed value, when the key was present.
    pub removed: Option<Vec<u8>>,
    pub orphans: Vec<Rc<SealedNode>>,
}

/// Inserts or updates `key` in the subtree under `root`, returning the new
/// root. The input tree is untouched: on error the caller simply keeps it.
pub fn set(
    root: Option<Node>,
    key: &[u8],
    value: &[u8],
    store: &dyn NodeStore,
) -> Result<SetOutcome> {
    let Some(root) = root else {
        return Ok(SetOutcome {
            root: Node::leaf(key, value),
            updated: false,
            orphans: Vec::new(),
        });
    };
    let mut ctx = MutationCtx::new(store);
    let (root, updated) = set_node(root, key, value, &mut ctx)?;
    Ok(SetOutcome {
        root,
        updated,
        orphans: ctx.orphans,
    })
}

/// Deletes `key` from the subtree under `root`. Removing the last leaf
/// collapses the tree to `None`.
pub fn remove(root: Option<Node>, key: &[u8], store: &dyn NodeStore) -> Result<RemoveOutcome> {
    let Some(root) = root else {
        return Ok(RemoveOutcome {
            root: None,
            removed: None,
            orphans: Vec::new(),
        });
    };
    let mut ctx = MutationCtx::new(store);
    match remove_node(root, key, &mut ctx)? {
        Removal::NotFound(root) => Ok(RemoveOutcome {
            root: Some(root),
            removed: None,
            orphans: ctx.orphans,
        }),
        Removal::Removed {
            replacement, value, ..
        } => {
            let root = match replacement {
                None => None,
                Some(Child::Resident(node)) => Some(node),
                Some(Child::Remote(hash)) => Some(Node::Sealed(store.get_node(&hash)?)),
            };
            Ok(RemoveOutcome {
                root,
                removed: Some(value),
                orphans: ctx.orphans,
            })
        }
    }
}

/// State threaded through one mutation: the loader, plus the persisted
/// nodes the mutation has displaced so far.
pub(crate) struct MutationCtx<'a> {
    pub(crate) store: &'a dyn NodeStore,
    orphans: Vec<Rc<SealedNode>>,
}

impl<'a> MutationCtx<'a> {
    fn new(store: &'a dyn NodeStore) -> Self {
        MutationCtx {
            store,
            orphans: Vec::new(),
        }
    }

    /// Records a displaced node. Nodes that were never persisted are not
    /// orphans: nothing outside this mutation has ever seen them.
    fn remove_orphan(&mut self, node: &Rc<SealedNode>) {
        if node.persisted() {
            log::debug!("orphaning node {}", node.hash());
            self.orphans.push(node.clone());
        }
    }

    /// Hands back a writable rendition of `node`: fresh nodes pass through,
    /// sealed inner nodes are copied and their original recorded as
    /// displaced.
    pub(crate) fn writable(&mut self, node: Node) -> FreshNode {
        match node {
            Node::Fresh(fresh) => *fresh,
            Node::Sealed(rc) => {
                self.remove_orphan(&rc);
                rc.copy_inner()
            }
        }
    }
}

fn set_node(
    node: Node,
    key: &[u8],
    value: &[u8],
    ctx: &mut MutationCtx<'_>,
) -> Result<(Node, bool)> {
    if node.is_leaf() {
        return Ok(set_leaf(node, key, value, ctx));
    }

    let mut writable = ctx.writable(node);
    let side = if key < writable.key.as_slice() {
        Side::Left
    } else {
        Side::Right
    };
    let child = writable.child_mut(side).take_node(ctx.store)?;
    let (child, updated) = set_node(child, key, value, ctx)?;
    *writable.child_mut(side) = Child::Resident(child);

    if updated {
        // Pure value replacement below: shape, heights and sizes are
        // untouched, so no rebalancing is due.
        return Ok((Node::Fresh(Box::new(writable)), true));
    }
    writable.recompute_height_and_size(ctx.store)?;
    let writable = rebalance(writable, ctx)?;
    Ok((Node::Fresh(Box::new(writable)), false))
}

fn set_leaf(leaf: Node, key: &[u8], value: &[u8], ctx: &mut MutationCtx<'_>) -> (Node, bool) {
    match key.cmp(leaf.key()) {
        Ordering::Less => {
            // The existing leaf's key becomes the separator.
            let separator = leaf.key().to_vec();
            let branch = FreshNode::branch(separator, Node::leaf(key, value), leaf);
            (Node::Fresh(Box::new(branch)), false)
        }
        Ordering::Greater => {
            let branch = FreshNode::branch(key.to_vec(), leaf, Node::leaf(key, value));
            (Node::Fresh(Box::new(branch)), false)
        }
        Ordering::Equal => {
            if let Node::Sealed(rc) = &leaf {
                ctx.remove_orphan(rc);
            }
            (Node::leaf(key, value), true)
        }
    }
}

/// Outcome of removal from one subtree.
enum Removal {
    /// The key was absent; the subtree is handed back untouched.
    NotFound(Node),
    Removed {
        /// What replaces the subtree; `None` when its single leaf held the
        /// key and the subtree vanished outright.
        replacement: Option<Child>,
        /// The subtree's new leftmost key, when the deletion changed it.
        /// Ancestors use it to repair their separator.
        new_separator: Option<Vec<u8>>,
        value: Vec<u8>,
    },
}

fn remove_node(node: Node, key: &[u8], ctx: &mut MutationCtx<'_>) -> Result<Removal> {
    if node.is_leaf() {
        if key == node.key() {
            let value = node.value().expect("leaf holds a value").to_vec();
            if let Node::Sealed(rc) = &node {
                ctx.remove_orphan(rc);
            }
            return Ok(Removal::Removed {
                replacement: None,
                new_separator: None,
                value,
            });
        }
        return Ok(Removal::NotFound(node));
    }

    let side = if key < node.key() {
        Side::Left
    } else {
        Side::Right
    };

    // The descent touches nothing until the key is known to be present, so
    // a miss hands every level back unchanged.
    match node {
        Node::Sealed(rc) => {
            let child = Node::Sealed(rc.child(side, ctx.store)?);
            match remove_node(child, key, ctx)? {
                Removal::NotFound(_) => Ok(Removal::NotFound(Node::Sealed(rc))),
                Removal::Removed {
                    replacement: None,
                    value,
                    ..
                } => {
                    ctx.remove_orphan(&rc);
                    let sibling = rc.child_link(side.other());
                    Ok(collapsed(side, sibling, rc.key().to_vec(), value))
                }
                Removal::Removed {
                    replacement: Some(child),
                    new_separator,
                    value,
                } => {
                    ctx.remove_orphan(&rc);
                    splice(rc.copy_inner(), side, child, new_separator, value, ctx)
                }
            }
        }
        Node::Fresh(mut fresh) => {
            let child = fresh.child_mut(side).take_node(ctx.store)?;
            match remove_node(child, key, ctx)? {
                Removal::NotFound(child) => {
                    *fresh.child_mut(side) = Child::Resident(child);
                    Ok(Removal::NotFound(Node::Fresh(fresh)))
                }
                Removal::Removed {
                    replacement: None,
                    value,
                    ..
                } => {
                    let sibling = fresh.child_mut(side.other()).take();
                    let separator = fresh.key.clone();
                    Ok(collapsed(side, sibling, separator, value))
                }
                Removal::Removed {
                    replacement: Some(child),
                    new_separator,
                    value,
                } => splice(*fresh, side, child, new_separator, value, ctx),
            }
        }
    }
}

/// The descended-into child vanished: the surviving sibling replaces the
/// whole node. A left-side collapse deletes this node's separator, and the
/// subtree's leftmost key is now the sibling's, which ancestors must hear
/// about. A right-side collapse keeps the left subtree, whose leftmost key
/// is unchanged, so nothing propagates.
fn collapsed(side: Side, sibling: Child, separator: Vec<u8>, value: Vec<u8>) -> Removal {
    let new_separator = match side {
        Side::Left => Some(separator),
        Side::Right => None,
    };
    Removal::Removed {
        replacement: Some(sibling),
        new_separator,
        value,
    }
}

/// Splices the rebuilt child back in and restores the balance invariant.
/// A new leftmost key arriving from the left keeps travelling upward; one
/// arriving from the right repairs this node's separator and stops here.
fn splice(
    mut writable: FreshNode,
    side: Side,
    child: Child,
    new_separator: Option<Vec<u8>>,
    value: Vec<u8>,
    ctx: &mut MutationCtx<'_>,
) -> Result<Removal> {
    *writable.child_mut(side) = child;
    let propagated = match side {
        Side::Left => new_separator,
        Side::Right => {
            if let Some(separator) = new_separator {
                writable.key = separator;
            }
            None
        }
    };
    writable.recompute_height_and_size(ctx.store)?;
    let writable = rebalance(writable, ctx)?;
    Ok(Removal::Removed {
        replacement: Some(Child::Resident(Node::Fresh(Box::new(writable)))),
        new_separator: propagated,
        value,
    })
}
