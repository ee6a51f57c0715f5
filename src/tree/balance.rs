//! AVL rebalancing over writable nodes.
//!
//! Every function here takes the node being rebalanced by value as a
//! [`FreshNode`]. A sealed (and therefore possibly persisted) node cannot
//! reach this code without first being copied, so rebalancing a stored
//! node in place is unrepresentable rather than a runtime fault.

use crate::{
    error::Result,
    store::NodeStore,
    tree::mutate::MutationCtx,
    tree::node::{Child, FreshNode, Node, Side},
};

/// Restores the AVL invariant at `node` after one of its subtrees changed
/// height, applying a single or double rotation as needed.
pub(crate) fn rebalance(mut node: FreshNode, ctx: &mut MutationCtx<'_>) -> Result<FreshNode> {
    let factor = balance_factor(&mut node, ctx.store)?;
    if factor > 1 {
        if child_balance_factor(node.child_mut(Side::Left), ctx.store)? >= 0 {
            // left-left
            return rotate_right(node, ctx);
        }
        // left-right: rotate the left child left first
        let left = node.child_mut(Side::Left).take_node(ctx.store)?;
        let left = ctx.writable(left);
        let rotated = rotate_left(left, ctx)?;
        *node.child_mut(Side::Left) = Child::Resident(Node::Fresh(Box::new(rotated)));
        return rotate_right(node, ctx);
    }
    if factor < -1 {
        if child_balance_factor(node.child_mut(Side::Right), ctx.store)? <= 0 {
            // right-right
            return rotate_left(node, ctx);
        }
        // right-left: rotate the right child right first
        let right = node.child_mut(Side::Right).take_node(ctx.store)?;
        let right = ctx.writable(right);
        let rotated = rotate_right(right, ctx)?;
        *node.child_mut(Side::Right) = Child::Resident(Node::Fresh(Box::new(rotated)));
        return rotate_left(node, ctx);
    }
    Ok(node)
}

/// Right rotation: the left child becomes the subtree root, its right
/// subtree is handed across, and both nodes get their height and size
/// refreshed. The handed-across link moves wholesale, so hash and resident
/// reference stay in lockstep.
pub(crate) fn rotate_right(mut node: FreshNode, ctx: &mut MutationCtx<'_>) -> Result<FreshNode> {
    let pivot = node.child_mut(Side::Left).take_node(ctx.store)?;
    let mut pivot = ctx.writable(pivot);

    *node.child_mut(Side::Left) = pivot.child_mut(Side::Right).take();
    node.recompute_height_and_size(ctx.store)?;
    *pivot.child_mut(Side::Right) = Child::Resident(Node::Fresh(Box::new(node)));
    pivot.recompute_height_and_size(ctx.store)?;

    Ok(pivot)
}

/// Mirror image of [`rotate_right`].
pub(crate) fn rotate_left(mut node: FreshNode, ctx: &mut MutationCtx<'_>) -> Result<FreshNode> {
    let pivot = node.child_mut(Side::Right).take_node(ctx.store)?;
    let mut pivot = ctx.writable(pivot);

    *node.child_mut(Side::Right) = pivot.child_mut(Side::Left).take();
    node.recompute_height_and_size(ctx.store)?;
    *pivot.child_mut(Side::Left) = Child::Resident(Node::Fresh(Box::new(node)));
    pivot.recompute_height_and_size(ctx.store)?;

    Ok(pivot)
}

fn balance_factor(node: &mut FreshNode, store: &dyn NodeStore) -> Result<i32> {
    let (left_height, _) = node.child_mut(Side::Left).height_and_size(store)?;
    let (right_height, _) = node.child_mut(Side::Right).height_and_size(store)?;
    Ok(i32::from(left_height) - i32::from(right_height))
}

fn child_balance_factor(child: &mut Child, store: &dyn NodeStore) -> Result<i32> {
    match child.resolve(store)? {
        Node::Sealed(rc) => {
            let left_height = rc.left(store)?.height();
            let right_height = rc.right(store)?.height();
            Ok(i32::from(left_height) - i32::from(right_height))
        }
        Node::Fresh(fresh) => balance_factor(fresh, store),
    }
}
