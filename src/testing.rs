//! Test support: store doubles, operation strategies and structural
//! assertions shared by the test suites.

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::rc::Rc;

use itertools::Itertools;
use proptest::{
    collection::{hash_set, vec},
    prelude::*,
    sample::SizeRange,
};

use crate::{
    prelude::*,
    tree::node::{child_view, Side},
};

/// In-memory node store. `save_tree` persists a sealed tree the way the
/// durable collaborator would: store-bytes keyed by hash, nodes marked
/// persisted.
#[derive(Default)]
pub struct MemStore {
    nodes: RefCell<HashMap<Hash, Vec<u8>>>,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.borrow().is_empty()
    }

    /// Persists every node of a sealed subtree that is not persisted yet.
    pub fn save_tree(&self, node: &Rc<SealedNode>) {
        if node.persisted() {
            return;
        }
        if !node.is_leaf() {
            for side in [Side::Left, Side::Right] {
                // A remote-only link points at a node this store already
                // holds from an earlier save.
                if let Some(child) = node.cached_child(side) {
                    self.save_tree(&child);
                }
            }
        }
        self.nodes.borrow_mut().insert(node.hash(), node.to_bytes_vec());
        node.mark_persisted();
    }
}

impl NodeStore for MemStore {
    fn get_node(&self, hash: &Hash) -> Result<Rc<SealedNode>> {
        let bytes = self
            .nodes
            .borrow()
            .get(hash)
            .cloned()
            .ok_or(Error::StoreMiss(*hash))?;
        SealedNode::from_bytes(*hash, &bytes)
    }
}

/// A store that refuses every lookup. Operations running against it prove
/// that the tree under test is fully resident.
pub struct NullStore;

impl NodeStore for NullStore {
    fn get_node(&self, hash: &Hash) -> Result<Rc<SealedNode>> {
        Err(Error::StoreMiss(*hash))
    }
}

/// A single tree operation, for sequence-driven property tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Op {
    Set(Vec<u8>, Vec<u8>),
    Remove(Vec<u8>),
}

/// Short keys over a tiny alphabet, so random sequences actually collide,
/// update and delete one another.
pub fn keys() -> impl Strategy<Value = Vec<u8>> {
    vec(0u8..4, 1..=3)
}

pub fn values() -> impl Strategy<Value = Vec<u8>> {
    vec(any::<u8>(), 0..4)
}

pub fn ops(size: impl Into<SizeRange>) -> impl Strategy<Value = Vec<Op>> {
    vec(
        prop_oneof![
            3 => (keys(), values()).prop_map(|(key, value)| Op::Set(key, value)),
            1 => keys().prop_map(Op::Remove),
        ],
        size,
    )
}

/// A sorted collection of distinct keys.
pub fn unique_keys(size: impl Into<SizeRange>) -> impl Strategy<Value = Vec<Vec<u8>>> {
    hash_set(keys(), size).prop_map(|keys| keys.into_iter().sorted().collect_vec())
}

/// Applies a sequence of operations to an empty tree.
pub fn build_tree(ops: &[Op], store: &dyn NodeStore) -> Option<Node> {
    let mut root = None;
    for op in ops {
        root = match op {
            Op::Set(key, value) => Some(set(root, key, value, store).expect("set succeeds").root),
            Op::Remove(key) => remove(root, key, store).expect("remove succeeds").root,
        };
    }
    root
}

/// The reference semantics of the same operation sequence.
pub fn model(ops: &[Op]) -> BTreeMap<Vec<u8>, Vec<u8>> {
    let mut map = BTreeMap::new();
    for op in ops {
        match op {
            Op::Set(key, value) => {
                map.insert(key.clone(), value.clone());
            }
            Op::Remove(key) => {
                map.remove(key);
            }
        }
    }
    map
}

/// All leaf entries in ascending key order.
pub fn collect_leaves(node: &Node, store: &dyn NodeStore) -> Vec<(Vec<u8>, Vec<u8>)> {
    let mut out = Vec::new();
    node.traverse(store, true, &mut |visited: &Node| {
        if visited.is_leaf() {
            let value = visited.value().expect("leaf holds a value").to_vec();
            out.push((visited.key().to_vec(), value));
        }
        false
    })
    .expect("tree is traversable");
    out
}

/// Key of the leftmost leaf under `node`.
pub fn leftmost(node: &Node, store: &dyn NodeStore) -> Vec<u8> {
    if node.is_leaf() {
        return node.key().to_vec();
    }
    let child = child_view(node, Side::Left, store).expect("child is resolvable");
    leftmost(child.node(), store)
}

/// Key of the rightmost leaf under `node`.
pub fn rightmost(node: &Node, store: &dyn NodeStore) -> Vec<u8> {
    if node.is_leaf() {
        return node.key().to_vec();
    }
    let child = child_view(node, Side::Right, store).expect("child is resolvable");
    rightmost(child.node(), store)
}

/// Hashes of every node reachable from a sealed root.
pub fn reachable_hashes(node: &Rc<SealedNode>, store: &dyn NodeStore) -> BTreeSet<Hash> {
    let mut out = BTreeSet::new();
    collect_reachable(node, store, &mut out);
    out
}

fn collect_reachable(node: &Rc<SealedNode>, store: &dyn NodeStore, out: &mut BTreeSet<Hash>) {
    out.insert(node.hash());
    if !node.is_leaf() {
        let left = node.left(store).expect("child is resolvable");
        let right = node.right(store).expect("child is resolvable");
        collect_reachable(&left, store, out);
        collect_reachable(&right, store, out);
    }
}

/// Checks the structural invariants of the whole subtree: leaf shape,
/// height and size accounting, AVL balance, strict key ordering, and
/// separators equal to the smallest key of their right subtree.
pub fn assert_tree_invariants(node: &Node, store: &dyn NodeStore) {
    check_subtree(node, store);
}

/// Returns the (min, max) leaf keys of the subtree.
fn check_subtree(node: &Node, store: &dyn NodeStore) -> (Vec<u8>, Vec<u8>) {
    if node.is_leaf() {
        assert_eq!(node.height(), 0, "leaf height");
        assert_eq!(node.size(), 1, "leaf size");
        assert!(node.value().is_some(), "leaf value");
        return (node.key().to_vec(), node.key().to_vec());
    }
    assert!(node.value().is_none(), "inner node carries no value");

    let left = child_view(node, Side::Left, store).expect("child is resolvable");
    let right = child_view(node, Side::Right, store).expect("child is resolvable");
    let (left_height, left_size) = (left.node().height(), left.node().size());
    let (right_height, right_size) = (right.node().height(), right.node().size());

    assert_eq!(
        node.height(),
        left_height.max(right_height) + 1,
        "height of inner node {:?}",
        node.key()
    );
    assert_eq!(
        node.size(),
        left_size + right_size,
        "size of inner node {:?}",
        node.key()
    );
    assert!(
        (i32::from(left_height) - i32::from(right_height)).abs() <= 1,
        "balance at node {:?}: left {} right {}",
        node.key(),
        left_height,
        right_height
    );

    let (left_min, left_max) = check_subtree(left.node(), store);
    let (right_min, right_max) = check_subtree(right.node(), store);

    assert!(
        left_max.as_slice() < node.key(),
        "left subtree below separator {:?}",
        node.key()
    );
    assert_eq!(
        right_min.as_slice(),
        node.key(),
        "separator is the smallest key of the right subtree"
    );

    (left_min, right_max)
}
