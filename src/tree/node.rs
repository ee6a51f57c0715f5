use std::cell::{Cell, RefCell};
use std::rc::Rc;

use ripemd::Ripemd160;

use crate::{
    codec::{self, Reader},
    error::{Error, Result},
    hash::Hash,
    store::NodeStore,
    FromBytes, ToBytes,
};

/// A node of the tree, tagged by provenance.
///
/// Fresh nodes are produced by the mutation currently in flight: they are
/// writable and have no hash yet. Sealed nodes have been digested; their
/// content is frozen and they are shared freely between tree versions.
/// Mutating a sealed node is not an error path, it is unrepresentable.
#[derive(Debug, Clone)]
pub enum Node {
    Fresh(Box<FreshNode>),
    Sealed(Rc<SealedNode>),
}

/// Which child slot of an inner node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Side {
    Left,
    Right,
}

impl Side {
    pub(crate) fn other(self) -> Side {
        match self {
            Side::Left => Side::Right,
            Side::Right => Side::Left,
        }
    }
}

/// A child slot of a writable inner node: either a resident node or a link
/// into the node store.
#[derive(Debug, Clone)]
pub enum Child {
    Resident(Node),
    Remote(Hash),
}

/// A node under construction by the current mutation.
#[derive(Debug, Clone)]
pub struct FreshNode {
    pub(crate) key: Vec<u8>,
    pub(crate) version: u64,
    pub(crate) height: i8,
    pub(crate) size: u64,
    pub(crate) body: FreshBody,
}

#[derive(Debug, Clone)]
pub(crate) enum FreshBody {
    Leaf { value: Vec<u8> },
    Inner { left: Child, right: Child },
}

/// A hashed node. `persisted` is owned by the store collaborator: it is set
/// when the node has been durably written (or was loaded from storage), and
/// it is what makes a displaced node an orphan worth reporting.
#[derive(Debug)]
pub struct SealedNode {
    hash: Hash,
    key: Vec<u8>,
    version: u64,
    height: i8,
    size: u64,
    body: SealedBody,
    persisted: Cell<bool>,
}

#[derive(Debug)]
pub(crate) enum SealedBody {
    Leaf { value: Vec<u8> },
    Inner { left: SealedChild, right: SealedChild },
}

/// Child slot of a sealed inner node: the hash is always known, the resident
/// node is cached after the first load through the store.
#[derive(Debug)]
pub(crate) struct SealedChild {
    hash: Hash,
    cached: RefCell<Option<Rc<SealedNode>>>,
}

impl Node {
    /// A fresh leaf holding `key` → `value`.
    pub fn leaf(key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> Node {
        Node::Fresh(Box::new(FreshNode::leaf(key.into(), value.into())))
    }

    pub fn key(&self) -> &[u8] {
        match self {
            Node::Fresh(n) => &n.key,
            Node::Sealed(n) => &n.key,
        }
    }

    pub fn version(&self) -> u64 {
        match self {
            Node::Fresh(n) => n.version,
            Node::Sealed(n) => n.version,
        }
    }

    pub fn height(&self) -> i8 {
        match self {
            Node::Fresh(n) => n.height,
            Node::Sealed(n) => n.height,
        }
    }

    pub fn size(&self) -> u64 {
        match self {
            Node::Fresh(n) => n.size,
            Node::Sealed(n) => n.size,
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.height() == 0
    }

    /// The value stored at a leaf, `None` on inner nodes.
    pub fn value(&self) -> Option<&[u8]> {
        match self {
            Node::Fresh(n) => match &n.body {
                FreshBody::Leaf { value } => Some(value),
                FreshBody::Inner { .. } => None,
            },
            Node::Sealed(n) => n.value(),
        }
    }

    /// The node's digest, if it has been sealed.
    pub fn hash(&self) -> Option<Hash> {
        match self {
            Node::Fresh(_) => None,
            Node::Sealed(n) => Some(n.hash),
        }
    }

    /// Seals the subtree: recursively hashes every resident node that has no
    /// hash yet and returns the sealed root together with the number of
    /// nodes newly hashed by this call. An already-sealed node
    /// short-circuits with a count of 0.
    pub fn hash_with_count(self) -> (Rc<SealedNode>, usize) {
        match self {
            Node::Sealed(rc) => (rc, 0),
            Node::Fresh(fresh) => fresh.seal(),
        }
    }
}

impl From<Rc<SealedNode>> for Node {
    fn from(rc: Rc<SealedNode>) -> Self {
        Node::Sealed(rc)
    }
}

impl Child {
    /// The linked node's hash, if it has one.
    pub fn hash(&self) -> Option<Hash> {
        match self {
            Child::Remote(hash) => Some(*hash),
            Child::Resident(node) => node.hash(),
        }
    }

    /// Materializes a remote link into a resident node through the store.
    pub(crate) fn resolve(&mut self, store: &dyn NodeStore) -> Result<&mut Node> {
        if let Child::Remote(hash) = self {
            let node = store.get_node(hash)?;
            *self = Child::Resident(Node::Sealed(node));
        }
        match self {
            Child::Resident(node) => Ok(node),
            Child::Remote(_) => unreachable!("slot was just resolved"),
        }
    }

    /// Moves the slot's contents out, leaving the linked node's hash behind
    /// (a zero placeholder for unhashed nodes). The slot must be reassigned
    /// before the surrounding node is used again.
    pub(crate) fn take(&mut self) -> Child {
        let placeholder = Child::Remote(self.hash().unwrap_or_else(Hash::zero));
        std::mem::replace(self, placeholder)
    }

    /// Moves the resident node out of the slot, resolving it first if
    /// needed.
    pub(crate) fn take_node(&mut self, store: &dyn NodeStore) -> Result<Node> {
        self.resolve(store)?;
        match self.take() {
            Child::Resident(node) => Ok(node),
            Child::Remote(_) => unreachable!("slot was resolved above"),
        }
    }

    pub(crate) fn height_and_size(&mut self, store: &dyn NodeStore) -> Result<(i8, u64)> {
        let node = self.resolve(store)?;
        Ok((node.height(), node.size()))
    }
}

impl FreshNode {
    /// A new leaf: height 0, size 1, version 0. Versions are assigned by the
    /// persistence collaborator, not here.
    pub fn leaf(key: Vec<u8>, value: Vec<u8>) -> FreshNode {
        FreshNode {
            key,
            version: 0,
            height: 0,
            size: 1,
            body: FreshBody::Leaf { value },
        }
    }

    /// The inner node formed when an insert splits a leaf in two.
    pub(crate) fn branch(key: Vec<u8>, left: Node, right: Node) -> FreshNode {
        FreshNode {
            key,
            version: 0,
            height: 1,
            size: 2,
            body: FreshBody::Inner {
                left: Child::Resident(left),
                right: Child::Resident(right),
            },
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.height == 0
    }

    pub(crate) fn child_ref(&self, side: Side) -> &Child {
        match (&self.body, side) {
            (FreshBody::Inner { left, .. }, Side::Left) => left,
            (FreshBody::Inner { right, .. }, Side::Right) => right,
            (FreshBody::Leaf { .. }, _) => unreachable!("leaf nodes have no children"),
        }
    }

    pub(crate) fn child_mut(&mut self, side: Side) -> &mut Child {
        match (&mut self.body, side) {
            (FreshBody::Inner { left, .. }, Side::Left) => left,
            (FreshBody::Inner { right, .. }, Side::Right) => right,
            (FreshBody::Leaf { .. }, _) => unreachable!("leaf nodes have no children"),
        }
    }

    /// Refreshes `height` and `size` from the children, loading any child
    /// that is only present as a hash.
    pub(crate) fn recompute_height_and_size(&mut self, store: &dyn NodeStore) -> Result<()> {
        let FreshBody::Inner { left, right } = &mut self.body else {
            unreachable!("height/size recomputation on a leaf")
        };
        let (left_height, left_size) = left.height_and_size(store)?;
        let (right_height, right_size) = right.height_and_size(store)?;
        self.height = left_height.max(right_height) + 1;
        self.size = left_size + right_size;
        Ok(())
    }

    /// Hashes this subtree bottom-up and freezes it.
    fn seal(self) -> (Rc<SealedNode>, usize) {
        let FreshNode {
            key,
            version,
            height,
            size,
            body,
        } = self;

        let (body, sealed_below) = match body {
            FreshBody::Leaf { value } => (SealedBody::Leaf { value }, 0),
            FreshBody::Inner { left, right } => {
                let (left, sealed_left) = SealedChild::seal(left);
                let (right, sealed_right) = SealedChild::seal(right);
                (SealedBody::Inner { left, right }, sealed_left + sealed_right)
            }
        };

        let preimage = hash_preimage(height, size, &key, version, &body);
        let node = SealedNode {
            hash: Hash::digest::<Ripemd160>(&preimage),
            key,
            version,
            height,
            size,
            body,
            persisted: Cell::new(false),
        };
        (Rc::new(node), sealed_below + 1)
    }
}

impl SealedNode {
    pub fn hash(&self) -> Hash {
        self.hash
    }

    pub fn key(&self) -> &[u8] {
        &self.key
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn height(&self) -> i8 {
        self.height
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn is_leaf(&self) -> bool {
        self.height == 0
    }

    pub fn value(&self) -> Option<&[u8]> {
        match &self.body {
            SealedBody::Leaf { value } => Some(value),
            SealedBody::Inner { .. } => None,
        }
    }

    pub fn left_hash(&self) -> Option<Hash> {
        match &self.body {
            SealedBody::Inner { left, .. } => Some(left.hash),
            SealedBody::Leaf { .. } => None,
        }
    }

    pub fn right_hash(&self) -> Option<Hash> {
        match &self.body {
            SealedBody::Inner { right, .. } => Some(right.hash),
            SealedBody::Leaf { .. } => None,
        }
    }

    pub fn persisted(&self) -> bool {
        self.persisted.get()
    }

    /// Store-side hook: marks this node as durably written. Only persisted
    /// nodes are reported as orphans when a mutation displaces them.
    pub fn mark_persisted(&self) {
        self.persisted.set(true);
    }

    pub fn left(&self, store: &dyn NodeStore) -> Result<Rc<SealedNode>> {
        self.child(Side::Left, store)
    }

    pub fn right(&self, store: &dyn NodeStore) -> Result<Rc<SealedNode>> {
        self.child(Side::Right, store)
    }

    pub(crate) fn child(&self, side: Side, store: &dyn NodeStore) -> Result<Rc<SealedNode>> {
        self.slot(side).node(store)
    }

    /// The child slot as a writable-node link, hash and cached reference in
    /// lockstep.
    pub(crate) fn child_link(&self, side: Side) -> Child {
        self.slot(side).to_child()
    }

    /// The resident child, if it has been loaded or was sealed in memory.
    pub(crate) fn cached_child(&self, side: Side) -> Option<Rc<SealedNode>> {
        self.slot(side).cached.borrow().clone()
    }

    fn slot(&self, side: Side) -> &SealedChild {
        match (&self.body, side) {
            (SealedBody::Inner { left, .. }, Side::Left) => left,
            (SealedBody::Inner { right, .. }, Side::Right) => right,
            (SealedBody::Leaf { .. }, _) => unreachable!("leaf nodes have no children"),
        }
    }

    /// A writable clone of an inner node: same key, version, height, size
    /// and child links, no hash, not persisted. Leaves are rebuilt from
    /// scratch, never copied; asking for a copy of one is a programming
    /// fault.
    pub fn copy_inner(&self) -> FreshNode {
        let SealedBody::Inner { left, right } = &self.body else {
            panic!("attempted to copy a leaf node")
        };
        FreshNode {
            key: self.key.clone(),
            version: self.version,
            height: self.height,
            size: self.size,
            body: FreshBody::Inner {
                left: left.to_child(),
                right: right.to_child(),
            },
        }
    }

    /// The digest preimage of this node.
    pub fn hash_preimage(&self) -> Vec<u8> {
        hash_preimage(self.height, self.size, &self.key, self.version, &self.body)
    }

    /// Decodes a node from its persisted form, checking that the payload
    /// digests back to `hash`. The returned node carries the hash it was
    /// looked up by and is marked persisted.
    pub fn from_bytes(hash: Hash, bytes: &[u8]) -> Result<Rc<SealedNode>> {
        let mut reader = Reader::new(bytes);

        let height = reader.read_i8()?;
        if height < 0 {
            return Err(Error::decode(format!("negative node height {}", height)));
        }
        let size = reader.read_varint()?;
        if size < 1 {
            return Err(Error::decode(format!("node size {} out of range", size)));
        }
        let size = size as u64;
        let key = reader.read_bytes()?;
        let version = reader.read_u64()?;

        let body = if height == 0 {
            if size != 1 {
                return Err(Error::decode(format!("leaf node with size {}", size)));
            }
            SealedBody::Leaf {
                value: reader.read_bytes()?,
            }
        } else {
            if size < 2 {
                return Err(Error::decode(format!("inner node with size {}", size)));
            }
            let left = Hash::from_bytes(&reader.read_bytes()?)?;
            let right = Hash::from_bytes(&reader.read_bytes()?)?;
            SealedBody::Inner {
                left: SealedChild::remote(left),
                right: SealedChild::remote(right),
            }
        };
        reader.finish()?;

        let node = SealedNode {
            hash,
            key,
            version,
            height,
            size,
            body,
            persisted: Cell::new(true),
        };
        let actual = Hash::digest::<Ripemd160>(&node.hash_preimage());
        if actual != hash {
            return Err(Error::CorruptNode {
                expected: hash,
                actual,
            });
        }
        Ok(Rc::new(node))
    }
}

impl PartialEq for SealedNode {
    fn eq(&self, other: &Self) -> bool {
        self.hash == other.hash
    }
}

impl Eq for SealedNode {}

impl ToBytes for SealedNode {
    type Output = Vec<u8>;

    /// The persisted form: unlike the digest preimage, the key and version
    /// are always present, inner nodes included.
    fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        codec::write_i8(&mut buf, self.height);
        codec::write_varint(&mut buf, self.size as i64);
        codec::write_bytes(&mut buf, &self.key);
        codec::write_u64(&mut buf, self.version);
        match &self.body {
            SealedBody::Leaf { value } => codec::write_bytes(&mut buf, value),
            SealedBody::Inner { left, right } => {
                codec::write_bytes(&mut buf, left.hash.as_ref());
                codec::write_bytes(&mut buf, right.hash.as_ref());
            }
        }
        buf
    }
}

impl SealedChild {
    fn remote(hash: Hash) -> SealedChild {
        SealedChild {
            hash,
            cached: RefCell::new(None),
        }
    }

    fn seal(child: Child) -> (SealedChild, usize) {
        match child {
            Child::Remote(hash) => (SealedChild::remote(hash), 0),
            Child::Resident(node) => {
                let (node, sealed) = node.hash_with_count();
                let slot = SealedChild {
                    hash: node.hash,
                    cached: RefCell::new(Some(node)),
                };
                (slot, sealed)
            }
        }
    }

    fn node(&self, store: &dyn NodeStore) -> Result<Rc<SealedNode>> {
        if let Some(node) = &*self.cached.borrow() {
            return Ok(node.clone());
        }
        log::trace!("materializing node {} from store", self.hash);
        let node = store.get_node(&self.hash)?;
        *self.cached.borrow_mut() = Some(node.clone());
        Ok(node)
    }

    fn to_child(&self) -> Child {
        match &*self.cached.borrow() {
            Some(node) => Child::Resident(Node::Sealed(node.clone())),
            None => Child::Remote(self.hash),
        }
    }
}

/// A child obtained for reading: borrowed when it was already resident,
/// owned when it had to be loaded (or wrapped) on the way.
pub(crate) enum ChildView<'a> {
    Borrowed(&'a Node),
    Loaded(Node),
}

impl ChildView<'_> {
    pub(crate) fn node(&self) -> &Node {
        match self {
            ChildView::Borrowed(node) => node,
            ChildView::Loaded(node) => node,
        }
    }
}

/// Read-only access to a child of an inner node, loading through the store
/// when only a hash is present.
pub(crate) fn child_view<'a>(
    node: &'a Node,
    side: Side,
    store: &dyn NodeStore,
) -> Result<ChildView<'a>> {
    match node {
        Node::Sealed(rc) => Ok(ChildView::Loaded(Node::Sealed(rc.child(side, store)?))),
        Node::Fresh(fresh) => match fresh.child_ref(side) {
            Child::Resident(child) => Ok(ChildView::Borrowed(child)),
            Child::Remote(hash) => Ok(ChildView::Loaded(Node::Sealed(store.get_node(hash)?))),
        },
    }
}

/// The digest preimage: height, size, then for leaves the key, value and
/// version, and for inner nodes only the two child hashes. Separator keys
/// and inner-node versions never enter the commitment.
fn hash_preimage(height: i8, size: u64, key: &[u8], version: u64, body: &SealedBody) -> Vec<u8> {
    let mut buf = Vec::new();
    codec::write_i8(&mut buf, height);
    codec::write_varint(&mut buf, size as i64);
    match body {
        SealedBody::Leaf { value } => {
            codec::write_bytes(&mut buf, key);
            codec::write_bytes(&mut buf, value);
            codec::write_u64(&mut buf, version);
        }
        SealedBody::Inner { left, right } => {
            codec::write_bytes(&mut buf, left.hash.as_ref());
            codec::write_bytes(&mut buf, right.hash.as_ref());
        }
    }
    buf
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sealed_leaf() -> Rc<SealedNode> {
        let (sealed, count) = Node::leaf("a", "1").hash_with_count();
        assert_eq!(count, 1);
        sealed
    }

    fn sealed_branch() -> Rc<SealedNode> {
        let branch = FreshNode::branch(b"b".to_vec(), Node::leaf("a", "1"), Node::leaf("b", "2"));
        let (sealed, count) = Node::Fresh(Box::new(branch)).hash_with_count();
        assert_eq!(count, 3);
        sealed
    }

    #[test]
    fn test_leaf_wire_format_is_pinned() {
        let sealed = sealed_leaf();

        // height, size, key, version, value
        let expected_store = vec![
            0x00, 0x02, 0x02, b'a', 0, 0, 0, 0, 0, 0, 0, 0, 0x02, b'1',
        ];
        assert_eq!(sealed.to_bytes(), expected_store);

        // height, size, key, value, version
        let expected_preimage = vec![
            0x00, 0x02, 0x02, b'a', 0x02, b'1', 0, 0, 0, 0, 0, 0, 0, 0,
        ];
        assert_eq!(sealed.hash_preimage(), expected_preimage);
        assert_eq!(sealed.hash(), Hash::digest::<Ripemd160>(&expected_preimage));
    }

    #[test]
    fn test_inner_wire_format_is_pinned() {
        let sealed = sealed_branch();
        let left = sealed.left_hash().unwrap();
        let right = sealed.right_hash().unwrap();

        // The stored form keeps the separator key and version.
        let mut expected_store = vec![0x01, 0x04, 0x02, b'b', 0, 0, 0, 0, 0, 0, 0, 0];
        expected_store.push(0x28);
        expected_store.extend_from_slice(left.as_ref());
        expected_store.push(0x28);
        expected_store.extend_from_slice(right.as_ref());
        assert_eq!(sealed.to_bytes(), expected_store);

        // The digest preimage drops both and commits to the child hashes.
        let mut expected_preimage = vec![0x01, 0x04];
        expected_preimage.push(0x28);
        expected_preimage.extend_from_slice(left.as_ref());
        expected_preimage.push(0x28);
        expected_preimage.extend_from_slice(right.as_ref());
        assert_eq!(sealed.hash_preimage(), expected_preimage);
    }

    #[test]
    fn test_store_bytes_roundtrip() {
        let sealed = sealed_branch();
        let decoded = SealedNode::from_bytes(sealed.hash(), &sealed.to_bytes()).unwrap();

        assert_eq!(decoded.key(), sealed.key());
        assert_eq!(decoded.version(), sealed.version());
        assert_eq!(decoded.height(), sealed.height());
        assert_eq!(decoded.size(), sealed.size());
        assert_eq!(decoded.left_hash(), sealed.left_hash());
        assert_eq!(decoded.right_hash(), sealed.right_hash());
        assert!(decoded.persisted());
    }

    #[test]
    fn test_corrupt_payload_is_rejected() {
        let sealed = sealed_leaf();
        let mut bytes = sealed.to_bytes();
        *bytes.last_mut().unwrap() = b'2';
        let err = SealedNode::from_bytes(sealed.hash(), &bytes).unwrap_err();
        assert!(matches!(err, Error::CorruptNode { .. }), "got {:?}", err);
    }

    #[test]
    fn test_payload_under_wrong_hash_is_rejected() {
        let sealed = sealed_leaf();
        let err = SealedNode::from_bytes(Hash::zero(), &sealed.to_bytes()).unwrap_err();
        assert!(matches!(err, Error::CorruptNode { .. }), "got {:?}", err);
    }

    #[test]
    fn test_truncated_payload_is_rejected() {
        let sealed = sealed_leaf();
        let mut bytes = sealed.to_bytes();
        bytes.truncate(bytes.len() - 1);
        let err = SealedNode::from_bytes(sealed.hash(), &bytes).unwrap_err();
        assert!(matches!(err, Error::Decode(_)), "got {:?}", err);
    }

    #[test]
    fn test_trailing_bytes_are_rejected() {
        let sealed = sealed_leaf();
        let mut bytes = sealed.to_bytes();
        bytes.push(0x00);
        let err = SealedNode::from_bytes(sealed.hash(), &bytes).unwrap_err();
        assert!(matches!(err, Error::Decode(_)), "got {:?}", err);
    }

    #[test]
    fn test_sealing_is_idempotent() {
        let sealed = sealed_branch();
        let (resealed, count) = Node::Sealed(sealed.clone()).hash_with_count();
        assert_eq!(count, 0);
        assert!(Rc::ptr_eq(&resealed, &sealed));
    }

    #[test]
    #[should_panic(expected = "copy a leaf")]
    fn test_copying_a_leaf_is_a_fault() {
        let _ = sealed_leaf().copy_inner();
    }
}
