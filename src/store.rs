use std::rc::Rc;

use crate::{error::Result, hash::Hash, tree::SealedNode};

/// Loader capability the node algebra uses to materialize children that are
/// only present as hashes.
///
/// Implementations resolve a hash to the node persisted under it, decoded
/// from its stored form with the hash assigned and the node marked
/// persisted. A missing entry is reported as [`Error::StoreMiss`] and a
/// payload that does not digest back to the requested hash as
/// [`Error::CorruptNode`]; the tree aborts the running operation on either.
///
/// The node core only ever reads through this trait. Writing nodes out, and
/// reclaiming the orphans that mutations return, stay with the collaborator
/// that owns the store.
///
/// [`Error::StoreMiss`]: crate::error::Error::StoreMiss
/// [`Error::CorruptNode`]: crate::error::Error::CorruptNode
pub trait NodeStore {
    fn get_node(&self, hash: &Hash) -> Result<Rc<SealedNode>>;
}
