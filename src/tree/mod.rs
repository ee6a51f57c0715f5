//! The node algebra of an immutable, hash-linked AVL tree.
//!
//! The tree maps opaque byte-string keys to opaque byte-string values.
//! Leaves hold the entries; inner nodes hold a separator key (the smallest
//! key of their right subtree) and two children. Every mutation returns a
//! new root that shares all untouched structure with its predecessor, and
//! every sealed node carries a RIPEMD-160 digest over its contents, so the
//! root hash commits to the entire key-value set.
//!
//! Children may live in memory or only as hashes resolvable through a
//! [`NodeStore`](crate::store::NodeStore); the algebra materializes them on
//! demand. Mutations report the persisted nodes they displace so the store
//! owner can reclaim them.
//!
//! The module is single-threaded: one mutation owns its whole path, while
//! sealed roots can be read freely because nothing ever mutates them.

mod balance;
mod mutate;
pub(crate) mod node;
mod query;

pub use mutate::{remove, set, RemoveOutcome, SetOutcome};
pub use node::{Child, FreshNode, Node, SealedNode};
