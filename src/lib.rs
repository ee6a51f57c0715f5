mod codec;
mod error;
mod hash;
mod store;
mod tree;

pub mod testing;

pub mod prelude {
    pub use digest::Digest;

    pub use crate::{
        error::{Error, Result},
        hash::{Hash, HASH_SIZE},
        store::NodeStore,
        tree::{
            remove, set, Child, FreshNode, Node, RemoveOutcome, SealedNode, SetOutcome,
        },
        FromBytes, FromHex, ToBytes, ToHex,
    };
}

use crate::error::Result;

pub use crate::{
    error::Error,
    hash::{Hash, HASH_SIZE},
    store::NodeStore,
    tree::{remove, set, Child, FreshNode, Node, RemoveOutcome, SealedNode, SetOutcome},
};

pub trait FromBytes
where
    Self: Sized,
{
    fn from_bytes(bytes: &[u8]) -> Result<Self>;
}

pub trait ToBytes {
    type Output: AsRef<[u8]>;

    /// Converts the value to a representation in bytes.
    fn to_bytes(&self) -> Self::Output;

    /// Converts the value to a representation in bytes, as a vector.
    ///
    /// This is a convenience method, and automatically derived from `to_bytes`.
    fn to_bytes_vec(&self) -> Vec<u8> {
        self.to_bytes().as_ref().to_vec()
    }
}

pub trait FromHex
where
    Self: Sized,
{
    fn from_hex(hex: &str) -> Result<Self>;
}

pub trait ToHex {
    fn to_hex(&self) -> String;
}
