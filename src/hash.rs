use std::fmt::{Display, Formatter};

use digest::Digest;
use proptest::prelude::*;
use proptest::strategy::BoxedStrategy;

use crate::prelude::*;

/// Width in bytes of the node digest (RIPEMD-160).
pub const HASH_SIZE: usize = 20;

/// A 160-bit node digest.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct Hash([u8; HASH_SIZE]);

impl Display for Hash {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl std::fmt::Debug for Hash {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl Arbitrary for Hash {
    type Parameters = ();
    type Strategy = BoxedStrategy<Self>;

    fn arbitrary_with(_args: Self::Parameters) -> Self::Strategy {
        any::<[u8; HASH_SIZE]>().prop_map(Hash::new).boxed()
    }
}

impl Hash {
    /// Creates a new Hash from any type that can be converted into the inner array.
    pub fn new<T: Into<[u8; HASH_SIZE]>>(data: T) -> Self {
        Hash(data.into())
    }

    /// Copies a Hash out of a slice. Panics unless the slice is exactly
    /// [`HASH_SIZE`] bytes long.
    pub fn from_slice(slice: &[u8]) -> Self {
        let mut inner = [0u8; HASH_SIZE];
        inner.copy_from_slice(slice);
        Hash(inner)
    }

    /// Returns a zero hash (all bytes set to 0).
    pub fn zero() -> Self {
        Self([0u8; HASH_SIZE])
    }

    pub fn digest<D: Digest>(data: &[u8]) -> Self {
        let mut hasher = D::new();
        hasher.update(data);
        Hash::from_slice(&hasher.finalize())
    }
}

impl Default for Hash {
    fn default() -> Self {
        Hash::zero()
    }
}

impl From<[u8; HASH_SIZE]> for Hash {
    fn from(array: [u8; HASH_SIZE]) -> Self {
        Hash(array)
    }
}

impl AsRef<[u8]> for Hash {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<Hash> for [u8; HASH_SIZE] {
    fn from(val: Hash) -> Self {
        val.0
    }
}

impl FromBytes for Hash {
    fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != HASH_SIZE {
            return Err(Error::decode(format!(
                "expected {} bytes for a hash, got {}",
                HASH_SIZE,
                bytes.len()
            )));
        }
        Ok(Hash::from_slice(bytes))
    }
}

impl ToBytes for Hash {
    type Output = [u8; HASH_SIZE];

    fn to_bytes(&self) -> Self::Output {
        self.0
    }
}

impl FromHex for Hash {
    fn from_hex(input: &str) -> Result<Self> {
        let bytes = hex::decode(input).map_err(|e| Error::decode(format!("hex error: {}", e)))?;
        Self::from_bytes(&bytes)
    }
}

impl ToHex for Hash {
    fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}
