use thiserror::Error as ThisError;

use crate::hash::Hash;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, ThisError, PartialEq, Clone)]
pub enum Error {
    #[error("decode error: {0}")]
    Decode(String),

    #[error("node {0} not found in store")]
    StoreMiss(Hash),

    #[error("stored bytes for {expected} digest to {actual}")]
    CorruptNode { expected: Hash, actual: Hash },
}

impl Error {
    pub(crate) fn decode(msg: impl Into<String>) -> Self {
        Error::Decode(msg.into())
    }
}
