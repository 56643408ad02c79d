use super::quantity::{QuantityError, parse_u64_quantity};
use serde::{Deserialize, Serialize};

/// The tick context attached to every event: the block that triggered it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockContext {
    pub number: u64,
    pub hash: String,
    /// Unix timestamp in seconds.
    pub timestamp: u64,
}

impl std::fmt::Display for BlockContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{} ({})", self.number, self.hash)
    }
}

/// Block header fields as returned by `eth_getBlockByNumber`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RawBlockHeader {
    pub number: String,
    pub hash: String,
    pub timestamp: String,
}

impl TryFrom<RawBlockHeader> for BlockContext {
    type Error = QuantityError;

    fn try_from(raw: RawBlockHeader) -> Result<Self, Self::Error> {
        Ok(Self {
            number: parse_u64_quantity(&raw.number)?,
            hash: raw.hash,
            timestamp: parse_u64_quantity(&raw.timestamp)?,
        })
    }
}
