use bitcoincore_rpc::bitcoin::BlockHash;

/// The lowest-height block that has no statistics row yet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockCursor {
    /// Block hash
    pub id: BlockHash,

    /// Block height
    pub height: u64,

    /// Block timestamp (Unix seconds)
    pub timestamp: i64,
}

impl BlockCursor {
    /// Create a new BlockCursor
    pub fn new(id: BlockHash, height: u64, timestamp: i64) -> Self {
        Self {
            id,
            height,
            timestamp,
        }
    }
}
