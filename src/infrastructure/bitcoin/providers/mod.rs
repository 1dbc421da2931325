//! Transaction source implementations
//!
//! Two interchangeable backends deliver the transactions of a block: a Bitcoin
//! Core node over JSON-RPC (primary) and an Esplora REST endpoint (fallback).

pub mod bitcoin_node;
pub mod esplora;

pub use bitcoin_node::BitcoinNodeProvider;
pub use esplora::EsploraProvider;

use async_trait::async_trait;
use bitcoincore_rpc::bitcoin::{Block, Transaction};

use crate::domain::models::BlockCursor;
use crate::infrastructure::bitcoin::error::BitcoinClientError;

/// Trait for backends able to return the transactions of a block
#[async_trait]
pub trait TransactionSource: Send + Sync + std::fmt::Debug {
    /// Get the provider name for identification
    fn provider_name(&self) -> String;

    /// Get every transaction of the block, coinbase first
    async fn get_block_transactions(
        &self,
        cursor: &BlockCursor,
    ) -> Result<Vec<Transaction>, BitcoinClientError>;
}

/// Reject a block whose header does not hash to the requested id
pub(crate) fn verified_transactions(
    cursor: &BlockCursor,
    block: Block,
) -> Result<Vec<Transaction>, BitcoinClientError> {
    let actual = block.block_hash();
    if actual != cursor.id {
        return Err(BitcoinClientError::ParseError(format!(
            "Block hash mismatch at height {}: requested {}, received {}",
            cursor.height, cursor.id, actual
        )));
    }
    Ok(block.txdata)
}
