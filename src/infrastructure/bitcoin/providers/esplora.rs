//! Esplora REST provider implementation

use async_trait::async_trait;
use bitcoincore_rpc::bitcoin::consensus::deserialize;
use bitcoincore_rpc::bitcoin::{Block, Transaction};
use reqwest::Client;
use std::time::Duration;

use super::{verified_transactions, TransactionSource};
use crate::domain::models::BlockCursor;
use crate::infrastructure::bitcoin::error::BitcoinClientError;

/// Esplora provider (mempool.space, blockstream.info or a self-hosted instance)
#[derive(Debug)]
pub struct EsploraProvider {
    base_url: String,
    client: Client,
}

impl EsploraProvider {
    /// Create a new Esplora provider
    pub fn new(base_url: String, timeout: Duration) -> Result<Self, BitcoinClientError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| BitcoinClientError::ConfigError(e.to_string()))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    fn raw_block_url(&self, cursor: &BlockCursor) -> String {
        format!("{}/block/{}/raw", self.base_url, cursor.id)
    }
}

#[async_trait]
impl TransactionSource for EsploraProvider {
    fn provider_name(&self) -> String {
        format!("Esplora ({})", self.base_url)
    }

    async fn get_block_transactions(
        &self,
        cursor: &BlockCursor,
    ) -> Result<Vec<Transaction>, BitcoinClientError> {
        let response = self
            .client
            .get(self.raw_block_url(cursor))
            .send()
            .await?
            .error_for_status()?;

        let bytes = response.bytes().await?;
        let block: Block =
            deserialize(&bytes).map_err(|e| BitcoinClientError::ParseError(e.to_string()))?;

        verified_transactions(cursor, block)
    }
}
