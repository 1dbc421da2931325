//! Bitcoin Core node provider implementation

use async_trait::async_trait;
use bitcoincore_rpc::bitcoin::Transaction;
use bitcoincore_rpc::{Auth, Client, RpcApi};
use std::sync::Arc;

use super::{verified_transactions, TransactionSource};
use crate::domain::models::BlockCursor;
use crate::infrastructure::bitcoin::error::BitcoinClientError;

/// Bitcoin node provider for direct RPC calls
#[derive(Debug)]
pub struct BitcoinNodeProvider {
    client: Arc<Client>,
    network: String,
}

impl BitcoinNodeProvider {
    /// Create a new Bitcoin node provider
    pub fn new(
        host: String,
        port: String,
        username: String,
        password: String,
        network: String,
    ) -> Result<Self, BitcoinClientError> {
        let url = format!("http://{}:{}", host, port);
        let auth = Auth::UserPass(username, password);

        let client = Client::new(&url, auth)
            .map_err(|e| BitcoinClientError::ConnectionError(e.to_string()))?;

        Ok(Self {
            client: Arc::new(client),
            network,
        })
    }
}

#[async_trait]
impl TransactionSource for BitcoinNodeProvider {
    fn provider_name(&self) -> String {
        format!("Bitcoin Node ({})", self.network)
    }

    async fn get_block_transactions(
        &self,
        cursor: &BlockCursor,
    ) -> Result<Vec<Transaction>, BitcoinClientError> {
        let client = self.client.clone();
        let block_hash = cursor.id;
        let block = tokio::task::spawn_blocking(move || client.get_block(&block_hash))
            .await
            .map_err(|e| BitcoinClientError::NetworkError(e.to_string()))??;

        verified_transactions(cursor, block)
    }
}
