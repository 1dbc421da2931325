//! Provider factory for creating the primary and fallback transaction sources

use std::sync::Arc;

use crate::config::{BitcoinConfig, EsploraConfig};
use crate::infrastructure::bitcoin::error::BitcoinClientError;
use crate::infrastructure::bitcoin::providers::{
    BitcoinNodeProvider, EsploraProvider, TransactionSource,
};

/// Factory for creating transaction sources
pub struct ProviderFactory;

impl ProviderFactory {
    /// Bitcoin Core node, the primary backend
    pub fn create_primary(
        config: &BitcoinConfig,
    ) -> Result<Arc<dyn TransactionSource>, BitcoinClientError> {
        let provider = BitcoinNodeProvider::new(
            config.host.clone(),
            config.port.clone(),
            config.username.clone(),
            config.password.clone(),
            config.network.clone(),
        )?;
        Ok(Arc::new(provider))
    }

    /// Esplora REST endpoint, the fallback backend
    pub fn create_fallback(
        config: &EsploraConfig,
    ) -> Result<Arc<dyn TransactionSource>, BitcoinClientError> {
        if config.url.is_empty() {
            return Err(BitcoinClientError::ConfigError(
                "Esplora URL not configured".to_string(),
            ));
        }
        let provider = EsploraProvider::new(config.url.clone(), config.timeout)?;
        Ok(Arc::new(provider))
    }
}
