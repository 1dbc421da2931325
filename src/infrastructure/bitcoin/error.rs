use thiserror::Error;

/// Represents errors that can occur while fetching block transactions
#[derive(Debug, Error)]
pub enum BitcoinClientError {
    /// Error from the Bitcoin Core RPC client
    #[error("Bitcoin RPC error: {0}")]
    RpcError(#[from] bitcoincore_rpc::Error),
    /// Connection error
    #[error("Connection error: {0}")]
    ConnectionError(String),
    /// Transport or HTTP status error
    #[error("Network error: {0}")]
    NetworkError(String),
    /// Response could not be decoded
    #[error("Parse error: {0}")]
    ParseError(String),
    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl From<reqwest::Error> for BitcoinClientError {
    fn from(error: reqwest::Error) -> Self {
        BitcoinClientError::NetworkError(error.to_string())
    }
}
