use thiserror::Error;

use crate::application::indexer::Backend;
use crate::infrastructure::bitcoin::BitcoinClientError;
use crate::infrastructure::persistence::error::DbError;

/// Error raised when a compact activity string cannot be decoded at all
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("Malformed activity fragments: {0}")]
    MalformedJson(#[from] serde_json::Error),
}

/// Error type for transaction analysis
#[derive(Debug, Error)]
pub enum AnalyserError {
    #[error("Analysis failed: {0}")]
    Failed(String),
    #[error("Analyser task aborted: {0}")]
    Aborted(String),
}

/// Error type for block processing operations
#[derive(Debug, Error)]
pub enum BlockProcessorError {
    #[error("Fetching transactions via {backend} backend failed: {source}")]
    Fetch {
        backend: Backend,
        #[source]
        source: BitcoinClientError,
    },
    #[error("Analyser error: {0}")]
    Analyser(#[from] AnalyserError),
    #[error("Database error: {0}")]
    Db(#[from] DbError),
}
