mod error;
mod provider_factory;
mod providers;

pub use error::BitcoinClientError;
pub use provider_factory::ProviderFactory;
pub use providers::{BitcoinNodeProvider, EsploraProvider, TransactionSource};
