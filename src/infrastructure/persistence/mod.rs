pub mod connection;
pub mod entities;
pub mod error;
pub mod factory;
pub mod repositories;

pub use connection::DbPool;
pub use error::DbError;
pub use factory::RepositoryFactory;
pub use repositories::{OrdpoolStatsRepository, Repositories, SaveOutcome, StatsStore};
