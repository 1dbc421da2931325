use sea_orm::DatabaseConnection;
use std::sync::Arc;

use crate::infrastructure::persistence::connection::DbPool;
use crate::infrastructure::persistence::repositories::{OrdpoolStatsRepository, Repositories};

/// Factory for creating repositories
pub struct RepositoryFactory;

impl RepositoryFactory {
    /// Create all repositories
    pub fn create_repositories(db_pool: &DbPool, activity_batch_size: usize) -> Repositories {
        let conn = db_pool.get_connection();

        Repositories::new(Self::create_ordpool_stats_repository(
            conn,
            activity_batch_size,
        ))
    }

    /// Create an ordpool stats repository
    pub fn create_ordpool_stats_repository(
        conn: Arc<DatabaseConnection>,
        activity_batch_size: usize,
    ) -> OrdpoolStatsRepository {
        OrdpoolStatsRepository::new(conn, activity_batch_size)
    }
}
