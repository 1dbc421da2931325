//! Postgres connection pool shared by the repositories

use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use std::sync::Arc;

use crate::config::DatabaseConfig;
use crate::infrastructure::persistence::error::DbError;
use crate::utils::logging;

/// Pooled sea-orm connection, handed to repositories as a shared handle
pub struct DbPool {
    connection: Arc<DatabaseConnection>,
}

impl DbPool {
    /// Connect with the pool limits and timeouts of `config`
    pub async fn new(config: &DatabaseConfig) -> Result<Self, DbError> {
        logging::log_database_connection_details(&config.url);

        let connection = Database::connect(connect_options(config))
            .await
            .map_err(|e| {
                logging::log_error(&format!("Failed to connect to database: {}", e));
                DbError::ConnectionError(e.to_string())
            })?;

        logging::log_info(&format!(
            "Database pool ready ({}..{} connections)",
            config.min_connections, config.max_connections
        ));
        Ok(Self {
            connection: Arc::new(connection),
        })
    }

    /// Shared handle to the pooled connection
    pub fn get_connection(&self) -> Arc<DatabaseConnection> {
        Arc::clone(&self.connection)
    }
}

fn connect_options(config: &DatabaseConfig) -> ConnectOptions {
    let mut options = ConnectOptions::new(config.url.clone());
    options
        .max_connections(config.max_connections)
        .min_connections(config.min_connections.min(config.max_connections))
        .connect_timeout(config.connect_timeout)
        .acquire_timeout(config.acquire_timeout)
        .idle_timeout(config.idle_timeout)
        .sqlx_logging(false);
    options
}
