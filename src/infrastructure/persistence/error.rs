use thiserror::Error;

use crate::domain::errors::CodecError;

/// Postgres message for a unique index violation
const DUPLICATE_KEY_MESSAGE: &str = "duplicate key value violates unique constraint";

/// Error type for database operations
#[derive(Debug, Error)]
pub enum DbError {
    /// Error from SeaORM
    #[error("Database error: {0}")]
    SeaOrmError(#[from] sea_orm::DbErr),
    /// Connection error
    #[error("Connection error: {0}")]
    ConnectionError(String),
    /// Query error
    #[error("Query error: {0}")]
    QueryError(String),
    /// A stored value could not be turned back into a domain value
    #[error("Decode error: {0}")]
    DecodeError(String),
}

impl From<CodecError> for DbError {
    fn from(err: CodecError) -> Self {
        DbError::DecodeError(err.to_string())
    }
}

/// Whether the error reports a unique constraint violation
pub fn is_duplicate_key(err: &sea_orm::DbErr) -> bool {
    if let Some(sea_orm::SqlErr::UniqueConstraintViolation(_)) = err.sql_err() {
        return true;
    }
    err.to_string().contains(DUPLICATE_KEY_MESSAGE)
}
