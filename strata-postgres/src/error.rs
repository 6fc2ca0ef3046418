//! Error types for PostgreSQL operations.

use strata_migrate::{DatabaseError, MigrationError};
use thiserror::Error;

/// Result type for PostgreSQL operations.
pub type PgResult<T> = Result<T, PgError>;

/// Errors that can occur during PostgreSQL operations.
#[derive(Error, Debug)]
pub enum PgError {
    /// Connection pool error.
    #[error("pool error: {0}")]
    Pool(#[from] deadpool_postgres::PoolError),

    /// PostgreSQL error.
    #[error("postgres error: {0}")]
    Postgres(#[from] tokio_postgres::Error),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Catalog row that cannot be turned into a fact.
    #[error("catalog error: {0}")]
    Catalog(String),
}

impl PgError {
    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a catalog error.
    pub fn catalog(message: impl Into<String>) -> Self {
        Self::Catalog(message.into())
    }

    /// Check if this is a connection error.
    ///
    /// Errors carrying a SQLSTATE were reported by the server and are query
    /// errors; everything else from the driver means the session is gone.
    pub fn is_connection_error(&self) -> bool {
        match self {
            Self::Pool(_) | Self::Config(_) => true,
            Self::Postgres(e) => e.code().is_none(),
            Self::Catalog(_) => false,
        }
    }
}

impl From<PgError> for DatabaseError {
    fn from(err: PgError) -> Self {
        if err.is_connection_error() {
            DatabaseError::connection(err.to_string())
        } else {
            DatabaseError::query(err.to_string())
        }
    }
}

impl From<PgError> for MigrationError {
    fn from(err: PgError) -> Self {
        MigrationError::Database(err.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        assert!(PgError::config("invalid URL").is_connection_error());
        assert!(!PgError::catalog("bad typalign").is_connection_error());

        let db: DatabaseError = PgError::config("missing host").into();
        assert!(db.is_connection_error());

        let db: DatabaseError = PgError::catalog("bad typalign").into();
        assert_eq!(db, DatabaseError::query("catalog error: bad typalign"));
    }

    #[test]
    fn test_into_migration_error() {
        let err: MigrationError = PgError::config("missing host").into();
        assert!(err.is_recoverable());
    }
}
