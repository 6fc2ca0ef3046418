//! Error types for the migration engine.

use thiserror::Error;

use crate::migration::MigrationPhase;

/// Result type alias for migration operations.
pub type MigrateResult<T> = Result<T, MigrationError>;

/// Result type alias for database handle operations.
pub type DbResult<T> = Result<T, DatabaseError>;

/// Failure reported by a database handle.
///
/// The handle never retries; the kind tells the caller whether retrying
/// could make sense.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DatabaseError {
    /// A statement or catalog query was rejected by the server.
    #[error("query error: {0}")]
    Query(String),

    /// The connection could not be established or was lost.
    #[error("connection error: {0}")]
    Connection(String),
}

impl DatabaseError {
    /// Create a query error.
    pub fn query(msg: impl Into<String>) -> Self {
        Self::Query(msg.into())
    }

    /// Create a connection error.
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    /// Check if this is a connection error.
    pub fn is_connection_error(&self) -> bool {
        matches!(self, Self::Connection(_))
    }
}

/// Errors that can occur during migration operations.
#[derive(Debug, Error)]
pub enum MigrationError {
    /// File system error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Database operation error.
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    /// The in-code schema description is invalid.
    #[error("Schema error: {0}")]
    Schema(String),

    /// Invalid migration file or format.
    #[error("Invalid migration: {0}")]
    InvalidMigration(String),

    /// Pending migrations in an earlier phase block the requested phase.
    #[error("Cannot apply {requested} migrations: pending migrations in phase(s) {}", format_phases(.blocking))]
    PendingPhases {
        /// Requested phase selection.
        requested: String,
        /// Phases with pending migrations.
        blocking: Vec<MigrationPhase>,
    },

    /// A difference record was not claimed by any changeset generator.
    #[error("No changeset generator for difference at {0}")]
    UnclassifiedDifference(String),

    /// The requested change cannot be expressed as DDL.
    #[error("Unsupported change: {0}")]
    UnsupportedChange(String),

    /// Replaying a down migration failed while recovering from a failure.
    #[error("Rollback of '{migration}' failed: {source}")]
    RollbackFailed {
        /// First migration of the group being rolled back.
        migration: String,
        /// Underlying database failure.
        source: DatabaseError,
    },

    /// Migration not found.
    #[error("Migration '{0}' not found")]
    NotFound(String),

    /// Lock acquisition failed.
    #[error("Failed to acquire migration lock: {0}")]
    LockFailed(String),

    /// The plan drops data and data loss is not allowed.
    #[error("Refusing to write {count} destructive changesets: {}", .changesets.join(", "))]
    DataLoss {
        /// Number of destructive changesets.
        count: usize,
        /// `<changeset type> (<table>)` of each destructive changeset.
        changesets: Vec<String>,
    },

    /// No changes to migrate.
    #[error("No schema changes detected")]
    NoChanges,

    /// Rename file error.
    #[error("Rename file error: {0}")]
    RenameFile(String),
}

fn format_phases(phases: &[MigrationPhase]) -> String {
    phases
        .iter()
        .map(|p| p.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

impl MigrationError {
    /// Create a schema error.
    pub fn schema(msg: impl Into<String>) -> Self {
        Self::Schema(msg.into())
    }

    /// Create an invalid migration error.
    pub fn invalid_migration(msg: impl Into<String>) -> Self {
        Self::InvalidMigration(msg.into())
    }

    /// Create an unsupported change error.
    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::UnsupportedChange(msg.into())
    }

    /// Create a lock failed error.
    pub fn lock_failed(msg: impl Into<String>) -> Self {
        Self::LockFailed(msg.into())
    }

    /// Create a rename file error.
    pub fn rename_file(msg: impl Into<String>) -> Self {
        Self::RenameFile(msg.into())
    }

    /// Check if this is a recoverable error.
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::LockFailed(_) | Self::NoChanges => true,
            Self::Database(err) => err.is_connection_error(),
            _ => false,
        }
    }
}
