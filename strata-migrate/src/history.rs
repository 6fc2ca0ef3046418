//! Migration ledger.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::{MigrateResult, MigrationError};
use crate::migration::{MigrationInfo, MigrationPhase};

/// Table holding the ledger.
pub const LEDGER_TABLE: &str = "strata_migrations";

/// Status of a migration in the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerStatus {
    /// Applied and committed.
    Executed,
    /// Its group failed.
    Failed,
    /// Part of an apply run that stopped before reaching it.
    NotExecuted,
    /// Applied, then rolled back.
    RolledBack,
}

impl LedgerStatus {
    /// Stored spelling.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Executed => "executed",
            Self::Failed => "failed",
            Self::NotExecuted => "not_executed",
            Self::RolledBack => "rolled_back",
        }
    }
}

impl fmt::Display for LedgerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LedgerStatus {
    type Err = MigrationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "executed" => Ok(Self::Executed),
            "failed" => Ok(Self::Failed),
            "not_executed" => Ok(Self::NotExecuted),
            "rolled_back" => Ok(Self::RolledBack),
            other => Err(MigrationError::invalid_migration(format!(
                "unknown ledger status '{}'",
                other
            ))),
        }
    }
}

/// One row of the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Migration name.
    pub name: String,
    /// Migration phase.
    pub phase: MigrationPhase,
    /// Current status.
    pub status: LedgerStatus,
    /// When the status was last written.
    pub updated_at: DateTime<Utc>,
}

impl LedgerEntry {
    /// Whether the migration counts as applied.
    pub fn is_executed(&self) -> bool {
        self.status == LedgerStatus::Executed
    }
}

/// Names of applied migrations, in execution order.
pub fn executed_names(entries: &[LedgerEntry]) -> Vec<&str> {
    entries
        .iter()
        .filter(|e| e.is_executed())
        .map(|e| e.name.as_str())
        .collect()
}

/// Persistent record of migration outcomes.
///
/// Implementations keep one entry per migration name; recording an outcome
/// for a known name replaces its status and moves it to the end of the
/// execution order.
#[async_trait::async_trait]
pub trait MigrationLedger: Send + Sync {
    /// Create the ledger table if needed.
    async fn initialize(&self) -> MigrateResult<()>;

    /// All entries in execution order.
    async fn entries(&self) -> MigrateResult<Vec<LedgerEntry>>;

    /// Record the outcome of a migration.
    async fn record(&self, migration: &MigrationInfo, status: LedgerStatus) -> MigrateResult<()>;

    /// Mark migrations as rolled back.
    async fn mark_rolled_back(&self, names: &[String]) -> MigrateResult<()>;

    /// Take the exclusive migration lock; released when the guard drops.
    async fn acquire_lock(&self) -> MigrateResult<MigrationLock>;
}

/// Exclusive migration lock.
pub struct MigrationLock {
    lock_id: i64,
    release_fn: Option<Box<dyn FnOnce() + Send>>,
}

impl MigrationLock {
    /// Create a lock guard that runs `release` when dropped.
    pub fn new(lock_id: i64, release: impl FnOnce() + Send + 'static) -> Self {
        Self {
            lock_id,
            release_fn: Some(Box::new(release)),
        }
    }

    /// Get the lock ID.
    pub fn id(&self) -> i64 {
        self.lock_id
    }
}

impl fmt::Debug for MigrationLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MigrationLock")
            .field("lock_id", &self.lock_id)
            .finish()
    }
}

impl Drop for MigrationLock {
    fn drop(&mut self) {
        if let Some(release) = self.release_fn.take() {
            release();
        }
    }
}

/// Ledger kept in process memory.
///
/// Useful for dry runs against a fresh database and for tests.
#[derive(Debug, Default)]
pub struct MemoryLedger {
    entries: Mutex<Vec<LedgerEntry>>,
    locked: std::sync::Arc<Mutex<bool>>,
}

impl MemoryLedger {
    /// Create an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Status of a migration, if it has an entry.
    pub fn status(&self, name: &str) -> Option<LedgerStatus> {
        self.entries
            .lock()
            .iter()
            .find(|e| e.name == name)
            .map(|e| e.status)
    }
}

#[async_trait::async_trait]
impl MigrationLedger for MemoryLedger {
    async fn initialize(&self) -> MigrateResult<()> {
        Ok(())
    }

    async fn entries(&self) -> MigrateResult<Vec<LedgerEntry>> {
        Ok(self.entries.lock().clone())
    }

    async fn record(&self, migration: &MigrationInfo, status: LedgerStatus) -> MigrateResult<()> {
        let mut entries = self.entries.lock();
        entries.retain(|e| e.name != migration.name);
        entries.push(LedgerEntry {
            name: migration.name.clone(),
            phase: migration.phase,
            status,
            updated_at: Utc::now(),
        });
        Ok(())
    }

    async fn mark_rolled_back(&self, names: &[String]) -> MigrateResult<()> {
        let now = Utc::now();
        for entry in self.entries.lock().iter_mut() {
            if names.contains(&entry.name) {
                entry.status = LedgerStatus::RolledBack;
                entry.updated_at = now;
            }
        }
        Ok(())
    }

    async fn acquire_lock(&self) -> MigrateResult<MigrationLock> {
        {
            let mut locked = self.locked.lock();
            if *locked {
                return Err(MigrationError::lock_failed("ledger is already locked"));
            }
            *locked = true;
        }
        let locked = std::sync::Arc::clone(&self.locked);
        Ok(MigrationLock::new(0, move || *locked.lock() = false))
    }
}
