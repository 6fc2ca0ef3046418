//! Migration ledger stored in the target schema.

use chrono::{DateTime, Utc};
use deadpool_postgres::Object;
use strata_migrate::sql::quote_ident;
use strata_migrate::{
    LEDGER_TABLE, LedgerEntry, LedgerStatus, MigrateResult, MigrationError, MigrationInfo,
    MigrationLedger, MigrationLock, MigrationPhase,
};
use tracing::{debug, warn};

use crate::error::{PgError, PgResult};
use crate::pool::PgPool;

/// Advisory lock key shared by every strata process.
pub const LOCK_ID: i64 = 0x7374_7261_7461;

const LOCK_SQL: &str = "SELECT pg_try_advisory_lock($1)";
const UNLOCK_SQL: &str = "SELECT pg_advisory_unlock($1)";

/// Ledger row as stored.
struct LedgerRow {
    name: String,
    phase: String,
    status: String,
    updated_at: DateTime<Utc>,
}

impl LedgerRow {
    /// An unreadable row fails the whole read; skipping it would shorten the
    /// executed history.
    fn into_entry(self) -> MigrateResult<LedgerEntry> {
        let unreadable = |field: &str, value: &str| {
            MigrationError::invalid_migration(format!(
                "ledger row '{}' has unknown {} '{}'",
                self.name, field, value
            ))
        };
        let phase = self
            .phase
            .parse::<MigrationPhase>()
            .map_err(|_| unreadable("phase", &self.phase))?;
        let status = self
            .status
            .parse::<LedgerStatus>()
            .map_err(|_| unreadable("status", &self.status))?;
        Ok(LedgerEntry {
            name: self.name,
            phase,
            status,
            updated_at: self.updated_at,
        })
    }
}

/// Ledger over the `strata_migrations` table.
#[derive(Clone)]
pub struct PgLedger {
    pool: PgPool,
    table: String,
}

impl PgLedger {
    /// Create a ledger in the pool's target schema.
    pub fn new(pool: PgPool) -> Self {
        let table = format!(
            "{}.{}",
            quote_ident(&pool.config().schema),
            quote_ident(LEDGER_TABLE)
        );
        Self { pool, table }
    }

    /// Qualified ledger table name.
    pub fn table(&self) -> &str {
        &self.table
    }

    fn create_table_sql(&self) -> String {
        format!(
            "CREATE TABLE IF NOT EXISTS {} (\n    \
                 position BIGSERIAL NOT NULL,\n    \
                 name TEXT PRIMARY KEY,\n    \
                 phase TEXT NOT NULL,\n    \
                 status TEXT NOT NULL,\n    \
                 updated_at TIMESTAMPTZ NOT NULL DEFAULT now()\n\
             )",
            self.table
        )
    }

    async fn try_rows(&self) -> PgResult<Vec<LedgerRow>> {
        let client = self.pool.get().await?;
        let sql = format!(
            "SELECT name, phase, status, updated_at FROM {} ORDER BY position",
            self.table
        );
        let rows = client.query(&sql, &[]).await?;

        rows.iter()
            .map(|row| -> PgResult<LedgerRow> {
                Ok(LedgerRow {
                    name: row.try_get(0)?,
                    phase: row.try_get(1)?,
                    status: row.try_get(2)?,
                    updated_at: row.try_get(3)?,
                })
            })
            .collect()
    }

    async fn try_record(&self, migration: &MigrationInfo, status: LedgerStatus) -> PgResult<()> {
        let mut client = self.pool.get().await?;
        let txn = client.transaction().await?;
        txn.execute(
            &format!("DELETE FROM {} WHERE name = $1", self.table),
            &[&migration.name],
        )
        .await?;
        txn.execute(
            &format!(
                "INSERT INTO {} (name, phase, status) VALUES ($1, $2, $3)",
                self.table
            ),
            &[&migration.name, &migration.phase.as_str(), &status.as_str()],
        )
        .await?;
        txn.commit().await?;
        debug!(migration = %migration.name, %status, "recorded ledger entry");
        Ok(())
    }

    async fn try_mark_rolled_back(&self, names: &[String]) -> PgResult<()> {
        let client = self.pool.get().await?;
        let sql = format!(
            "UPDATE {} SET status = $1, updated_at = now() WHERE name = ANY($2)",
            self.table
        );
        client
            .execute(&sql, &[&LedgerStatus::RolledBack.as_str(), &names])
            .await?;
        Ok(())
    }

    async fn try_lock(&self) -> PgResult<Option<Object>> {
        let client = self.pool.get().await?;
        let acquired: bool = client.query_one(LOCK_SQL, &[&LOCK_ID]).await?.try_get(0)?;
        Ok(acquired.then_some(client))
    }
}

#[async_trait::async_trait]
impl MigrationLedger for PgLedger {
    async fn initialize(&self) -> MigrateResult<()> {
        let client = self.pool.get().await?;
        client.batch_execute(&self.create_table_sql()).await.map_err(PgError::from)?;
        Ok(())
    }

    async fn entries(&self) -> MigrateResult<Vec<LedgerEntry>> {
        self.try_rows()
            .await?
            .into_iter()
            .map(LedgerRow::into_entry)
            .collect()
    }

    async fn record(&self, migration: &MigrationInfo, status: LedgerStatus) -> MigrateResult<()> {
        Ok(self.try_record(migration, status).await?)
    }

    async fn mark_rolled_back(&self, names: &[String]) -> MigrateResult<()> {
        Ok(self.try_mark_rolled_back(names).await?)
    }

    /// The lock lives on a dedicated session taken out of the pool; dropping
    /// the guard unlocks it, or closes the session when no runtime is left.
    async fn acquire_lock(&self) -> MigrateResult<MigrationLock> {
        let Some(client) = self.try_lock().await? else {
            return Err(MigrationError::lock_failed(
                "another migration run holds the lock",
            ));
        };
        debug!(lock_id = LOCK_ID, "acquired migration lock");

        Ok(MigrationLock::new(LOCK_ID, move || {
            match tokio::runtime::Handle::try_current() {
                Ok(runtime) => {
                    runtime.spawn(async move {
                        if let Err(e) = client.execute(UNLOCK_SQL, &[&LOCK_ID]).await {
                            warn!(error = %e, "failed to release migration lock");
                        }
                    });
                }
                Err(_) => drop(Object::take(client)),
            }
        }))
    }
}
