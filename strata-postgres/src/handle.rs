//! Database handle over a connection pool.

use strata_migrate::{CatalogFacts, DatabaseError, DatabaseHandle, DbResult, IntrospectionConfig};
use tracing::debug;

use crate::catalog::read_catalog;
use crate::error::PgResult;
use crate::pool::PgPool;

/// Runs migration statements and catalog queries against PostgreSQL.
#[derive(Clone)]
pub struct PgDatabase {
    pool: PgPool,
}

impl PgDatabase {
    /// Create a handle over `pool`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Get the pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn run(&self, statements: &[String], transaction: bool) -> PgResult<()> {
        let mut client = self.pool.get().await?;

        if transaction {
            let txn = client.transaction().await?;
            for statement in statements {
                debug!(sql = %statement, "Executing statement in transaction");
                txn.batch_execute(statement).await?;
            }
            txn.commit().await?;
        } else {
            // Each statement commits on its own; CONCURRENTLY and
            // ALTER TYPE ... ADD VALUE refuse to run inside a transaction block.
            for statement in statements {
                debug!(sql = %statement, "Executing statement");
                client.batch_execute(statement).await?;
            }
        }
        Ok(())
    }

    async fn read(&self, config: &IntrospectionConfig) -> PgResult<CatalogFacts> {
        let client = self.pool.get().await?;
        read_catalog(&client, &config.database_schema).await
    }
}

#[async_trait::async_trait]
impl DatabaseHandle for PgDatabase {
    async fn execute(&self, statements: &[String], transaction: bool) -> DbResult<()> {
        self.run(statements, transaction)
            .await
            .map_err(DatabaseError::from)
    }

    async fn introspect(&self, config: &IntrospectionConfig) -> DbResult<CatalogFacts> {
        self.read(config).await.map_err(DatabaseError::from)
    }
}
