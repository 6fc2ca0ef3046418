//! Migration engine implementation.

use std::path::PathBuf;
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::changeset::{Changeset, sort_changesets};
use crate::dependency::{TableOrder, drop_order, sort_table_dependencies};
use crate::diff::diff_reconciled;
use crate::error::{MigrateResult, MigrationError};
use crate::executor::{ApplyReport, DatabaseHandle, MigrationExecutor};
use crate::file::{MigrationFile, MigrationFileManager};
use crate::generators::{GeneratorContext, generate_changesets};
use crate::history::{LedgerEntry, LedgerStatus, MigrationLedger};
use crate::introspect::{IntrospectionConfig, SnapshotBuilder};
use crate::migration::{MigrationInfo, MigrationPhase, PhaseSelection, RollbackTarget};
use crate::rename::{RenameContext, reconcile};
use crate::snapshot::SchemaSnapshot;

/// Configuration for the migration engine.
#[derive(Debug, Clone)]
pub struct MigrationConfig {
    /// Path to the migrations directory.
    pub migrations_dir: PathBuf,
    /// Path to the rename intent file.
    pub renames_file: PathBuf,
    /// Whether to run in dry-run mode.
    pub dry_run: bool,
    /// Whether destructive changesets may be written without complaint.
    pub allow_data_loss: bool,
    /// Whether earlier groups are rolled back when a later group fails.
    pub rollback_on_failure: bool,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            migrations_dir: PathBuf::from("./migrations"),
            renames_file: PathBuf::from("./migrations/renames.toml"),
            dry_run: false,
            allow_data_loss: false,
            rollback_on_failure: true,
        }
    }
}

impl MigrationConfig {
    /// Create a new configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the migrations directory.
    pub fn migrations_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.migrations_dir = dir.into();
        self
    }

    /// Set the rename file path.
    pub fn renames_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.renames_file = path.into();
        self
    }

    /// Enable dry-run mode.
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Allow data loss operations.
    pub fn allow_data_loss(mut self, allow: bool) -> Self {
        self.allow_data_loss = allow;
        self
    }

    /// Set whether a failed apply rolls back the groups it already committed.
    pub fn rollback_on_failure(mut self, enabled: bool) -> Self {
        self.rollback_on_failure = enabled;
        self
    }
}

/// Sorted changesets turning the database into the desired schema.
#[derive(Debug, Default)]
pub struct GenerationPlan {
    /// Number of differences found.
    pub differences: usize,
    /// Changesets in application order.
    pub changesets: Vec<Changeset>,
    /// Human-readable warnings, one per warned changeset.
    pub warnings: Vec<String>,
}

impl GenerationPlan {
    /// Check if there's anything to generate.
    pub fn is_empty(&self) -> bool {
        self.changesets.is_empty()
    }

    /// Changesets that lose data when applied.
    pub fn destructive(&self) -> impl Iterator<Item = &Changeset> {
        self.changesets.iter().filter(|c| c.is_destructive())
    }

    /// Whether any changeset loses data.
    pub fn has_data_loss(&self) -> bool {
        self.destructive().next().is_some()
    }

    /// Changesets whose rollback leaves them in place.
    pub fn irreversible(&self) -> impl Iterator<Item = &Changeset> {
        self.changesets.iter().filter(|c| c.is_irreversible())
    }

    /// Get a summary of the plan.
    pub fn summary(&self) -> String {
        if self.changesets.is_empty() {
            return "No schema changes detected".to_string();
        }
        let mut parts = vec![format!(
            "{} changesets from {} differences",
            self.changesets.len(),
            self.differences
        )];
        let destructive = self.destructive().count();
        if destructive > 0 {
            parts.push(format!("{} destructive", destructive));
        }
        let irreversible = self.irreversible().count();
        if irreversible > 0 {
            parts.push(format!("{} irreversible", irreversible));
        }
        parts.join("; ")
    }
}

/// Executed and pending migrations of one phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseStatus {
    /// Phase.
    pub phase: MigrationPhase,
    /// Executed migrations, in execution order.
    pub executed: Vec<String>,
    /// Pending migrations, by name.
    pub pending: Vec<String>,
}

/// Migration status across all phases.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationStatus {
    /// One entry per phase, in application order.
    pub phases: Vec<PhaseStatus>,
    /// Migrations whose last recorded outcome is a failure.
    pub failed: Vec<String>,
}

impl MigrationStatus {
    /// Total number of pending migrations.
    pub fn pending_count(&self) -> usize {
        self.phases.iter().map(|p| p.pending.len()).sum()
    }

    /// Whether every migration on disk is executed.
    pub fn is_up_to_date(&self) -> bool {
        self.pending_count() == 0
    }
}

/// The main migration engine.
pub struct MigrationEngine<D: DatabaseHandle, L: MigrationLedger> {
    config: MigrationConfig,
    db: D,
    ledger: L,
    file_manager: MigrationFileManager,
}

impl<D: DatabaseHandle, L: MigrationLedger> MigrationEngine<D, L> {
    /// Create a new migration engine.
    pub fn new(config: MigrationConfig, db: D, ledger: L) -> Self {
        let file_manager = MigrationFileManager::new(&config.migrations_dir);
        Self {
            config,
            db,
            ledger,
            file_manager,
        }
    }

    /// Get the configuration.
    pub fn config(&self) -> &MigrationConfig {
        &self.config
    }

    /// Get the file manager.
    pub fn file_manager(&self) -> &MigrationFileManager {
        &self.file_manager
    }

    /// Get the database handle.
    pub fn database(&self) -> &D {
        &self.db
    }

    /// Get the ledger.
    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    /// Initialize the migration system.
    pub async fn initialize(&self) -> MigrateResult<()> {
        self.file_manager.ensure_dir().await?;
        self.ledger.initialize().await?;
        Ok(())
    }

    /// Load the rename intent file.
    pub async fn load_renames(&self) -> MigrateResult<RenameContext> {
        RenameContext::load(&self.config.renames_file).await
    }

    /// Compute the changesets turning the database into `local`.
    pub async fn plan(&self, local: &SchemaSnapshot) -> MigrateResult<GenerationPlan> {
        let introspection = IntrospectionConfig::new().database_schema(&local.schema);
        let facts = self.db.introspect(&introspection).await?;
        let remote = SnapshotBuilder::new(introspection).build(&facts)?;
        let alignments = facts.alignment_catalog();
        debug!(
            schema = %local.schema,
            remote_tables = remote.tables.len(),
            local_tables = local.tables.len(),
            "built snapshots"
        );

        let renames = self.load_renames().await?;
        let reconciled = reconcile(&remote, local, &renames);
        let diffs = diff_reconciled(&reconciled, local);
        info!(differences = diffs.len(), "diffed schema");

        let ctx = GeneratorContext::new(local, &reconciled, &alignments);
        let mut changesets = generate_changesets(&diffs, &ctx)?;

        let removed: Vec<String> = reconciled
            .snapshot
            .tables
            .keys()
            .filter(|name| !local.tables.contains_key(*name))
            .cloned()
            .collect();
        let order = TableOrder {
            order: sort_table_dependencies(
                &remote.table_priorities,
                &local.table_priorities,
                &renames,
                &local.schema,
            ),
            drops: drop_order(&remote, &removed),
        };
        sort_changesets(&mut changesets, &order);

        let warnings: Vec<String> = changesets
            .iter()
            .flat_map(|c| {
                let table = c.table_name.clone().unwrap_or_else(|| local.schema.clone());
                c.warnings
                    .iter()
                    .map(move |w| format!("{} ({}): {}", c.changeset_type, table, w))
            })
            .collect();

        let plan = GenerationPlan {
            differences: diffs.len(),
            changesets,
            warnings,
        };
        if plan.has_data_loss() && !self.config.allow_data_loss {
            warn!(
                destructive = plan.destructive().count(),
                "plan drops data; set allow_data_loss to accept"
            );
        }
        Ok(plan)
    }

    /// Write a plan as migration files named after `description`.
    ///
    /// Returns the migrations that were (or, in dry-run mode, would be)
    /// written. A plan that drops data is refused unless the configuration
    /// allows data loss.
    pub async fn write(
        &self,
        description: &str,
        plan: &GenerationPlan,
    ) -> MigrateResult<Vec<MigrationFile>> {
        if plan.has_data_loss() && !self.config.allow_data_loss {
            let changesets: Vec<String> = plan
                .destructive()
                .map(|c| match &c.table_name {
                    Some(table) => format!("{} ({})", c.changeset_type, table),
                    None => c.changeset_type.to_string(),
                })
                .collect();
            return Err(MigrationError::DataLoss {
                count: changesets.len(),
                changesets,
            });
        }
        if self.config.dry_run {
            return Ok(crate::file::plan_migration_files(
                description,
                &plan.changesets,
                chrono::Utc::now(),
            ));
        }
        self.file_manager
            .write_changesets(description, &plan.changesets)
            .await
    }

    /// Plan and write migrations for `local`.
    pub async fn generate(
        &self,
        local: &SchemaSnapshot,
        description: &str,
    ) -> MigrateResult<(GenerationPlan, Vec<MigrationFile>)> {
        let start = Instant::now();
        let plan = self.plan(local).await?;
        let files = self.write(description, &plan).await?;
        info!(
            changesets = plan.changesets.len(),
            migrations = files.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "generated migrations"
        );
        Ok((plan, files))
    }

    /// Write an empty data migration to be filled in by hand.
    pub async fn scaffold(&self, description: &str) -> MigrateResult<MigrationFile> {
        self.file_manager.scaffold_data_migration(description).await
    }

    /// Apply pending migrations of the selected phases.
    pub async fn apply(&self, selection: PhaseSelection) -> MigrateResult<ApplyReport> {
        let start = Instant::now();
        let migrations = self.file_manager.list_migrations().await?;
        let report = self.executor().apply(&migrations, selection).await?;
        info!(
            requested = %selection,
            groups = report.groups.len(),
            success = report.is_success(),
            duration_ms = start.elapsed().as_millis() as u64,
            "apply finished"
        );
        Ok(report)
    }

    /// Roll back down to `target`, inclusive.
    pub async fn rollback(&self, target: &RollbackTarget) -> MigrateResult<ApplyReport> {
        let migrations = self.file_manager.list_migrations().await?;
        let report = self.executor().rollback(&migrations, target).await?;
        info!(
            target = %target,
            groups = report.groups.len(),
            success = report.is_success(),
            "rollback finished"
        );
        Ok(report)
    }

    /// Roll back the last `count` executed migrations.
    ///
    /// Returns an empty report when nothing is executed.
    pub async fn rollback_last(&self, count: usize) -> MigrateResult<ApplyReport> {
        let executed = self.executed().await?;
        match RollbackTarget::last(count, &executed) {
            Some(target) => self.rollback(&target).await,
            None => Ok(ApplyReport::default()),
        }
    }

    /// Executed migrations in execution order.
    pub async fn executed(&self) -> MigrateResult<Vec<MigrationInfo>> {
        let entries = self.ledger.entries().await?;
        Ok(entries
            .iter()
            .filter(|e| e.is_executed())
            .map(|e| MigrationInfo::new(e.name.clone(), e.phase))
            .collect())
    }

    /// Executed and pending migrations per phase.
    pub async fn status(&self) -> MigrateResult<MigrationStatus> {
        let migrations = self.file_manager.list_migrations().await?;
        let entries = self.ledger.entries().await?;
        Ok(status_of(&migrations, &entries))
    }

    fn executor(&self) -> MigrationExecutor<'_, D, L> {
        MigrationExecutor::new(&self.db, &self.ledger)
            .rollback_on_failure(self.config.rollback_on_failure)
            .dry_run(self.config.dry_run)
    }
}

fn status_of(migrations: &[MigrationFile], entries: &[LedgerEntry]) -> MigrationStatus {
    let phases = MigrationPhase::ALL
        .into_iter()
        .map(|phase| {
            let executed: Vec<String> = entries
                .iter()
                .filter(|e| e.phase == phase && e.is_executed())
                .map(|e| e.name.clone())
                .collect();
            let pending = migrations
                .iter()
                .filter(|m| m.phase == phase && !executed.contains(&m.name))
                .map(|m| m.name.clone())
                .collect();
            PhaseStatus {
                phase,
                executed,
                pending,
            }
        })
        .collect();

    let failed = entries
        .iter()
        .filter(|e| e.status == LedgerStatus::Failed)
        .map(|e| e.name.clone())
        .collect();

    MigrationStatus { phases, failed }
}
