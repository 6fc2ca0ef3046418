//! Phased migration executor.
//!
//! Pending migrations are split into plan groups and applied strictly in
//! order, one [`DatabaseHandle::execute`] call per group. A failing group
//! stops the run; earlier groups are rolled back when the executor is
//! configured to do so.

use std::collections::{HashMap, HashSet};
use std::fmt;

use tracing::{info, warn};

use crate::error::{DbResult, MigrateResult, MigrationError};
use crate::file::MigrationFile;
use crate::history::{LedgerStatus, MigrationLedger, executed_names};
use crate::introspect::{CatalogFacts, IntrospectionConfig};
use crate::migration::{
    MigrationInfo, MigrationPhase, MigrationPlanGroup, PhaseSelection, RollbackTarget, plan_groups,
};
use crate::rollback::rollback_plan;

/// The database as seen by the migration core.
#[async_trait::async_trait]
pub trait DatabaseHandle: Send + Sync {
    /// Run `statements` in order; inside one transaction when `transaction`
    /// is set, otherwise each on its own.
    async fn execute(&self, statements: &[String], transaction: bool) -> DbResult<()>;

    /// Read catalog facts for one schema.
    async fn introspect(&self, config: &IntrospectionConfig) -> DbResult<CatalogFacts>;
}

/// What happened to one migration during a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MigrationOutcome {
    /// Applied (or, during a rollback run, reverted) and committed.
    Success,
    /// Its group failed.
    Error,
    /// The run stopped before reaching it.
    NotExecuted,
    /// Applied, then rolled back after a later group failed.
    RolledBack,
}

impl fmt::Display for MigrationOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Success => "success",
            Self::Error => "error",
            Self::NotExecuted => "not executed",
            Self::RolledBack => "rolled back",
        };
        f.write_str(s)
    }
}

/// Outcome of one migration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationRun {
    /// Migration name.
    pub name: String,
    /// Migration phase.
    pub phase: MigrationPhase,
    /// What happened.
    pub outcome: MigrationOutcome,
}

/// Result of an apply or rollback run.
#[derive(Debug, Default)]
pub struct ApplyReport {
    /// Planned groups in execution order.
    pub groups: Vec<MigrationPlanGroup>,
    /// Per-migration outcomes, in plan order. Empty for dry runs.
    pub results: Vec<MigrationRun>,
    /// The failure that stopped the run, if any.
    pub error: Option<MigrationError>,
}

impl ApplyReport {
    /// Whether every planned migration ran.
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    /// Whether there was nothing to do.
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Names of migrations with `outcome`.
    pub fn with_outcome(&self, outcome: MigrationOutcome) -> Vec<&str> {
        self.results
            .iter()
            .filter(|r| r.outcome == outcome)
            .map(|r| r.name.as_str())
            .collect()
    }
}

/// Applies and rolls back migrations through a database handle and a ledger.
pub struct MigrationExecutor<'a, D: DatabaseHandle, L: MigrationLedger> {
    db: &'a D,
    ledger: &'a L,
    rollback_on_failure: bool,
    dry_run: bool,
}

impl<'a, D: DatabaseHandle, L: MigrationLedger> MigrationExecutor<'a, D, L> {
    /// Create an executor that rolls back on failure.
    pub fn new(db: &'a D, ledger: &'a L) -> Self {
        Self {
            db,
            ledger,
            rollback_on_failure: true,
            dry_run: false,
        }
    }

    /// Set whether earlier groups are rolled back when a group fails.
    pub fn rollback_on_failure(mut self, enabled: bool) -> Self {
        self.rollback_on_failure = enabled;
        self
    }

    /// Only compute plans.
    pub fn dry_run(mut self, enabled: bool) -> Self {
        self.dry_run = enabled;
        self
    }

    /// Apply the pending migrations selected by `selection`.
    ///
    /// Fails without issuing SQL when an earlier phase still has pending
    /// migrations. Execution failures do not fail the call: they are
    /// reported in [`ApplyReport::error`] along with every outcome.
    pub async fn apply(
        &self,
        migrations: &[MigrationFile],
        selection: PhaseSelection,
    ) -> MigrateResult<ApplyReport> {
        let _lock = self.lock().await?;

        let entries = self.ledger.entries().await?;
        let executed: HashSet<&str> = executed_names(&entries).into_iter().collect();

        let mut pending: Vec<&MigrationFile> = migrations
            .iter()
            .filter(|m| !executed.contains(m.name.as_str()))
            .collect();
        pending.sort_by(|a, b| (a.phase, &a.name).cmp(&(b.phase, &b.name)));

        let blocking: Vec<MigrationPhase> = selection
            .prerequisites()
            .iter()
            .copied()
            .filter(|phase| pending.iter().any(|m| m.phase == *phase))
            .collect();
        if !blocking.is_empty() {
            warn!(requested = %selection, ?blocking, "pending migrations in earlier phases");
            return Err(MigrationError::PendingPhases {
                requested: selection.to_string(),
                blocking,
            });
        }

        let selected: Vec<&MigrationFile> = pending
            .into_iter()
            .filter(|m| selection.includes(m.phase))
            .collect();
        let infos: Vec<MigrationInfo> = selected.iter().map(|m| m.info()).collect();
        let groups = plan_groups(&infos);
        info!(requested = %selection, migrations = infos.len(), groups = groups.len(), "planned apply");

        let mut report = ApplyReport {
            groups,
            ..ApplyReport::default()
        };
        if self.dry_run || report.groups.is_empty() {
            return Ok(report);
        }

        let by_name: HashMap<&str, &MigrationFile> =
            selected.iter().map(|m| (m.name.as_str(), *m)).collect();
        let mut applied: Vec<&MigrationPlanGroup> = Vec::new();

        for (index, group) in report.groups.iter().enumerate() {
            let files = group_files(group, &by_name)?;
            let statements: Vec<String> = files.iter().flat_map(|m| m.up.iter().cloned()).collect();

            let failure = match self.db.execute(&statements, group.transaction).await {
                Ok(()) => {
                    // Committed: from here on the group is undone on rollback
                    // even if recording it fails.
                    applied.push(group);
                    report
                        .results
                        .extend(files.iter().map(|m| run(m, MigrationOutcome::Success)));
                    match self.record_all(&files, LedgerStatus::Executed).await {
                        Ok(()) => {
                            info!(group = %group.up, migrations = files.len(), "applied group");
                            continue;
                        }
                        Err(err) => {
                            warn!(group = %group.up, error = %err, "failed to record applied group");
                            err
                        }
                    }
                }
                Err(err) => {
                    warn!(group = %group.up, error = %err, "group failed");
                    self.record_after_failure(&files, LedgerStatus::Failed).await;
                    report
                        .results
                        .extend(files.iter().map(|m| run(m, MigrationOutcome::Error)));
                    MigrationError::Database(err)
                }
            };

            for later in &report.groups[index + 1..] {
                let files = group_files(later, &by_name)?;
                self.record_after_failure(&files, LedgerStatus::NotExecuted).await;
                report
                    .results
                    .extend(files.iter().map(|m| run(m, MigrationOutcome::NotExecuted)));
            }
            report.error = Some(failure);
            break;
        }

        if report.error.is_some() && self.rollback_on_failure {
            for group in applied.iter().rev() {
                let files = group_files(group, &by_name)?;
                self.db
                    .execute(&down_statements(&files), group.transaction)
                    .await
                    .map_err(|source| MigrationError::RollbackFailed {
                        migration: group.down.to_string(),
                        source,
                    })?;
                if let Err(err) = self.ledger.mark_rolled_back(&group.migrations).await {
                    warn!(group = %group.up, error = %err, "failed to record rolled back group");
                }
                info!(group = %group.up, down = %group.down, "rolled back group");
                for result in report
                    .results
                    .iter_mut()
                    .filter(|r| group.migrations.contains(&r.name))
                {
                    result.outcome = MigrationOutcome::RolledBack;
                }
            }
        }

        Ok(report)
    }

    /// Roll back executed migrations down to `target`, inclusive.
    pub async fn rollback(
        &self,
        migrations: &[MigrationFile],
        target: &RollbackTarget,
    ) -> MigrateResult<ApplyReport> {
        let _lock = self.lock().await?;

        let by_name: HashMap<&str, &MigrationFile> =
            migrations.iter().map(|m| (m.name.as_str(), m)).collect();
        let entries = self.ledger.entries().await?;
        let executed = executed_names(&entries)
            .into_iter()
            .map(|name| {
                by_name
                    .get(name)
                    .map(|m| m.info())
                    .ok_or_else(|| MigrationError::NotFound(name.to_string()))
            })
            .collect::<MigrateResult<Vec<_>>>()?;

        let groups = rollback_plan(&executed, target)?;
        info!(target = %target, groups = groups.len(), "planned rollback");

        let mut report = ApplyReport {
            groups,
            ..ApplyReport::default()
        };
        if self.dry_run {
            return Ok(report);
        }

        for (index, group) in report.groups.iter().enumerate() {
            let files = group_files(group, &by_name)?;
            let failure = match self.db.execute(&down_statements(&files), group.transaction).await {
                Ok(()) => {
                    report
                        .results
                        .extend(files.iter().rev().map(|m| run(m, MigrationOutcome::Success)));
                    match self.ledger.mark_rolled_back(&group.migrations).await {
                        Ok(()) => {
                            info!(group = %group.up, down = %group.down, "rolled back group");
                            continue;
                        }
                        Err(err) => {
                            warn!(group = %group.up, error = %err, "failed to record rolled back group");
                            err
                        }
                    }
                }
                Err(err) => {
                    warn!(group = %group.up, error = %err, "rollback failed");
                    report
                        .results
                        .extend(files.iter().rev().map(|m| run(m, MigrationOutcome::Error)));
                    MigrationError::Database(err)
                }
            };

            for later in &report.groups[index + 1..] {
                let files = group_files(later, &by_name)?;
                report
                    .results
                    .extend(files.iter().rev().map(|m| run(m, MigrationOutcome::NotExecuted)));
            }
            report.error = Some(failure);
            break;
        }

        Ok(report)
    }

    async fn record_all(&self, files: &[&MigrationFile], status: LedgerStatus) -> MigrateResult<()> {
        for file in files {
            self.ledger.record(&file.info(), status).await?;
        }
        Ok(())
    }

    /// Bookkeeping after a failure; the failure itself is already reported.
    async fn record_after_failure(&self, files: &[&MigrationFile], status: LedgerStatus) {
        if let Err(err) = self.record_all(files, status).await {
            warn!(%status, error = %err, "failed to record migration outcome");
        }
    }

    async fn lock(&self) -> MigrateResult<Option<crate::history::MigrationLock>> {
        if self.dry_run {
            return Ok(None);
        }
        self.ledger.acquire_lock().await.map(Some)
    }
}

/// Down statements of a group, latest migration first.
fn down_statements(files: &[&MigrationFile]) -> Vec<String> {
    files
        .iter()
        .rev()
        .flat_map(|m| m.down.iter().cloned())
        .collect()
}

fn run(file: &MigrationFile, outcome: MigrationOutcome) -> MigrationRun {
    MigrationRun {
        name: file.name.clone(),
        phase: file.phase,
        outcome,
    }
}

fn group_files<'m>(
    group: &MigrationPlanGroup,
    by_name: &HashMap<&str, &'m MigrationFile>,
) -> MigrateResult<Vec<&'m MigrationFile>> {
    group
        .migrations
        .iter()
        .map(|name| {
            by_name
                .get(name.as_str())
                .copied()
                .ok_or_else(|| MigrationError::NotFound(name.clone()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DatabaseError;
    use crate::history::MemoryLedger;
    use parking_lot::Mutex;
    use std::path::PathBuf;

    /// Records executed statements; fails any batch containing `fail_on`.
    #[derive(Default)]
    struct FakeDb {
        executed: Mutex<Vec<(Vec<String>, bool)>>,
        fail_on: Vec<String>,
    }

    impl FakeDb {
        fn failing(statement: &str) -> Self {
            Self {
                fail_on: vec![statement.to_string()],
                ..Self::default()
            }
        }

        fn batches(&self) -> Vec<Vec<String>> {
            self.executed.lock().iter().map(|(s, _)| s.clone()).collect()
        }
    }

    #[async_trait::async_trait]
    impl DatabaseHandle for FakeDb {
        async fn execute(&self, statements: &[String], transaction: bool) -> DbResult<()> {
            if statements.iter().any(|s| self.fail_on.contains(s)) {
                return Err(crate::error::DatabaseError::query("boom"));
            }
            self.executed.lock().push((statements.to_vec(), transaction));
            Ok(())
        }

        async fn introspect(&self, _config: &IntrospectionConfig) -> DbResult<CatalogFacts> {
            Ok(CatalogFacts::default())
        }
    }

    /// Memory ledger that cannot record `name` as executed.
    struct BrokenLedger {
        inner: MemoryLedger,
        name: String,
    }

    impl BrokenLedger {
        fn rejecting(name: &str) -> Self {
            Self {
                inner: MemoryLedger::new(),
                name: name.to_string(),
            }
        }
    }

    #[async_trait::async_trait]
    impl MigrationLedger for BrokenLedger {
        async fn initialize(&self) -> MigrateResult<()> {
            self.inner.initialize().await
        }

        async fn entries(&self) -> MigrateResult<Vec<crate::history::LedgerEntry>> {
            self.inner.entries().await
        }

        async fn record(&self, migration: &MigrationInfo, status: LedgerStatus) -> MigrateResult<()> {
            if migration.name == self.name && status == LedgerStatus::Executed {
                return Err(MigrationError::Database(
                    crate::error::DatabaseError::connection("ledger unavailable"),
                ));
            }
            self.inner.record(migration, status).await
        }

        async fn mark_rolled_back(&self, names: &[String]) -> MigrateResult<()> {
            self.inner.mark_rolled_back(names).await
        }

        async fn acquire_lock(&self) -> MigrateResult<crate::history::MigrationLock> {
            self.inner.acquire_lock().await
        }
    }

    fn migration(name: &str, phase: MigrationPhase, transaction: bool) -> MigrationFile {
        MigrationFile {
            name: name.to_string(),
            phase,
            transaction,
            scaffold: false,
            depends_on: None,
            up: vec![format!("up {}", name)],
            down: vec![format!("down {}", name)],
            path: PathBuf::new(),
        }
    }

    fn three_groups() -> Vec<MigrationFile> {
        vec![
            migration("m1", MigrationPhase::Expand, true),
            migration("m2", MigrationPhase::Expand, true),
            migration("m3", MigrationPhase::Expand, false),
            migration("m4", MigrationPhase::Expand, true),
        ]
    }

    #[tokio::test]
    async fn test_apply_groups_transactional_runs() {
        let db = FakeDb::default();
        let ledger = MemoryLedger::new();
        let report = MigrationExecutor::new(&db, &ledger)
            .apply(&three_groups(), PhaseSelection::All)
            .await
            .unwrap();

        assert!(report.is_success());
        assert_eq!(report.groups.len(), 3);
        assert_eq!(
            db.executed.lock().clone(),
            vec![
                (vec!["up m1".to_string(), "up m2".to_string()], true),
                (vec!["up m3".to_string()], false),
                (vec!["up m4".to_string()], true),
            ]
        );
        assert_eq!(
            report.with_outcome(MigrationOutcome::Success),
            vec!["m1", "m2", "m3", "m4"]
        );
        assert_eq!(ledger.status("m4"), Some(LedgerStatus::Executed));
    }

    #[tokio::test]
    async fn test_nothing_pending_is_empty_success() {
        let db = FakeDb::default();
        let ledger = MemoryLedger::new();
        let executor = MigrationExecutor::new(&db, &ledger);
        executor.apply(&three_groups(), PhaseSelection::All).await.unwrap();

        let report = executor.apply(&three_groups(), PhaseSelection::All).await.unwrap();
        assert!(report.is_empty());
        assert!(report.results.is_empty());
        assert!(report.is_success());
    }

    #[tokio::test]
    async fn test_phase_gating_issues_no_sql() {
        let db = FakeDb::default();
        let ledger = MemoryLedger::new();
        let migrations = vec![
            migration("m1", MigrationPhase::Expand, true),
            migration("m2", MigrationPhase::Alter, true),
        ];

        let err = MigrationExecutor::new(&db, &ledger)
            .apply(&migrations, PhaseSelection::Phase(MigrationPhase::Alter))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            MigrationError::PendingPhases { ref blocking, .. } if blocking == &[MigrationPhase::Expand]
        ));
        assert!(db.batches().is_empty());
        assert!(ledger.entries().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_partial_failure_without_rollback_keeps_committed_groups() {
        let db = FakeDb::failing("up m3");
        let ledger = MemoryLedger::new();
        let report = MigrationExecutor::new(&db, &ledger)
            .rollback_on_failure(false)
            .apply(&three_groups(), PhaseSelection::All)
            .await
            .unwrap();

        assert!(!report.is_success());
        assert_eq!(report.with_outcome(MigrationOutcome::Success), vec!["m1", "m2"]);
        assert_eq!(report.with_outcome(MigrationOutcome::Error), vec!["m3"]);
        assert_eq!(report.with_outcome(MigrationOutcome::NotExecuted), vec!["m4"]);

        let entries = ledger.entries().await.unwrap();
        assert_eq!(executed_names(&entries), vec!["m1", "m2"]);
        assert_eq!(ledger.status("m4"), Some(LedgerStatus::NotExecuted));
    }

    #[tokio::test]
    async fn test_partial_failure_rolls_back_earlier_groups() {
        let db = FakeDb::failing("up m3");
        let ledger = MemoryLedger::new();
        let report = MigrationExecutor::new(&db, &ledger)
            .apply(&three_groups(), PhaseSelection::All)
            .await
            .unwrap();

        assert_eq!(report.with_outcome(MigrationOutcome::RolledBack), vec!["m1", "m2"]);
        assert_eq!(report.with_outcome(MigrationOutcome::Error), vec!["m3"]);
        assert_eq!(
            db.batches().last().unwrap(),
            &vec!["down m2".to_string(), "down m1".to_string()]
        );
        assert!(executed_names(&ledger.entries().await.unwrap()).is_empty());
    }

    #[tokio::test]
    async fn test_unrecorded_group_is_reported_and_rolled_back() {
        let db = FakeDb::default();
        let ledger = BrokenLedger::rejecting("m3");
        let report = MigrationExecutor::new(&db, &ledger)
            .apply(&three_groups(), PhaseSelection::All)
            .await
            .unwrap();

        assert!(matches!(
            report.error,
            Some(MigrationError::Database(DatabaseError::Connection(_)))
        ));
        assert_eq!(
            report.with_outcome(MigrationOutcome::RolledBack),
            vec!["m1", "m2", "m3"]
        );
        assert_eq!(report.with_outcome(MigrationOutcome::NotExecuted), vec!["m4"]);
        // The committed group is undone before the earlier one.
        let batches = db.batches();
        assert_eq!(batches[batches.len() - 2], vec!["down m3".to_string()]);
        assert_eq!(
            batches[batches.len() - 1],
            vec!["down m2".to_string(), "down m1".to_string()]
        );
        assert!(!batches.contains(&vec!["up m4".to_string()]));

        let entries = ledger.entries().await.unwrap();
        assert!(executed_names(&entries).is_empty());
        assert_eq!(ledger.inner.status("m4"), Some(LedgerStatus::NotExecuted));
    }

    #[tokio::test]
    async fn test_unrecorded_group_without_rollback_stops_run() {
        let db = FakeDb::default();
        let ledger = BrokenLedger::rejecting("m3");
        let report = MigrationExecutor::new(&db, &ledger)
            .rollback_on_failure(false)
            .apply(&three_groups(), PhaseSelection::All)
            .await
            .unwrap();

        assert!(!report.is_success());
        assert_eq!(
            report.with_outcome(MigrationOutcome::Success),
            vec!["m1", "m2", "m3"]
        );
        assert_eq!(report.with_outcome(MigrationOutcome::NotExecuted), vec!["m4"]);
        assert_eq!(db.batches().len(), 2);
    }

    #[tokio::test]
    async fn test_failed_recovery_is_fatal() {
        let db = FakeDb {
            fail_on: vec!["up m3".to_string(), "down m1".to_string()],
            ..FakeDb::default()
        };
        let ledger = MemoryLedger::new();
        let err = MigrationExecutor::new(&db, &ledger)
            .apply(&three_groups(), PhaseSelection::All)
            .await
            .unwrap_err();
        assert!(matches!(err, MigrationError::RollbackFailed { ref migration, .. } if migration == "m1"));
    }

    #[tokio::test]
    async fn test_apply_all_runs_phases_in_order() {
        let db = FakeDb::default();
        let ledger = MemoryLedger::new();
        let migrations = vec![
            migration("20240101000000-a", MigrationPhase::Contract, true),
            migration("20240101000001-b", MigrationPhase::Expand, true),
            migration("20240101000002-c", MigrationPhase::Alter, false),
        ];

        let report = MigrationExecutor::new(&db, &ledger)
            .apply(&migrations, PhaseSelection::All)
            .await
            .unwrap();
        let order: Vec<&str> = report.results.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(order, vec!["20240101000001-b", "20240101000002-c", "20240101000000-a"]);
    }

    #[tokio::test]
    async fn test_rollback_to_named_migration() {
        let db = FakeDb::default();
        let ledger = MemoryLedger::new();
        let executor = MigrationExecutor::new(&db, &ledger);
        executor.apply(&three_groups(), PhaseSelection::All).await.unwrap();

        let report = executor
            .rollback(&three_groups(), &RollbackTarget::Migration("m3".into()))
            .await
            .unwrap();

        assert_eq!(report.with_outcome(MigrationOutcome::Success), vec!["m4", "m3"]);
        assert_eq!(
            executed_names(&ledger.entries().await.unwrap()),
            vec!["m1", "m2"]
        );
    }

    #[tokio::test]
    async fn test_dry_run_touches_nothing() {
        let db = FakeDb::default();
        let ledger = MemoryLedger::new();
        let report = MigrationExecutor::new(&db, &ledger)
            .dry_run(true)
            .apply(&three_groups(), PhaseSelection::All)
            .await
            .unwrap();

        assert_eq!(report.groups.len(), 3);
        assert!(report.results.is_empty());
        assert!(db.batches().is_empty());
        assert!(ledger.entries().await.unwrap().is_empty());
    }
}
