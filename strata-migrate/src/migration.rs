//! Migration phases, persisted migration metadata and plan groups.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::MigrationError;

/// Expand/contract phase a migration belongs to.
///
/// Phases are applied in declaration order: additive changes first, then
/// in-place alterations, then data backfills, then removals.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum MigrationPhase {
    /// Additive, backward-compatible changes.
    Expand,
    /// Renames and in-place alterations.
    Alter,
    /// Hand-written data migrations.
    Data,
    /// Removals.
    Contract,
}

impl MigrationPhase {
    /// All phases in application order.
    pub const ALL: [MigrationPhase; 4] = [Self::Expand, Self::Alter, Self::Data, Self::Contract];

    /// Lowercase name, also used as the migration subdirectory.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Expand => "expand",
            Self::Alter => "alter",
            Self::Data => "data",
            Self::Contract => "contract",
        }
    }
}

impl fmt::Display for MigrationPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MigrationPhase {
    type Err = MigrationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "expand" => Ok(Self::Expand),
            "alter" => Ok(Self::Alter),
            "data" => Ok(Self::Data),
            "contract" => Ok(Self::Contract),
            other => Err(MigrationError::invalid_migration(format!(
                "unknown phase '{}'",
                other
            ))),
        }
    }
}

/// Which migrations an apply run covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PhaseSelection {
    /// Only migrations of one phase.
    Phase(MigrationPhase),
    /// Every pending migration, phase by phase.
    All,
}

impl PhaseSelection {
    /// Phases that must have no pending migrations before this selection runs.
    pub fn prerequisites(&self) -> &'static [MigrationPhase] {
        match self {
            Self::Phase(MigrationPhase::Alter) => &[MigrationPhase::Expand],
            Self::Phase(MigrationPhase::Data) | Self::Phase(MigrationPhase::Contract) => {
                &[MigrationPhase::Expand, MigrationPhase::Alter]
            }
            Self::Phase(MigrationPhase::Expand) | Self::All => &[],
        }
    }

    /// Whether a migration of `phase` is part of this selection.
    pub fn includes(&self, phase: MigrationPhase) -> bool {
        match self {
            Self::Phase(selected) => *selected == phase,
            Self::All => true,
        }
    }
}

impl fmt::Display for PhaseSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Phase(phase) => fmt::Display::fmt(phase, f),
            Self::All => f.write_str("all"),
        }
    }
}

impl FromStr for PhaseSelection {
    type Err = MigrationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("all") {
            Ok(Self::All)
        } else {
            s.parse().map(Self::Phase)
        }
    }
}

/// Persisted migration metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationInfo {
    /// Unique name, `<YYYYMMDDHHMMSS>-<description>`.
    pub name: String,
    /// Phase the migration belongs to.
    pub phase: MigrationPhase,
    /// Whether the migration runs inside a transaction.
    pub transaction: bool,
    /// Whether the migration is a hand-written scaffold.
    pub scaffold: bool,
    /// Migration written just before this one in the same run.
    pub depends_on: Option<String>,
}

impl MigrationInfo {
    /// Create transactional, non-scaffold migration metadata.
    pub fn new(name: impl Into<String>, phase: MigrationPhase) -> Self {
        Self {
            name: name.into(),
            phase,
            transaction: true,
            scaffold: false,
            depends_on: None,
        }
    }

    /// Mark the migration as running outside a transaction.
    pub fn without_transaction(mut self) -> Self {
        self.transaction = false;
        self
    }
}

/// Where a rollback stops.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RollbackTarget {
    /// Roll back this migration and every migration executed after it.
    Migration(String),
    /// Roll back everything.
    NoMigrations,
}

impl RollbackTarget {
    /// Target that rolls back the last `count` of `executed` (in execution order).
    ///
    /// Returns `None` when there is nothing to roll back.
    pub fn last(count: usize, executed: &[MigrationInfo]) -> Option<Self> {
        if count == 0 || executed.is_empty() {
            return None;
        }
        if count >= executed.len() {
            return Some(Self::NoMigrations);
        }
        Some(Self::Migration(
            executed[executed.len() - count].name.clone(),
        ))
    }
}

impl fmt::Display for RollbackTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Migration(name) => f.write_str(name),
            Self::NoMigrations => f.write_str("NO_MIGRATIONS"),
        }
    }
}

/// A contiguous run of migrations applied (and rolled back) as one unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationPlanGroup {
    /// Last migration of the group: applying the group migrates up to it.
    pub up: String,
    /// Rolling the group back returns to the state before this target.
    pub down: RollbackTarget,
    /// Whether the group runs inside one transaction.
    pub transaction: bool,
    /// Migrations of the group in order.
    pub migrations: Vec<String>,
}

impl MigrationPlanGroup {
    fn from_run(run: &[&MigrationInfo]) -> Option<Self> {
        let first = run.first()?;
        let last = run.last()?;
        Some(Self {
            up: last.name.clone(),
            down: RollbackTarget::Migration(first.name.clone()),
            transaction: run.iter().all(|m| m.transaction),
            migrations: run.iter().map(|m| m.name.clone()).collect(),
        })
    }
}

/// Partition migrations into plan groups.
///
/// A migration with `transaction = false` always forms a group of its
/// own; consecutive transactional migrations share one group.
pub fn plan_groups(migrations: &[MigrationInfo]) -> Vec<MigrationPlanGroup> {
    let mut groups = Vec::new();
    let mut run: Vec<&MigrationInfo> = Vec::new();

    for migration in migrations {
        if migration.transaction {
            run.push(migration);
            continue;
        }
        groups.extend(MigrationPlanGroup::from_run(&run));
        run.clear();
        groups.extend(MigrationPlanGroup::from_run(&[migration]));
    }
    groups.extend(MigrationPlanGroup::from_run(&run));

    groups
}
