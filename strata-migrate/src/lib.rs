//! # strata-migrate
//!
//! Phase-aware schema migrations for PostgreSQL.
//!
//! This crate provides functionality for:
//! - Compiling an in-code schema description into a canonical snapshot
//! - Turning catalog facts read from a database into the same snapshot shape
//! - Structural diffing, with explicit table and column renames
//! - Reversible changesets from a closed set of generators
//! - Padding-aware column order for new tables
//! - Migration files grouped by expand/alter/data/contract phase
//! - Phased, group-wise application with rollback on failure
//! - Rollback planning to a named migration or to an empty ledger
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐     ┌────────────────┐     ┌──────────────┐
//! │ Local Schema │────▶│ Diff + Renames │────▶│ Generators   │
//! └──────────────┘     └────────────────┘     └──────────────┘
//!                              ▲                     │
//!                              │                     ▼
//!                      ┌────────────────┐     ┌──────────────┐
//!                      │ Catalog Facts  │     │ Sort + Files │
//!                      └────────────────┘     └──────────────┘
//!                                                    │
//!                                                    ▼
//!                      ┌────────────────┐     ┌──────────────┐
//!                      │ Ledger         │◀────│ Executor     │
//!                      └────────────────┘     └──────────────┘
//! ```
//!
//! The crate has no database driver. A [`DatabaseHandle`] executes
//! statements and reads the catalog; a [`MigrationLedger`] records outcomes.
//!
//! ## Example
//!
//! ```rust,ignore
//! use strata_migrate::{Column, MigrationConfig, MigrationEngine, PhaseSelection, Schema, Table};
//!
//! async fn run(db: impl DatabaseHandle, ledger: impl MigrationLedger) -> MigrateResult<()> {
//!     let schema = Schema::new("public").table(
//!         Table::new("users")
//!             .column(Column::new("id", "bigint").identity_always())
//!             .column(Column::new("email", "text").not_null())
//!             .primary_key(["id"]),
//!     );
//!
//!     let engine = MigrationEngine::new(MigrationConfig::new(), db, ledger);
//!     engine.initialize().await?;
//!
//!     let (plan, files) = engine.generate(&schema.compile()?, "add_users").await?;
//!     println!("{} ({} migrations)", plan.summary(), files.len());
//!
//!     engine.apply(PhaseSelection::All).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Migration Files
//!
//! ```text
//! migrations/
//! ├── expand/
//! │   └── 20240101120000-add_users.toml
//! ├── alter/
//! ├── data/
//! ├── contract/
//! └── renames.toml            # Rename intent for the next generate
//! ```

pub mod alignment;
pub mod changeset;
pub mod dependency;
pub mod diff;
pub mod engine;
pub mod error;
pub mod executor;
pub mod file;
pub mod generators;
pub mod history;
pub mod introspect;
pub mod migration;
pub mod naming;
pub mod rename;
pub mod rollback;
pub mod schema;
pub mod snapshot;
pub mod sql;

// Re-exports
pub use alignment::{AlignmentCatalog, TypeAlignment, align_columns};
pub use changeset::{Changeset, ChangesetType, ChangesetWarning, sort_changesets};
pub use dependency::{TableOrder, drop_order, sort_table_dependencies, topological_order};
pub use diff::{DiffKind, DiffPath, DiffValue, Difference, diff, diff_reconciled};
pub use engine::{GenerationPlan, MigrationConfig, MigrationEngine, MigrationStatus, PhaseStatus};
pub use error::{DatabaseError, DbResult, MigrateResult, MigrationError};
pub use executor::{ApplyReport, DatabaseHandle, MigrationExecutor, MigrationOutcome, MigrationRun};
pub use file::{MigrationFile, MigrationFileManager, plan_migration_files};
pub use generators::{Generator, GeneratorContext, generate_changesets};
pub use history::{
    LEDGER_TABLE, LedgerEntry, LedgerStatus, MemoryLedger, MigrationLedger, MigrationLock,
};
pub use introspect::{
    CatalogFacts, ColumnInfo, ConstraintInfo, ConstraintType, EnumInfo, IndexInfo,
    IntrospectionConfig, SnapshotBuilder, TableInfo, TriggerInfo,
};
pub use migration::{
    MigrationInfo, MigrationPhase, MigrationPlanGroup, PhaseSelection, RollbackTarget, plan_groups,
};
pub use rename::{ColumnRename, Reconciled, RenameContext, TableRename, reconcile};
pub use rollback::rollback_plan;
pub use schema::{Column, ForeignKey, Index, Schema, Table, Trigger, Unique};
pub use snapshot::{
    ColumnDefault, ColumnSnapshot, ForeignKeyAction, Identity, SchemaSnapshot, TableSnapshot,
    TriggerLevel, TriggerTiming,
};
pub use sql::PostgresSqlGenerator;
