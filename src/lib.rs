//! # strata
//!
//! Phase-aware, expand/contract schema migrations for PostgreSQL.
//!
//! strata provides:
//! - An in-code schema description compiled into a canonical snapshot
//! - Structural diffing against the live catalog, with explicit renames
//! - Reversible changesets sorted by dependency and priority
//! - Migration files split into expand, alter, data and contract phases
//! - Group-wise application with rollback on failure, and rollback planning
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use strata::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let schema = Schema::new("public").table(
//!         Table::new("users")
//!             .column(Column::new("id", "bigint").identity_always())
//!             .column(Column::new("email", "text").not_null())
//!             .primary_key(["id"]),
//!     );
//!
//!     let (db, ledger) = strata::postgres::connect("postgresql://localhost/mydb")?;
//!     let engine = MigrationEngine::new(MigrationConfig::new(), db, ledger);
//!     engine.initialize().await?;
//!
//!     let (plan, _files) = engine.generate(&schema.compile()?, "add_users").await?;
//!     println!("{}", plan.summary());
//!
//!     engine.apply(PhaseSelection::Phase(MigrationPhase::Expand)).await?;
//!     Ok(())
//! }
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

/// Schema diffing, changeset generation and migration execution.
pub mod migrate {
    pub use strata_migrate::*;
}

/// PostgreSQL database handle and ledger.
#[cfg(feature = "postgres")]
#[cfg_attr(docsrs, doc(cfg(feature = "postgres")))]
pub mod postgres {
    pub use strata_postgres::*;
}

/// Prelude module for convenient imports.
pub mod prelude {
    pub use strata_migrate::{
        ApplyReport, Column, DatabaseHandle, ForeignKey, ForeignKeyAction, GenerationPlan, Index,
        MigrateResult, MigrationConfig, MigrationEngine, MigrationError, MigrationLedger,
        MigrationOutcome, MigrationPhase, PhaseSelection, RenameContext, RollbackTarget, Schema,
        Table, Trigger, TriggerTiming, Unique,
    };

    #[cfg(feature = "postgres")]
    pub use strata_postgres::{PgConfig, PgDatabase, PgLedger, PgPool};
}

// Re-export key types at the crate root
pub use strata_migrate::{
    MigrateResult, MigrationConfig, MigrationEngine, MigrationError, MigrationPhase,
    PhaseSelection, Schema,
};
