//! CLI argument definitions using clap.

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use strata_migrate::{MigrationPhase, PhaseSelection};

use crate::config::CONFIG_FILE_NAME;

/// strata - phase-aware schema migrations for PostgreSQL
#[derive(Parser, Debug)]
#[command(name = "strata")]
#[command(version)]
#[command(about = "strata - phase-aware schema migrations for PostgreSQL", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to the configuration file
    #[arg(short, long, global = true, default_value = CONFIG_FILE_NAME)]
    pub config: PathBuf,

    /// Database connection URL (overrides the configuration file)
    #[arg(long, global = true, env = "DATABASE_URL")]
    pub database_url: Option<String>,

    /// Compute and print the plan without touching the database or disk
    #[arg(long, global = true)]
    pub dry_run: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Generate migrations from the registered schema
    Generate(GenerateArgs),

    /// Apply pending migrations
    Apply(ApplyArgs),

    /// Roll back executed migrations
    Rollback(RollbackArgs),

    /// Show executed and pending migrations per phase
    Status,

    /// Write an empty data migration to fill in by hand
    Scaffold(ScaffoldArgs),
}

/// Arguments for the `generate` command
#[derive(Args, Debug)]
pub struct GenerateArgs {
    /// Description used in the migration names
    #[arg(default_value = "migration")]
    pub name: String,

    /// Write destructive changesets even when data loss is not allowed
    #[arg(short, long)]
    pub force: bool,
}

/// Arguments for the `apply` command
#[derive(Args, Debug)]
pub struct ApplyArgs {
    /// Phase to apply
    #[arg(short, long, value_enum, default_value_t = PhaseArg::All)]
    pub phase: PhaseArg,
}

/// Phase selection on the command line
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseArg {
    Expand,
    Alter,
    Data,
    Contract,
    All,
}

impl From<PhaseArg> for PhaseSelection {
    fn from(arg: PhaseArg) -> Self {
        match arg {
            PhaseArg::Expand => PhaseSelection::Phase(MigrationPhase::Expand),
            PhaseArg::Alter => PhaseSelection::Phase(MigrationPhase::Alter),
            PhaseArg::Data => PhaseSelection::Phase(MigrationPhase::Data),
            PhaseArg::Contract => PhaseSelection::Phase(MigrationPhase::Contract),
            PhaseArg::All => PhaseSelection::All,
        }
    }
}

/// Arguments for the `rollback` command
#[derive(Args, Debug)]
pub struct RollbackArgs {
    /// Number of migrations to roll back
    #[arg(default_value_t = 1, conflicts_with_all = ["to", "all"])]
    pub count: usize,

    /// Roll back this migration and everything executed after it
    #[arg(long, conflicts_with = "all")]
    pub to: Option<String>,

    /// Roll back every executed migration
    #[arg(long)]
    pub all: bool,
}

/// Arguments for the `scaffold` command
#[derive(Args, Debug)]
pub struct ScaffoldArgs {
    /// Description used in the migration name
    pub name: String,
}
