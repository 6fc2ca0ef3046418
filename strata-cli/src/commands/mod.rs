//! CLI command implementations.

pub mod apply;
pub mod generate;
pub mod rollback;
pub mod scaffold;
pub mod status;

use std::path::{Path, PathBuf};

use strata_migrate::{
    ApplyReport, MigrationConfig, MigrationEngine, MigrationFileManager, MigrationOutcome,
    MigrationPlanGroup,
};
use strata_postgres::{PgConfig, PgDatabase, PgLedger, PgPool};

use crate::cli::Cli;
use crate::config::Config;
use crate::error::CliResult;
use crate::output;

/// Engine over a live PostgreSQL database.
pub type PgEngine = MigrationEngine<PgDatabase, PgLedger>;

/// Settings shared by every command.
#[derive(Debug, Clone)]
pub struct Context {
    /// Loaded configuration file.
    pub config: Config,
    /// Directory relative paths in the configuration resolve against.
    pub root: PathBuf,
    /// URL given on the command line or through `DATABASE_URL`.
    pub database_url: Option<String>,
    /// Plan only.
    pub dry_run: bool,
}

impl Context {
    /// Load the configuration named by `cli`.
    pub fn load(cli: &Cli) -> CliResult<Self> {
        let config = Config::load_or_default(&cli.config)?;
        let root = match cli.config.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        Ok(Self {
            config,
            root,
            database_url: cli.database_url.clone(),
            dry_run: cli.dry_run,
        })
    }

    /// Migrations directory.
    pub fn migrations_dir(&self) -> PathBuf {
        self.root.join(&self.config.migrations.dir)
    }

    /// File manager for commands that never touch the database.
    pub fn file_manager(&self) -> MigrationFileManager {
        MigrationFileManager::new(self.migrations_dir())
    }

    /// Connect to the configured database.
    ///
    /// The pool is lazy; the first query opens the connection.
    pub fn engine(&self) -> CliResult<PgEngine> {
        self.engine_with(|config| config)
    }

    /// Connect with the migration configuration adjusted by `configure`.
    pub fn engine_with(
        &self,
        configure: impl FnOnce(MigrationConfig) -> MigrationConfig,
    ) -> CliResult<PgEngine> {
        let url = self.config.database_url(self.database_url.as_deref())?;
        let pg_config = PgConfig::from_url(url)?.with_schema(&self.config.database.schema);
        let pool = PgPool::new(pg_config)?;

        Ok(MigrationEngine::new(
            configure(self.config.migration_config(&self.root, self.dry_run)),
            PgDatabase::new(pool.clone()),
            PgLedger::new(pool),
        ))
    }
}

/// Print the plan groups of a dry run.
pub(crate) fn print_groups(groups: &[MigrationPlanGroup]) {
    for (i, group) in groups.iter().enumerate() {
        let mode = if group.transaction {
            "transaction"
        } else {
            "no transaction"
        };
        output::section(&format!("Group {} ({})", i + 1, mode));
        for name in &group.migrations {
            output::list_item(name);
        }
    }
}

/// Print per-migration outcomes of a run.
pub(crate) fn print_results(report: &ApplyReport) {
    for run in &report.results {
        let outcome = run.outcome.to_string();
        let styled = match run.outcome {
            MigrationOutcome::Success => output::style_success(&outcome),
            MigrationOutcome::Error => output::style_error(&outcome),
            MigrationOutcome::NotExecuted | MigrationOutcome::RolledBack => {
                output::style_pending(&outcome)
            }
        };
        output::list_item(&format!("{} [{}] {}", run.name, run.phase, styled));
    }
}

/// Show `path` relative to `root` when possible.
pub(crate) fn display_path(path: &Path, root: &Path) -> String {
    path.strip_prefix(root).unwrap_or(path).display().to_string()
}
