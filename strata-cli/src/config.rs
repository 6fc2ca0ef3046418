//! CLI configuration handling.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use strata_migrate::MigrationConfig;

use crate::error::{CliError, CliResult};

/// Default config file name (lives in project root)
pub const CONFIG_FILE_NAME: &str = "strata.toml";

/// Default migrations directory (relative to project root)
pub const MIGRATIONS_DIR: &str = "migrations";

/// Default rename file name (relative to the migrations directory)
pub const RENAMES_FILE_NAME: &str = "renames.toml";

/// strata CLI configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Database configuration
    pub database: DatabaseConfig,

    /// Migration configuration
    pub migrations: MigrationsConfig,
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> CliResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Load configuration from `path`, falling back to defaults when the
    /// file does not exist.
    pub fn load_or_default(path: &Path) -> CliResult<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Database URL; `override_url` (from `DATABASE_URL` or the command
    /// line) wins over the file.
    pub fn database_url(&self, override_url: Option<&str>) -> CliResult<String> {
        override_url
            .map(String::from)
            .or_else(|| self.database.url.clone())
            .ok_or_else(|| {
                CliError::Config(
                    "no database URL; set DATABASE_URL or `url` under [database]".to_string(),
                )
            })
    }

    /// Engine configuration with paths resolved against `root`.
    pub fn migration_config(&self, root: &Path, dry_run: bool) -> MigrationConfig {
        let dir = root.join(&self.migrations.dir);
        let renames = self
            .migrations
            .renames
            .as_ref()
            .map(|path| root.join(path))
            .unwrap_or_else(|| dir.join(RENAMES_FILE_NAME));

        MigrationConfig::new()
            .migrations_dir(dir)
            .renames_file(renames)
            .dry_run(dry_run)
            .allow_data_loss(self.migrations.allow_data_loss)
            .rollback_on_failure(self.migrations.rollback_on_failure)
    }
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Database connection URL
    pub url: Option<String>,

    /// Schema holding the managed tables and the migration ledger
    pub schema: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            schema: strata_migrate::rename::DEFAULT_SCHEMA.to_string(),
        }
    }
}

/// Migration configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MigrationsConfig {
    /// Directory for migration files
    pub dir: PathBuf,

    /// Rename intent file; defaults to `renames.toml` in the migrations directory
    pub renames: Option<PathBuf>,

    /// Roll back already applied groups when a later group fails
    pub rollback_on_failure: bool,

    /// Write destructive changesets without `--force`
    pub allow_data_loss: bool,
}

impl Default for MigrationsConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from(MIGRATIONS_DIR),
            renames: None,
            rollback_on_failure: true,
            allow_data_loss: false,
        }
    }
}
