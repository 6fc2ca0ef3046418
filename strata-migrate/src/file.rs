//! Migration file management.
//!
//! One TOML file per migration, grouped by phase:
//!
//! ```text
//! migrations/
//! ├── expand/
//! │   ├── 20240101120000-add_users.toml
//! │   └── 20240101120001-add_users-1.toml
//! ├── alter/
//! ├── data/
//! └── contract/
//! ```

use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::changeset::Changeset;
use crate::error::{MigrateResult, MigrationError};
use crate::migration::{MigrationInfo, MigrationPhase};

const TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";

/// A migration as stored on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationFile {
    /// Unique name, `<YYYYMMDDHHMMSS>-<description>`.
    pub name: String,
    /// Phase the migration belongs to.
    pub phase: MigrationPhase,
    /// Whether the migration runs inside a transaction.
    pub transaction: bool,
    /// Whether the migration is a hand-written scaffold.
    #[serde(default)]
    pub scaffold: bool,
    /// Migration written just before this one in the same run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub depends_on: Option<String>,
    /// Statements applying the migration.
    #[serde(default)]
    pub up: Vec<String>,
    /// Statements reverting the migration.
    #[serde(default)]
    pub down: Vec<String>,
    /// Where the migration was read from or written to.
    #[serde(skip)]
    pub path: PathBuf,
}

impl MigrationFile {
    /// Metadata of the migration.
    pub fn info(&self) -> MigrationInfo {
        MigrationInfo {
            name: self.name.clone(),
            phase: self.phase,
            transaction: self.transaction,
            scaffold: self.scaffold,
            depends_on: self.depends_on.clone(),
        }
    }

    /// File name of the migration.
    pub fn file_name(&self) -> String {
        format!("{}.toml", self.name)
    }
}

/// Split sorted changesets into migrations.
///
/// Phases are handled in application order. Within a phase each contiguous
/// run of transactional changesets becomes one migration and every
/// non-transactional changeset gets a migration of its own, so migrations
/// keep the sorted order. Each migration is stamped one second after the
/// previous one so file names sort in application order, and depends on the
/// migration before it.
pub fn plan_migration_files(
    description: &str,
    changesets: &[Changeset],
    start: DateTime<Utc>,
) -> Vec<MigrationFile> {
    let mut files: Vec<MigrationFile> = Vec::new();
    let mut stamp = start;
    let mut standalone = 0;

    for phase in MigrationPhase::ALL {
        let mut runs: Vec<Vec<&Changeset>> = Vec::new();
        for changeset in changesets.iter().filter(|c| c.phase == phase) {
            let joins_run =
                changeset.transaction && runs.last().is_some_and(|run| run[0].transaction);
            if !joins_run {
                runs.push(Vec::new());
            }
            if let Some(run) = runs.last_mut() {
                run.push(changeset);
            }
        }

        for members in runs {
            let timestamp = stamp.format(TIMESTAMP_FORMAT);
            stamp += Duration::seconds(1);

            let transaction = members[0].transaction;
            let name = if transaction {
                format!("{}-{}", timestamp, description)
            } else {
                standalone += 1;
                format!("{}-{}-{}", timestamp, description, standalone)
            };

            files.push(MigrationFile {
                name,
                phase,
                transaction,
                scaffold: false,
                depends_on: files.last().map(|f| f.name.clone()),
                up: members.iter().flat_map(|c| c.up.iter().cloned()).collect(),
                down: members
                    .iter()
                    .rev()
                    .flat_map(|c| c.down.iter().cloned())
                    .collect(),
                path: PathBuf::new(),
            });
        }
    }

    files
}

/// Migration file reader/writer.
#[derive(Debug, Clone)]
pub struct MigrationFileManager {
    /// Directory where migrations are stored.
    migrations_dir: PathBuf,
}

impl MigrationFileManager {
    /// Create a new file manager.
    pub fn new(migrations_dir: impl Into<PathBuf>) -> Self {
        Self {
            migrations_dir: migrations_dir.into(),
        }
    }

    /// Get the migrations directory.
    pub fn migrations_dir(&self) -> &Path {
        &self.migrations_dir
    }

    /// Directory holding migrations of `phase`.
    pub fn phase_dir(&self, phase: MigrationPhase) -> PathBuf {
        self.migrations_dir.join(phase.as_str())
    }

    /// Ensure the migrations directory and its phase directories exist.
    pub async fn ensure_dir(&self) -> MigrateResult<()> {
        for phase in MigrationPhase::ALL {
            tokio::fs::create_dir_all(self.phase_dir(phase))
                .await
                .map_err(MigrationError::Io)?;
        }
        Ok(())
    }

    /// List all migrations, sorted by name.
    pub async fn list_migrations(&self) -> MigrateResult<Vec<MigrationFile>> {
        let mut migrations = Vec::new();

        for phase in MigrationPhase::ALL {
            let dir = self.phase_dir(phase);
            if !dir.exists() {
                continue;
            }

            let mut entries = tokio::fs::read_dir(&dir).await.map_err(MigrationError::Io)?;
            while let Some(entry) = entries.next_entry().await.map_err(MigrationError::Io)? {
                let path = entry.path();
                if path.extension().is_some_and(|ext| ext == "toml") {
                    let migration = self.read_migration(&path).await?;
                    if migration.phase != phase {
                        return Err(MigrationError::invalid_migration(format!(
                            "{} declares phase '{}' but is stored under '{}'",
                            path.display(),
                            migration.phase,
                            phase
                        )));
                    }
                    migrations.push(migration);
                }
            }
        }

        migrations.sort_by(|a, b| a.name.cmp(&b.name));
        debug!(count = migrations.len(), dir = %self.migrations_dir.display(), "listed migrations");
        Ok(migrations)
    }

    /// Read one migration file.
    pub async fn read_migration(&self, path: &Path) -> MigrateResult<MigrationFile> {
        let stem = path
            .file_stem()
            .and_then(|n| n.to_str())
            .ok_or_else(|| MigrationError::invalid_migration("Invalid path"))?;
        parse_migration_name(stem)?;

        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(MigrationError::Io)?;
        let mut migration: MigrationFile = toml::from_str(&content).map_err(|e| {
            MigrationError::invalid_migration(format!("{}: {}", path.display(), e))
        })?;

        if migration.name != stem {
            return Err(MigrationError::invalid_migration(format!(
                "{} is named '{}' inside the file",
                path.display(),
                migration.name
            )));
        }

        migration.path = path.to_path_buf();
        Ok(migration)
    }

    /// Write a migration to its phase directory.
    pub async fn write_migration(&self, migration: &mut MigrationFile) -> MigrateResult<PathBuf> {
        let dir = self.phase_dir(migration.phase);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(MigrationError::Io)?;

        let content = toml::to_string_pretty(migration)
            .map_err(|e| MigrationError::invalid_migration(e.to_string()))?;
        let path = dir.join(migration.file_name());
        tokio::fs::write(&path, content)
            .await
            .map_err(MigrationError::Io)?;

        migration.path = path.clone();
        Ok(path)
    }

    /// Write sorted changesets as migrations named after `description`.
    pub async fn write_changesets(
        &self,
        description: &str,
        changesets: &[Changeset],
    ) -> MigrateResult<Vec<MigrationFile>> {
        validate_description(description)?;
        if changesets.is_empty() {
            return Err(MigrationError::NoChanges);
        }

        let mut files = plan_migration_files(description, changesets, Utc::now());
        for file in &mut files {
            self.write_migration(file).await?;
            info!(migration = %file.name, phase = %file.phase, transaction = file.transaction, "wrote migration");
        }
        Ok(files)
    }

    /// Write an empty data migration to be filled in by hand.
    pub async fn scaffold_data_migration(&self, description: &str) -> MigrateResult<MigrationFile> {
        validate_description(description)?;

        let mut file = MigrationFile {
            name: format!("{}-{}", Utc::now().format(TIMESTAMP_FORMAT), description),
            phase: MigrationPhase::Data,
            transaction: true,
            scaffold: true,
            depends_on: None,
            up: Vec::new(),
            down: Vec::new(),
            path: PathBuf::new(),
        };
        self.write_migration(&mut file).await?;
        info!(migration = %file.name, "scaffolded data migration");
        Ok(file)
    }
}

fn validate_description(description: &str) -> MigrateResult<()> {
    let valid = !description.is_empty()
        && description
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if valid {
        Ok(())
    } else {
        Err(MigrationError::invalid_migration(format!(
            "migration name '{}' may only contain letters, digits, '_' and '-'",
            description
        )))
    }
}

/// Split a migration name into its timestamp and description.
fn parse_migration_name(name: &str) -> MigrateResult<(&str, &str)> {
    let (id, description) = name.split_once('-').ok_or_else(|| {
        MigrationError::invalid_migration(format!("Invalid migration name format: {}", name))
    })?;

    if id.len() != 14 || !id.chars().all(|c| c.is_ascii_digit()) {
        return Err(MigrationError::invalid_migration(format!(
            "Invalid migration ID (expected timestamp): {}",
            id
        )));
    }

    Ok((id, description))
}
