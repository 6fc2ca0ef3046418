//! Table and column rename intent, and reconciliation of renamed objects.
//!
//! Renames cannot be inferred reliably from two snapshots, so they are
//! supplied explicitly (interactively or from a `renames.toml` file) and
//! threaded through diffing, generation and sorting.
//!
//! ```toml
//! [[tables]]
//! from = "public.users"
//! to = "public.accounts"
//!
//! [[columns."public.accounts"]]
//! from = "email"
//! to = "email_address"
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::dependency;
use crate::error::{MigrateResult, MigrationError};
use crate::naming::{self, ObjectKind, primary_key_name};
use crate::snapshot::{SchemaSnapshot, TableSnapshot};

/// Schema assumed for unqualified names.
pub const DEFAULT_SCHEMA: &str = "public";

/// A table rename, names qualified as `schema.table`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableRename {
    /// Current (remote) name.
    pub from: String,
    /// Desired (local) name.
    pub to: String,
}

impl TableRename {
    /// Create a table rename.
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
        }
    }
}

/// A column rename within one table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnRename {
    /// Current (remote) column name.
    pub from: String,
    /// Desired (local) column name.
    pub to: String,
}

/// Rename intent for one migration-generation run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RenameContext {
    /// Table renames in application order.
    #[serde(default)]
    pub tables: Vec<TableRename>,
    /// Column renames keyed by `schema.table`, using the desired table name.
    #[serde(default)]
    pub columns: BTreeMap<String, Vec<ColumnRename>>,
    /// When the file was last written.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<DateTime<Utc>>,
    /// Path the context was loaded from.
    #[serde(skip)]
    pub file_path: Option<PathBuf>,
}

impl RenameContext {
    /// Create an empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load renames from a TOML file; a missing file yields an empty context.
    pub async fn load(path: impl AsRef<Path>) -> MigrateResult<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Ok(Self {
                file_path: Some(path.to_path_buf()),
                ..Default::default()
            });
        }

        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            MigrationError::rename_file(format!("Failed to read rename file: {}", e))
        })?;

        let mut context: Self = toml::from_str(&content).map_err(|e| {
            MigrationError::rename_file(format!("Failed to parse rename file: {}", e))
        })?;

        context.file_path = Some(path.to_path_buf());
        Ok(context)
    }

    /// Save renames to a TOML file.
    pub async fn save(&self, path: impl AsRef<Path>) -> MigrateResult<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                MigrationError::rename_file(format!("Failed to create directory: {}", e))
            })?;
        }

        let mut context = self.clone();
        context.last_modified = Some(Utc::now());

        let content = toml::to_string_pretty(&context).map_err(|e| {
            MigrationError::rename_file(format!("Failed to serialize renames: {}", e))
        })?;

        let content = format!(
            "# Strata rename intent\n\
             # Consumed by the next `strata generate`; clear it once the migration is written\n\n\
             {}",
            content
        );

        tokio::fs::write(path, content).await.map_err(|e| {
            MigrationError::rename_file(format!("Failed to write rename file: {}", e))
        })?;

        Ok(())
    }

    /// Whether no renames are recorded.
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty() && self.columns.values().all(Vec::is_empty)
    }

    /// Record a table rename within `schema`.
    pub fn rename_table(&mut self, schema: &str, from: &str, to: &str) -> &mut Self {
        self.tables.push(TableRename::new(
            qualify(schema, from),
            qualify(schema, to),
        ));
        self
    }

    /// Record a column rename on the (desired) table `table` within `schema`.
    pub fn rename_column(&mut self, schema: &str, table: &str, from: &str, to: &str) -> &mut Self {
        self.columns
            .entry(qualify(schema, table))
            .or_default()
            .push(ColumnRename {
                from: from.to_string(),
                to: to.to_string(),
            });
        self
    }

    /// Unqualified `(from, to)` table pairs belonging to `schema`.
    pub fn table_pairs(&self, schema: &str) -> Vec<(String, String)> {
        self.tables
            .iter()
            .filter_map(|rename| {
                let (from_schema, from) = split_qualified(&rename.from);
                let (to_schema, to) = split_qualified(&rename.to);
                (from_schema == schema && to_schema == schema)
                    .then(|| (from.to_string(), to.to_string()))
            })
            .collect()
    }

    /// New name of a table currently called `old`.
    pub fn renamed_table(&self, schema: &str, old: &str) -> Option<String> {
        self.table_pairs(schema)
            .into_iter()
            .find(|(from, _)| from == old)
            .map(|(_, to)| to)
    }

    /// Previous name of a table now called `new`.
    pub fn previous_table(&self, schema: &str, new: &str) -> Option<String> {
        self.table_pairs(schema)
            .into_iter()
            .find(|(_, to)| to == new)
            .map(|(from, _)| from)
    }

    /// Column renames for the desired table `table`.
    pub fn column_pairs(&self, schema: &str, table: &str) -> &[ColumnRename] {
        self.columns
            .get(&qualify(schema, table))
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Previous name of column `column` of the desired table `table`.
    pub fn previous_column(&self, schema: &str, table: &str, column: &str) -> Option<&str> {
        self.column_pairs(schema, table)
            .iter()
            .find(|r| r.to == column)
            .map(|r| r.from.as_str())
    }
}

/// Join a schema and a name.
pub fn qualify(schema: &str, name: &str) -> String {
    format!("{}.{}", schema, name)
}

/// Split `schema.name`; unqualified names belong to [`DEFAULT_SCHEMA`].
pub fn split_qualified(name: &str) -> (&str, &str) {
    name.split_once('.').unwrap_or((DEFAULT_SCHEMA, name))
}

/// A column rename that applies to the snapshots being compared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedColumnRename {
    /// Desired table name.
    pub table: String,
    /// Current column name.
    pub from: String,
    /// Desired column name.
    pub to: String,
}

/// A generated object whose name changes because its table or columns were renamed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectRename {
    /// Desired table name.
    pub table: String,
    /// Kind of object.
    pub kind: ObjectKind,
    /// Current name.
    pub from: String,
    /// Name recomputed from the renamed definition.
    pub to: String,
}

/// Remote snapshot with renames applied.
#[derive(Debug, Clone)]
pub struct Reconciled {
    /// Remote snapshot expressed in desired names.
    pub snapshot: SchemaSnapshot,
    /// Table renames that apply, as `(from, to)`.
    pub table_renames: Vec<(String, String)>,
    /// Column renames that apply.
    pub column_renames: Vec<AppliedColumnRename>,
    /// Generated object names that change as a consequence.
    pub object_renames: Vec<ObjectRename>,
}

/// Rewrite `remote` in terms of the desired names.
///
/// A rename applies only when its source exists remotely, its target exists
/// locally and the target is not already taken remotely. Generated object
/// names are recomputed from the previous and the current name mapping; an
/// object whose current name matches the previous mapping is re-keyed under
/// the name the current mapping produces, so it diffs as present and renamed
/// instead of dropped and recreated.
pub fn reconcile(
    remote: &SchemaSnapshot,
    local: &SchemaSnapshot,
    renames: &RenameContext,
) -> Reconciled {
    let schema = remote.schema.as_str();

    let table_renames: Vec<(String, String)> = renames
        .table_pairs(schema)
        .into_iter()
        .filter(|(from, to)| {
            remote.tables.contains_key(from)
                && local.tables.contains_key(to)
                && !remote.tables.contains_key(to)
        })
        .collect();

    let new_table_name = |old: &str| -> String {
        table_renames
            .iter()
            .find(|(from, _)| from == old)
            .map(|(_, to)| to.clone())
            .unwrap_or_else(|| old.to_string())
    };

    let mut column_renames = Vec::new();
    for remote_table in remote.tables.values() {
        let table = new_table_name(&remote_table.name);
        let Some(local_table) = local.tables.get(&table) else {
            continue;
        };
        for rename in renames.column_pairs(schema, &table) {
            if remote_table.columns.contains_key(&rename.from)
                && local_table.columns.contains_key(&rename.to)
                && !remote_table.columns.contains_key(&rename.to)
            {
                column_renames.push(AppliedColumnRename {
                    table: table.clone(),
                    from: rename.from.clone(),
                    to: rename.to.clone(),
                });
            }
        }
    }

    let new_column_name = |table: &str, old: &str| -> String {
        column_renames
            .iter()
            .find(|r| r.table == table && r.from == old)
            .map(|r| r.to.clone())
            .unwrap_or_else(|| old.to_string())
    };
    let rename_columns = |table: &str, columns: &[String]| -> Vec<String> {
        columns.iter().map(|c| new_column_name(table, c)).collect()
    };

    let mut snapshot = SchemaSnapshot::new(schema);
    snapshot.enums = remote.enums.clone();
    let mut object_renames = Vec::new();

    for old in remote.tables.values() {
        let name = new_table_name(&old.name);
        let mut table = TableSnapshot::new(&name);
        let mut record = |kind: ObjectKind, from: &str, to: &str| {
            if from != to {
                object_renames.push(ObjectRename {
                    table: name.clone(),
                    kind,
                    from: from.to_string(),
                    to: to.to_string(),
                });
            }
        };

        for column in old.columns.values() {
            let mut column = column.clone();
            column.name = new_column_name(&name, &column.name);
            table.columns.insert(column.name.clone(), column);
        }

        if let Some(pk) = &old.primary_key {
            let mut pk = pk.clone();
            pk.columns = rename_columns(&name, &pk.columns);
            if pk.name == primary_key_name(&old.name) {
                let renamed = primary_key_name(&name);
                record(ObjectKind::PrimaryKey, &pk.name, &renamed);
                pk.name = renamed;
            }
            table.primary_key = Some(pk);
        }

        for fk in old.foreign_keys.values() {
            let previous = fk.definition();
            let mut fk = fk.clone();
            fk.columns = rename_columns(&name, &fk.columns);
            fk.referenced_table = new_table_name(&fk.referenced_table);
            fk.referenced_columns = rename_columns(&fk.referenced_table, &fk.referenced_columns);
            let changed = fk.definition() != previous;
            if let Some(renamed) = carry_name(
                &fk.name,
                &old.name,
                &name,
                ObjectKind::ForeignKey,
                changed,
                || fk.generated_name(&name),
            ) {
                record(ObjectKind::ForeignKey, &fk.name, &renamed);
                fk.name = renamed;
            }
            table.foreign_keys.insert(fk.name.clone(), fk);
        }

        for unique in old.uniques.values() {
            let previous = unique.definition();
            let mut unique = unique.clone();
            unique.columns = rename_columns(&name, &unique.columns);
            let changed = unique.definition() != previous;
            if let Some(renamed) = carry_name(
                &unique.name,
                &old.name,
                &name,
                ObjectKind::Unique,
                changed,
                || unique.generated_name(&name),
            ) {
                record(ObjectKind::Unique, &unique.name, &renamed);
                unique.name = renamed;
            }
            table.uniques.insert(unique.name.clone(), unique);
        }

        for check in old.checks.values() {
            let mut check = check.clone();
            if let Some(renamed) = carry_name(
                &check.name,
                &old.name,
                &name,
                ObjectKind::Check,
                false,
                || check.generated_name(&name),
            ) {
                record(ObjectKind::Check, &check.name, &renamed);
                check.name = renamed;
            }
            table.checks.insert(check.name.clone(), check);
        }

        for index in old.indexes.values() {
            let previous = index.definition();
            let mut index = index.clone();
            index.columns = rename_columns(&name, &index.columns);
            let changed = index.definition() != previous;
            if let Some(renamed) = carry_name(
                &index.name,
                &old.name,
                &name,
                ObjectKind::Index,
                changed,
                || index.generated_name(&name),
            ) {
                record(ObjectKind::Index, &index.name, &renamed);
                index.name = renamed;
            }
            table.indexes.insert(index.name.clone(), index);
        }

        for trigger in old.triggers.values() {
            let mut trigger = trigger.clone();
            if let Some(renamed) = carry_name(
                &trigger.name,
                &old.name,
                &name,
                ObjectKind::Trigger,
                false,
                || trigger.generated_name(&name),
            ) {
                record(ObjectKind::Trigger, &trigger.name, &renamed);
                trigger.name = renamed;
            }
            table.triggers.insert(trigger.name.clone(), trigger);
        }

        snapshot.tables.insert(name, table);
    }

    snapshot.table_priorities = dependency::topological_order(&snapshot);

    Reconciled {
        snapshot,
        table_renames,
        column_renames,
        object_renames,
    }
}

/// New name for an object generated on `old_table`, or `None` when the
/// object was named by hand.
///
/// The hash already in the name is carried over unless renamed columns or
/// tables changed the definition; the catalog's spelling of expressions
/// never matches the local one byte for byte, so it is not rehashed.
fn carry_name(
    name: &str,
    old_table: &str,
    new_table: &str,
    kind: ObjectKind,
    definition_changed: bool,
    regenerate: impl FnOnce() -> String,
) -> Option<String> {
    let hash = naming::generated_hash(name, old_table, kind)?;
    Some(if definition_changed {
        regenerate()
    } else {
        naming::object_name_with_hash(new_table, hash, kind)
    })
}
