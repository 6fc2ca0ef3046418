//! Changeset generators.
//!
//! Every [`Difference`] is claimed by exactly one [`Generator`]. The
//! generators form a closed set; [`Generator::CHAIN`] lists them in the
//! order they are tried and the first one whose `(kind, path)` pattern
//! matches wins. A difference no generator claims is a defect and fails
//! the run.

mod column;
mod constraint;
mod enums;
mod index;
mod table;
mod trigger;

use tracing::debug;

use crate::alignment::AlignmentCatalog;
use crate::changeset::Changeset;
use crate::diff::{DiffKind, DiffPath, Difference};
use crate::error::{MigrateResult, MigrationError};
use crate::rename::{AppliedColumnRename, Reconciled};
use crate::snapshot::SchemaSnapshot;
use crate::sql::PostgresSqlGenerator;

/// Everything a generator may consult besides the difference itself.
pub struct GeneratorContext<'a> {
    /// Desired snapshot.
    pub local: &'a SchemaSnapshot,
    /// Current snapshot, expressed in desired names.
    pub remote: &'a SchemaSnapshot,
    /// Applied table renames as `(from, to)`.
    pub table_renames: &'a [(String, String)],
    /// Applied column renames.
    pub column_renames: &'a [AppliedColumnRename],
    /// Type alignment facts.
    pub alignments: &'a AlignmentCatalog,
    /// DDL builder for the snapshot's schema.
    pub sql: PostgresSqlGenerator,
}

impl<'a> GeneratorContext<'a> {
    /// Build a context from a reconciled remote snapshot.
    pub fn new(
        local: &'a SchemaSnapshot,
        reconciled: &'a Reconciled,
        alignments: &'a AlignmentCatalog,
    ) -> Self {
        Self {
            local,
            remote: &reconciled.snapshot,
            table_renames: &reconciled.table_renames,
            column_renames: &reconciled.column_renames,
            alignments,
            sql: PostgresSqlGenerator::new(&local.schema),
        }
    }

    /// Name a table has before this run's renames are applied.
    pub fn current_table<'n>(&'n self, table: &'n str) -> &'n str {
        self.table_renames
            .iter()
            .find(|(_, to)| to == table)
            .map_or(table, |(from, _)| from.as_str())
    }

    /// Name a column has before this run's renames are applied.
    pub fn current_column<'n>(&'n self, table: &str, column: &'n str) -> &'n str {
        self.column_renames
            .iter()
            .find(|r| r.table == table && r.to == column)
            .map_or(column, |r| r.from.as_str())
    }

    /// Current names of `columns` of `table`.
    pub fn current_columns(&self, table: &str, columns: &[String]) -> Vec<String> {
        columns
            .iter()
            .map(|c| self.current_column(table, c).to_string())
            .collect()
    }

    /// Whether the table already exists in the database.
    pub fn table_exists(&self, table: &str) -> bool {
        self.remote.tables.contains_key(table)
    }

    /// Whether the primary key of an existing table is replaced or removed.
    pub fn primary_key_changes(&self, table: &str) -> bool {
        let remote = self.remote.table(table).map(|t| &t.primary_key);
        let local = self.local.table(table).map(|t| &t.primary_key);
        matches!((remote, local), (Some(r), l) if Some(r) != l)
    }
}

/// The closed set of changeset generators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Generator {
    EnumCreate,
    EnumDrop,
    EnumValues,
    TableCreate,
    TableDrop,
    TableRename,
    ColumnCreate,
    ColumnDrop,
    ColumnRename,
    ColumnDataType,
    ColumnNullable,
    ColumnDefaultAdd,
    ColumnDefaultDrop,
    ColumnDefaultChange,
    ColumnIdentityAdd,
    ColumnIdentityDrop,
    ColumnIdentityChange,
    PrimaryKeyCreate,
    PrimaryKeyDrop,
    ForeignKeyCreate,
    ForeignKeyDrop,
    UniqueCreate,
    UniqueDrop,
    CheckCreate,
    CheckDrop,
    IndexCreate,
    IndexDrop,
    TriggerCreate,
    TriggerDrop,
    ObjectRename,
}

impl Generator {
    /// Generators in the order they are tried.
    pub const CHAIN: [Generator; 30] = [
        Self::EnumCreate,
        Self::EnumDrop,
        Self::EnumValues,
        Self::TableRename,
        Self::TableCreate,
        Self::TableDrop,
        Self::ColumnRename,
        Self::ColumnCreate,
        Self::ColumnDrop,
        Self::ColumnDataType,
        Self::ColumnNullable,
        Self::ColumnDefaultAdd,
        Self::ColumnDefaultDrop,
        Self::ColumnDefaultChange,
        Self::ColumnIdentityAdd,
        Self::ColumnIdentityDrop,
        Self::ColumnIdentityChange,
        Self::ObjectRename,
        Self::PrimaryKeyCreate,
        Self::PrimaryKeyDrop,
        Self::ForeignKeyCreate,
        Self::ForeignKeyDrop,
        Self::UniqueCreate,
        Self::UniqueDrop,
        Self::CheckCreate,
        Self::CheckDrop,
        Self::IndexCreate,
        Self::IndexDrop,
        Self::TriggerCreate,
        Self::TriggerDrop,
    ];

    /// Whether this generator classifies `diff`.
    pub fn claims(&self, diff: &Difference) -> bool {
        use DiffKind::*;

        match self {
            Self::EnumCreate => matches!((diff.kind, &diff.path), (Create, DiffPath::Enum { .. })),
            Self::EnumDrop => matches!((diff.kind, &diff.path), (Remove, DiffPath::Enum { .. })),
            Self::EnumValues => {
                matches!((diff.kind, &diff.path), (Change, DiffPath::EnumValues { .. }))
            }
            Self::TableCreate => matches!((diff.kind, &diff.path), (Create, DiffPath::Table { .. })),
            Self::TableDrop => matches!((diff.kind, &diff.path), (Remove, DiffPath::Table { .. })),
            Self::TableRename => {
                matches!((diff.kind, &diff.path), (Change, DiffPath::TableName { .. }))
            }
            Self::ColumnCreate => {
                matches!((diff.kind, &diff.path), (Create, DiffPath::Column { .. }))
            }
            Self::ColumnDrop => matches!((diff.kind, &diff.path), (Remove, DiffPath::Column { .. })),
            Self::ColumnRename => {
                matches!((diff.kind, &diff.path), (Change, DiffPath::ColumnName { .. }))
            }
            Self::ColumnDataType => {
                matches!((diff.kind, &diff.path), (Change, DiffPath::ColumnDataType { .. }))
            }
            Self::ColumnNullable => {
                matches!((diff.kind, &diff.path), (Change, DiffPath::ColumnNullable { .. }))
            }
            Self::ColumnDefaultAdd => {
                matches!((diff.kind, &diff.path), (Create, DiffPath::ColumnDefault { .. }))
            }
            Self::ColumnDefaultDrop => {
                matches!((diff.kind, &diff.path), (Remove, DiffPath::ColumnDefault { .. }))
            }
            Self::ColumnDefaultChange => {
                matches!((diff.kind, &diff.path), (Change, DiffPath::ColumnDefault { .. }))
            }
            Self::ColumnIdentityAdd => {
                matches!((diff.kind, &diff.path), (Create, DiffPath::ColumnIdentity { .. }))
            }
            Self::ColumnIdentityDrop => {
                matches!((diff.kind, &diff.path), (Remove, DiffPath::ColumnIdentity { .. }))
            }
            Self::ColumnIdentityChange => {
                matches!((diff.kind, &diff.path), (Change, DiffPath::ColumnIdentity { .. }))
            }
            Self::PrimaryKeyCreate => {
                matches!((diff.kind, &diff.path), (Create, DiffPath::PrimaryKey { .. }))
            }
            Self::PrimaryKeyDrop => {
                matches!((diff.kind, &diff.path), (Remove, DiffPath::PrimaryKey { .. }))
            }
            Self::ForeignKeyCreate => {
                matches!((diff.kind, &diff.path), (Create, DiffPath::ForeignKey { .. }))
            }
            Self::ForeignKeyDrop => {
                matches!((diff.kind, &diff.path), (Remove, DiffPath::ForeignKey { .. }))
            }
            Self::UniqueCreate => matches!((diff.kind, &diff.path), (Create, DiffPath::Unique { .. })),
            Self::UniqueDrop => matches!((diff.kind, &diff.path), (Remove, DiffPath::Unique { .. })),
            Self::CheckCreate => matches!((diff.kind, &diff.path), (Create, DiffPath::Check { .. })),
            Self::CheckDrop => matches!((diff.kind, &diff.path), (Remove, DiffPath::Check { .. })),
            Self::IndexCreate => matches!((diff.kind, &diff.path), (Create, DiffPath::Index { .. })),
            Self::IndexDrop => matches!((diff.kind, &diff.path), (Remove, DiffPath::Index { .. })),
            Self::TriggerCreate => {
                matches!((diff.kind, &diff.path), (Create, DiffPath::Trigger { .. }))
            }
            Self::TriggerDrop => {
                matches!((diff.kind, &diff.path), (Remove, DiffPath::Trigger { .. }))
            }
            Self::ObjectRename => {
                matches!((diff.kind, &diff.path), (Change, DiffPath::ObjectName { .. }))
            }
        }
    }

    /// First generator in the chain that claims `diff`.
    pub fn classify(diff: &Difference) -> MigrateResult<Generator> {
        Self::CHAIN
            .into_iter()
            .find(|generator| generator.claims(diff))
            .ok_or_else(|| MigrationError::UnclassifiedDifference(diff.to_string()))
    }

    /// Translate a claimed difference into changesets.
    pub fn generate(
        &self,
        diff: &Difference,
        ctx: &GeneratorContext<'_>,
    ) -> MigrateResult<Vec<Changeset>> {
        match self {
            Self::EnumCreate => enums::create(diff, ctx),
            Self::EnumDrop => enums::drop(diff, ctx),
            Self::EnumValues => enums::add_values(diff, ctx),
            Self::TableCreate => table::create(diff, ctx),
            Self::TableDrop => table::drop(diff, ctx),
            Self::TableRename => table::rename(diff, ctx),
            Self::ColumnCreate => column::create(diff, ctx),
            Self::ColumnDrop => column::drop(diff, ctx),
            Self::ColumnRename => column::rename(diff, ctx),
            Self::ColumnDataType => column::data_type(diff, ctx),
            Self::ColumnNullable => column::nullable(diff, ctx),
            Self::ColumnDefaultAdd => column::default_add(diff, ctx),
            Self::ColumnDefaultDrop => column::default_drop(diff, ctx),
            Self::ColumnDefaultChange => column::default_change(diff, ctx),
            Self::ColumnIdentityAdd => column::identity_add(diff, ctx),
            Self::ColumnIdentityDrop => column::identity_drop(diff, ctx),
            Self::ColumnIdentityChange => column::identity_change(diff, ctx),
            Self::PrimaryKeyCreate => constraint::primary_key_create(diff, ctx),
            Self::PrimaryKeyDrop => constraint::primary_key_drop(diff, ctx),
            Self::ForeignKeyCreate => constraint::foreign_key_create(diff, ctx),
            Self::ForeignKeyDrop => constraint::foreign_key_drop(diff, ctx),
            Self::UniqueCreate => constraint::unique_create(diff, ctx),
            Self::UniqueDrop => constraint::unique_drop(diff, ctx),
            Self::CheckCreate => constraint::check_create(diff, ctx),
            Self::CheckDrop => constraint::check_drop(diff, ctx),
            Self::IndexCreate => index::create(diff, ctx),
            Self::IndexDrop => index::drop(diff, ctx),
            Self::TriggerCreate => trigger::create(diff, ctx),
            Self::TriggerDrop => trigger::drop(diff, ctx),
            Self::ObjectRename => constraint::rename(diff, ctx),
        }
    }
}

/// Run every difference through the chain, in order.
pub fn generate_changesets(
    diffs: &[Difference],
    ctx: &GeneratorContext<'_>,
) -> MigrateResult<Vec<Changeset>> {
    let mut changesets = Vec::new();
    for diff in diffs {
        let generator = Generator::classify(diff)?;
        let generated = generator.generate(diff, ctx)?;
        debug!(
            difference = %diff,
            generator = ?generator,
            changesets = generated.len(),
            "classified difference"
        );
        changesets.extend(generated);
    }
    Ok(changesets)
}

/// Name of the table a difference is scoped to, or an unclassified error.
fn table_of(diff: &Difference) -> MigrateResult<&str> {
    diff.path
        .table()
        .ok_or_else(|| MigrationError::UnclassifiedDifference(diff.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::DiffValue;

    #[test]
    fn test_every_difference_has_exactly_one_generator() {
        let samples = [
            Difference::create(DiffPath::Enum { name: "e".into() }, DiffValue::EnumValues(vec![])),
            Difference::remove(DiffPath::Table { table: "t".into() }, DiffValue::Name("t".into())),
            Difference::change(
                DiffPath::ColumnDefault {
                    table: "t".into(),
                    column: "c".into(),
                },
                DiffValue::Name("a".into()),
                DiffValue::Name("b".into()),
            ),
        ];
        for diff in &samples {
            let claims = Generator::CHAIN.iter().filter(|g| g.claims(diff)).count();
            assert_eq!(claims, 1, "{}", diff);
        }
    }

    #[test]
    fn test_unclassified_difference() {
        let diff = Difference::change(
            DiffPath::Table { table: "t".into() },
            DiffValue::Name("a".into()),
            DiffValue::Name("b".into()),
        );
        let err = Generator::classify(&diff).unwrap_err();
        assert!(matches!(err, MigrationError::UnclassifiedDifference(path) if path == "CHANGE table.t"));
    }

    #[test]
    fn test_chain_lists_every_generator_once() {
        let mut seen = std::collections::HashSet::new();
        assert!(Generator::CHAIN.iter().all(|g| seen.insert(*g)));
    }
}
