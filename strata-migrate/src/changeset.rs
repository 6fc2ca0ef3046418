//! Changesets: the reversible units migrations are built from.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::dependency::TableOrder;
use crate::migration::MigrationPhase;

/// Operation priorities; lower runs first.
pub mod priority {
    pub const ENUM_CREATE: u32 = 100;
    pub const ENUM_ADD_VALUE: u32 = 110;
    pub const TABLE_RENAME: u32 = 200;
    pub const COLUMN_RENAME: u32 = 210;
    pub const OBJECT_RENAME: u32 = 220;
    pub const TABLE_CREATE: u32 = 300;
    pub const COLUMN_CREATE: u32 = 310;
    pub const COLUMN_TYPE: u32 = 320;
    pub const COLUMN_DEFAULT: u32 = 330;
    pub const COLUMN_NULLABLE: u32 = 340;
    pub const COLUMN_IDENTITY: u32 = 345;
    pub const PRIMARY_KEY_DROP: u32 = 400;
    pub const PRIMARY_KEY_NULLABILITY: u32 = 405;
    pub const PRIMARY_KEY_CREATE: u32 = 410;
    pub const UNIQUE_CREATE: u32 = 500;
    pub const CHECK_CREATE: u32 = 510;
    pub const FOREIGN_KEY_CREATE: u32 = 520;
    pub const INDEX_CREATE: u32 = 600;
    pub const TRIGGER_CREATE: u32 = 700;
    pub const TRIGGER_DROP: u32 = 800;
    pub const INDEX_DROP: u32 = 810;
    pub const FOREIGN_KEY_DROP: u32 = 820;
    pub const CHECK_DROP: u32 = 830;
    pub const UNIQUE_DROP: u32 = 840;
    pub const COLUMN_DROP: u32 = 900;
    pub const TABLE_DROP: u32 = 1000;
    pub const ENUM_DROP: u32 = 1100;
}

/// What a changeset does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ChangesetType {
    CreateEnum,
    AddEnumValues,
    DropEnum,
    CreateTable,
    DropTable,
    RenameTable,
    CreateColumn,
    DropColumn,
    RenameColumn,
    ChangeColumnType,
    AddColumnDefault,
    DropColumnDefault,
    ChangeColumnDefault,
    ChangeColumnNullable,
    AddColumnIdentity,
    DropColumnIdentity,
    ChangeColumnIdentity,
    CreatePrimaryKey,
    DropPrimaryKey,
    CreateForeignKey,
    DropForeignKey,
    CreateUnique,
    DropUnique,
    CreateCheck,
    DropCheck,
    CreateIndex,
    DropIndex,
    CreateTrigger,
    DropTrigger,
    RenameConstraint,
    RenameIndex,
    RenameTrigger,
}

impl fmt::Display for ChangesetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Something the operator should know before applying a changeset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ChangesetWarning {
    /// Data is lost when the changeset runs.
    Destructive {
        /// What is lost.
        object: String,
    },
    /// Application code using the old name breaks.
    BackwardIncompatible {
        /// Previous name.
        from: String,
        /// New name.
        to: String,
    },
    /// The statement can fail against existing data.
    MightFail {
        /// Why it might fail.
        reason: String,
    },
    /// Rolling back leaves the change in place.
    Irreversible {
        /// What stays behind.
        reason: String,
    },
}

impl fmt::Display for ChangesetWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Destructive { object } => write!(f, "destructive: drops {}", object),
            Self::BackwardIncompatible { from, to } => {
                write!(f, "backward incompatible: renames {} to {}", from, to)
            }
            Self::MightFail { reason } => write!(f, "might fail: {}", reason),
            Self::Irreversible { reason } => write!(f, "irreversible: {}", reason),
        }
    }
}

/// One reversible unit of migration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Changeset {
    /// Sort priority; lower runs first.
    pub priority: u32,
    /// Phase the changeset belongs to.
    pub phase: MigrationPhase,
    /// Desired table name; `None` for schema-level changesets.
    pub table_name: Option<String>,
    /// Table name at the time the changeset runs.
    pub current_table_name: Option<String>,
    /// What the changeset does.
    pub changeset_type: ChangesetType,
    /// Statements applying the change.
    pub up: Vec<String>,
    /// Statements reverting the change.
    pub down: Vec<String>,
    /// Warnings for the operator.
    pub warnings: Vec<ChangesetWarning>,
    /// Whether the statements may run inside a transaction.
    pub transaction: bool,
}

impl Changeset {
    /// Create a transactional changeset without statements.
    pub fn new(changeset_type: ChangesetType, phase: MigrationPhase, priority: u32) -> Self {
        Self {
            priority,
            phase,
            table_name: None,
            current_table_name: None,
            changeset_type,
            up: Vec::new(),
            down: Vec::new(),
            warnings: Vec::new(),
            transaction: true,
        }
    }

    /// Scope the changeset to a table that keeps its name.
    pub fn table(self, name: impl Into<String>) -> Self {
        let name = name.into();
        self.tables(name.clone(), name)
    }

    /// Scope the changeset to a table with desired and current names.
    pub fn tables(mut self, name: impl Into<String>, current: impl Into<String>) -> Self {
        self.table_name = Some(name.into());
        self.current_table_name = Some(current.into());
        self
    }

    /// Append an up statement.
    pub fn up(mut self, statement: impl Into<String>) -> Self {
        self.up.push(statement.into());
        self
    }

    /// Append a down statement.
    pub fn down(mut self, statement: impl Into<String>) -> Self {
        self.down.push(statement.into());
        self
    }

    /// Add a warning.
    pub fn warning(mut self, warning: ChangesetWarning) -> Self {
        self.warnings.push(warning);
        self
    }

    /// Run outside a transaction.
    pub fn without_transaction(mut self) -> Self {
        self.transaction = false;
        self
    }

    /// Whether running the changeset loses data.
    pub fn is_destructive(&self) -> bool {
        self.warnings
            .iter()
            .any(|w| matches!(w, ChangesetWarning::Destructive { .. }))
    }

    /// Whether `down` cannot undo the changeset.
    pub fn is_irreversible(&self) -> bool {
        self.warnings
            .iter()
            .any(|w| matches!(w, ChangesetWarning::Irreversible { .. }))
    }
}

/// Sort changesets by priority, then by table dependency position.
///
/// The sort is stable. Schema-level changesets come before table-level
/// ones of equal priority; drops of whole tables follow the drop order.
pub fn sort_changesets(changesets: &mut [Changeset], order: &TableOrder) {
    changesets.sort_by_key(|changeset| {
        let position = match changeset.table_name.as_deref() {
            None => 0,
            Some(table) => {
                let position = if changeset.changeset_type == ChangesetType::DropTable {
                    order.drop_position(table)
                } else {
                    order.position(table)
                };
                position.map_or(usize::MAX, |p| p + 1)
            }
        };
        (changeset.priority, position)
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn changeset(kind: ChangesetType, priority: u32, table: Option<&str>) -> Changeset {
        let changeset = Changeset::new(kind, MigrationPhase::Expand, priority);
        match table {
            Some(table) => changeset.table(table),
            None => changeset,
        }
    }

    fn order() -> TableOrder {
        TableOrder {
            order: vec!["users".into(), "accounts".into(), "posts".into()],
            drops: vec!["posts".into(), "users".into()],
        }
    }

    #[test]
    fn test_sort_by_priority_then_table() {
        let mut changesets = vec![
            changeset(ChangesetType::CreateIndex, priority::INDEX_CREATE, Some("users")),
            changeset(ChangesetType::CreateTable, priority::TABLE_CREATE, Some("posts")),
            changeset(ChangesetType::CreateTable, priority::TABLE_CREATE, Some("accounts")),
            changeset(ChangesetType::CreateEnum, priority::ENUM_CREATE, None),
        ];
        sort_changesets(&mut changesets, &order());

        let keys: Vec<(u32, Option<&str>)> = changesets
            .iter()
            .map(|c| (c.priority, c.table_name.as_deref()))
            .collect();
        assert_eq!(
            keys,
            vec![
                (100, None),
                (300, Some("accounts")),
                (300, Some("posts")),
                (600, Some("users")),
            ]
        );
    }

    #[test]
    fn test_sort_table_drops_use_drop_order() {
        let mut changesets = vec![
            changeset(ChangesetType::DropTable, priority::TABLE_DROP, Some("users")),
            changeset(ChangesetType::DropTable, priority::TABLE_DROP, Some("posts")),
        ];
        sort_changesets(&mut changesets, &order());
        assert_eq!(changesets[0].table_name.as_deref(), Some("posts"));
        assert_eq!(changesets[1].table_name.as_deref(), Some("users"));
    }

    #[test]
    fn test_sort_is_stable() {
        let mut changesets = vec![
            changeset(ChangesetType::CreateIndex, priority::INDEX_CREATE, Some("users")).up("a"),
            changeset(ChangesetType::CreateIndex, priority::INDEX_CREATE, Some("users")).up("b"),
        ];
        sort_changesets(&mut changesets, &order());
        assert_eq!(changesets[0].up, vec!["a"]);
    }

    #[test]
    fn test_warning_display() {
        let warning = ChangesetWarning::BackwardIncompatible {
            from: "users".into(),
            to: "accounts".into(),
        };
        assert_eq!(
            warning.to_string(),
            "backward incompatible: renames users to accounts"
        );
        let destructive = changeset(ChangesetType::DropTable, priority::TABLE_DROP, Some("users"))
            .warning(ChangesetWarning::Destructive {
                object: "table users".into(),
            });
        assert!(destructive.is_destructive());
    }
}
