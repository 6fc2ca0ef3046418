//! Structural diff between two schema snapshots.
//!
//! The diff is typed: every [`Difference`] addresses one location of the
//! snapshot tree through a [`DiffPath`] variant and carries the desired
//! (`value`) and current (`old_value`) state of that location. Records come
//! out in a deterministic order (enums, tables, then each common table's
//! columns, keys, constraints, indexes and triggers).

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::alignment::same_type;
use crate::error::{MigrateResult, MigrationError};
use crate::naming::ObjectKind;
use crate::rename::Reconciled;
use crate::snapshot::{
    CheckSnapshot, ColumnDefault, ColumnSnapshot, ForeignKeySnapshot, Identity, IndexSnapshot,
    PrimaryKeySnapshot, SchemaSnapshot, TableSnapshot, TriggerSnapshot, UniqueSnapshot,
};

/// What happened at a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DiffKind {
    /// Present locally, absent remotely.
    Create,
    /// Present remotely, absent locally.
    Remove,
    /// Present on both sides with different values.
    Change,
}

impl fmt::Display for DiffKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Create => write!(f, "CREATE"),
            Self::Remove => write!(f, "REMOVE"),
            Self::Change => write!(f, "CHANGE"),
        }
    }
}

/// Location of a difference in the snapshot tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiffPath {
    /// `enums.<name>`
    Enum { name: String },
    /// `enums.<name>.values`
    EnumValues { name: String },
    /// `table.<table>`
    Table { table: String },
    /// `table.<from>.name`
    TableName { from: String, to: String },
    /// `table.<table>.columns.<column>`
    Column { table: String, column: String },
    /// `table.<table>.columns.<from>.name`
    ColumnName {
        table: String,
        from: String,
        to: String,
    },
    /// `table.<table>.columns.<column>.dataType`
    ColumnDataType { table: String, column: String },
    /// `table.<table>.columns.<column>.isNullable`
    ColumnNullable { table: String, column: String },
    /// `table.<table>.columns.<column>.defaultValue`
    ColumnDefault { table: String, column: String },
    /// `table.<table>.columns.<column>.identity`
    ColumnIdentity { table: String, column: String },
    /// `table.<table>.primaryKey`
    PrimaryKey { table: String },
    /// `table.<table>.foreignKeys.<name>`
    ForeignKey { table: String, name: String },
    /// `table.<table>.uniqueConstraints.<name>`
    Unique { table: String, name: String },
    /// `table.<table>.checkConstraints.<name>`
    Check { table: String, name: String },
    /// `table.<table>.indexes.<name>`
    Index { table: String, name: String },
    /// `table.<table>.triggers.<name>`
    Trigger { table: String, name: String },
    /// `table.<table>.<kind>.<from>.name`
    ObjectName {
        table: String,
        kind: ObjectKind,
        from: String,
        to: String,
    },
}

impl DiffPath {
    /// Table addressed by the path, if it is table scoped.
    pub fn table(&self) -> Option<&str> {
        match self {
            Self::Enum { .. } | Self::EnumValues { .. } => None,
            Self::TableName { to, .. } => Some(to),
            Self::Table { table }
            | Self::Column { table, .. }
            | Self::ColumnName { table, .. }
            | Self::ColumnDataType { table, .. }
            | Self::ColumnNullable { table, .. }
            | Self::ColumnDefault { table, .. }
            | Self::ColumnIdentity { table, .. }
            | Self::PrimaryKey { table }
            | Self::ForeignKey { table, .. }
            | Self::Unique { table, .. }
            | Self::Check { table, .. }
            | Self::Index { table, .. }
            | Self::Trigger { table, .. }
            | Self::ObjectName { table, .. } => Some(table),
        }
    }

    /// Path segments, e.g. `["table", "users", "columns", "email"]`.
    pub fn segments(&self) -> Vec<String> {
        let table = |t: &str, rest: &[&str]| {
            let mut segments = vec!["table".to_string(), t.to_string()];
            segments.extend(rest.iter().map(|s| s.to_string()));
            segments
        };
        match self {
            Self::Enum { name } => vec!["enums".into(), name.clone()],
            Self::EnumValues { name } => vec!["enums".into(), name.clone(), "values".into()],
            Self::Table { table: t } => table(t, &[]),
            Self::TableName { from, .. } => table(from, &["name"]),
            Self::Column { table: t, column } => table(t, &["columns", column]),
            Self::ColumnName { table: t, from, .. } => table(t, &["columns", from, "name"]),
            Self::ColumnDataType { table: t, column } => {
                table(t, &["columns", column, "dataType"])
            }
            Self::ColumnNullable { table: t, column } => {
                table(t, &["columns", column, "isNullable"])
            }
            Self::ColumnDefault { table: t, column } => {
                table(t, &["columns", column, "defaultValue"])
            }
            Self::ColumnIdentity { table: t, column } => {
                table(t, &["columns", column, "identity"])
            }
            Self::PrimaryKey { table: t } => table(t, &["primaryKey"]),
            Self::ForeignKey { table: t, name } => table(t, &["foreignKeys", name]),
            Self::Unique { table: t, name } => table(t, &["uniqueConstraints", name]),
            Self::Check { table: t, name } => table(t, &["checkConstraints", name]),
            Self::Index { table: t, name } => table(t, &["indexes", name]),
            Self::Trigger { table: t, name } => table(t, &["triggers", name]),
            Self::ObjectName {
                table: t,
                kind,
                from,
                ..
            } => table(t, &[&kind.to_string(), from, "name"]),
        }
    }
}

impl fmt::Display for DiffPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.segments().join("."))
    }
}

/// Value stored at a path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiffValue {
    /// Whole table.
    Table(TableSnapshot),
    /// Whole column.
    Column(ColumnSnapshot),
    /// Object or table name.
    Name(String),
    /// Column data type.
    DataType(String),
    /// Column nullability.
    Nullable(bool),
    /// Column default.
    Default(ColumnDefault),
    /// Column identity.
    Identity(Identity),
    /// Primary key.
    PrimaryKey(PrimaryKeySnapshot),
    /// Foreign key.
    ForeignKey(ForeignKeySnapshot),
    /// Unique constraint.
    Unique(UniqueSnapshot),
    /// Check constraint.
    Check(CheckSnapshot),
    /// Index.
    Index(IndexSnapshot),
    /// Trigger.
    Trigger(TriggerSnapshot),
    /// Enum values.
    EnumValues(Vec<String>),
}

macro_rules! value_accessor {
    ($name:ident, $variant:ident, $ty:ty) => {
        /// Borrow the payload if the value has this variant.
        pub fn $name(&self) -> Option<&$ty> {
            match self {
                Self::$variant(value) => Some(value),
                _ => None,
            }
        }
    };
}

impl DiffValue {
    value_accessor!(as_table, Table, TableSnapshot);
    value_accessor!(as_column, Column, ColumnSnapshot);
    value_accessor!(as_name, Name, String);
    value_accessor!(as_data_type, DataType, String);
    value_accessor!(as_nullable, Nullable, bool);
    value_accessor!(as_default, Default, ColumnDefault);
    value_accessor!(as_identity, Identity, Identity);
    value_accessor!(as_primary_key, PrimaryKey, PrimaryKeySnapshot);
    value_accessor!(as_foreign_key, ForeignKey, ForeignKeySnapshot);
    value_accessor!(as_unique, Unique, UniqueSnapshot);
    value_accessor!(as_check, Check, CheckSnapshot);
    value_accessor!(as_index, Index, IndexSnapshot);
    value_accessor!(as_trigger, Trigger, TriggerSnapshot);
    value_accessor!(as_enum_values, EnumValues, Vec<String>);
}

/// One difference between the remote and the local snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Difference {
    /// What happened.
    pub kind: DiffKind,
    /// Where it happened.
    pub path: DiffPath,
    /// Desired state (for `Create` and `Change`).
    pub value: Option<DiffValue>,
    /// Current state (for `Remove` and `Change`).
    pub old_value: Option<DiffValue>,
}

impl Difference {
    /// Something exists locally that does not exist remotely.
    pub fn create(path: DiffPath, value: DiffValue) -> Self {
        Self {
            kind: DiffKind::Create,
            path,
            value: Some(value),
            old_value: None,
        }
    }

    /// Something exists remotely that does not exist locally.
    pub fn remove(path: DiffPath, old_value: DiffValue) -> Self {
        Self {
            kind: DiffKind::Remove,
            path,
            value: None,
            old_value: Some(old_value),
        }
    }

    /// Something exists on both sides with different values.
    pub fn change(path: DiffPath, value: DiffValue, old_value: DiffValue) -> Self {
        Self {
            kind: DiffKind::Change,
            path,
            value: Some(value),
            old_value: Some(old_value),
        }
    }

    /// Typed desired value.
    pub fn value<'a, T: ?Sized>(
        &'a self,
        accessor: fn(&'a DiffValue) -> Option<&'a T>,
    ) -> MigrateResult<&'a T> {
        self.value
            .as_ref()
            .and_then(accessor)
            .ok_or_else(|| self.malformed("value"))
    }

    /// Typed current value.
    pub fn old_value<'a, T: ?Sized>(
        &'a self,
        accessor: fn(&'a DiffValue) -> Option<&'a T>,
    ) -> MigrateResult<&'a T> {
        self.old_value
            .as_ref()
            .and_then(accessor)
            .ok_or_else(|| self.malformed("old value"))
    }

    fn malformed(&self, what: &str) -> MigrationError {
        MigrationError::UnclassifiedDifference(format!("{} {} (missing {})", self.kind, self.path, what))
    }
}

impl fmt::Display for Difference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind, self.path)
    }
}

/// Compute the differences that turn `remote` into `local`.
pub fn diff(remote: &SchemaSnapshot, local: &SchemaSnapshot) -> Vec<Difference> {
    let mut diffs = Vec::new();

    diff_enums(remote, local, &mut diffs);

    for (name, table) in &local.tables {
        if !remote.tables.contains_key(name) {
            diffs.push(Difference::create(
                DiffPath::Table {
                    table: name.clone(),
                },
                DiffValue::Table(table.clone()),
            ));
        }
    }
    for (name, table) in &remote.tables {
        if !local.tables.contains_key(name) {
            diffs.push(Difference::remove(
                DiffPath::Table {
                    table: name.clone(),
                },
                DiffValue::Table(table.clone()),
            ));
        }
    }

    for (name, local_table) in &local.tables {
        if let Some(remote_table) = remote.tables.get(name) {
            diff_table(remote_table, local_table, &mut diffs);
        }
    }

    diffs
}

/// Differences after reconciling renames: rename records first, then the
/// structural diff of the renamed remote snapshot.
pub fn diff_reconciled(reconciled: &Reconciled, local: &SchemaSnapshot) -> Vec<Difference> {
    let mut diffs = Vec::new();

    for (from, to) in &reconciled.table_renames {
        diffs.push(Difference::change(
            DiffPath::TableName {
                from: from.clone(),
                to: to.clone(),
            },
            DiffValue::Name(to.clone()),
            DiffValue::Name(from.clone()),
        ));
    }
    for rename in &reconciled.column_renames {
        diffs.push(Difference::change(
            DiffPath::ColumnName {
                table: rename.table.clone(),
                from: rename.from.clone(),
                to: rename.to.clone(),
            },
            DiffValue::Name(rename.to.clone()),
            DiffValue::Name(rename.from.clone()),
        ));
    }
    for rename in &reconciled.object_renames {
        diffs.push(Difference::change(
            DiffPath::ObjectName {
                table: rename.table.clone(),
                kind: rename.kind,
                from: rename.from.clone(),
                to: rename.to.clone(),
            },
            DiffValue::Name(rename.to.clone()),
            DiffValue::Name(rename.from.clone()),
        ));
    }

    diffs.extend(diff(&reconciled.snapshot, local));
    diffs
}

fn diff_enums(remote: &SchemaSnapshot, local: &SchemaSnapshot, diffs: &mut Vec<Difference>) {
    for (name, values) in &local.enums {
        match remote.enums.get(name) {
            None => diffs.push(Difference::create(
                DiffPath::Enum { name: name.clone() },
                DiffValue::EnumValues(values.clone()),
            )),
            Some(old) if old != values => diffs.push(Difference::change(
                DiffPath::EnumValues { name: name.clone() },
                DiffValue::EnumValues(values.clone()),
                DiffValue::EnumValues(old.clone()),
            )),
            Some(_) => {}
        }
    }
    for (name, values) in &remote.enums {
        if !local.enums.contains_key(name) {
            diffs.push(Difference::remove(
                DiffPath::Enum { name: name.clone() },
                DiffValue::EnumValues(values.clone()),
            ));
        }
    }
}

fn diff_table(remote: &TableSnapshot, local: &TableSnapshot, diffs: &mut Vec<Difference>) {
    let table = &local.name;

    for (name, column) in &local.columns {
        match remote.columns.get(name) {
            None => diffs.push(Difference::create(
                DiffPath::Column {
                    table: table.clone(),
                    column: name.clone(),
                },
                DiffValue::Column(column.clone()),
            )),
            Some(old) => diff_column(table, old, column, diffs),
        }
    }
    for (name, column) in &remote.columns {
        if !local.columns.contains_key(name) {
            diffs.push(Difference::remove(
                DiffPath::Column {
                    table: table.clone(),
                    column: name.clone(),
                },
                DiffValue::Column(column.clone()),
            ));
        }
    }

    let pk_path = || DiffPath::PrimaryKey {
        table: table.clone(),
    };
    match (&remote.primary_key, &local.primary_key) {
        (None, Some(pk)) => diffs.push(Difference::create(
            pk_path(),
            DiffValue::PrimaryKey(pk.clone()),
        )),
        (Some(old), None) => diffs.push(Difference::remove(
            pk_path(),
            DiffValue::PrimaryKey(old.clone()),
        )),
        (Some(old), Some(pk)) if old != pk => {
            diffs.push(Difference::remove(
                pk_path(),
                DiffValue::PrimaryKey(old.clone()),
            ));
            diffs.push(Difference::create(
                pk_path(),
                DiffValue::PrimaryKey(pk.clone()),
            ));
        }
        _ => {}
    }

    diff_named(
        &remote.foreign_keys,
        &local.foreign_keys,
        |name| DiffPath::ForeignKey {
            table: table.clone(),
            name,
        },
        DiffValue::ForeignKey,
        diffs,
    );
    diff_named(
        &remote.uniques,
        &local.uniques,
        |name| DiffPath::Unique {
            table: table.clone(),
            name,
        },
        DiffValue::Unique,
        diffs,
    );
    diff_named(
        &remote.checks,
        &local.checks,
        |name| DiffPath::Check {
            table: table.clone(),
            name,
        },
        DiffValue::Check,
        diffs,
    );
    diff_named(
        &remote.indexes,
        &local.indexes,
        |name| DiffPath::Index {
            table: table.clone(),
            name,
        },
        DiffValue::Index,
        diffs,
    );
    diff_named(
        &remote.triggers,
        &local.triggers,
        |name| DiffPath::Trigger {
            table: table.clone(),
            name,
        },
        DiffValue::Trigger,
        diffs,
    );
}

/// Named objects carry their definition hash in the name, so presence by
/// name is the whole comparison.
fn diff_named<T: Clone>(
    remote: &std::collections::BTreeMap<String, T>,
    local: &std::collections::BTreeMap<String, T>,
    path: impl Fn(String) -> DiffPath,
    wrap: fn(T) -> DiffValue,
    diffs: &mut Vec<Difference>,
) {
    for (name, object) in local {
        if !remote.contains_key(name) {
            diffs.push(Difference::create(path(name.clone()), wrap(object.clone())));
        }
    }
    for (name, object) in remote {
        if !local.contains_key(name) {
            diffs.push(Difference::remove(path(name.clone()), wrap(object.clone())));
        }
    }
}

fn diff_column(
    table: &str,
    remote: &ColumnSnapshot,
    local: &ColumnSnapshot,
    diffs: &mut Vec<Difference>,
) {
    let column = &local.name;

    if !same_type(&remote.data_type, &local.data_type) {
        diffs.push(Difference::change(
            DiffPath::ColumnDataType {
                table: table.to_string(),
                column: column.clone(),
            },
            DiffValue::DataType(local.data_type.clone()),
            DiffValue::DataType(remote.data_type.clone()),
        ));
    }

    if remote.default != local.default {
        let path = DiffPath::ColumnDefault {
            table: table.to_string(),
            column: column.clone(),
        };
        diffs.push(match (&remote.default, &local.default) {
            (None, Some(new)) => Difference::create(path, DiffValue::Default(new.clone())),
            (Some(old), None) => Difference::remove(path, DiffValue::Default(old.clone())),
            (Some(old), Some(new)) => Difference::change(
                path,
                DiffValue::Default(new.clone()),
                DiffValue::Default(old.clone()),
            ),
            (None, None) => return,
        });
    }

    if remote.nullable != local.nullable {
        diffs.push(Difference::change(
            DiffPath::ColumnNullable {
                table: table.to_string(),
                column: column.clone(),
            },
            DiffValue::Nullable(local.nullable),
            DiffValue::Nullable(remote.nullable),
        ));
    }

    if remote.identity != local.identity {
        let path = DiffPath::ColumnIdentity {
            table: table.to_string(),
            column: column.clone(),
        };
        diffs.push(match (remote.identity, local.identity) {
            (None, Some(new)) => Difference::create(path, DiffValue::Identity(new)),
            (Some(old), None) => Difference::remove(path, DiffValue::Identity(old)),
            (Some(old), Some(new)) => {
                Difference::change(path, DiffValue::Identity(new), DiffValue::Identity(old))
            }
            (None, None) => return,
        });
    }
}
