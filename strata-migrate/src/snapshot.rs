//! Canonical, comparable schema snapshots.
//!
//! Both the local schema compiler and the catalog introspector produce a
//! [`SchemaSnapshot`]; the diff engine only ever compares two of them.

use std::collections::BTreeMap;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::naming::{
    self, ObjectKind, hash_value, join_columns, normalize_expression, normalize_sql,
};

/// Canonical representation of one database schema.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaSnapshot {
    /// Database schema name (e.g. `public`).
    pub schema: String,
    /// Tables keyed by name.
    pub tables: BTreeMap<String, TableSnapshot>,
    /// Enum types keyed by name, values in declaration order.
    pub enums: BTreeMap<String, Vec<String>>,
    /// Table names in foreign-key dependency order.
    pub table_priorities: Vec<String>,
}

impl SchemaSnapshot {
    /// Create an empty snapshot for a schema.
    pub fn new(schema: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            ..Default::default()
        }
    }

    /// Get a table by name.
    pub fn table(&self, name: &str) -> Option<&TableSnapshot> {
        self.tables.get(name)
    }

    /// Get a column of a table.
    pub fn column(&self, table: &str, column: &str) -> Option<&ColumnSnapshot> {
        self.tables.get(table).and_then(|t| t.columns.get(column))
    }

    /// Check whether a data type names one of the schema's enums.
    pub fn is_enum(&self, data_type: &str) -> bool {
        self.enums.contains_key(data_type)
    }
}

/// Metadata for one table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSnapshot {
    /// Table name.
    pub name: String,
    /// Columns in declaration (or ordinal) order.
    pub columns: IndexMap<String, ColumnSnapshot>,
    /// Primary key, if any.
    pub primary_key: Option<PrimaryKeySnapshot>,
    /// Foreign keys keyed by constraint name.
    pub foreign_keys: BTreeMap<String, ForeignKeySnapshot>,
    /// Unique constraints keyed by constraint name.
    pub uniques: BTreeMap<String, UniqueSnapshot>,
    /// Check constraints keyed by constraint name.
    pub checks: BTreeMap<String, CheckSnapshot>,
    /// Indexes keyed by index name.
    pub indexes: BTreeMap<String, IndexSnapshot>,
    /// Triggers keyed by trigger name.
    pub triggers: BTreeMap<String, TriggerSnapshot>,
}

impl TableSnapshot {
    /// Create an empty table.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Tables referenced by this table's foreign keys, excluding itself.
    pub fn referenced_tables(&self) -> impl Iterator<Item = &str> {
        self.foreign_keys
            .values()
            .map(|fk| fk.referenced_table.as_str())
            .filter(move |t| *t != self.name)
    }

    /// Whether a column belongs to the primary key.
    pub fn is_primary_key_column(&self, column: &str) -> bool {
        self.primary_key
            .as_ref()
            .is_some_and(|pk| pk.columns.iter().any(|c| c == column))
    }
}

/// Column metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSnapshot {
    /// Column name.
    pub name: String,
    /// Data type as written in DDL (e.g. `bigint`, `varchar(255)`).
    pub data_type: String,
    /// Whether the column accepts NULL.
    pub nullable: bool,
    /// Default value, if any.
    pub default: Option<ColumnDefault>,
    /// Identity generation, if any.
    pub identity: Option<Identity>,
    /// Whether the data type is one of the schema's enum types.
    pub enum_type: bool,
}

impl ColumnSnapshot {
    /// Create a nullable column without default.
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            nullable: true,
            default: None,
            identity: None,
            enum_type: false,
        }
    }
}

/// Column default stored as `hash:sql`.
///
/// Two defaults are the same when their hashes are equal; the literal is
/// kept for DDL generation only.
#[derive(Debug, Clone, Eq, Serialize, Deserialize)]
pub struct ColumnDefault {
    /// Hash of the normalized literal the default was created from.
    pub hash: String,
    /// Literal SQL expression.
    pub sql: String,
}

impl ColumnDefault {
    /// Build a default from a SQL literal.
    pub fn from_sql(sql: &str) -> Self {
        let sql = normalize_sql(sql);
        Self {
            hash: hash_value(&sql),
            sql,
        }
    }

    /// Build a default whose hash was recorded separately (e.g. in a column comment).
    pub fn with_hash(hash: impl Into<String>, sql: &str) -> Self {
        Self {
            hash: hash.into(),
            sql: normalize_sql(sql),
        }
    }

    /// Parse the `hash:sql` encoding.
    pub fn decode(encoded: &str) -> Option<Self> {
        let (hash, sql) = encoded.split_once(':')?;
        if hash.is_empty() {
            return None;
        }
        Some(Self::with_hash(hash, sql))
    }

    /// Encode as `hash:sql`.
    pub fn encode(&self) -> String {
        format!("{}:{}", self.hash, self.sql)
    }
}

impl PartialEq for ColumnDefault {
    fn eq(&self, other: &Self) -> bool {
        self.hash == other.hash
    }
}

/// Identity generation mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Identity {
    /// `GENERATED ALWAYS AS IDENTITY`.
    Always,
    /// `GENERATED BY DEFAULT AS IDENTITY`.
    ByDefault,
}

impl Identity {
    /// SQL keyword for this mode.
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Always => "ALWAYS",
            Self::ByDefault => "BY DEFAULT",
        }
    }
}

/// Primary key constraint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrimaryKeySnapshot {
    /// Constraint name.
    pub name: String,
    /// Key columns in order.
    pub columns: Vec<String>,
}

/// Referential action for foreign keys.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ForeignKeyAction {
    /// `NO ACTION`.
    #[default]
    NoAction,
    /// `RESTRICT`.
    Restrict,
    /// `CASCADE`.
    Cascade,
    /// `SET NULL`.
    SetNull,
    /// `SET DEFAULT`.
    SetDefault,
}

impl ForeignKeyAction {
    /// SQL spelling of the action.
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::NoAction => "NO ACTION",
            Self::Restrict => "RESTRICT",
            Self::Cascade => "CASCADE",
            Self::SetNull => "SET NULL",
            Self::SetDefault => "SET DEFAULT",
        }
    }

    /// Parse from a catalog action code (`a`, `r`, `c`, `n`, `d`) or SQL spelling.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "A" | "NO ACTION" => Some(Self::NoAction),
            "R" | "RESTRICT" => Some(Self::Restrict),
            "C" | "CASCADE" => Some(Self::Cascade),
            "N" | "SET NULL" => Some(Self::SetNull),
            "D" | "SET DEFAULT" => Some(Self::SetDefault),
            _ => None,
        }
    }
}

/// Foreign key constraint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKeySnapshot {
    /// Constraint name.
    pub name: String,
    /// Referencing columns.
    pub columns: Vec<String>,
    /// Referenced table.
    pub referenced_table: String,
    /// Referenced columns.
    pub referenced_columns: Vec<String>,
    /// `ON DELETE` action.
    pub on_delete: ForeignKeyAction,
    /// `ON UPDATE` action.
    pub on_update: ForeignKeyAction,
}

impl ForeignKeySnapshot {
    /// Normalized definition hashed into the generated name.
    pub fn definition(&self) -> String {
        format!(
            "{}:{}({}):{}:{}",
            join_columns(&self.columns),
            self.referenced_table,
            join_columns(&self.referenced_columns),
            self.on_delete.as_sql(),
            self.on_update.as_sql()
        )
    }

    /// Generated name of this foreign key on `table`.
    pub fn generated_name(&self, table: &str) -> String {
        naming::object_name(table, &self.definition(), ObjectKind::ForeignKey)
    }
}

/// Unique constraint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UniqueSnapshot {
    /// Constraint name.
    pub name: String,
    /// Columns in order.
    pub columns: Vec<String>,
    /// Whether NULLs are distinct (PostgreSQL default).
    pub nulls_distinct: bool,
}

impl UniqueSnapshot {
    /// Normalized definition hashed into the generated name.
    pub fn definition(&self) -> String {
        let nulls = if self.nulls_distinct {
            "NULLS DISTINCT"
        } else {
            "NULLS NOT DISTINCT"
        };
        format!("{}:{}", join_columns(&self.columns), nulls)
    }

    /// Generated name of this constraint on `table`.
    pub fn generated_name(&self, table: &str) -> String {
        naming::object_name(table, &self.definition(), ObjectKind::Unique)
    }
}

/// Check constraint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckSnapshot {
    /// Constraint name.
    pub name: String,
    /// Boolean SQL expression.
    pub expression: String,
}

impl CheckSnapshot {
    /// Normalized definition hashed into the generated name.
    pub fn definition(&self) -> String {
        normalize_expression(&self.expression)
    }

    /// Generated name of this constraint on `table`.
    pub fn generated_name(&self, table: &str) -> String {
        naming::object_name(table, &self.definition(), ObjectKind::Check)
    }
}

/// Index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexSnapshot {
    /// Index name.
    pub name: String,
    /// Indexed columns in order.
    pub columns: Vec<String>,
    /// Whether the index is unique.
    pub unique: bool,
    /// Access method (`btree`, `gin`, ...).
    pub method: String,
    /// Partial index predicate.
    pub predicate: Option<String>,
}

impl IndexSnapshot {
    /// Normalized definition hashed into the generated name.
    pub fn definition(&self) -> String {
        let mut def = String::new();
        if self.unique {
            def.push_str("UNIQUE ");
        }
        def.push_str(&self.method.to_ascii_lowercase());
        def.push('(');
        def.push_str(&join_columns(&self.columns));
        def.push(')');
        if let Some(predicate) = &self.predicate {
            def.push_str(" WHERE ");
            def.push_str(&normalize_expression(predicate));
        }
        def
    }

    /// Generated name of this index on `table`.
    pub fn generated_name(&self, table: &str) -> String {
        naming::object_name(table, &self.definition(), ObjectKind::Index)
    }
}

/// When a trigger fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TriggerTiming {
    /// `BEFORE`.
    Before,
    /// `AFTER`.
    After,
    /// `INSTEAD OF`.
    InsteadOf,
}

impl TriggerTiming {
    /// SQL spelling.
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Before => "BEFORE",
            Self::After => "AFTER",
            Self::InsteadOf => "INSTEAD OF",
        }
    }

    /// Parse the SQL spelling.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "BEFORE" => Some(Self::Before),
            "AFTER" => Some(Self::After),
            "INSTEAD OF" => Some(Self::InsteadOf),
            _ => None,
        }
    }
}

/// Row or statement level trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TriggerLevel {
    /// `FOR EACH ROW`.
    Row,
    /// `FOR EACH STATEMENT`.
    Statement,
}

impl TriggerLevel {
    /// SQL spelling.
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Row => "ROW",
            Self::Statement => "STATEMENT",
        }
    }
}

/// Trigger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerSnapshot {
    /// Trigger name.
    pub name: String,
    /// Firing time.
    pub timing: TriggerTiming,
    /// Events in catalog order: `INSERT`, `UPDATE`, `DELETE`, `TRUNCATE`.
    pub events: Vec<String>,
    /// Row or statement level.
    pub level: TriggerLevel,
    /// Function call, e.g. `moddatetime(updated_at)`.
    pub function: String,
}

impl TriggerSnapshot {
    /// Normalized definition hashed into the generated name.
    pub fn definition(&self) -> String {
        format!(
            "{}:{}:{}:{}",
            self.timing.as_sql(),
            self.events.join(" OR "),
            self.level.as_sql(),
            normalize_sql(&self.function)
        )
    }

    /// Generated name of this trigger on `table`.
    pub fn generated_name(&self, table: &str) -> String {
        naming::object_name(table, &self.definition(), ObjectKind::Trigger)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_equality_uses_hash() {
        let local = ColumnDefault::from_sql("'active'");
        let remote = ColumnDefault::with_hash(local.hash.clone(), "'active'::text");
        assert_eq!(local, remote);
        assert_ne!(local, ColumnDefault::from_sql("'inactive'"));
    }

    #[test]
    fn test_default_encoding() {
        let default = ColumnDefault::from_sql("now()");
        let decoded = ColumnDefault::decode(&default.encode()).unwrap();
        assert_eq!(decoded.hash, default.hash);
        assert_eq!(decoded.sql, "now()");
        assert!(ColumnDefault::decode("no-separator").is_none());
    }

    #[test]
    fn test_default_sql_with_colons() {
        let default = ColumnDefault::from_sql("'a'::text");
        let decoded = ColumnDefault::decode(&default.encode()).unwrap();
        assert_eq!(decoded.sql, "'a'::text");
    }

    #[test]
    fn test_foreign_key_definition() {
        let fk = ForeignKeySnapshot {
            name: String::new(),
            columns: vec!["user_id".into()],
            referenced_table: "users".into(),
            referenced_columns: vec!["id".into()],
            on_delete: ForeignKeyAction::Cascade,
            on_update: ForeignKeyAction::NoAction,
        };
        assert_eq!(fk.definition(), "user_id:users(id):CASCADE:NO ACTION");
        assert!(fk.generated_name("posts").ends_with("_fk"));
    }

    #[test]
    fn test_index_definition() {
        let index = IndexSnapshot {
            name: String::new(),
            columns: vec!["email".into(), "name".into()],
            unique: true,
            method: "BTREE".into(),
            predicate: Some("deleted_at  IS NULL".into()),
        };
        assert_eq!(index.definition(), "UNIQUE btree(email,name) WHERE deleted_at IS NULL");
    }

    #[test]
    fn test_trigger_definition() {
        let trigger = TriggerSnapshot {
            name: String::new(),
            timing: TriggerTiming::Before,
            events: vec!["INSERT".into(), "UPDATE".into()],
            level: TriggerLevel::Row,
            function: "moddatetime(updated_at)".into(),
        };
        assert_eq!(
            trigger.definition(),
            "BEFORE:INSERT OR UPDATE:ROW:moddatetime(updated_at)"
        );
    }

    #[test]
    fn test_referenced_tables_skip_self() {
        let mut table = TableSnapshot::new("nodes");
        for (name, target) in [("a", "nodes"), ("b", "trees")] {
            table.foreign_keys.insert(
                name.into(),
                ForeignKeySnapshot {
                    name: name.into(),
                    columns: vec!["x".into()],
                    referenced_table: target.into(),
                    referenced_columns: vec!["id".into()],
                    on_delete: ForeignKeyAction::NoAction,
                    on_update: ForeignKeyAction::NoAction,
                },
            );
        }
        assert_eq!(table.referenced_tables().collect::<Vec<_>>(), vec!["trees"]);
    }
}
