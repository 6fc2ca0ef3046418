//! Catalog facts and their conversion into a [`SchemaSnapshot`].
//!
//! A database handle reads raw catalog rows into [`CatalogFacts`]; the
//! [`SnapshotBuilder`] turns them into the same canonical shape the local
//! schema compiler produces.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::alignment::{AlignmentCatalog, TypeAlignment};
use crate::dependency;
use crate::error::MigrateResult;
use crate::history::LEDGER_TABLE;
use crate::naming::normalize_expression;
use crate::snapshot::{
    CheckSnapshot, ColumnDefault, ColumnSnapshot, ForeignKeyAction, ForeignKeySnapshot, Identity,
    IndexSnapshot, PrimaryKeySnapshot, SchemaSnapshot, TableSnapshot, TriggerLevel,
    TriggerSnapshot, TriggerTiming, UniqueSnapshot,
};

/// Configuration for introspection.
#[derive(Debug, Clone)]
pub struct IntrospectionConfig {
    /// Schema to introspect (default: "public").
    pub database_schema: String,
    /// Tables to include (empty = all).
    pub include_tables: Vec<String>,
    /// Tables to exclude.
    pub exclude_tables: Vec<String>,
}

impl Default for IntrospectionConfig {
    fn default() -> Self {
        Self {
            database_schema: "public".to_string(),
            include_tables: Vec::new(),
            exclude_tables: vec![LEDGER_TABLE.to_string()],
        }
    }
}

impl IntrospectionConfig {
    /// Create a new introspection config.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the database schema to introspect.
    pub fn database_schema(mut self, schema: impl Into<String>) -> Self {
        self.database_schema = schema.into();
        self
    }

    /// Include only these tables.
    pub fn include_tables(mut self, tables: Vec<String>) -> Self {
        self.include_tables = tables;
        self
    }

    /// Exclude these tables in addition to the ledger table.
    pub fn exclude_tables(mut self, tables: Vec<String>) -> Self {
        self.exclude_tables.extend(tables);
        self
    }

    /// Check if a table should be included.
    pub fn should_include_table(&self, name: &str) -> bool {
        if self.exclude_tables.iter().any(|t| t == name) {
            return false;
        }
        self.include_tables.is_empty() || self.include_tables.iter().any(|t| t == name)
    }
}

/// Raw table information from the database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableInfo {
    /// Table name.
    pub name: String,
}

/// Raw column information from the database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnInfo {
    /// Table the column belongs to.
    pub table_name: String,
    /// Column name.
    pub name: String,
    /// Formatted data type (e.g. `character varying(255)`).
    pub data_type: String,
    /// Whether the column is nullable.
    pub is_nullable: bool,
    /// Default value expression as stored in the catalog.
    pub column_default: Option<String>,
    /// Identity kind: `a` (always) or `d` (by default).
    pub identity: Option<String>,
    /// Ordinal position.
    pub ordinal_position: i32,
    /// Column comment.
    pub comment: Option<String>,
}

/// Constraint types reported by the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConstraintType {
    /// `PRIMARY KEY`.
    PrimaryKey,
    /// `FOREIGN KEY`.
    ForeignKey,
    /// `UNIQUE`.
    Unique,
    /// `CHECK`.
    Check,
}

impl ConstraintType {
    /// Parse a `pg_constraint.contype` code.
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "p" => Some(Self::PrimaryKey),
            "f" => Some(Self::ForeignKey),
            "u" => Some(Self::Unique),
            "c" => Some(Self::Check),
            _ => None,
        }
    }
}

/// Raw constraint information from the database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConstraintInfo {
    /// Constraint name.
    pub name: String,
    /// Constraint type.
    pub constraint_type: ConstraintType,
    /// Table name.
    pub table_name: String,
    /// Columns in the constraint, in key order.
    pub columns: Vec<String>,
    /// Referenced table (for foreign keys).
    pub referenced_table: Option<String>,
    /// Referenced columns (for foreign keys).
    pub referenced_columns: Vec<String>,
    /// On delete action code (for foreign keys).
    pub on_delete: Option<String>,
    /// On update action code (for foreign keys).
    pub on_update: Option<String>,
    /// `pg_get_constraintdef` output (for checks).
    pub definition: Option<String>,
    /// Whether NULLs are distinct (for unique constraints).
    pub nulls_distinct: bool,
}

/// Raw index information from the database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexInfo {
    /// Index name.
    pub name: String,
    /// Table name.
    pub table_name: String,
    /// Columns in the index.
    pub columns: Vec<String>,
    /// Whether the index is unique.
    pub is_unique: bool,
    /// Whether the index backs a constraint (primary key or unique).
    pub is_constraint: bool,
    /// Index method (btree, hash, etc.).
    pub index_method: String,
    /// Partial index predicate.
    pub predicate: Option<String>,
}

/// Raw trigger information from the database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerInfo {
    /// Trigger name.
    pub name: String,
    /// Table name.
    pub table_name: String,
    /// `BEFORE`, `AFTER` or `INSTEAD OF`.
    pub timing: String,
    /// Events the trigger fires on.
    pub events: Vec<String>,
    /// `ROW` or `STATEMENT`.
    pub orientation: String,
    /// Action statement, e.g. `EXECUTE FUNCTION moddatetime(updated_at)`.
    pub action_statement: String,
}

/// Raw enum information from the database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnumInfo {
    /// Enum name.
    pub name: String,
    /// Enum values in sort order.
    pub values: Vec<String>,
}

/// Everything read from the catalog in one introspection run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogFacts {
    /// Tables of the introspected schema.
    pub tables: Vec<TableInfo>,
    /// Columns of all tables.
    pub columns: Vec<ColumnInfo>,
    /// Constraints of all tables.
    pub constraints: Vec<ConstraintInfo>,
    /// Indexes of all tables.
    pub indexes: Vec<IndexInfo>,
    /// Triggers of all tables.
    pub triggers: Vec<TriggerInfo>,
    /// Enum types of the schema.
    pub enums: Vec<EnumInfo>,
    /// Alignment facts for every type known to the catalog.
    pub type_alignments: Vec<TypeAlignment>,
}

impl CatalogFacts {
    /// Alignment lookup built from the type facts.
    ///
    /// Falls back to built-in facts when the catalog reported none.
    pub fn alignment_catalog(&self) -> AlignmentCatalog {
        if self.type_alignments.is_empty() {
            AlignmentCatalog::builtin()
        } else {
            AlignmentCatalog::new(self.type_alignments.iter().cloned())
        }
    }
}

/// Build a [`SchemaSnapshot`] from catalog facts.
pub struct SnapshotBuilder {
    config: IntrospectionConfig,
}

impl SnapshotBuilder {
    /// Create a new snapshot builder.
    pub fn new(config: IntrospectionConfig) -> Self {
        Self { config }
    }

    /// Build the snapshot.
    pub fn build(&self, facts: &CatalogFacts) -> MigrateResult<SchemaSnapshot> {
        let mut snapshot = SchemaSnapshot::new(&self.config.database_schema);

        for info in &facts.enums {
            snapshot.enums.insert(info.name.clone(), info.values.clone());
        }

        for info in &facts.tables {
            if self.config.should_include_table(&info.name) {
                snapshot
                    .tables
                    .insert(info.name.clone(), TableSnapshot::new(&info.name));
            }
        }

        let mut columns: Vec<&ColumnInfo> = facts.columns.iter().collect();
        columns.sort_by_key(|c| c.ordinal_position);
        for info in columns {
            let enum_type = snapshot.is_enum(&info.data_type);
            if let Some(table) = snapshot.tables.get_mut(&info.table_name) {
                let column = build_column(info, enum_type);
                table.columns.insert(column.name.clone(), column);
            }
        }

        for info in &facts.constraints {
            let Some(table) = snapshot.tables.get_mut(&info.table_name) else {
                continue;
            };
            add_constraint(table, info);
        }

        for info in &facts.indexes {
            if info.is_constraint {
                continue;
            }
            let Some(table) = snapshot.tables.get_mut(&info.table_name) else {
                continue;
            };
            table.indexes.insert(
                info.name.clone(),
                IndexSnapshot {
                    name: info.name.clone(),
                    columns: info.columns.clone(),
                    unique: info.is_unique,
                    method: info.index_method.to_ascii_lowercase(),
                    predicate: info.predicate.clone(),
                },
            );
        }

        for info in &facts.triggers {
            let Some(table) = snapshot.tables.get_mut(&info.table_name) else {
                continue;
            };
            match build_trigger(info) {
                Some(trigger) => {
                    table.triggers.insert(trigger.name.clone(), trigger);
                }
                None => warn!(
                    table = %info.table_name,
                    trigger = %info.name,
                    timing = %info.timing,
                    "skipping trigger with unrecognized timing"
                ),
            }
        }

        snapshot.table_priorities = dependency::topological_order(&snapshot);

        debug!(
            schema = %snapshot.schema,
            tables = snapshot.tables.len(),
            enums = snapshot.enums.len(),
            "built remote snapshot"
        );

        Ok(snapshot)
    }
}

fn build_column(info: &ColumnInfo, enum_type: bool) -> ColumnSnapshot {
    let identity = match info.identity.as_deref() {
        Some("a") => Some(Identity::Always),
        Some("d") => Some(Identity::ByDefault),
        _ => None,
    };

    let default = info.column_default.as_deref().map(|sql| {
        match info.comment.as_deref().filter(|c| is_default_hash(c)) {
            Some(hash) => ColumnDefault::with_hash(hash, sql),
            None => ColumnDefault::from_sql(sql),
        }
    });

    ColumnSnapshot {
        name: info.name.clone(),
        data_type: info.data_type.clone(),
        nullable: info.is_nullable,
        default,
        identity,
        enum_type,
    }
}

fn is_default_hash(comment: &str) -> bool {
    comment.len() == 8 && comment.bytes().all(|b| b.is_ascii_hexdigit())
}

fn add_constraint(table: &mut TableSnapshot, info: &ConstraintInfo) {
    match info.constraint_type {
        ConstraintType::PrimaryKey => {
            table.primary_key = Some(PrimaryKeySnapshot {
                name: info.name.clone(),
                columns: info.columns.clone(),
            });
        }
        ConstraintType::ForeignKey => {
            let action = |code: &Option<String>| {
                code.as_deref()
                    .and_then(ForeignKeyAction::parse)
                    .unwrap_or_default()
            };
            table.foreign_keys.insert(
                info.name.clone(),
                ForeignKeySnapshot {
                    name: info.name.clone(),
                    columns: info.columns.clone(),
                    referenced_table: info.referenced_table.clone().unwrap_or_default(),
                    referenced_columns: info.referenced_columns.clone(),
                    on_delete: action(&info.on_delete),
                    on_update: action(&info.on_update),
                },
            );
        }
        ConstraintType::Unique => {
            table.uniques.insert(
                info.name.clone(),
                UniqueSnapshot {
                    name: info.name.clone(),
                    columns: info.columns.clone(),
                    nulls_distinct: info.nulls_distinct,
                },
            );
        }
        ConstraintType::Check => {
            let expression = info
                .definition
                .as_deref()
                .map(check_expression)
                .unwrap_or_default();
            table.checks.insert(
                info.name.clone(),
                CheckSnapshot {
                    name: info.name.clone(),
                    expression,
                },
            );
        }
    }
}

/// Strip the `CHECK (...)` wrapper `pg_get_constraintdef` adds, along with
/// the parentheses the deparser puts around the expression itself.
pub fn check_expression(definition: &str) -> String {
    let trimmed = definition.trim();
    let expression = trimmed
        .strip_prefix("CHECK")
        .map(str::trim_start)
        .unwrap_or(trimmed);
    normalize_expression(expression)
}

fn build_trigger(info: &TriggerInfo) -> Option<TriggerSnapshot> {
    let timing = TriggerTiming::parse(&info.timing)?;
    let level = if info.orientation.eq_ignore_ascii_case("STATEMENT") {
        TriggerLevel::Statement
    } else {
        TriggerLevel::Row
    };
    let statement = info.action_statement.trim();
    let function = ["EXECUTE FUNCTION ", "EXECUTE PROCEDURE "]
        .iter()
        .find_map(|prefix| statement.strip_prefix(prefix))
        .unwrap_or(statement);

    Some(TriggerSnapshot {
        name: info.name.clone(),
        timing,
        events: info.events.iter().map(|e| e.to_ascii_uppercase()).collect(),
        level,
        function: function.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::naming::hash_value;

    fn column(table: &str, name: &str, data_type: &str, position: i32) -> ColumnInfo {
        ColumnInfo {
            table_name: table.into(),
            name: name.into(),
            data_type: data_type.into(),
            is_nullable: true,
            column_default: None,
            identity: None,
            ordinal_position: position,
            comment: None,
        }
    }

    fn constraint(table: &str, name: &str, kind: ConstraintType, cols: &[&str]) -> ConstraintInfo {
        ConstraintInfo {
            name: name.into(),
            constraint_type: kind,
            table_name: table.into(),
            columns: cols.iter().map(|c| c.to_string()).collect(),
            referenced_table: None,
            referenced_columns: Vec::new(),
            on_delete: None,
            on_update: None,
            definition: None,
            nulls_distinct: true,
        }
    }

    fn facts() -> CatalogFacts {
        let mut id = column("users", "id", "bigint", 1);
        id.is_nullable = false;
        id.identity = Some("a".into());
        let mut status = column("users", "status", "status", 3);
        status.column_default = Some("'active'::status".into());
        status.comment = Some(hash_value("'active'"));
        let email = column("users", "email", "text", 2);

        let mut fk = constraint("posts", "posts_author_fk", ConstraintType::ForeignKey, &["author_id"]);
        fk.referenced_table = Some("users".into());
        fk.referenced_columns = vec!["id".into()];
        fk.on_delete = Some("c".into());

        let mut check = constraint("users", "users_chk", ConstraintType::Check, &[]);
        check.definition = Some("CHECK ((length(email) > 3))".into());

        CatalogFacts {
            tables: vec![
                TableInfo { name: "users".into() },
                TableInfo { name: "posts".into() },
                TableInfo { name: LEDGER_TABLE.into() },
            ],
            columns: vec![
                status,
                email,
                id,
                column("posts", "author_id", "bigint", 1),
            ],
            constraints: vec![
                constraint("users", "users_pkey", ConstraintType::PrimaryKey, &["id"]),
                fk,
                check,
            ],
            indexes: vec![IndexInfo {
                name: "users_pkey".into(),
                table_name: "users".into(),
                columns: vec!["id".into()],
                is_unique: true,
                is_constraint: true,
                index_method: "btree".into(),
                predicate: None,
            }],
            triggers: vec![TriggerInfo {
                name: "users_trg".into(),
                table_name: "users".into(),
                timing: "BEFORE".into(),
                events: vec!["update".into()],
                orientation: "ROW".into(),
                action_statement: "EXECUTE FUNCTION moddatetime(updated_at)".into(),
            }],
            enums: vec![EnumInfo {
                name: "status".into(),
                values: vec!["active".into(), "archived".into()],
            }],
            type_alignments: Vec::new(),
        }
    }

    #[test]
    fn test_build_snapshot() {
        let snapshot = SnapshotBuilder::new(IntrospectionConfig::new())
            .build(&facts())
            .unwrap();

        assert_eq!(snapshot.tables.len(), 2);
        assert_eq!(snapshot.table_priorities, vec!["users", "posts"]);

        let users = snapshot.table("users").unwrap();
        let names: Vec<&str> = users.columns.keys().map(String::as_str).collect();
        assert_eq!(names, vec!["id", "email", "status"]);
        assert_eq!(users.columns["id"].identity, Some(Identity::Always));
        assert!(users.columns["status"].enum_type);
        assert_eq!(users.primary_key.as_ref().unwrap().name, "users_pkey");
        // Constraint-backed indexes are not listed separately.
        assert!(users.indexes.is_empty());
        assert_eq!(users.checks["users_chk"].expression, "length(email) > 3");
        assert_eq!(users.triggers["users_trg"].function, "moddatetime(updated_at)");

        let posts = snapshot.table("posts").unwrap();
        let fk = &posts.foreign_keys["posts_author_fk"];
        assert_eq!(fk.on_delete, ForeignKeyAction::Cascade);
        assert_eq!(fk.on_update, ForeignKeyAction::NoAction);
    }

    #[test]
    fn test_default_hash_comes_from_comment() {
        let snapshot = SnapshotBuilder::new(IntrospectionConfig::new())
            .build(&facts())
            .unwrap();
        let default = snapshot.column("users", "status").unwrap().default.clone().unwrap();
        assert_eq!(default, ColumnDefault::from_sql("'active'"));
        assert_eq!(default.sql, "'active'::status");
    }

    #[test]
    fn test_default_without_comment_hashes_literal() {
        let mut info = column("users", "created_at", "timestamp with time zone", 1);
        info.column_default = Some("now()".into());
        info.comment = Some("not a hash".into());
        let built = build_column(&info, false);
        assert_eq!(built.default, Some(ColumnDefault::from_sql("now()")));
    }

    #[test]
    fn test_check_expression() {
        assert_eq!(check_expression("CHECK ((price > 0))"), "price > 0");
        assert_eq!(check_expression("price > 0"), "price > 0");
        assert_eq!(
            check_expression("CHECK (((a > 0) AND (b > 0)))"),
            "(a > 0) AND (b > 0)"
        );
    }

    #[test]
    fn test_config_should_include_table() {
        let config = IntrospectionConfig::new().exclude_tables(vec!["audit".into()]);
        assert!(config.should_include_table("users"));
        assert!(!config.should_include_table("audit"));
        assert!(!config.should_include_table(LEDGER_TABLE));

        let config = IntrospectionConfig::new().include_tables(vec!["users".into()]);
        assert!(config.should_include_table("users"));
        assert!(!config.should_include_table("posts"));
    }

    #[test]
    fn test_alignment_catalog_fallback() {
        assert!(!CatalogFacts::default().alignment_catalog().is_empty());
    }
}
