//! In-code schema description and its compiler.
//!
//! ```rust,ignore
//! use strata_migrate::schema::{Column, ForeignKey, Index, Schema, Table};
//!
//! let schema = Schema::new("public")
//!     .enum_type("role", ["admin", "member"])
//!     .table(
//!         Table::new("users")
//!             .column(Column::new("id", "bigint").identity_always())
//!             .column(Column::new("email", "text").not_null())
//!             .column(Column::enumerated("role", "role").default_sql("'member'"))
//!             .primary_key(["id"])
//!             .unique(["email"]),
//!     )
//!     .table(
//!         Table::new("posts")
//!             .column(Column::new("id", "bigint").identity_always())
//!             .column(Column::new("author_id", "bigint").not_null())
//!             .primary_key(["id"])
//!             .foreign_key(ForeignKey::new(["author_id"], "users", ["id"]))
//!             .index(Index::new(["author_id"])),
//!     );
//!
//! let snapshot = schema.compile()?;
//! ```

use std::collections::BTreeSet;

use indexmap::IndexMap;

use crate::dependency;
use crate::error::{MigrateResult, MigrationError};
use crate::naming::primary_key_name;
use crate::snapshot::{
    CheckSnapshot, ColumnDefault, ColumnSnapshot, ForeignKeyAction, ForeignKeySnapshot, Identity,
    IndexSnapshot, PrimaryKeySnapshot, SchemaSnapshot, TableSnapshot, TriggerLevel,
    TriggerSnapshot, TriggerTiming, UniqueSnapshot,
};

/// Trigger events in the order the catalog reports them.
const TRIGGER_EVENTS: [&str; 4] = ["INSERT", "UPDATE", "DELETE", "TRUNCATE"];

/// Declarative description of a database schema.
#[derive(Debug, Clone)]
pub struct Schema {
    name: String,
    tables: Vec<Table>,
    enums: Vec<(String, Vec<String>)>,
}

impl Schema {
    /// Start a schema description.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tables: Vec::new(),
            enums: Vec::new(),
        }
    }

    /// Schema name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declare an enum type.
    pub fn enum_type<I, S>(mut self, name: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.enums
            .push((name.into(), values.into_iter().map(Into::into).collect()));
        self
    }

    /// Add a table.
    pub fn table(mut self, table: Table) -> Self {
        self.tables.push(table);
        self
    }

    /// Compile into a canonical snapshot.
    pub fn compile(&self) -> MigrateResult<SchemaSnapshot> {
        let mut snapshot = SchemaSnapshot::new(&self.name);

        for (name, values) in &self.enums {
            let mut seen = BTreeSet::new();
            for value in values {
                if !seen.insert(value) {
                    return Err(MigrationError::schema(format!(
                        "enum '{}' declares value '{}' twice",
                        name, value
                    )));
                }
            }
            if snapshot.enums.insert(name.clone(), values.clone()).is_some() {
                return Err(MigrationError::schema(format!(
                    "enum '{}' is declared twice",
                    name
                )));
            }
        }

        for table in &self.tables {
            let compiled = table.compile(&snapshot)?;
            if snapshot.tables.contains_key(&compiled.name) {
                return Err(MigrationError::schema(format!(
                    "table '{}' is declared twice",
                    compiled.name
                )));
            }
            snapshot.tables.insert(compiled.name.clone(), compiled);
        }

        validate_references(&snapshot)?;
        snapshot.table_priorities = dependency::topological_order(&snapshot);

        Ok(snapshot)
    }
}

fn validate_references(snapshot: &SchemaSnapshot) -> MigrateResult<()> {
    for table in snapshot.tables.values() {
        for fk in table.foreign_keys.values() {
            let target = snapshot.table(&fk.referenced_table).ok_or_else(|| {
                MigrationError::schema(format!(
                    "foreign key on '{}' references unknown table '{}'",
                    table.name, fk.referenced_table
                ))
            })?;
            for column in &fk.referenced_columns {
                if !target.columns.contains_key(column) {
                    return Err(MigrationError::schema(format!(
                        "foreign key on '{}' references unknown column '{}.{}'",
                        table.name, fk.referenced_table, column
                    )));
                }
            }
            if fk.columns.len() != fk.referenced_columns.len() {
                return Err(MigrationError::schema(format!(
                    "foreign key on '{}' has {} columns but references {}",
                    table.name,
                    fk.columns.len(),
                    fk.referenced_columns.len()
                )));
            }
        }
    }
    Ok(())
}

/// A table description.
#[derive(Debug, Clone)]
pub struct Table {
    name: String,
    columns: Vec<Column>,
    primary_key: Vec<String>,
    foreign_keys: Vec<ForeignKey>,
    uniques: Vec<Unique>,
    checks: Vec<String>,
    indexes: Vec<Index>,
    triggers: Vec<Trigger>,
}

impl Table {
    /// Start a table description.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
            primary_key: Vec::new(),
            foreign_keys: Vec::new(),
            uniques: Vec::new(),
            checks: Vec::new(),
            indexes: Vec::new(),
            triggers: Vec::new(),
        }
    }

    /// Add a column.
    pub fn column(mut self, column: Column) -> Self {
        self.columns.push(column);
        self
    }

    /// Set the primary key columns.
    pub fn primary_key<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.primary_key = columns.into_iter().map(Into::into).collect();
        self
    }

    /// Add a foreign key.
    pub fn foreign_key(mut self, fk: ForeignKey) -> Self {
        self.foreign_keys.push(fk);
        self
    }

    /// Add a unique constraint with distinct NULLs.
    pub fn unique<I, S>(self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.unique_constraint(Unique::new(columns))
    }

    /// Add a unique constraint.
    pub fn unique_constraint(mut self, unique: Unique) -> Self {
        self.uniques.push(unique);
        self
    }

    /// Add a check constraint.
    pub fn check(mut self, expression: impl Into<String>) -> Self {
        self.checks.push(expression.into());
        self
    }

    /// Add an index.
    pub fn index(mut self, index: Index) -> Self {
        self.indexes.push(index);
        self
    }

    /// Add a trigger.
    pub fn trigger(mut self, trigger: Trigger) -> Self {
        self.triggers.push(trigger);
        self
    }

    fn compile(&self, schema: &SchemaSnapshot) -> MigrateResult<TableSnapshot> {
        let mut table = TableSnapshot::new(&self.name);
        let mut columns = IndexMap::new();

        for column in &self.columns {
            let compiled = column.compile();
            if column.enumerated && !schema.is_enum(&column.data_type) {
                return Err(MigrationError::schema(format!(
                    "column '{}.{}' uses unknown enum '{}'",
                    self.name, column.name, column.data_type
                )));
            }
            if columns.insert(column.name.clone(), compiled).is_some() {
                return Err(MigrationError::schema(format!(
                    "column '{}.{}' is declared twice",
                    self.name, column.name
                )));
            }
        }

        let require = |cols: &[String], what: &str| -> MigrateResult<()> {
            for col in cols {
                if !columns.contains_key(col) {
                    return Err(MigrationError::schema(format!(
                        "{} on '{}' uses unknown column '{}'",
                        what, self.name, col
                    )));
                }
            }
            if cols.is_empty() {
                return Err(MigrationError::schema(format!(
                    "{} on '{}' has no columns",
                    what, self.name
                )));
            }
            Ok(())
        };

        if !self.primary_key.is_empty() {
            require(&self.primary_key, "primary key")?;
            table.primary_key = Some(PrimaryKeySnapshot {
                name: primary_key_name(&self.name),
                columns: self.primary_key.clone(),
            });
        }

        for fk in &self.foreign_keys {
            require(&fk.columns, "foreign key")?;
            let mut snapshot = ForeignKeySnapshot {
                name: String::new(),
                columns: fk.columns.clone(),
                referenced_table: fk.referenced_table.clone(),
                referenced_columns: fk.referenced_columns.clone(),
                on_delete: fk.on_delete,
                on_update: fk.on_update,
            };
            snapshot.name = snapshot.generated_name(&self.name);
            table.foreign_keys.insert(snapshot.name.clone(), snapshot);
        }

        for unique in &self.uniques {
            require(&unique.columns, "unique constraint")?;
            let mut snapshot = UniqueSnapshot {
                name: String::new(),
                columns: unique.columns.clone(),
                nulls_distinct: unique.nulls_distinct,
            };
            snapshot.name = snapshot.generated_name(&self.name);
            table.uniques.insert(snapshot.name.clone(), snapshot);
        }

        for expression in &self.checks {
            let mut snapshot = CheckSnapshot {
                name: String::new(),
                expression: expression.clone(),
            };
            snapshot.name = snapshot.generated_name(&self.name);
            table.checks.insert(snapshot.name.clone(), snapshot);
        }

        for index in &self.indexes {
            require(&index.columns, "index")?;
            let mut snapshot = IndexSnapshot {
                name: String::new(),
                columns: index.columns.clone(),
                unique: index.unique,
                method: index.method.clone(),
                predicate: index.predicate.clone(),
            };
            snapshot.name = snapshot.generated_name(&self.name);
            table.indexes.insert(snapshot.name.clone(), snapshot);
        }

        for trigger in &self.triggers {
            if trigger.events.is_empty() {
                return Err(MigrationError::schema(format!(
                    "trigger on '{}' has no events",
                    self.name
                )));
            }
            let mut events = trigger.events.clone();
            events.sort_by_key(|event| {
                TRIGGER_EVENTS
                    .iter()
                    .position(|known| *known == event.as_str())
                    .unwrap_or(TRIGGER_EVENTS.len())
            });
            let mut snapshot = TriggerSnapshot {
                name: String::new(),
                timing: trigger.timing,
                events,
                level: trigger.level,
                function: trigger.function.clone(),
            };
            snapshot.name = snapshot.generated_name(&self.name);
            table.triggers.insert(snapshot.name.clone(), snapshot);
        }

        // Primary key columns are NOT NULL in the catalog whatever was declared.
        for name in &self.primary_key {
            if let Some(column) = columns.get_mut(name) {
                column.nullable = false;
            }
        }

        table.columns = columns;
        Ok(table)
    }
}

/// A column description. Columns are nullable unless marked otherwise.
#[derive(Debug, Clone)]
pub struct Column {
    name: String,
    data_type: String,
    nullable: bool,
    default: Option<String>,
    identity: Option<Identity>,
    enumerated: bool,
}

impl Column {
    /// Create a column of a built-in or domain type.
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            nullable: true,
            default: None,
            identity: None,
            enumerated: false,
        }
    }

    /// Create a column backed by one of the schema's enum types.
    pub fn enumerated(name: impl Into<String>, enum_name: impl Into<String>) -> Self {
        Self {
            enumerated: true,
            ..Self::new(name, enum_name)
        }
    }

    /// Mark the column NOT NULL.
    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    /// Set a default SQL expression.
    pub fn default_sql(mut self, sql: impl Into<String>) -> Self {
        self.default = Some(sql.into());
        self
    }

    /// `GENERATED ALWAYS AS IDENTITY`.
    pub fn identity_always(mut self) -> Self {
        self.identity = Some(Identity::Always);
        self.nullable = false;
        self
    }

    /// `GENERATED BY DEFAULT AS IDENTITY`.
    pub fn identity_by_default(mut self) -> Self {
        self.identity = Some(Identity::ByDefault);
        self.nullable = false;
        self
    }

    fn compile(&self) -> ColumnSnapshot {
        ColumnSnapshot {
            name: self.name.clone(),
            data_type: self.data_type.clone(),
            nullable: self.nullable,
            default: self.default.as_deref().map(ColumnDefault::from_sql),
            identity: self.identity,
            enum_type: self.enumerated,
        }
    }
}

/// A foreign key description.
#[derive(Debug, Clone)]
pub struct ForeignKey {
    columns: Vec<String>,
    referenced_table: String,
    referenced_columns: Vec<String>,
    on_delete: ForeignKeyAction,
    on_update: ForeignKeyAction,
}

impl ForeignKey {
    /// Reference `columns` of `table` from `columns`.
    pub fn new<I, S, J, T>(columns: I, table: impl Into<String>, referenced: J) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        J: IntoIterator<Item = T>,
        T: Into<String>,
    {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            referenced_table: table.into(),
            referenced_columns: referenced.into_iter().map(Into::into).collect(),
            on_delete: ForeignKeyAction::NoAction,
            on_update: ForeignKeyAction::NoAction,
        }
    }

    /// Set the `ON DELETE` action.
    pub fn on_delete(mut self, action: ForeignKeyAction) -> Self {
        self.on_delete = action;
        self
    }

    /// Set the `ON UPDATE` action.
    pub fn on_update(mut self, action: ForeignKeyAction) -> Self {
        self.on_update = action;
        self
    }
}

/// A unique constraint description.
#[derive(Debug, Clone)]
pub struct Unique {
    columns: Vec<String>,
    nulls_distinct: bool,
}

impl Unique {
    /// Unique over `columns` with distinct NULLs.
    pub fn new<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            nulls_distinct: true,
        }
    }

    /// Treat NULLs as equal (`NULLS NOT DISTINCT`).
    pub fn nulls_not_distinct(mut self) -> Self {
        self.nulls_distinct = false;
        self
    }
}

/// An index description.
#[derive(Debug, Clone)]
pub struct Index {
    columns: Vec<String>,
    unique: bool,
    method: String,
    predicate: Option<String>,
}

impl Index {
    /// B-tree index over `columns`.
    pub fn new<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            unique: false,
            method: "btree".to_string(),
            predicate: None,
        }
    }

    /// Make the index unique.
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Use another access method.
    pub fn using(mut self, method: impl Into<String>) -> Self {
        self.method = method.into().to_ascii_lowercase();
        self
    }

    /// Restrict the index to rows matching `predicate`.
    pub fn where_clause(mut self, predicate: impl Into<String>) -> Self {
        self.predicate = Some(predicate.into());
        self
    }
}

/// A trigger description.
#[derive(Debug, Clone)]
pub struct Trigger {
    timing: TriggerTiming,
    events: Vec<String>,
    level: TriggerLevel,
    function: String,
}

impl Trigger {
    /// Row-level trigger firing at `timing` on `events`.
    pub fn new<I, S>(timing: TriggerTiming, events: I, function: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            timing,
            events: events
                .into_iter()
                .map(|e| e.into().to_ascii_uppercase())
                .collect(),
            level: TriggerLevel::Row,
            function: function.into(),
        }
    }

    /// Fire once per statement instead of once per row.
    pub fn for_each_statement(mut self) -> Self {
        self.level = TriggerLevel::Statement;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn users() -> Table {
        Table::new("users")
            .column(Column::new("id", "bigint"))
            .column(Column::new("email", "text").not_null())
            .primary_key(["id"])
            .unique(["email"])
    }

    #[test]
    fn test_compile_basic_table() {
        let snapshot = Schema::new("public").table(users()).compile().unwrap();
        let table = snapshot.table("users").unwrap();

        assert_eq!(table.columns.len(), 2);
        assert_eq!(table.primary_key.as_ref().unwrap().name, "users_pkey");
        // Primary key columns become NOT NULL.
        assert!(!table.columns["id"].nullable);
        assert_eq!(table.uniques.len(), 1);
        let unique = table.uniques.values().next().unwrap();
        assert_eq!(unique.name, unique.generated_name("users"));
    }

    #[test]
    fn test_compile_is_deterministic() {
        let a = Schema::new("public").table(users()).compile().unwrap();
        let b = Schema::new("public").table(users()).compile().unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_compile_rejects_unknown_fk_table() {
        let schema = Schema::new("public").table(
            Table::new("posts")
                .column(Column::new("user_id", "bigint"))
                .foreign_key(ForeignKey::new(["user_id"], "users", ["id"])),
        );
        let err = schema.compile().unwrap_err();
        assert!(err.to_string().contains("unknown table 'users'"));
    }

    #[test]
    fn test_compile_rejects_unknown_enum() {
        let schema = Schema::new("public")
            .table(Table::new("users").column(Column::enumerated("role", "role")));
        assert!(matches!(schema.compile(), Err(MigrationError::Schema(_))));
    }

    #[test]
    fn test_compile_sets_table_priorities() {
        let snapshot = Schema::new("public")
            .table(
                Table::new("posts")
                    .column(Column::new("user_id", "bigint"))
                    .foreign_key(ForeignKey::new(["user_id"], "users", ["id"])),
            )
            .table(users())
            .compile()
            .unwrap();
        assert_eq!(snapshot.table_priorities, vec!["users", "posts"]);
    }

    #[test]
    fn test_enum_column_flagged() {
        let snapshot = Schema::new("public")
            .enum_type("role", ["admin", "member"])
            .table(Table::new("users").column(Column::enumerated("role", "role")))
            .compile()
            .unwrap();
        assert!(snapshot.column("users", "role").unwrap().enum_type);
        assert_eq!(snapshot.enums["role"], vec!["admin", "member"]);
    }
}
