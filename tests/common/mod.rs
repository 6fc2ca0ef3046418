//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use parking_lot::Mutex;
use strata::migrate::{
    CatalogFacts, ColumnInfo, ConstraintInfo, ConstraintType, DatabaseError, DatabaseHandle,
    DbResult, EnumInfo, IndexInfo, IntrospectionConfig, SchemaSnapshot, TableInfo, TriggerInfo,
};

/// Database stand-in: records executed statements and reports a catalog the
/// test controls.
#[derive(Default)]
pub struct InMemoryDatabase {
    catalog: Mutex<CatalogFacts>,
    executed: Mutex<Vec<(Vec<String>, bool)>>,
    fail_on: Mutex<Vec<String>>,
}

impl InMemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Database whose catalog matches `snapshot`.
    pub fn with_schema(snapshot: &SchemaSnapshot) -> Self {
        let db = Self::new();
        db.sync(snapshot);
        db
    }

    /// Replace the catalog with the facts PostgreSQL would report for `snapshot`.
    pub fn sync(&self, snapshot: &SchemaSnapshot) {
        *self.catalog.lock() = catalog_of(snapshot);
    }

    /// Replace the catalog.
    pub fn set_catalog(&self, facts: CatalogFacts) {
        *self.catalog.lock() = facts;
    }

    /// Fail every batch containing a statement with `needle`.
    pub fn fail_on(&self, needle: &str) {
        self.fail_on.lock().push(needle.to_string());
    }

    /// Batches executed so far, with their transaction flag.
    pub fn batches(&self) -> Vec<(Vec<String>, bool)> {
        self.executed.lock().clone()
    }

    /// Every executed statement, in order.
    pub fn statements(&self) -> Vec<String> {
        self.executed
            .lock()
            .iter()
            .flat_map(|(statements, _)| statements.clone())
            .collect()
    }
}

#[async_trait::async_trait]
impl DatabaseHandle for InMemoryDatabase {
    async fn execute(&self, statements: &[String], transaction: bool) -> DbResult<()> {
        let fail_on = self.fail_on.lock().clone();
        if let Some(statement) = statements
            .iter()
            .find(|s| fail_on.iter().any(|needle| s.contains(needle.as_str())))
        {
            return Err(DatabaseError::query(format!("failed: {}", statement)));
        }
        self.executed
            .lock()
            .push((statements.to_vec(), transaction));
        Ok(())
    }

    async fn introspect(&self, _config: &IntrospectionConfig) -> DbResult<CatalogFacts> {
        Ok(self.catalog.lock().clone())
    }
}

/// Catalog facts as PostgreSQL reports them once `snapshot` is applied.
pub fn catalog_of(snapshot: &SchemaSnapshot) -> CatalogFacts {
    let mut facts = CatalogFacts::default();

    for (name, values) in &snapshot.enums {
        facts.enums.push(EnumInfo {
            name: name.clone(),
            values: values.clone(),
        });
    }

    for table in snapshot.tables.values() {
        facts.tables.push(TableInfo {
            name: table.name.clone(),
        });

        for (position, column) in table.columns.values().enumerate() {
            facts.columns.push(ColumnInfo {
                table_name: table.name.clone(),
                name: column.name.clone(),
                data_type: column.data_type.clone(),
                is_nullable: column.nullable,
                column_default: column.default.as_ref().map(|d| d.sql.clone()),
                identity: column.identity.map(|identity| match identity {
                    strata::migrate::Identity::Always => "a".to_string(),
                    strata::migrate::Identity::ByDefault => "d".to_string(),
                }),
                ordinal_position: position as i32 + 1,
                comment: column.default.as_ref().map(|d| d.hash.clone()),
            });
        }

        let constraint = |name: &str, kind: ConstraintType, columns: &[String]| ConstraintInfo {
            name: name.to_string(),
            constraint_type: kind,
            table_name: table.name.clone(),
            columns: columns.to_vec(),
            referenced_table: None,
            referenced_columns: Vec::new(),
            on_delete: None,
            on_update: None,
            definition: None,
            nulls_distinct: true,
        };

        if let Some(pk) = &table.primary_key {
            facts
                .constraints
                .push(constraint(&pk.name, ConstraintType::PrimaryKey, &pk.columns));
            facts.indexes.push(IndexInfo {
                name: pk.name.clone(),
                table_name: table.name.clone(),
                columns: pk.columns.clone(),
                is_unique: true,
                is_constraint: true,
                index_method: "btree".into(),
                predicate: None,
            });
        }
        for fk in table.foreign_keys.values() {
            let mut info = constraint(&fk.name, ConstraintType::ForeignKey, &fk.columns);
            info.referenced_table = Some(fk.referenced_table.clone());
            info.referenced_columns = fk.referenced_columns.clone();
            info.on_delete = Some(fk.on_delete.as_sql().to_string());
            info.on_update = Some(fk.on_update.as_sql().to_string());
            facts.constraints.push(info);
        }
        for unique in table.uniques.values() {
            let mut info = constraint(&unique.name, ConstraintType::Unique, &unique.columns);
            info.nulls_distinct = unique.nulls_distinct;
            facts.constraints.push(info);
        }
        for check in table.checks.values() {
            let mut info = constraint(&check.name, ConstraintType::Check, &[]);
            info.definition = Some(format!("CHECK (({}))", check.expression));
            facts.constraints.push(info);
        }
        for index in table.indexes.values() {
            facts.indexes.push(IndexInfo {
                name: index.name.clone(),
                table_name: table.name.clone(),
                columns: index.columns.clone(),
                is_unique: index.unique,
                is_constraint: false,
                index_method: index.method.clone(),
                predicate: index.predicate.as_ref().map(|p| format!("({})", p)),
            });
        }
        for trigger in table.triggers.values() {
            facts.triggers.push(TriggerInfo {
                name: trigger.name.clone(),
                table_name: table.name.clone(),
                timing: trigger.timing.as_sql().to_string(),
                events: trigger.events.clone(),
                orientation: trigger.level.as_sql().to_string(),
                action_statement: format!("EXECUTE FUNCTION {}", deparse_call(&trigger.function)),
            });
        }
    }

    facts
}

/// `pg_get_triggerdef` shows trigger arguments as string literals:
/// `moddatetime(updated_at)` comes back as `moddatetime('updated_at')`.
fn deparse_call(function: &str) -> String {
    let Some((name, args)) = function
        .strip_suffix(')')
        .and_then(|f| f.split_once('('))
    else {
        return function.to_string();
    };
    let args: Vec<String> = args
        .split(',')
        .map(str::trim)
        .filter(|a| !a.is_empty())
        .map(|a| {
            if a.starts_with('\'') {
                a.to_string()
            } else {
                format!("'{}'", a)
            }
        })
        .collect();
    format!("{}({})", name, args.join(", "))
}

/// Position of the first statement containing `needle`.
pub fn position(statements: &[String], needle: &str) -> usize {
    statements
        .iter()
        .position(|s| s.contains(needle))
        .unwrap_or_else(|| panic!("no statement contains {:?}: {:#?}", needle, statements))
}
