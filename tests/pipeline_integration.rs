//! End-to-end tests: compile, diff, generate, sort, write, apply, roll back.

mod common;

use common::{InMemoryDatabase, catalog_of, position};
use pretty_assertions::assert_eq;
use strata::migrate::naming::hash_value;
use strata::migrate::{
    ChangesetType, ChangesetWarning, Column, ForeignKey, Index, LedgerStatus, MemoryLedger,
    MigrationConfig, MigrationEngine, MigrationError, MigrationPhase, PhaseSelection,
    RenameContext, Schema, SchemaSnapshot, Table, Trigger, TriggerTiming,
};
use tempfile::TempDir;

type Engine = MigrationEngine<InMemoryDatabase, MemoryLedger>;

fn config(dir: &TempDir) -> MigrationConfig {
    MigrationConfig::new()
        .migrations_dir(dir.path().join("migrations"))
        .renames_file(dir.path().join("migrations").join("renames.toml"))
}

fn engine(dir: &TempDir, db: InMemoryDatabase) -> Engine {
    MigrationEngine::new(config(dir), db, MemoryLedger::new())
}

/// Engine that may write plans dropping data.
fn lossy_engine(dir: &TempDir, db: InMemoryDatabase) -> Engine {
    MigrationEngine::new(config(dir).allow_data_loss(true), db, MemoryLedger::new())
}

fn app_schema() -> Schema {
    Schema::new("public")
        .enum_type("role", ["admin", "member"])
        .table(
            Table::new("posts")
                .column(Column::new("id", "bigint").identity_always())
                .column(Column::new("author_id", "bigint").not_null())
                .column(Column::new("title", "text").not_null())
                .column(Column::new("updated_at", "timestamp with time zone").default_sql("now()"))
                .primary_key(["id"])
                .foreign_key(ForeignKey::new(["author_id"], "users", ["id"]))
                .index(Index::new(["author_id"]))
                .trigger(Trigger::new(
                    TriggerTiming::Before,
                    ["update"],
                    "moddatetime(updated_at)",
                )),
        )
        .table(
            Table::new("users")
                .column(Column::new("id", "bigint").identity_always())
                .column(Column::new("email", "text").not_null())
                .column(Column::enumerated("role", "role").default_sql("'member'"))
                .primary_key(["id"])
                .unique(["email"])
                .check("length(email) > 3"),
        )
}

fn compiled(schema: Schema) -> SchemaSnapshot {
    schema.compile().unwrap()
}

#[tokio::test]
async fn test_generate_on_empty_database_writes_expand_migrations() {
    let dir = TempDir::new().unwrap();
    let engine = engine(&dir, InMemoryDatabase::new());
    let local = compiled(app_schema());

    let (plan, files) = engine.generate(&local, "init").await.unwrap();

    assert!(!plan.is_empty());
    assert!(!plan.has_data_loss());
    assert!(!files.is_empty());
    assert!(files.iter().all(|f| f.phase == MigrationPhase::Expand));
    assert!(files.iter().all(|f| f.path.exists()));

    let up: Vec<String> = files.iter().flat_map(|f| f.up.clone()).collect();
    let create_enum = position(&up, "CREATE TYPE \"public\".\"role\"");
    let create_users = position(&up, "CREATE TABLE \"public\".\"users\"");
    let create_posts = position(&up, "CREATE TABLE \"public\".\"posts\"");
    let add_fk = position(&up, "FOREIGN KEY");
    let trigger = position(&up, "CREATE TRIGGER");

    assert!(create_enum < create_users);
    assert!(create_users < create_posts, "referenced table first");
    assert!(create_posts < add_fk);
    assert!(add_fk < trigger);

    let listed = engine.file_manager().list_migrations().await.unwrap();
    assert_eq!(listed.len(), files.len());
}

#[tokio::test]
async fn test_applied_schema_diffs_to_nothing() {
    let dir = TempDir::new().unwrap();
    let engine = engine(&dir, InMemoryDatabase::new());
    let local = compiled(app_schema());

    engine.generate(&local, "init").await.unwrap();
    let report = engine.apply(PhaseSelection::All).await.unwrap();
    assert!(report.is_success());
    assert!(!engine.database().statements().is_empty());

    // The database now holds what the migrations created.
    engine.database().sync(&local);
    let plan = engine.plan(&local).await.unwrap();
    assert!(plan.is_empty(), "unexpected changesets: {:#?}", plan.changesets);
    assert_eq!(plan.summary(), "No schema changes detected");
}

#[tokio::test]
async fn test_cosmetic_default_change_produces_no_changeset() {
    let dir = TempDir::new().unwrap();
    let local = compiled(
        Schema::new("public").table(
            Table::new("users")
                .column(Column::new("id", "bigint").not_null())
                .column(Column::new("status", "text").default_sql("'active'")),
        ),
    );

    let mut facts = catalog_of(&local);
    let status = facts
        .columns
        .iter_mut()
        .find(|c| c.name == "status")
        .unwrap();
    // The catalog spells the literal differently; the comment keeps the hash.
    status.column_default = Some("'active'::text".into());
    status.comment = Some(hash_value("'active'"));

    let db = InMemoryDatabase::new();
    db.set_catalog(facts);
    let plan = engine(&dir, db).plan(&local).await.unwrap();
    assert!(plan.is_empty(), "unexpected changesets: {:#?}", plan.changesets);
}

#[tokio::test]
async fn test_semantic_default_change_is_detected() {
    let dir = TempDir::new().unwrap();
    let remote = compiled(
        Schema::new("public")
            .table(Table::new("users").column(Column::new("status", "text").default_sql("'active'"))),
    );
    let local = compiled(
        Schema::new("public")
            .table(Table::new("users").column(Column::new("status", "text").default_sql("'pending'"))),
    );

    let plan = engine(&dir, InMemoryDatabase::with_schema(&remote))
        .plan(&local)
        .await
        .unwrap();
    let types: Vec<ChangesetType> = plan.changesets.iter().map(|c| c.changeset_type).collect();
    assert_eq!(types, vec![ChangesetType::ChangeColumnDefault]);
    assert_eq!(plan.changesets[0].phase, MigrationPhase::Alter);
}

#[tokio::test]
async fn test_new_table_columns_are_aligned() {
    let dir = TempDir::new().unwrap();
    let local = compiled(
        Schema::new("public").table(
            Table::new("metrics")
                .column(Column::new("a", "bigint"))
                .column(Column::new("b", "text"))
                .column(Column::new("c", "smallint").not_null())
                .column(Column::new("d", "smallint")),
        ),
    );

    let plan = engine(&dir, InMemoryDatabase::new()).plan(&local).await.unwrap();
    let create = plan
        .changesets
        .iter()
        .find(|c| c.changeset_type == ChangesetType::CreateTable)
        .unwrap();
    let statement = &create.up[0];

    let at = |column: &str| statement.find(&format!("\"{}\" ", column)).unwrap();
    assert!(at("a") < at("c"));
    assert!(at("c") < at("d"));
    assert!(at("d") < at("b"));
}

#[tokio::test]
async fn test_table_rename_is_not_drop_and_create() {
    let dir = TempDir::new().unwrap();
    let remote = compiled(
        Schema::new("public").table(
            Table::new("users")
                .column(Column::new("id", "bigint").not_null())
                .column(Column::new("email", "text"))
                .primary_key(["id"]),
        ),
    );
    let local = compiled(
        Schema::new("public").table(
            Table::new("accounts")
                .column(Column::new("id", "bigint").not_null())
                .column(Column::new("email", "text"))
                .primary_key(["id"]),
        ),
    );

    let engine = engine(&dir, InMemoryDatabase::with_schema(&remote));
    let mut renames = RenameContext::new();
    renames.rename_table("public", "users", "accounts");
    renames.save(&engine.config().renames_file).await.unwrap();

    let plan = engine.plan(&local).await.unwrap();
    assert!(!plan.has_data_loss());
    assert!(
        plan.changesets
            .iter()
            .all(|c| !matches!(c.changeset_type, ChangesetType::CreateTable | ChangesetType::DropTable))
    );

    let rename = plan
        .changesets
        .iter()
        .find(|c| c.changeset_type == ChangesetType::RenameTable)
        .unwrap();
    assert_eq!(rename.phase, MigrationPhase::Alter);
    assert_eq!(rename.up, vec!["ALTER TABLE \"public\".\"users\" RENAME TO \"accounts\";"]);
    assert!(rename.warnings.contains(&ChangesetWarning::BackwardIncompatible {
        from: "users".into(),
        to: "accounts".into(),
    }));
}

fn audited(table: &str) -> SchemaSnapshot {
    compiled(
        Schema::new("public").table(
            Table::new(table)
                .column(Column::new("id", "bigint").not_null())
                .column(Column::new("email", "text").not_null())
                .column(Column::new("deleted_at", "timestamp with time zone"))
                .column(Column::new("updated_at", "timestamp with time zone"))
                .primary_key(["id"])
                .check("length(email) > 3")
                .index(Index::new(["email"]).where_clause("deleted_at IS NULL"))
                .trigger(Trigger::new(
                    TriggerTiming::Before,
                    ["update"],
                    "moddatetime(updated_at)",
                )),
        ),
    )
}

#[tokio::test]
async fn test_introspected_expressions_diff_to_nothing() {
    let dir = TempDir::new().unwrap();
    let local = audited("users");

    let facts = catalog_of(&local);
    assert!(
        facts
            .constraints
            .iter()
            .any(|c| c.definition.as_deref() == Some("CHECK ((length(email) > 3))"))
    );

    let plan = engine(&dir, InMemoryDatabase::with_schema(&local))
        .plan(&local)
        .await
        .unwrap();
    assert!(plan.is_empty(), "unexpected changesets: {:#?}", plan.changesets);
}

#[tokio::test]
async fn test_table_rename_carries_check_index_and_trigger() {
    let dir = TempDir::new().unwrap();
    let engine = engine(&dir, InMemoryDatabase::with_schema(&audited("users")));
    let mut renames = RenameContext::new();
    renames.rename_table("public", "users", "accounts");
    renames.save(&engine.config().renames_file).await.unwrap();

    let plan = engine.plan(&audited("accounts")).await.unwrap();
    let types: Vec<ChangesetType> = plan.changesets.iter().map(|c| c.changeset_type).collect();
    for recreated in [
        ChangesetType::CreateCheck,
        ChangesetType::DropCheck,
        ChangesetType::CreateIndex,
        ChangesetType::DropIndex,
        ChangesetType::CreateTrigger,
        ChangesetType::DropTrigger,
    ] {
        assert!(!types.contains(&recreated), "{:?} in {:?}", recreated, types);
    }
    // Primary key and check constraint.
    assert_eq!(
        types.iter().filter(|t| **t == ChangesetType::RenameConstraint).count(),
        2
    );
    assert!(types.contains(&ChangesetType::RenameIndex));
    assert!(types.contains(&ChangesetType::RenameTrigger));
    assert!(!plan.has_data_loss());
}

#[tokio::test]
async fn test_dropped_table_is_destructive_contract_change() {
    let dir = TempDir::new().unwrap();
    let remote = compiled(
        Schema::new("public")
            .table(Table::new("users").column(Column::new("id", "bigint")))
            .table(Table::new("legacy").column(Column::new("id", "bigint"))),
    );
    let local = compiled(
        Schema::new("public").table(Table::new("users").column(Column::new("id", "bigint"))),
    );

    let err = engine(&dir, InMemoryDatabase::with_schema(&remote))
        .generate(&local, "drop_legacy")
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        MigrationError::DataLoss { count: 1, ref changesets } if changesets == &["DropTable (legacy)"]
    ));
    assert!(!dir.path().join("migrations").join("contract").exists());

    let engine = lossy_engine(&dir, InMemoryDatabase::with_schema(&remote));
    let (plan, files) = engine.generate(&local, "drop_legacy").await.unwrap();

    assert!(plan.has_data_loss());
    assert_eq!(plan.destructive().count(), 1);
    assert!(plan.summary().contains("1 destructive"));
    assert_eq!(plan.warnings.len(), 1);
    assert!(plan.warnings[0].starts_with("DropTable (legacy)"));

    assert_eq!(files.len(), 1);
    assert_eq!(files[0].phase, MigrationPhase::Contract);
    assert_eq!(files[0].up, vec!["DROP TABLE \"public\".\"legacy\";"]);
    assert!(!files[0].down.is_empty());
}

#[tokio::test]
async fn test_phases_apply_in_order_and_roll_back_fully() {
    let dir = TempDir::new().unwrap();
    let remote = compiled(
        Schema::new("public")
            .table(Table::new("users").column(Column::new("id", "bigint")))
            .table(Table::new("legacy").column(Column::new("id", "bigint"))),
    );
    let local = compiled(
        Schema::new("public").table(
            Table::new("users")
                .column(Column::new("id", "bigint"))
                .column(Column::new("email", "text")),
        ),
    );

    let engine = lossy_engine(&dir, InMemoryDatabase::with_schema(&remote));
    let (_, files) = engine.generate(&local, "reshape").await.unwrap();
    let phases: Vec<MigrationPhase> = files.iter().map(|f| f.phase).collect();
    assert_eq!(phases, vec![MigrationPhase::Expand, MigrationPhase::Contract]);

    // Contract needs the expand migration applied first.
    let err = engine
        .apply(PhaseSelection::Phase(MigrationPhase::Contract))
        .await
        .unwrap_err();
    assert!(matches!(err, MigrationError::PendingPhases { .. }));
    assert!(engine.database().statements().is_empty());

    engine
        .apply(PhaseSelection::Phase(MigrationPhase::Expand))
        .await
        .unwrap();
    engine
        .apply(PhaseSelection::Phase(MigrationPhase::Contract))
        .await
        .unwrap();

    let statements = engine.database().statements();
    assert!(position(&statements, "ADD COLUMN") < position(&statements, "DROP TABLE"));

    let status = engine.status().await.unwrap();
    assert!(status.is_up_to_date());

    let report = engine.rollback_last(files.len()).await.unwrap();
    assert!(report.is_success());
    for file in &files {
        assert_eq!(
            engine.ledger().status(&file.name),
            Some(LedgerStatus::RolledBack)
        );
    }
    assert!(engine.executed().await.unwrap().is_empty());

    // Contract is undone before expand.
    let statements = engine.database().statements();
    let recreate = position(&statements, "CREATE TABLE \"public\".\"legacy\"");
    let drop_column = position(&statements, "DROP COLUMN");
    assert!(recreate < drop_column);
}

#[tokio::test]
async fn test_scaffolded_data_migration_runs_in_data_phase() {
    let dir = TempDir::new().unwrap();
    let engine = engine(&dir, InMemoryDatabase::new());

    let mut file = engine.scaffold("backfill").await.unwrap();
    assert_eq!(file.phase, MigrationPhase::Data);
    assert!(file.scaffold);

    file.up = vec!["UPDATE users SET email = lower(email);".into()];
    engine.file_manager().write_migration(&mut file).await.unwrap();

    let report = engine
        .apply(PhaseSelection::Phase(MigrationPhase::Data))
        .await
        .unwrap();
    assert!(report.is_success());
    assert_eq!(
        engine.database().statements(),
        vec!["UPDATE users SET email = lower(email);".to_string()]
    );
}

#[tokio::test]
async fn test_dry_run_touches_nothing() {
    let dir = TempDir::new().unwrap();
    let config = config(&dir).dry_run(true);
    let engine = MigrationEngine::new(config, InMemoryDatabase::new(), MemoryLedger::new());
    let local = compiled(app_schema());

    let (plan, files) = engine.generate(&local, "init").await.unwrap();
    assert!(!plan.is_empty());
    assert!(!files.is_empty());
    assert!(!dir.path().join("migrations").exists());

    let report = engine.apply(PhaseSelection::All).await.unwrap();
    assert!(report.is_empty());
    assert!(engine.database().statements().is_empty());
}
