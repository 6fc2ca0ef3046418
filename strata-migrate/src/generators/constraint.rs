use crate::changeset::{Changeset, ChangesetType, ChangesetWarning, priority};
use crate::diff::{DiffPath, DiffValue, Difference};
use crate::error::{MigrateResult, MigrationError};
use crate::migration::MigrationPhase;
use crate::naming::ObjectKind;
use crate::snapshot::{CheckSnapshot, ForeignKeySnapshot, PrimaryKeySnapshot, UniqueSnapshot};

use super::{GeneratorContext, table_of};

pub(super) fn add_primary_key(
    ctx: &GeneratorContext<'_>,
    table: &str,
    pk: &PrimaryKeySnapshot,
    phase: MigrationPhase,
) -> Changeset {
    Changeset::new(
        ChangesetType::CreatePrimaryKey,
        phase,
        priority::PRIMARY_KEY_CREATE,
    )
    .table(table)
    .up(ctx.sql.add_primary_key(table, pk))
    .down(ctx.sql.drop_constraint(table, &pk.name))
}

/// Primary key on a new table, or on an existing one together with the
/// NOT NULL changesets its nullable columns need first.
pub(super) fn primary_key_create(
    diff: &Difference,
    ctx: &GeneratorContext<'_>,
) -> MigrateResult<Vec<Changeset>> {
    let table = table_of(diff)?;
    let pk = diff.value(DiffValue::as_primary_key)?;

    let Some(remote) = ctx.remote.table(table) else {
        return Ok(vec![add_primary_key(ctx, table, pk, MigrationPhase::Expand)]);
    };

    let mut changesets = Vec::new();
    for column in &pk.columns {
        if remote.columns.get(column).is_some_and(|c| c.nullable) {
            changesets.push(
                Changeset::new(
                    ChangesetType::ChangeColumnNullable,
                    MigrationPhase::Alter,
                    priority::PRIMARY_KEY_NULLABILITY,
                )
                .table(table)
                .up(ctx.sql.set_not_null(table, column))
                .down(ctx.sql.drop_not_null(table, column))
                .warning(ChangesetWarning::MightFail {
                    reason: format!("{}.{} may contain NULL values", table, column),
                }),
            );
        }
    }

    changesets.push(
        add_primary_key(ctx, table, pk, MigrationPhase::Alter).warning(
            ChangesetWarning::MightFail {
                reason: format!("{} may contain duplicate keys", table),
            },
        ),
    );
    Ok(changesets)
}

pub(super) fn primary_key_drop(
    diff: &Difference,
    ctx: &GeneratorContext<'_>,
) -> MigrateResult<Vec<Changeset>> {
    let table = table_of(diff)?;
    let pk = diff.old_value(DiffValue::as_primary_key)?;

    Ok(vec![
        Changeset::new(
            ChangesetType::DropPrimaryKey,
            MigrationPhase::Alter,
            priority::PRIMARY_KEY_DROP,
        )
        .table(table)
        .up(ctx.sql.drop_constraint(table, &pk.name))
        .down(ctx.sql.add_primary_key(table, pk)),
    ])
}

/// Foreign keys are created in the expand phase, so the referencing and
/// referenced tables are addressed by their pre-rename names.
pub(super) fn add_foreign_key(
    ctx: &GeneratorContext<'_>,
    table: &str,
    fk: &ForeignKeySnapshot,
) -> Changeset {
    let current = ctx.current_table(table);
    let referenced = ctx.current_table(&fk.referenced_table);
    let referenced_columns = ctx.current_columns(&fk.referenced_table, &fk.referenced_columns);
    let statement_fk = ForeignKeySnapshot {
        columns: ctx.current_columns(table, &fk.columns),
        ..fk.clone()
    };

    Changeset::new(
        ChangesetType::CreateForeignKey,
        MigrationPhase::Expand,
        priority::FOREIGN_KEY_CREATE,
    )
    .tables(table, current)
    .up(ctx.sql.add_foreign_key(current, &statement_fk, referenced, &referenced_columns))
    .down(ctx.sql.drop_constraint(current, &fk.name))
}

pub(super) fn foreign_key_create(
    diff: &Difference,
    ctx: &GeneratorContext<'_>,
) -> MigrateResult<Vec<Changeset>> {
    let table = table_of(diff)?;
    let fk = diff.value(DiffValue::as_foreign_key)?;
    Ok(vec![add_foreign_key(ctx, table, fk)])
}

pub(super) fn foreign_key_drop(
    diff: &Difference,
    ctx: &GeneratorContext<'_>,
) -> MigrateResult<Vec<Changeset>> {
    let table = table_of(diff)?;
    let fk = diff.old_value(DiffValue::as_foreign_key)?;

    Ok(vec![
        Changeset::new(
            ChangesetType::DropForeignKey,
            MigrationPhase::Contract,
            priority::FOREIGN_KEY_DROP,
        )
        .table(table)
        .up(ctx.sql.drop_constraint(table, &fk.name))
        .down(ctx.sql.add_foreign_key(
            table,
            fk,
            &fk.referenced_table,
            &fk.referenced_columns,
        )),
    ])
}

pub(super) fn add_unique(
    ctx: &GeneratorContext<'_>,
    table: &str,
    unique: &UniqueSnapshot,
) -> Changeset {
    let current = ctx.current_table(table);
    let statement_unique = UniqueSnapshot {
        columns: ctx.current_columns(table, &unique.columns),
        ..unique.clone()
    };

    Changeset::new(
        ChangesetType::CreateUnique,
        MigrationPhase::Expand,
        priority::UNIQUE_CREATE,
    )
    .tables(table, current)
    .up(ctx.sql.add_unique(current, &statement_unique))
    .down(ctx.sql.drop_constraint(current, &unique.name))
}

pub(super) fn unique_create(
    diff: &Difference,
    ctx: &GeneratorContext<'_>,
) -> MigrateResult<Vec<Changeset>> {
    let table = table_of(diff)?;
    let unique = diff.value(DiffValue::as_unique)?;

    let mut changeset = add_unique(ctx, table, unique);
    if ctx.table_exists(table) {
        changeset = changeset.warning(ChangesetWarning::MightFail {
            reason: format!("{} may contain duplicate values", table),
        });
    }
    Ok(vec![changeset])
}

pub(super) fn unique_drop(
    diff: &Difference,
    ctx: &GeneratorContext<'_>,
) -> MigrateResult<Vec<Changeset>> {
    let table = table_of(diff)?;
    let unique = diff.old_value(DiffValue::as_unique)?;

    Ok(vec![
        Changeset::new(
            ChangesetType::DropUnique,
            MigrationPhase::Contract,
            priority::UNIQUE_DROP,
        )
        .table(table)
        .up(ctx.sql.drop_constraint(table, &unique.name))
        .down(ctx.sql.add_unique(table, unique)),
    ])
}

/// Check expressions are opaque SQL and are not rewritten for column renames.
pub(super) fn add_check(ctx: &GeneratorContext<'_>, table: &str, check: &CheckSnapshot) -> Changeset {
    let current = ctx.current_table(table);

    Changeset::new(
        ChangesetType::CreateCheck,
        MigrationPhase::Expand,
        priority::CHECK_CREATE,
    )
    .tables(table, current)
    .up(ctx.sql.add_check(current, check))
    .down(ctx.sql.drop_constraint(current, &check.name))
}

pub(super) fn check_create(
    diff: &Difference,
    ctx: &GeneratorContext<'_>,
) -> MigrateResult<Vec<Changeset>> {
    let table = table_of(diff)?;
    let check = diff.value(DiffValue::as_check)?;

    let mut changeset = add_check(ctx, table, check);
    if ctx.table_exists(table) {
        changeset = changeset.warning(ChangesetWarning::MightFail {
            reason: format!("existing rows of {} may violate {}", table, check.name),
        });
    }
    Ok(vec![changeset])
}

pub(super) fn check_drop(
    diff: &Difference,
    ctx: &GeneratorContext<'_>,
) -> MigrateResult<Vec<Changeset>> {
    let table = table_of(diff)?;
    let check = diff.old_value(DiffValue::as_check)?;

    Ok(vec![
        Changeset::new(
            ChangesetType::DropCheck,
            MigrationPhase::Contract,
            priority::CHECK_DROP,
        )
        .table(table)
        .up(ctx.sql.drop_constraint(table, &check.name))
        .down(ctx.sql.add_check(table, check)),
    ])
}

/// Rename of a generated constraint, index or trigger name.
pub(super) fn rename(diff: &Difference, ctx: &GeneratorContext<'_>) -> MigrateResult<Vec<Changeset>> {
    let DiffPath::ObjectName {
        table,
        kind,
        from,
        to,
    } = &diff.path
    else {
        return Err(MigrationError::UnclassifiedDifference(diff.to_string()));
    };

    let sql = &ctx.sql;
    let (changeset_type, up, down) = match kind {
        ObjectKind::PrimaryKey | ObjectKind::ForeignKey | ObjectKind::Unique | ObjectKind::Check => (
            ChangesetType::RenameConstraint,
            sql.rename_constraint(table, from, to),
            sql.rename_constraint(table, to, from),
        ),
        ObjectKind::Index => (
            ChangesetType::RenameIndex,
            sql.rename_index(from, to),
            sql.rename_index(to, from),
        ),
        ObjectKind::Trigger => (
            ChangesetType::RenameTrigger,
            sql.rename_trigger(table, from, to),
            sql.rename_trigger(table, to, from),
        ),
    };

    Ok(vec![
        Changeset::new(changeset_type, MigrationPhase::Alter, priority::OBJECT_RENAME)
            .table(table)
            .up(up)
            .down(down),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alignment::AlignmentCatalog;
    use crate::diff::diff_reconciled;
    use crate::generators::generate_changesets;
    use crate::rename::{RenameContext, reconcile};
    use crate::schema::{Column, ForeignKey, Schema, Table};
    use crate::snapshot::SchemaSnapshot;

    fn generate(
        remote: &SchemaSnapshot,
        local: &SchemaSnapshot,
        renames: &RenameContext,
    ) -> Vec<Changeset> {
        let reconciled = reconcile(remote, local, renames);
        let alignments = AlignmentCatalog::builtin();
        let ctx = GeneratorContext::new(local, &reconciled, &alignments);
        generate_changesets(&diff_reconciled(&reconciled, local), &ctx).unwrap()
    }

    fn users(pk: bool) -> SchemaSnapshot {
        let mut table = Table::new("users")
            .column(Column::new("id", "bigint"))
            .column(Column::new("email", "text"));
        if pk {
            table = table.primary_key(["id"]);
        }
        Schema::new("public").table(table).compile().unwrap()
    }

    #[test]
    fn test_primary_key_on_existing_table_adds_not_null_first() {
        let changesets = generate(&users(false), &users(true), &RenameContext::new());

        let kinds: Vec<(ChangesetType, u32)> = changesets
            .iter()
            .map(|c| (c.changeset_type, c.priority))
            .collect();
        // The plain nullability difference on `id` is owned by the primary key.
        assert_eq!(
            kinds,
            vec![
                (ChangesetType::ChangeColumnNullable, priority::PRIMARY_KEY_NULLABILITY),
                (ChangesetType::CreatePrimaryKey, priority::PRIMARY_KEY_CREATE),
            ]
        );
        assert_eq!(
            changesets[0].up,
            vec!["ALTER TABLE \"public\".\"users\" ALTER COLUMN \"id\" SET NOT NULL;"]
        );
        assert_eq!(
            changesets[0].down,
            vec!["ALTER TABLE \"public\".\"users\" ALTER COLUMN \"id\" DROP NOT NULL;"]
        );
        assert!(changesets.iter().all(|c| c.phase == MigrationPhase::Alter));
    }

    #[test]
    fn test_foreign_key_on_renamed_table_uses_current_names() {
        let remote = Schema::new("public")
            .table(
                Table::new("users")
                    .column(Column::new("id", "bigint"))
                    .primary_key(["id"]),
            )
            .table(Table::new("posts").column(Column::new("author_id", "bigint")))
            .compile()
            .unwrap();
        let local = Schema::new("public")
            .table(
                Table::new("accounts")
                    .column(Column::new("id", "bigint"))
                    .primary_key(["id"]),
            )
            .table(
                Table::new("posts")
                    .column(Column::new("author_id", "bigint"))
                    .foreign_key(ForeignKey::new(["author_id"], "accounts", ["id"])),
            )
            .compile()
            .unwrap();
        let mut renames = RenameContext::new();
        renames.rename_table("public", "users", "accounts");

        let changesets = generate(&remote, &local, &renames);
        let fk = changesets
            .iter()
            .find(|c| c.changeset_type == ChangesetType::CreateForeignKey)
            .unwrap();
        assert_eq!(fk.phase, MigrationPhase::Expand);
        assert!(fk.up[0].contains("REFERENCES \"public\".\"users\" (\"id\")"));

        let rename = changesets
            .iter()
            .find(|c| c.changeset_type == ChangesetType::RenameConstraint)
            .unwrap();
        assert_eq!(
            rename.up,
            vec!["ALTER TABLE \"public\".\"accounts\" RENAME CONSTRAINT \"users_pkey\" TO \"accounts_pkey\";"]
        );
    }

    #[test]
    fn test_unique_drop_is_reversible() {
        let remote = Schema::new("public")
            .table(Table::new("users").column(Column::new("email", "text")).unique(["email"]))
            .compile()
            .unwrap();
        let local = Schema::new("public")
            .table(Table::new("users").column(Column::new("email", "text")))
            .compile()
            .unwrap();

        let changesets = generate(&remote, &local, &RenameContext::new());
        assert_eq!(changesets.len(), 1);
        assert_eq!(changesets[0].phase, MigrationPhase::Contract);
        assert!(changesets[0].down[0].contains("UNIQUE (\"email\")"));
    }
}
