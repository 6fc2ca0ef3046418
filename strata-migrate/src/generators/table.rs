use crate::alignment::align_columns;
use crate::changeset::{Changeset, ChangesetType, ChangesetWarning, priority};
use crate::diff::{DiffPath, DiffValue, Difference};
use crate::error::{MigrateResult, MigrationError};
use crate::migration::MigrationPhase;
use crate::snapshot::TableSnapshot;

use super::{GeneratorContext, constraint, index, trigger};

/// `CREATE TABLE` with padding-minimizing column order, followed by one
/// changeset per key, constraint, index and trigger of the new table.
pub(super) fn create(diff: &Difference, ctx: &GeneratorContext<'_>) -> MigrateResult<Vec<Changeset>> {
    let table = diff.value(DiffValue::as_table)?;
    let name = table.name.as_str();
    let columns = align_columns(table.columns.values(), ctx.alignments);

    let mut create = Changeset::new(
        ChangesetType::CreateTable,
        MigrationPhase::Expand,
        priority::TABLE_CREATE,
    )
    .table(name)
    .up(ctx.sql.create_table(name, columns.iter().copied()));
    for column in &columns {
        if let Some(default) = &column.default {
            create = create.up(ctx.sql.comment_on_column(name, &column.name, Some(&default.hash)));
        }
    }
    create = create.down(ctx.sql.drop_table(name));

    let mut changesets = vec![create];

    if let Some(pk) = &table.primary_key {
        changesets.push(constraint::add_primary_key(ctx, name, pk, MigrationPhase::Expand));
    }
    for unique in table.uniques.values() {
        changesets.push(constraint::add_unique(ctx, name, unique));
    }
    for check in table.checks.values() {
        changesets.push(constraint::add_check(ctx, name, check));
    }
    for fk in table.foreign_keys.values() {
        changesets.push(constraint::add_foreign_key(ctx, name, fk));
    }
    for idx in table.indexes.values() {
        changesets.push(index::add_index(ctx, name, idx, false));
    }
    for trg in table.triggers.values() {
        changesets.push(trigger::add_trigger(ctx, name, trg));
    }

    Ok(changesets)
}

/// `DROP TABLE`; the down statements recreate the table with everything
/// that was attached to it.
pub(super) fn drop(diff: &Difference, ctx: &GeneratorContext<'_>) -> MigrateResult<Vec<Changeset>> {
    let table = diff.old_value(DiffValue::as_table)?;
    let name = table.name.as_str();

    let mut changeset = Changeset::new(
        ChangesetType::DropTable,
        MigrationPhase::Contract,
        priority::TABLE_DROP,
    )
    .table(name)
    .up(ctx.sql.drop_table(name))
    .warning(ChangesetWarning::Destructive {
        object: format!("table {}", name),
    });

    for statement in recreate_statements(ctx, table) {
        changeset = changeset.down(statement);
    }

    Ok(vec![changeset])
}

fn recreate_statements(ctx: &GeneratorContext<'_>, table: &TableSnapshot) -> Vec<String> {
    let name = table.name.as_str();
    let sql = &ctx.sql;

    let mut statements = vec![sql.create_table(name, table.columns.values())];
    for column in table.columns.values() {
        if let Some(default) = &column.default {
            statements.push(sql.comment_on_column(name, &column.name, Some(&default.hash)));
        }
    }
    if let Some(pk) = &table.primary_key {
        statements.push(sql.add_primary_key(name, pk));
    }
    statements.extend(table.uniques.values().map(|u| sql.add_unique(name, u)));
    statements.extend(table.checks.values().map(|c| sql.add_check(name, c)));
    statements.extend(table.foreign_keys.values().map(|fk| {
        sql.add_foreign_key(name, fk, &fk.referenced_table, &fk.referenced_columns)
    }));
    statements.extend(table.indexes.values().map(|i| sql.create_index(name, i, false)));
    statements.extend(table.triggers.values().map(|t| sql.create_trigger(name, t)));
    statements
}

pub(super) fn rename(diff: &Difference, ctx: &GeneratorContext<'_>) -> MigrateResult<Vec<Changeset>> {
    let DiffPath::TableName { from, to } = &diff.path else {
        return Err(MigrationError::UnclassifiedDifference(diff.to_string()));
    };

    Ok(vec![
        Changeset::new(
            ChangesetType::RenameTable,
            MigrationPhase::Alter,
            priority::TABLE_RENAME,
        )
        .tables(to, from)
        .up(ctx.sql.rename_table(from, to))
        .down(ctx.sql.rename_table(to, from))
        .warning(ChangesetWarning::BackwardIncompatible {
            from: from.clone(),
            to: to.clone(),
        }),
    ])
}
