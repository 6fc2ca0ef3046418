use crate::changeset::{Changeset, ChangesetType, ChangesetWarning, priority};
use crate::diff::{DiffPath, DiffValue, Difference};
use crate::error::{MigrateResult, MigrationError};
use crate::migration::MigrationPhase;
use crate::snapshot::SchemaSnapshot;

use super::{GeneratorContext, table_of};

fn column_of(diff: &Difference) -> MigrateResult<(&str, &str)> {
    match &diff.path {
        DiffPath::Column { table, column }
        | DiffPath::ColumnDataType { table, column }
        | DiffPath::ColumnNullable { table, column }
        | DiffPath::ColumnDefault { table, column }
        | DiffPath::ColumnIdentity { table, column } => Ok((table, column)),
        _ => Err(MigrationError::UnclassifiedDifference(diff.to_string())),
    }
}

/// Type as it has to be spelled in DDL; enum types are schema qualified.
fn type_sql(ctx: &GeneratorContext<'_>, snapshot: &SchemaSnapshot, data_type: &str) -> String {
    if snapshot.is_enum(data_type) {
        ctx.sql.qualified(data_type)
    } else {
        data_type.to_string()
    }
}

/// New columns are added in the expand phase, under the table's current name.
pub(super) fn create(diff: &Difference, ctx: &GeneratorContext<'_>) -> MigrateResult<Vec<Changeset>> {
    let table = table_of(diff)?;
    let column = diff.value(DiffValue::as_column)?;
    let current = ctx.current_table(table);

    let mut changeset = Changeset::new(
        ChangesetType::CreateColumn,
        MigrationPhase::Expand,
        priority::COLUMN_CREATE,
    )
    .tables(table, current)
    .up(ctx.sql.add_column(current, column));
    if let Some(default) = &column.default {
        changeset = changeset.up(ctx.sql.comment_on_column(current, &column.name, Some(&default.hash)));
    }
    changeset = changeset.down(ctx.sql.drop_column(current, &column.name));

    if !column.nullable && column.default.is_none() && column.identity.is_none() {
        changeset = changeset.warning(ChangesetWarning::MightFail {
            reason: format!(
                "{}.{} is NOT NULL without a default and {} may contain rows",
                table, column.name, table
            ),
        });
    }

    Ok(vec![changeset])
}

pub(super) fn drop(diff: &Difference, ctx: &GeneratorContext<'_>) -> MigrateResult<Vec<Changeset>> {
    let table = table_of(diff)?;
    let column = diff.old_value(DiffValue::as_column)?;

    let mut changeset = Changeset::new(
        ChangesetType::DropColumn,
        MigrationPhase::Contract,
        priority::COLUMN_DROP,
    )
    .table(table)
    .up(ctx.sql.drop_column(table, &column.name))
    .down(ctx.sql.add_column(table, column))
    .warning(ChangesetWarning::Destructive {
        object: format!("column {}.{}", table, column.name),
    });
    if let Some(default) = &column.default {
        changeset = changeset.down(ctx.sql.comment_on_column(table, &column.name, Some(&default.hash)));
    }

    Ok(vec![changeset])
}

pub(super) fn rename(diff: &Difference, ctx: &GeneratorContext<'_>) -> MigrateResult<Vec<Changeset>> {
    let DiffPath::ColumnName { table, from, to } = &diff.path else {
        return Err(MigrationError::UnclassifiedDifference(diff.to_string()));
    };

    Ok(vec![
        Changeset::new(
            ChangesetType::RenameColumn,
            MigrationPhase::Alter,
            priority::COLUMN_RENAME,
        )
        .table(table)
        .up(ctx.sql.rename_column(table, from, to))
        .down(ctx.sql.rename_column(table, to, from))
        .warning(ChangesetWarning::BackwardIncompatible {
            from: format!("{}.{}", table, from),
            to: format!("{}.{}", table, to),
        }),
    ])
}

pub(super) fn data_type(
    diff: &Difference,
    ctx: &GeneratorContext<'_>,
) -> MigrateResult<Vec<Changeset>> {
    let (table, column) = column_of(diff)?;
    let new = diff.value(DiffValue::as_data_type)?;
    let old = diff.old_value(DiffValue::as_data_type)?;

    Ok(vec![
        Changeset::new(
            ChangesetType::ChangeColumnType,
            MigrationPhase::Alter,
            priority::COLUMN_TYPE,
        )
        .table(table)
        .up(ctx.sql.alter_column_type(table, column, &type_sql(ctx, ctx.local, new)))
        .down(ctx.sql.alter_column_type(table, column, &type_sql(ctx, ctx.remote, old)))
        .warning(ChangesetWarning::MightFail {
            reason: format!("values of {}.{} may not convert from {} to {}", table, column, old, new),
        }),
    ])
}

/// NOT NULL changes.
///
/// Columns entering a new primary key are handled by the primary key
/// generator. Columns leaving a replaced primary key can only drop NOT NULL
/// once the old key is gone, so they sort right after the key drop.
pub(super) fn nullable(
    diff: &Difference,
    ctx: &GeneratorContext<'_>,
) -> MigrateResult<Vec<Changeset>> {
    let (table, column) = column_of(diff)?;
    let nullable = *diff.value(DiffValue::as_nullable)?;

    let key_changes = ctx.primary_key_changes(table);
    let in_key = |snapshot: &SchemaSnapshot| {
        snapshot
            .table(table)
            .is_some_and(|t| t.is_primary_key_column(column))
    };

    if !nullable && key_changes && in_key(ctx.local) {
        return Ok(Vec::new());
    }

    let priority = if key_changes && in_key(ctx.remote) {
        priority::PRIMARY_KEY_NULLABILITY
    } else {
        priority::COLUMN_NULLABLE
    };

    let changeset = Changeset::new(
        ChangesetType::ChangeColumnNullable,
        MigrationPhase::Alter,
        priority,
    )
    .table(table);

    let changeset = if nullable {
        changeset
            .up(ctx.sql.drop_not_null(table, column))
            .down(ctx.sql.set_not_null(table, column))
    } else {
        changeset
            .up(ctx.sql.set_not_null(table, column))
            .down(ctx.sql.drop_not_null(table, column))
            .warning(ChangesetWarning::MightFail {
                reason: format!("{}.{} may contain NULL values", table, column),
            })
    };

    Ok(vec![changeset])
}

fn default_changeset(table: &str, changeset_type: ChangesetType) -> Changeset {
    Changeset::new(changeset_type, MigrationPhase::Alter, priority::COLUMN_DEFAULT).table(table)
}

pub(super) fn default_add(
    diff: &Difference,
    ctx: &GeneratorContext<'_>,
) -> MigrateResult<Vec<Changeset>> {
    let (table, column) = column_of(diff)?;
    let default = diff.value(DiffValue::as_default)?;

    Ok(vec![
        default_changeset(table, ChangesetType::AddColumnDefault)
            .up(ctx.sql.set_default(table, column, &default.sql))
            .up(ctx.sql.comment_on_column(table, column, Some(&default.hash)))
            .down(ctx.sql.drop_default(table, column))
            .down(ctx.sql.comment_on_column(table, column, None)),
    ])
}

pub(super) fn default_drop(
    diff: &Difference,
    ctx: &GeneratorContext<'_>,
) -> MigrateResult<Vec<Changeset>> {
    let (table, column) = column_of(diff)?;
    let old = diff.old_value(DiffValue::as_default)?;

    Ok(vec![
        default_changeset(table, ChangesetType::DropColumnDefault)
            .up(ctx.sql.drop_default(table, column))
            .up(ctx.sql.comment_on_column(table, column, None))
            .down(ctx.sql.set_default(table, column, &old.sql))
            .down(ctx.sql.comment_on_column(table, column, Some(&old.hash))),
    ])
}

pub(super) fn default_change(
    diff: &Difference,
    ctx: &GeneratorContext<'_>,
) -> MigrateResult<Vec<Changeset>> {
    let (table, column) = column_of(diff)?;
    let new = diff.value(DiffValue::as_default)?;
    let old = diff.old_value(DiffValue::as_default)?;

    Ok(vec![
        default_changeset(table, ChangesetType::ChangeColumnDefault)
            .up(ctx.sql.set_default(table, column, &new.sql))
            .up(ctx.sql.comment_on_column(table, column, Some(&new.hash)))
            .down(ctx.sql.set_default(table, column, &old.sql))
            .down(ctx.sql.comment_on_column(table, column, Some(&old.hash))),
    ])
}

fn identity_changeset(table: &str, changeset_type: ChangesetType) -> Changeset {
    Changeset::new(changeset_type, MigrationPhase::Alter, priority::COLUMN_IDENTITY).table(table)
}

pub(super) fn identity_add(
    diff: &Difference,
    ctx: &GeneratorContext<'_>,
) -> MigrateResult<Vec<Changeset>> {
    let (table, column) = column_of(diff)?;
    let identity = *diff.value(DiffValue::as_identity)?;

    Ok(vec![
        identity_changeset(table, ChangesetType::AddColumnIdentity)
            .up(ctx.sql.add_identity(table, column, identity))
            .down(ctx.sql.drop_identity(table, column)),
    ])
}

pub(super) fn identity_drop(
    diff: &Difference,
    ctx: &GeneratorContext<'_>,
) -> MigrateResult<Vec<Changeset>> {
    let (table, column) = column_of(diff)?;
    let old = *diff.old_value(DiffValue::as_identity)?;

    Ok(vec![
        identity_changeset(table, ChangesetType::DropColumnIdentity)
            .up(ctx.sql.drop_identity(table, column))
            .down(ctx.sql.add_identity(table, column, old)),
    ])
}

pub(super) fn identity_change(
    diff: &Difference,
    ctx: &GeneratorContext<'_>,
) -> MigrateResult<Vec<Changeset>> {
    let (table, column) = column_of(diff)?;
    let new = *diff.value(DiffValue::as_identity)?;
    let old = *diff.old_value(DiffValue::as_identity)?;

    Ok(vec![
        identity_changeset(table, ChangesetType::ChangeColumnIdentity)
            .up(ctx.sql.set_identity(table, column, new))
            .down(ctx.sql.set_identity(table, column, old)),
    ])
}
