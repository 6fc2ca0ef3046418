use crate::changeset::{Changeset, ChangesetType, priority};
use crate::diff::{DiffValue, Difference};
use crate::error::MigrateResult;
use crate::migration::MigrationPhase;
use crate::snapshot::IndexSnapshot;

use super::{GeneratorContext, table_of};

/// `CREATE INDEX` under the table's current name. Concurrent builds cannot
/// run inside a transaction.
pub(super) fn add_index(
    ctx: &GeneratorContext<'_>,
    table: &str,
    index: &IndexSnapshot,
    concurrently: bool,
) -> Changeset {
    let current = ctx.current_table(table);
    let statement_index = IndexSnapshot {
        columns: ctx.current_columns(table, &index.columns),
        ..index.clone()
    };

    let changeset = Changeset::new(
        ChangesetType::CreateIndex,
        MigrationPhase::Expand,
        priority::INDEX_CREATE,
    )
    .tables(table, current)
    .up(ctx.sql.create_index(current, &statement_index, concurrently))
    .down(ctx.sql.drop_index(&index.name, concurrently));

    if concurrently {
        changeset.without_transaction()
    } else {
        changeset
    }
}

/// Indexes on tables that already hold data are built concurrently.
pub(super) fn create(diff: &Difference, ctx: &GeneratorContext<'_>) -> MigrateResult<Vec<Changeset>> {
    let table = table_of(diff)?;
    let index = diff.value(DiffValue::as_index)?;
    Ok(vec![add_index(ctx, table, index, ctx.table_exists(table))])
}

pub(super) fn drop(diff: &Difference, ctx: &GeneratorContext<'_>) -> MigrateResult<Vec<Changeset>> {
    let table = table_of(diff)?;
    let index = diff.old_value(DiffValue::as_index)?;

    Ok(vec![
        Changeset::new(
            ChangesetType::DropIndex,
            MigrationPhase::Contract,
            priority::INDEX_DROP,
        )
        .table(table)
        .up(ctx.sql.drop_index(&index.name, false))
        .down(ctx.sql.create_index(table, index, false)),
    ])
}
