use crate::changeset::{Changeset, ChangesetType, priority};
use crate::diff::{DiffValue, Difference};
use crate::error::MigrateResult;
use crate::migration::MigrationPhase;
use crate::snapshot::TriggerSnapshot;

use super::{GeneratorContext, table_of};

pub(super) fn add_trigger(
    ctx: &GeneratorContext<'_>,
    table: &str,
    trigger: &TriggerSnapshot,
) -> Changeset {
    let current = ctx.current_table(table);

    Changeset::new(
        ChangesetType::CreateTrigger,
        MigrationPhase::Expand,
        priority::TRIGGER_CREATE,
    )
    .tables(table, current)
    .up(ctx.sql.create_trigger(current, trigger))
    .down(ctx.sql.drop_trigger(current, &trigger.name))
}

pub(super) fn create(diff: &Difference, ctx: &GeneratorContext<'_>) -> MigrateResult<Vec<Changeset>> {
    let table = table_of(diff)?;
    let trigger = diff.value(DiffValue::as_trigger)?;
    Ok(vec![add_trigger(ctx, table, trigger)])
}

pub(super) fn drop(diff: &Difference, ctx: &GeneratorContext<'_>) -> MigrateResult<Vec<Changeset>> {
    let table = table_of(diff)?;
    let trigger = diff.old_value(DiffValue::as_trigger)?;

    Ok(vec![
        Changeset::new(
            ChangesetType::DropTrigger,
            MigrationPhase::Contract,
            priority::TRIGGER_DROP,
        )
        .table(table)
        .up(ctx.sql.drop_trigger(table, &trigger.name))
        .down(ctx.sql.create_trigger(table, trigger)),
    ])
}
