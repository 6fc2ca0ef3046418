use crate::changeset::{Changeset, ChangesetType, ChangesetWarning, priority};
use crate::diff::{DiffPath, DiffValue, Difference};
use crate::error::{MigrateResult, MigrationError};
use crate::migration::MigrationPhase;

use super::GeneratorContext;

fn enum_name(diff: &Difference) -> MigrateResult<&str> {
    match &diff.path {
        DiffPath::Enum { name } | DiffPath::EnumValues { name } => Ok(name),
        _ => Err(MigrationError::UnclassifiedDifference(diff.to_string())),
    }
}

pub(super) fn create(diff: &Difference, ctx: &GeneratorContext<'_>) -> MigrateResult<Vec<Changeset>> {
    let name = enum_name(diff)?;
    let values = diff.value(DiffValue::as_enum_values)?;

    Ok(vec![
        Changeset::new(ChangesetType::CreateEnum, MigrationPhase::Expand, priority::ENUM_CREATE)
            .up(ctx.sql.create_enum(name, values))
            .down(ctx.sql.drop_enum(name)),
    ])
}

pub(super) fn drop(diff: &Difference, ctx: &GeneratorContext<'_>) -> MigrateResult<Vec<Changeset>> {
    let name = enum_name(diff)?;
    let values = diff.old_value(DiffValue::as_enum_values)?;

    Ok(vec![
        Changeset::new(ChangesetType::DropEnum, MigrationPhase::Contract, priority::ENUM_DROP)
            .up(ctx.sql.drop_enum(name))
            .down(ctx.sql.create_enum(name, values)),
    ])
}

/// New values can be added anywhere; existing values can be neither
/// removed nor reordered. PostgreSQL cannot drop an enum value, so the
/// changeset has no `down` and is flagged irreversible.
pub(super) fn add_values(
    diff: &Difference,
    ctx: &GeneratorContext<'_>,
) -> MigrateResult<Vec<Changeset>> {
    let name = enum_name(diff)?;
    let values = diff.value(DiffValue::as_enum_values)?;
    let old = diff.old_value(DiffValue::as_enum_values)?;

    if let Some(removed) = old.iter().find(|v| !values.contains(v)) {
        return Err(MigrationError::unsupported(format!(
            "value '{}' of enum '{}' cannot be removed",
            removed, name
        )));
    }
    let kept: Vec<&String> = values.iter().filter(|v| old.contains(v)).collect();
    if kept.iter().copied().ne(old.iter()) {
        return Err(MigrationError::unsupported(format!(
            "values of enum '{}' cannot be reordered",
            name
        )));
    }

    let mut changeset = Changeset::new(
        ChangesetType::AddEnumValues,
        MigrationPhase::Expand,
        priority::ENUM_ADD_VALUE,
    )
    .without_transaction();

    let mut added = Vec::new();
    for (position, value) in values.iter().enumerate() {
        if old.contains(value) {
            continue;
        }
        let before = values[position + 1..]
            .iter()
            .find(|v| old.contains(v))
            .map(String::as_str);
        changeset = changeset.up(ctx.sql.add_enum_value(name, value, before));
        added.push(format!("'{}'", value));
    }

    Ok(vec![changeset.warning(ChangesetWarning::Irreversible {
        reason: format!("enum '{}' keeps {} after rollback", name, added.join(", ")),
    })])
}
