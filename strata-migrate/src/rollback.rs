//! Rollback planning.

use crate::error::{MigrateResult, MigrationError};
use crate::migration::{MigrationInfo, MigrationPlanGroup, RollbackTarget, plan_groups};

/// Plan the rollback of `executed` (in execution order) down to `target`.
///
/// Rolling back to a named migration includes that migration. The returned
/// groups are in rollback order: the most recently executed group first.
/// For [`RollbackTarget::NoMigrations`] the final group's `down` is the
/// sentinel itself, so the plan always ends at an empty ledger.
pub fn rollback_plan(
    executed: &[MigrationInfo],
    target: &RollbackTarget,
) -> MigrateResult<Vec<MigrationPlanGroup>> {
    let start = match target {
        RollbackTarget::NoMigrations => 0,
        RollbackTarget::Migration(name) => executed
            .iter()
            .position(|m| &m.name == name)
            .ok_or_else(|| MigrationError::NotFound(name.clone()))?,
    };

    let mut groups = plan_groups(&executed[start..]);
    groups.reverse();

    if *target == RollbackTarget::NoMigrations {
        if let Some(last) = groups.last_mut() {
            last.down = RollbackTarget::NoMigrations;
        }
    }

    Ok(groups)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migration::MigrationPhase;

    fn executed() -> Vec<MigrationInfo> {
        vec![
            MigrationInfo::new("m1", MigrationPhase::Expand),
            MigrationInfo::new("m2", MigrationPhase::Expand),
            MigrationInfo::new("m3", MigrationPhase::Expand).without_transaction(),
            MigrationInfo::new("m4", MigrationPhase::Alter),
        ]
    }

    #[test]
    fn test_rollback_to_named_migration_is_inclusive() {
        let plan = rollback_plan(&executed(), &RollbackTarget::Migration("m2".into())).unwrap();

        let migrations: Vec<Vec<String>> = plan.iter().map(|g| g.migrations.clone()).collect();
        assert_eq!(
            migrations,
            vec![vec!["m4".to_string()], vec!["m3".to_string()], vec!["m2".to_string()]]
        );
        assert_eq!(plan[2].down, RollbackTarget::Migration("m2".into()));
    }

    #[test]
    fn test_full_rollback_ends_at_sentinel() {
        let plan = rollback_plan(&executed(), &RollbackTarget::NoMigrations).unwrap();

        assert_eq!(plan.len(), 3);
        assert_eq!(plan[0].up, "m4");
        assert_eq!(plan[2].migrations, vec!["m1", "m2"]);
        assert_eq!(plan[2].down, RollbackTarget::NoMigrations);
        assert_eq!(plan[1].down, RollbackTarget::Migration("m3".into()));
    }

    #[test]
    fn test_unknown_target() {
        let err = rollback_plan(&executed(), &RollbackTarget::Migration("m9".into())).unwrap_err();
        assert!(matches!(err, MigrationError::NotFound(name) if name == "m9"));
    }

    #[test]
    fn test_nothing_executed() {
        assert!(rollback_plan(&[], &RollbackTarget::NoMigrations).unwrap().is_empty());
    }
}
