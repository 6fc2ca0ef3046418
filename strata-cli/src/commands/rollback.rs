//! `strata rollback` - roll back executed migrations.

use strata_migrate::{MigrationOutcome, RollbackTarget};

use crate::cli::RollbackArgs;
use crate::commands::{Context, print_groups, print_results};
use crate::error::CliResult;
use crate::output::{self, success};

/// Run the rollback command
pub async fn run(ctx: &Context, args: RollbackArgs) -> CliResult<()> {
    output::header("Rollback");

    let engine = ctx.engine()?;
    if !ctx.dry_run {
        engine.initialize().await?;
    }

    let mut report = match (args.to, args.all) {
        (Some(name), _) => {
            output::kv("Target", &name);
            engine.rollback(&RollbackTarget::Migration(name)).await?
        }
        (None, true) => {
            output::kv("Target", "everything");
            engine.rollback(&RollbackTarget::NoMigrations).await?
        }
        (None, false) => {
            output::kv("Count", &args.count.to_string());
            engine.rollback_last(args.count).await?
        }
    };
    output::newline();

    if report.is_empty() {
        success("Nothing to roll back.");
        return Ok(());
    }

    if ctx.dry_run {
        print_groups(&report.groups);
        output::newline();
        output::info("Dry run: nothing rolled back");
        return Ok(());
    }

    print_results(&report);
    output::newline();
    if let Some(err) = report.error.take() {
        return Err(err.into());
    }

    success(&format!(
        "Rolled back {} migrations",
        report.with_outcome(MigrationOutcome::Success).len()
    ));
    Ok(())
}
