//! `strata apply` - apply pending migrations.

use strata_migrate::{MigrationOutcome, PhaseSelection};

use crate::cli::ApplyArgs;
use crate::commands::{Context, print_groups, print_results};
use crate::error::CliResult;
use crate::output::{self, success};

/// Run the apply command
pub async fn run(ctx: &Context, args: ApplyArgs) -> CliResult<()> {
    output::header("Apply");

    let selection = PhaseSelection::from(args.phase);
    output::kv("Phase", &selection.to_string());
    output::kv("Migrations", &ctx.migrations_dir().display().to_string());
    output::newline();

    let engine = ctx.engine()?;
    if !ctx.dry_run {
        engine.initialize().await?;
    }

    let mut report = engine.apply(selection).await?;
    if report.is_empty() {
        success("No pending migrations to apply.");
        return Ok(());
    }

    if ctx.dry_run {
        print_groups(&report.groups);
        output::newline();
        output::info("Dry run: nothing applied");
        return Ok(());
    }

    print_results(&report);
    output::newline();
    let rolled_back = report.with_outcome(MigrationOutcome::RolledBack).len();
    if let Some(err) = report.error.take() {
        if rolled_back > 0 {
            output::warn(&format!("Rolled back {} migrations", rolled_back));
        }
        return Err(err.into());
    }

    success(&format!(
        "Applied {} migrations",
        report.with_outcome(MigrationOutcome::Success).len()
    ));
    Ok(())
}
