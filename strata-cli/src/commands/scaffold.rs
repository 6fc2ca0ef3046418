//! `strata scaffold` - write an empty data migration.

use crate::cli::ScaffoldArgs;
use crate::commands::{Context, display_path};
use crate::error::CliResult;
use crate::output::{self, success};

/// Run the scaffold command
pub async fn run(ctx: &Context, args: ScaffoldArgs) -> CliResult<()> {
    output::header("Scaffold");

    if ctx.dry_run {
        output::info(&format!("Dry run: would scaffold data migration '{}'", args.name));
        return Ok(());
    }

    let file = ctx.file_manager().scaffold_data_migration(&args.name).await?;
    success(&format!("Created {}", display_path(&file.path, &ctx.root)));
    output::dim("Fill in `up` and `down`, then run `strata apply --phase data`.");
    Ok(())
}
