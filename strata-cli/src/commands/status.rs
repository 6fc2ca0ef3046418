//! `strata status` - executed and pending migrations per phase.

use crate::commands::Context;
use crate::error::CliResult;
use crate::output::{self, success};

/// Run the status command
pub async fn run(ctx: &Context) -> CliResult<()> {
    output::header("Migration Status");

    let engine = ctx.engine()?;
    engine.initialize().await?;
    let status = engine.status().await?;

    for phase in &status.phases {
        output::section(phase.phase.as_str());
        if phase.executed.is_empty() && phase.pending.is_empty() {
            output::dim("  (none)");
        }
        for name in &phase.executed {
            output::list_item(&format!("{} {}", output::style_success("executed"), name));
        }
        for name in &phase.pending {
            output::list_item(&format!("{} {}", output::style_pending("pending "), name));
        }
    }
    output::newline();

    for name in &status.failed {
        output::warn(&format!("{} failed in its last run", name));
    }

    if status.is_up_to_date() {
        success("Database is up to date");
    } else {
        output::info(&format!("{} pending migrations", status.pending_count()));
    }
    Ok(())
}
