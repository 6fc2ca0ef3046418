//! `strata generate` - write migrations for the registered schema.

use strata_migrate::Schema;

use crate::cli::GenerateArgs;
use crate::commands::Context;
use crate::error::{CliError, CliResult};
use crate::output::{self, success};

/// Run the generate command
pub async fn run(ctx: &Context, args: GenerateArgs, schema: Option<&Schema>) -> CliResult<()> {
    output::header("Generate");

    let schema = schema.ok_or_else(|| {
        CliError::Config(
            "no schema registered; generate from a binary that calls \
             `strata_cli::main_with_schema(Some(schema))`"
                .to_string(),
        )
    })?;
    let local = schema.compile()?;
    if local.schema != ctx.config.database.schema {
        output::warn(&format!(
            "schema '{}' differs from the configured schema '{}'",
            local.schema, ctx.config.database.schema
        ));
    }

    output::kv("Schema", &local.schema);
    output::kv("Tables", &local.tables.len().to_string());
    output::kv("Migrations", &ctx.migrations_dir().display().to_string());
    output::newline();

    let engine = ctx.engine_with(|config| {
        let allow = config.allow_data_loss || args.force;
        config.allow_data_loss(allow)
    })?;
    let plan = engine.plan(&local).await?;
    if plan.is_empty() {
        success(&plan.summary());
        return Ok(());
    }

    output::info(&plan.summary());
    for warning in &plan.warnings {
        output::warn(warning);
    }

    if plan.has_data_loss() && !engine.config().allow_data_loss {
        output::newline();
        output::section("Destructive changesets");
        for changeset in plan.destructive() {
            let table = changeset.table_name.as_deref().unwrap_or(&local.schema);
            output::list_item(&format!("{} ({})", changeset.changeset_type, table));
        }
        return Err(CliError::Refused(format!(
            "refusing to write {} destructive changesets",
            plan.destructive().count()
        )));
    }

    let files = engine.write(&args.name, &plan).await?;
    output::newline();
    for file in &files {
        let mode = if file.transaction { "" } else { " (no transaction)" };
        output::list_item(&format!("{}/{}{}", file.phase, file.name, mode));
        if ctx.dry_run {
            for statement in &file.up {
                output::code(statement);
            }
        }
    }

    output::newline();
    if ctx.dry_run {
        output::info(&format!("Dry run: {} migrations not written", files.len()));
    } else {
        success(&format!("Wrote {} migrations", files.len()));
    }
    Ok(())
}
