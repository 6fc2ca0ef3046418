//! strata CLI - command-line interface for strata migrations.
//!
//! The `strata` binary applies, rolls back and reports on migrations that
//! are already on disk. Generating migrations needs the in-code schema, so an
//! application registers it by building its own binary on top of this crate:
//!
//! ```rust,ignore
//! use strata_migrate::{Column, Schema, Table};
//!
//! #[tokio::main]
//! async fn main() {
//!     let schema = Schema::new("public").table(
//!         Table::new("users")
//!             .column(Column::new("id", "bigint").identity_always())
//!             .column(Column::new("email", "text").not_null())
//!             .primary_key(["id"]),
//!     );
//!     strata_cli::main_with_schema(Some(schema)).await
//! }
//! ```

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod output;

use clap::Parser;
use strata_migrate::Schema;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Command};
use crate::error::CliResult;

/// Parse arguments, run the command and exit with status 1 on failure.
pub async fn main_with_schema(schema: Option<Schema>) {
    init_tracing();

    if let Err(e) = run(Cli::parse(), schema.as_ref()).await {
        output::newline();
        output::error(&e.to_string());
        std::process::exit(1);
    }
}

/// Run one parsed command.
pub async fn run(cli: Cli, schema: Option<&Schema>) -> CliResult<()> {
    let ctx = commands::Context::load(&cli)?;

    match cli.command {
        Command::Generate(args) => commands::generate::run(&ctx, args, schema).await,
        Command::Apply(args) => commands::apply::run(&ctx, args).await,
        Command::Rollback(args) => commands::rollback::run(&ctx, args).await,
        Command::Status => commands::status::run(&ctx).await,
        Command::Scaffold(args) => commands::scaffold::run(&ctx, args).await,
    }
}

/// Install the log subscriber; `RUST_LOG` overrides the `info` default.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    // A host binary may already have installed its own subscriber.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
