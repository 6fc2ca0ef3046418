//! strata - phase-aware schema migrations for PostgreSQL.

#[tokio::main]
async fn main() {
    strata_cli::main_with_schema(None).await
}
