//! webcatalog CLI — discover, validate, and catalog web-reachable assets.
//!
//! Wraps the catalog job control surface: create jobs, run phases, poll
//! status, and inspect phase results.

mod commands;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli).await
}
