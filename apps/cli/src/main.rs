//! importkit CLI: run column transform trees over import batches.
//!
//! Loads a mapping, builds the transform tree, runs it over every row of an
//! element batch, and commits the results to a local libSQL database.

mod commands;
mod input;

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
