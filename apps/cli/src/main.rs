//! labbuild CLI: experiment build orchestrator.
//!
//! Stages an experiment's content, optionally validates it, renders every
//! unit of its descriptor, and promotes the result to the build directory.

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
