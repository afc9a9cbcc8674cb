//! ## resman-cli
//! **Command-line front end for the resource manager simulation**
//!
//! `resman run` performs one run with the given admission limits;
//! `resman fuzz` repeats runs with incrementing seeds and checks that every
//! run ends with all resources returned.

use clap::Parser;

mod commands;

use commands::Cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    commands::run_command(cli).await
}
