mod cli;
mod cli_utils;
mod commands;

use anyhow::Result;
use clap::Parser;

use cli::{Cli, Commands};
use hotscript::logging;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Dispatch to appropriate command handler; script commands start logging
    // once their configuration (log level/format) is known
    match cli.command {
        Commands::Run(args) => commands::run::run(&args).await,
        Commands::Call(args) => commands::call::run(&args).await,
        Commands::Serve(args) => commands::serve::run(&args).await,
        Commands::Config(args) => {
            logging::init("warn", None);
            commands::config::run(args.command)
        }
    }
}
