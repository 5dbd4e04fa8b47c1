use anyhow::Result;
use clap::Parser;

mod cli;
mod commands;

use obligato_server::{config::Environment, init_tracing};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let args = cli::Cli::parse();

    // Logging follows APP_ENV, which is known before the config file is read
    init_tracing(Environment::detect());

    // Dispatch to appropriate command handler
    match args.get_command() {
        cli::Commands::Start => {
            commands::start::execute(&args.config).await?;
        }
        cli::Commands::Config { action } => match action {
            cli::ConfigCommands::Show => commands::config::show(&args.config)?,
            cli::ConfigCommands::Validate => commands::config::validate(&args.config)?,
        },
        cli::Commands::Version => {
            println!("Obligato Server v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
