pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "deckhand",
    about = "Deckhand operator CLI",
    long_about = "Inspect deckhand configuration and check release readiness before starting the bot.",
    after_help = "Examples:\n  deckhand doctor --json\n  deckhand config\n  deckhand version"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Validate config, token readiness, and the git toolchain")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Print build version metadata")]
    Version,
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Config => commands::config::run(),
        Command::Doctor { json } => commands::doctor::run(json),
        Command::Version => commands::version::run(),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
