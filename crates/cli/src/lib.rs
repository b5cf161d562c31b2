pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

use crate::commands::quote::QuoteArgs;

#[derive(Debug, Parser)]
#[command(
    name = "tripcover",
    about = "Tripcover operator CLI",
    long_about = "Apply migrations, inspect configuration, check readiness and price trips offline.",
    after_help = "Examples:\n  tripcover doctor --json\n  tripcover config\n  tripcover quote --destination Japan --depart 2026-03-01 --return 2026-03-10 --ages 35,8"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Validate config, language model settings and DB connectivity")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Price a trip with the local rate tables and print the quote as JSON")]
    Quote(QuoteArgs),
}

impl Command {
    fn execute(self) -> commands::CommandResult {
        let report = |output| commands::CommandResult { exit_code: 0, output };
        match self {
            Self::Migrate => commands::migrate::run(),
            Self::Config => report(commands::config::run()),
            Self::Doctor { json } => report(commands::doctor::run(json)),
            Self::Quote(args) => commands::quote::run(&args),
        }
    }
}

pub fn run() -> ExitCode {
    let result = Cli::parse().command.execute();
    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
