pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "awxchat",
    about = "awxchat operator CLI",
    long_about = "Inspect configuration, check readiness, apply migrations, and read stored conversation history.",
    after_help = "Examples:\n  awxchat doctor --json\n  awxchat config\n  awxchat history alice"
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
    #[command(about = "Validate config, conversation store connectivity, and AWX reachability")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Print the stored conversation window for a user as JSON")]
    History {
        #[arg(help = "Internal user id, as used by /ws/{user_id}")]
        user_id: String,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Config => commands::config::run(),
        Command::Doctor { json } => commands::doctor::run(json),
        Command::History { user_id } => commands::history::run(&user_id),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
