pub mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    name = "callbridge",
    about = "Callbridge operator CLI",
    long_about = "Inspect callbridge configuration, check CRM readiness, and replay call webhooks.",
    after_help = "Examples:\n  callbridge doctor --json\n  callbridge config\n  \
                  callbridge send --file call.json"
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
    #[command(about = "Validate config, access token readiness, and field mapping readiness")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Post a call webhook payload to a running callbridge-server")]
    Send {
        #[arg(long, help = "Path to a JSON webhook payload")]
        file: PathBuf,
        #[arg(long, help = "Webhook URL (defaults to the configured local server)")]
        url: Option<String>,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Doctor { json } => commands::doctor::run(json),
        Command::Send { file, url } => commands::send::run(&file, url.as_deref()),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
