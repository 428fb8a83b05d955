//! TalentChain CLI - drive the real-time event hub from a terminal.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use talentchain_realtime::RealtimeConfig;

mod commands;
mod logging;

use logging::LogFormat;

/// TalentChain real-time hub client
#[derive(Parser, Debug)]
#[command(name = "talentchain")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Path to a configuration file (TOML, YAML or JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log output format
    #[arg(long, value_enum, default_value = "pretty")]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print received events as JSON lines until Ctrl+C
    Listen {
        /// Authenticated user to connect as
        #[arg(short, long)]
        user_id: String,
        /// Event types to print (default: all)
        #[arg(short, long = "event")]
        events: Vec<String>,
    },

    /// Send a single event
    Emit {
        /// Authenticated user to connect as
        #[arg(short, long)]
        user_id: String,
        /// Event type, e.g. skill_created
        #[arg(short, long)]
        event: String,
        /// JSON payload
        #[arg(short, long)]
        data: Option<String>,
        /// Seconds to wait for the connection
        #[arg(long, default_value_t = 10)]
        timeout_secs: u64,
    },

    /// Show the effective configuration
    Config,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    logging::init_logging(logging::level_for(cli.verbose), cli.log_format);

    let config = match RealtimeConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Listen { user_id, events } => commands::listen(config, &user_id, &events).await,
        Commands::Emit {
            user_id,
            event,
            data,
            timeout_secs,
        } => commands::emit(config, &user_id, &event, data.as_deref(), timeout_secs).await,
        Commands::Config => commands::show_config(&config),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
