//! agentry - tool-augmented LLM agents from the terminal

use std::io::IsTerminal;

use clap::{Parser, Subcommand};
use tracing::error;
use tracing_subscriber::EnvFilter;

mod agents;
mod commands;

use commands::{bank_command, city_command, init_command, status_command, weather_command};

/// agentry - tool-calling agents for your terminal
#[derive(Parser)]
#[command(name = "agentry")]
#[command(about = "◆ Tool-augmented LLM agents from the terminal")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    /// Model as provider:name, e.g. groq:llama-3.3-70b-versatile
    #[arg(long, global = true)]
    model: Option<String>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the config file
    Init,
    /// Show configuration status
    Status,
    /// Ask the bank support agent
    Bank {
        /// Customer ID (1-4 in the demo database)
        #[arg(short, long, default_value_t = 1)]
        customer: u32,
        /// Message to send; runs the demo queries when omitted
        #[arg(short, long)]
        message: Option<String>,
    },
    /// Ask the weather agent
    Weather {
        /// Message to send
        #[arg(short, long)]
        message: Option<String>,
    },
    /// Extract structured facts about a city
    City {
        /// Description of the city
        #[arg(short, long)]
        message: Option<String>,
    },
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Process env wins over ./.env, which wins over ~/.agentry/.env
    dotenvy::dotenv().ok();
    dotenvy::from_path(agentry_config::env_file_path()).ok();

    init_tracing(cli.verbose);

    let model = cli.model;
    let (name, result) = match cli.command {
        Commands::Init => ("Init", init_command().await),
        Commands::Status => ("Status", status_command(model).await),
        Commands::Bank { customer, message } => {
            ("Bank", bank_command(model, customer, message).await)
        }
        Commands::Weather { message } => ("Weather", weather_command(model, message).await),
        Commands::City { message } => ("City", city_command(model, message).await),
    };

    if let Err(e) = result {
        error!("{} failed: {:#}", name, e);
        std::process::exit(1);
    }
}
