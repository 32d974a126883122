mod config;
mod handlers;
mod server;

use std::io::Read;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::config::StorageArgs;

#[derive(Parser)]
#[command(
    name = "lid",
    about = "lid: distributed mutual exclusion on conditional writes",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the lid HTTP lock server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "3100")]
        port: u16,

        /// Host to bind to
        #[arg(long, default_value = "0.0.0.0")]
        host: String,

        /// Bearer token required on every route but /health
        #[arg(long, env = "LID_API_KEY", hide_env_values = true)]
        api_key: Option<String>,

        /// Requests handled at once; the rest queue
        #[arg(long, default_value = "256")]
        max_in_flight: usize,

        #[command(flatten)]
        storage: StorageArgs,
    },

    /// Run a JSON lock script from stdin and print its history
    Script {
        #[command(flatten)]
        storage: StorageArgs,
    },

    /// Print version information
    Version,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            port,
            host,
            api_key,
            max_in_flight,
            storage,
        } => {
            let client = match storage.open_client() {
                Ok(client) => client,
                Err(e) => {
                    tracing::error!(error = %e, "Failed to open lock storage");
                    return ExitCode::FAILURE;
                }
            };
            let settings = server::ServerSettings {
                host,
                port,
                api_key: api_key.filter(|k| !k.is_empty()),
                max_in_flight,
                backend: storage.backend_name(),
            };
            if let Err(e) = server::run(client, settings).await {
                tracing::error!(error = %e, "Server stopped");
                return ExitCode::FAILURE;
            }
        }
        Commands::Script { storage } => {
            let mut input = String::new();
            if let Err(e) = std::io::stdin().read_to_string(&mut input) {
                eprintln!("Failed to read stdin: {e}");
                return ExitCode::FAILURE;
            }
            let client = match storage.open_client() {
                Ok(client) => client,
                Err(e) => {
                    eprintln!("Failed to open lock storage: {e}");
                    return ExitCode::FAILURE;
                }
            };
            let history = match lid_core::script::run_script(&input, &client) {
                Ok(response) => response,
                Err(e) => {
                    eprintln!("{e}");
                    return ExitCode::FAILURE;
                }
            };
            match serde_json::to_string_pretty(&history) {
                Ok(json) => println!("{json}"),
                Err(e) => {
                    eprintln!("Failed to encode history: {e}");
                    return ExitCode::FAILURE;
                }
            }
        }
        Commands::Version => {
            println!("lid {}", env!("CARGO_PKG_VERSION"));
            println!("Distributed mutual exclusion on conditional writes");
        }
    }
    ExitCode::SUCCESS
}
