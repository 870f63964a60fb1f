//! carepod CLI: the main entry point.
//!
//! Commands:
//! - `chat`: interactive triage session on stdin
//! - `turn`: process a single utterance and print the JSON response
//! - `doctor`: check configuration and wiring

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "carepod",
    about = "carepod: patient triage decision core",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to the TOML config file
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Interactive triage session
    Chat {
        /// Patient identity token
        #[arg(short, long, default_value = "demo-patient")]
        patient: String,
    },

    /// Process one utterance and print the structured response
    Turn {
        /// Patient identity token
        #[arg(short, long, default_value = "demo-patient")]
        patient: String,

        /// The patient utterance
        utterance: String,
    },

    /// Check configuration and wiring
    Doctor,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    let config = commands::load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Chat { patient } => commands::chat::run(config, &patient).await?,
        Commands::Turn { patient, utterance } => {
            commands::turn::run(config, &patient, &utterance).await?
        }
        Commands::Doctor => commands::doctor::run(config)?,
    }

    Ok(())
}
