//! List-Watch CLI
//!
//! Command-line tools for exercising the list-watch engine.
//!
//! # Commands
//!
//! - `simulate` - Run the engine against a churning in-memory server
//! - `version` - Show version information

mod commands;

use clap::{Parser, Subcommand};
use commands::simulate::{OutputFormat, SimulateOptions};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// List-watch command-line tools.
#[derive(Parser)]
#[command(name = "listwatch")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sync a cache from a churning in-memory server and check convergence
    Simulate {
        /// Number of VPCs to seed before starting
        #[arg(long, default_value = "100")]
        vpcs: usize,

        /// Number of cloud accounts to spread VPCs across
        #[arg(long, default_value = "3")]
        accounts: usize,

        /// Restrict the cache to one account (index into the seeded accounts)
        #[arg(long)]
        account: Option<usize>,

        /// How long to churn, in seconds
        #[arg(short, long, default_value = "5")]
        duration: u64,

        /// Pause between changes, in milliseconds
        #[arg(long, default_value = "5")]
        churn_interval_ms: u64,

        /// Abort all watches this often, in milliseconds (0 disables)
        #[arg(long, default_value = "1000")]
        fault_interval_ms: u64,

        /// List timeout, in milliseconds
        #[arg(long, default_value = "60000")]
        list_timeout_ms: u64,

        /// Watch idle timeout, in milliseconds
        #[arg(long)]
        watch_idle_timeout_ms: Option<u64>,

        /// Server bookmark interval, in milliseconds
        #[arg(long)]
        bookmark_interval_ms: Option<u64>,

        /// Seed for reproducible churn
        #[arg(long)]
        seed: Option<u64>,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show version information
    Version,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Simulate {
            vpcs,
            accounts,
            account,
            duration,
            churn_interval_ms,
            fault_interval_ms,
            list_timeout_ms,
            watch_idle_timeout_ms,
            bookmark_interval_ms,
            seed,
            format,
        } => {
            let options = SimulateOptions {
                vpcs,
                accounts,
                account,
                duration: Duration::from_secs(duration),
                churn_interval: Duration::from_millis(churn_interval_ms),
                fault_interval: (fault_interval_ms > 0)
                    .then(|| Duration::from_millis(fault_interval_ms)),
                list_timeout: Duration::from_millis(list_timeout_ms),
                watch_idle_timeout: watch_idle_timeout_ms.map(Duration::from_millis),
                bookmark_interval: bookmark_interval_ms.map(Duration::from_millis),
                seed,
            };
            let format: OutputFormat = format.parse()?;
            commands::simulate::run(options, format).await?;
        }
        Commands::Version => {
            println!("listwatch CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("listwatch engine v{}", listwatch_engine::VERSION);
        }
    }

    Ok(())
}
