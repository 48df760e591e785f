//! EPCR CLI
//!
//! Command-line tools for field units and the center.
//!
//! # Commands
//!
//! - `init` - Create a store with the record schema
//! - `pending` - List completed records not yet stored by the center
//! - `transfer` - Send pending records to the center and store server ids
//! - `serve` - Run the center's receiver

mod commands;

use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// EPCR field unit and center tools.
#[derive(Parser)]
#[command(name = "epcr")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the store database
    #[arg(global = true, short, long)]
    db: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the store and install the record schema
    Init,

    /// List records waiting for transfer
    Pending {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Send pending records to the center
    Transfer {
        /// Center address (host:port)
        #[arg(short, long, default_value = "127.0.0.1:7400")]
        center: String,

        /// Command that starts the local store if it does not answer
        #[arg(long)]
        bring_up: Option<String>,

        /// Append the audit trail to this file
        #[arg(short, long)]
        log: Option<PathBuf>,

        /// Seconds to wait for each acknowledgement
        #[arg(long, default_value = "30")]
        ack_timeout: u64,

        /// Store connection attempts before giving up
        #[arg(long, default_value = "20")]
        attempts: u32,
    },

    /// Receive records from field units
    Serve {
        /// Address to listen on
        #[arg(short, long, default_value = "127.0.0.1:7400")]
        bind: SocketAddr,

        /// JSON file mapping personal ids to registry records
        #[arg(short, long)]
        identities: Option<PathBuf>,

        /// Append the audit trail to this file
        #[arg(short, long)]
        log: Option<PathBuf>,

        /// Maximum concurrent field-unit connections
        #[arg(long, default_value = "16")]
        max_connections: usize,
    },

    /// Show version information
    Version,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Init => {
            let db = cli.db.ok_or("Store path required for init")?;
            commands::init::run(&db)?;
        }
        Commands::Pending { format } => {
            let db = cli.db.ok_or("Store path required for pending")?;
            commands::pending::run(&db, &format)?;
        }
        Commands::Transfer {
            center,
            bring_up,
            log,
            ack_timeout,
            attempts,
        } => {
            let db = cli.db.ok_or("Store path required for transfer")?;
            let options = commands::transfer::TransferOptions {
                center,
                bring_up,
                log,
                ack_timeout,
                attempts,
            };
            commands::transfer::run(&db, options).await?;
        }
        Commands::Serve {
            bind,
            identities,
            log,
            max_connections,
        } => {
            let db = cli.db.ok_or("Store path required for serve")?;
            commands::serve::run(&db, bind, identities.as_deref(), log.as_deref(), max_connections)
                .await?;
        }
        Commands::Version => {
            println!("EPCR CLI v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
