mod commands;
mod reporter;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "nestor")]
#[command(about = "Provision serverless application resources, safely and repeatably", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (default: discovered from the current directory)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Environment name (dev, stg, prod, ...)
    #[arg(short, long, global = true, env = "NESTOR_ENV", default_value = "dev")]
    environment: String,

    /// Show debug logs
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Create missing resources and apply wiring
    Provision {
        /// Print the run report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Upload new code to provisioned functions
    Deploy {
        /// Only deploy this function id (default: every listed deployment)
        #[arg(short, long)]
        function: Option<String>,
    },
    /// Check the config file without touching the cloud
    Validate,
    /// List supported resource kinds
    Resources,
    /// Show version information
    Version,
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let target = commands::Target {
        config: cli.config,
        environment: cli.environment,
    };

    match cli.command {
        Commands::Provision { json } => commands::provision::handle(&target, json).await,
        Commands::Deploy { function } => commands::deploy::handle(&target, function.as_deref()).await,
        Commands::Validate => commands::validate::handle(&target),
        Commands::Resources => {
            commands::resources::handle();
            Ok(())
        }
        Commands::Version => {
            println!("nestor {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}
