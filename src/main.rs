// VaultKeeper Gateway - Main Entry Point
//
// A thin operational CLI over the command gateway:
// - run one allow-listed command to a terminal result
// - probe tool availability, version, and session state
//
// The desktop client links the library directly; this binary exists for
// scripting and diagnostics.

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::{info, Level};
use tracing_subscriber::EnvFilter;
use vaultkeeper_gateway::config::GatewayConfig;
use vaultkeeper_gateway::gateway::{CommandRequest, PlatformGateway};

/// VaultKeeper: secure Azure CLI command gateway
#[derive(Parser, Debug)]
#[command(name = "vaultkeeper")]
#[command(author = "VaultKeeper Contributors")]
#[command(version = "0.1.0")]
#[command(about = "Secure command-execution gateway for the Azure CLI", long_about = None)]
struct Args {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Path to a configuration file (default: XDG config dir)
    #[arg(long)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a single command through the gateway
    Run {
        /// The full command line, e.g. "az keyvault list"
        command: String,

        /// Print the result as JSON instead of raw output
        #[arg(long)]
        json: bool,

        /// Override the configured timeout, in seconds
        #[arg(long)]
        timeout_secs: Option<u64>,
    },
    /// Check whether the external tool can be located
    Check,
    /// Print the external tool's version
    Version,
    /// Check whether a signed-in session exists
    Account,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => GatewayConfig::load_from_path(path)?,
        None => GatewayConfig::load()?,
    };

    let filter = if args.verbose {
        Level::DEBUG
    } else {
        config.log_level()?
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(filter.into())
                .from_env_lossy(),
        )
        .init();

    let gateway = PlatformGateway::new(config);

    match args.command {
        Commands::Run {
            command,
            json,
            timeout_secs,
        } => {
            let mut request = CommandRequest::new(command);
            if let Some(secs) = timeout_secs {
                request = request.timeout(std::time::Duration::from_secs(secs));
            }
            let result = gateway.execute(request).await;
            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else if result.success {
                print!("{}", result.stdout);
            } else {
                eprint!("{}", result.stderr);
                if !result.stderr.ends_with('\n') {
                    eprintln!();
                }
            }
            if !result.success {
                std::process::exit(1);
            }
        }
        Commands::Check => {
            if gateway.check_availability().await {
                info!("tool is available");
                println!("available");
            } else {
                println!("not found");
                std::process::exit(1);
            }
        }
        Commands::Version => match gateway.get_version().await {
            Some(version) => println!("{version}"),
            None => {
                eprintln!("could not determine tool version");
                std::process::exit(1);
            }
        },
        Commands::Account => {
            if gateway.is_authenticated().await {
                println!("signed in");
            } else {
                println!("signed out");
                std::process::exit(1);
            }
        }
    }

    Ok(())
}
