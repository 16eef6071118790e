// finsaathi-host: desktop harness for the FinSaathi native bridge
//
// Serves the host channels over TCP for desktop runs of the application layer,
// and dispatches single calls for quick checks of the handlers.

use anyhow::Result;
use clap::{Parser, Subcommand};

use finsaathi_channel::{Outcome, PERFORMANCE_CHANNEL};
use finsaathi_host::{config, daemon, shell::HostShell};

#[derive(Parser)]
#[command(name = "finsaathi-host", about = "Native host bridge for the FinSaathi app")]
struct Cli {
    /// Config file (defaults to $FINSAATHI_CONFIG or the user config dir)
    #[arg(short, long, global = true)]
    config: Option<std::path::PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the host channels over TCP (foreground)
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "4141")]
        port: u16,

        /// Bind address
        #[arg(short, long, default_value = "127.0.0.1")]
        bind: String,
    },
    /// Dispatch one call in-process and print its reply envelope
    Call {
        /// Method name
        method: String,

        /// Channel name
        #[arg(long, default_value = PERFORMANCE_CHANNEL)]
        channel: String,

        /// Arguments as JSON
        #[arg(long)]
        args: Option<String>,
    },
    /// List channels and their methods
    Methods,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let host_config = match &cli.config {
        Some(path) => config::load_config_from(path)?,
        None => config::load_config()?,
    };

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&host_config.log_filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    let shell = HostShell::configure(host_config)?;

    match cli.command {
        Commands::Serve { port, bind } => {
            tracing::info!("Starting finsaathi-host on {}:{}", bind, port);
            daemon::run_daemon(&bind, port, shell).await?;
        }
        Commands::Call {
            method,
            channel,
            args,
        } => {
            let outcome = shell.invoke_raw(&channel, &method, args.as_deref()).await;
            println!("{}", serde_json::to_string(&outcome.to_envelope())?);
            if let Outcome::Failure(err) = &outcome {
                tracing::warn!("{} failed: {}", method, err);
            }
        }
        Commands::Methods => {
            for (channel, methods) in shell.describe() {
                println!("{}", channel);
                for method in methods {
                    println!("  {}", method);
                }
            }
        }
    }

    Ok(())
}
