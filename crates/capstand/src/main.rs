//! capstand — the Capstan control-plane daemon.
//!
//! Runs the deployment orchestration controllers against an in-memory
//! object store and pod API in one process.
//!
//! # Usage
//!
//! ```text
//! capstand standalone --env DEPLOYER_TOKEN=abc --resync-secs 10
//! ```

mod standalone;

use std::time::Duration;

use capstan_core::EnvVar;
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "capstand", about = "Capstan deployment orchestration daemon")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the whole control plane in one process (in-memory store).
    Standalone {
        /// Environment variable (KEY=VALUE) appended to every deployer
        /// pod. Repeatable.
        #[arg(long = "env", value_parser = parse_env_var)]
        environment: Vec<EnvVar>,

        /// Deployment controller resync period in seconds (pod status is
        /// polled on redelivery).
        #[arg(long, default_value = "10")]
        resync_secs: u64,
    },
}

fn parse_env_var(raw: &str) -> Result<EnvVar, String> {
    match raw.split_once('=') {
        Some((name, value)) if !name.is_empty() => Ok(EnvVar::new(name, value)),
        _ => Err(format!("expected KEY=VALUE, got {raw:?}")),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| {
                    "info,capstand=debug,capstan_controller=debug,capstan_cache=debug"
                        .parse()
                        .unwrap()
                }),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Standalone {
            environment,
            resync_secs,
        } => standalone::run(environment, Duration::from_secs(resync_secs)).await,
    }
}
