// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! SNS to SPARQL relay CLI
//!
//! # Usage
//!
//! ```bash
//! # Run with ./configuration.json, reloading when it changes
//! sns-sparql-relay
//!
//! # Explicit file, check for changes every 10 seconds
//! sns-sparql-relay --config /etc/relay.json --watch-interval 10
//!
//! # Local run without AWS (in-memory provider)
//! sns-sparql-relay --mock-provider
//!
//! # Check a configuration file
//! sns-sparql-relay validate --config /etc/relay.json
//! ```

use clap::{Parser, Subcommand};
use sns_sparql_relay::{
    MockPubSubClient, ProviderError, PubSubClient, Relay, RelayConfig, RelayHandle, SnsClient,
};
use std::error::Error;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::time::Interval;
use tracing_subscriber::EnvFilter;

/// Relay SNS notifications into a SPARQL triple store
#[derive(Parser, Debug)]
#[command(name = "sns-sparql-relay")]
#[command(about = "Relay Amazon SNS notifications into a SPARQL triple store")]
#[command(version)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "configuration.json")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Seconds between configuration file checks (0 disables reload)
    #[arg(long, default_value = "2")]
    watch_interval: u64,

    /// Use the in-memory provider instead of SNS
    #[arg(long)]
    mock_provider: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Generate example configuration file
    GenConfig {
        /// Output file path
        #[arg(short, long, default_value = "configuration.json")]
        output: PathBuf,
    },

    /// Validate a configuration file
    Validate {
        /// Configuration file path
        #[arg(short, long)]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();

    if let Some(cmd) = args.command {
        init_logging(&args.log_level, false);
        return match cmd {
            Commands::GenConfig { output } => cmd_gen_config(output),
            Commands::Validate { config } => cmd_validate(config),
        };
    }

    let config = RelayConfig::from_file(&args.config)?;
    init_logging(&args.log_level, config.debug);

    println!("SNS to SPARQL relay v{}", env!("CARGO_PKG_VERSION"));
    println!("Configuration: {}", args.config.display());
    println!("Press Ctrl+C to stop...");
    println!();

    if args.mock_provider {
        let client = Arc::new(MockPubSubClient::new());
        run(&args, config, move |_| Ok(client.clone())).await
    } else {
        run(&args, config, |config| {
            SnsClient::from_config(config.aws.as_ref()).map(Arc::new)
        })
        .await
    }
}

fn init_logging(level: &str, debug: bool) {
    let directives = if debug {
        format!("{},sns_sparql_relay=debug,tower_http=debug", level)
    } else {
        level.to_string()
    };
    let filter = EnvFilter::try_new(directives).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

/// Serve until Ctrl+C, restarting the relay whenever the file changes.
async fn run<P, F>(args: &Args, config: RelayConfig, make_client: F) -> Result<(), Box<dyn Error>>
where
    P: PubSubClient,
    F: Fn(&RelayConfig) -> Result<Arc<P>, ProviderError>,
{
    let mut modified = modified_time(&args.config);
    let mut relay = Some(Relay::start(config.clone(), make_client(&config)?).await?);
    let mut ticker = (args.watch_interval > 0)
        .then(|| tokio::time::interval(Duration::from_secs(args.watch_interval)));

    loop {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result?;
                break;
            }
            _ = tick(&mut ticker) => {
                let current = modified_time(&args.config);
                if current == modified {
                    continue;
                }
                modified = current;
                tracing::info!("Configuration file changed, reloading");

                if let Some(running) = relay.take() {
                    running.shutdown().await;
                }
                relay = restart(&args.config, &make_client).await;
            }
        }
    }

    println!("\nShutting down...");
    if let Some(running) = relay.take() {
        let shutdown = running.shutdown();
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                report = &mut shutdown => {
                    println!(
                        "Unsubscribed {}/{} topics",
                        report.succeeded, report.requested
                    );
                    break;
                }
                _ = tokio::signal::ctrl_c() => {
                    tracing::warn!("Already shutting down");
                }
            }
        }
    }
    Ok(())
}

/// Start a fresh relay from the file. Failures leave the relay stopped
/// until the next change.
async fn restart<P, F>(path: &Path, make_client: &F) -> Option<RelayHandle<P>>
where
    P: PubSubClient,
    F: Fn(&RelayConfig) -> Result<Arc<P>, ProviderError>,
{
    let config = match RelayConfig::from_file(path) {
        Ok(c) => c,
        Err(e) => {
            tracing::error!("Relay stays stopped, configuration rejected: {}", e);
            return None;
        }
    };
    let client = match make_client(&config) {
        Ok(c) => c,
        Err(e) => {
            tracing::error!("Relay stays stopped, provider unavailable: {}", e);
            return None;
        }
    };
    match Relay::start(config, client).await {
        Ok(handle) => Some(handle),
        Err(e) => {
            tracing::error!("Relay failed to start: {}", e);
            None
        }
    }
}

async fn tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

fn modified_time(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}

fn cmd_gen_config(output: PathBuf) -> Result<(), Box<dyn Error>> {
    let json = serde_json::to_string_pretty(&RelayConfig::example())?;
    std::fs::write(&output, json + "\n")?;
    println!("Generated configuration file: {}", output.display());
    Ok(())
}

fn cmd_validate(config_path: PathBuf) -> Result<(), Box<dyn Error>> {
    match RelayConfig::from_file(&config_path) {
        Ok(config) => {
            println!("Configuration valid!");
            println!();
            println!("Listen: {}", config.listen_addr());
            println!("Callback: {}", config.endpoint_url);
            println!("Update endpoint: {}", config.update_endpoint);
            println!("Topics: {}", config.topics.len());
            for (i, topic) in config.topics.iter().enumerate() {
                println!(
                    "  [{}] {} -> {} {}",
                    i,
                    topic.topic_arn,
                    topic.subject_uri_prefix,
                    match (&topic.filter_field, &topic.filter_value) {
                        (Some(field), Some(value)) => format!("(filter {} = {})", field, value),
                        _ => String::new(),
                    }
                );
            }
            Ok(())
        }
        Err(e) => {
            eprintln!("Configuration invalid: {}", e);
            std::process::exit(1);
        }
    }
}
