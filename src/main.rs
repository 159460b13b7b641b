//! Push notification client (v1)
//!
//! Sends notifications to the push gateway over a persistent HTTP/2
//! connection.
//!
//! # Architecture Overview
//!
//! ```text
//!     Caller                ┌──────────────────────────────────────────────┐
//!     ──────────────────────┼─▶ client ──▶ group ──▶ connection pool       │
//!                           │                          │                   │
//!                           │                          ▼                   │
//!                           │                 connection worker            │
//!                           │           (queue, heartbeat, retries)        │
//!                           │                          │                   │
//!                           │                          ▼                   │      Gateway
//!                           │        protocol session ◀──▶ net (TLS) ──────┼────▶ (HTTP/2)
//!                           │                                              │
//!                           │  config · observability · monitor · threading│
//!                           └──────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use serde_json::{Map, Value};

use push_client::config::load_config;
use push_client::observability::{logging, metrics};
use push_client::{Client, Notification};

#[derive(Parser)]
#[command(name = "push-client")]
#[command(about = "Send push notifications over HTTP/2", long_about = None)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "push-client.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Send an alert to a device
    Send {
        /// Device token
        #[arg(long)]
        token: String,

        /// Alert text
        #[arg(long)]
        alert: String,

        /// Topic, defaults to the configured one
        #[arg(long)]
        topic: Option<String>,

        /// 10 for immediate delivery, 5 to respect power saving
        #[arg(long)]
        priority: Option<u8>,

        /// Number of copies to send
        #[arg(long, default_value_t = 1)]
        count: usize,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = load_config(&cli.config)?;

    logging::init(&config.observability);
    tracing::info!(config = %cli.config.display(), "push-client v0.1.0 starting");

    if config.observability.metrics_enabled {
        if let Ok(addr) = config.observability.metrics_address.parse() {
            metrics::init_metrics(addr);
        } else {
            tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            );
        }
    }

    match cli.command {
        Commands::Send {
            token,
            alert,
            topic,
            priority,
            count,
        } => {
            let client = Client::from_config(&config)?;
            let failures = Arc::new(AtomicUsize::new(0));
            let failed = Arc::clone(&failures);

            client
                .with_connection(config.group.timeout(), |group| {
                    for _ in 0..count {
                        let mut payload = Map::new();
                        payload.insert("alert".into(), Value::String(alert.clone()));
                        let mut notification = Notification::new(token.clone()).with_payload(payload);
                        if let Some(topic) = &topic {
                            notification = notification.with_topic(topic.clone());
                        }
                        if let Some(priority) = priority {
                            notification = notification.with_priority(priority);
                        }

                        let failed = Arc::clone(&failed);
                        group.send_notification(&notification, None, move |response, _| {
                            if !response.is_success() {
                                failed.fetch_add(1, Ordering::Relaxed);
                            }
                            println!("{} {}", response.id().unwrap_or("-"), response);
                        })?;
                    }
                    Ok(())
                })
                .await?;

            let failures = failures.load(Ordering::Relaxed);
            tracing::info!(sent = count, failures, "Done");
            if failures > 0 {
                return Err(format!("{failures} of {count} notifications were rejected").into());
            }
        }
    }

    Ok(())
}
