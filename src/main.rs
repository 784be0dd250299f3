//! Chicken box - enclosure controller for behavioral experiments
//!
//! Drives one experiment cycle at a time: a presence event closes the front
//! door and starts the training application, completion opens the exit door,
//! and the exit event re-arms the box for the next subject.
//!
//! Module structure:
//! - `domain/` - Core business types (events, doors, state machine)
//! - `io/` - External interfaces (MQTT, serial doors, status egress)
//! - `services/` - Business logic (Manager, training sessions)
//! - `infra/` - Infrastructure (Config, Metrics)

use chickenbox::infra::{Config, Metrics};
use clap::Parser;

/// Chicken box - behavioral experiment enclosure controller
#[derive(Parser, Debug)]
#[command(name = "chickenbox", version, about)]
struct Args {
    /// Path to TOML configuration file
    #[arg(short, long, default_value = "config/dev.toml")]
    config: String,
}
use chickenbox::io::{EventListener, SerialDoors, StatusPublisher};
use chickenbox::services::{Manager, ProcessSession};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::info;
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize structured logging with configurable level via RUST_LOG env var
    // Default: INFO, use RUST_LOG=debug for full event visibility
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false)
        .init();

    info!("chickenbox starting");

    // Parse command line arguments using clap
    let args = Args::parse();

    // Load configuration from TOML file
    let config = Config::load_from_path(&args.config);

    // Log configuration
    info!(
        config_file = %config.config_file(),
        box_id = %config.box_id(),
        mqtt_host = %config.mqtt_host(),
        mqtt_port = %config.mqtt_port(),
        mqtt_topic = %config.mqtt_topic(),
        front_device = %config.front_door().device,
        exit_device = %config.exit_door().device,
        training_command = %config.training_command(),
        status_enabled = %config.status_enabled(),
        "config_loaded"
    );

    // Create shutdown signal
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Create shared components
    let metrics = Arc::new(Metrics::new());

    // Create event channel (bounded for backpressure)
    let (event_tx, event_rx) = mpsc::channel(100);

    // Connect to the MQTT broker up front: a box with no event source is
    // useless, so a failed first connection aborts startup with an error.
    let listener = EventListener::connect(&config, event_tx.clone(), metrics.clone()).await?;

    // Status egress shares the listener's MQTT client
    let status = if config.status_enabled() {
        Some(StatusPublisher::new(listener.client(), &config))
    } else {
        None
    };

    let doors = Arc::new(SerialDoors::new(&config, metrics.clone()));
    let launcher = Arc::new(ProcessSession::new(&config));

    // Start MQTT listener
    let listener_shutdown = shutdown_rx.clone();
    tokio::spawn(async move {
        listener.run(listener_shutdown).await;
    });

    // Handle shutdown on Ctrl+C
    let shutdown_signal = shutdown_tx;
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("shutdown_signal_received");
        let _ = shutdown_signal.send(true);
    });

    // Run the manager - consumes events until shutdown
    let mut manager = Manager::new(&config, event_tx, doors, launcher, metrics, status);
    manager.run(event_rx, shutdown_rx).await;

    info!("chickenbox shutdown complete");
    Ok(())
}
