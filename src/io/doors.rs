//! Serial door actuation
//!
//! Each door is a dumb serial actuator: open the configured device, write
//! the configured command string, drop the port. There is no status
//! readback; the state machine assumes commands take effect.

use crate::domain::types::Door;
use crate::infra::config::{Config, DoorSettings};
use crate::infra::metrics::Metrics;
use anyhow::Context;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::AsyncWriteExt;
use tokio_serial::SerialPortBuilderExt;
use tracing::{info, warn};

/// Capability to actuate the two box doors
///
/// Fire-and-forget: implementations surface failures through logs and
/// metrics only, never to the caller.
#[async_trait]
pub trait DoorDriver: Send + Sync {
    async fn open(&self, door: Door);
    async fn close(&self, door: Door);
}

/// Production driver writing command strings over per-door serial devices
pub struct SerialDoors {
    front: DoorSettings,
    exit: DoorSettings,
    timeout: Duration,
    metrics: Arc<Metrics>,
}

impl SerialDoors {
    pub fn new(config: &Config, metrics: Arc<Metrics>) -> Self {
        Self {
            front: config.front_door().clone(),
            exit: config.exit_door().clone(),
            timeout: Duration::from_millis(config.door_timeout_ms()),
            metrics,
        }
    }

    fn settings(&self, door: Door) -> &DoorSettings {
        match door {
            Door::Front => &self.front,
            Door::Exit => &self.exit,
        }
    }

    /// One open-write-drop cycle, bounded by the configured timeout
    async fn write_command(&self, settings: &DoorSettings, command: &str) -> anyhow::Result<()> {
        let cycle = async {
            let mut port = tokio_serial::new(&settings.device, settings.baud)
                .timeout(self.timeout)
                .open_native_async()
                .with_context(|| format!("Failed to open serial device {}", settings.device))?;
            port.write_all(command.as_bytes())
                .await
                .with_context(|| format!("Serial write to {} failed", settings.device))?;
            port.flush()
                .await
                .with_context(|| format!("Serial flush to {} failed", settings.device))?;
            Ok(())
        };

        match tokio::time::timeout(self.timeout, cycle).await {
            Ok(result) => result,
            Err(_) => anyhow::bail!(
                "Serial command to {} timed out after {}ms",
                settings.device,
                self.timeout.as_millis()
            ),
        }
    }
}

#[async_trait]
impl DoorDriver for SerialDoors {
    async fn open(&self, door: Door) {
        let settings = self.settings(door);
        let start = Instant::now();
        self.metrics.record_door_command();

        match self.write_command(settings, &settings.open_command).await {
            Ok(()) => {
                info!(
                    door = %door,
                    device = %settings.device,
                    latency_us = %start.elapsed().as_micros(),
                    "door_open_command"
                );
            }
            Err(e) => {
                self.metrics.record_door_failure();
                warn!(door = %door, error = %e, "door_open_failed");
            }
        }
    }

    async fn close(&self, door: Door) {
        let settings = self.settings(door);
        let start = Instant::now();
        self.metrics.record_door_command();

        match self.write_command(settings, &settings.close_command).await {
            Ok(()) => {
                info!(
                    door = %door,
                    device = %settings.device,
                    latency_us = %start.elapsed().as_micros(),
                    "door_close_command"
                );
            }
            Err(e) => {
                self.metrics.record_door_failure();
                warn!(door = %door, error = %e, "door_close_failed");
            }
        }
    }
}
