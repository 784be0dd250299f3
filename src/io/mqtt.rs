//! MQTT client for receiving presence events from the box sensor

use crate::domain::types::BoxEvent;
use crate::infra::config::Config;
use crate::infra::metrics::Metrics;
use anyhow::Context;
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

/// Bound for the single startup connect attempt
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// MQTT listener feeding decoded presence events into the dispatch channel
///
/// `connect` makes exactly one connect attempt and fails the process boot on
/// refusal. Once connected, `run` polls the event loop until shutdown; the
/// transport library handles any later reconnects on its own.
pub struct EventListener {
    client: AsyncClient,
    eventloop: EventLoop,
    topic: String,
    event_tx: mpsc::Sender<BoxEvent>,
    metrics: Arc<Metrics>,
}

impl EventListener {
    /// Connect to the broker and subscribe to the box topic
    ///
    /// Polls the event loop until the broker acknowledges the session.
    /// The first connection error, or `CONNECT_TIMEOUT` elapsing, is fatal.
    pub async fn connect(
        config: &Config,
        event_tx: mpsc::Sender<BoxEvent>,
        metrics: Arc<Metrics>,
    ) -> anyhow::Result<Self> {
        let client_id = format!("{}-{}", config.box_id(), std::process::id());
        let mut mqttoptions = MqttOptions::new(client_id, config.mqtt_host(), config.mqtt_port());
        mqttoptions.set_keep_alive(Duration::from_secs(60));

        // Set credentials if configured
        if let (Some(username), Some(password)) = (config.mqtt_username(), config.mqtt_password()) {
            mqttoptions.set_credentials(username, password);
        }

        let (client, mut eventloop) = AsyncClient::new(mqttoptions, 100);
        client
            .subscribe(config.mqtt_topic(), QoS::AtMostOnce)
            .await
            .context("Failed to queue MQTT subscribe")?;

        let connack = tokio::time::timeout(CONNECT_TIMEOUT, async {
            loop {
                match eventloop.poll().await {
                    Ok(Event::Incoming(Packet::ConnAck(ack))) => return Ok(ack),
                    Ok(_) => continue,
                    Err(e) => return Err(e),
                }
            }
        })
        .await;

        match connack {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => {
                return Err(e).with_context(|| {
                    format!(
                        "MQTT connect to {}:{} failed",
                        config.mqtt_host(),
                        config.mqtt_port()
                    )
                });
            }
            Err(_) => {
                anyhow::bail!(
                    "MQTT connect to {}:{} timed out after {}s",
                    config.mqtt_host(),
                    config.mqtt_port(),
                    CONNECT_TIMEOUT.as_secs()
                );
            }
        }

        info!(
            topic = %config.mqtt_topic(),
            host = %config.mqtt_host(),
            port = %config.mqtt_port(),
            "mqtt_connected"
        );

        Ok(Self {
            client,
            eventloop,
            topic: config.mqtt_topic().to_string(),
            event_tx,
            metrics,
        })
    }

    /// Handle for publishing on the same connection
    pub fn client(&self) -> AsyncClient {
        self.client.clone()
    }

    /// Poll the event loop, decoding publishes into box events
    ///
    /// Events are sent via try_send to avoid blocking the MQTT eventloop.
    /// Dropped events are counted in metrics and logged (rate-limited).
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        // Rate-limit drop warnings to 1 per second
        let mut last_drop_warn = Instant::now() - Duration::from_secs(2);

        loop {
            tokio::select! {
                // Check for shutdown signal
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        if let Err(e) = self.client.disconnect().await {
                            debug!(error = %e, "mqtt_disconnect_failed");
                        }
                        info!("mqtt_shutdown");
                        return;
                    }
                }
                // Process MQTT events
                result = self.eventloop.poll() => {
                    match result {
                        Ok(Event::Incoming(Packet::Publish(publish))) => {
                            match std::str::from_utf8(&publish.payload) {
                                Ok(payload) => match BoxEvent::from_payload(payload) {
                                    Some(event) => {
                                        debug!(topic = %publish.topic, event = %event, "payload_decoded");
                                        self.metrics.record_event_received();
                                        if let Err(e) = self.event_tx.try_send(event) {
                                            match e {
                                                TrySendError::Full(_) => {
                                                    self.metrics.record_event_dropped();
                                                    if last_drop_warn.elapsed() > Duration::from_secs(1) {
                                                        warn!(event = %event, "event_dropped: channel full");
                                                        last_drop_warn = Instant::now();
                                                    }
                                                }
                                                TrySendError::Closed(_) => {
                                                    warn!("Event channel closed");
                                                    return;
                                                }
                                            }
                                        }
                                    }
                                    None => {
                                        self.metrics.record_payload_ignored();
                                        debug!(topic = %publish.topic, payload = %payload, "unrecognized_payload");
                                    }
                                },
                                Err(e) => {
                                    self.metrics.record_payload_ignored();
                                    warn!(error = %e, "Invalid UTF-8 in MQTT payload");
                                }
                            }
                        }
                        Ok(Event::Incoming(Packet::ConnAck(_))) => {
                            info!(topic = %self.topic, "mqtt_reconnected");
                        }
                        Ok(_) => {}
                        Err(e) => {
                            error!(error = %e, "mqtt_error");
                            tokio::time::sleep(Duration::from_secs(1)).await;
                        }
                    }
                }
            }
        }
    }
}
