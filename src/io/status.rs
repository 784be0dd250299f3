//! State transition publishing for remote observation
//!
//! Publishes one small JSON record per transition to the status topic
//! (QoS 0, fire-and-forget) over the listener's MQTT connection. Nothing
//! in the control loop reads these back.

use crate::domain::types::{epoch_ms, BoxEvent, ExperimentState};
use crate::infra::config::Config;
use rumqttc::{AsyncClient, QoS};
use serde::Serialize;
use tracing::debug;

#[derive(Debug, Serialize)]
struct StatusRecord<'a> {
    box_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    run_id: Option<&'a str>,
    from: &'a str,
    event: &'a str,
    to: &'a str,
    ts: u64,
}

/// Publishes state transitions to the status topic
pub struct StatusPublisher {
    client: AsyncClient,
    topic: String,
    box_id: String,
}

impl StatusPublisher {
    pub fn new(client: AsyncClient, config: &Config) -> Self {
        Self {
            client,
            topic: config.status_topic().to_string(),
            box_id: config.box_id().to_string(),
        }
    }

    /// Publish one transition. Uses try_publish so the dispatcher never
    /// waits on the transport; failures are logged at debug and dropped.
    pub fn publish_transition(
        &self,
        from: ExperimentState,
        event: BoxEvent,
        to: ExperimentState,
        run_id: Option<&str>,
    ) {
        let record = StatusRecord {
            box_id: &self.box_id,
            run_id,
            from: from.as_str(),
            event: event.as_str(),
            to: to.as_str(),
            ts: epoch_ms(),
        };

        let payload = match serde_json::to_vec(&record) {
            Ok(payload) => payload,
            Err(e) => {
                debug!(error = %e, "status_serialize_failed");
                return;
            }
        };

        if let Err(e) = self.client.try_publish(&self.topic, QoS::AtMostOnce, false, payload) {
            debug!(error = %e, "status_publish_failed");
        }
    }
}
