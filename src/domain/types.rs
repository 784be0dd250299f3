//! Shared types for the chicken box controller

use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Get current epoch milliseconds
#[inline]
pub fn epoch_ms() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as u64
}

/// The two gated doors of the box
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Door {
    /// Entry door the subject walks in through
    Front,
    /// Rear door the subject leaves through after a session
    Exit,
}

impl Door {
    pub fn as_str(&self) -> &'static str {
        match self {
            Door::Front => "front",
            Door::Exit => "exit",
        }
    }
}

impl std::fmt::Display for Door {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Event consumed by the experiment state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoxEvent {
    /// Subject entered the box (sensor payload)
    PresenceDetected,
    /// Subject left the box (sensor payload)
    PresenceExited,
    /// Training session concluded (completion callback)
    TrainingCompleted,
}

impl BoxEvent {
    /// Decode a sensor payload. Only the two recognized presence strings map
    /// to events; the listener drops everything else.
    pub fn from_payload(payload: &str) -> Option<Self> {
        match payload {
            "chicken_detected_in_box" => Some(BoxEvent::PresenceDetected),
            "chicken_exited_box" => Some(BoxEvent::PresenceExited),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BoxEvent::PresenceDetected => "presence_detected",
            BoxEvent::PresenceExited => "presence_exited",
            BoxEvent::TrainingCompleted => "training_completed",
        }
    }
}

impl std::fmt::Display for BoxEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Phase of the experiment cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExperimentState {
    /// Waiting for the subject: FRONT open, EXIT closed
    Start,
    /// Subject enclosed, training session running
    Experiment,
    /// Session done, EXIT open, waiting for the subject to leave
    Reset,
}

impl ExperimentState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExperimentState::Start => "start",
            ExperimentState::Experiment => "experiment",
            ExperimentState::Reset => "reset",
        }
    }
}

impl std::fmt::Display for ExperimentState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Correlation record for one experiment run, Start through Reset
#[derive(Debug, Clone)]
pub struct Run {
    /// UUIDv7 run ID (time-sortable)
    pub id: String,
    pub started_at_ms: u64,
}

impl Run {
    pub fn begin() -> Self {
        Self { id: Uuid::now_v7().to_string(), started_at_ms: epoch_ms() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_decoding() {
        assert_eq!(
            BoxEvent::from_payload("chicken_detected_in_box"),
            Some(BoxEvent::PresenceDetected)
        );
        assert_eq!(BoxEvent::from_payload("chicken_exited_box"), Some(BoxEvent::PresenceExited));
        assert_eq!(BoxEvent::from_payload("chicken_detected_in_box "), None);
        assert_eq!(BoxEvent::from_payload("CHICKEN_DETECTED_IN_BOX"), None);
        assert_eq!(BoxEvent::from_payload(""), None);
        assert_eq!(BoxEvent::from_payload("training_completed"), None);
    }

    #[test]
    fn test_run_ids_are_unique() {
        let a = Run::begin();
        let b = Run::begin();
        assert_ne!(a.id, b.id);
        assert!(a.started_at_ms > 0);
    }
}
