//! IO modules - external system interfaces
//!
//! This module contains all external IO operations:
//! - `mqtt` - MQTT client for receiving box sensor events
//! - `doors` - Serial actuation of the two box doors
//! - `status` - State transition publishing to the status topic

pub mod doors;
pub mod mqtt;
pub mod status;

// Re-export commonly used types
pub use doors::{DoorDriver, SerialDoors};
pub use mqtt::EventListener;
pub use status::StatusPublisher;
