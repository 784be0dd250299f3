//! Services - business logic and state management
//!
//! This module contains the core business logic services:
//! - `manager` - Central event dispatcher driving the experiment cycle
//! - `training` - Training session launching and completion signalling

pub mod manager;
pub mod training;

// Re-export commonly used types
pub use manager::Manager;
pub use training::{Completion, ProcessSession, SessionHandle, SessionLauncher};
