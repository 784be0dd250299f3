//! Domain models - core experiment types and the state machine
//!
//! This module contains the canonical data types used throughout the system:
//! - `ExperimentState` - phase of the experiment cycle
//! - `BoxEvent` - presence/completion events driving the cycle
//! - `Door` - identity of the two actuated doors
//! - `transition` - the pure state transition table
//! - `Run` - per-run correlation record

pub mod state;
pub mod types;
