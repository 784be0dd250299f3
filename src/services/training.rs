//! Training session lifecycle
//!
//! The training subsystem is an external program (the touchscreen app the
//! subject interacts with). Starting a session spawns the configured
//! command; the session concludes when that process exits, whatever the
//! exit status. Spawn failures conclude the session immediately so the
//! cycle always keeps its exit edge out of the experiment phase.

use crate::domain::types::BoxEvent;
use crate::infra::config::Config;
use async_trait::async_trait;
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// One-shot completion handle for a training session
///
/// `notify` consumes the handle, so a session can resolve at most once.
/// The signal travels through the same channel as the sensor events and is
/// dispatched in arrival order with them.
pub struct Completion {
    event_tx: mpsc::Sender<BoxEvent>,
}

impl Completion {
    pub fn new(event_tx: mpsc::Sender<BoxEvent>) -> Self {
        Self { event_tx }
    }

    /// Signal that the session concluded
    ///
    /// Blocking send rather than try_send: a dropped completion would
    /// strand the cycle in the experiment phase. Callers run on their own
    /// task, never on the dispatcher.
    pub async fn notify(self) {
        if self.event_tx.send(BoxEvent::TrainingCompleted).await.is_err() {
            debug!("completion_after_shutdown");
        }
    }
}

/// Handle to a started session
#[derive(Debug)]
pub struct SessionHandle {
    /// OS pid of the training process, if one was spawned
    pub pid: Option<u32>,
}

/// Capability to start a training session
///
/// Implementations must arrange for the completion to be notified exactly
/// once per start, from any task context.
#[async_trait]
pub trait SessionLauncher: Send + Sync {
    async fn start(&self, completion: Completion) -> SessionHandle;
}

/// Production launcher spawning the configured training command
pub struct ProcessSession {
    command: String,
    args: Vec<String>,
}

impl ProcessSession {
    pub fn new(config: &Config) -> Self {
        Self {
            command: config.training_command().to_string(),
            args: config.training_args().to_vec(),
        }
    }
}

#[async_trait]
impl SessionLauncher for ProcessSession {
    async fn start(&self, completion: Completion) -> SessionHandle {
        let mut cmd = Command::new(&self.command);
        cmd.args(&self.args);

        match cmd.spawn() {
            Ok(mut child) => {
                let pid = child.id();
                info!(command = %self.command, pid = ?pid, "training_started");
                tokio::spawn(async move {
                    match child.wait().await {
                        Ok(status) if status.success() => info!("training_exited"),
                        Ok(status) => warn!(status = %status, "training_exited_abnormally"),
                        Err(e) => warn!(error = %e, "training_wait_failed"),
                    }
                    completion.notify().await;
                });
                SessionHandle { pid }
            }
            Err(e) => {
                warn!(command = %self.command, error = %e, "training_spawn_failed");
                // Conclude from a task: start() runs inside the dispatcher,
                // which must not send to its own channel.
                tokio::spawn(async move {
                    completion.notify().await;
                });
                SessionHandle { pid: None }
            }
        }
    }
}
