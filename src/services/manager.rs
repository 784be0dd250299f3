//! Experiment orchestration
//!
//! The Manager is the single consumer of the event channel: every event,
//! whether decoded from the sensor listener or fed back by a training
//! completion, is dispatched here one at a time against the current state.
//! Door writes are awaited inline within the dispatch, so actuations never
//! interleave and every event sees the state the previous one left behind.

use crate::domain::state::{transition, Action};
use crate::domain::types::{epoch_ms, BoxEvent, ExperimentState, Run};
use crate::infra::config::Config;
use crate::infra::metrics::Metrics;
use crate::io::doors::DoorDriver;
use crate::io::status::StatusPublisher;
use crate::services::training::{Completion, SessionHandle, SessionLauncher};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, watch};
use tokio::time::{interval, Duration};
use tracing::{debug, info};

/// Central event processor for the experiment cycle
pub struct Manager {
    /// Current cycle phase
    pub(crate) state: ExperimentState,
    /// Correlation for the run in flight, None while waiting in Start
    pub(crate) run: Option<Run>,
    /// Session handle for the run in flight
    pub(crate) session: Option<SessionHandle>,
    /// Sender cloned into training completions
    pub(crate) event_tx: mpsc::Sender<BoxEvent>,
    /// Door actuation interface
    pub(crate) doors: Arc<dyn DoorDriver>,
    /// Training session launcher
    pub(crate) launcher: Arc<dyn SessionLauncher>,
    /// Metrics collector
    pub(crate) metrics: Arc<Metrics>,
    /// Transition publisher (optional)
    pub(crate) status: Option<StatusPublisher>,
    /// Seconds between metrics reports
    pub(crate) metrics_interval_secs: u64,
}

impl Manager {
    /// Create a new Manager with the given configuration and dependencies
    pub fn new(
        config: &Config,
        event_tx: mpsc::Sender<BoxEvent>,
        doors: Arc<dyn DoorDriver>,
        launcher: Arc<dyn SessionLauncher>,
        metrics: Arc<Metrics>,
        status: Option<StatusPublisher>,
    ) -> Self {
        Self {
            state: ExperimentState::Start,
            run: None,
            session: None,
            event_tx,
            doors,
            launcher,
            metrics,
            status,
            metrics_interval_secs: config.metrics_interval_secs(),
        }
    }

    /// Consume events until the channel closes or shutdown fires
    pub async fn run(
        &mut self,
        mut event_rx: mpsc::Receiver<BoxEvent>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        info!(state = %self.state, "manager_started");
        let mut report_interval =
            interval(Duration::from_secs(self.metrics_interval_secs.max(1)));

        loop {
            tokio::select! {
                // Process incoming events
                event = event_rx.recv() => {
                    match event {
                        Some(e) => self.dispatch(e).await,
                        None => break, // Channel closed
                    }
                }
                // Check for shutdown signal
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!(state = %self.state, "manager_shutdown");
                        return;
                    }
                }
                // Periodic metrics report
                _ = report_interval.tick() => {
                    self.metrics.report(self.state.as_str()).log();
                }
            }
        }
    }

    /// Apply one event to the current state and execute its side effects
    ///
    /// Runs only from the single consumer loop. Actions execute in table
    /// order before the state is replaced, and the training start completes
    /// within this call, before the next event is read.
    pub async fn dispatch(&mut self, event: BoxEvent) {
        let dispatch_start = Instant::now();
        let from = self.state;
        let step = transition(from, event);

        if !step.advanced(from) {
            debug!(state = %from, event = %event, "event_absorbed");
            self.metrics.record_dispatch(dispatch_start.elapsed().as_micros() as u64, true);
            return;
        }

        // A run begins the moment the subject is detected
        if from == ExperimentState::Start && step.next == ExperimentState::Experiment {
            let run = Run::begin();
            info!(run_id = %run.id, "run_started");
            self.run = Some(run);
        }

        for action in &step.actions {
            match *action {
                Action::OpenDoor(door) => self.doors.open(door).await,
                Action::CloseDoor(door) => self.doors.close(door).await,
                Action::StartTraining => self.start_training().await,
            }
        }

        self.state = step.next;

        {
            let run_id = self.run.as_ref().map(|r| r.id.as_str());
            info!(
                from = %from,
                event = %event,
                to = %self.state,
                run_id = %run_id.unwrap_or("-"),
                "state_transition"
            );
            if let Some(ref status) = self.status {
                status.publish_transition(from, event, self.state, run_id);
            }
        }

        // Back in Start the cycle is complete
        if from == ExperimentState::Reset && self.state == ExperimentState::Start {
            if let Some(run) = self.run.take() {
                let duration_ms = epoch_ms().saturating_sub(run.started_at_ms);
                info!(run_id = %run.id, duration_ms = %duration_ms, "run_completed");
                self.metrics.record_run_completed();
            }
            self.session = None;
        }

        self.metrics.record_dispatch(dispatch_start.elapsed().as_micros() as u64, false);
    }

    /// Entry effect of the experiment phase, executed within the dispatch
    async fn start_training(&mut self) {
        let completion = Completion::new(self.event_tx.clone());
        let handle = self.launcher.start(completion).await;
        self.metrics.record_run_started();
        self.session = Some(handle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::Door;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum DoorCall {
        Open(Door),
        Close(Door),
    }

    /// Door double that records calls and flags overlapping use
    struct RecordingDoors {
        calls: Mutex<Vec<DoorCall>>,
        in_flight: AtomicBool,
        overlap_detected: AtomicBool,
    }

    impl RecordingDoors {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                calls: Mutex::new(Vec::new()),
                in_flight: AtomicBool::new(false),
                overlap_detected: AtomicBool::new(false),
            })
        }

        async fn record(&self, call: DoorCall) {
            if self.in_flight.swap(true, Ordering::SeqCst) {
                self.overlap_detected.store(true, Ordering::SeqCst);
            }
            // Hold the guard across an await point so an overlapping
            // dispatch would be caught.
            tokio::time::sleep(Duration::from_millis(2)).await;
            self.calls.lock().push(call);
            self.in_flight.store(false, Ordering::SeqCst);
        }

        fn calls(&self) -> Vec<DoorCall> {
            self.calls.lock().clone()
        }

        fn overlapped(&self) -> bool {
            self.overlap_detected.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl DoorDriver for RecordingDoors {
        async fn open(&self, door: Door) {
            self.record(DoorCall::Open(door)).await;
        }

        async fn close(&self, door: Door) {
            self.record(DoorCall::Close(door)).await;
        }
    }

    /// Launcher double; optionally notifies completion right away
    struct StubLauncher {
        started: AtomicUsize,
        auto_complete: bool,
    }

    impl StubLauncher {
        fn new(auto_complete: bool) -> Arc<Self> {
            Arc::new(Self { started: AtomicUsize::new(0), auto_complete })
        }

        fn started(&self) -> usize {
            self.started.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl SessionLauncher for StubLauncher {
        async fn start(&self, completion: Completion) -> SessionHandle {
            self.started.fetch_add(1, Ordering::SeqCst);
            if self.auto_complete {
                tokio::spawn(async move {
                    completion.notify().await;
                });
            } else {
                drop(completion);
            }
            SessionHandle { pid: None }
        }
    }

    /// Test harness that keeps the channel receiver alive between dispatches
    struct TestManager {
        manager: Manager,
        _event_rx: mpsc::Receiver<BoxEvent>,
        doors: Arc<RecordingDoors>,
        launcher: Arc<StubLauncher>,
        metrics: Arc<Metrics>,
    }

    impl std::ops::Deref for TestManager {
        type Target = Manager;
        fn deref(&self) -> &Self::Target {
            &self.manager
        }
    }

    impl std::ops::DerefMut for TestManager {
        fn deref_mut(&mut self) -> &mut Self::Target {
            &mut self.manager
        }
    }

    fn create_test_manager(auto_complete: bool) -> TestManager {
        let (event_tx, event_rx) = mpsc::channel(64);
        let doors = RecordingDoors::new();
        let launcher = StubLauncher::new(auto_complete);
        let metrics = Arc::new(Metrics::new());
        let manager = Manager::new(
            &Config::default(),
            event_tx,
            doors.clone(),
            launcher.clone(),
            metrics.clone(),
            None,
        );
        TestManager { manager, _event_rx: event_rx, doors, launcher, metrics }
    }

    #[tokio::test]
    async fn test_full_cycle_door_sequence() {
        let mut m = create_test_manager(false);

        m.dispatch(BoxEvent::PresenceDetected).await;
        m.dispatch(BoxEvent::TrainingCompleted).await;
        m.dispatch(BoxEvent::PresenceExited).await;

        assert_eq!(
            m.doors.calls(),
            vec![
                DoorCall::Close(Door::Front),
                DoorCall::Open(Door::Exit),
                DoorCall::Close(Door::Exit),
                DoorCall::Open(Door::Front),
            ]
        );
        assert_eq!(m.launcher.started(), 1);
        assert_eq!(m.state, ExperimentState::Start);
        assert_eq!(m.metrics.runs_started(), 1);
        assert_eq!(m.metrics.runs_completed(), 1);
    }

    #[tokio::test]
    async fn test_entry_leaves_exit_door_alone() {
        let mut m = create_test_manager(false);

        m.dispatch(BoxEvent::PresenceDetected).await;

        assert_eq!(m.doors.calls(), vec![DoorCall::Close(Door::Front)]);
        assert_eq!(m.state, ExperimentState::Experiment);
        assert!(m.run.is_some());
        assert!(m.session.is_some());
    }

    #[tokio::test]
    async fn test_absorbed_events_touch_nothing() {
        let mut m = create_test_manager(false);

        m.dispatch(BoxEvent::PresenceExited).await;
        m.dispatch(BoxEvent::TrainingCompleted).await;

        assert!(m.doors.calls().is_empty());
        assert_eq!(m.launcher.started(), 0);
        assert_eq!(m.state, ExperimentState::Start);
        assert_eq!(m.metrics.events_dispatched(), 2);
    }

    #[tokio::test]
    async fn test_training_started_once_per_cycle() {
        let mut m = create_test_manager(false);

        m.dispatch(BoxEvent::PresenceDetected).await;
        // Repeated detection while enclosed must not start another session
        m.dispatch(BoxEvent::PresenceDetected).await;
        assert_eq!(m.launcher.started(), 1);

        m.dispatch(BoxEvent::TrainingCompleted).await;
        m.dispatch(BoxEvent::PresenceDetected).await;
        assert_eq!(m.launcher.started(), 1);

        m.dispatch(BoxEvent::PresenceExited).await;
        m.dispatch(BoxEvent::PresenceDetected).await;
        assert_eq!(m.launcher.started(), 2);
    }

    #[tokio::test]
    async fn test_stale_completion_is_ignored() {
        let mut m = create_test_manager(false);

        m.dispatch(BoxEvent::PresenceDetected).await;
        m.dispatch(BoxEvent::TrainingCompleted).await;
        let calls_after_reset = m.doors.calls();

        // A duplicate completion must not re-open the exit
        m.dispatch(BoxEvent::TrainingCompleted).await;
        assert_eq!(m.doors.calls(), calls_after_reset);
        assert_eq!(m.state, ExperimentState::Reset);
    }

    #[tokio::test]
    async fn test_cycle_completion_clears_run_and_session() {
        let mut m = create_test_manager(false);

        m.dispatch(BoxEvent::PresenceDetected).await;
        assert!(m.run.is_some());

        m.dispatch(BoxEvent::TrainingCompleted).await;
        assert!(m.run.is_some());

        m.dispatch(BoxEvent::PresenceExited).await;
        assert!(m.run.is_none());
        assert!(m.session.is_none());
    }

    #[tokio::test]
    async fn test_completion_flows_through_the_channel() {
        let (event_tx, event_rx) = mpsc::channel(64);
        let doors = RecordingDoors::new();
        let launcher = StubLauncher::new(true);
        let metrics = Arc::new(Metrics::new());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let mut manager = Manager::new(
            &Config::default(),
            event_tx.clone(),
            doors.clone(),
            launcher.clone(),
            metrics.clone(),
            None,
        );
        let handle = tokio::spawn(async move {
            manager.run(event_rx, shutdown_rx).await;
            manager
        });

        // One detection; the stub completes the session on its own, and the
        // completion must drive Experiment -> Reset without our help.
        event_tx.send(BoxEvent::PresenceDetected).await.unwrap();
        wait_for(|| doors.calls().len() >= 2).await;
        event_tx.send(BoxEvent::PresenceExited).await.unwrap();
        wait_for(|| doors.calls().len() >= 4).await;

        shutdown_tx.send(true).unwrap();
        let manager = handle.await.unwrap();

        assert_eq!(
            doors.calls(),
            vec![
                DoorCall::Close(Door::Front),
                DoorCall::Open(Door::Exit),
                DoorCall::Close(Door::Exit),
                DoorCall::Open(Door::Front),
            ]
        );
        assert_eq!(manager.state, ExperimentState::Start);
        assert_eq!(metrics.runs_completed(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_producers_never_interleave_doors() {
        let (event_tx, event_rx) = mpsc::channel(64);
        let doors = RecordingDoors::new();
        let launcher = StubLauncher::new(true);
        let metrics = Arc::new(Metrics::new());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let mut manager = Manager::new(
            &Config::default(),
            event_tx.clone(),
            doors.clone(),
            launcher.clone(),
            metrics.clone(),
            None,
        );
        let handle = tokio::spawn(async move {
            manager.run(event_rx, shutdown_rx).await;
        });

        let tx_a = event_tx.clone();
        let producer_a = tokio::spawn(async move {
            for _ in 0..50 {
                tx_a.send(BoxEvent::PresenceDetected).await.unwrap();
            }
        });
        let tx_b = event_tx.clone();
        let producer_b = tokio::spawn(async move {
            for _ in 0..50 {
                tx_b.send(BoxEvent::PresenceExited).await.unwrap();
            }
        });

        producer_a.await.unwrap();
        producer_b.await.unwrap();
        wait_for(|| metrics.events_dispatched() >= 100).await;

        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();

        assert!(!doors.overlapped(), "door calls overlapped");
        assert!(metrics.events_dispatched() >= 100);
    }

    /// Poll until `cond` holds, panicking after five seconds
    async fn wait_for(cond: impl Fn() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !cond() {
            assert!(Instant::now() < deadline, "condition not reached in time");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}
