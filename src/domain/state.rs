//! Experiment state machine
//!
//! Pure transition table over the three cycle phases. No I/O and no clock
//! here: the manager executes the returned actions and owns the current
//! state, so every dispatch sees the state the previous one left behind.

use crate::domain::types::{BoxEvent, Door, ExperimentState};
use smallvec::{smallvec, SmallVec};

/// Side effect requested by a transition, executed in order by the manager
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    OpenDoor(Door),
    CloseDoor(Door),
    StartTraining,
}

/// Result of applying one event to the current state
#[derive(Debug)]
pub struct Transition {
    pub next: ExperimentState,
    pub actions: SmallVec<[Action; 2]>,
}

impl Transition {
    /// True when the event matched a table row and the cycle advanced
    pub fn advanced(&self, from: ExperimentState) -> bool {
        self.next != from
    }
}

/// Apply `event` to `state`.
///
/// Pairs not in the table absorb the event: same state back, no actions.
/// A full cycle is Start -> Experiment -> Reset -> Start.
pub fn transition(state: ExperimentState, event: BoxEvent) -> Transition {
    use BoxEvent::*;
    use ExperimentState::*;

    match (state, event) {
        // Subject walked in: seal the entry, then begin the session.
        // EXIT is already closed from the previous cycle.
        (Start, PresenceDetected) => Transition {
            next: Experiment,
            actions: smallvec![Action::CloseDoor(Door::Front), Action::StartTraining],
        },
        // Session concluded: let the subject out the back.
        (Experiment, TrainingCompleted) => Transition {
            next: Reset,
            actions: smallvec![Action::OpenDoor(Door::Exit)],
        },
        // Subject left: restore the box for the next run.
        (Reset, PresenceExited) => Transition {
            next: Start,
            actions: smallvec![Action::CloseDoor(Door::Exit), Action::OpenDoor(Door::Front)],
        },
        (same, _) => Transition { next: same, actions: smallvec![] },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use BoxEvent::*;
    use ExperimentState::*;

    const ALL_STATES: [ExperimentState; 3] = [Start, Experiment, Reset];
    const ALL_EVENTS: [BoxEvent; 3] = [PresenceDetected, PresenceExited, TrainingCompleted];

    fn is_table_row(state: ExperimentState, event: BoxEvent) -> bool {
        matches!(
            (state, event),
            (Start, PresenceDetected) | (Experiment, TrainingCompleted) | (Reset, PresenceExited)
        )
    }

    #[test]
    fn test_presence_in_start_closes_front_and_starts_training() {
        let t = transition(Start, PresenceDetected);
        assert_eq!(t.next, Experiment);
        assert_eq!(t.actions.as_slice(), &[Action::CloseDoor(Door::Front), Action::StartTraining]);
        assert!(t.advanced(Start));
    }

    #[test]
    fn test_completion_in_experiment_opens_exit_only() {
        let t = transition(Experiment, TrainingCompleted);
        assert_eq!(t.next, Reset);
        assert_eq!(t.actions.as_slice(), &[Action::OpenDoor(Door::Exit)]);
    }

    #[test]
    fn test_exit_in_reset_restores_doors() {
        let t = transition(Reset, PresenceExited);
        assert_eq!(t.next, Start);
        assert_eq!(t.actions.as_slice(), &[Action::CloseDoor(Door::Exit), Action::OpenDoor(Door::Front)]);
    }

    #[test]
    fn test_all_other_pairs_absorb() {
        for state in ALL_STATES {
            for event in ALL_EVENTS {
                if is_table_row(state, event) {
                    continue;
                }
                let t = transition(state, event);
                assert_eq!(t.next, state, "{state}/{event} must not move");
                assert!(t.actions.is_empty(), "{state}/{event} must have no actions");
                assert!(!t.advanced(state));
            }
        }
    }

    #[test]
    fn test_full_cycle_returns_to_start() {
        let mut state = Start;
        let mut actions = Vec::new();
        for event in [PresenceDetected, TrainingCompleted, PresenceExited] {
            let t = transition(state, event);
            actions.extend(t.actions);
            state = t.next;
        }
        assert_eq!(state, Start);
        assert_eq!(
            actions,
            vec![
                Action::CloseDoor(Door::Front),
                Action::StartTraining,
                Action::OpenDoor(Door::Exit),
                Action::CloseDoor(Door::Exit),
                Action::OpenDoor(Door::Front),
            ]
        );
    }

    #[test]
    fn test_stale_completion_after_reset_is_ignored() {
        // A second completion signal arriving after the cycle moved on
        // must not re-open the exit.
        let t = transition(Reset, TrainingCompleted);
        assert_eq!(t.next, Reset);
        assert!(t.actions.is_empty());
        let t = transition(Start, TrainingCompleted);
        assert_eq!(t.next, Start);
        assert!(t.actions.is_empty());
    }
}
