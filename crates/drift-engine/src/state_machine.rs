//! Drift State Machine
//!
//! Turns per-window signals into drift episodes with hysteresis. The
//! transition function is pure; `DriftStateMachine` only owns the current
//! state between windows.

use serde::{Deserialize, Serialize};
use tracing::info;

use drift_core::DriftState;

/// What a single window contributes to the state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowSignal {
    /// Not enough data to score; the state is carried forward untouched
    Insufficient,
    /// Scored window, `drift` if the statistic crossed its threshold
    Scored { drift: bool },
}

/// Everything carried from one window to the next
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineState {
    pub state: DriftState,
    /// Last assigned episode id, 0 before the first episode
    pub episode_id: u32,
    /// Consecutive non-drift windows seen while in `Drift`
    pub normal_streak: usize,
}

impl Default for MachineState {
    fn default() -> Self {
        Self {
            state: DriftState::Normal,
            episode_id: 0,
            normal_streak: 0,
        }
    }
}

impl MachineState {
    pub fn is_drift(&self) -> bool {
        self.state == DriftState::Drift
    }

    /// Episode id as reported on a verdict: only while drifting.
    pub fn active_episode(&self) -> Option<u32> {
        self.is_drift().then_some(self.episode_id)
    }
}

/// Pure transition. `hysteresis_windows` below 1 behaves as 1.
pub fn transition(current: MachineState, signal: WindowSignal, hysteresis_windows: usize) -> MachineState {
    let drift = match signal {
        WindowSignal::Insufficient => return current,
        WindowSignal::Scored { drift } => drift,
    };

    let mut next = current;
    if drift {
        next.normal_streak = 0;
        if current.state == DriftState::Normal {
            next.state = DriftState::Drift;
            next.episode_id = current.episode_id + 1;
        }
    } else if current.state == DriftState::Drift {
        next.normal_streak = current.normal_streak + 1;
        if next.normal_streak >= hysteresis_windows.max(1) {
            next.state = DriftState::Normal;
            next.normal_streak = 0;
        }
    }
    next
}

/// Owned state machine for one variable
#[derive(Debug, Clone)]
pub struct DriftStateMachine {
    state: MachineState,
    hysteresis_windows: usize,
}

impl DriftStateMachine {
    pub fn new(hysteresis_windows: usize) -> Self {
        Self {
            state: MachineState::default(),
            hysteresis_windows: hysteresis_windows.max(1),
        }
    }

    pub fn state(&self) -> MachineState {
        self.state
    }

    pub fn hysteresis_windows(&self) -> usize {
        self.hysteresis_windows
    }

    /// Apply one window and return the resulting state.
    pub fn step(&mut self, signal: WindowSignal) -> MachineState {
        let previous = self.state;
        self.state = transition(previous, signal, self.hysteresis_windows);

        match (previous.state, self.state.state) {
            (DriftState::Normal, DriftState::Drift) => {
                info!(episode_id = self.state.episode_id, "drift episode started");
            }
            (DriftState::Drift, DriftState::Normal) => {
                info!(episode_id = previous.episode_id, "drift episode ended");
            }
            _ => {}
        }

        self.state
    }

    pub fn reset(&mut self) {
        self.state = MachineState::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DRIFT: WindowSignal = WindowSignal::Scored { drift: true };
    const CALM: WindowSignal = WindowSignal::Scored { drift: false };
    const GAP: WindowSignal = WindowSignal::Insufficient;

    fn run(signals: &[WindowSignal], hysteresis: usize) -> Vec<MachineState> {
        let mut machine = DriftStateMachine::new(hysteresis);
        signals.iter().map(|s| machine.step(*s)).collect()
    }

    #[test]
    fn test_initial_state() {
        let machine = DriftStateMachine::new(2);
        assert_eq!(machine.state(), MachineState::default());
        assert_eq!(machine.state().active_episode(), None);
    }

    #[test]
    fn test_insufficient_window_changes_nothing() {
        let drifting = MachineState {
            state: DriftState::Drift,
            episode_id: 4,
            normal_streak: 1,
        };
        assert_eq!(transition(drifting, GAP, 3), drifting);
        assert_eq!(transition(MachineState::default(), GAP, 3), MachineState::default());
    }

    #[test]
    fn test_hysteresis_requires_exact_streak() {
        let states = run(&[DRIFT, CALM, CALM, CALM, CALM], 3);
        assert!(states[0].is_drift());
        assert!(states[1].is_drift());
        assert!(states[2].is_drift());
        assert!(!states[3].is_drift());
        assert!(!states[4].is_drift());
    }

    #[test]
    fn test_drift_window_resets_streak() {
        let states = run(&[DRIFT, CALM, CALM, DRIFT, CALM, CALM, CALM], 3);
        assert!(states[..6].iter().all(|s| s.is_drift()));
        assert!(!states[6].is_drift());
        // Still the same episode throughout
        assert!(states[..6].iter().all(|s| s.episode_id == 1));
    }

    #[test]
    fn test_gaps_do_not_count_toward_exit() {
        let states = run(&[DRIFT, CALM, GAP, GAP, CALM], 2);
        assert!(states[3].is_drift());
        assert_eq!(states[3].normal_streak, 1);
        assert!(!states[4].is_drift());
    }

    #[test]
    fn test_episode_id_increments_once_per_entry() {
        let states = run(&[DRIFT, DRIFT, CALM, DRIFT, CALM, CALM, DRIFT], 1);
        let ids: Vec<Option<u32>> = states.iter().map(|s| s.active_episode()).collect();
        assert_eq!(
            ids,
            vec![Some(1), Some(1), None, Some(2), None, None, Some(3)]
        );
    }

    #[test]
    fn test_zero_hysteresis_behaves_as_one() {
        let states = run(&[DRIFT, CALM], 0);
        assert!(!states[1].is_drift());
    }

    #[test]
    fn test_reset() {
        let mut machine = DriftStateMachine::new(2);
        machine.step(DRIFT);
        machine.reset();
        assert_eq!(machine.state(), MachineState::default());
    }
}
