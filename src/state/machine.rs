//! Core toggle state machine
//!
//! Turns timestamped presses of the watched key into start/stop decisions.
//! The machine performs no I/O; the trigger loop acts on its decisions.

use std::fmt;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::hotkey::PressEvent;

use super::policy::{PressWindows, TriggerPolicy};

/// Whether a recording session is in progress
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordingState {
    /// No session, waiting for a trigger
    #[default]
    Idle,
    /// The external command was started and not yet stopped
    Recording,
}

impl fmt::Display for RecordingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordingState::Idle => write!(f, "Idle"),
            RecordingState::Recording => write!(f, "Recording"),
        }
    }
}

/// Outcome of feeding one trigger into the machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    /// Bounce, isolated press while idle, or otherwise not actionable
    Ignore,
    /// Start a recording session
    Start,
    /// Stop the running session and transcribe
    Stop,
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Decision::Ignore => write!(f, "ignore"),
            Decision::Start => write!(f, "start"),
            Decision::Stop => write!(f, "stop"),
        }
    }
}

impl Decision {
    /// Whether this decision requires invoking the external command
    #[cfg(test)]
    pub fn is_actionable(self) -> bool {
        !matches!(self, Decision::Ignore)
    }
}

/// Receives presses of the watched key from an event source
pub trait KeyEventHandler {
    /// Handle one press and report what should happen
    fn on_key_event(&mut self, event: &PressEvent) -> Decision;
}

/// Recording toggle driven by presses of a single key
#[derive(Debug)]
pub struct ToggleStateMachine {
    policy: TriggerPolicy,
    windows: PressWindows,
    state: RecordingState,
    /// Most recently accepted press of the watched key
    last_press: Option<Instant>,
    /// When the current session started
    recording_since: Option<Instant>,
}

impl ToggleStateMachine {
    /// Create a machine in the Idle state
    pub fn new(policy: TriggerPolicy, windows: PressWindows) -> Self {
        Self {
            policy,
            windows,
            state: RecordingState::Idle,
            last_press: None,
            recording_since: None,
        }
    }

    /// Current recording state
    pub fn state(&self) -> RecordingState {
        self.state
    }

    /// Policy selected at startup
    pub fn policy(&self) -> TriggerPolicy {
        self.policy
    }

    /// Timestamp of the last accepted press, if any
    #[cfg(test)]
    pub fn last_press(&self) -> Option<Instant> {
        self.last_press
    }

    /// Start of the running session, if recording
    pub fn recording_since(&self) -> Option<Instant> {
        self.recording_since
    }

    /// Decide what a press of the watched key at `at` means
    pub fn handle_press(&mut self, at: Instant) -> Decision {
        let since_last = self.since_last_press(at);

        match self.policy {
            TriggerPolicy::DoubleClickStart => self.double_click_start(at, since_last),
            TriggerPolicy::SinglePressToggle => self.single_press_toggle(at, since_last),
        }
    }

    /// Flip the state unconditionally, for triggers that are not key presses
    ///
    /// Press history is left alone so a button click never makes the next
    /// key press look like a bounce or half of a double-click.
    pub fn toggle(&mut self, at: Instant) -> Decision {
        self.flip(at)
    }

    fn double_click_start(&mut self, at: Instant, since_last: Option<Duration>) -> Decision {
        self.record_press(at);

        match self.state {
            RecordingState::Recording => self.flip(at),
            RecordingState::Idle => {
                if since_last.is_some_and(|gap| gap < self.windows.double_click) {
                    self.flip(at)
                } else {
                    Decision::Ignore
                }
            }
        }
    }

    fn single_press_toggle(&mut self, at: Instant, since_last: Option<Duration>) -> Decision {
        // Bounces leave the history untouched
        if since_last.is_some_and(|gap| gap < self.windows.debounce) {
            return Decision::Ignore;
        }

        self.record_press(at);
        self.flip(at)
    }

    /// Gap since the last accepted press; `None` before the first one
    fn since_last_press(&self, at: Instant) -> Option<Duration> {
        self.last_press.map(|last| at.saturating_duration_since(last))
    }

    fn record_press(&mut self, at: Instant) {
        self.last_press = Some(match self.last_press {
            Some(last) if last > at => last,
            _ => at,
        });
    }

    fn flip(&mut self, at: Instant) -> Decision {
        match self.state {
            RecordingState::Idle => {
                self.state = RecordingState::Recording;
                self.recording_since = Some(at);
                Decision::Start
            }
            RecordingState::Recording => {
                self.state = RecordingState::Idle;
                self.recording_since = None;
                Decision::Stop
            }
        }
    }
}

impl KeyEventHandler for ToggleStateMachine {
    fn on_key_event(&mut self, event: &PressEvent) -> Decision {
        self.handle_press(event.at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hotkey::WatchedKey;

    fn machine(policy: TriggerPolicy) -> ToggleStateMachine {
        ToggleStateMachine::new(policy, PressWindows::default())
    }

    fn at(base: Instant, secs: f64) -> Instant {
        base + Duration::from_secs_f64(secs)
    }

    #[test]
    fn test_initial_state() {
        let sm = machine(TriggerPolicy::DoubleClickStart);
        assert_eq!(sm.state(), RecordingState::Idle);
        assert_eq!(sm.last_press(), None);
        assert_eq!(sm.recording_since(), None);
    }

    #[test]
    fn test_double_click_starts() {
        let base = Instant::now();
        let mut sm = machine(TriggerPolicy::DoubleClickStart);

        assert_eq!(sm.handle_press(at(base, 0.0)), Decision::Ignore);
        assert_eq!(sm.handle_press(at(base, 0.1)), Decision::Start);
        assert_eq!(sm.state(), RecordingState::Recording);
        assert_eq!(sm.recording_since(), Some(at(base, 0.1)));
    }

    #[test]
    fn test_double_click_isolated_presses_ignored() {
        let base = Instant::now();
        let mut sm = machine(TriggerPolicy::DoubleClickStart);

        for i in 0..5 {
            let decision = sm.handle_press(at(base, i as f64 * 1.0));
            assert_eq!(decision, Decision::Ignore);
            assert_eq!(sm.state(), RecordingState::Idle);
        }
        assert_eq!(sm.last_press(), Some(at(base, 4.0)));
    }

    #[test]
    fn test_double_click_gap_at_window_is_not_a_double_click() {
        let base = Instant::now();
        let mut sm = machine(TriggerPolicy::DoubleClickStart);

        sm.handle_press(base);
        assert_eq!(sm.handle_press(base + Duration::from_millis(400)), Decision::Ignore);
        assert_eq!(sm.state(), RecordingState::Idle);
    }

    #[test]
    fn test_double_click_any_press_stops() {
        let base = Instant::now();
        let mut sm = machine(TriggerPolicy::DoubleClickStart);

        sm.handle_press(at(base, 0.0));
        sm.handle_press(at(base, 0.1));
        assert_eq!(sm.state(), RecordingState::Recording);

        // Immediately after the start press, well inside the window
        assert_eq!(sm.handle_press(at(base, 0.15)), Decision::Stop);
        assert_eq!(sm.state(), RecordingState::Idle);

        sm.handle_press(at(base, 5.0));
        sm.handle_press(at(base, 5.2));
        // Long after the start press
        assert_eq!(sm.handle_press(at(base, 60.0)), Decision::Stop);
        assert_eq!(sm.state(), RecordingState::Idle);
    }

    #[test]
    fn test_double_click_stop_press_counts_toward_next_double_click() {
        let base = Instant::now();
        let mut sm = machine(TriggerPolicy::DoubleClickStart);

        sm.handle_press(at(base, 0.0));
        sm.handle_press(at(base, 0.1));
        assert_eq!(sm.handle_press(at(base, 10.0)), Decision::Stop);
        // The stop press updated the history, so a quick follow-up starts again
        assert_eq!(sm.handle_press(at(base, 10.2)), Decision::Start);
    }

    #[test]
    fn test_toggle_bounce_is_ignored() {
        let base = Instant::now();
        let mut sm = machine(TriggerPolicy::SinglePressToggle);

        assert_eq!(sm.handle_press(at(base, 0.0)), Decision::Start);
        assert_eq!(sm.handle_press(at(base, 0.05)), Decision::Ignore);
        assert_eq!(sm.state(), RecordingState::Recording);
        assert_eq!(sm.last_press(), Some(at(base, 0.0)));
    }

    #[test]
    fn test_toggle_bounce_does_not_extend_window() {
        let base = Instant::now();
        let mut sm = machine(TriggerPolicy::SinglePressToggle);

        sm.handle_press(at(base, 0.0));
        // Chain of repeats each under 200ms apart but measured from the first
        assert_eq!(sm.handle_press(at(base, 0.15)), Decision::Ignore);
        assert_eq!(sm.handle_press(at(base, 0.25)), Decision::Stop);
    }

    #[test]
    fn test_toggle_alternates() {
        let base = Instant::now();
        let mut sm = machine(TriggerPolicy::SinglePressToggle);

        let decisions: Vec<Decision> = (0..8)
            .map(|i| sm.handle_press(at(base, i as f64)))
            .collect();

        for (i, decision) in decisions.iter().enumerate() {
            let expected = if i % 2 == 0 { Decision::Start } else { Decision::Stop };
            assert_eq!(*decision, expected);
        }
        assert_eq!(sm.state(), RecordingState::Idle);
    }

    #[test]
    fn test_first_toggle_press_is_accepted() {
        let mut sm = machine(TriggerPolicy::SinglePressToggle);
        assert_eq!(sm.handle_press(Instant::now()), Decision::Start);
    }

    #[test]
    fn test_out_of_order_timestamp_keeps_history() {
        let base = Instant::now();
        let mut sm = machine(TriggerPolicy::DoubleClickStart);

        sm.handle_press(at(base, 5.0));
        // Older than the last press: treated as zero gap, history unchanged
        assert_eq!(sm.handle_press(at(base, 4.0)), Decision::Start);
        assert_eq!(sm.last_press(), Some(at(base, 5.0)));
    }

    #[test]
    fn test_out_of_order_timestamp_is_bounce_in_toggle_mode() {
        let base = Instant::now();
        let mut sm = machine(TriggerPolicy::SinglePressToggle);

        sm.handle_press(at(base, 5.0));
        assert_eq!(sm.handle_press(at(base, 4.0)), Decision::Ignore);
        assert_eq!(sm.last_press(), Some(at(base, 5.0)));
    }

    #[test]
    fn test_manual_toggle_leaves_press_history() {
        let base = Instant::now();
        let mut sm = machine(TriggerPolicy::SinglePressToggle);

        assert_eq!(sm.toggle(at(base, 0.0)), Decision::Start);
        assert_eq!(sm.last_press(), None);
        // A key press right after the button click is not a bounce
        assert_eq!(sm.handle_press(at(base, 0.05)), Decision::Stop);
        assert_eq!(sm.toggle(at(base, 0.06)), Decision::Start);
        assert_eq!(sm.toggle(at(base, 0.07)), Decision::Stop);
    }

    #[test]
    fn test_on_key_event_uses_press_time() {
        let base = Instant::now();
        let mut sm = machine(TriggerPolicy::DoubleClickStart);
        let key = WatchedKey::default();

        let first = PressEvent { key, at: base };
        let second = PressEvent {
            key,
            at: base + Duration::from_millis(250),
        };

        assert_eq!(sm.on_key_event(&first), Decision::Ignore);
        assert_eq!(sm.on_key_event(&second), Decision::Start);
    }

    #[test]
    fn test_custom_windows() {
        let base = Instant::now();
        let windows = PressWindows {
            double_click: Duration::from_millis(100),
            debounce: Duration::from_secs(1),
        };

        let mut double = ToggleStateMachine::new(TriggerPolicy::DoubleClickStart, windows);
        double.handle_press(base);
        assert_eq!(double.handle_press(at(base, 0.2)), Decision::Ignore);

        let mut toggle = ToggleStateMachine::new(TriggerPolicy::SinglePressToggle, windows);
        toggle.handle_press(base);
        assert_eq!(toggle.handle_press(at(base, 0.5)), Decision::Ignore);
        assert_eq!(toggle.handle_press(at(base, 1.0)), Decision::Stop);
    }

    #[test]
    fn test_decision_is_actionable() {
        assert!(!Decision::Ignore.is_actionable());
        assert!(Decision::Start.is_actionable());
        assert!(Decision::Stop.is_actionable());
    }
}
