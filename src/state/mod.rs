//! Recording toggle state machine
//!
//! Two states, Idle and Recording, driven by presses of one key under one
//! of two policies:
//! - DoubleClickStart: double-click starts, any press while recording stops
//! - SinglePressToggle: every press toggles, bounces are dropped

mod machine;
mod policy;
mod runner;

pub use machine::{Decision, KeyEventHandler, RecordingState, ToggleStateMachine};
pub use policy::{PressWindows, TriggerPolicy};
pub use runner::{Trigger, TriggerLoop};
