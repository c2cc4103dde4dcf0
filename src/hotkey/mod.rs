//! Hotkey module for global keyboard event listening
//!
//! Uses the `rdev` hook to watch a single physical key (right control by
//! default) and forwards its presses to the trigger loop.

mod keys;
mod listener;

pub use keys::{PressEvent, WatchedKey};
pub use listener::{HotkeyError, HotkeyListener};
