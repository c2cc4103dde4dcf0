//! Watched key definitions and press filtering
//!
//! Maps configurable key names onto `rdev` keys and filters the raw hook
//! stream down to fresh presses of the watched key.

use std::fmt;
use std::str::FromStr;
use std::time::Instant;

use rdev::{EventType, Key};

use crate::config::ConfigError;

/// Names accepted for each supported key; the first one is canonical
const KEY_NAMES: &[(&[&str], Key)] = &[
    (&["ctrl_r", "right_ctrl", "rctrl", "control_r", "right_control"], Key::ControlRight),
    (&["ctrl_l", "left_ctrl", "lctrl", "control_l", "left_control"], Key::ControlLeft),
    (&["shift_r", "right_shift", "rshift"], Key::ShiftRight),
    (&["shift_l", "left_shift", "lshift"], Key::ShiftLeft),
    (&["alt_r", "altgr", "right_alt", "ralt"], Key::AltGr),
    (&["alt_l", "alt", "left_alt", "lalt"], Key::Alt),
    (&["super_r", "meta_r", "right_super", "cmd_r"], Key::MetaRight),
    (&["super_l", "meta_l", "left_super", "cmd_l"], Key::MetaLeft),
    (&["caps_lock", "capslock"], Key::CapsLock),
    (&["scroll_lock", "scrolllock"], Key::ScrollLock),
    (&["pause", "break"], Key::Pause),
    (&["insert", "ins"], Key::Insert),
    (&["f1"], Key::F1),
    (&["f2"], Key::F2),
    (&["f3"], Key::F3),
    (&["f4"], Key::F4),
    (&["f5"], Key::F5),
    (&["f6"], Key::F6),
    (&["f7"], Key::F7),
    (&["f8"], Key::F8),
    (&["f9"], Key::F9),
    (&["f10"], Key::F10),
    (&["f11"], Key::F11),
    (&["f12"], Key::F12),
];

/// The physical key whose presses drive the toggle
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WatchedKey(Key);

impl WatchedKey {
    /// The underlying hook key
    #[cfg(test)]
    pub fn key(&self) -> Key {
        self.0
    }

    /// Whether a raw hook key is this key
    pub fn matches(&self, key: Key) -> bool {
        self.0 == key
    }
}

impl Default for WatchedKey {
    fn default() -> Self {
        Self(Key::ControlRight)
    }
}

impl fmt::Display for WatchedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = KEY_NAMES
            .iter()
            .find(|(_, key)| *key == self.0)
            .and_then(|(names, _)| names.first());
        match name {
            Some(name) => write!(f, "{}", name),
            None => write!(f, "{:?}", self.0),
        }
    }
}

impl FromStr for WatchedKey {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace([' ', '-'], "_");
        KEY_NAMES
            .iter()
            .find(|(names, _)| names.contains(&normalized.as_str()))
            .map(|(_, key)| Self(*key))
            .ok_or_else(|| ConfigError::UnknownKey(s.to_string()))
    }
}

/// A press of the watched key, stamped on arrival
#[derive(Debug, Clone, Copy)]
pub struct PressEvent {
    /// Key that was pressed
    pub key: WatchedKey,
    /// Monotonic arrival time
    pub at: Instant,
}

/// Reduces the raw hook stream to fresh presses of the watched key
///
/// Auto-repeat delivers further press events while the key is held; only the
/// first press after a release gets through.
#[derive(Debug)]
pub struct PressFilter {
    key: WatchedKey,
    held: bool,
}

impl PressFilter {
    /// Create a filter for `key`
    pub fn new(key: WatchedKey) -> Self {
        Self { key, held: false }
    }

    /// Feed one raw event; returns true for a fresh press of the watched key
    pub fn accept(&mut self, event_type: &EventType) -> bool {
        match event_type {
            EventType::KeyPress(key) if self.key.matches(*key) => {
                !std::mem::replace(&mut self.held, true)
            }
            EventType::KeyRelease(key) if self.key.matches(*key) => {
                self.held = false;
                false
            }
            _ => false,
        }
    }
}
