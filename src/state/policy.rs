//! Trigger policies and their timing windows

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::ConfigError;

/// Default maximum gap between the two presses of a double-click
pub const DEFAULT_DOUBLE_CLICK_WINDOW: Duration = Duration::from_millis(400);

/// Default minimum gap between two accepted presses in toggle mode
pub const DEFAULT_DEBOUNCE_WINDOW: Duration = Duration::from_millis(200);

/// How presses of the watched key are turned into start/stop decisions
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerPolicy {
    /// Double-click starts recording, any single press while recording stops it
    DoubleClickStart,
    /// Every accepted press toggles recording, bounces are dropped
    #[default]
    SinglePressToggle,
}

impl fmt::Display for TriggerPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TriggerPolicy::DoubleClickStart => write!(f, "double-click"),
            TriggerPolicy::SinglePressToggle => write!(f, "toggle"),
        }
    }
}

impl FromStr for TriggerPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace(['_', ' '], "-");
        match normalized.as_str() {
            "double-click" | "doubleclick" | "double-click-start" | "double" => {
                Ok(TriggerPolicy::DoubleClickStart)
            }
            "toggle" | "single" | "single-press" | "single-press-toggle" => {
                Ok(TriggerPolicy::SinglePressToggle)
            }
            _ => Err(ConfigError::UnknownPolicy(s.to_string())),
        }
    }
}

/// Timing windows used by the policies
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PressWindows {
    /// Two presses closer than this form a double-click
    pub double_click: Duration,
    /// A press closer than this to the last accepted one is a bounce
    pub debounce: Duration,
}

impl Default for PressWindows {
    fn default() -> Self {
        Self {
            double_click: DEFAULT_DOUBLE_CLICK_WINDOW,
            debounce: DEFAULT_DEBOUNCE_WINDOW,
        }
    }
}
