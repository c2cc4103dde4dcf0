//! Configuration loading and management

use std::path::PathBuf;
use std::time::Duration;

use crate::dispatch::{adjacent_script, DEFAULT_COMMAND, DEFAULT_LAST_AUDIO};
use crate::hotkey::WatchedKey;
use crate::state::{PressWindows, TriggerPolicy};
use crate::status::DEFAULT_STATUS_FILE;

/// Errors in configuration values
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("unknown trigger policy `{0}` (expected `double-click` or `toggle`)")]
    UnknownPolicy(String),

    #[error("unknown hotkey `{0}`")]
    UnknownKey(String),

    #[error("{var}: `{value}` is not a number of milliseconds")]
    InvalidMillis { var: &'static str, value: String },

    #[error("neither XDG_RUNTIME_DIR nor HOME is set, cannot place the control socket")]
    NoSocketDir,
}

/// Daemon configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to the Unix domain socket for IPC
    pub socket_path: PathBuf,

    /// How presses become start/stop decisions
    pub policy: TriggerPolicy,

    /// Double-click and debounce windows
    pub windows: PressWindows,

    /// Key to watch
    pub hotkey: WatchedKey,

    /// Command name (or path) looked up on PATH
    pub command: String,

    /// Script tried before the PATH lookup
    pub script: Option<PathBuf>,

    /// File the external pipeline writes its phase to
    pub status_file: PathBuf,

    /// Last capture, re-transcribed on retry
    pub last_audio: PathBuf,
}

impl Config {
    /// Load configuration from environment and defaults
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Build configuration from an arbitrary variable source
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let socket_path = match lookup("XHISPER_TRIGGER_SOCKET") {
            Some(path) => PathBuf::from(path),
            None => default_socket_path(&lookup)?,
        };

        let policy = lookup("XHISPER_TRIGGER_POLICY")
            .map(|value| value.parse::<TriggerPolicy>())
            .transpose()?
            .unwrap_or_default();

        let defaults = PressWindows::default();
        let windows = PressWindows {
            double_click: millis(&lookup, "XHISPER_DOUBLE_CLICK_MS")?
                .unwrap_or(defaults.double_click),
            debounce: millis(&lookup, "XHISPER_DEBOUNCE_MS")?.unwrap_or(defaults.debounce),
        };

        let hotkey = lookup("XHISPER_HOTKEY")
            .map(|value| value.parse::<WatchedKey>())
            .transpose()?
            .unwrap_or_default();

        let command = lookup("XHISPER_COMMAND").unwrap_or_else(|| DEFAULT_COMMAND.to_string());

        let script = lookup("XHISPER_SCRIPT")
            .map(PathBuf::from)
            .or_else(adjacent_script);

        let status_file = lookup("XHISPER_STATUS_FILE")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_STATUS_FILE));

        let last_audio = lookup("XHISPER_LAST_AUDIO")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_LAST_AUDIO));

        Ok(Self {
            socket_path,
            policy,
            windows,
            hotkey,
            command,
            script,
            status_file,
            last_audio,
        })
    }
}

fn default_socket_path(lookup: &impl Fn(&str) -> Option<String>) -> Result<PathBuf, ConfigError> {
    if let Some(runtime) = lookup("XDG_RUNTIME_DIR").filter(|dir| !dir.is_empty()) {
        return Ok(PathBuf::from(runtime).join("xhisper-trigger.sock"));
    }

    let home = lookup("HOME").ok_or(ConfigError::NoSocketDir)?;
    Ok(PathBuf::from(home)
        .join(".local")
        .join("share")
        .join("xhisper-trigger")
        .join("daemon.sock"))
}

fn millis(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
) -> Result<Option<Duration>, ConfigError> {
    lookup(var)
        .map(|value| {
            value
                .trim()
                .parse::<u64>()
                .map(Duration::from_millis)
                .map_err(|_| ConfigError::InvalidMillis { var, value })
        })
        .transpose()
}
