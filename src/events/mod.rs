//! Events emitted by the trigger loop
//!
//! Broadcast to the IPC server, which pushes them to subscribed clients.

use serde::{Deserialize, Serialize};

/// Where a trigger came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerSource {
    /// Press of the watched key
    Hotkey,
    /// Toggle request over the control socket
    Ipc,
}

/// Events emitted when the trigger loop acts on a decision
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StateEvent {
    /// A recording session was started
    RecordingStarted { source: TriggerSource },

    /// The running session was stopped
    RecordingStopped {
        source: TriggerSource,
        /// How long the session ran, in milliseconds
        duration_ms: u64,
    },

    /// The external command could not be run; the state change still stands
    DispatchFailed { reason: String },

    /// The last recording was handed back to the external command
    RetryStarted,
}

impl std::fmt::Display for StateEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StateEvent::RecordingStarted { .. } => write!(f, "RECORDING_STARTED"),
            StateEvent::RecordingStopped { duration_ms, .. } => {
                write!(f, "RECORDING_STOPPED ({}ms)", duration_ms)
            }
            StateEvent::DispatchFailed { reason } => write!(f, "DISPATCH_FAILED: {}", reason),
            StateEvent::RetryStarted => write!(f, "RETRY_STARTED"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serialization() {
        let event = StateEvent::RecordingStopped {
            source: TriggerSource::Hotkey,
            duration_ms: 1500,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("recording_stopped"));
        assert!(json.contains("\"source\":\"hotkey\""));
        assert!(json.contains("1500"));
    }

    #[test]
    fn test_event_deserialization() {
        let json = r#"{"type":"recording_started","source":"ipc"}"#;
        let event: StateEvent = serde_json::from_str(json).unwrap();
        assert!(matches!(
            event,
            StateEvent::RecordingStarted {
                source: TriggerSource::Ipc
            }
        ));
    }

    #[test]
    fn test_display_and_unit_events() {
        let failed = StateEvent::DispatchFailed {
            reason: "not found".to_string(),
        };
        assert_eq!(failed.to_string(), "DISPATCH_FAILED: not found");
        assert_eq!(StateEvent::RetryStarted.to_string(), "RETRY_STARTED");
        assert_eq!(
            serde_json::to_string(&StateEvent::RetryStarted).unwrap(),
            r#"{"type":"retry_started"}"#
        );
    }
}
