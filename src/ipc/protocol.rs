//! IPC message protocol definitions
//!
//! All messages are JSON-encoded, prefixed with a 4-byte little-endian length.

use anyhow::{bail, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::events::StateEvent;
use crate::state::{Decision, RecordingState, TriggerPolicy};
use crate::status::StatusPhase;

/// Largest accepted message body
pub const MAX_MESSAGE_LEN: usize = 1024 * 1024;

/// Requests from clients to the daemon
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    /// Request current daemon status
    GetStatus,

    /// Toggle recording, as a button would
    Toggle,

    /// Transcribe the last recording again
    Retry,

    /// Ping to check connectivity
    Ping,

    /// Subscribe to state change notifications
    Subscribe,
}

/// Responses from daemon to clients
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    /// Current daemon status
    Status(DaemonStatus),

    /// Outcome of a toggle request
    Toggled { decision: Decision },

    /// The retry was handed to the external command
    RetryStarted,

    /// Pong response to ping
    Pong,

    /// Subscription confirmed; notifications follow
    Subscribed,

    /// Error response
    Error { code: String, message: String },
}

/// Push notification from daemon to subscribed clients
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notification {
    /// State event occurred
    StateEvent { event: StateEvent },

    /// Notifications were dropped because the client fell behind
    Lagged { skipped: u64 },
}

/// Full daemon status snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonStatus {
    /// Daemon version
    pub version: String,

    /// Recording state as last decided by the daemon
    pub recording: RecordingState,

    /// Active trigger policy
    pub policy: TriggerPolicy,

    /// Phase reported by the external pipeline
    pub phase: StatusPhase,

    /// Watched key
    pub hotkey: String,

    /// Uptime in seconds
    pub uptime_secs: u64,

    /// Size of the last recording, absent when there is none
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_audio_bytes: Option<u64>,
}

impl DaemonStatus {
    /// Fresh status for a daemon that just started
    pub fn new(policy: TriggerPolicy, hotkey: String) -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            recording: RecordingState::Idle,
            policy,
            phase: StatusPhase::Idle,
            hotkey,
            uptime_secs: 0,
            last_audio_bytes: None,
        }
    }
}

/// Send a length-prefixed JSON message
pub async fn write_message<W, T>(stream: &mut W, msg: &T) -> Result<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let msg_bytes = serde_json::to_vec(msg)?;
    let msg_len = (msg_bytes.len() as u32).to_le_bytes();

    stream.write_all(&msg_len).await?;
    stream.write_all(&msg_bytes).await?;
    stream.flush().await?;

    Ok(())
}

/// Read a length-prefixed JSON message; `None` on a clean disconnect
pub async fn read_message<R, T>(stream: &mut R) -> Result<Option<T>>
where
    R: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    let mut len_buf = [0u8; 4];
    match stream.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }

    let len = u32::from_le_bytes(len_buf) as usize;
    if len > MAX_MESSAGE_LEN {
        bail!("message too large ({} bytes)", len);
    }

    let mut msg_buf = vec![0u8; len];
    stream.read_exact(&mut msg_buf).await?;

    Ok(Some(serde_json::from_slice(&msg_buf)?))
}
