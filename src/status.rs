//! Pipeline phase reported by the external command
//!
//! `xhisper` writes a single lowercase token to a well-known file and keeps
//! its last capture next to it. The daemon only ever reads them.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Where `xhisper` publishes its phase
pub const DEFAULT_STATUS_FILE: &str = "/tmp/xhisper_status";

/// Lifecycle stage of the transcription pipeline
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusPhase {
    #[default]
    Idle,
    Listening,
    Processing,
    /// The last recording contained no speech
    Empty,
}

impl StatusPhase {
    /// Interpret a status token; anything unrecognised reads as idle
    pub fn from_token(token: &str) -> Self {
        match token.trim().to_ascii_lowercase().as_str() {
            "listening" => StatusPhase::Listening,
            "processing" => StatusPhase::Processing,
            "empty" => StatusPhase::Empty,
            _ => StatusPhase::Idle,
        }
    }
}

impl fmt::Display for StatusPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatusPhase::Idle => write!(f, "idle"),
            StatusPhase::Listening => write!(f, "listening"),
            StatusPhase::Processing => write!(f, "processing"),
            StatusPhase::Empty => write!(f, "empty"),
        }
    }
}

/// Read the current phase; a missing or unreadable file reads as idle
pub async fn read_phase(path: &Path) -> StatusPhase {
    match tokio::fs::read_to_string(path).await {
        Ok(contents) => StatusPhase::from_token(&contents),
        Err(e) => {
            debug!(?path, error = %e, "status file unreadable, assuming idle");
            StatusPhase::Idle
        }
    }
}

/// Size of the last captured recording, if there is one
pub async fn last_audio_bytes(path: &Path) -> Option<u64> {
    match tokio::fs::metadata(path).await {
        Ok(meta) if meta.is_file() => Some(meta.len()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_token() {
        assert_eq!(StatusPhase::from_token("listening"), StatusPhase::Listening);
        assert_eq!(StatusPhase::from_token("  Processing\n"), StatusPhase::Processing);
        assert_eq!(StatusPhase::from_token("EMPTY"), StatusPhase::Empty);
        assert_eq!(StatusPhase::from_token("idle"), StatusPhase::Idle);
        assert_eq!(StatusPhase::from_token("recording"), StatusPhase::Idle);
        assert_eq!(StatusPhase::from_token(""), StatusPhase::Idle);
    }

    #[test]
    fn test_display_matches_token() {
        for phase in [
            StatusPhase::Idle,
            StatusPhase::Listening,
            StatusPhase::Processing,
            StatusPhase::Empty,
        ] {
            assert_eq!(StatusPhase::from_token(&phase.to_string()), phase);
        }
    }

    #[tokio::test]
    async fn test_read_phase_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("xhisper_status");

        std::fs::write(&path, "processing\n").unwrap();
        assert_eq!(read_phase(&path).await, StatusPhase::Processing);

        std::fs::write(&path, "garbage").unwrap();
        assert_eq!(read_phase(&path).await, StatusPhase::Idle);
    }

    #[tokio::test]
    async fn test_read_phase_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(
            read_phase(&dir.path().join("missing")).await,
            StatusPhase::Idle
        );
    }

    #[tokio::test]
    async fn test_last_audio_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("xhisper_last.wav");
        assert_eq!(last_audio_bytes(&path).await, None);

        std::fs::write(&path, vec![0u8; 3000]).unwrap();
        assert_eq!(last_audio_bytes(&path).await, Some(3000));

        // A directory is not a recording
        assert_eq!(last_audio_bytes(dir.path()).await, None);
    }
}
