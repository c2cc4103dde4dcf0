//! Command dispatcher
//!
//! Runs the external `xhisper` command once per start/stop decision. The
//! command itself tracks whether it is recording, so start and stop invoke
//! it identically. A retry re-runs it on the last recording.

mod resolve;

use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::Command;
use tracing::{debug, info};

use crate::state::Decision;

pub use resolve::{adjacent_script, CommandResolver, DEFAULT_COMMAND};

/// Where `xhisper` keeps its last capture
pub const DEFAULT_LAST_AUDIO: &str = "/tmp/xhisper_last.wav";

/// Environment telling `xhisper` to transcribe the last capture again without pasting
const RETRY_ENV: [(&str, &str); 2] = [("XHISPER_RETRY", "1"), ("XHISPER_RETRY_PASTE", "0")];

/// Errors raised while invoking the external command
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("`{name}` not found next to the daemon or on PATH")]
    CommandNotFound { name: String },

    #[error("failed to spawn {path:?}: {source}")]
    SpawnFailure {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("no previous recording at {path:?}")]
    NoRecording { path: PathBuf },
}

/// Acts on start/stop decisions
pub trait Dispatcher {
    /// Invoke the external command for `decision`; never called for `Ignore`
    fn dispatch(&self, decision: Decision) -> Result<(), DispatchError>;

    /// Run the command again on the last recording
    fn retry(&self) -> Result<(), DispatchError>;
}

/// Spawns the resolved command detached, without waiting for it
#[derive(Debug, Clone)]
pub struct CommandDispatcher {
    resolver: CommandResolver,
    last_audio: PathBuf,
}

impl CommandDispatcher {
    /// Create a dispatcher using `resolver` to locate the command
    pub fn new(resolver: CommandResolver, last_audio: impl Into<PathBuf>) -> Self {
        Self {
            resolver,
            last_audio: last_audio.into(),
        }
    }

    fn spawn(&self, env: &[(&str, &str)]) -> Result<(PathBuf, Option<u32>), DispatchError> {
        let path = self.resolver.resolve()?;

        // Dropping the handle leaves the child running; the runtime reaps it
        let child = Command::new(&path)
            .envs(env.iter().copied())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|source| DispatchError::SpawnFailure {
                path: path.clone(),
                source,
            })?;

        Ok((path, child.id()))
    }
}

impl Dispatcher for CommandDispatcher {
    fn dispatch(&self, decision: Decision) -> Result<(), DispatchError> {
        let (path, pid) = self.spawn(&[])?;

        info!(?decision, ?path, ?pid, "xhisper spawned");
        debug!("not waiting for xhisper to exit");
        Ok(())
    }

    fn retry(&self) -> Result<(), DispatchError> {
        if !has_recording(&self.last_audio) {
            return Err(DispatchError::NoRecording {
                path: self.last_audio.clone(),
            });
        }

        let (path, pid) = self.spawn(&RETRY_ENV)?;

        info!(?path, ?pid, last_audio = ?self.last_audio, "xhisper retry spawned");

        Ok(())
    }
}

/// Whether a previous capture is available to retry
pub fn has_recording(path: &Path) -> bool {
    path.is_file()
}

#[cfg(all(test, unix))]
mod tests {
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    use std::time::Duration;

    use super::*;

    fn write_script(dir: &Path, name: &str, body: &str, mode: u32) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, body).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(mode)).unwrap();
        path
    }

    async fn wait_for(path: &Path) -> bool {
        for _ in 0..100 {
            if path.exists() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        false
    }

    #[tokio::test]
    async fn test_dispatch_runs_command() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("ran");
        let script = write_script(
            dir.path(),
            "xhisper.sh",
            &format!("#!/bin/sh\necho started\ntouch '{}'\n", marker.display()),
            0o755,
        );

        let dispatcher = CommandDispatcher::new(
            CommandResolver::new(Some(script), "xhisper").with_search_path(""),
            dir.path().join("last.wav"),
        );

        dispatcher.dispatch(Decision::Start).unwrap();
        assert!(wait_for(&marker).await);
    }

    #[tokio::test]
    async fn test_dispatch_does_not_wait() {
        let dir = tempfile::tempdir().unwrap();
        let script = write_script(dir.path(), "xhisper.sh", "#!/bin/sh\nsleep 5\n", 0o755);

        let dispatcher = CommandDispatcher::new(
            CommandResolver::new(Some(script), "xhisper").with_search_path(""),
            dir.path().join("last.wav"),
        );

        let started = std::time::Instant::now();
        dispatcher.dispatch(Decision::Stop).unwrap();
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_dispatch_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let dispatcher = CommandDispatcher::new(
            CommandResolver::new(Some(dir.path().join("xhisper.sh")), "xhisper")
                .with_search_path(dir.path().as_os_str()),
            dir.path().join("last.wav"),
        );

        assert!(matches!(
            dispatcher.dispatch(Decision::Start),
            Err(DispatchError::CommandNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_dispatch_spawn_failure() {
        let dir = tempfile::tempdir().unwrap();
        // Exists, so it is chosen, but cannot be executed
        let script = write_script(dir.path(), "xhisper.sh", "#!/bin/sh\n", 0o644);

        let dispatcher = CommandDispatcher::new(
            CommandResolver::new(Some(script), "xhisper").with_search_path(""),
            dir.path().join("last.wav"),
        );

        assert!(matches!(
            dispatcher.dispatch(Decision::Start),
            Err(DispatchError::SpawnFailure { .. })
        ));
    }

    #[tokio::test]
    async fn test_retry_without_recording() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("ran");
        let script = write_script(
            dir.path(),
            "xhisper.sh",
            &format!("#!/bin/sh\ntouch '{}'\n", marker.display()),
            0o755,
        );

        let dispatcher = CommandDispatcher::new(
            CommandResolver::new(Some(script), "xhisper").with_search_path(""),
            dir.path().join("last.wav"),
        );

        assert!(matches!(
            dispatcher.retry(),
            Err(DispatchError::NoRecording { .. })
        ));
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(!marker.exists());
    }

    #[tokio::test]
    async fn test_retry_passes_retry_environment() {
        let dir = tempfile::tempdir().unwrap();
        let last_audio = dir.path().join("last.wav");
        fs::write(&last_audio, b"RIFF").unwrap();

        let output = dir.path().join("env");
        let partial = dir.path().join("env.partial");
        let script = write_script(
            dir.path(),
            "xhisper.sh",
            &format!(
                "#!/bin/sh\necho \"$XHISPER_RETRY $XHISPER_RETRY_PASTE\" > '{}'\nmv '{}' '{}'\n",
                partial.display(),
                partial.display(),
                output.display()
            ),
            0o755,
        );

        let dispatcher = CommandDispatcher::new(
            CommandResolver::new(Some(script), "xhisper").with_search_path(""),
            &last_audio,
        );

        dispatcher.retry().unwrap();
        assert!(wait_for(&output).await);
        assert_eq!(fs::read_to_string(&output).unwrap().trim(), "1 0");
    }

    #[tokio::test]
    async fn test_plain_dispatch_has_no_retry_environment() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("env");
        let partial = dir.path().join("env.partial");
        let script = write_script(
            dir.path(),
            "xhisper.sh",
            &format!(
                "#!/bin/sh\necho \"retry=${{XHISPER_RETRY:-unset}}\" > '{}'\nmv '{}' '{}'\n",
                partial.display(),
                partial.display(),
                output.display()
            ),
            0o755,
        );

        let dispatcher = CommandDispatcher::new(
            CommandResolver::new(Some(script), "xhisper").with_search_path(""),
            dir.path().join("last.wav"),
        );

        dispatcher.dispatch(Decision::Start).unwrap();
        assert!(wait_for(&output).await);
        assert_eq!(fs::read_to_string(&output).unwrap().trim(), "retry=unset");
    }
}
