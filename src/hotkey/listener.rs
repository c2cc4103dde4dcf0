//! Global hotkey listener using the `rdev` keyboard hook
//!
//! `rdev::listen` blocks its thread for the life of the process, so it runs
//! on a dedicated thread. Presses are forwarded with `try_send` so the OS
//! hook is never stalled by a slow consumer.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use rdev::Event;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use crate::state::Trigger;

use super::keys::{PressEvent, PressFilter, WatchedKey};

/// Global hotkey listener that forwards presses of one key
pub struct HotkeyListener {
    key: WatchedKey,
    trigger_tx: mpsc::Sender<Trigger>,
    running: Arc<AtomicBool>,
}

impl HotkeyListener {
    /// Create a new hotkey listener
    pub fn new(key: WatchedKey, trigger_tx: mpsc::Sender<Trigger>) -> Self {
        Self {
            key,
            trigger_tx,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Start the hotkey listener
    ///
    /// Spawns the hook thread. The returned receiver resolves if the hook
    /// cannot be installed or stops delivering events; either way the
    /// daemon has nothing left to do.
    pub fn start(&self) -> Result<oneshot::Receiver<HotkeyError>, HotkeyError> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(HotkeyError::AlreadyRunning);
        }

        let key = self.key;
        let trigger_tx = self.trigger_tx.clone();
        let running = Arc::clone(&self.running);
        let (failure_tx, failure_rx) = oneshot::channel();

        thread::Builder::new()
            .name("hotkey-listener".to_string())
            .spawn(move || {
                info!(%key, "hotkey listener thread started");

                let err = run_hook(key, trigger_tx, Arc::clone(&running));
                error!(error = %err, "hotkey listener error");
                let _ = failure_tx.send(err);

                running.store(false, Ordering::SeqCst);
                info!("hotkey listener thread stopped");
            })
            .map_err(|e| {
                self.running.store(false, Ordering::SeqCst);
                HotkeyError::ThreadSpawn(e.to_string())
            })?;

        Ok(failure_rx)
    }

    /// Stop forwarding presses
    ///
    /// The hook has no shutdown call; its thread stays parked in the OS
    /// until the process exits.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// Check if the listener is currently running
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

/// Errors that can occur in the hotkey listener
#[derive(Debug, thiserror::Error)]
pub enum HotkeyError {
    #[error("hotkey listener is already running")]
    AlreadyRunning,

    #[error("failed to install keyboard hook ({0}) - is an X11 session available and input access permitted?")]
    ListenerSetup(String),

    #[error("keyboard hook stopped delivering events")]
    ListenerStopped,

    #[error("failed to spawn listener thread: {0}")]
    ThreadSpawn(String),
}

/// Run the blocking hook; only returns when it fails or ends
fn run_hook(
    key: WatchedKey,
    trigger_tx: mpsc::Sender<Trigger>,
    running: Arc<AtomicBool>,
) -> HotkeyError {
    let mut filter = PressFilter::new(key);

    // Hook callback - must be fast and non-blocking
    let callback = move |event: Event| {
        if !filter.accept(&event.event_type) {
            return;
        }
        let at = Instant::now();

        if !running.load(Ordering::SeqCst) {
            return;
        }

        debug!(%key, "watched key pressed");
        forward(&trigger_tx, PressEvent { key, at });
    };

    match rdev::listen(callback) {
        Ok(()) => HotkeyError::ListenerStopped,
        Err(e) => HotkeyError::ListenerSetup(format!("{:?}", e)),
    }
}

fn forward(trigger_tx: &mpsc::Sender<Trigger>, event: PressEvent) {
    match trigger_tx.try_send(Trigger::Press(event)) {
        Ok(()) => {}
        Err(mpsc::error::TrySendError::Full(_)) => {
            warn!("trigger queue full, dropping key press");
        }
        Err(mpsc::error::TrySendError::Closed(_)) => {
            debug!("trigger queue closed, dropping key press");
        }
    }
}
