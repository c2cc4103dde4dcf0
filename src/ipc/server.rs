//! Unix domain socket server for IPC
//!
//! Provides request-response communication and push notifications for
//! state change events to subscribed clients.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{broadcast, mpsc, oneshot, watch, RwLock};
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::dispatch::DispatchError;
use crate::events::StateEvent;
use crate::state::{RecordingState, Trigger};
use crate::status;

use super::protocol::{read_message, write_message, DaemonStatus, Notification, Request, Response};

/// IPC Server handling client connections
pub struct Server {
    socket_path: PathBuf,
    listener: Option<UnixListener>,
    shared: Arc<Shared>,
    shutdown_tx: broadcast::Sender<()>,
}

/// Everything a client handler needs
struct Shared {
    state: RwLock<ServerState>,
    status_file: PathBuf,
    last_audio: PathBuf,
    trigger_tx: mpsc::Sender<Trigger>,
    event_tx: broadcast::Sender<StateEvent>,
    recording: watch::Receiver<RecordingState>,
}

/// Mutable server state
struct ServerState {
    status: DaemonStatus,
    start_time: std::time::Instant,
}

impl Server {
    /// Create a new IPC server bound to the configured socket
    ///
    /// Fails if another daemon is already serving on that socket.
    pub fn new(
        config: &Config,
        trigger_tx: mpsc::Sender<Trigger>,
        event_tx: broadcast::Sender<StateEvent>,
        recording: watch::Receiver<RecordingState>,
    ) -> Result<Self> {
        let socket_path = config.socket_path.as_path();
        let listener = bind(socket_path)?;

        let (shutdown_tx, _) = broadcast::channel(1);

        let shared = Arc::new(Shared {
            state: RwLock::new(ServerState {
                status: DaemonStatus::new(config.policy, config.hotkey.to_string()),
                start_time: std::time::Instant::now(),
            }),
            status_file: config.status_file.clone(),
            last_audio: config.last_audio.clone(),
            trigger_tx,
            event_tx,
            recording,
        });

        info!(?socket_path, "IPC server listening");

        Ok(Self {
            socket_path: socket_path.to_owned(),
            listener: Some(listener),
            shared,
            shutdown_tx,
        })
    }

    /// Run the server, accepting connections
    pub async fn run(&self) -> Result<()> {
        let listener = self.listener.as_ref().context("server not initialized")?;

        loop {
            match listener.accept().await {
                Ok((stream, _addr)) => {
                    debug!("client connected");
                    let shared = Arc::clone(&self.shared);
                    let mut shutdown_rx = self.shutdown_tx.subscribe();

                    tokio::spawn(async move {
                        tokio::select! {
                            result = Self::handle_client(stream, shared) => {
                                if let Err(e) = result {
                                    warn!(?e, "client handler error");
                                }
                            }
                            _ = shutdown_rx.recv() => {
                                debug!("client handler shutting down");
                            }
                        }
                    });
                }
                Err(e) => {
                    error!(?e, "accept error");
                }
            }
        }
    }

    /// Handle a single client connection
    async fn handle_client(mut stream: UnixStream, shared: Arc<Shared>) -> Result<()> {
        loop {
            let request: Request = match read_message(&mut stream).await {
                Ok(Some(request)) => request,
                Ok(None) => {
                    debug!("client disconnected");
                    return Ok(());
                }
                Err(e) => {
                    let response = Response::Error {
                        code: "bad_request".to_string(),
                        message: e.to_string(),
                    };
                    // The stream may be out of sync after a bad frame
                    let _ = write_message(&mut stream, &response).await;
                    return Err(e.context("failed to read request"));
                }
            };

            debug!(?request, "received request");

            if matches!(request, Request::Subscribe) {
                // Subscribe before confirming so no event slips through
                let event_rx = shared.event_tx.subscribe();
                write_message(&mut stream, &Response::Subscribed).await?;
                debug!("client subscribed to notifications");
                return Self::push_notifications(stream, event_rx).await;
            }

            let response = Self::process_request(request, &shared).await;
            write_message(&mut stream, &response).await?;
        }
    }

    /// Forward state events to a subscribed client until it goes away
    async fn push_notifications(
        mut stream: UnixStream,
        mut event_rx: broadcast::Receiver<StateEvent>,
    ) -> Result<()> {
        loop {
            let notification = match event_rx.recv().await {
                Ok(event) => Notification::StateEvent { event },
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "subscriber lagged");
                    Notification::Lagged { skipped }
                }
                Err(broadcast::error::RecvError::Closed) => return Ok(()),
            };

            if let Err(e) = write_message(&mut stream, &notification).await {
                debug!(?e, "subscriber went away");
                return Ok(());
            }
        }
    }

    /// Process a request and return a response
    async fn process_request(request: Request, shared: &Shared) -> Response {
        match request {
            Request::Ping => Response::Pong,

            Request::GetStatus => {
                let phase = status::read_phase(&shared.status_file).await;
                let last_audio_bytes = status::last_audio_bytes(&shared.last_audio).await;
                let mut state = shared.state.write().await;
                state.status.uptime_secs = state.start_time.elapsed().as_secs();
                state.status.recording = *shared.recording.borrow();
                state.status.phase = phase;
                state.status.last_audio_bytes = last_audio_bytes;
                Response::Status(state.status.clone())
            }

            Request::Toggle => {
                let (reply, reply_rx) = oneshot::channel();
                if shared.trigger_tx.send(Trigger::Toggle { reply }).await.is_err() {
                    return unavailable();
                }
                match reply_rx.await {
                    Ok(decision) => {
                        info!(?decision, "toggle via IPC");
                        Response::Toggled { decision }
                    }
                    Err(_) => unavailable(),
                }
            }

            Request::Retry => {
                let (reply, reply_rx) = oneshot::channel();
                if shared.trigger_tx.send(Trigger::Retry { reply }).await.is_err() {
                    return unavailable();
                }
                match reply_rx.await {
                    Ok(Ok(())) => {
                        info!("retry via IPC");
                        Response::RetryStarted
                    }
                    Ok(Err(e @ DispatchError::NoRecording { .. })) => Response::Error {
                        code: "no_recording".to_string(),
                        message: e.to_string(),
                    },
                    Ok(Err(e)) => Response::Error {
                        code: "dispatch_failed".to_string(),
                        message: e.to_string(),
                    },
                    Err(_) => unavailable(),
                }
            }

            // Handled by the connection loop
            Request::Subscribe => Response::Subscribed,
        }
    }

    /// Gracefully shutdown the server
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());

        // Remove socket file
        if self.socket_path.exists() {
            if let Err(e) = std::fs::remove_file(&self.socket_path) {
                warn!(?e, "failed to remove socket file");
            }
        }

        info!("IPC server shutdown complete");
    }
}

fn unavailable() -> Response {
    Response::Error {
        code: "unavailable".to_string(),
        message: "trigger loop is not running".to_string(),
    }
}

fn bind(socket_path: &Path) -> Result<UnixListener> {
    // Ensure parent directory exists
    if let Some(parent) = socket_path.parent() {
        std::fs::create_dir_all(parent).context("failed to create socket directory")?;
    }

    // Only a socket nobody answers on is stale
    if socket_path.exists() {
        match std::os::unix::net::UnixStream::connect(socket_path) {
            Ok(_) => bail!(
                "xhisper-trigger is already running (socket {:?} is in use)",
                socket_path
            ),
            Err(e) if e.kind() == std::io::ErrorKind::ConnectionRefused => {
                debug!(?socket_path, "removing stale socket");
                std::fs::remove_file(socket_path).context("failed to remove stale socket")?;
            }
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("cannot check existing socket {:?}", socket_path));
            }
        }
    }

    let listener = UnixListener::bind(socket_path).context("failed to bind Unix socket")?;

    // Set socket permissions to owner-only (0600)
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(socket_path, std::fs::Permissions::from_mode(0o600))?;
    }

    Ok(listener)
}
