//! xhisper-trigger: hotkey daemon for xhisper dictation
//!
//! This daemon runs in the background of a desktop session and provides:
//! - Global hotkey detection on a single key (right control by default)
//! - A recording toggle state machine with double-click or toggle policy
//! - Fire-and-forget invocation of the external `xhisper` command
//! - A control socket so a button or launcher can toggle, retry the last
//!   recording and query status
//!
//! Audio capture and transcription belong to `xhisper` itself.

mod config;
mod dispatch;
mod events;
mod hotkey;
mod ipc;
mod lifecycle;
mod state;
mod status;

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use tokio::sync::{broadcast, mpsc};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::dispatch::{CommandDispatcher, CommandResolver};
use crate::events::StateEvent;
use crate::hotkey::{HotkeyListener, WatchedKey};
use crate::ipc::{Client, Notification, Request, Response, Server};
use crate::lifecycle::ShutdownSignal;
use crate::state::{ToggleStateMachine, TriggerLoop, TriggerPolicy};

#[derive(Parser)]
#[command(name = "xhisper-trigger")]
#[command(about = "Toggle xhisper dictation with a hotkey", version)]
struct Cli {
    /// Control socket path
    #[arg(long, global = true)]
    socket: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the hotkey daemon (default)
    Run(RunArgs),

    /// Toggle recording in the running daemon, like pressing a button
    Toggle,

    /// Show the daemon's recording state and the pipeline phase
    Status,

    /// Transcribe the last recording again
    Retry,

    /// Print state events as they happen
    Watch,

    /// Check that the daemon is reachable
    Ping,
}

#[derive(Args, Default)]
struct RunArgs {
    /// Trigger policy: `toggle` or `double-click`
    #[arg(long)]
    policy: Option<TriggerPolicy>,

    /// Double-click window in milliseconds
    #[arg(long)]
    double_click_ms: Option<u64>,

    /// Debounce window in milliseconds
    #[arg(long)]
    debounce_ms: Option<u64>,

    /// Key to watch, e.g. `ctrl_r`, `f9`
    #[arg(long)]
    key: Option<WatchedKey>,

    /// Command looked up on PATH
    #[arg(long)]
    command: Option<String>,

    /// Script tried before the PATH lookup
    #[arg(long)]
    script: Option<PathBuf>,

    /// File xhisper writes its phase to
    #[arg(long)]
    status_file: Option<PathBuf>,

    /// Last recording, used by retry
    #[arg(long)]
    last_audio: Option<PathBuf>,
}

impl RunArgs {
    fn apply(self, config: &mut Config) {
        if let Some(policy) = self.policy {
            config.policy = policy;
        }
        if let Some(ms) = self.double_click_ms {
            config.windows.double_click = std::time::Duration::from_millis(ms);
        }
        if let Some(ms) = self.debounce_ms {
            config.windows.debounce = std::time::Duration::from_millis(ms);
        }
        if let Some(key) = self.key {
            config.hotkey = key;
        }
        if let Some(command) = self.command {
            config.command = command;
        }
        if let Some(script) = self.script {
            config.script = Some(script);
        }
        if let Some(status_file) = self.status_file {
            config.status_file = status_file;
        }
        if let Some(last_audio) = self.last_audio {
            config.last_audio = last_audio;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = Config::load().context("invalid configuration")?;
    if let Some(socket) = cli.socket {
        config.socket_path = socket;
    }

    match cli.command.unwrap_or(Commands::Run(RunArgs::default())) {
        Commands::Run(args) => {
            args.apply(&mut config);
            run_daemon(config).await
        }
        Commands::Toggle => toggle(&config).await,
        Commands::Status => print_status(&config).await,
        Commands::Retry => retry(&config).await,
        Commands::Watch => watch(&config).await,
        Commands::Ping => ping(&config).await,
    }
}

async fn run_daemon(config: Config) -> Result<()> {
    info!(
        version = env!("CARGO_PKG_VERSION"),
        "xhisper-trigger starting"
    );
    info!(
        policy = %config.policy,
        hotkey = %config.hotkey,
        double_click_ms = config.windows.double_click.as_millis() as u64,
        debounce_ms = config.windows.debounce.as_millis() as u64,
        command = %config.command,
        script = ?config.script,
        socket = ?config.socket_path,
        "configuration loaded"
    );

    // Create shutdown signal handler
    let shutdown = ShutdownSignal::new();

    // Hotkey listener and IPC server -> trigger loop
    let (trigger_tx, trigger_rx) = mpsc::channel(32);
    // Trigger loop -> IPC subscribers
    let (event_tx, _event_rx) = broadcast::channel::<StateEvent>(64);

    let machine = ToggleStateMachine::new(config.policy, config.windows);
    let dispatcher = CommandDispatcher::new(
        CommandResolver::new(config.script.clone(), config.command.clone()),
        &config.last_audio,
    );
    let mut trigger_loop = TriggerLoop::new(machine, dispatcher, event_tx.clone());

    // Refuses to start while another daemon owns the socket
    let server = Server::new(&config, trigger_tx.clone(), event_tx, trigger_loop.state_watch())?;

    // Without the hook there is nothing for the daemon to do
    let hotkey_listener = HotkeyListener::new(config.hotkey, trigger_tx);
    let listener_failure = match hotkey_listener.start() {
        Ok(failure) => failure,
        Err(e) => {
            server.shutdown().await;
            return Err(anyhow::Error::new(e).context("failed to start hotkey listener"));
        }
    };
    info!("hotkey listener started");

    match config.policy {
        TriggerPolicy::DoubleClickStart => {
            info!(hotkey = %config.hotkey, "double-click to start recording, press once to stop")
        }
        TriggerPolicy::SinglePressToggle => {
            info!(hotkey = %config.hotkey, "press to start recording, press again to stop")
        }
    }
    info!("daemon initialized, entering main loop");

    // Main event loop
    let outcome: Result<()> = tokio::select! {
        // Run the trigger loop (processes hotkey and IPC triggers)
        _ = trigger_loop.run(trigger_rx) => {
            info!("trigger loop exited");
            Ok(())
        }

        // Run the IPC server (accepts client connections)
        result = server.run() => {
            if let Err(e) = &result {
                error!(?e, "IPC server error");
            }
            result
        }

        // The keyboard hook died or never came up
        Ok(err) = listener_failure => {
            Err(anyhow::Error::new(err).context("hotkey listener failed"))
        }

        // Wait for shutdown signal
        result = shutdown.wait() => {
            info!("shutdown signal received");
            result.context("failed to install signal handlers")
        }
    };

    // Cleanup; spawned xhisper processes are left alone
    info!("shutting down...");

    if hotkey_listener.is_running() {
        hotkey_listener.stop();
        info!("hotkey listener stopped");
    }
    server.shutdown().await;

    info!("xhisper-trigger stopped");

    outcome
}

async fn toggle(config: &Config) -> Result<()> {
    let mut client = Client::connect(&config.socket_path).await?;
    match client.request(&Request::Toggle).await? {
        Response::Toggled { decision } => {
            println!("{}", decision);
            Ok(())
        }
        other => unexpected(other),
    }
}

async fn print_status(config: &Config) -> Result<()> {
    let mut client = Client::connect(&config.socket_path).await?;
    match client.request(&Request::GetStatus).await? {
        Response::Status(status) => {
            println!("{}", serde_json::to_string_pretty(&status)?);
            Ok(())
        }
        other => unexpected(other),
    }
}

async fn retry(config: &Config) -> Result<()> {
    let mut client = Client::connect(&config.socket_path).await?;
    match client.request(&Request::Retry).await? {
        Response::RetryStarted => {
            println!("retrying last recording");
            Ok(())
        }
        other => unexpected(other),
    }
}

async fn watch(config: &Config) -> Result<()> {
    let mut client = Client::connect(&config.socket_path).await?;
    match client.request(&Request::Subscribe).await? {
        Response::Subscribed => {}
        other => return unexpected(other),
    }

    while let Some(notification) = client.next_notification().await? {
        match notification {
            Notification::StateEvent { event } => println!("{}", serde_json::to_string(&event)?),
            Notification::Lagged { skipped } => warn!(skipped, "missed state events"),
        }
    }

    Ok(())
}

async fn ping(config: &Config) -> Result<()> {
    let mut client = Client::connect(&config.socket_path).await?;
    match client.request(&Request::Ping).await? {
        Response::Pong => {
            println!("pong");
            Ok(())
        }
        other => unexpected(other),
    }
}

fn unexpected(response: Response) -> Result<()> {
    match response {
        Response::Error { code, message } => bail!("daemon error ({}): {}", code, message),
        other => bail!("unexpected response from daemon: {:?}", other),
    }
}
