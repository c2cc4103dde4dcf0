//! Client side of the control socket, used by the CLI subcommands

use std::path::Path;

use anyhow::{Context, Result};
use tokio::net::UnixStream;

use super::protocol::{read_message, write_message, Notification, Request, Response};

/// Connection to a running daemon
pub struct Client {
    stream: UnixStream,
}

impl Client {
    /// Connect to the daemon listening on `socket_path`
    pub async fn connect(socket_path: &Path) -> Result<Self> {
        let stream = UnixStream::connect(socket_path)
            .await
            .with_context(|| format!("failed to connect to {:?} - is the daemon running?", socket_path))?;
        Ok(Self { stream })
    }

    /// Send a request and wait for its response
    pub async fn request(&mut self, request: &Request) -> Result<Response> {
        write_message(&mut self.stream, request).await?;
        read_message(&mut self.stream)
            .await?
            .context("daemon closed the connection")
    }

    /// Wait for the next pushed notification; `None` once the daemon hangs up
    pub async fn next_notification(&mut self) -> Result<Option<Notification>> {
        read_message(&mut self.stream).await
    }
}
