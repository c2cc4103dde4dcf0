//! IPC module for daemon control over a Unix socket

mod client;
mod protocol;
mod server;

pub use client::Client;
pub use protocol::{Notification, Request, Response};
pub use server::Server;
