//! Transport layer: duplex text channels to a remote administrative shell.
//!
//! Two implementations share one contract: a telnet session over raw TCP
//! and an SSH session over russh. Both accumulate unstructured output in
//! an [`OutputBuffer`](crate::session::OutputBuffer) and expose bounded
//! `read_until` operations where a timeout is a loggable outcome, not an
//! error.

pub mod config;
mod ssh;
mod telnet;

pub use config::{AuthMethod, TransportConfig};
pub use ssh::SshSession;
pub use telnet::TelnetSession;

use std::future::Future;
use std::time::Duration;

use regex::bytes::Regex;

use crate::error::Result;

/// Lifecycle state of a transport session.
///
/// `Closed -> Open` on successful connect; `Open -> Closed` via `close`
/// (terminal, also reachable from `Failed`). A fresh instance is required
/// per new connection - instances never reconnect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Not connected (initial, or terminal after `close`).
    Closed,
    /// Connected and usable.
    Open,
    /// Broken by a transport fault; only `close` remains valid.
    Failed,
}

impl SessionState {
    /// Static name for error messages.
    pub fn name(self) -> &'static str {
        match self {
            SessionState::Closed => "closed",
            SessionState::Open => "open",
            SessionState::Failed => "failed",
        }
    }
}

/// A live duplex text channel to a remote administrative shell.
pub trait Transport: Send {
    /// Current lifecycle state.
    fn state(&self) -> SessionState;

    /// Send one line, appending the line terminator. Fire-and-forget:
    /// no acknowledgment is awaited.
    fn send(&mut self, line: &str) -> impl Future<Output = Result<()>> + Send;

    /// Read until the literal `token` appears or `timeout` elapses.
    ///
    /// Returns the accumulated text through the token (consuming it from
    /// the buffer), or an empty string on timeout. Bytes past the token
    /// stay buffered for the next read.
    fn read_until(
        &mut self,
        token: &str,
        timeout: Duration,
    ) -> impl Future<Output = Result<String>> + Send;

    /// Read until `pattern` matches or `timeout` elapses. Same buffer
    /// semantics as [`Transport::read_until`].
    fn read_until_pattern(
        &mut self,
        pattern: &Regex,
        timeout: Duration,
    ) -> impl Future<Output = Result<String>> + Send;

    /// Close the session. Best-effort: errors are logged and discarded,
    /// and calling it again is a no-op.
    fn close(&mut self) -> impl Future<Output = ()> + Send;
}

/// Factory producing fresh transport sessions.
///
/// Session instances are single-use, so anything that reconnects - per
/// iteration, or after a reboot - goes through a connector.
pub trait Connector: Send + Sync {
    /// The session type this connector produces.
    type Session: Transport;

    /// Open a new session.
    fn connect(&self) -> impl Future<Output = Result<Self::Session>> + Send;
}

/// Connector for telnet sessions.
#[derive(Debug, Clone)]
pub struct TelnetConnector {
    config: TransportConfig,
}

impl TelnetConnector {
    /// Create a connector from a transport config.
    pub fn new(config: TransportConfig) -> Self {
        Self { config }
    }
}

impl Connector for TelnetConnector {
    type Session = TelnetSession;

    async fn connect(&self) -> Result<TelnetSession> {
        TelnetSession::connect(self.config.clone()).await
    }
}

/// Connector for SSH sessions.
#[derive(Debug, Clone)]
pub struct SshConnector {
    config: TransportConfig,
}

impl SshConnector {
    /// Create a connector from a transport config.
    pub fn new(config: TransportConfig) -> Self {
        Self { config }
    }
}

impl Connector for SshConnector {
    type Session = SshSession;

    async fn connect(&self) -> Result<SshSession> {
        SshSession::connect(self.config.clone()).await
    }
}
