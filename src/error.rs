//! Error types for bootcheck.

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Main error type for bootcheck operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Transport-level errors (connect, authenticate, negotiate, disconnect).
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Command session errors.
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    /// Web management console errors.
    #[error("Web error: {0}")]
    Web(#[from] WebError),

    /// Local file hashing errors.
    #[error("Hash error: {0}")]
    Hash(#[from] HashError),

    /// Configuration errors.
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

/// Transport layer errors.
///
/// Unreachable host, rejected authentication, and protocol negotiation
/// failure are distinguished causes but share this one kind externally.
/// A read timeout is deliberately *not* represented here: `read_until`
/// returns an empty buffer on timeout.
#[derive(Error, Debug)]
pub enum TransportError {
    /// Failed to connect to host.
    #[error("Connection failed to {host}:{port}: {source}")]
    ConnectionFailed {
        host: String,
        port: u16,
        #[source]
        source: io::Error,
    },

    /// SSH handshake or protocol error.
    #[error("SSH error: {0}")]
    Ssh(#[from] russh::Error),

    /// Authentication failed.
    #[error("Authentication failed for user '{user}'")]
    AuthenticationFailed { user: String },

    /// SSH key error.
    #[error("SSH key error: {0}")]
    Key(String),

    /// Protocol negotiation failed (PTY or shell request refused).
    #[error("Protocol negotiation failed: {message}")]
    Negotiation { message: String },

    /// Connection was closed by the peer.
    #[error("Connection disconnected")]
    Disconnected,

    /// Connect did not complete within the window.
    #[error("Connect timed out after {0:?}")]
    Timeout(Duration),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Command session errors.
#[derive(Error, Debug)]
pub enum SessionError {
    /// Attempted to send on a session that is not open.
    ///
    /// Commands are never sent on a closed or failed session.
    #[error("Session is {state}, cannot send")]
    NotOpen { state: &'static str },

    /// Invalid settle prompt pattern.
    #[error("Invalid settle pattern: {0}")]
    InvalidPattern(#[from] regex::Error),
}

/// Web management console errors (reported by the collaborator, consumed here).
#[derive(Error, Debug)]
pub enum WebError {
    /// Could not open a session against the management interface.
    #[error("Web session to {server} failed: {message}")]
    Connect { server: String, message: String },

    /// Upload was rejected or the confirmation dialog was dismissed.
    #[error("Upload failed: {message}")]
    Upload { message: String },

    /// Delete was rejected or the target row was not found.
    #[error("Delete failed: {message}")]
    Delete { message: String },
}

/// Local file hashing errors.
#[derive(Error, Debug)]
pub enum HashError {
    /// The file to hash does not exist.
    #[error("File not found: {path}")]
    FileNotFound { path: PathBuf },

    /// I/O error while reading the file.
    #[error("I/O error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Configuration loading errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Configuration file missing.
    #[error("Config file not found: {path}")]
    NotFound { path: PathBuf },

    /// Configuration file unreadable or malformed.
    #[error("Config file {path} invalid: {message}")]
    Invalid { path: PathBuf, message: String },
}

/// Result type alias using bootcheck's Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Log-then-propagate combinator for session operations.
///
/// Applied uniformly at call sites instead of repeating the same
/// match-log-return dance per call.
pub trait LogContext {
    /// Log the error under `context` and pass the result through unchanged.
    fn log_context(self, context: &str) -> Self;
}

impl<T, E: std::fmt::Display> LogContext for std::result::Result<T, E> {
    fn log_context(self, context: &str) -> Self {
        if let Err(ref e) = self {
            log::error!("{context}: {e}");
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_context_passes_through() {
        let ok: std::result::Result<u32, String> = Ok(7);
        assert_eq!(ok.log_context("ctx").unwrap(), 7);

        let err: std::result::Result<u32, String> = Err("boom".into());
        assert_eq!(err.log_context("ctx").unwrap_err(), "boom");
    }

    #[test]
    fn test_transport_error_wraps_into_error() {
        let e: Error = TransportError::Disconnected.into();
        assert!(matches!(e, Error::Transport(TransportError::Disconnected)));
    }
}
