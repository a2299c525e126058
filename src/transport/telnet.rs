//! Telnet transport over raw TCP.
//!
//! Appliance consoles in scope speak barely-negotiated telnet: the session
//! refuses every option the peer proposes (`DO` -> `WONT`, `WILL` -> `DONT`),
//! skips subnegotiations, and otherwise treats the stream as plain text.
//! Negotiation state survives chunk boundaries, since a command sequence can
//! be split across reads.

use std::time::{Duration, Instant};

use log::{debug, info, warn};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use super::config::TransportConfig;
use super::{SessionState, Transport};
use crate::error::{Result, TransportError};
use crate::session::OutputBuffer;

const IAC: u8 = 255;
const DONT: u8 = 254;
const DO: u8 = 253;
const WONT: u8 = 252;
const WILL: u8 = 251;
const SB: u8 = 250;
const SE: u8 = 240;

/// Telnet session over a TCP stream.
#[derive(Debug)]
pub struct TelnetSession {
    stream: TcpStream,
    buffer: OutputBuffer,
    codec: TelnetCodec,
    state: SessionState,
    peer: String,
}

impl TelnetSession {
    /// Connect to the telnet endpoint, bounded by the connect timeout.
    pub async fn connect(config: TransportConfig) -> Result<Self> {
        let peer = format!("{}:{}", config.host, config.port);

        let stream = tokio::time::timeout(
            config.connect_timeout,
            TcpStream::connect((config.host.as_str(), config.port)),
        )
        .await
        .map_err(|_| TransportError::Timeout(config.connect_timeout))?
        .map_err(|e| TransportError::ConnectionFailed {
            host: config.host.clone(),
            port: config.port,
            source: e,
        })?;

        info!("Connected to telnet console {peer}");

        Ok(Self {
            stream,
            buffer: OutputBuffer::new(),
            codec: TelnetCodec::default(),
            state: SessionState::Open,
            peer,
        })
    }

    /// Pull one chunk off the socket into the buffer, answering any
    /// negotiation the peer started. Returns false when the deadline
    /// passed without data.
    async fn fill(&mut self, deadline: Instant) -> Result<bool> {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Ok(false);
        }

        let mut chunk = [0u8; 4096];
        match tokio::time::timeout(remaining, self.stream.read(&mut chunk)).await {
            Err(_) => Ok(false),
            Ok(Ok(0)) => {
                self.state = SessionState::Failed;
                Err(TransportError::Disconnected.into())
            }
            Ok(Ok(n)) => {
                let mut data = Vec::with_capacity(n);
                let mut replies = Vec::new();
                self.codec.feed(&chunk[..n], &mut data, &mut replies);
                self.buffer.extend(&data);
                if !replies.is_empty() {
                    self.stream
                        .write_all(&replies)
                        .await
                        .map_err(TransportError::Io)?;
                }
                Ok(true)
            }
            Ok(Err(e)) => {
                self.state = SessionState::Failed;
                Err(TransportError::Io(e).into())
            }
        }
    }

    async fn read_matching<F>(&mut self, find: F, timeout: Duration, what: &str) -> Result<String>
    where
        F: Fn(&OutputBuffer) -> Option<usize>,
    {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(end) = find(&self.buffer) {
                return Ok(self.buffer.drain_through(end));
            }
            if !self.fill(deadline).await? {
                warn!("Read for {what} timed out after {timeout:?}");
                return Ok(String::new());
            }
        }
    }
}

impl Transport for TelnetSession {
    fn state(&self) -> SessionState {
        self.state
    }

    async fn send(&mut self, line: &str) -> Result<()> {
        if self.state != SessionState::Open {
            return Err(crate::error::SessionError::NotOpen {
                state: self.state.name(),
            }
            .into());
        }

        // 0xFF must be doubled on the wire
        let mut payload = Vec::with_capacity(line.len() + 1);
        for &b in line.as_bytes() {
            payload.push(b);
            if b == IAC {
                payload.push(IAC);
            }
        }
        payload.push(b'\n');

        self.stream.write_all(&payload).await.map_err(|e| {
            self.state = SessionState::Failed;
            TransportError::Io(e)
        })?;
        Ok(())
    }

    async fn read_until(&mut self, token: &str, timeout: Duration) -> Result<String> {
        let needle = token.as_bytes().to_vec();
        self.read_matching(|buf| buf.find_literal(&needle), timeout, token)
            .await
    }

    async fn read_until_pattern(
        &mut self,
        pattern: &regex::bytes::Regex,
        timeout: Duration,
    ) -> Result<String> {
        let what = pattern.as_str().to_string();
        self.read_matching(|buf| buf.find_pattern(pattern), timeout, &what)
            .await
    }

    async fn close(&mut self) {
        if self.state == SessionState::Closed {
            return;
        }
        if let Err(e) = self.stream.shutdown().await {
            debug!("Error shutting down telnet stream to {}: {e}", self.peer);
        }
        self.state = SessionState::Closed;
        info!("Telnet session to {} closed", self.peer);
    }
}

/// Incremental telnet option parser.
///
/// Splits inbound bytes into application data and negotiation, answering
/// every proposal with a refusal. Carries its state between chunks.
#[derive(Debug, Default)]
struct TelnetCodec {
    state: CodecState,
}

#[derive(Debug, Default, Clone, Copy, PartialEq)]
enum CodecState {
    #[default]
    Data,
    Command,
    Option(u8),
    Subneg,
    SubnegCommand,
}

impl TelnetCodec {
    /// Process `raw`, appending application bytes to `data` and any
    /// negotiation answers to `replies`.
    fn feed(&mut self, raw: &[u8], data: &mut Vec<u8>, replies: &mut Vec<u8>) {
        for &b in raw {
            self.state = match self.state {
                CodecState::Data => {
                    if b == IAC {
                        CodecState::Command
                    } else {
                        data.push(b);
                        CodecState::Data
                    }
                }
                CodecState::Command => match b {
                    IAC => {
                        // escaped literal 0xFF
                        data.push(IAC);
                        CodecState::Data
                    }
                    DO | DONT | WILL | WONT => CodecState::Option(b),
                    SB => CodecState::Subneg,
                    // NOP, GA and friends carry no option byte
                    _ => CodecState::Data,
                },
                CodecState::Option(cmd) => {
                    match cmd {
                        DO => replies.extend_from_slice(&[IAC, WONT, b]),
                        WILL => replies.extend_from_slice(&[IAC, DONT, b]),
                        _ => {}
                    }
                    CodecState::Data
                }
                CodecState::Subneg => {
                    if b == IAC {
                        CodecState::SubnegCommand
                    } else {
                        CodecState::Subneg
                    }
                }
                CodecState::SubnegCommand => match b {
                    SE => CodecState::Data,
                    _ => CodecState::Subneg,
                },
            };
        }
    }
}
