//! In-memory transport double for session and orchestrator tests.

use std::collections::VecDeque;
use std::time::Duration;

use regex::bytes::Regex;

use crate::error::{Result, SessionError};
use crate::transport::{SessionState, Transport};

/// Scripted transport: records sends, replays canned responses.
///
/// Each `read_until` call pops one canned response; an exhausted queue
/// behaves like a read timeout (empty string).
pub(crate) struct MockTransport {
    state: SessionState,
    sent: Vec<String>,
    responses: VecDeque<String>,
}

impl MockTransport {
    /// A transport already in the open state.
    pub fn open() -> Self {
        Self {
            state: SessionState::Open,
            sent: Vec::new(),
            responses: VecDeque::new(),
        }
    }

    /// Queue a response for a future read.
    pub fn push_response(&mut self, response: impl Into<String>) {
        self.responses.push_back(response.into());
    }

    /// Everything sent so far, line terminators included.
    pub fn sent(&self) -> Vec<String> {
        self.sent.clone()
    }
}

impl Transport for MockTransport {
    fn state(&self) -> SessionState {
        self.state
    }

    async fn send(&mut self, line: &str) -> Result<()> {
        if self.state != SessionState::Open {
            return Err(SessionError::NotOpen {
                state: self.state.name(),
            }
            .into());
        }
        self.sent.push(format!("{line}\n"));
        Ok(())
    }

    async fn read_until(&mut self, _token: &str, _timeout: Duration) -> Result<String> {
        Ok(self.responses.pop_front().unwrap_or_default())
    }

    async fn read_until_pattern(&mut self, _pattern: &Regex, _timeout: Duration) -> Result<String> {
        Ok(self.responses.pop_front().unwrap_or_default())
    }

    async fn close(&mut self) {
        self.state = SessionState::Closed;
    }
}
