//! Command session: ordered script execution over one transport.

use std::time::Duration;

use log::debug;
use regex::bytes::Regex;

use super::script::CommandScript;
use super::settle::SettleStrategy;
use crate::error::{Result, SessionError};
use crate::transport::{SessionState, Transport};

/// Executes command scripts over a single transport session.
///
/// Only one command is ever in flight: the wrapped shells do not tolerate
/// interleaved input. Callers that need output invoke `read_until`
/// explicitly afterwards - a settle delay is a wait, not a readiness
/// probe, and output may take several reads to arrive whole.
pub struct CommandSession<T: Transport> {
    transport: T,
    settle: SettleStrategy,
}

impl<T: Transport> CommandSession<T> {
    /// Wrap a transport with the default (fixed delay) settle strategy.
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            settle: SettleStrategy::default(),
        }
    }

    /// Wrap a transport with an explicit settle strategy.
    pub fn with_settle(transport: T, settle: SettleStrategy) -> Self {
        Self { transport, settle }
    }

    /// Current transport state.
    pub fn state(&self) -> SessionState {
        self.transport.state()
    }

    /// Send every step of `script` strictly in order, settling after each.
    pub async fn run_script(&mut self, script: &CommandScript) -> Result<()> {
        if self.transport.state() != SessionState::Open {
            return Err(SessionError::NotOpen {
                state: self.transport.state().name(),
            }
            .into());
        }

        for step in script.iter() {
            debug!("Sending command: {}", step.display_command());
            self.transport.send(&step.command).await?;

            match &self.settle {
                SettleStrategy::FixedDelay => tokio::time::sleep(step.settle).await,
                SettleStrategy::Prompt { pattern, timeout } => {
                    // settle output is drained and discarded
                    let _ = self.transport.read_until_pattern(pattern, *timeout).await?;
                }
            }
        }
        Ok(())
    }

    /// Read until the literal `token` appears or `timeout` elapses.
    pub async fn read_until(&mut self, token: &str, timeout: Duration) -> Result<String> {
        self.transport.read_until(token, timeout).await
    }

    /// Read until `pattern` matches or `timeout` elapses.
    pub async fn read_until_pattern(
        &mut self,
        pattern: &Regex,
        timeout: Duration,
    ) -> Result<String> {
        self.transport.read_until_pattern(pattern, timeout).await
    }

    /// Close the underlying transport. Best-effort, idempotent.
    pub async fn close(&mut self) {
        self.transport.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::testing::MockTransport;
    use crate::session::CommandScript;

    #[tokio::test]
    async fn test_run_script_sends_in_order() {
        let mut session = CommandSession::new(MockTransport::open());
        let script = CommandScript::new()
            .with_default_settle(Duration::from_millis(1))
            .step("mount /boot")
            .step("cd /boot")
            .step("ls");

        session.run_script(&script).await.unwrap();
        assert_eq!(
            session.transport.sent(),
            vec!["mount /boot\n", "cd /boot\n", "ls\n"]
        );
    }

    #[tokio::test]
    async fn test_run_script_refuses_closed_transport() {
        let mut transport = MockTransport::open();
        transport.close().await;

        let mut session = CommandSession::new(transport);
        let script = CommandScript::new().step("ls");

        let err = session.run_script(&script).await.unwrap_err();
        assert!(matches!(
            err,
            crate::error::Error::Session(SessionError::NotOpen { .. })
        ));
        assert!(session.transport.sent().is_empty());
    }

    #[tokio::test]
    async fn test_prompt_settle_consumes_output() {
        let mut transport = MockTransport::open();
        transport.push_response("mounted\nhost:/boot# ");
        transport.push_response("host:/boot# ");

        let settle =
            SettleStrategy::prompt(r"#\s*$", Duration::from_millis(50)).unwrap();
        let mut session = CommandSession::with_settle(transport, settle);

        let script = CommandScript::new().step("mount /boot").step("cd /boot");
        session.run_script(&script).await.unwrap();
        assert_eq!(session.transport.sent().len(), 2);
    }

    #[tokio::test]
    async fn test_read_until_passthrough() {
        let mut transport = MockTransport::open();
        transport.push_response("test.bin  1024\n");

        let mut session = CommandSession::new(transport);
        let out = session
            .read_until("test.bin", Duration::from_millis(50))
            .await
            .unwrap();
        assert!(out.contains("test.bin"));
    }
}
