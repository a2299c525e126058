//! SSH transport implementation using russh.
//!
//! Opens one interactive shell channel (PTY requested) per session and
//! drives it like the telnet console: buffered reads, literal/pattern
//! `read_until`, best-effort close. Host keys are accepted without
//! verification - the targets are lab appliances reached over management
//! networks, and the reference tooling behaves the same way.

use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use russh::client::{self, Handle, Msg};
use russh::keys::{PrivateKeyWithHashAlg, PublicKey, load_secret_key};
use russh::{Channel, ChannelMsg, Disconnect};
use secrecy::ExposeSecret;

use super::config::{AuthMethod, TransportConfig};
use super::{SessionState, Transport};
use crate::error::{Result, SessionError, TransportError};
use crate::session::OutputBuffer;

/// SSH session wrapping a russh client handle and one shell channel.
pub struct SshSession {
    session: Handle<AcceptAllHandler>,
    channel: Channel<Msg>,
    buffer: OutputBuffer,
    state: SessionState,
    peer: String,
}

impl SshSession {
    /// Connect, authenticate and open an interactive shell channel.
    pub async fn connect(config: TransportConfig) -> Result<Self> {
        let peer = format!("{}:{}", config.host, config.port);

        let ssh_config = Arc::new(client::Config {
            inactivity_timeout: None,
            ..Default::default()
        });

        let mut session = tokio::time::timeout(
            config.connect_timeout,
            client::connect(
                ssh_config,
                (config.host.as_str(), config.port),
                AcceptAllHandler,
            ),
        )
        .await
        .map_err(|_| TransportError::Timeout(config.connect_timeout))?
        .map_err(TransportError::Ssh)?;

        Self::authenticate(&mut session, &config).await?;

        let channel = Self::open_shell(&session, &config).await?;

        info!("Connected to SSH console {peer} as '{}'", config.username);

        Ok(Self {
            session,
            channel,
            buffer: OutputBuffer::new(),
            state: SessionState::Open,
            peer,
        })
    }

    /// Authenticate with the server.
    async fn authenticate(
        session: &mut Handle<AcceptAllHandler>,
        config: &TransportConfig,
    ) -> Result<()> {
        let success = match &config.auth {
            AuthMethod::None => session
                .authenticate_none(&config.username)
                .await
                .map_err(TransportError::Ssh)?
                .success(),
            AuthMethod::Password(password) => session
                .authenticate_password(&config.username, password.expose_secret())
                .await
                .map_err(TransportError::Ssh)?
                .success(),
            AuthMethod::PrivateKey { path, passphrase } => {
                let key = load_secret_key(path, passphrase.as_deref())
                    .map_err(|e| TransportError::Key(e.to_string()))?;

                let hash_alg = session
                    .best_supported_rsa_hash()
                    .await
                    .map_err(TransportError::Ssh)?
                    .flatten();

                session
                    .authenticate_publickey(
                        &config.username,
                        PrivateKeyWithHashAlg::new(Arc::new(key), hash_alg),
                    )
                    .await
                    .map_err(TransportError::Ssh)?
                    .success()
            }
        };

        if !success {
            return Err(TransportError::AuthenticationFailed {
                user: config.username.clone(),
            }
            .into());
        }

        Ok(())
    }

    /// Open the interactive shell channel with a PTY.
    async fn open_shell(
        session: &Handle<AcceptAllHandler>,
        config: &TransportConfig,
    ) -> Result<Channel<Msg>> {
        let channel = session
            .channel_open_session()
            .await
            .map_err(TransportError::Ssh)?;

        channel
            .request_pty(
                true,
                "xterm",
                config.terminal_width,
                config.terminal_height,
                0,
                0,
                &[],
            )
            .await
            .map_err(|_| TransportError::Negotiation {
                message: "PTY request refused".into(),
            })?;

        channel
            .request_shell(true)
            .await
            .map_err(|_| TransportError::Negotiation {
                message: "shell request refused".into(),
            })?;

        Ok(channel)
    }

    /// Pull one channel message into the buffer. Returns false when the
    /// deadline passed without data.
    async fn fill(&mut self, deadline: Instant) -> Result<bool> {
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(false);
            }

            match tokio::time::timeout(remaining, self.channel.wait()).await {
                Err(_) => return Ok(false),
                Ok(None) => {
                    self.state = SessionState::Failed;
                    return Err(TransportError::Disconnected.into());
                }
                Ok(Some(ChannelMsg::Data { data })) => {
                    self.buffer.extend(&data);
                    return Ok(true);
                }
                Ok(Some(ChannelMsg::ExtendedData { data, .. })) => {
                    self.buffer.extend(&data);
                    return Ok(true);
                }
                // window adjusts, exit status and the like carry no text
                Ok(Some(_)) => continue,
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

impl Transport for SshSession {
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

        let payload = format!("{line}\n");
        self.channel.data(payload.as_bytes()).await.map_err(|e| {
            self.state = SessionState::Failed;
            TransportError::Ssh(e)
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
        if let Err(e) = self.channel.eof().await {
            debug!("Error sending EOF to {}: {e}", self.peer);
        }
        if let Err(e) = self
            .session
            .disconnect(Disconnect::ByApplication, "", "en")
            .await
        {
            debug!("Error disconnecting from {}: {e}", self.peer);
        }
        self.state = SessionState::Closed;
        info!("SSH session to {} closed", self.peer);
    }
}

/// Client handler that accepts any host key.
struct AcceptAllHandler;

impl client::Handler for AcceptAllHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        _server_public_key: &PublicKey,
    ) -> std::result::Result<bool, Self::Error> {
        Ok(true)
    }
}
