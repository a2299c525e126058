//! Run configuration.
//!
//! One immutable value, constructed from `config.json` (or built in code)
//! and passed into the orchestrator explicitly. Key names follow the
//! deployed tooling's configuration surface; everything beyond the
//! mandatory endpoint/credential/file keys has a default.

use std::path::{Path, PathBuf};
use std::time::Duration;

use secrecy::SecretString;
use serde::Deserialize;

use crate::error::{ConfigError, SessionError};
use crate::session::SettleStrategy;
use crate::transport::TransportConfig;

/// Which transport carries the verification session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// Telnet console (serial-over-TCP).
    #[default]
    Telnet,
    /// SSH administrative shell.
    Ssh,
}

/// Device session lifetime policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionScope {
    /// One session spans the whole iteration loop.
    #[default]
    Run,
    /// A fresh session per verification check.
    Iteration,
}

/// Immutable configuration for a verification run.
#[derive(Debug, Clone, Deserialize)]
pub struct VerifyConfig {
    /// Web management server address.
    pub server_ip: String,

    /// Device console address; defaults to `server_ip`.
    #[serde(default)]
    pub conn_ip: Option<String>,

    /// Device console port.
    #[serde(default = "default_conn_port")]
    pub conn_port: u16,

    /// Web login user.
    pub user_name: String,

    /// Web login password (also used for SSH auth against the device).
    pub user_pwd: SecretString,

    /// Firmware file under test (name, resolved relative to the cwd).
    pub test_file: String,

    /// Rollback image designated as next-boot file on delete.
    #[serde(default)]
    pub original_file: Option<String>,

    /// Verbose logging of intermediate device output.
    #[serde(default)]
    pub detail_print: bool,

    /// Abort the whole run on the first checksum mismatch.
    #[serde(default)]
    pub terminate_on_md5_mismatch: bool,

    /// Number of upload/verify/cleanup iterations.
    #[serde(default = "default_loop_count")]
    pub loop_check_count: u32,

    /// Transport for the verification session.
    #[serde(default)]
    pub transport: TransportKind,

    /// Device session lifetime policy.
    #[serde(default)]
    pub session_scope: SessionScope,

    /// Commands sent verbatim before the verification script (console
    /// wake-up / login sequences; mark nothing secret here - use SSH
    /// auth for credentials where possible).
    #[serde(default)]
    pub init_commands: Vec<String>,

    /// Directory the firmware lands in on the device.
    #[serde(default = "default_mount_dir")]
    pub mount_dir: String,

    /// Bound for each `read_until`, seconds.
    #[serde(default = "default_read_timeout")]
    pub read_timeout_secs: u64,

    /// Settle delay after ordinary command sends, milliseconds.
    #[serde(default = "default_settle_delay")]
    pub settle_delay_ms: u64,

    /// Prompt regex enabling the prompt settle strategy; absent means
    /// fixed delays.
    #[serde(default)]
    pub settle_prompt: Option<String>,

    /// Transport connect timeout, seconds.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Reboot the device after the first verify and verify again.
    #[serde(default)]
    pub reboot_verify: bool,

    /// Fixed wait for the device to come back after reboot, seconds.
    #[serde(default = "default_reboot_wait")]
    pub reboot_wait_secs: u64,

    /// Pause between iterations, seconds.
    #[serde(default = "default_iteration_pause")]
    pub iteration_pause_secs: u64,

    /// Keywords marking an upload confirmation dialog as successful.
    #[serde(default = "default_success_keywords")]
    pub success_keywords: Vec<String>,

    /// Compatibility flag: count a verification with no extractable
    /// checksum as passed (a distinct assumed-pass outcome), as the
    /// legacy tooling did. Defaults to off; the missing token then
    /// surfaces as a non-passing inconclusive outcome.
    #[serde(default)]
    pub pass_on_missing_checksum: bool,
}

fn default_conn_port() -> u16 {
    23
}
fn default_loop_count() -> u32 {
    1
}
fn default_mount_dir() -> String {
    "/boot".into()
}
fn default_read_timeout() -> u64 {
    10
}
fn default_settle_delay() -> u64 {
    300
}
fn default_connect_timeout() -> u64 {
    15
}
fn default_reboot_wait() -> u64 {
    240
}
fn default_iteration_pause() -> u64 {
    5
}
fn default_success_keywords() -> Vec<String> {
    vec!["completed".into(), "success".into()]
}

impl VerifyConfig {
    /// Load configuration from a JSON file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::NotFound {
                    path: path.to_path_buf(),
                }
            } else {
                ConfigError::Invalid {
                    path: path.to_path_buf(),
                    message: e.to_string(),
                }
            }
        })?;

        serde_json::from_str(&raw).map_err(|e| ConfigError::Invalid {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Absolute path of the firmware image on the local side.
    pub fn boot_file(&self) -> PathBuf {
        std::path::absolute(&self.test_file).unwrap_or_else(|_| PathBuf::from(&self.test_file))
    }

    /// Transport configuration for the device console.
    pub fn transport_config(&self) -> TransportConfig {
        let host = self.conn_ip.clone().unwrap_or_else(|| self.server_ip.clone());
        TransportConfig::new(host, self.conn_port)
            .username(&self.user_name)
            .password(self.user_pwd.clone())
            .connect_timeout(Duration::from_secs(self.connect_timeout_secs))
    }

    /// Settle strategy derived from `settle_prompt`.
    pub fn settle_strategy(&self) -> Result<SettleStrategy, SessionError> {
        match &self.settle_prompt {
            Some(pattern) => SettleStrategy::prompt(pattern, self.read_timeout()),
            None => Ok(SettleStrategy::FixedDelay),
        }
    }

    /// Bound for each `read_until`.
    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }

    /// Settle delay after ordinary command sends.
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    /// Fixed post-reboot wait.
    pub fn reboot_wait(&self) -> Duration {
        Duration::from_secs(self.reboot_wait_secs)
    }

    /// Pause between iterations.
    pub fn iteration_pause(&self) -> Duration {
        Duration::from_secs(self.iteration_pause_secs)
    }
}
