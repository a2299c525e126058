//! # Bootcheck
//!
//! Async firmware upload verification for network appliances.
//!
//! Bootcheck drives an end-to-end upgrade check: a firmware image goes up
//! through the appliance's web management interface (an external
//! collaborator behind the [`WebConsole`] trait), then a remote
//! administrative shell - telnet console or SSH - is scripted to mount the
//! boot partition, hash the uploaded file, and confirm the checksum matches
//! the locally computed baseline. Optionally the device is rebooted and
//! re-verified before cleanup, across a configurable number of iterations.
//!
//! ## Features
//!
//! - Telnet and SSH transports behind one session contract
//! - Ordered command scripts with per-step settle delays (or an optional
//!   prompt-pattern settle strategy)
//! - Checksum extraction from noisy, fragmented console output
//! - Mismatch policy: warn-and-continue or terminate the run
//! - Per-run or per-iteration device session lifetime
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::path::Path;
//! use bootcheck::{SshConnector, VerificationOrchestrator, VerifyConfig, WebConsole};
//!
//! // `web` is the browser-automation collaborator driving the upload UI
//! # async fn example(web: impl WebConsole) -> Result<(), bootcheck::Error> {
//! let config = VerifyConfig::load(Path::new("config.json"))?;
//! let connector = SshConnector::new(config.transport_config());
//!
//! let report = VerificationOrchestrator::new(config, connector, web)
//!     .run()
//!     .await?;
//!
//! println!("passed: {}", report.all_passed());
//! # Ok(())
//! # }
//! ```

pub mod checksum;
pub mod config;
pub mod error;
pub mod orchestrator;
pub mod session;
pub mod transport;
pub mod web;

// Re-export main types for convenience
pub use checksum::{ChecksumToken, content_hash, extract};
pub use config::{SessionScope, TransportKind, VerifyConfig};
pub use error::{Error, Result};
pub use orchestrator::{
    IterationRecord, RunOutcome, RunReport, VerificationOrchestrator, VerificationResult,
};
pub use session::{CommandScript, CommandSession, SettleStrategy};
pub use transport::{
    AuthMethod, Connector, SessionState, SshConnector, SshSession, TelnetConnector, TelnetSession,
    Transport, TransportConfig,
};
pub use web::WebConsole;
