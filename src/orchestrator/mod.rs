//! Verification orchestrator: the upload/verify/cleanup iteration loop.
//!
//! Per iteration the machine runs
//! `Upload -> Verify -> [Reboot -> Verify] -> Cleanup`, with the baseline
//! hash computed once up front. Web upload and delete are best-effort -
//! their failures are logged and the iteration proceeds - while the
//! mismatch policy decides whether a failed comparison terminates the run
//! or merely warns.

mod report;

pub use report::{
    CheckPhase, CheckRecord, IterationRecord, RunOutcome, RunReport, VerificationResult,
};

use std::time::{Duration, SystemTime};

use log::{debug, error, info, warn};

use crate::checksum::{self, ChecksumToken};
use crate::config::{SessionScope, VerifyConfig};
use crate::error::{LogContext, Result};
use crate::session::{CommandScript, CommandSession};
use crate::transport::{Connector, SessionState};
use crate::web::WebConsole;

/// Upper bound on successive reads after the checksum command: output
/// arrives fragmented, so one logical response can take several reads,
/// but the sought token is always in by the third.
const MAX_TOKEN_READS: u32 = 3;

/// Fixed wait after the console wake-up sequence.
const POST_INIT_SETTLE: Duration = Duration::from_secs(3);

/// Settle for each step of the reboot confirmation sequence.
const REBOOT_STEP_SETTLE: Duration = Duration::from_secs(1);

type Session<C> = CommandSession<<C as Connector>::Session>;

/// Drives the verification loop against one device.
///
/// Single-threaded and sequential: one session, one script, one command
/// in flight at a time. The only suspension points are bounded reads and
/// the configured fixed sleeps.
pub struct VerificationOrchestrator<C: Connector, W: WebConsole> {
    config: VerifyConfig,
    connector: C,
    web: W,
}

impl<C: Connector, W: WebConsole> VerificationOrchestrator<C, W> {
    /// Create an orchestrator from its collaborators.
    pub fn new(config: VerifyConfig, connector: C, web: W) -> Self {
        Self {
            config,
            connector,
            web,
        }
    }

    /// Execute the configured number of iterations and report.
    ///
    /// The baseline hash is computed exactly once, before anything is
    /// uploaded; all sessions are closed before this returns, on the
    /// abort path included.
    pub async fn run(mut self) -> Result<RunReport> {
        let boot_file = self.config.boot_file();
        let baseline =
            checksum::content_hash(&boot_file).log_context("Computing baseline hash")?;
        info!("Baseline hash of {}: {baseline}", boot_file.display());

        self.web
            .open_session()
            .await
            .log_context("Opening web session")?;

        let result = self.run_loop(&baseline).await;

        self.web.close_session().await;

        let (records, outcome) = result?;
        Ok(RunReport {
            baseline,
            records,
            outcome,
        })
    }

    async fn run_loop(
        &mut self,
        baseline: &ChecksumToken,
    ) -> Result<(Vec<IterationRecord>, RunOutcome)> {
        // `held` carries the device session across iterations under the
        // run scope; the iteration scope drains it after every check.
        let mut held: Option<Session<C>> = None;

        if self.config.session_scope == SessionScope::Run {
            held = Some(self.open_session().await?);
        }

        let result = self.iterate(baseline, &mut held).await;

        if let Some(mut session) = held.take() {
            session.close().await;
        }
        result
    }

    async fn iterate(
        &mut self,
        baseline: &ChecksumToken,
        held: &mut Option<Session<C>>,
    ) -> Result<(Vec<IterationRecord>, RunOutcome)> {
        let total = self.config.loop_check_count;
        let boot_file = self.config.boot_file();
        let mut records = Vec::with_capacity(total as usize);

        for index in 1..=total {
            info!("Iteration {index} of {total}");
            let started = SystemTime::now();
            let mut checks = Vec::new();

            if let Err(e) = self.web.upload(&boot_file).await {
                warn!("Upload failed, proceeding to verify anyway: {e}");
            }

            let observed = self.verify(held).await;
            let result = self.judge(baseline, observed.as_ref());
            checks.push(CheckRecord {
                phase: CheckPhase::PreReboot,
                observed,
                result,
            });

            let mut tripped = result == VerificationResult::Mismatch
                && self.config.terminate_on_md5_mismatch;

            if !tripped && self.config.reboot_verify {
                self.reboot(held).await;

                let observed = self.verify(held).await;
                let result = self.judge(baseline, observed.as_ref());
                checks.push(CheckRecord {
                    phase: CheckPhase::PostReboot,
                    observed,
                    result,
                });
                tripped = result == VerificationResult::Mismatch
                    && self.config.terminate_on_md5_mismatch;
            }

            if tripped {
                error!("Terminating run: checksum mismatch at iteration {index}");
                records.push(IterationRecord {
                    index,
                    before: baseline.clone(),
                    checks,
                    started,
                    finished: SystemTime::now(),
                });
                return Ok((records, RunOutcome::AbortedOnMismatch { iteration: index }));
            }

            if let Err(e) = self
                .web
                .delete(&self.config.test_file, self.config.original_file.as_deref())
                .await
            {
                warn!("Delete failed, proceeding: {e}");
            }

            records.push(IterationRecord {
                index,
                before: baseline.clone(),
                checks,
                started,
                finished: SystemTime::now(),
            });
            info!("Iteration {index} complete");

            if index < total {
                tokio::time::sleep(self.config.iteration_pause()).await;
            }
        }

        Ok((records, RunOutcome::Completed))
    }

    /// Run the device-side verification and extract the checksum token.
    ///
    /// Session faults are absorbed here: the broken session is closed and
    /// dropped, the check reports no token, and the next check connects
    /// fresh.
    async fn verify(&mut self, held: &mut Option<Session<C>>) -> Option<ChecksumToken> {
        if !matches!(held, Some(s) if s.state() == SessionState::Open) {
            match self.open_session().await {
                Ok(session) => *held = Some(session),
                Err(_) => return None,
            }
        }
        let Some(session) = held else { return None };

        let observed = match self.verify_on(session).await {
            Ok(observed) => observed,
            Err(_) => {
                // already logged; the session is suspect either way
                if let Some(mut session) = held.take() {
                    session.close().await;
                }
                None
            }
        };

        if self.config.session_scope == SessionScope::Iteration {
            if let Some(mut session) = held.take() {
                session.close().await;
            }
        }
        observed
    }

    async fn verify_on(&mut self, session: &mut Session<C>) -> Result<Option<ChecksumToken>> {
        let read_timeout = self.config.read_timeout();
        let test_file = self.config.test_file.clone();

        session
            .run_script(&self.device_script())
            .await
            .log_context("Running device script")?;

        let listing = session.read_until(&test_file, read_timeout).await?;
        if listing.is_empty() {
            warn!("{test_file} not seen in directory listing");
        } else if self.config.detail_print {
            debug!("Device listing: {listing}");
        }

        session
            .run_script(&self.checksum_script())
            .await
            .log_context("Running checksum command")?;

        let mut collected = String::new();
        for attempt in 1..=MAX_TOKEN_READS {
            let buf = session.read_until(&test_file, read_timeout).await?;
            if self.config.detail_print {
                debug!("Device response {attempt}: {buf}");
            }
            collected.push_str(&buf);
            if let Some(token) = checksum::extract(&collected) {
                return Ok(Some(token));
            }
        }
        Ok(None)
    }

    /// Compare an observed token against the baseline and log the verdict.
    fn judge(
        &self,
        baseline: &ChecksumToken,
        observed: Option<&ChecksumToken>,
    ) -> VerificationResult {
        match observed {
            Some(token) if token == baseline => {
                info!("Checksum matches baseline: {baseline}");
                VerificationResult::Match
            }
            Some(token) => {
                error!(
                    "Checksum mismatch for {}!\n  before upload: {baseline}\n  after upload:  {token}",
                    self.config.test_file
                );
                VerificationResult::Mismatch
            }
            None if self.config.pass_on_missing_checksum => {
                warn!("No checksum extracted; counting as passed per pass_on_missing_checksum");
                VerificationResult::AssumedPass
            }
            None => {
                error!("No checksum extracted; verification is inconclusive, not passing");
                VerificationResult::Inconclusive
            }
        }
    }

    /// Reboot the device over a fresh session and wait the fixed delay.
    ///
    /// Any session held before the reboot is dead afterwards, so it is
    /// closed and dropped up front.
    async fn reboot(&mut self, held: &mut Option<Session<C>>) {
        if let Some(mut session) = held.take() {
            session.close().await;
        }

        info!("Rebooting device");
        match self.open_session().await {
            Ok(mut session) => {
                let script = CommandScript::new()
                    .with_default_settle(REBOOT_STEP_SETTLE)
                    .step("reboot")
                    .step("Y")
                    .step("Y");
                if let Err(e) = session.run_script(&script).await {
                    warn!("Reboot command sequence failed: {e}");
                }
                session.close().await;
            }
            Err(e) => warn!("Could not open session for reboot: {e}"),
        }

        let wait = self.config.reboot_wait();
        info!("Waiting {wait:?} for device to come back");
        tokio::time::sleep(wait).await;
    }

    async fn open_session(&self) -> Result<Session<C>> {
        let transport = self
            .connector
            .connect()
            .await
            .log_context("Connecting to device console")?;
        let settle = self.config.settle_strategy()?;
        Ok(CommandSession::with_settle(transport, settle))
    }

    /// Wake-up and navigation script: init commands, a blank line to let
    /// the console settle, mount, cd, ls.
    fn device_script(&self) -> CommandScript {
        let mut script = CommandScript::new().with_default_settle(self.config.settle_delay());
        for cmd in &self.config.init_commands {
            script = script.step(cmd);
        }
        let dir = &self.config.mount_dir;
        script
            .step_with_settle("", POST_INIT_SETTLE)
            .step(format!("mount {dir}"))
            .step(format!("cd {dir}"))
            .step("ls")
    }

    /// The checksum command, settled for as long as a read would wait:
    /// hashing a full image takes the device a while.
    fn checksum_script(&self) -> CommandScript {
        CommandScript::new().step_with_settle(
            format!("md5sum {}", self.config.test_file),
            self.config.read_timeout(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::WebError;
    use crate::session::testing::MockTransport;
    use crate::transport::Connector;
    use std::collections::VecDeque;
    use std::path::Path;
    use std::sync::{Arc, Mutex};

    const EMPTY_MD5: &str = "d41d8cd98f00b204e9800998ecf8427e";
    const OTHER_MD5: &str = "0123456789abcdef0123456789abcdef";

    /// Connector that hands out scripted transports; `None` simulates a
    /// connect failure.
    struct ScriptedConnector {
        sessions: Mutex<VecDeque<Option<Vec<String>>>>,
        connects: Arc<Mutex<u32>>,
    }

    impl ScriptedConnector {
        fn new(sessions: Vec<Option<Vec<String>>>) -> Self {
            Self {
                sessions: Mutex::new(sessions.into()),
                connects: Arc::new(Mutex::new(0)),
            }
        }

        fn connect_counter(&self) -> Arc<Mutex<u32>> {
            self.connects.clone()
        }
    }

    impl Connector for ScriptedConnector {
        type Session = MockTransport;

        async fn connect(&self) -> Result<MockTransport> {
            *self.connects.lock().unwrap() += 1;
            match self.sessions.lock().unwrap().pop_front() {
                Some(Some(responses)) => {
                    let mut transport = MockTransport::open();
                    for r in responses {
                        transport.push_response(r);
                    }
                    Ok(transport)
                }
                Some(None) => Err(crate::error::TransportError::Disconnected.into()),
                // exhausted scripts behave like a silent console
                None => Ok(MockTransport::open()),
            }
        }
    }

    #[derive(Default)]
    struct WebLog {
        uploads: u32,
        deletes: Vec<(String, Option<String>)>,
        closed: u32,
    }

    /// Web console double recording calls.
    struct MockWeb {
        log: Arc<Mutex<WebLog>>,
        fail_upload: bool,
    }

    impl MockWeb {
        fn new() -> (Self, Arc<Mutex<WebLog>>) {
            let log = Arc::new(Mutex::new(WebLog::default()));
            (
                Self {
                    log: log.clone(),
                    fail_upload: false,
                },
                log,
            )
        }

        fn failing_upload(mut self) -> Self {
            self.fail_upload = true;
            self
        }
    }

    impl WebConsole for MockWeb {
        async fn open_session(&mut self) -> std::result::Result<(), WebError> {
            Ok(())
        }

        async fn upload(&mut self, _file_path: &Path) -> std::result::Result<(), WebError> {
            self.log.lock().unwrap().uploads += 1;
            if self.fail_upload {
                return Err(WebError::Upload {
                    message: "dialog dismissed".into(),
                });
            }
            Ok(())
        }

        async fn delete(
            &mut self,
            file_name: &str,
            next_boot_file: Option<&str>,
        ) -> std::result::Result<(), WebError> {
            self.log
                .lock()
                .unwrap()
                .deletes
                .push((file_name.into(), next_boot_file.map(String::from)));
            Ok(())
        }

        async fn close_session(&mut self) {
            self.log.lock().unwrap().closed += 1;
        }
    }

    /// Config pointing `test_file` at an empty temp file (baseline is the
    /// empty-file MD5), with timing cranked down for tests.
    fn test_config(boot_file: &Path) -> VerifyConfig {
        serde_json::from_value(serde_json::json!({
            "server_ip": "192.0.2.1",
            "user_name": "admin",
            "user_pwd": "secret",
            "test_file": boot_file.to_str().unwrap(),
            "read_timeout_secs": 1,
            "settle_delay_ms": 1,
            "iteration_pause_secs": 0,
            "reboot_wait_secs": 0,
        }))
        .unwrap()
    }

    fn boot_file() -> tempfile::NamedTempFile {
        tempfile::NamedTempFile::new().unwrap()
    }

    /// Responses one verify consumes: listing read, then checksum reads.
    fn verify_responses(md5: &str) -> Vec<String> {
        let file = "test.bin";
        vec![
            format!("{file}  factory.bin\n"),
            format!("md5sum {file}\r\n"),
            format!("{md5}  {file}\r\n"),
        ]
    }

    #[tokio::test(start_paused = true)]
    async fn test_end_to_end_match() {
        let file = boot_file();
        let config = test_config(file.path());
        let connector = ScriptedConnector::new(vec![Some(verify_responses(EMPTY_MD5))]);
        let (web, log) = MockWeb::new();

        let report = VerificationOrchestrator::new(config, connector, web)
            .run()
            .await
            .unwrap();

        assert_eq!(report.baseline.as_str(), EMPTY_MD5);
        assert_eq!(report.records.len(), 1);
        assert_eq!(report.records[0].result(), VerificationResult::Match);
        assert_eq!(report.outcome, RunOutcome::Completed);
        assert!(report.all_passed());

        let log = log.lock().unwrap();
        assert_eq!(log.uploads, 1);
        assert_eq!(log.deletes.len(), 1);
        assert_eq!(log.closed, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_mismatch_with_terminate_policy_stops_after_first_iteration() {
        let file = boot_file();
        let mut config = test_config(file.path());
        config.terminate_on_md5_mismatch = true;
        config.loop_check_count = 3;

        // run scope: one session carries all reads
        let mut responses = verify_responses(OTHER_MD5);
        responses.extend(verify_responses(OTHER_MD5));
        let connector = ScriptedConnector::new(vec![Some(responses)]);
        let (web, log) = MockWeb::new();

        let report = VerificationOrchestrator::new(config, connector, web)
            .run()
            .await
            .unwrap();

        assert_eq!(report.records.len(), 1);
        assert_eq!(report.outcome, RunOutcome::AbortedOnMismatch { iteration: 1 });
        assert!(report.aborted());

        let log = log.lock().unwrap();
        // no second upload, and the aborted iteration skips cleanup
        assert_eq!(log.uploads, 1);
        assert!(log.deletes.is_empty());
        assert_eq!(log.closed, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_mismatch_without_terminate_policy_continues() {
        let file = boot_file();
        let mut config = test_config(file.path());
        config.loop_check_count = 2;

        let mut responses = verify_responses(OTHER_MD5);
        responses.extend(verify_responses(EMPTY_MD5));
        let connector = ScriptedConnector::new(vec![Some(responses)]);
        let (web, log) = MockWeb::new();

        let report = VerificationOrchestrator::new(config, connector, web)
            .run()
            .await
            .unwrap();

        assert_eq!(report.records.len(), 2);
        assert_eq!(report.records[0].result(), VerificationResult::Mismatch);
        assert_eq!(report.records[1].result(), VerificationResult::Match);
        assert_eq!(report.outcome, RunOutcome::Completed);
        assert_eq!(log.lock().unwrap().uploads, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_token_is_inconclusive_not_passing() {
        let file = boot_file();
        let config = test_config(file.path());

        // no checksum anywhere in the responses
        let connector = ScriptedConnector::new(vec![Some(vec![
            "test.bin\n".into(),
            "md5sum: test.bin busy\r\n".into(),
        ])]);
        let (web, _log) = MockWeb::new();

        let report = VerificationOrchestrator::new(config, connector, web)
            .run()
            .await
            .unwrap();

        assert_eq!(report.records[0].result(), VerificationResult::Inconclusive);
        assert_eq!(report.outcome, RunOutcome::Completed);
        assert!(!report.all_passed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_compat_flag_counts_missing_token_as_passed() {
        // identical tokenless device output, flag off then on
        let responses = || Some(vec!["test.bin\n".into(), "md5sum: test.bin busy\r\n".into()]);

        let file = boot_file();
        let strict = test_config(file.path());
        let (web, _log) = MockWeb::new();
        let strict_report =
            VerificationOrchestrator::new(strict, ScriptedConnector::new(vec![responses()]), web)
                .run()
                .await
                .unwrap();

        let mut legacy = test_config(file.path());
        legacy.pass_on_missing_checksum = true;
        let (web, log) = MockWeb::new();
        let legacy_report =
            VerificationOrchestrator::new(legacy, ScriptedConnector::new(vec![responses()]), web)
                .run()
                .await
                .unwrap();

        assert_eq!(
            strict_report.records[0].result(),
            VerificationResult::Inconclusive
        );
        assert!(!strict_report.all_passed());

        // the flag changes the verdict, not the record: no token was observed
        assert_eq!(
            legacy_report.records[0].result(),
            VerificationResult::AssumedPass
        );
        assert!(legacy_report.records[0].checks[0].observed.is_none());
        assert!(legacy_report.all_passed());
        assert_eq!(log.lock().unwrap().deletes.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_upload_failure_is_best_effort() {
        let file = boot_file();
        let config = test_config(file.path());
        let connector = ScriptedConnector::new(vec![Some(verify_responses(EMPTY_MD5))]);
        let (web, log) = MockWeb::new();

        let report = VerificationOrchestrator::new(config, connector, web.failing_upload())
            .run()
            .await
            .unwrap();

        // verification still ran and matched
        assert_eq!(report.records[0].result(), VerificationResult::Match);
        assert_eq!(log.lock().unwrap().uploads, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_iteration_scope_retries_after_connect_failure() {
        let file = boot_file();
        let mut config = test_config(file.path());
        config.session_scope = SessionScope::Iteration;
        config.loop_check_count = 2;

        let connector = ScriptedConnector::new(vec![
            None, // first iteration: console unreachable
            Some(verify_responses(EMPTY_MD5)),
        ]);
        let (web, _log) = MockWeb::new();

        let report = VerificationOrchestrator::new(config, connector, web)
            .run()
            .await
            .unwrap();

        assert_eq!(report.records.len(), 2);
        assert_eq!(report.records[0].result(), VerificationResult::Inconclusive);
        assert_eq!(report.records[1].result(), VerificationResult::Match);
        assert_eq!(report.outcome, RunOutcome::Completed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_scope_connect_failure_aborts() {
        let file = boot_file();
        let config = test_config(file.path());
        let connector = ScriptedConnector::new(vec![None]);
        let (web, log) = MockWeb::new();

        let err = VerificationOrchestrator::new(config, connector, web)
            .run()
            .await
            .unwrap_err();
        assert!(matches!(err, crate::error::Error::Transport(_)));
        // web session still torn down on the abort path
        assert_eq!(log.lock().unwrap().closed, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reboot_verify_runs_two_checks() {
        let file = boot_file();
        let mut config = test_config(file.path());
        config.reboot_verify = true;

        let connector = ScriptedConnector::new(vec![
            Some(verify_responses(EMPTY_MD5)), // run-scope session, pre-reboot verify
            Some(vec![]),                      // reboot command session
            Some(verify_responses(EMPTY_MD5)), // fresh session, post-reboot verify
        ]);
        let (web, _log) = MockWeb::new();

        let orchestrator = VerificationOrchestrator::new(config, connector, web);
        let report = orchestrator.run().await.unwrap();

        let checks = &report.records[0].checks;
        assert_eq!(checks.len(), 2);
        assert_eq!(checks[0].phase, CheckPhase::PreReboot);
        assert_eq!(checks[1].phase, CheckPhase::PostReboot);
        assert!(report.all_passed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_scope_reuses_one_session() {
        let file = boot_file();
        let mut config = test_config(file.path());
        config.loop_check_count = 2;

        let mut responses = verify_responses(EMPTY_MD5);
        responses.extend(verify_responses(EMPTY_MD5));
        let connector = ScriptedConnector::new(vec![Some(responses)]);
        let connects = connector.connect_counter();
        let (web, _log) = MockWeb::new();

        let orchestrator = VerificationOrchestrator::new(config, connector, web);
        let report = orchestrator.run().await.unwrap();

        assert_eq!(report.records.len(), 2);
        assert!(report.all_passed());
        assert_eq!(*connects.lock().unwrap(), 1);
    }
}
