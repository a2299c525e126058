//! Result records produced by a verification run.

use std::time::SystemTime;

use crate::checksum::ChecksumToken;

/// Outcome of one checksum comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerificationResult {
    /// Device-side checksum equals the baseline.
    Match,
    /// Device-side checksum differs from the baseline.
    Mismatch,
    /// No checksum token could be extracted; distinct from both.
    Inconclusive,
    /// No checksum token either, but the `pass_on_missing_checksum`
    /// policy counts the check as passed.
    AssumedPass,
}

impl VerificationResult {
    /// A genuine match passes; so does an assumed pass, by policy.
    pub fn passed(self) -> bool {
        matches!(
            self,
            VerificationResult::Match | VerificationResult::AssumedPass
        )
    }
}

/// When in the iteration a check ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckPhase {
    /// The verify right after upload.
    PreReboot,
    /// The re-verify after the device rebooted.
    PostReboot,
}

/// One device-side checksum check.
#[derive(Debug, Clone)]
pub struct CheckRecord {
    /// Which check this was.
    pub phase: CheckPhase,
    /// The extracted token, if any.
    pub observed: Option<ChecksumToken>,
    /// The comparison outcome.
    pub result: VerificationResult,
}

/// Record of one loop iteration. Immutable once pushed into the report.
#[derive(Debug, Clone)]
pub struct IterationRecord {
    /// 1-based iteration index.
    pub index: u32,
    /// The baseline hash the checks compared against.
    pub before: ChecksumToken,
    /// The checks performed this iteration, in order.
    pub checks: Vec<CheckRecord>,
    /// When the iteration started.
    pub started: SystemTime,
    /// When the iteration finished.
    pub finished: SystemTime,
}

impl IterationRecord {
    /// Worst check outcome of the iteration: a mismatch dominates,
    /// then inconclusive, then assumed pass, then match.
    pub fn result(&self) -> VerificationResult {
        let mut worst = VerificationResult::Match;
        for check in &self.checks {
            match check.result {
                VerificationResult::Mismatch => return VerificationResult::Mismatch,
                VerificationResult::Inconclusive => worst = VerificationResult::Inconclusive,
                VerificationResult::AssumedPass => {
                    if worst == VerificationResult::Match {
                        worst = VerificationResult::AssumedPass;
                    }
                }
                VerificationResult::Match => {}
            }
        }
        worst
    }
}

/// How the run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// All configured iterations executed.
    Completed,
    /// Terminated by the mismatch policy at the given iteration.
    AbortedOnMismatch {
        /// 1-based iteration that tripped the policy.
        iteration: u32,
    },
}

/// Full report of a verification run.
#[derive(Debug, Clone)]
pub struct RunReport {
    /// The local baseline hash computed before the loop.
    pub baseline: ChecksumToken,
    /// One record per executed iteration.
    pub records: Vec<IterationRecord>,
    /// Terminal state of the run.
    pub outcome: RunOutcome,
}

impl RunReport {
    /// Whether the mismatch policy terminated the run.
    pub fn aborted(&self) -> bool {
        matches!(self.outcome, RunOutcome::AbortedOnMismatch { .. })
    }

    /// Whether every check in every iteration passed.
    pub fn all_passed(&self) -> bool {
        !self.aborted() && self.records.iter().all(|r| r.result().passed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token(s: &str) -> ChecksumToken {
        ChecksumToken::parse(s).unwrap()
    }

    fn record(checks: Vec<CheckRecord>) -> IterationRecord {
        IterationRecord {
            index: 1,
            before: token("d41d8cd98f00b204e9800998ecf8427e"),
            checks,
            started: SystemTime::now(),
            finished: SystemTime::now(),
        }
    }

    fn check(result: VerificationResult) -> CheckRecord {
        CheckRecord {
            phase: CheckPhase::PreReboot,
            observed: None,
            result,
        }
    }

    #[test]
    fn test_mismatch_dominates() {
        let rec = record(vec![
            check(VerificationResult::Match),
            check(VerificationResult::Mismatch),
        ]);
        assert_eq!(rec.result(), VerificationResult::Mismatch);
    }

    #[test]
    fn test_inconclusive_beats_match() {
        let rec = record(vec![
            check(VerificationResult::Match),
            check(VerificationResult::Inconclusive),
        ]);
        assert_eq!(rec.result(), VerificationResult::Inconclusive);
        assert!(!rec.result().passed());
    }

    #[test]
    fn test_all_match_passes() {
        let rec = record(vec![check(VerificationResult::Match)]);
        assert!(rec.result().passed());
    }

    #[test]
    fn test_assumed_pass_passes_but_yields_to_inconclusive() {
        let rec = record(vec![check(VerificationResult::AssumedPass)]);
        assert_eq!(rec.result(), VerificationResult::AssumedPass);
        assert!(rec.result().passed());

        let rec = record(vec![
            check(VerificationResult::AssumedPass),
            check(VerificationResult::Inconclusive),
        ]);
        assert_eq!(rec.result(), VerificationResult::Inconclusive);
        assert!(!rec.result().passed());
    }
}
