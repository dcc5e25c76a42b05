//! Report types for differential test runs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::ResolvedArguments;

/// Per-trial verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Verdict {
    Passed,
    VerificationFailed,
    TimedOut,
    UnsafeGenerator,
    PreconditionExhausted,
    LoadValidationError,
    EngineError,
}

impl Verdict {
    pub fn as_str(self) -> &'static str {
        match self {
            Verdict::Passed => "passed",
            Verdict::VerificationFailed => "verification-failed",
            Verdict::TimedOut => "timed-out",
            Verdict::UnsafeGenerator => "unsafe-generator",
            Verdict::PreconditionExhausted => "precondition-exhausted",
            Verdict::LoadValidationError => "load-validation-error",
            Verdict::EngineError => "engine-error",
        }
    }

    /// Whether this verdict ends a run on its own.
    pub fn is_fatal(self) -> bool {
        matches!(
            self,
            Verdict::PreconditionExhausted | Verdict::LoadValidationError | Verdict::EngineError
        )
    }
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where the values of a trial came from.
///
/// Variants are listed in the order their blocks run; regression trials are
/// interleaved with the blocks that follow the injected cases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TrialKind {
    /// Declared (or default) edge cases.
    Edge,
    /// Declared (or default) simple cases.
    Simple,
    /// Each argument drawn from the edge or the simple cases of its type.
    EdgeSimpleMixed,
    /// Randomly generated at the scheduled complexity.
    Generated,
    /// Each argument drawn from edge cases, simple cases or a generator.
    GeneratedMixed,
    /// An earlier receiver revisited with fresh low-complexity arguments.
    Regression,
}

impl TrialKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TrialKind::Edge => "edge",
            TrialKind::Simple => "simple",
            TrialKind::EdgeSimpleMixed => "edge-simple-mixed",
            TrialKind::Generated => "generated",
            TrialKind::GeneratedMixed => "generated-mixed",
            TrialKind::Regression => "regression",
        }
    }

    /// Edge and simple trials replay literal cases rather than generating.
    pub fn is_injected(self) -> bool {
        matches!(self, TrialKind::Edge | TrialKind::Simple)
    }
}

impl std::fmt::Display for TrialKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What one side did during a trial, rendered for humans.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OutcomeSummary {
    /// "returned", "threw", "verify-only" or "timed-out".
    pub behavior: String,
    /// Returned value, when the call returned normally.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub returned: Option<String>,
    /// Thrown kind and message, when the call threw.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threw: Option<String>,
    /// Captured standard output, when non-empty.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stdout: Option<String>,
    /// Captured standard error, when non-empty.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stderr: Option<String>,
    /// Receiver state after the call, when the receiver is relevant.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receiver: Option<String>,
}

/// One trial of a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrialRecord {
    /// Position in the run, starting at 0.
    pub index: u32,
    /// Block the trial belongs to.
    pub kind: TrialKind,
    /// Complexity its generated values were drawn at.
    pub complexity: u32,
    /// Outcome of comparing both sides.
    pub verdict: Verdict,
    /// Receiver before the call (human-readable).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receiver: Option<String>,
    /// Synthesized arguments (human-readable).
    pub arguments: Vec<String>,
    /// What the reference did; absent when the trial never reached the call.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<OutcomeSummary>,
    /// What the submission did.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub submission: Option<OutcomeSummary>,
    /// Failure explanation for any verdict other than `passed`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl TrialRecord {
    /// A record that carries only a fatal verdict and its message.
    pub fn terminal(index: u32, verdict: Verdict, message: impl Into<String>) -> Self {
        Self {
            index,
            kind: TrialKind::Generated,
            complexity: 0,
            verdict,
            receiver: None,
            arguments: Vec::new(),
            reference: None,
            submission: None,
            message: Some(message.into()),
        }
    }

    pub fn passed(&self) -> bool {
        self.verdict == Verdict::Passed
    }
}

/// Complete report from a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    /// Unique id of this run.
    pub run_id: Uuid,
    /// Reference type name.
    pub reference: String,
    /// Submission type name.
    pub submission: String,
    /// Solution under test.
    pub solution: String,
    /// Seed used for every random stream of the run.
    pub seed: u64,
    /// Arguments after merging the configuration, the declared ones and the defaults.
    pub arguments: ResolvedArguments,
    /// Wall-clock start of the run.
    pub started_at: DateTime<Utc>,
    /// Elapsed time in milliseconds.
    pub elapsed_ms: u64,
    /// Ordered per-trial outcomes.
    pub trials: Vec<TrialRecord>,
    /// Generated cases rejected by the precondition.
    pub discarded: u32,
    /// Set when the run was terminated by a fatal error.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fatal: Option<String>,
    /// SHA-256 (hex) over the synthesized receiver and argument sequence.
    pub case_digest: String,
}

impl RunReport {
    pub fn new(
        reference: impl Into<String>,
        submission: impl Into<String>,
        solution: impl Into<String>,
        seed: u64,
    ) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            reference: reference.into(),
            submission: submission.into(),
            solution: solution.into(),
            seed,
            arguments: ResolvedArguments::default(),
            started_at: Utc::now(),
            elapsed_ms: 0,
            trials: Vec::new(),
            discarded: 0,
            fatal: None,
            case_digest: String::new(),
        }
    }

    /// Terminate the report with a fatal verdict.
    pub fn push_fatal(&mut self, verdict: Verdict, message: impl Into<String>) {
        let message = message.into();
        let index = self.trials.len() as u32;
        self.trials
            .push(TrialRecord::terminal(index, verdict, message.clone()));
        self.fatal = Some(message);
    }

    pub fn count(&self, verdict: Verdict) -> usize {
        self.trials.iter().filter(|t| t.verdict == verdict).count()
    }

    /// Trials of one block, fatal records excluded.
    pub fn count_kind(&self, kind: TrialKind) -> usize {
        self.trials
            .iter()
            .filter(|t| t.kind == kind && !t.verdict.is_fatal())
            .count()
    }

    /// True when at least one trial ran and every trial passed.
    pub fn all_passed(&self) -> bool {
        self.fatal.is_none() && !self.trials.is_empty() && self.trials.iter().all(|t| t.passed())
    }

    pub fn failures(&self) -> impl Iterator<Item = &TrialRecord> {
        self.trials.iter().filter(|t| !t.passed())
    }

    /// The sequence of verdicts, in trial order.
    pub fn verdicts(&self) -> Vec<Verdict> {
        self.trials.iter().map(|t| t.verdict).collect()
    }

    /// One-line summary for terminal output.
    pub fn summary(&self) -> String {
        let passed = self.count(Verdict::Passed);
        let total = self.trials.len();
        match &self.fatal {
            Some(fatal) => format!(
                "{} vs {} [{}]: aborted after {}/{} passing trials: {}",
                self.reference, self.submission, self.solution, passed, total, fatal
            ),
            None => format!(
                "{} vs {} [{}]: {}/{} trials passed ({} discarded, seed {})",
                self.reference, self.submission, self.solution, passed, total, self.discarded, self.seed
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verdict_serializes_kebab_case() {
        let json = serde_json::to_string(&Verdict::VerificationFailed).unwrap();
        assert_eq!(json, "\"verification-failed\"");
        let back: Verdict = serde_json::from_str("\"unsafe-generator\"").unwrap();
        assert_eq!(back, Verdict::UnsafeGenerator);
        assert_eq!(Verdict::TimedOut.to_string(), "timed-out");
    }

    #[test]
    fn test_trial_kind_names_match_serde() {
        for kind in [
            TrialKind::Edge,
            TrialKind::Simple,
            TrialKind::EdgeSimpleMixed,
            TrialKind::Generated,
            TrialKind::GeneratedMixed,
            TrialKind::Regression,
        ] {
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{kind}\""));
        }
        assert!(TrialKind::Simple.is_injected());
        assert!(!TrialKind::EdgeSimpleMixed.is_injected());
    }

    #[test]
    fn test_push_fatal_terminates_report() {
        let mut report = RunReport::new("Ref", "Sub", "add", 1);
        report.trials.push(TrialRecord {
            verdict: Verdict::Passed,
            ..TrialRecord::terminal(0, Verdict::Passed, "")
        });
        report.push_fatal(Verdict::PreconditionExhausted, "too many discards");
        assert_eq!(report.trials.len(), 2);
        assert_eq!(report.trials[1].index, 1);
        assert!(!report.all_passed());
        assert_eq!(report.fatal.as_deref(), Some("too many discards"));
        assert!(report.summary().contains("aborted"));
    }

    #[test]
    fn test_empty_report_is_not_a_pass() {
        let report = RunReport::new("Ref", "Sub", "add", 1);
        assert!(!report.all_passed());
    }

    #[test]
    fn test_report_json_roundtrip_keeps_trials() {
        let mut report = RunReport::new("Ref", "Sub", "add", 42);
        report.trials.push(TrialRecord {
            index: 0,
            kind: TrialKind::Edge,
            complexity: 0,
            verdict: Verdict::Passed,
            receiver: None,
            arguments: vec!["0".into(), "0".into()],
            reference: Some(OutcomeSummary {
                behavior: "returned".into(),
                returned: Some("0".into()),
                ..Default::default()
            }),
            submission: None,
            message: None,
        });
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["trials"][0]["kind"], "edge");
        assert_eq!(json["trials"][0]["verdict"], "passed");
        let back: RunReport = serde_json::from_value(json).unwrap();
        assert_eq!(back.trials[0].arguments, vec!["0", "0"]);
        assert_eq!(back.seed, 42);
    }
}
