//! Run-level errors.
//!
//! Per-trial failures (mismatches, timeouts, unsafe hooks) are report data, not
//! errors. An `EngineError` ends a run or prevents a question from loading.

use std::fmt;

use diffgrade_types::Verdict;

use crate::roles::RoleViolation;

#[derive(Debug, Clone, PartialEq)]
pub enum EngineError {
    /// The reference type's roles are malformed, or its self-check failed.
    LoadValidation(Vec<RoleViolation>),
    /// No generator can produce a value for a required slot.
    MissingGenerator { slot: String, reason: String },
    /// The submission does not provide the solution member.
    SubmissionMismatch { solution: String, reason: String },
    /// The precondition rejected too many generated cases.
    PreconditionExhausted { solution: String, discarded: u32 },
    /// The engine's own machinery failed.
    Engine(String),
}

impl EngineError {
    /// Verdict recorded when this error ends a run.
    pub fn verdict(&self) -> Verdict {
        match self {
            EngineError::LoadValidation(_)
            | EngineError::MissingGenerator { .. }
            | EngineError::SubmissionMismatch { .. } => Verdict::LoadValidationError,
            EngineError::PreconditionExhausted { .. } => Verdict::PreconditionExhausted,
            EngineError::Engine(_) => Verdict::EngineError,
        }
    }

    pub(crate) fn engine(message: impl Into<String>) -> Self {
        EngineError::Engine(message.into())
    }
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::LoadValidation(violations) => {
                write!(f, "{} role violation(s)", violations.len())?;
                for v in violations {
                    write!(f, "\n  {v}")?;
                }
                Ok(())
            }
            EngineError::MissingGenerator { slot, reason } => {
                write!(f, "cannot generate {slot}: {reason}")
            }
            EngineError::SubmissionMismatch { solution, reason } => {
                write!(f, "submission does not match solution \"{solution}\": {reason}")
            }
            EngineError::PreconditionExhausted {
                solution,
                discarded,
            } => write!(
                f,
                "precondition for \"{solution}\" rejected {discarded} generated cases"
            ),
            EngineError::Engine(msg) => write!(f, "engine error: {msg}"),
        }
    }
}

impl std::error::Error for EngineError {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::roles::RoleKind;

    #[test]
    fn test_display_lists_every_violation() {
        let err = EngineError::LoadValidation(vec![
            RoleViolation::new("gen", RoleKind::Generator, "must be static"),
            RoleViolation::new("check", RoleKind::Verify, "must return void"),
        ]);
        let text = err.to_string();
        assert!(text.starts_with("2 role violation(s)"));
        assert!(text.contains("@Generator gen: must be static"));
        assert!(text.contains("@Verify check: must return void"));
        assert_eq!(err.verdict(), Verdict::LoadValidationError);
    }
}
