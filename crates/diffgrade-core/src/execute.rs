//! Differential execution and verification.
//!
//! One side's call runs through [`execute`], which deep-copies the arguments,
//! optionally bounds the call by a wall-clock timeout and records a
//! [`TestOutput`]. Paired outputs are then compared by [`default_verify`] or by
//! a declared verifier through [`custom_verify`].

use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use diffgrade_types::OutcomeSummary;

use crate::invoke::{Capture, Fault, RandomSource, SideContext, Thrown};
use crate::object::{ObjectHandle, ObjectId};
use crate::proxy::{AccessViolation, Scope};
use crate::value::Value;

/// How a call ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Behavior {
    Returned,
    Threw,
    /// No solution was called; only the receiver is available.
    VerifyOnly,
}

impl Behavior {
    pub fn as_str(self) -> &'static str {
        match self {
            Behavior::Returned => "returned",
            Behavior::Threw => "threw",
            Behavior::VerifyOnly => "verify-only",
        }
    }
}

/// The observable outcome of one call on one side.
#[derive(Debug, Clone)]
pub struct TestOutput {
    pub behavior: Behavior,
    /// Receiver after the call, for instance solutions.
    pub receiver: Option<Value>,
    /// Arguments as passed (and possibly mutated) by the call.
    pub args: Vec<Value>,
    /// Returned value; `Unit` when the call threw or returned nothing.
    pub output: Value,
    pub threw: Option<Thrown>,
    pub stdout: String,
    pub stderr: String,
}

impl TestOutput {
    /// Output for a verifier that exercises the receiver directly.
    pub fn verify_only(receiver: Option<Value>) -> Self {
        Self {
            behavior: Behavior::VerifyOnly,
            receiver,
            args: Vec::new(),
            output: Value::Unit,
            threw: None,
            stdout: String::new(),
            stderr: String::new(),
        }
    }

    fn from_result(
        receiver: Option<Value>,
        args: Vec<Value>,
        result: Result<Value, Thrown>,
        capture: Capture,
    ) -> Self {
        let (behavior, output, threw) = match result {
            Ok(value) => (Behavior::Returned, value, None),
            Err(thrown) => (Behavior::Threw, Value::Unit, Some(thrown)),
        };
        Self {
            behavior,
            receiver,
            args,
            output,
            threw,
            stdout: capture.stdout,
            stderr: capture.stderr,
        }
    }

    /// The receiver object, for verifiers.
    pub fn receiver(&self) -> Result<&ObjectHandle, Fault> {
        match &self.receiver {
            Some(value) => value.as_object(),
            None => Err(Fault::engine("outcome has no receiver")),
        }
    }

    pub fn arg(&self, index: usize) -> Result<&Value, Fault> {
        crate::contract::arg(&self.args, index)
    }

    pub fn threw_kind(&self) -> Option<&str> {
        self.threw.as_ref().map(|t| t.kind.as_str())
    }

    /// Wrap submission objects before handing the outcome to hook code.
    pub(crate) fn exposed(self, side: &SideContext) -> Self {
        Self {
            receiver: self.receiver.map(|r| side.expose(r)),
            args: self.args.into_iter().map(|a| side.expose(a)).collect(),
            output: side.expose(self.output),
            ..self
        }
    }

    pub fn summary(&self) -> OutcomeSummary {
        let non_empty = |s: &str| (!s.is_empty()).then(|| s.to_string());
        OutcomeSummary {
            behavior: self.behavior.as_str().to_string(),
            returned: (self.behavior == Behavior::Returned).then(|| self.output.to_string()),
            threw: self.threw.as_ref().map(|t| t.to_string()),
            stdout: non_empty(&self.stdout),
            stderr: non_empty(&self.stderr),
            receiver: self.receiver.as_ref().map(|r| r.to_string()),
        }
    }
}

/// Summary recorded for a side whose call did not finish in time.
pub fn timed_out_summary() -> OutcomeSummary {
    OutcomeSummary {
        behavior: "timed-out".to_string(),
        ..OutcomeSummary::default()
    }
}

/// Why a call produced no outcome.
#[derive(Debug, Clone, PartialEq)]
pub enum CallError {
    TimedOut,
    Engine(String),
}

impl fmt::Display for CallError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallError::TimedOut => f.write_str("timed out"),
            CallError::Engine(msg) => f.write_str(msg),
        }
    }
}

/// A solution call on one side.
pub struct Call {
    pub side: Arc<SideContext>,
    /// Method index in the side's primary type.
    pub method: usize,
    pub receiver: Option<ObjectHandle>,
    pub args: Vec<Value>,
}

/// Run one call, bounded by `timeout` when given.
///
/// Thrown faults and access violations raised by the code under test are
/// outcome data; only engine faults and timeouts are errors.
pub fn execute(call: Call, timeout: Option<Duration>) -> Result<TestOutput, CallError> {
    let Call {
        side,
        method,
        receiver,
        args,
    } = call;
    let receiver = receiver.map(|r| r.unwrapped());
    let passed: Vec<Value> = args.iter().map(Value::deep_copy).collect();

    let run = {
        let side = side.clone();
        let receiver = receiver.clone();
        let passed = passed.clone();
        move |cancel: Arc<AtomicBool>| {
            let def = side.primary().clone();
            match def.method_at(method) {
                Some(m) => side.invoke_root(
                    Scope::Member(def.clone()),
                    receiver,
                    m,
                    &passed,
                    None,
                    cancel,
                ),
                None => (
                    Err(Fault::engine(format!("no method #{method} on {}", def.name()))),
                    Capture::default(),
                ),
            }
        }
    };

    let (result, capture) = match timeout {
        None => run(Arc::new(AtomicBool::new(false))),
        Some(limit) => {
            let cancel = Arc::new(AtomicBool::new(false));
            let (tx, rx) = mpsc::channel();
            let thread_cancel = cancel.clone();
            thread::Builder::new()
                .name("diffgrade-call".to_string())
                .spawn(move || {
                    let _ = tx.send(run(thread_cancel));
                })
                .map_err(|e| CallError::Engine(format!("failed to spawn call thread: {e}")))?;
            match rx.recv_timeout(limit) {
                Ok(out) => out,
                Err(RecvTimeoutError::Timeout) => {
                    cancel.store(true, Ordering::Relaxed);
                    return Err(CallError::TimedOut);
                }
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(CallError::Engine(
                        "call thread exited without a result".to_string(),
                    ))
                }
            }
        }
    };

    let result = match result {
        Ok(value) => Ok(value),
        Err(Fault::Thrown(thrown)) => Err(thrown),
        Err(Fault::Access(violation)) => Err(Thrown {
            kind: "IllegalAccessError".to_string(),
            message: violation.to_string(),
        }),
        Err(Fault::Cancelled) => return Err(CallError::TimedOut),
        Err(Fault::Engine(msg)) => return Err(CallError::Engine(msg)),
    };
    Ok(TestOutput::from_result(
        receiver.map(Value::Object),
        passed,
        result,
        capture,
    ))
}

/// Structural match across sides.
///
/// Floats compare bitwise. Objects match when they are the same object or
/// when their public fields match, regardless of their type names.
pub fn values_match(expected: &Value, actual: &Value) -> bool {
    let mut visiting = HashSet::new();
    match_inner(expected, actual, &mut visiting)
}

fn match_inner(
    expected: &Value,
    actual: &Value,
    visiting: &mut HashSet<(ObjectId, ObjectId)>,
) -> bool {
    match (expected, actual) {
        (Value::Object(a), Value::Object(b)) => {
            if a.same_object(b) {
                return true;
            }
            // Already comparing this pair further up: assume equal.
            if !visiting.insert((a.id(), b.id())) {
                return true;
            }
            let left = a.public_snapshot();
            let right = b.public_snapshot();
            let equal = left.len() == right.len()
                && left.iter().all(|(name, value)| {
                    right
                        .get(name)
                        .is_some_and(|other| match_inner(value, other, visiting))
                });
            visiting.remove(&(a.id(), b.id()));
            equal
        }
        (Value::Array(a), Value::Array(b)) => {
            let (left, right) = (a.to_values(), b.to_values());
            left.len() == right.len()
                && left
                    .iter()
                    .zip(&right)
                    .all(|(x, y)| match_inner(x, y, visiting))
        }
        (Value::Tuple(a), Value::Tuple(b)) => {
            a.len() == b.len() && a.iter().zip(b).all(|(x, y)| match_inner(x, y, visiting))
        }
        (Value::Enum { variant: a, .. }, Value::Enum { variant: b, .. }) => a == b,
        (a, b) => a == b,
    }
}

/// Fail a verifier with an `AssertionError` unless `condition` holds.
pub fn check(condition: bool, message: impl Into<String>) -> Result<(), Fault> {
    if condition {
        Ok(())
    } else {
        Err(Fault::thrown("AssertionError", message))
    }
}

/// Fail a verifier unless the two values match structurally.
pub fn check_match(expected: &Value, actual: &Value) -> Result<(), Fault> {
    check(
        values_match(expected, actual),
        format!("expected {expected} but found {actual}"),
    )
}

/// Default comparison: thrown kind, then returned value, then printed output
/// for printing solutions.
pub fn default_verify(
    reference: &TestOutput,
    submission: &TestOutput,
    prints: bool,
) -> Result<(), String> {
    match (&reference.threw, &submission.threw) {
        (Some(expected), None) => {
            return Err(format!(
                "submission returned {} but the reference threw {}",
                submission.output, expected.kind
            ))
        }
        (None, Some(found)) => {
            return Err(format!(
                "submission threw {found} but the reference returned {}",
                reference.output
            ))
        }
        (Some(expected), Some(found)) if expected.kind != found.kind => {
            return Err(format!(
                "submission threw {} but the reference threw {}",
                found.kind, expected.kind
            ))
        }
        _ => {}
    }
    if !values_match(&reference.output, &submission.output) {
        return Err(format!(
            "submission returned {} but the reference returned {}",
            submission.output, reference.output
        ));
    }
    if prints {
        if reference.stdout != submission.stdout {
            return Err(format!(
                "printed {:?} but the reference printed {:?}",
                submission.stdout, reference.stdout
            ));
        }
        if reference.stderr != submission.stderr {
            return Err(format!(
                "printed {:?} to stderr but the reference printed {:?}",
                submission.stderr, reference.stderr
            ));
        }
    }
    Ok(())
}

/// Why a declared verifier rejected a trial.
#[derive(Debug, Clone, PartialEq)]
pub enum VerifyFailure {
    Mismatch(String),
    Unsafe(AccessViolation),
    Engine(String),
}

/// Run a declared verifier on the reference side.
///
/// The submission outcome is exposed through the submission side's proxy
/// registry first.
pub fn custom_verify(
    reference_side: &Arc<SideContext>,
    submission_side: &SideContext,
    method: usize,
    reference: &TestOutput,
    submission: TestOutput,
    random: Option<&mut RandomSource>,
) -> Result<(), VerifyFailure> {
    let submission = submission.exposed(submission_side);
    match reference_side.run_verifier(method, reference, &submission, random) {
        Ok(()) => Ok(()),
        Err(Fault::Thrown(thrown)) => Err(VerifyFailure::Mismatch(if thrown.message.is_empty() {
            thrown.kind
        } else {
            thrown.message
        })),
        Err(Fault::Access(violation)) => Err(VerifyFailure::Unsafe(violation)),
        Err(Fault::Cancelled) => Err(VerifyFailure::Engine("verifier was cancelled".to_string())),
        Err(Fault::Engine(msg)) => Err(VerifyFailure::Engine(msg)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::{arg, FieldDef, MethodDef, TypeDef};
    use crate::object::Side;
    use crate::value::TypeDescriptor;
    use std::collections::BTreeMap;

    fn pair_def(name: &str) -> Arc<TypeDef> {
        TypeDef::builder(name)
            .field(FieldDef::new("x", TypeDescriptor::Int))
            .field(FieldDef::new("cache", TypeDescriptor::Int).private())
            .method(
                MethodDef::function("add")
                    .param("a", TypeDescriptor::Int)
                    .param("b", TypeDescriptor::Int)
                    .returns(TypeDescriptor::Int)
                    .body(|_, args| {
                        let a = arg(args, 0)?.as_int()?;
                        let b = arg(args, 1)?.as_int()?;
                        a.checked_add(b)
                            .map(Value::Int)
                            .ok_or_else(|| Fault::thrown("ArithmeticException", "overflow"))
                    }),
            )
            .method(MethodDef::function("spin").body(|inv, _| loop {
                inv.checkpoint()?;
                thread::yield_now();
            }))
            .method(
                MethodDef::method("bump")
                    .returns(TypeDescriptor::Int)
                    .body(|inv, _| {
                        let x = inv.field("x")?.as_int()? + 1;
                        inv.set_field("x", Value::Int(x))?;
                        inv.println(&x.to_string());
                        Ok(Value::Int(x))
                    }),
            )
            .build()
    }

    fn object(def: &Arc<TypeDef>, side: Side, x: i32, cache: i32) -> ObjectHandle {
        let mut fields = BTreeMap::new();
        fields.insert("x".to_string(), Value::Int(x));
        fields.insert("cache".to_string(), Value::Int(cache));
        ObjectHandle::new(def.clone(), side, fields)
    }

    fn side(name: &str) -> Arc<SideContext> {
        let def = pair_def(name);
        SideContext::new(Side::Reference, def.clone(), def, &[])
    }

    #[test]
    fn test_execute_records_return_throw_and_output() {
        let ctx = side("Calc");
        let out = execute(
            Call {
                side: ctx.clone(),
                method: 0,
                receiver: None,
                args: vec![Value::Int(2), Value::Int(3)],
            },
            None,
        )
        .unwrap();
        assert_eq!(out.behavior, Behavior::Returned);
        assert_eq!(out.output, Value::Int(5));

        let out = execute(
            Call {
                side: ctx.clone(),
                method: 0,
                receiver: None,
                args: vec![Value::Int(i32::MAX), Value::Int(1)],
            },
            Some(Duration::from_secs(5)),
        )
        .unwrap();
        assert_eq!(out.threw_kind(), Some("ArithmeticException"));
        assert_eq!(out.summary().behavior, "threw");

        let def = ctx.primary().clone();
        let receiver = object(&def, Side::Reference, 1, 0);
        let out = execute(
            Call {
                side: ctx,
                method: 2,
                receiver: Some(receiver.clone()),
                args: Vec::new(),
            },
            None,
        )
        .unwrap();
        assert_eq!(out.stdout, "2\n");
        assert_eq!(receiver.read("x"), Some(Value::Int(2)));
        assert!(out.summary().receiver.unwrap().contains("x=2"));
    }

    #[test]
    fn test_timeout_cancels_cooperative_body() {
        let ctx = side("Calc");
        let result = execute(
            Call {
                side: ctx,
                method: 1,
                receiver: None,
                args: Vec::new(),
            },
            Some(Duration::from_millis(50)),
        );
        assert_eq!(result.unwrap_err(), CallError::TimedOut);
    }

    #[test]
    fn test_values_match_compares_public_state_across_sides() {
        let reference = pair_def("Point");
        let submission = pair_def("StudentPoint");
        let a = Value::Object(object(&reference, Side::Reference, 3, 1));
        let b = Value::Object(object(&submission, Side::Submission, 3, 99));
        let c = Value::Object(object(&submission, Side::Submission, 4, 1));
        assert!(values_match(&a, &b));
        assert!(!values_match(&a, &c));
        assert!(values_match(&Value::Double(f64::NAN), &Value::Double(f64::NAN)));
        assert!(!values_match(&Value::Int(1), &Value::Long(1)));
    }

    #[test]
    fn test_self_referencing_objects_match() {
        let def = TypeDef::builder("Node")
            .field(FieldDef::new("next", TypeDescriptor::named("Node")))
            .build();
        let a = ObjectHandle::new(def.clone(), Side::Reference, BTreeMap::new());
        a.write("next", Value::Object(a.clone()));
        let b = ObjectHandle::new(def, Side::Submission, BTreeMap::new());
        b.write("next", Value::Object(b.clone()));
        assert!(values_match(&Value::Object(a), &Value::Object(b)));
    }

    #[test]
    fn test_default_verify_order_and_symmetry() {
        let returned = |v: i32| TestOutput::from_result(None, Vec::new(), Ok(Value::Int(v)), Capture::default());
        let threw = |kind: &str| {
            TestOutput::from_result(
                None,
                Vec::new(),
                Err(Thrown {
                    kind: kind.to_string(),
                    message: String::new(),
                }),
                Capture::default(),
            )
        };
        assert!(default_verify(&returned(1), &returned(1), false).is_ok());
        let err = default_verify(&returned(5), &returned(-1), false).unwrap_err();
        assert_eq!(err, "submission returned -1 but the reference returned 5");
        assert!(default_verify(&threw("A"), &returned(1), false).is_err());
        assert!(default_verify(&returned(1), &threw("A"), false).is_err());
        assert!(default_verify(&threw("A"), &threw("A"), false).is_ok());
        assert!(default_verify(&threw("A"), &threw("B"), false).is_err());

        let printed = |text: &str| {
            TestOutput::from_result(
                None,
                Vec::new(),
                Ok(Value::Unit),
                Capture {
                    stdout: text.to_string(),
                    stderr: String::new(),
                },
            )
        };
        assert!(default_verify(&printed("hi\n"), &printed("hey\n"), false).is_ok());
        assert!(default_verify(&printed("hi\n"), &printed("hey\n"), true).is_err());
    }
}
