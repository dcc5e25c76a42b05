//! Integration tests for diffgrade-core.
//!
//! These tests drive whole runs through the public API: load a reference,
//! run a submission against it and inspect the report.

use std::sync::Arc;

use rand::Rng;

use diffgrade_core::{
    arg, check, check_match, run_batch, run_tests, ArrayValue, EngineError, Fault, FieldDef,
    LoadOptions, MethodDef, Question, Role, RunArguments, RunConfig, RunReport, SeedPolicy,
    TrialKind, TypeDef, TypeDescriptor, Value, Verdict,
};

// =============================================================================
// Question fixtures
// =============================================================================

fn adder(name: &str, op: fn(i32, i32) -> i32) -> Arc<TypeDef> {
    TypeDef::builder(name)
        .method(
            MethodDef::function("add")
                .param("a", TypeDescriptor::Int)
                .param("b", TypeDescriptor::Int)
                .returns(TypeDescriptor::Int)
                .role(Role::solution("add"))
                .body(move |_, args| {
                    let a = arg(args, 0)?.as_int()?;
                    let b = arg(args, 1)?.as_int()?;
                    Ok(Value::Int(op(a, b)))
                }),
        )
        .build()
}

fn add(a: i32, b: i32) -> i32 {
    a.wrapping_add(b)
}

fn subtract(a: i32, b: i32) -> i32 {
    a.wrapping_sub(b)
}

/// A counter advanced by `@Next`. `step` is how far `increment` moves it;
/// `peek` makes the lifecycle hook read the private count directly.
fn counter(name: &str, step: i32, peek: bool) -> Arc<TypeDef> {
    TypeDef::builder(name)
        .field(FieldDef::new("count", TypeDescriptor::Int).private())
        .method(MethodDef::method("increment").body(move |inv, _| {
            let count = inv.field("count")?.as_int()?;
            inv.set_field("count", Value::Int(count + step))?;
            Ok(Value::Unit)
        }))
        .method(
            MethodDef::method("value")
                .returns(TypeDescriptor::Int)
                .role(Role::solution("value"))
                .body(|inv, _| inv.field("count")),
        )
        .method(
            MethodDef::function("next")
                .param("current", TypeDescriptor::named(name))
                .param("iteration", TypeDescriptor::Int)
                .param("random", TypeDescriptor::RandomSource)
                .returns(TypeDescriptor::named(name))
                .role(Role::Next)
                .body(move |inv, args| {
                    let Value::Object(current) = arg(args, 0)? else {
                        return Ok(Value::Object(inv.construct("Counter", &[])?));
                    };
                    let current = current.clone();
                    if peek {
                        inv.get(&current, "count")?;
                    }
                    inv.call(&current, "increment", &[])?;
                    Ok(Value::Object(current))
                }),
        )
        .build()
}

fn echo(name: &str, spin: bool) -> Arc<TypeDef> {
    TypeDef::builder(name)
        .method(
            MethodDef::function("echo")
                .param("n", TypeDescriptor::Int)
                .returns(TypeDescriptor::Int)
                .role(Role::solution("echo"))
                .role(Role::timeout(50))
                .body(move |inv, args| {
                    if spin {
                        loop {
                            inv.checkpoint()?;
                            std::thread::yield_now();
                        }
                    }
                    Ok(arg(args, 0)?.clone())
                }),
        )
        .build()
}

fn span(name: &str, op: fn(i32, i32) -> i32) -> Arc<TypeDef> {
    TypeDef::builder(name)
        .method(
            MethodDef::function("span")
                .param("lo", TypeDescriptor::Int)
                .param("hi", TypeDescriptor::Int)
                .returns(TypeDescriptor::Int)
                .role(Role::solution("span"))
                .body(move |_, args| {
                    let lo = arg(args, 0)?.as_int()?;
                    let hi = arg(args, 1)?.as_int()?;
                    Ok(Value::Int(op(hi, lo)))
                }),
        )
        .method(
            MethodDef::function("intervals")
                .param("complexity", TypeDescriptor::Int)
                .param("random", TypeDescriptor::RandomSource)
                .returns(TypeDescriptor::Tuple(vec![
                    TypeDescriptor::Int,
                    TypeDescriptor::Int,
                ]))
                .role(Role::grouped_generator("span"))
                .body(|inv, args| {
                    let c = arg(args, 0)?.as_int()?.max(0);
                    let random = inv.random()?;
                    let lo = random.gen_range(-c..=c);
                    let hi = lo + random.gen_range(0..=c);
                    Ok(Value::Tuple(vec![Value::Int(lo), Value::Int(hi)]))
                }),
        )
        .build()
}

fn greeter(name: &str, separator: &'static str) -> Arc<TypeDef> {
    TypeDef::builder(name)
        .method(
            MethodDef::function("greet")
                .param("name", TypeDescriptor::Str)
                .role(Role::printing_solution("greet"))
                .body(move |inv, args| {
                    let who = arg(args, 0)?.as_str()?.to_string();
                    inv.println(&format!("Hello{separator} {who}!"));
                    Ok(Value::Unit)
                }),
        )
        .build()
}

fn halver(name: &str, error: f64) -> Arc<TypeDef> {
    TypeDef::builder(name)
        .method(
            MethodDef::function("half")
                .param("x", TypeDescriptor::Double)
                .returns(TypeDescriptor::Double)
                .role(Role::solution("half"))
                .body(move |_, args| Ok(Value::Double(arg(args, 0)?.as_double()? / 2.0 + error))),
        )
        .method(
            MethodDef::function("close_enough")
                .param("expected", TypeDescriptor::Outcome)
                .param("actual", TypeDescriptor::Outcome)
                .role(Role::verify("half"))
                .verifier(|_, expected, actual| {
                    let a = expected.output.as_double()?;
                    let b = actual.output.as_double()?;
                    check((a - b).abs() <= 1e-6, format!("expected {a}, got {b}"))
                }),
        )
        .build()
}

fn tally(name: &str, factor: i32) -> Arc<TypeDef> {
    TypeDef::builder(name)
        .field(FieldDef::new("total", TypeDescriptor::Int))
        .method(
            MethodDef::method("deposit")
                .param("amount", TypeDescriptor::Int)
                .body(move |inv, args| {
                    let total = inv.field("total")?.as_int()?;
                    let amount = arg(args, 0)?.as_int()?;
                    inv.set_field("total", Value::Int(total + amount * factor))?;
                    Ok(Value::Unit)
                }),
        )
        .method(
            MethodDef::function("next")
                .param("current", TypeDescriptor::named(name))
                .param("iteration", TypeDescriptor::Int)
                .param("random", TypeDescriptor::RandomSource)
                .returns(TypeDescriptor::named(name))
                .role(Role::Next)
                .body(|inv, args| {
                    let Value::Object(current) = arg(args, 0)? else {
                        return Ok(Value::Object(inv.construct("Tally", &[])?));
                    };
                    let current = current.clone();
                    let amount = inv.random()?.gen_range(1..=9);
                    inv.call(&current, "deposit", &[Value::Int(amount)])?;
                    Ok(Value::Object(current))
                }),
        )
        .method(
            MethodDef::function("same_total")
                .param("expected", TypeDescriptor::Outcome)
                .param("actual", TypeDescriptor::Outcome)
                .role(Role::standalone_verify("total"))
                .verifier(|inv, expected, actual| {
                    let want = inv.get(expected.receiver()?, "total")?;
                    let got = inv.get(actual.receiver()?, "total")?;
                    check_match(&want, &got)
                }),
        )
        .build()
}

fn absolute(name: &str, checked: bool) -> Arc<TypeDef> {
    TypeDef::builder(name)
        .method(
            MethodDef::function("abs")
                .param("n", TypeDescriptor::Int)
                .returns(TypeDescriptor::Int)
                .role(Role::solution("abs"))
                .body(move |_, args| {
                    let n = arg(args, 0)?.as_int()?;
                    if checked {
                        n.checked_abs().map(Value::Int).ok_or_else(|| {
                            Fault::thrown("ArithmeticException", "overflow")
                        })
                    } else {
                        Ok(Value::Int(n.wrapping_abs()))
                    }
                }),
        )
        .method(
            MethodDef::function("extremes")
                .returns(TypeDescriptor::array_of(TypeDescriptor::Int))
                .role(Role::EdgeCase)
                .body(|_, _| {
                    let values = ArrayValue::from_values(
                        &TypeDescriptor::Int,
                        vec![Value::Int(i32::MIN), Value::Int(0)],
                    )?;
                    Ok(Value::Array(values))
                }),
        )
        .build()
}

fn divider(name: &str, accept: fn(i32) -> bool) -> Arc<TypeDef> {
    TypeDef::builder(name)
        .method(
            MethodDef::function("div")
                .param("a", TypeDescriptor::Int)
                .param("b", TypeDescriptor::Int)
                .returns(TypeDescriptor::Int)
                .role(Role::solution("div"))
                .body(|_, args| {
                    let a = arg(args, 0)?.as_int()?;
                    let b = arg(args, 1)?.as_int()?;
                    a.checked_div(b)
                        .map(Value::Int)
                        .ok_or_else(|| Fault::thrown("ArithmeticException", "/ by zero"))
                }),
        )
        .method(
            MethodDef::function("divisor_usable")
                .param("a", TypeDescriptor::Int)
                .param("b", TypeDescriptor::Int)
                .returns(TypeDescriptor::Bool)
                .role(Role::precondition("div"))
                .body(move |_, args| Ok(Value::Bool(accept(arg(args, 1)?.as_int()?)))),
        )
        .build()
}

/// An adder that reads its arguments as `long` although they are `int`.
fn miscast_adder(name: &str) -> Arc<TypeDef> {
    TypeDef::builder(name)
        .method(
            MethodDef::function("add")
                .param("a", TypeDescriptor::Int)
                .param("b", TypeDescriptor::Int)
                .returns(TypeDescriptor::Int)
                .role(Role::solution("add"))
                .body(|_, args| {
                    let a = arg(args, 0)?.as_long()?;
                    let b = arg(args, 1)?.as_long()?;
                    Ok(Value::Long(a + b))
                }),
        )
        .build()
}

/// A gauge built by its default constructor. Its precondition overwrites
/// `reading` before accepting every case.
fn gauge(name: &str) -> Arc<TypeDef> {
    TypeDef::builder(name)
        .field(FieldDef::new("reading", TypeDescriptor::Int))
        .method(
            MethodDef::method("read")
                .param("offset", TypeDescriptor::Int)
                .returns(TypeDescriptor::Int)
                .role(Role::solution("read"))
                .body(|inv, args| {
                    let reading = inv.field("reading")?.as_int()?;
                    Ok(Value::Int(reading.wrapping_add(arg(args, 0)?.as_int()?)))
                }),
        )
        .method(
            MethodDef::method("tamper")
                .param("offset", TypeDescriptor::Int)
                .returns(TypeDescriptor::Bool)
                .role(Role::precondition("read"))
                .body(|inv, _| {
                    inv.set_field("reading", Value::Int(1000))?;
                    Ok(Value::Bool(true))
                }),
        )
        .build()
}

fn config(solution: &str) -> RunConfig {
    RunConfig::new(solution).with_num_tests(48).with_seed(7)
}

// =============================================================================
// Differential runs
// =============================================================================

/// Test that an identical submission passes every trial.
#[test]
fn test_identical_submission_passes() {
    let report = run_tests(
        &adder("Adder", add),
        &adder("StudentAdder", add),
        &config("add"),
    );
    assert!(report.all_passed(), "{}", report.summary());
    assert_eq!(report.trials.len(), 48);
    assert_eq!(report.count(Verdict::Passed), 48);
    assert_eq!(report.seed, 7);
    assert_eq!(report.arguments.num_tests, 48);
    assert!(!report.case_digest.is_empty());
}

/// Test that trials run in blocks: edge, simple, edge/simple mixed,
/// generated, then generated mixed.
#[test]
fn test_trial_blocks_run_in_order() {
    let report = run_tests(
        &adder("Adder", add),
        &adder("StudentAdder", add),
        &config("add").with_num_tests(64),
    );
    assert!(report.all_passed(), "{}", report.summary());
    assert_eq!(report.trials.len(), 64);
    assert_eq!(report.trials[0].kind, TrialKind::Edge);
    assert_eq!(report.trials[0].arguments, vec!["0", "0"]);
    assert_eq!(report.trials[0].complexity, 0);

    // (-1, 1) x (-1, 1) fits under 64 / 16, so every pair runs in order.
    let simple: Vec<_> = report.trials[1..5].iter().map(|t| t.arguments.clone()).collect();
    assert!(report.trials[1..5].iter().all(|t| t.kind == TrialKind::Simple));
    assert_eq!(
        simple,
        vec![
            vec!["-1", "-1"],
            vec!["-1", "1"],
            vec!["1", "-1"],
            vec!["1", "1"],
        ]
    );

    let counts: Vec<usize> = [
        TrialKind::Edge,
        TrialKind::Simple,
        TrialKind::EdgeSimpleMixed,
        TrialKind::Generated,
        TrialKind::GeneratedMixed,
    ]
    .into_iter()
    .map(|kind| report.count_kind(kind))
    .collect();
    assert_eq!(counts, vec![1, 4, 4, 32, 23]);

    for trial in &report.trials[5..9] {
        assert_eq!(trial.kind, TrialKind::EdgeSimpleMixed);
        assert!(
            trial.arguments.iter().all(|a| ["-1", "0", "1"].contains(&a.as_str())),
            "{:?}",
            trial.arguments
        );
    }
    assert!(report.trials[9..41].iter().all(|t| t.kind == TrialKind::Generated));
    assert!(report.trials[41..].iter().all(|t| t.kind == TrialKind::GeneratedMixed));

    for block in [&report.trials[9..41], &report.trials[41..]] {
        let complexities: Vec<u32> = block.iter().map(|t| t.complexity).collect();
        assert!(complexities.windows(2).all(|w| w[0] <= w[1]), "{complexities:?}");
        assert!(complexities.last().copied().unwrap_or_default() <= 100);
    }
}

/// Test that simple cases are sampled when their combinations exceed the cap.
#[test]
fn test_simple_cases_are_sampled_over_the_cap() {
    let run = || {
        run_tests(
            &adder("Adder", add),
            &adder("StudentAdder", add),
            &config("add"),
        )
    };
    let report = run();
    // Four pairs, but only 48 / 16 simple trials.
    let simple: Vec<_> = report
        .trials
        .iter()
        .filter(|t| t.kind == TrialKind::Simple)
        .map(|t| t.arguments.clone())
        .collect();
    assert_eq!(simple.len(), 3);
    for arguments in &simple {
        assert!(
            arguments.iter().all(|a| a == "-1" || a == "1"),
            "{arguments:?}"
        );
    }
    assert!(report.trials[1..4].iter().all(|t| t.kind == TrialKind::Simple));

    let again: Vec<_> = run()
        .trials
        .iter()
        .filter(|t| t.kind == TrialKind::Simple)
        .map(|t| t.arguments.clone())
        .collect();
    assert_eq!(simple, again);
}

/// Test that a wrong submission fails with both outcomes recorded.
#[test]
fn test_wrong_submission_fails_verification() {
    let report = run_tests(
        &adder("Adder", add),
        &adder("StudentAdder", subtract),
        &config("add").with_num_tests(64).with_stop_on_first_failure(true),
    );
    assert!(!report.all_passed());
    assert_eq!(report.verdicts(), vec![Verdict::Passed, Verdict::VerificationFailed]);

    let failure = report.failures().next().expect("a failing trial");
    assert_eq!(failure.arguments, vec!["-1", "-1"]);
    let reference = failure.reference.as_ref().expect("reference outcome");
    let submission = failure.submission.as_ref().expect("submission outcome");
    assert_eq!(reference.returned.as_deref(), Some("-2"));
    assert_eq!(submission.returned.as_deref(), Some("0"));
    assert_eq!(
        failure.message.as_deref(),
        Some("submission returned 0 but the reference returned -2")
    );
}

/// Test that the same seed reproduces the same trials and verdicts.
#[test]
fn test_runs_are_deterministic_per_seed() {
    let reference = adder("Adder", add);
    let submission = adder("StudentAdder", subtract);
    for policy in [SeedPolicy::PerRun, SeedPolicy::PerTrial] {
        let cfg = config("add").with_seed_policy(policy);
        let first = run_tests(&reference, &submission, &cfg);
        let second = run_tests(&reference, &submission, &cfg);
        assert_eq!(first.verdicts(), second.verdicts());
        assert_eq!(first.case_digest, second.case_digest);
        let args = |r: &RunReport| {
            r.trials.iter().map(|t| t.arguments.clone()).collect::<Vec<_>>()
        };
        assert_eq!(args(&first), args(&second));
    }

    let other = run_tests(&reference, &submission, &config("add").with_seed(8));
    let base = run_tests(&reference, &submission, &config("add"));
    assert_ne!(other.case_digest, base.case_digest);
}

/// Test that swapping reference and submission yields the same verdicts.
#[test]
fn test_verdicts_are_symmetric() {
    let plus = adder("Plus", add);
    let minus = adder("Minus", subtract);
    let forward = run_tests(&plus, &minus, &config("add"));
    let backward = run_tests(&minus, &plus, &config("add"));
    assert!(forward.fatal.is_none() && backward.fatal.is_none());
    assert_eq!(forward.verdicts(), backward.verdicts());
    assert!(forward.count(Verdict::VerificationFailed) > 0);
}

/// Test that declared edge cases replace the default ones.
#[test]
fn test_declared_edge_cases_are_used() {
    let report = run_tests(
        &absolute("Abs", false),
        &absolute("StudentAbs", true),
        &config("abs").with_stop_on_first_failure(true),
    );
    assert_eq!(report.trials.len(), 1);
    let trial = &report.trials[0];
    assert_eq!(trial.kind, TrialKind::Edge);
    assert_eq!(trial.arguments, vec![i32::MIN.to_string()]);
    assert_eq!(trial.verdict, Verdict::VerificationFailed);
    let threw = trial
        .submission
        .as_ref()
        .and_then(|s| s.threw.clone())
        .unwrap_or_default();
    assert!(threw.contains("ArithmeticException"), "{threw}");
}

/// Test that reading an argument as the wrong type is a thrown failure of
/// the submission, not an engine error.
#[test]
fn test_wrong_accessor_throws_class_cast() {
    let report = run_tests(
        &adder("Adder", add),
        &miscast_adder("StudentAdder"),
        &config("add").with_stop_on_first_failure(true),
    );
    assert!(report.fatal.is_none(), "{:?}", report.fatal);
    assert_eq!(report.verdicts(), vec![Verdict::VerificationFailed]);
    let submission = report.trials[0].submission.as_ref().expect("submission outcome");
    assert_eq!(submission.behavior, "threw");
    let threw = submission.threw.clone().unwrap_or_default();
    assert!(threw.contains("ClassCastException"), "{threw}");
    assert_eq!(
        report.trials[0].reference.as_ref().and_then(|r| r.returned.clone()).as_deref(),
        Some("0")
    );
}

// =============================================================================
// Receivers, lifecycle and verification
// =============================================================================

/// Test that `@Next` chains receivers and catches a diverging mutator.
#[test]
fn test_next_chain_detects_state_divergence() {
    let reference = counter("Counter", 1, false);
    let good = run_tests(&reference, &counter("StudentCounter", 1, false), &config("value"));
    assert!(good.all_passed(), "{}", good.summary());
    assert!(good.trials.iter().any(|t| t.kind == TrialKind::Regression));

    let bad = run_tests(
        &reference,
        &counter("StudentCounter", 2, false),
        &config("value").with_stop_on_first_failure(true),
    );
    assert_eq!(bad.verdicts(), vec![Verdict::Passed, Verdict::VerificationFailed]);
    let failure = &bad.trials[1];
    assert_eq!(
        failure.submission.as_ref().and_then(|s| s.returned.clone()).as_deref(),
        Some("2")
    );
}

/// Test that a lifecycle hook touching private state is reported as unsafe.
#[test]
fn test_private_access_from_hook_is_unsafe() {
    let reference = counter("Counter", 1, true);
    let submission = counter("StudentCounter", 1, false);
    let report = run_tests(&reference, &submission, &config("value").with_self_check(false));
    assert!(report.fatal.is_none());
    let unsafe_trial = report
        .trials
        .iter()
        .find(|t| t.verdict == Verdict::UnsafeGenerator)
        .expect("an unsafe trial");
    let message = unsafe_trial.message.clone().unwrap_or_default();
    assert!(message.contains("Counter.count"), "{message}");
    assert!(report.count(Verdict::Passed) > 0);

    match Question::load(reference, &LoadOptions::default()) {
        Err(EngineError::LoadValidation(violations)) => {
            assert!(violations[0].message.contains("self-check"), "{:?}", violations);
        }
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("self-check should reject an unsafe reference"),
    }
}

/// Test that a submission that never finishes is cut off.
#[test]
fn test_slow_submission_times_out() {
    let report = run_tests(
        &echo("Echo", false),
        &echo("StudentEcho", true),
        &config("echo").with_stop_on_first_failure(true),
    );
    assert_eq!(report.verdicts(), vec![Verdict::TimedOut]);
    let trial = &report.trials[0];
    assert_eq!(trial.message.as_deref(), Some("submission timed out after 50ms"));
    assert_eq!(
        trial.submission.as_ref().map(|s| s.behavior.as_str()),
        Some("timed-out")
    );
}

/// Test that a grouped generator supplies every argument together.
#[test]
fn test_grouped_generator_supplies_related_arguments() {
    let reference = span("Span", i32::wrapping_sub);
    let report = run_tests(&reference, &span("StudentSpan", i32::wrapping_sub), &config("span"));
    assert!(report.all_passed(), "{}", report.summary());
    for trial in &report.trials {
        assert_eq!(trial.kind, TrialKind::Generated);
        let lo: i32 = trial.arguments[0].parse().expect("int");
        let hi: i32 = trial.arguments[1].parse().expect("int");
        assert!(lo <= hi, "{lo} > {hi}");
    }

    let wrong = run_tests(&reference, &span("StudentSpan", i32::wrapping_add), &config("span"));
    assert!(wrong.count(Verdict::VerificationFailed) > 0);
}

/// Test that printed output is compared for printing solutions.
#[test]
fn test_printing_solution_compares_stdout() {
    let reference = greeter("Greeter", ",");
    let good = run_tests(&reference, &greeter("StudentGreeter", ","), &config("greet"));
    assert!(good.all_passed(), "{}", good.summary());

    let bad = run_tests(
        &reference,
        &greeter("StudentGreeter", ""),
        &config("greet").with_stop_on_first_failure(true),
    );
    let failure = bad.failures().next().expect("a failing trial");
    assert_eq!(failure.arguments, vec!["\"\""]);
    assert!(failure.message.as_deref().unwrap_or("").contains("printed"));
    assert_eq!(
        failure.reference.as_ref().and_then(|r| r.stdout.clone()).as_deref(),
        Some("Hello, !\n")
    );
}

/// Test that a declared verifier replaces the default comparison.
#[test]
fn test_custom_verifier_tolerates_rounding() {
    let reference = halver("Half", 0.0);
    let close = run_tests(&reference, &halver("StudentHalf", 1e-12), &config("half"));
    assert!(close.all_passed(), "{}", close.summary());

    let far = run_tests(
        &reference,
        &halver("StudentHalf", 1.0),
        &config("half").with_stop_on_first_failure(true),
    );
    let failure = far.failures().next().expect("a failing trial");
    assert_eq!(failure.verdict, Verdict::VerificationFailed);
    assert_eq!(failure.message.as_deref(), Some("expected 0, got 1"));
}

/// Test that a standalone verifier checks receivers with no solution method.
#[test]
fn test_standalone_verifier_checks_receivers() {
    let reference = tally("Tally", 1);
    let good = run_tests(&reference, &tally("StudentTally", 1), &config("total"));
    assert!(good.all_passed(), "{}", good.summary());

    let bad = run_tests(
        &reference,
        &tally("StudentTally", 2),
        &config("total").with_stop_on_first_failure(true),
    );
    let failure = bad.failures().next().expect("a failing trial");
    let message = failure.message.clone().unwrap_or_default();
    assert!(message.starts_with("expected "), "{message}");
    assert_eq!(
        failure.reference.as_ref().map(|r| r.behavior.as_str()),
        Some("verify-only")
    );
}

// =============================================================================
// Preconditions and fatal errors
// =============================================================================

/// Test that rejected cases are discarded rather than judged.
#[test]
fn test_precondition_discards_cases() {
    let report = run_tests(
        &divider("Div", |b| b != 0),
        &divider("StudentDiv", |b| b != 0),
        &config("div"),
    );
    assert!(report.all_passed(), "{}", report.summary());
    assert!(report.discarded > 0);
    assert!(report.trials.iter().all(|t| t.arguments[1] != "0"));
}

/// Test that hitting the discard limit after some judged trials ends the run
/// with those trials kept.
#[test]
fn test_discard_limit_keeps_judged_trials() {
    let report = run_tests(
        &divider("Div", |b| b % 2 == 0),
        &divider("StudentDiv", |b| b % 2 == 0),
        &RunConfig::new("div").with_seed(7),
    );
    assert!(report.fatal.is_none(), "{:?}", report.fatal);
    assert!(report.all_passed(), "{}", report.summary());
    assert!(!report.trials.is_empty());
    assert!(report.trials.len() <= 1024);
    assert!(report.discarded > 0 && report.discarded <= 1024);
    for trial in &report.trials {
        let b: i32 = trial.arguments[1].parse().expect("int");
        assert_eq!(b % 2, 0, "{:?}", trial.arguments);
    }
}

/// Test that a precondition mutating its receiver does not leak into the
/// judged call.
#[test]
fn test_precondition_cannot_mutate_receiver() {
    let report = run_tests(&gauge("Gauge"), &gauge("StudentGauge"), &config("read"));
    assert!(report.all_passed(), "{}", report.summary());
    assert_eq!(report.discarded, 0);
    for trial in report.trials.iter().filter(|t| t.kind != TrialKind::Regression) {
        let returned = trial.reference.as_ref().and_then(|r| r.returned.clone());
        assert_eq!(returned.as_ref(), Some(&trial.arguments[0]), "{:?}", trial.arguments);
    }
}

/// Test that a precondition rejecting everything exhausts the run.
#[test]
fn test_precondition_exhaustion_is_fatal() {
    let reference = divider("Div", |_| false);
    let submission = divider("StudentDiv", |_| false);
    let cfg = RunConfig::new("div")
        .with_arguments(RunArguments::default().with_max_discards(8))
        .with_seed(7);

    let question = Question::load(reference.clone(), &LoadOptions::default().with_self_check(false))
        .expect("load");
    match question.run(&submission, &cfg) {
        Err(EngineError::PreconditionExhausted { solution, discarded }) => {
            assert_eq!(solution, "div");
            assert_eq!(discarded, 8);
        }
        other => panic!("expected exhaustion, got {:?}", other.map(|r| r.summary())),
    }

    let report = run_tests(&reference, &submission, &cfg.with_self_check(false));
    assert_eq!(report.verdicts(), vec![Verdict::PreconditionExhausted]);
    assert!(report.fatal.is_some());
    assert_eq!(report.discarded, 8);
}

/// Test that a malformed reference is reported as a load error.
#[test]
fn test_invalid_reference_is_a_load_error() {
    let reference = TypeDef::builder("Broken")
        .method(
            MethodDef::method("gen")
                .returns(TypeDescriptor::Int)
                .role(Role::generator()),
        )
        .build();
    let report = run_tests(&reference, &adder("StudentAdder", add), &config("add"));
    assert_eq!(report.verdicts(), vec![Verdict::LoadValidationError]);
    let fatal = report.fatal.unwrap_or_default();
    assert!(fatal.contains("@Generator gen: must be static"), "{fatal}");
}

/// Test that a submission without the solution member is rejected.
#[test]
fn test_missing_submission_member_is_a_load_error() {
    let submission = TypeDef::builder("StudentAdder")
        .method(
            MethodDef::function("sum")
                .param("a", TypeDescriptor::Int)
                .param("b", TypeDescriptor::Int)
                .returns(TypeDescriptor::Int),
        )
        .build();
    let report = run_tests(&adder("Adder", add), &submission, &config("add"));
    assert_eq!(report.verdicts(), vec![Verdict::LoadValidationError]);
    assert!(report.fatal.unwrap_or_default().contains("has no member"));

    let unknown = run_tests(&adder("Adder", add), &adder("StudentAdder", add), &config("mul"));
    assert_eq!(unknown.verdicts(), vec![Verdict::LoadValidationError]);
}

// =============================================================================
// Batches and reports
// =============================================================================

/// Test that batch runs return one report per submission, in order.
#[test]
fn test_batch_reports_follow_submission_order() {
    let question = Question::load(adder("Adder", add), &LoadOptions::default()).expect("load");
    assert_eq!(question.solutions(), vec!["add"]);
    let submissions = vec![
        adder("First", add),
        adder("Second", subtract),
        adder("Third", add),
    ];
    let reports = run_batch(&question, &submissions, &config("add"));
    let names: Vec<_> = reports.iter().map(|r| r.submission.as_str()).collect();
    assert_eq!(names, vec!["First", "Second", "Third"]);
    let passed: Vec<_> = reports.iter().map(|r| r.all_passed()).collect();
    assert_eq!(passed, vec![true, false, true]);
    assert_eq!(reports[0].case_digest, reports[2].case_digest);
}

/// Test that reports serialize with kebab-case verdicts.
#[test]
fn test_report_serializes_to_json() {
    let report = run_tests(
        &adder("Adder", add),
        &adder("StudentAdder", subtract),
        &config("add").with_num_tests(64).with_stop_on_first_failure(true),
    );
    let json = serde_json::to_value(&report).expect("serialize");
    assert_eq!(json["solution"], "add");
    assert_eq!(json["seed"], 7);
    assert_eq!(json["trials"][0]["kind"], "edge");
    assert_eq!(json["trials"][1]["verdict"], "verification-failed");
    assert_eq!(json["trials"][1]["reference"]["returned"], "-2");
}
