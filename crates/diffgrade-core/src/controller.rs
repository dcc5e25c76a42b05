//! Iteration and lifecycle controller.
//!
//! A run is a sequence of trial blocks:
//!
//! 1. edge cases, then simple cases, replayed as literal combinations;
//! 2. arguments mixed from edge and simple cases;
//! 3. fully generated arguments at rising complexity;
//! 4. arguments mixed from cases and generators at rising complexity.
//!
//! Regression trials that revisit earlier receivers are interleaved with blocks
//! 2 to 4. With a `@Next` hook the receiver is a fold over trials:
//! `receiver_{i+1} = next(receiver_i, i, random)`.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use rand::{Rng, SeedableRng};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use diffgrade_types::{
    OutcomeSummary, ResolvedArguments, RunArguments, RunConfig, RunReport, TrialKind,
    TrialRecord, Verdict,
};

use crate::contract::TypeDef;
use crate::error::EngineError;
use crate::execute::{
    custom_verify, default_verify, execute, timed_out_summary, Call, CallError, TestOutput,
    VerifyFailure,
};
use crate::generators::{CaseKind, CaseTable, Gen, GroupedGen};
use crate::invoke::{Fault, RandomSource, SideContext};
use crate::object::Side;
use crate::proxy::{HookKind, Scope};
use crate::roles::CaseSource;
use crate::value::{TypeDescriptor, Value};

/// Mixed into the run seed for the controller's own stream.
const CONTROL_SALT: u64 = 0x5DEE_CE66_D1CE_4E5B;
/// Highest complexity used for regression-trial arguments.
const REGRESSION_COMPLEXITY: u32 = 4;
/// Complexity for receivers and case-less slots of edge/simple mixed trials.
const MIXED_COMPLEXITY: u32 = 2;

/// How receivers are obtained for instance solutions.
pub(crate) enum ReceiverStrategy {
    /// Static solution: no receiver.
    Static,
    /// Fold over trials through the `@Next` hook.
    Next {
        method: usize,
        initial: Option<Arc<dyn Gen>>,
    },
    /// A fresh receiver from the type's generator each trial.
    Generator(Arc<dyn Gen>),
    /// A fresh receiver from the public no-argument constructor.
    Constructor,
}

impl ReceiverStrategy {
    pub(crate) fn describe(&self) -> &'static str {
        match self {
            ReceiverStrategy::Static => "static",
            ReceiverStrategy::Next { .. } => "@Next",
            ReceiverStrategy::Generator(_) => "generator",
            ReceiverStrategy::Constructor => "constructor",
        }
    }
}

pub(crate) enum ArgumentSource {
    /// One generator per parameter.
    Slots(Vec<Arc<dyn Gen>>),
    /// One tuple for all parameters.
    Grouped(GroupedGen),
}

/// Everything resolved at load time for one runnable name.
pub(crate) struct Plan {
    pub name: String,
    /// Solution method on the reference; absent for a verify-only plan.
    pub method: Option<usize>,
    pub is_static: bool,
    pub params: Vec<TypeDescriptor>,
    pub returns: Option<TypeDescriptor>,
    pub arguments: ArgumentSource,
    pub receiver: ReceiverStrategy,
    pub precondition: Option<usize>,
    /// Verifier method and whether it takes a random source.
    pub verifier: Option<(usize, bool)>,
    pub prints: bool,
    pub timeout: Option<Duration>,
    pub declared: Option<RunArguments>,
    pub edge_sources: Vec<CaseSource>,
    pub simple_sources: Vec<CaseSource>,
}

/// Seeded random streams of a run.
struct Streams {
    reference: RandomSource,
    submission: RandomSource,
    control: RandomSource,
}

impl Streams {
    fn new(seed: u64) -> Self {
        Self {
            reference: RandomSource::seed_from_u64(seed),
            submission: RandomSource::seed_from_u64(seed),
            control: RandomSource::seed_from_u64(seed ^ CONTROL_SALT),
        }
    }
}

/// A pair of values, reference first.
type Pair = (Value, Value);

/// One injected trial: a value pair for each slot that has cases.
struct InjectedCase {
    kind: TrialKind,
    slots: Vec<Option<Pair>>,
}

/// Trial counts of the blocks that follow the injected cases.
#[derive(Debug, Clone, Copy, Default)]
struct Blocks {
    edge_simple_mixed: u32,
    generated: u32,
    generated_mixed: u32,
    /// Length of the generated-mixed complexity schedule, net of regressions.
    generated_mixed_schedule: u32,
}

/// Trials recorded so far in each post-injection block.
#[derive(Debug, Clone, Copy, Default)]
struct Progress {
    post_injection: u32,
    edge_simple_mixed: u32,
    generated: u32,
    generated_mixed: u32,
}

impl Progress {
    fn advance(&mut self, kind: TrialKind) {
        if kind.is_injected() {
            return;
        }
        self.post_injection += 1;
        match kind {
            TrialKind::EdgeSimpleMixed => self.edge_simple_mixed += 1,
            TrialKind::Generated => self.generated += 1,
            TrialKind::GeneratedMixed => self.generated_mixed += 1,
            _ => {}
        }
    }
}

/// Values synthesized for one trial.
struct Prepared {
    receivers: Option<Pair>,
    args: (Vec<Value>, Vec<Value>),
}

/// Why a trial (or the run) stopped early.
enum Interrupt {
    Trial(Verdict, String),
    Fatal(EngineError),
}

struct Judgement {
    verdict: Verdict,
    message: Option<String>,
    reference: Option<OutcomeSummary>,
    submission: Option<OutcomeSummary>,
}

impl Judgement {
    fn new(verdict: Verdict, message: impl Into<String>) -> Self {
        Self {
            verdict,
            message: Some(message.into()),
            reference: None,
            submission: None,
        }
    }
}

fn hook_fault(side: Side, fault: Fault, what: &str) -> Interrupt {
    match fault {
        Fault::Access(violation) => Interrupt::Trial(Verdict::UnsafeGenerator, violation.to_string()),
        Fault::Thrown(thrown) if side == Side::Submission => Interrupt::Trial(
            Verdict::VerificationFailed,
            format!("submission threw {thrown} during {what}"),
        ),
        Fault::Thrown(thrown) => {
            Interrupt::Fatal(EngineError::engine(format!("{what} threw {thrown} on the reference")))
        }
        Fault::Cancelled => Interrupt::Fatal(EngineError::engine(format!("{what} was cancelled"))),
        Fault::Engine(msg) => Interrupt::Fatal(EngineError::engine(format!("{what}: {msg}"))),
    }
}

/// Drives the trials of one run.
pub(crate) struct Controller<'a> {
    plan: &'a Plan,
    config: &'a RunConfig,
    arguments: ResolvedArguments,
    seed: u64,
    reference_type: TypeDescriptor,
    reference_side: Arc<SideContext>,
    submission_side: Arc<SideContext>,
    submission_method: Option<usize>,
    streams: Streams,
    /// Case values per slot (receiver first for instance plans).
    edge_slots: Vec<Vec<Pair>>,
    simple_slots: Vec<Vec<Pair>>,
    chain: Option<Pair>,
    history: Vec<Pair>,
    discarded: u32,
    digest: Sha256,
}

impl<'a> Controller<'a> {
    pub(crate) fn new(
        plan: &'a Plan,
        config: &'a RunConfig,
        arguments: ResolvedArguments,
        seed: u64,
        reference: &Arc<TypeDef>,
        submission: &Arc<TypeDef>,
        auxiliary: &[Arc<TypeDef>],
        submission_method: Option<usize>,
    ) -> Self {
        Self {
            plan,
            config,
            arguments,
            seed,
            reference_type: TypeDescriptor::named(reference.name()),
            reference_side: SideContext::new(
                Side::Reference,
                reference.clone(),
                reference.clone(),
                auxiliary,
            ),
            submission_side: SideContext::new(
                Side::Submission,
                reference.clone(),
                submission.clone(),
                auxiliary,
            ),
            submission_method,
            streams: Streams::new(seed),
            edge_slots: Vec::new(),
            simple_slots: Vec::new(),
            chain: None,
            history: Vec::new(),
            discarded: 0,
            digest: Sha256::new(),
        }
    }

    /// Run every trial into `report`. A fatal error ends the run early; the
    /// trials recorded so far stay in the report.
    pub(crate) fn run(mut self, report: &mut RunReport) -> Result<(), EngineError> {
        let result = self.run_trials(report);
        report.discarded = self.discarded;
        report.case_digest = hex::encode(self.digest.finalize_reset());
        result
    }

    fn run_trials(&mut self, report: &mut RunReport) -> Result<(), EngineError> {
        self.edge_slots = self.case_slots(CaseKind::Edge)?;
        self.simple_slots = self.case_slots(CaseKind::Simple)?;
        let mut queue: VecDeque<InjectedCase> = self.injected(CaseKind::Edge).into();
        queue.extend(self.injected(CaseKind::Simple));
        let injected = queue.len() as u32;
        let total = self.arguments.num_tests.max(injected);
        let regression_every = match (&self.plan.receiver, self.arguments.num_regression_tests) {
            (ReceiverStrategy::Static, _) | (_, 0) => None,
            _ if self.plan.method.is_none() => None,
            (_, n) => Some((self.arguments.num_tests / n).max(1)),
        };
        let blocks = self.blocks(total - injected, regression_every);
        debug!(
            solution = %self.plan.name,
            injected,
            total,
            ?blocks,
            receivers = self.plan.receiver.describe(),
            "starting trials"
        );

        let mut progress = Progress::default();
        let mut recorded = 0u32;
        let mut seeded: Option<u32> = None;
        let mut index = 0u32;
        while index < total {
            if seeded != Some(index) {
                self.reseed(index);
                seeded = Some(index);
            }
            let injected_case = queue.pop_front();
            let (kind, complexity) = match &injected_case {
                Some(case) => (case.kind, 0),
                None => self.next_block(&blocks, &progress, regression_every),
            };

            let violations = self.violation_count();
            let prepared = match injected_case {
                Some(case) => self.prepare_injected(index, case),
                None => self.prepare_generated(index, kind, complexity),
            };
            let prepared = prepared.and_then(|p| {
                if self.violation_count() > violations {
                    Err(Interrupt::Trial(
                        Verdict::UnsafeGenerator,
                        self.last_violation(),
                    ))
                } else {
                    Ok(p)
                }
            });
            let prepared = match prepared {
                Ok(p) => p,
                Err(Interrupt::Fatal(e)) => return Err(e),
                Err(Interrupt::Trial(verdict, message)) => {
                    warn!(trial = index, verdict = %verdict, %message, "trial interrupted");
                    self.chain = None;
                    self.end_trial();
                    self.record(report, index, kind, complexity, None, Judgement::new(verdict, message));
                    recorded += 1;
                    progress.advance(kind);
                    index += 1;
                    if self.config.stop_on_first_failure {
                        break;
                    }
                    continue;
                }
            };

            if !self.precondition_holds(&prepared)? {
                self.discarded += 1;
                self.end_trial();
                debug!(trial = index, discarded = self.discarded, "precondition rejected case");
                if self.discarded >= self.arguments.max_discards {
                    if recorded == 0 {
                        return Err(EngineError::PreconditionExhausted {
                            solution: self.plan.name.clone(),
                            discarded: self.discarded,
                        });
                    }
                    warn!(
                        solution = %self.plan.name,
                        discarded = self.discarded,
                        recorded,
                        "discard limit reached, ending run early"
                    );
                    break;
                }
                continue;
            }

            let judgement = self.judge(&prepared)?;
            if matches!(judgement.verdict, Verdict::TimedOut | Verdict::UnsafeGenerator) {
                self.chain = None;
            }
            if let Some(receivers) = &prepared.receivers {
                if kind != TrialKind::Regression {
                    self.history.push(receivers.clone());
                }
            }
            self.end_trial();
            let passed = judgement.verdict == Verdict::Passed;
            if !passed {
                warn!(
                    trial = index,
                    verdict = %judgement.verdict,
                    message = judgement.message.as_deref().unwrap_or(""),
                    "trial failed"
                );
            }
            self.record(report, index, kind, complexity, Some(&prepared), judgement);
            recorded += 1;
            progress.advance(kind);
            index += 1;
            if !passed && self.config.stop_on_first_failure {
                break;
            }
        }
        Ok(())
    }

    /// Whether arguments can be drawn slot by slot from case tables.
    fn mixes_cases(&self) -> bool {
        matches!(&self.plan.arguments, ArgumentSource::Slots(gens) if !gens.is_empty())
    }

    /// Split the trials left after injection into blocks.
    fn blocks(&self, remaining: u32, regression_every: Option<u32>) -> Blocks {
        if !self.mixes_cases() {
            return Blocks {
                generated: remaining,
                ..Blocks::default()
            };
        }
        let edge_simple_mixed = self.arguments.num_simple_edge_mixed_tests.min(remaining);
        let generated = self
            .arguments
            .num_all_generated_tests
            .min(remaining - edge_simple_mixed);
        let generated_mixed = remaining - edge_simple_mixed - generated;
        let regressions = regression_every
            .map(|every| remaining.saturating_sub(1) / every)
            .unwrap_or(0);
        Blocks {
            edge_simple_mixed,
            generated,
            generated_mixed,
            generated_mixed_schedule: generated_mixed.saturating_sub(regressions).max(1),
        }
    }

    /// Kind and complexity of the next trial after the injected cases.
    fn next_block(
        &mut self,
        blocks: &Blocks,
        progress: &Progress,
        regression_every: Option<u32>,
    ) -> (TrialKind, u32) {
        let max = self.arguments.max_complexity;
        let regression = regression_every.is_some_and(|every| {
            progress.post_injection > 0
                && progress.post_injection % every == 0
                && !self.history.is_empty()
        });
        if regression {
            let c = self.streams.control.gen_range(0..=REGRESSION_COMPLEXITY.min(max));
            return (TrialKind::Regression, c);
        }
        if progress.edge_simple_mixed < blocks.edge_simple_mixed {
            return (TrialKind::EdgeSimpleMixed, MIXED_COMPLEXITY.min(max));
        }
        let schedule = self.config.schedule;
        if progress.generated < blocks.generated || blocks.generated_mixed == 0 {
            let c = schedule.complexity_at(progress.generated, blocks.generated, max);
            return (TrialKind::Generated, c);
        }
        let c = schedule.complexity_at(
            progress.generated_mixed,
            blocks.generated_mixed_schedule,
            max,
        );
        (TrialKind::GeneratedMixed, c)
    }

    fn reseed(&mut self, index: u32) {
        if let Some(seed) = self.config.seed_policy.trial_seed(self.seed, index) {
            self.streams = Streams::new(seed);
        }
    }

    fn violation_count(&self) -> usize {
        self.reference_side.registry().violation_count()
            + self.submission_side.registry().violation_count()
    }

    fn last_violation(&self) -> String {
        self.submission_side
            .registry()
            .violations()
            .last()
            .or(self.reference_side.registry().violations().last())
            .map(|v| v.to_string())
            .unwrap_or_else(|| "unsafe access".to_string())
    }

    fn end_trial(&self) {
        self.reference_side.registry().end_trial();
        self.submission_side.registry().end_trial();
    }

    /// Produce one value per side. The submission stream is synced to the
    /// reference stream first so both sides draw the same numbers.
    fn pair<F>(&mut self, what: &str, mut produce: F) -> Result<Pair, Interrupt>
    where
        F: FnMut(&mut RandomSource, &Arc<SideContext>) -> Result<Value, Fault>,
    {
        self.streams.submission = self.streams.reference.clone();
        let reference = produce(&mut self.streams.reference, &self.reference_side)
            .map_err(|f| hook_fault(Side::Reference, f, what))?;
        let submission = produce(&mut self.streams.submission, &self.submission_side)
            .map_err(|f| hook_fault(Side::Submission, f, what))?;
        Ok((reference, submission))
    }

    /// Case values for every slot, evaluated once per side and paired up.
    fn case_slots(&self, kind: CaseKind) -> Result<Vec<Vec<Pair>>, EngineError> {
        if matches!(self.plan.arguments, ArgumentSource::Grouped(_)) {
            return Ok(Vec::new());
        }
        let sources = match kind {
            CaseKind::Edge => &self.plan.edge_sources,
            CaseKind::Simple => &self.plan.simple_sources,
        };
        let evaluate = |side: &Arc<SideContext>| {
            CaseTable::evaluate(side, sources, kind).map_err(|f| {
                EngineError::engine(format!("{kind:?} cases on the {}: {f}", side.side()))
            })
        };
        let reference = evaluate(&self.reference_side)?;
        let submission = evaluate(&self.submission_side)?;

        let mut slot_types = Vec::new();
        if !matches!(self.plan.receiver, ReceiverStrategy::Static) {
            slot_types.push(self.reference_type.clone());
        }
        slot_types.extend(self.plan.params.iter().cloned());

        let mut slots = Vec::with_capacity(slot_types.len());
        for ty in &slot_types {
            let left = reference.values_for(ty);
            let right = submission.values_for(ty);
            if left.len() != right.len() {
                return Err(EngineError::engine(format!(
                    "{kind:?} cases for {ty} differ between sides ({} vs {})",
                    left.len(),
                    right.len()
                )));
            }
            slots.push(left.into_iter().zip(right).collect());
        }
        Ok(slots)
    }

    /// Literal combinations of one case kind. Every combination is used, in
    /// declared order, when they fit under the cap; otherwise the cap is
    /// filled with combinations sampled by the control stream.
    fn injected(&mut self, kind: CaseKind) -> Vec<InjectedCase> {
        let (cap, trial_kind) = match kind {
            CaseKind::Edge => (self.arguments.max_only_edge_case_tests, TrialKind::Edge),
            CaseKind::Simple => (self.arguments.max_only_simple_case_tests, TrialKind::Simple),
        };
        let slots = match kind {
            CaseKind::Edge => &self.edge_slots,
            CaseKind::Simple => &self.simple_slots,
        };
        if slots.iter().all(Vec::is_empty) {
            return Vec::new();
        }
        let combinations = slots
            .iter()
            .filter(|s| !s.is_empty())
            .fold(1u64, |acc, s| acc.saturating_mul(s.len() as u64));
        let cap = u64::from(cap);
        let picks: Vec<u64> = if combinations <= cap {
            (0..combinations).collect()
        } else {
            (0..cap)
                .map(|_| self.streams.control.gen_range(0..combinations))
                .collect()
        };

        picks
            .into_iter()
            .map(|mut k| {
                let mut chosen = vec![None; slots.len()];
                // The first slot is the most significant digit.
                for (i, values) in slots.iter().enumerate().rev() {
                    if values.is_empty() {
                        continue;
                    }
                    let radix = values.len() as u64;
                    let (left, right) = &values[(k % radix) as usize];
                    chosen[i] = Some((left.deep_copy(), right.deep_copy()));
                    k /= radix;
                }
                InjectedCase {
                    kind: trial_kind,
                    slots: chosen,
                }
            })
            .collect()
    }

    /// A random case pair for `slot`, if that slot has cases of this kind.
    fn pick_case(&mut self, kind: CaseKind, slot: usize) -> Option<Pair> {
        let slots = match kind {
            CaseKind::Edge => &self.edge_slots,
            CaseKind::Simple => &self.simple_slots,
        };
        let values = slots.get(slot).filter(|v| !v.is_empty())?;
        let (left, right) = &values[self.streams.reference.gen_range(0..values.len())];
        Some((left.deep_copy(), right.deep_copy()))
    }

    fn prepare_injected(&mut self, index: u32, case: InjectedCase) -> Result<Prepared, Interrupt> {
        let mut slots = case.slots.into_iter();
        let receivers = if matches!(self.plan.receiver, ReceiverStrategy::Static) {
            None
        } else {
            match slots.next().flatten() {
                Some(pair) => Some(pair),
                None => self.receivers(index, 0)?,
            }
        };
        let gens = match &self.plan.arguments {
            ArgumentSource::Slots(gens) => gens.clone(),
            ArgumentSource::Grouped(_) => Vec::new(),
        };
        let mut args = (Vec::new(), Vec::new());
        for (slot, gen) in slots.zip(gens) {
            let (left, right) = match slot {
                Some(pair) => pair,
                None => self.pair("argument generation", |rng, side| gen.generate(0, rng, side))?,
            };
            args.0.push(left);
            args.1.push(right);
        }
        Ok(Prepared { receivers, args })
    }

    fn prepare_generated(
        &mut self,
        index: u32,
        kind: TrialKind,
        complexity: u32,
    ) -> Result<Prepared, Interrupt> {
        let receivers = if kind == TrialKind::Regression {
            let pick = self.streams.control.gen_range(0..self.history.len());
            Some(self.history[pick].clone())
        } else {
            self.receivers(index, complexity)?
        };
        let args = match kind {
            TrialKind::EdgeSimpleMixed => self.mixed_arguments(None)?,
            TrialKind::GeneratedMixed => self.mixed_arguments(Some(complexity))?,
            _ => self.arguments_at(complexity)?,
        };
        Ok(Prepared { receivers, args })
    }

    fn receivers(&mut self, index: u32, complexity: u32) -> Result<Option<Pair>, Interrupt> {
        let plan = self.plan;
        let pair = match &plan.receiver {
            ReceiverStrategy::Static => return Ok(None),
            ReceiverStrategy::Generator(gen) => {
                let gen = gen.clone();
                self.pair("receiver generation", |rng, side| gen.generate(complexity, rng, side))?
            }
            ReceiverStrategy::Constructor => self.pair("receiver construction", |_, side| {
                side.construct_default().map(Value::Object)
            })?,
            ReceiverStrategy::Next { method, initial } => {
                let method = *method;
                let pair = match (self.chain.take(), initial.clone()) {
                    (Some((left, right)), _) => {
                        let i = Value::Int(i32::try_from(index).unwrap_or(i32::MAX));
                        let mut previous = [Some(left), Some(right)].into_iter();
                        self.pair("@Next", |rng, side| {
                            let current = previous.next().flatten().unwrap_or(Value::Null);
                            side.run_hook(HookKind::Next, method, &[current, i.clone()], Some(rng))
                        })?
                    }
                    (None, Some(gen)) => {
                        self.pair("receiver generation", |rng, side| gen.generate(complexity, rng, side))?
                    }
                    (None, None) => self.pair("@Next", |rng, side| {
                        side.run_hook(HookKind::Next, method, &[Value::Null, Value::Int(0)], Some(rng))
                    })?,
                };
                self.chain = Some(pair.clone());
                pair
            }
        };
        for value in [&pair.0, &pair.1] {
            if !matches!(value, Value::Object(_)) {
                return Err(Interrupt::Fatal(EngineError::engine(format!(
                    "{} produced {} instead of a receiver",
                    self.plan.receiver.describe(),
                    value.kind_name()
                ))));
            }
        }
        Ok(Some(pair))
    }

    fn arguments_at(&mut self, complexity: u32) -> Result<(Vec<Value>, Vec<Value>), Interrupt> {
        let plan = self.plan;
        let mut args = (Vec::new(), Vec::new());
        match &plan.arguments {
            ArgumentSource::Slots(gens) => {
                for gen in gens {
                    let (left, right) = self.pair("argument generation", |rng, side| {
                        gen.generate(complexity, rng, side)
                    })?;
                    args.0.push(left);
                    args.1.push(right);
                }
            }
            ArgumentSource::Grouped(grouped) => {
                let (left, right) = self.pair("grouped generation", |rng, side| {
                    grouped.generate_group(complexity, rng, side).map(Value::Tuple)
                })?;
                for (values, tuple) in [(&mut args.0, left), (&mut args.1, right)] {
                    if let Value::Tuple(items) = tuple {
                        values.extend(items);
                    }
                }
            }
        }
        Ok(args)
    }

    /// Arguments drawn slot by slot from the case tables.
    ///
    /// Without a complexity, each slot flips between its edge and simple cases
    /// and generates a low-complexity value when the flipped table is empty.
    /// With one, each slot picks edge, simple or generated with equal odds, and
    /// generates when the picked table is empty.
    fn mixed_arguments(
        &mut self,
        complexity: Option<u32>,
    ) -> Result<(Vec<Value>, Vec<Value>), Interrupt> {
        let plan = self.plan;
        let ArgumentSource::Slots(gens) = &plan.arguments else {
            return self.arguments_at(complexity.unwrap_or(0));
        };
        let offset = usize::from(!matches!(plan.receiver, ReceiverStrategy::Static));
        let mut args = (Vec::new(), Vec::new());
        for (i, gen) in gens.iter().enumerate() {
            let slot = i + offset;
            let (picked, fallback) = match complexity {
                None => {
                    let edge = self.streams.reference.gen_bool(0.5);
                    let picked = if edge {
                        self.pick_case(CaseKind::Edge, slot)
                    } else {
                        self.pick_case(CaseKind::Simple, slot)
                    };
                    let fallback = if edge {
                        0
                    } else {
                        MIXED_COMPLEXITY.min(self.arguments.max_complexity)
                    };
                    (picked, fallback)
                }
                Some(c) => {
                    let picked = match self.streams.reference.gen_range(0..3) {
                        0 => self.pick_case(CaseKind::Edge, slot),
                        1 => self.pick_case(CaseKind::Simple, slot),
                        _ => None,
                    };
                    (picked, c)
                }
            };
            let (left, right) = match picked {
                Some(pair) => pair,
                None => self.pair("argument generation", |rng, side| {
                    gen.generate(fallback, rng, side)
                })?,
            };
            args.0.push(left);
            args.1.push(right);
        }
        Ok(args)
    }

    fn precondition_holds(&mut self, prepared: &Prepared) -> Result<bool, EngineError> {
        let Some(method) = self.plan.precondition else {
            return Ok(true);
        };
        let def = self.reference_side.primary().clone();
        let pre = def
            .method_at(method)
            .ok_or_else(|| EngineError::engine(format!("no precondition method #{method}")))?;
        // The precondition sees copies so it cannot disturb the judged call.
        let receiver = match &prepared.receivers {
            Some((Value::Object(o), _)) => Some(o.unwrapped().deep_copy()),
            _ => None,
        };
        let args: Vec<Value> = prepared.args.0.iter().map(Value::deep_copy).collect();
        let (result, _) = self.reference_side.invoke_root(
            Scope::Member(def.clone()),
            receiver,
            pre,
            &args,
            None,
            Arc::new(std::sync::atomic::AtomicBool::new(false)),
        );
        match result {
            Ok(Value::Bool(holds)) => Ok(holds),
            Ok(other) => Err(EngineError::engine(format!(
                "precondition {} returned {}",
                pre.name,
                other.kind_name()
            ))),
            Err(fault) => Err(EngineError::engine(format!(
                "precondition {} failed: {fault}",
                pre.name
            ))),
        }
    }

    fn judge(&mut self, prepared: &Prepared) -> Result<Judgement, EngineError> {
        let (reference_receiver, submission_receiver) = match &prepared.receivers {
            Some((Value::Object(left), Value::Object(right))) => {
                (Some(left.clone()), Some(right.clone()))
            }
            _ => (None, None),
        };

        let (reference, submission) = match (self.plan.method, self.submission_method) {
            (Some(reference_method), Some(submission_method)) => {
                let timeout = self.plan.timeout;
                let reference = match execute(
                    Call {
                        side: self.reference_side.clone(),
                        method: reference_method,
                        receiver: reference_receiver,
                        args: prepared.args.0.clone(),
                    },
                    timeout,
                ) {
                    Ok(out) => out,
                    Err(CallError::TimedOut) => {
                        return Ok(Judgement {
                            reference: Some(timed_out_summary()),
                            ..Judgement::new(Verdict::TimedOut, timeout_message("reference", timeout))
                        })
                    }
                    Err(CallError::Engine(msg)) => return Err(EngineError::Engine(msg)),
                };
                let submission = match execute(
                    Call {
                        side: self.submission_side.clone(),
                        method: submission_method,
                        receiver: submission_receiver,
                        args: prepared.args.1.clone(),
                    },
                    timeout,
                ) {
                    Ok(out) => out,
                    Err(CallError::TimedOut) => {
                        return Ok(Judgement {
                            reference: Some(reference.summary()),
                            submission: Some(timed_out_summary()),
                            ..Judgement::new(Verdict::TimedOut, timeout_message("submission", timeout))
                        })
                    }
                    Err(CallError::Engine(msg)) => return Err(EngineError::Engine(msg)),
                };
                (reference, submission)
            }
            _ => (
                TestOutput::verify_only(reference_receiver.map(Value::Object)),
                TestOutput::verify_only(submission_receiver.map(Value::Object)),
            ),
        };

        let reference_summary = reference.summary();
        let submission_summary = submission.summary();
        let outcome = match self.plan.verifier {
            Some((method, takes_random)) => {
                let violations = self.violation_count();
                let random = if takes_random {
                    Some(&mut self.streams.control)
                } else {
                    None
                };
                let result = custom_verify(
                    &self.reference_side,
                    &self.submission_side,
                    method,
                    &reference,
                    submission,
                    random,
                );
                match result {
                    Err(VerifyFailure::Engine(msg)) => return Err(EngineError::Engine(msg)),
                    Err(VerifyFailure::Unsafe(v)) => Err((Verdict::UnsafeGenerator, v.to_string())),
                    Err(VerifyFailure::Mismatch(msg)) => Err((Verdict::VerificationFailed, msg)),
                    Ok(()) if self.violation_count() > violations => {
                        Err((Verdict::UnsafeGenerator, self.last_violation()))
                    }
                    Ok(()) => Ok(()),
                }
            }
            None => default_verify(&reference, &submission, self.plan.prints)
                .map_err(|msg| (Verdict::VerificationFailed, msg)),
        };
        let (verdict, message) = match outcome {
            Ok(()) => (Verdict::Passed, None),
            Err((verdict, message)) => (verdict, Some(message)),
        };
        Ok(Judgement {
            verdict,
            message,
            reference: Some(reference_summary),
            submission: Some(submission_summary),
        })
    }

    fn record(
        &mut self,
        report: &mut RunReport,
        index: u32,
        kind: TrialKind,
        complexity: u32,
        prepared: Option<&Prepared>,
        judgement: Judgement,
    ) {
        let receiver = prepared
            .and_then(|p| p.receivers.as_ref())
            .map(|(left, _)| left.to_string());
        let arguments: Vec<String> = prepared
            .map(|p| p.args.0.iter().map(|a| a.to_string()).collect())
            .unwrap_or_default();
        self.digest.update(format!(
            "{index}|{kind:?}|{}|{}\n",
            receiver.as_deref().unwrap_or("-"),
            arguments.join(",")
        ));
        debug!(
            trial = index,
            kind = ?kind,
            complexity,
            verdict = %judgement.verdict,
            "trial recorded"
        );
        report.trials.push(TrialRecord {
            index,
            kind,
            complexity,
            verdict: judgement.verdict,
            receiver,
            arguments,
            reference: judgement.reference,
            submission: judgement.submission,
            message: judgement.message,
        });
    }
}

fn timeout_message(side: &str, timeout: Option<Duration>) -> String {
    match timeout {
        Some(limit) => format!("{side} timed out after {}ms", limit.as_millis()),
        None => format!("{side} timed out"),
    }
}
