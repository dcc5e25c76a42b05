//! Loaded questions and the run entry points.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use rayon::prelude::*;
use tracing::{info, warn};

use diffgrade_types::{RunConfig, RunReport, Verdict};

use crate::contract::TypeDef;
use crate::controller::{ArgumentSource, Controller, Plan, ReceiverStrategy};
use crate::error::EngineError;
use crate::generators::{
    BindingSource, Gen, GeneratorKey, GeneratorRegistry, GroupedGen, HookGen,
};
use crate::roles::{RoleKind, RoleTable, RoleViolation};
use crate::validate::validate;
use crate::value::TypeDescriptor;

/// Seed of the reference self-check.
pub const SELF_CHECK_SEED: u64 = 0x0403;
/// Upper bound on self-check trials per runnable name.
pub const SELF_CHECK_TRIALS: u32 = 64;

/// Options applied when a reference type is loaded.
#[derive(Clone)]
pub struct LoadOptions {
    /// Value types the reference and submission may construct by name.
    pub auxiliary: Vec<Arc<TypeDef>>,
    /// Default generators for types the built-ins do not cover.
    pub generators: Vec<(GeneratorKey, Arc<dyn Gen>)>,
    /// Run the reference against itself after loading.
    pub self_check: bool,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            auxiliary: Vec::new(),
            generators: Vec::new(),
            self_check: true,
        }
    }
}

impl LoadOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_auxiliary(mut self, def: Arc<TypeDef>) -> Self {
        self.auxiliary.push(def);
        self
    }

    pub fn with_generator(mut self, key: GeneratorKey, gen: Arc<dyn Gen>) -> Self {
        self.generators.push((key, gen));
        self
    }

    pub fn with_self_check(mut self, enabled: bool) -> Self {
        self.self_check = enabled;
        self
    }
}

/// A validated reference type with its generators and per-solution plans.
pub struct Question {
    reference: Arc<TypeDef>,
    auxiliary: Vec<Arc<TypeDef>>,
    roles: RoleTable,
    plans: BTreeMap<String, Plan>,
}

impl Question {
    /// Validate `reference`, assemble its generators and plans, and optionally
    /// run the reference against itself.
    pub fn load(reference: Arc<TypeDef>, options: &LoadOptions) -> Result<Self, EngineError> {
        let roles = validate(&reference).map_err(EngineError::LoadValidation)?;
        let registry = assemble_registry(&reference, &roles, options)?;
        let mut plans = BTreeMap::new();
        for name in roles.runnable_names() {
            let plan = build_plan(&reference, &roles, &registry, &name)?;
            plans.insert(name, plan);
        }
        let question = Self {
            reference,
            auxiliary: options.auxiliary.clone(),
            roles,
            plans,
        };
        info!(
            reference = question.reference.name(),
            solutions = ?question.solutions(),
            "question loaded"
        );
        if options.self_check {
            question.self_check()?;
        }
        Ok(question)
    }

    pub fn reference(&self) -> &Arc<TypeDef> {
        &self.reference
    }

    pub fn roles(&self) -> &RoleTable {
        &self.roles
    }

    /// Runnable names, sorted.
    pub fn solutions(&self) -> Vec<String> {
        self.plans.keys().cloned().collect()
    }

    /// Run the reference against itself for every runnable name. Any
    /// non-passing trial is reported as a load error.
    fn self_check(&self) -> Result<(), EngineError> {
        let mut violations = Vec::new();
        for (name, plan) in &self.plans {
            let trials = plan
                .declared
                .as_ref()
                .map(|a| a.resolve().num_tests)
                .unwrap_or(SELF_CHECK_TRIALS)
                .min(SELF_CHECK_TRIALS);
            let config = RunConfig::new(name.clone())
                .with_num_tests(trials)
                .with_seed(SELF_CHECK_SEED)
                .with_stop_on_first_failure(true)
                .with_self_check(false);
            let member = plan
                .method
                .and_then(|m| self.reference.method_at(m))
                .map(|m| m.name.clone())
                .unwrap_or_else(|| name.clone());
            match self.run(&self.reference, &config) {
                Ok(report) => {
                    if let Some(failure) = report.failures().next() {
                        violations.push(RoleViolation::new(
                            member,
                            RoleKind::Solution,
                            format!(
                                "reference failed its self-check at trial {} ({}): {}",
                                failure.index,
                                failure.verdict,
                                failure.message.as_deref().unwrap_or("")
                            ),
                        ));
                    }
                }
                Err(e) => violations.push(RoleViolation::new(
                    member,
                    RoleKind::Solution,
                    format!("reference failed its self-check: {e}"),
                )),
            }
        }
        if violations.is_empty() {
            Ok(())
        } else {
            warn!(reference = self.reference.name(), failures = violations.len(), "self-check failed");
            Err(EngineError::LoadValidation(violations))
        }
    }

    /// Run `submission` against the reference. Fatal errors are returned; the
    /// trials recorded before them are dropped.
    pub fn run(&self, submission: &Arc<TypeDef>, config: &RunConfig) -> Result<RunReport, EngineError> {
        let (report, fatal) = self.run_inner(submission, config);
        match fatal {
            Some(e) => Err(e),
            None => Ok(report),
        }
    }

    /// Run `submission` against the reference, folding any fatal error into
    /// the report as a terminal trial.
    pub fn run_report(&self, submission: &Arc<TypeDef>, config: &RunConfig) -> RunReport {
        let (mut report, fatal) = self.run_inner(submission, config);
        if let Some(e) = fatal {
            report.push_fatal(e.verdict(), e.to_string());
        }
        report
    }

    fn run_inner(
        &self,
        submission: &Arc<TypeDef>,
        config: &RunConfig,
    ) -> (RunReport, Option<EngineError>) {
        let started = Instant::now();
        let seed = config.seed.unwrap_or_else(clock_seed);
        let solution = if config.solution.is_empty() {
            self.plans.keys().next().cloned().unwrap_or_default()
        } else {
            config.solution.clone()
        };
        let mut report = RunReport::new(self.reference.name(), submission.name(), &solution, seed);

        let result = self.plans.get(&solution).ok_or_else(|| EngineError::SubmissionMismatch {
            solution: solution.clone(),
            reason: format!(
                "{} declares no solution named \"{solution}\"",
                self.reference.name()
            ),
        });
        let result = result.and_then(|plan| {
            let arguments = config
                .arguments
                .apply_over(&plan.declared.clone().unwrap_or_default())
                .resolve();
            report.arguments = arguments;
            let submission_method = self.match_submission(plan, submission)?;
            Controller::new(
                plan,
                config,
                arguments,
                seed,
                &self.reference,
                submission,
                &self.auxiliary,
                submission_method,
            )
            .run(&mut report)
        });

        report.elapsed_ms = started.elapsed().as_millis() as u64;
        info!(
            reference = %report.reference,
            submission = %report.submission,
            solution = %report.solution,
            seed,
            passed = report.count(Verdict::Passed),
            trials = report.trials.len(),
            discarded = report.discarded,
            "run finished"
        );
        if let Err(e) = &result {
            warn!(error = %e, "run aborted");
        }
        (report, result.err())
    }

    /// Find the submission's member for the plan's solution: same name,
    /// static-ness, parameters and return type, with the reference type name
    /// standing for the submission's own.
    fn match_submission(
        &self,
        plan: &Plan,
        submission: &Arc<TypeDef>,
    ) -> Result<Option<usize>, EngineError> {
        let Some(method) = plan.method.and_then(|m| self.reference.method_at(m)) else {
            return Ok(None);
        };
        let from = self.reference.name();
        let to = submission.name();
        let params: Vec<TypeDescriptor> = plan.params.iter().map(|t| rename(t, from, to)).collect();
        let index = submission
            .find_method(&method.name, plan.is_static, &params)
            .ok_or_else(|| EngineError::SubmissionMismatch {
                solution: plan.name.clone(),
                reason: format!("{} has no member {}", to, method.signature()),
            })?;
        let expected = plan.returns.as_ref().map(|t| rename(t, from, to));
        let found = submission.method_at(index).and_then(|m| m.returns.clone());
        if expected != found {
            return Err(EngineError::SubmissionMismatch {
                solution: plan.name.clone(),
                reason: format!(
                    "{}.{} returns {} instead of {}",
                    to,
                    method.name,
                    found.map(|t| t.to_string()).unwrap_or_else(|| "void".into()),
                    expected.map(|t| t.to_string()).unwrap_or_else(|| "void".into())
                ),
            });
        }
        Ok(Some(index))
    }
}

/// Load `reference` and run `submission` against it, folding every error into
/// the returned report.
pub fn run_tests(reference: &Arc<TypeDef>, submission: &Arc<TypeDef>, config: &RunConfig) -> RunReport {
    let options = LoadOptions::default().with_self_check(config.self_check);
    match Question::load(reference.clone(), &options) {
        Ok(question) => question.run_report(submission, config),
        Err(e) => {
            let mut report = RunReport::new(
                reference.name(),
                submission.name(),
                &config.solution,
                config.seed.unwrap_or_default(),
            );
            report.push_fatal(e.verdict(), e.to_string());
            report
        }
    }
}

/// Run many submissions concurrently. Each run owns its random streams and
/// proxy registries; reports come back in submission order.
pub fn run_batch(question: &Question, submissions: &[Arc<TypeDef>], config: &RunConfig) -> Vec<RunReport> {
    submissions
        .par_iter()
        .map(|submission| question.run_report(submission, config))
        .collect()
}

fn clock_seed() -> u64 {
    let now = Utc::now();
    now.timestamp_nanos_opt()
        .map(|n| n as u64)
        .unwrap_or_else(|| now.timestamp() as u64)
}

fn rename(ty: &TypeDescriptor, from: &str, to: &str) -> TypeDescriptor {
    match ty {
        TypeDescriptor::Named(name) if name == from => TypeDescriptor::named(to),
        TypeDescriptor::Array(element) => TypeDescriptor::array_of(rename(element, from, to)),
        TypeDescriptor::Tuple(items) => {
            TypeDescriptor::Tuple(items.iter().map(|t| rename(t, from, to)).collect())
        }
        other => other.clone(),
    }
}

fn assemble_registry(
    reference: &TypeDef,
    roles: &RoleTable,
    options: &LoadOptions,
) -> Result<GeneratorRegistry, EngineError> {
    let mut registry = GeneratorRegistry::with_defaults();
    for (key, gen) in &options.generators {
        registry
            .register(key.clone(), gen.clone(), BindingSource::External)
            .map_err(|e| EngineError::engine(e.to_string()))?;
    }
    let mut violations = Vec::new();
    for entry in &roles.generators {
        let member = reference
            .method_at(entry.method)
            .map(|m| m.name.clone())
            .unwrap_or_default();
        let key = GeneratorKey {
            ty: entry.target.clone(),
            name: entry.name.clone(),
        };
        let gen = Arc::new(HookGen::new(entry.method, member.clone(), entry.target.clone()));
        if let Err(e) = registry.register(key, gen, BindingSource::Declared) {
            violations.push(RoleViolation::new(member, RoleKind::Generator, e.to_string()));
        }
    }
    if violations.is_empty() {
        Ok(registry)
    } else {
        Err(EngineError::LoadValidation(violations))
    }
}

fn build_plan(
    reference: &TypeDef,
    roles: &RoleTable,
    registry: &GeneratorRegistry,
    name: &str,
) -> Result<Plan, EngineError> {
    let solution = roles.solutions.get(name);
    let verifier = roles.verifiers.get(name);
    let method = solution.and_then(|s| reference.method_at(s.method));
    let self_type = TypeDescriptor::named(reference.name());

    let mut slots = Vec::new();
    let arguments = match (roles.grouped.get(name), method) {
        (Some(grouped), Some(m)) => {
            let member = reference
                .method_at(grouped.method)
                .map(|g| g.name.clone())
                .unwrap_or_default();
            ArgumentSource::Grouped(GroupedGen::new(grouped.method, member, m.params.len()))
        }
        (_, Some(m)) => {
            for param in &m.params {
                let gen = registry
                    .resolve(&param.ty, param.use_generator.as_deref())
                    .map_err(|e| EngineError::MissingGenerator {
                        slot: format!("parameter {} of {}", param.name, m.name),
                        reason: e.to_string(),
                    })?;
                slots.push(gen);
            }
            ArgumentSource::Slots(slots)
        }
        (_, None) => ArgumentSource::Slots(slots),
    };

    let needs_receiver = solution.map(|s| !s.is_static).unwrap_or(true);
    let receiver = if !needs_receiver {
        ReceiverStrategy::Static
    } else if let Some(next) = roles.next {
        ReceiverStrategy::Next {
            method: next,
            initial: registry.resolve(&self_type, None).ok(),
        }
    } else if let Ok(gen) = registry.resolve(&self_type, None) {
        ReceiverStrategy::Generator(gen)
    } else if reference.has_public_default_constructor() {
        ReceiverStrategy::Constructor
    } else if solution.is_some() {
        return Err(EngineError::MissingGenerator {
            slot: format!("receiver of {name}"),
            reason: format!(
                "{} declares no @Next, no @Generator and no public no-argument constructor",
                reference.name()
            ),
        });
    } else {
        ReceiverStrategy::Static
    };

    Ok(Plan {
        name: name.to_string(),
        method: solution.map(|s| s.method),
        is_static: solution.map(|s| s.is_static).unwrap_or(false),
        params: method.map(|m| m.param_types()).unwrap_or_default(),
        returns: method.and_then(|m| m.returns.clone()),
        arguments,
        receiver,
        precondition: roles.preconditions.get(name).copied(),
        verifier: verifier.map(|v| (v.method, v.takes_random)),
        prints: solution.map(|s| s.prints).unwrap_or(false),
        timeout: solution
            .and_then(|s| s.timeout)
            .or_else(|| verifier.and_then(|v| v.timeout)),
        declared: solution
            .and_then(|s| s.arguments.clone())
            .or_else(|| verifier.and_then(|v| v.arguments.clone())),
        edge_sources: roles.edge_cases.clone(),
        simple_sources: roles.simple_cases.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rename_maps_nested_self_types() {
        let ty = TypeDescriptor::array_of(TypeDescriptor::array_of(TypeDescriptor::named("Ref")));
        assert_eq!(
            rename(&ty, "Ref", "Sub"),
            TypeDescriptor::array_of(TypeDescriptor::array_of(TypeDescriptor::named("Sub")))
        );
        assert_eq!(rename(&TypeDescriptor::Int, "Ref", "Sub"), TypeDescriptor::Int);
    }
}
