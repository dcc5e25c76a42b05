//! Structural validation of role declarations.
//!
//! Validation never runs code. Every member is checked against the shape rule of
//! each role it carries, cross-member pairings are checked afterwards, and all
//! violations are returned together.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use diffgrade_types::RunArguments;

use crate::contract::{MethodBody, MethodDef, TypeDef};
use crate::roles::{
    CaseSource, GeneratorEntry, GroupedEntry, MemberRef, Role, RoleKind, RoleTable,
    RoleViolation, SolutionEntry, VerifyEntry,
};
use crate::value::TypeDescriptor;

struct Collector {
    violations: Vec<RoleViolation>,
}

impl Collector {
    fn push(&mut self, member: &str, role: RoleKind, message: impl Into<String>) {
        self.violations
            .push(RoleViolation::new(member, role, message));
    }
}

/// Per-member settings that attach to a Solution or standalone Verify on the same member.
#[derive(Default)]
struct Attachments {
    timeout: Option<Duration>,
    arguments: Option<RunArguments>,
}

/// Validate every role on `def` and build its role table.
pub fn validate(def: &TypeDef) -> Result<RoleTable, Vec<RoleViolation>> {
    let mut out = Collector {
        violations: Vec::new(),
    };
    let mut table = RoleTable::default();
    let self_type = TypeDescriptor::named(def.name());
    let mut generator_keys: BTreeSet<(TypeDescriptor, Option<String>)> = BTreeSet::new();
    let mut edge_types: BTreeSet<TypeDescriptor> = BTreeSet::new();
    let mut simple_types: BTreeSet<TypeDescriptor> = BTreeSet::new();
    let mut argument_names: BTreeSet<String> = BTreeSet::new();

    for ctor in def.constructors() {
        if let Some(role) = ctor.roles.first() {
            out.push(&ctor.name, role.kind(), "constructors cannot carry roles");
        }
    }

    for (index, method) in def.methods().iter().enumerate() {
        let name = method.name.as_str();
        check_member_exclusivity(name, &method.roles, &mut out);
        let attachments = collect_attachments(method, &mut out);

        for role in &method.roles {
            match role {
                Role::Solution { name: solution, prints } => {
                    if table.solutions.contains_key(solution) {
                        out.push(name, RoleKind::Solution, format!("duplicate @Solution \"{solution}\""));
                        continue;
                    }
                    table.solutions.insert(
                        solution.clone(),
                        SolutionEntry {
                            method: index,
                            is_static: method.is_static,
                            prints: *prints,
                            timeout: attachments.timeout,
                            arguments: attachments.arguments.clone(),
                        },
                    );
                }
                Role::Verify { name: verify, standalone } => {
                    let takes_random = check_verify_shape(method, &mut out);
                    if table.verifiers.contains_key(verify) {
                        out.push(name, RoleKind::Verify, format!("duplicate @Verify \"{verify}\""));
                        continue;
                    }
                    table.verifiers.insert(
                        verify.clone(),
                        VerifyEntry {
                            method: index,
                            standalone: *standalone,
                            takes_random,
                            timeout: if *standalone { attachments.timeout } else { None },
                            arguments: if *standalone {
                                attachments.arguments.clone()
                            } else {
                                None
                            },
                        },
                    );
                }
                Role::Generator { name: generator } => {
                    check_static(method, RoleKind::Generator, &mut out);
                    check_params(
                        method,
                        RoleKind::Generator,
                        &[TypeDescriptor::Int, TypeDescriptor::RandomSource],
                        "(int complexity, Random random)",
                        &mut out,
                    );
                    let Some(target) = method.returns.clone() else {
                        out.push(name, RoleKind::Generator, "must return the generated type");
                        continue;
                    };
                    if matches!(target, TypeDescriptor::Tuple(_)) || !target.is_generatable() {
                        out.push(
                            name,
                            RoleKind::Generator,
                            format!("cannot generate values of type {target}"),
                        );
                        continue;
                    }
                    if !generator_keys.insert((target.clone(), generator.clone())) {
                        out.push(
                            name,
                            RoleKind::Generator,
                            format!(
                                "duplicate generator for {target}{}",
                                generator
                                    .as_ref()
                                    .map(|g| format!(" named \"{g}\""))
                                    .unwrap_or_default()
                            ),
                        );
                        continue;
                    }
                    table.generators.push(GeneratorEntry {
                        method: index,
                        target,
                        name: generator.clone(),
                    });
                }
                Role::GroupedGenerator { solution } => {
                    check_static(method, RoleKind::GroupedGenerator, &mut out);
                    check_params(
                        method,
                        RoleKind::GroupedGenerator,
                        &[TypeDescriptor::Int, TypeDescriptor::RandomSource],
                        "(int complexity, Random random)",
                        &mut out,
                    );
                    let types = match &method.returns {
                        Some(TypeDescriptor::Tuple(types)) if !types.is_empty() => types.clone(),
                        _ => {
                            out.push(name, RoleKind::GroupedGenerator, "must return a non-empty tuple");
                            continue;
                        }
                    };
                    if table.grouped.contains_key(solution) {
                        out.push(
                            name,
                            RoleKind::GroupedGenerator,
                            format!("duplicate grouped generator for \"{solution}\""),
                        );
                        continue;
                    }
                    table.grouped.insert(
                        solution.clone(),
                        GroupedEntry {
                            method: index,
                            types,
                        },
                    );
                }
                Role::Next => {
                    check_static(method, RoleKind::Next, &mut out);
                    check_params(
                        method,
                        RoleKind::Next,
                        &[
                            self_type.clone(),
                            TypeDescriptor::Int,
                            TypeDescriptor::RandomSource,
                        ],
                        &format!("({} current, int iteration, Random random)", def.name()),
                        &mut out,
                    );
                    if method.returns.as_ref() != Some(&self_type) {
                        out.push(name, RoleKind::Next, format!("must return {}", def.name()));
                    }
                    if table.next.is_some() {
                        out.push(name, RoleKind::Next, "only one @Next may be declared");
                        continue;
                    }
                    table.next = Some(index);
                }
                Role::Precondition { name: precondition } => {
                    if method.returns != Some(TypeDescriptor::Bool) {
                        out.push(name, RoleKind::Precondition, "must return boolean");
                    }
                    if table.preconditions.contains_key(precondition) {
                        out.push(
                            name,
                            RoleKind::Precondition,
                            format!("duplicate @Precondition \"{precondition}\""),
                        );
                        continue;
                    }
                    table.preconditions.insert(precondition.clone(), index);
                }
                Role::EdgeCase | Role::SimpleCase => {
                    let kind = role.kind();
                    check_static(method, kind, &mut out);
                    if !method.params.is_empty() {
                        out.push(name, kind, "must not take parameters");
                    }
                    let Some(element) = method.returns.as_ref().and_then(|t| t.element()).cloned()
                    else {
                        out.push(name, kind, "must return an array of the case type");
                        continue;
                    };
                    let seen = if kind == RoleKind::EdgeCase {
                        &mut edge_types
                    } else {
                        &mut simple_types
                    };
                    if !seen.insert(element.clone()) {
                        out.push(name, kind, format!("duplicate @{kind} for {element}"));
                        continue;
                    }
                    let source = CaseSource {
                        member: MemberRef::Method(index),
                        element,
                    };
                    if kind == RoleKind::EdgeCase {
                        table.edge_cases.push(source);
                    } else {
                        table.simple_cases.push(source);
                    }
                }
                Role::Timeout { .. } => {}
                Role::RunArguments(_) => {
                    for runnable in method.roles.iter().filter_map(|r| match r {
                        Role::Solution { name, .. } => Some(name),
                        Role::Verify {
                            name,
                            standalone: true,
                        } => Some(name),
                        _ => None,
                    }) {
                        if !argument_names.insert(runnable.clone()) {
                            out.push(
                                name,
                                RoleKind::RunArguments,
                                format!("\"{runnable}\" already has @RunArguments"),
                            );
                        }
                    }
                }
            }
        }
    }

    for (index, field) in def.fields().iter().enumerate() {
        check_member_exclusivity(&field.name, &field.roles, &mut out);
        for role in &field.roles {
            let kind = role.kind();
            if !matches!(kind, RoleKind::EdgeCase | RoleKind::SimpleCase) {
                out.push(&field.name, kind, format!("only methods may declare @{kind}"));
                continue;
            }
            if !field.is_static {
                out.push(&field.name, kind, "field must be static");
            }
            let Some(element) = field.ty.element().cloned() else {
                out.push(&field.name, kind, "field must store an array of the case type");
                continue;
            };
            if element == self_type {
                out.push(
                    &field.name,
                    kind,
                    format!("cases for {} must come from a method", def.name()),
                );
                continue;
            }
            let seen = if kind == RoleKind::EdgeCase {
                &mut edge_types
            } else {
                &mut simple_types
            };
            if !seen.insert(element.clone()) {
                out.push(&field.name, kind, format!("duplicate @{kind} for {element}"));
                continue;
            }
            let source = CaseSource {
                member: MemberRef::Field(index),
                element,
            };
            if kind == RoleKind::EdgeCase {
                table.edge_cases.push(source);
            } else {
                table.simple_cases.push(source);
            }
        }
    }

    check_pairings(def, &table, &generator_keys, &mut out);

    if out.violations.is_empty() {
        Ok(table)
    } else {
        Err(out.violations)
    }
}

fn check_member_exclusivity(member: &str, roles: &[Role], out: &mut Collector) {
    let mut counts: BTreeMap<RoleKind, usize> = BTreeMap::new();
    for role in roles {
        *counts.entry(role.kind()).or_default() += 1;
    }
    for (kind, count) in &counts {
        let repeatable = matches!(kind, RoleKind::Solution | RoleKind::Verify);
        if *count > 1 && !repeatable {
            out.push(member, *kind, format!("@{kind} declared {count} times"));
        }
    }
    if counts.contains_key(&RoleKind::EdgeCase) && counts.contains_key(&RoleKind::SimpleCase) {
        out.push(
            member,
            RoleKind::EdgeCase,
            "cannot be both @EdgeCase and @SimpleCase",
        );
    }
}

fn collect_attachments(method: &MethodDef, out: &mut Collector) -> Attachments {
    let runnable = method.roles.iter().any(|r| {
        matches!(
            r,
            Role::Solution { .. }
                | Role::Verify {
                    standalone: true,
                    ..
                }
        )
    });
    let mut attachments = Attachments::default();
    for role in &method.roles {
        match role {
            Role::Timeout { millis } => {
                if *millis == 0 {
                    out.push(&method.name, RoleKind::Timeout, "timeout must be strictly positive");
                } else {
                    attachments.timeout = Some(Duration::from_millis(*millis));
                }
                if !runnable {
                    out.push(
                        &method.name,
                        RoleKind::Timeout,
                        "must be paired with @Solution or a standalone @Verify",
                    );
                }
            }
            Role::RunArguments(arguments) => {
                if !runnable {
                    out.push(
                        &method.name,
                        RoleKind::RunArguments,
                        "can only be attached to @Solution or a standalone @Verify",
                    );
                }
                attachments.arguments = Some(arguments.clone());
            }
            _ => {}
        }
    }
    attachments
}

fn check_static(method: &MethodDef, role: RoleKind, out: &mut Collector) {
    if !method.is_static {
        out.push(&method.name, role, "must be static");
    }
}

fn check_params(
    method: &MethodDef,
    role: RoleKind,
    expected: &[TypeDescriptor],
    shape: &str,
    out: &mut Collector,
) {
    if method.param_types() != expected {
        out.push(
            &method.name,
            role,
            format!("parameters must be {shape}, found ({})", describe(&method.param_types())),
        );
    }
}

/// Returns whether the verifier takes a trailing random source.
fn check_verify_shape(method: &MethodDef, out: &mut Collector) -> bool {
    check_static(method, RoleKind::Verify, out);
    if method.returns.is_some() {
        out.push(&method.name, RoleKind::Verify, "must not return a value");
    }
    if !matches!(method.body, MethodBody::Verify(_)) {
        out.push(&method.name, RoleKind::Verify, "needs a verifier body");
    }
    let pair = [TypeDescriptor::Outcome, TypeDescriptor::Outcome];
    let with_random = [
        TypeDescriptor::Outcome,
        TypeDescriptor::Outcome,
        TypeDescriptor::RandomSource,
    ];
    let params = method.param_types();
    if params == pair {
        false
    } else if params == with_random {
        true
    } else {
        out.push(
            &method.name,
            RoleKind::Verify,
            format!(
                "parameters must be (TestOutput, TestOutput[, Random]), found ({})",
                describe(&params)
            ),
        );
        false
    }
}

fn check_pairings(
    def: &TypeDef,
    table: &RoleTable,
    generator_keys: &BTreeSet<(TypeDescriptor, Option<String>)>,
    out: &mut Collector,
) {
    let member = |index: usize| {
        def.method_at(index)
            .map(|m| m.name.clone())
            .unwrap_or_default()
    };

    for (name, verify) in &table.verifiers {
        if !verify.standalone && !table.solutions.contains_key(name) {
            out.push(
                &member(verify.method),
                RoleKind::Verify,
                format!("no @Solution named \"{name}\" (declare it standalone to verify receivers directly)"),
            );
        }
        if verify.standalone && table.solutions.contains_key(name) {
            let solution = &table.solutions[name];
            if solution.arguments.is_some() && verify.arguments.is_some() {
                out.push(
                    &member(verify.method),
                    RoleKind::RunArguments,
                    format!("\"{name}\" has @RunArguments on both @Solution and @Verify"),
                );
            }
        }
    }

    for (name, &index) in &table.preconditions {
        let Some(solution) = table.solutions.get(name) else {
            out.push(
                &member(index),
                RoleKind::Precondition,
                format!("no @Solution named \"{name}\""),
            );
            continue;
        };
        let (Some(pre), Some(sol)) = (def.method_at(index), def.method_at(solution.method)) else {
            continue;
        };
        if pre.is_static != sol.is_static {
            out.push(
                &pre.name,
                RoleKind::Precondition,
                format!(
                    "must be {} like its @Solution",
                    if sol.is_static { "static" } else { "an instance method" }
                ),
            );
        }
        if pre.param_types() != sol.param_types() {
            out.push(
                &pre.name,
                RoleKind::Precondition,
                format!(
                    "parameters ({}) must match @Solution parameters ({})",
                    describe(&pre.param_types()),
                    describe(&sol.param_types())
                ),
            );
        }
    }

    for (name, grouped) in &table.grouped {
        let Some(solution) = table.solutions.get(name) else {
            out.push(
                &member(grouped.method),
                RoleKind::GroupedGenerator,
                format!("no @Solution named \"{name}\""),
            );
            continue;
        };
        let Some(sol) = def.method_at(solution.method) else {
            continue;
        };
        let params = sol.param_types();
        if params.len() != grouped.types.len() {
            out.push(
                &member(grouped.method),
                RoleKind::GroupedGenerator,
                format!(
                    "tuple arity {} does not match the {} parameters of \"{name}\"",
                    grouped.types.len(),
                    params.len()
                ),
            );
        } else if params != grouped.types {
            out.push(
                &member(grouped.method),
                RoleKind::GroupedGenerator,
                format!(
                    "tuple ({}) does not match parameters ({}) of \"{name}\"",
                    describe(&grouped.types),
                    describe(&params)
                ),
            );
        }
    }

    for entry in table.solutions.values() {
        let Some(sol) = def.method_at(entry.method) else {
            continue;
        };
        for param in &sol.params {
            if let Some(generator) = &param.use_generator {
                if !generator_keys.contains(&(param.ty.clone(), Some(generator.clone()))) {
                    out.push(
                        &sol.name,
                        RoleKind::Solution,
                        format!(
                            "parameter {} uses unknown generator \"{generator}\" for {}",
                            param.name, param.ty
                        ),
                    );
                }
            }
        }
    }

    if table.solutions.is_empty() && !table.verifiers.values().any(|v| v.standalone) {
        out.push(
            def.name(),
            RoleKind::Solution,
            "declares no @Solution and no standalone @Verify",
        );
    }
}

fn describe(types: &[TypeDescriptor]) -> String {
    types
        .iter()
        .map(|t| t.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::{FieldDef, MethodDef};
    use crate::value::Value;

    fn add() -> MethodDef {
        MethodDef::function("add")
            .param("a", TypeDescriptor::Int)
            .param("b", TypeDescriptor::Int)
            .returns(TypeDescriptor::Int)
            .role(Role::solution("add"))
    }

    fn messages(violations: &[RoleViolation]) -> Vec<String> {
        violations.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn test_minimal_solution_validates() {
        let def = TypeDef::builder("Adder").method(add()).build();
        let table = validate(&def).unwrap();
        assert_eq!(table.solutions["add"].method, 0);
        assert!(table.solutions["add"].is_static);
    }

    #[test]
    fn test_violations_are_collected_together() {
        let def = TypeDef::builder("Adder")
            .method(add())
            .method(
                MethodDef::method("gen")
                    .param("c", TypeDescriptor::Int)
                    .returns(TypeDescriptor::Int)
                    .role(Role::generator()),
            )
            .method(
                MethodDef::function("cases")
                    .returns(TypeDescriptor::Int)
                    .role(Role::EdgeCase),
            )
            .method(
                MethodDef::function("slow")
                    .role(Role::timeout(0)),
            )
            .build();
        let violations = validate(&def).unwrap_err();
        let text = messages(&violations).join("\n");
        assert!(text.contains("@Generator gen: must be static"), "{text}");
        assert!(text.contains("@Generator gen: parameters must be"), "{text}");
        assert!(text.contains("@EdgeCase cases: must return an array"), "{text}");
        assert!(text.contains("timeout must be strictly positive"), "{text}");
        assert!(text.contains("must be paired with @Solution"), "{text}");
    }

    #[test]
    fn test_verify_rules() {
        let def = TypeDef::builder("Adder")
            .method(add())
            .method(
                MethodDef::function("check")
                    .param("a", TypeDescriptor::Outcome)
                    .param("b", TypeDescriptor::Outcome)
                    .role(Role::verify("missing"))
                    .verifier(|_, _, _| Ok(())),
            )
            .method(
                MethodDef::function("check2")
                    .param("a", TypeDescriptor::Outcome)
                    .returns(TypeDescriptor::Bool)
                    .role(Role::verify("add")),
            )
            .build();
        let text = messages(&validate(&def).unwrap_err()).join("\n");
        assert!(text.contains("no @Solution named \"missing\""), "{text}");
        assert!(text.contains("check2: must not return a value"), "{text}");
        assert!(text.contains("check2: needs a verifier body"), "{text}");
        assert!(text.contains("check2: parameters must be (TestOutput, TestOutput[, Random])"), "{text}");
    }

    #[test]
    fn test_standalone_verify_needs_no_solution() {
        let def = TypeDef::builder("Counter")
            .method(
                MethodDef::function("equivalent")
                    .param("a", TypeDescriptor::Outcome)
                    .param("b", TypeDescriptor::Outcome)
                    .param("r", TypeDescriptor::RandomSource)
                    .role(Role::standalone_verify("equivalent"))
                    .role(Role::timeout(500))
                    .verifier(|_, _, _| Ok(())),
            )
            .build();
        let table = validate(&def).unwrap();
        let verify = &table.verifiers["equivalent"];
        assert!(verify.standalone && verify.takes_random);
        assert_eq!(verify.timeout, Some(Duration::from_millis(500)));
    }

    #[test]
    fn test_precondition_rules() {
        let def = TypeDef::builder("Adder")
            .method(add())
            .method(
                MethodDef::method("pre")
                    .param("a", TypeDescriptor::Int)
                    .returns(TypeDescriptor::Int)
                    .role(Role::precondition("add")),
            )
            .method(
                MethodDef::function("pre2")
                    .param("a", TypeDescriptor::Int)
                    .param("b", TypeDescriptor::Int)
                    .returns(TypeDescriptor::Bool)
                    .role(Role::precondition("add")),
            )
            .build();
        let text = messages(&validate(&def).unwrap_err()).join("\n");
        assert!(text.contains("pre: must return boolean"), "{text}");
        assert!(text.contains("duplicate @Precondition \"add\""), "{text}");
        assert!(text.contains("must be static like its @Solution"), "{text}");
        assert!(text.contains("must match @Solution parameters (int, int)"), "{text}");
    }

    #[test]
    fn test_edge_and_simple_exclusive_and_field_rules() {
        let ints = TypeDescriptor::array_of(TypeDescriptor::Int);
        let def = TypeDef::builder("Adder")
            .method(add())
            .method(
                MethodDef::function("both")
                    .returns(ints.clone())
                    .role(Role::EdgeCase)
                    .role(Role::SimpleCase),
            )
            .field(
                FieldDef::new("EDGE", ints.clone())
                    .role(Role::EdgeCase),
            )
            .field(
                FieldDef::new("SELF", TypeDescriptor::array_of(TypeDescriptor::named("Adder")))
                    .static_field()
                    .role(Role::SimpleCase),
            )
            .field(FieldDef::new("N", TypeDescriptor::Int).role(Role::Next))
            .build();
        let text = messages(&validate(&def).unwrap_err()).join("\n");
        assert!(text.contains("cannot be both @EdgeCase and @SimpleCase"), "{text}");
        assert!(text.contains("EDGE: field must be static"), "{text}");
        assert!(text.contains("duplicate @EdgeCase for int"), "{text}");
        assert!(text.contains("cases for Adder must come from a method"), "{text}");
        assert!(text.contains("only methods may declare @Next"), "{text}");
    }

    #[test]
    fn test_static_case_field_is_accepted() {
        let ints = TypeDescriptor::array_of(TypeDescriptor::Int);
        let def = TypeDef::builder("Adder")
            .method(add())
            .field(
                FieldDef::new("EDGE", ints)
                    .static_field()
                    .initial(Value::Null)
                    .role(Role::EdgeCase),
            )
            .build();
        let table = validate(&def).unwrap();
        assert_eq!(table.edge_cases.len(), 1);
        assert_eq!(table.edge_cases[0].member, MemberRef::Field(0));
    }

    #[test]
    fn test_grouped_generator_arity_mismatch() {
        let def = TypeDef::builder("Adder")
            .method(add())
            .method(
                MethodDef::function("pair")
                    .param("c", TypeDescriptor::Int)
                    .param("r", TypeDescriptor::RandomSource)
                    .returns(TypeDescriptor::Tuple(vec![
                        TypeDescriptor::Int,
                        TypeDescriptor::Int,
                        TypeDescriptor::Int,
                    ]))
                    .role(Role::grouped_generator("add")),
            )
            .build();
        let text = messages(&validate(&def).unwrap_err()).join("\n");
        assert!(text.contains("tuple arity 3 does not match the 2 parameters"), "{text}");
    }

    #[test]
    fn test_next_shape_and_run_arguments_placement() {
        let def = TypeDef::builder("Buffer")
            .method(
                MethodDef::method("size")
                    .returns(TypeDescriptor::Int)
                    .role(Role::solution("size")),
            )
            .method(
                MethodDef::function("next")
                    .param("current", TypeDescriptor::named("Buffer"))
                    .param("i", TypeDescriptor::Int)
                    .returns(TypeDescriptor::named("Other"))
                    .role(Role::Next),
            )
            .method(
                MethodDef::function("helper")
                    .role(Role::RunArguments(RunArguments::default().with_num_tests(4))),
            )
            .build();
        let text = messages(&validate(&def).unwrap_err()).join("\n");
        assert!(text.contains("@Next next: parameters must be (Buffer current"), "{text}");
        assert!(text.contains("@Next next: must return Buffer"), "{text}");
        assert!(text.contains("can only be attached to @Solution"), "{text}");
    }

    #[test]
    fn test_unknown_named_generator_and_duplicate_generators() {
        let def = TypeDef::builder("Adder")
            .method(
                MethodDef::function("add")
                    .param_using("a", TypeDescriptor::Int, "small")
                    .returns(TypeDescriptor::Int)
                    .role(Role::solution("add")),
            )
            .method(
                MethodDef::function("g1")
                    .param("c", TypeDescriptor::Int)
                    .param("r", TypeDescriptor::RandomSource)
                    .returns(TypeDescriptor::Int)
                    .role(Role::generator()),
            )
            .method(
                MethodDef::function("g2")
                    .param("c", TypeDescriptor::Int)
                    .param("r", TypeDescriptor::RandomSource)
                    .returns(TypeDescriptor::Int)
                    .role(Role::generator()),
            )
            .build();
        let text = messages(&validate(&def).unwrap_err()).join("\n");
        assert!(text.contains("uses unknown generator \"small\" for int"), "{text}");
        assert!(text.contains("g2: duplicate generator for int"), "{text}");
    }

    #[test]
    fn test_empty_type_is_rejected() {
        let def = TypeDef::builder("Empty").build();
        let text = messages(&validate(&def).unwrap_err()).join("\n");
        assert!(text.contains("declares no @Solution"), "{text}");
    }
}
