//! Role declarations and the role table derived from them.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use diffgrade_types::RunArguments;

use crate::value::TypeDescriptor;

/// A role a member plays for the testing engine.
#[derive(Debug, Clone, PartialEq)]
pub enum Role {
    /// The method under test. `prints` marks solutions whose output is compared.
    Solution { name: String, prints: bool },
    /// Custom verification for the solution of the same name.
    Verify { name: String, standalone: bool },
    /// Value generator for its return type, optionally under a name.
    Generator { name: Option<String> },
    /// Generates every parameter of the named solution jointly.
    GroupedGenerator { solution: String },
    /// Lifecycle transition for receivers.
    Next,
    Precondition { name: String },
    EdgeCase,
    SimpleCase,
    Timeout { millis: u64 },
    RunArguments(RunArguments),
}

impl Role {
    pub fn solution(name: impl Into<String>) -> Self {
        Role::Solution {
            name: name.into(),
            prints: false,
        }
    }

    pub fn printing_solution(name: impl Into<String>) -> Self {
        Role::Solution {
            name: name.into(),
            prints: true,
        }
    }

    pub fn verify(name: impl Into<String>) -> Self {
        Role::Verify {
            name: name.into(),
            standalone: false,
        }
    }

    pub fn standalone_verify(name: impl Into<String>) -> Self {
        Role::Verify {
            name: name.into(),
            standalone: true,
        }
    }

    pub fn generator() -> Self {
        Role::Generator { name: None }
    }

    pub fn named_generator(name: impl Into<String>) -> Self {
        Role::Generator {
            name: Some(name.into()),
        }
    }

    pub fn grouped_generator(solution: impl Into<String>) -> Self {
        Role::GroupedGenerator {
            solution: solution.into(),
        }
    }

    pub fn precondition(name: impl Into<String>) -> Self {
        Role::Precondition { name: name.into() }
    }

    pub fn timeout(millis: u64) -> Self {
        Role::Timeout { millis }
    }

    pub fn kind(&self) -> RoleKind {
        match self {
            Role::Solution { .. } => RoleKind::Solution,
            Role::Verify { .. } => RoleKind::Verify,
            Role::Generator { .. } => RoleKind::Generator,
            Role::GroupedGenerator { .. } => RoleKind::GroupedGenerator,
            Role::Next => RoleKind::Next,
            Role::Precondition { .. } => RoleKind::Precondition,
            Role::EdgeCase => RoleKind::EdgeCase,
            Role::SimpleCase => RoleKind::SimpleCase,
            Role::Timeout { .. } => RoleKind::Timeout,
            Role::RunArguments(_) => RoleKind::RunArguments,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RoleKind {
    Solution,
    Verify,
    Generator,
    GroupedGenerator,
    Next,
    Precondition,
    EdgeCase,
    SimpleCase,
    Timeout,
    RunArguments,
}

impl fmt::Display for RoleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RoleKind::Solution => "Solution",
            RoleKind::Verify => "Verify",
            RoleKind::Generator => "Generator",
            RoleKind::GroupedGenerator => "GroupedGenerator",
            RoleKind::Next => "Next",
            RoleKind::Precondition => "Precondition",
            RoleKind::EdgeCase => "EdgeCase",
            RoleKind::SimpleCase => "SimpleCase",
            RoleKind::Timeout => "Timeout",
            RoleKind::RunArguments => "RunArguments",
        };
        f.write_str(name)
    }
}

/// A structural rule a role member failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleViolation {
    pub member: String,
    pub role: RoleKind,
    pub message: String,
}

impl RoleViolation {
    pub fn new(member: impl Into<String>, role: RoleKind, message: impl Into<String>) -> Self {
        Self {
            member: member.into(),
            role,
            message: message.into(),
        }
    }
}

impl fmt::Display for RoleViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{} {}: {}", self.role, self.member, self.message)
    }
}

/// Where a member lives in its type definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberRef {
    Method(usize),
    Field(usize),
}

#[derive(Debug, Clone)]
pub struct SolutionEntry {
    pub method: usize,
    pub is_static: bool,
    pub prints: bool,
    pub timeout: Option<Duration>,
    pub arguments: Option<RunArguments>,
}

#[derive(Debug, Clone)]
pub struct VerifyEntry {
    pub method: usize,
    pub standalone: bool,
    pub takes_random: bool,
    pub timeout: Option<Duration>,
    pub arguments: Option<RunArguments>,
}

#[derive(Debug, Clone)]
pub struct GeneratorEntry {
    pub method: usize,
    pub target: TypeDescriptor,
    pub name: Option<String>,
}

#[derive(Debug, Clone)]
pub struct GroupedEntry {
    pub method: usize,
    pub types: Vec<TypeDescriptor>,
}

/// Edge or simple cases for one type.
#[derive(Debug, Clone)]
pub struct CaseSource {
    pub member: MemberRef,
    pub element: TypeDescriptor,
}

/// Declarative table of every role a reference type declares.
///
/// Built once by [`validate`](crate::validate::validate) and immutable afterwards.
#[derive(Debug, Clone, Default)]
pub struct RoleTable {
    pub solutions: BTreeMap<String, SolutionEntry>,
    pub verifiers: BTreeMap<String, VerifyEntry>,
    pub generators: Vec<GeneratorEntry>,
    pub grouped: BTreeMap<String, GroupedEntry>,
    pub next: Option<usize>,
    pub preconditions: BTreeMap<String, usize>,
    pub edge_cases: Vec<CaseSource>,
    pub simple_cases: Vec<CaseSource>,
}

impl RoleTable {
    /// Names that can be run: every solution plus standalone verifiers.
    pub fn runnable_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.solutions.keys().cloned().collect();
        names.extend(
            self.verifiers
                .iter()
                .filter(|(_, v)| v.standalone)
                .map(|(name, _)| name.clone()),
        );
        names.sort();
        names.dedup();
        names
    }

    /// The unnamed generator bound to exactly `ty`, if declared.
    pub fn generator_for(&self, ty: &TypeDescriptor) -> Option<&GeneratorEntry> {
        self.generators
            .iter()
            .find(|g| g.name.is_none() && &g.target == ty)
    }
}
