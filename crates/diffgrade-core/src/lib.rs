//! Diffgrade Core
//!
//! Randomized differential testing engine for grading submissions against a
//! reference implementation.
//!
//! A reference type declares roles (solutions, generators, verifiers, case
//! tables, lifecycle hooks) on its members. The engine validates them once at
//! load time, synthesizes inputs at rising complexity, runs the reference and
//! the submission on the same inputs and compares their observable behavior.
//!
//! # Core Modules
//!
//! - [`contract`]: registration API for loaded types (fields, methods, bodies)
//! - [`roles`] and [`validate`]: role declarations and structural validation
//! - [`generators`]: generator registry, built-in generators and case tables
//! - [`array`]: [`ArrayWrapper`], uniform access to primitive and object arrays
//! - [`controller`]: trial scheduling and receiver lifecycle
//! - [`execute`]: per-side execution, timeouts and verification
//! - [`proxy`]: access guard and proxy registry for hook code
//! - [`question`]: loading questions and the run entry points
//!
//! # Example
//!
//! ```ignore
//! use diffgrade_core::{run_tests, RunConfig};
//!
//! let report = run_tests(&reference, &submission, &RunConfig::new("add").with_seed(7));
//! assert!(report.all_passed());
//! ```

#![allow(clippy::result_large_err)]
#![allow(clippy::type_complexity)]
#![allow(clippy::too_many_arguments)]

pub mod array;
pub mod contract;
pub mod controller;
pub mod error;
pub mod execute;
pub mod generators;
pub mod invoke;
pub mod object;
pub mod proxy;
pub mod question;
pub mod roles;
pub mod validate;
pub mod value;

pub use array::{ArrayError, ArrayValue, ArrayWrapper};
pub use contract::{arg, FieldDef, MethodDef, ParamDef, TypeDef, TypeDefBuilder, Visibility};
pub use error::EngineError;
pub use execute::{check, check_match, values_match, Behavior, TestOutput};
pub use generators::{BindingSource, FnGen, Gen, GeneratorKey, GeneratorRegistry};
pub use invoke::{Fault, Invocation, RandomSource, Thrown};
pub use object::{ObjectHandle, ObjectId, Side};
pub use proxy::{AccessViolation, ViolationKind};
pub use question::{run_batch, run_tests, LoadOptions, Question};
pub use roles::{Role, RoleKind, RoleTable, RoleViolation};
pub use validate::validate;
pub use value::{TypeDescriptor, Value};

pub use diffgrade_types::{
    ComplexitySchedule, OutcomeSummary, RunArguments, RunConfig, RunReport, SeedPolicy,
    TrialKind, TrialRecord, Verdict,
};
