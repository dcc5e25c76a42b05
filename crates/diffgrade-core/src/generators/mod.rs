//! Generator resolution and value synthesis.
//!
//! - [`defaults`]: complexity-scaled built-in generators for primitives, strings,
//!   arrays and enums
//! - [`registry`]: the type-keyed registry and its resolution order
//! - [`cases`]: default and declared edge/simple case tables

pub mod cases;
pub mod defaults;
pub mod registry;

use std::sync::Arc;

use crate::invoke::{Fault, RandomSource, SideContext};
use crate::proxy::HookKind;
use crate::value::{TypeDescriptor, Value};

pub use cases::{CaseKind, CaseTable};
pub use registry::{BindingSource, GeneratorKey, GeneratorRegistry, ResolveError};

/// Produces values of one type at a given complexity.
///
/// `side` is the side of the run the value is for; generators that run hook
/// code use it so objects are built from that side's definitions.
pub trait Gen: Send + Sync {
    fn generate(
        &self,
        complexity: u32,
        random: &mut RandomSource,
        side: &Arc<SideContext>,
    ) -> Result<Value, Fault>;

    /// Short description for logs.
    fn describe(&self) -> String;
}

/// A generator backed by a plain function.
pub struct FnGen {
    name: &'static str,
    f: fn(u32, &mut RandomSource) -> Value,
}

impl FnGen {
    pub const fn new(name: &'static str, f: fn(u32, &mut RandomSource) -> Value) -> Self {
        Self { name, f }
    }
}

impl Gen for FnGen {
    fn generate(
        &self,
        complexity: u32,
        random: &mut RandomSource,
        _side: &Arc<SideContext>,
    ) -> Result<Value, Fault> {
        Ok((self.f)(complexity, random))
    }

    fn describe(&self) -> String {
        format!("default {}", self.name)
    }
}

/// A user-declared `(complexity, random)` generator on the reference type.
pub struct HookGen {
    method: usize,
    member: String,
    target: TypeDescriptor,
}

impl HookGen {
    pub fn new(method: usize, member: impl Into<String>, target: TypeDescriptor) -> Self {
        Self {
            method,
            member: member.into(),
            target,
        }
    }
}

impl Gen for HookGen {
    fn generate(
        &self,
        complexity: u32,
        random: &mut RandomSource,
        side: &Arc<SideContext>,
    ) -> Result<Value, Fault> {
        let complexity = i32::try_from(complexity).unwrap_or(i32::MAX);
        let value = side.run_hook(
            HookKind::Generator,
            self.method,
            &[Value::Int(complexity)],
            Some(random),
        )?;
        if !value.conforms_to(&self.target) {
            return Err(Fault::engine(format!(
                "generator {} returned {}, expected {}",
                self.member,
                value.kind_name(),
                self.target
            )));
        }
        Ok(value)
    }

    fn describe(&self) -> String {
        format!("@Generator {} for {}", self.member, self.target)
    }
}

/// Runs a grouped generator and splits its tuple into positional arguments.
pub struct GroupedGen {
    method: usize,
    member: String,
    arity: usize,
}

impl GroupedGen {
    pub fn new(method: usize, member: impl Into<String>, arity: usize) -> Self {
        Self {
            method,
            member: member.into(),
            arity,
        }
    }

    pub fn generate_group(
        &self,
        complexity: u32,
        random: &mut RandomSource,
        side: &Arc<SideContext>,
    ) -> Result<Vec<Value>, Fault> {
        let complexity = i32::try_from(complexity).unwrap_or(i32::MAX);
        let value = side.run_hook(
            HookKind::GroupedGenerator,
            self.method,
            &[Value::Int(complexity)],
            Some(random),
        )?;
        match value {
            Value::Tuple(items) if items.len() == self.arity => Ok(items),
            other => Err(Fault::engine(format!(
                "grouped generator {} returned {}, expected a tuple of {}",
                self.member,
                other.kind_name(),
                self.arity
            ))),
        }
    }
}
