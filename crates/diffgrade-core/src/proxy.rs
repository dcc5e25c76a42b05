//! Safety proxying and access mirroring.
//!
//! Hook code (generators, lifecycle transitions, case tables, verifiers) is
//! declared on the reference type but also runs against the submission. Every
//! field read/write, method call and construction performed by a method body
//! passes [`check_access`] first:
//!
//! - public members are always reachable;
//! - private members are reachable only from a member of the same type
//!   definition;
//! - objects of the other side are reachable only from verifiers.
//!
//! Submission objects handed to hook code are wrapped by the run's
//! [`ProxyRegistry`] so they present themselves under the reference type name
//! while keeping their own identity.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::warn;

use crate::array::ArrayValue;
use crate::contract::{TypeDef, Visibility};
use crate::object::{ObjectHandle, ObjectId, Side};
use crate::value::Value;

/// Kind of hook code currently executing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookKind {
    Generator,
    GroupedGenerator,
    Next,
    Cases,
    Verify,
}

impl fmt::Display for HookKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HookKind::Generator => "generator",
            HookKind::GroupedGenerator => "grouped generator",
            HookKind::Next => "@Next",
            HookKind::Cases => "case table",
            HookKind::Verify => "verifier",
        };
        f.write_str(name)
    }
}

/// Whose code is running.
#[derive(Clone)]
pub enum Scope {
    /// A member (method or constructor) of this type definition.
    Member(Arc<TypeDef>),
    /// Hook code, named by member.
    Hook { kind: HookKind, member: String },
}

impl Scope {
    pub fn hook(kind: HookKind, member: impl Into<String>) -> Self {
        Scope::Hook {
            kind,
            member: member.into(),
        }
    }

    pub fn is_hook(&self) -> bool {
        matches!(self, Scope::Hook { .. })
    }

    fn allows_cross_side(&self) -> bool {
        matches!(
            self,
            Scope::Hook {
                kind: HookKind::Verify,
                ..
            }
        )
    }
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self}")
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Member(def) => write!(f, "member of {}", def.name()),
            Scope::Hook { kind, member } => write!(f, "{kind} {member}"),
        }
    }
}

/// The access being attempted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access<'a> {
    Read(&'a str),
    Write(&'a str),
    Call(&'a str),
    Construct,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViolationKind {
    PrivateField,
    PrivateMethod,
    PrivateConstructor,
    CrossBoundary,
}

/// A rejected access from untrusted code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessViolation {
    pub kind: ViolationKind,
    /// Where the access came from.
    pub scope: String,
    pub target_type: String,
    pub member: String,
}

impl fmt::Display for AccessViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let what = match self.kind {
            ViolationKind::PrivateField => "accessed private field",
            ViolationKind::PrivateMethod => "called private method",
            ViolationKind::PrivateConstructor => "called private constructor of",
            ViolationKind::CrossBoundary => "touched an object from the other implementation:",
        };
        if self.member.is_empty() {
            write!(f, "{} {} {}", self.scope, what, self.target_type)
        } else {
            write!(f, "{} {} {}.{}", self.scope, what, self.target_type, self.member)
        }
    }
}

impl std::error::Error for AccessViolation {}

/// Check one access against the guard rules.
///
/// `target_def` is the definition owning the member; `target_side` is the side of
/// the object being touched (absent for static members and construction).
pub fn check_access(
    scope: &Scope,
    side: Side,
    target_def: &Arc<TypeDef>,
    target_side: Option<Side>,
    visibility: Visibility,
    access: Access<'_>,
) -> Result<(), AccessViolation> {
    let member = match access {
        Access::Read(name) | Access::Write(name) | Access::Call(name) => name,
        Access::Construct => "",
    };
    let violation = |kind| AccessViolation {
        kind,
        scope: scope.to_string(),
        target_type: target_def.name().to_string(),
        member: member.to_string(),
    };
    if let Some(target_side) = target_side {
        if target_side != side && !scope.allows_cross_side() {
            return Err(violation(ViolationKind::CrossBoundary));
        }
    }
    if visibility == Visibility::Public {
        return Ok(());
    }
    if let Scope::Member(def) = scope {
        if Arc::ptr_eq(def, target_def) {
            return Ok(());
        }
    }
    Err(violation(match access {
        Access::Read(_) | Access::Write(_) => ViolationKind::PrivateField,
        Access::Call(_) => ViolationKind::PrivateMethod,
        Access::Construct => ViolationKind::PrivateConstructor,
    }))
}

/// Per-run registry of proxied submission objects and observed violations.
#[derive(Default)]
pub struct ProxyRegistry {
    wrapped: Mutex<HashMap<ObjectId, String>>,
    violations: Mutex<Vec<AccessViolation>>,
}

impl ProxyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap `handle` so it presents as `presented_as`.
    pub fn wrap(&self, handle: &ObjectHandle, presented_as: &str) -> ObjectHandle {
        self.wrapped
            .lock()
            .insert(handle.id(), presented_as.to_string());
        handle.proxied(presented_as)
    }

    /// Wrap every submission object reachable from `value` without reading object
    /// state. Objects defined by `primary` present as `reference_name`.
    pub fn expose(&self, value: Value, primary: &Arc<TypeDef>, reference_name: &str) -> Value {
        match value {
            Value::Object(handle) if handle.side() == Side::Submission && !handle.is_proxy() => {
                let presented = if Arc::ptr_eq(handle.def(), primary) {
                    reference_name.to_string()
                } else {
                    handle.actual_type_name().to_string()
                };
                Value::Object(self.wrap(&handle, &presented))
            }
            Value::Array(ArrayValue::Objects { element, items }) => Value::Array(ArrayValue::Objects {
                element,
                items: items
                    .into_iter()
                    .map(|v| self.expose(v, primary, reference_name))
                    .collect(),
            }),
            Value::Tuple(items) => Value::Tuple(
                items
                    .into_iter()
                    .map(|v| self.expose(v, primary, reference_name))
                    .collect(),
            ),
            other => other,
        }
    }

    pub fn is_wrapped(&self, id: ObjectId) -> bool {
        self.wrapped.lock().contains_key(&id)
    }

    pub fn wrapped_count(&self) -> usize {
        self.wrapped.lock().len()
    }

    pub fn record(&self, violation: AccessViolation) {
        warn!(violation = %violation, "unsafe access blocked");
        self.violations.lock().push(violation);
    }

    pub fn violations(&self) -> Vec<AccessViolation> {
        self.violations.lock().clone()
    }

    pub fn violation_count(&self) -> usize {
        self.violations.lock().len()
    }

    /// Drop the proxies created for the trial that just finished.
    pub fn end_trial(&self) {
        self.wrapped.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::{FieldDef, TypeDef};
    use crate::value::TypeDescriptor;
    use std::collections::BTreeMap;

    fn def(name: &str) -> Arc<TypeDef> {
        TypeDef::builder(name)
            .field(FieldDef::new("secret", TypeDescriptor::Int).private())
            .build()
    }

    #[test]
    fn test_private_access_rules() {
        let counter = def("Counter");
        let other = def("Other");
        let own = Scope::Member(counter.clone());
        let foreign = Scope::Member(other);
        let hook = Scope::hook(HookKind::Next, "next");
        let read = Access::Read("secret");
        let side = Side::Submission;

        assert!(check_access(&own, side, &counter, Some(side), Visibility::Private, read).is_ok());
        let err = check_access(&foreign, side, &counter, Some(side), Visibility::Private, read)
            .unwrap_err();
        assert_eq!(err.kind, ViolationKind::PrivateField);
        let err = check_access(&hook, side, &counter, Some(side), Visibility::Private, read)
            .unwrap_err();
        assert_eq!(err.to_string(), "@Next next accessed private field Counter.secret");
        assert!(check_access(&hook, side, &counter, Some(side), Visibility::Public, read).is_ok());
    }

    #[test]
    fn test_cross_boundary_only_allowed_for_verifiers() {
        let counter = def("Counter");
        let generator = Scope::hook(HookKind::Generator, "gen");
        let verifier = Scope::hook(HookKind::Verify, "check");
        let call = Access::Call("size");
        let err = check_access(
            &generator,
            Side::Reference,
            &counter,
            Some(Side::Submission),
            Visibility::Public,
            call,
        )
        .unwrap_err();
        assert_eq!(err.kind, ViolationKind::CrossBoundary);
        assert!(check_access(
            &verifier,
            Side::Reference,
            &counter,
            Some(Side::Submission),
            Visibility::Public,
            call,
        )
        .is_ok());
    }

    #[test]
    fn test_expose_wraps_submission_objects_recursively() {
        let reference = def("Counter");
        let submission = def("StudentCounter");
        let registry = ProxyRegistry::new();
        let obj = ObjectHandle::new(submission.clone(), Side::Submission, BTreeMap::new());
        let ref_obj = ObjectHandle::new(reference.clone(), Side::Reference, BTreeMap::new());
        let value = Value::Tuple(vec![
            Value::Object(obj.clone()),
            Value::Object(ref_obj.clone()),
        ]);
        let exposed = registry.expose(value, &submission, "Counter");
        let items = exposed.as_tuple().unwrap();
        let wrapped = items[0].as_object().unwrap();
        assert!(wrapped.is_proxy());
        assert_eq!(wrapped.type_name(), "Counter");
        assert_eq!(wrapped, &obj);
        assert!(!items[1].as_object().unwrap().is_proxy());
        assert!(registry.is_wrapped(obj.id()));
        registry.end_trial();
        assert_eq!(registry.wrapped_count(), 0);
    }
}
