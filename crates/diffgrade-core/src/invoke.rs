//! Invocation context for method bodies.
//!
//! A method body receives an [`Invocation`]: the only way to reach objects,
//! static state, printed output and (for hooks) the random source. Each side of
//! a run owns one [`SideContext`], which resolves type names for that side. On
//! the submission side the reference type name resolves to the submission's
//! definition, so hook code written against the reference builds submission
//! objects unchanged.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use rand::rngs::StdRng;

use crate::array::ArrayError;
use crate::contract::{MethodBody, MethodDef, TypeDef, Visibility, CONSTRUCTOR_NAME};
use crate::object::{ObjectHandle, Side};
use crate::proxy::{check_access, Access, AccessViolation, HookKind, ProxyRegistry, Scope};
use crate::value::Value;

/// Seedable source of randomness handed to hooks.
pub type RandomSource = StdRng;

/// Nested calls deeper than this raise a `StackOverflowError`.
const MAX_CALL_DEPTH: usize = 256;

/// An exception raised by code under test. Part of the observable outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Thrown {
    pub kind: String,
    pub message: String,
}

impl fmt::Display for Thrown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.message.is_empty() {
            f.write_str(&self.kind)
        } else {
            write!(f, "{}: {}", self.kind, self.message)
        }
    }
}

/// Why a method body did not return normally.
#[derive(Debug, Clone, PartialEq)]
pub enum Fault {
    /// The code under test threw.
    Thrown(Thrown),
    /// The access guard rejected an access.
    Access(AccessViolation),
    /// The invocation was cancelled after its timeout expired.
    Cancelled,
    /// The engine's own machinery failed.
    Engine(String),
}

impl Fault {
    pub fn thrown(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Fault::Thrown(Thrown {
            kind: kind.into(),
            message: message.into(),
        })
    }

    pub fn engine(message: impl Into<String>) -> Self {
        Fault::Engine(message.into())
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Fault::Thrown(t) => write!(f, "threw {t}"),
            Fault::Access(v) => write!(f, "unsafe access: {v}"),
            Fault::Cancelled => f.write_str("cancelled after timeout"),
            Fault::Engine(msg) => write!(f, "engine error: {msg}"),
        }
    }
}

impl std::error::Error for Fault {}

impl From<ArrayError> for Fault {
    fn from(e: ArrayError) -> Self {
        let kind = match e {
            ArrayError::OutOfBounds { .. } => "ArrayIndexOutOfBoundsException",
            ArrayError::TypeMismatch { .. } => "ArrayStoreException",
        };
        Fault::thrown(kind, e.to_string())
    }
}

impl From<AccessViolation> for Fault {
    fn from(v: AccessViolation) -> Self {
        Fault::Access(v)
    }
}

/// Output printed during one invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Capture {
    pub stdout: String,
    pub stderr: String,
}

/// One side of a run: type resolution, static state and the proxy registry.
pub struct SideContext {
    side: Side,
    control: Arc<TypeDef>,
    primary: Arc<TypeDef>,
    auxiliary: BTreeMap<String, Arc<TypeDef>>,
    statics: Mutex<HashMap<String, BTreeMap<String, Value>>>,
    registry: ProxyRegistry,
}

impl SideContext {
    /// `control` declares the hooks; `primary` is what its name resolves to on this side.
    pub fn new(
        side: Side,
        control: Arc<TypeDef>,
        primary: Arc<TypeDef>,
        auxiliary: &[Arc<TypeDef>],
    ) -> Arc<Self> {
        Arc::new(Self {
            side,
            control,
            primary,
            auxiliary: auxiliary
                .iter()
                .map(|d| (d.name().to_string(), d.clone()))
                .collect(),
            statics: Mutex::new(HashMap::new()),
            registry: ProxyRegistry::new(),
        })
    }

    pub fn side(&self) -> Side {
        self.side
    }

    pub fn control(&self) -> &Arc<TypeDef> {
        &self.control
    }

    pub fn primary(&self) -> &Arc<TypeDef> {
        &self.primary
    }

    pub fn registry(&self) -> &ProxyRegistry {
        &self.registry
    }

    /// Resolve a type name as seen from this side.
    pub fn resolve_type(&self, name: &str) -> Option<Arc<TypeDef>> {
        if name == self.control.name() || name == self.primary.name() {
            return Some(self.primary.clone());
        }
        self.auxiliary.get(name).cloned()
    }

    fn with_statics<T>(
        &self,
        def: &TypeDef,
        f: impl FnOnce(&mut BTreeMap<String, Value>) -> T,
    ) -> T {
        let mut statics = self.statics.lock();
        let table = statics.entry(def.name().to_string()).or_insert_with(|| {
            def.fields()
                .iter()
                .filter(|field| field.is_static)
                .map(|field| (field.name.clone(), field.initial.deep_copy()))
                .collect()
        });
        f(table)
    }

    /// Wrap submission objects that are about to reach hook code.
    pub(crate) fn expose(&self, value: Value) -> Value {
        if self.side == Side::Submission {
            self.registry
                .expose(value, &self.primary, self.control.name())
        } else {
            value
        }
    }

    /// Run a method body as the outermost call of an invocation.
    ///
    /// Panics inside the body are reported as a thrown `panic`.
    pub(crate) fn invoke_root(
        self: &Arc<Self>,
        scope: Scope,
        this: Option<ObjectHandle>,
        method: &MethodDef,
        args: &[Value],
        random: Option<&mut RandomSource>,
        cancel: Arc<AtomicBool>,
    ) -> (Result<Value, Fault>, Capture) {
        let MethodBody::Call(body) = &method.body else {
            return (
                Err(Fault::engine(format!("{} is not callable", method.name))),
                Capture::default(),
            );
        };
        let mut inv = Invocation {
            ctx: self.clone(),
            scope,
            this,
            random,
            capture: Capture::default(),
            cancel,
            depth: 0,
        };
        let result = catch_unwind(AssertUnwindSafe(|| body(&mut inv, args)))
            .unwrap_or_else(|payload| Err(panic_fault(payload)));
        let result = self.record_violation(result);
        (result, inv.capture)
    }

    /// Run a hook declared on the control type. Output printed by hooks is discarded.
    pub(crate) fn run_hook(
        self: &Arc<Self>,
        kind: HookKind,
        method_index: usize,
        args: &[Value],
        random: Option<&mut RandomSource>,
    ) -> Result<Value, Fault> {
        let control = self.control.clone();
        let method = control
            .method_at(method_index)
            .ok_or_else(|| Fault::engine(format!("no method #{method_index}")))?;
        let scope = Scope::hook(kind, method.name.clone());
        let args: Vec<Value> = args.iter().cloned().map(|v| self.expose(v)).collect();
        let (result, _) = self.invoke_root(
            scope,
            None,
            method,
            &args,
            random,
            Arc::new(AtomicBool::new(false)),
        );
        result
    }

    /// Run a verifier body declared on the control type.
    pub(crate) fn run_verifier(
        self: &Arc<Self>,
        method_index: usize,
        reference: &crate::execute::TestOutput,
        submission: &crate::execute::TestOutput,
        random: Option<&mut RandomSource>,
    ) -> Result<(), Fault> {
        let control = self.control.clone();
        let method = control
            .method_at(method_index)
            .ok_or_else(|| Fault::engine(format!("no method #{method_index}")))?;
        let MethodBody::Verify(body) = &method.body else {
            return Err(Fault::engine(format!("{} is not a verifier", method.name)));
        };
        let mut inv = Invocation {
            ctx: self.clone(),
            scope: Scope::hook(HookKind::Verify, method.name.clone()),
            this: None,
            random,
            capture: Capture::default(),
            cancel: Arc::new(AtomicBool::new(false)),
            depth: 0,
        };
        let result = catch_unwind(AssertUnwindSafe(|| body(&mut inv, reference, submission)))
            .unwrap_or_else(|payload| Err(panic_fault(payload)));
        self.record_violation(result)
    }

    /// Create an instance of the primary type through its no-argument constructor.
    pub(crate) fn construct_default(self: &Arc<Self>) -> Result<ObjectHandle, Fault> {
        let mut inv = Invocation {
            ctx: self.clone(),
            scope: Scope::hook(HookKind::Generator, CONSTRUCTOR_NAME),
            this: None,
            random: None,
            capture: Capture::default(),
            cancel: Arc::new(AtomicBool::new(false)),
            depth: 0,
        };
        let name = self.control.name().to_string();
        let result = catch_unwind(AssertUnwindSafe(|| inv.construct(&name, &[])))
            .unwrap_or_else(|payload| Err(panic_fault(payload)));
        self.record_violation(result)
    }

    fn record_violation<T>(&self, result: Result<T, Fault>) -> Result<T, Fault> {
        if let Err(Fault::Access(violation)) = &result {
            self.registry.record(violation.clone());
        }
        result
    }
}

fn panic_fault(payload: Box<dyn std::any::Any + Send>) -> Fault {
    let message = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_default();
    Fault::thrown("panic", message)
}

/// Context handed to every method body.
pub struct Invocation<'r> {
    ctx: Arc<SideContext>,
    scope: Scope,
    this: Option<ObjectHandle>,
    random: Option<&'r mut RandomSource>,
    capture: Capture,
    cancel: Arc<AtomicBool>,
    depth: usize,
}

impl<'r> Invocation<'r> {
    pub fn side(&self) -> Side {
        self.ctx.side
    }

    /// The receiver of an instance method or constructor.
    pub fn this(&self) -> Result<ObjectHandle, Fault> {
        self.this
            .clone()
            .ok_or_else(|| Fault::thrown("IllegalStateException", "no receiver in a static context"))
    }

    /// The run's random source; available to hooks that declare one.
    pub fn random(&mut self) -> Result<&mut RandomSource, Fault> {
        self.random
            .as_deref_mut()
            .ok_or_else(|| Fault::thrown("IllegalStateException", "no random source in this context"))
    }

    /// Fails once the invocation has been cancelled by its timeout.
    pub fn checkpoint(&self) -> Result<(), Fault> {
        if self.cancel.load(Ordering::Relaxed) {
            Err(Fault::Cancelled)
        } else {
            Ok(())
        }
    }

    pub fn print(&mut self, text: &str) {
        self.capture.stdout.push_str(text);
    }

    pub fn println(&mut self, text: &str) {
        self.capture.stdout.push_str(text);
        self.capture.stdout.push('\n');
    }

    pub fn eprint(&mut self, text: &str) {
        self.capture.stderr.push_str(text);
    }

    pub fn eprintln(&mut self, text: &str) {
        self.capture.stderr.push_str(text);
        self.capture.stderr.push('\n');
    }

    fn guard(
        &self,
        def: &Arc<TypeDef>,
        target_side: Option<Side>,
        visibility: Visibility,
        access: Access<'_>,
    ) -> Result<(), Fault> {
        self.checkpoint()?;
        check_access(&self.scope, self.ctx.side, def, target_side, visibility, access)
            .map_err(Fault::Access)
    }

    fn resolve(&self, type_name: &str) -> Result<Arc<TypeDef>, Fault> {
        self.ctx
            .resolve_type(type_name)
            .ok_or_else(|| Fault::thrown("NoClassDefFoundError", type_name))
    }

    fn expose(&self, value: Value) -> Value {
        if self.scope.is_hook() {
            self.ctx.expose(value)
        } else {
            value
        }
    }

    fn call_body(
        &mut self,
        owner: &Arc<TypeDef>,
        this: Option<ObjectHandle>,
        method: &MethodDef,
        args: &[Value],
    ) -> Result<Value, Fault> {
        let MethodBody::Call(body) = &method.body else {
            return Err(Fault::engine(format!("{} is not callable", method.name)));
        };
        if self.depth >= MAX_CALL_DEPTH {
            return Err(Fault::thrown("StackOverflowError", method.name.clone()));
        }
        let mut nested = Invocation {
            ctx: self.ctx.clone(),
            scope: Scope::Member(owner.clone()),
            this,
            random: None,
            capture: std::mem::take(&mut self.capture),
            cancel: self.cancel.clone(),
            depth: self.depth + 1,
        };
        let result = body(&mut nested, args);
        self.capture = nested.capture;
        result
    }

    /// Create an instance of `type_name` (resolved for this side).
    pub fn construct(&mut self, type_name: &str, args: &[Value]) -> Result<ObjectHandle, Fault> {
        let def = self.resolve(type_name)?;
        let ctor = def.constructor_for(args.len()).map_err(|_| {
            Fault::thrown(
                "NoSuchMethodError",
                format!("{}.<init> with {} arguments", def.name(), args.len()),
            )
        })?;
        let visibility = ctor.map(|c| c.visibility).unwrap_or(Visibility::Public);
        self.guard(&def, None, visibility, Access::Construct)?;
        let fields = def
            .fields()
            .iter()
            .filter(|f| !f.is_static)
            .map(|f| (f.name.clone(), f.initial.deep_copy()))
            .collect();
        let object = ObjectHandle::new(def.clone(), self.ctx.side, fields);
        if let Some(ctor) = ctor {
            self.call_body(&def, Some(object.clone()), ctor, args)?;
        }
        match self.expose(Value::Object(object.clone())) {
            Value::Object(exposed) => Ok(exposed),
            _ => Ok(object),
        }
    }

    /// Call an instance method on `target`.
    pub fn call(&mut self, target: &ObjectHandle, method: &str, args: &[Value]) -> Result<Value, Fault> {
        let target = target.unwrapped();
        let def = target.def().clone();
        let found = def
            .methods()
            .iter()
            .find(|m| m.name == method && !m.is_static && m.params.len() == args.len())
            .ok_or_else(|| {
                Fault::thrown("NoSuchMethodError", format!("{}.{method}", def.name()))
            })?;
        self.guard(&def, Some(target.side()), found.visibility, Access::Call(method))?;
        let result = self.call_body(&def, Some(target), found, args)?;
        Ok(self.expose(result))
    }

    /// Call a static method of `type_name` (resolved for this side).
    pub fn call_static(&mut self, type_name: &str, method: &str, args: &[Value]) -> Result<Value, Fault> {
        let def = self.resolve(type_name)?;
        let found = def
            .methods()
            .iter()
            .find(|m| m.name == method && m.is_static && m.params.len() == args.len())
            .ok_or_else(|| {
                Fault::thrown("NoSuchMethodError", format!("{}.{method}", def.name()))
            })?;
        self.guard(&def, None, found.visibility, Access::Call(method))?;
        let result = self.call_body(&def, None, found, args)?;
        Ok(self.expose(result))
    }

    /// Read an instance field of `target`.
    pub fn get(&mut self, target: &ObjectHandle, field: &str) -> Result<Value, Fault> {
        let target = target.unwrapped();
        let def = target.def().clone();
        let declared = def.field(field).filter(|f| !f.is_static).ok_or_else(|| {
            Fault::thrown("NoSuchFieldError", format!("{}.{field}", def.name()))
        })?;
        self.guard(&def, Some(target.side()), declared.visibility, Access::Read(field))?;
        let value = target.read(field).unwrap_or(Value::Null);
        Ok(self.expose(value))
    }

    /// Write an instance field of `target`.
    pub fn set(&mut self, target: &ObjectHandle, field: &str, value: Value) -> Result<(), Fault> {
        let target = target.unwrapped();
        let def = target.def().clone();
        let declared = def.field(field).filter(|f| !f.is_static).ok_or_else(|| {
            Fault::thrown("NoSuchFieldError", format!("{}.{field}", def.name()))
        })?;
        self.guard(&def, Some(target.side()), declared.visibility, Access::Write(field))?;
        if !value.conforms_to(&declared.ty) {
            return Err(Fault::thrown(
                "ClassCastException",
                format!("cannot store {} in {}.{field}", value.kind_name(), def.name()),
            ));
        }
        target.write(field, value);
        Ok(())
    }

    /// Read a field of the receiver.
    pub fn field(&mut self, field: &str) -> Result<Value, Fault> {
        let this = self.this()?;
        self.get(&this, field)
    }

    /// Write a field of the receiver.
    pub fn set_field(&mut self, field: &str, value: Value) -> Result<(), Fault> {
        let this = self.this()?;
        self.set(&this, field, value)
    }

    /// Read a static field of `type_name`.
    pub fn get_static(&mut self, type_name: &str, field: &str) -> Result<Value, Fault> {
        let def = self.resolve(type_name)?;
        let declared = def.field(field).filter(|f| f.is_static).ok_or_else(|| {
            Fault::thrown("NoSuchFieldError", format!("{}.{field}", def.name()))
        })?;
        self.guard(&def, None, declared.visibility, Access::Read(field))?;
        let value = self
            .ctx
            .with_statics(&def, |statics| statics.get(field).cloned())
            .unwrap_or(Value::Null);
        Ok(self.expose(value))
    }

    /// Write a static field of `type_name`.
    pub fn set_static(&mut self, type_name: &str, field: &str, value: Value) -> Result<(), Fault> {
        let def = self.resolve(type_name)?;
        let declared = def.field(field).filter(|f| f.is_static).ok_or_else(|| {
            Fault::thrown("NoSuchFieldError", format!("{}.{field}", def.name()))
        })?;
        self.guard(&def, None, declared.visibility, Access::Write(field))?;
        if !value.conforms_to(&declared.ty) {
            return Err(Fault::thrown(
                "ClassCastException",
                format!("cannot store {} in {}.{field}", value.kind_name(), def.name()),
            ));
        }
        self.ctx.with_statics(&def, |statics| {
            statics.insert(field.to_string(), value);
        });
        Ok(())
    }
}
