//! Loaded-type model and registration API.
//!
//! A [`TypeDef`] is what the engine receives for the reference and for the
//! submission: named fields, constructors and methods, each with a visibility,
//! a static/instance flag and zero or more [`Role`]s. Method bodies are shared
//! closures that reach objects only through an [`Invocation`].

use std::fmt;
use std::sync::Arc;

use crate::execute::TestOutput;
use crate::invoke::{Fault, Invocation};
use crate::roles::Role;
use crate::value::{TypeDescriptor, Value};

/// Member accessibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Visibility {
    Public,
    Private,
}

/// Body of an ordinary method, constructor or hook.
pub type CallBody = Arc<dyn Fn(&mut Invocation<'_>, &[Value]) -> Result<Value, Fault> + Send + Sync>;

/// Body of a custom verifier: receives the reference and submission outputs.
pub type VerifyBody =
    Arc<dyn Fn(&mut Invocation<'_>, &TestOutput, &TestOutput) -> Result<(), Fault> + Send + Sync>;

#[derive(Clone)]
pub enum MethodBody {
    Call(CallBody),
    Verify(VerifyBody),
}

impl fmt::Debug for MethodBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MethodBody::Call(_) => f.write_str("Call(..)"),
            MethodBody::Verify(_) => f.write_str("Verify(..)"),
        }
    }
}

/// A declared parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamDef {
    pub name: String,
    pub ty: TypeDescriptor,
    /// Named generator override for this parameter.
    pub use_generator: Option<String>,
}

/// A method, constructor or hook.
#[derive(Debug, Clone)]
pub struct MethodDef {
    pub name: String,
    pub visibility: Visibility,
    pub is_static: bool,
    pub params: Vec<ParamDef>,
    /// `None` for methods that return nothing.
    pub returns: Option<TypeDescriptor>,
    pub roles: Vec<Role>,
    pub body: MethodBody,
}

/// Name given to constructors.
pub const CONSTRUCTOR_NAME: &str = "<init>";

impl MethodDef {
    fn with_name(name: impl Into<String>, is_static: bool) -> Self {
        Self {
            name: name.into(),
            visibility: Visibility::Public,
            is_static,
            params: Vec::new(),
            returns: None,
            roles: Vec::new(),
            body: MethodBody::Call(Arc::new(|_, _| Ok(Value::Unit))),
        }
    }

    /// A public static method.
    pub fn function(name: impl Into<String>) -> Self {
        Self::with_name(name, true)
    }

    /// A public instance method.
    pub fn method(name: impl Into<String>) -> Self {
        Self::with_name(name, false)
    }

    /// A public constructor; its body runs with `this` bound to the new object.
    pub fn constructor() -> Self {
        Self::with_name(CONSTRUCTOR_NAME, false)
    }

    pub fn private(mut self) -> Self {
        self.visibility = Visibility::Private;
        self
    }

    pub fn param(mut self, name: impl Into<String>, ty: TypeDescriptor) -> Self {
        self.params.push(ParamDef {
            name: name.into(),
            ty,
            use_generator: None,
        });
        self
    }

    /// A parameter whose values come from the named generator.
    pub fn param_using(
        mut self,
        name: impl Into<String>,
        ty: TypeDescriptor,
        generator: impl Into<String>,
    ) -> Self {
        self.params.push(ParamDef {
            name: name.into(),
            ty,
            use_generator: Some(generator.into()),
        });
        self
    }

    pub fn returns(mut self, ty: TypeDescriptor) -> Self {
        self.returns = Some(ty);
        self
    }

    pub fn role(mut self, role: Role) -> Self {
        self.roles.push(role);
        self
    }

    pub fn body<F>(mut self, body: F) -> Self
    where
        F: Fn(&mut Invocation<'_>, &[Value]) -> Result<Value, Fault> + Send + Sync + 'static,
    {
        self.body = MethodBody::Call(Arc::new(body));
        self
    }

    pub fn verifier<F>(mut self, body: F) -> Self
    where
        F: Fn(&mut Invocation<'_>, &TestOutput, &TestOutput) -> Result<(), Fault>
            + Send
            + Sync
            + 'static,
    {
        self.body = MethodBody::Verify(Arc::new(body));
        self
    }

    pub fn param_types(&self) -> Vec<TypeDescriptor> {
        self.params.iter().map(|p| p.ty.clone()).collect()
    }

    pub fn is_constructor(&self) -> bool {
        self.name == CONSTRUCTOR_NAME
    }

    /// Human-readable signature, e.g. `static add(int, int) -> int`.
    pub fn signature(&self) -> String {
        let params: Vec<String> = self.params.iter().map(|p| p.ty.to_string()).collect();
        let returns = self
            .returns
            .as_ref()
            .map(|t| t.to_string())
            .unwrap_or_else(|| "void".to_string());
        format!(
            "{}{}({}) -> {}",
            if self.is_static { "static " } else { "" },
            self.name,
            params.join(", "),
            returns
        )
    }
}

/// A declared field.
#[derive(Debug, Clone)]
pub struct FieldDef {
    pub name: String,
    pub visibility: Visibility,
    pub is_static: bool,
    pub ty: TypeDescriptor,
    /// Initial value for new objects (instance fields) or for each run (static fields).
    pub initial: Value,
    pub roles: Vec<Role>,
}

impl FieldDef {
    /// A public instance field holding the zero value of `ty`.
    pub fn new(name: impl Into<String>, ty: TypeDescriptor) -> Self {
        let initial = zero_value(&ty);
        Self {
            name: name.into(),
            visibility: Visibility::Public,
            is_static: false,
            ty,
            initial,
            roles: Vec::new(),
        }
    }

    pub fn private(mut self) -> Self {
        self.visibility = Visibility::Private;
        self
    }

    pub fn static_field(mut self) -> Self {
        self.is_static = true;
        self
    }

    pub fn initial(mut self, value: impl Into<Value>) -> Self {
        self.initial = value.into();
        self
    }

    pub fn role(mut self, role: Role) -> Self {
        self.roles.push(role);
        self
    }
}

/// The value a fresh field of type `ty` holds.
pub fn zero_value(ty: &TypeDescriptor) -> Value {
    match ty {
        TypeDescriptor::Bool => Value::Bool(false),
        TypeDescriptor::Byte => Value::Byte(0),
        TypeDescriptor::Short => Value::Short(0),
        TypeDescriptor::Int => Value::Int(0),
        TypeDescriptor::Long => Value::Long(0),
        TypeDescriptor::Float => Value::Float(0.0),
        TypeDescriptor::Double => Value::Double(0.0),
        TypeDescriptor::Char => Value::Char('\0'),
        _ => Value::Null,
    }
}

/// A loaded type: the reference, a submission, or an auxiliary value type.
#[derive(Debug)]
pub struct TypeDef {
    name: String,
    fields: Vec<FieldDef>,
    methods: Vec<MethodDef>,
    constructors: Vec<MethodDef>,
}

impl TypeDef {
    pub fn builder(name: impl Into<String>) -> TypeDefBuilder {
        TypeDefBuilder {
            name: name.into(),
            fields: Vec::new(),
            methods: Vec::new(),
            constructors: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fields(&self) -> &[FieldDef] {
        &self.fields
    }

    pub fn methods(&self) -> &[MethodDef] {
        &self.methods
    }

    pub fn constructors(&self) -> &[MethodDef] {
        &self.constructors
    }

    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// First method with this name (static or instance).
    pub fn method(&self, name: &str) -> Option<&MethodDef> {
        self.methods.iter().find(|m| m.name == name)
    }

    pub fn method_at(&self, index: usize) -> Option<&MethodDef> {
        self.methods.get(index)
    }

    /// Method matching name, static-ness and parameter types exactly.
    pub fn find_method(
        &self,
        name: &str,
        is_static: bool,
        params: &[TypeDescriptor],
    ) -> Option<usize> {
        self.methods.iter().position(|m| {
            m.name == name
                && m.is_static == is_static
                && m.params.len() == params.len()
                && m.params.iter().zip(params).all(|(p, t)| &p.ty == t)
        })
    }

    /// Constructor taking exactly `arity` arguments. A type that declares no
    /// constructor has an implicit public no-argument one.
    pub(crate) fn constructor_for(&self, arity: usize) -> Result<Option<&MethodDef>, ()> {
        if self.constructors.is_empty() {
            return if arity == 0 { Ok(None) } else { Err(()) };
        }
        self.constructors
            .iter()
            .find(|c| c.params.len() == arity)
            .map(Some)
            .ok_or(())
    }

    /// Whether instances can be created with no arguments by outside code.
    pub fn has_public_default_constructor(&self) -> bool {
        self.constructors.is_empty()
            || self
                .constructors
                .iter()
                .any(|c| c.params.is_empty() && c.visibility == Visibility::Public)
    }
}

/// Builder for [`TypeDef`].
pub struct TypeDefBuilder {
    name: String,
    fields: Vec<FieldDef>,
    methods: Vec<MethodDef>,
    constructors: Vec<MethodDef>,
}

impl TypeDefBuilder {
    pub fn field(mut self, field: FieldDef) -> Self {
        self.fields.push(field);
        self
    }

    pub fn method(mut self, method: MethodDef) -> Self {
        self.methods.push(method);
        self
    }

    pub fn constructor(mut self, mut constructor: MethodDef) -> Self {
        constructor.name = CONSTRUCTOR_NAME.to_string();
        constructor.is_static = false;
        self.constructors.push(constructor);
        self
    }

    pub fn build(self) -> Arc<TypeDef> {
        Arc::new(TypeDef {
            name: self.name,
            fields: self.fields,
            methods: self.methods,
            constructors: self.constructors,
        })
    }
}

/// Argument `index` of a call. Reading past the end throws like an array access.
pub fn arg(args: &[Value], index: usize) -> Result<&Value, Fault> {
    args.get(index).ok_or_else(|| {
        Fault::thrown(
            "ArrayIndexOutOfBoundsException",
            format!("argument {index} of {}", args.len()),
        )
    })
}
