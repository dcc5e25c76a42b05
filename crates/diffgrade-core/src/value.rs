//! Runtime values and type descriptors.
//!
//! [`TypeDescriptor`] is the vocabulary used by signatures, role validation and
//! generator lookup. [`Value`] is what flows through generators, method bodies
//! and outcomes.

use std::collections::HashMap;
use std::fmt;

use crate::array::ArrayValue;
use crate::invoke::Fault;
use crate::object::{ObjectHandle, ObjectId};

/// Describes the type of a parameter, return value, field or generated value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TypeDescriptor {
    Bool,
    Byte,
    Short,
    Int,
    Long,
    Float,
    Double,
    Char,
    Str,
    Array(Box<TypeDescriptor>),
    Enum { name: String, variants: Vec<String> },
    /// An object type, by name.
    Named(String),
    /// Fixed-arity heterogeneous group, produced by grouped generators.
    Tuple(Vec<TypeDescriptor>),
    /// Signature-only: the random source handed to hooks.
    RandomSource,
    /// Signature-only: a recorded test output handed to verifiers.
    Outcome,
}

impl TypeDescriptor {
    pub fn array_of(element: TypeDescriptor) -> Self {
        TypeDescriptor::Array(Box::new(element))
    }

    pub fn named(name: impl Into<String>) -> Self {
        TypeDescriptor::Named(name.into())
    }

    pub fn enumeration(name: impl Into<String>, variants: &[&str]) -> Self {
        TypeDescriptor::Enum {
            name: name.into(),
            variants: variants.iter().map(|v| v.to_string()).collect(),
        }
    }

    /// Element type for arrays.
    pub fn element(&self) -> Option<&TypeDescriptor> {
        match self {
            TypeDescriptor::Array(inner) => Some(inner),
            _ => None,
        }
    }

    pub fn is_primitive(&self) -> bool {
        matches!(
            self,
            TypeDescriptor::Bool
                | TypeDescriptor::Byte
                | TypeDescriptor::Short
                | TypeDescriptor::Int
                | TypeDescriptor::Long
                | TypeDescriptor::Float
                | TypeDescriptor::Double
                | TypeDescriptor::Char
        )
    }

    pub fn is_numeric(&self) -> bool {
        self.is_primitive() && !matches!(self, TypeDescriptor::Bool | TypeDescriptor::Char)
    }

    /// Whether values of this type can be synthesized at all.
    pub fn is_generatable(&self) -> bool {
        match self {
            TypeDescriptor::RandomSource | TypeDescriptor::Outcome => false,
            TypeDescriptor::Array(inner) => inner.is_generatable(),
            TypeDescriptor::Tuple(items) => items.iter().all(|t| t.is_generatable()),
            _ => true,
        }
    }
}

impl fmt::Display for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeDescriptor::Bool => f.write_str("boolean"),
            TypeDescriptor::Byte => f.write_str("byte"),
            TypeDescriptor::Short => f.write_str("short"),
            TypeDescriptor::Int => f.write_str("int"),
            TypeDescriptor::Long => f.write_str("long"),
            TypeDescriptor::Float => f.write_str("float"),
            TypeDescriptor::Double => f.write_str("double"),
            TypeDescriptor::Char => f.write_str("char"),
            TypeDescriptor::Str => f.write_str("String"),
            TypeDescriptor::Array(inner) => write!(f, "{inner}[]"),
            TypeDescriptor::Enum { name, .. } => f.write_str(name),
            TypeDescriptor::Named(name) => f.write_str(name),
            TypeDescriptor::Tuple(items) => {
                f.write_str("(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str(")")
            }
            TypeDescriptor::RandomSource => f.write_str("Random"),
            TypeDescriptor::Outcome => f.write_str("TestOutput"),
        }
    }
}

/// A runtime value.
#[derive(Debug, Clone)]
pub enum Value {
    /// Result of a method that returns nothing.
    Unit,
    Null,
    Bool(bool),
    Byte(i8),
    Short(i16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Char(char),
    Str(String),
    Array(ArrayValue),
    Enum { type_name: String, variant: String },
    Tuple(Vec<Value>),
    Object(ObjectHandle),
}

/// Equality used for bookkeeping: floats by bit pattern, objects by identity.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Unit, Value::Unit) | (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Byte(a), Value::Byte(b)) => a == b,
            (Value::Short(a), Value::Short(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Long(a), Value::Long(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a.to_bits() == b.to_bits(),
            (Value::Double(a), Value::Double(b)) => a.to_bits() == b.to_bits(),
            (Value::Char(a), Value::Char(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => a == b,
            (
                Value::Enum {
                    type_name: ta,
                    variant: va,
                },
                Value::Enum {
                    type_name: tb,
                    variant: vb,
                },
            ) => ta == tb && va == vb,
            (Value::Tuple(a), Value::Tuple(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => a.same_object(b),
            _ => false,
        }
    }
}

macro_rules! impl_from_value {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Value::$variant(v)
                }
            }
        )*
    };
}

impl_from_value! {
    bool => Bool,
    i8 => Byte,
    i16 => Short,
    i32 => Int,
    i64 => Long,
    f32 => Float,
    f64 => Double,
    char => Char,
    String => Str,
    ArrayValue => Array,
    ObjectHandle => Object,
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

fn class_cast(expected: &str, found: &Value) -> Fault {
    Fault::thrown(
        "ClassCastException",
        format!("expected {expected}, found {}", found.kind_name()),
    )
}

macro_rules! value_accessor {
    ($name:ident, $variant:ident, $ty:ty, $label:literal) => {
        pub fn $name(&self) -> Result<$ty, Fault> {
            match self {
                Value::$variant(v) => Ok(*v),
                other => Err(class_cast($label, other)),
            }
        }
    };
}

impl Value {
    pub fn enum_variant(type_name: impl Into<String>, variant: impl Into<String>) -> Self {
        Value::Enum {
            type_name: type_name.into(),
            variant: variant.into(),
        }
    }

    value_accessor!(as_bool, Bool, bool, "boolean");
    value_accessor!(as_byte, Byte, i8, "byte");
    value_accessor!(as_short, Short, i16, "short");
    value_accessor!(as_int, Int, i32, "int");
    value_accessor!(as_long, Long, i64, "long");
    value_accessor!(as_float, Float, f32, "float");
    value_accessor!(as_double, Double, f64, "double");
    value_accessor!(as_char, Char, char, "char");

    pub fn as_str(&self) -> Result<&str, Fault> {
        match self {
            Value::Str(s) => Ok(s),
            other => Err(class_cast("String", other)),
        }
    }

    pub fn as_array(&self) -> Result<&ArrayValue, Fault> {
        match self {
            Value::Array(a) => Ok(a),
            other => Err(class_cast("array", other)),
        }
    }

    pub fn as_object(&self) -> Result<&ObjectHandle, Fault> {
        match self {
            Value::Object(o) => Ok(o),
            Value::Null => Err(Fault::thrown("NullPointerException", "receiver is null")),
            other => Err(class_cast("object", other)),
        }
    }

    pub fn as_tuple(&self) -> Result<&[Value], Fault> {
        match self {
            Value::Tuple(items) => Ok(items),
            other => Err(class_cast("tuple", other)),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Short name of the runtime kind, for error messages.
    pub fn kind_name(&self) -> String {
        match self {
            Value::Unit => "void".into(),
            Value::Null => "null".into(),
            Value::Bool(_) => "boolean".into(),
            Value::Byte(_) => "byte".into(),
            Value::Short(_) => "short".into(),
            Value::Int(_) => "int".into(),
            Value::Long(_) => "long".into(),
            Value::Float(_) => "float".into(),
            Value::Double(_) => "double".into(),
            Value::Char(_) => "char".into(),
            Value::Str(_) => "String".into(),
            Value::Array(a) => format!("{}[]", a.element_type()),
            Value::Enum { type_name, .. } => type_name.clone(),
            Value::Tuple(items) => format!("tuple/{}", items.len()),
            Value::Object(o) => o.type_name().to_string(),
        }
    }

    /// Whether this value can be stored in a slot of type `ty`.
    pub fn conforms_to(&self, ty: &TypeDescriptor) -> bool {
        match (self, ty) {
            (Value::Bool(_), TypeDescriptor::Bool)
            | (Value::Byte(_), TypeDescriptor::Byte)
            | (Value::Short(_), TypeDescriptor::Short)
            | (Value::Int(_), TypeDescriptor::Int)
            | (Value::Long(_), TypeDescriptor::Long)
            | (Value::Float(_), TypeDescriptor::Float)
            | (Value::Double(_), TypeDescriptor::Double)
            | (Value::Char(_), TypeDescriptor::Char)
            | (Value::Str(_), TypeDescriptor::Str) => true,
            (Value::Array(a), TypeDescriptor::Array(element)) => a.element_type() == **element,
            (Value::Enum { type_name, variant }, TypeDescriptor::Enum { name, variants }) => {
                type_name == name && variants.contains(variant)
            }
            (Value::Tuple(items), TypeDescriptor::Tuple(types)) => {
                items.len() == types.len()
                    && items.iter().zip(types).all(|(v, t)| v.conforms_to(t))
            }
            // Object slots accept any object: submission types stand in for reference types.
            (Value::Object(_), TypeDescriptor::Named(_)) => true,
            (Value::Null, t) => !t.is_primitive(),
            _ => false,
        }
    }

    /// Structurally independent copy. Objects are cloned into fresh identities,
    /// preserving aliasing and cycles within the copied graph.
    pub fn deep_copy(&self) -> Value {
        let mut seen = HashMap::new();
        self.deep_copy_with(&mut seen)
    }

    pub(crate) fn deep_copy_with(&self, seen: &mut HashMap<ObjectId, ObjectHandle>) -> Value {
        match self {
            Value::Array(a) => Value::Array(a.deep_copy_with(seen)),
            Value::Tuple(items) => {
                Value::Tuple(items.iter().map(|v| v.deep_copy_with(seen)).collect())
            }
            Value::Object(o) => Value::Object(o.deep_copy_with(seen)),
            other => other.clone(),
        }
    }
}

/// Maximum object nesting rendered by [`Value`]'s `Display`.
const DISPLAY_DEPTH: usize = 3;

impl Value {
    pub(crate) fn fmt_depth(&self, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
        match self {
            Value::Unit => f.write_str("void"),
            Value::Null => f.write_str("null"),
            Value::Bool(v) => write!(f, "{v}"),
            Value::Byte(v) => write!(f, "{v}"),
            Value::Short(v) => write!(f, "{v}"),
            Value::Int(v) => write!(f, "{v}"),
            Value::Long(v) => write!(f, "{v}L"),
            Value::Float(v) => write!(f, "{v:?}f"),
            Value::Double(v) => write!(f, "{v:?}"),
            Value::Char(v) => write!(f, "{v:?}"),
            Value::Str(v) => write!(f, "{v:?}"),
            Value::Array(a) => a.fmt_depth(f, depth),
            Value::Enum { type_name, variant } => write!(f, "{type_name}.{variant}"),
            Value::Tuple(items) => {
                f.write_str("(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    item.fmt_depth(f, depth)?;
                }
                f.write_str(")")
            }
            Value::Object(o) => {
                if depth >= DISPLAY_DEPTH {
                    return write!(f, "{}{{..}}", o.type_name());
                }
                write!(f, "{}{{", o.type_name())?;
                for (i, (name, value)) in o.snapshot().iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{name}=")?;
                    value.fmt_depth(f, depth + 1)?;
                }
                f.write_str("}")
            }
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_depth(f, 0)
    }
}
