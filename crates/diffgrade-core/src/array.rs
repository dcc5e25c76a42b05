//! Array storage and the uniform array wrapper.
//!
//! Primitive arrays are stored densely; everything else (strings, enums,
//! objects, nested arrays, tuples) lives in an object array. [`ArrayWrapper`]
//! hides that split so generators, edge-case tables and random sampling all
//! read and write arrays through the same four operations.

use std::collections::HashMap;
use std::fmt;

use rand::Rng;

use crate::object::{ObjectHandle, ObjectId};
use crate::value::{TypeDescriptor, Value};

/// Backing storage for an array value.
#[derive(Debug, Clone)]
pub enum ArrayValue {
    Bool(Vec<bool>),
    Byte(Vec<i8>),
    Short(Vec<i16>),
    Int(Vec<i32>),
    Long(Vec<i64>),
    Float(Vec<f32>),
    Double(Vec<f64>),
    Char(Vec<char>),
    Objects {
        element: TypeDescriptor,
        items: Vec<Value>,
    },
}

/// Applies `$body` to the dense vector of every primitive variant.
macro_rules! with_dense {
    ($array:expr, $items:ident => $body:expr, objects $objects:ident => $obody:expr) => {
        match $array {
            ArrayValue::Bool($items) => $body,
            ArrayValue::Byte($items) => $body,
            ArrayValue::Short($items) => $body,
            ArrayValue::Int($items) => $body,
            ArrayValue::Long($items) => $body,
            ArrayValue::Float($items) => $body,
            ArrayValue::Double($items) => $body,
            ArrayValue::Char($items) => $body,
            ArrayValue::Objects {
                items: $objects, ..
            } => $obody,
        }
    };
}

impl ArrayValue {
    /// A zero-filled array: 0/false/'\0' for primitives, null otherwise.
    pub fn new(element: &TypeDescriptor, len: usize) -> Self {
        match element {
            TypeDescriptor::Bool => ArrayValue::Bool(vec![false; len]),
            TypeDescriptor::Byte => ArrayValue::Byte(vec![0; len]),
            TypeDescriptor::Short => ArrayValue::Short(vec![0; len]),
            TypeDescriptor::Int => ArrayValue::Int(vec![0; len]),
            TypeDescriptor::Long => ArrayValue::Long(vec![0; len]),
            TypeDescriptor::Float => ArrayValue::Float(vec![0.0; len]),
            TypeDescriptor::Double => ArrayValue::Double(vec![0.0; len]),
            TypeDescriptor::Char => ArrayValue::Char(vec!['\0'; len]),
            other => ArrayValue::Objects {
                element: other.clone(),
                items: vec![Value::Null; len],
            },
        }
    }

    /// Build an array of `element` from values, checking each one.
    pub fn from_values(element: &TypeDescriptor, values: Vec<Value>) -> Result<Self, ArrayError> {
        let mut wrapper = ArrayWrapper::new(element, values.len());
        for (i, v) in values.into_iter().enumerate() {
            wrapper.set(i, v)?;
        }
        Ok(wrapper.into_inner())
    }

    pub fn element_type(&self) -> TypeDescriptor {
        match self {
            ArrayValue::Bool(_) => TypeDescriptor::Bool,
            ArrayValue::Byte(_) => TypeDescriptor::Byte,
            ArrayValue::Short(_) => TypeDescriptor::Short,
            ArrayValue::Int(_) => TypeDescriptor::Int,
            ArrayValue::Long(_) => TypeDescriptor::Long,
            ArrayValue::Float(_) => TypeDescriptor::Float,
            ArrayValue::Double(_) => TypeDescriptor::Double,
            ArrayValue::Char(_) => TypeDescriptor::Char,
            ArrayValue::Objects { element, .. } => element.clone(),
        }
    }

    pub fn len(&self) -> usize {
        with_dense!(self, items => items.len(), objects items => items.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Elements as values, in order.
    pub fn to_values(&self) -> Vec<Value> {
        with_dense!(
            self,
            items => items.iter().map(|v| Value::from(*v)).collect(),
            objects items => items.clone()
        )
    }

    pub(crate) fn deep_copy_with(&self, seen: &mut HashMap<ObjectId, ObjectHandle>) -> ArrayValue {
        match self {
            ArrayValue::Objects { element, items } => ArrayValue::Objects {
                element: element.clone(),
                items: items.iter().map(|v| v.deep_copy_with(seen)).collect(),
            },
            dense => dense.clone(),
        }
    }

    pub(crate) fn fmt_depth(&self, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
        f.write_str("[")?;
        for (i, v) in self.to_values().iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            v.fmt_depth(f, depth)?;
        }
        f.write_str("]")
    }
}

impl PartialEq for ArrayValue {
    fn eq(&self, other: &Self) -> bool {
        self.element_type() == other.element_type() && self.to_values() == other.to_values()
    }
}

impl fmt::Display for ArrayValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_depth(f, 0)
    }
}

/// Errors raised by [`ArrayWrapper`] operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArrayError {
    OutOfBounds { index: usize, len: usize },
    TypeMismatch { expected: String, found: String },
}

impl fmt::Display for ArrayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArrayError::OutOfBounds { index, len } => {
                write!(f, "index {index} out of bounds for length {len}")
            }
            ArrayError::TypeMismatch { expected, found } => {
                write!(f, "cannot store {found} in an array of {expected}")
            }
        }
    }
}

impl std::error::Error for ArrayError {}

/// Uniform access to an array regardless of its element kind.
#[derive(Debug, Clone)]
pub struct ArrayWrapper {
    inner: ArrayValue,
}

impl ArrayWrapper {
    /// A fresh zero-filled array of `len` elements of type `element`.
    pub fn new(element: &TypeDescriptor, len: usize) -> Self {
        Self {
            inner: ArrayValue::new(element, len),
        }
    }

    pub fn wrap(inner: ArrayValue) -> Self {
        Self { inner }
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn element_type(&self) -> TypeDescriptor {
        self.inner.element_type()
    }

    pub fn get(&self, index: usize) -> Result<Value, ArrayError> {
        let len = self.len();
        let out_of_bounds = ArrayError::OutOfBounds { index, len };
        with_dense!(
            &self.inner,
            items => items.get(index).map(|v| Value::from(*v)).ok_or(out_of_bounds),
            objects items => items.get(index).cloned().ok_or(out_of_bounds)
        )
    }

    /// Store `value` at `index`. The value must conform to the element type.
    pub fn set(&mut self, index: usize, value: Value) -> Result<(), ArrayError> {
        let len = self.len();
        if index >= len {
            return Err(ArrayError::OutOfBounds { index, len });
        }
        let mismatch = |value: &Value, expected: &TypeDescriptor| ArrayError::TypeMismatch {
            expected: expected.to_string(),
            found: value.kind_name(),
        };
        match (&mut self.inner, value) {
            (ArrayValue::Bool(items), Value::Bool(v)) => items[index] = v,
            (ArrayValue::Byte(items), Value::Byte(v)) => items[index] = v,
            (ArrayValue::Short(items), Value::Short(v)) => items[index] = v,
            (ArrayValue::Int(items), Value::Int(v)) => items[index] = v,
            (ArrayValue::Long(items), Value::Long(v)) => items[index] = v,
            (ArrayValue::Float(items), Value::Float(v)) => items[index] = v,
            (ArrayValue::Double(items), Value::Double(v)) => items[index] = v,
            (ArrayValue::Char(items), Value::Char(v)) => items[index] = v,
            (ArrayValue::Objects { element, items }, v) => {
                if !v.conforms_to(element) {
                    return Err(mismatch(&v, element));
                }
                items[index] = v;
            }
            (dense, v) => return Err(mismatch(&v, &dense.element_type())),
        }
        Ok(())
    }

    /// A uniformly chosen element, or `None` for an empty array.
    pub fn random_element<R: Rng + ?Sized>(&self, random: &mut R) -> Option<Value> {
        if self.is_empty() {
            return None;
        }
        let index = random.gen_range(0..self.len());
        self.get(index).ok()
    }

    pub fn as_inner(&self) -> &ArrayValue {
        &self.inner
    }

    pub fn into_inner(self) -> ArrayValue {
        self.inner
    }

    pub fn into_value(self) -> Value {
        Value::Array(self.inner)
    }
}
