//! Edge and simple case tables.
//!
//! Declared case members replace the defaults for their element type. Tables
//! are evaluated once per side: case methods for the reference type construct
//! objects through the side's context, so each side receives its own instances.

use std::collections::HashMap;
use std::sync::Arc;

use crate::array::ArrayWrapper;
use crate::invoke::{Fault, SideContext};
use crate::proxy::HookKind;
use crate::roles::{CaseSource, MemberRef};
use crate::value::{TypeDescriptor, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaseKind {
    Edge,
    Simple,
}

/// Default edge cases: zero, blank, empty. Booleans have none.
pub fn default_edge_cases(ty: &TypeDescriptor) -> Vec<Value> {
    match ty {
        TypeDescriptor::Byte => vec![Value::Byte(0)],
        TypeDescriptor::Short => vec![Value::Short(0)],
        TypeDescriptor::Int => vec![Value::Int(0)],
        TypeDescriptor::Long => vec![Value::Long(0)],
        TypeDescriptor::Float => vec![Value::Float(0.0)],
        TypeDescriptor::Double => vec![Value::Double(0.0)],
        TypeDescriptor::Char => vec![Value::Char(' ')],
        TypeDescriptor::Str => vec![Value::from("")],
        TypeDescriptor::Array(element) => vec![ArrayWrapper::new(element, 0).into_value()],
        _ => Vec::new(),
    }
}

/// Default simple cases: small signed numbers, one-character strings,
/// single-element arrays.
pub fn default_simple_cases(ty: &TypeDescriptor) -> Vec<Value> {
    match ty {
        TypeDescriptor::Byte => vec![Value::Byte(-1), Value::Byte(1)],
        TypeDescriptor::Short => vec![Value::Short(-1), Value::Short(1)],
        TypeDescriptor::Int => vec![Value::Int(-1), Value::Int(1)],
        TypeDescriptor::Long => vec![Value::Long(-1), Value::Long(1)],
        TypeDescriptor::Float => vec![Value::Float(-1.0), Value::Float(1.0)],
        TypeDescriptor::Double => vec![Value::Double(-1.0), Value::Double(1.0)],
        TypeDescriptor::Char => vec![Value::Char('a'), Value::Char('A'), Value::Char('0')],
        TypeDescriptor::Str => vec![Value::from("a"), Value::from("A"), Value::from("0")],
        TypeDescriptor::Array(element) => {
            let Some(first) = default_simple_cases(element).into_iter().next() else {
                return Vec::new();
            };
            let mut array = ArrayWrapper::new(element, 1);
            match array.set(0, first) {
                Ok(()) => vec![array.into_value()],
                Err(_) => Vec::new(),
            }
        }
        _ => Vec::new(),
    }
}

/// Case values of one kind for one side, keyed by element type.
#[derive(Debug, Clone)]
pub struct CaseTable {
    kind: CaseKind,
    declared: HashMap<TypeDescriptor, Vec<Value>>,
}

impl CaseTable {
    /// A table with no declared cases.
    pub fn defaults(kind: CaseKind) -> Self {
        Self {
            kind,
            declared: HashMap::new(),
        }
    }

    /// Evaluate the declared case members on `side`.
    ///
    /// Case methods run as hooks; case fields are read from their declared
    /// initial values.
    pub fn evaluate(
        side: &Arc<SideContext>,
        sources: &[CaseSource],
        kind: CaseKind,
    ) -> Result<Self, Fault> {
        let mut table = Self::defaults(kind);
        for source in sources {
            let array = match source.member {
                MemberRef::Method(index) => side.run_hook(HookKind::Cases, index, &[], None)?,
                MemberRef::Field(index) => side
                    .control()
                    .fields()
                    .get(index)
                    .map(|f| f.initial.deep_copy())
                    .ok_or_else(|| Fault::engine(format!("no field #{index}")))?,
            };
            let values = match array {
                Value::Array(inner) => {
                    let wrapper = ArrayWrapper::wrap(inner);
                    (0..wrapper.len())
                        .map(|i| wrapper.get(i))
                        .collect::<Result<Vec<_>, _>>()?
                }
                Value::Null => Vec::new(),
                other => {
                    return Err(Fault::engine(format!(
                        "case member for {} produced {}, expected an array",
                        source.element,
                        other.kind_name()
                    )))
                }
            };
            table.declared.insert(source.element.clone(), values);
        }
        Ok(table)
    }

    pub fn kind(&self) -> CaseKind {
        self.kind
    }

    /// Cases for `ty`: the declared values if any, otherwise the defaults.
    pub fn values_for(&self, ty: &TypeDescriptor) -> Vec<Value> {
        if let Some(values) = self.declared.get(ty) {
            return values.clone();
        }
        match self.kind {
            CaseKind::Edge => default_edge_cases(ty),
            CaseKind::Simple => default_simple_cases(ty),
        }
    }

    pub fn is_declared(&self, ty: &TypeDescriptor) -> bool {
        self.declared.contains_key(ty)
    }
}
