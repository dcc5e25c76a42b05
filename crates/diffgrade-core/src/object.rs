//! Object identity and state.
//!
//! Every object belongs to one side of a run. Field storage is private to the
//! crate: method bodies reach it only through an [`Invocation`](crate::Invocation),
//! which applies the access guard first.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::contract::{TypeDef, Visibility};
use crate::value::Value;

/// Which implementation an object (or an invocation) belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Reference,
    Submission,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Reference => f.write_str("reference"),
            Side::Submission => f.write_str("submission"),
        }
    }
}

/// Process-unique object identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(u64);

static NEXT_OBJECT_ID: AtomicU64 = AtomicU64::new(1);

impl ObjectId {
    fn fresh() -> Self {
        ObjectId(NEXT_OBJECT_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

struct ObjectCell {
    id: ObjectId,
    def: Arc<TypeDef>,
    side: Side,
    fields: Mutex<BTreeMap<String, Value>>,
}

/// Shared handle to an object.
///
/// A handle may be a proxy: it then presents itself under another type name
/// (the reference type a submission object stands in for) while sharing the
/// identity and state of its target.
#[derive(Clone)]
pub struct ObjectHandle {
    cell: Arc<ObjectCell>,
    presented_as: Option<Arc<str>>,
}

impl ObjectHandle {
    pub(crate) fn new(def: Arc<TypeDef>, side: Side, fields: BTreeMap<String, Value>) -> Self {
        Self {
            cell: Arc::new(ObjectCell {
                id: ObjectId::fresh(),
                def,
                side,
                fields: Mutex::new(fields),
            }),
            presented_as: None,
        }
    }

    pub fn id(&self) -> ObjectId {
        self.cell.id
    }

    pub fn side(&self) -> Side {
        self.cell.side
    }

    /// Type name as seen by the holder: the presented name for proxies.
    pub fn type_name(&self) -> &str {
        self.presented_as
            .as_deref()
            .unwrap_or_else(|| self.cell.def.name())
    }

    /// Name of the type that actually defines this object.
    pub fn actual_type_name(&self) -> &str {
        self.cell.def.name()
    }

    pub fn is_proxy(&self) -> bool {
        self.presented_as.is_some()
    }

    /// Identity comparison; proxies are the same object as their target.
    pub fn same_object(&self, other: &ObjectHandle) -> bool {
        Arc::ptr_eq(&self.cell, &other.cell)
    }

    pub(crate) fn def(&self) -> &Arc<TypeDef> {
        &self.cell.def
    }

    pub(crate) fn proxied(&self, presented_as: &str) -> ObjectHandle {
        ObjectHandle {
            cell: self.cell.clone(),
            presented_as: Some(Arc::from(presented_as)),
        }
    }

    /// The underlying handle with any proxy view removed.
    pub(crate) fn unwrapped(&self) -> ObjectHandle {
        ObjectHandle {
            cell: self.cell.clone(),
            presented_as: None,
        }
    }

    pub(crate) fn read(&self, field: &str) -> Option<Value> {
        self.cell.fields.lock().get(field).cloned()
    }

    pub(crate) fn write(&self, field: &str, value: Value) {
        self.cell.fields.lock().insert(field.to_string(), value);
    }

    /// Copy of every field, taken under the lock and released before returning.
    pub(crate) fn snapshot(&self) -> BTreeMap<String, Value> {
        self.cell.fields.lock().clone()
    }

    /// Copy of the fields the defining type declares public.
    pub(crate) fn public_snapshot(&self) -> BTreeMap<String, Value> {
        let def = self.def();
        self.snapshot()
            .into_iter()
            .filter(|(name, _)| {
                def.field(name)
                    .map(|f| f.visibility == Visibility::Public)
                    .unwrap_or(false)
            })
            .collect()
    }

    /// An independent copy with a fresh identity, nested objects included.
    pub(crate) fn deep_copy(&self) -> ObjectHandle {
        self.deep_copy_with(&mut HashMap::new())
    }

    pub(crate) fn deep_copy_with(&self, seen: &mut HashMap<ObjectId, ObjectHandle>) -> ObjectHandle {
        if let Some(copy) = seen.get(&self.id()) {
            return copy.clone();
        }
        let copy = ObjectHandle {
            cell: Arc::new(ObjectCell {
                id: ObjectId::fresh(),
                def: self.cell.def.clone(),
                side: self.cell.side,
                fields: Mutex::new(BTreeMap::new()),
            }),
            presented_as: self.presented_as.clone(),
        };
        seen.insert(self.id(), copy.clone());
        let fields: BTreeMap<String, Value> = self
            .snapshot()
            .into_iter()
            .map(|(name, value)| (name, value.deep_copy_with(seen)))
            .collect();
        *copy.cell.fields.lock() = fields;
        copy
    }
}

impl PartialEq for ObjectHandle {
    fn eq(&self, other: &Self) -> bool {
        self.same_object(other)
    }
}

impl Eq for ObjectHandle {}

impl Hash for ObjectHandle {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id().hash(state);
    }
}

impl fmt::Debug for ObjectHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}({})", self.type_name(), self.id(), self.side())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::{FieldDef, TypeDef};
    use crate::value::TypeDescriptor;

    fn point_def() -> Arc<TypeDef> {
        TypeDef::builder("Point")
            .field(FieldDef::new("x", TypeDescriptor::Int))
            .field(FieldDef::new("secret", TypeDescriptor::Int).private())
            .build()
    }

    fn point(def: &Arc<TypeDef>, x: i32) -> ObjectHandle {
        let mut fields = BTreeMap::new();
        fields.insert("x".to_string(), Value::Int(x));
        fields.insert("secret".to_string(), Value::Int(99));
        ObjectHandle::new(def.clone(), Side::Reference, fields)
    }

    #[test]
    fn test_identity_survives_proxying() {
        let def = point_def();
        let a = point(&def, 1);
        let b = point(&def, 1);
        let proxy = a.proxied("Other");
        assert_eq!(a, proxy);
        assert_ne!(a, b);
        assert_eq!(proxy.type_name(), "Other");
        assert_eq!(proxy.actual_type_name(), "Point");
        assert!(!proxy.unwrapped().is_proxy());
    }

    #[test]
    fn test_deep_copy_is_independent_and_keeps_cycles() {
        let def = point_def();
        let a = point(&def, 5);
        a.write("self_ref", Value::Object(a.clone()));
        let copy = Value::Object(a.clone()).deep_copy();
        let copy = copy.as_object().unwrap().clone();
        assert_ne!(copy, a);
        copy.write("x", Value::Int(6));
        assert_eq!(a.read("x"), Some(Value::Int(5)));
        match copy.read("self_ref") {
            Some(Value::Object(inner)) => assert_eq!(inner, copy),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_public_snapshot_hides_private_fields() {
        let def = point_def();
        let a = point(&def, 2);
        let public = a.public_snapshot();
        assert_eq!(public.len(), 1);
        assert_eq!(public.get("x"), Some(&Value::Int(2)));
    }
}
