//! Type-keyed generator registry.
//!
//! Resolution order for `resolve(type, name)`:
//! 1. a named binding for `(type, name)` when a name is requested;
//! 2. the binding for the exact type (declared, external, then built-in);
//! 3. a structural default: arrays of a resolvable element type, enums.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tracing::debug;

use super::defaults::{builtin, ArrayGen, EnumGen};
use super::Gen;
use crate::value::TypeDescriptor;

/// Registry key: a type plus an optional generator name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GeneratorKey {
    pub ty: TypeDescriptor,
    pub name: Option<String>,
}

impl GeneratorKey {
    pub fn of(ty: TypeDescriptor) -> Self {
        Self { ty, name: None }
    }

    pub fn named(ty: TypeDescriptor, name: impl Into<String>) -> Self {
        Self {
            ty,
            name: Some(name.into()),
        }
    }
}

impl fmt::Display for GeneratorKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{} \"{}\"", self.ty, name),
            None => write!(f, "{}", self.ty),
        }
    }
}

/// Where a binding came from. Later sources override earlier ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum BindingSource {
    Builtin,
    External,
    Declared,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    MissingNamed { ty: TypeDescriptor, name: String },
    Missing { ty: TypeDescriptor },
    Duplicate { key: GeneratorKey },
}

impl fmt::Display for ResolveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolveError::MissingNamed { ty, name } => {
                write!(f, "no generator named \"{name}\" for {ty}")
            }
            ResolveError::Missing { ty } => write!(
                f,
                "no generator for {ty}: declare a @Generator or register a default"
            ),
            ResolveError::Duplicate { key } => write!(f, "generator for {key} registered twice"),
        }
    }
}

impl std::error::Error for ResolveError {}

struct Binding {
    gen: Arc<dyn Gen>,
    source: BindingSource,
}

/// Assembled once per question; read-only while runs execute.
pub struct GeneratorRegistry {
    bindings: HashMap<GeneratorKey, Binding>,
}

impl GeneratorRegistry {
    /// An empty registry.
    pub fn empty() -> Self {
        Self {
            bindings: HashMap::new(),
        }
    }

    /// A registry holding the built-in primitive and string generators.
    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        for (ty, gen) in builtin() {
            registry.bindings.insert(
                GeneratorKey::of(ty),
                Binding {
                    gen,
                    source: BindingSource::Builtin,
                },
            );
        }
        registry
    }

    /// Add a binding. A binding replaces one from a lower-precedence source;
    /// two bindings from the same source for one key are rejected.
    pub fn register(
        &mut self,
        key: GeneratorKey,
        gen: Arc<dyn Gen>,
        source: BindingSource,
    ) -> Result<(), ResolveError> {
        if let Some(existing) = self.bindings.get(&key) {
            if existing.source >= source {
                return Err(ResolveError::Duplicate { key });
            }
        }
        debug!(key = %key, generator = %gen.describe(), "registered generator");
        self.bindings.insert(key, Binding { gen, source });
        Ok(())
    }

    pub fn source_of(&self, key: &GeneratorKey) -> Option<BindingSource> {
        self.bindings.get(key).map(|b| b.source)
    }

    /// Resolve a generator for `ty`, honoring a named override.
    pub fn resolve(&self, ty: &TypeDescriptor, name: Option<&str>) -> Result<Arc<dyn Gen>, ResolveError> {
        if let Some(name) = name {
            return self
                .bindings
                .get(&GeneratorKey::named(ty.clone(), name))
                .map(|b| b.gen.clone())
                .ok_or_else(|| ResolveError::MissingNamed {
                    ty: ty.clone(),
                    name: name.to_string(),
                });
        }
        if let Some(binding) = self.bindings.get(&GeneratorKey::of(ty.clone())) {
            return Ok(binding.gen.clone());
        }
        match ty {
            TypeDescriptor::Array(element) => {
                let element_gen = self.resolve(element, None)?;
                Ok(Arc::new(ArrayGen::new((**element).clone(), element_gen)))
            }
            TypeDescriptor::Enum { name, variants } => {
                Ok(Arc::new(EnumGen::new(name.clone(), variants.clone())))
            }
            other => Err(ResolveError::Missing { ty: other.clone() }),
        }
    }
}

impl Default for GeneratorRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}
