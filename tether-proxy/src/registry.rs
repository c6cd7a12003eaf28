//! Per-type dispatch descriptor cache.
//!
//! One [`TypeDescriptor`] is built per distinct type name on first
//! encounter and shared from then on: argument kinds and minimum arity
//! per method id, canonical names, the sync map (methods reachable
//! through Sync frames), and the remote-update notification id.
//! Descriptors are immutable once built and never evicted — type
//! identity is stable for the process lifetime, so staleness cannot
//! arise.

use std::collections::HashMap;
use std::sync::Arc;

use crate::object::{method_base_name, MethodId, TypeSpec};
use crate::value::ValueKind;

/// Immutable dispatch table for one object type.
#[derive(Debug)]
pub struct TypeDescriptor {
    pub type_name: &'static str,
    methods: Vec<MethodEntry>,
    sync_map: HashMap<&'static str, MethodId>,
    updated_remotely: Option<MethodId>,
}

#[derive(Debug)]
struct MethodEntry {
    name: &'static str,
    args: &'static [ValueKind],
    min_args: usize,
}

impl TypeDescriptor {
    fn build(spec: &'static TypeSpec) -> Self {
        let mut methods = Vec::with_capacity(spec.methods.len());
        let mut sync_map = HashMap::new();
        for (id, m) in spec.methods.iter().enumerate() {
            let name = method_base_name(m.name);
            // A spec declaring more required than declared arguments is a
            // bug in the type's table; clamp and complain once at build.
            let min_args = if m.min_args > m.args.len() {
                log::warn!(
                    "{}::{name} declares min_args {} > {} declared arguments, clamping",
                    spec.type_name,
                    m.min_args,
                    m.args.len()
                );
                m.args.len()
            } else {
                m.min_args
            };
            if is_sync_name(name) {
                sync_map.insert(name, id);
            }
            methods.push(MethodEntry { name, args: m.args, min_args });
        }
        let updated_remotely = spec.updated_remotely.filter(|&id| {
            if id < methods.len() {
                true
            } else {
                log::warn!(
                    "{} names method {id} as its remote-update notification but has only {} methods",
                    spec.type_name,
                    methods.len()
                );
                false
            }
        });
        Self { type_name: spec.type_name, methods, sync_map, updated_remotely }
    }

    pub fn method_count(&self) -> usize {
        self.methods.len()
    }

    /// Ordered argument kinds of the method, if the id is in range.
    pub fn arg_kinds(&self, method: MethodId) -> Option<&'static [ValueKind]> {
        self.methods.get(method).map(|m| m.args)
    }

    /// Minimum number of required arguments for the method.
    pub fn min_args(&self, method: MethodId) -> Option<usize> {
        self.methods.get(method).map(|m| m.min_args)
    }

    /// Canonical (decoration-stripped) name of the method.
    pub fn method_name(&self, method: MethodId) -> Option<&'static str> {
        self.methods.get(method).map(|m| m.name)
    }

    /// Resolve a method reachable through Sync frames by name.
    pub fn sync_method(&self, name: &str) -> Option<MethodId> {
        self.sync_map.get(name).copied()
    }

    /// Name → method id map of the synchronized methods.
    pub fn sync_map(&self) -> &HashMap<&'static str, MethodId> {
        &self.sync_map
    }

    /// Id of the remote-update notification method, if declared.
    pub fn updated_remotely(&self) -> Option<MethodId> {
        self.updated_remotely
    }
}

/// Whether a method name follows the synchronized-method convention:
/// a `set`/`request` prefix followed by an uppercase letter.
fn is_sync_name(name: &str) -> bool {
    ["set", "request"].iter().any(|prefix| {
        name.strip_prefix(prefix)
            .map(|rest| rest.starts_with(char::is_uppercase))
            .unwrap_or(false)
    })
}

/// A slot may be attached to a signal if the slot's parameter list is a
/// kind-compatible prefix of the signal's and its arity does not exceed
/// the signal's. A high-arity signal can therefore feed a lower-arity
/// receiver; the excess arguments are dropped at invocation.
pub fn methods_compatible(signal: &[ValueKind], slot: &[ValueKind]) -> bool {
    slot.len() <= signal.len() && slot.iter().zip(signal).all(|(s, g)| s == g)
}

/// Lazy, never-evicting descriptor cache keyed by type name.
///
/// Owned by one proxy and accessed only from its event thread; hosts
/// that want concurrency run one proxy per owning task.
#[derive(Default)]
pub struct TypeRegistry {
    types: HashMap<&'static str, Arc<TypeDescriptor>>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The descriptor for `spec`'s type, built on first access.
    pub fn type_info(&mut self, spec: &'static TypeSpec) -> Arc<TypeDescriptor> {
        self.types
            .entry(spec.type_name)
            .or_insert_with(|| Arc::new(TypeDescriptor::build(spec)))
            .clone()
    }

    /// Look up an already-built descriptor by type name.
    pub fn get(&self, type_name: &str) -> Option<Arc<TypeDescriptor>> {
        self.types.get(type_name).cloned()
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}
