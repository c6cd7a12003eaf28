//! Signal relay bookkeeping.
//!
//! At most one relay per watched object. Each relay records which of the
//! object's methods are attached and the external wire name each one is
//! published under. The proxy consults this table when it drains an
//! object's published signals and turns the attached ones into outbound
//! RpcCall frames.

use std::collections::HashMap;

use crate::arena::ObjectHandle;
use crate::object::MethodId;

/// Attached methods of one watched object.
#[derive(Debug, Default)]
pub struct SignalRelay {
    signals: HashMap<MethodId, String>,
}

impl SignalRelay {
    /// External name a method is attached under, if any.
    pub fn external_name(&self, method: MethodId) -> Option<&str> {
        self.signals.get(&method).map(String::as_str)
    }

    pub fn attached_count(&self) -> usize {
        self.signals.len()
    }
}

/// All relays, keyed by watched object.
#[derive(Default)]
pub struct RelayTable {
    relays: HashMap<ObjectHandle, SignalRelay>,
}

impl RelayTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a method of `handle` under `external_name`. Fails if the
    /// (object, method) pair is already attached.
    pub fn attach(&mut self, handle: ObjectHandle, method: MethodId, external_name: String) -> bool {
        let relay = self.relays.entry(handle).or_default();
        if relay.signals.contains_key(&method) {
            return false;
        }
        relay.signals.insert(method, external_name);
        true
    }

    /// Tear down the relay for `handle`. Returns whether one existed.
    pub fn detach(&mut self, handle: ObjectHandle) -> bool {
        self.relays.remove(&handle).is_some()
    }

    pub fn get(&self, handle: ObjectHandle) -> Option<&SignalRelay> {
        self.relays.get(&handle)
    }

    pub fn len(&self) -> usize {
        self.relays.len()
    }

    /// Total attached (object, method) pairs across all relays.
    pub fn attached_signals(&self) -> usize {
        self.relays.values().map(SignalRelay::attached_count).sum()
    }
}
