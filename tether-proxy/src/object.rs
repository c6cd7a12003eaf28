//! The contract a synchronizable or callable object fulfils.
//!
//! Instead of runtime reflection, every type supplies a static
//! [`TypeSpec`]: the ordered table of its invocable methods with their
//! argument kinds. The proxy builds its dispatch descriptors from this
//! table on first encounter of the type and never looks at the object's
//! concrete Rust type again.
//!
//! State changes are published explicitly: a setter that wants its
//! mutation mirrored to the other side pushes the signal into the
//! [`SignalQueue`] handed to it, and the proxy drains the queue through
//! the relay after the call returns. There is no hidden emit-on-mutate
//! control flow.

use std::collections::BTreeMap;

use crate::value::{Value, ValueKind};

/// Index of a method within its type's [`TypeSpec::methods`] table.
pub type MethodId = usize;

/// One invocable method: canonical name, ordered argument kinds, and the
/// number of leading arguments that are required. Arguments past
/// `min_args` are trailing optionals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MethodSpec {
    pub name: &'static str,
    pub args: &'static [ValueKind],
    pub min_args: usize,
}

/// Static descriptor table for one object type.
///
/// `type_name` is the stable type identity used on the wire and as the
/// descriptor-cache key. `updated_remotely` names the method invoked
/// locally after a remote update has been applied, if the type declares
/// one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypeSpec {
    pub type_name: &'static str,
    pub methods: &'static [MethodSpec],
    pub updated_remotely: Option<MethodId>,
}

/// Collects the signals an object publishes during one invocation.
///
/// Drained by the proxy after the call returns; nothing is relayed while
/// the object is still borrowed.
#[derive(Debug, Default)]
pub struct SignalQueue {
    signals: Vec<(MethodId, Vec<Value>)>,
    renames: Vec<(String, String)>,
}

impl SignalQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish a state-change notification under the given method id.
    pub fn publish(&mut self, method: MethodId, args: Vec<Value>) {
        self.signals.push((method, args));
    }

    /// Announce that the object's identifier changed from `old` to `new`.
    /// The registry re-keys locally and propagates the rename to peers.
    pub fn publish_rename(&mut self, new_id: impl Into<String>, old_id: impl Into<String>) {
        self.renames.push((new_id.into(), old_id.into()));
    }

    pub fn is_empty(&self) -> bool {
        self.signals.is_empty() && self.renames.is_empty()
    }

    pub(crate) fn take_signals(&mut self) -> Vec<(MethodId, Vec<Value>)> {
        std::mem::take(&mut self.signals)
    }

    pub(crate) fn take_renames(&mut self) -> Vec<(String, String)> {
        std::mem::take(&mut self.renames)
    }
}

/// Contract of an object under proxy control.
///
/// Required of every synchronizable/callable collaborator: a stable type
/// name (through [`SyncObject::spec`]), an identifier unique within the
/// type, a gettable/settable property set for the init snapshot, and
/// method invocation by id.
pub trait SyncObject: Send {
    /// The static descriptor table for this object's type.
    fn spec(&self) -> &'static TypeSpec;

    /// Identifier unique among live objects of this type.
    fn object_id(&self) -> String;

    /// Snapshot of the exposed property set, sent as InitData.
    fn properties(&self) -> BTreeMap<String, Value>;

    /// Apply one snapshot property. Returns false for unknown names or
    /// mismatched kinds; the proxy logs and carries on.
    fn set_property(&mut self, name: &str, value: &Value) -> bool;

    /// Invoke the method with the given id. `args` has already been
    /// validated against the method's declared kinds and trimmed to its
    /// declared arity. Returns false if the id is out of range.
    fn invoke(&mut self, method: MethodId, args: &[Value], signals: &mut SignalQueue) -> bool;
}

/// Strip signature decoration from a method name.
///
/// Attachment sites may hand over decorated names such as
/// `"2setTopic(Text)"` (a leading code digit and a parenthesized
/// argument list). Stripping both means differently-declared but
/// semantically equal signal/slot pairs still match.
pub fn method_base_name(name: &str) -> &str {
    let name = name.trim_start_matches(|c: char| c.is_ascii_digit());
    match name.find('(') {
        Some(idx) => &name[..idx],
        None => name,
    }
}
