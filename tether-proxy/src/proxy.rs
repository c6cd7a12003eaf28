//! The proxy engine.
//!
//! A [`SignalProxy`] owns the objects under its control, the per-type
//! dispatch descriptors, the peer bookkeeping, the relay and slot
//! tables, and the synchronized-object registry. Everything is plain
//! single-threaded state: the transport driver serializes every event
//! (readability, heartbeat tick, API call) so each handler runs to
//! completion before the next one starts.
//!
//! ```text
//! local mutation ──► SignalQueue ──► relay ──► encode ──► peers
//!                                                           │
//! peers ──► on_readable ──► decode ──► classify ──► Sync / RpcCall /
//!                                                   InitRequest /
//!                                                   InitData / HeartBeat
//! ```
//!
//! All protocol failure is local and non-fatal: unknown targets, bad
//! arity, and mistyped arguments drop the call with a debug log and
//! never produce an error reply.

use std::collections::HashMap;
use std::time::Instant;

use tokio::sync::mpsc;

use crate::arena::{ObjectArena, ObjectHandle};
use crate::object::{method_base_name, MethodId, SignalQueue, SyncObject};
use crate::peer::{PeerId, PeerLink, PeerManager};
use crate::protocol::{self, DecodeOutcome, Frame, ProtocolError, RequestType};
use crate::registry::TypeRegistry;
use crate::relay::RelayTable;
use crate::value::Value;

/// Reserved RpcCall name that propagates an object rename to the remote
/// registry. Carries `[type_name, new_id, old_id]`.
pub const RENAME_RPC: &str = "__objectRenamed__";

/// Which side of the split this proxy plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProxyRole {
    /// Holds the authoritative objects; fans out to every peer.
    Server,
    /// Mirrors server state; talks to a single upstream peer.
    Client,
}

/// Notifications emitted by the proxy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProxyEvent {
    /// A peer was added.
    Connected,
    /// A client proxy lost its only peer.
    Disconnected,
    /// A peer was removed.
    PeerRemoved(PeerId),
    /// A synchronized object received and applied its init snapshot.
    ObjectInitialized(ObjectHandle),
}

/// Where an invocation came from. Signals published while applying a
/// remote frame are suppressed from the relay in the client role so an
/// applied update is not bounced straight back upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Origin {
    Local,
    Remote,
}

struct SyncRegistration {
    handle: ObjectHandle,
    initialized: bool,
}

/// Observational counters, surfaced for diagnostics only.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProxyStats {
    pub peers: usize,
    pub bytes_in: u64,
    pub bytes_out: u64,
    pub objects: usize,
    pub relays: usize,
    pub attached_signals: usize,
    pub attached_slots: usize,
    pub sync_registrations: usize,
    pub cached_types: usize,
}

/// The proxy engine. See the module docs for the data flow.
pub struct SignalProxy {
    role: ProxyRole,
    objects: ObjectArena,
    registry: TypeRegistry,
    peers: PeerManager,
    relays: RelayTable,
    /// External name → attached receivers. One name may fan out to
    /// several (object, method) pairs.
    slots: HashMap<String, Vec<(ObjectHandle, MethodId)>>,
    /// (type name, object id) → registration.
    sync: HashMap<(String, String), SyncRegistration>,
    event_tx: mpsc::UnboundedSender<ProxyEvent>,
    event_rx: Option<mpsc::UnboundedReceiver<ProxyEvent>>,
}

impl SignalProxy {
    pub fn new(role: ProxyRole) -> Self {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        Self {
            role,
            objects: ObjectArena::new(),
            registry: TypeRegistry::new(),
            peers: PeerManager::new(),
            relays: RelayTable::new(),
            slots: HashMap::new(),
            sync: HashMap::new(),
            event_tx,
            event_rx: Some(event_rx),
        }
    }

    pub fn role(&self) -> ProxyRole {
        self.role
    }

    /// Take the notification receiver (can only be called once).
    pub fn take_event_rx(&mut self) -> Option<mpsc::UnboundedReceiver<ProxyEvent>> {
        self.event_rx.take()
    }

    fn emit(&self, event: ProxyEvent) {
        let _ = self.event_tx.send(event);
    }

    // ─── Objects ────────────────────────────────────────────────────

    /// Take ownership of an object, warming the descriptor cache for
    /// its type on first encounter.
    pub fn add_object(&mut self, object: Box<dyn SyncObject>) -> ObjectHandle {
        self.registry.type_info(object.spec());
        self.objects.insert(object)
    }

    /// Destroy an object. Its relay, attached slots, and sync
    /// registration go with it — no dangling calls are possible
    /// afterwards.
    pub fn remove_object(&mut self, handle: ObjectHandle) -> bool {
        self.detach_object(handle);
        self.objects.remove(handle).is_some()
    }

    /// Mutate an object locally. Signals the mutation publishes into
    /// the queue are relayed outbound after the closure returns.
    pub fn update<F>(&mut self, handle: ObjectHandle, f: F) -> bool
    where
        F: FnOnce(&mut dyn SyncObject, &mut SignalQueue),
    {
        let mut queue = SignalQueue::new();
        match self.objects.get_mut(handle) {
            Some(object) => f(object, &mut queue),
            None => return false,
        }
        self.relay_signals(handle, queue, Origin::Local);
        true
    }

    // ─── Signals and slots ──────────────────────────────────────────

    /// Register interest in a method of `handle` under a wire-visible
    /// external name (defaults to the canonical method name). Fails if
    /// the pair is already attached.
    pub fn attach_signal(
        &mut self,
        handle: ObjectHandle,
        method: MethodId,
        external_name: Option<&str>,
    ) -> bool {
        let Some(object) = self.objects.get(handle) else {
            log::debug!("attach_signal on dead handle");
            return false;
        };
        let descriptor = self.registry.type_info(object.spec());
        let Some(canonical) = descriptor.method_name(method) else {
            log::warn!("attach_signal: {} has no method {method}", descriptor.type_name);
            return false;
        };
        let name = external_name.map(method_base_name).unwrap_or(canonical);
        if name.is_empty() {
            return false;
        }
        self.relays.attach(handle, method, name.to_string())
    }

    /// Register a receiver for RpcCall frames carrying `external_name`.
    /// Several receivers may share one name.
    pub fn attach_slot(&mut self, external_name: &str, handle: ObjectHandle, method: MethodId) -> bool {
        let Some(object) = self.objects.get(handle) else {
            log::debug!("attach_slot on dead handle");
            return false;
        };
        let descriptor = self.registry.type_info(object.spec());
        if descriptor.method_name(method).is_none() {
            log::warn!("attach_slot: {} has no method {method}", descriptor.type_name);
            return false;
        }
        let name = method_base_name(external_name);
        if name.is_empty() {
            return false;
        }
        let receivers = self.slots.entry(name.to_string()).or_default();
        if receivers.contains(&(handle, method)) {
            return false;
        }
        receivers.push((handle, method));
        true
    }

    /// Tear down the relay for `handle`.
    pub fn detach_signals(&mut self, handle: ObjectHandle) {
        self.relays.detach(handle);
    }

    /// Remove `handle` from every slot registration.
    pub fn detach_slots(&mut self, handle: ObjectHandle) {
        self.slots.retain(|_, receivers| {
            receivers.retain(|(h, _)| *h != handle);
            !receivers.is_empty()
        });
    }

    /// Detach signals and slots and stop synchronization.
    pub fn detach_object(&mut self, handle: ObjectHandle) {
        self.detach_signals(handle);
        self.detach_slots(handle);
        self.stop_sync(handle);
    }

    // ─── Synchronization ────────────────────────────────────────────

    /// Put an object under synchronization. Duplicate calls are no-ops.
    /// In the client role the initial state is requested immediately
    /// (or as soon as a peer appears).
    pub fn synchronize(&mut self, handle: ObjectHandle) -> bool {
        let Some(object) = self.objects.get(handle) else {
            log::debug!("synchronize on dead handle");
            return false;
        };
        let spec = object.spec();
        self.registry.type_info(spec);
        let key = (spec.type_name.to_string(), object.object_id());
        if self.sync.contains_key(&key) {
            return true;
        }
        log::debug!("Synchronizing {}/{}", key.0, key.1);
        let initialized = self.role == ProxyRole::Server;
        self.sync.insert(key, SyncRegistration { handle, initialized });
        if self.role == ProxyRole::Client {
            self.request_init(handle);
        }
        true
    }

    /// Drop the registration for `handle`. Nothing is broadcast; later
    /// Sync frames addressed to the old key are simply dropped.
    pub fn stop_sync(&mut self, handle: ObjectHandle) -> bool {
        let before = self.sync.len();
        self.sync.retain(|_, reg| reg.handle != handle);
        before != self.sync.len()
    }

    /// Whether `handle` is registered and has its initial state.
    pub fn is_initialized(&self, handle: ObjectHandle) -> bool {
        self.sync.values().any(|reg| reg.handle == handle && reg.initialized)
    }

    /// Mark `handle` initialized, emitting `ObjectInitialized` on the
    /// transition. Returns false if the handle is not registered.
    pub fn set_initialized(&mut self, handle: ObjectHandle) -> bool {
        let Some(reg) = self.sync.values_mut().find(|reg| reg.handle == handle) else {
            return false;
        };
        if !reg.initialized {
            reg.initialized = true;
            self.emit(ProxyEvent::ObjectInitialized(handle));
        }
        true
    }

    /// Ask the upstream peer for the object's initial state. The object
    /// is uninitialized until a matching InitData arrives. With no peer
    /// connected the request is re-issued by `add_peer`.
    pub fn request_init(&mut self, handle: ObjectHandle) -> bool {
        if self.role != ProxyRole::Client {
            log::warn!("request_init is meaningful only in the client role");
            return false;
        }
        let key = {
            let Some((key, reg)) = self.sync.iter_mut().find(|(_, reg)| reg.handle == handle) else {
                log::debug!("request_init for unregistered handle");
                return false;
            };
            reg.initialized = false;
            key.clone()
        };
        if let Some(peer) = self.peers.sole() {
            let frame = Frame::new(RequestType::InitRequest, vec![key.0.into(), key.1.into()]);
            self.send_to(peer, &frame);
        }
        true
    }

    /// Re-key a registration after its object's identifier changed, so
    /// it stays addressable by subsequent Sync/Init traffic.
    pub fn object_renamed(&mut self, type_name: &str, new_id: &str, old_id: &str) -> bool {
        if new_id == old_id {
            return true;
        }
        let old_key = (type_name.to_string(), old_id.to_string());
        let Some(reg) = self.sync.remove(&old_key) else {
            log::debug!("Rename of unregistered object {type_name}/{old_id}");
            return false;
        };
        let new_key = (type_name.to_string(), new_id.to_string());
        if self.sync.contains_key(&new_key) {
            log::warn!("Rename collision on {type_name}/{new_id}, keeping old key");
            self.sync.insert(old_key, reg);
            return false;
        }
        log::debug!("Object {type_name}/{old_id} renamed to {new_id}");
        self.sync.insert(new_key, reg);
        true
    }

    // ─── Peers ──────────────────────────────────────────────────────

    /// Register a connected stream. Rejects closed links, duplicate
    /// ids, and a second upstream peer in the client role. A client
    /// gaining its peer re-requests the initial state of every
    /// registered object.
    pub fn add_peer(&mut self, id: PeerId, link: PeerLink) -> bool {
        if self.role == ProxyRole::Client && !self.peers.is_empty() {
            log::warn!("Client proxy already has an upstream peer, rejecting {id}");
            return false;
        }
        if !self.peers.add(id, link) {
            return false;
        }
        log::info!("Peer {id} added");
        self.emit(ProxyEvent::Connected);
        if self.role == ProxyRole::Client {
            let keys: Vec<(String, String)> = self.sync.keys().cloned().collect();
            for key in keys {
                if let Some(reg) = self.sync.get_mut(&key) {
                    reg.initialized = false;
                }
                let frame = Frame::new(RequestType::InitRequest, vec![key.0.into(), key.1.into()]);
                self.send_to(id, &frame);
            }
        }
        true
    }

    /// Remove one peer, or every peer when `id` is `None` (teardown).
    /// The underlying stream is not closed — transport ownership stays
    /// with the driver. A client losing its only peer emits
    /// `Disconnected`.
    pub fn remove_peer(&mut self, id: Option<PeerId>) {
        let removed = match id {
            Some(id) => {
                if self.peers.remove(id) {
                    vec![id]
                } else {
                    log::debug!("remove_peer: {id} not registered");
                    Vec::new()
                }
            }
            None => self.peers.clear(),
        };
        for id in &removed {
            log::info!("Peer {id} removed");
            self.emit(ProxyEvent::PeerRemoved(*id));
        }
        if self.role == ProxyRole::Client && !removed.is_empty() && self.peers.is_empty() {
            self.emit(ProxyEvent::Disconnected);
        }
    }

    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }

    /// When the peer last sent anything, heartbeats included.
    pub fn peer_last_heard(&self, id: PeerId) -> Option<Instant> {
        self.peers.get(id).map(|peer| peer.last_heard)
    }

    /// Broadcast a liveness probe to every peer. One-way: receivers
    /// record it, nobody replies.
    pub fn send_heartbeat(&mut self) -> usize {
        let frame = Frame::new(RequestType::HeartBeat, Vec::new());
        match protocol::encode_frame(&frame) {
            Ok(bytes) => self.peers.broadcast(&bytes),
            Err(e) => {
                log::error!("Failed to encode heartbeat: {e}");
                0
            }
        }
    }

    // ─── Dispatcher ─────────────────────────────────────────────────

    /// Feed bytes read from a peer's stream. Decodes and dispatches
    /// every complete frame, in arrival order, keeping at most one
    /// partial frame buffered.
    pub fn on_readable(&mut self, peer: PeerId, bytes: &[u8]) {
        {
            let Some(p) = self.peers.get_mut(peer) else {
                log::debug!("Bytes from unknown peer {peer}");
                return;
            };
            p.inbound.extend_from_slice(bytes);
            p.last_heard = Instant::now();
        }
        loop {
            let step = {
                let Some(p) = self.peers.get_mut(peer) else {
                    return;
                };
                match protocol::decode(&p.inbound) {
                    Ok(DecodeOutcome::Incomplete) => None,
                    Ok(DecodeOutcome::Decoded { consumed, values }) => {
                        p.inbound.drain(..consumed);
                        p.bytes_in += consumed as u64;
                        Some(values)
                    }
                    Err(ProtocolError::CorruptPayload { consumed, detail }) => {
                        log::warn!("Skipping corrupt {consumed}-byte frame from {peer}: {detail}");
                        p.inbound.drain(..consumed);
                        p.bytes_in += consumed as u64;
                        continue;
                    }
                    Err(e) => {
                        log::warn!(
                            "Unrecoverable framing from {peer}: {e}; discarding {} buffered bytes",
                            p.inbound.len()
                        );
                        p.inbound.clear();
                        None
                    }
                }
            };
            match step {
                Some(values) => self.dispatch_frame(peer, values),
                None => break,
            }
        }
    }

    fn dispatch_frame(&mut self, peer: PeerId, values: Vec<Value>) {
        let frame = match Frame::from_values(values) {
            Ok(frame) => frame,
            Err(e) => {
                log::debug!("Dropping unclassifiable frame from {peer}: {e}");
                return;
            }
        };
        match frame.request {
            RequestType::Sync => self.handle_sync(frame.params),
            RequestType::RpcCall => self.handle_rpc(peer, frame.params),
            RequestType::InitRequest => self.handle_init_request(peer, frame.params),
            RequestType::InitData => self.handle_init_data(peer, frame.params),
            RequestType::HeartBeat => {
                // last_heard was already refreshed on receipt.
                log::trace!("Heartbeat from {peer}");
            }
        }
    }

    /// RpcCall: `[external_name, args...]`. Every receiver attached
    /// under the name is invoked independently.
    fn handle_rpc(&mut self, peer: PeerId, mut params: Vec<Value>) {
        if params.is_empty() {
            log::debug!("RpcCall without a name from {peer}");
            return;
        }
        let args = params.split_off(1);
        let Some(name) = params[0].as_text() else {
            log::debug!("RpcCall name is not text, dropped");
            return;
        };
        let name = method_base_name(name).to_string();

        if name == RENAME_RPC {
            match (
                args.first().and_then(Value::as_text),
                args.get(1).and_then(Value::as_text),
                args.get(2).and_then(Value::as_text),
            ) {
                (Some(type_name), Some(new_id), Some(old_id)) => {
                    let (type_name, new_id, old_id) =
                        (type_name.to_string(), new_id.to_string(), old_id.to_string());
                    self.object_renamed(&type_name, &new_id, &old_id);
                }
                _ => log::debug!("Malformed rename call from {peer}"),
            }
            return;
        }

        let Some(receivers) = self.slots.get(&name).cloned() else {
            log::trace!("RpcCall {name} has no attached receivers");
            return;
        };
        for (handle, method) in receivers {
            self.invoke_slot(handle, method, &args, Origin::Remote);
        }
    }

    /// Sync: `[type_name, object_id, method_name, args...]`. Dropped
    /// unless the target is registered, initialized, and declares the
    /// method in its sync map.
    fn handle_sync(&mut self, params: Vec<Value>) {
        let (Some(type_name), Some(object_id), Some(method_name)) = (
            params.first().and_then(Value::as_text),
            params.get(1).and_then(Value::as_text),
            params.get(2).and_then(Value::as_text),
        ) else {
            log::debug!("Malformed Sync frame, dropped");
            return;
        };

        let key = (type_name.to_string(), object_id.to_string());
        let Some(reg) = self.sync.get(&key) else {
            log::debug!("Sync for unknown object {type_name}/{object_id}, dropped");
            return;
        };
        if !reg.initialized {
            log::debug!("Sync for uninitialized object {type_name}/{object_id}, dropped");
            return;
        }
        let handle = reg.handle;

        let Some(descriptor) = self.registry.get(type_name) else {
            log::debug!("Sync for undescribed type {type_name}, dropped");
            return;
        };
        let Some(method) = descriptor.sync_method(method_base_name(method_name)) else {
            log::debug!("{type_name} has no synchronized method {method_name}, dropped");
            return;
        };

        if self.invoke_slot(handle, method, &params[3..], Origin::Remote) {
            if let Some(notify) = descriptor.updated_remotely() {
                self.invoke_slot(handle, notify, &[], Origin::Remote);
            }
        }
    }

    /// InitRequest: `[type_name, object_id]`. Server-side: snapshot the
    /// object's property set and reply to the requesting peer only.
    fn handle_init_request(&mut self, peer: PeerId, params: Vec<Value>) {
        if self.role != ProxyRole::Server {
            log::warn!("InitRequest reached a client proxy, dropped");
            return;
        }
        let (Some(type_name), Some(object_id)) = (
            params.first().and_then(Value::as_text),
            params.get(1).and_then(Value::as_text),
        ) else {
            log::debug!("Malformed InitRequest, dropped");
            return;
        };

        let key = (type_name.to_string(), object_id.to_string());
        let Some(reg) = self.sync.get(&key) else {
            log::debug!("InitRequest for unknown object {type_name}/{object_id}, dropped");
            return;
        };
        let Some(object) = self.objects.get(reg.handle) else {
            log::debug!("InitRequest target {type_name}/{object_id} is gone, dropped");
            return;
        };
        let properties = object.properties();
        log::debug!(
            "InitData for {type_name}/{object_id}: {} properties to {peer}",
            properties.len()
        );
        let frame = Frame::new(
            RequestType::InitData,
            vec![key.0.into(), key.1.into(), Value::Map(properties)],
        );
        self.send_to(peer, &frame);
    }

    /// InitData: `[type_name, object_id, properties]`. Client-side:
    /// apply the snapshot to the pending registration and mark it
    /// initialized, firing `ObjectInitialized` exactly once.
    fn handle_init_data(&mut self, peer: PeerId, params: Vec<Value>) {
        if self.role != ProxyRole::Client {
            log::warn!("InitData reached a server proxy, dropped");
            return;
        }
        let (Some(type_name), Some(object_id), Some(properties)) = (
            params.first().and_then(Value::as_text),
            params.get(1).and_then(Value::as_text),
            params.get(2).and_then(Value::as_map),
        ) else {
            log::debug!("Malformed InitData from {peer}, dropped");
            return;
        };

        let key = (type_name.to_string(), object_id.to_string());
        let Some(reg) = self.sync.get(&key) else {
            log::debug!("InitData for unknown object {type_name}/{object_id}, dropped");
            return;
        };
        if reg.initialized {
            log::debug!("InitData for already-initialized {type_name}/{object_id}, dropped");
            return;
        }
        let handle = reg.handle;
        {
            let Some(object) = self.objects.get_mut(handle) else {
                log::debug!("InitData target {type_name}/{object_id} is gone, dropped");
                return;
            };
            for (name, value) in properties {
                if !object.set_property(name, value) {
                    log::warn!("{type_name}/{object_id} rejected snapshot property {name}");
                }
            }
        }
        log::debug!("{type_name}/{object_id} initialized with {} properties", properties.len());
        self.set_initialized(handle);
    }

    /// Validate and invoke one method. Requires at least `min_args`
    /// parameters with kinds matching the declaration; well-formed
    /// excess beyond the declared arity is ignored. Validation failure
    /// drops the call.
    fn invoke_slot(
        &mut self,
        handle: ObjectHandle,
        method: MethodId,
        params: &[Value],
        origin: Origin,
    ) -> bool {
        let Some(object) = self.objects.get(handle) else {
            log::debug!("Invocation on dead handle, dropped");
            return false;
        };
        let descriptor = self.registry.type_info(object.spec());
        let (Some(kinds), Some(min_args)) =
            (descriptor.arg_kinds(method), descriptor.min_args(method))
        else {
            log::debug!("{} has no method {method}, dropped", descriptor.type_name);
            return false;
        };
        if params.len() < min_args {
            log::debug!(
                "{}::{} needs {min_args} arguments, got {}, dropped",
                descriptor.type_name,
                descriptor.method_name(method).unwrap_or("?"),
                params.len()
            );
            return false;
        }
        let supplied = &params[..params.len().min(kinds.len())];
        for (position, (value, kind)) in supplied.iter().zip(kinds).enumerate() {
            if !value.matches(*kind) {
                log::debug!(
                    "{}::{} argument {position} has kind {:?}, expected {kind:?}, dropped",
                    descriptor.type_name,
                    descriptor.method_name(method).unwrap_or("?"),
                    value.kind()
                );
                return false;
            }
        }

        let mut queue = SignalQueue::new();
        let invoked = match self.objects.get_mut(handle) {
            Some(object) => object.invoke(method, supplied, &mut queue),
            None => false,
        };
        if invoked {
            self.relay_signals(handle, queue, origin);
        }
        invoked
    }

    // ─── Outbound ───────────────────────────────────────────────────

    /// Drain one invocation's published signals through the relay:
    /// renames first (so the remote registry re-keys before any Sync
    /// addressed to the new id), then Sync frames for synchronized
    /// methods and RpcCall frames for attached signals.
    fn relay_signals(&mut self, handle: ObjectHandle, mut queue: SignalQueue, origin: Origin) {
        let renames = queue.take_renames();
        let signals = queue.take_signals();
        if renames.is_empty() && signals.is_empty() {
            return;
        }

        let suppress = origin == Origin::Remote && self.role == ProxyRole::Client;

        let (type_name, object_id, descriptor) = {
            let Some(object) = self.objects.get(handle) else {
                return;
            };
            let spec = object.spec();
            (spec.type_name.to_string(), object.object_id(), self.registry.type_info(spec))
        };

        for (new_id, old_id) in renames {
            self.object_renamed(&type_name, &new_id, &old_id);
            if !suppress {
                let frame = Frame::new(
                    RequestType::RpcCall,
                    vec![
                        RENAME_RPC.into(),
                        type_name.clone().into(),
                        new_id.into(),
                        old_id.into(),
                    ],
                );
                self.dispatch_out(&frame);
            }
        }
        if suppress {
            return;
        }

        let synchronized = self.sync.values().any(|reg| reg.handle == handle);
        for (method, args) in signals {
            let Some(name) = descriptor.method_name(method) else {
                log::warn!("{type_name} published unknown method {method}");
                continue;
            };
            if synchronized && descriptor.sync_method(name) == Some(method) {
                let mut params = vec![
                    Value::Text(type_name.clone()),
                    Value::Text(object_id.clone()),
                    Value::Text(name.to_string()),
                ];
                params.extend(args.iter().cloned());
                self.dispatch_out(&Frame::new(RequestType::Sync, params));
            }
            let external = self
                .relays
                .get(handle)
                .and_then(|relay| relay.external_name(method))
                .map(str::to_string);
            if let Some(external) = external {
                let mut params = vec![Value::Text(external)];
                params.extend(args);
                self.dispatch_out(&Frame::new(RequestType::RpcCall, params));
            }
        }
    }

    /// Broadcast in the server role; send to the sole upstream peer in
    /// the client role. With no peer connected the frame is dropped —
    /// replication is best-effort, never queued.
    fn dispatch_out(&mut self, frame: &Frame) -> usize {
        let bytes = match protocol::encode_frame(frame) {
            Ok(bytes) => bytes,
            Err(e) => {
                log::error!("Failed to encode {:?} frame: {e}", frame.request);
                return 0;
            }
        };
        match self.role {
            ProxyRole::Server => self.peers.broadcast(&bytes),
            ProxyRole::Client => match self.peers.sole() {
                Some(peer) => usize::from(self.peers.send(peer, bytes)),
                None => {
                    log::trace!("No upstream peer, dropping {:?} frame", frame.request);
                    0
                }
            },
        }
    }

    fn send_to(&mut self, peer: PeerId, frame: &Frame) -> bool {
        match protocol::encode_frame(frame) {
            Ok(bytes) => self.peers.send(peer, bytes),
            Err(e) => {
                log::error!("Failed to encode {:?} frame: {e}", frame.request);
                false
            }
        }
    }

    // ─── Diagnostics ────────────────────────────────────────────────

    pub fn stats(&self) -> ProxyStats {
        ProxyStats {
            peers: self.peers.len(),
            bytes_in: self.peers.total_bytes_in(),
            bytes_out: self.peers.total_bytes_out(),
            objects: self.objects.len(),
            relays: self.relays.len(),
            attached_signals: self.relays.attached_signals(),
            attached_slots: self.slots.values().map(Vec::len).sum(),
            sync_registrations: self.sync.len(),
            cached_types: self.registry.len(),
        }
    }

    /// Log a one-shot summary of the proxy's bookkeeping.
    pub fn dump_proxy_stats(&self) {
        let stats = self.stats();
        log::info!(
            "proxy[{:?}]: {} peers ({}B in / {}B out), {} objects, {} relays ({} signals), {} slots, {} sync registrations, {} cached types",
            self.role,
            stats.peers,
            stats.bytes_in,
            stats.bytes_out,
            stats.objects,
            stats.relays,
            stats.attached_signals,
            stats.attached_slots,
            stats.sync_registrations,
            stats.cached_types,
        );
    }

    /// Log the sync map of an object's type.
    pub fn dump_sync_map(&mut self, handle: ObjectHandle) {
        let Some(object) = self.objects.get(handle) else {
            return;
        };
        let descriptor = self.registry.type_info(object.spec());
        for (name, method) in descriptor.sync_map() {
            log::info!("{}: {name} -> method {method}", descriptor.type_name);
        }
    }
}
