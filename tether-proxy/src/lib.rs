//! # tether-proxy — transparent RPC and object synchronization
//!
//! Lets two cooperating processes — a Server holding the authoritative
//! business objects and a Client mirroring them — exchange method
//! invocations and replicate object state over a length-prefixed byte
//! stream, without per-type marshalling code.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐     TCP, framed      ┌──────────────┐
//! │ SignalProxy  │ ◄──────────────────► │ SignalProxy  │
//! │ (Server)     │   [len][Vec<Value>]  │ (Client)     │
//! └──────┬───────┘                      └──────┬───────┘
//!        │                                     │
//!  ┌─────┴──────┐                       ┌──────┴─────┐
//!  │ ObjectArena│                       │ ObjectArena│
//!  │ (authority)│                       │ (mirrors)  │
//!  └────────────┘                       └────────────┘
//! ```
//!
//! A mutation on either side is published into a [`SignalQueue`],
//! relayed as a Sync or RpcCall frame, decoded by the remote
//! dispatcher, validated against the cached type descriptor, and
//! applied to the target object. Newly synchronized client objects
//! pull their initial state through the InitRequest/InitData
//! handshake. Everything is best-effort: no acks, no retries, no
//! cross-peer ordering.
//!
//! ## Modules
//!
//! - [`value`] — self-describing wire values
//! - [`protocol`] — length-prefixed framing codec and request kinds
//! - [`object`] — the contract of a synchronizable/callable object
//! - [`arena`] — generation-checked object storage
//! - [`registry`] — per-type dispatch descriptor cache
//! - [`peer`] — peer bookkeeping and traffic counters
//! - [`relay`] — signal attachment tables
//! - [`proxy`] — the engine: dispatcher, sync registry, handshake
//! - [`node`] — tokio TCP driver and heartbeat ticker

pub mod arena;
pub mod node;
pub mod object;
pub mod peer;
pub mod protocol;
pub mod proxy;
pub mod registry;
pub mod relay;
pub mod value;

// Re-exports for convenience
pub use arena::{ObjectArena, ObjectHandle};
pub use node::{NodeConfig, ProxyNode};
pub use object::{method_base_name, MethodId, MethodSpec, SignalQueue, SyncObject, TypeSpec};
pub use peer::{Peer, PeerId, PeerLink, PeerManager};
pub use protocol::{DecodeOutcome, Frame, ProtocolError, RequestType};
pub use proxy::{ProxyEvent, ProxyRole, ProxyStats, SignalProxy, RENAME_RPC};
pub use registry::{methods_compatible, TypeDescriptor, TypeRegistry};
pub use relay::{RelayTable, SignalRelay};
pub use value::{Value, ValueKind};
