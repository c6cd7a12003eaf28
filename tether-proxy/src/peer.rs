//! Peer connection bookkeeping.
//!
//! One [`Peer`] per connected stream: the outbound frame sender, traffic
//! counters, the partial inbound buffer, and the last-heard liveness
//! instant. The manager never owns or closes the transport itself — the
//! reader/writer tasks in the driver do; removal here only forgets the
//! bookkeeping (and with it at most one partially buffered frame).

use std::collections::HashMap;
use std::time::Instant;

use tokio::sync::mpsc;
use uuid::Uuid;

/// Identity of one connected stream.
pub type PeerId = Uuid;

/// Outbound half of a peer's transport: framed bytes pushed here are
/// written to the stream by the driver's writer task. Unbounded so the
/// engine never blocks on a slow peer.
pub type PeerLink = mpsc::UnboundedSender<Vec<u8>>;

/// Bookkeeping for one connected stream.
pub struct Peer {
    link: PeerLink,
    /// Bytes received from this peer. Observational only.
    pub bytes_in: u64,
    /// Bytes sent to this peer. Observational only.
    pub bytes_out: u64,
    /// Undecoded tail of the inbound stream (at most one partial frame
    /// plus whatever arrived with it).
    pub(crate) inbound: Vec<u8>,
    /// When this peer last sent us anything, heartbeats included.
    pub last_heard: Instant,
}

impl Peer {
    fn new(link: PeerLink) -> Self {
        Self {
            link,
            bytes_in: 0,
            bytes_out: 0,
            inbound: Vec::new(),
            last_heard: Instant::now(),
        }
    }
}

/// Tracks every connected peer.
#[derive(Default)]
pub struct PeerManager {
    peers: HashMap<PeerId, Peer>,
}

impl PeerManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a peer. Rejects links that are already closed and ids
    /// that are already registered (at most one record per stream).
    pub fn add(&mut self, id: PeerId, link: PeerLink) -> bool {
        if link.is_closed() {
            log::warn!("Rejecting peer {id}: link already closed");
            return false;
        }
        if self.peers.contains_key(&id) {
            log::warn!("Rejecting peer {id}: already registered");
            return false;
        }
        self.peers.insert(id, Peer::new(link));
        true
    }

    /// Forget a peer, discarding its partial inbound buffer.
    pub fn remove(&mut self, id: PeerId) -> bool {
        self.peers.remove(&id).is_some()
    }

    /// Forget every peer, returning the removed ids.
    pub fn clear(&mut self) -> Vec<PeerId> {
        let ids: Vec<PeerId> = self.peers.keys().copied().collect();
        self.peers.clear();
        ids
    }

    pub fn contains(&self, id: PeerId) -> bool {
        self.peers.contains_key(&id)
    }

    pub fn get(&self, id: PeerId) -> Option<&Peer> {
        self.peers.get(&id)
    }

    pub fn get_mut(&mut self, id: PeerId) -> Option<&mut Peer> {
        self.peers.get_mut(&id)
    }

    /// Any registered peer id — the upstream peer in the client role,
    /// where at most one peer exists.
    pub fn sole(&self) -> Option<PeerId> {
        self.peers.keys().next().copied()
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    /// Send framed bytes to one peer. Returns false if the peer is
    /// unknown or its writer is gone.
    pub fn send(&mut self, id: PeerId, bytes: Vec<u8>) -> bool {
        let Some(peer) = self.peers.get_mut(&id) else {
            return false;
        };
        let len = bytes.len() as u64;
        if peer.link.send(bytes).is_err() {
            log::debug!("Peer {id} writer gone, send dropped");
            return false;
        }
        peer.bytes_out += len;
        true
    }

    /// Send framed bytes to every peer. Returns how many sends went out.
    pub fn broadcast(&mut self, bytes: &[u8]) -> usize {
        let ids: Vec<PeerId> = self.peers.keys().copied().collect();
        let mut reached = 0;
        for id in ids {
            if self.send(id, bytes.to_vec()) {
                reached += 1;
            }
        }
        reached
    }

    /// Sum of per-peer inbound counters.
    pub fn total_bytes_in(&self) -> u64 {
        self.peers.values().map(|p| p.bytes_in).sum()
    }

    /// Sum of per-peer outbound counters.
    pub fn total_bytes_out(&self) -> u64 {
        self.peers.values().map(|p| p.bytes_out).sum()
    }
}
