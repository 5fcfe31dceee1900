//! Registered peers of the relay
//!
//! A peer is registered by the first datagram it sends, whatever that
//! datagram is, and stays registered as long as it keeps sending. The relay
//! never inspects payloads beyond their header; this module only tracks who
//! to forward to.

use log::info;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

/// How long a silent peer stays registered.
pub const DEFAULT_PEER_TIMEOUT: Duration = Duration::from_secs(5);

/// A peer the relay forwards to
#[derive(Debug)]
pub struct Peer {
    /// Relay-local identifier, only used in logs
    pub id: u32,
    /// Address datagrams are forwarded to
    pub addr: SocketAddr,
    /// Last time any datagram arrived from this peer
    pub last_seen: Instant,
    /// Datagrams received from this peer, keepalives included
    pub received: u64,
}

impl Peer {
    pub fn new(id: u32, addr: SocketAddr) -> Self {
        Self {
            id,
            addr,
            last_seen: Instant::now(),
            received: 0,
        }
    }

    /// Marks the peer as alive
    pub fn touch(&mut self) {
        self.last_seen = Instant::now();
        self.received += 1;
    }

    /// Returns true if nothing arrived from this peer within `timeout`
    pub fn is_timed_out(&self, timeout: Duration) -> bool {
        self.last_seen.elapsed() > timeout
    }
}

/// Tracks every peer currently registered with the relay
///
/// Capacity is enforced at registration time. Peer ids start at 1 and are
/// never reused while the relay runs.
pub struct PeerManager {
    peers: HashMap<u32, Peer>,
    next_peer_id: u32,
    max_peers: usize,
    timeout: Duration,
}

impl PeerManager {
    pub fn new(max_peers: usize, timeout: Duration) -> Self {
        Self {
            peers: HashMap::new(),
            next_peer_id: 1,
            max_peers,
            timeout,
        }
    }

    /// Records a datagram from `addr`, registering the sender if needed
    ///
    /// Returns the peer id, or None when the sender is unknown and the relay
    /// is full.
    pub fn observe(&mut self, addr: SocketAddr) -> Option<u32> {
        if let Some(peer_id) = self.find_peer_by_addr(addr) {
            if let Some(peer) = self.peers.get_mut(&peer_id) {
                peer.touch();
            }
            return Some(peer_id);
        }
        let peer_id = self.add_peer(addr)?;
        if let Some(peer) = self.peers.get_mut(&peer_id) {
            peer.touch();
        }
        Some(peer_id)
    }

    /// Registers a new peer. Returns None when at capacity.
    pub fn add_peer(&mut self, addr: SocketAddr) -> Option<u32> {
        if self.peers.len() >= self.max_peers {
            return None;
        }

        let peer_id = self.next_peer_id;
        self.next_peer_id += 1;

        info!("Peer {} registered from {}", peer_id, addr);
        self.peers.insert(peer_id, Peer::new(peer_id, addr));

        Some(peer_id)
    }

    /// Returns true if the peer was registered
    pub fn remove_peer(&mut self, peer_id: u32) -> bool {
        if let Some(peer) = self.peers.remove(&peer_id) {
            info!("Peer {} at {} dropped", peer.id, peer.addr);
            true
        } else {
            false
        }
    }

    pub fn find_peer_by_addr(&self, addr: SocketAddr) -> Option<u32> {
        self.peers
            .iter()
            .find(|(_, peer)| peer.addr == addr)
            .map(|(id, _)| *id)
    }

    /// Removes peers that went silent and returns their ids
    pub fn check_timeouts(&mut self) -> Vec<u32> {
        let timed_out: Vec<u32> = self
            .peers
            .iter()
            .filter(|(_, peer)| peer.is_timed_out(self.timeout))
            .map(|(id, _)| *id)
            .collect();

        for peer_id in &timed_out {
            self.remove_peer(*peer_id);
        }

        timed_out
    }

    /// Addresses of every peer except `sender`
    pub fn forward_targets(&self, sender: u32) -> Vec<SocketAddr> {
        let mut targets: Vec<(u32, SocketAddr)> = self
            .peers
            .iter()
            .filter(|(id, _)| **id != sender)
            .map(|(id, peer)| (*id, peer.addr))
            .collect();
        targets.sort_by_key(|(id, _)| *id);
        targets.into_iter().map(|(_, addr)| addr).collect()
    }

    pub fn peer(&self, peer_id: u32) -> Option<&Peer> {
        self.peers.get(&peer_id)
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}
