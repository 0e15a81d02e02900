//! Connected-peer registry and fan-out.
//!
//! Each WebSocket connection registers an outbound channel here and
//! gets a connection id back. Sends go through the channel so fan-out
//! never blocks on a slow socket; a peer whose channel is closed is
//! dropped from the registry and the broadcast continues with the
//! rest.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use log::{debug, info, warn};
use shared::{Role, ServerMessage};
use tokio::sync::mpsc;

use crate::utils;

/// Which peers a broadcast reaches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Audience {
    All,
    AdminOnly,
    CapturePoints,
}

/// One live WebSocket connection. Role and identity stay `None` until
/// the peer registers.
#[derive(Debug)]
pub struct PeerSession {
    pub role: Option<Role>,
    pub identity: Option<String>,
    pub last_seen: u64,
    sender: mpsc::UnboundedSender<String>,
}

#[derive(Debug, Default)]
struct Registry {
    peers: HashMap<u64, PeerSession>,
    /// Peers evicted by a failed send or an admin takeover. Their
    /// socket loops are still running and must find the session when
    /// they call [`Broadcaster::remove`], or disconnect handling
    /// (node offline, identity release) would be skipped.
    defunct: HashMap<u64, PeerSession>,
    next_conn_id: u64,
    admin_conn: Option<u64>,
}

impl Registry {
    fn prune(&mut self, conn_id: u64) {
        if let Some(peer) = self.peers.remove(&conn_id) {
            self.defunct.insert(conn_id, peer);
        }
    }
}

/// Shared handle to the peer registry. Locking is short and sync; no
/// await happens under the lock.
#[derive(Debug, Clone, Default)]
pub struct Broadcaster {
    registry: Arc<Mutex<Registry>>,
}

impl Broadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an unidentified peer and returns its connection id.
    pub fn register(&self, sender: mpsc::UnboundedSender<String>) -> u64 {
        let mut reg = self.lock();
        reg.next_conn_id += 1;
        let conn_id = reg.next_conn_id;
        reg.peers.insert(
            conn_id,
            PeerSession {
                role: None,
                identity: None,
                last_seen: utils::now_ms(),
                sender,
            },
        );
        debug!("Peer {} connected ({} total)", conn_id, reg.peers.len());
        conn_id
    }

    /// Attaches role and identity to a registered peer. Only one admin
    /// session is allowed at a time: registering a new admin evicts
    /// the previous admin connection.
    pub fn identify(&self, conn_id: u64, role: Role, identity: &str, now_ms: u64) {
        let mut reg = self.lock();

        if role == Role::Admin {
            if let Some(old) = reg.admin_conn.take() {
                if old != conn_id && reg.peers.contains_key(&old) {
                    info!("Admin session {} replaced by {}", old, conn_id);
                    reg.prune(old);
                }
            }
            reg.admin_conn = Some(conn_id);
        }

        if let Some(peer) = reg.peers.get_mut(&conn_id) {
            peer.role = Some(role);
            peer.identity = Some(identity.to_string());
            peer.last_seen = now_ms;
        }
    }

    pub fn touch(&self, conn_id: u64, now_ms: u64) {
        if let Some(peer) = self.lock().peers.get_mut(&conn_id) {
            peer.last_seen = now_ms;
        }
    }

    /// Removes a peer and returns its session for disconnect handling.
    /// Also answers for peers already pruned by a failed send, so the
    /// socket loop always gets the session back exactly once.
    pub fn remove(&self, conn_id: u64) -> Option<PeerSession> {
        let mut reg = self.lock();
        if reg.admin_conn == Some(conn_id) {
            reg.admin_conn = None;
        }
        let session = reg
            .peers
            .remove(&conn_id)
            .or_else(|| reg.defunct.remove(&conn_id));
        if session.is_some() {
            debug!("Peer {} removed ({} total)", conn_id, reg.peers.len());
        }
        session
    }

    pub fn is_admin_conn(&self, conn_id: u64) -> bool {
        self.lock().admin_conn == Some(conn_id)
    }

    pub fn identity_of(&self, conn_id: u64) -> Option<String> {
        self.lock()
            .peers
            .get(&conn_id)
            .and_then(|peer| peer.identity.clone())
    }

    /// Sends one message to one peer. A closed channel drops the peer.
    pub fn send_to(&self, conn_id: u64, message: &ServerMessage) {
        let frame = match message.to_frame(utils::now_ms()) {
            Ok(frame) => frame,
            Err(e) => {
                warn!("Failed to encode message: {}", e);
                return;
            }
        };

        let mut reg = self.lock();
        let failed = match reg.peers.get(&conn_id) {
            Some(peer) => peer.sender.send(frame).is_err(),
            None => false,
        };
        if failed {
            reg.prune(conn_id);
            warn!("Dropped unreachable peer {}", conn_id);
        }
    }

    /// Fans a message out to every peer in the audience, skipping
    /// `exclude`. Unreachable peers are dropped; the rest still get
    /// the message.
    pub fn broadcast(&self, message: &ServerMessage, audience: Audience, exclude: Option<u64>) {
        let frame = match message.to_frame(utils::now_ms()) {
            Ok(frame) => frame,
            Err(e) => {
                warn!("Failed to encode broadcast: {}", e);
                return;
            }
        };

        let mut reg = self.lock();
        let mut dead = Vec::new();

        for (&conn_id, peer) in &reg.peers {
            if Some(conn_id) == exclude {
                continue;
            }
            let included = match audience {
                Audience::All => true,
                Audience::AdminOnly => peer.role == Some(Role::Admin),
                Audience::CapturePoints => peer.role == Some(Role::CapturePoint),
            };
            if included && peer.sender.send(frame.clone()).is_err() {
                dead.push(conn_id);
            }
        }

        for conn_id in dead {
            reg.prune(conn_id);
            warn!("Dropped unreachable peer {}", conn_id);
        }
    }

    pub fn peer_count(&self) -> usize {
        self.lock().peers.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Registry> {
        // A poisoned registry lock means a panic mid-send; recovering
        // the guard keeps the remaining peers served.
        self.registry
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
