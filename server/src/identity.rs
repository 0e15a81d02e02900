//! Identity allocation for capture-point clients.
//!
//! Identities are stable, human-readable callsigns handed out from a
//! fixed pool. The usage set is tracked separately from node and
//! capture-point records so a reconnecting device can never collide
//! with a live identity, even across a server restart where the client
//! still remembers its name.

use std::collections::HashMap;

use log::info;
use rand::Rng;
use shared::CAPTURE_POINT_NAMES;

/// Tracks one in-use identity independent of its node/point records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AssignmentRecord {
    pub assigned_at: u64,
    pub last_seen: u64,
}

#[derive(Debug, Default)]
pub struct IdentityAllocator {
    used: HashMap<String, AssignmentRecord>,
}

impl IdentityAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hands out an unused identity: a uniform-random choice among the
    /// free pool entries, or an `<name>-<n>` overflow variant once the
    /// pool is exhausted. Never fails and never returns an identity
    /// currently in use.
    pub fn assign(&mut self, now_ms: u64) -> String {
        let mut rng = rand::thread_rng();

        let available: Vec<&str> = CAPTURE_POINT_NAMES
            .iter()
            .copied()
            .filter(|name| !self.used.contains_key(*name))
            .collect();

        let identity = if available.is_empty() {
            let base = CAPTURE_POINT_NAMES[rng.gen_range(0..CAPTURE_POINT_NAMES.len())];
            let mut n = self.used.len() / CAPTURE_POINT_NAMES.len() + 1;
            loop {
                let candidate = format!("{}-{}", base, n);
                if !self.used.contains_key(&candidate) {
                    break candidate;
                }
                n += 1;
            }
        } else {
            available[rng.gen_range(0..available.len())].to_string()
        };

        info!("Assigned identity {}", identity);
        self.used.insert(
            identity.clone(),
            AssignmentRecord {
                assigned_at: now_ms,
                last_seen: now_ms,
            },
        );
        identity
    }

    /// Records a client-supplied identity as in use (the reconnect
    /// path). Idempotent; an already-tracked identity just has its
    /// liveness refreshed.
    pub fn mark_used(&mut self, identity: &str, now_ms: u64) {
        self.used
            .entry(identity.to_string())
            .and_modify(|rec| rec.last_seen = now_ms)
            .or_insert(AssignmentRecord {
                assigned_at: now_ms,
                last_seen: now_ms,
            });
    }

    /// Refreshes the liveness timestamp of a tracked identity.
    pub fn touch(&mut self, identity: &str, now_ms: u64) {
        if let Some(rec) = self.used.get_mut(identity) {
            rec.last_seen = now_ms;
        }
    }

    /// Frees an identity. Releasing an unknown or already-free
    /// identity is a no-op.
    pub fn release(&mut self, identity: &str) {
        if self.used.remove(identity).is_some() {
            info!("Released identity {}", identity);
        }
    }

    pub fn in_use(&self, identity: &str) -> bool {
        self.used.contains_key(identity)
    }

    pub fn used_count(&self) -> usize {
        self.used.len()
    }

    /// Clears all usage tracking. Process start / test boundaries only.
    pub fn reset(&mut self) {
        self.used.clear();
    }
}
