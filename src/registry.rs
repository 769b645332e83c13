//! src/registry.rs
//!
//! The Collector's two pieces of per-connection state: `AgentRegistry` and
//! `ClientRegistry`. Both are plain maps keyed by `PeerId`, mutated only by
//! the owning actor's event loop — no locks, because there is exactly one
//! owner.
//!
//! Sweeps never mutate a map while iterating over it: every `sweep` method
//! first collects removal candidates into a local `Vec`, then applies them
//! after the iteration completes. This is a correctness invariant, not an
//! optimization.

use crate::codec::Message;
use crate::transport::PeerId;
use std::collections::HashMap;
use tokio::time::Instant;

/// Tracks connected agents: who is live, which hostname maps to which live
/// peer, and the last-known "model" (slow-changing attributes) frame per
/// hostname.
#[derive(Debug, Default)]
pub struct AgentRegistry {
    identities: HashMap<PeerId, Instant>,
    hostname_to_peer: HashMap<String, PeerId>,
    model_cache: HashMap<String, Message>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that we just heard from `peer` (liveness touch, unconditional,
    /// before any variant dispatch).
    pub fn touch(&mut self, peer: PeerId, now: Instant) {
        self.identities.insert(peer, now);
    }

    pub fn is_known(&self, peer: PeerId) -> bool {
        self.identities.contains_key(&peer)
    }

    pub fn has_model(&self, hostname: &str) -> bool {
        self.model_cache.contains_key(hostname)
    }

    pub fn cache_model(&mut self, hostname: &str, frame: Message) {
        self.model_cache.insert(hostname.to_string(), frame);
    }

    pub fn model_cache(&self) -> &HashMap<String, Message> {
        &self.model_cache
    }

    /// Silent-reconnect reconciliation: if `hostname` was already mapped to
    /// a different peer, evict that old peer's identity and return it so
    /// the caller can log/account for it. Idempotent if `peer` is already
    /// the mapped peer.
    pub fn reconcile_hostname(&mut self, hostname: &str, peer: PeerId) -> Option<PeerId> {
        let evicted = match self.hostname_to_peer.get(hostname) {
            Some(existing) if *existing != peer => {
                let old = *existing;
                self.identities.remove(&old);
                Some(old)
            }
            _ => None,
        };
        self.hostname_to_peer.insert(hostname.to_string(), peer);
        evicted
    }

    /// Liveness sweep: peers silent for longer than `stale_window` are
    /// returned for removal (their state is dropped here, atomically with
    /// eviction); everyone else is returned to be pinged. Collect-then-remove:
    /// the removal loop runs only after the whole scan completes.
    pub fn sweep(&mut self, now: Instant, stale_window: std::time::Duration) -> SweepResult {
        let mut to_ping = Vec::new();
        let mut to_remove = Vec::new();
        for (&peer, &last_recv) in self.identities.iter() {
            if now.duration_since(last_recv) > stale_window {
                to_remove.push(peer);
            } else {
                to_ping.push(peer);
            }
        }

        for peer in &to_remove {
            self.identities.remove(peer);
            if let Some(hostname) = self.hostname_for(*peer) {
                self.hostname_to_peer.remove(&hostname);
                self.model_cache.remove(&hostname);
            }
        }

        SweepResult { to_ping, removed: to_remove }
    }

    fn hostname_for(&self, peer: PeerId) -> Option<String> {
        self.hostname_to_peer
            .iter()
            .find(|(_, &p)| p == peer)
            .map(|(h, _)| h.clone())
    }

    #[cfg(test)]
    pub fn peer_for_hostname(&self, hostname: &str) -> Option<PeerId> {
        self.hostname_to_peer.get(hostname).copied()
    }
}

pub struct SweepResult {
    pub to_ping: Vec<PeerId>,
    pub removed: Vec<PeerId>,
}

/// Tracks connected clients: who is live, and when we last sent each one a
/// frame (for the idle-ping window).
#[derive(Debug, Default)]
pub struct ClientRegistry {
    identities: HashMap<PeerId, Instant>,
    last_send: HashMap<PeerId, Instant>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn touch(&mut self, peer: PeerId, now: Instant) {
        self.identities.insert(peer, now);
    }

    pub fn record_send(&mut self, peer: PeerId, now: Instant) {
        self.last_send.insert(peer, now);
    }

    pub fn peers(&self) -> impl Iterator<Item = PeerId> + '_ {
        self.identities.keys().copied()
    }

    /// Liveness sweep: clients silent for longer than `stale_window` are
    /// removed from both maps; everyone else is pinged if they haven't been
    /// sent anything in `ping_idle_window`.
    pub fn sweep(
        &mut self,
        now: Instant,
        stale_window: std::time::Duration,
        ping_idle_window: std::time::Duration,
    ) -> SweepResult {
        let mut to_ping = Vec::new();
        let mut to_remove = Vec::new();
        for (&peer, &last_recv) in self.identities.iter() {
            if now.duration_since(last_recv) > stale_window {
                to_remove.push(peer);
                continue;
            }
            let idle = match self.last_send.get(&peer) {
                Some(&last_sent) => now.duration_since(last_sent) > ping_idle_window,
                None => true,
            };
            if idle {
                to_ping.push(peer);
            }
        }

        for peer in &to_remove {
            self.identities.remove(peer);
            self.last_send.remove(peer);
        }

        SweepResult { to_ping, removed: to_remove }
    }
}
