//! The resolution cache contract the probe relies on, plus an in-memory cache.
//!
//! The probe never keeps a reference to an entry between events: every
//! operation goes through [`ArpProtocol::with_cache`] and looks the entry up
//! again, so an entry evicted between two sends is simply recreated.
use pnet::util::MacAddr;
use std::{collections::HashMap, net::Ipv4Addr};

use crate::error::Result;

/// One neighbor record.
pub trait CacheEntry {
    /// Move to the awaiting-reply state, queueing `payload` (replaces any
    /// payload already queued).
    fn mark_wait_reply(&mut self, payload: Vec<u8>);
    fn is_wait_reply(&self) -> bool;
    /// Record the resolved link-layer address.
    fn mark_alive(&mut self, mac: MacAddr);
    fn dequeue_pending(&mut self) -> Option<Vec<u8>>;
}

/// A resolution cache bound to one device.
pub trait ResolutionCache {
    type Entry: CacheEntry;

    fn lookup(&mut self, ip: Ipv4Addr) -> Option<&mut Self::Entry>;
    fn add(&mut self, ip: Ipv4Addr) -> &mut Self::Entry;
}

/// The ARP layer of a host: owns one cache per device and sends requests.
pub trait ArpProtocol: Send + Sync {
    type Cache: ResolutionCache;

    /// Run `f` against the cache of `device`, `None` if the device has no cache.
    fn with_cache<R>(&self, device: &str, f: impl FnOnce(&mut Self::Cache) -> R) -> Option<R>;

    /// Broadcast a request for `target` on `device`.
    fn send_request(&self, device: &str, target: Ipv4Addr) -> Result<()>;
}

#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Default)]
pub enum EntryState {
    #[default]
    Empty,
    WaitReply,
    Alive,
}

#[derive(Clone, Debug, Default)]
pub struct NeighborEntry {
    state: EntryState,
    mac: Option<MacAddr>,
    pending: Option<Vec<u8>>,
}

impl NeighborEntry {
    pub fn state(&self) -> EntryState {
        self.state
    }

    pub fn mac(&self) -> Option<MacAddr> {
        self.mac
    }

    pub fn pending(&self) -> Option<&[u8]> {
        self.pending.as_deref()
    }
}

impl CacheEntry for NeighborEntry {
    fn mark_wait_reply(&mut self, payload: Vec<u8>) {
        self.state = EntryState::WaitReply;
        self.pending = Some(payload);
    }

    fn is_wait_reply(&self) -> bool {
        self.state == EntryState::WaitReply
    }

    fn mark_alive(&mut self, mac: MacAddr) {
        self.state = EntryState::Alive;
        self.mac = Some(mac);
    }

    fn dequeue_pending(&mut self) -> Option<Vec<u8>> {
        self.pending.take()
    }
}

#[derive(Clone, Debug, Default)]
pub struct NeighborCache {
    entries: HashMap<Ipv4Addr, NeighborEntry>,
}

impl NeighborCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, ip: &Ipv4Addr) -> Option<&NeighborEntry> {
        self.entries.get(ip)
    }

    pub fn remove(&mut self, ip: &Ipv4Addr) -> Option<NeighborEntry> {
        self.entries.remove(ip)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl ResolutionCache for NeighborCache {
    type Entry = NeighborEntry;

    fn lookup(&mut self, ip: Ipv4Addr) -> Option<&mut NeighborEntry> {
        self.entries.get_mut(&ip)
    }

    fn add(&mut self, ip: Ipv4Addr) -> &mut NeighborEntry {
        self.entries.entry(ip).or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TARGET: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 2);

    #[test]
    fn test_entry_transitions() {
        let mut cache = NeighborCache::new();
        assert!(cache.lookup(TARGET).is_none());

        let entry = cache.add(TARGET);
        assert_eq!(entry.state(), EntryState::Empty);
        entry.mark_wait_reply(vec![1]);
        entry.mark_wait_reply(vec![2]);
        assert!(entry.is_wait_reply());

        let entry = cache.lookup(TARGET).unwrap();
        entry.mark_alive(MacAddr::new(2, 0, 0, 0, 0, 2));
        assert!(!entry.is_wait_reply());
        // Only the most recent payload is kept, and only once.
        assert_eq!(entry.dequeue_pending(), Some(vec![2]));
        assert_eq!(entry.dequeue_pending(), None);

        let entry = cache.get(&TARGET).unwrap();
        assert_eq!(entry.state(), EntryState::Alive);
        assert_eq!(entry.mac(), Some(MacAddr::new(2, 0, 0, 0, 0, 2)));
    }

    #[test]
    fn test_add_keeps_existing_entry() {
        let mut cache = NeighborCache::new();
        cache.add(TARGET).mark_wait_reply(vec![1]);
        assert!(cache.add(TARGET).is_wait_reply());
        assert_eq!(cache.len(), 1);
        assert!(cache.remove(&TARGET).is_some());
        assert!(cache.is_empty());
    }
}
