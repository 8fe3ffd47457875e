//! Cluster-wide host map, mutated only by the owning session and read
//! freely by planners and connection pools (`spec.md` §4.4).
use std::{net::SocketAddr, sync::Arc};

use dashmap::DashMap;
use tokio::sync::broadcast;

use super::host::Host;

/// A topology change, broadcast to any subscriber watching the registry.
#[derive(Debug, Clone)]
pub enum TopologyEvent {
    HostAdd(SocketAddr),
    HostRemove(SocketAddr),
    HostUp(SocketAddr),
    HostDown(SocketAddr),
}

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// `Map<Address, Host>`, as `spec.md` §4.4 specifies. The session is the
/// single writer; planners and connections only ever read through shared
/// references obtained from here.
pub struct HostRegistry {
    hosts: DashMap<SocketAddr, Arc<Host>>,
    events: broadcast::Sender<TopologyEvent>,
}

impl Default for HostRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl HostRegistry {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { hosts: DashMap::new(), events }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TopologyEvent> {
        self.events.subscribe()
    }

    pub fn get(&self, addr: &SocketAddr) -> Option<Arc<Host>> {
        self.hosts.get(addr).map(|e| e.value().clone())
    }

    pub fn contains(&self, addr: &SocketAddr) -> bool {
        self.hosts.contains_key(addr)
    }

    /// All hosts currently considered up.
    pub fn up_hosts(&self) -> Vec<Arc<Host>> {
        self.hosts
            .iter()
            .map(|e| e.value().clone())
            .filter(|h| h.is_up() && !h.is_ignored())
            .collect()
    }

    pub fn all_hosts(&self) -> Vec<Arc<Host>> {
        self.hosts.iter().map(|e| e.value().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.hosts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }

    /// Insert a newly discovered host and emit `hostAdd`. If the host
    /// already exists the insert is ignored (the existing record's counters
    /// stay intact).
    pub fn add(&self, host: Host) -> Arc<Host> {
        let addr = host.addr;
        let arc = Arc::new(host);
        let inserted = match self.hosts.entry(addr) {
            dashmap::mapref::entry::Entry::Occupied(entry) => entry.get().clone(),
            dashmap::mapref::entry::Entry::Vacant(entry) => {
                entry.insert(arc.clone());
                let _ = self.events.send(TopologyEvent::HostAdd(addr));
                arc
            }
        };
        inserted
    }

    pub fn remove(&self, addr: &SocketAddr) {
        if self.hosts.remove(addr).is_some() {
            let _ = self.events.send(TopologyEvent::HostRemove(*addr));
        }
    }

    pub fn mark_up(&self, addr: &SocketAddr) {
        if let Some(host) = self.get(addr) {
            if !host.is_up() {
                host.mark_up();
                let _ = self.events.send(TopologyEvent::HostUp(*addr));
            }
        }
    }

    pub fn mark_down(&self, addr: &SocketAddr) {
        if let Some(host) = self.get(addr) {
            if host.is_up() {
                host.mark_down();
                let _ = self.events.send(TopologyEvent::HostDown(*addr));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_then_lookup() {
        let registry = HostRegistry::new();
        let addr: SocketAddr = "127.0.0.1:9042".parse().unwrap();
        registry.add(Host::new(addr, "dc1", "rack1"));
        assert!(registry.contains(&addr));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn up_hosts_excludes_down_and_ignored() {
        let registry = HostRegistry::new();
        let a: SocketAddr = "127.0.0.1:9042".parse().unwrap();
        let b: SocketAddr = "127.0.0.2:9042".parse().unwrap();
        registry.add(Host::new(a, "dc1", "rack1"));
        registry.add(Host::new(b, "dc1", "rack1"));
        registry.mark_up(&a);
        registry.mark_up(&b);
        registry.get(&b).unwrap().set_ignored(true);

        let up = registry.up_hosts();
        assert_eq!(up.len(), 1);
        assert_eq!(up[0].addr, a);
    }

    #[tokio::test]
    async fn mutation_emits_topology_events() {
        let registry = HostRegistry::new();
        let mut rx = registry.subscribe();
        let addr: SocketAddr = "127.0.0.1:9042".parse().unwrap();
        registry.add(Host::new(addr, "dc1", "rack1"));
        registry.mark_up(&addr);

        assert!(matches!(rx.recv().await.unwrap(), TopologyEvent::HostAdd(a) if a == addr));
        assert!(matches!(rx.recv().await.unwrap(), TopologyEvent::HostUp(a) if a == addr));
    }
}
