//! `RoundRobin`: all up hosts, starting from a rotating index (`spec.md` §4.5).
use std::sync::{atomic::{AtomicUsize, Ordering}, Arc};

use crate::topology::{Host, HostRegistry};

use super::{LoadBalancingPolicy, Plan};

#[derive(Debug, Default)]
pub struct RoundRobin {
    cursor: AtomicUsize,
}

impl RoundRobin {
    pub fn new() -> Self {
        Self { cursor: AtomicUsize::new(0) }
    }
}

impl LoadBalancingPolicy for RoundRobin {
    fn new_plan(&self, registry: &HostRegistry, _keyspace: Option<&str>, _routing_key: Option<&[u8]>) -> Plan {
        let hosts: Vec<Arc<Host>> = registry.up_hosts();
        if hosts.is_empty() {
            return Box::new(std::iter::empty());
        }
        let start = self.cursor.fetch_add(1, Ordering::Relaxed) % hosts.len();
        let rotated: Vec<Arc<Host>> = hosts.iter().cloned().cycle().skip(start).take(hosts.len()).collect();
        Box::new(rotated.into_iter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry_with(n: usize) -> HostRegistry {
        let r = HostRegistry::new();
        for i in 0..n {
            let addr = format!("127.0.0.{}:9042", i + 1).parse().unwrap();
            let host = Host::new(addr, "dc1", "rack1");
            host.mark_up();
            r.add(host);
        }
        r
    }

    #[test]
    fn visits_every_up_host_exactly_once() {
        let registry = registry_with(3);
        let policy = RoundRobin::new();
        let plan: Vec<_> = policy.new_plan(&registry, None, None).collect();
        assert_eq!(plan.len(), 3);
    }

    #[test]
    fn successive_plans_rotate_start_position() {
        let registry = registry_with(3);
        let policy = RoundRobin::new();
        let first: Vec<_> = policy.new_plan(&registry, None, None).map(|h| h.addr).collect();
        let second: Vec<_> = policy.new_plan(&registry, None, None).map(|h| h.addr).collect();
        assert_ne!(first[0], second[0]);
    }
}
