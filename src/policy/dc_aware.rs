//! `DCAware(preferredDc, permitFailover)` (`spec.md` §4.5): local-DC hosts
//! first in round-robin order; remote-DC hosts only if failover is permitted.
use std::sync::{atomic::{AtomicUsize, Ordering}, Arc};

use crate::topology::{Host, HostRegistry};

use super::{LoadBalancingPolicy, Plan};

#[derive(Debug)]
pub struct DcAware {
    preferred_dc: String,
    permit_failover: bool,
    cursor: AtomicUsize,
}

impl DcAware {
    pub fn new(preferred_dc: impl Into<String>, permit_failover: bool) -> Self {
        Self { preferred_dc: preferred_dc.into(), permit_failover, cursor: AtomicUsize::new(0) }
    }

    fn rotated(&self, mut hosts: Vec<Arc<Host>>) -> Vec<Arc<Host>> {
        if hosts.is_empty() {
            return hosts;
        }
        let start = self.cursor.fetch_add(1, Ordering::Relaxed) % hosts.len();
        hosts.rotate_left(start);
        hosts
    }
}

impl LoadBalancingPolicy for DcAware {
    fn new_plan(&self, registry: &HostRegistry, _keyspace: Option<&str>, _routing_key: Option<&[u8]>) -> Plan {
        let up = registry.up_hosts();
        let (local, remote): (Vec<Arc<Host>>, Vec<Arc<Host>>) =
            up.into_iter().partition(|h| h.datacenter == self.preferred_dc);

        let mut ordered = self.rotated(local);
        if self.permit_failover {
            ordered.extend(self.rotated(remote));
        }
        Box::new(ordered.into_iter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn host(addr: &str, dc: &str) -> Host {
        let h = Host::new(addr.parse().unwrap(), dc, "rack1");
        h.mark_up();
        h
    }

    #[test]
    fn prefers_local_dc_and_excludes_remote_without_failover() {
        let registry = HostRegistry::new();
        registry.add(host("127.0.0.1:9042", "dc1"));
        registry.add(host("127.0.0.2:9042", "dc2"));
        let policy = DcAware::new("dc1", false);
        let plan: Vec<_> = policy.new_plan(&registry, None, None).collect();
        assert_eq!(plan.len(), 1);
        assert_eq!(plan[0].datacenter, "dc1");
    }

    #[test]
    fn includes_remote_dc_after_local_when_failover_permitted() {
        let registry = HostRegistry::new();
        registry.add(host("127.0.0.1:9042", "dc1"));
        registry.add(host("127.0.0.2:9042", "dc2"));
        let policy = DcAware::new("dc1", true);
        let plan: Vec<_> = policy.new_plan(&registry, None, None).collect();
        assert_eq!(plan.len(), 2);
        assert_eq!(plan[0].datacenter, "dc1");
        assert_eq!(plan[1].datacenter, "dc2");
    }
}
