//! `AllowList(child, set)` (`spec.md` §4.5): filters `child`'s plan to hosts
//! whose `ip:port` appears in an explicit allow-list.
use std::{collections::HashSet, net::SocketAddr};

use crate::topology::HostRegistry;

use super::{LoadBalancingPolicy, Plan};

#[derive(Debug)]
pub struct AllowList<P> {
    child: P,
    allowed: HashSet<SocketAddr>,
}

impl<P: LoadBalancingPolicy> AllowList<P> {
    pub fn new(child: P, allowed: impl IntoIterator<Item = SocketAddr>) -> Self {
        Self { child, allowed: allowed.into_iter().collect() }
    }
}

impl<P: LoadBalancingPolicy> LoadBalancingPolicy for AllowList<P> {
    fn new_plan(&self, registry: &HostRegistry, keyspace: Option<&str>, routing_key: Option<&[u8]>) -> Plan {
        let allowed = self.allowed.clone();
        Box::new(
            self.child
                .new_plan(registry, keyspace, routing_key)
                .filter(move |h| allowed.contains(&h.addr)),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{policy::RoundRobin, topology::Host};

    #[test]
    fn filters_hosts_outside_the_allow_list() {
        let registry = HostRegistry::new();
        let a: SocketAddr = "127.0.0.1:9042".parse().unwrap();
        let b: SocketAddr = "127.0.0.2:9042".parse().unwrap();
        for addr in [a, b] {
            let host = Host::new(addr, "dc1", "rack1");
            host.mark_up();
            registry.add(host);
        }
        let policy = AllowList::new(RoundRobin::new(), [a]);
        let plan: Vec<_> = policy.new_plan(&registry, None, None).collect();
        assert_eq!(plan.len(), 1);
        assert_eq!(plan[0].addr, a);
    }
}
