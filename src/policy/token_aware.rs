//! `TokenAware(child)` (`spec.md` §4.5): routes to the replica set for the
//! statement's partition key first, then delegates to `child`.
use std::{collections::HashSet, sync::Arc};

use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};

use crate::topology::{Host, HostRegistry};

use super::{murmur3, replicas_for_token, LoadBalancingPolicy, Plan};

/// Fixed seed used to shuffle replicas deterministically when
/// `shuffle_replicas` is disabled (`spec.md` §4.5).
const FIXED_SHUFFLE_SEED: u64 = 0x5EED_CA55;

#[derive(Debug)]
pub struct TokenAware<P> {
    child: P,
    replication_factor: usize,
    shuffle_replicas: bool,
}

impl<P: LoadBalancingPolicy> TokenAware<P> {
    pub fn new(child: P, replication_factor: usize, shuffle_replicas: bool) -> Self {
        Self { child, replication_factor, shuffle_replicas }
    }
}

impl<P: LoadBalancingPolicy> LoadBalancingPolicy for TokenAware<P> {
    fn new_plan(&self, registry: &HostRegistry, keyspace: Option<&str>, routing_key: Option<&[u8]>) -> Plan {
        let Some(routing_key) = routing_key.filter(|_| keyspace.is_some()) else {
            return self.child.new_plan(registry, keyspace, routing_key);
        };

        let token = murmur3::token(routing_key);
        let mut replicas = replicas_for_token(registry, token, self.replication_factor.max(1));

        if self.shuffle_replicas {
            replicas.shuffle(&mut rand::thread_rng());
        } else {
            let mut rng = StdRng::seed_from_u64(FIXED_SHUFFLE_SEED);
            replicas.shuffle(&mut rng);
        }

        let seen: HashSet<_> = replicas.iter().map(|h| h.addr).collect();
        let rest = self
            .child
            .new_plan(registry, keyspace, Some(routing_key))
            .filter(move |h| !seen.contains(&h.addr));

        let chained: Vec<Arc<Host>> = replicas.into_iter().chain(rest).collect();
        Box::new(chained.into_iter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::RoundRobin;

    fn registry_with_tokens(n: usize) -> HostRegistry {
        let r = HostRegistry::new();
        for i in 0..n {
            let addr = format!("127.0.0.{}:9042", i + 1).parse().unwrap();
            let host = Host::new(addr, "dc1", "rack1").with_tokens(vec![(i as i64 * 1000).to_string()]);
            host.mark_up();
            r.add(host);
        }
        r
    }

    #[test]
    fn falls_back_to_child_without_routing_key() {
        let registry = registry_with_tokens(3);
        let policy = TokenAware::new(RoundRobin::new(), 2, true);
        let plan: Vec<_> = policy.new_plan(&registry, None, None).collect();
        assert_eq!(plan.len(), 3);
    }

    #[test]
    fn replicas_lead_the_plan_and_full_plan_covers_all_hosts() {
        let registry = registry_with_tokens(4);
        let policy = TokenAware::new(RoundRobin::new(), 2, true);
        let plan: Vec<_> = policy.new_plan(&registry, Some("ks"), Some(b"key")).collect();
        assert_eq!(plan.len(), 4);
        let addrs: HashSet<_> = plan.iter().map(|h| h.addr).collect();
        assert_eq!(addrs.len(), 4);
    }

    #[test]
    fn fixed_seed_shuffle_is_deterministic_across_calls() {
        let registry = registry_with_tokens(5);
        let policy = TokenAware::new(RoundRobin::new(), 3, false);
        let first: Vec<_> = policy.new_plan(&registry, Some("ks"), Some(b"key")).map(|h| h.addr).take(3).collect();
        let second: Vec<_> = policy.new_plan(&registry, Some("ks"), Some(b"key")).map(|h| h.addr).take(3).collect();
        assert_eq!(first, second);
    }
}
