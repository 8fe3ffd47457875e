//! The composable `Default` load-balancing policy (`spec.md` §4.5): the
//! single configuration surface most sessions use, combining rack/DC
//! preference, token-awareness, and an optional allow-list into the literal
//! ordering rule spec.md spells out.
use std::{
    collections::HashSet,
    net::SocketAddr,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};

use crate::topology::{Host, HostRegistry};

use super::{murmur3, replicas_for_token, LoadBalancingPolicy, Plan};

const FIXED_SHUFFLE_SEED: u64 = 0x5EED_CA55;

/// Builder for [`DefaultPolicy`], mirroring `spec.md` §4.5's named options.
#[derive(Debug, Default)]
pub struct DefaultPolicyBuilder {
    preferred_datacenter: Option<String>,
    preferred_rack: Option<String>,
    token_aware: bool,
    permit_dc_failover: bool,
    enable_shuffling_replicas: bool,
    allow_list: Option<HashSet<SocketAddr>>,
    replication_factor: usize,
}

impl DefaultPolicyBuilder {
    pub fn new() -> Self {
        Self {
            token_aware: true,
            permit_dc_failover: false,
            enable_shuffling_replicas: true,
            replication_factor: 3,
            ..Default::default()
        }
    }

    pub fn preferred_datacenter(mut self, dc: impl Into<String>) -> Self {
        self.preferred_datacenter = Some(dc.into());
        self
    }

    pub fn preferred_rack(mut self, rack: impl Into<String>) -> Self {
        self.preferred_rack = Some(rack.into());
        self
    }

    pub fn token_aware(mut self, enabled: bool) -> Self {
        self.token_aware = enabled;
        self
    }

    pub fn permit_dc_failover(mut self, enabled: bool) -> Self {
        self.permit_dc_failover = enabled;
        self
    }

    pub fn enable_shuffling_replicas(mut self, enabled: bool) -> Self {
        self.enable_shuffling_replicas = enabled;
        self
    }

    pub fn allow_list(mut self, entries: impl IntoIterator<Item = SocketAddr>) -> Self {
        self.allow_list = Some(entries.into_iter().collect());
        self
    }

    pub fn replication_factor(mut self, rf: usize) -> Self {
        self.replication_factor = rf.max(1);
        self
    }

    pub fn build(self) -> DefaultPolicy {
        DefaultPolicy {
            preferred_datacenter: self.preferred_datacenter,
            preferred_rack: self.preferred_rack,
            token_aware: self.token_aware,
            permit_dc_failover: self.permit_dc_failover,
            enable_shuffling_replicas: self.enable_shuffling_replicas,
            allow_list: self.allow_list,
            replication_factor: self.replication_factor.max(1),
            cursor: AtomicUsize::new(0),
        }
    }
}

#[derive(Debug)]
pub struct DefaultPolicy {
    preferred_datacenter: Option<String>,
    preferred_rack: Option<String>,
    token_aware: bool,
    permit_dc_failover: bool,
    enable_shuffling_replicas: bool,
    allow_list: Option<HashSet<SocketAddr>>,
    replication_factor: usize,
    cursor: AtomicUsize,
}

impl DefaultPolicy {
    pub fn builder() -> DefaultPolicyBuilder {
        DefaultPolicyBuilder::new()
    }

    fn rotated(&self, mut hosts: Vec<Arc<Host>>) -> Vec<Arc<Host>> {
        if hosts.is_empty() {
            return hosts;
        }
        let start = self.cursor.fetch_add(1, Ordering::Relaxed) % hosts.len();
        hosts.rotate_left(start);
        hosts
    }

    fn shuffled(&self, mut hosts: Vec<Arc<Host>>) -> Vec<Arc<Host>> {
        if self.enable_shuffling_replicas {
            hosts.shuffle(&mut rand::thread_rng());
        } else {
            let mut rng = StdRng::seed_from_u64(FIXED_SHUFFLE_SEED);
            hosts.shuffle(&mut rng);
        }
        hosts
    }
}

impl LoadBalancingPolicy for DefaultPolicy {
    fn new_plan(&self, registry: &HostRegistry, keyspace: Option<&str>, routing_key: Option<&[u8]>) -> Plan {
        let up = registry.up_hosts();

        let replicas: Vec<Arc<Host>> = if self.token_aware {
            match (keyspace, routing_key) {
                (Some(_), Some(key)) => {
                    let token = murmur3::token(key);
                    replicas_for_token(registry, token, self.replication_factor)
                }
                _ => Vec::new(),
            }
        } else {
            Vec::new()
        };
        let replica_addrs: HashSet<SocketAddr> = replicas.iter().map(|h| h.addr).collect();

        let local_dc = self.preferred_datacenter.as_deref();
        let (local, remote): (Vec<Arc<Host>>, Vec<Arc<Host>>) = match local_dc {
            Some(dc) => up.into_iter().partition(|h| h.datacenter == dc),
            None => (up, Vec::new()),
        };

        let (local_replicas, local_others): (Vec<Arc<Host>>, Vec<Arc<Host>>) =
            local.into_iter().partition(|h| replica_addrs.contains(&h.addr));

        let (rack_replicas, dc_replicas): (Vec<Arc<Host>>, Vec<Arc<Host>>) = match &self.preferred_rack {
            Some(rack) if local_dc.is_some() => {
                local_replicas.into_iter().partition(|h| &h.rack == rack)
            }
            _ => (Vec::new(), local_replicas),
        };

        let mut ordered = self.shuffled(rack_replicas);
        ordered.extend(self.shuffled(dc_replicas));
        ordered.extend(self.rotated(local_others));

        if self.permit_dc_failover {
            let (remote_replicas, remote_others): (Vec<Arc<Host>>, Vec<Arc<Host>>) =
                remote.into_iter().partition(|h| replica_addrs.contains(&h.addr));
            ordered.extend(self.shuffled(remote_replicas));
            ordered.extend(self.rotated(remote_others));
        }

        if let Some(allow) = &self.allow_list {
            ordered.retain(|h| allow.contains(&h.addr));
        }

        Box::new(ordered.into_iter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn host(addr: &str, dc: &str, rack: &str, tokens: Vec<&str>) -> Host {
        let h = Host::new(addr.parse().unwrap(), dc, rack)
            .with_tokens(tokens.into_iter().map(str::to_string).collect());
        h.mark_up();
        h
    }

    #[test]
    fn orders_local_rack_replicas_before_other_local_dc_hosts() {
        let registry = HostRegistry::new();
        registry.add(host("127.0.0.1:9042", "dc1", "rack1", vec!["0"]));
        registry.add(host("127.0.0.2:9042", "dc1", "rack2", vec!["1000"]));
        registry.add(host("127.0.0.3:9042", "dc2", "rack1", vec!["2000"]));

        let policy = DefaultPolicy::builder()
            .preferred_datacenter("dc1")
            .preferred_rack("rack1")
            .permit_dc_failover(false)
            .replication_factor(3)
            .build();

        let plan: Vec<_> = policy.new_plan(&registry, None, None).collect();
        assert_eq!(plan.len(), 2, "remote dc excluded without failover");
        assert!(plan.iter().all(|h| h.datacenter == "dc1"));
    }

    #[test]
    fn remote_dc_only_appears_with_failover_enabled() {
        let registry = HostRegistry::new();
        registry.add(host("127.0.0.1:9042", "dc1", "rack1", vec!["0"]));
        registry.add(host("127.0.0.2:9042", "dc2", "rack1", vec!["1000"]));

        let without_failover = DefaultPolicy::builder().preferred_datacenter("dc1").build();
        let plan: Vec<_> = without_failover.new_plan(&registry, None, None).collect();
        assert_eq!(plan.len(), 1);

        let with_failover = DefaultPolicy::builder()
            .preferred_datacenter("dc1")
            .permit_dc_failover(true)
            .build();
        let plan: Vec<_> = with_failover.new_plan(&registry, None, None).collect();
        assert_eq!(plan.len(), 2);
    }

    #[test]
    fn allow_list_filters_final_plan() {
        let registry = HostRegistry::new();
        registry.add(host("127.0.0.1:9042", "dc1", "rack1", vec!["0"]));
        registry.add(host("127.0.0.2:9042", "dc1", "rack1", vec!["1000"]));

        let allowed: SocketAddr = "127.0.0.1:9042".parse().unwrap();
        let policy = DefaultPolicy::builder().allow_list([allowed]).build();
        let plan: Vec<_> = policy.new_plan(&registry, None, None).collect();
        assert_eq!(plan.len(), 1);
        assert_eq!(plan[0].addr, allowed);
    }
}
