//! Load-balancing planner (`spec.md` §4.5): pluggable strategies that order
//! candidate coordinators for a request against the current topology
//! snapshot.
use std::{collections::HashSet, net::SocketAddr, sync::Arc};

use crate::topology::{Host, HostRegistry};

mod allow_list;
mod dc_aware;
mod default_policy;
pub mod murmur3;
mod round_robin;
mod token_aware;

pub use allow_list::AllowList;
pub use dc_aware::DcAware;
pub use default_policy::{DefaultPolicy, DefaultPolicyBuilder};
pub use round_robin::RoundRobin;
pub use token_aware::TokenAware;

/// An ordered, lazy sequence of candidate coordinators for one request.
pub type Plan = Box<dyn Iterator<Item = Arc<Host>> + Send>;

/// A pluggable host-ordering strategy (`spec.md` §4.5). Pure with respect to
/// a topology snapshot plus a small internal counter: repeated calls may
/// reorder via that counter (round-robin rotation) or a seeded PRNG
/// (replica shuffling), but never read external state.
pub trait LoadBalancingPolicy: Send + Sync + std::fmt::Debug {
    /// Build a plan for one request. `keyspace`/`routing_key` are present
    /// only for statements that carry a partition key (`spec.md` §4.5).
    fn new_plan(
        &self,
        registry: &HostRegistry,
        keyspace: Option<&str>,
        routing_key: Option<&[u8]>,
    ) -> Plan;
}

/// Replica set for a token, used by [`TokenAware`]. A real implementation
/// would consult the keyspace's replication strategy (simple or
/// network-topology) against the ring; this computes the simple-strategy
/// replica set (the N hosts whose token ranges follow the key's token on
/// the ring), which is the minimal topology a driver needs to route
/// intelligently without full schema metadata (`SPEC_FULL.md` §4.4's
/// Non-goal on schema sync).
pub(crate) fn replicas_for_token(registry: &HostRegistry, token: i64, replication_factor: usize) -> Vec<Arc<Host>> {
    let mut hosts: Vec<Arc<Host>> = registry.up_hosts();
    if hosts.is_empty() {
        return hosts;
    }
    hosts.sort_by_key(|h| ring_position(h));
    let start = hosts.partition_point(|h| ring_position(h) <= token);
    let mut replicas = Vec::with_capacity(replication_factor.min(hosts.len()));
    for i in 0..hosts.len() {
        if replicas.len() == replication_factor {
            break;
        }
        replicas.push(hosts[(start + i) % hosts.len()].clone());
    }
    replicas
}

fn ring_position(host: &Host) -> i64 {
    host.tokens
        .first()
        .and_then(|t| t.parse::<i64>().ok())
        .unwrap_or_else(|| murmur3::token(host.addr.to_string().as_bytes()))
}

/// Parse an `ip:port` allow-list entry.
pub(crate) fn parse_allow_entry(s: &str) -> Option<SocketAddr> {
    s.parse().ok()
}

pub(crate) fn as_set(entries: &[String]) -> HashSet<SocketAddr> {
    entries.iter().filter_map(|s| parse_allow_entry(s)).collect()
}
