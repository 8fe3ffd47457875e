//! Topology & host registry (`spec.md` §4.4): the cluster-wide
//! `Map<Address, Host>`, mutated only by the owning session.

pub mod host;
pub mod registry;

pub use host::{Host, HostDistance};
pub use registry::{HostRegistry, TopologyEvent};
