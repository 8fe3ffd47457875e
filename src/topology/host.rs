//! [`Host`]: one coordinator's address and topology metadata (`spec.md` §3, §4.4).
use std::{
    net::SocketAddr,
    sync::atomic::{AtomicBool, AtomicI64, AtomicU32, Ordering},
    time::{SystemTime, UNIX_EPOCH},
};

/// How a [`crate::policy::LoadBalancingPolicy`] should treat a host relative
/// to the request's preferred datacenter (`SPEC_FULL.md` §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostDistance {
    Local,
    Remote,
    Ignored,
}

/// A coordinator node's address and topology metadata. Immutable except for
/// the status/counter fields, which are mutated under atomics; lifecycle
/// (insertion, removal) is owned exclusively by the [`super::registry::HostRegistry`]'s
/// caller, the session (`spec.md` §4.4).
#[derive(Debug)]
pub struct Host {
    pub addr: SocketAddr,
    pub datacenter: String,
    pub rack: String,
    pub tokens: Vec<String>,
    up_since_millis: AtomicI64,
    in_flight: AtomicU32,
    responses: AtomicU32,
    ignored: AtomicBool,
}

impl Host {
    pub fn new(addr: SocketAddr, datacenter: impl Into<String>, rack: impl Into<String>) -> Self {
        Self {
            addr,
            datacenter: datacenter.into(),
            rack: rack.into(),
            tokens: Vec::new(),
            up_since_millis: AtomicI64::new(0),
            in_flight: AtomicU32::new(0),
            responses: AtomicU32::new(0),
            ignored: AtomicBool::new(false),
        }
    }

    pub fn with_tokens(mut self, tokens: Vec<String>) -> Self {
        self.tokens = tokens;
        self
    }

    /// `None` when the host is currently considered down.
    pub fn up_since(&self) -> Option<i64> {
        match self.up_since_millis.load(Ordering::Relaxed) {
            0 => None,
            ms => Some(ms),
        }
    }

    pub fn is_up(&self) -> bool {
        self.up_since().is_some()
    }

    pub fn mark_up(&self) {
        let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as i64;
        self.up_since_millis.store(now.max(1), Ordering::Relaxed);
    }

    pub fn mark_down(&self) {
        self.up_since_millis.store(0, Ordering::Relaxed);
    }

    pub fn is_ignored(&self) -> bool {
        self.ignored.load(Ordering::Relaxed)
    }

    pub fn set_ignored(&self, ignored: bool) {
        self.ignored.store(ignored, Ordering::Relaxed);
    }

    pub fn in_flight(&self) -> u32 {
        self.in_flight.load(Ordering::Relaxed)
    }

    pub fn on_request_sent(&self) {
        self.in_flight.fetch_add(1, Ordering::Relaxed);
    }

    pub fn on_response(&self) {
        self.in_flight.fetch_sub(1, Ordering::Relaxed);
        self.responses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn response_count(&self) -> u32 {
        self.responses.load(Ordering::Relaxed)
    }
}

impl PartialEq for Host {
    fn eq(&self, other: &Self) -> bool {
        self.addr == other.addr
    }
}

impl Eq for Host {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_down_until_marked_up() {
        let host = Host::new("127.0.0.1:9042".parse().unwrap(), "dc1", "rack1");
        assert!(!host.is_up());
        host.mark_up();
        assert!(host.is_up());
        host.mark_down();
        assert!(!host.is_up());
    }

    #[test]
    fn in_flight_tracks_sent_and_completed_requests() {
        let host = Host::new("127.0.0.1:9042".parse().unwrap(), "dc1", "rack1");
        host.on_request_sent();
        host.on_request_sent();
        assert_eq!(host.in_flight(), 2);
        host.on_response();
        assert_eq!(host.in_flight(), 1);
        assert_eq!(host.response_count(), 1);
    }
}
