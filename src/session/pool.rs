//! Per-host connection pool: `connections_per_host` parallel
//! [`ConnectionHandle`]s, grounded on the teacher's `pool`/`pool::worker`
//! acquire-or-wait shape, simplified from its manual `Future::poll` state
//! machine to plain `async fn`s over the same handles our connection actor
//! already exposes (`SPEC_FULL.md` §4.3's divergence note applies here too).
use std::{
    net::SocketAddr,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

use parking_lot::RwLock;
use tokio::sync::mpsc;

use crate::{
    connection::{
        config::ClusterConfig,
        handle::{self, ConnectionHandle},
    },
    error::{Error, Result},
    protocol::{
        request::{QueryParams, Request},
        response::{Event, Response},
    },
    topology::HostRegistry,
};

/// All live connections to one coordinator.
pub(crate) struct HostPool {
    addr: SocketAddr,
    connections: RwLock<Vec<ConnectionHandle>>,
    cursor: AtomicUsize,
}

impl HostPool {
    pub(crate) fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub(crate) fn len(&self) -> usize {
        self.connections.read().len()
    }

    /// Dial `connections_per_host` connections to `host:port`, forwarding
    /// each connection's server-pushed events into `registry`.
    pub(crate) async fn connect(
        host: &str,
        port: u16,
        config: &ClusterConfig,
        registry: Arc<HostRegistry>,
    ) -> Result<Arc<HostPool>> {
        let mut connections = Vec::with_capacity(config.pool.connections_per_host);
        let mut addr = None;
        for _ in 0..config.pool.connections_per_host.max(1) {
            let (conn, events) = ConnectionHandle::connect(host, port, &config.pool).await?;
            handle::handshake(&conn, config.auth.as_ref(), config.connect_timeout).await?;
            handle::register_for_events(&conn, config.connect_timeout).await?;
            if let Some(keyspace) = &config.keyspace {
                use_keyspace(&conn, keyspace, config.connect_timeout).await?;
            }
            addr.get_or_insert(conn.addr());
            spawn_event_forwarder(conn.addr(), events, registry.clone());
            connections.push(conn);
        }

        Ok(Arc::new(HostPool {
            addr: addr.expect("at least one connection requested"),
            connections: RwLock::new(connections),
            cursor: AtomicUsize::new(0),
        }))
    }

    /// Snapshot of every connection currently open to this host, ordered
    /// starting from a rotating cursor so load spreads across them.
    pub(crate) fn snapshot(&self) -> Vec<ConnectionHandle> {
        let guard = self.connections.read();
        if guard.is_empty() {
            return Vec::new();
        }
        let start = self.cursor.fetch_add(1, Ordering::Relaxed) % guard.len();
        let mut rotated = guard.clone();
        rotated.rotate_left(start);
        rotated
    }

    pub(crate) async fn shutdown(&self) {
        let connections = self.connections.read().clone();
        for conn in connections {
            conn.shutdown().await;
        }
    }
}

/// Put a freshly handshaken connection into `keyspace` before it joins the
/// pool, so every connection a planner can pick carries the same USE state.
async fn use_keyspace(conn: &ConnectionHandle, keyspace: &str, timeout: std::time::Duration) -> Result<()> {
    let request = Request::Query {
        cql: format!("USE {keyspace}"),
        params: QueryParams::default(),
    };
    match conn.send(request, timeout).await? {
        Response::Result(_) => Ok(()),
        Response::Error(e) => Err(Error::from(e)),
        other => Err(Error::internal(format!("unexpected reply to USE {keyspace}: {other:?}"))),
    }
}

fn spawn_event_forwarder(
    addr: SocketAddr,
    mut events: mpsc::UnboundedReceiver<Event>,
    registry: Arc<HostRegistry>,
) {
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                Event::StatusChange { change_type, addr: reported } => {
                    let target = if reported.port() == 0 { addr } else { reported };
                    match change_type.as_str() {
                        "UP" => registry.mark_up(&target),
                        "DOWN" => registry.mark_down(&target),
                        _ => {}
                    }
                }
                Event::TopologyChange { change_type, addr: reported } => {
                    if change_type == "REMOVED_NODE" {
                        registry.remove(&reported);
                    }
                    // NEW_NODE/MOVED_NODE require a schema round-trip to learn
                    // datacenter/rack/tokens; left for the next topology
                    // refresh rather than guessed here.
                }
                Event::SchemaChange(_) => {
                    crate::common::trace!("schema change event, ignored");
                }
            }
        }
    });
}
