//! [`Session`] (`spec.md` §4.6): the public surface of the driver. Owns
//! cluster topology, a pool of coordinator connections, and the
//! prepared-statement cache; `prepare`/`execute`/`batch` are plain `async
//! fn`s built on top of the pieces the rest of the crate assembles.
use std::{
    collections::HashMap,
    net::SocketAddr,
    sync::{
        atomic::{AtomicU8, Ordering},
        Arc,
    },
};

use parking_lot::RwLock;

use crate::{
    connection::{config::ClusterConfig, handle::ConnectionHandle},
    error::{Error, ErrorKind, Result},
    policy::{DefaultPolicy, LoadBalancingPolicy},
    prepared_cache::PreparedCache,
    protocol::response::ResultBody,
    retry::{AttemptError, DefaultRetryPolicy, NoHostAvailable, RetryPolicy},
    statement::PreparedStatement,
    topology::HostRegistry,
};

mod discovery;
mod execute;
mod pool;
mod timestamp;

pub use execute::{AutoPageStream, ConcurrentOutcome, ExecuteOptions};

use pool::HostPool;
use timestamp::TimestampGenerator;

const CREATED: u8 = 0;
const CONNECTING: u8 = 1;
const CONNECTED: u8 = 2;
const SHUTTING_DOWN: u8 = 3;
const SHUTDOWN: u8 = 4;

/// The driver's public entry point. Cheap to clone via `Arc`; every clone
/// shares the same topology, pools, and caches (`spec.md` §4.6, §5).
pub struct Session {
    pub(crate) config: ClusterConfig,
    state: AtomicU8,
    connect_gate: tokio::sync::Mutex<()>,
    pub(crate) registry: Arc<HostRegistry>,
    pub(crate) pools: RwLock<HashMap<SocketAddr, Arc<HostPool>>>,
    pub(crate) policy: Arc<dyn LoadBalancingPolicy>,
    pub(crate) retry_policy: Arc<dyn RetryPolicy>,
    pub(crate) prepared: PreparedCache,
    pub(crate) timestamps: TimestampGenerator,
    pub(crate) keyspace: RwLock<Option<Arc<str>>>,
}

impl Session {
    fn new_created(
        config: ClusterConfig,
        policy: Arc<dyn LoadBalancingPolicy>,
        retry_policy: Arc<dyn RetryPolicy>,
    ) -> Self {
        let keyspace = config.keyspace.as_deref().map(Arc::from);
        Self {
            config,
            state: AtomicU8::new(CREATED),
            connect_gate: tokio::sync::Mutex::new(()),
            registry: Arc::new(HostRegistry::new()),
            pools: RwLock::new(HashMap::new()),
            policy,
            retry_policy,
            prepared: PreparedCache::default(),
            timestamps: TimestampGenerator::new(),
            keyspace: RwLock::new(keyspace),
        }
    }

    /// Connect using the composable [`DefaultPolicy`] (token-aware, DC-aware
    /// if `local_datacenter` is set) and [`DefaultRetryPolicy`].
    pub async fn connect(config: ClusterConfig) -> Result<Arc<Session>> {
        let policy = default_policy(&config);
        Self::connect_with(config, policy, Arc::new(DefaultRetryPolicy)).await
    }

    /// Connect with an explicit load-balancing and retry policy.
    pub async fn connect_with(
        config: ClusterConfig,
        policy: Arc<dyn LoadBalancingPolicy>,
        retry_policy: Arc<dyn RetryPolicy>,
    ) -> Result<Arc<Session>> {
        let session = Arc::new(Self::new_created(config, policy, retry_policy));
        session.ensure_connected().await?;
        Ok(session)
    }

    pub fn registry(&self) -> &HostRegistry {
        &self.registry
    }

    pub fn keyspace(&self) -> Option<Arc<str>> {
        self.keyspace.read().clone()
    }

    fn is_terminal(state: u8) -> bool {
        matches!(state, SHUTTING_DOWN | SHUTDOWN)
    }

    /// Idempotent connect (`spec.md` §4.6): concurrent callers collapse onto
    /// the same in-flight attempt by waiting on `connect_gate`; a failed
    /// attempt leaves the session in `Created` so a later call can retry.
    pub(crate) async fn ensure_connected(self: &Arc<Self>) -> Result<()> {
        loop {
            let state = self.state.load(Ordering::SeqCst);
            if state == CONNECTED {
                return Ok(());
            }
            if Self::is_terminal(state) {
                return Err(Error::shutdown());
            }

            let _permit = self.connect_gate.lock().await;

            // Re-check now that the gate is ours: another caller may have
            // already finished (or failed) the attempt while we waited.
            let state = self.state.load(Ordering::SeqCst);
            if state == CONNECTED {
                return Ok(());
            }
            if Self::is_terminal(state) {
                return Err(Error::shutdown());
            }

            self.state.store(CONNECTING, Ordering::SeqCst);
            match self.do_connect().await {
                Ok(()) => {
                    self.state.store(CONNECTED, Ordering::SeqCst);
                    return Ok(());
                }
                Err(err) => {
                    self.state.store(CREATED, Ordering::SeqCst);
                    return Err(err);
                }
            }
        }
    }

    async fn do_connect(&self) -> Result<()> {
        let addrs = self.config.contact_addrs().map_err(Error::from)?;
        if addrs.is_empty() {
            return Err(Error::argument("cluster config has no contact points"));
        }

        let mut tried = NoHostAvailable::default();
        let mut control = None;
        for (host, port) in &addrs {
            match HostPool::connect(host, *port, &self.config, self.registry.clone()).await {
                Ok(pool) => {
                    control = Some(pool);
                    break;
                }
                Err(e) => {
                    let addr = crate::connection::config::socket_addr_hint(host, *port)
                        .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], *port)));
                    tried.push(addr, AttemptError::Transport(e.to_string()));
                }
            }
        }
        let Some(control_pool) = control else {
            return Err(Error::from(ErrorKind::NoHostAvailable(tried)));
        };

        let control_conn = control_pool
            .snapshot()
            .into_iter()
            .next()
            .ok_or_else(|| Error::internal("control pool connected with zero connections"))?;

        discovery::seed_topology(&control_conn, &self.registry, self.config.port, self.config.connect_timeout)
            .await?;

        self.pools.write().insert(control_pool.addr(), control_pool.clone());

        // Dial every other host the control connection's discovery turned up.
        // A host that refuses to connect is marked down rather than failing
        // the whole connect() attempt: the planner will simply skip it.
        for host in self.registry.all_hosts() {
            if self.pools.read().contains_key(&host.addr) {
                continue;
            }
            match HostPool::connect(
                &host.addr.ip().to_string(),
                host.addr.port(),
                &self.config,
                self.registry.clone(),
            )
            .await
            {
                Ok(pool) => {
                    self.pools.write().insert(host.addr, pool);
                }
                Err(_) => self.registry.mark_down(&host.addr),
            }
        }

        Ok(())
    }

    pub(crate) fn pool_for(&self, addr: &SocketAddr) -> Option<Arc<HostPool>> {
        self.pools.read().get(addr).cloned()
    }

    /// Resolve `query` against the prepared-statement cache, issuing a
    /// server `PREPARE` on a miss. Concurrent callers preparing identical
    /// text collapse onto one round-trip (`spec.md` §3).
    pub async fn prepare(self: &Arc<Self>, query: impl Into<Arc<str>>) -> Result<Arc<PreparedStatement>> {
        self.ensure_connected().await?;
        let query: Arc<str> = query.into();
        self.prepared.get_or_prepare(query, |q| self.prepare_on_some_host(q)).await
    }

    async fn prepare_on_some_host(&self, query: Arc<str>) -> Result<PreparedStatement> {
        let keyspace = self.keyspace();
        let plan = self.policy.new_plan(&self.registry, keyspace.as_deref(), None);

        let mut tried = NoHostAvailable::default();
        for host in plan {
            let Some(pool) = self.pool_for(&host.addr) else { continue };
            let Some(conn) = pool.snapshot().into_iter().find(|c| !c.is_closed()) else {
                tried.push(host.addr, AttemptError::Transport("host has no open connections".into()));
                continue;
            };
            match execute::send_prepare(&conn, &query, self.config.request_timeout).await {
                Ok(prepared) => return Ok(prepared),
                Err(e) if matches!(e.kind(), ErrorKind::Response(_) | ErrorKind::Argument(_)) => return Err(e),
                Err(e) => tried.push(host.addr, AttemptError::Transport(e.to_string())),
            }
        }
        Err(Error::from(ErrorKind::NoHostAvailable(tried)))
    }

    /// Run `statement` to completion against a single page, auto-preparing
    /// it first when `opts.prepare` is set (`spec.md` §4.6).
    pub async fn execute(
        self: &Arc<Self>,
        statement: &crate::statement::Statement,
        opts: &ExecuteOptions,
    ) -> Result<crate::row::RowSet> {
        self.ensure_connected().await?;
        execute::execute_page(self, statement, opts).await
    }

    /// Like [`Session::execute`], but the returned `RowSet` never carries a
    /// paging state even if more rows exist: a single round-trip (`spec.md`
    /// §4.6's *Unpaged* mode).
    pub async fn execute_unpaged(
        self: &Arc<Self>,
        statement: &crate::statement::Statement,
        opts: &ExecuteOptions,
    ) -> Result<crate::row::RowSet> {
        self.ensure_connected().await?;
        let mut opts = opts.clone();
        opts.page_size = None;
        opts.paging_state = None;
        let mut rows = execute::execute_page(self, statement, &opts).await?;
        execute::discard_paging_state(&mut rows);
        Ok(rows)
    }

    /// Iterate every page of `statement` lazily (`spec.md` §4.6's *Auto-page*
    /// mode): page fetches run serially, in order, and the iterator can be
    /// dropped mid-fetch without cancelling the in-flight request.
    pub fn execute_auto_page(
        self: &Arc<Self>,
        statement: crate::statement::Statement,
        opts: ExecuteOptions,
    ) -> AutoPageStream {
        execute::AutoPageStream::new(self.clone(), statement, opts)
    }

    /// Send a BATCH request (`spec.md` §4.6). All children are sent
    /// atomically to one coordinator, chosen from the first child's routing
    /// key when one is available.
    pub async fn batch(
        self: &Arc<Self>,
        kind: crate::statement::BatchKind,
        children: Vec<crate::statement::BatchStatement>,
        opts: &ExecuteOptions,
    ) -> Result<()> {
        self.ensure_connected().await?;
        execute::execute_batch(self, kind, children, opts).await
    }

    /// Fan out `statements` with up to `concurrency` requests in flight at
    /// once (`spec.md` §4.6's `executeConcurrent`).
    pub async fn execute_concurrent(
        self: &Arc<Self>,
        statements: Vec<(crate::statement::Statement, ExecuteOptions)>,
        concurrency: usize,
    ) -> ConcurrentOutcome {
        self.ensure_connected().await.ok();
        execute::execute_concurrent(self, statements, concurrency).await
    }

    /// Move the session into `ShuttingDown`, close every pooled connection,
    /// then mark it `Shutdown`. Idempotent; a session already shutting down
    /// just waits for the in-flight shutdown to finish.
    pub async fn shutdown(self: &Arc<Self>) {
        let previous = self.state.swap(SHUTTING_DOWN, Ordering::SeqCst);
        if previous == SHUTDOWN {
            self.state.store(SHUTDOWN, Ordering::SeqCst);
            return;
        }
        let pools: Vec<Arc<HostPool>> = self.pools.read().values().cloned().collect();
        for pool in pools {
            pool.shutdown().await;
        }
        self.state.store(SHUTDOWN, Ordering::SeqCst);
    }

    pub fn is_shut_down(&self) -> bool {
        self.state.load(Ordering::SeqCst) == SHUTDOWN
    }
}

fn default_policy(config: &ClusterConfig) -> Arc<dyn LoadBalancingPolicy> {
    let mut builder = DefaultPolicy::builder();
    if let Some(dc) = &config.local_datacenter {
        builder = builder.preferred_datacenter(dc.clone());
    }
    Arc::new(builder.build())
}

fn result_to_rowset(body: ResultBody) -> crate::row::RowSet {
    match body {
        ResultBody::Rows(rows) => crate::row::RowSet::from_result(rows),
        ResultBody::Void | ResultBody::SchemaChange(_) | ResultBody::SetKeyspace(_) | ResultBody::Prepared(_) => {
            crate::row::RowSet::empty()
        }
    }
}
