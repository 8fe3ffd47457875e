//! [`ConnectionHandle`]: the cheap, cloneable front a session holds onto a
//! connection, backed by a [`super::actor::ConnectionActor`] running on its
//! own task.
use std::{net::SocketAddr, sync::Arc, time::Duration};

use tokio::sync::{mpsc, oneshot};

use crate::{
    error::{Error, Result},
    protocol::{request::Request, response::Response},
};

use super::{
    actor::{ActorMessage, ConnectionActor},
    config::PoolConfig,
    socket::Socket,
};

/// A handle to one live connection. Cloning shares the same underlying
/// socket and in-flight slab; every clone can submit requests concurrently,
/// each getting its own stream id (`spec.md` §4.3).
#[derive(Clone)]
pub struct ConnectionHandle {
    to_actor: mpsc::Sender<ActorMessage>,
    addr: SocketAddr,
    max_in_flight: u16,
}

impl ConnectionHandle {
    /// Dial `addr` and spawn its driver task. Returns the handle plus a
    /// receiver for server-pushed events (`spec.md` §4.4), which the caller
    /// is expected to forward into a [`crate::topology::HostRegistry`] once
    /// registered via REGISTER.
    pub async fn connect(
        host: &str,
        port: u16,
        pool: &PoolConfig,
    ) -> Result<(Self, mpsc::UnboundedReceiver<crate::protocol::response::Event>)> {
        let socket = tokio::time::timeout(Duration::from_secs(10), Socket::connect(host, port))
            .await
            .map_err(|_| Error::from(crate::error::ErrorKind::OperationTimedOut))??;
        let addr = socket.peer_addr()?;

        let (to_actor, inbox) = mpsc::channel(pool.max_in_flight_per_connection as usize);
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let actor = ConnectionActor::new(
            socket,
            inbox,
            pool.max_in_flight_per_connection,
            pool.heartbeat_interval,
            pool.defunct_read_timeout_threshold,
            events_tx,
        );
        tokio::spawn(actor.run());

        let handle = Self { to_actor, addr, max_in_flight: pool.max_in_flight_per_connection };
        Ok((handle, events_rx))
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn max_in_flight(&self) -> u16 {
        self.max_in_flight
    }

    /// Whether the actor task is still alive.
    pub fn is_closed(&self) -> bool {
        self.to_actor.is_closed()
    }

    /// Submit a request and await its response, respecting `timeout`.
    pub async fn send(&self, request: Request, timeout: Duration) -> Result<Response> {
        let (reply, rx) = oneshot::channel();
        self.to_actor
            .send(ActorMessage::Send { request, reply })
            .await
            .map_err(|_| Error::internal("connection actor is no longer running"))?;

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(Error::internal("connection actor dropped the reply channel")),
            Err(_) => Err(Error::from(crate::error::ErrorKind::OperationTimedOut)),
        }
    }

    pub async fn shutdown(&self) {
        let _ = self.to_actor.send(ActorMessage::Shutdown).await;
    }
}

impl std::fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionHandle").field("addr", &self.addr).finish()
    }
}

/// Establish the STARTUP/AUTHENTICATE/AUTH_RESPONSE handshake against a
/// freshly dialed connection (`spec.md` §4.3, §6).
pub async fn handshake(
    handle: &ConnectionHandle,
    auth: Option<&super::config::PlainTextAuth>,
    timeout: Duration,
) -> Result<()> {
    let mut options = std::collections::HashMap::new();
    options.insert("CQL_VERSION".to_string(), "3.0.0".to_string());

    match handle.send(Request::Startup { options }, timeout).await? {
        Response::Ready => Ok(()),
        Response::Authenticate { class_name } => {
            let Some(auth) = auth else {
                return Err(Error::authentication(format!(
                    "server requires authentication ({class_name}) but none was configured"
                )));
            };
            authenticate(handle, auth, timeout).await
        }
        other => Err(Error::internal(format!("unexpected STARTUP reply: {other:?}"))),
    }
}

async fn authenticate(
    handle: &ConnectionHandle,
    auth: &super::config::PlainTextAuth,
    timeout: Duration,
) -> Result<()> {
    let mut token = Vec::with_capacity(auth.username.len() + auth.password.len() + 2);
    token.push(0);
    token.extend_from_slice(auth.username.as_bytes());
    token.push(0);
    token.extend_from_slice(auth.password.as_bytes());

    match handle.send(Request::AuthResponse { token }, timeout).await? {
        Response::AuthSuccess { .. } => Ok(()),
        Response::AuthChallenge { .. } => {
            Err(Error::authentication("server issued an AUTH_CHALLENGE; SASL mechanisms beyond PLAIN are unsupported"))
        }
        Response::Error(e) => Err(Error::from(e)),
        other => Err(Error::internal(format!("unexpected authentication reply: {other:?}"))),
    }
}

/// Ask the connection to push TOPOLOGY_CHANGE/STATUS_CHANGE/SCHEMA_CHANGE
/// events (`spec.md` §4.4).
pub async fn register_for_events(handle: &ConnectionHandle, timeout: Duration) -> Result<()> {
    let event_types = vec![
        "TOPOLOGY_CHANGE".to_string(),
        "STATUS_CHANGE".to_string(),
        "SCHEMA_CHANGE".to_string(),
    ];
    match handle.send(Request::Register { event_types }, timeout).await? {
        Response::Ready => Ok(()),
        other => Err(Error::internal(format!("unexpected REGISTER reply: {other:?}"))),
    }
}

/// Used by [`crate::session`] to name a connection in diagnostics without
/// cloning the whole handle.
pub fn describe(handle: &ConnectionHandle) -> Arc<str> {
    Arc::from(handle.addr.to_string())
}
