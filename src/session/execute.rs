//! The execute pipeline (`spec.md` §4.6): resolve a [`Statement`] into wire
//! values, plan a coordinator, send with retry, and turn the RESULT into a
//! [`RowSet`].
use std::{
    future::Future,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
};

use futures_core::Stream;
use pin_project_lite::pin_project;

use crate::{
    error::{Error, ErrorKind, Result},
    protocol::{
        request::{BatchChild, BoundValue, QueryParams, Request},
        response::{ErrorCode, ErrorDetail, ResponseError, ResultBody},
        Consistency, Response,
    },
    retry::{AttemptError, NoHostAvailable, RetryContext, RetryDecision, RetryPolicy, RetryReason},
    row::RowSet,
    statement::{BatchKind, BatchStatement, ParamValue, PreparedStatement, Statement},
};

use super::Session;

pub(crate) const DEFAULT_FETCH_SIZE: i32 = 5000;

/// Per-call overrides for one `execute`/`batch` invocation (`spec.md` §4.6,
/// §7). Anything left `None` falls back to the session's configured default.
#[derive(Debug, Clone)]
pub struct ExecuteOptions {
    pub consistency: Option<Consistency>,
    pub serial_consistency: Option<Consistency>,
    pub page_size: Option<i32>,
    pub paging_state: Option<crate::row::PagingState>,
    /// Whether a transport failure or timeout may retry against a different
    /// host. The engine never assumes idempotence on the caller's behalf
    /// (`spec.md` §7).
    pub idempotent: bool,
    pub timestamp: Option<i64>,
    /// Transparently PREPARE a `Statement::Simple`'s query text before
    /// binding, instead of sending it unprepared.
    pub prepare: bool,
}

impl Default for ExecuteOptions {
    fn default() -> Self {
        Self {
            consistency: None,
            serial_consistency: None,
            page_size: Some(DEFAULT_FETCH_SIZE),
            paging_state: None,
            idempotent: false,
            timestamp: None,
            prepare: false,
        }
    }
}

/// Accumulated outcome of [`Session::execute_concurrent`]: one slot per input
/// statement, in the original order.
#[derive(Debug)]
pub struct ConcurrentOutcome {
    pub results: Vec<Result<RowSet>>,
}

enum ResolvedRequest {
    Query { cql: Arc<str> },
    Execute { prepared: Arc<PreparedStatement> },
    Batch { kind: BatchKind, children: Vec<ResolvedBatchChild> },
}

enum ResolvedBatchChild {
    Query { cql: Arc<str>, values: Vec<BoundValue> },
    Prepared { prepared: Arc<PreparedStatement>, values: Vec<BoundValue> },
}

struct Resolved {
    request_kind: ResolvedRequest,
    values: Vec<BoundValue>,
    routing_key: Option<Vec<u8>>,
}

fn encode_param_value(value: &ParamValue) -> Result<BoundValue> {
    Ok(match value {
        ParamValue::Null => BoundValue::Null,
        ParamValue::Unset => BoundValue::Unset,
        ParamValue::Value(v) => BoundValue::Value(
            crate::protocol::request::encode_bound(v).map_err(|e| Error::argument(e.to_string()))?,
        ),
    })
}

fn encode_param_values(params: &[ParamValue]) -> Result<Vec<BoundValue>> {
    params.iter().map(encode_param_value).collect()
}

/// A `PreparedStatement`'s parameter-type vector length equals the number of
/// placeholder markers in its text (`spec.md` §3's invariant); a caller
/// binding the wrong number of values is an `ArgumentError`, not a silently
/// truncated/padded request.
fn check_arity(prepared: &PreparedStatement, bound: usize) -> Result<()> {
    let expected = prepared.param_types.len();
    if bound != expected {
        return Err(Error::argument(format!(
            "wrong parameter arity for prepared statement: expected {expected}, got {bound}"
        )));
    }
    Ok(())
}

/// Whether an explicit per-position type hint (`spec.md` §4.2) is compatible
/// with the value actually bound at that position. Most hints must match the
/// value's own guessed type exactly, since the wire bytes `cassa` writes for
/// a `CqlValue` are fixed by its variant; the handful of pairs below share an
/// identical wire representation and are accepted either way.
fn hint_compatible(hint: &crate::cql::CqlType, natural: &crate::cql::CqlType) -> bool {
    use crate::cql::CqlType::*;
    if hint == natural {
        return true;
    }
    matches!(
        (hint, natural),
        (Ascii, Text)
            | (Text, Ascii)
            | (BigInt, Counter)
            | (Counter, BigInt)
            | (List(_), Set(_))
            | (Set(_), List(_))
    )
}

fn check_hints(params: &[crate::statement::BoundParam]) -> Result<()> {
    for p in params {
        if let (Some(hint), crate::statement::ParamValue::Value(v)) = (&p.hint, &p.value) {
            let natural = v.guessed_type();
            if !hint_compatible(hint, &natural) {
                return Err(Error::argument(format!(
                    "type hint {hint} is incompatible with bound value of type {natural}"
                )));
            }
        }
    }
    Ok(())
}

async fn resolve_statement(session: &Arc<Session>, statement: &Statement, prepare: bool) -> Result<Resolved> {
    match statement {
        Statement::Simple { query, params } => {
            check_hints(params)?;
            let values: Result<Vec<BoundValue>> = params.iter().map(|p| encode_param_value(&p.value)).collect();
            let values = values?;
            if !prepare {
                return Ok(Resolved { request_kind: ResolvedRequest::Query { cql: query.clone() }, values, routing_key: None });
            }
            let prepared = session.prepare(query.clone()).await?;
            check_arity(&prepared, params.len())?;
            let bound: Vec<ParamValue> = params.iter().map(|p| p.value.clone()).collect();
            let routing_key = prepared.routing_key(&bound);
            Ok(Resolved { request_kind: ResolvedRequest::Execute { prepared }, values, routing_key })
        }
        Statement::Prepared { prepared, params } => {
            check_arity(prepared, params.len())?;
            let values = encode_param_values(params)?;
            let routing_key = prepared.routing_key(params);
            Ok(Resolved {
                request_kind: ResolvedRequest::Execute { prepared: prepared.clone() },
                values,
                routing_key,
            })
        }
        Statement::Batch { .. } => Err(Error::argument("use Session::batch to send a BATCH statement")),
    }
}

fn build_request(resolved: &Resolved, opts: &ExecuteOptions, consistency: Consistency, timestamp: i64) -> Request {
    match &resolved.request_kind {
        ResolvedRequest::Query { cql } => Request::Query {
            cql: cql.to_string(),
            params: query_params(resolved.values.clone(), opts, consistency, timestamp),
        },
        ResolvedRequest::Execute { prepared } => Request::Execute {
            id: prepared.id.clone(),
            params: query_params(resolved.values.clone(), opts, consistency, timestamp),
        },
        ResolvedRequest::Batch { kind, children } => Request::Batch {
            kind: *kind,
            children: children
                .iter()
                .map(|child| match child {
                    ResolvedBatchChild::Query { cql, values } => {
                        BatchChild::Query { cql: cql.to_string(), values: values.clone() }
                    }
                    ResolvedBatchChild::Prepared { prepared, values } => {
                        BatchChild::Prepared { id: prepared.id.clone(), values: values.clone() }
                    }
                })
                .collect(),
            consistency,
            serial_consistency: opts.serial_consistency,
            default_timestamp: Some(timestamp),
        },
    }
}

fn query_params(values: Vec<BoundValue>, opts: &ExecuteOptions, consistency: Consistency, timestamp: i64) -> QueryParams {
    QueryParams {
        consistency,
        values,
        names: None,
        skip_metadata: false,
        page_size: opts.page_size,
        paging_state: opts.paging_state.clone(),
        serial_consistency: opts.serial_consistency,
        default_timestamp: Some(timestamp),
    }
}

/// PREPARE `query` against `conn` and turn the RESULT into a
/// [`PreparedStatement`].
pub(crate) async fn send_prepare(
    conn: &crate::connection::handle::ConnectionHandle,
    query: &str,
    timeout: std::time::Duration,
) -> Result<PreparedStatement> {
    match conn.send(Request::Prepare { cql: query.to_string() }, timeout).await? {
        Response::Result(ResultBody::Prepared(p)) => Ok(PreparedStatement {
            id: p.id,
            query: Arc::from(query),
            param_types: p.metadata.columns.iter().map(|c| c.col_type.clone()).collect(),
            result_columns: p.result_metadata.columns,
            partition_key_indices: p.partition_key_indices,
        }),
        Response::Error(e) => Err(Error::from(e)),
        other => Err(Error::internal(format!("unexpected PREPARE reply: {other:?}"))),
    }
}

/// Re-prepare whichever part of `resolved` the server reported UNPREPARED
/// for, against the same connection, and refresh the session cache
/// (`spec.md` §4.6).
async fn reprepare_in_place(
    session: &Session,
    conn: &crate::connection::handle::ConnectionHandle,
    resolved: &mut Resolved,
    unprepared_id: &[u8],
) -> Result<()> {
    match &mut resolved.request_kind {
        ResolvedRequest::Execute { prepared } => {
            let query = prepared.query.clone();
            let fresh = Arc::new(send_prepare(conn, &query, session.config.request_timeout).await?);
            session.prepared.put(query, fresh.clone());
            *prepared = fresh;
            Ok(())
        }
        ResolvedRequest::Batch { children, .. } => {
            for child in children.iter_mut() {
                if let ResolvedBatchChild::Prepared { prepared, .. } = child {
                    if prepared.id == unprepared_id {
                        let query = prepared.query.clone();
                        let fresh = Arc::new(send_prepare(conn, &query, session.config.request_timeout).await?);
                        session.prepared.put(query, fresh.clone());
                        *prepared = fresh;
                        return Ok(());
                    }
                }
            }
            Err(Error::internal("UNPREPARED response named an id not present in this batch"))
        }
        ResolvedRequest::Query { .. } => Err(Error::internal("UNPREPARED response to a query that was never prepared")),
    }
}

fn dispatch_retry(policy: &dyn RetryPolicy, err: &ResponseError, ctx: RetryContext) -> RetryDecision {
    let reason = RetryReason::from_response(err);
    match &reason {
        RetryReason::ReadTimeout { .. } => policy.on_read_timeout(&reason, ctx),
        RetryReason::WriteTimeout { .. } => policy.on_write_timeout(&reason, ctx),
        RetryReason::Unavailable { .. } => policy.on_unavailable(&reason, ctx),
        RetryReason::Other(_) => {
            if err.code.is_retryable_on_next_host() {
                RetryDecision::RetryNextHost
            } else {
                RetryDecision::Rethrow
            }
        }
    }
}

/// The core attempt loop (`spec.md` §4.6, §7): ask the policy for a plan,
/// try each host in order, and let the retry policy decide what happens
/// after a failed attempt. Codec/argument errors are surfaced by the caller
/// before this is reached; everything here is transport- or server-side.
async fn send_with_retry(
    session: &Arc<Session>,
    mut resolved: Resolved,
    opts: &ExecuteOptions,
    idempotent: bool,
) -> Result<ResultBody> {
    let keyspace = session.keyspace();
    let mut plan = session.policy.new_plan(&session.registry, keyspace.as_deref(), resolved.routing_key.as_deref());
    let mut tried = NoHostAvailable::default();
    let mut retry_count = 0u32;
    let mut consistency = opts.consistency.unwrap_or(session.config.default_consistency);
    let timestamp = opts.timestamp.unwrap_or_else(|| session.timestamps.next());

    'hosts: loop {
        let Some(host) = plan.next() else {
            return Err(Error::from(ErrorKind::NoHostAvailable(tried)));
        };
        let Some(pool) = session.pool_for(&host.addr) else { continue };
        let Some(conn) = pool.snapshot().into_iter().find(|c| !c.is_closed()) else {
            tried.push(host.addr, AttemptError::Transport("host has no open connections".into()));
            continue;
        };

        let mut reprepared = false;
        loop {
            let request = build_request(&resolved, opts, consistency, timestamp);
            host.on_request_sent();
            let outcome = conn.send(request, session.config.request_timeout).await;
            host.on_response();

            match outcome {
                Ok(Response::Result(body)) => return Ok(body),
                Ok(Response::Error(err)) => {
                    if err.code == ErrorCode::Unprepared && !reprepared {
                        let id = match &err.detail {
                            ErrorDetail::Unprepared { id } => id.clone(),
                            _ => Vec::new(),
                        };
                        reprepare_in_place(session, &conn, &mut resolved, &id).await?;
                        reprepared = true;
                        continue;
                    }
                    let ctx = RetryContext { idempotent, retry_count };
                    match dispatch_retry(session.retry_policy.as_ref(), &err, ctx) {
                        RetryDecision::Retry(cl) => {
                            if let Some(cl) = cl {
                                consistency = cl;
                            }
                            retry_count += 1;
                            continue;
                        }
                        RetryDecision::RetryNextHost => {
                            retry_count += 1;
                            tried.push(host.addr, AttemptError::Response(err));
                            continue 'hosts;
                        }
                        RetryDecision::Ignore => return Ok(ResultBody::Void),
                        RetryDecision::Rethrow => return Err(Error::from(err)),
                    }
                }
                Ok(other) => return Err(Error::internal(format!("unexpected reply: {other:?}"))),
                Err(e) if matches!(e.kind(), ErrorKind::OperationTimedOut) => {
                    tried.push(host.addr, AttemptError::Timeout);
                    let ctx = RetryContext { idempotent, retry_count };
                    match session.retry_policy.on_request_error(ctx) {
                        RetryDecision::RetryNextHost => {
                            retry_count += 1;
                            continue 'hosts;
                        }
                        _ => return Err(e),
                    }
                }
                // Nothing was sent over the wire here: the connection's own
                // stream-id pool was exhausted before the request left this
                // process, so this is a connection-selection concern, not a
                // transport failure. It must never be gated on idempotence
                // (`spec.md` §4.6: "if saturated ... try next"); always move
                // on to the next host.
                Err(e) if matches!(e.kind(), ErrorKind::BusyConnection) => {
                    tried.push(host.addr, AttemptError::Transport(e.to_string()));
                    continue 'hosts;
                }
                Err(e) => {
                    tried.push(host.addr, AttemptError::Transport(e.to_string()));
                    let ctx = RetryContext { idempotent, retry_count };
                    match session.retry_policy.on_request_error(ctx) {
                        RetryDecision::RetryNextHost => {
                            retry_count += 1;
                            continue 'hosts;
                        }
                        _ => return Err(e),
                    }
                }
            }
        }
    }
}

pub(crate) async fn execute_page(session: &Arc<Session>, statement: &Statement, opts: &ExecuteOptions) -> Result<RowSet> {
    if matches!(statement, Statement::Batch { .. }) {
        return Err(Error::argument("use Session::batch to send a BATCH statement"));
    }
    let resolved = resolve_statement(session, statement, opts.prepare).await?;
    let body = send_with_retry(session, resolved, opts, opts.idempotent).await?;
    Ok(super::result_to_rowset(body))
}

pub(crate) fn discard_paging_state(rows: &mut RowSet) {
    rows.clear_paging_state();
}

pub(crate) async fn execute_batch(
    session: &Arc<Session>,
    kind: BatchKind,
    children: Vec<BatchStatement>,
    opts: &ExecuteOptions,
) -> Result<()> {
    let mut resolved_children = Vec::with_capacity(children.len());
    let mut routing_key = None;
    for (index, child) in children.into_iter().enumerate() {
        match child {
            BatchStatement::Simple { query, params } => {
                check_hints(&params)?;
                let values: Result<Vec<BoundValue>> = params.iter().map(|p| encode_param_value(&p.value)).collect();
                resolved_children.push(ResolvedBatchChild::Query { cql: query, values: values? });
            }
            BatchStatement::Prepared { prepared, params } => {
                check_arity(&prepared, params.len())?;
                let values = encode_param_values(&params)?;
                if index == 0 {
                    routing_key = prepared.routing_key(&params);
                }
                resolved_children.push(ResolvedBatchChild::Prepared { prepared, values });
            }
        }
    }

    let resolved = Resolved {
        request_kind: ResolvedRequest::Batch { kind, children: resolved_children },
        values: Vec::new(),
        routing_key,
    };
    send_with_retry(session, resolved, opts, opts.idempotent).await?;
    Ok(())
}

type PageFuture = Pin<Box<dyn Future<Output = Result<RowSet>> + Send>>;

pin_project! {
    /// Lazily fetches one page per `poll_next`, in order (`spec.md` §4.6's
    /// *Auto-page* mode). Dropping the stream mid-fetch does not cancel the
    /// in-flight request; it simply stops polling it.
    pub struct AutoPageStream {
        session: Arc<Session>,
        statement: Statement,
        opts: ExecuteOptions,
        done: bool,
        in_flight: Option<PageFuture>,
    }
}

impl AutoPageStream {
    pub(crate) fn new(session: Arc<Session>, statement: Statement, mut opts: ExecuteOptions) -> Self {
        opts.page_size = opts.page_size.or(Some(DEFAULT_FETCH_SIZE));
        Self { session, statement, opts, done: false, in_flight: None }
    }
}

impl Stream for AutoPageStream {
    type Item = Result<RowSet>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.project();
        if *this.done {
            return Poll::Ready(None);
        }
        if this.in_flight.is_none() {
            let session = this.session.clone();
            let statement = this.statement.clone();
            let opts = this.opts.clone();
            *this.in_flight = Some(Box::pin(async move { execute_page(&session, &statement, &opts).await }));
        }
        let fut = this.in_flight.as_mut().expect("just populated above");
        match fut.as_mut().poll(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(result) => {
                *this.in_flight = None;
                match result {
                    Ok(rows) => {
                        match rows.paging_state() {
                            Some(state) => this.opts.paging_state = Some(state.clone()),
                            None => *this.done = true,
                        }
                        Poll::Ready(Some(Ok(rows)))
                    }
                    Err(e) => {
                        *this.done = true;
                        Poll::Ready(Some(Err(e)))
                    }
                }
            }
        }
    }
}

/// Fan out `statements` with at most `concurrency` requests in flight at once
/// (`spec.md` §4.6's `executeConcurrent`).
pub(crate) async fn execute_concurrent(
    session: &Arc<Session>,
    statements: Vec<(Statement, ExecuteOptions)>,
    concurrency: usize,
) -> ConcurrentOutcome {
    let len = statements.len();
    let semaphore = Arc::new(tokio::sync::Semaphore::new(concurrency.max(1)));
    let mut set = tokio::task::JoinSet::new();
    for (index, (statement, opts)) in statements.into_iter().enumerate() {
        let session = session.clone();
        let semaphore = semaphore.clone();
        set.spawn(async move {
            let _permit = semaphore.acquire_owned().await.expect("semaphore is never closed");
            (index, execute_page(&session, &statement, &opts).await)
        });
    }

    let mut results: Vec<Option<Result<RowSet>>> = std::iter::repeat_with(|| None).take(len).collect();
    while let Some(joined) = set.join_next().await {
        if let Ok((index, result)) = joined {
            results[index] = Some(result);
        }
        // a panicking task would otherwise leave its slot permanently `None`,
        // surfaced below as an internal error rather than silently dropped.
    }

    ConcurrentOutcome {
        results: results
            .into_iter()
            .map(|slot| slot.unwrap_or_else(|| Err(Error::internal("concurrent execute task did not complete"))))
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cql::{CqlType, CqlValue};
    use crate::statement::BoundParam;

    #[test]
    fn hint_must_match_value_unless_wire_compatible() {
        assert!(hint_compatible(&CqlType::Int, &CqlType::Int));
        assert!(hint_compatible(&CqlType::Ascii, &CqlType::Text));
        assert!(hint_compatible(&CqlType::Counter, &CqlType::BigInt));
        assert!(!hint_compatible(&CqlType::Int, &CqlType::Text));
    }

    #[test]
    fn check_hints_rejects_incompatible_hint() {
        let params = vec![BoundParam::with_hint(CqlValue::Int(1), CqlType::Text)];
        assert!(check_hints(&params).is_err());
    }

    #[test]
    fn check_hints_accepts_matching_hint() {
        let params = vec![BoundParam::with_hint(CqlValue::Text("x".into()), CqlType::Ascii)];
        assert!(check_hints(&params).is_ok());
    }

    fn dummy_prepared(param_types: Vec<CqlType>) -> PreparedStatement {
        PreparedStatement {
            id: vec![1, 2, 3],
            query: "SELECT * FROM t WHERE k = ?".into(),
            param_types,
            result_columns: Vec::new(),
            partition_key_indices: Vec::new(),
        }
    }

    #[test]
    fn check_arity_rejects_mismatched_param_count() {
        let prepared = dummy_prepared(vec![CqlType::Int]);
        assert!(check_arity(&prepared, 0).is_err());
        assert!(check_arity(&prepared, 2).is_err());
        assert!(check_arity(&prepared, 1).is_ok());
    }
}
