//! Minimal peer/token discovery: a one-time query against `system.local`
//! and `system.peers` to seed the [`HostRegistry`] with enough datacenter,
//! rack, and token data for the planner to be meaningful (`SPEC_FULL.md`
//! §4.4 — deliberately short of full schema-metadata sync, which stays out
//! of scope).
use std::{net::SocketAddr, time::Duration};

use crate::{
    connection::handle::ConnectionHandle,
    cql::value::CqlValue,
    error::{Error, Result},
    protocol::{
        consistency::Consistency,
        request::{QueryParams, Request},
        response::{Response, ResultBody},
    },
    topology::{Host, HostRegistry},
};

async fn run_system_query(control: &ConnectionHandle, cql: &str, timeout: Duration) -> Result<Vec<Vec<Option<CqlValue>>>> {
    let request = Request::Query {
        cql: cql.to_string(),
        params: QueryParams { consistency: Consistency::One, ..Default::default() },
    };
    match control.send(request, timeout).await? {
        Response::Result(ResultBody::Rows(rows)) => Ok(rows.rows),
        Response::Error(e) => Err(Error::from(e)),
        other => Err(Error::internal(format!("unexpected reply to system query: {other:?}"))),
    }
}

fn text_list(value: Option<&CqlValue>) -> Vec<String> {
    match value {
        Some(CqlValue::Set(items)) | Some(CqlValue::List(items)) => items
            .iter()
            .filter_map(|v| match v {
                CqlValue::Text(s) | CqlValue::Ascii(s) => Some(s.clone()),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}

fn text(value: Option<&CqlValue>) -> String {
    match value {
        Some(CqlValue::Text(s)) | Some(CqlValue::Ascii(s)) => s.clone(),
        _ => String::new(),
    }
}

/// Seed `registry` from `control`'s own `system.local` row plus every row of
/// `system.peers`, using `default_port` for peers (the native protocol does
/// not carry peer ports).
pub(crate) async fn seed_topology(
    control: &ConnectionHandle,
    registry: &HostRegistry,
    default_port: u16,
    timeout: Duration,
) -> Result<()> {
    let local_rows = run_system_query(
        control,
        "SELECT data_center, rack, tokens FROM system.local",
        timeout,
    )
    .await?;
    if let Some(row) = local_rows.into_iter().next() {
        let dc = text(row.first().and_then(Option::as_ref));
        let rack = text(row.get(1).and_then(Option::as_ref));
        let tokens = text_list(row.get(2).and_then(Option::as_ref));
        let host = Host::new(control.addr(), dc, rack).with_tokens(tokens);
        registry.add(host);
        registry.mark_up(&control.addr());
    }

    let peer_rows = run_system_query(
        control,
        "SELECT peer, data_center, rack, tokens FROM system.peers",
        timeout,
    )
    .await?;
    for row in peer_rows {
        let peer_ip = match row.first().and_then(Option::as_ref) {
            Some(CqlValue::Inet(ip)) => *ip,
            _ => continue,
        };
        let addr = SocketAddr::new(peer_ip, default_port);
        let dc = text(row.get(1).and_then(Option::as_ref));
        let rack = text(row.get(2).and_then(Option::as_ref));
        let tokens = text_list(row.get(3).and_then(Option::as_ref));
        let host = Host::new(addr, dc, rack).with_tokens(tokens);
        registry.add(host);
        registry.mark_up(&addr);
    }

    Ok(())
}
