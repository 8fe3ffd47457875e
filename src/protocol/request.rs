//! Frontend (client-to-server) CQL messages (`spec.md` §4.1, §6).
use std::collections::HashMap;

use crate::{
    cql::value::CqlValue,
    frame::FrameWriter,
    protocol::{consistency::Consistency, opcode::BatchKind, opcode::query_flags},
};

/// Bound value for a single `?`/named placeholder, already encoded to wire
/// bytes. `Unset` (protocol v4's `-2` length) tells the server to leave an
/// existing value untouched, distinct from an explicit `Null` (`spec.md`
/// §9's `ParamValue` shape).
#[derive(Debug, Clone)]
pub enum BoundValue {
    Null,
    Unset,
    Value(Vec<u8>),
}

impl BoundValue {
    fn write(&self, w: &mut FrameWriter) {
        match self {
            BoundValue::Null => w.write_bytes(None::<&[u8]>),
            BoundValue::Unset => w.write_i32(-2),
            BoundValue::Value(bytes) => w.write_bytes(Some(bytes)),
        }
    }
}

impl From<Option<Vec<u8>>> for BoundValue {
    fn from(v: Option<Vec<u8>>) -> Self {
        match v {
            Some(bytes) => BoundValue::Value(bytes),
            None => BoundValue::Null,
        }
    }
}

/// Per-statement execution options shared by QUERY, EXECUTE and each BATCH
/// child (`spec.md` §6, `<query_parameters>`).
#[derive(Debug, Clone, Default)]
pub struct QueryParams {
    pub consistency: Consistency,
    pub values: Vec<BoundValue>,
    pub names: Option<Vec<String>>,
    pub skip_metadata: bool,
    pub page_size: Option<i32>,
    pub paging_state: Option<Vec<u8>>,
    pub serial_consistency: Option<Consistency>,
    pub default_timestamp: Option<i64>,
}

impl QueryParams {
    fn flags(&self) -> u8 {
        let mut f = 0u8;
        if !self.values.is_empty() {
            f |= query_flags::VALUES;
        }
        if self.skip_metadata {
            f |= query_flags::SKIP_METADATA;
        }
        if self.page_size.is_some() {
            f |= query_flags::PAGE_SIZE;
        }
        if self.paging_state.is_some() {
            f |= query_flags::PAGING_STATE;
        }
        if self.serial_consistency.is_some() {
            f |= query_flags::SERIAL_CONSISTENCY;
        }
        if self.default_timestamp.is_some() {
            f |= query_flags::DEFAULT_TIMESTAMP;
        }
        if self.names.is_some() {
            f |= query_flags::NAMES_FOR_VALUES;
        }
        f
    }

    fn write(&self, w: &mut FrameWriter) {
        w.write_u16(self.consistency.code());
        w.write_u8(self.flags());
        if !self.values.is_empty() {
            w.write_u16(self.values.len() as u16);
            if let Some(names) = &self.names {
                for (name, value) in names.iter().zip(&self.values) {
                    w.write_string(name);
                    value.write(w);
                }
            } else {
                for value in &self.values {
                    value.write(w);
                }
            }
        }
        if let Some(n) = self.page_size {
            w.write_i32(n);
        }
        if let Some(state) = &self.paging_state {
            w.write_bytes(Some(state));
        }
        if let Some(sc) = self.serial_consistency {
            w.write_u16(sc.code());
        }
        if let Some(ts) = self.default_timestamp {
            w.write_i64(ts);
        }
    }
}

/// A child statement inside a BATCH request.
#[derive(Debug, Clone)]
pub enum BatchChild {
    Query { cql: String, values: Vec<BoundValue> },
    Prepared { id: Vec<u8>, values: Vec<BoundValue> },
}

/// A fully constructed client-to-server message, ready for frame-body encoding.
#[derive(Debug, Clone)]
pub enum Request {
    Startup { options: HashMap<String, String> },
    Options,
    Query { cql: String, params: QueryParams },
    Prepare { cql: String },
    Execute { id: Vec<u8>, params: QueryParams },
    Batch {
        kind: BatchKind,
        children: Vec<BatchChild>,
        consistency: Consistency,
        serial_consistency: Option<Consistency>,
        default_timestamp: Option<i64>,
    },
    AuthResponse { token: Vec<u8> },
    Register { event_types: Vec<String> },
}

impl Request {
    pub fn opcode(&self) -> crate::protocol::opcode::Opcode {
        use crate::protocol::opcode::Opcode;
        match self {
            Request::Startup { .. } => Opcode::Startup,
            Request::Options => Opcode::Options,
            Request::Query { .. } => Opcode::Query,
            Request::Prepare { .. } => Opcode::Prepare,
            Request::Execute { .. } => Opcode::Execute,
            Request::Batch { .. } => Opcode::Batch,
            Request::AuthResponse { .. } => Opcode::AuthResponse,
            Request::Register { .. } => Opcode::Register,
        }
    }

    /// Encode the frame body (everything after the 9-byte header).
    pub fn encode(&self, w: &mut FrameWriter) {
        match self {
            Request::Startup { options } => {
                w.write_u16(options.len() as u16);
                for (k, v) in options {
                    w.write_string(k);
                    w.write_string(v);
                }
            }
            Request::Options => {}
            Request::Query { cql, params } => {
                w.write_long_string(cql);
                params.write(w);
            }
            Request::Prepare { cql } => {
                w.write_long_string(cql);
            }
            Request::Execute { id, params } => {
                w.write_short_bytes(id);
                params.write(w);
            }
            Request::Batch { kind, children, consistency, serial_consistency, default_timestamp } => {
                w.write_u8(kind.code());
                w.write_u16(children.len() as u16);
                for child in children {
                    match child {
                        BatchChild::Query { cql, values } => {
                            w.write_u8(0);
                            w.write_long_string(cql);
                            write_batch_values(w, values);
                        }
                        BatchChild::Prepared { id, values } => {
                            w.write_u8(1);
                            w.write_short_bytes(id);
                            write_batch_values(w, values);
                        }
                    }
                }
                let mut flags = 0u8;
                if serial_consistency.is_some() {
                    flags |= query_flags::SERIAL_CONSISTENCY;
                }
                if default_timestamp.is_some() {
                    flags |= query_flags::DEFAULT_TIMESTAMP;
                }
                w.write_u16(consistency.code());
                w.write_u8(flags);
                if let Some(sc) = serial_consistency {
                    w.write_u16(sc.code());
                }
                if let Some(ts) = default_timestamp {
                    w.write_i64(*ts);
                }
            }
            Request::AuthResponse { token } => {
                w.write_bytes(Some(token));
            }
            Request::Register { event_types } => {
                w.write_string_list(event_types);
            }
        }
    }
}

fn write_batch_values(w: &mut FrameWriter, values: &[BoundValue]) {
    w.write_u16(values.len() as u16);
    for value in values {
        value.write(w);
    }
}

/// Encode a bound [`CqlValue`] to its wire bytes, for callers building
/// [`QueryParams::values`] from typed parameters.
pub fn encode_bound(value: &CqlValue) -> Result<Vec<u8>, crate::cql::encode::EncodeError> {
    let mut w = FrameWriter::new();
    crate::cql::encode::encode_value(value, &mut w)?;
    Ok(w.into_bytes().to_vec())
}
