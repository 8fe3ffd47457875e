//! [`Statement`] and [`PreparedStatement`] (`spec.md` §3): the three shapes
//! a caller can hand to [`crate::session::Session`], and the server-prepared
//! query record they collapse into.
use std::sync::Arc;

use crate::cql::{decode::ColumnSpec, types::CqlType, value::{CqlValue, ToCqlValue}};

pub use crate::protocol::opcode::BatchKind;

/// A server-prepared query: an opaque id plus the typed shape the server
/// advertised for it. Shared between concurrent callers; once inserted into
/// the session's [`crate::prepared_cache::PreparedCache`] it is never mutated
/// (`spec.md` §3's invariant).
#[derive(Debug, Clone)]
pub struct PreparedStatement {
    pub id: Vec<u8>,
    pub query: Arc<str>,
    pub param_types: Vec<CqlType>,
    pub result_columns: Vec<ColumnSpec>,
    /// Index of the first bound parameter that is part of the partition key,
    /// when the server reports one, used to build the routing key for
    /// `TokenAware` planning (`spec.md` §4.5, GLOSSARY "routing key").
    pub partition_key_indices: Vec<u16>,
}

impl PreparedStatement {
    /// Serialize the bound values that form the partition key, in the order
    /// the server expects them, for `TokenAware` routing. Returns `None` if
    /// any partition-key component is `NULL`/`UNSET` or out of range: the
    /// token cannot be computed, so the planner falls back to its child
    /// policy instead of routing.
    pub fn routing_key(&self, bound_values: &[ParamValue]) -> Option<Vec<u8>> {
        if self.partition_key_indices.is_empty() {
            return None;
        }
        if self.partition_key_indices.len() == 1 {
            let idx = self.partition_key_indices[0] as usize;
            let value = value_at(bound_values, idx)?;
            let mut w = crate::frame::FrameWriter::new();
            crate::cql::encode::encode_value(value, &mut w).ok()?;
            return Some(w.into_bytes().to_vec());
        }
        // Composite partition key: each component is wrapped with a 2-byte
        // length prefix and a trailing zero byte, per the native protocol's
        // routing-key composite-key encoding.
        let mut w = crate::frame::FrameWriter::new();
        for &idx in &self.partition_key_indices {
            let value = value_at(bound_values, idx as usize)?;
            let mut component = crate::frame::FrameWriter::new();
            crate::cql::encode::encode_value(value, &mut component).ok()?;
            let bytes = component.into_bytes();
            w.write_u16(bytes.len() as u16);
            w.put_slice(&bytes);
            w.write_u8(0);
        }
        Some(w.into_bytes().to_vec())
    }
}

fn value_at(bound_values: &[ParamValue], idx: usize) -> Option<&CqlValue> {
    match bound_values.get(idx)? {
        ParamValue::Value(v) => Some(v),
        ParamValue::Null | ParamValue::Unset => None,
    }
}

/// A dynamically-typed bind value, covering every shape a caller can hand a
/// statement: a real value, an explicit `NULL`, or `UNSET` (protocol v4's
/// "leave the server-side value untouched" marker, `spec.md` §9).
#[derive(Debug, Clone)]
pub enum ParamValue {
    Null,
    Unset,
    Value(CqlValue),
}

impl ParamValue {
    /// Infer a wire type for unhinted simple-statement parameters
    /// (`spec.md` §3's type-guessing table). Returns `None` for `Null`/`Unset`,
    /// which carry no type information of their own.
    pub fn guess(&self) -> Option<CqlType> {
        match self {
            ParamValue::Value(v) => Some(v.guessed_type()),
            ParamValue::Null | ParamValue::Unset => None,
        }
    }
}

impl From<CqlValue> for ParamValue {
    fn from(v: CqlValue) -> Self {
        ParamValue::Value(v)
    }
}

/// A bound parameter value plus its hint, before it is resolved against
/// either a prepared statement's server types or `guess()` (`spec.md` §3,
/// §4.2).
#[derive(Debug, Clone)]
pub struct BoundParam {
    pub value: ParamValue,
    pub hint: Option<CqlType>,
}

impl BoundParam {
    pub fn new(value: CqlValue) -> Self {
        Self { value: ParamValue::Value(value), hint: None }
    }

    pub fn with_hint(value: CqlValue, hint: CqlType) -> Self {
        Self { value: ParamValue::Value(value), hint: Some(hint) }
    }

    /// Bind a native Rust value via [`ToCqlValue`] with no hint, relying on
    /// [`CqlValue::guessed_type`] when the statement is unprepared.
    pub fn from<T: ToCqlValue>(value: &T) -> Self {
        Self::new(value.to_cql_value())
    }

    pub fn null() -> Self {
        Self { value: ParamValue::Null, hint: None }
    }

    pub fn unset() -> Self {
        Self { value: ParamValue::Unset, hint: None }
    }

    /// Bind `value` via [`ToCqlValue`], passing `None` through as an explicit
    /// `NULL` rather than guessing a type for it (`spec.md` §3: "a null CQL
    /// value decodes to the language's null/absent sentinel").
    pub fn from_option<T: ToCqlValue>(value: Option<T>) -> Self {
        match value {
            Some(v) => Self::new(v.to_cql_value()),
            None => Self::null(),
        }
    }
}

/// One statement as the caller hands it to the engine (`spec.md` §3).
#[derive(Debug, Clone)]
pub enum Statement {
    /// A query text with positional `?` placeholders, bound directly
    /// (`prepare=false`) or prepared transparently by the engine.
    Simple { query: Arc<str>, params: Vec<BoundParam> },
    /// A reference to an already-prepared statement plus its bound values.
    Prepared { prepared: Arc<PreparedStatement>, params: Vec<ParamValue> },
    /// A batch of child statements, all routed to one coordinator
    /// (`spec.md` §4.6).
    Batch { kind: BatchKind, children: Vec<BatchStatement> },
}

/// One child statement inside a [`Statement::Batch`].
#[derive(Debug, Clone)]
pub enum BatchStatement {
    Simple { query: Arc<str>, params: Vec<BoundParam> },
    Prepared { prepared: Arc<PreparedStatement>, params: Vec<ParamValue> },
}

impl Statement {
    pub fn simple(query: impl Into<Arc<str>>) -> Self {
        Statement::Simple { query: query.into(), params: Vec::new() }
    }

    pub fn query_text(&self) -> Option<&str> {
        match self {
            Statement::Simple { query, .. } => Some(query),
            Statement::Prepared { prepared, .. } => Some(&prepared.query),
            Statement::Batch { .. } => None,
        }
    }

    /// Whether this statement is safe to retry on a different host after a
    /// transport failure (`spec.md` §7). Conservative default: only
    /// statements the caller has not marked otherwise are treated as
    /// idempotent at the `Session` layer via an explicit override; bare
    /// statements default to non-idempotent.
    pub fn is_batch(&self) -> bool {
        matches!(self, Statement::Batch { .. })
    }
}
