//! `cassa`: an asynchronous client driver for a Cassandra-compatible
//! wide-column database speaking CQL native protocol v4.
//!
//! The public surface is the [`session::Session`]: it owns cluster topology,
//! a prepared-statement cache, and a pool of coordinator connections, and
//! exposes `prepare`/`execute`/`batch` as plain `async fn`s.

mod common;

pub mod connection;
pub mod cql;
pub mod error;
pub mod frame;
pub mod policy;
pub mod prepared_cache;
pub mod protocol;
pub mod retry;
pub mod row;
pub mod session;
pub mod statement;
pub mod topology;

pub use cql::{CqlType, CqlValue, ToCqlValue};
pub use error::{Error, ErrorKind, Result};
pub use policy::LoadBalancingPolicy;
pub use protocol::Consistency;
pub use retry::RetryPolicy;
pub use row::{Row, RowSet};
pub use session::{ExecuteOptions, Session};
pub use statement::{BatchKind, BoundParam, ParamValue, PreparedStatement, Statement};
pub use topology::Host;
