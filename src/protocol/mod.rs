//! CQL native protocol v4 message layer: opcodes, consistency levels, and
//! the frontend/backend message shapes built on top of the frame codec.

pub mod consistency;
pub mod opcode;
pub mod request;
pub mod response;

pub use consistency::Consistency;
pub use opcode::{BatchKind, Opcode, ResultKind};
pub use request::{BatchChild, QueryParams, Request};
pub use response::{ErrorCode, ErrorDetail, Event, ProtocolError, Response, ResponseError, ResultBody};
