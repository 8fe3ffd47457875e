//! Backend (server-to-client) CQL messages (`spec.md` §4.1, §6).
use std::net::SocketAddr;

use uuid::Uuid;

use crate::{
    cql::{decode::ColumnSpec, value::CqlValue},
    frame::{cursor::OutOfRange, FrameReader},
    protocol::consistency::Consistency,
};

/// A frame body that could not be parsed into a known message shape.
///
/// Distinct from [`crate::cql::decode::DecodeError`], which covers failures
/// decoding an individual column value once the row shape is known.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ProtocolError {
    /// The buffer ran out while parsing a message.
    #[error("truncated frame: {0}")]
    Truncated(#[from] OutOfRange),
    /// The opcode did not match any known message.
    #[error("unknown opcode 0x{0:02x}")]
    UnknownOpcode(u8),
    /// The RESULT kind field held an unrecognized code.
    #[error("unknown RESULT kind {0}")]
    UnknownResultKind(i32),
    /// The server reported a protocol version this driver does not support.
    #[error("server uses unsupported protocol version 0x{0:02x}")]
    UnsupportedVersion(u8),
    /// A SUPPORTED or STARTUP options map was malformed.
    #[error("malformed options map: {0}")]
    MalformedOptions(String),
    /// A row's column value could not be decoded against its advertised type.
    #[error("column value decode error: {0}")]
    ValueDecode(String),
}

impl std::error::Error for ProtocolError {}

/// CQL server error codes (`spec.md` §6, ERROR body).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    ServerError,
    ProtocolError,
    AuthenticationError,
    Unavailable,
    Overloaded,
    IsBootstrapping,
    TruncateError,
    WriteTimeout,
    ReadTimeout,
    ReadFailure,
    FunctionFailure,
    WriteFailure,
    SyntaxError,
    Unauthorized,
    Invalid,
    ConfigError,
    AlreadyExists,
    Unprepared,
    Unknown(i32),
}

impl ErrorCode {
    pub fn from_code(code: i32) -> Self {
        match code {
            0x0000 => ErrorCode::ServerError,
            0x000A => ErrorCode::ProtocolError,
            0x0100 => ErrorCode::AuthenticationError,
            0x1000 => ErrorCode::Unavailable,
            0x1001 => ErrorCode::Overloaded,
            0x1002 => ErrorCode::IsBootstrapping,
            0x1003 => ErrorCode::TruncateError,
            0x1100 => ErrorCode::WriteTimeout,
            0x1200 => ErrorCode::ReadTimeout,
            0x1300 => ErrorCode::ReadFailure,
            0x1400 => ErrorCode::FunctionFailure,
            0x1500 => ErrorCode::WriteFailure,
            0x2000 => ErrorCode::SyntaxError,
            0x2100 => ErrorCode::Unauthorized,
            0x2200 => ErrorCode::Invalid,
            0x2300 => ErrorCode::ConfigError,
            0x2400 => ErrorCode::AlreadyExists,
            0x2500 => ErrorCode::Unprepared,
            other => ErrorCode::Unknown(other),
        }
    }

    /// Whether this error code is idempotency-safe to retry against a
    /// different coordinator without re-planning (`spec.md` §4.5 retry policy).
    pub fn is_retryable_on_next_host(&self) -> bool {
        matches!(
            self,
            ErrorCode::Overloaded | ErrorCode::IsBootstrapping | ErrorCode::ServerError
        )
    }
}

/// A server-reported ERROR frame, decoded into its fixed and variable parts.
#[derive(Debug, Clone, thiserror::Error)]
#[error("server error ({code:?}): {message}")]
pub struct ResponseError {
    pub code: ErrorCode,
    pub message: String,
    pub detail: ErrorDetail,
}

/// Per-error-code extra fields the ERROR body carries (`spec.md` §6).
#[derive(Debug, Clone)]
pub enum ErrorDetail {
    None,
    Unavailable { consistency: Consistency, required: i32, alive: i32 },
    WriteTimeout { consistency: Consistency, received: i32, block_for: i32, write_type: String },
    ReadTimeout { consistency: Consistency, received: i32, block_for: i32, data_present: bool },
    WriteFailure {
        consistency: Consistency,
        received: i32,
        block_for: i32,
        num_failures: i32,
        write_type: String,
    },
    ReadFailure {
        consistency: Consistency,
        received: i32,
        block_for: i32,
        num_failures: i32,
        data_present: bool,
    },
    FunctionFailure { keyspace: String, function: String, arg_types: Vec<String> },
    AlreadyExists { keyspace: String, table: String },
    Unprepared { id: Vec<u8> },
}

impl ResponseError {
    pub fn parse(r: &mut FrameReader) -> Result<Self, ProtocolError> {
        let code = ErrorCode::from_code(r.read_i32()?);
        let message = r.read_string()?;
        let detail = match code {
            ErrorCode::Unavailable => ErrorDetail::Unavailable {
                consistency: read_consistency(r)?,
                required: r.read_i32()?,
                alive: r.read_i32()?,
            },
            ErrorCode::WriteTimeout => ErrorDetail::WriteTimeout {
                consistency: read_consistency(r)?,
                received: r.read_i32()?,
                block_for: r.read_i32()?,
                write_type: r.read_string()?,
            },
            ErrorCode::ReadTimeout => ErrorDetail::ReadTimeout {
                consistency: read_consistency(r)?,
                received: r.read_i32()?,
                block_for: r.read_i32()?,
                data_present: r.read_u8()? != 0,
            },
            ErrorCode::WriteFailure => ErrorDetail::WriteFailure {
                consistency: read_consistency(r)?,
                received: r.read_i32()?,
                block_for: r.read_i32()?,
                num_failures: r.read_i32()?,
                write_type: r.read_string()?,
            },
            ErrorCode::ReadFailure => ErrorDetail::ReadFailure {
                consistency: read_consistency(r)?,
                received: r.read_i32()?,
                block_for: r.read_i32()?,
                num_failures: r.read_i32()?,
                data_present: r.read_u8()? != 0,
            },
            ErrorCode::FunctionFailure => ErrorDetail::FunctionFailure {
                keyspace: r.read_string()?,
                function: r.read_string()?,
                arg_types: r.read_string_list()?,
            },
            ErrorCode::AlreadyExists => {
                ErrorDetail::AlreadyExists { keyspace: r.read_string()?, table: r.read_string()? }
            }
            ErrorCode::Unprepared => {
                ErrorDetail::Unprepared { id: r.read_short_bytes()?.to_vec() }
            }
            _ => ErrorDetail::None,
        };
        Ok(Self { code, message, detail })
    }
}

fn read_consistency(r: &mut FrameReader) -> Result<Consistency, ProtocolError> {
    let code = r.read_u16()?;
    Consistency::from_code(code)
        .ok_or_else(|| ProtocolError::MalformedOptions(format!("unknown consistency {code}")))
}

/// A decoded RESULT body (`spec.md` §6, §4.6).
#[derive(Debug, Clone)]
pub enum ResultBody {
    Void,
    Rows(RowsResult),
    SetKeyspace(String),
    Prepared(PreparedResult),
    SchemaChange(SchemaChange),
}

#[derive(Debug, Clone)]
pub struct RowsResult {
    pub metadata: ResultMetadata,
    pub rows: Vec<Vec<Option<CqlValue>>>,
}

#[derive(Debug, Clone, Default)]
pub struct ResultMetadata {
    pub columns: Vec<ColumnSpec>,
    pub paging_state: Option<Vec<u8>>,
    pub column_count: i32,
}

#[derive(Debug, Clone)]
pub struct PreparedResult {
    pub id: Vec<u8>,
    pub result_metadata_id: Option<Vec<u8>>,
    pub metadata: ResultMetadata,
    pub result_metadata: ResultMetadata,
    /// Bind-marker positions that are part of the partition key, in
    /// partition-key component order (native protocol v4 §4.2.5.4), used to
    /// build the routing key for `TokenAware` planning.
    pub partition_key_indices: Vec<u16>,
}

#[derive(Debug, Clone)]
pub struct SchemaChange {
    pub change_type: String,
    pub target: String,
    pub keyspace: String,
    pub object: Option<String>,
    pub arg_types: Vec<String>,
}

/// A fully decoded backend message.
#[derive(Debug, Clone)]
pub enum Response {
    Error(ResponseError),
    Ready,
    Authenticate { class_name: String },
    Supported(std::collections::HashMap<String, Vec<String>>),
    Result(ResultBody),
    AuthChallenge { token: Option<Vec<u8>> },
    AuthSuccess { token: Option<Vec<u8>> },
    Event(Event),
}

/// A server-pushed topology/schema/status event (`spec.md` §4.4).
#[derive(Debug, Clone)]
pub enum Event {
    TopologyChange { change_type: String, addr: SocketAddr },
    StatusChange { change_type: String, addr: SocketAddr },
    SchemaChange(SchemaChange),
}

pub(crate) fn parse_uuid_bytes(bytes: &[u8]) -> Option<Uuid> {
    Uuid::from_slice(bytes).ok()
}

mod flags {
    pub const GLOBAL_TABLES_SPEC: i32 = 0x0001;
    pub const HAS_MORE_PAGES: i32 = 0x0002;
    pub const NO_METADATA: i32 = 0x0004;
}

impl ResultMetadata {
    fn parse(r: &mut FrameReader) -> Result<Self, ProtocolError> {
        Self::parse_inner(r, false).map(|(metadata, _)| metadata)
    }

    /// Bind-marker metadata in a PREPARED result carries a `<pk_count>` and
    /// `<pk_index>` list ahead of the optional global-table-spec (native
    /// protocol v4 §4.2.5.4), absent from every other RESULT kind.
    fn parse_for_prepared(r: &mut FrameReader) -> Result<(Self, Vec<u16>), ProtocolError> {
        Self::parse_inner(r, true)
    }

    fn parse_inner(r: &mut FrameReader, with_pk_indices: bool) -> Result<(Self, Vec<u16>), ProtocolError> {
        let metadata_flags = r.read_i32()?;
        let column_count = r.read_i32()?;

        let pk_indices = if with_pk_indices {
            let pk_count = r.read_i32()?;
            (0..pk_count).map(|_| r.read_u16()).collect::<Result<Vec<_>, _>>()?
        } else {
            Vec::new()
        };

        let paging_state = if metadata_flags & flags::HAS_MORE_PAGES != 0 {
            r.read_bytes()?.map(|b| b.to_vec())
        } else {
            None
        };

        if metadata_flags & flags::NO_METADATA != 0 {
            return Ok((Self { columns: Vec::new(), paging_state, column_count }, pk_indices));
        }

        let global_spec = metadata_flags & flags::GLOBAL_TABLES_SPEC != 0;
        let global = if global_spec {
            Some((r.read_string()?, r.read_string()?))
        } else {
            None
        };

        let mut columns = Vec::with_capacity(column_count.max(0) as usize);
        for _ in 0..column_count {
            let (keyspace, table) = if let Some((ks, tbl)) = &global {
                (ks.clone(), tbl.clone())
            } else {
                (r.read_string()?, r.read_string()?)
            };
            let name = r.read_string()?;
            let col_type = crate::cql::decode::parse_option(r)?;
            columns.push(ColumnSpec { keyspace, table, name, col_type });
        }

        Ok((Self { columns, paging_state, column_count }, pk_indices))
    }
}

impl SchemaChange {
    fn parse(r: &mut FrameReader) -> Result<Self, ProtocolError> {
        let change_type = r.read_string()?;
        let target = r.read_string()?;
        match target.as_str() {
            "KEYSPACE" => Ok(Self {
                change_type,
                target,
                keyspace: r.read_string()?,
                object: None,
                arg_types: Vec::new(),
            }),
            "TABLE" | "TYPE" => Ok(Self {
                change_type,
                target,
                keyspace: r.read_string()?,
                object: Some(r.read_string()?),
                arg_types: Vec::new(),
            }),
            "FUNCTION" | "AGGREGATE" => {
                let keyspace = r.read_string()?;
                let object = r.read_string()?;
                let arg_types = r.read_string_list()?;
                Ok(Self { change_type, target, keyspace, object: Some(object), arg_types })
            }
            other => Err(ProtocolError::MalformedOptions(format!(
                "unknown schema change target {other}"
            ))),
        }
    }
}

impl ResultBody {
    fn parse(r: &mut FrameReader) -> Result<Self, ProtocolError> {
        let kind = r.read_i32()?;
        match crate::protocol::opcode::ResultKind::from_code(kind) {
            Some(crate::protocol::opcode::ResultKind::Void) => Ok(ResultBody::Void),
            Some(crate::protocol::opcode::ResultKind::Rows) => {
                let metadata = ResultMetadata::parse(r)?;
                let row_count = r.read_i32()?;
                let mut rows = Vec::with_capacity(row_count.max(0) as usize);
                for _ in 0..row_count {
                    let mut row = Vec::with_capacity(metadata.columns.len());
                    for col in &metadata.columns {
                        let raw = r.read_bytes()?;
                        let value = match raw {
                            Some(bytes) => Some(
                                crate::cql::decode::decode_value(&col.col_type, bytes)
                                    .map_err(|e| ProtocolError::ValueDecode(e.to_string()))?,
                            ),
                            None => None,
                        };
                        row.push(value);
                    }
                    rows.push(row);
                }
                Ok(ResultBody::Rows(RowsResult { metadata, rows }))
            }
            Some(crate::protocol::opcode::ResultKind::SetKeyspace) => {
                Ok(ResultBody::SetKeyspace(r.read_string()?))
            }
            Some(crate::protocol::opcode::ResultKind::Prepared) => {
                let id = r.read_short_bytes()?.to_vec();
                // Protocol v4 does not carry a separate result_metadata_id (v5+ only).
                let (metadata, partition_key_indices) = ResultMetadata::parse_for_prepared(r)?;
                let result_metadata = ResultMetadata::parse(r)?;
                Ok(ResultBody::Prepared(PreparedResult {
                    id,
                    result_metadata_id: None,
                    metadata,
                    result_metadata,
                    partition_key_indices,
                }))
            }
            Some(crate::protocol::opcode::ResultKind::SchemaChange) => {
                Ok(ResultBody::SchemaChange(SchemaChange::parse(r)?))
            }
            None => Err(ProtocolError::UnknownResultKind(kind)),
        }
    }
}

impl Event {
    fn parse(r: &mut FrameReader) -> Result<Self, ProtocolError> {
        let event_type = r.read_string()?;
        match event_type.as_str() {
            "TOPOLOGY_CHANGE" => Ok(Event::TopologyChange {
                change_type: r.read_string()?,
                addr: r.read_inet()?,
            }),
            "STATUS_CHANGE" => Ok(Event::StatusChange {
                change_type: r.read_string()?,
                addr: r.read_inet()?,
            }),
            "SCHEMA_CHANGE" => Ok(Event::SchemaChange(SchemaChange::parse(r)?)),
            other => Err(ProtocolError::MalformedOptions(format!("unknown event type {other}"))),
        }
    }
}

impl Response {
    /// Parse a fully-assembled frame body given its opcode.
    pub fn parse(opcode: crate::protocol::opcode::Opcode, r: &mut FrameReader) -> Result<Self, ProtocolError> {
        use crate::protocol::opcode::Opcode;
        Ok(match opcode {
            Opcode::Error => Response::Error(ResponseError::parse(r)?),
            Opcode::Ready => Response::Ready,
            Opcode::Authenticate => Response::Authenticate { class_name: r.read_string()? },
            Opcode::Supported => {
                let count = r.read_u16()?;
                let mut map = std::collections::HashMap::with_capacity(count as usize);
                for _ in 0..count {
                    let key = r.read_string()?;
                    let values = r.read_string_list()?;
                    map.insert(key, values);
                }
                Response::Supported(map)
            }
            Opcode::Result => Response::Result(ResultBody::parse(r)?),
            Opcode::AuthChallenge => Response::AuthChallenge { token: r.read_bytes()?.map(|b| b.to_vec()) },
            Opcode::AuthSuccess => Response::AuthSuccess { token: r.read_bytes()?.map(|b| b.to_vec()) },
            Opcode::Event => Response::Event(Event::parse(r)?),
            other => return Err(ProtocolError::UnknownOpcode(other.code())),
        })
    }
}
