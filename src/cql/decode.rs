//! Decoding the wire bytes of a single column value against its advertised
//! [`CqlType`], and decoding an `[option]`/`<type>` descriptor off the wire.
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use bytes::{Buf, Bytes};

use crate::{
    frame::{vint, FrameReader},
    protocol::response::ProtocolError,
};

use super::{
    numeric::{CqlDecimal, CqlVarint},
    types::CqlType,
    value::CqlValue,
};

/// A column's position and type within a RESULT's metadata (`spec.md` §3, §6).
#[derive(Debug, Clone)]
pub struct ColumnSpec {
    pub keyspace: String,
    pub table: String,
    pub name: String,
    pub col_type: CqlType,
}

/// A value's raw bytes could not be interpreted as its advertised type.
#[derive(Debug, Clone, thiserror::Error)]
pub enum DecodeError {
    /// The byte length didn't match what the type requires.
    #[error("wrong byte length for {type_name}: expected {expected}, got {got}")]
    WrongLength { expected: usize, got: usize, type_name: String },
    /// The bytes were not valid UTF-8 for a text-like type.
    #[error("invalid utf-8 for {0}")]
    InvalidUtf8(String),
    /// A nested value's bytes (collection element, tuple field, UDT field) were truncated.
    #[error("nested value: {0}")]
    Nested(#[source] Box<DecodeError>),
    /// A vint inside a `duration` value overran its encoding.
    #[error("malformed vint: {0}")]
    Vint(String),
}

/// Read a CQL `<type>` (`[option]`) descriptor off the wire (`spec.md` §6).
pub fn parse_option(r: &mut FrameReader) -> Result<CqlType, ProtocolError> {
    let id = r.read_u16()?;
    Ok(match id {
        0x0000 => CqlType::Custom(r.read_string()?),
        0x0001 => CqlType::Ascii,
        0x0002 => CqlType::BigInt,
        0x0003 => CqlType::Blob,
        0x0004 => CqlType::Boolean,
        0x0005 => CqlType::Counter,
        0x0006 => CqlType::Decimal,
        0x0007 => CqlType::Double,
        0x0008 => CqlType::Float,
        0x0009 => CqlType::Int,
        0x000B => CqlType::Timestamp,
        0x000C => CqlType::Uuid,
        0x000D => CqlType::Text,
        0x000E => CqlType::Varint,
        0x000F => CqlType::TimeUuid,
        0x0010 => CqlType::Inet,
        0x0011 => CqlType::Date,
        0x0012 => CqlType::Time,
        0x0013 => CqlType::SmallInt,
        0x0014 => CqlType::TinyInt,
        0x0015 => {
            // duration: no further payload, fixed shape (3 vints) at value time.
            CqlType::Duration
        }
        0x0020 => CqlType::list(parse_option(r)?),
        0x0021 => {
            let key = parse_option(r)?;
            let value = parse_option(r)?;
            CqlType::map(key, value)
        }
        0x0022 => CqlType::set(parse_option(r)?),
        0x0030 => {
            let keyspace = r.read_string()?;
            let name = r.read_string()?;
            let count = r.read_u16()?;
            let mut fields = Vec::with_capacity(count as usize);
            for _ in 0..count {
                let field_name = r.read_string()?;
                let field_type = parse_option(r)?;
                fields.push((field_name, field_type));
            }
            CqlType::Udt { keyspace, name, fields }
        }
        0x0031 => {
            let count = r.read_u16()?;
            let mut elements = Vec::with_capacity(count as usize);
            for _ in 0..count {
                elements.push(parse_option(r)?);
            }
            CqlType::Tuple(elements)
        }
        0x0032 => {
            let element = parse_option(r)?;
            let dim = r.read_i32()? as usize;
            CqlType::vector(element, dim)
        }
        other => CqlType::Custom(format!("unknown-option-0x{other:04x}")),
    })
}

/// Decode `bytes` (the payload of a non-NULL `[bytes]` slot) as a value of
/// the given type.
pub fn decode_value(ty: &CqlType, bytes: Bytes) -> Result<CqlValue, DecodeError> {
    match ty {
        CqlType::Ascii => Ok(CqlValue::Ascii(decode_utf8(bytes, "ascii")?)),
        CqlType::Text => Ok(CqlValue::Text(decode_utf8(bytes, "text")?)),
        CqlType::Blob | CqlType::Custom(_) => Ok(CqlValue::Blob(bytes.to_vec())),
        CqlType::Boolean => Ok(CqlValue::Boolean(expect_len(&bytes, 1, "boolean")?[0] != 0)),
        CqlType::TinyInt => Ok(CqlValue::TinyInt(expect_len(&bytes, 1, "tinyint")?[0] as i8)),
        CqlType::SmallInt => {
            let b = expect_len(&bytes, 2, "smallint")?;
            Ok(CqlValue::SmallInt(i16::from_be_bytes([b[0], b[1]])))
        }
        CqlType::Int => {
            let b = expect_len(&bytes, 4, "int")?;
            Ok(CqlValue::Int(i32::from_be_bytes([b[0], b[1], b[2], b[3]])))
        }
        CqlType::Date => {
            let b = expect_len(&bytes, 4, "date")?;
            Ok(CqlValue::Date(u32::from_be_bytes([b[0], b[1], b[2], b[3]])))
        }
        CqlType::BigInt => {
            let b = expect_len(&bytes, 8, "bigint")?;
            Ok(CqlValue::BigInt(i64::from_be_bytes(b.try_into().unwrap())))
        }
        CqlType::Counter => {
            let b = expect_len(&bytes, 8, "counter")?;
            Ok(CqlValue::Counter(i64::from_be_bytes(b.try_into().unwrap())))
        }
        CqlType::Timestamp => {
            let b = expect_len(&bytes, 8, "timestamp")?;
            Ok(CqlValue::Timestamp(i64::from_be_bytes(b.try_into().unwrap())))
        }
        CqlType::Time => {
            let b = expect_len(&bytes, 8, "time")?;
            Ok(CqlValue::Time(i64::from_be_bytes(b.try_into().unwrap())))
        }
        CqlType::Float => {
            let b = expect_len(&bytes, 4, "float")?;
            Ok(CqlValue::Float(f32::from_be_bytes(b.try_into().unwrap())))
        }
        CqlType::Double => {
            let b = expect_len(&bytes, 8, "double")?;
            Ok(CqlValue::Double(f64::from_be_bytes(b.try_into().unwrap())))
        }
        CqlType::Varint => Ok(CqlValue::Varint(CqlVarint::from_signed_bytes_be(bytes.to_vec()))),
        CqlType::Decimal => {
            if bytes.len() < 4 {
                return Err(DecodeError::WrongLength {
                    expected: 4,
                    got: bytes.len(),
                    type_name: "decimal".into(),
                });
            }
            let scale = i32::from_be_bytes(bytes[..4].try_into().unwrap());
            let unscaled = CqlVarint::from_signed_bytes_be(bytes[4..].to_vec());
            Ok(CqlValue::Decimal(CqlDecimal::new(unscaled, scale)))
        }
        CqlType::Duration => {
            let mut buf = bytes;
            let months = vint::decode_signed(&mut buf)
                .map_err(|e| DecodeError::Vint(e.to_string()))?;
            let days = vint::decode_signed(&mut buf)
                .map_err(|e| DecodeError::Vint(e.to_string()))?;
            let nanos = vint::decode_signed(&mut buf)
                .map_err(|e| DecodeError::Vint(e.to_string()))?;
            Ok(CqlValue::Duration { months: months as i32, days: days as i32, nanos })
        }
        CqlType::Uuid => Ok(CqlValue::Uuid(decode_uuid(&bytes)?)),
        CqlType::TimeUuid => Ok(CqlValue::TimeUuid(decode_uuid(&bytes)?)),
        CqlType::Inet => Ok(CqlValue::Inet(decode_inet(&bytes)?)),
        CqlType::List(elem) => Ok(CqlValue::List(decode_collection_items(elem, bytes)?)),
        CqlType::Set(elem) => Ok(CqlValue::Set(decode_collection_items(elem, bytes)?)),
        CqlType::Vector(elem, dim) => Ok(CqlValue::Vector(decode_vector_items(elem, *dim, bytes)?)),
        CqlType::Map(key, value) => {
            let mut buf = bytes;
            let count = buf.get_i32();
            let mut entries = Vec::with_capacity(count.max(0) as usize);
            for _ in 0..count {
                let k = decode_length_prefixed(&mut buf, key)?;
                let v = decode_length_prefixed(&mut buf, value)?;
                entries.push((k, v));
            }
            Ok(CqlValue::Map(entries))
        }
        CqlType::Tuple(elements) => {
            let mut buf = bytes;
            let mut items = Vec::with_capacity(elements.len());
            for elem_ty in elements {
                items.push(decode_optional_length_prefixed(&mut buf, elem_ty)?);
            }
            Ok(CqlValue::Tuple(items))
        }
        CqlType::Udt { fields, .. } => {
            let mut buf = bytes;
            let mut decoded = Vec::with_capacity(fields.len());
            for (name, field_ty) in fields {
                let value = decode_optional_length_prefixed(&mut buf, field_ty)?;
                decoded.push((name.clone(), value));
            }
            Ok(CqlValue::Udt(decoded))
        }
    }
}

fn decode_collection_items(elem: &CqlType, mut buf: Bytes) -> Result<Vec<CqlValue>, DecodeError> {
    let count = buf.get_i32();
    let mut items = Vec::with_capacity(count.max(0) as usize);
    for _ in 0..count {
        items.push(decode_length_prefixed(&mut buf, elem)?);
    }
    Ok(items)
}

/// `Vector<T, dim>`: `dim` concatenated elements with no overall count, and
/// no per-element length prefix when `elem` is fixed-size (`spec.md` §4.2).
fn decode_vector_items(elem: &CqlType, dim: usize, mut buf: Bytes) -> Result<Vec<CqlValue>, DecodeError> {
    let mut items = Vec::with_capacity(dim);
    match elem.fixed_width() {
        Some(width) => {
            for _ in 0..dim {
                if buf.remaining() < width {
                    return Err(DecodeError::WrongLength { expected: width, got: buf.remaining(), type_name: "vector element".into() });
                }
                let chunk = buf.split_to(width);
                items.push(decode_value(elem, chunk).map_err(|e| DecodeError::Nested(Box::new(e)))?);
            }
        }
        None => {
            for _ in 0..dim {
                items.push(decode_length_prefixed(&mut buf, elem)?);
            }
        }
    }
    Ok(items)
}

fn decode_length_prefixed(buf: &mut Bytes, ty: &CqlType) -> Result<CqlValue, DecodeError> {
    let len = buf.get_i32();
    let chunk = buf.split_to(len.max(0) as usize);
    decode_value(ty, chunk).map_err(|e| DecodeError::Nested(Box::new(e)))
}

fn decode_optional_length_prefixed(
    buf: &mut Bytes,
    ty: &CqlType,
) -> Result<Option<CqlValue>, DecodeError> {
    let len = buf.get_i32();
    if len < 0 {
        return Ok(None);
    }
    let chunk = buf.split_to(len as usize);
    Ok(Some(decode_value(ty, chunk).map_err(|e| DecodeError::Nested(Box::new(e)))?))
}

fn expect_len(bytes: &Bytes, expected: usize, type_name: &str) -> Result<&[u8], DecodeError> {
    if bytes.len() != expected {
        return Err(DecodeError::WrongLength {
            expected,
            got: bytes.len(),
            type_name: type_name.to_string(),
        });
    }
    Ok(&bytes[..])
}

fn decode_utf8(bytes: Bytes, type_name: &str) -> Result<String, DecodeError> {
    String::from_utf8(bytes.to_vec()).map_err(|_| DecodeError::InvalidUtf8(type_name.to_string()))
}

fn decode_uuid(bytes: &[u8]) -> Result<uuid::Uuid, DecodeError> {
    if bytes.len() != 16 {
        return Err(DecodeError::WrongLength { expected: 16, got: bytes.len(), type_name: "uuid".into() });
    }
    let mut raw = [0u8; 16];
    raw.copy_from_slice(bytes);
    Ok(uuid::Uuid::from_bytes(raw))
}

fn decode_inet(bytes: &[u8]) -> Result<IpAddr, DecodeError> {
    match bytes.len() {
        4 => {
            let mut raw = [0u8; 4];
            raw.copy_from_slice(bytes);
            Ok(IpAddr::V4(Ipv4Addr::from(raw)))
        }
        16 => {
            let mut raw = [0u8; 16];
            raw.copy_from_slice(bytes);
            Ok(IpAddr::V6(Ipv6Addr::from(raw)))
        }
        other => Err(DecodeError::WrongLength { expected: 4, got: other, type_name: "inet".into() }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_fixed_width_scalars() {
        assert_eq!(
            decode_value(&CqlType::Int, Bytes::from_static(&[0, 0, 0, 42])).unwrap(),
            CqlValue::Int(42)
        );
        assert_eq!(
            decode_value(&CqlType::Boolean, Bytes::from_static(&[1])).unwrap(),
            CqlValue::Boolean(true)
        );
    }

    #[test]
    fn decodes_list_of_int() {
        let mut body = vec![0, 0, 0, 2]; // count = 2
        body.extend_from_slice(&[0, 0, 0, 4]); // elem len
        body.extend_from_slice(&1i32.to_be_bytes());
        body.extend_from_slice(&[0, 0, 0, 4]);
        body.extend_from_slice(&2i32.to_be_bytes());
        let decoded = decode_value(&CqlType::list(CqlType::Int), Bytes::from(body)).unwrap();
        assert_eq!(decoded, CqlValue::List(vec![CqlValue::Int(1), CqlValue::Int(2)]));
    }

    #[test]
    fn rejects_wrong_length_fixed_width() {
        assert!(decode_value(&CqlType::Int, Bytes::from_static(&[0, 0])).is_err());
    }

    #[test]
    fn decodes_vector_of_fixed_width_elements_without_length_prefixes() {
        // No overall count, no per-element [bytes] envelope: 3 raw f32s.
        let mut body = Vec::new();
        body.extend_from_slice(&1.0f32.to_be_bytes());
        body.extend_from_slice(&2.0f32.to_be_bytes());
        body.extend_from_slice(&3.0f32.to_be_bytes());
        let ty = CqlType::vector(CqlType::Float, 3);
        let decoded = decode_value(&ty, Bytes::from(body)).unwrap();
        assert_eq!(
            decoded,
            CqlValue::Vector(vec![CqlValue::Float(1.0), CqlValue::Float(2.0), CqlValue::Float(3.0)])
        );
    }

    #[test]
    fn vector_of_variable_width_elements_round_trips_through_encode() {
        use crate::cql::encode::encode_value;
        use crate::frame::FrameWriter;

        let value = CqlValue::Vector(vec![CqlValue::Text("ab".into()), CqlValue::Text("cde".into())]);
        let mut w = FrameWriter::new();
        encode_value(&value, &mut w).unwrap();
        let ty = CqlType::vector(CqlType::Text, 2);
        let decoded = decode_value(&ty, w.into_bytes()).unwrap();
        assert_eq!(decoded, value);
    }
}
