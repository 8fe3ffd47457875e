//! Encoding [`CqlValue`]s to their native-protocol wire representation.
use crate::frame::FrameWriter;

use super::value::CqlValue;

/// A value could not be encoded against its own wire rules, independent of
/// any server-advertised type (`spec.md` §4.2, §8's boundary encodings).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EncodeError {
    /// `ascii` values must be 7-bit (`spec.md` §4.2).
    #[error("ascii value contains non-7-bit bytes")]
    NotAscii,
    /// `time` must fall in `[0, 86_400_000_000_000)` nanoseconds (`spec.md` §4.2, §8).
    #[error("time value {0} ns is outside [0, 86400000000000)")]
    TimeOutOfRange(i64),
}

/// Write `value`'s wire-format bytes (the contents of its `[bytes]` envelope,
/// without the length prefix — callers wrap with [`FrameWriter::write_bytes`]
/// when a `[bytes]`-typed slot is needed, e.g. collection elements).
pub fn encode_value(value: &CqlValue, w: &mut FrameWriter) -> Result<(), EncodeError> {
    match value {
        CqlValue::Ascii(s) => {
            if !s.is_ascii() {
                return Err(EncodeError::NotAscii);
            }
            w.put_slice(s.as_bytes());
        }
        CqlValue::Text(s) => w.put_slice(s.as_bytes()),
        CqlValue::Blob(b) => w.put_slice(b),
        CqlValue::Boolean(b) => w.write_u8(if *b { 1 } else { 0 }),
        CqlValue::TinyInt(v) => w.write_u8(*v as u8),
        CqlValue::SmallInt(v) => w.write_i16(*v),
        CqlValue::Int(v) => w.write_i32(*v),
        CqlValue::BigInt(v) | CqlValue::Counter(v) => w.write_i64(*v),
        CqlValue::Float(v) => w.write_f32(*v),
        CqlValue::Double(v) => w.write_f64(*v),
        CqlValue::Varint(v) => w.put_slice(v.as_signed_bytes_be()),
        CqlValue::Decimal(d) => {
            w.write_i32(d.scale);
            w.put_slice(d.unscaled.as_signed_bytes_be());
        }
        CqlValue::Timestamp(millis) => w.write_i64(*millis),
        CqlValue::Date(days) => w.write_u32(*days),
        CqlValue::Time(nanos) => {
            if !(0..86_400_000_000_000i64).contains(nanos) {
                return Err(EncodeError::TimeOutOfRange(*nanos));
            }
            w.write_i64(*nanos);
        }
        CqlValue::Duration { months, days, nanos } => {
            w.write_vint(*months as i64);
            w.write_vint(*days as i64);
            w.write_vint(*nanos);
        }
        CqlValue::Uuid(u) | CqlValue::TimeUuid(u) => w.write_uuid(u),
        CqlValue::Inet(addr) => w.write_inet_addr(addr),
        CqlValue::List(items) | CqlValue::Set(items) => {
            encode_collection_count(w, items.len());
            for item in items {
                encode_as_bytes(item, w)?;
            }
        }
        CqlValue::Vector(items) => encode_vector(items, w)?,
        CqlValue::Map(entries) => {
            encode_collection_count(w, entries.len());
            for (k, v) in entries {
                encode_as_bytes(k, w)?;
                encode_as_bytes(v, w)?;
            }
        }
        CqlValue::Tuple(items) => {
            for item in items {
                match item {
                    Some(v) => encode_as_bytes(v, w)?,
                    None => w.write_bytes(None::<&[u8]>),
                }
            }
        }
        CqlValue::Udt(fields) => {
            for (_, v) in fields {
                match v {
                    Some(v) => encode_as_bytes(v, w)?,
                    None => w.write_bytes(None::<&[u8]>),
                }
            }
        }
    }
    Ok(())
}

fn encode_collection_count(w: &mut FrameWriter, count: usize) {
    w.write_i32(count as i32);
}

/// `Vector<T, dim>`: `dim` concatenated elements, with no overall count (the
/// dimension lives in the type, not the value) and no per-element length
/// prefix when `T` is fixed-size (`spec.md` §4.2).
fn encode_vector(items: &[CqlValue], w: &mut FrameWriter) -> Result<(), EncodeError> {
    let fixed = items.first().and_then(|v| v.guessed_type().fixed_width());
    for item in items {
        match fixed {
            Some(_) => encode_value(item, w)?,
            None => encode_as_bytes(item, w)?,
        }
    }
    Ok(())
}

fn encode_as_bytes(value: &CqlValue, w: &mut FrameWriter) -> Result<(), EncodeError> {
    let mut inner = FrameWriter::new();
    encode_value(value, &mut inner)?;
    w.write_bytes(Some(inner.into_bytes()));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_ascii_ascii_value() {
        let mut w = FrameWriter::new();
        let err = encode_value(&CqlValue::Ascii("café".into()), &mut w).unwrap_err();
        assert_eq!(err, EncodeError::NotAscii);
    }

    #[test]
    fn rejects_out_of_range_time() {
        let mut w = FrameWriter::new();
        assert!(encode_value(&CqlValue::Time(-1), &mut w).is_err());
        assert!(encode_value(&CqlValue::Time(86_400_000_000_000), &mut w).is_err());
        assert!(encode_value(&CqlValue::Time(0), &mut w).is_ok());
        assert!(encode_value(&CqlValue::Time(86_399_999_999_999), &mut w).is_ok());
    }
}
