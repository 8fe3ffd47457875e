//! [`CqlValue`]: a dynamically-typed CQL value, used for decoded row columns
//! and for bound parameters on statements that carry no server-side metadata.
use std::net::IpAddr;

use chrono::{DateTime, NaiveDate, NaiveTime, Timelike, Utc};
use uuid::Uuid;

use super::{
    numeric::{CqlDecimal, CqlVarint},
    types::CqlType,
};

/// The wire bias added to days-since-epoch for `date` (`spec.md` §4.2: `u32 =
/// days_since_epoch + 2^31`), shared between [`CqlValue::Date`]'s encode/decode
/// helpers and its `chrono` conversions.
pub(crate) const DATE_EPOCH_BIAS: i64 = 1 << 31;

pub(crate) fn unix_epoch_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(1970, 1, 1).expect("1970-01-01 is a valid date")
}

/// A CQL value in its decoded, owned form.
#[derive(Debug, Clone, PartialEq)]
pub enum CqlValue {
    Ascii(String),
    Text(String),
    Blob(Vec<u8>),
    Boolean(bool),
    TinyInt(i8),
    SmallInt(i16),
    Int(i32),
    BigInt(i64),
    Counter(i64),
    Float(f32),
    Double(f64),
    Decimal(CqlDecimal),
    Varint(CqlVarint),
    /// Milliseconds since the Unix epoch.
    Timestamp(i64),
    /// Days since the Unix epoch, offset by `2^31` per the wire format.
    Date(u32),
    /// Nanoseconds since midnight.
    Time(i64),
    Duration { months: i32, days: i32, nanos: i64 },
    Uuid(Uuid),
    TimeUuid(Uuid),
    Inet(IpAddr),
    List(Vec<CqlValue>),
    Set(Vec<CqlValue>),
    Map(Vec<(CqlValue, CqlValue)>),
    Tuple(Vec<Option<CqlValue>>),
    Udt(Vec<(String, Option<CqlValue>)>),
    Vector(Vec<CqlValue>),
}

impl CqlValue {
    /// The [`CqlType`] this value would be encoded as, used when a simple
    /// statement binds a value with no server-advertised metadata to guide it
    /// (`spec.md` §3's type-guessing table).
    pub fn guessed_type(&self) -> CqlType {
        match self {
            CqlValue::Ascii(_) => CqlType::Ascii,
            CqlValue::Text(_) => CqlType::Text,
            CqlValue::Blob(_) => CqlType::Blob,
            CqlValue::Boolean(_) => CqlType::Boolean,
            CqlValue::TinyInt(_) => CqlType::TinyInt,
            CqlValue::SmallInt(_) => CqlType::SmallInt,
            CqlValue::Int(_) => CqlType::Int,
            CqlValue::BigInt(_) => CqlType::BigInt,
            CqlValue::Counter(_) => CqlType::Counter,
            CqlValue::Float(_) => CqlType::Float,
            CqlValue::Double(_) => CqlType::Double,
            CqlValue::Decimal(_) => CqlType::Decimal,
            CqlValue::Varint(_) => CqlType::Varint,
            CqlValue::Timestamp(_) => CqlType::Timestamp,
            CqlValue::Date(_) => CqlType::Date,
            CqlValue::Time(_) => CqlType::Time,
            CqlValue::Duration { .. } => CqlType::Duration,
            CqlValue::Uuid(_) => CqlType::Uuid,
            CqlValue::TimeUuid(_) => CqlType::TimeUuid,
            CqlValue::Inet(_) => CqlType::Inet,
            CqlValue::List(items) => {
                CqlType::list(items.first().map(CqlValue::guessed_type).unwrap_or(CqlType::Blob))
            }
            CqlValue::Set(items) => {
                CqlType::set(items.first().map(CqlValue::guessed_type).unwrap_or(CqlType::Blob))
            }
            CqlValue::Map(entries) => {
                let (k, v) = entries
                    .first()
                    .map(|(k, v)| (k.guessed_type(), v.guessed_type()))
                    .unwrap_or((CqlType::Blob, CqlType::Blob));
                CqlType::map(k, v)
            }
            CqlValue::Tuple(items) => CqlType::Tuple(
                items
                    .iter()
                    .map(|v| v.as_ref().map(CqlValue::guessed_type).unwrap_or(CqlType::Blob))
                    .collect(),
            ),
            CqlValue::Udt(fields) => CqlType::Udt {
                keyspace: String::new(),
                name: String::new(),
                fields: fields
                    .iter()
                    .map(|(name, v)| {
                        (name.clone(), v.as_ref().map(CqlValue::guessed_type).unwrap_or(CqlType::Blob))
                    })
                    .collect(),
            },
            CqlValue::Vector(items) => CqlType::vector(
                items.first().map(CqlValue::guessed_type).unwrap_or(CqlType::Float),
                items.len(),
            ),
        }
    }
}

/// A native Rust value accepted at the driver's bind boundary (`Session::execute`
/// and friends), convertible into a [`CqlValue`] for encoding.
///
/// Simple statements with no prepared metadata fall back to [`CqlValue::guessed_type`]
/// to pick a wire representation; prepared/executed statements instead use the
/// server-advertised [`CqlType`] for each bind position.
pub trait ToCqlValue {
    fn to_cql_value(&self) -> CqlValue;
}

macro_rules! impl_to_cql_value {
    ($ty:ty, $variant:ident) => {
        impl ToCqlValue for $ty {
            fn to_cql_value(&self) -> CqlValue {
                CqlValue::$variant((*self).into())
            }
        }
    };
}

impl_to_cql_value!(bool, Boolean);
impl_to_cql_value!(i8, TinyInt);
impl_to_cql_value!(i16, SmallInt);
impl_to_cql_value!(i32, Int);
impl_to_cql_value!(i64, BigInt);
impl_to_cql_value!(f32, Float);
impl_to_cql_value!(f64, Double);

impl ToCqlValue for str {
    fn to_cql_value(&self) -> CqlValue {
        CqlValue::Text(self.to_owned())
    }
}

impl ToCqlValue for String {
    fn to_cql_value(&self) -> CqlValue {
        CqlValue::Text(self.clone())
    }
}

impl ToCqlValue for Vec<u8> {
    fn to_cql_value(&self) -> CqlValue {
        CqlValue::Blob(self.clone())
    }
}

impl ToCqlValue for Uuid {
    fn to_cql_value(&self) -> CqlValue {
        CqlValue::Uuid(*self)
    }
}

impl ToCqlValue for IpAddr {
    fn to_cql_value(&self) -> CqlValue {
        CqlValue::Inet(*self)
    }
}

/// A local-date wrapper guesses to `date` (`spec.md` §4.2's type-guessing table).
impl ToCqlValue for NaiveDate {
    fn to_cql_value(&self) -> CqlValue {
        let days_since_epoch = (*self - unix_epoch_date()).num_days();
        CqlValue::Date((days_since_epoch + DATE_EPOCH_BIAS) as u32)
    }
}

/// A local-time wrapper guesses to `time` (`spec.md` §4.2's type-guessing table).
impl ToCqlValue for NaiveTime {
    fn to_cql_value(&self) -> CqlValue {
        let nanos = self.num_seconds_from_midnight() as i64 * 1_000_000_000 + self.nanosecond() as i64;
        CqlValue::Time(nanos)
    }
}

/// A date/time instant guesses to `timestamp` (`spec.md` §4.2's type-guessing table).
impl ToCqlValue for DateTime<Utc> {
    fn to_cql_value(&self) -> CqlValue {
        CqlValue::Timestamp(self.timestamp_millis())
    }
}

impl<T: ToCqlValue> ToCqlValue for Vec<T> {
    fn to_cql_value(&self) -> CqlValue {
        CqlValue::List(self.iter().map(ToCqlValue::to_cql_value).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guesses_scalar_types() {
        assert_eq!(CqlValue::Int(1).guessed_type(), CqlType::Int);
        assert_eq!(CqlValue::Text("x".into()).guessed_type(), CqlType::Text);
    }

    #[test]
    fn guesses_nested_collection_types() {
        let list = CqlValue::List(vec![CqlValue::Int(1), CqlValue::Int(2)]);
        assert_eq!(list.guessed_type(), CqlType::list(CqlType::Int));
    }
}
