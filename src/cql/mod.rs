//! CQL type system: the [`types::CqlType`] descriptor, the dynamically typed
//! [`value::CqlValue`], and the codec that moves between them and wire bytes.

pub mod decode;
pub mod encode;
pub mod numeric;
pub mod types;
pub mod value;

pub use decode::{ColumnSpec, DecodeError};
pub use numeric::{CqlDecimal, CqlVarint};
pub use types::CqlType;
pub use value::{CqlValue, ToCqlValue};
