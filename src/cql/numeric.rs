//! Arbitrary-precision CQL numeric types, represented as their wire form:
//! a minimal-length big-endian two's-complement byte string.

/// CQL `varint`: an arbitrary-precision signed integer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CqlVarint(Vec<u8>);

impl CqlVarint {
    /// Build from the minimal big-endian two's-complement encoding already
    /// produced by the server, or by [`Self::from_i64`]/[`Self::from_i128`].
    pub fn from_signed_bytes_be(bytes: Vec<u8>) -> Self {
        Self(minimize(bytes))
    }

    pub fn from_i64(v: i64) -> Self {
        Self::from_signed_bytes_be(v.to_be_bytes().to_vec())
    }

    pub fn from_i128(v: i128) -> Self {
        Self::from_signed_bytes_be(v.to_be_bytes().to_vec())
    }

    pub fn as_signed_bytes_be(&self) -> &[u8] {
        &self.0
    }

    /// Narrow to `i64` if the value fits, for callers that know their schema
    /// uses small varints.
    pub fn to_i64(&self) -> Option<i64> {
        if self.0.len() > 8 {
            return None;
        }
        let negative = self.0.first().map(|b| b & 0x80 != 0).unwrap_or(false);
        let mut buf = if negative { [0xffu8; 8] } else { [0u8; 8] };
        let start = 8 - self.0.len();
        buf[start..].copy_from_slice(&self.0);
        Some(i64::from_be_bytes(buf))
    }
}

/// Strip redundant sign-extension bytes while keeping the value's sign intact.
fn minimize(mut bytes: Vec<u8>) -> Vec<u8> {
    if bytes.is_empty() {
        return vec![0];
    }
    while bytes.len() > 1 {
        let (first, second) = (bytes[0], bytes[1]);
        if (first == 0x00 && second & 0x80 == 0) || (first == 0xff && second & 0x80 != 0) {
            bytes.remove(0);
        } else {
            break;
        }
    }
    bytes
}

/// CQL `decimal`: an arbitrary-precision signed integer (the unscaled value,
/// stored as a [`CqlVarint`]) paired with a base-10 scale.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CqlDecimal {
    pub unscaled: CqlVarint,
    pub scale: i32,
}

impl CqlDecimal {
    pub fn new(unscaled: CqlVarint, scale: i32) -> Self {
        Self { unscaled, scale }
    }
}

impl std::fmt::Display for CqlDecimal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}e-{}", self.unscaled.as_signed_bytes_be(), self.scale)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn varint_minimizes_positive_sign_extension() {
        let v = CqlVarint::from_signed_bytes_be(vec![0x00, 0x00, 0x01]);
        assert_eq!(v.as_signed_bytes_be(), &[0x01]);
    }

    #[test]
    fn varint_minimizes_negative_sign_extension() {
        let v = CqlVarint::from_signed_bytes_be(vec![0xff, 0xff, 0x80]);
        assert_eq!(v.as_signed_bytes_be(), &[0x80]);
    }

    #[test]
    fn varint_roundtrips_through_i64() {
        for v in [0i64, 1, -1, 127, -128, 1_000_000, -1_000_000, i64::MAX, i64::MIN] {
            let encoded = CqlVarint::from_i64(v);
            assert_eq!(encoded.to_i64(), Some(v));
        }
    }
}
