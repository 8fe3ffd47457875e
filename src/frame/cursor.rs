//! A cursor over a contiguous byte buffer for reading CQL wire primitives.
use std::{fmt, net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr}};

use bytes::{Buf, Bytes};

use super::vint;

/// A read past the end of the buffer, carrying the length that was requested.
#[derive(Debug, Clone, Copy)]
pub struct OutOfRange {
    pub requested: usize,
    pub available: usize,
}

impl fmt::Display for OutOfRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "out of range: requested {} bytes, {} available",
            self.requested, self.available
        )
    }
}

impl std::error::Error for OutOfRange {}

/// Cursor over a [`Bytes`] buffer implementing the CQL native protocol's
/// primitive read operations.
pub struct FrameReader {
    buf: Bytes,
}

impl FrameReader {
    pub fn new(buf: Bytes) -> Self {
        Self { buf }
    }

    pub fn remaining(&self) -> usize {
        self.buf.remaining()
    }

    fn need(&self, n: usize) -> Result<(), OutOfRange> {
        if self.buf.remaining() < n {
            Err(OutOfRange { requested: n, available: self.buf.remaining() })
        } else {
            Ok(())
        }
    }

    pub fn read_u8(&mut self) -> Result<u8, OutOfRange> {
        self.need(1)?;
        Ok(self.buf.get_u8())
    }

    pub fn read_i16(&mut self) -> Result<i16, OutOfRange> {
        self.need(2)?;
        Ok(self.buf.get_i16())
    }

    pub fn read_u16(&mut self) -> Result<u16, OutOfRange> {
        self.need(2)?;
        Ok(self.buf.get_u16())
    }

    pub fn read_i32(&mut self) -> Result<i32, OutOfRange> {
        self.need(4)?;
        Ok(self.buf.get_i32())
    }

    pub fn read_u32(&mut self) -> Result<u32, OutOfRange> {
        self.need(4)?;
        Ok(self.buf.get_u32())
    }

    pub fn read_i64(&mut self) -> Result<i64, OutOfRange> {
        self.need(8)?;
        Ok(self.buf.get_i64())
    }

    pub fn read_f32(&mut self) -> Result<f32, OutOfRange> {
        self.need(4)?;
        Ok(self.buf.get_f32())
    }

    pub fn read_f64(&mut self) -> Result<f64, OutOfRange> {
        self.need(8)?;
        Ok(self.buf.get_f64())
    }

    /// `[int]` length-prefixed bytes; negative length means `NULL`.
    pub fn read_bytes(&mut self) -> Result<Option<Bytes>, OutOfRange> {
        let len = self.read_i32()?;
        if len < 0 {
            return Ok(None);
        }
        self.need(len as usize)?;
        Ok(Some(self.buf.split_to(len as usize)))
    }

    /// `[short bytes]` length-prefixed bytes with a `u16` length.
    pub fn read_short_bytes(&mut self) -> Result<Bytes, OutOfRange> {
        let len = self.read_u16()? as usize;
        self.need(len)?;
        Ok(self.buf.split_to(len))
    }

    /// `[string]`: `u16` length prefix then utf-8 bytes.
    pub fn read_string(&mut self) -> Result<String, OutOfRange> {
        let bytes = self.read_short_bytes()?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// `[long string]`: `i32` length prefix then utf-8 bytes.
    pub fn read_long_string(&mut self) -> Result<String, OutOfRange> {
        let len = self.read_i32()? as usize;
        self.need(len)?;
        let bytes = self.buf.split_to(len);
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// `[uuid]`: 16 raw bytes.
    pub fn read_uuid(&mut self) -> Result<uuid::Uuid, OutOfRange> {
        self.need(16)?;
        let mut raw = [0u8; 16];
        self.buf.copy_to_slice(&mut raw);
        Ok(uuid::Uuid::from_bytes(raw))
    }

    /// `[inet]`: 1-byte length then 4 or 16 address bytes.
    pub fn read_inet_addr(&mut self) -> Result<IpAddr, OutOfRange> {
        let len = self.read_u8()?;
        self.need(len as usize)?;
        match len {
            4 => {
                let mut raw = [0u8; 4];
                self.buf.copy_to_slice(&mut raw);
                Ok(IpAddr::V4(Ipv4Addr::from(raw)))
            }
            16 => {
                let mut raw = [0u8; 16];
                self.buf.copy_to_slice(&mut raw);
                Ok(IpAddr::V6(Ipv6Addr::from(raw)))
            }
            other => {
                self.buf.advance(other as usize);
                Err(OutOfRange { requested: 4, available: other as usize })
            }
        }
    }

    /// `[inet]` followed by a port, per the native protocol's `inet` type.
    pub fn read_inet(&mut self) -> Result<SocketAddr, OutOfRange> {
        let addr = self.read_inet_addr()?;
        let port = self.read_i32()?;
        Ok(SocketAddr::new(addr, port as u16))
    }

    pub fn read_vint(&mut self) -> Result<i64, OutOfRange> {
        vint::decode_signed(&mut self.buf)
    }

    pub fn read_unsigned_vint(&mut self) -> Result<u64, OutOfRange> {
        vint::decode_unsigned(&mut self.buf)
    }

    /// `[string list]`.
    pub fn read_string_list(&mut self) -> Result<Vec<String>, OutOfRange> {
        let len = self.read_u16()?;
        (0..len).map(|_| self.read_string()).collect()
    }

    /// `[bytes]` without the `NULL` case, erroring if the value was null.
    pub fn read_bytes_not_null(&mut self) -> Result<Bytes, OutOfRange> {
        self.read_bytes()?.ok_or(OutOfRange { requested: 0, available: 0 })
    }

    /// Split off the remaining buffer without consuming it through further reads.
    pub fn rest(&mut self) -> Bytes {
        self.buf.split_to(self.buf.remaining())
    }

    pub fn into_inner(self) -> Bytes {
        self.buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::writer::FrameWriter;

    #[test]
    fn bytes_roundtrip_including_null() {
        let mut w = FrameWriter::new();
        w.write_bytes(Some(b"hello"));
        w.write_bytes(None::<&[u8]>);
        let mut r = FrameReader::new(w.into_bytes());
        assert_eq!(r.read_bytes().unwrap().as_deref(), Some(&b"hello"[..]));
        assert_eq!(r.read_bytes().unwrap(), None);
    }

    #[test]
    fn inet_v4_roundtrip() {
        let mut w = FrameWriter::new();
        w.write_inet_addr(&IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)));
        let mut r = FrameReader::new(w.into_bytes());
        assert_eq!(r.read_inet_addr().unwrap(), IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)));
    }

    #[test]
    fn out_of_range_on_truncated_read() {
        let mut r = FrameReader::new(Bytes::from_static(&[0, 0]));
        assert!(r.read_i32().is_err());
    }
}
