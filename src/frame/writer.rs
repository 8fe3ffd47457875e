//! A growable buffer writer for CQL wire primitives.
use std::net::IpAddr;

use bytes::{BufMut, Bytes, BytesMut};

use super::vint;

/// Scratch buffer sized for the worst-case vint (9 bytes), reused on hot paths.
const VINT_SCRATCH: usize = vint::MAX_VINT_LEN;

#[derive(Default)]
pub struct FrameWriter {
    buf: BytesMut,
}

impl FrameWriter {
    pub fn new() -> Self {
        Self { buf: BytesMut::with_capacity(256) }
    }

    pub fn with_capacity(cap: usize) -> Self {
        Self { buf: BytesMut::with_capacity(cap) }
    }

    pub fn write_u8(&mut self, v: u8) {
        self.buf.put_u8(v);
    }

    pub fn write_i16(&mut self, v: i16) {
        self.buf.put_i16(v);
    }

    pub fn write_u16(&mut self, v: u16) {
        self.buf.put_u16(v);
    }

    pub fn write_i32(&mut self, v: i32) {
        self.buf.put_i32(v);
    }

    pub fn write_u32(&mut self, v: u32) {
        self.buf.put_u32(v);
    }

    pub fn write_i64(&mut self, v: i64) {
        self.buf.put_i64(v);
    }

    pub fn write_f32(&mut self, v: f32) {
        self.buf.put_f32(v);
    }

    pub fn write_f64(&mut self, v: f64) {
        self.buf.put_f64(v);
    }

    /// `[bytes]`: `i32` length prefix (`-1` for `NULL`) then raw bytes.
    pub fn write_bytes(&mut self, v: Option<impl AsRef<[u8]>>) {
        match v {
            Some(bytes) => {
                let bytes = bytes.as_ref();
                self.write_i32(bytes.len() as i32);
                self.buf.put_slice(bytes);
            }
            None => self.write_i32(-1),
        }
    }

    /// `[short bytes]`: `u16` length prefix then raw bytes.
    pub fn write_short_bytes(&mut self, v: impl AsRef<[u8]>) {
        let bytes = v.as_ref();
        self.write_u16(bytes.len() as u16);
        self.buf.put_slice(bytes);
    }

    /// `[string]`: `u16` length prefix then utf-8 bytes.
    pub fn write_string(&mut self, v: &str) {
        self.write_short_bytes(v.as_bytes());
    }

    /// `[long string]`: `i32` length prefix then utf-8 bytes.
    pub fn write_long_string(&mut self, v: &str) {
        self.write_i32(v.len() as i32);
        self.buf.put_slice(v.as_bytes());
    }

    pub fn write_uuid(&mut self, v: &uuid::Uuid) {
        self.buf.put_slice(v.as_bytes());
    }

    pub fn write_inet_addr(&mut self, v: &IpAddr) {
        match v {
            IpAddr::V4(v4) => {
                self.write_u8(4);
                self.buf.put_slice(&v4.octets());
            }
            IpAddr::V6(v6) => {
                self.write_u8(16);
                self.buf.put_slice(&v6.octets());
            }
        }
    }

    pub fn write_inet(&mut self, addr: &std::net::SocketAddr) {
        self.write_inet_addr(&addr.ip());
        self.write_i32(addr.port() as i32);
    }

    pub fn write_vint(&mut self, v: i64) {
        let mut scratch = [0u8; VINT_SCRATCH];
        let mut cursor = &mut scratch[..];
        vint::encode_signed(v, &mut cursor);
        let written = VINT_SCRATCH - cursor.len();
        self.buf.put_slice(&scratch[..written]);
    }

    pub fn write_unsigned_vint(&mut self, v: u64) {
        let mut scratch = [0u8; VINT_SCRATCH];
        let mut cursor = &mut scratch[..];
        vint::encode_unsigned(v, &mut cursor);
        let written = VINT_SCRATCH - cursor.len();
        self.buf.put_slice(&scratch[..written]);
    }

    pub fn write_string_list(&mut self, items: &[impl AsRef<str>]) {
        self.write_u16(items.len() as u16);
        for item in items {
            self.write_string(item.as_ref());
        }
    }

    pub fn put_slice(&mut self, bytes: &[u8]) {
        self.buf.put_slice(bytes);
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn into_bytes(self) -> Bytes {
        self.buf.freeze()
    }

    pub fn into_inner(self) -> BytesMut {
        self.buf
    }
}
