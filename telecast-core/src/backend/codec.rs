//! Hand-rolled binary codec for backend RPC payloads.
//!
//! All multi-byte primitives are little-endian. Composite types and
//! vectors carry a declared size so that a reader can skip fields it
//! doesn't understand; every read here treats "declared size exceeds
//! available bytes" as a recoverable `RpcError`, never a panic.

use crate::error::{RpcError, RpcResult};

/// A cursor over a borrowed byte slice.
pub struct ByteReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn take(&mut self, n: usize) -> RpcResult<&'a [u8]> {
        if self.remaining() < n {
            return Err(RpcError::Truncated {
                expected: n as u32,
                available: self.remaining() as u32,
            });
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    pub fn read_u8(&mut self) -> RpcResult<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn read_u16(&mut self) -> RpcResult<u16> {
        Ok(u16::from_le_bytes(self.take(2)?.try_into().unwrap()))
    }

    pub fn read_u32(&mut self) -> RpcResult<u32> {
        Ok(u32::from_le_bytes(self.take(4)?.try_into().unwrap()))
    }

    pub fn read_i32(&mut self) -> RpcResult<i32> {
        Ok(i32::from_le_bytes(self.take(4)?.try_into().unwrap()))
    }

    pub fn read_u64(&mut self) -> RpcResult<u64> {
        Ok(u64::from_le_bytes(self.take(8)?.try_into().unwrap()))
    }

    /// Reads a length-prefixed UTF-16LE string. The declared length
    /// includes the 4-byte prefix itself and the trailing `u16` NUL.
    pub fn read_string(&mut self) -> RpcResult<String> {
        let total_len = self.read_u32()? as usize;
        if total_len < 6 {
            return Err(RpcError::Malformed(format!(
                "string length {} too small for prefix+NUL",
                total_len
            )));
        }
        let body_bytes = total_len - 4 - 2;
        if body_bytes % 2 != 0 {
            return Err(RpcError::Malformed("odd UTF-16LE body length".into()));
        }
        let body = self.take(body_bytes)?;
        let units: Vec<u16> = body
            .chunks_exact(2)
            .map(|c| u16::from_le_bytes([c[0], c[1]]))
            .collect();
        let s = String::from_utf16(&units)
            .map_err(|e| RpcError::Malformed(format!("invalid UTF-16: {}", e)))?;
        let nul = self.read_u16()?;
        if nul != 0 {
            return Err(RpcError::Malformed("string missing NUL terminator".into()));
        }
        Ok(s)
    }

    /// Bounds a reader to a declared composite size (the `u32 total_size`
    /// prefix, counted from just before the prefix). Unread trailing bytes
    /// within the bound are discarded by the caller when it finishes.
    pub fn read_sized<T>(
        &mut self,
        f: impl FnOnce(&mut ByteReader<'_>) -> RpcResult<T>,
    ) -> RpcResult<T> {
        let total_size = self.read_u32()? as usize;
        if total_size < 4 {
            return Err(RpcError::Malformed(format!(
                "composite total_size {} smaller than its own prefix",
                total_size
            )));
        }
        let body_len = total_size - 4;
        let body = self.take(body_len)?;
        let mut sub = ByteReader::new(body);
        f(&mut sub)
    }

    /// Reads a vector: `u32 total_bytes` (including this header), `u32
    /// element_count`, then `element_count` elements parsed by `f`.
    pub fn read_vec<T>(
        &mut self,
        mut f: impl FnMut(&mut ByteReader<'_>) -> RpcResult<T>,
    ) -> RpcResult<Vec<T>> {
        let total_bytes = self.read_u32()? as usize;
        if total_bytes < 8 {
            return Err(RpcError::Malformed(format!(
                "vector total_bytes {} smaller than its own header",
                total_bytes
            )));
        }
        let body_len = total_bytes - 8;
        let element_count = self.read_u32()? as usize;
        let body = self.take(body_len)?;
        let mut sub = ByteReader::new(body);
        let mut out = Vec::with_capacity(element_count.min(1 << 16));
        for _ in 0..element_count {
            out.push(f(&mut sub)?);
        }
        Ok(out)
    }
}

/// A growable byte buffer with the mirror-image write helpers.
#[derive(Default)]
pub struct ByteWriter {
    pub buf: Vec<u8>,
}

impl ByteWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    pub fn write_u16(&mut self, v: u16) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn write_u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn write_i32(&mut self, v: i32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn write_u64(&mut self, v: u64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    /// Writes a string in the `u32 len` + UTF-16LE body + `u16 0` shape.
    pub fn write_string(&mut self, s: &str) {
        let units: Vec<u16> = s.encode_utf16().collect();
        let total_len = 4 + units.len() * 2 + 2;
        self.write_u32(total_len as u32);
        for u in units {
            self.buf.extend_from_slice(&u.to_le_bytes());
        }
        self.write_u16(0);
    }

    /// Writes a composite body produced by `f`, padding the declared
    /// `total_size` prefix in front of it afterwards.
    pub fn write_sized(&mut self, f: impl FnOnce(&mut ByteWriter)) {
        let start = self.buf.len();
        self.write_u32(0); // placeholder
        f(self);
        let total_size = (self.buf.len() - start) as u32;
        self.buf[start..start + 4].copy_from_slice(&total_size.to_le_bytes());
    }

    /// Writes a vector in the `total_bytes, element_count, elements` shape.
    pub fn write_vec<T>(&mut self, items: &[T], mut f: impl FnMut(&mut ByteWriter, &T)) {
        let start = self.buf.len();
        self.write_u32(0); // total_bytes placeholder
        self.write_u32(items.len() as u32);
        for item in items {
            f(self, item);
        }
        let total_bytes = (self.buf.len() - start) as u32;
        self.buf[start..start + 4].copy_from_slice(&total_bytes.to_le_bytes());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_roundtrip() {
        let mut w = ByteWriter::new();
        w.write_string("gr011");
        let mut r = ByteReader::new(&w.buf);
        assert_eq!(r.read_string().unwrap(), "gr011");
    }

    #[test]
    fn string_roundtrip_with_non_ascii() {
        let mut w = ByteWriter::new();
        w.write_string("日本テレビ");
        let mut r = ByteReader::new(&w.buf);
        assert_eq!(r.read_string().unwrap(), "日本テレビ");
    }

    #[test]
    fn sized_composite_roundtrip() {
        let mut w = ByteWriter::new();
        w.write_sized(|w| {
            w.write_u16(1);
            w.write_u32(2);
        });
        let mut r = ByteReader::new(&w.buf);
        let (a, b) = r
            .read_sized(|r| Ok((r.read_u16()?, r.read_u32()?)))
            .unwrap();
        assert_eq!((a, b), (1, 2));
    }

    #[test]
    fn vec_roundtrip() {
        let mut w = ByteWriter::new();
        w.write_vec(&[1u32, 2, 3], |w, v| w.write_u32(*v));
        let mut r = ByteReader::new(&w.buf);
        let v = r.read_vec(|r| r.read_u32()).unwrap();
        assert_eq!(v, vec![1, 2, 3]);
    }

    #[test]
    fn short_buffer_is_recoverable_not_a_panic() {
        let mut r = ByteReader::new(&[1, 2]);
        assert!(r.read_u32().is_err());
    }

    #[test]
    fn declared_size_exceeding_available_is_recoverable() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&100u32.to_le_bytes()); // lies about size
        let mut r = ByteReader::new(&buf);
        assert!(r.read_sized(|_| Ok(())).is_err());
    }
}
