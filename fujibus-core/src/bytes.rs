//! Byte codec primitives (spec §4.1): bounds-checked little-endian reads
//! and writes, plus length-prefixed strings/byte arrays.
//!
//! Grounded on `hf2`'s use of `scroll::Pread`/`Pwrite` for wire decoding,
//! generalized into free functions so every device codec module (§4.6-
//! §4.12) shares one bounds-checking discipline instead of re-deriving
//! `ctx::TryFromCtx` per struct.

use scroll::{Pread, Pwrite, LE};

use crate::error::DecodeError;

fn oob(offset: usize, wanted: usize, len: usize) -> DecodeError {
    DecodeError::OutOfBounds {
        offset,
        wanted,
        len,
    }
}

pub fn read_u8(buf: &[u8], offset: usize) -> Result<(u8, usize), DecodeError> {
    buf.pread_with::<u8>(offset, LE)
        .map(|v| (v, offset + 1))
        .map_err(|_| oob(offset, 1, buf.len()))
}

pub fn read_u16le(buf: &[u8], offset: usize) -> Result<(u16, usize), DecodeError> {
    buf.pread_with::<u16>(offset, LE)
        .map(|v| (v, offset + 2))
        .map_err(|_| oob(offset, 2, buf.len()))
}

pub fn read_u32le(buf: &[u8], offset: usize) -> Result<(u32, usize), DecodeError> {
    buf.pread_with::<u32>(offset, LE)
        .map(|v| (v, offset + 4))
        .map_err(|_| oob(offset, 4, buf.len()))
}

pub fn read_u64le(buf: &[u8], offset: usize) -> Result<(u64, usize), DecodeError> {
    buf.pread_with::<u64>(offset, LE)
        .map(|v| (v, offset + 8))
        .map_err(|_| oob(offset, 8, buf.len()))
}

/// Read a `u16`-length-prefixed byte slice (`lp_u16` in the glossary).
pub fn read_lp_u16_bytes(buf: &[u8], offset: usize) -> Result<(&[u8], usize), DecodeError> {
    let (len, mut off) = read_u16le(buf, offset)?;
    let len = len as usize;
    if off + len > buf.len() {
        return Err(DecodeError::LengthPrefixOutOfBounds {
            declared: len,
            available: buf.len().saturating_sub(off),
        });
    }
    let slice = &buf[off..off + len];
    off += len;
    Ok((slice, off))
}

/// Read a `u16`-length-prefixed UTF-8 string, lossily decoding invalid
/// sequences (spec §4.1).
pub fn read_lp_u16_str(buf: &[u8], offset: usize) -> Result<(String, usize), DecodeError> {
    let (raw, off) = read_lp_u16_bytes(buf, offset)?;
    Ok((String::from_utf8_lossy(raw).into_owned(), off))
}

/// Read a `u8`-length-prefixed byte slice, used by filesystem names
/// (spec §3 invariants: "file-system names use u8 length").
pub fn read_lp_u8_bytes(buf: &[u8], offset: usize) -> Result<(&[u8], usize), DecodeError> {
    let (len, mut off) = read_u8(buf, offset)?;
    let len = len as usize;
    if off + len > buf.len() {
        return Err(DecodeError::LengthPrefixOutOfBounds {
            declared: len,
            available: buf.len().saturating_sub(off),
        });
    }
    let slice = &buf[off..off + len];
    off += len;
    Ok((slice, off))
}

pub fn read_lp_u8_str(buf: &[u8], offset: usize) -> Result<(String, usize), DecodeError> {
    let (raw, off) = read_lp_u8_bytes(buf, offset)?;
    Ok((String::from_utf8_lossy(raw).into_owned(), off))
}

pub fn write_u8(out: &mut Vec<u8>, v: u8) {
    out.push(v);
}

pub fn write_u16le(out: &mut Vec<u8>, v: u16) {
    out.extend_from_slice(&v.to_le_bytes());
}

pub fn write_u32le(out: &mut Vec<u8>, v: u32) {
    out.extend_from_slice(&v.to_le_bytes());
}

pub fn write_u64le(out: &mut Vec<u8>, v: u64) {
    out.extend_from_slice(&v.to_le_bytes());
}

/// Append a `u16`-length-prefixed byte slice. Panics if `data` exceeds
/// `u16::MAX` -- callers validate lengths before building a request
/// (spec §4.1: "bounds checks are mandatory on every read", and on the
/// write side every codec module validates sizes before calling this).
pub fn write_lp_u16_bytes(out: &mut Vec<u8>, data: &[u8]) {
    assert!(data.len() <= u16::MAX as usize, "lp_u16 field too large");
    write_u16le(out, data.len() as u16);
    out.extend_from_slice(data);
}

pub fn write_lp_u16_str(out: &mut Vec<u8>, s: &str) {
    write_lp_u16_bytes(out, s.as_bytes());
}

pub fn write_lp_u8_bytes(out: &mut Vec<u8>, data: &[u8]) {
    assert!(data.len() <= u8::MAX as usize, "lp_u8 field too large");
    write_u8(out, data.len() as u8);
    out.extend_from_slice(data);
}

pub fn write_lp_u8_str(out: &mut Vec<u8>, s: &str) {
    write_lp_u8_bytes(out, s.as_bytes());
}

/// A small bounds-checked cursor for sequential reads, used by codec
/// modules that decode many fields in a row so callers don't have to
/// thread the offset by hand.
pub struct Reader<'a> {
    buf: &'a [u8],
    offset: usize,
}

impl<'a> Reader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Reader { buf, offset: 0 }
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.offset
    }

    pub fn u8(&mut self) -> Result<u8, DecodeError> {
        let (v, off) = read_u8(self.buf, self.offset)?;
        self.offset = off;
        Ok(v)
    }

    pub fn u16(&mut self) -> Result<u16, DecodeError> {
        let (v, off) = read_u16le(self.buf, self.offset)?;
        self.offset = off;
        Ok(v)
    }

    pub fn u32(&mut self) -> Result<u32, DecodeError> {
        let (v, off) = read_u32le(self.buf, self.offset)?;
        self.offset = off;
        Ok(v)
    }

    pub fn u64(&mut self) -> Result<u64, DecodeError> {
        let (v, off) = read_u64le(self.buf, self.offset)?;
        self.offset = off;
        Ok(v)
    }

    pub fn lp_u16_bytes(&mut self) -> Result<&'a [u8], DecodeError> {
        let (v, off) = read_lp_u16_bytes(self.buf, self.offset)?;
        self.offset = off;
        Ok(v)
    }

    pub fn lp_u16_str(&mut self) -> Result<String, DecodeError> {
        let (v, off) = read_lp_u16_str(self.buf, self.offset)?;
        self.offset = off;
        Ok(v)
    }

    pub fn lp_u8_bytes(&mut self) -> Result<&'a [u8], DecodeError> {
        let (v, off) = read_lp_u8_bytes(self.buf, self.offset)?;
        self.offset = off;
        Ok(v)
    }

    pub fn lp_u8_str(&mut self) -> Result<String, DecodeError> {
        let (v, off) = read_lp_u8_str(self.buf, self.offset)?;
        self.offset = off;
        Ok(v)
    }

    /// Take `n` raw bytes.
    pub fn take(&mut self, n: usize) -> Result<&'a [u8], DecodeError> {
        if self.offset + n > self.buf.len() {
            return Err(oob(self.offset, n, self.buf.len()));
        }
        let slice = &self.buf[self.offset..self.offset + n];
        self.offset += n;
        Ok(slice)
    }

    /// Require the reader be fully consumed; otherwise the payload had
    /// trailing garbage.
    pub fn finish(self) -> Result<(), DecodeError> {
        if self.offset != self.buf.len() {
            return Err(DecodeError::TrailingBytes {
                extra: self.buf.len() - self.offset,
            });
        }
        Ok(())
    }
}

/// Convenience used by every codec's request builder: append a u8
/// version field. Kept as a function (rather than inlined) so version
/// gating reads the same way at every call site.
pub fn write_version(out: &mut Vec<u8>, version: u8) {
    write_u8(out, version);
}

/// Check and consume a leading version byte (spec §3 invariants:
/// "Version byte is always the first byte of a request or response
/// payload and must equal 1").
pub fn read_version(reader: &mut Reader, expected: u8) -> Result<(), DecodeError> {
    let got = reader.u8()?;
    if got != expected {
        return Err(DecodeError::BadVersion {
            got,
            expected,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_integers() {
        let mut out = Vec::new();
        write_u8(&mut out, 0xAB);
        write_u16le(&mut out, 0x1234);
        write_u32le(&mut out, 0xDEADBEEF);
        write_u64le(&mut out, 0x0102030405060708);

        let mut r = Reader::new(&out);
        assert_eq!(r.u8().unwrap(), 0xAB);
        assert_eq!(r.u16().unwrap(), 0x1234);
        assert_eq!(r.u32().unwrap(), 0xDEADBEEF);
        assert_eq!(r.u64().unwrap(), 0x0102030405060708);
        r.finish().unwrap();
    }

    #[test]
    fn lp_u16_round_trip() {
        let mut out = Vec::new();
        write_lp_u16_str(&mut out, "hello");
        let mut r = Reader::new(&out);
        assert_eq!(r.lp_u16_str().unwrap(), "hello");
        r.finish().unwrap();
    }

    #[test]
    fn out_of_bounds_is_rejected() {
        let buf = [0u8; 1];
        assert!(read_u16le(&buf, 0).is_err());
    }

    #[test]
    fn length_prefix_exceeding_remaining_is_rejected() {
        // Declares a 10-byte string but only 2 bytes follow.
        let buf = [0x0A, 0x00, b'h', b'i'];
        assert!(read_lp_u16_bytes(&buf, 0).is_err());
    }

    #[test]
    fn trailing_bytes_are_rejected() {
        let buf = [1u8, 2, 3];
        let mut r = Reader::new(&buf);
        let _ = r.u8().unwrap();
        assert!(r.finish().is_err());
    }

    #[test]
    fn version_gate_rejects_mismatch() {
        let buf = [2u8];
        let mut r = Reader::new(&buf);
        let err = read_version(&mut r, 1).unwrap_err();
        assert_eq!(err, DecodeError::BadVersion { got: 2, expected: 1 });
    }
}
