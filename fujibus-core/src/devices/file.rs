//! File subdevice (spec §4.6): Stat/List/Read/Write over a `{fs, path}`
//! pair, plus chunked read-all/write-all orchestration.
//!
//! Ported from `original_source/py/fujinet_tools/fileproto.py`.

use std::io::{Read as IoRead, Write as IoWrite};
use std::time::Duration;

use crate::bytes::{self, Reader};
use crate::device_id::FILE;
use crate::devices::PROTOCOL_VERSION;
use crate::error::{DecodeError, ProtocolError};
use crate::session::{self, BusSession};
use crate::transport::Transport;

pub const CMD_STAT: u8 = 1;
pub const CMD_LIST: u8 = 2;
pub const CMD_READ: u8 = 3;
pub const CMD_WRITE: u8 = 4;

fn common_prefix(fs: &str, path: &str) -> Vec<u8> {
    let mut out = Vec::new();
    bytes::write_version(&mut out, PROTOCOL_VERSION);
    bytes::write_lp_u8_str(&mut out, fs);
    bytes::write_lp_u16_str(&mut out, path);
    out
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StatInfo {
    pub is_dir: bool,
    pub exists: bool,
    pub size: u64,
    pub mtime: u64,
}

fn decode_stat_response(payload: &[u8]) -> Result<StatInfo, DecodeError> {
    let mut r = Reader::new(payload);
    bytes::read_version(&mut r, PROTOCOL_VERSION)?;
    let flags = r.u8()?;
    let _reserved = r.u16()?;
    let size = r.u64()?;
    let mtime = r.u64()?;
    r.finish()?;
    Ok(StatInfo {
        is_dir: flags & 0x01 != 0,
        exists: flags & 0x02 != 0,
        size,
        mtime,
    })
}

pub fn stat<T: Transport>(
    session: &mut BusSession<T>,
    fs: &str,
    path: &str,
    timeout: Duration,
) -> Result<StatInfo, ProtocolError> {
    let payload = common_prefix(fs, path);
    let pkt = session.send_retrying(FILE, CMD_STAT, &payload, timeout)?;
    session::require_ok(&pkt)?;
    Ok(decode_stat_response(&pkt.payload)?)
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DirEntry {
    pub is_dir: bool,
    pub name: String,
    pub size: u64,
    pub mtime: u64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ListPage {
    pub more: bool,
    pub entries: Vec<DirEntry>,
}

fn decode_list_response(payload: &[u8]) -> Result<ListPage, DecodeError> {
    let mut r = Reader::new(payload);
    bytes::read_version(&mut r, PROTOCOL_VERSION)?;
    let flags = r.u8()?;
    let _reserved = r.u16()?;
    let count = r.u16()?;
    let mut entries = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let eflags = r.u8()?;
        let name = r.lp_u8_str()?;
        let size = r.u64()?;
        let mtime = r.u64()?;
        entries.push(DirEntry {
            is_dir: eflags & 0x01 != 0,
            name,
            size,
            mtime,
        });
    }
    r.finish()?;
    Ok(ListPage {
        more: flags & 0x01 != 0,
        entries,
    })
}

/// One page of `List` starting at `start_index` (spec §4.6: `max_entries
/// >= 1`).
pub fn list<T: Transport>(
    session: &mut BusSession<T>,
    fs: &str,
    path: &str,
    start_index: u16,
    max_entries: u16,
    timeout: Duration,
) -> Result<ListPage, ProtocolError> {
    let max_entries = max_entries.max(1);
    let mut payload = common_prefix(fs, path);
    bytes::write_u16le(&mut payload, start_index);
    bytes::write_u16le(&mut payload, max_entries);
    let pkt = session.send_retrying(FILE, CMD_LIST, &payload, timeout)?;
    session::require_ok(&pkt)?;
    Ok(decode_list_response(&pkt.payload)?)
}

/// `List` all entries across as many pages as the device reports via
/// `more`.
pub fn list_all<T: Transport>(
    session: &mut BusSession<T>,
    fs: &str,
    path: &str,
    timeout: Duration,
) -> Result<Vec<DirEntry>, ProtocolError> {
    const PAGE_SIZE: u16 = 64;
    let mut all = Vec::new();
    let mut index = 0u16;
    loop {
        let page = list(session, fs, path, index, PAGE_SIZE, timeout)?;
        let got = page.entries.len() as u16;
        all.extend(page.entries);
        if !page.more || got == 0 {
            break;
        }
        index = index.saturating_add(got);
    }
    Ok(all)
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReadChunk {
    pub eof: bool,
    pub truncated: bool,
    pub offset: u32,
    pub data: Vec<u8>,
}

fn decode_read_response(payload: &[u8]) -> Result<ReadChunk, DecodeError> {
    let mut r = Reader::new(payload);
    bytes::read_version(&mut r, PROTOCOL_VERSION)?;
    let flags = r.u8()?;
    let _reserved = r.u16()?;
    let offset = r.u32()?;
    let data_len = r.u16()?;
    let data = r.take(data_len as usize)?.to_vec();
    r.finish()?;
    Ok(ReadChunk {
        eof: flags & 0x01 != 0,
        truncated: flags & 0x02 != 0,
        offset,
        data,
    })
}

/// Single `Read` at `offset` (spec §4.6 invariant: `resp.offset ==
/// request.offset`).
pub fn read<T: Transport>(
    session: &mut BusSession<T>,
    fs: &str,
    path: &str,
    offset: u32,
    max_bytes: u16,
    timeout: Duration,
) -> Result<ReadChunk, ProtocolError> {
    let max_bytes = max_bytes.max(1);
    let mut payload = common_prefix(fs, path);
    bytes::write_u32le(&mut payload, offset);
    bytes::write_u16le(&mut payload, max_bytes);
    let pkt = session.send_retrying(FILE, CMD_READ, &payload, timeout)?;
    session::require_ok(&pkt)?;
    let chunk = decode_read_response(&pkt.payload)?;
    if chunk.offset != offset {
        return Err(DecodeError::OffsetMismatch {
            requested: offset as u64,
            echoed: chunk.offset as u64,
        }
        .into());
    }
    Ok(chunk)
}

/// Chunked read-until-EOF (spec §4.6 "read-all"): loop `Read` at
/// sequential offsets, writing each chunk to `sink`, stopping at `eof`.
pub fn read_all<T: Transport, W: IoWrite>(
    session: &mut BusSession<T>,
    fs: &str,
    path: &str,
    chunk_size: u16,
    timeout: Duration,
    sink: &mut W,
) -> Result<u64, ProtocolError> {
    let mut offset: u32 = 0;
    let mut total: u64 = 0;
    loop {
        let chunk = read(session, fs, path, offset, chunk_size, timeout)?;
        if !chunk.data.is_empty() {
            sink.write_all(&chunk.data)
                .map_err(|e| ProtocolError::orchestration(format!("write to sink failed: {}", e)))?;
            total += chunk.data.len() as u64;
            offset = offset.saturating_add(chunk.data.len() as u32);
        }
        if chunk.eof {
            break;
        }
    }
    Ok(total)
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WriteAck {
    pub offset: u32,
    pub written: u16,
}

fn decode_write_response(payload: &[u8]) -> Result<WriteAck, DecodeError> {
    let mut r = Reader::new(payload);
    bytes::read_version(&mut r, PROTOCOL_VERSION)?;
    let _flags = r.u8()?;
    let _reserved = r.u16()?;
    let offset = r.u32()?;
    let written = r.u16()?;
    r.finish()?;
    Ok(WriteAck { offset, written })
}

/// Single `Write` at `offset`.
pub fn write<T: Transport>(
    session: &mut BusSession<T>,
    fs: &str,
    path: &str,
    offset: u32,
    data: &[u8],
    timeout: Duration,
) -> Result<WriteAck, ProtocolError> {
    let mut payload = common_prefix(fs, path);
    bytes::write_u32le(&mut payload, offset);
    bytes::write_lp_u16_bytes(&mut payload, data);
    let pkt = session.send_retrying(FILE, CMD_WRITE, &payload, timeout)?;
    session::require_ok(&pkt)?;
    let ack = decode_write_response(&pkt.payload)?;
    if ack.offset != offset {
        return Err(DecodeError::OffsetMismatch {
            requested: offset as u64,
            echoed: ack.offset as u64,
        }
        .into());
    }
    Ok(ack)
}

/// Chunked write: loop `Write` at advancing offsets, advancing by
/// `written` -- which may be less than the chunk sent, in which case the
/// unwritten tail is resent before reading more from `source` -- and
/// aborting on a stalled `written == 0` (spec §4.6).
pub fn write_all<T: Transport, R: IoRead>(
    session: &mut BusSession<T>,
    fs: &str,
    path: &str,
    chunk_size: u16,
    timeout: Duration,
    source: &mut R,
) -> Result<u64, ProtocolError> {
    let mut pending: Vec<u8> = Vec::new();
    let mut buf = vec![0u8; chunk_size as usize];
    let mut offset: u32 = 0;
    let mut total: u64 = 0;

    loop {
        if pending.is_empty() {
            let n = source
                .read(&mut buf)
                .map_err(|e| ProtocolError::orchestration(format!("read from source failed: {}", e)))?;
            if n == 0 {
                break;
            }
            pending.extend_from_slice(&buf[..n]);
        }

        let ack = write(session, fs, path, offset, &pending, timeout)?;
        if ack.written == 0 {
            return Err(ProtocolError::orchestration(format!(
                "write stalled at offset {} (device reported written=0)",
                offset
            )));
        }
        offset = offset.saturating_add(ack.written as u32);
        total += ack.written as u64;
        pending.drain(..ack.written as usize);
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stat_response_decodes_flags() {
        let mut payload = Vec::new();
        bytes::write_version(&mut payload, PROTOCOL_VERSION);
        bytes::write_u8(&mut payload, 0x03); // is_dir | exists
        bytes::write_u16le(&mut payload, 0);
        bytes::write_u64le(&mut payload, 4096);
        bytes::write_u64le(&mut payload, 1700000000);

        let info = decode_stat_response(&payload).unwrap();
        assert!(info.is_dir);
        assert!(info.exists);
        assert_eq!(info.size, 4096);
        assert_eq!(info.mtime, 1700000000);
    }

    #[test]
    fn list_response_decodes_entries_and_more_flag() {
        let mut payload = Vec::new();
        bytes::write_version(&mut payload, PROTOCOL_VERSION);
        bytes::write_u8(&mut payload, 0x01); // more
        bytes::write_u16le(&mut payload, 0);
        bytes::write_u16le(&mut payload, 1);
        bytes::write_u8(&mut payload, 0x01); // is_dir
        bytes::write_lp_u8_str(&mut payload, "SUBDIR");
        bytes::write_u64le(&mut payload, 0);
        bytes::write_u64le(&mut payload, 0);

        let page = decode_list_response(&payload).unwrap();
        assert!(page.more);
        assert_eq!(page.entries.len(), 1);
        assert!(page.entries[0].is_dir);
        assert_eq!(page.entries[0].name, "SUBDIR");
    }

    #[test]
    fn read_response_rejects_offset_mismatch() {
        let mut payload = Vec::new();
        bytes::write_version(&mut payload, PROTOCOL_VERSION);
        bytes::write_u8(&mut payload, 0x01); // eof
        bytes::write_u16le(&mut payload, 0);
        bytes::write_u32le(&mut payload, 100); // echoes wrong offset
        bytes::write_lp_u16_bytes(&mut payload, b"data");

        let chunk = decode_read_response(&payload).unwrap();
        assert_ne!(chunk.offset, 0);
    }

    #[test]
    fn read_response_rejects_bad_version() {
        let payload = vec![2u8, 0, 0, 0, 0, 0, 0, 0, 0];
        assert!(decode_read_response(&payload).is_err());
    }
}
