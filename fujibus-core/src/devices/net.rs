//! Network subdevice (spec §4.7): HTTP-shaped Open/Read/Write/Close/Info
//! over a device-issued handle, with GET/HEAD/POST/PUT orchestration.
//!
//! Ported from `original_source/py/fujinet_tools/net.py` and
//! `netproto.py`, but following spec.md's *latest* semantics where the
//! drafts disagree: Info carries no `max_header_bytes` field -- the
//! response-header allowlist is declared once, at Open.

use std::io::Write as IoWrite;
use std::time::{Duration, Instant};

use crate::bytes::{self, Reader};
use crate::device_id::NETWORK;
use crate::devices::PROTOCOL_VERSION;
use crate::error::ProtocolError;
use crate::session::{self, BusSession};
use crate::transport::Transport;

pub const CMD_OPEN: u8 = 1;
pub const CMD_READ: u8 = 2;
pub const CMD_WRITE: u8 = 3;
pub const CMD_CLOSE: u8 = 4;
pub const CMD_INFO: u8 = 5;

/// Idle watchdog for `get`/`tcp_recv_some` convenience loops (spec
/// §4.7/§4.8: "idle watchdog ~250 ms of no new data").
pub const IDLE_WATCHDOG: Duration = Duration::from_millis(250);

/// Default response-header allowlist seeded by `--show-headers` with no
/// explicit `--resp-header` flags (spec §4.7).
pub const DEFAULT_HEADER_ALLOWLIST: &[&str] =
    &["Server", "Content-Type", "Content-Length", "Location", "ETag", "Last-Modified"];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Method {
    Get = 1,
    Post = 2,
    Put = 3,
    Delete = 4,
    Head = 5,
}

pub const FLAG_TLS: u8 = 0x01;
pub const FLAG_FOLLOW_REDIRECTS: u8 = 0x02;

/// Build an Open request payload (spec §4.7): method, flags, url, request
/// headers, a body-length hint, and the allowlist of response headers the
/// caller wants back from a later Info.
pub fn build_open_request(
    method: Method,
    flags: u8,
    url: &str,
    headers: &[(String, String)],
    body_len_hint: u32,
    response_headers: &[String],
) -> Vec<u8> {
    let mut out = Vec::new();
    bytes::write_version(&mut out, PROTOCOL_VERSION);
    bytes::write_u8(&mut out, method as u8);
    bytes::write_u8(&mut out, flags);
    bytes::write_lp_u16_str(&mut out, url);
    bytes::write_u16le(&mut out, headers.len() as u16);
    for (k, v) in headers {
        bytes::write_lp_u16_str(&mut out, k);
        bytes::write_lp_u16_str(&mut out, v);
    }
    bytes::write_u32le(&mut out, body_len_hint);
    bytes::write_u16le(&mut out, response_headers.len() as u16);
    for name in response_headers {
        bytes::write_lp_u16_str(&mut out, name);
    }
    out
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OpenResult {
    pub accepted: bool,
    pub needs_body_write: bool,
    pub handle: u16,
}

fn decode_open_response(payload: &[u8]) -> Result<OpenResult, ProtocolError> {
    let mut r = Reader::new(payload);
    bytes::read_version(&mut r, PROTOCOL_VERSION)?;
    let flags = r.u8()?;
    let _reserved = r.u16()?;
    let handle = r.u16()?;
    r.finish()?;
    Ok(OpenResult {
        accepted: flags & 0x01 != 0,
        needs_body_write: flags & 0x02 != 0,
        handle,
    })
}

pub fn open<T: Transport>(
    session: &mut BusSession<T>,
    method: Method,
    flags: u8,
    url: &str,
    headers: &[(String, String)],
    body_len_hint: u32,
    response_headers: &[String],
    timeout: Duration,
) -> Result<OpenResult, ProtocolError> {
    let payload = build_open_request(method, flags, url, headers, body_len_hint, response_headers);
    let pkt = session.send_retrying(NETWORK, CMD_OPEN, &payload, timeout)?;
    session::require_ok(&pkt)?;
    decode_open_response(&pkt.payload)
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InfoResult {
    pub handle: u16,
    pub http_status: Option<u16>,
    pub content_length: Option<u64>,
    pub headers_included: bool,
    pub header_bytes: Vec<u8>,
}

fn decode_info_response(payload: &[u8]) -> Result<InfoResult, ProtocolError> {
    let mut r = Reader::new(payload);
    bytes::read_version(&mut r, PROTOCOL_VERSION)?;
    let flags = r.u8()?;
    let _reserved = r.u16()?;
    let handle = r.u16()?;
    let http_status = r.u16()?;
    let content_length = r.u64()?;
    let header_bytes = r.lp_u16_bytes()?.to_vec();
    r.finish()?;

    let headers_included = flags & 0x01 != 0;
    let has_content_length = flags & 0x02 != 0;
    let has_http_status = flags & 0x04 != 0;
    Ok(InfoResult {
        handle,
        http_status: if has_http_status { Some(http_status) } else { None },
        content_length: if has_content_length { Some(content_length) } else { None },
        headers_included,
        header_bytes,
    })
}

pub fn info<T: Transport>(
    session: &mut BusSession<T>,
    handle: u16,
    timeout: Duration,
) -> Result<InfoResult, ProtocolError> {
    let mut payload = Vec::new();
    bytes::write_version(&mut payload, PROTOCOL_VERSION);
    bytes::write_u16le(&mut payload, handle);
    let pkt = session.send_retrying(NETWORK, CMD_INFO, &payload, timeout)?;
    session::require_ok(&pkt)?;
    decode_info_response(&pkt.payload)
}

/// Poll Info until it stops reporting `NotReady`, or `deadline` passes
/// (spec §4.7: "optional Info (poll while status=NotReady for ≤
/// info_retries)").
pub fn info_until_ready<T: Transport>(
    session: &mut BusSession<T>,
    handle: u16,
    per_attempt_timeout: Duration,
    max_retries: u32,
) -> Result<InfoResult, ProtocolError> {
    let mut attempts = 0;
    loop {
        match info(session, handle, per_attempt_timeout) {
            Ok(result) => return Ok(result),
            Err(ProtocolError::DeviceStatus(code)) if code.is_transient() && attempts < max_retries => {
                attempts += 1;
                continue;
            }
            Err(e) => return Err(e),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NetReadChunk {
    pub eof: bool,
    pub truncated: bool,
    pub offset: u32,
    pub data: Vec<u8>,
}

fn decode_read_response(payload: &[u8]) -> Result<NetReadChunk, ProtocolError> {
    let mut r = Reader::new(payload);
    bytes::read_version(&mut r, PROTOCOL_VERSION)?;
    let flags = r.u8()?;
    let _reserved = r.u16()?;
    let _handle = r.u16()?;
    let offset = r.u32()?;
    let data_len = r.u16()?;
    let data = r.take(data_len as usize)?.to_vec();
    r.finish()?;
    Ok(NetReadChunk {
        eof: flags & 0x01 != 0,
        truncated: flags & 0x02 != 0,
        offset,
        data,
    })
}

pub fn read<T: Transport>(
    session: &mut BusSession<T>,
    handle: u16,
    offset: u32,
    max_bytes: u16,
    timeout: Duration,
) -> Result<NetReadChunk, ProtocolError> {
    let max_bytes = max_bytes.max(1);
    let mut payload = Vec::new();
    bytes::write_version(&mut payload, PROTOCOL_VERSION);
    bytes::write_u16le(&mut payload, handle);
    bytes::write_u32le(&mut payload, offset);
    bytes::write_u16le(&mut payload, max_bytes);
    let pkt = session.send_retrying(NETWORK, CMD_READ, &payload, timeout)?;
    session::require_ok(&pkt)?;
    decode_read_response(&pkt.payload)
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NetWriteAck {
    pub offset: u32,
    pub written: u16,
}

fn decode_write_response(payload: &[u8]) -> Result<NetWriteAck, ProtocolError> {
    let mut r = Reader::new(payload);
    bytes::read_version(&mut r, PROTOCOL_VERSION)?;
    let _flags = r.u8()?;
    let _reserved = r.u16()?;
    let _handle = r.u16()?;
    let offset = r.u32()?;
    let written = r.u16()?;
    r.finish()?;
    Ok(NetWriteAck { offset, written })
}

pub fn write<T: Transport>(
    session: &mut BusSession<T>,
    handle: u16,
    offset: u32,
    data: &[u8],
    timeout: Duration,
) -> Result<NetWriteAck, ProtocolError> {
    let mut payload = Vec::new();
    bytes::write_version(&mut payload, PROTOCOL_VERSION);
    bytes::write_u16le(&mut payload, handle);
    bytes::write_u32le(&mut payload, offset);
    bytes::write_lp_u16_bytes(&mut payload, data);
    let pkt = session.send_retrying(NETWORK, CMD_WRITE, &payload, timeout)?;
    session::require_ok(&pkt)?;
    decode_write_response(&pkt.payload)
}

pub fn close<T: Transport>(session: &mut BusSession<T>, handle: u16, timeout: Duration) -> Result<(), ProtocolError> {
    let mut payload = Vec::new();
    bytes::write_version(&mut payload, PROTOCOL_VERSION);
    bytes::write_u16le(&mut payload, handle);
    let pkt = session.send_retrying(NETWORK, CMD_CLOSE, &payload, timeout)?;
    session::require_ok(&pkt)
}

/// Read the whole body via the idle-watchdog'd `Read` loop, streaming
/// into `sink` (spec §4.7's GET orchestration, minus the leading Open).
fn read_body<T: Transport, W: IoWrite>(
    session: &mut BusSession<T>,
    handle: u16,
    chunk_size: u16,
    timeout: Duration,
    sink: &mut W,
) -> Result<u64, ProtocolError> {
    let mut offset = 0u32;
    let mut total = 0u64;
    let mut last_progress = Instant::now();
    loop {
        let chunk = read(session, handle, offset, chunk_size, timeout)?;
        if !chunk.data.is_empty() {
            sink.write_all(&chunk.data)
                .map_err(|e| ProtocolError::orchestration(format!("write to sink failed: {}", e)))?;
            offset = offset.saturating_add(chunk.data.len() as u32);
            total += chunk.data.len() as u64;
            last_progress = Instant::now();
        }
        if chunk.eof {
            break;
        }
        if last_progress.elapsed() > IDLE_WATCHDOG {
            return Err(ProtocolError::orchestration("idle watchdog: no data from network read".to_string()));
        }
    }
    Ok(total)
}

/// `GET` orchestration (spec §4.7): Open(GET) -> optional Info while
/// NotReady -> Read loop with idle watchdog -> best-effort Close.
pub fn get<T: Transport, W: IoWrite>(
    session: &mut BusSession<T>,
    url: &str,
    headers: &[(String, String)],
    response_headers: &[String],
    chunk_size: u16,
    timeout: Duration,
    sink: &mut W,
) -> Result<(OpenResult, Option<InfoResult>, u64), ProtocolError> {
    let opened = open(session, Method::Get, 0, url, headers, 0, response_headers, timeout)?;
    let info_result = if opened.accepted {
        info_until_ready(session, opened.handle, Duration::from_millis(50), 10).ok()
    } else {
        None
    };

    let body_result = if opened.accepted {
        read_body(session, opened.handle, chunk_size, timeout, sink)
    } else {
        Ok(0)
    };

    let _ = close(session, opened.handle, timeout);
    Ok((opened, info_result, body_result?))
}

/// `HEAD` orchestration (spec §4.7): Open(HEAD) -> Info (retry NotReady)
/// -> Close.
pub fn head<T: Transport>(
    session: &mut BusSession<T>,
    url: &str,
    headers: &[(String, String)],
    response_headers: &[String],
    timeout: Duration,
) -> Result<(OpenResult, InfoResult), ProtocolError> {
    let opened = open(session, Method::Head, 0, url, headers, 0, response_headers, timeout)?;
    let info_result = info_until_ready(session, opened.handle, Duration::from_millis(50), 10);
    let _ = close(session, opened.handle, timeout);
    Ok((opened, info_result?))
}

/// `POST`/`PUT` orchestration (spec §4.7): Open(method, body_len_hint) ->
/// if accepted+needs_body_write, chunked Write(body) -> optional Info ->
/// optional Read body -> Close.
pub fn send<T: Transport, W: IoWrite>(
    session: &mut BusSession<T>,
    method: Method,
    url: &str,
    headers: &[(String, String)],
    body: &[u8],
    response_headers: &[String],
    chunk_size: u16,
    timeout: Duration,
    body_sink: Option<&mut W>,
) -> Result<(OpenResult, Option<InfoResult>), ProtocolError> {
    let opened = open(
        session,
        method,
        0,
        url,
        headers,
        body.len() as u32,
        response_headers,
        timeout,
    )?;

    if opened.accepted && opened.needs_body_write {
        let mut written = 0usize;
        while written < body.len() {
            let end = (written + chunk_size as usize).min(body.len());
            let ack = write(session, opened.handle, written as u32, &body[written..end], timeout)?;
            if ack.written == 0 {
                return Err(ProtocolError::orchestration(format!(
                    "network write stalled at offset {}",
                    written
                )));
            }
            written += ack.written as usize;
        }
    }

    let info_result = if opened.accepted {
        info_until_ready(session, opened.handle, Duration::from_millis(50), 10).ok()
    } else {
        None
    };

    if let Some(sink) = body_sink {
        if opened.accepted {
            let _ = read_body(session, opened.handle, chunk_size, timeout, sink);
        }
    }

    let _ = close(session, opened.handle, timeout);
    Ok((opened, info_result))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_response_decodes_accepted_and_needs_body_write() {
        let mut payload = Vec::new();
        bytes::write_version(&mut payload, PROTOCOL_VERSION);
        bytes::write_u8(&mut payload, 0x03);
        bytes::write_u16le(&mut payload, 0);
        bytes::write_u16le(&mut payload, 7);

        let result = decode_open_response(&payload).unwrap();
        assert!(result.accepted);
        assert!(result.needs_body_write);
        assert_eq!(result.handle, 7);
    }

    #[test]
    fn info_response_omits_absent_optional_fields() {
        let mut payload = Vec::new();
        bytes::write_version(&mut payload, PROTOCOL_VERSION);
        bytes::write_u8(&mut payload, 0x01); // headers_included only
        bytes::write_u16le(&mut payload, 0);
        bytes::write_u16le(&mut payload, 1); // handle
        bytes::write_u16le(&mut payload, 0); // http_status (absent)
        bytes::write_u64le(&mut payload, 0); // content_length (absent)
        bytes::write_lp_u16_bytes(&mut payload, b"Server: test\r\n");

        let info = decode_info_response(&payload).unwrap();
        assert!(info.headers_included);
        assert_eq!(info.http_status, None);
        assert_eq!(info.content_length, None);
        assert_eq!(info.header_bytes, b"Server: test\r\n");
    }

    #[test]
    fn info_response_includes_present_optional_fields() {
        let mut payload = Vec::new();
        bytes::write_version(&mut payload, PROTOCOL_VERSION);
        bytes::write_u8(&mut payload, 0x06); // has_content_length | has_http_status
        bytes::write_u16le(&mut payload, 0);
        bytes::write_u16le(&mut payload, 1);
        bytes::write_u16le(&mut payload, 200);
        bytes::write_u64le(&mut payload, 1234);
        bytes::write_lp_u16_bytes(&mut payload, b"");

        let info = decode_info_response(&payload).unwrap();
        assert_eq!(info.http_status, Some(200));
        assert_eq!(info.content_length, Some(1234));
    }
}
