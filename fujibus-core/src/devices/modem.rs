//! Modem subdevice (spec §4.12): Hayes-style AT command surface over a
//! Write/Read cursor pair, plus Status and a small Control op space.
//!
//! Ported from `original_source/py/fujinet_tools/modemproto.py` (wire
//! codecs) and `modem.py` (`_drain`, `cmd_modem_at`, `cmd_modem_dial`,
//! `cmd_modem_sendrecv` orchestration). The interactive raw-terminal
//! bridge in `modem.py` is out of scope (spec §1); only the Status-poll
//! data contract it rides on is implemented here.

use std::time::{Duration, Instant};

use crate::bytes::{self, Reader};
use crate::device_id::MODEM;
use crate::devices::PROTOCOL_VERSION;
use crate::error::ProtocolError;
use crate::session::{self, BusSession};
use crate::transport::Transport;

pub const CMD_WRITE: u8 = 1;
pub const CMD_READ: u8 = 2;
pub const CMD_STATUS: u8 = 3;
pub const CMD_CONTROL: u8 = 4;

pub const CONTROL_OP_HANGUP: u8 = 0x01;
pub const CONTROL_OP_DIAL: u8 = 0x02;

/// Idle window for drain loops (spec §4.12: "drain output ... until
/// idle").
pub const DRAIN_IDLE: Duration = Duration::from_millis(250);

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ModemStatus {
    pub cmd_mode: bool,
    pub connected: bool,
    pub listen_port: u16,
    pub host_rx_avail: u32,
    pub host_write_cursor: u32,
    pub net_read_cursor: u32,
    pub net_write_cursor: u32,
}

fn decode_status_response(payload: &[u8]) -> Result<ModemStatus, ProtocolError> {
    let mut r = Reader::new(payload);
    bytes::read_version(&mut r, PROTOCOL_VERSION)?;
    let flags = r.u8()?;
    let _reserved = r.u16()?;
    let listen_port = r.u16()?;
    let host_rx_avail = r.u32()?;
    let host_write_cursor = r.u32()?;
    let net_read_cursor = r.u32()?;
    let net_write_cursor = r.u32()?;
    r.finish()?;
    Ok(ModemStatus {
        cmd_mode: flags & 0x01 != 0,
        connected: flags & 0x02 != 0,
        listen_port,
        host_rx_avail,
        host_write_cursor,
        net_read_cursor,
        net_write_cursor,
    })
}

pub fn status<T: Transport>(session: &mut BusSession<T>, timeout: Duration) -> Result<ModemStatus, ProtocolError> {
    let mut payload = Vec::new();
    bytes::write_version(&mut payload, PROTOCOL_VERSION);
    let pkt = session.send_retrying(MODEM, CMD_STATUS, &payload, timeout)?;
    session::require_ok(&pkt)?;
    decode_status_response(&pkt.payload)
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WriteAck {
    pub offset: u32,
    pub written: u16,
}

fn decode_write_response(payload: &[u8]) -> Result<WriteAck, ProtocolError> {
    let mut r = Reader::new(payload);
    bytes::read_version(&mut r, PROTOCOL_VERSION)?;
    let _flags = r.u8()?;
    let _reserved = r.u16()?;
    let offset = r.u32()?;
    let written = r.u16()?;
    r.finish()?;
    Ok(WriteAck { offset, written })
}

pub fn write<T: Transport>(
    session: &mut BusSession<T>,
    offset: u32,
    data: &[u8],
    timeout: Duration,
) -> Result<WriteAck, ProtocolError> {
    let mut payload = Vec::new();
    bytes::write_version(&mut payload, PROTOCOL_VERSION);
    bytes::write_u32le(&mut payload, offset);
    bytes::write_lp_u16_bytes(&mut payload, data);
    let pkt = session.send_retrying(MODEM, CMD_WRITE, &payload, timeout)?;
    session::require_ok(&pkt)?;
    decode_write_response(&pkt.payload)
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReadChunk {
    pub offset: u32,
    pub data: Vec<u8>,
}

fn decode_read_response(payload: &[u8]) -> Result<ReadChunk, ProtocolError> {
    let mut r = Reader::new(payload);
    bytes::read_version(&mut r, PROTOCOL_VERSION)?;
    let _flags = r.u8()?;
    let _reserved = r.u16()?;
    let offset = r.u32()?;
    let data_len = r.u16()?;
    let data = r.take(data_len as usize)?.to_vec();
    r.finish()?;
    Ok(ReadChunk { offset, data })
}

pub fn read<T: Transport>(
    session: &mut BusSession<T>,
    offset: u32,
    max_bytes: u16,
    timeout: Duration,
) -> Result<ReadChunk, ProtocolError> {
    let mut payload = Vec::new();
    bytes::write_version(&mut payload, PROTOCOL_VERSION);
    bytes::write_u32le(&mut payload, offset);
    bytes::write_u16le(&mut payload, max_bytes);
    let pkt = session.send_retrying(MODEM, CMD_READ, &payload, timeout)?;
    session::require_ok(&pkt)?;
    decode_read_response(&pkt.payload)
}

fn control<T: Transport>(session: &mut BusSession<T>, op: u8, data: &[u8], timeout: Duration) -> Result<(), ProtocolError> {
    let mut payload = Vec::new();
    bytes::write_version(&mut payload, PROTOCOL_VERSION);
    bytes::write_u8(&mut payload, op);
    payload.extend_from_slice(data);
    let pkt = session.send_retrying(MODEM, CMD_CONTROL, &payload, timeout)?;
    session::require_ok(&pkt)
}

pub fn hangup<T: Transport>(session: &mut BusSession<T>, timeout: Duration) -> Result<(), ProtocolError> {
    control(session, CONTROL_OP_HANGUP, &[], timeout)
}

/// The host's AT-mode read cursor (spec §4.12's `host_read_cursor`).
/// Unlike `host_write_cursor`/`net_read_cursor`/`net_write_cursor`, the
/// Status response carries no wire field for it -- the client owns and
/// advances its own copy as reads succeed, the same pattern
/// [`super::tcp::TcpStreamSession`] uses for its `read_offset`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ModemCursor {
    pub read_offset: u32,
}

/// Accept `tcp://host:port`, `host:port`, or bare `host` (defaulting to
/// port 23), returning `host:port` (spec §4.12: "scheme-stripped, default
/// port 23").
pub fn normalize_hostport(target: &str) -> Result<String, ProtocolError> {
    let s = target.trim().strip_prefix("tcp://").unwrap_or(target.trim());
    if s.is_empty() {
        return Err(ProtocolError::orchestration("empty dial target"));
    }
    if s.contains(':') {
        Ok(s.to_string())
    } else {
        Ok(format!("{}:23", s))
    }
}

/// `Dial` (spec §4.12): Control op=0x02 with the host:port as an
/// `lp_u16` string.
pub fn dial<T: Transport>(session: &mut BusSession<T>, target: &str, timeout: Duration) -> Result<(), ProtocolError> {
    let hostport = normalize_hostport(target)?;
    let mut data = Vec::new();
    bytes::write_lp_u16_str(&mut data, &hostport);
    control(session, CONTROL_OP_DIAL, &data, timeout)
}

/// Read sequentially from `cursor.read_offset` until [`DRAIN_IDLE`]
/// passes with no new bytes, or `max_total` is reached (spec §4.12:
/// "drain output ... until idle").
pub fn drain<T: Transport>(session: &mut BusSession<T>, cursor: &mut ModemCursor, timeout: Duration, max_total: usize) -> Result<Vec<u8>, ProtocolError> {
    let mut out = Vec::new();
    let mut idle_deadline = Instant::now() + DRAIN_IDLE;

    while out.len() < max_total {
        let per_attempt = timeout.min(Duration::from_millis(200));
        let chunk = match read(session, cursor.read_offset, 512, per_attempt) {
            Ok(c) => c,
            Err(_) => break,
        };
        if !chunk.data.is_empty() {
            out.extend_from_slice(&chunk.data);
            cursor.read_offset = cursor.read_offset.saturating_add(chunk.data.len() as u32);
            idle_deadline = Instant::now() + DRAIN_IDLE;
            continue;
        }
        if Instant::now() > idle_deadline {
            break;
        }
        std::thread::sleep(Duration::from_millis(20));
    }
    Ok(out)
}

/// `AT` command orchestration (spec §4.12): write the AT line at the
/// device's current write cursor, then drain the response into
/// `cursor`.
pub fn at_command<T: Transport>(
    session: &mut BusSession<T>,
    cursor: &mut ModemCursor,
    command: &str,
    timeout: Duration,
    max_response: usize,
) -> Result<Vec<u8>, ProtocolError> {
    let mut line = command.to_string();
    if !line.to_uppercase().starts_with("AT") {
        line = format!("AT{}", line);
    }
    if !line.ends_with('\r') && !line.ends_with('\n') {
        line.push('\r');
    }

    let st = status(session, timeout)?;
    write(session, st.host_write_cursor, line.as_bytes(), timeout)?;
    drain(session, cursor, timeout, max_response)
}

/// `sendrecv` (spec §4.12): drain stale output, write, then read until
/// `data.len()` bytes have echoed back or `timeout` elapses (TCP echo
/// convenience).
pub fn sendrecv<T: Transport>(session: &mut BusSession<T>, data: &[u8], timeout: Duration) -> Result<Vec<u8>, ProtocolError> {
    let _ = drain(session, Duration::from_millis(50), 65536)?;

    let st = status(session, timeout)?;
    write(session, st.host_write_cursor, data, timeout)?;

    let deadline = Instant::now() + timeout;
    let mut received = Vec::new();
    let mut offset = status(session, timeout)?.net_read_cursor;
    while received.len() < data.len() && Instant::now() < deadline {
        let chunk = read(session, offset, 512, Duration::from_millis(100))?;
        if chunk.data.is_empty() {
            std::thread::sleep(Duration::from_millis(20));
            continue;
        }
        offset = offset.saturating_add(chunk.data.len() as u32);
        received.extend_from_slice(&chunk.data);
    }
    Ok(received)
}

/// Dial and wait for `CONNECT` or `NO CARRIER` in the drained output, or
/// the deadline (spec §4.12).
pub fn dial_and_wait<T: Transport>(session: &mut BusSession<T>, cursor: &mut ModemCursor, target: &str, timeout: Duration) -> Result<Vec<u8>, ProtocolError> {
    dial(session, target, timeout)?;

    let deadline = Instant::now() + timeout;
    let mut out = Vec::new();
    while Instant::now() < deadline {
        let chunk = drain(session, cursor, timeout, 4096)?;
        if !chunk.is_empty() {
            out.extend_from_slice(&chunk);
            if contains_subslice(&out, b"CONNECT") || contains_subslice(&out, b"NO CARRIER") {
                break;
            }
        } else {
            std::thread::sleep(Duration::from_millis(20));
        }
    }
    Ok(out)
}

fn contains_subslice(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_response_decodes_cursors_and_flags() {
        let mut payload = Vec::new();
        bytes::write_version(&mut payload, PROTOCOL_VERSION);
        bytes::write_u8(&mut payload, 0x03); // cmd_mode | connected
        bytes::write_u16le(&mut payload, 0);
        bytes::write_u16le(&mut payload, 2323);
        bytes::write_u32le(&mut payload, 10);
        bytes::write_u32le(&mut payload, 20);
        bytes::write_u32le(&mut payload, 30);
        bytes::write_u32le(&mut payload, 40);

        let st = decode_status_response(&payload).unwrap();
        assert!(st.cmd_mode && st.connected);
        assert_eq!(st.listen_port, 2323);
        assert_eq!(st.host_rx_avail, 10);
    }

    #[test]
    fn normalize_hostport_strips_scheme_and_defaults_port() {
        assert_eq!(normalize_hostport("tcp://example.com:2000").unwrap(), "example.com:2000");
        assert_eq!(normalize_hostport("example.com").unwrap(), "example.com:23");
        assert_eq!(normalize_hostport("example.com:9999").unwrap(), "example.com:9999");
    }

    #[test]
    fn normalize_hostport_rejects_empty_target() {
        assert!(normalize_hostport("   ").is_err());
    }

    #[test]
    fn contains_subslice_finds_connect_token() {
        assert!(contains_subslice(b"RING\r\nCONNECT 9600\r\n", b"CONNECT"));
        assert!(!contains_subslice(b"RING\r\n", b"CONNECT"));
    }
}
