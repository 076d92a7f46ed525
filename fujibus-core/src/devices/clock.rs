//! Clock subdevice (spec §4.9): Unix-time get/set plus formatted-output
//! and POSIX-timezone commands.
//!
//! Ported from `original_source/py/fujinet_tools/clock.py`
//! (`_build_clock_get_req`/`_build_clock_set_req`/`_parse_clock_time_resp`,
//! `fmt_utc`); GetFormat/GetTimezone/SetTimezone/SetTimezoneSave are not
//! present in that draft and are built from spec.md §4.9 directly.

use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::bytes::{self, Reader};
use crate::device_id::CLOCK;
use crate::devices::PROTOCOL_VERSION;
use crate::error::ProtocolError;
use crate::session::{self, BusSession};
use crate::transport::Transport;

pub const CMD_GET: u8 = 1;
pub const CMD_SET: u8 = 2;
pub const CMD_GET_FORMAT: u8 = 3;
pub const CMD_GET_TIMEZONE: u8 = 4;
pub const CMD_SET_TIMEZONE: u8 = 5;
pub const CMD_SET_TIMEZONE_SAVE: u8 = 6;

fn decode_time_response(payload: &[u8]) -> Result<u64, ProtocolError> {
    let mut r = Reader::new(payload);
    bytes::read_version(&mut r, PROTOCOL_VERSION)?;
    let _flags = r.u8()?;
    let _reserved = r.u16()?;
    let unix_seconds = r.u64()?;
    r.finish()?;
    Ok(unix_seconds)
}

pub fn get<T: Transport>(session: &mut BusSession<T>, timeout: Duration) -> Result<u64, ProtocolError> {
    let mut payload = Vec::new();
    bytes::write_version(&mut payload, PROTOCOL_VERSION);
    bytes::write_u8(&mut payload, 0);
    bytes::write_u16le(&mut payload, 0);
    bytes::write_u64le(&mut payload, 0);
    let pkt = session.send_retrying(CLOCK, CMD_GET, &payload, timeout)?;
    session::require_ok(&pkt)?;
    decode_time_response(&pkt.payload)
}

pub fn set<T: Transport>(session: &mut BusSession<T>, unix_seconds: u64, timeout: Duration) -> Result<u64, ProtocolError> {
    let mut payload = Vec::new();
    bytes::write_version(&mut payload, PROTOCOL_VERSION);
    bytes::write_u8(&mut payload, 0);
    bytes::write_u16le(&mut payload, 0);
    bytes::write_u64le(&mut payload, unix_seconds);
    let pkt = session.send_retrying(CLOCK, CMD_SET, &payload, timeout)?;
    session::require_ok(&pkt)?;
    decode_time_response(&pkt.payload)
}

/// Format a Unix timestamp as a human-readable UTC string (spec.md
/// supplement: `original_source`'s `fmt_utc`), using the same `chrono`
/// crate the example pool reaches for elsewhere for this purpose.
pub fn fmt_utc(unix_seconds: u64) -> String {
    match DateTime::<Utc>::from_timestamp(unix_seconds as i64, 0) {
        Some(dt) => dt.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
        None => format!("invalid timestamp {}", unix_seconds),
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FormatCode {
    Simple = 0,
    ProDos = 1,
    ApeTime = 2,
    TzIso = 3,
    UtcIso = 4,
    Sos = 5,
}

impl FormatCode {
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Fixed wire size for the binary formats (spec §4.9); the string
    /// formats (`TzIso`/`UtcIso`) are variable-length and carried as the
    /// remainder of the payload instead.
    pub fn fixed_size(self) -> Option<usize> {
        match self {
            FormatCode::Simple => Some(7),
            FormatCode::ProDos => Some(4),
            FormatCode::ApeTime => Some(6),
            FormatCode::Sos => Some(16),
            FormatCode::TzIso | FormatCode::UtcIso => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FormattedTime {
    pub format_code: u8,
    pub data: Vec<u8>,
}

fn build_get_format_request(format: FormatCode, tz: Option<&str>) -> Vec<u8> {
    let mut out = Vec::new();
    bytes::write_version(&mut out, PROTOCOL_VERSION);
    bytes::write_u8(&mut out, format.as_u8());
    bytes::write_lp_u8_str(&mut out, tz.unwrap_or(""));
    out
}

fn decode_get_format_response(payload: &[u8]) -> Result<FormattedTime, ProtocolError> {
    let mut r = Reader::new(payload);
    bytes::read_version(&mut r, PROTOCOL_VERSION)?;
    let format_code = r.u8()?;
    let data = r.take(r.remaining())?.to_vec();
    r.finish()?;
    Ok(FormattedTime { format_code, data })
}

/// `GetFormat` (spec §4.9): request one of the six device-side time
/// representations, optionally localized to `tz` (a POSIX TZ string).
pub fn get_format<T: Transport>(
    session: &mut BusSession<T>,
    format: FormatCode,
    tz: Option<&str>,
    timeout: Duration,
) -> Result<FormattedTime, ProtocolError> {
    let payload = build_get_format_request(format, tz);
    let pkt = session.send_retrying(CLOCK, CMD_GET_FORMAT, &payload, timeout)?;
    session::require_ok(&pkt)?;
    decode_get_format_response(&pkt.payload)
}

fn decode_timezone_response(payload: &[u8]) -> Result<String, ProtocolError> {
    let mut r = Reader::new(payload);
    bytes::read_version(&mut r, PROTOCOL_VERSION)?;
    let tz = r.lp_u8_str()?;
    r.finish()?;
    Ok(tz)
}

pub fn get_timezone<T: Transport>(session: &mut BusSession<T>, timeout: Duration) -> Result<String, ProtocolError> {
    let mut payload = Vec::new();
    bytes::write_version(&mut payload, PROTOCOL_VERSION);
    let pkt = session.send_retrying(CLOCK, CMD_GET_TIMEZONE, &payload, timeout)?;
    session::require_ok(&pkt)?;
    decode_timezone_response(&pkt.payload)
}

fn set_timezone_inner<T: Transport>(
    session: &mut BusSession<T>,
    command: u8,
    tz: &str,
    timeout: Duration,
) -> Result<String, ProtocolError> {
    let mut payload = Vec::new();
    bytes::write_version(&mut payload, PROTOCOL_VERSION);
    bytes::write_lp_u8_str(&mut payload, tz);
    let pkt = session.send_retrying(CLOCK, command, &payload, timeout)?;
    session::require_ok(&pkt)?;
    decode_timezone_response(&pkt.payload)
}

/// Set the device's timezone for this session only (spec §4.9: POSIX TZ
/// strings like `EST5EDT,M3.2.0,M11.1.0`).
pub fn set_timezone<T: Transport>(session: &mut BusSession<T>, tz: &str, timeout: Duration) -> Result<String, ProtocolError> {
    set_timezone_inner(session, CMD_SET_TIMEZONE, tz, timeout)
}

/// Set the device's timezone and persist it (spec §4.9:
/// "SetTimezoneSave persists on the device").
pub fn set_timezone_save<T: Transport>(session: &mut BusSession<T>, tz: &str, timeout: Duration) -> Result<String, ProtocolError> {
    set_timezone_inner(session, CMD_SET_TIMEZONE_SAVE, tz, timeout)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn time_response_round_trips() {
        let mut payload = Vec::new();
        bytes::write_version(&mut payload, PROTOCOL_VERSION);
        bytes::write_u8(&mut payload, 0);
        bytes::write_u16le(&mut payload, 0);
        bytes::write_u64le(&mut payload, 1_700_000_000);
        assert_eq!(decode_time_response(&payload).unwrap(), 1_700_000_000);
    }

    #[test]
    fn fmt_utc_formats_known_epoch() {
        assert_eq!(fmt_utc(0), "1970-01-01 00:00:00 UTC");
    }

    #[test]
    fn get_format_response_carries_raw_bytes() {
        let mut payload = Vec::new();
        bytes::write_version(&mut payload, PROTOCOL_VERSION);
        bytes::write_u8(&mut payload, FormatCode::ProDos.as_u8());
        payload.extend_from_slice(&[1, 2, 3, 4]);

        let ft = decode_get_format_response(&payload).unwrap();
        assert_eq!(ft.format_code, FormatCode::ProDos.as_u8());
        assert_eq!(ft.data, vec![1, 2, 3, 4]);
    }

    #[test]
    fn timezone_response_decodes_posix_string() {
        let mut payload = Vec::new();
        bytes::write_version(&mut payload, PROTOCOL_VERSION);
        bytes::write_lp_u8_str(&mut payload, "EST5EDT,M3.2.0,M11.1.0");
        assert_eq!(decode_timezone_response(&payload).unwrap(), "EST5EDT,M3.2.0,M11.1.0");
    }
}
