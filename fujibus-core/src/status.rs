//! Device status codes (spec §3): every FujiBus response carries one of
//! these in `params[0]`. `Ok` means success; `NotReady`/`DeviceBusy` are
//! retried by the session/orchestration layers; everything else is
//! surfaced to the caller.
//!
//! Ported from `original_source/py/fujinet_tools/status.py`.

use std::convert::TryFrom;
use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum StatusCode {
    Ok = 0,
    DeviceNotFound = 1,
    InvalidRequest = 2,
    DeviceBusy = 3,
    NotReady = 4,
    IoError = 5,
    Timeout = 6,
    InternalError = 7,
    Unsupported = 8,
}

impl StatusCode {
    pub fn name(self) -> &'static str {
        match self {
            StatusCode::Ok => "Ok",
            StatusCode::DeviceNotFound => "DeviceNotFound",
            StatusCode::InvalidRequest => "InvalidRequest",
            StatusCode::DeviceBusy => "DeviceBusy",
            StatusCode::NotReady => "NotReady",
            StatusCode::IoError => "IOError",
            StatusCode::Timeout => "Timeout",
            StatusCode::InternalError => "InternalError",
            StatusCode::Unsupported => "Unsupported",
        }
    }

    /// Whether a response bearing this status should be retried by the
    /// session/orchestration retry loop (spec §4.4, §7.4).
    pub fn is_transient(self) -> bool {
        matches!(self, StatusCode::NotReady | StatusCode::DeviceBusy)
    }

    pub fn is_ok(self) -> bool {
        matches!(self, StatusCode::Ok)
    }
}

/// Raw status byte that didn't match any known code. Formats as
/// `Unknown(N)`, matching `status.py`'s fallback.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct UnknownStatus(pub u8);

impl fmt::Display for UnknownStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Unknown({})", self.0)
    }
}

impl TryFrom<u8> for StatusCode {
    type Error = UnknownStatus;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(StatusCode::Ok),
            1 => Ok(StatusCode::DeviceNotFound),
            2 => Ok(StatusCode::InvalidRequest),
            3 => Ok(StatusCode::DeviceBusy),
            4 => Ok(StatusCode::NotReady),
            5 => Ok(StatusCode::IoError),
            6 => Ok(StatusCode::Timeout),
            7 => Ok(StatusCode::InternalError),
            8 => Ok(StatusCode::Unsupported),
            other => Err(UnknownStatus(other)),
        }
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.name(), *self as u8)
    }
}

/// Format a raw status byte the way the CLI reports it to the user,
/// matching `format_status()` in the original tool: `"NotReady(4)"` for
/// known codes, `"Unknown(N)"` otherwise.
pub fn format_status(raw: u8) -> String {
    match StatusCode::try_from(raw) {
        Ok(code) => code.to_string(),
        Err(unknown) => unknown.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_known_codes() {
        for raw in 0u8..=8 {
            let code = StatusCode::try_from(raw).unwrap();
            assert_eq!(code as u8, raw);
        }
    }

    #[test]
    fn unknown_code_formats_with_number() {
        assert_eq!(format_status(200), "Unknown(200)");
    }

    #[test]
    fn transient_codes() {
        assert!(StatusCode::NotReady.is_transient());
        assert!(StatusCode::DeviceBusy.is_transient());
        assert!(!StatusCode::Ok.is_transient());
        assert!(!StatusCode::IoError.is_transient());
    }
}
