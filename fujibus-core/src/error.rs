use crate::status::StatusCode;

/// Faults raised while decoding a byte-level field (§4.1, §4.3, §4.6-§4.12).
///
/// These are "protocol errors" in spec terms: the wire bytes don't match
/// the shape the codec expects. They are always fatal for the operation
/// that triggered them -- unlike framing noise, which is dropped silently
/// by the session layer and never surfaces this far up.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("out of bounds: wanted {wanted} bytes at offset {offset}, have {len}")]
    OutOfBounds {
        offset: usize,
        wanted: usize,
        len: usize,
    },

    #[error("bad version: got {got}, expected {expected}")]
    BadVersion { got: u8, expected: u8 },

    #[error("trailing bytes: {extra} unconsumed after decode")]
    TrailingBytes { extra: usize },

    #[error("length-prefixed field declared {declared} bytes but only {available} remain")]
    LengthPrefixOutOfBounds { declared: usize, available: usize },

    #[error("packet too short: {len} bytes, need at least {min}")]
    PacketTooShort { len: usize, min: usize },

    #[error("packet length field {header} does not match actual size {actual}")]
    LengthMismatch { header: usize, actual: usize },

    #[error("checksum mismatch: header has 0x{header:02X}, computed 0x{computed:02X}")]
    ChecksumMismatch { header: u8, computed: u8 },

    #[error("descriptor chain ran past end of packet")]
    TruncatedDescriptor,

    #[error("offset echo mismatch: requested {requested}, device echoed {echoed}")]
    OffsetMismatch { requested: u64, echoed: u64 },

    #[error("{0}")]
    Other(String),
}

/// Faults from the transport layer (§7.1): opening, writing, or reading
/// the underlying serial/PTY byte stream failed outright.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("failed to open serial port {port}: {source}")]
    Open {
        port: String,
        #[source]
        source: serialport::Error,
    },

    #[error("write failed: {0}")]
    Write(#[source] std::io::Error),

    #[error("flush failed: {0}")]
    Flush(#[source] std::io::Error),

    #[error("read failed: {0}")]
    Read(#[source] std::io::Error),

    #[error("session is not attached to a transport")]
    NotAttached,
}

/// Top-level error returned by orchestration-layer operations (§4.6-§4.12).
///
/// This is the error type CLI command handlers match on to pick an exit
/// code (spec §6: 0 success, 1 device-reported error, 2 no response /
/// protocol error).
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// No response arrived before the overall deadline (spec §4.4, §5).
    #[error("no response within deadline")]
    Timeout,

    /// The device returned a non-Ok, non-retryable status code.
    #[error("device status: {0}")]
    DeviceStatus(StatusCode),

    /// An orchestration-level fault that isn't a decode or status issue
    /// (spec §7.5): stalled writes, idle watchdog expiry, and so on.
    #[error("{0}")]
    Orchestration(String),
}

impl ProtocolError {
    pub fn orchestration(msg: impl Into<String>) -> Self {
        ProtocolError::Orchestration(msg.into())
    }

    /// Exit code per spec §6: 1 for a device-reported error, 2 for
    /// anything else (no response, transport fault, protocol fault).
    pub fn exit_code(&self) -> i32 {
        match self {
            ProtocolError::DeviceStatus(_) => 1,
            _ => 2,
        }
    }
}
