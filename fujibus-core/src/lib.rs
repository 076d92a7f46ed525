//! Host-side client library for the FujiBus framed request/response
//! protocol spoken to an embedded device over serial/PTY.
//!
//! Layout mirrors the protocol stack bottom-up: [`bytes`] and [`slip`]
//! are pure codecs, [`packet`] builds on both to frame a request or
//! parse a response, [`transport`] and [`retry`] are the plumbing
//! [`session::BusSession`] needs to actually talk to a device, and
//! [`devices`] holds one orchestration module per subdevice.

pub mod bytes;
pub mod devices;
pub mod error;
pub mod packet;
pub mod retry;
pub mod session;
pub mod slip;
pub mod status;
pub mod transport;

pub use error::{DecodeError, ProtocolError, TransportError};
pub use packet::Packet;
pub use session::BusSession;
pub use status::StatusCode;
pub use transport::{open_serial, Transport, DEFAULT_READ_TIMEOUT};

/// Device ids (spec §3: "Device ids: File=0xFE, Network=0xFD, Disk=0xFC,
/// Modem=0xFB, Clock=0x45").
pub mod device_id {
    pub const FILE: u8 = 0xFE;
    pub const NETWORK: u8 = 0xFD;
    pub const DISK: u8 = 0xFC;
    pub const MODEM: u8 = 0xFB;
    pub const CLOCK: u8 = 0x45;
}

/// Default overall deadline for a single orchestration call, used when a
/// caller doesn't specify one (spec §4.4, §9).
pub const DEFAULT_CALL_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(5);
