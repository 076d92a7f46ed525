//! One module per subdevice (spec §4.6-§4.12): a request-payload
//! builder, a response-payload decoder, and the orchestration functions
//! that drive a [`crate::BusSession`] through a whole logical operation
//! (a chunked read, an HTTP GET, a catalogue mount, ...).

pub mod clock;
pub mod dfs;
pub mod disk;
pub mod file;
pub mod modem;
pub mod net;
pub mod tcp;

/// All per-subdevice codecs speak protocol version 1 (spec §3: "All
/// protocols currently version 1").
pub const PROTOCOL_VERSION: u8 = 1;
