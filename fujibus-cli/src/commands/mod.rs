//! Command dispatch: one module per top-level subcommand family, each
//! translating parsed CLI arguments into `fujibus_core` orchestration
//! calls and formatting the result for stdout.

pub mod bbc;
pub mod clock;
pub mod disk;
pub mod file;
pub mod modem;
pub mod net;

use fujibus_core::{BusSession, ProtocolError, Transport};

use crate::cli::{Command, Opt};

pub fn dispatch<T: Transport>(session: &mut BusSession<T>, opt: &Opt) -> Result<(), ProtocolError> {
    match &opt.command {
        Command::List { fs, path } => file::list(session, opt, fs, path),
        Command::Stat { fs, path } => file::stat(session, opt, fs, path),
        Command::Read { fs, path, offset, max_bytes } => file::read(session, opt, fs, path, *offset, *max_bytes),
        Command::ReadAll { fs, path, out, chunk } => file::read_all(session, opt, fs, path, out.as_deref(), *chunk),
        Command::Write { fs, path, input_file, chunk } => file::write(session, opt, fs, path, input_file, *chunk),
        Command::Net(sub) => net::dispatch(session, opt, sub),
        Command::Clock(sub) => clock::dispatch(session, opt, sub),
        Command::Disk(sub) => disk::dispatch(session, opt, sub),
        Command::Bbc(sub) => bbc::dispatch(session, opt, sub),
        Command::Modem(sub) => modem::dispatch(session, opt, sub),
    }
}

/// Parse a `0x`-optional hex byte string into raw bytes, used by the
/// disk/modem raw-data flags.
pub(crate) fn parse_hex(s: &str) -> Result<Vec<u8>, ProtocolError> {
    let s = s.strip_prefix("0x").unwrap_or(s);
    if s.len() % 2 != 0 {
        return Err(ProtocolError::orchestration("hex data must have an even number of digits"));
    }
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&s[i..i + 2], 16).map_err(|e| ProtocolError::orchestration(format!("bad hex byte: {}", e))))
        .collect()
}
