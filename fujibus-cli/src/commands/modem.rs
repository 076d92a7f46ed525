use std::io::{stdout, Write};
use std::thread;
use std::time::Duration;

use fujibus_core::devices::modem;
use fujibus_core::{BusSession, ProtocolError, Transport};

use crate::cli::{ModemCommand, Opt};

pub fn dispatch<T: Transport>(session: &mut BusSession<T>, opt: &Opt, cmd: &ModemCommand) -> Result<(), ProtocolError> {
    match cmd {
        ModemCommand::Status => status(session, opt),
        ModemCommand::At { command } => at(session, opt, command),
        ModemCommand::Dial { target } => dial(session, opt, target),
        ModemCommand::Drain { max_total } => drain(session, opt, *max_total),
        ModemCommand::Write { offset, data } => write(session, opt, *offset, data),
        ModemCommand::Read { offset, max_bytes } => read(session, opt, *offset, *max_bytes),
        ModemCommand::Sendrecv { data } => sendrecv(session, opt, data),
        ModemCommand::Hangup => modem::hangup(session, opt.timeout_duration()),
        ModemCommand::Term => term(session, opt),
    }
}

fn status<T: Transport>(session: &mut BusSession<T>, opt: &Opt) -> Result<(), ProtocolError> {
    let st = modem::status(session, opt.timeout_duration())?;
    println!(
        "cmd_mode={} connected={} listen_port={} host_rx_avail={} host_write_cursor={} net_read_cursor={} net_write_cursor={}",
        st.cmd_mode, st.connected, st.listen_port, st.host_rx_avail, st.host_write_cursor, st.net_read_cursor, st.net_write_cursor
    );
    Ok(())
}

fn at<T: Transport>(session: &mut BusSession<T>, opt: &Opt, command: &str) -> Result<(), ProtocolError> {
    let mut cursor = modem::ModemCursor::default();
    let out = modem::at_command(session, &mut cursor, command, opt.timeout_duration(), 65536)?;
    stdout()
        .write_all(&out)
        .map_err(|e| ProtocolError::orchestration(format!("write to stdout failed: {}", e)))?;
    Ok(())
}

fn dial<T: Transport>(session: &mut BusSession<T>, opt: &Opt, target: &str) -> Result<(), ProtocolError> {
    let mut cursor = modem::ModemCursor::default();
    let out = modem::dial_and_wait(session, &mut cursor, target, opt.timeout_duration())?;
    stdout()
        .write_all(&out)
        .map_err(|e| ProtocolError::orchestration(format!("write to stdout failed: {}", e)))?;
    Ok(())
}

fn drain<T: Transport>(session: &mut BusSession<T>, opt: &Opt, max_total: usize) -> Result<(), ProtocolError> {
    let mut cursor = modem::ModemCursor::default();
    let out = modem::drain(session, &mut cursor, opt.timeout_duration(), max_total)?;
    stdout()
        .write_all(&out)
        .map_err(|e| ProtocolError::orchestration(format!("write to stdout failed: {}", e)))?;
    Ok(())
}

fn write<T: Transport>(session: &mut BusSession<T>, opt: &Opt, offset: u32, data: &str) -> Result<(), ProtocolError> {
    let ack = modem::write(session, offset, data.as_bytes(), opt.timeout_duration())?;
    println!("offset={} written={}", ack.offset, ack.written);
    Ok(())
}

fn read<T: Transport>(session: &mut BusSession<T>, opt: &Opt, offset: u32, max_bytes: u16) -> Result<(), ProtocolError> {
    let chunk = modem::read(session, offset, max_bytes, opt.timeout_duration())?;
    stdout()
        .write_all(&chunk.data)
        .map_err(|e| ProtocolError::orchestration(format!("write to stdout failed: {}", e)))?;
    eprintln!("# offset={} len={}", chunk.offset, chunk.data.len());
    Ok(())
}

fn sendrecv<T: Transport>(session: &mut BusSession<T>, opt: &Opt, data: &str) -> Result<(), ProtocolError> {
    let got = modem::sendrecv(session, data.as_bytes(), opt.timeout_duration())?;
    stdout()
        .write_all(&got)
        .map_err(|e| ProtocolError::orchestration(format!("write to stdout failed: {}", e)))?;
    Ok(())
}

/// Data-contract-only terminal: poll `Status`/drain at ~10 Hz and echo
/// whatever comes back, with no raw-mode stdin bridging (out of scope,
/// see spec.md Non-goals). Ctrl-C exits.
fn term<T: Transport>(session: &mut BusSession<T>, opt: &Opt) -> Result<(), ProtocolError> {
    eprintln!("# polling modem status/drain at ~10 Hz; Ctrl-C to exit");
    let mut cursor = modem::ModemCursor::default();
    loop {
        let chunk = modem::drain(session, &mut cursor, opt.timeout_duration(), 4096)?;
        if !chunk.is_empty() {
            stdout()
                .write_all(&chunk)
                .map_err(|e| ProtocolError::orchestration(format!("write to stdout failed: {}", e)))?;
            stdout().flush().ok();
        }
        thread::sleep(Duration::from_millis(100));
    }
}
