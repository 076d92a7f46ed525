//! The bus session (spec §4.4) -- the heart of the core: a full-duplex,
//! response-demultiplexing, incremental framer with retry policy for
//! "device not ready"/"device busy" statuses.
//!
//! Ported from `original_source/py/fujinet_tools/fujibus.py`'s
//! `FujiBusSession` (stash + `send_command_expect`) and `net_tcp.py`'s
//! `_send_retry` (the backoff-over-`send_command_expect` retry layer
//! every subdevice orchestration module builds on).

use std::collections::{HashMap, VecDeque};
use std::convert::TryFrom;
use std::time::{Duration, Instant};

use log::{debug, trace, warn};

use crate::error::ProtocolError;
use crate::packet::{self, Packet};
use crate::retry::{backoff_until, Backoff};
use crate::slip;
use crate::status::StatusCode;
use crate::transport::Transport;

/// Owns the transport and receive buffer for one serial port (spec §5:
/// "single-threaded, cooperative, one session per serial port").
pub struct BusSession<T: Transport> {
    transport: T,
    rx: Vec<u8>,
    stash: HashMap<(u8, u8), VecDeque<Packet>>,
    debug: bool,
}

impl<T: Transport> BusSession<T> {
    pub fn new(transport: T) -> Self {
        BusSession {
            transport,
            rx: Vec::new(),
            stash: HashMap::new(),
            debug: false,
        }
    }

    pub fn set_debug(&mut self, debug: bool) {
        self.debug = debug;
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Stash a packet that arrived but wasn't what the current caller
    /// was waiting for. Pop-first FIFO per (device, command) (spec §3).
    pub fn stash(&mut self, pkt: Packet) {
        self.stash
            .entry((pkt.device, pkt.command))
            .or_default()
            .push_back(pkt);
    }

    pub fn pop(&mut self, device: u8, command: u8) -> Option<Packet> {
        let key = (device, command);
        let popped = match self.stash.get_mut(&key) {
            Some(q) => q.pop_front(),
            None => None,
        };
        if let Some(q) = self.stash.get(&key) {
            if q.is_empty() {
                self.stash.remove(&key);
            }
        }
        popped
    }

    /// Build, optionally debug-log, write, and flush a request packet
    /// (spec §4.4 step 1).
    pub fn send_command(&mut self, device: u8, command: u8, payload: &[u8]) -> Result<(), ProtocolError> {
        let framed = packet::build(device, command, payload);
        if self.debug {
            debug!("{}", packet::debug_dump("Outgoing request", &framed));
        }
        self.transport.write_all(&framed)?;
        self.transport.flush()?;
        Ok(())
    }

    /// Read and parse one packet before `deadline`, skipping empty and
    /// unparseable frames (spec §4.4 step 2, §7.2: framing noise is not
    /// an error).
    fn read_one_packet(&mut self, deadline: Instant) -> Option<Packet> {
        loop {
            let frame = self.read_one_slip_frame(deadline)?;
            if self.debug {
                debug!("{}", packet::debug_dump("Incoming raw data", &frame));
            }
            let decoded = slip::decode(&frame);
            if decoded.is_empty() {
                trace!("ignoring empty SLIP frame");
                if Instant::now() >= deadline {
                    return None;
                }
                continue;
            }
            match packet::parse(&decoded) {
                Some(pkt) => return Some(pkt),
                None => {
                    warn!("ignoring non-parseable SLIP frame ({} bytes decoded)", decoded.len());
                    if Instant::now() >= deadline {
                        return None;
                    }
                    continue;
                }
            }
        }
    }

    /// Incremental SLIP reader: keeps buffering into `self.rx` across
    /// calls until a full frame is available or the deadline passes
    /// (spec §4.2, §4.4 step 2).
    fn read_one_slip_frame(&mut self, deadline: Instant) -> Option<Vec<u8>> {
        loop {
            if let Some(frame) = slip::extract_one(&mut self.rx) {
                return Some(frame);
            }

            let now = Instant::now();
            if now >= deadline {
                return None;
            }

            let mut buf = [0u8; 256];
            let waiting = self.transport.bytes_waiting();
            let want = waiting.max(1).min(buf.len());
            match self.transport.read_some(&mut buf[..want]) {
                Ok(0) => continue,
                Ok(n) => self.rx.extend_from_slice(&buf[..n]),
                Err(e) => {
                    warn!("transport read error: {}", e);
                    return None;
                }
            }
        }
    }

    /// Send a request and wait for the matching response, stashing
    /// anything else that arrives in the meantime (spec §4.4 step 3).
    ///
    /// Returns `Ok(None)` on deadline expiry (not an error -- the stash
    /// is left intact and the caller may retry, per spec §5
    /// "Cancellation").
    pub fn send_command_expect(
        &mut self,
        device: u8,
        command: u8,
        payload: &[u8],
        expect_device: u8,
        expect_command: u8,
        timeout: Duration,
    ) -> Result<Option<Packet>, ProtocolError> {
        if let Some(hit) = self.pop(expect_device, expect_command) {
            return Ok(Some(hit));
        }

        self.send_command(device, command, payload)?;

        let deadline = Instant::now() + timeout;
        Ok(self.wait_matching(expect_device, expect_command, deadline))
    }

    /// Wait for a response on `(expect_device, expect_command)` up to
    /// `deadline`, stashing anything else that arrives, without
    /// re-sending the request (spec §9: one request, one response, per
    /// logical command).
    fn wait_matching(&mut self, expect_device: u8, expect_command: u8, deadline: Instant) -> Option<Packet> {
        while Instant::now() < deadline {
            if let Some(hit) = self.pop(expect_device, expect_command) {
                return Some(hit);
            }

            let pkt = match self.read_one_packet(deadline) {
                Some(p) => p,
                None => continue,
            };

            if pkt.device == expect_device && pkt.command == expect_command {
                return Some(pkt);
            }
            self.stash(pkt);
        }
        None
    }

    /// The per-command retry layer (spec §4.4 step 4, §9): each logical
    /// command is sent exactly once and waited for up to the full
    /// deadline; a request is only re-sent when a `NotReady`/`DeviceBusy`
    /// status is actually observed on a response, with capped
    /// exponential backoff between re-sends (spec §9: "no retry of
    /// already-sent packets after a successful response").
    ///
    /// Every subdevice orchestration function in `devices/` calls this
    /// rather than `send_command_expect` directly, expecting its
    /// response on the same (device, command) pair it sent.
    pub fn send_retrying(
        &mut self,
        device: u8,
        command: u8,
        payload: &[u8],
        timeout: Duration,
    ) -> Result<Packet, ProtocolError> {
        let deadline = Instant::now() + timeout;
        let mut backoff = Backoff::default_policy();

        let mut pkt = match self.pop(device, command) {
            Some(p) => p,
            None => {
                self.send_command(device, command, payload)?;
                match self.wait_matching(device, command, deadline) {
                    Some(p) => p,
                    None => return Err(ProtocolError::Timeout),
                }
            }
        };

        loop {
            let status_byte = pkt.status_byte();
            let status = status_byte.and_then(|b| StatusCode::try_from(b).ok());

            match status {
                Some(code) if code.is_transient() => {
                    if !backoff_until(&mut backoff, deadline) {
                        return Err(ProtocolError::DeviceStatus(code));
                    }
                    self.send_command(device, command, payload)?;
                    pkt = match self.wait_matching(device, command, deadline) {
                        Some(p) => p,
                        None => return Err(ProtocolError::Timeout),
                    };
                }
                _ => return Ok(pkt),
            }
        }
    }
}

/// Check a response's status byte and turn a non-Ok status into a
/// `ProtocolError::DeviceStatus`. Every orchestration function calls
/// this right after `send_retrying` returns (transient statuses never
/// reach here -- they were retried away already).
pub fn require_ok(pkt: &Packet) -> Result<(), ProtocolError> {
    match pkt.status_byte() {
        Some(0) => Ok(()),
        Some(raw) => match StatusCode::try_from(raw) {
            Ok(code) => Err(ProtocolError::DeviceStatus(code)),
            Err(_) => Err(ProtocolError::orchestration(format!(
                "device returned unknown status byte {}",
                raw
            ))),
        },
        None => Err(ProtocolError::orchestration(
            "response carried no status param".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::test_util::InMemoryPipe;
    use std::thread;

    fn file_ok_response(device: u8, command: u8, payload: &[u8]) -> Vec<u8> {
        let mut body = vec![0u8]; // status Ok
        body.extend_from_slice(payload);
        packet::build(device, command, &body)
    }

    #[test]
    fn send_command_expect_returns_matching_response() {
        let pipe = InMemoryPipe::new();
        let dev = pipe.device_side();
        let mut session = BusSession::new(pipe);

        let responder = thread::spawn(move || {
            // Wait for the request, then answer.
            loop {
                let req = dev.read_request();
                if !req.is_empty() {
                    dev.send_response(&file_ok_response(0xFE, 0x01, b"hi"));
                    break;
                }
                thread::sleep(Duration::from_millis(1));
            }
        });

        let pkt = session
            .send_command_expect(0xFE, 0x01, b"req", 0xFE, 0x01, Duration::from_secs(1))
            .unwrap()
            .expect("expected a response");
        assert_eq!(pkt.device, 0xFE);
        assert_eq!(pkt.payload, b"hi");
        responder.join().unwrap();
    }

    #[test]
    fn stray_packets_are_stashed_and_popped_in_order() {
        let pipe = InMemoryPipe::new();
        let mut session = BusSession::new(pipe);

        session.stash(packet::parse(&slip::decode(&packet::build(0x01, 0x02, b"a"))).unwrap());
        session.stash(packet::parse(&slip::decode(&packet::build(0x01, 0x02, b"b"))).unwrap());

        let first = session.pop(0x01, 0x02).unwrap();
        assert_eq!(first.payload, b"a");
        let second = session.pop(0x01, 0x02).unwrap();
        assert_eq!(second.payload, b"b");
        assert!(session.pop(0x01, 0x02).is_none());
    }

    #[test]
    fn send_command_expect_times_out_without_response() {
        let pipe = InMemoryPipe::new();
        let mut session = BusSession::new(pipe);
        let result = session
            .send_command_expect(0xFE, 0x01, b"req", 0xFE, 0x01, Duration::from_millis(20))
            .unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn retries_not_ready_then_succeeds() {
        let pipe = InMemoryPipe::new();
        let dev = pipe.device_side();
        let mut session = BusSession::new(pipe);

        let responder = thread::spawn(move || {
            let mut replied_not_ready = false;
            loop {
                let req = dev.read_request();
                if !req.is_empty() {
                    if !replied_not_ready {
                        let not_ready = packet::build(0xFE, 0x01, &[4u8]); // NotReady
                        dev.send_response(&not_ready);
                        replied_not_ready = true;
                    } else {
                        dev.send_response(&file_ok_response(0xFE, 0x01, b"ok"));
                        break;
                    }
                }
                thread::sleep(Duration::from_millis(1));
            }
        });

        let pkt = session
            .send_retrying(0xFE, 0x01, b"req", Duration::from_secs(2))
            .unwrap();
        assert_eq!(pkt.payload, b"ok");
        responder.join().unwrap();
    }
}
