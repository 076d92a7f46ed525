//! TCP stream orchestration over the Network subdevice's `tcp://` URL
//! scheme (spec §4.8). Reuses [`super::net`]'s Open/Read/Write/Close/Info
//! wire format; the device, not the client, interprets the scheme and
//! query-string options.
//!
//! Ported from `original_source/py/fujinet_tools/net_tcp.py`
//! (`TcpStreamSession`, `tcp_open`/`tcp_send`/`tcp_halfclose`/
//! `tcp_recv_some`/`tcp_close`).

use std::time::{Duration, Instant};

use crate::devices::net::{self, Method};
use crate::error::ProtocolError;
use crate::session::BusSession;
use crate::transport::Transport;

/// A connected (or connecting) TCP stream, owning a device handle and
/// the read/write byte cursors the Network subdevice's offset-echo
/// invariant requires (spec §3: `TcpStreamSession`).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TcpStreamSession {
    pub handle: u16,
    pub read_offset: u32,
    pub write_offset: u32,
}

/// Serialize the recognized query-string options onto a `tcp://host:port`
/// base URL. The library never interprets these -- it just passes them
/// through for the device (spec §4.8).
pub fn build_tcp_url(
    host: &str,
    port: u16,
    connect_timeout_ms: Option<u32>,
    nodelay: Option<bool>,
    keepalive: Option<bool>,
    rx_buf: Option<u32>,
    halfclose: Option<bool>,
) -> String {
    let mut opts = Vec::new();
    if let Some(v) = connect_timeout_ms {
        opts.push(format!("connect_timeout_ms={}", v));
    }
    if let Some(v) = nodelay {
        opts.push(format!("nodelay={}", v as u8));
    }
    if let Some(v) = keepalive {
        opts.push(format!("keepalive={}", v as u8));
    }
    if let Some(v) = rx_buf {
        opts.push(format!("rx_buf={}", v));
    }
    if let Some(v) = halfclose {
        opts.push(format!("halfclose={}", v as u8));
    }
    let base = format!("tcp://{}:{}", host, port);
    if opts.is_empty() {
        base
    } else {
        format!("{}?{}", base, opts.join("&"))
    }
}

fn connected_pseudo_headers(header_bytes: &[u8]) -> (bool, bool) {
    let text = String::from_utf8_lossy(header_bytes);
    let mut connected = false;
    let mut connecting = false;
    for line in text.lines() {
        if let Some(v) = line.strip_prefix("X-FujiNet-Connected:") {
            connected = v.trim() == "1";
        } else if let Some(v) = line.strip_prefix("X-FujiNet-Connecting:") {
            connecting = v.trim() == "1";
        }
    }
    (connected, connecting)
}

/// Open a TCP stream: `Open(GET, url)`, then, if `wait_connected`, poll
/// `Info` until the `X-FujiNet-Connected: 1` pseudo-header appears or
/// `timeout` elapses.
pub fn tcp_open<T: Transport>(
    session: &mut BusSession<T>,
    url: &str,
    timeout: Duration,
    wait_connected: bool,
    info_poll: Duration,
) -> Result<TcpStreamSession, ProtocolError> {
    let opened = net::open(session, Method::Get, 0, url, &[], 0, &[], timeout)?;
    if !opened.accepted {
        return Err(ProtocolError::orchestration("TCP open not accepted"));
    }

    let sess = TcpStreamSession {
        handle: opened.handle,
        read_offset: 0,
        write_offset: 0,
    };

    if !wait_connected {
        return Ok(sess);
    }

    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        match net::info(session, sess.handle, timeout) {
            Ok(result) => {
                let (connected, _connecting) = connected_pseudo_headers(&result.header_bytes);
                if connected {
                    return Ok(sess);
                }
            }
            Err(ProtocolError::DeviceStatus(code)) if code.is_transient() => {}
            Err(e) => return Err(e),
        }
        std::thread::sleep(info_poll.min(deadline.saturating_duration_since(Instant::now())));
    }

    Err(ProtocolError::Timeout)
}

/// Send bytes over the stream, advancing `write_offset` by each `Write`'s
/// `written` (spec §4.8: "zero `written` is fatal").
pub fn tcp_send<T: Transport>(
    session: &mut BusSession<T>,
    sess: &mut TcpStreamSession,
    data: &[u8],
    chunk: u16,
    timeout: Duration,
) -> Result<usize, ProtocolError> {
    let mut total = 0usize;
    while total < data.len() {
        let end = (total + chunk as usize).min(data.len());
        let ack = net::write(session, sess.handle, sess.write_offset, &data[total..end], timeout)?;
        if ack.written == 0 {
            return Err(ProtocolError::orchestration("TCP write returned 0 bytes written"));
        }
        sess.write_offset = sess.write_offset.saturating_add(ack.written as u32);
        total += ack.written as usize;
    }
    Ok(total)
}

/// Zero-length `Write` at the current write cursor, mapped to
/// shutdown-WR on the device (spec §4.8).
pub fn tcp_halfclose<T: Transport>(session: &mut BusSession<T>, sess: &TcpStreamSession, timeout: Duration) -> Result<(), ProtocolError> {
    net::write(session, sess.handle, sess.write_offset, &[], timeout).map(|_| ())
}

/// Single `Read`; `NotReady` is reported as `(empty, eof=false)` rather
/// than an error, matching interactive REPL semantics (spec §4.8).
pub fn tcp_recv_some<T: Transport>(
    session: &mut BusSession<T>,
    sess: &mut TcpStreamSession,
    max_bytes: u16,
    timeout: Duration,
) -> Result<(Vec<u8>, bool), ProtocolError> {
    match net::read(session, sess.handle, sess.read_offset, max_bytes, timeout) {
        Ok(chunk) => {
            sess.read_offset = sess.read_offset.saturating_add(chunk.data.len() as u32);
            Ok((chunk.data, chunk.eof))
        }
        Err(ProtocolError::DeviceStatus(code)) if code.is_transient() => Ok((Vec::new(), false)),
        Err(e) => Err(e),
    }
}

/// `sendrecv` convenience (spec §4.8): drain stale output, write, then
/// read until at least `data.len()` bytes come back or the deadline
/// passes. An `IOError` after at least one successful recv is treated as
/// EOF, matching the echo-server convenience contract.
pub fn sendrecv<T: Transport>(
    session: &mut BusSession<T>,
    sess: &mut TcpStreamSession,
    data: &[u8],
    chunk: u16,
    timeout: Duration,
) -> Result<Vec<u8>, ProtocolError> {
    // Drain whatever is already pending before sending fresh data.
    loop {
        let (drained, eof) = tcp_recv_some(session, sess, chunk, Duration::from_millis(20))?;
        if drained.is_empty() || eof {
            break;
        }
    }

    tcp_send(session, sess, data, chunk, timeout)?;

    let deadline = Instant::now() + timeout;
    let mut received = Vec::new();
    let mut got_any = false;
    while received.len() < data.len() && Instant::now() < deadline {
        match tcp_recv_some(session, sess, chunk, Duration::from_millis(100)) {
            Ok((bytes, eof)) => {
                if !bytes.is_empty() {
                    got_any = true;
                    received.extend_from_slice(&bytes);
                }
                if eof {
                    break;
                }
            }
            Err(_) if got_any => break,
            Err(e) => return Err(e),
        }
    }
    Ok(received)
}

pub fn tcp_close<T: Transport>(session: &mut BusSession<T>, handle: u16, timeout: Duration) -> Result<(), ProtocolError> {
    net::close(session, handle, timeout)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_tcp_url_with_no_options_is_bare() {
        assert_eq!(build_tcp_url("example.com", 23, None, None, None, None, None), "tcp://example.com:23");
    }

    #[test]
    fn build_tcp_url_serializes_recognized_options() {
        let url = build_tcp_url("host", 80, Some(500), Some(true), None, Some(4096), Some(false));
        assert_eq!(url, "tcp://host:80?connect_timeout_ms=500&nodelay=1&rx_buf=4096&halfclose=0");
    }

    #[test]
    fn connected_pseudo_headers_parse_both_flags() {
        let (c, connecting) = connected_pseudo_headers(b"X-FujiNet-Connected: 1\r\nX-FujiNet-Connecting: 0\r\n");
        assert!(c);
        assert!(!connecting);
    }

    #[test]
    fn connected_pseudo_headers_default_false_on_empty() {
        let (c, connecting) = connected_pseudo_headers(b"");
        assert!(!c);
        assert!(!connecting);
    }
}
