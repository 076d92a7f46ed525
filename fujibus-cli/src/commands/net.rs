use std::fs::File;
use std::io::{stdout, Write};
use std::path::Path;
use std::time::Duration;

use fujibus_core::devices::{net, tcp};
use fujibus_core::{BusSession, ProtocolError, Transport};

use crate::cli::{NetCommand, Opt, TcpCommand};

pub fn dispatch<T: Transport>(session: &mut BusSession<T>, opt: &Opt, cmd: &NetCommand) -> Result<(), ProtocolError> {
    match cmd {
        NetCommand::Open { url, headers, resp_headers, flags } => open(session, opt, url, headers, resp_headers, *flags),
        NetCommand::Info { handle } => info(session, opt, *handle),
        NetCommand::Read { handle, offset, max_bytes } => read(session, opt, *handle, *offset, *max_bytes),
        NetCommand::Write { handle, data } => write(session, opt, *handle, data),
        NetCommand::Close { handle } => close(session, opt, *handle),
        NetCommand::Get { url, headers, resp_headers, chunk, out, force } => get(session, opt, url, headers, resp_headers, *chunk, out.as_deref(), *force),
        NetCommand::Head { url, headers, resp_headers } => head(session, opt, url, headers, resp_headers),
        NetCommand::Send { url, input_file, method, headers, resp_headers, chunk } => send(session, opt, url, input_file, method, headers, resp_headers, *chunk),
        NetCommand::Tcp(sub) => tcp_dispatch(session, opt, sub),
    }
}

fn open<T: Transport>(
    session: &mut BusSession<T>,
    opt: &Opt,
    url: &str,
    headers: &[(String, String)],
    resp_headers: &[String],
    flags: u8,
) -> Result<(), ProtocolError> {
    let result = net::open(session, net::Method::Get, flags, url, headers, 0, resp_headers, opt.timeout_duration())?;
    println!("handle={} accepted={} needs_body_write={}", result.handle, result.accepted, result.needs_body_write);
    Ok(())
}

fn info<T: Transport>(session: &mut BusSession<T>, opt: &Opt, handle: u16) -> Result<(), ProtocolError> {
    let result = net::info(session, handle, opt.timeout_duration())?;
    println!(
        "handle={} http_status={:?} content_length={:?} headers_included={}",
        result.handle, result.http_status, result.content_length, result.headers_included
    );
    print!("{}", String::from_utf8_lossy(&result.header_bytes));
    Ok(())
}

fn read<T: Transport>(session: &mut BusSession<T>, opt: &Opt, handle: u16, offset: u32, max_bytes: u16) -> Result<(), ProtocolError> {
    let chunk = net::read(session, handle, offset, max_bytes, opt.timeout_duration())?;
    stdout()
        .write_all(&chunk.data)
        .map_err(|e| ProtocolError::orchestration(format!("write to stdout failed: {}", e)))?;
    eprintln!("# eof={} offset={} len={}", chunk.eof, chunk.offset, chunk.data.len());
    Ok(())
}

fn write<T: Transport>(session: &mut BusSession<T>, opt: &Opt, handle: u16, data: &str) -> Result<(), ProtocolError> {
    let ack = net::write(session, handle, 0, data.as_bytes(), opt.timeout_duration())?;
    println!("offset={} written={}", ack.offset, ack.written);
    Ok(())
}

fn close<T: Transport>(session: &mut BusSession<T>, opt: &Opt, handle: u16) -> Result<(), ProtocolError> {
    net::close(session, handle, opt.timeout_duration())
}

#[allow(clippy::too_many_arguments)]
fn get<T: Transport>(
    session: &mut BusSession<T>,
    opt: &Opt,
    url: &str,
    headers: &[(String, String)],
    resp_headers: &[String],
    chunk: u16,
    out: Option<&Path>,
    force: bool,
) -> Result<(), ProtocolError> {
    if let Some(p) = out {
        if p.exists() && !force {
            return Err(ProtocolError::orchestration(format!("{} already exists (use --force to overwrite)", p.display())));
        }
    }

    let (opened, info_result, total) = match out {
        Some(p) => {
            let mut f = File::create(p).map_err(|e| ProtocolError::orchestration(format!("cannot create {}: {}", p.display(), e)))?;
            net::get(session, url, headers, resp_headers, chunk, opt.timeout_duration(), &mut f)?
        }
        None => {
            let mut out = stdout();
            net::get(session, url, headers, resp_headers, chunk, opt.timeout_duration(), &mut out)?
        }
    };

    if let Some(info) = info_result {
        eprintln!("# http_status={:?} content_length={:?} accepted={}", info.http_status, info.content_length, opened.accepted);
    }
    eprintln!("# {} bytes", total);
    Ok(())
}

fn head<T: Transport>(session: &mut BusSession<T>, opt: &Opt, url: &str, headers: &[(String, String)], resp_headers: &[String]) -> Result<(), ProtocolError> {
    let (_opened, info) = net::head(session, url, headers, resp_headers, opt.timeout_duration())?;
    println!("http_status={:?} content_length={:?}", info.http_status, info.content_length);
    print!("{}", String::from_utf8_lossy(&info.header_bytes));
    Ok(())
}

fn send<T: Transport>(
    session: &mut BusSession<T>,
    opt: &Opt,
    url: &str,
    input_file: &Path,
    method: &str,
    headers: &[(String, String)],
    resp_headers: &[String],
    chunk: u16,
) -> Result<(), ProtocolError> {
    let method = match method.to_ascii_lowercase().as_str() {
        "post" => net::Method::Post,
        "put" => net::Method::Put,
        "delete" => net::Method::Delete,
        other => return Err(ProtocolError::orchestration(format!("unsupported method {}", other))),
    };
    let body = std::fs::read(input_file).map_err(|e| ProtocolError::orchestration(format!("cannot read {}: {}", input_file.display(), e)))?;
    let mut sink = stdout();
    let (opened, info) = net::send(session, method, url, headers, &body, resp_headers, chunk, opt.timeout_duration(), Some(&mut sink))?;
    if let Some(info) = info {
        eprintln!("# http_status={:?} accepted={}", info.http_status, opened.accepted);
    }
    Ok(())
}

fn tcp_dispatch<T: Transport>(session: &mut BusSession<T>, opt: &Opt, cmd: &TcpCommand) -> Result<(), ProtocolError> {
    match cmd {
        TcpCommand::Connect { url, wait_connected } => {
            let sess = tcp::tcp_open(session, url, opt.timeout_duration(), *wait_connected, std::time::Duration::from_millis(50))?;
            println!("handle={}", sess.handle);
            Ok(())
        }
        TcpCommand::Sendrecv { url, data, halfclose, idle_timeout } => {
            let mut sess = tcp::tcp_open(session, url, opt.timeout_duration(), true, std::time::Duration::from_millis(50))?;
            let got = tcp::sendrecv(session, &mut sess, data.as_bytes(), 512, std::time::Duration::from_secs(*idle_timeout))?;
            if *halfclose {
                tcp::tcp_halfclose(session, &sess, opt.timeout_duration())?;
            }
            stdout()
                .write_all(&got)
                .map_err(|e| ProtocolError::orchestration(format!("write to stdout failed: {}", e)))?;
            Ok(())
        }
        TcpCommand::Repl { url } => repl(session, opt, url),
    }
}

/// A minimal line-oriented REPL over a TCP stream session, following
/// `original_source/py/fujinet_tools/net_tcp.py`'s `cmd_net_tcp_repl`
/// command set.
fn repl<T: Transport>(session: &mut BusSession<T>, opt: &Opt, url: &str) -> Result<(), ProtocolError> {
    use std::io::{stdin, BufRead};

    let mut sess = tcp::tcp_open(session, url, opt.timeout_duration(), true, std::time::Duration::from_millis(50))?;
    println!("connected, handle={}. Type 'help' for commands.", sess.handle);

    let stdin = stdin();
    for line in stdin.lock().lines() {
        let line = line.map_err(|e| ProtocolError::orchestration(format!("stdin read failed: {}", e)))?;
        let mut parts = line.trim().splitn(2, ' ');
        let cmd = parts.next().unwrap_or("");
        let rest = parts.next().unwrap_or("");
        match cmd {
            "help" => println!("help|open|info|send|sendhex|recv|drain|halfclose|offsets|close|quit"),
            "open" => println!("already open, handle={}", sess.handle),
            "info" => println!("read_offset={} write_offset={}", sess.read_offset, sess.write_offset),
            "send" => {
                let n = tcp::tcp_send(session, &mut sess, rest.as_bytes(), 512, opt.timeout_duration())?;
                println!("sent {} bytes", n);
            }
            "sendhex" => {
                let bytes = super::parse_hex(rest)?;
                let n = tcp::tcp_send(session, &mut sess, &bytes, 512, opt.timeout_duration())?;
                println!("sent {} bytes", n);
            }
            "recv" => {
                let (data, eof) = tcp::tcp_recv_some(session, &mut sess, 512, opt.timeout_duration())?;
                println!("recv {} bytes (eof={}): {}", data.len(), eof, String::from_utf8_lossy(&data));
            }
            "drain" => loop {
                let (data, eof) = tcp::tcp_recv_some(session, &mut sess, 512, Duration::from_millis(50))?;
                if data.is_empty() || eof {
                    break;
                }
                print!("{}", String::from_utf8_lossy(&data));
            },
            "halfclose" => tcp::tcp_halfclose(session, &sess, opt.timeout_duration())?,
            "offsets" => println!("read_offset={} write_offset={}", sess.read_offset, sess.write_offset),
            "close" | "quit" => {
                tcp::tcp_close(session, sess.handle, opt.timeout_duration())?;
                break;
            }
            "" => {}
            other => println!("unknown command: {}", other),
        }
    }
    Ok(())
}
