//! Command-line surface (spec §6), built with `structopt` to match the
//! teacher crate `hf2-cli`'s choice of argument-parsing library.

use std::path::PathBuf;
use std::time::Duration;

use structopt::StructOpt;

#[derive(Debug, StructOpt)]
#[structopt(name = "fujibus", about = "Host-side client for the FujiBus device protocol")]
pub struct Opt {
    /// Serial port or PTY path to the device.
    #[structopt(short = "p", long)]
    pub port: String,

    /// Baud rate.
    #[structopt(long, default_value = "115200")]
    pub baud: u32,

    /// Overall per-call deadline, in seconds.
    #[structopt(long, default_value = "5")]
    pub timeout: u64,

    /// Dump every packet sent/received (also raises the default log
    /// filter to `fujibus_core=debug` if `RUST_LOG` isn't already set).
    #[structopt(short, long)]
    pub debug: bool,

    #[structopt(subcommand)]
    pub command: Command,
}

impl Opt {
    pub fn timeout_duration(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }
}

/// Parse a `KEY=VALUE` pair, used by `--set-header`/similar flags.
pub fn parse_key_val(s: &str) -> Result<(String, String), String> {
    let pos = s.find('=').ok_or_else(|| format!("expected KEY=VALUE, got `{}`", s))?;
    Ok((s[..pos].to_string(), s[pos + 1..].to_string()))
}

#[derive(Debug, StructOpt)]
pub enum Command {
    /// List directory entries under a path (spec §4.6).
    List { fs: String, path: String },

    /// Stat a single path.
    Stat { fs: String, path: String },

    /// Read one chunk at a given offset.
    Read {
        fs: String,
        path: String,
        #[structopt(long, default_value = "0")]
        offset: u32,
        #[structopt(long, default_value = "512")]
        max_bytes: u16,
    },

    /// Read an entire file, chunk by chunk, to stdout or `--out`.
    ReadAll {
        fs: String,
        path: String,
        #[structopt(long)]
        out: Option<PathBuf>,
        #[structopt(long, default_value = "512")]
        chunk: u16,
    },

    /// Write a local file to the device, chunk by chunk.
    Write {
        fs: String,
        path: String,
        input_file: PathBuf,
        #[structopt(long, default_value = "512")]
        chunk: u16,
    },

    /// HTTP(S)-shaped network operations (spec §4.7).
    Net(NetCommand),

    /// Device real-time clock operations (spec §4.9).
    Clock(ClockCommand),

    /// Virtual disk image operations (spec §4.10).
    Disk(DiskCommand),

    /// Acorn DFS 0.90 catalogue operations over a mounted disk (spec §4.11).
    Bbc(BbcCommand),

    /// Modem (Hayes AT command / dial) operations (spec §4.12).
    Modem(ModemCommand),
}

#[derive(Debug, StructOpt)]
pub enum NetCommand {
    /// Open a request without reading its body.
    Open {
        url: String,
        #[structopt(long = "set-header", parse(try_from_str = parse_key_val))]
        headers: Vec<(String, String)>,
        #[structopt(long = "resp-header")]
        resp_headers: Vec<String>,
        #[structopt(long, default_value = "0")]
        flags: u8,
    },
    /// Poll `Info` for a previously opened handle.
    Info { handle: u16 },
    /// Read one chunk from an open handle.
    Read {
        handle: u16,
        #[structopt(long, default_value = "0")]
        offset: u32,
        #[structopt(long, default_value = "512")]
        max_bytes: u16,
    },
    /// Write one chunk to an open handle.
    Write { handle: u16, data: String },
    /// Close an open handle.
    Close { handle: u16 },
    /// `GET` a URL, streaming the body to stdout or `--out`.
    Get {
        url: String,
        #[structopt(long = "set-header", parse(try_from_str = parse_key_val))]
        headers: Vec<(String, String)>,
        #[structopt(long = "resp-header")]
        resp_headers: Vec<String>,
        #[structopt(long, default_value = "512")]
        chunk: u16,
        #[structopt(long)]
        out: Option<PathBuf>,
        #[structopt(long)]
        force: bool,
    },
    /// `HEAD` a URL, printing status/headers only.
    Head {
        url: String,
        #[structopt(long = "set-header", parse(try_from_str = parse_key_val))]
        headers: Vec<(String, String)>,
        #[structopt(long = "resp-header")]
        resp_headers: Vec<String>,
    },
    /// `POST`/`PUT` a local file's bytes to a URL.
    Send {
        url: String,
        input_file: PathBuf,
        #[structopt(long, default_value = "post")]
        method: String,
        #[structopt(long = "set-header", parse(try_from_str = parse_key_val))]
        headers: Vec<(String, String)>,
        #[structopt(long = "resp-header")]
        resp_headers: Vec<String>,
        #[structopt(long, default_value = "512")]
        chunk: u16,
    },
    /// Raw TCP stream operations over the `tcp://` URL scheme (spec §4.8).
    Tcp(TcpCommand),
}

#[derive(Debug, StructOpt)]
pub enum TcpCommand {
    /// Connect and optionally wait until the device reports connected.
    Connect {
        url: String,
        #[structopt(long)]
        wait_connected: bool,
    },
    /// Send bytes and read back an equal-length echo.
    Sendrecv {
        url: String,
        data: String,
        #[structopt(long)]
        halfclose: bool,
        #[structopt(long, default_value = "5")]
        idle_timeout: u64,
    },
    /// Interactive line-oriented REPL
    /// (`help`/`open`/`info`/`send`/`sendhex`/`recv`/`drain`/`halfclose`/
    /// `offsets`/`close`/`quit`).
    Repl { url: String },
}

#[derive(Debug, StructOpt)]
pub enum ClockCommand {
    /// Read the device's Unix time.
    Get,
    /// Set the device's Unix time.
    Set { unix_seconds: u64 },
    /// Get a formatted time representation.
    GetFormat { format: String },
    /// Get a formatted time representation in a given timezone.
    GetTz { tz: String, format: String },
    /// Get the device's current POSIX timezone string.
    GetTimezone,
    /// Set the device's timezone for this session only.
    SetTimezone { tz: String },
    /// Set and persist the device's timezone.
    SetTimezoneSave { tz: String },
}

#[derive(Debug, StructOpt)]
pub enum DiskCommand {
    /// Mount a disk image into a slot.
    Mount {
        slot: u8,
        fs: String,
        path: String,
        #[structopt(long)]
        readonly: bool,
        #[structopt(long, default_value = "0")]
        img_type: u8,
    },
    /// Unmount a slot.
    Unmount { slot: u8 },
    /// Query slot info.
    Info { slot: u8 },
    /// Clear the slot's changed flag.
    ClearChanged { slot: u8 },
    /// Read a raw sector.
    ReadSector {
        slot: u8,
        lba: u32,
        #[structopt(long, default_value = "256")]
        max_bytes: u16,
    },
    /// Write a raw sector (hex-encoded data).
    WriteSector { slot: u8, lba: u32, data_hex: String },
    /// Create a new disk image on the device's filesystem.
    Create {
        fs: String,
        path: String,
        #[structopt(long, default_value = "0")]
        img_type: u8,
        #[structopt(long, default_value = "256")]
        sector_size: u16,
        sector_count: u32,
        #[structopt(long)]
        overwrite: bool,
    },
}

#[derive(Debug, StructOpt)]
pub enum BbcCommand {
    /// Print the disk descriptor (title, cycle, boot option, sector count).
    Info { slot: u8 },
    /// List the catalogue's file entries.
    Cat { slot: u8 },
    /// Read one cataloged file's bytes to stdout or `--out`.
    Read {
        slot: u8,
        name: String,
        #[structopt(long)]
        out: Option<PathBuf>,
    },
}

#[derive(Debug, StructOpt)]
pub enum ModemCommand {
    /// Print the modem status register.
    Status,
    /// Send an AT command and print whatever the modem drains back.
    At { command: String },
    /// Dial a `host:port` target and wait for CONNECT/NO CARRIER.
    Dial { target: String },
    /// Drain any pending output without sending anything.
    Drain {
        #[structopt(long, default_value = "65536")]
        max_total: usize,
    },
    /// Write raw bytes at a given offset.
    Write { offset: u32, data: String },
    /// Read raw bytes from a given offset.
    Read {
        offset: u32,
        #[structopt(long, default_value = "512")]
        max_bytes: u16,
    },
    /// Send bytes and wait for an equal-length reply.
    Sendrecv { data: String },
    /// Hang up an active connection.
    Hangup,
    /// Interactive terminal bridge (data contract only; no raw-mode
    /// terminal handling -- see spec.md Non-goals).
    Term,
}
