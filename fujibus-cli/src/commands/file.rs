use std::fs::File;
use std::io::{stdout, Write};
use std::path::Path;

use fujibus_core::devices::file;
use fujibus_core::{BusSession, ProtocolError, Transport};

use crate::cli::Opt;

pub fn stat<T: Transport>(session: &mut BusSession<T>, opt: &Opt, fs: &str, path: &str) -> Result<(), ProtocolError> {
    let info = file::stat(session, fs, path, opt.timeout_duration())?;
    println!(
        "exists={} is_dir={} size={} mtime={}",
        info.exists, info.is_dir, info.size, info.mtime
    );
    Ok(())
}

pub fn list<T: Transport>(session: &mut BusSession<T>, opt: &Opt, fs: &str, path: &str) -> Result<(), ProtocolError> {
    let entries = file::list_all(session, fs, path, opt.timeout_duration())?;
    for e in entries {
        let kind = if e.is_dir { "d" } else { "-" };
        println!("{} {:>10} {:>10} {}", kind, e.size, e.mtime, e.name);
    }
    Ok(())
}

pub fn read<T: Transport>(
    session: &mut BusSession<T>,
    opt: &Opt,
    fs: &str,
    path: &str,
    offset: u32,
    max_bytes: u16,
) -> Result<(), ProtocolError> {
    let chunk = file::read(session, fs, path, offset, max_bytes, opt.timeout_duration())?;
    stdout()
        .write_all(&chunk.data)
        .map_err(|e| ProtocolError::orchestration(format!("write to stdout failed: {}", e)))?;
    eprintln!("# eof={} truncated={} offset={} len={}", chunk.eof, chunk.truncated, chunk.offset, chunk.data.len());
    Ok(())
}

pub fn read_all<T: Transport>(
    session: &mut BusSession<T>,
    opt: &Opt,
    fs: &str,
    path: &str,
    out: Option<&Path>,
    chunk: u16,
) -> Result<(), ProtocolError> {
    let total = match out {
        Some(p) => {
            let mut f = File::create(p).map_err(|e| ProtocolError::orchestration(format!("cannot create {}: {}", p.display(), e)))?;
            file::read_all(session, fs, path, chunk, opt.timeout_duration(), &mut f)?
        }
        None => {
            let mut out = stdout();
            file::read_all(session, fs, path, chunk, opt.timeout_duration(), &mut out)?
        }
    };
    eprintln!("# wrote {} bytes", total);
    Ok(())
}

pub fn write<T: Transport>(
    session: &mut BusSession<T>,
    opt: &Opt,
    fs: &str,
    path: &str,
    input_file: &Path,
    chunk: u16,
) -> Result<(), ProtocolError> {
    let mut f = File::open(input_file).map_err(|e| ProtocolError::orchestration(format!("cannot open {}: {}", input_file.display(), e)))?;
    let total = file::write_all(session, fs, path, chunk, opt.timeout_duration(), &mut f)?;
    eprintln!("# wrote {} bytes to {}:{}", total, fs, path);
    Ok(())
}
