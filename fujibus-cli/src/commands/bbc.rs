use std::fs::File;
use std::io::{stdout, Write};
use std::path::Path;

use fujibus_core::devices::dfs::{self, SECTOR_SIZE};
use fujibus_core::devices::disk;
use fujibus_core::{BusSession, ProtocolError, Transport};

use crate::cli::{BbcCommand, Opt};

pub fn dispatch<T: Transport>(session: &mut BusSession<T>, opt: &Opt, cmd: &BbcCommand) -> Result<(), ProtocolError> {
    match cmd {
        BbcCommand::Info { slot } => info(session, opt, *slot),
        BbcCommand::Cat { slot } => cat(session, opt, *slot),
        BbcCommand::Read { slot, name, out } => read(session, opt, *slot, name, out.as_deref()),
    }
}

fn catalogue_sectors<T: Transport>(
    session: &mut BusSession<T>,
    opt: &Opt,
    slot: u8,
) -> Result<(Vec<u8>, Vec<u8>), ProtocolError> {
    let s0 = disk::read_sector(session, slot, 0, SECTOR_SIZE as u16, opt.timeout_duration())?;
    let s1 = disk::read_sector(session, slot, 1, SECTOR_SIZE as u16, opt.timeout_duration())?;
    Ok((s0.data, s1.data))
}

fn decode_catalogue<T: Transport>(
    session: &mut BusSession<T>,
    opt: &Opt,
    slot: u8,
) -> Result<(dfs::DiskDescriptor, Vec<dfs::FileEntry>), ProtocolError> {
    let (s0, s1) = catalogue_sectors(session, opt, slot)?;
    dfs::parse_catalogue(&s0, &s1).map_err(|e| ProtocolError::orchestration(format!("bad DFS catalogue: {}", e)))
}

fn info<T: Transport>(session: &mut BusSession<T>, opt: &Opt, slot: u8) -> Result<(), ProtocolError> {
    let (desc, _entries) = decode_catalogue(session, opt, slot)?;
    println!(
        "title={:?} cycle={} boot_option={} disc_sectors={} file_count={}",
        desc.title, desc.cycle_bcd, desc.boot_option, desc.disc_sectors, desc.file_count
    );
    Ok(())
}

fn cat<T: Transport>(session: &mut BusSession<T>, opt: &Opt, slot: u8) -> Result<(), ProtocolError> {
    let (_desc, entries) = decode_catalogue(session, opt, slot)?;
    for e in entries {
        println!(
            "{:<12} {}{} load={:06x} exec={:06x} len={:06x} start_sector={}",
            e.full_name(),
            if e.locked { "L" } else { " " },
            ' ',
            e.load_addr,
            e.exec_addr,
            e.length,
            e.start_sector
        );
    }
    Ok(())
}

fn read<T: Transport>(session: &mut BusSession<T>, opt: &Opt, slot: u8, name: &str, out: Option<&Path>) -> Result<(), ProtocolError> {
    let (_desc, entries) = decode_catalogue(session, opt, slot)?;
    let entry = dfs::find_entry(&entries, name)
        .ok_or_else(|| ProtocolError::orchestration(format!("no such file `{}`", name)))?
        .clone();

    let sector_count = ((entry.length as usize + SECTOR_SIZE - 1) / SECTOR_SIZE).max(1);
    let mut data = Vec::with_capacity(entry.length as usize);
    for i in 0..sector_count {
        let lba = entry.start_sector as u32 + i as u32;
        let sector = disk::read_sector(session, slot, lba, SECTOR_SIZE as u16, opt.timeout_duration())?;
        data.extend_from_slice(&sector.data);
    }
    data.truncate(entry.length as usize);

    match out {
        Some(p) => {
            let mut f = File::create(p).map_err(|e| ProtocolError::orchestration(format!("cannot create {}: {}", p.display(), e)))?;
            f.write_all(&data).map_err(|e| ProtocolError::orchestration(format!("write failed: {}", e)))?;
        }
        None => {
            stdout()
                .write_all(&data)
                .map_err(|e| ProtocolError::orchestration(format!("write to stdout failed: {}", e)))?;
        }
    }
    eprintln!("# read {} bytes from {}", data.len(), entry.full_name());
    Ok(())
}
