use std::convert::TryFrom;

use fujibus_core::devices::disk::{self, ImageType};
use fujibus_core::{BusSession, ProtocolError, Transport};

use crate::cli::{DiskCommand, Opt};
use crate::commands::parse_hex;

pub fn dispatch<T: Transport>(session: &mut BusSession<T>, opt: &Opt, cmd: &DiskCommand) -> Result<(), ProtocolError> {
    match cmd {
        DiskCommand::Mount { slot, fs, path, readonly, img_type } => mount(session, opt, *slot, fs, path, *readonly, *img_type),
        DiskCommand::Unmount { slot } => unmount(session, opt, *slot),
        DiskCommand::Info { slot } => info(session, opt, *slot),
        DiskCommand::ClearChanged { slot } => clear_changed(session, opt, *slot),
        DiskCommand::ReadSector { slot, lba, max_bytes } => read_sector(session, opt, *slot, *lba, *max_bytes),
        DiskCommand::WriteSector { slot, lba, data_hex } => write_sector(session, opt, *slot, *lba, data_hex),
        DiskCommand::Create { fs, path, img_type, sector_size, sector_count, overwrite } => {
            create(session, opt, fs, path, *img_type, *sector_size, *sector_count, *overwrite)
        }
    }
}

fn parse_img_type(v: u8) -> Result<ImageType, ProtocolError> {
    ImageType::try_from(v).map_err(|_| ProtocolError::orchestration(format!("unknown image type {}", v)))
}

fn mount<T: Transport>(
    session: &mut BusSession<T>,
    opt: &Opt,
    slot: u8,
    fs: &str,
    path: &str,
    readonly: bool,
    img_type: u8,
) -> Result<(), ProtocolError> {
    let img_type = parse_img_type(img_type)?;
    let result = disk::mount(session, slot, fs, path, readonly, img_type, 0, opt.timeout_duration())?;
    println!(
        "mounted={} readonly={} slot={} img_type={} sector_size={} sector_count={}",
        result.mounted, result.readonly, result.slot, result.img_type, result.sector_size, result.sector_count
    );
    Ok(())
}

fn unmount<T: Transport>(session: &mut BusSession<T>, opt: &Opt, slot: u8) -> Result<(), ProtocolError> {
    disk::unmount(session, slot, opt.timeout_duration())
}

fn info<T: Transport>(session: &mut BusSession<T>, opt: &Opt, slot: u8) -> Result<(), ProtocolError> {
    let info = disk::info(session, slot, opt.timeout_duration())?;
    println!(
        "inserted={} readonly={} dirty={} changed={} slot={} img_type={} sector_size={} sector_count={} last_error={}",
        info.inserted, info.readonly, info.dirty, info.changed, info.slot, info.img_type, info.sector_size, info.sector_count, info.last_error
    );
    Ok(())
}

fn clear_changed<T: Transport>(session: &mut BusSession<T>, opt: &Opt, slot: u8) -> Result<(), ProtocolError> {
    disk::clear_changed(session, slot, opt.timeout_duration())
}

fn read_sector<T: Transport>(session: &mut BusSession<T>, opt: &Opt, slot: u8, lba: u32, max_bytes: u16) -> Result<(), ProtocolError> {
    let sector = disk::read_sector(session, slot, lba, max_bytes, opt.timeout_duration())?;
    println!("lba={} truncated={} {} bytes:", sector.lba, sector.truncated, sector.data.len());
    println!("{}", hex_dump(&sector.data));
    Ok(())
}

fn write_sector<T: Transport>(session: &mut BusSession<T>, opt: &Opt, slot: u8, lba: u32, data_hex: &str) -> Result<(), ProtocolError> {
    let data = parse_hex(data_hex)?;
    let ack = disk::write_sector(session, slot, lba, &data, opt.timeout_duration())?;
    println!("lba={} written_len={}", ack.lba, ack.written_len);
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn create<T: Transport>(
    session: &mut BusSession<T>,
    opt: &Opt,
    fs: &str,
    path: &str,
    img_type: u8,
    sector_size: u16,
    sector_count: u32,
    overwrite: bool,
) -> Result<(), ProtocolError> {
    let img_type = parse_img_type(img_type)?;
    disk::create(session, fs, path, img_type, sector_size, sector_count, overwrite, opt.timeout_duration())?;
    println!("created {}:{} ({} sectors x {} bytes)", fs, path, sector_count, sector_size);
    Ok(())
}

/// A simple `offset: hex bytes` dump, 16 bytes per line.
pub(crate) fn hex_dump(data: &[u8]) -> String {
    let mut out = String::new();
    for (i, chunk) in data.chunks(16).enumerate() {
        let hex: Vec<String> = chunk.iter().map(|b| format!("{:02x}", b)).collect();
        out.push_str(&format!("{:06x}  {}\n", i * 16, hex.join(" ")));
    }
    out
}
