//! Disk subdevice (spec §4.10): mount/unmount a virtual disk image into
//! a device-issued slot, then read/write raw sectors.
//!
//! Ported from `original_source/py/fujinet_tools/diskproto.py`
//! (`build_mount_req`/`parse_mount_resp`/... and the `ImageType` table).

use std::convert::TryFrom;
use std::time::Duration;

use crate::bytes::{self, Reader};
use crate::device_id::DISK;
use crate::devices::PROTOCOL_VERSION;
use crate::error::ProtocolError;
use crate::session::{self, BusSession};
use crate::transport::Transport;

pub const CMD_MOUNT: u8 = 1;
pub const CMD_UNMOUNT: u8 = 2;
pub const CMD_READ_SECTOR: u8 = 3;
pub const CMD_WRITE_SECTOR: u8 = 4;
pub const CMD_INFO: u8 = 5;
pub const CMD_CLEAR_CHANGED: u8 = 6;
pub const CMD_CREATE: u8 = 7;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ImageType {
    Auto = 0,
    Atr = 1,
    Ssd = 2,
    Dsd = 3,
    Raw = 4,
}

impl ImageType {
    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for ImageType {
    type Error = ();
    fn try_from(v: u8) -> Result<Self, ()> {
        match v {
            0 => Ok(ImageType::Auto),
            1 => Ok(ImageType::Atr),
            2 => Ok(ImageType::Ssd),
            3 => Ok(ImageType::Dsd),
            4 => Ok(ImageType::Raw),
            _ => Err(()),
        }
    }
}

fn build_slot_request(slot: u8) -> Vec<u8> {
    let mut out = Vec::new();
    bytes::write_version(&mut out, PROTOCOL_VERSION);
    bytes::write_u8(&mut out, slot);
    out
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MountResult {
    pub mounted: bool,
    pub readonly: bool,
    pub slot: u8,
    pub img_type: u8,
    pub sector_size: u16,
    pub sector_count: u32,
}

fn decode_mount_response(payload: &[u8]) -> Result<MountResult, ProtocolError> {
    let mut r = Reader::new(payload);
    bytes::read_version(&mut r, PROTOCOL_VERSION)?;
    let flags = r.u8()?;
    let _reserved = r.u16()?;
    let slot = r.u8()?;
    let img_type = r.u8()?;
    let sector_size = r.u16()?;
    let sector_count = r.u32()?;
    r.finish()?;
    Ok(MountResult {
        mounted: flags & 0x01 != 0,
        readonly: flags & 0x02 != 0,
        slot,
        img_type,
        sector_size,
        sector_count,
    })
}

/// `Mount` a disk image into `slot` (spec §4.10, slot range 1-255).
#[allow(clippy::too_many_arguments)]
pub fn mount<T: Transport>(
    session: &mut BusSession<T>,
    slot: u8,
    fs: &str,
    path: &str,
    readonly: bool,
    type_override: ImageType,
    sector_size_hint: u16,
    timeout: Duration,
) -> Result<MountResult, ProtocolError> {
    let mut payload = Vec::new();
    bytes::write_version(&mut payload, PROTOCOL_VERSION);
    bytes::write_u8(&mut payload, slot);
    bytes::write_u8(&mut payload, if readonly { 0x01 } else { 0x00 });
    bytes::write_u8(&mut payload, type_override.as_u8());
    bytes::write_u16le(&mut payload, sector_size_hint);
    bytes::write_lp_u16_str(&mut payload, fs);
    bytes::write_lp_u16_str(&mut payload, path);

    let pkt = session.send_retrying(DISK, CMD_MOUNT, &payload, timeout)?;
    session::require_ok(&pkt)?;
    decode_mount_response(&pkt.payload)
}

pub fn unmount<T: Transport>(session: &mut BusSession<T>, slot: u8, timeout: Duration) -> Result<(), ProtocolError> {
    let payload = build_slot_request(slot);
    let pkt = session.send_retrying(DISK, CMD_UNMOUNT, &payload, timeout)?;
    session::require_ok(&pkt)
}

pub fn clear_changed<T: Transport>(session: &mut BusSession<T>, slot: u8, timeout: Duration) -> Result<(), ProtocolError> {
    let payload = build_slot_request(slot);
    let pkt = session.send_retrying(DISK, CMD_CLEAR_CHANGED, &payload, timeout)?;
    session::require_ok(&pkt)
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DiskInfo {
    pub inserted: bool,
    pub readonly: bool,
    pub dirty: bool,
    pub changed: bool,
    pub slot: u8,
    pub img_type: u8,
    pub sector_size: u16,
    pub sector_count: u32,
    pub last_error: u8,
}

fn decode_info_response(payload: &[u8]) -> Result<DiskInfo, ProtocolError> {
    let mut r = Reader::new(payload);
    bytes::read_version(&mut r, PROTOCOL_VERSION)?;
    let flags = r.u8()?;
    let _reserved = r.u16()?;
    let slot = r.u8()?;
    let img_type = r.u8()?;
    let sector_size = r.u16()?;
    let sector_count = r.u32()?;
    let last_error = r.u8()?;
    r.finish()?;
    Ok(DiskInfo {
        inserted: flags & 0x01 != 0,
        readonly: flags & 0x02 != 0,
        dirty: flags & 0x04 != 0,
        changed: flags & 0x08 != 0,
        slot,
        img_type,
        sector_size,
        sector_count,
        last_error,
    })
}

pub fn info<T: Transport>(session: &mut BusSession<T>, slot: u8, timeout: Duration) -> Result<DiskInfo, ProtocolError> {
    let payload = build_slot_request(slot);
    let pkt = session.send_retrying(DISK, CMD_INFO, &payload, timeout)?;
    session::require_ok(&pkt)?;
    decode_info_response(&pkt.payload)
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SectorData {
    pub truncated: bool,
    pub slot: u8,
    pub lba: u32,
    pub data: Vec<u8>,
}

fn decode_read_sector_response(payload: &[u8]) -> Result<SectorData, ProtocolError> {
    let mut r = Reader::new(payload);
    bytes::read_version(&mut r, PROTOCOL_VERSION)?;
    let flags = r.u8()?;
    let _reserved = r.u16()?;
    let slot = r.u8()?;
    let lba = r.u32()?;
    let data_len = r.u16()?;
    let data = r.take(data_len as usize)?.to_vec();
    r.finish()?;
    Ok(SectorData {
        truncated: flags & 0x01 != 0,
        slot,
        lba,
        data,
    })
}

pub fn read_sector<T: Transport>(
    session: &mut BusSession<T>,
    slot: u8,
    lba: u32,
    max_bytes: u16,
    timeout: Duration,
) -> Result<SectorData, ProtocolError> {
    let max_bytes = max_bytes.max(1);
    let mut payload = build_slot_request(slot);
    bytes::write_u32le(&mut payload, lba);
    bytes::write_u16le(&mut payload, max_bytes);
    let pkt = session.send_retrying(DISK, CMD_READ_SECTOR, &payload, timeout)?;
    session::require_ok(&pkt)?;
    decode_read_sector_response(&pkt.payload)
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SectorWriteAck {
    pub slot: u8,
    pub lba: u32,
    pub written_len: u16,
}

fn decode_write_sector_response(payload: &[u8]) -> Result<SectorWriteAck, ProtocolError> {
    let mut r = Reader::new(payload);
    bytes::read_version(&mut r, PROTOCOL_VERSION)?;
    let _flags = r.u8()?;
    let _reserved = r.u16()?;
    let slot = r.u8()?;
    let lba = r.u32()?;
    let written_len = r.u16()?;
    r.finish()?;
    Ok(SectorWriteAck { slot, lba, written_len })
}

pub fn write_sector<T: Transport>(
    session: &mut BusSession<T>,
    slot: u8,
    lba: u32,
    data: &[u8],
    timeout: Duration,
) -> Result<SectorWriteAck, ProtocolError> {
    let mut payload = build_slot_request(slot);
    bytes::write_u32le(&mut payload, lba);
    bytes::write_lp_u16_bytes(&mut payload, data);
    let pkt = session.send_retrying(DISK, CMD_WRITE_SECTOR, &payload, timeout)?;
    session::require_ok(&pkt)?;
    decode_write_sector_response(&pkt.payload)
}

/// `Create` a new disk image on the device's filesystem (spec §4.10).
#[allow(clippy::too_many_arguments)]
pub fn create<T: Transport>(
    session: &mut BusSession<T>,
    fs: &str,
    path: &str,
    img_type: ImageType,
    sector_size: u16,
    sector_count: u32,
    overwrite: bool,
    timeout: Duration,
) -> Result<(), ProtocolError> {
    let mut payload = Vec::new();
    bytes::write_version(&mut payload, PROTOCOL_VERSION);
    bytes::write_lp_u16_str(&mut payload, fs);
    bytes::write_lp_u16_str(&mut payload, path);
    bytes::write_u8(&mut payload, img_type.as_u8());
    bytes::write_u16le(&mut payload, sector_size);
    bytes::write_u32le(&mut payload, sector_count);
    bytes::write_u8(&mut payload, if overwrite { 0x01 } else { 0x00 });

    let pkt = session.send_retrying(DISK, CMD_CREATE, &payload, timeout)?;
    session::require_ok(&pkt)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mount_response_decodes_flags() {
        let mut payload = Vec::new();
        bytes::write_version(&mut payload, PROTOCOL_VERSION);
        bytes::write_u8(&mut payload, 0x03); // mounted | readonly
        bytes::write_u16le(&mut payload, 0);
        bytes::write_u8(&mut payload, 1);
        bytes::write_u8(&mut payload, ImageType::Ssd.as_u8());
        bytes::write_u16le(&mut payload, 256);
        bytes::write_u32le(&mut payload, 800);

        let mount = decode_mount_response(&payload).unwrap();
        assert!(mount.mounted);
        assert!(mount.readonly);
        assert_eq!(mount.slot, 1);
        assert_eq!(mount.sector_count, 800);
    }

    #[test]
    fn info_response_decodes_all_four_flag_bits() {
        let mut payload = Vec::new();
        bytes::write_version(&mut payload, PROTOCOL_VERSION);
        bytes::write_u8(&mut payload, 0x0F);
        bytes::write_u16le(&mut payload, 0);
        bytes::write_u8(&mut payload, 2);
        bytes::write_u8(&mut payload, ImageType::Dsd.as_u8());
        bytes::write_u16le(&mut payload, 256);
        bytes::write_u32le(&mut payload, 1600);
        bytes::write_u8(&mut payload, 0);

        let info = decode_info_response(&payload).unwrap();
        assert!(info.inserted && info.readonly && info.dirty && info.changed);
    }

    #[test]
    fn image_type_round_trips_through_try_from() {
        assert_eq!(ImageType::try_from(2), Ok(ImageType::Ssd));
        assert!(ImageType::try_from(99).is_err());
    }
}
