//! FujiBus packet format (spec §3, §4.3): fixed 6-byte header, a
//! descriptor-varint parameter chain, a folded-8-bit checksum, and a
//! trailing payload.
//!
//! Ported from `original_source/py/fujinet_tools/fujibus.py`
//! (`build_fuji_packet`/`parse_fuji_packet`/`calc_checksum`), keeping the
//! teacher's `scroll`-based byte access for the header fields.

use scroll::{Pread, LE};

use crate::error::DecodeError;
use crate::slip;

pub const HEADER_SIZE: usize = 6;

/// `descr & 0x07` indexes both lookup tables below (spec §3).
const FIELD_SIZE_TABLE: [usize; 8] = [0, 1, 1, 1, 1, 2, 2, 4];
const FIELD_COUNT_TABLE: [usize; 8] = [0, 1, 2, 3, 4, 1, 2, 1];

const DESCR_CONTINUE: u8 = 0x80;

/// A parsed FujiBus packet.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Packet {
    pub device: u8,
    pub command: u8,
    pub length: u16,
    pub checksum: u8,
    pub descr: u8,
    /// Descriptor-encoded scalar parameters, in wire order. Response
    /// packets carry the status code in `params[0]` (spec §3).
    pub params: Vec<u64>,
    pub payload: Vec<u8>,
}

impl Packet {
    /// `params[0]`, or `None` if the descriptor chain encoded no params
    /// at all (malformed for a response, but requests legitimately have
    /// none).
    pub fn status_byte(&self) -> Option<u8> {
        self.params.first().map(|v| *v as u8)
    }
}

/// Fold a running sum the way the firmware's checksum does: repeatedly
/// add the high byte back into the low byte until it fits in a u8.
fn fold(mut chk: u32) -> u8 {
    while chk > 0xFF {
        chk = (chk >> 8) + (chk & 0xFF);
    }
    chk as u8
}

/// `chk = sum(bytes); chk = (chk>>8)+(chk&0xFF); result = chk & 0xFF`
/// (spec §3), computed with the checksum byte (header offset 4) zeroed.
pub fn calc_checksum(data: &[u8]) -> u8 {
    let sum: u32 = data.iter().map(|&b| b as u32).sum();
    fold(sum)
}

/// Build a packet for `device`/`command` carrying `payload`, encoded
/// for the wire (SLIP-framed). A request always has `descr = 0` (no
/// params): spec §4.3 "a request sends descr=0".
pub fn build(device: u8, command: u8, payload: &[u8]) -> Vec<u8> {
    let length = HEADER_SIZE + payload.len();
    let mut pkt = vec![0u8; length];
    pkt[0] = device;
    pkt[1] = command;
    pkt[2..4].copy_from_slice(&(length as u16).to_le_bytes());
    // pkt[4] (checksum) and pkt[5] (descr) start zeroed.
    pkt[HEADER_SIZE..].copy_from_slice(payload);
    let checksum = calc_checksum(&pkt);
    pkt[4] = checksum;
    slip::encode(&pkt)
}

/// Parse a decoded (post-SLIP) byte sequence into a [`Packet`]. Returns
/// `None` for anything structurally invalid (short, length mismatch,
/// bad checksum, truncated descriptor/params) -- these are framing
/// noise per spec §4.3/§7.2, not hard errors; the session layer treats
/// `None` as "keep reading".
pub fn parse(decoded: &[u8]) -> Option<Packet> {
    if decoded.len() < HEADER_SIZE {
        return None;
    }

    let device: u8 = decoded.pread_with(0, LE).ok()?;
    let command: u8 = decoded.pread_with(1, LE).ok()?;
    let length: u16 = decoded.pread_with(2, LE).ok()?;
    let checksum: u8 = decoded.pread_with(4, LE).ok()?;
    let descr: u8 = decoded.pread_with(5, LE).ok()?;

    if length as usize != decoded.len() {
        return None;
    }

    let mut zeroed = decoded.to_vec();
    zeroed[4] = 0;
    if calc_checksum(&zeroed) != checksum {
        return None;
    }

    let mut offset = HEADER_SIZE;

    let mut descr_bytes = vec![descr];
    while *descr_bytes.last().unwrap() & DESCR_CONTINUE != 0 {
        let next: u8 = decoded.get(offset).copied()?;
        descr_bytes.push(next);
        offset += 1;
    }

    let mut params = Vec::new();
    for dbyte in &descr_bytes {
        let field_desc = (dbyte & 0x07) as usize;
        let field_count = FIELD_COUNT_TABLE[field_desc];
        let field_size = FIELD_SIZE_TABLE[field_desc];
        for _ in 0..field_count {
            if offset + field_size > decoded.len() {
                return None;
            }
            let mut v: u64 = 0;
            for i in 0..field_size {
                v |= (decoded[offset + i] as u64) << (8 * i);
            }
            params.push(v);
            offset += field_size;
        }
    }

    let payload = decoded[offset..].to_vec();

    Some(Packet {
        device,
        command,
        length,
        checksum,
        descr,
        params,
        payload,
    })
}

/// Like [`parse`], but surfaces *why* a structurally-sound-looking frame
/// failed -- used only for diagnostics (`--debug` logging); the session
/// layer still uses [`parse`] and treats any failure as "keep reading".
pub fn parse_verbose(decoded: &[u8]) -> Result<Packet, DecodeError> {
    if decoded.len() < HEADER_SIZE {
        return Err(DecodeError::PacketTooShort {
            len: decoded.len(),
            min: HEADER_SIZE,
        });
    }
    let (length, _) = crate::bytes::read_u16le(decoded, 2)?;
    if length as usize != decoded.len() {
        return Err(DecodeError::LengthMismatch {
            header: length as usize,
            actual: decoded.len(),
        });
    }
    let checksum: u8 = decoded[4];
    let mut zeroed = decoded.to_vec();
    zeroed[4] = 0;
    let computed = calc_checksum(&zeroed);
    if computed != checksum {
        return Err(DecodeError::ChecksumMismatch {
            header: checksum,
            computed,
        });
    }
    parse(decoded).ok_or(DecodeError::TruncatedDescriptor)
}

/// Hex + parsed-header debug dump, matching
/// `original_source/py/fujinet_tools/fujibus.py`'s `print_packet`
/// (spec.md §9 supplement, SPEC_FULL.md §3).
pub fn debug_dump(label: &str, raw_slip_frame: &[u8]) -> String {
    use std::fmt::Write as _;
    let mut s = String::new();
    let _ = writeln!(s, "=== {} ===", label);
    if raw_slip_frame.is_empty() {
        s.push_str(" (no data)\n");
        return s;
    }
    let _ = writeln!(s, "SLIP frame ({} bytes): {}", raw_slip_frame.len(), pretty_hex(raw_slip_frame));

    let decoded = slip::decode(raw_slip_frame);
    let _ = writeln!(s, "Decoded packet ({} bytes): {}", decoded.len(), pretty_hex(&decoded));

    match parse_verbose(&decoded) {
        Ok(pkt) => {
            let _ = writeln!(
                s,
                " device=0x{:02X} command=0x{:02X} length={} checksum=0x{:02X} descr=0x{:02X}",
                pkt.device, pkt.command, pkt.length, pkt.checksum, pkt.descr
            );
            let _ = writeln!(s, " params={:?}", pkt.params);
            let _ = writeln!(
                s,
                " payload ({} bytes): {}",
                pkt.payload.len(),
                pretty_hex(&pkt.payload)
            );
        }
        Err(e) => {
            let _ = writeln!(s, " failed to parse: {}", e);
        }
    }
    s
}

pub fn pretty_hex(data: &[u8]) -> String {
    data.iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checksum_round_trip() {
        for payload in [&b""[..], &b"hi"[..], &[0u8; 200][..]] {
            let framed = build(0xFE, 0x01, payload);
            let decoded = slip::decode(&framed);
            let pkt = parse(&decoded).expect("should parse");
            assert_eq!(pkt.device, 0xFE);
            assert_eq!(pkt.command, 0x01);
            assert_eq!(pkt.payload, payload.to_vec());
            assert_eq!(pkt.length as usize, HEADER_SIZE + payload.len());
        }
    }

    #[test]
    fn rejects_short_packets() {
        assert!(parse(&[1, 2, 3]).is_none());
    }

    #[test]
    fn rejects_length_mismatch() {
        let mut raw = build(1, 2, b"x");
        let decoded = slip::decode(&raw);
        let mut bad = decoded.clone();
        bad.push(0xFF); // length field no longer matches actual size
        assert!(parse(&bad).is_none());
        raw.clear();
    }

    #[test]
    fn rejects_bad_checksum() {
        let framed = build(1, 2, b"x");
        let mut decoded = slip::decode(&framed);
        // Flip a payload byte without fixing the checksum.
        *decoded.last_mut().unwrap() ^= 0xFF;
        assert!(parse(&decoded).is_none());
    }

    #[test]
    fn response_descriptor_carries_status_param() {
        // descr=1 -> one u8 field: a typical response status byte.
        let mut pkt = vec![0xFEu8, 0x01, 0, 0, 0, 0x01, 0x04];
        let len = pkt.len() as u16;
        pkt[2] = (len & 0xFF) as u8;
        pkt[3] = (len >> 8) as u8;
        pkt[4] = 0;
        let checksum = calc_checksum(&pkt);
        pkt[4] = checksum;

        let parsed = parse(&pkt).unwrap();
        assert_eq!(parsed.params, vec![4]);
        assert_eq!(parsed.status_byte(), Some(4));
        assert!(parsed.payload.is_empty());
    }

    #[test]
    fn descriptor_chain_beyond_one_continuation_is_parsed() {
        // descr chain: byte0 has continue bit + u8 field (desc=1),
        // byte1 has no continue bit + u16 field (desc=5).
        let header_descr0 = 0x80 | 0x01;
        let header_descr1 = 0x05u8;
        let mut body = vec![header_descr1, 0xAAu8, 0x12, 0x34];
        let mut pkt = vec![0xFEu8, 0x01, 0, 0, 0, header_descr0];
        pkt.append(&mut body);
        let len = pkt.len() as u16;
        pkt[2] = (len & 0xFF) as u8;
        pkt[3] = (len >> 8) as u8;
        let checksum = calc_checksum(&pkt);
        pkt[4] = checksum;

        let parsed = parse(&pkt).expect("multi-byte descriptor chain should parse");
        assert_eq!(parsed.params, vec![0xAA, 0x3412]);
    }

    #[test]
    fn truncated_descriptor_chain_is_rejected() {
        // continuation bit set but no following descriptor byte.
        let mut pkt = vec![0xFEu8, 0x01, 0, 0, 0, 0x80];
        let len = pkt.len() as u16;
        pkt[2] = (len & 0xFF) as u8;
        pkt[3] = (len >> 8) as u8;
        let checksum = calc_checksum(&pkt);
        pkt[4] = checksum;
        assert!(parse(&pkt).is_none());
    }
}
