//! SLIP framing (spec §4.2): escape/unescape and incremental frame
//! extraction from a caller-owned growing buffer.
//!
//! Ported from `original_source/py/fujinet_tools/fujibus.py`
//! (`slip_encode`/`slip_decode`/`_extract_frame_from_rx`).

pub const END: u8 = 0xC0;
pub const ESC: u8 = 0xDB;
pub const ESC_END: u8 = 0xDC;
pub const ESC_ESC: u8 = 0xDD;

/// Safety cap on the receive buffer: if no complete frame has appeared
/// by the time the buffer grows past this, it's cleared and framing
/// resyncs from scratch (spec §4.2, open question resolved in favor of
/// the larger of the two constants the original drafts disagreed on).
pub const MAX_BUFFER: usize = 256 * 1024;

/// Escape `payload` and wrap it in leading/trailing `END` bytes.
pub fn encode(payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(payload.len() + 2);
    out.push(END);
    for &b in payload {
        match b {
            END => {
                out.push(ESC);
                out.push(ESC_END);
            }
            ESC => {
                out.push(ESC);
                out.push(ESC_ESC);
            }
            _ => out.push(b),
        }
    }
    out.push(END);
    out
}

/// Unescape a full SLIP frame (including its leading/trailing `END`
/// bytes) and return the inner payload. Returns an empty vector for a
/// malformed or empty frame -- callers treat that as "ignore and keep
/// reading" per spec §4.2/§7.2, not as a hard error.
pub fn decode(frame: &[u8]) -> Vec<u8> {
    if frame.len() < 2 || frame[0] != END || frame[frame.len() - 1] != END {
        return Vec::new();
    }
    let inner = &frame[1..frame.len() - 1];
    let mut out = Vec::with_capacity(inner.len());
    let mut i = 0;
    while i < inner.len() {
        let b = inner[i];
        if b == ESC {
            i += 1;
            if i >= inner.len() {
                break;
            }
            match inner[i] {
                ESC_END => out.push(END),
                ESC_ESC => out.push(ESC),
                // Unknown escape byte: pass the ESC through literally
                // and drop the byte that followed it (spec §4.2:
                // "Unknown escape bytes are tolerated").
                _other => out.push(ESC),
            }
        } else {
            out.push(b);
        }
        i += 1;
    }
    out
}

/// Scan `buf` for one complete SLIP frame (`END ... END`), remove it
/// from `buf`, and return it. Junk bytes preceding the first `END` are
/// dropped. Returns `None` (leaving `buf` with only a leading partial
/// frame, if any) when no closing `END` has arrived yet.
///
/// Applies the [`MAX_BUFFER`] safety cap: if `buf` grows past it without
/// ever framing, it is cleared so a future byte stream can resync.
pub fn extract_one(buf: &mut Vec<u8>) -> Option<Vec<u8>> {
    if buf.len() > MAX_BUFFER {
        buf.clear();
        return None;
    }

    let start = match buf.iter().position(|&b| b == END) {
        Some(p) => p,
        None => {
            // No leading END anywhere in buf: none of it can ever frame,
            // so drop it rather than let junk accumulate (spec §4.2).
            buf.clear();
            return None;
        }
    };
    if start > 0 {
        buf.drain(..start);
    }

    // Search for the closing END strictly after position 0.
    let end = buf[1..].iter().position(|&b| b == END).map(|p| p + 1)?;

    let frame: Vec<u8> = buf.drain(..=end).collect();
    Some(frame)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slip_round_trip() {
        let samples: &[&[u8]] = &[
            &[],
            &[0x01],
            &[END],
            &[ESC],
            &[END, ESC, 0x42, END, ESC],
            &(0u8..=255).collect::<Vec<u8>>(),
        ];
        for s in samples {
            let encoded = encode(s);
            assert_eq!(decode(&encoded), *s);
        }
    }

    #[test]
    fn unknown_escape_passes_esc_through_and_drops_following_byte() {
        // ESC followed by something other than ESC_END/ESC_ESC.
        let frame = [END, ESC, 0x01, END];
        assert_eq!(decode(&frame), vec![ESC]);
    }

    #[test]
    fn extract_drops_junk_before_first_end() {
        let mut buf = vec![0xFF, 0xFE, END, 0x01, 0x02, END];
        let frame = extract_one(&mut buf).unwrap();
        assert_eq!(frame, vec![END, 0x01, 0x02, END]);
        assert!(buf.is_empty());
    }

    #[test]
    fn extract_returns_none_without_full_frame() {
        let mut buf = vec![END, 0x01, 0x02];
        assert!(extract_one(&mut buf).is_none());
        // leading bytes kept for when the rest arrives
        assert_eq!(buf, vec![END, 0x01, 0x02]);
    }

    #[test]
    fn extract_clears_buffer_with_no_end_byte_at_all() {
        let mut buf = vec![0x01, 0x02, 0x03];
        assert!(extract_one(&mut buf).is_none());
        assert!(buf.is_empty());
    }

    #[test]
    fn empty_frame_is_legal_and_decodes_empty() {
        let frame = [END, END];
        assert_eq!(decode(&frame), Vec::<u8>::new());
    }

    #[test]
    fn framer_idempotence_over_two_concatenated_frames() {
        let f1 = encode(b"first");
        let f2 = encode(b"second-frame");
        let mut buf = Vec::new();
        buf.extend_from_slice(&f1);
        buf.extend_from_slice(&f2);

        let got1 = extract_one(&mut buf).unwrap();
        let got2 = extract_one(&mut buf).unwrap();
        assert_eq!(decode(&got1), b"first");
        assert_eq!(decode(&got2), b"second-frame");
        assert!(buf.is_empty());
        assert!(extract_one(&mut buf).is_none());
    }

    #[test]
    fn buffer_past_safety_cap_is_cleared() {
        let mut buf = vec![END];
        buf.extend(std::iter::repeat(0x41).take(MAX_BUFFER + 1));
        assert!(extract_one(&mut buf).is_none());
        assert!(buf.is_empty());
    }
}
