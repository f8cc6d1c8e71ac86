//! Intel HEX → binary conversion for the bootloader firmware-write path — `spec.md` §6,
//! original `utils.py`'s `intel_hex_to_bin`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum IntelHexError {
    #[error("record line {0} is malformed")]
    MalformedRecord(usize),
    #[error("record line {0} has a byte count that doesn't match its data")]
    ByteCountMismatch(usize),
}

/// Decodes Intel HEX text into the flat binary image it describes.
///
/// Supports data records (type 00), end-of-file (01), extended segment address (02) and
/// extended linear address (04); any other record type is ignored, matching the original
/// converter, which only ever saw these four from the devices it flashed.
pub fn parse_intel_hex(text: &str) -> Result<Vec<u8>, IntelHexError> {
    let mut result: Vec<u8> = Vec::new();
    let mut highest = 0usize;
    let mut addr_segment = 0usize;
    let mut addr_extended = 0usize;

    for (line_no, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if !line.starts_with(':') || line.len() < 11 || line.len() % 2 == 0 {
            return Err(IntelHexError::MalformedRecord(line_no));
        }
        let bytes = decode_hex(&line[1..]).ok_or(IntelHexError::MalformedRecord(line_no))?;

        let count = bytes[0] as usize;
        let addr_hi = bytes[1] as usize;
        let addr_lo = bytes[2] as usize;
        let record_type = bytes[3];
        let payload = &bytes[4..4 + count];
        if bytes.len() != 4 + count + 1 {
            return Err(IntelHexError::ByteCountMismatch(line_no));
        }

        match record_type {
            0x00 => {
                let addr = addr_extended + addr_segment + addr_hi * 256 + addr_lo;
                highest = highest.max(addr + count);
                if highest > result.len() {
                    result.resize(highest, 0xFF);
                }
                result[addr..addr + count].copy_from_slice(payload);
            }
            0x01 => break,
            0x02 => {
                addr_segment = 16 * ((payload[0] as usize) * 256 + payload[1] as usize);
            }
            0x04 => {
                addr_extended = 65536 * payload[1] as usize;
            }
            _ => {}
        }
    }

    result.truncate(highest);
    Ok(result)
}

fn decode_hex(s: &str) -> Option<Vec<u8>> {
    if s.len() % 2 != 0 {
        return None;
    }
    (0..s.len()).step_by(2).map(|i| u8::from_str_radix(&s[i..i + 2], 16).ok()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_a_single_data_record_followed_by_eof() {
        // ":04000000DEADBEEF" data, checksum byte appended as 00 (not validated).
        let text = ":04000000DEADBEEF00\n:00000001FF\n";
        let bin = parse_intel_hex(text).unwrap();
        assert_eq!(bin, vec![0xDE, 0xAD, 0xBE, 0xEF]);
    }

    #[test]
    fn extended_linear_address_offsets_subsequent_records() {
        let text = ":02000004000100\n:04000000DEADBEEF00\n:00000001FF\n";
        let bin = parse_intel_hex(text).unwrap();
        assert_eq!(bin.len(), 0x1_0000 + 4);
        assert_eq!(&bin[0x1_0000..], &[0xDE, 0xAD, 0xBE, 0xEF]);
    }

    #[test]
    fn rejects_a_line_not_starting_with_colon() {
        let err = parse_intel_hex("not a hex record\n").unwrap_err();
        assert!(matches!(err, IntelHexError::MalformedRecord(0)));
    }
}
