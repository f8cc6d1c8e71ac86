//! Device-id string format: `"<protocol>://<bus>/<0xHHH>"` (`spec.md` §6).
//!
//! Promoted from the original's "soft interface" status to a fully tested module because
//! the format is declared normative.

use crate::consts::ProtocolKind;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DevIdError {
    #[error("malformed device id: {0:?}")]
    Malformed(String),
    #[error("unknown protocol token: {0:?}")]
    UnknownProtocol(String),
}

/// Builds `"<protocol>://<bus>/<0xhhh>"`, address lower-case and zero-padded to 3 hex digits.
pub fn create_dev_id(protocol: ProtocolKind, bus: &str, xc2_addr: u16) -> String {
    format!("{}://{}/0x{:03x}", protocol.protocol_name(), bus, xc2_addr)
}

/// Inverse of [`create_dev_id`]. Accepts decimal or `0x`-prefixed hex addresses and is
/// case-insensitive on the protocol token.
pub fn parse_dev_id(dev_id: &str) -> Result<(ProtocolKind, String, u16), DevIdError> {
    let (proto_str, rest) = dev_id
        .split_once("://")
        .ok_or_else(|| DevIdError::Malformed(dev_id.to_string()))?;
    let (bus, addr_str) = rest
        .rsplit_once('/')
        .ok_or_else(|| DevIdError::Malformed(dev_id.to_string()))?;

    let protocol = match proto_str.to_ascii_uppercase().as_str() {
        "XC2" => ProtocolKind::Xc2,
        "MOD" => ProtocolKind::Modbus,
        "XCT" => ProtocolKind::Xct,
        other => return Err(DevIdError::UnknownProtocol(other.to_string())),
    };

    let addr = str_to_int(addr_str).map_err(|_| DevIdError::Malformed(dev_id.to_string()))?;
    Ok((protocol, bus.to_string(), addr))
}

/// Checks whether `dev_id` round-trips through [`parse_dev_id`] without raising.
pub fn check_dev_id_format(dev_id: &str) -> bool {
    parse_dev_id(dev_id).is_ok()
}

/// Parses a decimal or `0x`-prefixed hexadecimal integer string (same leniency as the
/// original `str_to_int`).
pub fn str_to_int(s: &str) -> Result<u16, std::num::ParseIntError> {
    let s = s.trim();
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u16::from_str_radix(hex, 16)
    } else {
        s.parse::<u16>()
    }
}
