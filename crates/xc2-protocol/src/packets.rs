//! XC2 and Modbus-XC2 frame encode/parse — `spec.md` §3, §4.1.

use crate::consts::{XC2PacketType, XC2_MODBUS_FCN};
use crate::crc::{modbus_crc16, xc2_crc16};
use crate::error::CodecError;

/// Common surface the bus needs to route and match packets, regardless of which binary
/// protocol (`XC2Packet` directly, or `ModbusPacket` wrapping one) is in use on a given bus.
pub trait Frame: Sized {
    fn encode(&self) -> Vec<u8>;
    fn parse(buf: &[u8]) -> Result<(Self, &[u8]), CodecError>;
    fn pkt_type(&self) -> XC2PacketType;
    fn cmd(&self) -> u8;
    fn src(&self) -> u16;
    fn dst(&self) -> u16;
    fn with_dst(self, dst: u16) -> Self;
}

impl Frame for XC2Packet {
    fn encode(&self) -> Vec<u8> {
        self.raw_packet()
    }
    fn parse(buf: &[u8]) -> Result<(Self, &[u8]), CodecError> {
        Self::parse_bytes(buf)
    }
    fn pkt_type(&self) -> XC2PacketType {
        self.pkt_type
    }
    fn cmd(&self) -> u8 {
        self.cmd
    }
    fn src(&self) -> u16 {
        self.src
    }
    fn dst(&self) -> u16 {
        self.dst
    }
    fn with_dst(mut self, dst: u16) -> Self {
        self.dst = dst;
        self
    }
}

impl Frame for ModbusPacket {
    fn encode(&self) -> Vec<u8> {
        self.raw_packet()
    }
    fn parse(buf: &[u8]) -> Result<(Self, &[u8]), CodecError> {
        Self::parse_bytes(buf)
    }
    fn pkt_type(&self) -> XC2PacketType {
        self.inner.pkt_type
    }
    fn cmd(&self) -> u8 {
        self.inner.cmd
    }
    fn src(&self) -> u16 {
        self.inner.src
    }
    fn dst(&self) -> u16 {
        self.inner.dst
    }
    fn with_dst(mut self, dst: u16) -> Self {
        self.inner.dst = dst;
        self
    }
}

/// A decoded XC2 frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XC2Packet {
    pub pkt_type: XC2PacketType,
    pub dst: u16,
    pub src: u16,
    /// Raw flags byte, in the same top-nibble form as `XC2Flags` (e.g. `MULTICAST = 0x80`);
    /// only the top 4 bits are meaningful.
    pub flags: u8,
    pub cmd: u8,
    pub data: Vec<u8>,
}

impl XC2Packet {
    pub fn new(pkt_type: XC2PacketType, dst: u16, src: u16, cmd: u8, data: Vec<u8>, flags: u8) -> Self {
        Self { pkt_type, dst, src, flags: flags & 0xF0, cmd, data }
    }

    /// `length` field as it goes on the wire: 6 header/cmd bytes plus the payload.
    pub fn length(&self) -> u8 {
        (6 + self.data.len()) as u8
    }

    /// Encode to the wire format described in `spec.md` §3, including the trailing CRC.
    pub fn raw_packet(&self) -> Vec<u8> {
        let length = self.length();
        let mut buf = Vec::with_capacity(length as usize + 2);
        buf.push((self.pkt_type as u8) | ((self.dst >> 8) as u8 & 0x0F));
        buf.push((self.dst & 0xFF) as u8);
        buf.push(self.flags | ((self.src >> 8) as u8 & 0x0F));
        buf.push((self.src & 0xFF) as u8);
        buf.push(length);
        buf.push(self.cmd);
        buf.extend_from_slice(&self.data);
        let crc = xc2_crc16(&buf);
        buf.push((crc >> 8) as u8);
        buf.push((crc & 0xFF) as u8);
        buf
    }

    /// Parse one frame from the front of `buf`, returning the packet and any trailing bytes.
    ///
    /// Mirrors `spec.md` §4.1: fewer than 8 bytes, or fewer than `declared_len + 2` bytes, is
    /// `IncompletePacket` (keep buffering); a CRC mismatch over a complete frame is `BadCrc`
    /// (the caller must discard the whole buffer, a resync is not attempted here).
    pub fn parse_bytes(buf: &[u8]) -> Result<(Self, &[u8]), CodecError> {
        if buf.len() < 8 {
            return Err(CodecError::IncompletePacket);
        }
        let declared_len = buf[4] as usize;
        if buf.len() < declared_len + 2 {
            return Err(CodecError::IncompletePacket);
        }
        let expected_crc = xc2_crc16(&buf[..declared_len]);
        let wire_crc = u16::from_be_bytes([buf[declared_len], buf[declared_len + 1]]);
        if expected_crc != wire_crc {
            return Err(CodecError::BadCrc);
        }

        let pkt_type = XC2PacketType::from_byte(buf[0]).ok_or(CodecError::BadCrc)?;
        let dst = (((buf[0] & 0x0F) as u16) << 8) | buf[1] as u16;
        let flags = buf[2] & 0xF0;
        let src = (((buf[2] & 0x0F) as u16) << 8) | buf[3] as u16;
        let cmd = buf[5];
        let data = buf[6..declared_len].to_vec();

        Ok((Self::new(pkt_type, dst, src, cmd, data, flags), &buf[declared_len + 2..]))
    }
}

/// A decoded Modbus-XC2 frame: an XC2 frame wrapped in a Modbus RTU envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModbusPacket {
    pub inner: XC2Packet,
}

impl ModbusPacket {
    pub fn new(inner: XC2Packet) -> Self {
        Self { inner }
    }

    /// `slave_id‖0x42‖<xc2 frame incl. its own CRC>‖modbus_crc16_le`.
    pub fn raw_packet(&self) -> Vec<u8> {
        let slave_id = (self.inner.dst & 0xFF) as u8;
        let xc2_frame = self.inner.raw_packet();

        let mut buf = Vec::with_capacity(2 + xc2_frame.len() + 2);
        buf.push(slave_id);
        buf.push(XC2_MODBUS_FCN);
        buf.extend_from_slice(&xc2_frame);

        let crc = modbus_crc16(&buf);
        buf.extend_from_slice(&crc.to_le_bytes());
        buf
    }

    /// Parse a Modbus-XC2 frame. Peeks the inner XC2 `length` byte (wire offset 6) to decide
    /// how many bytes the whole envelope needs before the outer Modbus CRC can be checked.
    pub fn parse_bytes(buf: &[u8]) -> Result<(Self, &[u8]), CodecError> {
        if buf.len() < 12 {
            return Err(CodecError::IncompletePacket);
        }
        let inner_declared_len = buf[6] as usize;
        let inner_frame_len = inner_declared_len + 2;
        let total_len = 2 + inner_frame_len + 2;
        if buf.len() < total_len {
            return Err(CodecError::IncompletePacket);
        }

        let expected_crc = modbus_crc16(&buf[..total_len - 2]);
        let wire_crc = u16::from_le_bytes([buf[total_len - 2], buf[total_len - 1]]);
        if expected_crc != wire_crc {
            return Err(CodecError::BadCrc);
        }

        let (inner, rest) = XC2Packet::parse_bytes(&buf[2..total_len - 2])?;
        debug_assert!(rest.is_empty());
        Ok((Self::new(inner), &buf[total_len..]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn echo_request() -> XC2Packet {
        XC2Packet::new(XC2PacketType::Command, 0x123, 0x001, 0x01, vec![], 0)
    }

    #[test]
    fn s1_smallest_echo_request_bytes() {
        // spec.md S1: 81 23 00 01 06 01 <CRC_hi> <CRC_lo>
        let pkt = echo_request();
        let raw = pkt.raw_packet();
        let crc = xc2_crc16(&[0x81, 0x23, 0x00, 0x01, 0x06, 0x01]);
        assert_eq!(raw, vec![0x81, 0x23, 0x00, 0x01, 0x06, 0x01, (crc >> 8) as u8, (crc & 0xFF) as u8]);
    }

    #[test]
    fn round_trip() {
        let pkt = XC2Packet::new(XC2PacketType::Command, 0x123, 0x001, 0x11, vec![1, 2, 3, 4], 0);
        let raw = pkt.raw_packet();
        let (decoded, trailing) = XC2Packet::parse_bytes(&raw).unwrap();
        assert_eq!(decoded, pkt);
        assert!(trailing.is_empty());
    }

    #[test]
    fn prefix_tolerance() {
        let garbage = [0u8; 7];
        assert_eq!(XC2Packet::parse_bytes(&garbage), Err(CodecError::IncompletePacket));
    }

    #[test]
    fn trailing_garbage_preserved() {
        let pkt = echo_request();
        let mut raw = pkt.raw_packet();
        raw.extend_from_slice(&[0xDE, 0xAD, 0xBE, 0xEF]);
        let (decoded, trailing) = XC2Packet::parse_bytes(&raw).unwrap();
        assert_eq!(decoded, pkt);
        assert_eq!(trailing, &[0xDE, 0xAD, 0xBE, 0xEF]);
    }

    #[test]
    fn crc_sensitivity() {
        let pkt = XC2Packet::new(XC2PacketType::Command, 0x123, 0x001, 0x11, vec![1, 2, 3, 4], 0);
        let mut raw = pkt.raw_packet();
        raw[2] ^= 0x01; // flip a bit in the flags/src-high byte, outside the CRC field
        assert_eq!(XC2Packet::parse_bytes(&raw), Err(CodecError::BadCrc));
    }

    #[test]
    fn modbus_round_trip() {
        let pkt = ModbusPacket::new(XC2Packet::new(XC2PacketType::Command, 0x23, 0x001, 0x11, vec![9, 9], 0));
        let raw = pkt.raw_packet();
        let (decoded, trailing) = ModbusPacket::parse_bytes(&raw).unwrap();
        assert_eq!(decoded, pkt);
        assert!(trailing.is_empty());
    }

    #[test]
    fn modbus_minimum_length_is_twelve() {
        let short = [0u8; 11];
        assert_eq!(ModbusPacket::parse_bytes(&short), Err(CodecError::IncompletePacket));
    }

    proptest::proptest! {
        #[test]
        fn prop_round_trip(dst in 0u16..0xFFF, src in 0u16..0xFFF, cmd in 0u8..=255, data in proptest::collection::vec(proptest::prelude::any::<u8>(), 0..200)) {
            let pkt = XC2Packet::new(XC2PacketType::Command, dst & 0x0FFF, src & 0x0FFF, cmd, data, 0);
            let raw = pkt.raw_packet();
            let (decoded, trailing) = XC2Packet::parse_bytes(&raw).unwrap();
            proptest::prop_assert_eq!(decoded, pkt);
            proptest::prop_assert!(trailing.is_empty());
        }
    }
}
