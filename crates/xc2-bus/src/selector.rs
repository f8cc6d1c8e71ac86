//! Stateless protocol selector (`spec.md` §4.2, §2 "Protocol selector" layer).
//!
//! A [`Protocol`] is a tag the bus is constructed or `change_protocol`'d with; it knows the
//! minimum packet length for that wire format and how to encode/parse a [`WireFrame`]. XCT
//! is not routed through here — it has its own line-oriented bus in `xct-device`, since its
//! framing (newline-terminated text) has nothing in common with the binary codecs.

use xc2_protocol::{CodecError, Frame, ModbusPacket, ProtocolKind, XC2Packet};

/// A decoded frame from either binary protocol, as the bus hands it to callers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireFrame {
    Xc2(XC2Packet),
    Modbus(ModbusPacket),
}

impl WireFrame {
    pub fn cmd(&self) -> u8 {
        match self {
            Self::Xc2(p) => p.cmd(),
            Self::Modbus(p) => p.cmd(),
        }
    }

    pub fn src(&self) -> u16 {
        match self {
            Self::Xc2(p) => p.src(),
            Self::Modbus(p) => p.src(),
        }
    }

    pub fn dst(&self) -> u16 {
        match self {
            Self::Xc2(p) => p.dst(),
            Self::Modbus(p) => p.dst(),
        }
    }

    pub fn pkt_type(&self) -> xc2_protocol::consts::XC2PacketType {
        match self {
            Self::Xc2(p) => p.pkt_type(),
            Self::Modbus(p) => p.pkt_type(),
        }
    }

    pub fn data(&self) -> &[u8] {
        match self {
            Self::Xc2(p) => &p.data,
            Self::Modbus(p) => &p.inner.data,
        }
    }

    pub fn with_dst(self, dst: u16) -> Self {
        match self {
            Self::Xc2(p) => Self::Xc2(p.with_dst(dst)),
            Self::Modbus(p) => Self::Modbus(p.with_dst(dst)),
        }
    }
}

/// Which binary wire format a [`crate::Bus`] is currently speaking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Xc2,
    Modbus,
}

impl Protocol {
    pub fn kind(self) -> ProtocolKind {
        match self {
            Self::Xc2 => ProtocolKind::Xc2,
            Self::Modbus => ProtocolKind::Modbus,
        }
    }

    /// Minimum number of bytes a frame of this protocol can ever occupy on the wire.
    pub fn pkt_min_len(self) -> usize {
        self.kind().pkt_min_len()
    }

    pub fn encode(self, frame: &WireFrame) -> Vec<u8> {
        match frame {
            WireFrame::Xc2(p) => p.encode(),
            WireFrame::Modbus(p) => p.encode(),
        }
    }

    /// Parses one frame of this protocol from the front of `buf`.
    pub fn parse(self, buf: &[u8]) -> Result<(WireFrame, &[u8]), CodecError> {
        match self {
            Self::Xc2 => {
                let (pkt, rest) = XC2Packet::parse_bytes(buf)?;
                Ok((WireFrame::Xc2(pkt), rest))
            }
            Self::Modbus => {
                let (pkt, rest) = ModbusPacket::parse_bytes(buf)?;
                Ok((WireFrame::Modbus(pkt), rest))
            }
        }
    }
}
