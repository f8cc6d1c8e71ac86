//! Frame codec and numeric catalog shared by the XC2 / Modbus-XC2 / XCT stack.
//!
//! This crate is intentionally transport-free: it only turns bytes into packets and back.
//! The async bus lives in `xc2-bus`.

pub mod consts;
pub mod crc;
pub mod dev_id;
pub mod error;
pub mod packets;

pub use consts::ProtocolKind;
pub use error::CodecError;
pub use packets::{Frame, ModbusPacket, XC2Packet};
