//! The XCT line-oriented text protocol — `spec.md` §3/§4.7/§4.8/§6.

pub mod bus;
pub mod consts;
pub mod error;
pub mod packet;
pub mod value;

pub use bus::{XctBus, XctPort, XctSerialBus, XctTcpBus};
pub use consts::{record_channel_mask_to_list, XCTCommands, XCTPacketType, XCTRecordChannel, XCTVChannel};
pub use error::XctError;
pub use packet::XCTPacket;
pub use value::{retype_value, XctValue};
