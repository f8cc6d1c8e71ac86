//! Async transport/session layer over XC2 / Modbus-XC2 — `spec.md` §4.2, §5.
//!
//! `xc2-protocol` only turns bytes into packets; this crate owns the duplex byte stream
//! (serial or TCP), buffers incoming bytes, and implements request/response matching,
//! broadcast collection, timeouts, retry-on-reset and event demultiplexing.

pub mod bus;
pub mod error;
pub mod port;
pub mod selector;
pub mod sink;

pub use bus::{Bus, SerialBus, TcpBus};
pub use error::BusError;
pub use port::BusPort;
pub use selector::Protocol;
pub use sink::{NullSink, PacketDirection, PacketSink};
