//! XCT text device session and acquisition client — `spec.md` §4.7/§4.8.
//!
//! Same external register contract as the binary-protocol [`xc2_device::DeviceSession`]
//! (discover, then `read_reg`/`write_reg`), but the schema comes from a JSON document
//! instead of `RegistryInfo_GetInfo`, and a second, unrelated client type drives
//! server-scoped acquisition commands that aren't addressed to any device at all.

pub mod buffer;
pub mod client;
pub mod error;
pub mod session;

pub use buffer::{AcqDataBuffer, AcqRow};
pub use client::{AcqBufferSnapshot, XctAcquisitionClient};
pub use error::XctDeviceError;
pub use session::{XctDeviceSession, XctEchoStatus, XctRegisterFile, XctRegisterInfo};
