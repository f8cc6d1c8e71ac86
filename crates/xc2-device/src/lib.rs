//! Device session: TTL/status lifecycle and register access bound to a live bus —
//! `spec.md` §4.4.

pub mod error;
pub mod family;
pub mod session;
pub mod status;

pub use error::DeviceError;
pub use family::{AppStatus, EchoStatus, FamilyStatusDecoder, GenericStatusDecoder};
pub use session::DeviceSession;
pub use status::StatusMachine;
