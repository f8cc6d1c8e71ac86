use thiserror::Error;

/// Codec-local failures (`spec.md` §7). These are handled *inside* the bus receive loop and
/// are not meant to escape to application code — see `xc2-bus::BusError`.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("incomplete packet: need more bytes")]
    IncompletePacket,
    #[error("bad CRC")]
    BadCrc,
}
