use thiserror::Error;
use xc2_protocol::CodecError;

/// Bus-level failures (`spec.md` §7). Codec-local `IncompletePacket`/`BadCrc` are handled
/// inside `Bus::receive_pkt` and never reach this enum.
#[derive(Debug, Error)]
pub enum BusError {
    #[error("timeout waiting for response")]
    Timeout,
    #[error("unexpected answer: cmd={cmd:#04x} src={src:#05x}")]
    UnexpectedAnswer { cmd: u8, src: u16 },
    #[error("connection reset")]
    ConnectionReset,
    #[error("general error: {0}")]
    GeneralError(String),
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
