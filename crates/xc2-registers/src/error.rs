use thiserror::Error;

/// Failures from the register engine (`spec.md` §7). Transport failures are wrapped from
/// whatever `RegCommand` impl backs this engine (a real bus, in `xc2-device`).
#[derive(Debug, Error)]
pub enum RegisterError {
    #[error("unknown register: {0}")]
    UnknownRegister(String),
    #[error("register is read-only: {0}")]
    ReadOnly(String),
    #[error("device did not respond")]
    DeviceNotResponding,
    #[error("malformed register structure: {0}")]
    MalformedStructure(String),
    #[error("value does not fit register {0}")]
    ValueTooLarge(String),
    #[error("invalid value string: {0}")]
    InvalidValueString(String),
    #[error(transparent)]
    Transport(#[from] anyhow::Error),
}
