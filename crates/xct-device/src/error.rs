use thiserror::Error;

#[derive(Debug, Error)]
pub enum XctDeviceError {
    #[error("register file has not been discovered yet")]
    StructureNotRead,
    #[error("unknown register: {0}")]
    UnknownRegister(String),
    #[error("{0}")]
    Remote(String),
    #[error("could not parse device registry structure")]
    MalformedStructure,
    #[error("no record channel specified")]
    NoRecordChannel,
    #[error("acquisition channel count mismatch: started with {expected}, buffer reported {actual}")]
    ChannelCountMismatch { expected: usize, actual: usize },
    #[error(transparent)]
    Xct(#[from] xct_protocol::XctError),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
