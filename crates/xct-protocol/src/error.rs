use thiserror::Error;

#[derive(Debug, Error)]
pub enum XctError {
    #[error("non-OK reply: {0}")]
    NonOk(String),
    #[error("cannot encode an empty PLAIN_CMD")]
    EmptyCommand,
    #[error("packet type/command combination has no wire encoding")]
    Unsupported,
    #[error("connection closed by peer")]
    ConnectionClosed,
    #[error("timed out waiting for a reply")]
    Timeout,
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
