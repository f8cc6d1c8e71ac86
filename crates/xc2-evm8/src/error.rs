use thiserror::Error;

#[derive(Debug, Error)]
pub enum Evm8Error {
    #[error("connection closed by peer")]
    ConnectionClosed,
    #[error("timed out connecting to the data socket")]
    ConnectTimeout,
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
