//! EVM8 secondary data stream: header/data framing, sample decode and a priority consumer
//! FIFO — `spec.md` §4.6.

pub mod buffer;
pub mod decoder;
pub mod error;
pub mod header;
pub mod record;
pub mod stream;

mod timestamp;

pub use buffer::DataBuffer;
pub use decoder::Evm8Decoder;
pub use error::Evm8Error;
pub use header::HeaderInfo;
pub use record::{InvalidKind, Record};
pub use stream::{connect, Evm8Stream, TcpEvm8Stream};
pub use timestamp::{bytes_to_int48, i24_le_signed};
