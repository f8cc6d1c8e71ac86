use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};

use crate::buffer::DataBuffer;
use crate::decoder::Evm8Decoder;
use crate::error::Evm8Error;
use crate::header::HeaderInfo;
use crate::record::Record;

const READ_CHUNK: usize = 1024;
const WAIT_DATA_TIMEOUT: Duration = Duration::from_millis(500);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    WaitHeader,
    WaitData,
}

/// Drives the WAIT_HEADER/WAIT_DATA framing state machine over a secondary connection and
/// feeds decoded [`Record`]s into a [`DataBuffer`] (`spec.md` §4.6).
///
/// Reconnecting after the stream ends is the caller's responsibility — `run` returns once the
/// peer closes the connection, having already cleared the buffer, so a supervising loop can
/// just construct a fresh [`Evm8Stream`] over a new connection.
pub struct Evm8Stream<R> {
    reader: R,
    decoder: Evm8Decoder,
    buffer: Arc<DataBuffer>,
}

impl<R: AsyncRead + Unpin> Evm8Stream<R> {
    pub fn new(reader: R, buffer: Arc<DataBuffer>) -> Self {
        Self { reader, decoder: Evm8Decoder::new(), buffer }
    }

    pub fn with_gain_offset(reader: R, buffer: Arc<DataBuffer>, gain: [f32; 8], offset: [f32; 8]) -> Self {
        Self { reader, decoder: Evm8Decoder::with_gain_offset(gain, offset), buffer }
    }

    pub async fn run(&mut self) -> Result<(), Evm8Error> {
        let mut state = State::WaitHeader;
        let mut trailing: Vec<u8> = Vec::new();
        let mut packets_received: u64 = 0;
        let mut packet_size: u64 = 0;

        loop {
            let want = READ_CHUNK.saturating_sub(trailing.len()).max(1);
            let mut chunk = vec![0u8; want];

            let n = match state {
                State::WaitData => match tokio::time::timeout(WAIT_DATA_TIMEOUT, self.reader.read(&mut chunk)).await {
                    Ok(Ok(n)) => n,
                    Ok(Err(e)) => return Err(e.into()),
                    Err(_elapsed) => {
                        self.buffer.push(Record::Timeout);
                        continue;
                    }
                },
                State::WaitHeader => self.reader.read(&mut chunk).await?,
            };

            if n == 0 {
                self.buffer.clear_data();
                return Ok(());
            }

            let mut data = std::mem::take(&mut trailing);
            data.extend_from_slice(&chunk[..n]);

            match state {
                State::WaitHeader => {
                    if let Some(pos) = data.iter().position(|&b| b == b'\n') {
                        let line = String::from_utf8_lossy(&data[..pos]).into_owned();
                        let header = HeaderInfo::parse(&line);
                        packet_size = header.data_packet_size().unwrap_or(0);
                        packets_received = 0;
                        self.decoder.reset();
                        self.buffer.push(Record::Header(header));
                        trailing = data[pos + 1..].to_vec();
                        state = State::WaitData;
                    } else {
                        trailing = data;
                    }
                }
                State::WaitData => {
                    let remainder = data.len() % 32;
                    let aligned_len = data.len() - remainder;
                    trailing = data[aligned_len..].to_vec();
                    packets_received += (aligned_len / 32) as u64;
                    for record in self.decoder.decode_blocks(&data[..aligned_len]) {
                        self.buffer.push(record);
                    }
                    if packet_size > 0 && packets_received >= packet_size {
                        self.buffer.push(Record::Done);
                        state = State::WaitHeader;
                        trailing.clear();
                        packets_received = 0;
                        packet_size = 0;
                    }
                }
            }
        }
    }
}

pub type TcpEvm8Stream = Evm8Stream<tokio::net::TcpStream>;

/// Opens the secondary data socket with a 1-second connect timeout
/// (`spec.md` §4.6 "default port 17002").
pub async fn connect(addr: impl tokio::net::ToSocketAddrs, buffer: Arc<DataBuffer>) -> Result<TcpEvm8Stream, Evm8Error> {
    let stream = tokio::time::timeout(CONNECT_TIMEOUT, tokio::net::TcpStream::connect(addr)).await.map_err(|_| Evm8Error::ConnectTimeout)??;
    Ok(Evm8Stream::new(stream, buffer))
}
