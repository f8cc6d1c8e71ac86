//! The XCT line bus: a duplex byte stream read/written one `\n`-terminated line at a time
//! (`spec.md` §4.7/§6). Reuses [`xc2_bus::bus::Connector`] so the same serial/TCP
//! reconnect logic backs both the binary and text protocols.

use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::trace;

use xc2_bus::bus::{Connector, SerialConnector, TcpConnector};

use crate::error::XctError;
use crate::packet::XCTPacket;

const DEFAULT_TIMEOUT: Duration = Duration::from_millis(400);
const READ_CHUNK: usize = 1024;

/// Generic async line bus over any [`Connector`].
pub struct XctBus<C: Connector> {
    connector: C,
    stream: Option<C::Stream>,
    buf: Vec<u8>,
    default_timeout: Duration,
}

impl<C: Connector> XctBus<C> {
    pub fn new(connector: C) -> Self {
        Self { connector, stream: None, buf: Vec::new(), default_timeout: DEFAULT_TIMEOUT }
    }

    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    pub fn bus_name(&self) -> String {
        self.connector.bus_long_name()
    }

    pub async fn connect(&mut self) -> Result<(), XctError> {
        self.stream = Some(self.connector.connect(Duration::from_secs(3)).await?);
        Ok(())
    }

    pub fn clear_buffers(&mut self) {
        self.buf.clear();
    }

    pub async fn send_pkt(&mut self, pkt: &XCTPacket) -> Result<(), XctError> {
        let raw = pkt.raw_packet()?;
        let stream = self.stream.as_mut().ok_or(XctError::ConnectionClosed)?;
        trace!(bus = %self.bus_name(), line = %String::from_utf8_lossy(&raw), "xct send");
        stream.write_all(&raw).await?;
        stream.flush().await?;
        Ok(())
    }

    /// Reads until a full `\n`-terminated line is available, or `timeout` elapses.
    pub async fn receive_line(&mut self, timeout: Duration) -> Result<String, XctError> {
        loop {
            if let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
                let line: Vec<u8> = self.buf.drain(..=pos).collect();
                return Ok(String::from_utf8_lossy(&line).into_owned());
            }
            let stream = self.stream.as_mut().ok_or(XctError::ConnectionClosed)?;
            let mut chunk = vec![0u8; READ_CHUNK];
            let n = match tokio::time::timeout(timeout, stream.read(&mut chunk)).await {
                Ok(Ok(n)) => n,
                Ok(Err(e)) => return Err(e.into()),
                Err(_elapsed) => return Err(XctError::Timeout),
            };
            if n == 0 {
                return Err(XctError::ConnectionClosed);
            }
            self.buf.extend_from_slice(&chunk[..n]);
        }
    }

    /// Sends `pkt` and waits for the next line, parsed as a reply.
    pub async fn request_response(&mut self, pkt: XCTPacket, timeout: Option<Duration>) -> Result<XCTPacket, XctError> {
        let timeout = timeout.unwrap_or(self.default_timeout);
        self.clear_buffers();
        self.send_pkt(&pkt).await?;
        let line = self.receive_line(timeout).await?;
        Ok(XCTPacket::parse_line(&line))
    }
}

/// Object-safe facade over [`XctBus`], so higher layers (`xct-device`) can hold a bus
/// without being generic over its [`Connector`] — mirrors [`xc2_bus::BusPort`].
#[async_trait::async_trait]
pub trait XctPort: Send {
    async fn connect(&mut self) -> Result<(), XctError>;
    async fn request_response(&mut self, pkt: XCTPacket, timeout: Option<Duration>) -> Result<XCTPacket, XctError>;
    fn bus_name(&self) -> String;
}

#[async_trait::async_trait]
impl<C: Connector + 'static> XctPort for XctBus<C> {
    async fn connect(&mut self) -> Result<(), XctError> {
        XctBus::connect(self).await
    }

    async fn request_response(&mut self, pkt: XCTPacket, timeout: Option<Duration>) -> Result<XCTPacket, XctError> {
        XctBus::request_response(self, pkt, timeout).await
    }

    fn bus_name(&self) -> String {
        XctBus::bus_name(self)
    }
}

pub type XctTcpBus = XctBus<TcpConnector>;
pub type XctSerialBus = XctBus<SerialConnector>;

impl XctTcpBus {
    pub fn tcp(host: impl Into<String>, port: u16) -> Self {
        XctBus::new(TcpConnector { host: host.into(), port })
    }
}

impl XctSerialBus {
    pub fn serial(port: impl Into<String>, baud_rate: u32) -> Self {
        XctBus::new(SerialConnector { port: port.into(), baud_rate })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::future::Future;
    use std::io;
    use std::pin::Pin;
    use tokio::io::DuplexStream;
    use tokio::sync::Mutex as AsyncMutex;

    use crate::consts::{XCTCommands, XCTPacketType};

    struct MemConnector {
        stream: AsyncMutex<Option<DuplexStream>>,
    }

    impl Connector for MemConnector {
        type Stream = DuplexStream;

        fn connect(&self, _timeout: Duration) -> Pin<Box<dyn Future<Output = io::Result<DuplexStream>> + Send + '_>> {
            Box::pin(async move { self.stream.lock().await.take().ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "taken")) })
        }

        fn bus_long_name(&self) -> String {
            "mem://xct-test".into()
        }
    }

    async fn connected_pair() -> (XctBus<MemConnector>, DuplexStream) {
        let (ours, theirs) = tokio::io::duplex(4096);
        let mut bus = XctBus::new(MemConnector { stream: AsyncMutex::new(Some(ours)) });
        bus.connect().await.unwrap();
        (bus, theirs)
    }

    #[tokio::test]
    async fn request_response_round_trip() {
        let (mut bus, mut peer) = connected_pair().await;
        let pkt = XCTPacket::new(XCTPacketType::Device, "PTC", XCTCommands::Get, "FWStatus");

        let responder = tokio::spawn(async move {
            let mut buf = [0u8; 64];
            let n = peer.read(&mut buf).await.unwrap();
            assert_eq!(&buf[..n], b"GET PTC.FWStatus\n");
            peer.write_all(b"OK 200 20\n").await.unwrap();
            peer.flush().await.unwrap();
        });

        let reply = bus.request_response(pkt, Some(Duration::from_millis(200))).await.unwrap();
        assert_eq!(reply.cmd, XCTCommands::Ok);
        assert_eq!(reply.data, "20");
        responder.await.unwrap();
    }

    #[tokio::test]
    async fn incremental_line_waits_for_newline() {
        let (mut bus, mut peer) = connected_pair().await;
        let sender = tokio::spawn(async move {
            peer.write_all(b"OK 200 ").await.unwrap();
            peer.flush().await.unwrap();
            tokio::time::sleep(Duration::from_millis(20)).await;
            peer.write_all(b"hi\n").await.unwrap();
            peer.flush().await.unwrap();
        });
        let line = bus.receive_line(Duration::from_millis(500)).await.unwrap();
        assert_eq!(line, "OK 200 hi\n");
        sender.await.unwrap();
    }
}
