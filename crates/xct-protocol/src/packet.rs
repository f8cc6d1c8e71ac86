//! XCT line encode/parse — `spec.md` §4.7/§6 "UTF-8 lines terminated by `\n`".

use crate::consts::{XCTCommands, XCTPacketType};
use crate::error::XctError;

/// A decoded or to-be-sent XCT line.
///
/// `dst` only matters for [`XCTPacketType::Device`] requests, where it carries the
/// device's alt-name (the `<name>` in `GET <name>.<reg>`); server-scoped requests and
/// parsed replies leave it empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XCTPacket {
    pub pkt_type: XCTPacketType,
    pub dst: String,
    pub cmd: XCTCommands,
    pub data: String,
}

impl XCTPacket {
    pub fn new(pkt_type: XCTPacketType, dst: impl Into<String>, cmd: XCTCommands, data: impl Into<String>) -> Self {
        Self { pkt_type, dst: dst.into(), cmd, data: data.into() }
    }

    /// Encodes to the line that goes on the wire, including the trailing `\n`.
    ///
    /// Only request shapes are supported: a parsed [`XCTPacketType::Answer`] packet is
    /// never re-encoded.
    pub fn raw_packet(&self) -> Result<Vec<u8>, XctError> {
        let line = match self.pkt_type {
            XCTPacketType::Device => match self.cmd {
                XCTCommands::Get | XCTCommands::Set => format!("{} {}.{}\n", self.cmd.name(), self.dst, self.data),
                XCTCommands::Rest => format!("{} {}\n", self.cmd.name(), self.data),
                _ => return Err(XctError::Unsupported),
            },
            XCTPacketType::Server => match self.cmd {
                XCTCommands::Get | XCTCommands::Set => format!("{} {}\n", self.cmd.name(), self.data),
                XCTCommands::Echo => "ECHO\n".to_string(),
                XCTCommands::PlainCmd => {
                    if self.data.is_empty() {
                        return Err(XctError::EmptyCommand);
                    }
                    if self.data.ends_with('\n') {
                        self.data.clone()
                    } else {
                        format!("{}\n", self.data)
                    }
                }
                _ => return Err(XctError::Unsupported),
            },
            XCTPacketType::Answer => return Err(XctError::Unsupported),
        };
        Ok(line.into_bytes())
    }

    /// Parses one reply line. Anything not starting with `OK` is an error reply carrying
    /// the raw (trimmed) line as its message; `OK 200 <payload>` and bare `OK <payload>`
    /// both parse to [`XCTCommands::Ok`] with `payload` extracted (`spec.md` §6).
    pub fn parse_line(line: &str) -> Self {
        if !line.starts_with("OK") {
            return Self::new(XCTPacketType::Answer, "", XCTCommands::Error, line.trim());
        }
        let data = if let Some(rest) = line.strip_prefix("OK 200 ") {
            rest.trim()
        } else {
            line[2..].trim()
        };
        Self::new(XCTPacketType::Answer, "", XCTCommands::Ok, data)
    }
}
