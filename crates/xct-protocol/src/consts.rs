//! XCT enumerations — `spec.md` §4.7/§4.8/§6.

/// Scopes an XCT line to a server-level command, a specific device, or a reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XCTPacketType {
    Server,
    Device,
    Answer,
}

/// The command verb carried on an XCT line. `Ok`/`Error` only ever appear on a parsed
/// reply, never on an outgoing request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XCTCommands {
    Get,
    Set,
    Echo,
    Rest,
    PlainCmd,
    Ok,
    Error,
}

impl XCTCommands {
    /// The token written on the wire for request commands (`spec.md` §4.7 "`GET <name>`").
    pub fn name(&self) -> &'static str {
        match self {
            XCTCommands::Get => "GET",
            XCTCommands::Set => "SET",
            XCTCommands::Echo => "ECHO",
            XCTCommands::Rest => "REST",
            XCTCommands::PlainCmd => "PLAIN_CMD",
            XCTCommands::Ok => "OK",
            XCTCommands::Error => "ERROR",
        }
    }
}

/// Voltage channel selector for `startCV`/`startCA` (`spec.md` §4.8).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XCTVChannel {
    Vout = 0x00,
    Vsense = 0x01,
    Vref = 0x02,
}

bitflags::bitflags! {
    /// Which channels an acquisition session records, combined as a bitmask on the wire
    /// (`spec.md` §4.8).
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct XCTRecordChannel: u8 {
        const VOUT = 0x01;
        const VSENSE = 0x02;
        const VREF = 0x04;
        const I = 0x08;
    }
}

/// Expands a record-channel bitmask into the channel names it selects, in a fixed order
/// (`spec.md` §4.8, used to label `ReadBuffer` columns).
pub fn record_channel_mask_to_list(mask: XCTRecordChannel) -> Vec<&'static str> {
    let mut out = Vec::new();
    if mask.contains(XCTRecordChannel::VOUT) {
        out.push("Vout");
    }
    if mask.contains(XCTRecordChannel::VSENSE) {
        out.push("Vsense");
    }
    if mask.contains(XCTRecordChannel::VREF) {
        out.push("Vref");
    }
    if mask.contains(XCTRecordChannel::I) {
        out.push("I");
    }
    out
}
