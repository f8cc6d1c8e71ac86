//! Numeric catalog for the XC2 family of protocols.
//!
//! Every value here is normative and must match deployed devices bit-for-bit; they are a
//! straight port of the vendor's `consts.py` table, not a redesign.

use bitflags::bitflags;

pub const MAX_BAUD_RATE: u32 = 3_000_000;
pub const MAX_XC2_ADDRESS: u16 = 4096;
pub const NUMBER_OF_REPETITIONS: u8 = 4;
pub const TIMEOUT_RESPONSE_MS: u64 = 400;

/// Default size of a single read from the underlying transport. A read that fills this
/// buffer exactly signals the bus to keep reading without restarting the timeout budget
/// (`spec.md` §4.2 "big-packet mode").
pub const MAX_READER_SIZE: usize = 1024;

/// Default per-packet payload budget: `246 - 10`, the register engine's default
/// `max_pkt_data_size`.
pub const DEFAULT_MAX_PKT_DATA_SIZE: usize = 246 - 10;

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum XC2PacketType {
    Command = 0x80,
    Ack = 0xC0,
    Nak = 0xE0,
    Event = 0x40,
    CriticalError = 0x60,
}

impl XC2PacketType {
    pub fn from_byte(b: u8) -> Option<Self> {
        // pkt_type occupies the top nibble-ish of byte0; mask off the dst-high bits.
        match b & 0xE0 {
            0x80 => Some(Self::Command),
            0xC0 => Some(Self::Ack),
            0xE0 => Some(Self::Nak),
            0x40 => Some(Self::Event),
            0x60 => Some(Self::CriticalError),
            _ => None,
        }
    }
}

bitflags! {
    /// Per-packet flags, packed into the top nibble of byte2 alongside `src`'s high bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct XC2Flags: u8 {
        const MULTICAST = 0x80;
        const SUPPRESS_ANSWER = 0x40;
        const REPETITION = 0x20;
        const RESERVED = 0x10;
    }
}

#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XC2Addr {
    Broadcast = 0x000,
    Master = 0x001,
    Default = 0xFFF,
}

/// XC2 command codes (`XC2Commands` in the original).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct XC2Commands;
impl XC2Commands {
    pub const CMD_POLL: u8 = 0x00;
    pub const CMD_ECHO: u8 = 0x01;
    pub const CMD_GET_STATUS: u8 = 0x02;
    pub const CMD_SYS: u8 = 0x03;
    pub const CMD_GET_FEATURE: u8 = 0x05;
    pub const CMD_FIND: u8 = 0x06;
    pub const CMD_BLCMD: u8 = 0x08;
    pub const CMD_STAY_IN_BOOTLOADER: u8 = 0x09;

    pub const CMD_REGISTRY_READRAW: u8 = 0x10;
    pub const CMD_REGISTRY_READ: u8 = 0x11;
    pub const CMD_REGISTRY_READBYNAME: u8 = 0x12;
    pub const CMD_REGISTRY_GETINFO: u8 = 0x13;
    pub const CMD_REGISTRY_WRITERAW: u8 = 0x14;
    pub const CMD_REGISTRY_WRITE: u8 = 0x15;
    pub const CMD_REGISTRY_WRITEBYNAME: u8 = 0x16;
    pub const CMD_REGISTRY_ACTION: u8 = 0x17;

    pub const CMD_XADDA_ACQBUFFER_READ: u8 = 0x91;
    pub const CMD_APPSTATUS: u8 = 0xA0;
}

/// Subcommands inserted into the payload after `CMD_SYS`/`CMD_BLCMD`.
pub struct XC2SysSubcommands;
impl XC2SysSubcommands {
    pub const ECHO_BOOT_LOADER: u8 = 0x01;
    pub const ECHO_APPLICATION: u8 = 0x02;
    pub const SYS_RESET: u8 = 0x04;
    pub const SYS_BOOTLOADER: u8 = 0x06;
    pub const SYS_RUNAPPL: u8 = 0x07;
    pub const SYS_SETADDR: u8 = 0x10;
    pub const SYS_GETSERIAL: u8 = 0x13;
    pub const SYS_SETBAUD: u8 = 0x14;
    pub const SYS_SETBAUD_DIRECT: u8 = 0x15;
    pub const SYS_RESTORE_REGS: u8 = 0x20;
    pub const SYS_STORE_REGS: u8 = 0x21;
}

pub struct XC2RegGetInfoSubcommands;
impl XC2RegGetInfoSubcommands {
    pub const SIZE: u8 = 0x00;
    pub const STRUCTURE: u8 = 0x01;
    pub const FIND_BY_NAME: u8 = 0x02;
    pub const DEFAULT_VALUE: u8 = 0x03;
    pub const ENUMS_COUNT: u8 = 0x04;
    pub const ENUM_LEN: u8 = 0x05;
    pub const ENUM_ITEMS: u8 = 0x06;
}

pub struct XC2RegActionSubcommands;
impl XC2RegActionSubcommands {
    pub const BACKUP: u8 = 0x01;
    pub const RESTORE: u8 = 0x02;
    pub const LOG: u8 = 0x03;
    pub const SET_DEFAULTS: u8 = 0x04;
    pub const STORE_TO_EEPROM: u8 = 0x05;
}

/// Codes carried in the payload of a NAK-typed packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XC2AnswerCmd {
    Ack = 0x01,
    Nak = 0x02,
    UnknownCmd = 0x03,
    BadPrm = 0x04,
    BadLen = 0x05,
    BadSecCrc = 0x06,
    ReadOnly = 0x07,
    WriteOnly = 0x08,
    Busy = 0x09,
    OtherCmdInProgress = 0x0A,
    NotApplicable = 0x0B,
}

impl XC2AnswerCmd {
    pub fn from_byte(b: u8) -> Option<Self> {
        Some(match b {
            0x01 => Self::Ack,
            0x02 => Self::Nak,
            0x03 => Self::UnknownCmd,
            0x04 => Self::BadPrm,
            0x05 => Self::BadLen,
            0x06 => Self::BadSecCrc,
            0x07 => Self::ReadOnly,
            0x08 => Self::WriteOnly,
            0x09 => Self::Busy,
            0x0A => Self::OtherCmdInProgress,
            0x0B => Self::NotApplicable,
            _ => return None,
        })
    }
}

bitflags! {
    /// Register metadata flags word, as returned by `RegistryInfo_Structure`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct XC2RegFlags: u16 {
        const MASK_TYPE = 0x07;
        const WIDTH_1 = 0x01;
        const WIDTH_8 = 0x02;
        const WIDTH_16 = 0x03;
        const WIDTH_32 = 0x04;
        const WIDTH_64 = 0x05;
        const MASK_MOD = 0x18;
        const MOD_UNSIGNED = 0x00;
        const MOD_SIGNED = 0x08;
        const MOD_FLOAT_ENUM = 0x10;
        const MOD_CHAR = 0x18;
        const ARRAY = 0x20;
        const BOUND = 0x40;
        const HEX = 0x80;
        const READ_ONLY = 0x100;
        const VOLATILE = 0x200;
    }
}

pub const XC2_MODBUS_FCN: u8 = 0x42;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolKind {
    Xc2,
    Modbus,
    Xct,
}

impl ProtocolKind {
    pub fn protocol_name(self) -> &'static str {
        match self {
            Self::Xc2 => "XC2",
            Self::Modbus => "MOD",
            Self::Xct => "XCT",
        }
    }

    /// Minimum number of bytes a frame of this protocol can ever occupy on the wire.
    pub fn pkt_min_len(self) -> usize {
        match self {
            Self::Xc2 => 8,
            Self::Modbus => 12,
            Self::Xct => 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceType {
    Generic,
    Aio,
    Cvm24p,
    Cvm32a,
    Dio,
    Pmm,
    Rel,
    Xam,
    Evm8,
    Evm8Core,
    Cvm64h,
    Hvload,
    Dctrl,
    Mis,
    Virtual,
    VirtualHvl,
    VirtualShunt,
}

impl DeviceType {
    /// Matches the vendor's display names, which diverge from the Rust variant names for
    /// historical reasons (`KlAIO`, `KlDIO`, ...).
    pub fn display_name(self) -> &'static str {
        match self {
            Self::Generic => "Generic",
            Self::Aio => "KlAIO",
            Self::Cvm24p => "CVM24p",
            Self::Cvm32a => "CVM32a",
            Self::Dio => "KlDIO",
            Self::Pmm => "KlPMM",
            Self::Rel => "KlREL",
            Self::Xam => "KlXAM",
            Self::Evm8 => "EVM8",
            Self::Evm8Core => "EVM8_CORE",
            Self::Cvm64h => "CVM64h",
            Self::Hvload => "HVLOAD",
            Self::Dctrl => "DCTRL",
            Self::Mis => "MIS",
            Self::Virtual => "Virtual",
            Self::VirtualHvl => "Virtual_Hvl",
            Self::VirtualShunt => "Virtual_Shunt",
        }
    }

    pub fn from_label(label: &str) -> Self {
        let label = label.to_ascii_lowercase();
        if label.contains("aio") {
            Self::Aio
        } else if label.contains("cvm24") {
            Self::Cvm24p
        } else if label.contains("cvm32") {
            Self::Cvm32a
        } else if label.contains("cvm64") {
            Self::Cvm64h
        } else if label.contains("dio") {
            Self::Dio
        } else if label.contains("pmm") {
            Self::Pmm
        } else if label.contains("rel") {
            Self::Rel
        } else if label.contains("xam") {
            Self::Xam
        } else if label.contains("core") {
            Self::Evm8Core
        } else if label.contains("evm8") {
            Self::Evm8
        } else if label.contains("hvload") {
            Self::Hvload
        } else if label.contains("dctrl") {
            Self::Dctrl
        } else if label.contains("mis") {
            Self::Mis
        } else if label.contains("virtual_hvl") {
            Self::VirtualHvl
        } else if label.contains("virtual_sh") {
            Self::VirtualShunt
        } else if label.contains("virtual") {
            Self::Virtual
        } else {
            Self::Generic
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceStatus {
    Expected,
    Available,
    Disconnected,
    Timeout,
    Resetting,
    Bootloader,
    Firmware,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusStatus {
    Expected,
    Available,
    Disconnected,
}
